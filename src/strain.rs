//! Live strain estimation from instantaneous sensor deltas
//!
//! Strain is a device-local, per-tick estimate of physiological load,
//! blending heart-rate elevation over baseline, blood-oxygen depression
//! under baseline, and heart-rate recovery delay. The result is ephemeral:
//! it is folded into the set score as a modifier and then discarded. Raw
//! strain samples never cross the persistence boundary.
//!
//! The calculator is deliberately permissive: a missing or implausible
//! sensor reading can never block a workout. Missing input degrades to a
//! zero-strain green reading flagged as estimated; out-of-range input is
//! clamped into physiological range and flagged the same way.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Three-level strain status derived from the strain score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StrainStatus {
    /// Score at or below 85: normal working strain
    Green,
    /// Score 86-95: elevated, discount the strain-weighted score slice
    Yellow,
    /// Score above 95: high strain, strongest discount
    Red,
}

impl StrainStatus {
    /// Classify a strain score. Thresholds are exact: 85 is still green,
    /// 95 is still yellow.
    pub fn from_score(score: Decimal) -> Self {
        if score <= dec!(85) {
            StrainStatus::Green
        } else if score <= dec!(95) {
            StrainStatus::Yellow
        } else {
            StrainStatus::Red
        }
    }

    /// Score modifier applied to the strain-weighted slice of a set score
    pub fn modifier(&self) -> Decimal {
        match self {
            StrainStatus::Green => dec!(1.00),
            StrainStatus::Yellow => dec!(0.95),
            StrainStatus::Red => dec!(0.85),
        }
    }
}

impl fmt::Display for StrainStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StrainStatus::Green => write!(f, "Green"),
            StrainStatus::Yellow => write!(f, "Yellow"),
            StrainStatus::Red => write!(f, "Red"),
        }
    }
}

/// Raw sensor readings for one sampling tick
///
/// Every field is optional; sensors may be absent for the whole session
/// or drop individual samples.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StrainSample {
    /// Current heart rate in bpm
    pub current_hr: Option<u16>,

    /// Resting/session baseline heart rate in bpm
    pub baseline_hr: Option<u16>,

    /// Current blood oxygen saturation in percent
    pub current_spo2: Option<Decimal>,

    /// Baseline blood oxygen saturation in percent
    pub baseline_spo2: Option<Decimal>,

    /// Heart-rate recovery delay in milliseconds
    pub recovery_delay_ms: Option<u32>,
}

/// One evaluated strain reading
///
/// Ephemeral: consumed at set completion as a modifier and never
/// persisted in raw form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveStrain {
    /// Heart rate used for the calculation (clamped if implausible)
    pub current_hr: Option<u16>,

    /// Baseline heart rate used for the calculation
    pub baseline_hr: Option<u16>,

    /// Blood oxygen used for the calculation
    pub current_spo2: Option<Decimal>,

    /// Baseline blood oxygen used for the calculation
    pub baseline_spo2: Option<Decimal>,

    /// Recovery delay used for the calculation
    pub recovery_delay_ms: Option<u32>,

    /// Bounded strain score in [0, 100]
    pub strain_score: Decimal,

    /// Status band derived from the score
    pub status: StrainStatus,

    /// True when any input was missing or clamped
    pub is_estimated: bool,

    /// When this reading was evaluated
    pub timestamp: DateTime<Utc>,
}

/// Strain formula weights and physiological plausibility ranges
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrainConfig {
    /// Weight of the heart-rate elevation term
    pub hr_weight: Decimal,

    /// Weight of the blood-oxygen depression term
    pub spo2_weight: Decimal,

    /// Weight of the recovery-delay term
    pub recovery_weight: Decimal,

    /// Upper score bound of the green band
    pub green_max: Decimal,

    /// Upper score bound of the yellow band
    pub yellow_max: Decimal,

    /// Plausible heart-rate range in bpm; readings outside are clamped
    pub hr_range: (u16, u16),

    /// Plausible SpO2 range in percent
    pub spo2_range: (Decimal, Decimal),

    /// Maximum plausible recovery delay in milliseconds
    pub max_recovery_delay_ms: u32,
}

impl Default for StrainConfig {
    fn default() -> Self {
        StrainConfig {
            hr_weight: dec!(0.4),
            spo2_weight: dec!(0.3),
            recovery_weight: dec!(0.3),
            green_max: dec!(85),
            yellow_max: dec!(95),
            hr_range: (30, 230),
            spo2_range: (dec!(70), dec!(100)),
            max_recovery_delay_ms: 600_000,
        }
    }
}

/// Per-tick strain calculator
///
/// Pure and cheap enough to run once per sampling tick; holds no state
/// and no resources, so an ending session can simply stop calling it.
pub struct StrainCalculator {
    config: StrainConfig,
}

impl StrainCalculator {
    pub fn new() -> Self {
        StrainCalculator {
            config: StrainConfig::default(),
        }
    }

    pub fn with_config(config: StrainConfig) -> Self {
        StrainCalculator { config }
    }

    /// Evaluate one sensor sample into a strain reading
    ///
    /// score = hr_weight * 100 * (HR - baseHR) / baseHR
    ///       + spo2_weight * 100 * (baseSpO2 - SpO2) / baseSpO2
    ///       + recovery_weight * 10 * delay_ms / 60000
    /// clamped to [0, 100].
    ///
    /// A sample with any missing field yields the zero-strain fallback
    /// reading rather than an error.
    pub fn evaluate(&self, sample: &StrainSample, now: DateTime<Utc>) -> LiveStrain {
        let (Some(raw_hr), Some(raw_baseline_hr), Some(raw_spo2), Some(raw_baseline_spo2), Some(raw_delay)) = (
            sample.current_hr,
            sample.baseline_hr,
            sample.current_spo2,
            sample.baseline_spo2,
            sample.recovery_delay_ms,
        ) else {
            return self.fallback(sample, now);
        };

        let mut estimated = false;

        let current_hr = self.clamp_hr(raw_hr, &mut estimated);
        let baseline_hr = self.clamp_hr(raw_baseline_hr, &mut estimated);
        let current_spo2 = self.clamp_spo2(raw_spo2, &mut estimated);
        let baseline_spo2 = self.clamp_spo2(raw_baseline_spo2, &mut estimated);
        let recovery_delay_ms = if raw_delay > self.config.max_recovery_delay_ms {
            estimated = true;
            self.config.max_recovery_delay_ms
        } else {
            raw_delay
        };

        let hundred = Decimal::from(100);

        let hr_term = self.config.hr_weight * hundred
            * (Decimal::from(current_hr) - Decimal::from(baseline_hr))
            / Decimal::from(baseline_hr);
        let spo2_term =
            self.config.spo2_weight * hundred * (baseline_spo2 - current_spo2) / baseline_spo2;
        let recovery_term = self.config.recovery_weight
            * Decimal::from(10)
            * Decimal::from(recovery_delay_ms)
            / Decimal::from(60_000);

        let strain_score = (hr_term + spo2_term + recovery_term).clamp(Decimal::ZERO, hundred);

        let status = if strain_score <= self.config.green_max {
            StrainStatus::Green
        } else if strain_score <= self.config.yellow_max {
            StrainStatus::Yellow
        } else {
            StrainStatus::Red
        };

        LiveStrain {
            current_hr: Some(current_hr),
            baseline_hr: Some(baseline_hr),
            current_spo2: Some(current_spo2),
            baseline_spo2: Some(baseline_spo2),
            recovery_delay_ms: Some(recovery_delay_ms),
            strain_score,
            status,
            is_estimated: estimated,
            timestamp: now,
        }
    }

    /// Zero-strain reading used whenever a sample is incomplete
    fn fallback(&self, sample: &StrainSample, now: DateTime<Utc>) -> LiveStrain {
        tracing::debug!(
            has_hr = sample.current_hr.is_some(),
            has_spo2 = sample.current_spo2.is_some(),
            "incomplete strain sample, using zero-strain fallback"
        );
        LiveStrain {
            current_hr: sample.current_hr,
            baseline_hr: sample.baseline_hr,
            current_spo2: sample.current_spo2,
            baseline_spo2: sample.baseline_spo2,
            recovery_delay_ms: sample.recovery_delay_ms,
            strain_score: Decimal::ZERO,
            status: StrainStatus::Green,
            is_estimated: true,
            timestamp: now,
        }
    }

    fn clamp_hr(&self, hr: u16, estimated: &mut bool) -> u16 {
        let (lo, hi) = self.config.hr_range;
        if hr < lo || hr > hi {
            *estimated = true;
            hr.clamp(lo, hi)
        } else {
            hr
        }
    }

    fn clamp_spo2(&self, spo2: Decimal, estimated: &mut bool) -> Decimal {
        let (lo, hi) = self.config.spo2_range;
        if spo2 < lo || spo2 > hi {
            *estimated = true;
            spo2.clamp(lo, hi)
        } else {
            spo2
        }
    }
}

impl Default for StrainCalculator {
    fn default() -> Self {
        Self::new()
    }
}
