//! Per-set intensity scoring
//!
//! Combines movement-quality sub-scores (tempo adherence, motion
//! smoothness, rep consistency, user feedback) with the live strain
//! status into one bounded performance score per completed set.
//!
//! In contrast to the strain calculator, which clamps bad sensor data
//! and carries on, the scorer enforces a hard input contract: component
//! scores outside their documented ranges are rejected with a validation
//! error. Callers must not retry the same payload.
//!
//! ## Weighting
//!
//! raw = tempo*0.30 + smoothness*0.25 + consistency*0.20 + feedback*0.15
//! total = raw * (0.10 * strain_modifier + 0.90)
//!
//! The strain modifier discounts only the strain-weighted 10% slice of
//! the final value; the four component weights plus that slice sum to
//! exactly 1.0.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

use crate::models::AccountKind;

/// Set-score input contract violations
#[derive(Error, Debug)]
pub enum ScoreError {
    #[error("{component} score {value} outside allowed range [{min}, {max}]")]
    OutOfRange {
        component: &'static str,
        value: Decimal,
        min: Decimal,
        max: Decimal,
    },
    #[error("strain modifier {0} is not one of 0.85 / 0.95 / 1.00")]
    InvalidModifier(Decimal),
    #[error("time under tension {tut}ms does not equal phase sum {sum}ms")]
    TempoInvariant { tut: u32, sum: u32 },
}

/// Rep tempo expressed in seconds per phase, e.g. 3-1-2
/// (eccentric-pause-concentric)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TempoPattern {
    pub eccentric_s: u8,
    pub pause_s: u8,
    pub concentric_s: u8,
}

impl fmt::Display for TempoPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}-{}",
            self.eccentric_s, self.pause_s, self.concentric_s
        )
    }
}

/// Per-set movement timing data
///
/// Invariant: `time_under_tension_ms` always equals the sum of the three
/// phase durations; the constructor computes it and `validate` re-checks
/// records that crossed a serialization boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TempoData {
    /// Lifting phase duration in milliseconds
    pub concentric_ms: u32,

    /// Lowering phase duration in milliseconds
    pub eccentric_ms: u32,

    /// Pause duration in milliseconds
    pub pause_ms: u32,

    /// Total time under tension in milliseconds
    pub time_under_tension_ms: u32,

    /// Programmed tempo for the set
    pub target_tempo: TempoPattern,

    /// Tempo actually performed
    pub actual_tempo: TempoPattern,

    /// Movement smoothness sub-score (0-100)
    pub smoothness_score: Decimal,

    /// Rep-to-rep consistency sub-score (0-100)
    pub consistency_score: Decimal,
}

impl TempoData {
    /// Build tempo data from phase durations, computing time under
    /// tension and validating the sub-score ranges
    pub fn new(
        concentric_ms: u32,
        eccentric_ms: u32,
        pause_ms: u32,
        target_tempo: TempoPattern,
        actual_tempo: TempoPattern,
        smoothness_score: Decimal,
        consistency_score: Decimal,
    ) -> Result<Self, ScoreError> {
        check_range("smoothness", smoothness_score, dec!(0), dec!(100))?;
        check_range("consistency", consistency_score, dec!(0), dec!(100))?;

        Ok(TempoData {
            concentric_ms,
            eccentric_ms,
            pause_ms,
            time_under_tension_ms: concentric_ms + eccentric_ms + pause_ms,
            target_tempo,
            actual_tempo,
            smoothness_score,
            consistency_score,
        })
    }

    /// Re-check the time-under-tension invariant on a deserialized record
    pub fn validate(&self) -> Result<(), ScoreError> {
        let sum = self.concentric_ms + self.eccentric_ms + self.pause_ms;
        if sum != self.time_under_tension_ms {
            return Err(ScoreError::TempoInvariant {
                tut: self.time_under_tension_ms,
                sum,
            });
        }
        Ok(())
    }

    /// Tempo adherence score (0-100) from per-phase deviation between
    /// target and actual pattern: each second of deviation costs 10
    /// points.
    pub fn tempo_adherence_score(&self) -> Decimal {
        let deviation = self.actual_tempo.eccentric_s.abs_diff(self.target_tempo.eccentric_s)
            + self.actual_tempo.pause_s.abs_diff(self.target_tempo.pause_s)
            + self.actual_tempo.concentric_s.abs_diff(self.target_tempo.concentric_s);
        (Decimal::from(100) - Decimal::from(deviation) * Decimal::from(10))
            .max(Decimal::ZERO)
    }
}

/// Input for scoring one completed set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetCompletion {
    pub user_id: String,
    pub set_id: String,

    /// Tempo adherence score (0-100)
    pub tempo_score: Decimal,

    /// Motion smoothness score (0-100)
    pub motion_smoothness_score: Decimal,

    /// Rep consistency score (0-100)
    pub rep_consistency_score: Decimal,

    /// User feedback adjustment (-15 to +20)
    pub user_feedback_score: Decimal,

    /// Strain modifier from the live strain status at set completion
    pub strain_modifier: Decimal,

    /// True when any upstream input used a fallback value
    pub is_estimated: bool,
}

/// Persisted per-set performance score
///
/// Immutable once written; a corrected re-computation supersedes the
/// original under a fresh identity rather than mutating it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntensityScore {
    /// Identity of this score record
    pub id: Uuid,

    pub user_id: String,
    pub set_id: String,

    pub tempo_score: Decimal,
    pub motion_smoothness_score: Decimal,
    pub rep_consistency_score: Decimal,
    pub user_feedback_score: Decimal,

    /// Strain modifier in effect when the set completed
    pub strain_modifier: Decimal,

    /// Final blended score
    pub total_score: Decimal,

    /// True when any upstream input used a fallback value
    pub is_estimated: bool,

    /// True when the non-trainer cap branch was applied
    pub is_capped: bool,

    pub created_at: DateTime<Utc>,
}

/// Scoring weights; the four component weights plus the strain slice
/// must sum to 1.0
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringConfig {
    pub tempo_weight: Decimal,
    pub smoothness_weight: Decimal,
    pub consistency_weight: Decimal,
    pub feedback_weight: Decimal,

    /// Fraction of the final value subject to the strain modifier
    pub strain_slice: Decimal,

    /// Cap applied to non-trainer totals
    pub standard_cap: Decimal,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        ScoringConfig {
            tempo_weight: dec!(0.30),
            smoothness_weight: dec!(0.25),
            consistency_weight: dec!(0.20),
            feedback_weight: dec!(0.15),
            strain_slice: dec!(0.10),
            standard_cap: dec!(100),
        }
    }
}

impl ScoringConfig {
    /// Sum of the component weights plus the strain slice
    pub fn weight_total(&self) -> Decimal {
        self.tempo_weight
            + self.smoothness_weight
            + self.consistency_weight
            + self.feedback_weight
            + self.strain_slice
    }
}

/// Per-set intensity scoring engine
pub struct IntensityScorer {
    config: ScoringConfig,
}

impl IntensityScorer {
    pub fn new() -> Self {
        IntensityScorer {
            config: ScoringConfig::default(),
        }
    }

    pub fn with_config(config: ScoringConfig) -> Self {
        IntensityScorer { config }
    }

    /// Score one completed set
    ///
    /// Rejects out-of-range components instead of clamping them: an
    /// out-of-range component here is an upstream bug, not sensor noise.
    pub fn score_set(
        &self,
        completion: &SetCompletion,
        account: AccountKind,
    ) -> Result<IntensityScore, ScoreError> {
        self.validate(completion)?;

        let raw = completion.tempo_score * self.config.tempo_weight
            + completion.motion_smoothness_score * self.config.smoothness_weight
            + completion.rep_consistency_score * self.config.consistency_weight
            + completion.user_feedback_score * self.config.feedback_weight;

        // The modifier only discounts the strain-weighted slice
        let strain_factor = self.config.strain_slice * completion.strain_modifier
            + (Decimal::ONE - self.config.strain_slice);
        let uncapped = raw * strain_factor;

        let (total_score, is_capped) = match account {
            AccountKind::Standard => (uncapped.min(self.config.standard_cap), true),
            AccountKind::Trainer => (uncapped, false),
        };

        Ok(IntensityScore {
            id: Uuid::new_v4(),
            user_id: completion.user_id.clone(),
            set_id: completion.set_id.clone(),
            tempo_score: completion.tempo_score,
            motion_smoothness_score: completion.motion_smoothness_score,
            rep_consistency_score: completion.rep_consistency_score,
            user_feedback_score: completion.user_feedback_score,
            strain_modifier: completion.strain_modifier,
            total_score,
            is_estimated: completion.is_estimated,
            is_capped,
            created_at: Utc::now(),
        })
    }

    /// Re-score a set under a corrected payload
    ///
    /// The previous record stays untouched; the corrected score carries a
    /// new identity and supersedes it at the caller's persistence layer.
    pub fn supersede(
        &self,
        previous: &IntensityScore,
        corrected: &SetCompletion,
        account: AccountKind,
    ) -> Result<IntensityScore, ScoreError> {
        debug_assert_eq!(previous.set_id, corrected.set_id);
        let mut score = self.score_set(corrected, account)?;
        score.user_id = previous.user_id.clone();
        Ok(score)
    }

    fn validate(&self, completion: &SetCompletion) -> Result<(), ScoreError> {
        check_range("tempo", completion.tempo_score, dec!(0), dec!(100))?;
        check_range(
            "motion smoothness",
            completion.motion_smoothness_score,
            dec!(0),
            dec!(100),
        )?;
        check_range(
            "rep consistency",
            completion.rep_consistency_score,
            dec!(0),
            dec!(100),
        )?;
        check_range(
            "user feedback",
            completion.user_feedback_score,
            dec!(-15),
            dec!(20),
        )?;

        let m = completion.strain_modifier;
        if m != dec!(0.85) && m != dec!(0.95) && m != dec!(1.00) {
            return Err(ScoreError::InvalidModifier(m));
        }
        Ok(())
    }
}

impl Default for IntensityScorer {
    fn default() -> Self {
        Self::new()
    }
}

fn check_range(
    component: &'static str,
    value: Decimal,
    min: Decimal,
    max: Decimal,
) -> Result<(), ScoreError> {
    if value < min || value > max {
        return Err(ScoreError::OutOfRange {
            component,
            value,
            min,
            max,
        });
    }
    Ok(())
}
