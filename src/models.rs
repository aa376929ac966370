use chrono::{DateTime, Datelike, NaiveDate, Utc, Weekday};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Primary muscle groups used for exercise classification and
/// substitution matching
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MuscleGroup {
    Chest,
    Back,
    Shoulders,
    Biceps,
    Triceps,
    Quadriceps,
    Hamstrings,
    Glutes,
    Calves,
    Core,
}

impl fmt::Display for MuscleGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MuscleGroup::Chest => write!(f, "Chest"),
            MuscleGroup::Back => write!(f, "Back"),
            MuscleGroup::Shoulders => write!(f, "Shoulders"),
            MuscleGroup::Biceps => write!(f, "Biceps"),
            MuscleGroup::Triceps => write!(f, "Triceps"),
            MuscleGroup::Quadriceps => write!(f, "Quadriceps"),
            MuscleGroup::Hamstrings => write!(f, "Hamstrings"),
            MuscleGroup::Glutes => write!(f, "Glutes"),
            MuscleGroup::Calves => write!(f, "Calves"),
            MuscleGroup::Core => write!(f, "Core"),
        }
    }
}

/// Account kinds with different score-capping behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountKind {
    /// Regular user account; set scores are capped at 100
    Standard,
    /// Trainer account; set scores are left uncapped for review
    Trainer,
}

/// Per-user training preferences and substitution history
///
/// Mutated only by confirmed adaptation decisions; every mutation
/// refreshes `updated_at` so divergent copies can be reconciled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserTrainingPreferences {
    /// User this record belongs to
    pub user_id: String,

    /// Exercises permanently excluded from programming
    pub blacklisted_exercises: BTreeSet<String>,

    /// Ordered preference list consulted for substitutions (most
    /// preferred first)
    pub preferred_exercises: Vec<String>,

    /// Long-run success rate per exercise (0-1)
    pub success_rates: BTreeMap<String, Decimal>,

    /// Maximum heart rate in bpm; None until calibrated
    pub max_heart_rate: Option<u16>,

    /// Whether max heart rate came from a calibration session rather
    /// than an age-based estimate
    pub calibrated: bool,

    /// Age in years, used for fallback heart-rate estimation
    pub age: Option<u8>,

    /// Confirmed substitution count per exercise; never decremented
    pub exercise_swap_counts: BTreeMap<String, u32>,

    /// Last modification timestamp
    pub updated_at: DateTime<Utc>,
}

impl UserTrainingPreferences {
    /// Create an empty preference record for a user
    pub fn new(user_id: impl Into<String>) -> Self {
        UserTrainingPreferences {
            user_id: user_id.into(),
            blacklisted_exercises: BTreeSet::new(),
            preferred_exercises: Vec::new(),
            success_rates: BTreeMap::new(),
            max_heart_rate: None,
            calibrated: false,
            age: None,
            exercise_swap_counts: BTreeMap::new(),
            updated_at: Utc::now(),
        }
    }

    /// Number of confirmed swaps recorded for an exercise
    pub fn swap_count(&self, exercise: &str) -> u32 {
        self.exercise_swap_counts
            .get(exercise)
            .copied()
            .unwrap_or(0)
    }

    /// Record one confirmed substitution of an exercise
    pub fn record_swap(&mut self, exercise: &str) {
        *self
            .exercise_swap_counts
            .entry(exercise.to_string())
            .or_insert(0) += 1;
        self.updated_at = Utc::now();
    }

    pub fn is_blacklisted(&self, exercise: &str) -> bool {
        self.blacklisted_exercises.contains(exercise)
    }
}

/// Live workout context supplied at evaluation time
///
/// This is the fully-typed boundary form of what clients send with an
/// adaptation query; required fields are validated before the context
/// reaches the decision rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkoutContext {
    /// User performing the workout
    pub user_id: String,

    /// Exercise currently being performed
    pub exercise: String,

    /// Most recent live heart rate in bpm, if a sensor is attached
    pub heart_rate: Option<u16>,

    /// When this context was captured
    pub captured_at: DateTime<Utc>,
}

impl WorkoutContext {
    /// Validate required fields before the context enters the decision
    /// pipeline
    pub fn validate(&self) -> Result<(), String> {
        if self.user_id.trim().is_empty() {
            return Err("user_id must not be empty".to_string());
        }
        if self.exercise.trim().is_empty() {
            return Err("exercise must not be empty".to_string());
        }
        if let Some(hr) = self.heart_rate {
            if hr == 0 {
                return Err("heart_rate of 0 bpm is not a valid live reading".to_string());
            }
        }
        Ok(())
    }
}

/// Outcome of one completed (or skipped) exercise set
///
/// Appended to per-user weekly history as sets finish and folded into
/// completion/success rates at week rollover.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetOutcome {
    /// Identifier of the set within its workout
    pub set_id: String,

    /// Exercise the set belongs to
    pub exercise: String,

    /// Whether the set was actually performed (false = skipped)
    pub performed: bool,

    /// Whether the performed set met its rep/weight target
    pub success: bool,

    /// Completion (or skip) timestamp
    pub completed_at: DateTime<Utc>,
}

impl SetOutcome {
    /// Week this outcome accumulates into
    pub fn week_start(&self) -> NaiveDate {
        week_start(self.completed_at.date_naive())
    }
}

/// Monday of the week containing `date`; weekly records are keyed by
/// this date
pub fn week_start(date: NaiveDate) -> NaiveDate {
    let days_from_monday = date.weekday().num_days_from_monday();
    date - chrono::Days::new(u64::from(days_from_monday))
}

/// Monday of the previous (already finished) week relative to `date`
pub fn previous_week_start(date: NaiveDate) -> NaiveDate {
    week_start(date) - chrono::Days::new(7)
}

/// True if `date` falls on the weekly boundary day
pub fn is_week_boundary(date: NaiveDate) -> bool {
    date.weekday() == Weekday::Mon
}
