//! Mesocycle tracking
//!
//! A mesocycle is a fixed four-week training block used as the unit of
//! adherence and progression evaluation. The tracker accumulates
//! per-exercise completion and success rates week by week, marks cycle
//! completion when the fourth week lands, and rotates the next scheduled
//! progression type.
//!
//! The tracker holds no process-wide state: per-user cycle records live
//! behind the injected [`MesocycleStore`] repository, and every
//! operation is a load-modify-save over one user's record. Week
//! submission is idempotent per week number so a retried rollover leaves
//! stored state unchanged.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

use crate::models::SetOutcome;
use crate::store::{MesocycleStore, StoreError};

/// Mesocycle tracking errors
#[derive(Error, Debug)]
pub enum MesocycleError {
    #[error("week number {0} outside the cycle range 1..=4")]
    InvalidWeekNumber(u8),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Scheduled progression applied when a new cycle begins
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProgressionType {
    /// Add one working set per exercise
    AddSet,
    /// Add one rep per working set
    AddRep,
    /// Increase total weekly volume
    AddVolume,
}

impl ProgressionType {
    /// Cyclic rotation: add_set -> add_rep -> add_volume -> add_set
    pub fn next(&self) -> Self {
        match self {
            ProgressionType::AddSet => ProgressionType::AddRep,
            ProgressionType::AddRep => ProgressionType::AddVolume,
            ProgressionType::AddVolume => ProgressionType::AddSet,
        }
    }
}

impl fmt::Display for ProgressionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProgressionType::AddSet => write!(f, "add set"),
            ProgressionType::AddRep => write!(f, "add rep"),
            ProgressionType::AddVolume => write!(f, "add volume"),
        }
    }
}

/// Planned set counts per exercise for one training week
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeekPlan {
    /// Monday of the planned week
    pub week_start: NaiveDate,

    /// Planned working sets per exercise
    pub planned_sets: BTreeMap<String, u32>,
}

/// One recorded week within a mesocycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MesocycleWeek {
    /// Position within the cycle (1-4)
    pub week_number: u8,

    /// Progression scheduled for this week
    pub progression_type: ProgressionType,

    /// Fraction of planned sets performed, per exercise (0-1)
    pub exercise_completion_rates: BTreeMap<String, Decimal>,

    /// Fraction of performed sets meeting their target, per exercise (0-1)
    pub success_rates: BTreeMap<String, Decimal>,

    /// True once the week's rollover has been applied
    pub implemented: bool,

    /// Monday of the recorded week
    pub date: NaiveDate,

    /// Last modification timestamp, used for sync reconciliation
    pub updated_at: DateTime<Utc>,
}

/// One user's active training block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mesocycle {
    pub user_id: String,

    /// Recorded weeks of the current cycle, at most one per week number
    pub weeks: Vec<MesocycleWeek>,

    /// Number of fully completed four-week cycles
    pub completed_cycles: u32,

    /// Progression scheduled for the next cycle
    pub next_progression: ProgressionType,
}

impl Mesocycle {
    pub fn new(user_id: impl Into<String>) -> Self {
        Mesocycle {
            user_id: user_id.into(),
            weeks: Vec::new(),
            completed_cycles: 0,
            next_progression: ProgressionType::AddSet,
        }
    }

    /// A cycle is complete only when all four weeks are implemented
    pub fn is_complete(&self) -> bool {
        self.weeks.iter().filter(|w| w.implemented).count() >= WEEKS_PER_CYCLE as usize
    }

    pub fn week(&self, week_number: u8) -> Option<&MesocycleWeek> {
        self.weeks.iter().find(|w| w.week_number == week_number)
    }

    fn latest_week_date(&self) -> Option<NaiveDate> {
        self.weeks.iter().map(|w| w.date).max()
    }
}

/// Weeks per training block; the cycle length is fixed
pub const WEEKS_PER_CYCLE: u8 = 4;

/// Four-week adherence summary for one exercise
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MesocycleSummary {
    pub exercise: String,

    /// Average completion rate across observed weeks (0-1)
    pub avg_completion_rate: Decimal,

    /// Average success rate across observed weeks (0-1)
    pub avg_success_rate: Decimal,

    /// Implemented weeks contributing completion data
    pub weeks_observed: u8,
}

impl MesocycleSummary {
    /// True when the summary covers a full cycle of data
    pub fn covers_full_cycle(&self) -> bool {
        self.weeks_observed >= WEEKS_PER_CYCLE
    }
}

/// Folds per-set outcomes into one week's completion and success rates
///
/// Completion is measured against the week plan; an exercise performed
/// without a plan entry counts as fully completed since the number of
/// skipped sets is unknowable.
#[derive(Debug, Default)]
pub struct WeekAccumulator {
    planned: BTreeMap<String, u32>,
    performed: BTreeMap<String, u32>,
    successful: BTreeMap<String, u32>,
}

impl WeekAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_plan(plan: &WeekPlan) -> Self {
        WeekAccumulator {
            planned: plan.planned_sets.clone(),
            performed: BTreeMap::new(),
            successful: BTreeMap::new(),
        }
    }

    pub fn record_outcome(&mut self, outcome: &SetOutcome) {
        if !outcome.performed {
            return;
        }
        *self
            .performed
            .entry(outcome.exercise.clone())
            .or_insert(0) += 1;
        if outcome.success {
            *self
                .successful
                .entry(outcome.exercise.clone())
                .or_insert(0) += 1;
        }
    }

    /// Produce the implemented week record
    pub fn into_week(
        self,
        week_number: u8,
        progression_type: ProgressionType,
        date: NaiveDate,
    ) -> MesocycleWeek {
        let mut completion = BTreeMap::new();
        let mut success = BTreeMap::new();

        let mut exercises: Vec<&String> = self.planned.keys().collect();
        for exercise in self.performed.keys() {
            if !self.planned.contains_key(exercise) {
                exercises.push(exercise);
            }
        }

        for exercise in exercises {
            let performed = self.performed.get(exercise).copied().unwrap_or(0);
            let planned = self
                .planned
                .get(exercise)
                .copied()
                .unwrap_or(performed)
                .max(performed);

            let rate = if planned == 0 {
                Decimal::ZERO
            } else {
                Decimal::from(performed) / Decimal::from(planned)
            };
            completion.insert(exercise.clone(), rate);

            if performed > 0 {
                let successful = self.successful.get(exercise).copied().unwrap_or(0);
                success.insert(
                    exercise.clone(),
                    Decimal::from(successful) / Decimal::from(performed),
                );
            }
        }

        MesocycleWeek {
            week_number,
            progression_type,
            exercise_completion_rates: completion,
            success_rates: success,
            implemented: true,
            date,
            updated_at: Utc::now(),
        }
    }
}

/// Per-user mesocycle state machine over an injected repository
pub struct MesocycleTracker<S: MesocycleStore> {
    store: S,
}

impl<S: MesocycleStore> MesocycleTracker<S> {
    pub fn new(store: S) -> Self {
        MesocycleTracker { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Record (or re-record) one week of a user's cycle
    ///
    /// Idempotent per week number: re-submitting a week overwrites the
    /// stored record in place. The first submission that completes the
    /// fourth week increments `completed_cycles` and rotates
    /// `next_progression`; a genuinely new week after completion starts
    /// the next cycle.
    pub fn record_week(
        &self,
        user_id: &str,
        week: MesocycleWeek,
    ) -> Result<Mesocycle, MesocycleError> {
        if week.week_number == 0 || week.week_number > WEEKS_PER_CYCLE {
            return Err(MesocycleError::InvalidWeekNumber(week.week_number));
        }

        let mut cycle = self
            .store
            .load_cycle(user_id)?
            .unwrap_or_else(|| Mesocycle::new(user_id));

        if cycle.is_complete() {
            let resubmission = cycle
                .week(week.week_number)
                .map(|existing| existing.date == week.date)
                .unwrap_or(false);
            let newer = cycle
                .latest_week_date()
                .map(|latest| week.date > latest)
                .unwrap_or(true);

            if !resubmission && newer {
                // A week beyond the completed block begins the next cycle
                cycle.weeks.clear();
            }
        }

        let was_complete = cycle.is_complete();

        match cycle
            .weeks
            .iter()
            .position(|w| w.week_number == week.week_number)
        {
            Some(index) => cycle.weeks[index] = week,
            None => cycle.weeks.push(week),
        }
        cycle.weeks.sort_by_key(|w| w.week_number);

        if !was_complete && cycle.is_complete() {
            cycle.completed_cycles += 1;
            cycle.next_progression = cycle.next_progression.next();
            tracing::info!(
                user_id,
                completed_cycles = cycle.completed_cycles,
                next_progression = %cycle.next_progression,
                "mesocycle completed"
            );
        }

        self.store.save_cycle(user_id, &cycle)?;
        Ok(cycle)
    }

    /// Four-week average completion and success rates for one exercise
    ///
    /// Averages over the implemented weeks that carry data for the
    /// exercise; returns None when no implemented week does.
    pub fn summary(
        &self,
        user_id: &str,
        exercise: &str,
    ) -> Result<Option<MesocycleSummary>, MesocycleError> {
        let Some(cycle) = self.store.load_cycle(user_id)? else {
            return Ok(None);
        };

        let mut completion_sum = Decimal::ZERO;
        let mut completion_weeks = 0u8;
        let mut success_sum = Decimal::ZERO;
        let mut success_weeks = 0u8;

        for week in cycle.weeks.iter().filter(|w| w.implemented) {
            if let Some(rate) = week.exercise_completion_rates.get(exercise) {
                completion_sum += *rate;
                completion_weeks += 1;
            }
            if let Some(rate) = week.success_rates.get(exercise) {
                success_sum += *rate;
                success_weeks += 1;
            }
        }

        if completion_weeks == 0 {
            return Ok(None);
        }

        Ok(Some(MesocycleSummary {
            exercise: exercise.to_string(),
            avg_completion_rate: completion_sum / Decimal::from(completion_weeks),
            avg_success_rate: if success_weeks == 0 {
                Decimal::ZERO
            } else {
                success_sum / Decimal::from(success_weeks)
            },
            weeks_observed: completion_weeks,
        }))
    }

    pub fn is_cycle_complete(&self, user_id: &str) -> Result<bool, MesocycleError> {
        Ok(self
            .store
            .load_cycle(user_id)?
            .map(|c| c.is_complete())
            .unwrap_or(false))
    }

    /// Clear all weeks and restart at week 1
    ///
    /// Administrative/test-fixture operation; the engine never resets a
    /// cycle on its own.
    pub fn reset(&self, user_id: &str) -> Result<(), MesocycleError> {
        self.store.save_cycle(user_id, &Mesocycle::new(user_id))?;
        Ok(())
    }
}
