//! Scheduled batch entry points
//!
//! Two idempotent jobs run on the weekly schedule: the primary rollover,
//! which folds the finished week's set outcomes into each user's
//! mesocycle, and a cleanup pass that purges history older than the
//! retention window. Both take nothing beyond the current time, so a
//! scheduler retry after a timeout simply re-invokes them.
//!
//! Rollover failures are per-user: a user whose store write keeps
//! failing after bounded retries is surfaced in the run report with the
//! week left unimplemented, and the next scheduled run picks it up
//! again. Nothing is partially written.

use chrono::{DateTime, NaiveDate, Utc};
use indicatif::ProgressBar;
use rayon::prelude::*;
use std::sync::Arc;
use std::time::Duration;

use crate::mesocycle::{
    MesocycleError, MesocycleTracker, ProgressionType, WeekAccumulator, WEEKS_PER_CYCLE,
};
use crate::models::previous_week_start;
use crate::store::{HistoryStore, MesocycleStore, UserLocks};

/// Bounded retry with exponential backoff
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct RetryPolicy {
    /// Total attempts including the first
    pub max_attempts: u32,

    /// Delay before the first retry; doubles per attempt
    pub base_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 3,
            base_delay_ms: 250,
        }
    }
}

impl RetryPolicy {
    /// Run an operation under this policy, retrying only errors the
    /// predicate deems transient
    pub fn run<T, E: std::fmt::Display>(
        &self,
        label: &str,
        is_retryable: impl Fn(&E) -> bool,
        mut operation: impl FnMut() -> Result<T, E>,
    ) -> Result<T, E> {
        let mut attempt = 1;
        loop {
            match operation() {
                Ok(value) => return Ok(value),
                Err(e) if attempt < self.max_attempts && is_retryable(&e) => {
                    let delay = self.base_delay_ms << (attempt - 1);
                    tracing::warn!(
                        label,
                        attempt,
                        delay_ms = delay,
                        error = %e,
                        "operation failed, retrying"
                    );
                    std::thread::sleep(Duration::from_millis(delay));
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// One user's rollover failure
#[derive(Debug, Clone)]
pub struct RolloverFailure {
    pub user_id: String,
    pub week_start: NaiveDate,
    pub error: String,
}

/// Summary of one weekly rollover run
#[derive(Debug, Clone, Default)]
pub struct RolloverReport {
    pub week_start: Option<NaiveDate>,
    pub users_processed: usize,
    pub weeks_recorded: usize,
    pub users_skipped: usize,
    pub failures: Vec<RolloverFailure>,
}

impl RolloverReport {
    pub fn print_summary(&self) {
        if let Some(week) = self.week_start {
            println!("Weekly rollover for week of {week}");
        }
        println!("  Users processed: {}", self.users_processed);
        println!("  Weeks recorded:  {}", self.weeks_recorded);
        println!("  Users skipped:   {}", self.users_skipped);
        if self.failures.is_empty() {
            println!("  No failures");
        } else {
            println!("  Failures: {}", self.failures.len());
            for failure in &self.failures {
                println!("    {} ({}): {}", failure.user_id, failure.week_start, failure.error);
            }
        }
    }
}

/// Summary of one cleanup run
#[derive(Debug, Clone, Default)]
pub struct CleanupReport {
    pub cutoff: Option<NaiveDate>,
    pub records_purged: usize,
}

impl CleanupReport {
    pub fn print_summary(&self) {
        if let Some(cutoff) = self.cutoff {
            println!("History cleanup before {cutoff}");
        }
        println!("  Records purged: {}", self.records_purged);
    }
}

/// Primary weekly job: fold the finished week into each user's cycle
pub struct WeeklyRollover<H, S>
where
    H: HistoryStore,
    S: MesocycleStore,
{
    history: H,
    tracker: MesocycleTracker<S>,
    locks: Arc<UserLocks>,
    policy: RetryPolicy,
    show_progress: bool,
}

impl<H, S> WeeklyRollover<H, S>
where
    H: HistoryStore,
    S: MesocycleStore,
{
    pub fn new(
        history: H,
        tracker: MesocycleTracker<S>,
        locks: Arc<UserLocks>,
        policy: RetryPolicy,
    ) -> Self {
        WeeklyRollover {
            history,
            tracker,
            locks,
            policy,
            show_progress: false,
        }
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// Roll over the most recently finished week for every user
    ///
    /// Idempotent: a retried run re-records the same week records and
    /// leaves stored state unchanged.
    pub fn run(&self, now: DateTime<Utc>) -> Result<RolloverReport, MesocycleError> {
        let target_week = previous_week_start(now.date_naive());
        tracing::info!(week_start = %target_week, "starting weekly rollover");

        let users = self.history.user_ids()?;
        let progress = if self.show_progress {
            Some(ProgressBar::new(users.len() as u64))
        } else {
            None
        };

        let results: Vec<UserRollover> = users
            .par_iter()
            .map(|user_id| {
                let result = self.roll_user(user_id, target_week);
                if let Some(bar) = &progress {
                    bar.inc(1);
                }
                result
            })
            .collect();

        if let Some(bar) = progress {
            bar.finish_and_clear();
        }

        let mut report = RolloverReport {
            week_start: Some(target_week),
            users_processed: users.len(),
            ..RolloverReport::default()
        };
        for result in results {
            match result {
                UserRollover::Recorded => report.weeks_recorded += 1,
                UserRollover::Skipped => report.users_skipped += 1,
                UserRollover::Failed(failure) => report.failures.push(failure),
            }
        }

        tracing::info!(
            recorded = report.weeks_recorded,
            skipped = report.users_skipped,
            failed = report.failures.len(),
            "weekly rollover finished"
        );
        Ok(report)
    }

    fn roll_user(&self, user_id: &str, target_week: NaiveDate) -> UserRollover {
        let lock = self.locks.user_lock(user_id);
        let _guard = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        let attempt = self.policy.run(
            "weekly_rollover",
            |e: &MesocycleError| matches!(e, MesocycleError::Store(s) if s.is_retryable()),
            || self.roll_user_once(user_id, target_week),
        );

        match attempt {
            Ok(recorded) => {
                if recorded {
                    UserRollover::Recorded
                } else {
                    UserRollover::Skipped
                }
            }
            Err(e) => {
                // The week stays unimplemented; the next scheduled run
                // retries it instead of silently skipping.
                tracing::error!(user_id, week_start = %target_week, error = %e, "rollover failed");
                UserRollover::Failed(RolloverFailure {
                    user_id: user_id.to_string(),
                    week_start: target_week,
                    error: e.to_string(),
                })
            }
        }
    }

    fn roll_user_once(
        &self,
        user_id: &str,
        target_week: NaiveDate,
    ) -> Result<bool, MesocycleError> {
        let outcomes = self.history.set_outcomes(user_id, target_week)?;
        let plan = self.history.week_plan(user_id, target_week)?;

        if outcomes.is_empty() && plan.is_none() {
            return Ok(false);
        }

        let (week_number, progression) = self.position_for(user_id, target_week)?;

        let mut accumulator = match &plan {
            Some(plan) => WeekAccumulator::with_plan(plan),
            None => WeekAccumulator::new(),
        };
        for outcome in &outcomes {
            accumulator.record_outcome(outcome);
        }

        let week = accumulator.into_week(week_number, progression, target_week);
        self.tracker.record_week(user_id, week)?;
        Ok(true)
    }

    /// Cycle position of the target week for a user
    ///
    /// A retried run finds the already-recorded week by date and reuses
    /// its number; otherwise the week extends the open cycle, or starts
    /// a new one after a completed block.
    fn position_for(
        &self,
        user_id: &str,
        target_week: NaiveDate,
    ) -> Result<(u8, ProgressionType), MesocycleError> {
        let Some(cycle) = self.tracker.store().load_cycle(user_id)? else {
            return Ok((1, ProgressionType::AddSet));
        };

        if let Some(existing) = cycle.weeks.iter().find(|w| w.date == target_week) {
            return Ok((existing.week_number, existing.progression_type));
        }

        if cycle.is_complete() {
            return Ok((1, cycle.next_progression));
        }

        let next = cycle
            .weeks
            .iter()
            .map(|w| w.week_number)
            .max()
            .unwrap_or(0)
            + 1;
        Ok((next.min(WEEKS_PER_CYCLE), cycle.next_progression))
    }
}

enum UserRollover {
    Recorded,
    Skipped,
    Failed(RolloverFailure),
}

/// Secondary weekly job: purge history older than the retention window
pub struct HistoryCleanup<H: HistoryStore> {
    history: H,
    retention_days: u16,
    policy: RetryPolicy,
}

impl<H: HistoryStore> HistoryCleanup<H> {
    pub fn new(history: H, retention_days: u16, policy: RetryPolicy) -> Self {
        HistoryCleanup {
            history,
            retention_days,
            policy,
        }
    }

    pub fn run(&self, now: DateTime<Utc>) -> Result<CleanupReport, MesocycleError> {
        let cutoff = now.date_naive() - chrono::Days::new(u64::from(self.retention_days));
        tracing::info!(%cutoff, "starting history cleanup");

        let purged = self.policy.run(
            "history_cleanup",
            |e: &crate::store::StoreError| e.is_retryable(),
            || self.history.purge_before(cutoff),
        )?;

        tracing::info!(purged, "history cleanup finished");
        Ok(CleanupReport {
            cutoff: Some(cutoff),
            records_purged: purged,
        })
    }
}
