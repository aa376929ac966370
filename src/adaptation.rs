//! Adaptation decision engine
//!
//! Evaluates live context, preference state, and the four-week adherence
//! summary into at most one adaptation action per trigger. Rules are
//! evaluated in strict priority order and the first match wins; the
//! safety rule is unconditional and checked before any adherence data is
//! consulted.
//!
//! The engine itself is a pure function of its inputs. The one permitted
//! side effect — incrementing a confirmed swap count — belongs to
//! [`AdaptationService`], which applies it atomically with the decision
//! it results from under a per-user lock, so a retried evaluation can
//! never double-increment.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::catalog::ExerciseCatalog;
use crate::coaching::{notify_best_effort, CoachingService};
use crate::error::AdaptError;
use crate::mesocycle::{MesocycleError, MesocycleSummary, MesocycleTracker};
use crate::models::{UserTrainingPreferences, WorkoutContext};
use crate::store::{MesocycleStore, PreferenceStore, UserLocks};
use std::sync::Arc;

/// The single adaptation action produced by one evaluation
///
/// A closed set of actions: callers must handle every kind explicitly.
/// `applied = false` means the action needs user confirmation before
/// taking effect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AdaptationResult {
    /// Heart rate above the user's maximum: extend the rest timer now
    IncreaseRest {
        exercise: String,
        reason: String,
        applied: bool,
    },
    /// Substitute an exercise the user keeps skipping
    SwapExercise {
        exercise: String,
        replacement_exercise: String,
        reason: String,
        applied: bool,
    },
    /// Repeated swaps exhausted: propose permanent exclusion
    BlacklistExercise {
        exercise: String,
        reason: String,
        applied: bool,
    },
    /// No suitable substitute exists: propose reducing volume instead
    VolumeAdjustment {
        exercise: String,
        reason: String,
        applied: bool,
    },
    /// Nothing to change
    NoAction,
}

impl AdaptationResult {
    /// Whether the action took effect without user confirmation
    pub fn applied(&self) -> bool {
        match self {
            AdaptationResult::IncreaseRest { applied, .. }
            | AdaptationResult::SwapExercise { applied, .. }
            | AdaptationResult::BlacklistExercise { applied, .. }
            | AdaptationResult::VolumeAdjustment { applied, .. } => *applied,
            AdaptationResult::NoAction => false,
        }
    }

    /// Short label for logs and coaching prompts
    pub fn kind_label(&self) -> &'static str {
        match self {
            AdaptationResult::IncreaseRest { .. } => "increase_rest",
            AdaptationResult::SwapExercise { .. } => "swap_exercise",
            AdaptationResult::BlacklistExercise { .. } => "blacklist_exercise",
            AdaptationResult::VolumeAdjustment { .. } => "volume_adjustment",
            AdaptationResult::NoAction => "no_action",
        }
    }
}

/// Decision thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdaptationConfig {
    /// Substitution fires below this 4-week average completion rate
    pub completion_cutoff: Decimal,

    /// Substitution requires the average success rate inside this band
    /// (inclusive on both ends)
    pub success_band_low: Decimal,
    pub success_band_high: Decimal,

    /// Substitution requires live HR below this fraction of max HR
    pub substitution_hr_fraction: Decimal,

    /// Swap count at which the next substitution becomes a blacklist
    /// proposal
    pub blacklist_threshold: u32,
}

impl Default for AdaptationConfig {
    fn default() -> Self {
        AdaptationConfig {
            completion_cutoff: dec!(0.50),
            success_band_low: dec!(0.60),
            success_band_high: dec!(0.80),
            substitution_hr_fraction: dec!(0.85),
            blacklist_threshold: 3,
        }
    }
}

/// Narrow seam over the mesocycle tracker: the engine only needs the
/// per-exercise summary, not the tracker itself
pub trait MesocycleSummaryProvider {
    fn summary(
        &self,
        user_id: &str,
        exercise: &str,
    ) -> Result<Option<MesocycleSummary>, MesocycleError>;
}

impl<S: MesocycleStore> MesocycleSummaryProvider for MesocycleTracker<S> {
    fn summary(
        &self,
        user_id: &str,
        exercise: &str,
    ) -> Result<Option<MesocycleSummary>, MesocycleError> {
        MesocycleTracker::summary(self, user_id, exercise)
    }
}

/// Stateless rule evaluator
pub struct AdaptationDecisionEngine {
    config: AdaptationConfig,
}

impl AdaptationDecisionEngine {
    pub fn new() -> Self {
        AdaptationDecisionEngine {
            config: AdaptationConfig::default(),
        }
    }

    pub fn with_config(config: AdaptationConfig) -> Self {
        AdaptationDecisionEngine { config }
    }

    /// Evaluate the rules in priority order; exactly one result is
    /// returned per evaluation
    pub fn evaluate(
        &self,
        context: &WorkoutContext,
        preferences: &UserTrainingPreferences,
        summary: Option<&MesocycleSummary>,
        catalog: &dyn ExerciseCatalog,
    ) -> AdaptationResult {
        // Rule 1 - safety. Unconditional: overrides all adherence data.
        if let (Some(hr), Some(max_hr)) = (context.heart_rate, preferences.max_heart_rate) {
            if hr > max_hr {
                return AdaptationResult::IncreaseRest {
                    exercise: context.exercise.clone(),
                    reason: format!("heart rate {hr} bpm above maximum {max_hr} bpm"),
                    applied: true,
                };
            }
        }

        // Rule 2 - blacklist escalation: a further swap would be the
        // third or later for this exercise.
        let swaps = preferences.swap_count(&context.exercise);
        if swaps + 1 >= self.config.blacklist_threshold {
            return AdaptationResult::BlacklistExercise {
                exercise: context.exercise.clone(),
                reason: format!("already swapped {swaps} times; proposing permanent exclusion"),
                applied: false,
            };
        }

        // Rule 3 - adherence-driven substitution.
        if let Some(summary) = summary {
            if self.substitution_applies(context, preferences, summary) {
                return self.substitute(context, preferences, summary, catalog);
            }
        }

        AdaptationResult::NoAction
    }

    fn substitution_applies(
        &self,
        context: &WorkoutContext,
        preferences: &UserTrainingPreferences,
        summary: &MesocycleSummary,
    ) -> bool {
        if !summary.covers_full_cycle() {
            return false;
        }
        if summary.avg_completion_rate >= self.config.completion_cutoff {
            return false;
        }
        if summary.avg_success_rate < self.config.success_band_low
            || summary.avg_success_rate > self.config.success_band_high
        {
            return false;
        }

        // The HR gate is a precondition: with no live reading or no
        // calibrated maximum it fails closed.
        match (context.heart_rate, preferences.max_heart_rate) {
            (Some(hr), Some(max_hr)) => {
                Decimal::from(hr)
                    < self.config.substitution_hr_fraction * Decimal::from(max_hr)
            }
            _ => false,
        }
    }

    fn substitute(
        &self,
        context: &WorkoutContext,
        preferences: &UserTrainingPreferences,
        summary: &MesocycleSummary,
        catalog: &dyn ExerciseCatalog,
    ) -> AdaptationResult {
        let exercise = &context.exercise;
        let reason = format!(
            "completion {:.0}% below cutoff with moderate success {:.0}%",
            summary.avg_completion_rate * Decimal::from(100),
            summary.avg_success_rate * Decimal::from(100),
        );

        let Some(group) = catalog.muscle_group(exercise) else {
            return AdaptationResult::VolumeAdjustment {
                exercise: exercise.clone(),
                reason: format!("{reason}; no muscle-group match available"),
                applied: false,
            };
        };

        // First match from the user's own ordered preference list
        let preferred = preferences.preferred_exercises.iter().find(|candidate| {
            candidate.as_str() != exercise.as_str()
                && !preferences.is_blacklisted(candidate)
                && catalog.muscle_group(candidate) == Some(group)
        });
        if let Some(replacement) = preferred {
            return AdaptationResult::SwapExercise {
                exercise: exercise.clone(),
                replacement_exercise: replacement.clone(),
                reason,
                applied: true,
            };
        }

        // General catalog fallback within the same muscle group
        let fallback = catalog
            .exercises_for(group)
            .into_iter()
            .find(|candidate| {
                candidate.as_str() != exercise.as_str() && !preferences.is_blacklisted(candidate)
            });
        if let Some(replacement) = fallback {
            return AdaptationResult::SwapExercise {
                exercise: exercise.clone(),
                replacement_exercise: replacement,
                reason,
                applied: true,
            };
        }

        AdaptationResult::VolumeAdjustment {
            exercise: exercise.clone(),
            reason: format!("{reason}; no same-group replacement found"),
            applied: false,
        }
    }
}

impl Default for AdaptationDecisionEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Applies adaptation decisions with their side effects
///
/// Owns the read-decide-write unit around the swap-count increment and
/// fires the coaching prompt best-effort. All work for one user is
/// serialized through a per-user lock so live evaluations cannot
/// interleave with the weekly rollover.
pub struct AdaptationService<P, M, C, K>
where
    P: PreferenceStore,
    M: MesocycleSummaryProvider,
    C: ExerciseCatalog,
    K: CoachingService,
{
    engine: AdaptationDecisionEngine,
    preferences: P,
    summaries: M,
    catalog: C,
    coach: K,
    locks: Arc<UserLocks>,
}

impl<P, M, C, K> AdaptationService<P, M, C, K>
where
    P: PreferenceStore,
    M: MesocycleSummaryProvider,
    C: ExerciseCatalog,
    K: CoachingService,
{
    pub fn new(
        engine: AdaptationDecisionEngine,
        preferences: P,
        summaries: M,
        catalog: C,
        coach: K,
    ) -> Self {
        Self::with_locks(
            engine,
            preferences,
            summaries,
            catalog,
            coach,
            Arc::new(UserLocks::new()),
        )
    }

    /// Share a lock map with the weekly rollover so live evaluations and
    /// rollovers for the same user never interleave
    pub fn with_locks(
        engine: AdaptationDecisionEngine,
        preferences: P,
        summaries: M,
        catalog: C,
        coach: K,
        locks: Arc<UserLocks>,
    ) -> Self {
        AdaptationService {
            engine,
            preferences,
            summaries,
            catalog,
            coach,
            locks,
        }
    }

    /// Evaluate one trigger and apply any auto-applied side effects
    ///
    /// Missing preferences fall back to no action rather than guessing.
    pub fn evaluate_and_apply(
        &self,
        context: &WorkoutContext,
    ) -> Result<AdaptationResult, AdaptError> {
        context.validate().map_err(AdaptError::Validation)?;

        let lock = self.locks.user_lock(&context.user_id);
        let _guard = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        let Some(mut preferences) = self.preferences.load(&context.user_id)? else {
            tracing::debug!(
                user_id = %context.user_id,
                "no preference record, skipping adaptation"
            );
            return Ok(AdaptationResult::NoAction);
        };

        let summary = self
            .summaries
            .summary(&context.user_id, &context.exercise)?;

        let result =
            self.engine
                .evaluate(context, &preferences, summary.as_ref(), &self.catalog);

        // The swap-count increment is part of the same unit of work as
        // the decision: both happen under the user lock or neither does.
        if let AdaptationResult::SwapExercise {
            exercise,
            applied: true,
            ..
        } = &result
        {
            preferences.record_swap(exercise);
            self.preferences.save(&context.user_id, &preferences)?;
        }

        if !matches!(result, AdaptationResult::NoAction) {
            tracing::info!(
                user_id = %context.user_id,
                action = result.kind_label(),
                applied = result.applied(),
                "adaptation decision"
            );
            notify_best_effort(&self.coach, &context.user_id, &result);
        }

        Ok(result)
    }
}
