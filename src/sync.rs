//! Reconciliation of divergent record versions
//!
//! Disconnected clients can produce two copies of the same logical
//! record. Resolution is field-level: scalar fields go to the last
//! writer by timestamp, accumulation counters merge by element-wise
//! maximum (a swap count must never regress), and set-valued
//! accumulations merge by union. Divergence not covered by one of those
//! rules is surfaced as explicit conflict fields for caller-level
//! resolution — the resolver never guesses.
//!
//! Resolution is a pure function of its two inputs and is idempotent, so
//! a network retry resubmitting the same conflict is harmless.

use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

use crate::intensity::IntensityScore;
use crate::mesocycle::MesocycleWeek;
use crate::models::UserTrainingPreferences;

/// Merge errors: the two inputs are not versions of the same record
#[derive(Debug, Error)]
pub enum MergeError {
    #[error("records disagree on {field}: {local} vs {remote}")]
    KeyMismatch {
        field: &'static str,
        local: String,
        remote: String,
    },
}

/// One field the merge rules could not resolve
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConflictField {
    /// Field path, e.g. "success_rates.squat"
    pub field: String,
    pub local: Value,
    pub remote: Value,
}

impl ConflictField {
    fn new(field: impl Into<String>, local: &impl Serialize, remote: &impl Serialize) -> Self {
        ConflictField {
            field: field.into(),
            local: serde_json::to_value(local).unwrap_or(Value::Null),
            remote: serde_json::to_value(remote).unwrap_or(Value::Null),
        }
    }
}

/// Merge result: the reconciled record plus any unresolved fields
///
/// When `conflicts` is non-empty the merged record keeps the local value
/// for those fields; the caller owns the final say.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome<T> {
    pub merged: T,
    pub conflicts: Vec<ConflictField>,
}

impl<T> MergeOutcome<T> {
    pub fn is_clean(&self) -> bool {
        self.conflicts.is_empty()
    }
}

/// Field-level record reconciliation
pub struct ConflictResolver;

impl ConflictResolver {
    /// Merge two versions of a user's training preferences
    pub fn merge_preferences(
        local: &UserTrainingPreferences,
        remote: &UserTrainingPreferences,
    ) -> Result<MergeOutcome<UserTrainingPreferences>, MergeError> {
        if local.user_id != remote.user_id {
            return Err(MergeError::KeyMismatch {
                field: "user_id",
                local: local.user_id.clone(),
                remote: remote.user_id.clone(),
            });
        }

        let mut conflicts = Vec::new();
        let local_newer = local.updated_at >= remote.updated_at;
        let (newer, older) = if local_newer {
            (local, remote)
        } else {
            (remote, local)
        };

        let mut merged = newer.clone();

        // Accumulation counters: element-wise maximum, never regress
        merged.exercise_swap_counts =
            merge_counts(&local.exercise_swap_counts, &remote.exercise_swap_counts);

        // Set-valued accumulation: union
        merged.blacklisted_exercises = local
            .blacklisted_exercises
            .union(&remote.blacklisted_exercises)
            .cloned()
            .collect();

        // Per-key scalars: last writer wins, keys known only to the
        // older copy are retained
        for (exercise, rate) in &older.success_rates {
            merged
                .success_rates
                .entry(exercise.clone())
                .or_insert(*rate);
        }

        // Scalar fields already follow the newer copy; equal timestamps
        // with diverging values cannot be ordered and are surfaced
        if local.updated_at == remote.updated_at {
            if local.max_heart_rate != remote.max_heart_rate {
                conflicts.push(ConflictField::new(
                    "max_heart_rate",
                    &local.max_heart_rate,
                    &remote.max_heart_rate,
                ));
                merged.max_heart_rate = local.max_heart_rate;
            }
            if local.calibrated != remote.calibrated {
                conflicts.push(ConflictField::new(
                    "calibrated",
                    &local.calibrated,
                    &remote.calibrated,
                ));
                merged.calibrated = local.calibrated;
            }
            if local.age != remote.age {
                conflicts.push(ConflictField::new("age", &local.age, &remote.age));
                merged.age = local.age;
            }
            if local.preferred_exercises != remote.preferred_exercises {
                conflicts.push(ConflictField::new(
                    "preferred_exercises",
                    &local.preferred_exercises,
                    &remote.preferred_exercises,
                ));
                merged.preferred_exercises = local.preferred_exercises.clone();
            }
            for (exercise, local_rate) in &local.success_rates {
                if let Some(remote_rate) = remote.success_rates.get(exercise) {
                    if local_rate != remote_rate {
                        conflicts.push(ConflictField::new(
                            format!("success_rates.{exercise}"),
                            local_rate,
                            remote_rate,
                        ));
                        merged
                            .success_rates
                            .insert(exercise.clone(), *local_rate);
                    }
                }
            }
        }

        merged.updated_at = local.updated_at.max(remote.updated_at);

        Ok(MergeOutcome { merged, conflicts })
    }

    /// Merge two versions of one recorded mesocycle week
    pub fn merge_week(
        local: &MesocycleWeek,
        remote: &MesocycleWeek,
    ) -> Result<MergeOutcome<MesocycleWeek>, MergeError> {
        if local.week_number != remote.week_number {
            return Err(MergeError::KeyMismatch {
                field: "week_number",
                local: local.week_number.to_string(),
                remote: remote.week_number.to_string(),
            });
        }
        if local.date != remote.date {
            return Err(MergeError::KeyMismatch {
                field: "date",
                local: local.date.to_string(),
                remote: remote.date.to_string(),
            });
        }

        let mut conflicts = Vec::new();
        let (newer, _) = if local.updated_at >= remote.updated_at {
            (local, remote)
        } else {
            (remote, local)
        };
        let mut merged = newer.clone();

        // Implementation is an accumulation: once a rollover lands on
        // either side it must not be undone by the merge
        merged.implemented = local.implemented || remote.implemented;

        if local.updated_at == remote.updated_at {
            if local.exercise_completion_rates != remote.exercise_completion_rates {
                conflicts.push(ConflictField::new(
                    "exercise_completion_rates",
                    &local.exercise_completion_rates,
                    &remote.exercise_completion_rates,
                ));
                merged.exercise_completion_rates = local.exercise_completion_rates.clone();
            }
            if local.success_rates != remote.success_rates {
                conflicts.push(ConflictField::new(
                    "success_rates",
                    &local.success_rates,
                    &remote.success_rates,
                ));
                merged.success_rates = local.success_rates.clone();
            }
            if local.progression_type != remote.progression_type {
                conflicts.push(ConflictField::new(
                    "progression_type",
                    &local.progression_type,
                    &remote.progression_type,
                ));
                merged.progression_type = local.progression_type;
            }
        }

        merged.updated_at = local.updated_at.max(remote.updated_at);

        Ok(MergeOutcome { merged, conflicts })
    }

    /// Merge two versions of one set's intensity score
    ///
    /// Scores are immutable; a corrected re-computation carries a newer
    /// `created_at`, so the newer version wins whole. Two copies with the
    /// same timestamp but different values cannot be ordered.
    pub fn merge_score(
        local: &IntensityScore,
        remote: &IntensityScore,
    ) -> Result<MergeOutcome<IntensityScore>, MergeError> {
        if local.set_id != remote.set_id {
            return Err(MergeError::KeyMismatch {
                field: "set_id",
                local: local.set_id.clone(),
                remote: remote.set_id.clone(),
            });
        }
        if local.user_id != remote.user_id {
            return Err(MergeError::KeyMismatch {
                field: "user_id",
                local: local.user_id.clone(),
                remote: remote.user_id.clone(),
            });
        }

        let mut conflicts = Vec::new();
        let merged = if local.created_at > remote.created_at {
            local.clone()
        } else if remote.created_at > local.created_at {
            remote.clone()
        } else {
            if local.total_score != remote.total_score {
                conflicts.push(ConflictField::new(
                    "total_score",
                    &local.total_score,
                    &remote.total_score,
                ));
            }
            if local.strain_modifier != remote.strain_modifier {
                conflicts.push(ConflictField::new(
                    "strain_modifier",
                    &local.strain_modifier,
                    &remote.strain_modifier,
                ));
            }
            if local.is_estimated != remote.is_estimated {
                conflicts.push(ConflictField::new(
                    "is_estimated",
                    &local.is_estimated,
                    &remote.is_estimated,
                ));
            }
            local.clone()
        };

        Ok(MergeOutcome { merged, conflicts })
    }
}

/// Element-wise maximum over the union of counter keys
fn merge_counts(
    local: &BTreeMap<String, u32>,
    remote: &BTreeMap<String, u32>,
) -> BTreeMap<String, u32> {
    let mut merged = local.clone();
    for (key, remote_count) in remote {
        merged
            .entry(key.clone())
            .and_modify(|count| *count = (*count).max(*remote_count))
            .or_insert(*remote_count);
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesocycle::ProgressionType;
    use chrono::{Duration, Utc};
    use rust_decimal_macros::dec;

    fn prefs_at(offset_secs: i64) -> UserTrainingPreferences {
        let mut prefs = UserTrainingPreferences::new("user-1");
        prefs.max_heart_rate = Some(161);
        prefs.updated_at = Utc::now() + Duration::seconds(offset_secs);
        prefs
    }

    #[test]
    fn test_swap_counts_merge_by_maximum() {
        let mut local = prefs_at(0);
        local.exercise_swap_counts.insert("squat".to_string(), 2);
        local.exercise_swap_counts.insert("deadlift".to_string(), 1);

        let mut remote = prefs_at(5);
        remote.exercise_swap_counts.insert("squat".to_string(), 1);
        remote
            .exercise_swap_counts
            .insert("bench press".to_string(), 3);

        let outcome = ConflictResolver::merge_preferences(&local, &remote).unwrap();
        let counts = &outcome.merged.exercise_swap_counts;

        assert_eq!(counts.get("squat"), Some(&2));
        assert_eq!(counts.get("deadlift"), Some(&1));
        assert_eq!(counts.get("bench press"), Some(&3));

        // Never lower than either input
        for (key, merged_count) in counts {
            let l = local.exercise_swap_counts.get(key).copied().unwrap_or(0);
            let r = remote.exercise_swap_counts.get(key).copied().unwrap_or(0);
            assert!(*merged_count >= l.max(r));
        }
    }

    #[test]
    fn test_scalars_last_writer_wins() {
        let mut local = prefs_at(0);
        local.max_heart_rate = Some(161);

        let mut remote = prefs_at(60);
        remote.max_heart_rate = Some(158);

        let outcome = ConflictResolver::merge_preferences(&local, &remote).unwrap();
        assert!(outcome.is_clean());
        assert_eq!(outcome.merged.max_heart_rate, Some(158));
        assert_eq!(outcome.merged.updated_at, remote.updated_at);
    }

    #[test]
    fn test_blacklist_union() {
        let mut local = prefs_at(0);
        local.blacklisted_exercises.insert("deadlift".to_string());

        let mut remote = prefs_at(5);
        remote.blacklisted_exercises.insert("squat".to_string());

        let outcome = ConflictResolver::merge_preferences(&local, &remote).unwrap();
        assert!(outcome.merged.is_blacklisted("deadlift"));
        assert!(outcome.merged.is_blacklisted("squat"));
    }

    #[test]
    fn test_equal_timestamp_divergence_surfaces_conflict() {
        let base = prefs_at(0);
        let mut local = base.clone();
        local.max_heart_rate = Some(161);
        let mut remote = base;
        remote.max_heart_rate = Some(150);

        let outcome = ConflictResolver::merge_preferences(&local, &remote).unwrap();
        assert_eq!(outcome.conflicts.len(), 1);
        assert_eq!(outcome.conflicts[0].field, "max_heart_rate");
        // Merged keeps the local value while the conflict is open
        assert_eq!(outcome.merged.max_heart_rate, Some(161));
    }

    #[test]
    fn test_merge_is_idempotent() {
        let mut local = prefs_at(0);
        local.exercise_swap_counts.insert("squat".to_string(), 2);
        let mut remote = prefs_at(30);
        remote.exercise_swap_counts.insert("squat".to_string(), 3);

        let first = ConflictResolver::merge_preferences(&local, &remote).unwrap();
        let second = ConflictResolver::merge_preferences(&local, &remote).unwrap();
        assert_eq!(first, second);

        // Merging a record with itself resolves cleanly to itself
        let self_merge = ConflictResolver::merge_preferences(&local, &local).unwrap();
        assert!(self_merge.is_clean());
        assert_eq!(self_merge.merged, local);
    }

    #[test]
    fn test_key_mismatch_rejected() {
        let local = prefs_at(0);
        let remote = UserTrainingPreferences::new("user-2");
        assert!(matches!(
            ConflictResolver::merge_preferences(&local, &remote),
            Err(MergeError::KeyMismatch { field: "user_id", .. })
        ));
    }

    fn week_at(offset_secs: i64, implemented: bool) -> MesocycleWeek {
        MesocycleWeek {
            week_number: 2,
            progression_type: ProgressionType::AddRep,
            exercise_completion_rates: BTreeMap::from([("squat".to_string(), dec!(0.8))]),
            success_rates: BTreeMap::from([("squat".to_string(), dec!(0.7))]),
            implemented,
            date: chrono::NaiveDate::from_ymd_opt(2024, 9, 9).unwrap(),
            updated_at: Utc::now() + Duration::seconds(offset_secs),
        }
    }

    #[test]
    fn test_week_implemented_never_regresses() {
        let local = week_at(0, true);
        // Remote copy is newer but missed the rollover
        let remote = week_at(60, false);

        let outcome = ConflictResolver::merge_week(&local, &remote).unwrap();
        assert!(outcome.merged.implemented);
    }

    #[test]
    fn test_week_equal_timestamp_rate_divergence() {
        let local = week_at(0, true);
        let mut remote = local.clone();
        remote
            .exercise_completion_rates
            .insert("squat".to_string(), dec!(0.5));

        let outcome = ConflictResolver::merge_week(&local, &remote).unwrap();
        assert_eq!(outcome.conflicts.len(), 1);
        assert_eq!(outcome.conflicts[0].field, "exercise_completion_rates");
    }

    #[test]
    fn test_score_newer_version_wins() {
        use crate::intensity::{IntensityScorer, SetCompletion};
        use crate::models::AccountKind;

        let scorer = IntensityScorer::new();
        let completion = SetCompletion {
            user_id: "user-1".to_string(),
            set_id: "set-1".to_string(),
            tempo_score: dec!(80),
            motion_smoothness_score: dec!(80),
            rep_consistency_score: dec!(80),
            user_feedback_score: dec!(10),
            strain_modifier: dec!(1.00),
            is_estimated: false,
        };

        let original = scorer.score_set(&completion, AccountKind::Standard).unwrap();
        let mut corrected_input = completion;
        corrected_input.tempo_score = dec!(90);
        let mut corrected = scorer
            .supersede(&original, &corrected_input, AccountKind::Standard)
            .unwrap();
        corrected.created_at = original.created_at + Duration::seconds(30);

        let outcome = ConflictResolver::merge_score(&original, &corrected).unwrap();
        assert!(outcome.is_clean());
        assert_eq!(outcome.merged.id, corrected.id);
        assert_eq!(outcome.merged.total_score, corrected.total_score);
    }
}
