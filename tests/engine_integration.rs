use adaptrs::adaptation::{
    AdaptationDecisionEngine, AdaptationResult, AdaptationService, MesocycleSummaryProvider,
};
use adaptrs::catalog::StaticCatalog;
use adaptrs::coaching::SilentCoach;
use adaptrs::intensity::{IntensityScorer, SetCompletion};
use adaptrs::mesocycle::{MesocycleTracker, MesocycleWeek, ProgressionType, WeekPlan};
use adaptrs::models::{week_start, AccountKind, SetOutcome, UserTrainingPreferences, WorkoutContext};
use adaptrs::schedule::{HistoryCleanup, RetryPolicy, WeeklyRollover};
use adaptrs::store::{HistoryStore, MemoryStore, MesocycleStore, PreferenceStore, UserLocks};
use adaptrs::strain::{StrainCalculator, StrainSample};
use adaptrs::sync::ConflictResolver;
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use rust_decimal_macros::dec;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Integration tests covering the complete scoring and adaptation
/// workflows over the public library API

fn ts(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_hms_opt(18, 0, 0).unwrap())
}

fn monday(offset_weeks: u64) -> NaiveDate {
    // 2024-09-02 is a Monday
    NaiveDate::from_ymd_opt(2024, 9, 2).unwrap() + chrono::Days::new(offset_weeks * 7)
}

fn fast_policy() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        base_delay_ms: 1,
    }
}

fn test_preferences(user_id: &str) -> UserTrainingPreferences {
    let mut prefs = UserTrainingPreferences::new(user_id);
    prefs.max_heart_rate = Some(161);
    prefs.calibrated = true;
    prefs.age = Some(34);
    prefs.preferred_exercises = vec!["lunges".to_string(), "barbell row".to_string()];
    prefs
}

fn context(user_id: &str, exercise: &str, heart_rate: u16) -> WorkoutContext {
    WorkoutContext {
        user_id: user_id.to_string(),
        exercise: exercise.to_string(),
        heart_rate: Some(heart_rate),
        captured_at: Utc::now(),
    }
}

/// Seed one training week: 10 planned squat sets, 4 performed, 3
/// successful, so a full cycle averages to completion 0.4 and success
/// 0.75 — inside the substitution window.
fn seed_poor_adherence_week(store: &MemoryStore, user_id: &str, week: NaiveDate) {
    let mut planned = BTreeMap::new();
    planned.insert("squat".to_string(), 10u32);
    store
        .put_week_plan(
            user_id,
            &WeekPlan {
                week_start: week,
                planned_sets: planned,
            },
        )
        .unwrap();

    for i in 0..4u32 {
        store
            .append_set_outcome(
                user_id,
                &SetOutcome {
                    set_id: format!("squat-{week}-{i}"),
                    exercise: "squat".to_string(),
                    performed: true,
                    success: i < 3,
                    completed_at: ts(week),
                },
            )
            .unwrap();
    }
}

/// Strain sample -> set score -> four weekly rollovers -> substitution
#[test]
fn test_complete_adaptation_workflow() {
    let store = MemoryStore::new();
    let locks = Arc::new(UserLocks::new());

    // Live strain during the final set of a session
    let strain = StrainCalculator::new().evaluate(
        &StrainSample {
            current_hr: Some(150),
            baseline_hr: Some(60),
            current_spo2: Some(dec!(96)),
            baseline_spo2: Some(dec!(98)),
            recovery_delay_ms: Some(30_000),
        },
        Utc::now(),
    );
    assert!(strain.strain_score > dec!(0));

    // Set completion scored with the live strain modifier
    let scorer = IntensityScorer::new();
    let score = scorer
        .score_set(
            &SetCompletion {
                user_id: "athlete-1".to_string(),
                set_id: "squat-w1-1".to_string(),
                tempo_score: dec!(72),
                motion_smoothness_score: dec!(68),
                rep_consistency_score: dec!(75),
                user_feedback_score: dec!(-5),
                strain_modifier: strain.status.modifier(),
                is_estimated: strain.is_estimated,
            },
            AccountKind::Standard,
        )
        .unwrap();
    store.append_score("athlete-1", &score).unwrap();
    assert!(score.total_score > dec!(0) && score.total_score <= dec!(100));

    // Four weeks of poor squat adherence, rolled over weekly
    let rollover = WeeklyRollover::new(
        store.clone(),
        MesocycleTracker::new(store.clone()),
        locks.clone(),
        fast_policy(),
    );
    for n in 0..4u64 {
        let week = monday(n);
        seed_poor_adherence_week(&store, "athlete-1", week);
        let report = rollover.run(ts(week + chrono::Days::new(8))).unwrap();
        assert!(report.failures.is_empty());
    }

    let tracker = MesocycleTracker::new(store.clone());
    let cycle = store.load_cycle("athlete-1").unwrap().unwrap();
    assert!(cycle.is_complete());
    assert_eq!(cycle.completed_cycles, 1);

    let summary = tracker.summary("athlete-1", "squat").unwrap().unwrap();
    assert_eq!(summary.avg_completion_rate, dec!(0.4));
    assert_eq!(summary.avg_success_rate, dec!(0.75));

    // Live evaluation during the next session: swap to the preferred
    // same-muscle-group exercise
    store
        .save("athlete-1", &test_preferences("athlete-1"))
        .unwrap();
    let service = AdaptationService::with_locks(
        AdaptationDecisionEngine::new(),
        store.clone(),
        tracker,
        StaticCatalog::seeded(),
        SilentCoach,
        locks,
    );

    let result = service
        .evaluate_and_apply(&context("athlete-1", "squat", 130))
        .unwrap();

    match result {
        AdaptationResult::SwapExercise {
            exercise,
            replacement_exercise,
            applied,
            ..
        } => {
            assert_eq!(exercise, "squat");
            assert_eq!(replacement_exercise, "lunges");
            assert!(applied);
        }
        other => panic!("expected swap_exercise, got {other:?}"),
    }

    // The confirmed swap count moved with the decision
    let prefs = PreferenceStore::load(&store, "athlete-1").unwrap().unwrap();
    assert_eq!(prefs.swap_count("squat"), 1);
}

/// Safety rule wins regardless of adherence data
#[test]
fn test_high_heart_rate_forces_rest() {
    let store = MemoryStore::new();
    store
        .save("athlete-1", &test_preferences("athlete-1"))
        .unwrap();

    for n in 0..4u64 {
        seed_poor_adherence_week(&store, "athlete-1", monday(n));
    }
    let rollover = WeeklyRollover::new(
        store.clone(),
        MesocycleTracker::new(store.clone()),
        Arc::new(UserLocks::new()),
        fast_policy(),
    );
    for n in 0..4u64 {
        rollover.run(ts(monday(n) + chrono::Days::new(8))).unwrap();
    }

    let service = AdaptationService::new(
        AdaptationDecisionEngine::new(),
        store.clone(),
        MesocycleTracker::new(store.clone()),
        StaticCatalog::seeded(),
        SilentCoach,
    );

    // 170 bpm against a 161 bpm maximum
    let result = service
        .evaluate_and_apply(&context("athlete-1", "squat", 170))
        .unwrap();

    assert!(matches!(
        result,
        AdaptationResult::IncreaseRest { applied: true, .. }
    ));
    // No swap was recorded
    let prefs = PreferenceStore::load(&store, "athlete-1").unwrap().unwrap();
    assert_eq!(prefs.swap_count("squat"), 0);
}

/// Two confirmed swaps, then the third call proposes a blacklist
#[test]
fn test_repeated_swaps_escalate_to_blacklist() {
    let store = MemoryStore::new();
    store
        .save("athlete-1", &test_preferences("athlete-1"))
        .unwrap();

    struct PoorDeadliftSummary;
    impl MesocycleSummaryProvider for PoorDeadliftSummary {
        fn summary(
            &self,
            _user_id: &str,
            exercise: &str,
        ) -> Result<Option<adaptrs::mesocycle::MesocycleSummary>, adaptrs::mesocycle::MesocycleError>
        {
            Ok(Some(adaptrs::mesocycle::MesocycleSummary {
                exercise: exercise.to_string(),
                avg_completion_rate: dec!(0.40),
                avg_success_rate: dec!(0.70),
                weeks_observed: 4,
            }))
        }
    }

    let service = AdaptationService::new(
        AdaptationDecisionEngine::new(),
        store.clone(),
        PoorDeadliftSummary,
        StaticCatalog::seeded(),
        SilentCoach,
    );

    let ctx = context("athlete-1", "deadlift", 120);

    for expected_count in 1..=2u32 {
        let result = service.evaluate_and_apply(&ctx).unwrap();
        assert!(matches!(result, AdaptationResult::SwapExercise { .. }));
        let prefs = PreferenceStore::load(&store, "athlete-1").unwrap().unwrap();
        assert_eq!(prefs.swap_count("deadlift"), expected_count);
    }

    let third = service.evaluate_and_apply(&ctx).unwrap();
    assert!(matches!(
        third,
        AdaptationResult::BlacklistExercise { applied: false, .. }
    ));

    // The proposal itself mutates nothing
    let prefs = PreferenceStore::load(&store, "athlete-1").unwrap().unwrap();
    assert_eq!(prefs.swap_count("deadlift"), 2);
    assert!(!prefs.is_blacklisted("deadlift"));
}

/// Re-submitting a completed week leaves the stored record unchanged
#[test]
fn test_week_resubmission_is_idempotent() {
    let store = MemoryStore::new();
    let tracker = MesocycleTracker::new(store.clone());

    let mut completion = BTreeMap::new();
    completion.insert("squat".to_string(), dec!(0.8));
    let mut success = BTreeMap::new();
    success.insert("squat".to_string(), dec!(0.7));
    let week = MesocycleWeek {
        week_number: 2,
        progression_type: ProgressionType::AddSet,
        exercise_completion_rates: completion,
        success_rates: success,
        implemented: true,
        date: monday(1),
        updated_at: Utc::now(),
    };

    tracker.record_week("athlete-1", week.clone()).unwrap();
    let first = store.load_cycle("athlete-1").unwrap().unwrap();

    tracker.record_week("athlete-1", week).unwrap();
    let second = store.load_cycle("athlete-1").unwrap().unwrap();

    assert_eq!(first, second);
    assert_eq!(second.weeks.len(), 1);
}

/// Swap-count merge always yields the element-wise maximum
#[test]
fn test_swap_count_merge_law() {
    let mut local = test_preferences("athlete-1");
    local.exercise_swap_counts.insert("squat".to_string(), 2);
    local.exercise_swap_counts.insert("deadlift".to_string(), 1);
    local.updated_at = Utc::now();

    let mut remote = test_preferences("athlete-1");
    remote.exercise_swap_counts.insert("squat".to_string(), 1);
    remote.exercise_swap_counts.insert("lunges".to_string(), 4);
    remote.updated_at = local.updated_at + Duration::seconds(90);

    let outcome = ConflictResolver::merge_preferences(&local, &remote).unwrap();

    for key in ["squat", "deadlift", "lunges"] {
        let merged = outcome
            .merged
            .exercise_swap_counts
            .get(key)
            .copied()
            .unwrap_or(0);
        let l = local.exercise_swap_counts.get(key).copied().unwrap_or(0);
        let r = remote.exercise_swap_counts.get(key).copied().unwrap_or(0);
        assert_eq!(merged, l.max(r));
    }
}

/// Old weekly history is purged; the active cycle is untouched
#[test]
fn test_cleanup_retention_window() {
    let store = MemoryStore::new();

    let old_week = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    seed_poor_adherence_week(&store, "athlete-1", week_start(old_week));
    seed_poor_adherence_week(&store, "athlete-1", monday(0));

    let cleanup = HistoryCleanup::new(store.clone(), 183, fast_policy());
    let report = cleanup.run(ts(monday(3))).unwrap();

    assert!(report.records_purged > 0);
    assert!(store
        .set_outcomes("athlete-1", week_start(old_week))
        .unwrap()
        .is_empty());
    assert!(!store.set_outcomes("athlete-1", monday(0)).unwrap().is_empty());
}

/// Scoring a set with a missing-sensor strain reading still succeeds and
/// flags the score as estimated
#[test]
fn test_sensorless_session_never_blocks() {
    let strain = StrainCalculator::new().evaluate(
        &StrainSample {
            current_hr: None,
            baseline_hr: None,
            current_spo2: None,
            baseline_spo2: None,
            recovery_delay_ms: None,
        },
        Utc::now(),
    );
    assert!(strain.is_estimated);

    let score = IntensityScorer::new()
        .score_set(
            &SetCompletion {
                user_id: "athlete-1".to_string(),
                set_id: "set-1".to_string(),
                tempo_score: dec!(85),
                motion_smoothness_score: dec!(80),
                rep_consistency_score: dec!(82),
                user_feedback_score: dec!(5),
                strain_modifier: strain.status.modifier(),
                is_estimated: strain.is_estimated,
            },
            AccountKind::Standard,
        )
        .unwrap();

    assert!(score.is_estimated);
    assert_eq!(score.strain_modifier, dec!(1.00));
}
