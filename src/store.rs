//! Persistence repositories
//!
//! All engine state is addressed by `(user, period)` or `(user, entity)`
//! composite keys; no cross-user key is ever read or written. The engine
//! depends only on the narrow repository traits defined here, with two
//! implementations: an in-memory store for tests and a SQLite-backed
//! store for deployment. Records are stored as JSON payloads keyed by
//! user and week.
//!
//! The store makes no transactional guarantees across keys; callers that
//! need single-writer behavior for one user serialize through
//! [`UserLocks`].

use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;

use crate::intensity::IntensityScore;
use crate::mesocycle::{Mesocycle, WeekPlan};
use crate::models::{week_start, SetOutcome, UserTrainingPreferences};

/// Store error types
#[derive(Debug, Error)]
pub enum StoreError {
    /// Backend temporarily unreachable; safe to retry
    #[error("store unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl StoreError {
    /// Whether a retry with backoff may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StoreError::Unavailable { .. } | StoreError::Sqlite(_)
        )
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

/// Weekly history repository: plans, set outcomes, and set scores keyed
/// by `(user, week)`
pub trait HistoryStore: Send + Sync {
    fn put_week_plan(&self, user_id: &str, plan: &WeekPlan) -> Result<(), StoreError>;
    fn week_plan(
        &self,
        user_id: &str,
        week_start: NaiveDate,
    ) -> Result<Option<WeekPlan>, StoreError>;

    fn append_set_outcome(&self, user_id: &str, outcome: &SetOutcome) -> Result<(), StoreError>;
    fn set_outcomes(
        &self,
        user_id: &str,
        week_start: NaiveDate,
    ) -> Result<Vec<SetOutcome>, StoreError>;

    fn append_score(&self, user_id: &str, score: &IntensityScore) -> Result<(), StoreError>;
    fn scores(
        &self,
        user_id: &str,
        week_start: NaiveDate,
    ) -> Result<Vec<IntensityScore>, StoreError>;

    /// All users with any stored history
    fn user_ids(&self) -> Result<Vec<String>, StoreError>;

    /// Delete weekly records older than the cutoff; returns the number
    /// of records removed
    fn purge_before(&self, cutoff: NaiveDate) -> Result<usize, StoreError>;
}

/// Per-user active training block repository
pub trait MesocycleStore: Send + Sync {
    fn load_cycle(&self, user_id: &str) -> Result<Option<Mesocycle>, StoreError>;
    fn save_cycle(&self, user_id: &str, cycle: &Mesocycle) -> Result<(), StoreError>;
}

/// Per-user training preference repository
pub trait PreferenceStore: Send + Sync {
    fn load(&self, user_id: &str) -> Result<Option<UserTrainingPreferences>, StoreError>;
    fn save(&self, user_id: &str, preferences: &UserTrainingPreferences)
        -> Result<(), StoreError>;
}

/// Per-user lock map enforcing single-writer discipline
///
/// The weekly rollover and live adaptation evaluation for one user must
/// not interleave; both take the user's lock for the duration of their
/// read-modify-write.
#[derive(Default)]
pub struct UserLocks {
    inner: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl UserLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn user_lock(&self, user_id: &str) -> Arc<Mutex<()>> {
        let mut map = self
            .inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        map.entry(user_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

#[derive(Default)]
struct MemoryInner {
    plans: HashMap<(String, NaiveDate), WeekPlan>,
    outcomes: HashMap<(String, NaiveDate), Vec<SetOutcome>>,
    scores: HashMap<(String, NaiveDate), Vec<IntensityScore>>,
    cycles: HashMap<String, Mesocycle>,
    preferences: HashMap<String, UserTrainingPreferences>,
}

/// In-memory store; clones share the same state
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemoryInner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl HistoryStore for MemoryStore {
    fn put_week_plan(&self, user_id: &str, plan: &WeekPlan) -> Result<(), StoreError> {
        self.lock()
            .plans
            .insert((user_id.to_string(), plan.week_start), plan.clone());
        Ok(())
    }

    fn week_plan(
        &self,
        user_id: &str,
        week_start: NaiveDate,
    ) -> Result<Option<WeekPlan>, StoreError> {
        Ok(self
            .lock()
            .plans
            .get(&(user_id.to_string(), week_start))
            .cloned())
    }

    fn append_set_outcome(&self, user_id: &str, outcome: &SetOutcome) -> Result<(), StoreError> {
        self.lock()
            .outcomes
            .entry((user_id.to_string(), outcome.week_start()))
            .or_default()
            .push(outcome.clone());
        Ok(())
    }

    fn set_outcomes(
        &self,
        user_id: &str,
        week_start: NaiveDate,
    ) -> Result<Vec<SetOutcome>, StoreError> {
        Ok(self
            .lock()
            .outcomes
            .get(&(user_id.to_string(), week_start))
            .cloned()
            .unwrap_or_default())
    }

    fn append_score(&self, user_id: &str, score: &IntensityScore) -> Result<(), StoreError> {
        self.lock()
            .scores
            .entry((user_id.to_string(), week_start(score.created_at.date_naive())))
            .or_default()
            .push(score.clone());
        Ok(())
    }

    fn scores(
        &self,
        user_id: &str,
        week_start: NaiveDate,
    ) -> Result<Vec<IntensityScore>, StoreError> {
        Ok(self
            .lock()
            .scores
            .get(&(user_id.to_string(), week_start))
            .cloned()
            .unwrap_or_default())
    }

    fn user_ids(&self) -> Result<Vec<String>, StoreError> {
        let inner = self.lock();
        let mut ids: Vec<String> = inner
            .outcomes
            .keys()
            .chain(inner.plans.keys())
            .chain(inner.scores.keys())
            .map(|(user, _)| user.clone())
            .chain(inner.cycles.keys().cloned())
            .chain(inner.preferences.keys().cloned())
            .collect();
        ids.sort();
        ids.dedup();
        Ok(ids)
    }

    fn purge_before(&self, cutoff: NaiveDate) -> Result<usize, StoreError> {
        let mut inner = self.lock();
        let mut removed = 0usize;

        let stale_plans: Vec<_> = inner
            .plans
            .keys()
            .filter(|(_, week)| *week < cutoff)
            .cloned()
            .collect();
        for key in stale_plans {
            inner.plans.remove(&key);
            removed += 1;
        }

        for map_removed in [
            purge_map(&mut inner.outcomes, cutoff),
            purge_map(&mut inner.scores, cutoff),
        ] {
            removed += map_removed;
        }

        Ok(removed)
    }
}

fn purge_map<T>(map: &mut HashMap<(String, NaiveDate), Vec<T>>, cutoff: NaiveDate) -> usize {
    let stale: Vec<_> = map
        .keys()
        .filter(|(_, week)| *week < cutoff)
        .cloned()
        .collect();
    let mut removed = 0;
    for key in stale {
        if let Some(records) = map.remove(&key) {
            removed += records.len();
        }
    }
    removed
}

impl MesocycleStore for MemoryStore {
    fn load_cycle(&self, user_id: &str) -> Result<Option<Mesocycle>, StoreError> {
        Ok(self.lock().cycles.get(user_id).cloned())
    }

    fn save_cycle(&self, user_id: &str, cycle: &Mesocycle) -> Result<(), StoreError> {
        self.lock()
            .cycles
            .insert(user_id.to_string(), cycle.clone());
        Ok(())
    }
}

impl PreferenceStore for MemoryStore {
    fn load(&self, user_id: &str) -> Result<Option<UserTrainingPreferences>, StoreError> {
        Ok(self.lock().preferences.get(user_id).cloned())
    }

    fn save(
        &self,
        user_id: &str,
        preferences: &UserTrainingPreferences,
    ) -> Result<(), StoreError> {
        self.lock()
            .preferences
            .insert(user_id.to_string(), preferences.clone());
        Ok(())
    }
}

/// SQLite-backed store
///
/// One row per record with the JSON payload in a text column; composite
/// keys are materialized as indexed columns so purges and per-week reads
/// stay cheap.
#[derive(Clone)]
pub struct SqliteStore {
    connection: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (and migrate) a store at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let connection = Connection::open(path)?;
        Self::from_connection(connection)
    }

    /// Open an in-memory store; useful for tests and dry runs
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(connection: Connection) -> Result<Self, StoreError> {
        connection.execute_batch(
            "CREATE TABLE IF NOT EXISTS week_plans (
                user_id    TEXT NOT NULL,
                week_start TEXT NOT NULL,
                payload    TEXT NOT NULL,
                PRIMARY KEY (user_id, week_start)
            );
            CREATE TABLE IF NOT EXISTS set_outcomes (
                rowid_key  INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id    TEXT NOT NULL,
                week_start TEXT NOT NULL,
                payload    TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_set_outcomes_key
                ON set_outcomes (user_id, week_start);
            CREATE TABLE IF NOT EXISTS intensity_scores (
                id         TEXT PRIMARY KEY,
                user_id    TEXT NOT NULL,
                week_start TEXT NOT NULL,
                payload    TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_intensity_scores_key
                ON intensity_scores (user_id, week_start);
            CREATE TABLE IF NOT EXISTS mesocycles (
                user_id TEXT PRIMARY KEY,
                payload TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS preferences (
                user_id TEXT PRIMARY KEY,
                payload TEXT NOT NULL
            );",
        )?;

        Ok(SqliteStore {
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.connection
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl HistoryStore for SqliteStore {
    fn put_week_plan(&self, user_id: &str, plan: &WeekPlan) -> Result<(), StoreError> {
        let payload = serde_json::to_string(plan)?;
        self.conn().execute(
            "INSERT OR REPLACE INTO week_plans (user_id, week_start, payload)
             VALUES (?1, ?2, ?3)",
            params![user_id, plan.week_start.to_string(), payload],
        )?;
        Ok(())
    }

    fn week_plan(
        &self,
        user_id: &str,
        week_start: NaiveDate,
    ) -> Result<Option<WeekPlan>, StoreError> {
        let payload: Option<String> = self
            .conn()
            .query_row(
                "SELECT payload FROM week_plans WHERE user_id = ?1 AND week_start = ?2",
                params![user_id, week_start.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        payload
            .map(|p| serde_json::from_str(&p).map_err(StoreError::from))
            .transpose()
    }

    fn append_set_outcome(&self, user_id: &str, outcome: &SetOutcome) -> Result<(), StoreError> {
        let payload = serde_json::to_string(outcome)?;
        self.conn().execute(
            "INSERT INTO set_outcomes (user_id, week_start, payload) VALUES (?1, ?2, ?3)",
            params![user_id, outcome.week_start().to_string(), payload],
        )?;
        Ok(())
    }

    fn set_outcomes(
        &self,
        user_id: &str,
        week_start: NaiveDate,
    ) -> Result<Vec<SetOutcome>, StoreError> {
        let conn = self.conn();
        let mut statement = conn.prepare(
            "SELECT payload FROM set_outcomes
             WHERE user_id = ?1 AND week_start = ?2 ORDER BY rowid_key",
        )?;
        let rows = statement.query_map(params![user_id, week_start.to_string()], |row| {
            row.get::<_, String>(0)
        })?;

        let mut outcomes = Vec::new();
        for payload in rows {
            outcomes.push(serde_json::from_str(&payload?)?);
        }
        Ok(outcomes)
    }

    fn append_score(&self, user_id: &str, score: &IntensityScore) -> Result<(), StoreError> {
        let payload = serde_json::to_string(score)?;
        self.conn().execute(
            "INSERT OR REPLACE INTO intensity_scores (id, user_id, week_start, payload)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                score.id.to_string(),
                user_id,
                week_start(score.created_at.date_naive()).to_string(),
                payload
            ],
        )?;
        Ok(())
    }

    fn scores(
        &self,
        user_id: &str,
        week_start: NaiveDate,
    ) -> Result<Vec<IntensityScore>, StoreError> {
        let conn = self.conn();
        let mut statement = conn.prepare(
            "SELECT payload FROM intensity_scores WHERE user_id = ?1 AND week_start = ?2",
        )?;
        let rows = statement.query_map(params![user_id, week_start.to_string()], |row| {
            row.get::<_, String>(0)
        })?;

        let mut scores = Vec::new();
        for payload in rows {
            scores.push(serde_json::from_str(&payload?)?);
        }
        Ok(scores)
    }

    fn user_ids(&self) -> Result<Vec<String>, StoreError> {
        let conn = self.conn();
        let mut statement = conn.prepare(
            "SELECT user_id FROM set_outcomes
             UNION SELECT user_id FROM week_plans
             UNION SELECT user_id FROM intensity_scores
             UNION SELECT user_id FROM mesocycles
             UNION SELECT user_id FROM preferences
             ORDER BY user_id",
        )?;
        let rows = statement.query_map([], |row| row.get::<_, String>(0))?;

        let mut ids = Vec::new();
        for id in rows {
            ids.push(id?);
        }
        Ok(ids)
    }

    fn purge_before(&self, cutoff: NaiveDate) -> Result<usize, StoreError> {
        let conn = self.conn();
        let cutoff = cutoff.to_string();
        let mut removed = 0usize;
        for table in ["week_plans", "set_outcomes", "intensity_scores"] {
            removed += conn.execute(
                &format!("DELETE FROM {table} WHERE week_start < ?1"),
                params![cutoff],
            )?;
        }
        Ok(removed)
    }
}

impl MesocycleStore for SqliteStore {
    fn load_cycle(&self, user_id: &str) -> Result<Option<Mesocycle>, StoreError> {
        let payload: Option<String> = self
            .conn()
            .query_row(
                "SELECT payload FROM mesocycles WHERE user_id = ?1",
                params![user_id],
                |row| row.get(0),
            )
            .optional()?;
        payload
            .map(|p| serde_json::from_str(&p).map_err(StoreError::from))
            .transpose()
    }

    fn save_cycle(&self, user_id: &str, cycle: &Mesocycle) -> Result<(), StoreError> {
        let payload = serde_json::to_string(cycle)?;
        self.conn().execute(
            "INSERT OR REPLACE INTO mesocycles (user_id, payload) VALUES (?1, ?2)",
            params![user_id, payload],
        )?;
        Ok(())
    }
}

impl PreferenceStore for SqliteStore {
    fn load(&self, user_id: &str) -> Result<Option<UserTrainingPreferences>, StoreError> {
        let payload: Option<String> = self
            .conn()
            .query_row(
                "SELECT payload FROM preferences WHERE user_id = ?1",
                params![user_id],
                |row| row.get(0),
            )
            .optional()?;
        payload
            .map(|p| serde_json::from_str(&p).map_err(StoreError::from))
            .transpose()
    }

    fn save(
        &self,
        user_id: &str,
        preferences: &UserTrainingPreferences,
    ) -> Result<(), StoreError> {
        let payload = serde_json::to_string(preferences)?;
        self.conn().execute(
            "INSERT OR REPLACE INTO preferences (user_id, payload) VALUES (?1, ?2)",
            params![user_id, payload],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn outcome(exercise: &str, day: NaiveDate) -> SetOutcome {
        SetOutcome {
            set_id: format!("{exercise}-set"),
            exercise: exercise.to_string(),
            performed: true,
            success: true,
            completed_at: Utc
                .from_utc_datetime(&day.and_hms_opt(10, 0, 0).unwrap()),
        }
    }

    fn exercise_stores() -> Vec<Box<dyn HistoryStore>> {
        vec![
            Box::new(MemoryStore::new()),
            Box::new(SqliteStore::open_in_memory().unwrap()),
        ]
    }

    #[test]
    fn test_outcomes_keyed_by_week() {
        for store in exercise_stores() {
            let wednesday = NaiveDate::from_ymd_opt(2024, 9, 25).unwrap();
            let monday = week_start(wednesday);

            store
                .append_set_outcome("user-1", &outcome("squat", wednesday))
                .unwrap();
            store
                .append_set_outcome("user-1", &outcome("squat", monday))
                .unwrap();

            let outcomes = store.set_outcomes("user-1", monday).unwrap();
            assert_eq!(outcomes.len(), 2);

            // Other users and weeks stay isolated
            assert!(store.set_outcomes("user-2", monday).unwrap().is_empty());
            let next_week = monday + chrono::Days::new(7);
            assert!(store.set_outcomes("user-1", next_week).unwrap().is_empty());
        }
    }

    #[test]
    fn test_purge_respects_cutoff() {
        for store in exercise_stores() {
            let old_week = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
            let recent_week = NaiveDate::from_ymd_opt(2024, 9, 23).unwrap();

            store
                .append_set_outcome("user-1", &outcome("squat", old_week))
                .unwrap();
            store
                .append_set_outcome("user-1", &outcome("squat", recent_week))
                .unwrap();

            let removed = store
                .purge_before(NaiveDate::from_ymd_opt(2024, 6, 1).unwrap())
                .unwrap();
            assert_eq!(removed, 1);

            assert!(store.set_outcomes("user-1", old_week).unwrap().is_empty());
            assert_eq!(store.set_outcomes("user-1", recent_week).unwrap().len(), 1);
        }
    }

    #[test]
    fn test_week_plan_roundtrip() {
        for store in exercise_stores() {
            let monday = NaiveDate::from_ymd_opt(2024, 9, 23).unwrap();
            let mut planned = std::collections::BTreeMap::new();
            planned.insert("squat".to_string(), 10u32);
            let plan = WeekPlan {
                week_start: monday,
                planned_sets: planned,
            };

            store.put_week_plan("user-1", &plan).unwrap();
            let loaded = store.week_plan("user-1", monday).unwrap().unwrap();
            assert_eq!(loaded, plan);

            // Re-put overwrites rather than duplicating
            store.put_week_plan("user-1", &plan).unwrap();
            assert!(store.week_plan("user-1", monday).unwrap().is_some());
        }
    }

    #[test]
    fn test_user_ids_deduplicated() {
        for store in exercise_stores() {
            let day = NaiveDate::from_ymd_opt(2024, 9, 23).unwrap();
            store
                .append_set_outcome("user-b", &outcome("squat", day))
                .unwrap();
            store
                .append_set_outcome("user-a", &outcome("squat", day))
                .unwrap();
            store
                .append_set_outcome("user-a", &outcome("lunges", day))
                .unwrap();

            assert_eq!(
                store.user_ids().unwrap(),
                vec!["user-a".to_string(), "user-b".to_string()]
            );
        }
    }

    #[test]
    fn test_sqlite_preferences_roundtrip() {
        let store = SqliteStore::open_in_memory().unwrap();
        let mut prefs = UserTrainingPreferences::new("user-1");
        prefs.max_heart_rate = Some(161);
        prefs.record_swap("squat");

        store.save("user-1", &prefs).unwrap();
        let loaded = PreferenceStore::load(&store, "user-1").unwrap().unwrap();
        assert_eq!(loaded.max_heart_rate, Some(161));
        assert_eq!(loaded.swap_count("squat"), 1);
    }

    #[test]
    fn test_sqlite_store_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.db");

        {
            let store = SqliteStore::open(&path).unwrap();
            let day = NaiveDate::from_ymd_opt(2024, 9, 23).unwrap();
            store
                .append_set_outcome("user-1", &outcome("squat", day))
                .unwrap();
        }

        // Reopen and read back
        let store = SqliteStore::open(&path).unwrap();
        let monday = NaiveDate::from_ymd_opt(2024, 9, 23).unwrap();
        assert_eq!(store.set_outcomes("user-1", monday).unwrap().len(), 1);
    }

    #[test]
    fn test_memory_store_clones_share_state() {
        let store = MemoryStore::new();
        let clone = store.clone();

        let day = NaiveDate::from_ymd_opt(2024, 9, 23).unwrap();
        store
            .append_set_outcome("user-1", &outcome("squat", day))
            .unwrap();
        assert_eq!(clone.set_outcomes("user-1", day).unwrap().len(), 1);
    }

    #[test]
    fn test_user_locks_return_same_lock_per_user() {
        let locks = UserLocks::new();
        let a = locks.user_lock("user-1");
        let b = locks.user_lock("user-1");
        let c = locks.user_lock("user-2");

        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
    }
}
