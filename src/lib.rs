// Library interface for the adaptive training engine
// This allows integration tests to access the core functionality

pub mod adaptation;
pub mod catalog;
pub mod coaching;
pub mod config;
pub mod error;
pub mod intensity;
pub mod logging;
pub mod mesocycle;
pub mod models;
pub mod schedule;
pub mod store;
pub mod strain;
pub mod sync;

// Re-export commonly used types for convenience
pub use models::*;
pub use strain::{LiveStrain, StrainCalculator, StrainConfig, StrainSample, StrainStatus};
pub use intensity::{IntensityScore, IntensityScorer, ScoringConfig, SetCompletion, TempoData};
pub use mesocycle::{Mesocycle, MesocycleSummary, MesocycleTracker, MesocycleWeek, ProgressionType};
pub use adaptation::{
    AdaptationConfig, AdaptationDecisionEngine, AdaptationResult, AdaptationService,
    MesocycleSummaryProvider,
};
pub use catalog::{ExerciseCatalog, StaticCatalog};
pub use coaching::{CoachingMessage, CoachingPrompt, CoachingService, SilentCoach};
pub use sync::{ConflictField, ConflictResolver, MergeOutcome};
pub use store::{
    HistoryStore, MemoryStore, MesocycleStore, PreferenceStore, SqliteStore, StoreError, UserLocks,
};
pub use schedule::{HistoryCleanup, RetryPolicy, WeeklyRollover};
pub use config::EngineConfig;
pub use error::{AdaptError, ErrorSeverity, Result};
pub use logging::{init_logging, LogConfig, LogFormat, LogLevel};
