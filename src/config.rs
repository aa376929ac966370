use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::adaptation::AdaptationConfig;
use crate::intensity::ScoringConfig;
use crate::schedule::RetryPolicy;
use crate::strain::StrainConfig;

/// Main engine configuration
///
/// Every threshold the engine evaluates lives here with its default
/// equal to the documented constant, so deployments can tune without
/// rebuilding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Configuration metadata
    pub metadata: ConfigMetadata,

    /// Strain formula weights and plausibility ranges
    pub strain: StrainConfig,

    /// Set-score weighting
    pub scoring: ScoringConfig,

    /// Adaptation decision thresholds
    pub adaptation: AdaptationConfig,

    /// History retention settings
    pub cleanup: CleanupConfig,

    /// Retry policy for store writes in batch jobs
    pub retry: RetryPolicy,
}

/// Configuration metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigMetadata {
    /// Configuration format version
    pub version: String,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last modification timestamp
    pub updated_at: DateTime<Utc>,
}

/// History retention settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupConfig {
    /// Days of weekly history to retain (~6 months)
    pub retention_days: u16,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        CleanupConfig { retention_days: 183 }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        let now = Utc::now();

        EngineConfig {
            metadata: ConfigMetadata {
                version: "1.0".to_string(),
                created_at: now,
                updated_at: now,
            },
            strain: StrainConfig::default(),
            scoring: ScoringConfig::default(),
            adaptation: AdaptationConfig::default(),
            cleanup: CleanupConfig::default(),
            retry: RetryPolicy::default(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: EngineConfig =
            toml::from_str(&content).with_context(|| "Failed to parse TOML configuration")?;

        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save_to_file<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        self.metadata.updated_at = Utc::now();

        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let toml_content = toml::to_string_pretty(self)
            .with_context(|| "Failed to serialize configuration to TOML")?;

        fs::write(&path, toml_content)
            .with_context(|| format!("Failed to write config file: {}", path.as_ref().display()))?;

        Ok(())
    }

    /// Get default configuration file path
    pub fn default_config_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".adaptrs")
            .join("config.toml")
    }

    /// Load configuration with fallback to defaults
    pub fn load_or_default() -> Self {
        let config_path = Self::default_config_path();

        match Self::load_from_file(&config_path) {
            Ok(config) => config,
            Err(_) => {
                tracing::debug!(
                    path = %config_path.display(),
                    "config file not found, using defaults"
                );
                Self::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use tempfile::tempdir;

    #[test]
    fn test_defaults_match_documented_constants() {
        let config = EngineConfig::default();

        assert_eq!(config.strain.hr_weight, dec!(0.4));
        assert_eq!(config.scoring.tempo_weight, dec!(0.30));
        assert_eq!(config.adaptation.completion_cutoff, dec!(0.50));
        assert_eq!(config.adaptation.blacklist_threshold, 3);
        assert_eq!(config.cleanup.retention_days, 183);
        assert_eq!(config.retry.max_attempts, 3);
    }

    #[test]
    fn test_config_serialization_roundtrip() {
        let config = EngineConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        let deserialized: EngineConfig = toml::from_str(&toml_str).unwrap();

        assert_eq!(config.metadata.version, deserialized.metadata.version);
        assert_eq!(config.strain, deserialized.strain);
        assert_eq!(config.scoring, deserialized.scoring);
        assert_eq!(config.adaptation, deserialized.adaptation);
    }

    #[test]
    fn test_config_file_io() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config.toml");

        let mut original = EngineConfig::default();
        original.cleanup.retention_days = 90;
        original.save_to_file(&config_path).unwrap();

        let loaded = EngineConfig::load_from_file(&config_path).unwrap();
        assert_eq!(loaded.cleanup.retention_days, 90);
    }
}
