//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs. Every
//! section has defaults, so a missing file or section still yields a usable
//! configuration. The Manifold API key is referenced by env-var name and
//! resolved at runtime.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use secrecy::SecretString;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use tracing::{info, warn};

use crate::engine::reconciler::DEFAULT_FETCH_CONCURRENCY;
use crate::engine::TrackerSettings;
use crate::platforms::manifold::DEFAULT_BASE_URL;
use crate::storage::DEFAULT_STATE_FILE;
use crate::strategy::kelly::KellyConfig;
use crate::types::{SortDirection, SortKey, SortOrder};

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub tracker: TrackerConfig,
    pub manifold: ManifoldConfig,
    pub kelly: KellyConfig,
    pub storage: StorageConfig,
    pub dashboard: DashboardConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct TrackerConfig {
    pub name: String,
    /// Stake of the per-row bet button, in mana.
    pub default_bet: Decimal,
    pub autobet_budget: Decimal,
    pub dry_run: bool,
    pub fetch_concurrency: usize,
    pub sort_key: SortKey,
    pub sort_direction: SortDirection,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            name: "EDGETRACK".into(),
            default_bet: dec!(100),
            autobet_budget: dec!(1000),
            dry_run: false,
            fetch_concurrency: DEFAULT_FETCH_CONCURRENCY,
            sort_key: SortKey::Roi,
            sort_direction: SortDirection::Desc,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ManifoldConfig {
    pub base_url: String,
    pub api_key_env: String,
    pub timeout_secs: u64,
    pub search_limit: u32,
}

impl Default for ManifoldConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.into(),
            api_key_env: "MANIFOLD_API_KEY".into(),
            timeout_secs: 15,
            search_limit: 10,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: DEFAULT_STATE_FILE.into(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DashboardConfig {
    pub host: String,
    pub port: u16,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 3000,
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::parse(&contents).with_context(|| format!("Failed to parse config file: {path}"))
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path` if it exists, defaults otherwise. A file that exists but
    /// does not parse is still an error.
    pub fn load_or_default(path: &str) -> Result<Self> {
        if Path::new(path).exists() {
            Self::load(path)
        } else {
            info!(path, "No config file, using defaults");
            Ok(Self::default())
        }
    }

    fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            self.tracker.default_bet > Decimal::ZERO,
            "tracker.default_bet must be positive"
        );
        anyhow::ensure!(
            self.tracker.fetch_concurrency > 0,
            "tracker.fetch_concurrency must be at least 1"
        );
        anyhow::ensure!(
            self.kelly.multiplier > 0.0 && self.kelly.multiplier <= 1.0,
            "kelly.multiplier must be in (0, 1]"
        );
        anyhow::ensure!(
            self.kelly.max_bet_pct > 0.0 && self.kelly.max_bet_pct <= 1.0,
            "kelly.max_bet_pct must be in (0, 1]"
        );
        Ok(())
    }

    /// Resolve an environment variable name to its value.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }

    /// The Manifold API key, if its env var is set and non-blank.
    pub fn resolve_api_key(&self) -> Option<SecretString> {
        match Self::resolve_env(&self.manifold.api_key_env) {
            Ok(key) if !key.trim().is_empty() => Some(SecretString::new(key.trim().to_string())),
            Ok(_) | Err(_) => {
                warn!(
                    env = %self.manifold.api_key_env,
                    "No Manifold API key configured; betting disabled until one is entered"
                );
                None
            }
        }
    }

    pub fn tracker_settings(&self) -> TrackerSettings {
        TrackerSettings {
            default_bet: self.tracker.default_bet,
            autobet_budget: self.tracker.autobet_budget,
            dry_run: self.tracker.dry_run,
            fetch_concurrency: self.tracker.fetch_concurrency,
            sort: SortOrder::new(self.tracker.sort_key, self.tracker.sort_direction),
            kelly: self.kelly.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let cfg = AppConfig::parse("").unwrap();
        assert_eq!(cfg.tracker.name, "EDGETRACK");
        assert_eq!(cfg.tracker.default_bet, dec!(100));
        assert_eq!(cfg.manifold.api_key_env, "MANIFOLD_API_KEY");
        assert_eq!(cfg.storage.path, DEFAULT_STATE_FILE);
        assert_eq!(cfg.dashboard.port, 3000);
        assert_eq!(cfg.tracker_settings().sort, SortOrder::by_roi_desc());
    }

    #[test]
    fn test_partial_sections() {
        let cfg = AppConfig::parse(
            r#"
            [tracker]
            default_bet = 25.0
            dry_run = true
            sort_key = "slug"
            sort_direction = "asc"

            [kelly]
            multiplier = 0.25

            [dashboard]
            port = 8080
            "#,
        )
        .unwrap();
        assert_eq!(cfg.tracker.default_bet, dec!(25));
        assert!(cfg.tracker.dry_run);
        assert_eq!(cfg.tracker.autobet_budget, dec!(1000));
        assert_eq!(cfg.kelly.multiplier, 0.25);
        assert_eq!(cfg.kelly.max_bet_pct, 0.10);
        assert_eq!(cfg.dashboard.port, 8080);
        assert_eq!(cfg.dashboard.host, "127.0.0.1");

        let settings = cfg.tracker_settings();
        assert_eq!(settings.sort, SortOrder::new(SortKey::Slug, SortDirection::Asc));
        assert!(settings.dry_run);
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(AppConfig::parse("[tracker]\ndefault_bet = 0").is_err());
        assert!(AppConfig::parse("[kelly]\nmultiplier = 1.5").is_err());
        assert!(AppConfig::parse("[tracker]\nsort_key = \"colour\"").is_err());
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let cfg = AppConfig::load_or_default("/nonexistent/edgetrack.toml").unwrap();
        assert_eq!(cfg.manifold.base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn test_resolve_api_key_from_env() {
        let mut cfg = AppConfig::default();
        cfg.manifold.api_key_env = "EDGETRACK_TEST_API_KEY_UNSET".into();
        assert!(cfg.resolve_api_key().is_none());

        cfg.manifold.api_key_env = "EDGETRACK_TEST_API_KEY".into();
        std::env::set_var("EDGETRACK_TEST_API_KEY", "  abc  ");
        let key = cfg.resolve_api_key().unwrap();
        use secrecy::ExposeSecret;
        assert_eq!(key.expose_secret(), "abc");
    }
}
