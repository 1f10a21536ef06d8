//! # Settlement Configuration
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     KASA_DB_PATH=/var/lib/kasa/kasa.db                                 │
//! │     KASA_BILL_PREFIX=STR2                                              │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     path passed to SettlementConfig::load                              │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     ./kasa.db, prefix INV, 5 connections                               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! [database]
//! path = "./data/kasa.db"
//! max_connections = 5
//! busy_timeout_ms = 5000
//!
//! [billing]
//! prefix = "INV"
//!
//! [cart]
//! max_sessions = 8
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

use kasa_core::bill::validate_prefix;
use kasa_core::DEFAULT_BILL_PREFIX;
use kasa_db::DbConfig;

use crate::error::{SettlementError, SettlementResult};

// =============================================================================
// Database Settings
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// SQLite file; `:memory:` for a throwaway database.
    #[serde(default = "default_db_path")]
    pub path: String,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// How long a writer waits on SQLite's lock before failing.
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_ms: u64,
}

fn default_db_path() -> String {
    "./kasa.db".to_string()
}

fn default_max_connections() -> u32 {
    5
}

fn default_busy_timeout() -> u64 {
    5000
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: default_db_path(),
            max_connections: default_max_connections(),
            busy_timeout_ms: default_busy_timeout(),
        }
    }
}

// =============================================================================
// Billing Settings
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillingSettings {
    /// First segment of generated bill numbers: `<PREFIX>-<YYYYMMDD>-<NNNNNN>`.
    #[serde(default = "default_prefix")]
    pub prefix: String,
}

fn default_prefix() -> String {
    DEFAULT_BILL_PREFIX.to_string()
}

impl Default for BillingSettings {
    fn default() -> Self {
        BillingSettings {
            prefix: default_prefix(),
        }
    }
}

// =============================================================================
// Cart Settings
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartSettings {
    /// Open carts kept per store front before the oldest is evicted.
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
}

fn default_max_sessions() -> usize {
    8
}

impl Default for CartSettings {
    fn default() -> Self {
        CartSettings {
            max_sessions: default_max_sessions(),
        }
    }
}

// =============================================================================
// Root Config
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SettlementConfig {
    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub billing: BillingSettings,

    #[serde(default)]
    pub cart: CartSettings,
}

impl SettlementConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file, if given and present
    /// 3. Environment variables
    pub fn load(config_path: Option<&Path>) -> SettlementResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path {
            if path.exists() {
                info!(?path, "Loading settlement config from file");
                let contents = std::fs::read_to_string(path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<&Path>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load settlement config: {}. Using defaults.", e);
            Self::default()
        })
    }

    pub fn validate(&self) -> SettlementResult<()> {
        if self.database.path.trim().is_empty() {
            return Err(SettlementError::Config("database.path must not be empty".into()));
        }

        if self.database.max_connections == 0 {
            return Err(SettlementError::Config(
                "database.max_connections must be greater than 0".into(),
            ));
        }

        validate_prefix(&self.billing.prefix)
            .map_err(|e| SettlementError::Config(format!("billing.prefix: {e}")))?;

        if self.cart.max_sessions == 0 {
            return Err(SettlementError::Config(
                "cart.max_sessions must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("KASA_DB_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = path;
        }

        if let Ok(max) = std::env::var("KASA_DB_MAX_CONNECTIONS") {
            match max.parse::<u32>() {
                Ok(n) => self.database.max_connections = n,
                Err(_) => warn!(value = %max, "Ignoring invalid KASA_DB_MAX_CONNECTIONS"),
            }
        }

        if let Ok(prefix) = std::env::var("KASA_BILL_PREFIX") {
            debug!(prefix = %prefix, "Overriding bill prefix from environment");
            self.billing.prefix = prefix;
        }

        if let Ok(max) = std::env::var("KASA_CART_MAX_SESSIONS") {
            match max.parse::<usize>() {
                Ok(n) => self.cart.max_sessions = n,
                Err(_) => warn!(value = %max, "Ignoring invalid KASA_CART_MAX_SESSIONS"),
            }
        }
    }

    /// Pool settings for [`kasa_db::Database::new`].
    pub fn db_config(&self) -> DbConfig {
        if self.database.path == ":memory:" {
            return DbConfig::in_memory();
        }
        DbConfig::new(PathBuf::from(&self.database.path))
            .max_connections(self.database.max_connections)
            .busy_timeout(Duration::from_millis(self.database.busy_timeout_ms))
    }

    /// Defaults with an in-memory database.
    pub fn in_memory() -> Self {
        let mut config = Self::default();
        config.database.path = ":memory:".to_string();
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = SettlementConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.billing.prefix, "INV");
        assert_eq!(config.database.max_connections, 5);
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: SettlementConfig = toml::from_str(
            r#"
            [billing]
            prefix = "STR2"
            "#,
        )
        .unwrap();
        assert_eq!(config.billing.prefix, "STR2");
        assert_eq!(config.database.path, "./kasa.db");
        assert_eq!(config.cart.max_sessions, 8);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = SettlementConfig::default();
        config.billing.prefix = "inv-".to_string();
        assert!(matches!(config.validate(), Err(SettlementError::Config(_))));

        let mut config = SettlementConfig::default();
        config.database.max_connections = 0;
        assert!(config.validate().is_err());

        let mut config = SettlementConfig::default();
        config.cart.max_sessions = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let path = std::env::temp_dir().join("kasa-config-that-does-not-exist.toml");
        let config = SettlementConfig::load_or_default(Some(&path));
        assert_eq!(config.cart.max_sessions, 8);
    }

    #[test]
    fn test_in_memory_db_config() {
        let config = SettlementConfig::in_memory();
        assert!(config.validate().is_ok());
        assert_eq!(config.db_config().max_connections, 1);
    }
}
