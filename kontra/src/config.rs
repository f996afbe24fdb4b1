//! Configuration loading and management.
//!
//! Configuration is loaded from multiple sources with the following precedence
//! (highest to lowest):
//!
//! 1. Environment variables
//! 2. `.kontra.toml` in the current directory
//! 3. `~/.config/kontra/config.toml`
//! 4. Default values
//!
//! # Configuration File Format
//!
//! ```toml
//! [engine]
//! threads = 8
//! io_debug = false
//! preplan = true
//! sql_pushdown = true
//!
//! [csv]
//! mode = "auto"   # auto, file_engine, parquet
//! ```
//!
//! # Environment Variables
//!
//! | Variable | Description |
//! |----------|-------------|
//! | `KONTRA_THREADS` | caps the SQL engine's internal thread pool |
//! | `KONTRA_IO_DEBUG` | `1` enables io-debug fields in run stats |

use std::{env, fs, path::PathBuf};

use serde::Deserialize;

use crate::error::{AppResult, config_error};

/// Engine-wide configuration.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub csv:    CsvConfig
}

/// Runtime tunables for the orchestrator and its tiers.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    pub threads:      Option<usize>,
    pub io_debug:     bool,
    pub preplan:      bool,
    pub sql_pushdown: bool
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            threads:      None,
            io_debug:     false,
            preplan:      true,
            sql_pushdown: true
        }
    }
}

/// CSV handling policy shared by the materializer registry and the SQL
/// executor registry (`spec.md` §4.5's `csv_mode`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CsvMode {
    Auto,
    FileEngine,
    Parquet
}

#[derive(Debug, Clone, Deserialize)]
pub struct CsvConfig {
    pub mode: CsvMode
}

impl Default for CsvConfig {
    fn default() -> Self {
        Self { mode: CsvMode::Auto }
    }
}

impl Config {
    /// Load configuration from file and environment.
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables
    /// 2. Config file in current directory (`.kontra.toml`)
    /// 3. Config file in home directory (`~/.config/kontra/config.toml`)
    /// 4. Default values
    pub fn load() -> AppResult<Self> {
        let mut config = Self::default();

        if let Some(home) = env::var_os("HOME") {
            let home_config = PathBuf::from(home).join(".config").join("kontra").join("config.toml");
            if home_config.exists() {
                let content = fs::read_to_string(&home_config)
                    .map_err(|e| config_error(format!("failed to read config file: {e}")))?;
                config = toml::from_str(&content).map_err(|e| config_error(format!("invalid config file: {e}")))?;
            }
        }

        let local_config = PathBuf::from(".kontra.toml");
        if local_config.exists() {
            let content = fs::read_to_string(&local_config)
                .map_err(|e| config_error(format!("failed to read config file: {e}")))?;
            config = toml::from_str(&content).map_err(|e| config_error(format!("invalid config file: {e}")))?;
        }

        if let Ok(threads) = env::var("KONTRA_THREADS") {
            config.engine.threads = threads.parse().ok();
        }

        if let Ok(debug) = env::var("KONTRA_IO_DEBUG") {
            config.engine.io_debug = debug == "1";
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_enable_preplan_and_pushdown() {
        let config = Config::default();
        assert!(config.engine.preplan);
        assert!(config.engine.sql_pushdown);
        assert_eq!(config.csv.mode, CsvMode::Auto);
    }
}
