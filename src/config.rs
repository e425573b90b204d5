//! TOML configuration.
//!
//! Every section and key is optional; a missing file means all defaults.
//! Unknown keys are rejected so a typo never silently falls back to a
//! default. Defaults mirror the desktop application this daemon replaces:
//! swallow on from the first keystroke, re-hook every second after a
//! four-second start-up grace period.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::interceptor::{InterceptorOptions, SwallowStrategy};

/// File looked up in the working directory when no `--config` is given.
pub const DEFAULT_CONFIG_FILE: &str = "keyguard.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub interceptor: InterceptorConfig,
    pub rehook: RehookConfig,
    pub display: DisplayConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InterceptorConfig {
    pub swallow_on_start: bool,
    pub swallow_strategy: SwallowStrategy,
    pub pass_injected: bool,
}

impl Default for InterceptorConfig {
    fn default() -> Self {
        Self {
            swallow_on_start: true,
            // Block would lock the whole keyboard while protected.
            swallow_strategy: SwallowStrategy::BypassChain,
            pass_injected: false,
        }
    }
}

impl InterceptorConfig {
    pub fn options(&self) -> InterceptorOptions {
        InterceptorOptions {
            swallow_strategy: self.swallow_strategy,
            pass_injected: self.pass_injected,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RehookConfig {
    pub enabled: bool,
    pub interval_ms: u64,
    pub startup_delay_ms: u64,
}

impl Default for RehookConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: 1000,
            startup_delay_ms: 4000,
        }
    }
}

impl RehookConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn startup_delay(&self) -> Duration {
        Duration::from_millis(self.startup_delay_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DisplayConfig {
    /// Echo captured characters (keylogger demonstration mode).
    pub show_captured: bool,
    pub capture_capacity: usize,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            show_captured: false,
            capture_capacity: 4096,
        }
    }
}

impl Config {
    /// Parses and validates a TOML document.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads `path`. A missing file yields defaults only when `optional` is set.
    pub fn load(path: &Path, optional: bool) -> Result<Self, ConfigError> {
        let text = match fs::read_to_string(path) {
            Ok(t) => t,
            Err(e) if optional && e.kind() == io::ErrorKind::NotFound => {
                log::debug!("config: {} not found, using defaults", path.display());
                return Ok(Config::default());
            }
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        let config = Self::from_toml(&text)?;
        log::info!("config: loaded {}", path.display());
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.rehook.interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "rehook.interval_ms must be greater than 0".into(),
            ));
        }
        if self.display.capture_capacity == 0 {
            return Err(ConfigError::Invalid(
                "display.capture_capacity must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_is_all_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config, Config::default());
        assert!(config.interceptor.swallow_on_start);
        assert_eq!(
            config.interceptor.swallow_strategy,
            SwallowStrategy::BypassChain
        );
        assert_eq!(config.rehook.interval(), Duration::from_secs(1));
        assert_eq!(config.rehook.startup_delay(), Duration::from_secs(4));
        assert!(!config.display.show_captured);
    }

    #[test]
    fn full_document_parses() {
        let config = Config::from_toml(
            r#"
            [interceptor]
            swallow_on_start = false
            swallow_strategy = "block"
            pass_injected = true

            [rehook]
            enabled = false
            interval_ms = 250
            startup_delay_ms = 0

            [display]
            show_captured = true
            capture_capacity = 16
            "#,
        )
        .unwrap();

        assert!(!config.interceptor.swallow_on_start);
        assert_eq!(
            config.interceptor.options(),
            InterceptorOptions {
                swallow_strategy: SwallowStrategy::Block,
                pass_injected: true,
            }
        );
        assert!(!config.rehook.enabled);
        assert_eq!(config.rehook.interval(), Duration::from_millis(250));
        assert_eq!(config.display.capture_capacity, 16);
    }

    #[test]
    fn partial_section_keeps_other_defaults() {
        let config = Config::from_toml("[rehook]\ninterval_ms = 500\n").unwrap();
        assert_eq!(config.rehook.interval_ms, 500);
        assert_eq!(config.rehook.startup_delay_ms, 4000);
        assert!(config.rehook.enabled);
    }

    #[test]
    fn unknown_key_is_rejected() {
        let err = Config::from_toml("[rehook]\ninterval = 500\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
        assert!(err.to_string().contains("interval"));
    }

    #[test]
    fn unknown_strategy_is_rejected() {
        let err = Config::from_toml("[interceptor]\nswallow_strategy = \"drop\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn zero_interval_is_invalid() {
        let err = Config::from_toml("[rehook]\ninterval_ms = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn zero_capacity_is_invalid() {
        let err = Config::from_toml("[display]\ncapture_capacity = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn missing_optional_file_gives_defaults() {
        let path = std::env::temp_dir().join("keyguard-missing-config-for-test.toml");
        let config = Config::load(&path, true).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn missing_required_file_is_io_error() {
        let path = std::env::temp_dir().join("keyguard-missing-config-for-test.toml");
        let err = Config::load(&path, false).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn load_reads_file_from_disk() {
        let path = std::env::temp_dir().join(format!(
            "keyguard-config-test-{}.toml",
            std::process::id()
        ));
        fs::write(&path, "[display]\nshow_captured = true\n").unwrap();
        let config = Config::load(&path, false);
        let _ = fs::remove_file(&path);
        assert!(config.unwrap().display.show_captured);
    }
}
