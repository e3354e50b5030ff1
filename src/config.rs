use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::handlers::PollSettings;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub polling: PollingConfig,
    pub paths: PathsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Backoff tuning for required and optional wizard steps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// In-phase attempts for required steps (total calls, not re-calls)
    #[serde(default = "default_hard_attempts")]
    pub hard_attempts: u32,
    #[serde(default = "default_hard_base_delay")]
    pub hard_base_delay_ms: u64,
    #[serde(default = "default_hard_max_delay")]
    pub hard_max_delay_ms: u64,
    #[serde(default = "default_soft_base_delay")]
    pub soft_base_delay_ms: u64,
}

fn default_hard_attempts() -> u32 {
    2
}

fn default_hard_base_delay() -> u64 {
    1000
}

fn default_hard_max_delay() -> u64 {
    3000
}

fn default_soft_base_delay() -> u64 {
    800
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            hard_attempts: default_hard_attempts(),
            hard_base_delay_ms: default_hard_base_delay(),
            hard_max_delay_ms: default_hard_max_delay(),
            soft_base_delay_ms: default_soft_base_delay(),
        }
    }
}

/// Bounded-wait tuning for page readiness checks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    #[serde(default = "default_poll_timeout")]
    pub timeout_ms: u64,
    #[serde(default = "default_poll_tick")]
    pub tick_ms: u64,
}

fn default_poll_timeout() -> u64 {
    10_000
}

fn default_poll_tick() -> u64 {
    250
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_poll_timeout(),
            tick_ms: default_poll_tick(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Where run state and logs live
    pub state: String,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to log to file in channel mode (false = stderr for debugging)
    #[serde(default = "default_log_to_file")]
    pub to_file: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_to_file() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            to_file: default_log_to_file(),
        }
    }
}

impl Config {
    /// Path to the local config file within the state directory
    pub fn local_config_path() -> PathBuf {
        PathBuf::from(".lister/config.toml")
    }

    pub fn load(config_path: Option<&str>) -> Result<Self> {
        // Start with embedded defaults so lister works without config files
        let defaults = Config::default();
        let defaults_json =
            serde_json::to_string(&defaults).context("Failed to serialize default config")?;

        let mut builder = config::Config::builder().add_source(config::File::from_str(
            &defaults_json,
            config::FileFormat::Json,
        ));

        // Local config in .lister/ (primary config location)
        let local_config = Self::local_config_path();
        if local_config.exists() {
            builder = builder.add_source(config::File::from(local_config));
        }

        // User config in ~/.config/lister/ (optional global overrides)
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("lister").join("config.toml");
            if user_config.exists() {
                builder = builder.add_source(config::File::from(user_config));
            }
        }

        // Explicit config file (CLI override)
        if let Some(path) = config_path {
            builder = builder.add_source(config::File::with_name(path));
        }

        // Environment variables with LISTER_ prefix
        builder = builder.add_source(
            config::Environment::with_prefix("LISTER")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build().context("Failed to load configuration")?;
        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Save config to .lister/config.toml
    pub fn save(&self) -> Result<()> {
        let config_path = Self::local_config_path();

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let toml_str =
            toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;

        std::fs::write(&config_path, toml_str).context("Failed to write config file")?;

        Ok(())
    }

    /// Get absolute path to state directory
    pub fn state_path(&self) -> PathBuf {
        let path = PathBuf::from(&self.paths.state);
        if path.is_absolute() {
            path
        } else {
            std::env::current_dir().unwrap_or_default().join(path)
        }
    }

    /// Get absolute path to logs directory
    pub fn logs_path(&self) -> PathBuf {
        self.state_path().join("logs")
    }

    pub fn poll_settings(&self) -> PollSettings {
        PollSettings {
            timeout: Duration::from_millis(self.polling.timeout_ms),
            tick: Duration::from_millis(self.polling.tick_ms),
        }
    }

    pub fn hard_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry.hard_base_delay_ms)
    }

    pub fn soft_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry.soft_base_delay_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            polling: PollingConfig::default(),
            paths: PathsConfig {
                state: ".lister".to_string(), // Relative to cwd
            },
            logging: LoggingConfig::default(),
        }
    }
}
