//! Configuration management for testloom.
//!
//! Configuration is loaded from multiple sources with the following priority:
//! 1. Environment variables (highest priority)
//! 2. Project-local `testloom.toml` file
//! 3. User config `~/.config/testloom/config.toml`
//! 4. Built-in defaults (lowest priority)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

mod defaults;

pub use defaults::*;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Test source discovery configuration.
    pub discovery: DiscoveryConfig,

    /// Test execution configuration.
    pub execution: ExecutionConfig,

    /// Jest adapter configuration.
    pub jest: JestConfig,

    /// PHPUnit adapter configuration.
    pub phpunit: PhpUnitConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            discovery: DiscoveryConfig::default(),
            execution: ExecutionConfig::default(),
            jest: JestConfig::default(),
            phpunit: PhpUnitConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from default locations.
    ///
    /// Searches for config in order:
    /// 1. `./testloom.toml` (project local)
    /// 2. `~/.config/testloom/config.toml` (user config)
    /// 3. Falls back to defaults
    pub fn load() -> Result<Self, ConfigError> {
        if Path::new(PROJECT_CONFIG_FILE).exists() {
            return Self::from_file(PROJECT_CONFIG_FILE);
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join(USER_CONFIG_DIR).join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        let mut config = Self::default();
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&content)?;

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Apply environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(ms) = std::env::var("TESTLOOM_CLEAR_PASSED_MS") {
            if let Ok(n) = ms.parse() {
                self.execution.clear_passed_after_ms = n;
            }
        }
        if let Ok(bin) = std::env::var("TESTLOOM_JEST_BIN") {
            self.jest.executable = Some(PathBuf::from(bin));
        }
        if let Ok(bin) = std::env::var("TESTLOOM_PHPUNIT_BIN") {
            self.phpunit.executable = Some(PathBuf::from(bin));
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for (name, patterns) in [("jest", &self.jest.patterns), ("phpunit", &self.phpunit.patterns)] {
            if patterns.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "[{name}] patterns must not be empty"
                )));
            }
        }
        if self.execution.report_prefix.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "[execution] report_prefix must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Create a default config file content as a string.
    pub fn default_config_string() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

/// Test source discovery configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Directory names skipped while scanning for test sources.
    pub exclude_dirs: Vec<String>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            exclude_dirs: DEFAULT_EXCLUDE_DIRS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Test execution configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Milliseconds after which passed marks are cleared.
    pub clear_passed_after_ms: u64,

    /// File name prefix for temporary report files.
    pub report_prefix: String,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            clear_passed_after_ms: DEFAULT_CLEAR_PASSED_AFTER_MS,
            report_prefix: DEFAULT_REPORT_PREFIX.to_string(),
        }
    }
}

/// Jest adapter configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JestConfig {
    /// Glob patterns (relative to a project root) matching test sources.
    pub patterns: Vec<String>,

    /// Explicit executable, bypassing the built-in lookup order.
    pub executable: Option<PathBuf>,

    /// Extra arguments appended to every invocation.
    pub extra_args: Vec<String>,
}

impl Default for JestConfig {
    fn default() -> Self {
        Self {
            patterns: DEFAULT_JEST_PATTERNS.iter().map(|s| s.to_string()).collect(),
            executable: None,
            extra_args: Vec::new(),
        }
    }
}

/// PHPUnit adapter configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PhpUnitConfig {
    /// Glob patterns (relative to a project root) matching test sources.
    pub patterns: Vec<String>,

    /// Explicit executable, bypassing the built-in lookup order.
    pub executable: Option<PathBuf>,

    /// Extra arguments appended to every invocation.
    pub extra_args: Vec<String>,
}

impl Default for PhpUnitConfig {
    fn default() -> Self {
        Self {
            patterns: DEFAULT_PHPUNIT_PATTERNS.iter().map(|s| s.to_string()).collect(),
            executable: None,
            extra_args: Vec::new(),
        }
    }
}
