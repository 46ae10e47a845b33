//! Configuration system for opjit.
//!
//! Controls where temporary compilation units are written, whether they are
//! kept, and how the JIT environment generates code.
//!
//! # Examples
//!
//! Load configuration from TOML string:
//!
//! ```
//! use opjit_config::{JitConfig, OptLevel};
//!
//! let config = JitConfig::from_toml_str(r#"
//!     [temp]
//!     dir = "/var/tmp/opjit"
//!     keep_files = false
//!
//!     [codegen]
//!     opt_level = "speed"
//! "#).unwrap();
//!
//! assert!(!config.temp.keep_files);
//! assert_eq!(config.codegen.opt_level, OptLevel::Speed);
//! ```
//!
//! Use default config when file is missing:
//!
//! ```
//! use opjit_config::JitConfig;
//!
//! let config = JitConfig::load("opjit.toml").unwrap_or_default();
//! // Proceeds with defaults if file doesn't exist
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment variable naming a configuration file to load.
pub const CONFIG_ENV: &str = "OPJIT_CONFIG";

/// Configuration error
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Main runtime compiler configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct JitConfig {
    /// Temporary compilation unit settings.
    #[serde(default)]
    pub temp: TempConfig,

    /// Native code generation settings.
    #[serde(default)]
    pub codegen: CodegenConfig,
}

impl JitConfig {
    /// Creates a new default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns error if file doesn't exist or contains invalid TOML.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_toml_file(path)
    }

    /// Loads the file named by `OPJIT_CONFIG`, or defaults when it is unset.
    ///
    /// Files ending in `.yaml` or `.yml` are read as YAML, everything else
    /// as TOML.
    pub fn from_env_or_default() -> Result<Self, ConfigError> {
        match std::env::var_os(CONFIG_ENV) {
            Some(path) => {
                let path = PathBuf::from(path);
                let is_yaml = matches!(
                    path.extension().and_then(|e| e.to_str()),
                    Some("yaml") | Some("yml")
                );
                if is_yaml {
                    Self::from_yaml_file(path)
                } else {
                    Self::from_toml_file(path)
                }
            }
            None => Ok(Self::default()),
        }
    }

    /// Loads configuration from a TOML file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Parses configuration from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a YAML file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&contents)
    }

    /// Parses configuration from a YAML string.
    pub fn from_yaml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Sets an explicit temporary directory, bypassing the environment.
    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp.dir = Some(dir.into());
        self
    }

    /// Sets whether temporary compilation units survive the compile call.
    pub fn with_keep_temp_files(mut self, keep: bool) -> Self {
        self.temp.keep_files = keep;
        self
    }

    /// Sets the native optimisation level.
    pub fn with_opt_level(mut self, opt_level: OptLevel) -> Self {
        self.codegen.opt_level = opt_level;
        self
    }

    /// Checks values serde cannot check on its own.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.temp.dir_env.is_empty() {
            return Err(ConfigError::Invalid("temp.dir_env must not be empty".into()));
        }
        if self.temp.prefix.contains(std::path::MAIN_SEPARATOR) {
            return Err(ConfigError::Invalid(format!(
                "temp.prefix must not contain a path separator: {:?}",
                self.temp.prefix
            )));
        }
        if !self.temp.suffix.starts_with('.') {
            return Err(ConfigError::Invalid(format!(
                "temp.suffix must start with '.': {:?}",
                self.temp.suffix
            )));
        }
        Ok(())
    }
}

/// Where and how temporary compilation units are written.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case", default)]
pub struct TempConfig {
    /// Explicit directory. Takes precedence over `dir_env`.
    pub dir: Option<PathBuf>,

    /// Environment variable naming the directory.
    pub dir_env: String,

    /// Directory used when neither `dir` nor `dir_env` is set.
    pub fallback_dir: PathBuf,

    /// File name prefix.
    pub prefix: String,

    /// File name suffix, including the dot.
    pub suffix: String,

    /// Keep the unit after compiling (useful when debugging generated code).
    pub keep_files: bool,
}

impl Default for TempConfig {
    fn default() -> Self {
        Self {
            dir: None,
            dir_env: "TMPDIR".to_string(),
            fallback_dir: PathBuf::from("/tmp"),
            prefix: "opjit_".to_string(),
            suffix: ".c".to_string(),
            keep_files: true,
        }
    }
}

impl TempConfig {
    /// Resolves the directory from the process environment.
    pub fn resolve_dir(&self) -> PathBuf {
        self.resolve_dir_with(|name| std::env::var_os(name).map(PathBuf::from))
    }

    /// Resolves the directory with a custom environment lookup.
    pub fn resolve_dir_with<F>(&self, lookup: F) -> PathBuf
    where
        F: Fn(&str) -> Option<PathBuf>,
    {
        if let Some(dir) = &self.dir {
            return dir.clone();
        }
        match lookup(&self.dir_env) {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => self.fallback_dir.clone(),
        }
    }
}

/// Native code generation settings for the JIT environment.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case", default)]
pub struct CodegenConfig {
    /// Default optimisation level. A module compiled with an `-O` option
    /// is generated at that level instead.
    pub opt_level: OptLevel,

    /// Run the IR verifier before generating native code.
    pub verifier: bool,
}

impl Default for CodegenConfig {
    fn default() -> Self {
        Self {
            opt_level: OptLevel::None,
            verifier: true,
        }
    }
}

/// Optimisation level for native code generation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OptLevel {
    /// No optimisation (fastest compile).
    #[default]
    None,

    /// Optimise for execution speed.
    Speed,

    /// Optimise for both speed and code size.
    SpeedAndSize,
}

impl OptLevel {
    /// Value of the Cranelift `opt_level` setting.
    pub fn as_setting(self) -> &'static str {
        match self {
            OptLevel::None => "none",
            OptLevel::Speed => "speed",
            OptLevel::SpeedAndSize => "speed_and_size",
        }
    }
}
