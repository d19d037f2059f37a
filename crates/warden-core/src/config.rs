//! Top-level configuration tying a [`SandboxPolicy`] and a
//! [`ValidatorPolicy`] together, loaded the same way
//! `warden_validator::config::PolicyBuilder` loads its own policy:
//! compiled defaults, then an optional config file, then
//! `WARDEN_`-prefixed environment variables, later sources winning.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use warden_types::SandboxPolicy;
use warden_validator::config::ValidatorPolicy;

/// Errors raised while loading a [`WardenConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file at {path}: {source}")]
    FileRead {
        /// Path that failed to read.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse the configuration file.
    #[error("failed to parse {format} config: {source}")]
    ParseError {
        /// Format that failed to parse (YAML, TOML, JSON).
        format: String,
        /// Underlying parse error.
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// Unsupported or unrecognized configuration file extension.
    #[error("unsupported config file format: {message}")]
    UnsupportedFormat {
        /// Description of the problem.
        message: String,
    },
    /// An environment variable held a value that failed to parse.
    #[error("failed to parse environment variable {key}: {message}")]
    EnvParse {
        /// Environment variable key.
        key: String,
        /// Error message.
        message: String,
    },
    /// Failed to construct the validator policy's layers.
    #[error(transparent)]
    Validator(#[from] warden_validator::validator::ValidatorBuildError),
}

/// Combined policy surface for every subsystem the core wires together.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WardenConfig {
    /// Execution limits and import/builtin gates for the sandbox and the
    /// hardened shell executor.
    pub sandbox: SandboxPolicy,
    /// Policy for the five-layer input validator.
    pub validator: ValidatorPolicy,
    /// Root directory the workflow engine's checkpoint store writes
    /// file snapshots under. Defaults to `sandbox.backup_root`.
    #[serde(default)]
    pub checkpoint_root: Option<String>,
}

impl Default for WardenConfig {
    fn default() -> Self {
        Self {
            sandbox: SandboxPolicy::default(),
            validator: ValidatorPolicy::default(),
            checkpoint_root: None,
        }
    }
}

impl WardenConfig {
    /// The effective checkpoint root: `checkpoint_root` if set, else the
    /// sandbox policy's `backup_root`.
    #[must_use]
    pub fn checkpoint_root(&self) -> &str {
        self.checkpoint_root.as_deref().unwrap_or(&self.sandbox.backup_root)
    }
}

/// Builds a [`WardenConfig`] from compiled defaults, an optional file, and
/// `WARDEN_`-prefixed environment variables.
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    base: WardenConfig,
    use_env: bool,
}

impl ConfigBuilder {
    /// Start from secure compiled defaults.
    #[must_use]
    pub fn new() -> Self {
        Self { base: WardenConfig::default(), use_env: false }
    }

    /// Load config from a file (YAML, TOML, or JSON), replacing the
    /// current base entirely.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or parsed.
    pub fn with_file(mut self, path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::FileRead { path: path.to_path_buf(), source })?;

        let config: WardenConfig = match path.extension().and_then(|e| e.to_str()) {
            Some("yaml" | "yml") => serde_yaml::from_str(&content)
                .map_err(|e| ConfigError::ParseError { format: "YAML".to_string(), source: Box::new(e) })?,
            Some("toml") => toml::from_str(&content)
                .map_err(|e| ConfigError::ParseError { format: "TOML".to_string(), source: Box::new(e) })?,
            Some("json") => serde_json::from_str(&content)
                .map_err(|e| ConfigError::ParseError { format: "JSON".to_string(), source: Box::new(e) })?,
            _ => {
                return Err(ConfigError::UnsupportedFormat {
                    message: "file extension must be .yaml, .yml, .toml, or .json".to_string(),
                });
            }
        };

        self.base = config;
        Ok(self)
    }

    /// Enable `WARDEN_*` environment variable overrides, loaded via
    /// `.env` first if present.
    ///
    /// - `WARDEN_SANDBOX_LEVEL` — `minimal` | `standard` | `strict` | `paranoid`
    /// - `WARDEN_SANDBOX_BACKUP_ROOT`
    /// - `WARDEN_VALIDATOR_STRICT_MODE` — `true` | `false`
    #[must_use]
    pub fn with_env(mut self) -> Self {
        self.use_env = true;
        self
    }

    /// Finalize the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if an environment variable is set but
    /// fails to parse.
    pub fn build(mut self) -> Result<WardenConfig, ConfigError> {
        if self.use_env {
            dotenvy::dotenv().ok();

            if let Ok(v) = std::env::var("WARDEN_SANDBOX_LEVEL") {
                self.base.sandbox.level = match v.to_lowercase().as_str() {
                    "minimal" => warden_types::PolicyLevel::Minimal,
                    "standard" => warden_types::PolicyLevel::Standard,
                    "strict" => warden_types::PolicyLevel::Strict,
                    "paranoid" => warden_types::PolicyLevel::Paranoid,
                    _ => {
                        return Err(ConfigError::EnvParse {
                            key: "WARDEN_SANDBOX_LEVEL".to_string(),
                            message: "must be minimal, standard, strict, or paranoid".to_string(),
                        });
                    }
                };
            }

            if let Ok(v) = std::env::var("WARDEN_SANDBOX_BACKUP_ROOT") {
                self.base.sandbox.backup_root = v;
            }

            if let Ok(v) = std::env::var("WARDEN_VALIDATOR_STRICT_MODE") {
                self.base.validator.strict_mode = v.parse().map_err(|_| ConfigError::EnvParse {
                    key: "WARDEN_VALIDATOR_STRICT_MODE".to_string(),
                    message: "must be 'true' or 'false'".to_string(),
                })?;
            }
        }

        Ok(self.base)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_uses_minimal_sandbox_level() {
        let config = WardenConfig::default();
        assert_eq!(config.sandbox.level, warden_types::PolicyLevel::Minimal);
    }

    #[test]
    fn checkpoint_root_falls_back_to_sandbox_backup_root() {
        let config = WardenConfig::default();
        assert_eq!(config.checkpoint_root(), config.sandbox.backup_root);
    }

    #[test]
    fn builder_without_overrides_matches_default() {
        let config = ConfigBuilder::new().build().unwrap();
        assert_eq!(config.sandbox.level, warden_types::PolicyLevel::Minimal);
    }
}
