//! Configuration for the [`crate::validator::Validator`].
//!
//! This module provides the policy infrastructure shared by every layer of
//! the five-stage pipeline, including:
//!
//! - [`ValidatorPolicy`] – per-kind length caps, whitelist patterns, and the
//!   sensitive-path/base-dir settings the path-traversal sub-check needs
//! - [`PolicyBuilder`] – builder for constructing policies from files, env
//!   vars, and overrides
//! - [`FailMode`] – enumeration of failure behaviors (open/closed/log)
//!
//! ## Configuration Hierarchy
//!
//! Policies are resolved in the following order (later wins):
//!
//! 1. Compiled defaults (secure by default)
//! 2. Global config file (`warden-validator.toml` or `.yaml`)
//! 3. Environment variables (`WARDEN_VALIDATOR_*`)
//! 4. Caller-supplied overrides
//!
//! ## Example
//!
//! ```rust,ignore
//! use warden_validator::config::PolicyBuilder;
//!
//! let policy = PolicyBuilder::new()
//!     .with_file("config/validator.toml")?
//!     .with_env()
//!     .build()?;
//!
//! assert!(policy.enabled);
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use validator::Validate;

/// Errors that can occur during policy configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("Failed to read config file at {path}: {source}")]
    FileRead {
        /// Path that failed to read.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to parse configuration.
    #[error("Failed to parse {format} config: {source}")]
    ParseError {
        /// Format that failed to parse (YAML, TOML, JSON).
        format: String,
        /// Underlying parse error.
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Unsupported or unrecognised configuration file extension.
    #[error("Unsupported config file format: {message}")]
    UnsupportedFormat {
        /// Description of the problem.
        message: String,
    },

    /// Configuration validation failed.
    #[error("Policy validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),

    /// Environment variable parsing error.
    #[error("Failed to parse environment variable {key}: {message}")]
    EnvParse {
        /// Environment variable key.
        key: String,
        /// Error message.
        message: String,
    },
}

/// Behavior when a validation layer fails open (detector unavailable,
/// regex compile error) rather than producing a clean verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailMode {
    /// Block the request.
    Closed,
    /// Allow the request but log the event.
    Open,
    /// Log the event and continue (audit mode).
    LogOnly,
}

impl Default for FailMode {
    fn default() -> Self {
        Self::Closed // Secure by default
    }
}

/// Policy surface for the Validator: enablement, strictness, per-kind
/// length caps, whitelist patterns, and the sensitive-path list the
/// path-traversal sub-check consults.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ValidatorPolicy {
    /// Policy version for compatibility tracking.
    #[validate(length(min = 1))]
    pub version: String,

    /// Global enable/disable flag.
    pub enabled: bool,

    /// Default failure behavior when a sub-check cannot run.
    pub fail_mode: FailMode,

    /// Elevate warnings (semantic/whitelist layer, permissive findings) to
    /// hard blocks.
    pub strict_mode: bool,

    /// When `false`, sanitization downcasts non-ASCII to `?` after NFC
    /// normalization instead of preserving it.
    pub allow_unicode: bool,

    /// Maximum byte length applied when an input kind has no entry in
    /// `max_length_by_kind`.
    pub default_max_length: usize,

    /// Per-kind overrides for the length layer, keyed by [`crate::validator::InputKind`]'s
    /// wire name (`"command"`, `"file_path"`, `"prompt"`, `"filename"`,
    /// `"identifier"`, `"code"`, `"default"`).
    #[serde(default)]
    pub max_length_by_kind: HashMap<String, usize>,

    /// Per-kind whitelist regex source, applied by the whitelist layer.
    /// A kind absent from this map has no whitelist restriction.
    #[serde(default)]
    pub whitelist_by_kind: HashMap<String, String>,

    /// Directories the path-traversal sub-check always refuses, regardless
    /// of `base_dir`.
    #[serde(default = "default_sensitive_dirs")]
    pub sensitive_dirs: Vec<String>,

    /// Base directory `file_path` inputs are resolved against; an escape
    /// past this directory (via `..` or a symlink) is a violation. `None`
    /// disables the containment check (traversal-pattern detection still
    /// applies).
    #[serde(default)]
    pub base_dir: Option<String>,
}

fn default_sensitive_dirs() -> Vec<String> {
    [
        "/etc", "/root", "/var/log", "/proc", "/sys", "/boot", "/dev",
    ]
    .into_iter()
    .map(str::to_string)
    .collect()
}

impl Default for ValidatorPolicy {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            enabled: true,
            fail_mode: FailMode::Closed,
            strict_mode: false,
            allow_unicode: true,
            default_max_length: 4096,
            max_length_by_kind: default_max_length_by_kind(),
            whitelist_by_kind: HashMap::new(),
            sensitive_dirs: default_sensitive_dirs(),
            base_dir: None,
        }
    }
}

fn default_max_length_by_kind() -> HashMap<String, usize> {
    let mut m = HashMap::new();
    m.insert("command".to_string(), 2048);
    m.insert("file_path".to_string(), 1024);
    m.insert("prompt".to_string(), 16_384);
    m.insert("filename".to_string(), 255);
    m.insert("identifier".to_string(), 128);
    m.insert("code".to_string(), 65_536);
    m
}

/// Builder for constructing validator policies from multiple sources.
#[derive(Debug, Default)]
pub struct PolicyBuilder {
    base: ValidatorPolicy,
    file_path: Option<PathBuf>,
    use_env: bool,
}

impl PolicyBuilder {
    /// Create a new policy builder with secure defaults.
    #[must_use]
    pub fn new() -> Self {
        Self {
            base: ValidatorPolicy::default(),
            file_path: None,
            use_env: false,
        }
    }

    /// Load policy from a configuration file (YAML, TOML, or JSON).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or parsed.
    pub fn with_file(mut self, path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        self.file_path = Some(path.to_path_buf());

        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;

        let policy: ValidatorPolicy = match path.extension().and_then(|e| e.to_str()) {
            Some("yaml" | "yml") => {
                serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseError {
                    format: "YAML".to_string(),
                    source: Box::new(e),
                })?
            }
            Some("toml") => toml::from_str(&content).map_err(|e| ConfigError::ParseError {
                format: "TOML".to_string(),
                source: Box::new(e),
            })?,
            Some("json") => {
                serde_json::from_str(&content).map_err(|e| ConfigError::ParseError {
                    format: "JSON".to_string(),
                    source: Box::new(e),
                })?
            }
            _ => {
                return Err(ConfigError::UnsupportedFormat {
                    message: "file extension must be .yaml, .yml, .toml, or .json".to_string(),
                });
            }
        };

        self.base = policy;
        Ok(self)
    }

    /// Enable loading overrides from environment variables.
    ///
    /// Looks for variables prefixed with `WARDEN_VALIDATOR_`, e.g.:
    /// - `WARDEN_VALIDATOR_ENABLED=false`
    /// - `WARDEN_VALIDATOR_FAIL_MODE=open`
    /// - `WARDEN_VALIDATOR_STRICT_MODE=true`
    /// - `WARDEN_VALIDATOR_ALLOW_UNICODE=false`
    #[must_use]
    pub fn with_env(mut self) -> Self {
        self.use_env = true;
        self
    }

    /// Build the final validator policy.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if validation fails or environment variables
    /// are invalid.
    pub fn build(mut self) -> Result<ValidatorPolicy, ConfigError> {
        if self.use_env {
            dotenvy::dotenv().ok();

            if let Ok(v) = std::env::var("WARDEN_VALIDATOR_ENABLED") {
                self.base.enabled = v.parse().map_err(|_| ConfigError::EnvParse {
                    key: "WARDEN_VALIDATOR_ENABLED".to_string(),
                    message: "Must be 'true' or 'false'".to_string(),
                })?;
            }

            if let Ok(v) = std::env::var("WARDEN_VALIDATOR_FAIL_MODE") {
                self.base.fail_mode = match v.to_lowercase().as_str() {
                    "closed" => FailMode::Closed,
                    "open" => FailMode::Open,
                    "log_only" | "logonly" => FailMode::LogOnly,
                    _ => {
                        return Err(ConfigError::EnvParse {
                            key: "WARDEN_VALIDATOR_FAIL_MODE".to_string(),
                            message: "Must be 'closed', 'open', or 'log_only'".to_string(),
                        });
                    }
                };
            }

            if let Ok(v) = std::env::var("WARDEN_VALIDATOR_STRICT_MODE") {
                self.base.strict_mode = v.parse().map_err(|_| ConfigError::EnvParse {
                    key: "WARDEN_VALIDATOR_STRICT_MODE".to_string(),
                    message: "Must be 'true' or 'false'".to_string(),
                })?;
            }

            if let Ok(v) = std::env::var("WARDEN_VALIDATOR_ALLOW_UNICODE") {
                self.base.allow_unicode = v.parse().map_err(|_| ConfigError::EnvParse {
                    key: "WARDEN_VALIDATOR_ALLOW_UNICODE".to_string(),
                    message: "Must be 'true' or 'false'".to_string(),
                })?;
            }
        }

        self.base.validate()?;

        Ok(self.base)
    }
}

/// Backward name kept for callers migrating from the single-flag policy;
/// identical to [`ValidatorPolicy`].
pub type SecurityPolicy = ValidatorPolicy;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_is_enabled_and_closed() {
        let policy = ValidatorPolicy::default();
        assert!(policy.enabled);
        assert_eq!(policy.fail_mode, FailMode::Closed);
        assert_eq!(policy.version, "1.0");
    }

    #[test]
    fn builder_without_overrides_matches_default() {
        let policy = PolicyBuilder::new().build().unwrap();
        assert!(policy.enabled);
        assert_eq!(policy.max_length_by_kind.get("command"), Some(&2048));
    }

    #[test]
    fn fail_mode_serializes_lowercase() {
        let json = serde_json::to_string(&FailMode::Closed).unwrap();
        assert_eq!(json, r#""closed""#);
        let parsed: FailMode = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, FailMode::Closed);
    }

    #[test]
    fn sensitive_dirs_has_defaults() {
        let policy = ValidatorPolicy::default();
        assert!(policy.sensitive_dirs.iter().any(|d| d == "/etc"));
    }
}
