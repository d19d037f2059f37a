//! ```text
//! SandboxPolicy ─┬─► PolicyBuilder ─► Runtime Policy
//!                │                     │
//!                │                     └─► Validator::validate ──► layers ──► Outcome
//!                │                                                  │
//!                │                                                  ├─► layer_type
//!                │                                                  ├─► layer_length
//!                │                                                  ├─► layer_whitelist
//!                │                                                  ├─► layer_injection
//!                │                                                  └─► layer_semantic
//!                │
//!                └─► AuditSink ◄── every non-Allow outcome
//! ```
//!
//! # warden-validator
//!
//! **Input validation fortress for untrusted agent-tool arguments.**
//!
//! Every string an LLM-driven agent hands to a shell command, a file path,
//! or a Python snippet passes through this crate's five-layer pipeline
//! before it reaches an executor: type check, length check, whitelist
//! check, injection detection (command, path-traversal, SQL, and prompt
//! injection), and a final semantic pass. The crate favors conservative
//! defaults — ambiguous input is refused, not coerced — and never executes
//! anything itself.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use warden_validator::prelude::*;
//!
//! let policy = PolicyBuilder::new()
//!     .with_file("warden.toml")?
//!     .with_env()
//!     .build()?;
//!
//! let outcome = Validator::new(policy).validate("ls -la", InputKind::Command);
//! ```
//!
//! ## Modules
//!
//! - [`config`] – policy configuration, builder pattern, YAML/env loading
//! - [`input`] – normalization, structural analysis, and pattern-based
//!   injection detection
//! - [`validator`] – the five-layer pipeline itself

#![warn(missing_docs, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
#[cfg(feature = "heuristics")]
pub mod input;
pub mod validator;

/// Re-exports for convenient access to core types.
pub mod prelude {
    pub use crate::config::{FailMode, PolicyBuilder, SecurityPolicy};
    pub use crate::validator::{InputKind, ValidationResult, Validator};

    #[cfg(feature = "heuristics")]
    pub use crate::input::ensemble::{Decision, EnsembleScorer};
    #[cfg(feature = "heuristics")]
    pub use crate::input::injection::HeuristicDetector;
}
