//! ```text
//! code ──► AstAnalyzer ──► violations? ──yes──► Outcome::refused
//!            │
//!            no
//!            │
//!            ▼
//!    PolicyLevel >= STRICT?
//!       │            │
//!       no            yes
//!       │            │
//!       ▼            ▼
//! in-process VM   python3 -c <code> via ShellExecutor
//!  (SafeEnv scope)  (OS-level isolation)
//! ```
//!
//! # warden-sandbox
//!
//! **AST-checked, import-gated Python execution.**
//!
//! Untrusted Python never reaches an interpreter unexamined: every
//! snippet is parsed and walked for blocked imports, dangerous calls,
//! dunder/reflection access, and unbounded `while True` loops before
//! [`PythonSandbox::execute`] decides whether to run it in-process
//! (fast, SafeEnv-restricted scope) or in an isolated `python3`
//! subprocess (slower, OS-enforced boundary) based on the configured
//! [`warden_types::PolicyLevel`].
//!
//! ## Modules
//!
//! - [`ast_analyzer`] – static AST walk, the first and cheapest gate
//! - [`safe_env`] – restricted global scope construction for in-process runs
//! - [`sandbox`] – orchestration and the in-process/subprocess decision

#![warn(missing_docs, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod ast_analyzer;
pub mod safe_env;
pub mod sandbox;

pub use ast_analyzer::AstAnalyzer;
pub use sandbox::PythonSandbox;
