//! ```text
//! steps ──► DependencyGraph::antichain_levels() ──► [level 0] [level 1] ...
//!                                                       │
//!                                           risky? ──yes──► CheckpointStore::save
//!                                                       │
//!                                                       ▼
//!                                                  StepRunner::run
//!                                                       │
//!                                                       ▼
//!                                               Critique::of(outcome)
//!                                                       │
//!                                          failed? ──yes──► CheckpointStore::restore
//! ```
//!
//! # warden-workflow
//!
//! **Dependency-graph scheduling with per-step critique and file-level
//! checkpointing.**
//!
//! Steps declare their dependencies; [`graph::DependencyGraph`] groups
//! them into antichains — levels whose steps share no edges and can run
//! concurrently. [`engine::WorkflowEngine`] walks those levels,
//! checkpointing risky steps through a [`checkpoint::CheckpointStore`]
//! before they run and rolling back the moment a step's outcome or
//! [`critique::Critique`] fails.
//!
//! Step execution itself is not this crate's concern: [`engine::StepRunner`]
//! is the seam an embedder fills in to actually run a step's
//! [`warden_types::Request`] against whatever backend it has.
//!
//! ## Modules
//!
//! - [`graph`] – dependency tracking and antichain-level scheduling
//! - [`critique`] – per-step output quality check, including the Lazy
//!   Execution Index
//! - [`checkpoint`] – file snapshot/restore keyed by transaction and
//!   checkpoint id
//! - [`engine`] – ties scheduling, checkpointing, and critique together

#![warn(missing_docs, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod checkpoint;
pub mod critique;
pub mod engine;
pub mod graph;

pub use checkpoint::{Checkpoint, CheckpointError, CheckpointStore, FileCheckpointStore};
pub use critique::Critique;
pub use engine::{StepFailure, StepRunner, WorkflowEngine, WorkflowReport};
pub use graph::DependencyGraph;
