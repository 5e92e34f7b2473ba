//! # treeshift-train
//!
//! Online learning core for the treeshift shift-reduce parser.
//!
//! This crate provides:
//! - Parameter models organized as named tensor groups, with lazily
//!   materialized per-word and per-label tensors
//! - Gradient accumulators mirroring the model shape, merged per
//!   minibatch with `+=`
//! - Margin-violation objectives (early update and variants) over
//!   beam-search agendas
//! - A selective-regularization SGD optimizer with a decaying rate
//! - TOML training configuration and the grammar-extraction CLI
//!
//! Key training concepts:
//! - Model variants share one update protocol; they differ only in their
//!   tensor-group list, so the optimizer is one generic group walk
//! - A zero-count gradient means "nothing to learn this step" and is
//!   skipped silently, never an error
//! - Checkpoints are versioned JSON with symbols externalized as strings

use thiserror::Error;

pub mod config;
pub mod model;
pub mod objective;
pub mod optimizer;

pub use config::ConfigFile;
pub use model::{Gradient, GroupForm, GroupSpec, InitKind, LearnGate, Model, ModelKind};
pub use objective::ViolationPolicy;
pub use optimizer::{LearnOptions, Sgd};

// ============================================================================
// Error Types
// ============================================================================

/// Errors in training operations
#[derive(Error, Debug)]
pub enum TrainError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("config error: {0}")]
    Config(#[from] toml::de::Error),
    #[error("checkpoint version mismatch: expected {expected}, got {actual}")]
    VersionMismatch { expected: u32, actual: u32 },
    #[error("unknown label: {0}")]
    UnknownLabel(String),
    #[error("unknown tensor group: {0}")]
    UnknownGroup(String),
    #[error("corrupted checkpoint: {0}")]
    CorruptedModel(String),
}

/// Result type for training operations
pub type TrainResult<T> = Result<T, TrainError>;
