//! # treeshift-core
//!
//! Grammar extraction and scoring primitives for a shift-reduce
//! constituency parser.
//!
//! This crate provides:
//! - Symbol interning with terminal/nonterminal distinction
//! - Constituency trees with s-expression I/O
//! - Left/right binarization of arbitrary-arity trees
//! - Binarized grammar extraction with rare-word cutoff and
//!   signature-based OOV fallback
//! - A runtime grammar with O(1) rule lookup for parsing
//! - A log-space probability semiring for numerically stable scoring
//!
//! Key design points:
//! - Symbols are handles into an explicit `SymbolTable` owned by the run;
//!   there is no process-global interner
//! - Rule sets and histograms iterate deterministically, so extracting the
//!   same treebank twice writes byte-identical grammar files
//! - The signature heuristic is a capability (`Signature` trait); the
//!   grammar only requires that it is deterministic and may return `UNK`

use thiserror::Error;

pub mod binarize;
pub mod grammar;
pub mod logprob;
pub mod rule;
pub mod signature;
pub mod symbol;
pub mod tree;

pub use binarize::{binarize_left, binarize_right, flatten_left, flatten_right, Binarize};
pub use grammar::{cutoff_terminal, ExtractedGrammar, Grammar, GrammarExtractor, Unigram};
pub use logprob::Logprob;
pub use rule::Rule;
pub use signature::{Signature, UnkSignature};
pub use symbol::{Symbol, SymbolTable};
pub use tree::{Tree, TreeReader};

// ============================================================================
// Error Types
// ============================================================================

/// Errors while reading or constructing trees
#[derive(Error, Debug)]
pub enum TreeError {
    #[error("tree parse error: {0}")]
    Parse(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for tree operations
pub type TreeResult<T> = Result<T, TreeError>;

/// Errors during grammar extraction, normalization and I/O
#[derive(Error, Debug)]
pub enum GrammarError {
    /// Trees in one run must share a single goal label.
    #[error("different goal: previous = {previous} current = {current}")]
    GoalConflict { previous: String, current: String },
    /// A node of the binarized tree had arity outside {1, 2}.
    #[error("invalid binary tree")]
    InvalidBinaryTree,
    /// A rule whose children violate the terminal/nonterminal invariants.
    #[error("invalid rule: {0}")]
    InvalidRule(String),
    /// No sentence-root label was observed, so no start symbol can be chosen.
    #[error("invalid pre-goal label: empty sentence-root histogram")]
    EmptySentenceRoot,
    #[error("rule parse error: {0}")]
    Parse(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Tree(#[from] TreeError),
}

/// Result type for grammar operations
pub type GrammarResult<T> = Result<T, GrammarError>;

/// Errors from log-space arithmetic
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogprobError {
    /// Subtracting a larger probability from a smaller one.
    #[error("invalid minus")]
    InvalidMinus,
}

/// Result type for log-space arithmetic
pub type LogprobResult<T> = Result<T, LogprobError>;
