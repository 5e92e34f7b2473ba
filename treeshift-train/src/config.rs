//! Training configuration.
//!
//! A TOML file with one section per concern; every field has a default,
//! so a config only states what it overrides.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use treeshift_core::Binarize;

use crate::model::ModelKind;
use crate::objective::ViolationPolicy;
use crate::optimizer::{LearnOptions, Sgd};
use crate::TrainResult;

/// Top-level training configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    pub grammar: GrammarConfig,
    pub training: TrainingConfig,
    pub optimizer: OptimizerConfig,
    pub paths: PathsConfig,
}

impl ConfigFile {
    pub fn load(path: &Path) -> TrainResult<ConfigFile> {
        Ok(toml::from_str(&std::fs::read_to_string(path)?)?)
    }
}

/// Binarization direction as spelled in configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BinarizeDirection {
    #[default]
    Left,
    Right,
}

impl BinarizeDirection {
    pub fn direction(self) -> Binarize {
        match self {
            BinarizeDirection::Left => Binarize::Left,
            BinarizeDirection::Right => Binarize::Right,
        }
    }
}

/// Grammar extraction settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GrammarConfig {
    /// Keep terminals seen at least this often; 0 disables the cutoff
    pub cutoff: u64,
    /// Signature name used for rare-word classes
    pub signature: String,
    pub binarize: BinarizeDirection,
}

impl Default for GrammarConfig {
    fn default() -> Self {
        Self {
            cutoff: 3,
            signature: "none".to_string(),
            binarize: BinarizeDirection::default(),
        }
    }
}

/// Model shape and training-loop settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub kind: ModelKind,
    pub hidden: usize,
    pub embedding: usize,
    pub beam: usize,
    pub epochs: usize,
    pub violation: ViolationPolicy,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            kind: ModelKind::default(),
            hidden: 64,
            embedding: 32,
            beam: 32,
            epochs: 10,
            violation: ViolationPolicy::default(),
        }
    }
}

/// Optimizer settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    pub eta0: f32,
    pub lambda: f32,
    pub learn_embedding: bool,
    pub learn_classification: bool,
    pub learn_hidden: bool,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            eta0: 0.1,
            lambda: 1e-5,
            learn_embedding: true,
            learn_classification: true,
            learn_hidden: true,
        }
    }
}

impl OptimizerConfig {
    pub fn sgd(&self) -> Sgd {
        Sgd::new(self.eta0, self.lambda)
    }

    pub fn learn_options(&self) -> LearnOptions {
        LearnOptions {
            learn_embedding: self.learn_embedding,
            learn_classification: self.learn_classification,
            learn_hidden: self.learn_hidden,
        }
    }
}

/// File locations
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub train: PathBuf,
    pub grammar: PathBuf,
    pub model: PathBuf,
}
