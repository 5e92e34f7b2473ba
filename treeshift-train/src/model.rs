//! Parameter models and gradient accumulators.
//!
//! A model is a flat list of named tensor groups. The list is a pure
//! function of the model kind and the hidden/embedding sizes, so a model,
//! its gradients, and its checkpoints always agree on shape. Four group
//! forms cover every parameter:
//!
//! - `Embedding`: one column per terminal word, materialized lazily
//! - `Category`: one `rows x cols` block per nonterminal label, stacked
//!   into a single matrix at `label_index * rows`
//! - `Dense`: a single shared matrix
//! - `Feature`: a sparse map from feature id to weight
//!
//! Gradients mirror the group list but keep per-label blocks and per-word
//! columns in maps, so a minibatch only allocates what it touched.

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashMap};
use std::ops::{AddAssign, DivAssign, MulAssign, SubAssign};
use std::path::Path;

use ndarray::{s, Array1, Array2, ArrayViewMut2};
use rand::Rng;
use serde::{Deserialize, Serialize};

use treeshift_core::{Grammar, Symbol, SymbolTable};

use crate::{TrainError, TrainResult};

/// Checkpoint format version
pub const MODEL_VERSION: u32 = 1;

// ============================================================================
// Group Specifications
// ============================================================================

/// Model variants. All variants share the update protocol; they differ
/// only in which tensor groups they carry and how those are blocked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    /// Shared transition matrices, per-label classification only
    #[default]
    Basic,
    /// Adds the queue composition tensors
    Queue,
    /// Queue tensors plus per-label transition matrices
    Labelwise,
}

/// Storage form of one tensor group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupForm {
    /// One column of length `embedding` per terminal word
    Embedding,
    /// One `rows x cols` block per label, stacked row-wise
    Category { rows: usize, cols: usize },
    /// A single `rows x cols` matrix
    Dense { rows: usize, cols: usize },
    /// Sparse feature-id to weight map
    Feature,
}

/// Which optimizer gate controls updates to a group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LearnGate {
    Embedding,
    Classification,
    Hidden,
}

/// Initialization applied by [`Model::random`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitKind {
    /// Left at zero
    Zero,
    /// Uniform in `(-r, r)` with `r = sqrt(6 / (rows + cols))`
    Glorot,
    /// Filled with `-ln(label count)`, the uniform classification prior
    UniformPrior,
}

/// Static description of one tensor group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupSpec {
    pub name: &'static str,
    pub form: GroupForm,
    pub gate: LearnGate,
    pub regularize: bool,
    pub init: InitKind,
}

impl GroupSpec {
    const fn new(
        name: &'static str,
        form: GroupForm,
        gate: LearnGate,
        regularize: bool,
        init: InitKind,
    ) -> Self {
        Self {
            name,
            form,
            gate,
            regularize,
            init,
        }
    }
}

impl ModelKind {
    /// The tensor groups of this variant, in update order.
    ///
    /// Weight matrices are regularized, biases and embeddings are not.
    /// The labelwise variant blocks the transition tensors per label;
    /// the others share them.
    pub fn groups(self, hidden: usize, embedding: usize) -> Vec<GroupSpec> {
        use GroupForm::{Category, Dense, Embedding, Feature};
        use InitKind::{Glorot, UniformPrior, Zero};
        use LearnGate::{Classification, Hidden};

        let h = hidden;
        let e = embedding;
        let labelwise = self == ModelKind::Labelwise;
        let transition = |rows, cols| {
            if labelwise {
                Category { rows, cols }
            } else {
                Dense { rows, cols }
            }
        };

        let mut specs = vec![
            GroupSpec::new("terminal", Embedding, LearnGate::Embedding, false, Zero),
            GroupSpec::new("Wc", Category { rows: 1, cols: h }, Classification, true, Glorot),
            GroupSpec::new("Bc", Category { rows: 1, cols: 1 }, Classification, false, UniformPrior),
            GroupSpec::new("Wfe", Feature, Classification, false, Zero),
            GroupSpec::new("Wsh", transition(h, 2 * h + e), Hidden, true, Glorot),
            GroupSpec::new("Bsh", transition(h, 1), Hidden, false, Zero),
            GroupSpec::new("Wre", transition(h, 4 * h), Hidden, true, Glorot),
            GroupSpec::new("Bre", transition(h, 1), Hidden, false, Zero),
            GroupSpec::new("Wu", transition(h, 3 * h), Hidden, true, Glorot),
            GroupSpec::new("Bu", transition(h, 1), Hidden, false, Zero),
            GroupSpec::new("Wf", Dense { rows: h, cols: h }, Hidden, true, Glorot),
            GroupSpec::new("Bf", Dense { rows: h, cols: 1 }, Hidden, false, Zero),
            GroupSpec::new("Wi", Dense { rows: h, cols: h }, Hidden, true, Glorot),
            GroupSpec::new("Bi", Dense { rows: h, cols: 1 }, Hidden, false, Zero),
        ];
        if matches!(self, ModelKind::Queue | ModelKind::Labelwise) {
            specs.push(GroupSpec::new("Wqu", Dense { rows: h, cols: h + e }, Hidden, true, Glorot));
            specs.push(GroupSpec::new("Bqu", Dense { rows: h, cols: 1 }, Hidden, false, Zero));
            specs.push(GroupSpec::new("Bqe", Dense { rows: h, cols: 1 }, Hidden, false, Zero));
        }
        specs.push(GroupSpec::new("Ba", Dense { rows: h, cols: 1 }, Hidden, false, Zero));
        specs
    }
}

fn glorot(rows: usize, cols: usize) -> f32 {
    (6.0 / (rows + cols) as f32).sqrt()
}

// ============================================================================
// Model
// ============================================================================

/// Parameter storage for one tensor group
#[derive(Debug, Clone, PartialEq)]
pub enum ParamGroup {
    Embedding(BTreeMap<Symbol, Array1<f32>>),
    Category(Array2<f32>),
    Dense(Array2<f32>),
    Feature(BTreeMap<u64, f32>),
}

impl ParamGroup {
    fn zeroed(spec: &GroupSpec, labels: usize) -> Self {
        match spec.form {
            GroupForm::Embedding => ParamGroup::Embedding(BTreeMap::new()),
            GroupForm::Category { rows, cols } => {
                ParamGroup::Category(Array2::zeros((rows * labels, cols)))
            }
            GroupForm::Dense { rows, cols } => ParamGroup::Dense(Array2::zeros((rows, cols))),
            GroupForm::Feature => ParamGroup::Feature(BTreeMap::new()),
        }
    }
}

/// The full parameter set of one parser
#[derive(Debug, Clone)]
pub struct Model {
    kind: ModelKind,
    hidden: usize,
    embedding: usize,
    labels: Vec<Symbol>,
    label_index: HashMap<Symbol, usize>,
    specs: Vec<GroupSpec>,
    groups: Vec<ParamGroup>,
}

impl Model {
    /// Zero-initialized model over the grammar's nonterminal labels.
    pub fn new(kind: ModelKind, hidden: usize, embedding: usize, grammar: &Grammar) -> Self {
        Self::with_labels(kind, hidden, embedding, grammar.nonterminals.clone())
    }

    /// Zero-initialized model over an explicit label list.
    pub fn with_labels(
        kind: ModelKind,
        hidden: usize,
        embedding: usize,
        labels: Vec<Symbol>,
    ) -> Self {
        let specs = kind.groups(hidden, embedding);
        let label_index = labels
            .iter()
            .enumerate()
            .map(|(index, &label)| (label, index))
            .collect();
        let groups = specs
            .iter()
            .map(|spec| ParamGroup::zeroed(spec, labels.len()))
            .collect();
        Self {
            kind,
            hidden,
            embedding,
            labels,
            label_index,
            specs,
            groups,
        }
    }

    pub fn kind(&self) -> ModelKind {
        self.kind
    }

    pub fn hidden(&self) -> usize {
        self.hidden
    }

    pub fn embedding(&self) -> usize {
        self.embedding
    }

    pub fn labels(&self) -> &[Symbol] {
        &self.labels
    }

    pub fn specs(&self) -> &[GroupSpec] {
        &self.specs
    }

    pub fn groups(&self) -> &[ParamGroup] {
        &self.groups
    }

    /// Row offset of a label's blocks inside category matrices.
    pub fn label_offset(&self, label: Symbol) -> Option<usize> {
        self.label_index.get(&label).copied()
    }

    fn index_of(&self, name: &str) -> TrainResult<usize> {
        self.specs
            .iter()
            .position(|spec| spec.name == name)
            .ok_or_else(|| TrainError::UnknownGroup(name.to_string()))
    }

    /// The backing matrix of a dense or category group.
    pub fn matrix(&self, name: &str) -> TrainResult<&Array2<f32>> {
        let index = self.index_of(name)?;
        match &self.groups[index] {
            ParamGroup::Category(tensor) | ParamGroup::Dense(tensor) => Ok(tensor),
            _ => Err(TrainError::UnknownGroup(name.to_string())),
        }
    }

    /// A label's block inside a category group, as a mutable view.
    pub fn category(&mut self, name: &str, label: Symbol) -> TrainResult<ArrayViewMut2<'_, f32>> {
        let index = self.index_of(name)?;
        let GroupForm::Category { rows, .. } = self.specs[index].form else {
            return Err(TrainError::UnknownGroup(name.to_string()));
        };
        let offset = self
            .label_index
            .get(&label)
            .copied()
            .ok_or_else(|| TrainError::UnknownLabel(label.id().to_string()))?;
        match &mut self.groups[index] {
            ParamGroup::Category(tensor) => {
                Ok(tensor.slice_mut(s![offset * rows..(offset + 1) * rows, ..]))
            }
            _ => Err(TrainError::UnknownGroup(name.to_string())),
        }
    }

    /// A word's embedding column, created at zero on first touch.
    pub fn terminal(&mut self, word: Symbol) -> &mut Array1<f32> {
        let embedding = self.embedding;
        match &mut self.groups[0] {
            ParamGroup::Embedding(columns) => columns
                .entry(word)
                .or_insert_with(|| Array1::zeros(embedding)),
            _ => unreachable!("group 0 is the terminal embedding"),
        }
    }

    /// A feature weight, created at zero on first touch.
    pub fn feature(&mut self, id: u64) -> &mut f32 {
        let index = self
            .specs
            .iter()
            .position(|spec| spec.form == GroupForm::Feature);
        match index.map(|i| &mut self.groups[i]) {
            Some(ParamGroup::Feature(weights)) => weights.entry(id).or_insert(0.0),
            _ => unreachable!("every variant carries the feature group"),
        }
    }

    /// Split borrows for the optimizer's group walk.
    pub(crate) fn parts_mut(
        &mut self,
    ) -> (&[GroupSpec], &mut [ParamGroup], &HashMap<Symbol, usize>) {
        (&self.specs, &mut self.groups, &self.label_index)
    }

    /// Randomize the learned tensors in place.
    ///
    /// Weight matrices draw uniformly from the Glorot range of their
    /// block shape; the classification bias is seeded with the uniform
    /// prior `-ln(labels)`; everything else stays zero.
    pub fn random<R: Rng>(&mut self, rng: &mut R) {
        let prior = -(self.labels.len().max(1) as f32).ln();
        for (spec, group) in self.specs.iter().zip(self.groups.iter_mut()) {
            match spec.init {
                InitKind::Zero => {}
                InitKind::Glorot => {
                    let (rows, cols) = match spec.form {
                        GroupForm::Category { rows, cols } | GroupForm::Dense { rows, cols } => {
                            (rows, cols)
                        }
                        _ => continue,
                    };
                    let range = glorot(rows, cols);
                    if let ParamGroup::Category(tensor) | ParamGroup::Dense(tensor) = group {
                        tensor.mapv_inplace(|_| rng.gen_range(-range..range));
                    }
                }
                InitKind::UniformPrior => {
                    if let ParamGroup::Category(tensor) | ParamGroup::Dense(tensor) = group {
                        tensor.fill(prior);
                    }
                }
            }
        }
    }

    /// Sum of absolute values over the dense and category tensors.
    pub fn l1(&self) -> f32 {
        self.groups
            .iter()
            .map(|group| match group {
                ParamGroup::Category(tensor) | ParamGroup::Dense(tensor) => {
                    tensor.iter().map(|x| x.abs()).sum()
                }
                _ => 0.0,
            })
            .sum()
    }

    /// Euclidean norm over the dense and category tensors.
    pub fn l2(&self) -> f32 {
        self.groups
            .iter()
            .map(|group| match group {
                ParamGroup::Category(tensor) | ParamGroup::Dense(tensor) => {
                    tensor.iter().map(|x| x * x).sum()
                }
                _ => 0.0,
            })
            .sum::<f32>()
            .sqrt()
    }

    /// Reset every tensor to zero, dropping lazy columns and weights.
    pub fn clear(&mut self) {
        for group in &mut self.groups {
            match group {
                ParamGroup::Embedding(columns) => columns.clear(),
                ParamGroup::Category(tensor) | ParamGroup::Dense(tensor) => tensor.fill(0.0),
                ParamGroup::Feature(weights) => weights.clear(),
            }
        }
    }

    pub fn swap(&mut self, other: &mut Model) {
        std::mem::swap(self, other);
    }

    /// Fresh zero gradient with this model's shape.
    pub fn gradient(&self) -> Gradient {
        Gradient::new(self.kind, self.hidden, self.embedding)
    }
}

impl AddAssign<&Model> for Model {
    fn add_assign(&mut self, rhs: &Model) {
        debug_assert_eq!(self.kind, rhs.kind);
        let embedding = self.embedding;
        for (mine, theirs) in self.groups.iter_mut().zip(rhs.groups.iter()) {
            match (mine, theirs) {
                (ParamGroup::Embedding(a), ParamGroup::Embedding(b)) => {
                    for (word, column) in b {
                        let target = a
                            .entry(*word)
                            .or_insert_with(|| Array1::zeros(embedding));
                        *target += column;
                    }
                }
                (ParamGroup::Category(a), ParamGroup::Category(b))
                | (ParamGroup::Dense(a), ParamGroup::Dense(b)) => *a += b,
                (ParamGroup::Feature(a), ParamGroup::Feature(b)) => {
                    for (id, weight) in b {
                        *a.entry(*id).or_insert(0.0) += weight;
                    }
                }
                _ => {}
            }
        }
    }
}

impl SubAssign<&Model> for Model {
    fn sub_assign(&mut self, rhs: &Model) {
        debug_assert_eq!(self.kind, rhs.kind);
        let embedding = self.embedding;
        for (mine, theirs) in self.groups.iter_mut().zip(rhs.groups.iter()) {
            match (mine, theirs) {
                (ParamGroup::Embedding(a), ParamGroup::Embedding(b)) => {
                    for (word, column) in b {
                        let target = a
                            .entry(*word)
                            .or_insert_with(|| Array1::zeros(embedding));
                        *target -= column;
                    }
                }
                (ParamGroup::Category(a), ParamGroup::Category(b))
                | (ParamGroup::Dense(a), ParamGroup::Dense(b)) => *a -= b,
                (ParamGroup::Feature(a), ParamGroup::Feature(b)) => {
                    for (id, weight) in b {
                        *a.entry(*id).or_insert(0.0) -= weight;
                    }
                }
                _ => {}
            }
        }
    }
}

impl MulAssign<f32> for Model {
    fn mul_assign(&mut self, rhs: f32) {
        for group in &mut self.groups {
            match group {
                ParamGroup::Embedding(columns) => {
                    for column in columns.values_mut() {
                        *column *= rhs;
                    }
                }
                ParamGroup::Category(tensor) | ParamGroup::Dense(tensor) => *tensor *= rhs,
                ParamGroup::Feature(weights) => {
                    for weight in weights.values_mut() {
                        *weight *= rhs;
                    }
                }
            }
        }
    }
}

impl DivAssign<f32> for Model {
    fn div_assign(&mut self, rhs: f32) {
        *self *= 1.0 / rhs;
    }
}

// ============================================================================
// Persistence
// ============================================================================

#[derive(Serialize, Deserialize)]
struct ModelFile {
    version: u32,
    kind: ModelKind,
    hidden: usize,
    embedding: usize,
    labels: Vec<String>,
    groups: Vec<GroupFile>,
}

/// Groups externalize symbols as their surface strings, so a checkpoint
/// does not depend on the intern order of the run that wrote it.
#[derive(Serialize, Deserialize)]
enum GroupFile {
    Embedding(BTreeMap<String, Vec<f32>>),
    Category(Array2<f32>),
    Dense(Array2<f32>),
    Feature(BTreeMap<u64, f32>),
}

impl Model {
    /// Serialize to the versioned JSON checkpoint form.
    pub fn save_json(&self, table: &SymbolTable) -> TrainResult<String> {
        let groups = self
            .groups
            .iter()
            .map(|group| match group {
                ParamGroup::Embedding(columns) => GroupFile::Embedding(
                    columns
                        .iter()
                        .map(|(word, column)| {
                            (table.resolve(*word).to_string(), column.to_vec())
                        })
                        .collect(),
                ),
                ParamGroup::Category(tensor) => GroupFile::Category(tensor.clone()),
                ParamGroup::Dense(tensor) => GroupFile::Dense(tensor.clone()),
                ParamGroup::Feature(weights) => GroupFile::Feature(weights.clone()),
            })
            .collect();
        let file = ModelFile {
            version: MODEL_VERSION,
            kind: self.kind,
            hidden: self.hidden,
            embedding: self.embedding,
            labels: self
                .labels
                .iter()
                .map(|&label| table.resolve(label).to_string())
                .collect(),
            groups,
        };
        Ok(serde_json::to_string(&file)?)
    }

    pub fn save_to_file(&self, table: &SymbolTable, path: &Path) -> TrainResult<()> {
        std::fs::write(path, self.save_json(table)?)?;
        Ok(())
    }

    /// Deserialize a checkpoint, validating version and tensor shapes.
    pub fn load_json(table: &mut SymbolTable, json: &str) -> TrainResult<Model> {
        let file: ModelFile = serde_json::from_str(json)?;
        if file.version != MODEL_VERSION {
            return Err(TrainError::VersionMismatch {
                expected: MODEL_VERSION,
                actual: file.version,
            });
        }
        let labels: Vec<Symbol> = file.labels.iter().map(|l| table.nonterminal(l)).collect();
        let mut model = Model::with_labels(file.kind, file.hidden, file.embedding, labels);
        if file.groups.len() != model.specs.len() {
            return Err(TrainError::CorruptedModel(format!(
                "expected {} tensor groups, found {}",
                model.specs.len(),
                file.groups.len()
            )));
        }
        let label_count = model.labels.len();
        for ((spec, slot), stored) in model
            .specs
            .iter()
            .zip(model.groups.iter_mut())
            .zip(file.groups)
        {
            match (spec.form, stored) {
                (GroupForm::Embedding, GroupFile::Embedding(columns)) => {
                    let mut restored = BTreeMap::new();
                    for (word, values) in columns {
                        if values.len() != file.embedding {
                            return Err(TrainError::CorruptedModel(format!(
                                "embedding column for {word:?} has length {}",
                                values.len()
                            )));
                        }
                        restored.insert(table.intern(&word), Array1::from_vec(values));
                    }
                    *slot = ParamGroup::Embedding(restored);
                }
                (GroupForm::Category { rows, cols }, GroupFile::Category(tensor)) => {
                    if tensor.dim() != (rows * label_count, cols) {
                        return Err(TrainError::CorruptedModel(format!(
                            "tensor group {} has shape {:?}",
                            spec.name,
                            tensor.dim()
                        )));
                    }
                    *slot = ParamGroup::Category(tensor);
                }
                (GroupForm::Dense { rows, cols }, GroupFile::Dense(tensor)) => {
                    if tensor.dim() != (rows, cols) {
                        return Err(TrainError::CorruptedModel(format!(
                            "tensor group {} has shape {:?}",
                            spec.name,
                            tensor.dim()
                        )));
                    }
                    *slot = ParamGroup::Dense(tensor);
                }
                (GroupForm::Feature, GroupFile::Feature(weights)) => {
                    *slot = ParamGroup::Feature(weights);
                }
                _ => {
                    return Err(TrainError::CorruptedModel(format!(
                        "tensor group {} has the wrong form",
                        spec.name
                    )));
                }
            }
        }
        Ok(model)
    }

    pub fn load_from_file(table: &mut SymbolTable, path: &Path) -> TrainResult<Model> {
        let json = std::fs::read_to_string(path)?;
        Self::load_json(table, &json)
    }
}

// ============================================================================
// Gradient
// ============================================================================

/// Gradient storage for one tensor group; per-label and per-word pieces
/// exist only once touched.
#[derive(Debug, Clone, PartialEq)]
pub enum GradGroup {
    Embedding(BTreeMap<Symbol, Array1<f32>>),
    Category(BTreeMap<Symbol, Array2<f32>>),
    Dense(Array2<f32>),
    Feature(BTreeMap<u64, f32>),
}

impl GradGroup {
    fn empty(spec: &GroupSpec) -> Self {
        match spec.form {
            GroupForm::Embedding => GradGroup::Embedding(BTreeMap::new()),
            GroupForm::Category { .. } => GradGroup::Category(BTreeMap::new()),
            GroupForm::Dense { rows, cols } => GradGroup::Dense(Array2::zeros((rows, cols))),
            GroupForm::Feature => GradGroup::Feature(BTreeMap::new()),
        }
    }
}

/// Accumulated gradients plus the number of contributing updates.
#[derive(Debug, Clone)]
pub struct Gradient {
    kind: ModelKind,
    hidden: usize,
    embedding: usize,
    specs: Vec<GroupSpec>,
    groups: Vec<GradGroup>,
    /// Number of updates folded in; the optimizer divides by this.
    pub count: u64,
}

impl Gradient {
    pub fn new(kind: ModelKind, hidden: usize, embedding: usize) -> Self {
        let specs = kind.groups(hidden, embedding);
        let groups = specs.iter().map(GradGroup::empty).collect();
        Self {
            kind,
            hidden,
            embedding,
            specs,
            groups,
            count: 0,
        }
    }

    pub fn kind(&self) -> ModelKind {
        self.kind
    }

    pub fn hidden(&self) -> usize {
        self.hidden
    }

    pub fn embedding(&self) -> usize {
        self.embedding
    }

    pub fn specs(&self) -> &[GroupSpec] {
        &self.specs
    }

    pub fn groups(&self) -> &[GradGroup] {
        &self.groups
    }

    fn index_of(&self, name: &str) -> TrainResult<usize> {
        self.specs
            .iter()
            .position(|spec| spec.name == name)
            .ok_or_else(|| TrainError::UnknownGroup(name.to_string()))
    }

    /// A word's embedding gradient, created at zero on first touch.
    pub fn terminal(&mut self, word: Symbol) -> &mut Array1<f32> {
        let embedding = self.embedding;
        match &mut self.groups[0] {
            GradGroup::Embedding(columns) => columns
                .entry(word)
                .or_insert_with(|| Array1::zeros(embedding)),
            _ => unreachable!("group 0 is the terminal embedding"),
        }
    }

    /// A label's block gradient, created at zero on first touch.
    pub fn category(&mut self, name: &str, label: Symbol) -> TrainResult<&mut Array2<f32>> {
        let index = self.index_of(name)?;
        let GroupForm::Category { rows, cols } = self.specs[index].form else {
            return Err(TrainError::UnknownGroup(name.to_string()));
        };
        match &mut self.groups[index] {
            GradGroup::Category(blocks) => Ok(blocks
                .entry(label)
                .or_insert_with(|| Array2::zeros((rows, cols)))),
            _ => unreachable!("group forms follow the spec list"),
        }
    }

    /// A dense group's gradient matrix.
    pub fn dense(&mut self, name: &str) -> TrainResult<&mut Array2<f32>> {
        let index = self.index_of(name)?;
        match &mut self.groups[index] {
            GradGroup::Dense(tensor) => Ok(tensor),
            _ => Err(TrainError::UnknownGroup(name.to_string())),
        }
    }

    /// A feature weight gradient, created at zero on first touch.
    pub fn feature(&mut self, id: u64) -> &mut f32 {
        let index = self
            .specs
            .iter()
            .position(|spec| spec.form == GroupForm::Feature);
        match index.map(|i| &mut self.groups[i]) {
            Some(GradGroup::Feature(weights)) => weights.entry(id).or_insert(0.0),
            _ => unreachable!("every variant carries the feature group"),
        }
    }

    /// Drop all accumulated values and reset the count.
    pub fn clear(&mut self) {
        for group in &mut self.groups {
            match group {
                GradGroup::Embedding(columns) => columns.clear(),
                GradGroup::Category(blocks) => blocks.clear(),
                GradGroup::Dense(tensor) => tensor.fill(0.0),
                GradGroup::Feature(weights) => weights.clear(),
            }
        }
        self.count = 0;
    }

    pub fn swap(&mut self, other: &mut Gradient) {
        std::mem::swap(self, other);
    }
}

impl AddAssign<&Gradient> for Gradient {
    /// Merge another accumulator, summing overlapping pieces and the
    /// update counts.
    fn add_assign(&mut self, rhs: &Gradient) {
        debug_assert_eq!(self.kind, rhs.kind);
        for (mine, theirs) in self.groups.iter_mut().zip(rhs.groups.iter()) {
            match (mine, theirs) {
                (GradGroup::Embedding(a), GradGroup::Embedding(b)) => {
                    for (word, column) in b {
                        match a.entry(*word) {
                            Entry::Occupied(mut entry) => *entry.get_mut() += column,
                            Entry::Vacant(entry) => {
                                entry.insert(column.clone());
                            }
                        }
                    }
                }
                (GradGroup::Category(a), GradGroup::Category(b)) => {
                    for (label, block) in b {
                        match a.entry(*label) {
                            Entry::Occupied(mut entry) => *entry.get_mut() += block,
                            Entry::Vacant(entry) => {
                                entry.insert(block.clone());
                            }
                        }
                    }
                }
                (GradGroup::Dense(a), GradGroup::Dense(b)) => *a += b,
                (GradGroup::Feature(a), GradGroup::Feature(b)) => {
                    for (id, weight) in b {
                        *a.entry(*id).or_insert(0.0) += weight;
                    }
                }
                _ => {}
            }
        }
        self.count += rhs.count;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use tempfile::tempdir;

    fn labels(table: &mut SymbolTable) -> Vec<Symbol> {
        vec![table.nonterminal("S"), table.nonterminal("NP")]
    }

    #[test]
    fn test_basic_group_shapes() {
        let mut table = SymbolTable::new();
        let model = Model::with_labels(ModelKind::Basic, 4, 3, labels(&mut table));

        assert_eq!(model.matrix("Wsh").unwrap().dim(), (4, 11));
        assert_eq!(model.matrix("Wre").unwrap().dim(), (4, 16));
        assert_eq!(model.matrix("Wu").unwrap().dim(), (4, 12));
        assert_eq!(model.matrix("Wc").unwrap().dim(), (2, 4));
        assert_eq!(model.matrix("Bc").unwrap().dim(), (2, 1));
        assert_eq!(model.matrix("Ba").unwrap().dim(), (4, 1));
        assert!(model.matrix("Wqu").is_err());
    }

    #[test]
    fn test_queue_adds_groups() {
        let mut table = SymbolTable::new();
        let model = Model::with_labels(ModelKind::Queue, 4, 3, labels(&mut table));

        assert_eq!(model.matrix("Wqu").unwrap().dim(), (4, 7));
        assert_eq!(model.matrix("Bqu").unwrap().dim(), (4, 1));
        assert_eq!(model.matrix("Bqe").unwrap().dim(), (4, 1));
    }

    #[test]
    fn test_labelwise_blocks_per_label() {
        let mut table = SymbolTable::new();
        let labels = labels(&mut table);
        let np = labels[1];
        let mut model = Model::with_labels(ModelKind::Labelwise, 4, 3, labels);

        // Two labels stack into an 8-row matrix; each block is a view.
        assert_eq!(model.matrix("Wsh").unwrap().dim(), (8, 11));
        assert_eq!(model.category("Wsh", np).unwrap().dim(), (4, 11));
        assert_eq!(model.matrix("Bsh").unwrap().dim(), (8, 1));
    }

    #[test]
    fn test_random_init() {
        let mut table = SymbolTable::new();
        let mut model = Model::with_labels(ModelKind::Basic, 4, 3, labels(&mut table));
        let mut rng = StdRng::seed_from_u64(7);
        model.random(&mut rng);

        let range = (6.0f32 / (4 + 11) as f32).sqrt();
        let wsh = model.matrix("Wsh").unwrap();
        assert!(wsh.iter().any(|&x| x != 0.0));
        assert!(wsh.iter().all(|&x| x.abs() <= range));

        let prior = -(2.0f32).ln();
        assert!(model.matrix("Bc").unwrap().iter().all(|&x| x == prior));
        assert!(model.matrix("Bsh").unwrap().iter().all(|&x| x == 0.0));
    }

    #[test]
    fn test_terminal_lazy_column() {
        let mut table = SymbolTable::new();
        let dog = table.intern("dog");
        let mut model = Model::with_labels(ModelKind::Basic, 4, 3, labels(&mut table));

        assert_eq!(model.terminal(dog).len(), 3);
        model.terminal(dog)[1] = 0.5;
        assert_eq!(model.terminal(dog)[1], 0.5);
    }

    #[test]
    fn test_norms_exclude_embedding() {
        let mut table = SymbolTable::new();
        let dog = table.intern("dog");
        let mut model = Model::with_labels(ModelKind::Basic, 4, 3, labels(&mut table));
        let mut rng = StdRng::seed_from_u64(7);
        model.random(&mut rng);

        let before = model.l2();
        assert!(before > 0.0);
        model.terminal(dog)[0] = 1000.0;
        assert_eq!(model.l2(), before);
        assert!(model.l1() > 0.0);
    }

    #[test]
    fn test_model_add_assign() {
        let mut table = SymbolTable::new();
        let dog = table.intern("dog");
        let labels = labels(&mut table);
        let mut a = Model::with_labels(ModelKind::Basic, 4, 3, labels.clone());
        let mut b = Model::with_labels(ModelKind::Basic, 4, 3, labels);
        a.terminal(dog)[0] = 1.0;
        b.terminal(dog)[0] = 2.0;
        let mut rng = StdRng::seed_from_u64(7);
        b.random(&mut rng);
        let wsh = b.matrix("Wsh").unwrap()[[0, 0]];

        a += &b;
        assert_eq!(a.terminal(dog)[0], 3.0);
        assert_eq!(a.matrix("Wsh").unwrap()[[0, 0]], wsh);

        a -= &b;
        assert_eq!(a.terminal(dog)[0], 1.0);
        assert_eq!(a.matrix("Wsh").unwrap()[[0, 0]], 0.0);
    }

    #[test]
    fn test_scaling() {
        let mut table = SymbolTable::new();
        let mut model = Model::with_labels(ModelKind::Basic, 2, 2, labels(&mut table));
        let word = table.intern("dog");
        model.terminal(word)[0] = 2.0;
        *model.feature(9) = 4.0;

        model *= 0.5;
        assert_eq!(model.terminal(word)[0], 1.0);
        assert_eq!(*model.feature(9), 2.0);

        model /= 0.5;
        assert_eq!(model.terminal(word)[0], 2.0);
    }

    #[test]
    fn test_save_load_round_trip() {
        let mut table = SymbolTable::new();
        let dog = table.intern("dog");
        let labels = labels(&mut table);
        let np = labels[1];
        let mut model = Model::with_labels(ModelKind::Queue, 4, 3, labels);
        let mut rng = StdRng::seed_from_u64(7);
        model.random(&mut rng);
        model.terminal(dog)[2] = 0.25;
        *model.feature(42) = -1.5;

        let dir = tempdir().unwrap();
        let path = dir.path().join("model.json");
        model.save_to_file(&table, &path).unwrap();

        // A fresh table exercises the string-keyed externalization.
        let mut fresh = SymbolTable::new();
        let loaded = Model::load_from_file(&mut fresh, &path).unwrap();
        assert_eq!(loaded.kind(), ModelKind::Queue);
        assert_eq!(loaded.hidden(), 4);
        assert_eq!(loaded.embedding(), 3);
        assert_eq!(loaded.labels().len(), 2);
        assert_eq!(loaded.matrix("Wsh").unwrap(), model.matrix("Wsh").unwrap());
        assert_eq!(loaded.matrix("Wqu").unwrap(), model.matrix("Wqu").unwrap());
        assert_eq!(
            loaded.label_offset(fresh.nonterminal("NP")),
            model.label_offset(np)
        );

        let mut loaded = loaded;
        let dog = fresh.intern("dog");
        assert_eq!(loaded.terminal(dog)[2], 0.25);
        assert_eq!(*loaded.feature(42), -1.5);
    }

    #[test]
    fn test_load_rejects_version_mismatch() {
        let mut table = SymbolTable::new();
        let model = Model::with_labels(ModelKind::Basic, 2, 2, labels(&mut table));
        let json = model.save_json(&table).unwrap();
        let mut value: serde_json::Value = serde_json::from_str(&json).unwrap();
        value["version"] = serde_json::json!(99);
        let tampered = value.to_string();

        let mut fresh = SymbolTable::new();
        match Model::load_json(&mut fresh, &tampered) {
            Err(TrainError::VersionMismatch { expected, actual }) => {
                assert_eq!(expected, MODEL_VERSION);
                assert_eq!(actual, 99);
            }
            other => panic!("expected version mismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_gradient_lazy_allocation() {
        let mut table = SymbolTable::new();
        let dog = table.intern("dog");
        let labels = labels(&mut table);
        let s = labels[0];
        let model = Model::with_labels(ModelKind::Basic, 4, 3, labels);
        let mut gradient = model.gradient();

        assert_eq!(gradient.count, 0);
        assert_eq!(gradient.terminal(dog).len(), 3);
        assert_eq!(gradient.category("Wc", s).unwrap().dim(), (1, 4));
        assert_eq!(gradient.dense("Wsh").unwrap().dim(), (4, 11));
        assert!(gradient.category("nope", s).is_err());

        gradient.category("Wc", s).unwrap()[[0, 0]] = 1.0;
        gradient.count += 1;
        gradient.clear();
        assert_eq!(gradient.count, 0);
        assert_eq!(gradient.category("Wc", s).unwrap()[[0, 0]], 0.0);
    }

    #[test]
    fn test_gradient_merge() {
        let mut table = SymbolTable::new();
        let dog = table.intern("dog");
        let cat = table.intern("cat");
        let labels = labels(&mut table);
        let s = labels[0];
        let model = Model::with_labels(ModelKind::Basic, 4, 3, labels);

        let mut a = model.gradient();
        a.terminal(dog)[0] = 1.0;
        a.category("Wc", s).unwrap()[[0, 1]] = 2.0;
        a.count = 2;

        let mut b = model.gradient();
        b.terminal(dog)[0] = 3.0;
        b.terminal(cat)[1] = 5.0;
        b.category("Wc", s).unwrap()[[0, 1]] = 4.0;
        b.dense("Wsh").unwrap()[[1, 1]] = 7.0;
        b.count = 3;

        a += &b;
        assert_eq!(a.count, 5);
        assert_eq!(a.terminal(dog)[0], 4.0);
        assert_eq!(a.terminal(cat)[1], 5.0);
        assert_eq!(a.category("Wc", s).unwrap()[[0, 1]], 6.0);
        assert_eq!(a.dense("Wsh").unwrap()[[1, 1]], 7.0);
    }
}
