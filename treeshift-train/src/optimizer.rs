//! Stochastic gradient descent with selective regularization.
//!
//! One `apply` walks the model's tensor groups in spec order. Each group's
//! learn gate can be switched off to freeze a parameter family, e.g.
//! pre-trained embeddings. L2 regularization shrinks only the groups
//! marked for it (weight matrices), never biases, embeddings, or feature
//! weights.

use ndarray::{s, Array1};

use crate::model::{GradGroup, Gradient, GroupForm, LearnGate, Model, ParamGroup};
use crate::{TrainError, TrainResult};

/// Per-family switches for [`Sgd::apply`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LearnOptions {
    pub learn_embedding: bool,
    pub learn_classification: bool,
    pub learn_hidden: bool,
}

impl Default for LearnOptions {
    fn default() -> Self {
        Self {
            learn_embedding: true,
            learn_classification: true,
            learn_hidden: true,
        }
    }
}

/// Plain SGD with a halving learning-rate schedule
#[derive(Debug, Clone, Copy)]
pub struct Sgd {
    eta0: f32,
    lambda: f32,
}

impl Sgd {
    pub fn new(eta0: f32, lambda: f32) -> Self {
        Self { eta0, lambda }
    }

    pub fn eta0(&self) -> f32 {
        self.eta0
    }

    pub fn lambda(&self) -> f32 {
        self.lambda
    }

    /// Halve the learning rate and return the new value.
    pub fn decay(&mut self) -> f32 {
        self.eta0 *= 0.5;
        self.eta0
    }

    /// Take one step against the mean of the accumulated gradient.
    ///
    /// A gradient with `count == 0` carries nothing and is skipped.
    /// Category matrices are regularized whole, then only the touched
    /// label blocks move; zero feature gradients never materialize a
    /// weight.
    pub fn apply(
        &self,
        model: &mut Model,
        gradient: &Gradient,
        options: &LearnOptions,
    ) -> TrainResult<()> {
        if gradient.count == 0 {
            return Ok(());
        }
        let scale = 1.0 / gradient.count as f32;
        let eta = self.eta0;
        let shrink = 1.0 - eta * self.lambda;
        let embedding = model.embedding();
        let (specs, groups, label_index) = model.parts_mut();
        debug_assert_eq!(specs.len(), gradient.groups().len());

        for ((spec, param), grad) in specs.iter().zip(groups.iter_mut()).zip(gradient.groups()) {
            let enabled = match spec.gate {
                LearnGate::Embedding => options.learn_embedding,
                LearnGate::Classification => options.learn_classification,
                LearnGate::Hidden => options.learn_hidden,
            };
            if !enabled {
                continue;
            }
            match (param, grad) {
                (ParamGroup::Embedding(columns), GradGroup::Embedding(grad_columns)) => {
                    for (word, grad_column) in grad_columns {
                        let column = columns
                            .entry(*word)
                            .or_insert_with(|| Array1::zeros(embedding));
                        column.scaled_add(-(eta * scale), grad_column);
                    }
                }
                (ParamGroup::Category(tensor), GradGroup::Category(blocks)) => {
                    if spec.regularize && self.lambda != 0.0 {
                        *tensor *= shrink;
                    }
                    let GroupForm::Category { rows, .. } = spec.form else {
                        continue;
                    };
                    for (label, block) in blocks {
                        let Some(&index) = label_index.get(label) else {
                            return Err(TrainError::UnknownLabel(label.id().to_string()));
                        };
                        let offset = index * rows;
                        tensor
                            .slice_mut(s![offset..offset + rows, ..])
                            .scaled_add(-(eta * scale), block);
                    }
                }
                (ParamGroup::Dense(tensor), GradGroup::Dense(grad_tensor)) => {
                    if spec.regularize && self.lambda != 0.0 {
                        *tensor *= shrink;
                    }
                    tensor.scaled_add(-(eta * scale), grad_tensor);
                }
                (ParamGroup::Feature(weights), GradGroup::Feature(grad_weights)) => {
                    for (id, grad_weight) in grad_weights {
                        if *grad_weight == 0.0 {
                            continue;
                        }
                        *weights.entry(*id).or_insert(0.0) -= eta * scale * grad_weight;
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ModelKind;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use treeshift_core::{Symbol, SymbolTable};

    fn fixture(table: &mut SymbolTable) -> (Model, Vec<Symbol>) {
        let labels = vec![table.nonterminal("S"), table.nonterminal("NP")];
        let model = Model::with_labels(ModelKind::Basic, 2, 2, labels.clone());
        (model, labels)
    }

    #[test]
    fn test_zero_count_is_noop() {
        let mut table = SymbolTable::new();
        let (mut model, labels) = fixture(&mut table);
        let mut rng = StdRng::seed_from_u64(3);
        model.random(&mut rng);
        let before = model.matrix("Wsh").unwrap().clone();

        let mut gradient = model.gradient();
        gradient.dense("Wsh").unwrap()[[0, 0]] = 100.0;
        gradient.category("Wc", labels[0]).unwrap()[[0, 0]] = 100.0;

        let sgd = Sgd::new(0.1, 0.1);
        sgd.apply(&mut model, &gradient, &LearnOptions::default())
            .unwrap();
        assert_eq!(model.matrix("Wsh").unwrap(), &before);
    }

    #[test]
    fn test_mean_gradient_step() {
        let mut table = SymbolTable::new();
        let dog = table.intern("dog");
        let (mut model, labels) = fixture(&mut table);
        let s = labels[0];

        let mut gradient = model.gradient();
        gradient.dense("Wsh").unwrap()[[0, 0]] = 2.0;
        gradient.category("Wc", s).unwrap()[[0, 1]] = 1.0;
        gradient.terminal(dog)[0] = 4.0;
        gradient.count = 2;

        let sgd = Sgd::new(0.1, 0.0);
        sgd.apply(&mut model, &gradient, &LearnOptions::default())
            .unwrap();

        // eta * (gradient / count)
        assert_eq!(model.matrix("Wsh").unwrap()[[0, 0]], -(0.1 * 0.5 * 2.0));
        assert_eq!(model.matrix("Wc").unwrap()[[0, 1]], -(0.1 * 0.5 * 1.0));
        assert_eq!(model.terminal(dog)[0], -(0.1 * 0.5 * 4.0));
        // The other label's block never moved.
        assert_eq!(model.matrix("Wc").unwrap()[[1, 1]], 0.0);
    }

    #[test]
    fn test_regularization_shrinks_weights_only() {
        let mut table = SymbolTable::new();
        let (mut model, _) = fixture(&mut table);
        let mut rng = StdRng::seed_from_u64(3);
        model.random(&mut rng);
        let wsh = model.matrix("Wsh").unwrap().clone();
        let bc = model.matrix("Bc").unwrap().clone();

        let mut gradient = model.gradient();
        gradient.count = 1;

        let sgd = Sgd::new(0.1, 0.5);
        sgd.apply(&mut model, &gradient, &LearnOptions::default())
            .unwrap();

        let shrink = 1.0 - 0.1 * 0.5;
        assert_eq!(model.matrix("Wsh").unwrap(), &(&wsh * shrink));
        // Biases are exempt from regularization.
        assert_eq!(model.matrix("Bc").unwrap(), &bc);
    }

    #[test]
    fn test_learn_gates_freeze_families() {
        let mut table = SymbolTable::new();
        let dog = table.intern("dog");
        let (mut model, labels) = fixture(&mut table);
        let s = labels[0];

        let mut gradient = model.gradient();
        gradient.dense("Wsh").unwrap()[[0, 0]] = 1.0;
        gradient.category("Wc", s).unwrap()[[0, 0]] = 1.0;
        gradient.terminal(dog)[0] = 1.0;
        gradient.count = 1;

        let sgd = Sgd::new(0.1, 0.0);
        let options = LearnOptions {
            learn_embedding: false,
            learn_classification: false,
            learn_hidden: true,
        };
        sgd.apply(&mut model, &gradient, &options).unwrap();

        assert!(model.matrix("Wsh").unwrap()[[0, 0]] != 0.0);
        assert_eq!(model.matrix("Wc").unwrap()[[0, 0]], 0.0);
        assert_eq!(model.terminal(dog)[0], 0.0);
    }

    #[test]
    fn test_zero_feature_gradient_not_materialized() {
        let mut table = SymbolTable::new();
        let (mut model, _) = fixture(&mut table);

        let mut gradient = model.gradient();
        *gradient.feature(1) = 0.0;
        *gradient.feature(2) = 2.0;
        gradient.count = 1;

        let sgd = Sgd::new(0.1, 0.0);
        sgd.apply(&mut model, &gradient, &LearnOptions::default())
            .unwrap();

        assert_eq!(*model.feature(2), -0.2);
        let untouched = model.groups().iter().any(|group| match group {
            ParamGroup::Feature(weights) => !weights.contains_key(&1),
            _ => false,
        });
        assert!(untouched);
    }

    #[test]
    fn test_unknown_label_is_error() {
        let mut table = SymbolTable::new();
        let (mut model, _) = fixture(&mut table);
        let stranger = table.nonterminal("VP");

        let mut gradient = model.gradient();
        gradient.category("Wc", stranger).unwrap()[[0, 0]] = 1.0;
        gradient.count = 1;

        let sgd = Sgd::new(0.1, 0.0);
        let err = sgd.apply(&mut model, &gradient, &LearnOptions::default());
        assert!(matches!(err, Err(TrainError::UnknownLabel(_))));
    }

    #[test]
    fn test_decay_halves_rate() {
        let mut sgd = Sgd::new(0.1, 0.0);
        assert_eq!(sgd.decay(), 0.05);
        assert_eq!(sgd.eta0(), 0.05);
        assert_eq!(sgd.decay(), 0.025);
    }
}
