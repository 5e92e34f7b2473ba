//! Margin-violation objectives.
//!
//! During beam search the trainer records, for every step, the scores of
//! the surviving candidate states and the surviving oracle states, each
//! sorted best-first. A step is a violation when the best candidate
//! outscores the worst oracle still in the beam: the oracle is at risk of
//! falling out. The policy picks which violating step the update is
//! anchored at.

use serde::{Deserialize, Serialize};

/// Fixed margin required between oracle and candidate scores
const MARGIN: f64 = 1.0;

/// Which violating step an update is anchored at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViolationPolicy {
    /// The first violating step
    #[default]
    Early,
    /// The step with the largest margin error
    Max,
    /// The last violating step
    Late,
}

impl ViolationPolicy {
    /// Locate the anchoring step, or `None` when no step violates.
    ///
    /// `candidates[step]` and `oracles[step]` hold the beam scores after
    /// `step` transitions, sorted best-first. Steps where either beam is
    /// empty are skipped. A violation requires both a beam crossing
    /// (best candidate above worst surviving oracle) and a positive
    /// margin error between the two beams' worst survivors.
    pub fn violation(self, candidates: &[Vec<f64>], oracles: &[Vec<f64>]) -> Option<usize> {
        let steps = candidates.len().min(oracles.len());
        let mut found: Option<(usize, f64)> = None;
        for step in 0..steps {
            let Some(&best_candidate) = candidates[step].first() else {
                continue;
            };
            let Some(&worst_oracle) = oracles[step].last() else {
                continue;
            };
            if best_candidate <= worst_oracle {
                continue;
            }
            let Some(&worst_candidate) = candidates[step].last() else {
                continue;
            };
            let error = (MARGIN - (worst_oracle - worst_candidate)).max(0.0);
            if error <= 0.0 {
                continue;
            }
            match self {
                ViolationPolicy::Early => return Some(step),
                ViolationPolicy::Max => {
                    if found.map_or(true, |(_, best)| error > best) {
                        found = Some((step, error));
                    }
                }
                ViolationPolicy::Late => found = Some((step, error)),
            }
        }
        found.map(|(step, _)| step)
    }
}
