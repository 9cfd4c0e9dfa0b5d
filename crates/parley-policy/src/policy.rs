use std::path::Path;

use parley_core::config::PolicyKind;
use parley_core::{DialogueStateTracker, Domain};
use serde::{Deserialize, Serialize};

use crate::error::PolicyError;
use crate::fallback::FallbackPolicy;
use crate::memoization::MemoizationPolicy;
use crate::training::DialogueTrainingData;

/// Predicts a score per domain action from a tracker's history.
pub trait Policy: Send + Sync {
    /// Name used for the policy's directory in a persisted model.
    fn name(&self) -> &'static str;

    fn train(&mut self, data: &DialogueTrainingData, domain: &Domain) -> Result<(), PolicyError>;

    /// Incrementally learn from a small batch without forgetting earlier
    /// training. Policies that cannot learn online ignore the batch.
    fn continue_training(
        &mut self,
        _data: &DialogueTrainingData,
        _domain: &Domain,
    ) -> Result<(), PolicyError> {
        Ok(())
    }

    /// Switch recall of memorized states on or off. Only memoizing
    /// policies react.
    fn toggle_memoization(&mut self, _enabled: bool) {}

    /// One score per action, in domain action order.
    fn predict_action_probabilities(
        &self,
        tracker: &DialogueStateTracker,
        domain: &Domain,
    ) -> Result<Vec<f32>, PolicyError>;

    /// Write the policy into its own directory `dir`.
    fn persist(&self, dir: &Path) -> Result<(), PolicyError>;
}

/// How often a policy has been through a training pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainingState {
    pub epochs: usize,
}

/// A distribution with all mass on `index`.
pub fn one_hot(index: usize, n: usize) -> Vec<f32> {
    let mut probabilities = vec![0.0; n];
    if let Some(p) = probabilities.get_mut(index) {
        *p = 1.0;
    }
    probabilities
}

/// Index of the highest score; the first one wins a tie.
pub fn argmax(probabilities: &[f32]) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (i, &p) in probabilities.iter().enumerate() {
        if !matches!(best, Some((_, max)) if p <= max) {
            best = Some((i, p));
        }
    }
    best.map(|(i, _)| i)
}

/// Load a persisted policy of the given kind from `dir`.
pub fn load_policy(kind: PolicyKind, dir: &Path) -> Result<Box<dyn Policy>, PolicyError> {
    Ok(match kind {
        PolicyKind::Memoization => Box::new(MemoizationPolicy::load(dir)?),
        PolicyKind::Fallback => Box::new(FallbackPolicy::load(dir)?),
    })
}

pub(crate) fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), PolicyError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_string_pretty(value)?)?;
    Ok(())
}

pub(crate) fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T, PolicyError> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}
