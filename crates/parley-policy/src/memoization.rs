//! Policy that replays actions for dialogue states it has seen before.

use std::collections::HashMap;
use std::path::Path;

use ndarray::Array2;
use parley_core::{DialogueStateTracker, Domain, FeaturizerKind};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::PolicyError;
use crate::policy::{one_hot, read_json, write_json, Policy, TrainingState};
use crate::training::DialogueTrainingData;

const SETTINGS_FILE: &str = "policy.json";
const LOOKUP_FILE: &str = "lookup.json";

/// Exact bit pattern of a featurized history slice.
type StateKey = Vec<u32>;

fn state_key(slice: &Array2<f32>) -> StateKey {
    slice.iter().map(|v| v.to_bits()).collect()
}

#[derive(Debug, Serialize, Deserialize)]
struct MemoizationSettings {
    featurizer: FeaturizerKind,
    max_history: usize,
    state: TrainingState,
}

#[derive(Debug, Serialize, Deserialize)]
struct LookupEntry {
    state: StateKey,
    action: usize,
}

/// Predicts with certainty the action that followed an identical history
/// during training, and nothing at all otherwise.
///
/// While disabled it predicts nothing but keeps memorizing, so an online
/// session can teach it without its recall getting in the way. The switch
/// is not persisted; a loaded policy is always enabled.
#[derive(Debug, Clone)]
pub struct MemoizationPolicy {
    featurizer: FeaturizerKind,
    max_history: usize,
    lookup: HashMap<StateKey, usize>,
    state: TrainingState,
    enabled: bool,
}

impl MemoizationPolicy {
    pub fn new(featurizer: FeaturizerKind, max_history: usize) -> Self {
        Self {
            featurizer,
            max_history,
            lookup: HashMap::new(),
            state: TrainingState::default(),
            enabled: true,
        }
    }

    pub fn max_history(&self) -> usize {
        self.max_history
    }

    /// Number of distinct memorized states.
    pub fn len(&self) -> usize {
        self.lookup.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lookup.is_empty()
    }

    pub fn training_state(&self) -> TrainingState {
        self.state
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn memorize(&mut self, data: &DialogueTrainingData, domain: &Domain) -> Result<(), PolicyError> {
        if let Some(found) = data.num_features() {
            if found != domain.num_features() {
                return Err(PolicyError::ShapeMismatch {
                    expected: domain.num_features(),
                    found,
                });
            }
        }
        for (x, &y) in data.x.iter().zip(&data.y) {
            // Later examples win when the same state led to different actions.
            if let Some(previous) = self.lookup.insert(state_key(x), y) {
                if previous != y {
                    debug!(previous, action = y, "Memorized state now maps to a different action");
                }
            }
        }
        self.state.epochs += 1;
        Ok(())
    }

    pub fn load(dir: &Path) -> Result<Self, PolicyError> {
        let settings: MemoizationSettings = read_json(&dir.join(SETTINGS_FILE))?;
        let entries: Vec<LookupEntry> = read_json(&dir.join(LOOKUP_FILE))?;
        let lookup = entries.into_iter().map(|e| (e.state, e.action)).collect();
        Ok(Self {
            featurizer: settings.featurizer,
            max_history: settings.max_history,
            lookup,
            state: settings.state,
            enabled: true,
        })
    }
}

impl Policy for MemoizationPolicy {
    fn name(&self) -> &'static str {
        "memoization"
    }

    fn train(&mut self, data: &DialogueTrainingData, domain: &Domain) -> Result<(), PolicyError> {
        self.lookup.clear();
        self.memorize(data, domain)?;
        info!(states = self.lookup.len(), "Memorized dialogue states");
        Ok(())
    }

    fn continue_training(&mut self, data: &DialogueTrainingData, domain: &Domain) -> Result<(), PolicyError> {
        self.memorize(data, domain)
    }

    fn toggle_memoization(&mut self, enabled: bool) {
        if self.enabled != enabled {
            debug!(enabled, "Memoization toggled");
        }
        self.enabled = enabled;
    }

    fn predict_action_probabilities(
        &self,
        tracker: &DialogueStateTracker,
        domain: &Domain,
    ) -> Result<Vec<f32>, PolicyError> {
        if !self.enabled {
            return Ok(vec![0.0; domain.num_actions()]);
        }
        if self.state.epochs == 0 {
            return Err(PolicyError::NotTrained(self.name()));
        }
        let slice = domain.slice_history(&self.featurizer, tracker, self.max_history);
        Ok(match self.lookup.get(&state_key(&slice)) {
            Some(&action) => one_hot(action, domain.num_actions()),
            None => vec![0.0; domain.num_actions()],
        })
    }

    fn persist(&self, dir: &Path) -> Result<(), PolicyError> {
        let settings = MemoizationSettings {
            featurizer: self.featurizer,
            max_history: self.max_history,
            state: self.state,
        };
        let entries: Vec<LookupEntry> = self
            .lookup
            .iter()
            .map(|(state, &action)| LookupEntry {
                state: state.clone(),
                action,
            })
            .collect();
        write_json(&dir.join(SETTINGS_FILE), &settings)?;
        write_json(&dir.join(LOOKUP_FILE), &entries)?;
        Ok(())
    }
}
