use std::path::Path;

use parley_core::config::PolicyConfig;
use parley_core::story::ACTION_LISTEN_NAME;
use parley_core::{DialogueStateTracker, Domain};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::PolicyError;
use crate::policy::{read_json, write_json, Policy};
use crate::training::DialogueTrainingData;

const SETTINGS_FILE: &str = "policy.json";

/// Predicts `fallback_action` when the interpreter was unsure of the latest
/// message. Otherwise it scores the fallback action at `core_threshold`, so
/// any policy that is more confident than that wins in an ensemble.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FallbackPolicy {
    pub nlu_threshold: f32,
    pub core_threshold: f32,
    pub fallback_action: String,
}

impl FallbackPolicy {
    pub fn new(nlu_threshold: f32, core_threshold: f32, fallback_action: impl Into<String>) -> Self {
        Self {
            nlu_threshold,
            core_threshold,
            fallback_action: fallback_action.into(),
        }
    }

    pub fn from_config(config: &PolicyConfig) -> Self {
        Self::new(
            config.nlu_threshold,
            config.core_threshold,
            config.fallback_action.clone(),
        )
    }

    pub fn load(dir: &Path) -> Result<Self, PolicyError> {
        read_json(&dir.join(SETTINGS_FILE))
    }
}

impl Policy for FallbackPolicy {
    fn name(&self) -> &'static str {
        "fallback"
    }

    /// Nothing to learn.
    fn train(&mut self, _data: &DialogueTrainingData, _domain: &Domain) -> Result<(), PolicyError> {
        Ok(())
    }

    fn predict_action_probabilities(
        &self,
        tracker: &DialogueStateTracker,
        domain: &Domain,
    ) -> Result<Vec<f32>, PolicyError> {
        let fallback = domain.index_for_action(&self.fallback_action)?;
        let mut probabilities = vec![0.0; domain.num_actions()];

        let confidence = tracker.latest_message().intent.confidence;
        if tracker.latest_action_was_listen() && confidence < self.nlu_threshold {
            debug!(
                confidence,
                threshold = self.nlu_threshold,
                action = %self.fallback_action,
                "NLU confidence below threshold, predicting fallback"
            );
            probabilities[fallback] = 1.0;
            return Ok(probabilities);
        }

        // A listen fallback already hands the turn back to the user.
        if self.fallback_action != ACTION_LISTEN_NAME
            && tracker.latest_action_name() == Some(self.fallback_action.as_str())
        {
            probabilities[domain.index_for_action(ACTION_LISTEN_NAME)?] = 1.0;
            return Ok(probabilities);
        }

        probabilities[fallback] = self.core_threshold;
        Ok(probabilities)
    }

    fn persist(&self, dir: &Path) -> Result<(), PolicyError> {
        write_json(&dir.join(SETTINGS_FILE), self)
    }
}
