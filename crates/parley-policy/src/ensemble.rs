//! Combining several policies into one prediction.

use std::path::Path;

use parley_core::config::{PolicyConfig, PolicyKind};
use parley_core::{DialogueStateTracker, Domain, FeaturizerKind};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::PolicyError;
use crate::fallback::FallbackPolicy;
use crate::memoization::MemoizationPolicy;
use crate::policy::{load_policy, read_json, write_json, Policy};
use crate::training::{
    augmented_training_data, training_data_from_stories, DialogueTrainingData, Story,
};

const METADATA_FILE: &str = "policy_metadata.json";

/// Outcome of asking a predictor for the next action.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// One score per domain action.
    Probabilities(Vec<f32>),
    /// The session is over and no further actions should run.
    Finished,
}

/// Anything the agent can ask for the next action.
///
/// Takes the tracker mutably because interactive predictors may rewrite the
/// latest user message before deciding.
pub trait Predictor: Send {
    fn predict_next(
        &mut self,
        tracker: &mut DialogueStateTracker,
        domain: &Domain,
    ) -> Result<Decision, PolicyError>;
}

#[derive(Debug, Serialize, Deserialize)]
struct EnsembleMetadata {
    policy_names: Vec<String>,
    max_history: usize,
    featurizer: FeaturizerKind,
}

fn policy_kind(name: &str) -> Result<PolicyKind, PolicyError> {
    match name {
        "memoization" => Ok(PolicyKind::Memoization),
        "fallback" => Ok(PolicyKind::Fallback),
        other => Err(PolicyError::UnknownPolicy(other.to_string())),
    }
}

/// Ordered policies; the most confident one decides.
pub struct PolicyEnsemble {
    policies: Vec<Box<dyn Policy>>,
    featurizer: FeaturizerKind,
    max_history: usize,
}

impl PolicyEnsemble {
    pub fn new(policies: Vec<Box<dyn Policy>>, featurizer: FeaturizerKind, max_history: usize) -> Self {
        Self {
            policies,
            featurizer,
            max_history,
        }
    }

    /// Untrained policies in the configured order.
    pub fn from_config(config: &PolicyConfig) -> Self {
        let policies = config
            .policies
            .iter()
            .map(|kind| -> Box<dyn Policy> {
                match kind {
                    PolicyKind::Memoization => {
                        Box::new(MemoizationPolicy::new(config.featurizer, config.max_history))
                    }
                    PolicyKind::Fallback => Box::new(FallbackPolicy::from_config(config)),
                }
            })
            .collect();
        Self::new(policies, config.featurizer, config.max_history)
    }

    pub fn featurizer(&self) -> FeaturizerKind {
        self.featurizer
    }

    pub fn max_history(&self) -> usize {
        self.max_history
    }

    pub fn policy_names(&self) -> Vec<&'static str> {
        self.policies.iter().map(|p| p.name()).collect()
    }

    /// Training examples for `stories` using this ensemble's featurization.
    pub fn training_data(
        &self,
        stories: &[Story],
        domain: &Domain,
    ) -> Result<DialogueTrainingData, PolicyError> {
        training_data_from_stories(stories, domain, &self.featurizer, self.max_history)
    }

    /// Like [`Self::training_data`], with `augmentation_factor` extra
    /// dialogues glued together from random stories.
    pub fn augmented_training_data<R: Rng + ?Sized>(
        &self,
        stories: &[Story],
        domain: &Domain,
        augmentation_factor: usize,
        rng: &mut R,
    ) -> Result<DialogueTrainingData, PolicyError> {
        augmented_training_data(
            stories,
            domain,
            &self.featurizer,
            self.max_history,
            augmentation_factor,
            rng,
        )
    }

    pub fn train(&mut self, data: &DialogueTrainingData, domain: &Domain) -> Result<(), PolicyError> {
        for policy in &mut self.policies {
            policy.train(data, domain)?;
            debug!(policy = policy.name(), "Policy trained");
        }
        info!(
            policies = ?self.policy_names(),
            examples = data.num_examples(),
            "Ensemble trained"
        );
        Ok(())
    }

    pub fn continue_training(
        &mut self,
        data: &DialogueTrainingData,
        domain: &Domain,
    ) -> Result<(), PolicyError> {
        for policy in &mut self.policies {
            policy.continue_training(data, domain)?;
        }
        Ok(())
    }

    pub fn toggle_memoization(&mut self, enabled: bool) {
        for policy in &mut self.policies {
            policy.toggle_memoization(enabled);
        }
    }

    /// Scores of the policy with the highest single score. Ties go to the
    /// policy listed first.
    pub fn probabilities_using_best_policy(
        &self,
        tracker: &DialogueStateTracker,
        domain: &Domain,
    ) -> Result<Vec<f32>, PolicyError> {
        let mut best: Option<(f32, &'static str, Vec<f32>)> = None;
        for policy in &self.policies {
            let probabilities = policy.predict_action_probabilities(tracker, domain)?;
            let max = probabilities.iter().copied().fold(f32::MIN, f32::max);
            if !matches!(&best, Some((best_max, _, _)) if max <= *best_max) {
                best = Some((max, policy.name(), probabilities));
            }
        }
        Ok(match best {
            Some((confidence, name, probabilities)) => {
                debug!(policy = name, confidence, "Best policy selected");
                probabilities
            }
            None => vec![0.0; domain.num_actions()],
        })
    }

    /// Write the domain snapshot, the ensemble metadata and every policy
    /// into `dir`.
    pub fn persist(&self, dir: &Path, domain: &Domain) -> Result<(), PolicyError> {
        std::fs::create_dir_all(dir)?;
        domain.persist_specification(dir)?;
        let metadata = EnsembleMetadata {
            policy_names: self.policy_names().into_iter().map(String::from).collect(),
            max_history: self.max_history,
            featurizer: self.featurizer,
        };
        write_json(&dir.join(METADATA_FILE), &metadata)?;
        for policy in &self.policies {
            policy.persist(&dir.join(policy.name()))?;
        }
        info!(path = %dir.display(), "Policy ensemble persisted");
        Ok(())
    }

    pub fn load(dir: &Path) -> Result<Self, PolicyError> {
        let metadata: EnsembleMetadata = read_json(&dir.join(METADATA_FILE))?;
        let mut policies = Vec::with_capacity(metadata.policy_names.len());
        for name in &metadata.policy_names {
            policies.push(load_policy(policy_kind(name)?, &dir.join(name))?);
        }
        info!(path = %dir.display(), policies = ?metadata.policy_names, "Policy ensemble loaded");
        Ok(Self::new(policies, metadata.featurizer, metadata.max_history))
    }
}

impl Predictor for PolicyEnsemble {
    fn predict_next(
        &mut self,
        tracker: &mut DialogueStateTracker,
        domain: &Domain,
    ) -> Result<Decision, PolicyError> {
        self.probabilities_using_best_policy(tracker, domain)
            .map(Decision::Probabilities)
    }
}
