//! Next-action prediction.
//!
//! Policies map a tracker's recent history to a probability per domain
//! action. A [`PolicyEnsemble`] combines several of them, and the
//! [`OnlinePolicyEnsemble`] puts a human in the loop to correct predictions
//! while a conversation is running.

pub mod ensemble;
pub mod error;
pub mod fallback;
pub mod memoization;
pub mod online;
pub mod policy;
pub mod training;

pub use ensemble::{Decision, PolicyEnsemble, Predictor};
pub use error::{OnlineError, PolicyError};
pub use fallback::FallbackPolicy;
pub use memoization::MemoizationPolicy;
pub use online::{
    ConsoleTrainingPort, IntentExample, OnlineConfirmation, OnlinePolicyEnsemble,
    ScriptedTrainingPort, TrainingPort,
};
pub use policy::{argmax, load_policy, one_hot, Policy, TrainingState};
pub use training::{DialogueTrainingData, Story, StoryReader};
