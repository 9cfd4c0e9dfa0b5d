//! Running conversations: the agent loop, custom actions, tracker storage
//! and transcript replay.

pub mod actions;
pub mod agent;
pub mod error;
pub mod restore;
pub mod tracker_store;

pub use actions::{ActionRegistry, CustomAction};
pub use agent::{persist_model, regex_agent, train_ensemble, Agent, MessageOutcome, DOMAIN_FILE};
pub use error::AgentError;
pub use restore::{align_lists, load_tracker_from_json, replay_events, Divergence, ReplayReport};
pub use tracker_store::{InMemoryTrackerStore, TrackerStore};
