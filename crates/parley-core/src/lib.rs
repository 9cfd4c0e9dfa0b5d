pub mod config;
pub mod domain;
pub mod error;
pub mod events;
pub mod features;
pub mod slots;
pub mod story;
pub mod tracker;
pub mod types;

pub use config::ParleyConfig;
pub use domain::{Action, Domain, DomainModel, TemplateVariant};
pub use error::{ParleyError, Result};
pub use events::Event;
pub use features::{FeatureIndex, Featurizer, FeaturizerKind};
pub use slots::{Slot, SlotType};
pub use tracker::{DialogueStateTracker, TrackerState, TranscriptDump};
pub use types::*;
