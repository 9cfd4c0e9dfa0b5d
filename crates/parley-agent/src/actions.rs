//! Custom actions registered by the embedding application.
//!
//! Template actions (`utter_*`), listen and restart are executed by the
//! agent itself. Every other action in the domain needs a handler here.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parley_channel::Dispatcher;
use parley_core::{DialogueStateTracker, Domain, Event};

use crate::error::AgentError;

/// Code run when the policy picks a custom action.
///
/// Handlers send messages through the dispatcher and return the events to
/// append to the tracker, such as slot updates.
#[async_trait]
pub trait CustomAction: Send + Sync {
    async fn run(
        &self,
        dispatcher: &mut Dispatcher<'_>,
        tracker: &DialogueStateTracker,
        domain: &Domain,
    ) -> Result<Vec<Event>, AgentError>;
}

/// Custom action handlers keyed by the identifier used in the domain's
/// `actions` list.
#[derive(Default, Clone)]
pub struct ActionRegistry {
    handlers: HashMap<String, Arc<dyn CustomAction>>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, identifier: impl Into<String>, handler: Arc<dyn CustomAction>) {
        let identifier = identifier.into();
        tracing::debug!(action = %identifier, "Custom action registered");
        self.handlers.insert(identifier, handler);
    }

    pub fn get(&self, identifier: &str) -> Option<Arc<dyn CustomAction>> {
        self.handlers.get(identifier).cloned()
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.handlers.contains_key(identifier)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
