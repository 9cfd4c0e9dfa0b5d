//! The message-processing loop.
//!
//! For each incoming message the agent:
//! 1. Locks the sender's conversation
//! 2. Parses the text with the configured interpreter
//! 3. Logs the user turn (and any slots its entities fill) on the tracker
//! 4. Predicts and executes actions until the bot listens again
//! 5. Saves the tracker

use std::io::BufRead;
use std::path::Path;
use std::sync::Arc;

use parley_channel::{ConsoleInputChannel, Dispatcher, OutputChannel, TemplateVars};
use parley_core::config::{AgentConfig, ParleyConfig, PolicyConfig};
use parley_core::story::ACTION_LISTEN_NAME;
use parley_core::{Action, DialogueStateTracker, Domain, DomainModel, Event};
use parley_nlu::{create_interpreter, DynInterpreter, RegexInterpreter};
use parley_policy::{argmax, Decision, DialogueTrainingData, PolicyEnsemble, Predictor, StoryReader};
use tokio::sync::Mutex;

use crate::actions::ActionRegistry;
use crate::error::AgentError;
use crate::tracker_store::{InMemoryTrackerStore, TrackerStore};

/// Domain file stored next to a trained model.
pub const DOMAIN_FILE: &str = "domain.yml";

const RESTART_TEMPLATE: &str = "utter_restart";

/// What happened while handling one message.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessageOutcome {
    /// Names of the actions executed, in order.
    pub actions: Vec<String>,
    /// The predictor ended the session; no more messages should be sent.
    pub finished: bool,
}

/// Ties a domain, a predictor and an interpreter together.
pub struct Agent {
    domain: Arc<Domain>,
    predictor: Mutex<Box<dyn Predictor>>,
    interpreter: Box<dyn DynInterpreter>,
    tracker_store: Arc<dyn TrackerStore>,
    actions: ActionRegistry,
    config: AgentConfig,
}

impl Agent {
    /// An agent with an in-memory tracker store and no custom actions.
    pub fn new(
        domain: Arc<Domain>,
        predictor: Box<dyn Predictor>,
        interpreter: Box<dyn DynInterpreter>,
    ) -> Self {
        Self {
            domain,
            predictor: Mutex::new(predictor),
            interpreter,
            tracker_store: Arc::new(InMemoryTrackerStore::new()),
            actions: ActionRegistry::new(),
            config: AgentConfig::default(),
        }
    }

    pub fn with_tracker_store(mut self, tracker_store: Arc<dyn TrackerStore>) -> Self {
        self.tracker_store = tracker_store;
        self
    }

    pub fn with_actions(mut self, actions: ActionRegistry) -> Self {
        self.actions = actions;
        self
    }

    pub fn with_config(mut self, config: AgentConfig) -> Self {
        self.config = config;
        self
    }

    /// Load a persisted model, refusing to run it if the domain's features
    /// changed since training.
    pub fn load(model_dir: &Path, config: &ParleyConfig) -> Result<Self, AgentError> {
        let domain = Domain::load(&model_dir.join(DOMAIN_FILE))?;
        domain.compare_with_specification(model_dir)?;
        let ensemble = PolicyEnsemble::load(model_dir)?;
        let interpreter = create_interpreter(&config.interpreter)?;
        tracing::info!(path = %model_dir.display(), "Agent loaded");
        Ok(Self::new(Arc::new(domain), Box::new(ensemble), interpreter)
            .with_config(config.agent.clone()))
    }

    pub fn domain(&self) -> &Domain {
        &self.domain
    }

    pub fn tracker_store(&self) -> &Arc<dyn TrackerStore> {
        &self.tracker_store
    }

    /// Current tracker for a sender, if one has been saved.
    pub async fn tracker(&self, sender_id: &str) -> Option<DialogueStateTracker> {
        self.tracker_store.retrieve(sender_id).await
    }

    /// Process one user message and send the bot's responses to `output`.
    pub async fn handle_message(
        &self,
        text: &str,
        sender_id: &str,
        output: &dyn OutputChannel,
    ) -> Result<MessageOutcome, AgentError> {
        let _guard = self.tracker_store.lock(sender_id).await;
        let mut tracker = self.tracker_store.get_or_create(sender_id, &self.domain).await;
        let parse_data = self.interpreter.parse_boxed(text).await;
        tracing::debug!(
            sender_id = %sender_id,
            intent = ?parse_data.intent_name(),
            entities = parse_data.entities.len(),
            "Received user message"
        );

        let mut dispatcher = Dispatcher::new(sender_id, output, &self.domain);
        let mut outcome = MessageOutcome::default();

        if parse_data.intent_name() == Some(self.domain.restart_intent()) {
            tracker.update(Event::user(parse_data));
            self.restart(&mut dispatcher, &mut tracker);
            outcome.actions.push(Action::Restart.name().to_string());
        } else {
            let slots = self.domain.slots_for_entities(&parse_data.entities);
            tracker.update(Event::user(parse_data));
            for event in slots {
                tracker.update(event);
            }
            let result = self.predict_and_execute(&mut dispatcher, &mut tracker, &mut outcome).await;
            if let Err(e) = result {
                // Keep whatever happened before the failure.
                self.tracker_store.save(&tracker).await;
                return Err(e);
            }
        }

        self.tracker_store.save(&tracker).await;
        Ok(outcome)
    }

    async fn predict_and_execute(
        &self,
        dispatcher: &mut Dispatcher<'_>,
        tracker: &mut DialogueStateTracker,
        outcome: &mut MessageOutcome,
    ) -> Result<(), AgentError> {
        for _ in 0..self.config.max_number_of_predictions {
            let decision = self
                .predictor
                .lock()
                .await
                .predict_next(tracker, &self.domain)?;
            let probabilities = match decision {
                Decision::Probabilities(p) => p,
                Decision::Finished => {
                    outcome.finished = true;
                    return Ok(());
                }
            };
            let index = argmax(&probabilities).unwrap_or(0);
            let action = self.domain.action_for_index(index)?.clone();
            tracing::debug!(
                action = %action.name(),
                confidence = probabilities.get(index).copied().unwrap_or_default(),
                "Predicted next action"
            );
            outcome.actions.push(action.name().to_string());

            if !self.execute(&action, dispatcher, tracker).await? {
                return Ok(());
            }
        }
        tracing::warn!(
            sender_id = %tracker.sender_id(),
            limit = self.config.max_number_of_predictions,
            "Circuit breaker tripped. Stopped predicting more actions"
        );
        Ok(())
    }

    /// Run one action. Returns whether another action should follow.
    async fn execute(
        &self,
        action: &Action,
        dispatcher: &mut Dispatcher<'_>,
        tracker: &mut DialogueStateTracker,
    ) -> Result<bool, AgentError> {
        match action {
            Action::Listen => {
                tracker.update(Event::action(ACTION_LISTEN_NAME));
                Ok(false)
            }
            Action::Restart => {
                self.restart(dispatcher, tracker);
                Ok(false)
            }
            Action::Utter(template) => {
                dispatcher.utter_template(template, &tracker.current_slot_values(), &TemplateVars::new());
                tracker.update(Event::action(template.clone()));
                Ok(true)
            }
            Action::Custom { identifier, name } => {
                let handler = self
                    .actions
                    .get(identifier)
                    .ok_or_else(|| AgentError::UnregisteredAction(identifier.clone()))?;
                let events = handler.run(dispatcher, tracker, &self.domain).await?;
                tracker.update(Event::action(name.clone()));
                for event in events {
                    tracker.update(event);
                }
                Ok(true)
            }
        }
    }

    /// Wipe the conversation and start listening again.
    fn restart(&self, dispatcher: &mut Dispatcher<'_>, tracker: &mut DialogueStateTracker) {
        if self.domain.templates().contains_key(RESTART_TEMPLATE) {
            dispatcher.utter_template(RESTART_TEMPLATE, &tracker.current_slot_values(), &TemplateVars::new());
        }
        tracker.update(Event::action(Action::Restart.name()));
        tracker.update(Event::Restarted);
        tracker.update(Event::action(ACTION_LISTEN_NAME));
        tracing::info!(sender_id = %tracker.sender_id(), "Conversation restarted");
    }

    /// Read messages from a console until the user stops or the predictor
    /// finishes the session.
    pub async fn handle_channel<R: BufRead>(
        &self,
        input: &mut ConsoleInputChannel<R>,
        output: &dyn OutputChannel,
    ) -> Result<(), AgentError> {
        let sender_id = input.sender_id().to_string();
        while let Some(text) = input.next_message()? {
            let outcome = self.handle_message(&text, &sender_id, output).await?;
            if outcome.finished {
                tracing::info!(sender_id = %sender_id, "Session finished");
                break;
            }
        }
        Ok(())
    }
}

/// Read stories and train a fresh ensemble on them, augmented with
/// `config.augmentation_factor` glued dialogues.
pub fn train_ensemble(
    domain: &Domain,
    stories_path: &Path,
    config: &PolicyConfig,
) -> Result<(PolicyEnsemble, DialogueTrainingData), AgentError> {
    let stories = StoryReader::new(domain).read_file(stories_path)?;
    let mut ensemble = PolicyEnsemble::from_config(config);
    let data = ensemble.augmented_training_data(
        &stories,
        domain,
        config.augmentation_factor,
        &mut rand::rng(),
    )?;
    ensemble.train(&data, domain)?;
    Ok((ensemble, data))
}

/// Write everything [`Agent::load`] needs into `model_dir`.
pub fn persist_model(model_dir: &Path, domain: &Domain, ensemble: &PolicyEnsemble) -> Result<(), AgentError> {
    ensemble.persist(model_dir, domain)?;
    domain.persist(&model_dir.join(DOMAIN_FILE))?;
    tracing::info!(path = %model_dir.display(), "Model persisted");
    Ok(())
}

/// An agent that understands only the `/intent{...}` syntax.
pub fn regex_agent(domain: Arc<Domain>, predictor: Box<dyn Predictor>) -> Agent {
    Agent::new(domain, predictor, Box::new(RegexInterpreter::new()))
}
