//! Human-supervised correction of a policy ensemble's predictions.
//!
//! Every prediction cycle walks the same steps:
//! - Predict -> Present (ask the base ensemble, take the best action)
//! - Present -> Confirm (show recent history and the proposed action)
//! - Confirm -> done (accepted, or the action was corrected and learned)
//! - Confirm -> Predict (the intent was corrected, predict again)
//! - Confirm -> finished (stories exported, session over)
//!
//! Any answer outside the offered choices ends the session with an error.

use std::collections::VecDeque;
use std::fmt;
use std::io::{BufRead, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

use ndarray::Array2;
use parley_core::config::OnlineConfig;
use parley_core::story::ACTION_LISTEN_NAME;
use parley_core::{
    DialogueStateTracker, Domain, DomainModel, Event, Intent, RankedIntent, TrackerState,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::ensemble::{Decision, PolicyEnsemble, Predictor};
use crate::error::{OnlineError, PolicyError};
use crate::policy::{argmax, one_hot};
use crate::training::DialogueTrainingData;

const DEFAULT_EXPORT_PATH: &str = "stories.md";

// ============================================================================
// Training ports
// ============================================================================

/// The human side of an online training session.
pub trait TrainingPort: Send {
    fn show(&mut self, text: &str);

    /// Show `prompt` and wait for one line of input.
    fn request_input(&mut self, prompt: &str) -> Result<String, OnlineError>;
}

/// Talks to whoever sits at the terminal.
#[derive(Debug, Default)]
pub struct ConsoleTrainingPort;

impl TrainingPort for ConsoleTrainingPort {
    fn show(&mut self, text: &str) {
        println!("{text}");
    }

    fn request_input(&mut self, prompt: &str) -> Result<String, OnlineError> {
        let mut out = std::io::stdout();
        write!(out, "{prompt}")?;
        out.flush()?;
        let mut line = String::new();
        if std::io::stdin().lock().read_line(&mut line)? == 0 {
            return Err(OnlineError::InputExhausted);
        }
        Ok(line.trim().to_string())
    }
}

#[derive(Debug, Default)]
struct ScriptedInner {
    inputs: VecDeque<String>,
    transcript: Vec<String>,
}

/// Answers prompts from a fixed list and records everything shown.
///
/// Clones share the same script, so a test can keep one handle while the
/// session owns the other.
#[derive(Debug, Clone, Default)]
pub struct ScriptedTrainingPort {
    inner: Arc<Mutex<ScriptedInner>>,
}

impl ScriptedTrainingPort {
    pub fn new<I, S>(inputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            inner: Arc::new(Mutex::new(ScriptedInner {
                inputs: inputs.into_iter().map(Into::into).collect(),
                transcript: Vec::new(),
            })),
        }
    }

    pub fn push_input(&self, input: impl Into<String>) {
        self.lock().inputs.push_back(input.into());
    }

    /// Everything shown or prompted so far.
    pub fn transcript(&self) -> Vec<String> {
        self.lock().transcript.clone()
    }

    pub fn remaining_inputs(&self) -> usize {
        self.lock().inputs.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ScriptedInner> {
        self.inner.lock().expect("training port mutex poisoned")
    }
}

impl TrainingPort for ScriptedTrainingPort {
    fn show(&mut self, text: &str) {
        self.lock().transcript.push(text.to_string());
    }

    fn request_input(&mut self, prompt: &str) -> Result<String, OnlineError> {
        let mut inner = self.lock();
        inner.transcript.push(prompt.to_string());
        inner.inputs.pop_front().ok_or(OnlineError::InputExhausted)
    }
}

/// Ask for an index below `n`; anything else is an error.
fn request_index(port: &mut dyn TrainingPort, prompt: &str, n: usize) -> Result<usize, OnlineError> {
    let input = port.request_input(prompt)?;
    let input = input.trim();
    match input.parse::<usize>() {
        Ok(index) if index < n => Ok(index),
        _ => Err(OnlineError::InvalidInput {
            input: input.to_string(),
            valid: (0..n).map(|i| i.to_string()).collect(),
        }),
    }
}

// ============================================================================
// Session state
// ============================================================================

/// The supervisor's verdict on a proposed action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnlineConfirmation {
    Accept,
    WrongAction,
    WrongIntent,
    Stop,
}

impl OnlineConfirmation {
    /// Answers offered for a proposal. Intent corrections only make sense
    /// right after the user spoke.
    fn choices(after_listen: bool) -> &'static [(&'static str, OnlineConfirmation, &'static str)] {
        if after_listen {
            &[
                ("1", Self::Accept, "Yes"),
                ("2", Self::WrongAction, "No, intent is right but the action is wrong"),
                ("3", Self::WrongIntent, "The intent is wrong"),
                ("0", Self::Stop, "Export current conversations as stories and quit"),
            ]
        } else {
            &[
                ("1", Self::Accept, "Yes."),
                ("2", Self::WrongAction, "No, the action is wrong."),
                ("0", Self::Stop, "Export current conversations as stories and quit"),
            ]
        }
    }
}

/// Where a prediction cycle currently is.
#[derive(Debug, Clone, PartialEq)]
enum TrainingStep {
    Predict,
    Present { probabilities: Vec<f32>, action: usize },
    Confirm { probabilities: Vec<f32>, action: usize, after_listen: bool },
}

impl fmt::Display for TrainingStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrainingStep::Predict => write!(f, "Predict"),
            TrainingStep::Present { .. } => write!(f, "Present"),
            TrainingStep::Confirm { .. } => write!(f, "Confirm"),
        }
    }
}

/// A message whose intent the supervisor corrected, kept for NLU training.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentExample {
    pub text: String,
    pub intent: String,
}

// ============================================================================
// OnlinePolicyEnsemble
// ============================================================================

/// Wraps a trained ensemble and asks a human to confirm every prediction.
///
/// Memoization is switched off for the session so that states remembered
/// from the stories do not hide what the supervisor is teaching. Corrections
/// are still memorized and recalled again once the ensemble is handed back.
pub struct OnlinePolicyEnsemble {
    base: PolicyEnsemble,
    display_history: usize,
    batch_size: usize,
    epochs: usize,
    train_data: DialogueTrainingData,
    stories: Vec<String>,
    extra_intent_examples: Vec<IntentExample>,
    port: Box<dyn TrainingPort>,
    rng: StdRng,
}

impl OnlinePolicyEnsemble {
    pub fn new(
        mut base: PolicyEnsemble,
        train_data: DialogueTrainingData,
        config: &OnlineConfig,
        port: Box<dyn TrainingPort>,
    ) -> Self {
        base.toggle_memoization(false);
        Self {
            base,
            display_history: config.max_history,
            batch_size: config.batch_size,
            epochs: config.epochs,
            train_data,
            stories: Vec::new(),
            extra_intent_examples: Vec::new(),
            port,
            rng: StdRng::from_os_rng(),
        }
    }

    /// Make batch sampling reproducible.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn base(&self) -> &PolicyEnsemble {
        &self.base
    }

    /// Give back the ensemble with everything learned during the session.
    pub fn into_base(mut self) -> PolicyEnsemble {
        self.base.toggle_memoization(true);
        self.base
    }

    pub fn train_data(&self) -> &DialogueTrainingData {
        &self.train_data
    }

    /// Conversations in which an action was corrected, as markdown stories.
    pub fn stories(&self) -> &[String] {
        &self.stories
    }

    pub fn extra_intent_examples(&self) -> &[IntentExample] {
        &self.extra_intent_examples
    }

    /// Run prediction cycles until one produces a decision.
    pub fn probabilities_using_best_policy(
        &mut self,
        tracker: &mut DialogueStateTracker,
        domain: &Domain,
    ) -> Result<Decision, PolicyError> {
        let mut step = TrainingStep::Predict;
        loop {
            let from = step.to_string();
            let next = match step {
                TrainingStep::Predict => {
                    let probabilities = self.base.probabilities_using_best_policy(tracker, domain)?;
                    let action = argmax(&probabilities).unwrap_or(0);
                    TrainingStep::Present {
                        probabilities,
                        action,
                    }
                }
                TrainingStep::Present {
                    probabilities,
                    action,
                } => {
                    let after_listen = self.present(tracker, domain, action)?;
                    TrainingStep::Confirm {
                        probabilities,
                        action,
                        after_listen,
                    }
                }
                TrainingStep::Confirm {
                    probabilities,
                    action,
                    after_listen,
                } => match self.confirm(after_listen)? {
                    OnlineConfirmation::Accept => {
                        if domain.action_for_index(action)?.name() == ACTION_LISTEN_NAME {
                            self.port.show("Next user input:");
                        }
                        return Ok(Decision::Probabilities(probabilities));
                    }
                    OnlineConfirmation::WrongAction => {
                        let featurizer = self.base.featurizer();
                        let x = domain.slice_history(&featurizer, tracker, self.base.max_history());
                        let y = self.request_action(tracker, domain, &probabilities)?;
                        self.fit_example(x, y, domain)?;
                        self.stories.push(tracker.export_stories());
                        return Ok(Decision::Probabilities(one_hot(y, domain.num_actions())));
                    }
                    OnlineConfirmation::WrongIntent => {
                        self.correct_intent(tracker, domain)?;
                        TrainingStep::Predict
                    }
                    OnlineConfirmation::Stop => {
                        self.export_stories(tracker)?;
                        return Ok(Decision::Finished);
                    }
                },
            };
            debug!("Online training step: {} -> {}", from, next);
            step = next;
        }
    }

    /// Show the history and the proposal. Returns whether the proposal
    /// follows a fresh user message.
    fn present(
        &mut self,
        tracker: &DialogueStateTracker,
        domain: &Domain,
        action: usize,
    ) -> Result<bool, PolicyError> {
        let after_listen = self.print_history(tracker);
        let name = domain.action_for_index(action)?.name().to_string();
        if after_listen {
            self.port
                .show(&format!("The bot wants to [{name}] due to the intent. Is this correct?\n"));
        } else {
            self.port.show(&format!("The bot wants to [{name}]. Is this correct?\n"));
        }
        Ok(after_listen)
    }

    fn confirm(&mut self, after_listen: bool) -> Result<OnlineConfirmation, OnlineError> {
        let choices = OnlineConfirmation::choices(after_listen);
        let prompt: String = choices
            .iter()
            .map(|(key, _, label)| format!("\t{key}.\t{label}\n"))
            .collect();
        let answer = self.port.request_input(&prompt)?;
        let answer = answer.trim();
        choices
            .iter()
            .find(|(key, _, _)| *key == answer)
            .map(|(_, confirmation, _)| *confirmation)
            .ok_or_else(|| OnlineError::InvalidInput {
                input: answer.to_string(),
                valid: choices.iter().map(|(key, _, _)| key.to_string()).collect(),
            })
    }

    /// Ask which action the bot should have taken.
    fn request_action(
        &mut self,
        tracker: &DialogueStateTracker,
        domain: &Domain,
        probabilities: &[f32],
    ) -> Result<usize, PolicyError> {
        self.print_history(tracker);
        self.port.show("what is the next action for the bot?\n");
        for (i, name) in domain.action_names().iter().enumerate() {
            let p = probabilities.get(i).copied().unwrap_or_default();
            self.port.show(&format!("{i:>10}{name:>40}    {p:03.2}"));
        }
        let index = request_index(self.port.as_mut(), "", domain.num_actions())?;
        let name = domain.action_for_index(index)?.name().to_string();
        self.port
            .show(&format!("thanks! The bot will now [{name}]\n -----------"));
        Ok(index)
    }

    /// Learn one corrected example without letting it dominate: each epoch
    /// fits it together with a small random batch of earlier examples.
    fn fit_example(&mut self, x: Array2<f32>, y: usize, domain: &Domain) -> Result<(), PolicyError> {
        let num_samples = self.batch_size.saturating_sub(1);
        for _ in 0..self.epochs {
            let mut batch = self.train_data.random_samples(num_samples, &mut self.rng);
            batch.append(x.clone(), y);
            self.base.continue_training(&batch, domain)?;
        }
        self.train_data.append(x, y);
        info!(
            action = y,
            examples = self.train_data.num_examples(),
            "Learned corrected action"
        );
        Ok(())
    }

    /// Replace the latest user message with one carrying the chosen intent.
    fn correct_intent(
        &mut self,
        tracker: &mut DialogueStateTracker,
        domain: &Domain,
    ) -> Result<(), PolicyError> {
        let text = tracker.latest_message().text.clone();
        self.port.show("------\n");
        self.port.show(&format!("User said:\t {text}"));
        self.port.show("What intent is this?\t");
        for (i, intent) in domain.intents().iter().enumerate() {
            self.port.show(&format!("\t{i}\t{intent}"));
        }
        let index = request_index(self.port.as_mut(), "", domain.intents().len())?;
        let intent = domain.intents()[index].clone();

        self.extra_intent_examples.push(IntentExample {
            text: text.clone(),
            intent: intent.clone(),
        });

        let mut message = tracker.latest_message().clone();
        message.intent = Intent::new(intent.clone(), 1.0);
        message.intent_ranking = Some(vec![RankedIntent {
            name: intent.clone(),
            confidence: 1.0,
        }]);
        let slots = domain.slots_for_entities(&message.entities);
        tracker.update(Event::UserUtteranceReverted);
        tracker.update(Event::user(message));
        for event in slots {
            tracker.update(event);
        }
        debug!(intent = %intent, "Latest user message re-labelled");
        Ok(())
    }

    fn export_stories(&mut self, tracker: &mut DialogueStateTracker) -> Result<(), PolicyError> {
        let answer = self.port.request_input(
            "File to export to (if file exists, this will append the stories) [stories.md]: ",
        )?;
        let path = match answer.trim() {
            "" => DEFAULT_EXPORT_PATH.to_string(),
            path => path.to_string(),
        };
        tracker.export_stories_to_file(Path::new(&path))?;
        tracker.update(Event::StoryExported { path: path.clone() });
        info!(path = %path, "Stories got exported");
        Ok(())
    }

    /// Print the last few turns and the slots. Returns whether the bot's
    /// latest action was to listen.
    fn print_history(&mut self, tracker: &DialogueStateTracker) -> bool {
        let states = tracker.prior_states();
        let start = states.len().saturating_sub(self.display_history);
        let recent = &states[start..];
        let mut lines = vec!["------".to_string(), "Chat history:\n".to_string()];
        let mut latest_was_listen = false;

        for (i, state) in recent.iter().enumerate() {
            let action = state.latest_action_name.as_deref().unwrap_or("None");
            lines.push(format!("\tbot did:\t{action}\n"));
            if action != ACTION_LISTEN_NAME {
                continue;
            }
            let intent = state.latest_message.intent_name().unwrap_or_default();
            if i + 1 < recent.len() {
                lines.push(format!("\tuser did:\t{intent}\n"));
            } else {
                lines.push(format!("\tuser said:\t{}\n", tracker.latest_message().text));
                lines.push(format!("\t\t whose intent is:\t{intent}\n"));
                latest_was_listen = true;
            }
            lines.extend(entity_lines(state));
        }

        let slots: Vec<String> = tracker
            .state()
            .slots
            .iter()
            .map(|(name, value)| format!("{name}: {}", display_value(value)))
            .collect();
        lines.push(format!("we currently have slots: {}\n", slots.join(", ")));
        lines.push("------".to_string());

        for line in lines {
            self.port.show(&line);
        }
        latest_was_listen
    }
}

fn entity_lines(state: &TrackerState) -> Vec<String> {
    state
        .latest_message
        .entities
        .iter()
        .map(|e| format!("\twith {}:\t{}\n", e.entity, display_value(&e.value)))
        .collect()
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl Predictor for OnlinePolicyEnsemble {
    fn predict_next(
        &mut self,
        tracker: &mut DialogueStateTracker,
        domain: &Domain,
    ) -> Result<Decision, PolicyError> {
        self.probabilities_using_best_policy(tracker, domain)
    }
}
