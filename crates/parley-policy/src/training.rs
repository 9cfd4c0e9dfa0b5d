//! Training examples and the markdown stories they are generated from.

use std::path::Path;
use std::sync::LazyLock;

use ndarray::Array2;
use rand::seq::{index, SliceRandom};
use rand::Rng;
use regex::Regex;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use parley_core::features::Featurizer;
use parley_core::story::ACTION_LISTEN_NAME;
use parley_core::{Domain, DomainModel, Event};
use parley_nlu::RegexInterpreter;

use crate::error::PolicyError;

// ============================================================================
// DialogueTrainingData
// ============================================================================

/// State slices and the action index that followed each of them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DialogueTrainingData {
    pub x: Vec<Array2<f32>>,
    pub y: Vec<usize>,
}

impl DialogueTrainingData {
    pub fn new(x: Vec<Array2<f32>>, y: Vec<usize>) -> Self {
        debug_assert_eq!(x.len(), y.len());
        Self { x, y }
    }

    pub fn num_examples(&self) -> usize {
        self.y.len()
    }

    pub fn is_empty(&self) -> bool {
        self.y.is_empty()
    }

    /// Up to `n` distinct examples drawn at random.
    pub fn random_samples<R: Rng + ?Sized>(&self, n: usize, rng: &mut R) -> Self {
        let amount = n.min(self.num_examples());
        let picked = index::sample(rng, self.num_examples(), amount);
        Self {
            x: picked.iter().map(|i| self.x[i].clone()).collect(),
            y: picked.iter().map(|i| self.y[i]).collect(),
        }
    }

    pub fn append(&mut self, x: Array2<f32>, y: usize) {
        self.x.push(x);
        self.y.push(y);
    }

    pub fn extend(&mut self, other: DialogueTrainingData) {
        self.x.extend(other.x);
        self.y.extend(other.y);
    }

    /// A copy with the examples in random order.
    pub fn shuffled<R: Rng + ?Sized>(&self, rng: &mut R) -> Self {
        let mut order: Vec<usize> = (0..self.num_examples()).collect();
        order.shuffle(rng);
        Self {
            x: order.iter().map(|&i| self.x[i].clone()).collect(),
            y: order.iter().map(|&i| self.y[i]).collect(),
        }
    }

    /// Feature count of the examples, if there are any.
    pub fn num_features(&self) -> Option<usize> {
        self.x.first().map(|x| x.ncols())
    }
}

// ============================================================================
// Stories
// ============================================================================

/// A named sequence of events read from a story file.
#[derive(Debug, Clone, PartialEq)]
pub struct Story {
    pub name: String,
    pub events: Vec<Event>,
}

impl Story {
    /// Replay the story and record the state slice before every predictable
    /// action.
    pub fn training_examples(
        &self,
        domain: &Domain,
        featurizer: &dyn Featurizer,
        max_history: usize,
    ) -> Result<DialogueTrainingData, PolicyError> {
        let mut tracker = domain.new_tracker(self.name.clone());
        tracker.update(Event::action(ACTION_LISTEN_NAME));
        let mut data = DialogueTrainingData::default();

        for event in &self.events {
            if let Event::ActionExecuted { name, predictable } = event {
                let y = domain.index_for_action(name)?;
                if *predictable {
                    data.append(domain.slice_history(featurizer, &tracker, max_history), y);
                }
            }
            tracker.update(event.clone());
        }
        Ok(data)
    }
}

static STORY_HEADER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^##\s*(.*)$").expect("Invalid story header regex"));

static SLOT_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^slot\s*(\{.*\})\s*$").expect("Invalid slot line regex"));

/// Reads stories written in the markdown format produced by
/// [`DialogueStateTracker::export_stories`].
pub struct StoryReader<'a> {
    domain: &'a Domain,
    interpreter: RegexInterpreter,
}

impl<'a> StoryReader<'a> {
    pub fn new(domain: &'a Domain) -> Self {
        Self {
            domain,
            interpreter: RegexInterpreter::new(),
        }
    }

    pub fn read_file(&self, path: &Path) -> Result<Vec<Story>, PolicyError> {
        let content = std::fs::read_to_string(path)?;
        let stories = self.read_str(&content)?;
        info!(path = %path.display(), stories = stories.len(), "Stories loaded");
        Ok(stories)
    }

    /// Parse stories. A listen action is inserted before every user turn
    /// that does not already follow one, and at the end of every story.
    pub fn read_str(&self, content: &str) -> Result<Vec<Story>, PolicyError> {
        let mut stories = Vec::new();
        let mut current: Option<Story> = None;

        for (i, raw) in content.lines().enumerate() {
            let line_no = i + 1;
            let line = raw.trim();
            if line.is_empty() || line.starts_with("<!--") || line.starts_with('>') {
                continue;
            }

            if let Some(caps) = STORY_HEADER.captures(line) {
                if let Some(story) = current.take() {
                    stories.push(finish_story(story));
                }
                current = Some(Story {
                    name: caps[1].trim().to_string(),
                    events: Vec::new(),
                });
                continue;
            }

            let Some(story) = current.as_mut() else {
                return Err(PolicyError::Story {
                    line: line_no,
                    message: "expected a '## story name' header first".into(),
                });
            };

            if let Some(user) = line.strip_prefix('*') {
                self.add_user_turn(story, user.trim(), line_no);
            } else if let Some(action) = line.strip_prefix('-') {
                self.add_bot_step(story, action.trim(), line_no)?;
            } else {
                return Err(PolicyError::Story {
                    line: line_no,
                    message: format!("unrecognized line '{line}'"),
                });
            }
        }
        if let Some(story) = current.take() {
            stories.push(finish_story(story));
        }
        Ok(stories)
    }

    fn add_user_turn(&self, story: &mut Story, text: &str, line_no: usize) {
        if !ends_with_listen(&story.events) {
            story.events.push(Event::action(ACTION_LISTEN_NAME));
        }
        let parse_data = self.interpreter.parse_text(&format!("/{text}"));
        match parse_data.intent_name() {
            Some(intent) if !self.domain.intents().iter().any(|i| i == intent) => {
                warn!(line = line_no, intent = %intent, "Story uses an intent the domain does not list");
            }
            None => warn!(line = line_no, "Story user turn has no intent"),
            _ => {}
        }
        let slots = self.domain.slots_for_entities(&parse_data.entities);
        story.events.push(Event::user(parse_data));
        story.events.extend(slots);
    }

    fn add_bot_step(&self, story: &mut Story, step: &str, line_no: usize) -> Result<(), PolicyError> {
        if let Some(caps) = SLOT_LINE.captures(step) {
            let slots: Map<String, Value> =
                serde_json::from_str(&caps[1]).map_err(|e| PolicyError::Story {
                    line: line_no,
                    message: format!("slot event is not a json object: {e}"),
                })?;
            story
                .events
                .extend(slots.into_iter().map(|(name, value)| Event::slot(name, value)));
            return Ok(());
        }
        match step {
            "restart" => story.events.push(Event::Restarted),
            "reset_slots" => story.events.push(Event::AllSlotsReset),
            name => {
                // Unknown actions are fatal here rather than at training time.
                self.domain.index_for_action(name)?;
                story.events.push(Event::action(name));
            }
        }
        Ok(())
    }
}

fn ends_with_listen(events: &[Event]) -> bool {
    let last_action = events.iter().rev().find_map(|e| match e {
        Event::ActionExecuted { name, .. } => Some(name.as_str()),
        Event::UserUttered { .. } => Some(""),
        _ => None,
    });
    matches!(last_action, None | Some(ACTION_LISTEN_NAME))
}

fn finish_story(mut story: Story) -> Story {
    if !ends_with_listen(&story.events) {
        story.events.push(Event::action(ACTION_LISTEN_NAME));
    }
    story
}

/// Turn every story into training examples.
pub fn training_data_from_stories(
    stories: &[Story],
    domain: &Domain,
    featurizer: &dyn Featurizer,
    max_history: usize,
) -> Result<DialogueTrainingData, PolicyError> {
    let mut data = DialogueTrainingData::default();
    for story in stories {
        data.extend(story.training_examples(domain, featurizer, max_history)?);
    }
    debug!(examples = data.num_examples(), "Generated training data");
    Ok(data)
}

/// `count` extra dialogues, each two randomly chosen stories played back to
/// back. Every story ends with a listen, so the second one picks up where a
/// finished conversation would.
pub fn glue_stories<R: Rng + ?Sized>(stories: &[Story], count: usize, rng: &mut R) -> Vec<Story> {
    if stories.is_empty() {
        return Vec::new();
    }
    (0..count)
        .map(|_| {
            let first = &stories[rng.random_range(0..stories.len())];
            let second = &stories[rng.random_range(0..stories.len())];
            Story {
                name: format!("{} > {}", first.name, second.name),
                events: first.events.iter().chain(&second.events).cloned().collect(),
            }
        })
        .collect()
}

/// Training examples for `stories` plus `augmentation_factor` glued
/// dialogues, in random order.
pub fn augmented_training_data<R: Rng + ?Sized>(
    stories: &[Story],
    domain: &Domain,
    featurizer: &dyn Featurizer,
    max_history: usize,
    augmentation_factor: usize,
    rng: &mut R,
) -> Result<DialogueTrainingData, PolicyError> {
    let mut data = training_data_from_stories(stories, domain, featurizer, max_history)?;
    if augmentation_factor == 0 {
        return Ok(data);
    }
    let glued = glue_stories(stories, augmentation_factor, rng);
    data.extend(training_data_from_stories(&glued, domain, featurizer, max_history)?);
    info!(
        stories = stories.len(),
        glued = glued.len(),
        examples = data.num_examples(),
        "Augmented training data"
    );
    Ok(data.shuffled(rng))
}
