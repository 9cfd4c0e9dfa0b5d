use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::Result;
use crate::events::Event;
use crate::slots::Slot;
use crate::story::{self, ACTION_LISTEN_NAME};
use crate::types::ParseData;

/// Snapshot of what the bot currently knows about a conversation.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackerState {
    pub latest_message: ParseData,
    pub latest_action_name: Option<String>,
    pub slots: BTreeMap<String, Value>,
}

impl TrackerState {
    fn initial(slots: &[Slot]) -> Self {
        Self {
            latest_message: ParseData::empty(""),
            latest_action_name: None,
            slots: slots
                .iter()
                .map(|s| (s.name.clone(), s.initial_value.clone()))
                .collect(),
        }
    }

    fn apply(&mut self, event: &Event, slots: &[Slot]) {
        match event {
            Event::UserUttered { parse_data, .. } => self.latest_message = parse_data.clone(),
            Event::ActionExecuted { name, .. } => self.latest_action_name = Some(name.clone()),
            Event::SlotSet { name, value } => {
                self.slots.insert(name.clone(), value.clone());
            }
            Event::AllSlotsReset => self.slots = Self::initial(slots).slots,
            _ => {}
        }
    }
}

/// Serialized conversation as stored by a tracker store or dumped for replay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptDump {
    pub sender_id: String,
    pub events: Vec<Event>,
}

impl TranscriptDump {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }
}

/// Per-sender event log plus the state derived from it.
#[derive(Debug, Clone)]
pub struct DialogueStateTracker {
    sender_id: String,
    slots: Vec<Slot>,
    events: Vec<Event>,
    state: TrackerState,
}

impl DialogueStateTracker {
    pub fn new(sender_id: impl Into<String>, slots: Vec<Slot>) -> Self {
        let state = TrackerState::initial(&slots);
        Self {
            sender_id: sender_id.into(),
            slots,
            events: Vec::new(),
            state,
        }
    }

    /// Rebuild a tracker from a dump, replaying every event.
    pub fn from_dump(dump: TranscriptDump, slots: Vec<Slot>) -> Self {
        let mut tracker = Self::new(dump.sender_id, slots);
        for event in dump.events {
            tracker.update(event);
        }
        tracker
    }

    pub fn sender_id(&self) -> &str {
        &self.sender_id
    }

    /// Every event ever appended, including reverted ones.
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn state(&self) -> &TrackerState {
        &self.state
    }

    pub fn latest_message(&self) -> &ParseData {
        &self.state.latest_message
    }

    pub fn latest_action_name(&self) -> Option<&str> {
        self.state.latest_action_name.as_deref()
    }

    pub fn slot_value(&self, name: &str) -> Option<&Value> {
        self.state.slots.get(name)
    }

    /// Slots that currently hold a value.
    pub fn current_slot_values(&self) -> BTreeMap<String, Value> {
        self.state
            .slots
            .iter()
            .filter(|(_, v)| !v.is_null())
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Append an event and update the derived state.
    pub fn update(&mut self, event: Event) {
        let rebuild = matches!(
            event,
            Event::Restarted | Event::UserUtteranceReverted | Event::ActionReverted
        );
        if !rebuild {
            self.state.apply(&event, &self.slots);
        }
        self.events.push(event);
        if rebuild {
            self.state = self.replay(&self.applied_events());
        }
    }

    /// Events that are still in effect once restarts and reverts have been
    /// taken into account.
    pub fn applied_events(&self) -> Vec<Event> {
        let mut applied: Vec<Event> = Vec::new();
        for event in &self.events {
            match event {
                Event::Restarted => applied.clear(),
                Event::UserUtteranceReverted => {
                    undo_till_previous(&mut applied, |e| matches!(e, Event::UserUttered { .. }))
                }
                Event::ActionReverted => {
                    undo_till_previous(&mut applied, |e| matches!(e, Event::ActionExecuted { .. }))
                }
                other => applied.push(other.clone()),
            }
        }
        applied
    }

    /// Events appended after the most recent restart.
    pub fn events_after_latest_restart(&self) -> &[Event] {
        match self.events.iter().rposition(|e| matches!(e, Event::Restarted)) {
            Some(i) => &self.events[i + 1..],
            None => &self.events,
        }
    }

    /// The state before every executed action, followed by the current state.
    ///
    /// These are the states a policy was asked to predict from.
    pub fn prior_states(&self) -> Vec<TrackerState> {
        let mut states = Vec::new();
        let mut state = TrackerState::initial(&self.slots);
        for event in self.applied_events() {
            if matches!(event, Event::ActionExecuted { .. }) {
                states.push(state.clone());
            }
            state.apply(&event, &self.slots);
        }
        states.push(state);
        states
    }

    /// Actions executed since the latest user message, oldest first.
    pub fn actions_since_last_utterance(&self) -> Vec<String> {
        let mut actions = Vec::new();
        for event in self.applied_events().iter().rev() {
            match event {
                Event::UserUttered { .. } => break,
                Event::ActionExecuted { name, .. } => actions.push(name.clone()),
                _ => {}
            }
        }
        actions.reverse();
        actions
    }

    pub fn latest_action_was_listen(&self) -> bool {
        self.latest_action_name() == Some(ACTION_LISTEN_NAME)
    }

    /// Render the applied events as a markdown story.
    pub fn export_stories(&self) -> String {
        let name = format!("Generated Story {}", Uuid::new_v4().simple());
        story::story_string(&name, &self.applied_events())
    }

    /// Append this conversation's story to `path`.
    pub fn export_stories_to_file(&self, path: &Path) -> Result<()> {
        story::append_story(path, &self.export_stories())
    }

    pub fn as_dump(&self) -> TranscriptDump {
        TranscriptDump {
            sender_id: self.sender_id.clone(),
            events: self.events.clone(),
        }
    }

    fn replay(&self, events: &[Event]) -> TrackerState {
        let mut state = TrackerState::initial(&self.slots);
        for event in events {
            state.apply(event, &self.slots);
        }
        state
    }
}

fn undo_till_previous(applied: &mut Vec<Event>, is_target: impl Fn(&Event) -> bool) {
    while let Some(event) = applied.pop() {
        if is_target(&event) {
            break;
        }
    }
}
