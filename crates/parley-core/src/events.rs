use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{Entity, ParseData};

fn default_predictable() -> bool {
    true
}

/// Everything that can happen in a conversation.
///
/// Events are appended to a [`DialogueStateTracker`](crate::tracker::DialogueStateTracker)
/// and never modified afterwards. Reverting events (`rewind`, `undo`,
/// `restart`) are appended like any other; their effect shows up in the
/// tracker's derived state.
///
/// The serialized form uses the `event` tag used by transcript dumps, e.g.
/// `{"event": "action", "name": "utter_greet"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum Event {
    /// The user sent a message, interpreted into `parse_data`.
    #[serde(rename = "user")]
    UserUttered { text: String, parse_data: ParseData },

    /// The bot ran an action. Unpredictable actions are not used as
    /// training targets.
    #[serde(rename = "action")]
    ActionExecuted {
        name: String,
        #[serde(default = "default_predictable")]
        predictable: bool,
    },

    #[serde(rename = "slot")]
    SlotSet { name: String, value: Value },

    /// Everything before this event is forgotten.
    #[serde(rename = "restart")]
    Restarted,

    /// Undo everything back to and including the latest user message.
    #[serde(rename = "rewind")]
    UserUtteranceReverted,

    /// Undo everything back to and including the latest action.
    #[serde(rename = "undo")]
    ActionReverted,

    #[serde(rename = "reset_slots")]
    AllSlotsReset,

    /// The conversation so far was written out as a story to `path`.
    #[serde(rename = "export")]
    StoryExported { path: String },
}

impl Event {
    pub fn user(parse_data: ParseData) -> Self {
        Event::UserUttered {
            text: parse_data.text.clone(),
            parse_data,
        }
    }

    pub fn action(name: impl Into<String>) -> Self {
        Event::ActionExecuted {
            name: name.into(),
            predictable: true,
        }
    }

    pub fn slot(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Event::SlotSet {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Return the event's serialized tag.
    pub fn event_name(&self) -> &'static str {
        match self {
            Event::UserUttered { .. } => "user",
            Event::ActionExecuted { .. } => "action",
            Event::SlotSet { .. } => "slot",
            Event::Restarted => "restart",
            Event::UserUtteranceReverted => "rewind",
            Event::ActionReverted => "undo",
            Event::AllSlotsReset => "reset_slots",
            Event::StoryExported { .. } => "export",
        }
    }

    pub fn intent_name(&self) -> Option<&str> {
        match self {
            Event::UserUttered { parse_data, .. } => parse_data.intent_name(),
            _ => None,
        }
    }

    pub fn confidence(&self) -> Option<f32> {
        match self {
            Event::UserUttered { parse_data, .. } => Some(parse_data.intent.confidence),
            _ => None,
        }
    }

    pub fn entities(&self) -> &[Entity] {
        match self {
            Event::UserUttered { parse_data, .. } => &parse_data.entities,
            _ => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Intent;
    use serde_json::json;

    fn greet() -> ParseData {
        ParseData {
            text: "/greet".into(),
            intent: Intent::new("greet", 1.0),
            intent_ranking: None,
            entities: vec![Entity::new("name", "Sam", 6, 21)],
        }
    }

    #[test]
    fn test_event_name() {
        assert_eq!(Event::action("utter_greet").event_name(), "action");
        assert_eq!(Event::Restarted.event_name(), "restart");
        assert_eq!(Event::UserUtteranceReverted.event_name(), "rewind");
    }

    #[test]
    fn test_user_event_accessors() {
        let event = Event::user(greet());
        assert_eq!(event.intent_name(), Some("greet"));
        assert_eq!(event.confidence(), Some(1.0));
        assert_eq!(event.entities().len(), 1);
        assert!(Event::Restarted.entities().is_empty());
    }

    #[test]
    fn test_event_serialization_uses_tag() {
        let json = serde_json::to_value(Event::slot("city", "Berlin")).unwrap();
        assert_eq!(json, json!({"event": "slot", "name": "city", "value": "Berlin"}));

        let json = serde_json::to_value(Event::Restarted).unwrap();
        assert_eq!(json, json!({"event": "restart"}));
    }

    #[test]
    fn test_action_predictable_defaults_to_true() {
        let event: Event =
            serde_json::from_value(json!({"event": "action", "name": "utter_greet"})).unwrap();
        assert_eq!(event, Event::action("utter_greet"));
    }

    #[test]
    fn test_unit_event_ignores_extra_fields() {
        let event: Event =
            serde_json::from_value(json!({"event": "restart", "timestamp": 1514764800.0}))
                .unwrap();
        assert_eq!(event, Event::Restarted);
    }
}
