use serde::{Deserialize, Serialize};
use serde_json::Value;

fn default_confidence() -> f32 {
    1.0
}

/// The intent an interpreter assigned to a user message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Intent {
    pub name: Option<String>,
    #[serde(default = "default_confidence")]
    pub confidence: f32,
}

impl Intent {
    pub fn new(name: impl Into<String>, confidence: f32) -> Self {
        Self {
            name: Some(name.into()),
            confidence,
        }
    }

    /// The intent of a message nothing could be extracted from.
    pub fn unknown() -> Self {
        Self {
            name: None,
            confidence: 0.0,
        }
    }
}

/// One candidate intent in a ranked parse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedIntent {
    pub name: String,
    #[serde(default)]
    pub confidence: f32,
}

/// An entity extracted from a user message, with its character span.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub entity: String,
    pub value: Value,
    #[serde(default)]
    pub start: usize,
    #[serde(default)]
    pub end: usize,
}

impl Entity {
    pub fn new(entity: impl Into<String>, value: impl Into<Value>, start: usize, end: usize) -> Self {
        Self {
            entity: entity.into(),
            value: value.into(),
            start,
            end,
        }
    }
}

/// Structured interpretation of one user message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParseData {
    pub text: String,
    pub intent: Intent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intent_ranking: Option<Vec<RankedIntent>>,
    #[serde(default)]
    pub entities: Vec<Entity>,
}

impl ParseData {
    /// The zero-confidence parse returned when interpretation fails.
    pub fn empty(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            intent: Intent::unknown(),
            intent_ranking: None,
            entities: Vec::new(),
        }
    }

    pub fn intent_name(&self) -> Option<&str> {
        self.intent.name.as_deref()
    }
}

/// A button attached to a bot message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Button {
    pub title: String,
    pub payload: String,
}

/// A structured card (e.g. a carousel item) in a bot message.
///
/// Only the keys below survive deserialization; anything else a template
/// carries is dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Element {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub buttons: Vec<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_intent_confidence_defaults_to_one() {
        let intent: Intent = serde_json::from_value(json!({"name": "greet"})).unwrap();
        assert_eq!(intent.confidence, 1.0);
    }

    #[test]
    fn test_parse_data_from_nlu_json() {
        let data: ParseData = serde_json::from_value(json!({
            "text": "hi",
            "intent": {"name": "greet", "confidence": 0.8},
            "intent_ranking": [
                {"name": "greet", "confidence": 0.8},
                {"name": "goodbye", "confidence": 0.2}
            ],
            "entities": [{"entity": "name", "value": "Sam", "start": 0, "end": 3}]
        }))
        .unwrap();
        assert_eq!(data.intent_name(), Some("greet"));
        assert_eq!(data.intent_ranking.as_ref().map(Vec::len), Some(2));
        assert_eq!(data.entities[0].value, json!("Sam"));
    }

    #[test]
    fn test_element_drops_unknown_keys() {
        let element: Element = serde_json::from_value(json!({
            "title": "Pizza",
            "subtitle": "Margherita",
            "price": 9.5,
            "buttons": [{"type": "postback", "title": "Order", "payload": "/order"}]
        }))
        .unwrap();
        let back = serde_json::to_value(&element).unwrap();
        assert_eq!(
            back,
            json!({
                "title": "Pizza",
                "subtitle": "Margherita",
                "buttons": [{"type": "postback", "title": "Order", "payload": "/order"}]
            })
        );
    }

    #[test]
    fn test_element_without_title() {
        let element: Element =
            serde_json::from_value(json!({"image_url": "https://example.com/pizza.png"})).unwrap();
        assert_eq!(element.title, None);
        assert_eq!(
            serde_json::to_value(&element).unwrap(),
            json!({"image_url": "https://example.com/pizza.png"})
        );
    }

    #[test]
    fn test_empty_parse_has_zero_confidence() {
        let data = ParseData::empty("???");
        assert_eq!(data.intent_name(), None);
        assert_eq!(data.intent.confidence, 0.0);
        assert!(data.entities.is_empty());
    }
}
