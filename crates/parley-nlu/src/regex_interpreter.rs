//! Deterministic parser for structured messages.
//!
//! Recognizes `/intent{"entity": "value"}` (the leading `/` or `_` is
//! optional) and the older `intent[entity=value,entity2=value2]` form. The
//! older form is used whenever a `[` appears before any `{`.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use tracing::warn;

use parley_core::{Entity, Intent, ParseData, RankedIntent};

use crate::interpreter::Interpreter;

// =============================================================================
// Compiled regexes
// =============================================================================

static STRUCTURED_MESSAGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[/_]?([^{]+)(\{.+)?").expect("Invalid message regex"));

static DEPRECATED_MESSAGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[/_]?([^\[]+)(\[(.+)\])?").expect("Invalid deprecated message regex")
});

static VALUE_ASSIGNMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*(.+)\s*=\s*(.+)\s*").expect("Invalid assignment regex"));

/// Character offset of byte position `byte` in `text`.
fn char_offset(text: &str, byte: usize) -> usize {
    text[..byte].chars().count()
}

/// Parser for messages that spell out their intent and entities.
#[derive(Debug, Clone, Copy, Default)]
pub struct RegexInterpreter;

impl RegexInterpreter {
    pub fn new() -> Self {
        Self
    }

    /// Whether `text` uses the `intent[entity=value]` form.
    pub fn is_using_deprecated_format(text: &str) -> bool {
        match (text.find('['), text.find('{')) {
            (Some(bracket), Some(brace)) => bracket < brace,
            (Some(_), None) => true,
            _ => false,
        }
    }

    /// Parse without going through the async interface.
    pub fn parse_text(&self, text: &str) -> ParseData {
        let extracted = if Self::is_using_deprecated_format(text) {
            extract_deprecated(text)
        } else {
            extract(text)
        };

        let Some((name, entities)) = extracted else {
            warn!(text = %text, "Failed to parse intent and entities from message");
            return ParseData::empty(text);
        };

        ParseData {
            text: text.to_string(),
            intent_ranking: Some(vec![RankedIntent {
                name: name.clone(),
                confidence: 1.0,
            }]),
            intent: Intent::new(name, 1.0),
            entities,
        }
    }
}

impl Interpreter for RegexInterpreter {
    async fn parse(&self, text: &str) -> ParseData {
        self.parse_text(text)
    }
}

fn extract(text: &str) -> Option<(String, Vec<Entity>)> {
    let caps = STRUCTURED_MESSAGE.captures(text)?;
    let name = caps.get(1)?.as_str().trim().to_string();
    let entities = match caps.get(2) {
        Some(params) => parse_parameters(
            params.as_str(),
            char_offset(text, params.start()),
            char_offset(text, params.end()),
            text,
        ),
        None => Vec::new(),
    };
    Some((name, entities))
}

fn parse_parameters(params: &str, start: usize, end: usize, text: &str) -> Vec<Entity> {
    if params.trim().is_empty() {
        return Vec::new();
    }
    match serde_json::from_str::<Value>(params) {
        Ok(Value::Object(map)) => {
            let mut entities = Vec::new();
            for (key, value) in map {
                let values = match value {
                    Value::Array(items) => items,
                    other => vec![other],
                };
                for value in values {
                    entities.push(Entity::new(key.clone(), value, start, end));
                }
            }
            entities
        }
        Ok(_) => {
            warn!(
                text = %text,
                "Invalid arguments in message. Parameters must be a json object"
            );
            Vec::new()
        }
        Err(e) => {
            warn!(
                text = %text,
                error = %e,
                "Invalid arguments in message. Failed to decode parameters as a json object"
            );
            Vec::new()
        }
    }
}

fn extract_deprecated(text: &str) -> Option<(String, Vec<Entity>)> {
    let caps = DEPRECATED_MESSAGE.captures(text)?;
    let name = caps.get(1)?.as_str().trim().to_lowercase();
    let mut entities = Vec::new();

    if let Some(assignments) = caps.get(3) {
        let mut piece_start = assignments.start();
        for piece in assignments.as_str().split(',') {
            if let Some(m) = VALUE_ASSIGNMENT.captures(piece) {
                if let (Some(key), Some(value), Some(whole)) = (m.get(1), m.get(2), m.get(0)) {
                    entities.push(Entity::new(
                        key.as_str().trim(),
                        value.as_str().trim(),
                        char_offset(text, piece_start + value.start()),
                        char_offset(text, piece_start + whole.end()),
                    ));
                }
            }
            piece_start += piece.len() + 1;
        }
    }
    Some((name, entities))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(text: &str) -> ParseData {
        RegexInterpreter::new().parse_text(text)
    }

    #[test]
    fn test_intent_with_json_entities() {
        let data = parse(r#"/greet{"name":"Sam"}"#);
        assert_eq!(data.intent_name(), Some("greet"));
        assert_eq!(data.intent.confidence, 1.0);
        assert_eq!(data.entities.len(), 1);
        assert_eq!(data.entities[0].entity, "name");
        assert_eq!(data.entities[0].value, json!("Sam"));
        assert_eq!((data.entities[0].start, data.entities[0].end), (6, 20));
        assert_eq!(
            data.intent_ranking,
            Some(vec![RankedIntent {
                name: "greet".into(),
                confidence: 1.0
            }])
        );
    }

    #[test]
    fn test_intent_without_prefix_or_entities() {
        let data = parse("greet");
        assert_eq!(data.intent_name(), Some("greet"));
        assert!(data.entities.is_empty());

        let data = parse("_affirm ");
        assert_eq!(data.intent_name(), Some("affirm"));
    }

    #[test]
    fn test_list_values_expand_with_shared_span() {
        let data = parse(r#"/order{"topping": ["ham", "olives"], "size": 2}"#);
        assert_eq!(data.entities.len(), 3);
        let toppings: Vec<&Value> = data
            .entities
            .iter()
            .filter(|e| e.entity == "topping")
            .map(|e| &e.value)
            .collect();
        assert_eq!(toppings, vec![&json!("ham"), &json!("olives")]);
        assert!(data
            .entities
            .iter()
            .all(|e| e.start == data.entities[0].start && e.end == data.entities[0].end));
    }

    #[test]
    fn test_malformed_payload_keeps_intent() {
        let data = parse("/greet{bad json");
        assert_eq!(data.intent_name(), Some("greet"));
        assert!(data.entities.is_empty());
    }

    #[test]
    fn test_non_object_payload_is_ignored() {
        let data = parse("/greet{\"a\"}");
        assert_eq!(data.intent_name(), Some("greet"));
        assert!(data.entities.is_empty());
    }

    #[test]
    fn test_deprecated_syntax() {
        let data = parse("greet[name=Sam]");
        assert_eq!(data.intent_name(), Some("greet"));
        assert_eq!(data.entities.len(), 1);
        assert_eq!(data.entities[0].entity, "name");
        assert_eq!(data.entities[0].value, json!("Sam"));
        assert_eq!((data.entities[0].start, data.entities[0].end), (11, 14));
    }

    #[test]
    fn test_deprecated_syntax_multiple_and_lowercased() {
        let data = parse("_Inform[cuisine=thai, people = 4]");
        assert_eq!(data.intent_name(), Some("inform"));
        let pairs: Vec<(&str, &Value)> = data
            .entities
            .iter()
            .map(|e| (e.entity.as_str(), &e.value))
            .collect();
        assert_eq!(
            pairs,
            vec![("cuisine", &json!("thai")), ("people", &json!("4"))]
        );
    }

    #[test]
    fn test_bracket_before_brace_selects_deprecated_syntax() {
        assert!(RegexInterpreter::is_using_deprecated_format("a[b=c]{\"d\": 1}"));
        assert!(!RegexInterpreter::is_using_deprecated_format("a{\"d\": \"[x]\"}"));
        assert!(!RegexInterpreter::is_using_deprecated_format("a{\"d\": 1}"));
        assert!(RegexInterpreter::is_using_deprecated_format("a[b=c]"));

        let data = parse(r#"/inform{"tags": ["[x]"]}"#);
        assert_eq!(data.intent_name(), Some("inform"));
        assert_eq!(data.entities[0].value, json!("[x]"));
    }

    #[test]
    fn test_unmatched_input() {
        let data = parse(r#"{"name": "Sam"}"#);
        assert_eq!(data.intent_name(), None);
        assert_eq!(data.intent.confidence, 0.0);
        assert!(data.entities.is_empty());

        let data = parse("");
        assert_eq!(data.intent_name(), None);
    }

    #[test]
    fn test_spans_count_characters() {
        let data = parse(r#"/grüß{"name":"Sam"}"#);
        assert_eq!(data.intent_name(), Some("grüß"));
        assert_eq!(data.entities[0].start, 5);
    }

    #[tokio::test]
    async fn test_async_parse_matches_sync() {
        let interpreter = RegexInterpreter::new();
        let text = r#"/greet{"name":"Sam"}"#;
        assert_eq!(interpreter.parse(text).await, interpreter.parse_text(text));
    }
}
