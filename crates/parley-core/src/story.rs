//! Markdown story rendering.
//!
//! Stories are the human-readable training format:
//!
//! ```text
//! ## Generated Story 3f1c...
//! * greet{"name": "Sam"}
//!     - utter_greet
//!     - slot{"name": "Sam"}
//! ```

use std::fmt::Write as _;
use std::fs::OpenOptions;
use std::io::Write as _;
use std::path::Path;

use serde_json::{Map, Value};

use crate::error::Result;
use crate::events::Event;
use crate::types::Entity;

pub const ACTION_LISTEN_NAME: &str = "action_listen";

/// Render `events` as one flat story named `name`.
///
/// Listen actions are implied by user turns and therefore omitted.
pub fn story_string(name: &str, events: &[Event]) -> String {
    let mut out = format!("## {name}\n");
    for event in events {
        match event {
            Event::UserUttered { parse_data, .. } => {
                let intent = parse_data.intent_name().unwrap_or("None");
                let _ = writeln!(out, "* {}{}", intent, entities_literal(&parse_data.entities));
            }
            Event::ActionExecuted { name, .. } if name != ACTION_LISTEN_NAME => {
                let _ = writeln!(out, "    - {name}");
            }
            Event::SlotSet { name, value } => {
                let mut map = Map::new();
                map.insert(name.clone(), value.clone());
                let _ = writeln!(out, "    - slot{}", Value::Object(map));
            }
            Event::Restarted => {
                let _ = writeln!(out, "    - restart");
            }
            _ => {}
        }
    }
    out
}

/// Append `story` to the file at `path`, creating it if needed.
pub fn append_story(path: &Path, story: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{story}")?;
    Ok(())
}

fn entities_literal(entities: &[Entity]) -> String {
    if entities.is_empty() {
        return String::new();
    }
    let mut map = Map::new();
    for entity in entities {
        map.insert(entity.entity.clone(), entity.value.clone());
    }
    Value::Object(map).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Intent, ParseData};

    fn user(intent: &str, entities: Vec<Entity>) -> Event {
        Event::user(ParseData {
            text: format!("/{intent}"),
            intent: Intent::new(intent, 1.0),
            intent_ranking: None,
            entities,
        })
    }

    #[test]
    fn test_story_string_omits_listen() {
        let events = vec![
            Event::action(ACTION_LISTEN_NAME),
            user("greet", vec![Entity::new("name", "Sam", 6, 21)]),
            Event::slot("name", "Sam"),
            Event::action("utter_greet"),
            Event::action(ACTION_LISTEN_NAME),
        ];
        let story = story_string("Generated Story 1", &events);
        assert_eq!(
            story,
            "## Generated Story 1\n\
             * greet{\"name\":\"Sam\"}\n    \
             - slot{\"name\":\"Sam\"}\n    \
             - utter_greet\n"
        );
    }

    #[test]
    fn test_append_story_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stories.md");
        append_story(&path, "## a\n").unwrap();
        append_story(&path, "## b\n").unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "## a\n\n## b\n\n");
    }
}
