use std::sync::Mutex;

use parley_core::{Button, Element};
use serde::Serialize;
use serde_json::Value;

/// Where bot messages go.
///
/// Only [`send_text_message`](Self::send_text_message) is required; richer
/// message kinds fall back to plain text unless a channel overrides them.
pub trait OutputChannel: Send + Sync {
    fn send_text_message(&self, recipient_id: &str, message: &str);

    /// Send text followed by a numbered list of buttons.
    fn send_text_with_buttons(&self, recipient_id: &str, message: &str, buttons: &[Button]) {
        self.send_text_message(recipient_id, message);
        for (i, button) in buttons.iter().enumerate() {
            self.send_text_message(
                recipient_id,
                &format!("{}: {} ({})", i + 1, button.title, button.payload),
            );
        }
    }

    fn send_image_url(&self, recipient_id: &str, image_url: &str) {
        self.send_text_message(recipient_id, &format!("Image: {image_url}"));
    }

    /// Send structured elements, one `title : subtitle` message each.
    fn send_custom_message(&self, recipient_id: &str, elements: &[Element]) {
        for element in elements {
            let text = format!(
                "{} : {}",
                element.title.as_deref().unwrap_or_default(),
                element.subtitle.as_deref().unwrap_or_default()
            );
            let buttons: Vec<Button> = element.buttons.iter().filter_map(button_from_value).collect();
            self.send_text_with_buttons(recipient_id, &text, &buttons);
        }
    }
}

fn button_from_value(value: &Value) -> Option<Button> {
    let title = value.get("title")?.as_str()?.to_string();
    let payload = value
        .get("payload")
        .or_else(|| value.get("url"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    Some(Button { title, payload })
}

/// A message captured by [`CollectingOutputChannel`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutgoingMessage {
    pub recipient_id: String,
    pub text: String,
}

/// Keeps every message in memory instead of sending it.
#[derive(Debug, Default)]
pub struct CollectingOutputChannel {
    messages: Mutex<Vec<OutgoingMessage>>,
}

impl CollectingOutputChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<OutgoingMessage> {
        self.messages.lock().map(|m| m.clone()).unwrap_or_default()
    }

    pub fn texts(&self) -> Vec<String> {
        self.messages().into_iter().map(|m| m.text).collect()
    }

    pub fn latest_output(&self) -> Option<OutgoingMessage> {
        self.messages.lock().ok().and_then(|m| m.last().cloned())
    }

    pub fn clear(&self) {
        if let Ok(mut messages) = self.messages.lock() {
            messages.clear();
        }
    }
}

impl OutputChannel for CollectingOutputChannel {
    fn send_text_message(&self, recipient_id: &str, message: &str) {
        if let Ok(mut messages) = self.messages.lock() {
            messages.push(OutgoingMessage {
                recipient_id: recipient_id.to_string(),
                text: message.to_string(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_buttons_fall_back_to_numbered_text() {
        let channel = CollectingOutputChannel::new();
        channel.send_text_with_buttons(
            "u1",
            "Pick one",
            &[
                Button {
                    title: "Yes".into(),
                    payload: "/affirm".into(),
                },
                Button {
                    title: "No".into(),
                    payload: "/deny".into(),
                },
            ],
        );
        assert_eq!(
            channel.texts(),
            vec!["Pick one", "1: Yes (/affirm)", "2: No (/deny)"]
        );
        assert_eq!(channel.messages()[0].recipient_id, "u1");
    }

    #[test]
    fn test_image_falls_back_to_text() {
        let channel = CollectingOutputChannel::new();
        channel.send_image_url("u1", "https://example.com/cat.png");
        assert_eq!(
            channel.latest_output().unwrap().text,
            "Image: https://example.com/cat.png"
        );
    }

    #[test]
    fn test_custom_message_renders_each_element() {
        let channel = CollectingOutputChannel::new();
        let element = Element {
            title: Some("Pizza".into()),
            item_url: None,
            image_url: None,
            subtitle: Some("Margherita".into()),
            buttons: vec![json!({"title": "Order", "payload": "/order"})],
        };
        let untitled = Element {
            title: None,
            item_url: None,
            image_url: None,
            subtitle: Some("Quattro formaggi".into()),
            buttons: Vec::new(),
        };
        channel.send_custom_message("u1", &[element, untitled]);
        assert_eq!(
            channel.texts(),
            vec!["Pizza : Margherita", "1: Order (/order)", " : Quattro formaggi"]
        );
        channel.clear();
        assert!(channel.messages().is_empty());
    }
}
