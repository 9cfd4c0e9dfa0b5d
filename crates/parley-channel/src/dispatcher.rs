use std::collections::BTreeMap;
use std::sync::LazyLock;

use parley_core::{Button, Domain, Element, TemplateVariant};
use regex::{Captures, Regex};
use serde_json::{json, Value};
use tracing::warn;

use crate::channel::OutputChannel;

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("Invalid placeholder regex"));

/// Values available to `{placeholder}`s in template text.
pub type TemplateVars = BTreeMap<String, Value>;

/// One entry of the dispatcher's outbound log.
#[derive(Debug, Clone, PartialEq)]
pub struct BotMessage {
    pub text: Option<String>,
    pub data: Option<Value>,
}

/// Sends the output of actions for one sender to an output channel.
pub struct Dispatcher<'a> {
    sender_id: String,
    output_channel: &'a dyn OutputChannel,
    domain: &'a Domain,
    /// Text parts actually sent, after splitting on blank lines.
    pub send_messages: Vec<String>,
    /// Everything uttered, in order.
    pub latest_bot_messages: Vec<BotMessage>,
}

impl<'a> Dispatcher<'a> {
    pub fn new(
        sender_id: impl Into<String>,
        output_channel: &'a dyn OutputChannel,
        domain: &'a Domain,
    ) -> Self {
        Self {
            sender_id: sender_id.into(),
            output_channel,
            domain,
            send_messages: Vec::new(),
            latest_bot_messages: Vec::new(),
        }
    }

    pub fn sender_id(&self) -> &str {
        &self.sender_id
    }

    /// Send a message, choosing elements over buttons over plain text.
    /// An image is always sent as an extra attachment.
    pub fn utter_response(&mut self, message: TemplateVariant) {
        if !message.elements.is_empty() {
            self.utter_custom_message(message.elements);
        } else if !message.buttons.is_empty() {
            self.utter_button_message(&message.text, message.buttons);
        } else {
            self.utter_message(&message.text);
        }
        if let Some(image) = message.image {
            self.utter_attachment(&image);
        }
    }

    /// Send text, one channel message per blank-line separated part.
    pub fn utter_message(&mut self, text: &str) {
        self.latest_bot_messages.push(BotMessage {
            text: Some(text.to_string()),
            data: None,
        });
        for part in text.split("\n\n") {
            self.output_channel.send_text_message(&self.sender_id, part);
            self.send_messages.push(part.to_string());
        }
    }

    pub fn utter_custom_message(&mut self, elements: Vec<Element>) {
        self.latest_bot_messages.push(BotMessage {
            text: None,
            data: Some(json!({ "elements": elements })),
        });
        self.output_channel
            .send_custom_message(&self.sender_id, &elements);
    }

    pub fn utter_button_message(&mut self, text: &str, buttons: Vec<Button>) {
        self.latest_bot_messages.push(BotMessage {
            text: Some(text.to_string()),
            data: Some(json!({ "buttons": buttons })),
        });
        self.output_channel
            .send_text_with_buttons(&self.sender_id, text, &buttons);
    }

    pub fn utter_attachment(&mut self, attachment: &str) {
        self.latest_bot_messages.push(BotMessage {
            text: None,
            data: Some(json!({ "attachment": attachment })),
        });
        self.output_channel.send_image_url(&self.sender_id, attachment);
    }

    /// Send a filled copy of a random variant of `template`.
    pub fn utter_template(&mut self, template: &str, filled_slots: &TemplateVars, kwargs: &TemplateVars) {
        let message = self.retrieve_template(template, filled_slots, kwargs);
        self.utter_response(message);
    }

    /// Like [`utter_template`](Self::utter_template), with extra buttons
    /// appended to the template's own.
    pub fn utter_button_template(
        &mut self,
        template: &str,
        buttons: Vec<Button>,
        filled_slots: &TemplateVars,
        kwargs: &TemplateVars,
    ) {
        let mut message = self.retrieve_template(template, filled_slots, kwargs);
        message.buttons.extend(buttons);
        self.utter_response(message);
    }

    /// Pick a random variant of `template` and fill its text.
    ///
    /// Slot values are used first and `kwargs` override them. Unknown
    /// templates produce a placeholder message instead of an error.
    pub fn retrieve_template(
        &self,
        template: &str,
        filled_slots: &TemplateVars,
        kwargs: &TemplateVars,
    ) -> TemplateVariant {
        match self.domain.random_template_for(template, &mut rand::rng()) {
            Some(mut variant) => {
                let mut vars = filled_slots.clone();
                vars.extend(kwargs.iter().map(|(k, v)| (k.clone(), v.clone())));
                variant.text = fill_template_text(template, &variant.text, &vars);
                variant
            }
            None => TemplateVariant::text(format!("Undefined utter template <{template}>.")),
        }
    }
}

/// Replace every `{name}` in `text`. If any placeholder has no value the
/// text is returned unchanged.
pub fn fill_template_text(template: &str, text: &str, vars: &TemplateVars) -> String {
    let missing: Vec<&str> = PLACEHOLDER
        .captures_iter(text)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str())
        .filter(|name| !matches!(vars.get(*name), Some(v) if !v.is_null()))
        .collect();
    if let Some(name) = missing.first() {
        warn!(
            template = %template,
            placeholder = %name,
            "Failed to fill utterance template. There is no slot with this name nor was \
             the value passed explicitly. Returning the template without filling it."
        );
        return text.to_string();
    }

    PLACEHOLDER
        .replace_all(text, |caps: &Captures| match vars.get(&caps[1]) {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => caps[0].to_string(),
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::CollectingOutputChannel;

    const DOMAIN: &str = r#"
slots:
  name:
    type: text
templates:
  utter_greet:
    - "Hello {name}"
  utter_menu:
    - text: "What would you like?"
      buttons:
        - title: "Pizza"
          payload: "/order{\"dish\": \"pizza\"}"
  utter_cat:
    - text: "Here is a cat\n\nEnjoy"
      image: "https://example.com/cat.png"
  utter_cards:
    - text: "unused"
      elements:
        - title: "Pizza"
          subtitle: "Margherita"
          price: 9
"#;

    fn vars(pairs: &[(&str, &str)]) -> TemplateVars {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
            .collect()
    }

    #[test]
    fn test_fill_from_slots() {
        let filled = fill_template_text("utter_greet", "Hello {name}", &vars(&[("name", "Sam")]));
        assert_eq!(filled, "Hello Sam");
    }

    #[test]
    fn test_kwargs_override_slots() {
        let domain = Domain::from_yaml(DOMAIN).unwrap();
        let channel = CollectingOutputChannel::new();
        let dispatcher = Dispatcher::new("u1", &channel, &domain);
        let variant = dispatcher.retrieve_template(
            "utter_greet",
            &vars(&[("name", "Sam")]),
            &vars(&[("name", "Alex")]),
        );
        assert_eq!(variant.text, "Hello Alex");
    }

    #[test]
    fn test_missing_placeholder_leaves_text_unfilled() {
        assert_eq!(
            fill_template_text("utter_greet", "Hello {name}", &TemplateVars::new()),
            "Hello {name}"
        );
        let mut unset = TemplateVars::new();
        unset.insert("name".into(), Value::Null);
        assert_eq!(
            fill_template_text("utter_greet", "Hello {name}", &unset),
            "Hello {name}"
        );
        // One missing name keeps the other placeholders unfilled too.
        assert_eq!(
            fill_template_text("t", "{a} and {b}", &vars(&[("a", "x")])),
            "{a} and {b}"
        );
    }

    #[test]
    fn test_non_string_values_are_rendered() {
        let mut v = TemplateVars::new();
        v.insert("people".into(), serde_json::json!(4));
        assert_eq!(fill_template_text("t", "Table for {people}", &v), "Table for 4");
    }

    #[test]
    fn test_unknown_template() {
        let domain = Domain::from_yaml(DOMAIN).unwrap();
        let channel = CollectingOutputChannel::new();
        let mut dispatcher = Dispatcher::new("u1", &channel, &domain);
        dispatcher.utter_template("utter_nope", &TemplateVars::new(), &TemplateVars::new());
        assert_eq!(channel.texts(), vec!["Undefined utter template <utter_nope>."]);
    }

    #[test]
    fn test_template_variants_are_not_mutated() {
        let domain = Domain::from_yaml(DOMAIN).unwrap();
        let channel = CollectingOutputChannel::new();
        let mut dispatcher = Dispatcher::new("u1", &channel, &domain);
        dispatcher.utter_template("utter_greet", &vars(&[("name", "Sam")]), &TemplateVars::new());
        dispatcher.utter_template("utter_greet", &vars(&[("name", "Alex")]), &TemplateVars::new());
        assert_eq!(channel.texts(), vec!["Hello Sam", "Hello Alex"]);
    }

    #[test]
    fn test_text_is_split_on_blank_lines_and_image_attached() {
        let domain = Domain::from_yaml(DOMAIN).unwrap();
        let channel = CollectingOutputChannel::new();
        let mut dispatcher = Dispatcher::new("u1", &channel, &domain);
        dispatcher.utter_template("utter_cat", &TemplateVars::new(), &TemplateVars::new());
        assert_eq!(
            channel.texts(),
            vec!["Here is a cat", "Enjoy", "Image: https://example.com/cat.png"]
        );
        assert_eq!(dispatcher.send_messages, vec!["Here is a cat", "Enjoy"]);
        assert_eq!(
            dispatcher.latest_bot_messages,
            vec![
                BotMessage {
                    text: Some("Here is a cat\n\nEnjoy".into()),
                    data: None
                },
                BotMessage {
                    text: None,
                    data: Some(json!({"attachment": "https://example.com/cat.png"}))
                },
            ]
        );
    }

    #[test]
    fn test_elements_win_over_buttons_and_text() {
        let domain = Domain::from_yaml(DOMAIN).unwrap();
        let channel = CollectingOutputChannel::new();
        let mut dispatcher = Dispatcher::new("u1", &channel, &domain);
        dispatcher.utter_template("utter_cards", &TemplateVars::new(), &TemplateVars::new());
        assert_eq!(channel.texts(), vec!["Pizza : Margherita"]);
        assert_eq!(
            dispatcher.latest_bot_messages[0].data,
            Some(json!({"elements": [{"title": "Pizza", "subtitle": "Margherita"}]}))
        );
    }

    #[test]
    fn test_button_template_extends_buttons() {
        let domain = Domain::from_yaml(DOMAIN).unwrap();
        let channel = CollectingOutputChannel::new();
        let mut dispatcher = Dispatcher::new("u1", &channel, &domain);
        dispatcher.utter_button_template(
            "utter_menu",
            vec![Button {
                title: "Pasta".into(),
                payload: "/order{\"dish\": \"pasta\"}".into(),
            }],
            &TemplateVars::new(),
            &TemplateVars::new(),
        );
        assert_eq!(
            channel.texts(),
            vec![
                "What would you like?",
                "1: Pizza (/order{\"dish\": \"pizza\"})",
                "2: Pasta (/order{\"dish\": \"pasta\"})",
            ]
        );
        let data = dispatcher.latest_bot_messages[0].data.as_ref().unwrap();
        assert_eq!(data["buttons"].as_array().unwrap().len(), 2);
    }
}
