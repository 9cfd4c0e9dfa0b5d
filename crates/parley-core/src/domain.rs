use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;
use std::sync::OnceLock;

use ndarray::{Array1, Array2};
use rand::seq::IndexedRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::error::{DuplicateGroup, ParleyError, Result};
use crate::events::Event;
use crate::features::{self, ActiveFeatures, FeatureIndex, Featurizer};
use crate::slots::{Slot, SlotType};
use crate::story::ACTION_LISTEN_NAME;
use crate::tracker::{DialogueStateTracker, TrackerState};
use crate::types::{Button, Element, Entity};

pub const ACTION_RESTART_NAME: &str = "action_restart";
pub const UTTER_PREFIX: &str = "utter_";
/// File name of the feature snapshot written next to a trained policy.
pub const SPECIFICATION_FILE: &str = "domain.json";

/// Read access to the vocabulary a policy acts in.
pub trait DomainModel {
    fn intents(&self) -> &[String];
    fn entities(&self) -> &[String];
    /// Slots sorted by name.
    fn slots(&self) -> &[Slot];
    /// Built-in actions first, then the domain's own.
    fn actions(&self) -> &[Action];
    fn templates(&self) -> &BTreeMap<String, Vec<TemplateVariant>>;
}

/// Something the bot can do, resolved once when the domain is loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Wait for the next user message.
    Listen,
    /// Reset the conversation.
    Restart,
    /// Send the template of the same name.
    Utter(String),
    /// Run a handler registered under `identifier`; `name` is what stories use.
    Custom { identifier: String, name: String },
}

impl Action {
    pub fn name(&self) -> &str {
        match self {
            Action::Listen => ACTION_LISTEN_NAME,
            Action::Restart => ACTION_RESTART_NAME,
            Action::Utter(name) => name,
            Action::Custom { name, .. } => name,
        }
    }
}

/// One variant of a response template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateVariant {
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub buttons: Vec<Button>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub elements: Vec<Element>,
}

impl TemplateVariant {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            buttons: Vec::new(),
            image: None,
            elements: Vec::new(),
        }
    }
}

/// Domain-level options from the `config` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DomainSettings {
    /// Turn entities into slot events when a slot of the same name exists.
    pub store_entities_as_slots: bool,
    /// Intent that triggers a conversation restart.
    pub restart_intent: String,
}

impl Default for DomainSettings {
    fn default() -> Self {
        Self {
            store_entities_as_slots: true,
            restart_intent: "restart".to_string(),
        }
    }
}

// ============================================================================
// Domain file schema
// ============================================================================

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct DomainFile {
    #[serde(default)]
    config: DomainSettings,
    #[serde(default)]
    intents: Vec<String>,
    #[serde(default)]
    entities: Vec<String>,
    #[serde(default)]
    slots: BTreeMap<String, SlotSpec>,
    #[serde(default)]
    templates: BTreeMap<String, Vec<TemplateEntry>>,
    #[serde(default)]
    topics: Vec<String>,
    #[serde(default)]
    actions: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    action_names: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    action_factory: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct SlotSpec {
    #[serde(rename = "type")]
    slot_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    initial_value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    values: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    min_value: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    max_value: Option<f32>,
}

impl SlotSpec {
    fn resolve(self, name: &str) -> Result<Slot> {
        let slot_type = match self.slot_type.as_str() {
            "text" => SlotType::Text,
            "bool" => SlotType::Bool,
            "list" => SlotType::List,
            "float" => {
                let min_value = self.min_value.unwrap_or(0.0);
                let max_value = self.max_value.unwrap_or(1.0);
                if min_value > max_value {
                    return Err(ParleyError::Schema(format!(
                        "slot '{name}': min_value {min_value} is greater than max_value {max_value}"
                    )));
                }
                SlotType::Float {
                    min_value,
                    max_value,
                }
            }
            "categorical" => {
                let values = self.values.unwrap_or_default();
                if values.is_empty() {
                    return Err(ParleyError::Schema(format!(
                        "categorical slot '{name}' needs a non-empty 'values' list"
                    )));
                }
                SlotType::Categorical {
                    values: values
                        .into_iter()
                        .map(|v| match v {
                            Value::String(s) => s.to_lowercase(),
                            other => other.to_string().to_lowercase(),
                        })
                        .collect(),
                }
            }
            other => {
                return Err(ParleyError::Schema(format!(
                    "slot '{name}' has unsupported type '{other}'. \
                     Supported types are: text, bool, float, list, categorical"
                )))
            }
        };
        Ok(Slot {
            name: name.to_string(),
            slot_type,
            initial_value: self.initial_value.unwrap_or(Value::Null),
        })
    }

    fn from_slot(slot: &Slot) -> Self {
        let mut spec = SlotSpec {
            slot_type: slot.slot_type.type_name().to_string(),
            initial_value: (!slot.initial_value.is_null()).then(|| slot.initial_value.clone()),
            values: None,
            min_value: None,
            max_value: None,
        };
        match &slot.slot_type {
            SlotType::Float {
                min_value,
                max_value,
            } => {
                spec.min_value = Some(*min_value);
                spec.max_value = Some(*max_value);
            }
            SlotType::Categorical { values } => {
                spec.values = Some(values.iter().cloned().map(Value::String).collect());
            }
            _ => {}
        }
        spec
    }
}

/// A template variant is either a bare string or a mapping with `text`.
#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum TemplateEntry {
    Text(String),
    Full(RawVariant),
}

#[derive(Debug, Serialize, Deserialize)]
struct RawVariant {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    buttons: Vec<Button>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    image: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    elements: Vec<Element>,
}

fn collect_templates(
    raw: BTreeMap<String, Vec<TemplateEntry>>,
) -> Result<BTreeMap<String, Vec<TemplateVariant>>> {
    let mut templates = BTreeMap::new();
    for (key, entries) in raw {
        let mut variants = Vec::with_capacity(entries.len());
        for entry in entries {
            let variant = match entry {
                TemplateEntry::Text(text) => TemplateVariant::text(text),
                TemplateEntry::Full(RawVariant {
                    text: Some(text),
                    buttons,
                    image,
                    elements,
                }) => TemplateVariant {
                    text,
                    buttons,
                    image,
                    elements,
                },
                TemplateEntry::Full(_) => {
                    return Err(ParleyError::Template(format!(
                        "Utter template '{key}' needs to contain a '- text: ' attribute \
                         to be a proper template"
                    )))
                }
            };
            variants.push(variant);
        }
        templates.insert(key, variants);
    }
    Ok(templates)
}

fn instantiate_actions(identifiers: &[String], names: &[String]) -> Result<Vec<Action>> {
    if !names.is_empty() && names.len() != identifiers.len() {
        return Err(ParleyError::Schema(format!(
            "'action_names' has {} entries but 'actions' has {}; they must match one to one",
            names.len(),
            identifiers.len()
        )));
    }
    let mut actions = vec![Action::Listen, Action::Restart];
    for (i, identifier) in identifiers.iter().enumerate() {
        let name = names.get(i).unwrap_or(identifier);
        if identifier.starts_with(UTTER_PREFIX) {
            actions.push(Action::Utter(identifier.clone()));
        } else {
            actions.push(Action::Custom {
                identifier: identifier.clone(),
                name: name.clone(),
            });
        }
    }
    Ok(actions)
}

fn duplicates<'a>(kind: &'static str, names: impl Iterator<Item = &'a str>) -> Option<DuplicateGroup> {
    let mut seen = HashMap::new();
    let mut order = Vec::new();
    for name in names {
        let count = seen.entry(name).or_insert(0usize);
        *count += 1;
        if *count == 2 {
            order.push(name.to_string());
        }
    }
    (!order.is_empty()).then_some(DuplicateGroup { kind, names: order })
}

/// Make sure no action, intent, slot or entity is declared twice.
///
/// Every duplicate of every kind is reported in one error.
pub fn check_domain_sanity<D: DomainModel + ?Sized>(domain: &D) -> Result<()> {
    let groups: Vec<DuplicateGroup> = [
        duplicates("actions", domain.actions().iter().map(Action::name)),
        duplicates("intents", domain.intents().iter().map(String::as_str)),
        duplicates("slots", domain.slots().iter().map(|s| s.name.as_str())),
        duplicates("entities", domain.entities().iter().map(String::as_str)),
    ]
    .into_iter()
    .flatten()
    .collect();

    if groups.is_empty() {
        Ok(())
    } else {
        Err(ParleyError::DuplicateNames { groups })
    }
}

// ============================================================================
// Domain
// ============================================================================

/// The vocabulary and response templates of one bot, loaded from YAML.
#[derive(Debug)]
pub struct Domain {
    intents: Vec<String>,
    entities: Vec<String>,
    slots: Vec<Slot>,
    templates: BTreeMap<String, Vec<TemplateVariant>>,
    actions: Vec<Action>,
    action_identifiers: Vec<String>,
    action_names: Vec<String>,
    action_factory: Option<String>,
    topics: Vec<String>,
    settings: DomainSettings,
    feature_index: OnceLock<FeatureIndex>,
    action_map: OnceLock<HashMap<String, usize>>,
}

impl DomainModel for Domain {
    fn intents(&self) -> &[String] {
        &self.intents
    }

    fn entities(&self) -> &[String] {
        &self.entities
    }

    fn slots(&self) -> &[Slot] {
        &self.slots
    }

    fn actions(&self) -> &[Action] {
        &self.actions
    }

    fn templates(&self) -> &BTreeMap<String, Vec<TemplateVariant>> {
        &self.templates
    }
}

impl Domain {
    /// Parse and validate a domain from YAML text.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let file: DomainFile = serde_yaml::from_str(yaml)?;
        Self::from_file(file)
    }

    /// Load a domain file.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(ParleyError::Domain(format!(
                "Failed to load domain specification from '{}'. File not found!",
                path.display()
            )));
        }
        let content = std::fs::read_to_string(path)?;
        let domain = Self::from_yaml(&content).map_err(|e| match e {
            ParleyError::Schema(msg) => ParleyError::Schema(format!(
                "Failed to validate domain file '{}': {msg}",
                path.display()
            )),
            other => other,
        })?;
        info!(
            path = %path.display(),
            intents = domain.intents.len(),
            actions = domain.actions.len(),
            "Domain loaded"
        );
        Ok(domain)
    }

    fn from_file(file: DomainFile) -> Result<Self> {
        let mut slots = file
            .slots
            .into_iter()
            .map(|(name, spec)| spec.resolve(&name))
            .collect::<Result<Vec<_>>>()?;
        // Slot order fixes feature columns; it must not depend on file order.
        slots.sort_by(|a, b| a.name.cmp(&b.name));

        let domain = Self {
            templates: collect_templates(file.templates)?,
            actions: instantiate_actions(&file.actions, &file.action_names)?,
            intents: file.intents,
            entities: file.entities,
            slots,
            action_identifiers: file.actions,
            action_names: file.action_names,
            action_factory: file.action_factory,
            topics: file.topics,
            settings: file.config,
            feature_index: OnceLock::new(),
            action_map: OnceLock::new(),
        };
        check_domain_sanity(&domain)?;
        Ok(domain)
    }

    /// Write the domain back out as YAML.
    pub fn persist(&self, path: &Path) -> Result<()> {
        let file = DomainFile {
            config: self.settings.clone(),
            intents: self.intents.clone(),
            entities: self.entities.clone(),
            slots: self
                .slots
                .iter()
                .map(|s| (s.name.clone(), SlotSpec::from_slot(s)))
                .collect(),
            templates: self
                .templates
                .iter()
                .map(|(k, variants)| {
                    let entries = variants
                        .iter()
                        .map(|v| {
                            TemplateEntry::Full(RawVariant {
                                text: Some(v.text.clone()),
                                buttons: v.buttons.clone(),
                                image: v.image.clone(),
                                elements: v.elements.clone(),
                            })
                        })
                        .collect();
                    (k.clone(), entries)
                })
                .collect(),
            topics: self.topics.clone(),
            actions: self.action_identifiers.clone(),
            action_names: self.action_names.clone(),
            action_factory: self.action_factory.clone(),
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_yaml::to_string(&file)?)?;
        Ok(())
    }

    pub fn settings(&self) -> &DomainSettings {
        &self.settings
    }

    pub fn restart_intent(&self) -> &str {
        &self.settings.restart_intent
    }

    pub fn topics(&self) -> &[String] {
        &self.topics
    }

    /// Start an empty conversation for `sender_id` with this domain's slots.
    pub fn new_tracker(&self, sender_id: impl Into<String>) -> DialogueStateTracker {
        DialogueStateTracker::new(sender_id, self.slots.clone())
    }

    // ---- actions ----

    pub fn num_actions(&self) -> usize {
        self.actions.len()
    }

    pub fn action_names(&self) -> Vec<String> {
        self.actions.iter().map(|a| a.name().to_string()).collect()
    }

    fn action_map(&self) -> &HashMap<String, usize> {
        self.action_map.get_or_init(|| {
            self.actions
                .iter()
                .enumerate()
                .map(|(i, a)| (a.name().to_string(), i))
                .collect()
        })
    }

    fn unknown_action(&self, name: &str) -> ParleyError {
        let mut available = self.action_names();
        available.sort();
        ParleyError::UnknownAction {
            name: name.to_string(),
            available,
        }
    }

    pub fn action_for_name(&self, name: &str) -> Result<&Action> {
        let index = self.index_for_action(name)?;
        Ok(&self.actions[index])
    }

    pub fn action_for_index(&self, index: usize) -> Result<&Action> {
        self.actions
            .get(index)
            .ok_or(ParleyError::ActionIndexOutOfRange {
                index,
                count: self.actions.len(),
            })
    }

    pub fn index_for_action(&self, name: &str) -> Result<usize> {
        self.action_map()
            .get(name)
            .copied()
            .ok_or_else(|| self.unknown_action(name))
    }

    // ---- templates ----

    /// A copy of one randomly chosen variant of `template`, if it exists.
    pub fn random_template_for<R: Rng + ?Sized>(
        &self,
        template: &str,
        rng: &mut R,
    ) -> Option<TemplateVariant> {
        self.templates.get(template)?.choose(rng).cloned()
    }

    /// Slot events for entities that share a name with a slot.
    pub fn slots_for_entities(&self, entities: &[Entity]) -> Vec<Event> {
        if !self.settings.store_entities_as_slots {
            return Vec::new();
        }
        entities
            .iter()
            .filter(|e| self.slots.iter().any(|s| s.name == e.entity))
            .map(|e| Event::slot(e.entity.clone(), e.value.clone()))
            .collect()
    }

    // ---- features ----

    pub fn feature_index(&self) -> &FeatureIndex {
        self.feature_index
            .get_or_init(|| FeatureIndex::from_domain(self))
    }

    pub fn input_features(&self) -> &[String] {
        self.feature_index().names()
    }

    pub fn num_features(&self) -> usize {
        self.feature_index().len()
    }

    pub fn active_features(&self, state: &TrackerState) -> ActiveFeatures {
        features::active_features(state, &self.slots, self.feature_index())
    }

    /// Active features of every prior state of the tracker.
    pub fn features_for_tracker_history(&self, tracker: &DialogueStateTracker) -> Vec<ActiveFeatures> {
        tracker
            .prior_states()
            .iter()
            .map(|state| self.active_features(state))
            .collect()
    }

    /// Feature vector of the tracker's current state.
    pub fn encode(&self, featurizer: &dyn Featurizer, tracker: &DialogueStateTracker) -> Array1<f32> {
        let active = self.active_features(tracker.state());
        featurizer.encode(Some(&active), self.feature_index())
    }

    /// `(window, num_features)` matrix of the tracker's most recent states.
    pub fn slice_history(
        &self,
        featurizer: &dyn Featurizer,
        tracker: &DialogueStateTracker,
        window: usize,
    ) -> Array2<f32> {
        let history = self.features_for_tracker_history(tracker);
        features::slice_feature_history(featurizer, &history, window, self.feature_index())
    }

    // ---- specification snapshot ----

    /// Write the ordered feature names to `model_dir/domain.json`.
    pub fn persist_specification(&self, model_dir: &Path) -> Result<()> {
        std::fs::create_dir_all(model_dir)?;
        let snapshot = serde_json::json!({ "features": self.input_features() });
        std::fs::write(
            model_dir.join(SPECIFICATION_FILE),
            serde_json::to_string_pretty(&snapshot)?,
        )?;
        debug!(path = %model_dir.display(), "Domain specification persisted");
        Ok(())
    }

    /// Read the feature names persisted with a model.
    pub fn load_specification(model_dir: &Path) -> Result<Vec<String>> {
        #[derive(Deserialize)]
        struct Snapshot {
            features: Vec<String>,
        }
        let content = std::fs::read_to_string(model_dir.join(SPECIFICATION_FILE))?;
        let snapshot: Snapshot = serde_json::from_str(&content)?;
        Ok(snapshot.features)
    }

    /// Fail if the model in `model_dir` was trained on different features.
    pub fn compare_with_specification(&self, model_dir: &Path) -> Result<()> {
        let persisted = Self::load_specification(model_dir)?;
        if persisted.as_slice() == self.input_features() {
            return Ok(());
        }
        let live: BTreeSet<&String> = self.input_features().iter().collect();
        let stored: BTreeSet<&String> = persisted.iter().collect();
        Err(ParleyError::SpecificationMismatch {
            removed: stored.difference(&live).map(|s| s.to_string()).collect(),
            added: live.difference(&stored).map(|s| s.to_string()).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use serde_json::json;

    const DOMAIN: &str = r#"
intents:
  - greet
  - goodbye
entities:
  - name
slots:
  name:
    type: text
  people:
    type: float
    min_value: 0
    max_value: 10
templates:
  utter_greet:
    - "Hello {name}"
    - text: "Hi {name}!"
      buttons:
        - title: "Hello"
          payload: "/greet"
  utter_goodbye:
    - text: "Bye"
      image: "https://example.com/bye.png"
actions:
  - utter_greet
  - utter_goodbye
  - action_lookup
action_names:
  - utter_greet
  - utter_goodbye
  - lookup
config:
  store_entities_as_slots: true
"#;

    fn domain() -> Domain {
        Domain::from_yaml(DOMAIN).unwrap()
    }

    #[test]
    fn test_builtin_actions_come_first() {
        let d = domain();
        assert_eq!(
            d.action_names(),
            vec!["action_listen", "action_restart", "utter_greet", "utter_goodbye", "lookup"]
        );
        assert_eq!(d.action_for_index(0).unwrap(), &Action::Listen);
        assert_eq!(
            d.action_for_name("lookup").unwrap(),
            &Action::Custom {
                identifier: "action_lookup".into(),
                name: "lookup".into()
            }
        );
    }

    #[test]
    fn test_slots_are_sorted_by_name() {
        let d = domain();
        let names: Vec<&str> = d.slots().iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["name", "people"]);
    }

    #[test]
    fn test_duplicates_fail_and_list_every_name() {
        let err = Domain::from_yaml(
            r#"
intents: [greet, greet, bye, bye]
entities: [name]
actions: [utter_greet, utter_greet]
"#,
        )
        .unwrap_err();
        let msg = err.to_string();
        assert!(matches!(err, ParleyError::DuplicateNames { .. }));
        assert!(msg.contains("Duplicate actions in domain"));
        assert!(msg.contains("utter_greet"));
        assert!(msg.contains("Duplicate intents in domain. These intents occur more than once in the domain: greet, bye"));
    }

    #[test]
    fn test_builtin_action_redeclared_is_a_duplicate() {
        let err = Domain::from_yaml("actions: [action_listen]").unwrap_err();
        assert!(err.to_string().contains("action_listen"));
    }

    #[test]
    fn test_unknown_top_level_key_is_a_schema_error() {
        let err = Domain::from_yaml("intents: [greet]\nintnets: [bye]\n").unwrap_err();
        assert!(matches!(err, ParleyError::Schema(_)));
    }

    #[test]
    fn test_unsupported_slot_type_is_a_schema_error() {
        let err = Domain::from_yaml("slots:\n  x:\n    type: fancy\n").unwrap_err();
        assert!(err.to_string().contains("unsupported type 'fancy'"));
    }

    #[test]
    fn test_template_without_text_is_rejected() {
        let err = Domain::from_yaml(
            "templates:\n  utter_x:\n    - image: \"https://example.com/x.png\"\n",
        )
        .unwrap_err();
        assert!(matches!(err, ParleyError::Template(_)));
    }

    #[test]
    fn test_template_element_without_title_loads() {
        let d = Domain::from_yaml(
            "templates:\n  utter_cards:\n    - text: \"Menu\"\n      elements:\n        - subtitle: \"Margherita\"\n",
        )
        .unwrap();
        let element = &d.templates()["utter_cards"][0].elements[0];
        assert_eq!(element.title, None);
        assert_eq!(element.subtitle.as_deref(), Some("Margherita"));
    }

    #[test]
    fn test_action_names_length_mismatch() {
        let err = Domain::from_yaml("actions: [a, b]\naction_names: [a]\n").unwrap_err();
        assert!(matches!(err, ParleyError::Schema(_)));
    }

    #[test]
    fn test_lookups_are_fatal_and_list_names() {
        let d = domain();
        let err = d.action_for_name("utter_nope").unwrap_err();
        assert!(err.to_string().contains("action_listen, action_restart, lookup"));
        let err = d.action_for_index(99).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Can not access action at index 99. Domain has 5 actions."
        );
        assert_eq!(d.index_for_action("utter_goodbye").unwrap(), 3);
    }

    #[test]
    fn test_random_template_returns_a_copy() {
        let d = domain();
        let mut rng = StdRng::seed_from_u64(7);
        let mut variant = d.random_template_for("utter_greet", &mut rng).unwrap();
        variant.text.push_str(" (edited)");
        for v in &d.templates()["utter_greet"] {
            assert!(!v.text.contains("edited"));
        }
        assert!(d.random_template_for("utter_missing", &mut rng).is_none());
    }

    #[test]
    fn test_slots_for_entities() {
        let d = domain();
        let events = d.slots_for_entities(&[
            Entity::new("name", "Sam", 0, 3),
            Entity::new("colour", "red", 4, 7),
        ]);
        assert_eq!(events, vec![Event::slot("name", "Sam")]);

        let off = Domain::from_yaml(
            "slots:\n  name:\n    type: text\nconfig:\n  store_entities_as_slots: false\n",
        )
        .unwrap();
        assert!(off.slots_for_entities(&[Entity::new("name", "Sam", 0, 3)]).is_empty());
    }

    #[test]
    fn test_persist_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("domain.yml");
        let d = domain();
        d.persist(&path).unwrap();
        let reloaded = Domain::load(&path).unwrap();
        assert_eq!(reloaded.action_names(), d.action_names());
        assert_eq!(reloaded.input_features(), d.input_features());
        assert_eq!(reloaded.templates(), d.templates());
        assert_eq!(reloaded.slots(), d.slots());
    }

    #[test]
    fn test_load_missing_file() {
        let err = Domain::load(Path::new("/nonexistent/domain.yml")).unwrap_err();
        assert!(err.to_string().contains("File not found"));
    }

    #[test]
    fn test_specification_round_trip_and_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let d = domain();
        d.persist_specification(dir.path()).unwrap();
        assert!(d.compare_with_specification(dir.path()).is_ok());

        let changed = Domain::from_yaml(
            r#"
intents: [greet, thank]
entities: [name]
slots:
  name:
    type: text
  people:
    type: float
actions: [utter_greet, utter_goodbye, action_lookup]
action_names: [utter_greet, utter_goodbye, lookup]
"#,
        )
        .unwrap();
        match changed.compare_with_specification(dir.path()).unwrap_err() {
            ParleyError::SpecificationMismatch { removed, added } => {
                assert_eq!(removed, vec!["intent_goodbye".to_string()]);
                assert_eq!(added, vec!["intent_thank".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_snapshot_format() {
        let dir = tempfile::tempdir().unwrap();
        domain().persist_specification(dir.path()).unwrap();
        let raw: Value =
            serde_json::from_str(&std::fs::read_to_string(dir.path().join("domain.json")).unwrap())
                .unwrap();
        assert_eq!(raw["features"][0], json!("intent_greet"));
    }
}
