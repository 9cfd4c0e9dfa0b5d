//! Tracker state to numeric feature conversion.
//!
//! Every state is first reduced to a bag of named [`ActiveFeatures`], then a
//! [`Featurizer`] lays the bag out along the domain's [`FeatureIndex`]. The
//! column layout is `intents + entities + slots + previous actions`.

use std::collections::{BTreeMap, HashMap};

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::domain::DomainModel;
use crate::slots::Slot;
use crate::tracker::TrackerState;

/// Named features that are switched on for one tracker state.
pub type ActiveFeatures = BTreeMap<String, f32>;

/// Value used for every column of a padding row.
pub const PADDING_VALUE: f32 = -1.0;

/// Ordered feature names of a domain and their column positions.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureIndex {
    names: Vec<String>,
    positions: HashMap<String, usize>,
}

impl FeatureIndex {
    pub fn from_domain<D: DomainModel + ?Sized>(domain: &D) -> Self {
        let intents = domain.intents().iter().map(|i| format!("intent_{i}"));
        let entities = domain.entities().iter().map(|e| format!("entity_{e}"));
        let slots = domain.slots().iter().flat_map(|s| {
            (0..s.feature_dimensionality()).map(move |i| format!("slot_{}_{}", s.name, i))
        });
        let actions = domain.actions().iter().map(|a| format!("prev_{}", a.name()));

        let names: Vec<String> = intents.chain(entities).chain(slots).chain(actions).collect();
        let positions = names
            .iter()
            .enumerate()
            .map(|(i, n)| (n.clone(), i))
            .collect();
        Self { names, positions }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.positions.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.positions.contains_key(name)
    }
}

/// Collect the features a tracker state switches on.
pub fn active_features(state: &TrackerState, slots: &[Slot], index: &FeatureIndex) -> ActiveFeatures {
    let mut features = ActiveFeatures::new();
    let message = &state.latest_message;

    for entity in &message.entities {
        features.insert(format!("entity_{}", entity.entity), 1.0);
    }

    for slot in slots {
        let value = state.slots.get(&slot.name).unwrap_or(&serde_json::Value::Null);
        for (i, v) in slot.as_feature(value).into_iter().enumerate() {
            features.insert(format!("slot_{}_{}", slot.name, i), v);
        }
    }

    match &message.intent_ranking {
        Some(ranking) => {
            for ranked in ranking.iter().filter(|r| !r.name.is_empty()) {
                features.insert(format!("intent_{}", ranked.name), ranked.confidence);
            }
        }
        None => {
            if let Some(name) = message.intent.name.as_deref().filter(|n| !n.is_empty()) {
                features.insert(format!("intent_{name}"), message.intent.confidence);
            }
        }
    }

    if let Some(action) = &state.latest_action_name {
        let feature = format!("prev_{action}");
        if index.contains(&feature) {
            features.insert(feature, 1.0);
        } else {
            warn!(
                action = %action,
                "Failed to use action in history. Make sure all actions are listed in the \
                 domain's action list. If the action was recently removed this warning \
                 stops appearing once old conversations age out."
            );
        }
    }

    features
}

/// Lays out active features as a dense vector.
pub trait Featurizer: Send + Sync {
    /// Encode one state. `None` is a padding state and encodes to all
    /// [`PADDING_VALUE`].
    fn encode(&self, features: Option<&ActiveFeatures>, index: &FeatureIndex) -> Array1<f32> {
        let Some(features) = features else {
            return Array1::from_elem(index.len(), PADDING_VALUE);
        };
        let mut encoded = Array1::zeros(index.len());
        for (name, value) in features {
            if let Some(i) = index.position(name) {
                encoded[i] = self.column_value(*value);
            }
        }
        encoded
    }

    /// The number written to a known feature's column.
    fn column_value(&self, value: f32) -> f32;
}

/// Any non-zero feature becomes `1.0`.
#[derive(Debug, Clone, Copy, Default)]
pub struct BinaryFeaturizer;

impl Featurizer for BinaryFeaturizer {
    fn column_value(&self, value: f32) -> f32 {
        if value != 0.0 {
            1.0
        } else {
            0.0
        }
    }
}

/// Features keep their value, so intent confidences survive encoding.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProbabilisticFeaturizer;

impl Featurizer for ProbabilisticFeaturizer {
    fn column_value(&self, value: f32) -> f32 {
        value
    }
}

/// Featurizer choice as it appears in configuration and persisted models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeaturizerKind {
    Binary,
    #[default]
    Probabilistic,
}

impl Featurizer for FeaturizerKind {
    fn column_value(&self, value: f32) -> f32 {
        match self {
            FeaturizerKind::Binary => BinaryFeaturizer.column_value(value),
            FeaturizerKind::Probabilistic => ProbabilisticFeaturizer.column_value(value),
        }
    }
}

/// Encode the last `window` states of `history` into a `(window, num_features)`
/// matrix, left-padding with [`PADDING_VALUE`] rows when the history is
/// shorter than the window.
pub fn slice_feature_history(
    featurizer: &dyn Featurizer,
    history: &[ActiveFeatures],
    window: usize,
    index: &FeatureIndex,
) -> Array2<f32> {
    let start = history.len().saturating_sub(window);
    let padding = window.saturating_sub(history.len());
    let rows = std::iter::repeat(None).take(padding).chain(history[start..].iter().map(Some));

    let mut slice = Array2::zeros((window, index.len()));
    for (mut row, features) in slice.rows_mut().into_iter().zip(rows) {
        row.assign(&featurizer.encode(features, index));
    }
    slice
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Domain;
    use crate::events::Event;
    use crate::tracker::DialogueStateTracker;
    use crate::types::{Entity, Intent, ParseData, RankedIntent};

    const DOMAIN: &str = r#"
intents:
  - greet
  - goodbye
entities:
  - name
slots:
  name:
    type: text
  cuisine:
    type: categorical
    values: [thai, italian]
actions:
  - utter_greet
  - utter_goodbye
"#;

    fn domain() -> Domain {
        Domain::from_yaml(DOMAIN).unwrap()
    }

    fn greet_with_name() -> ParseData {
        ParseData {
            text: "/greet{\"name\": \"Sam\"}".into(),
            intent: Intent::new("greet", 0.9),
            intent_ranking: None,
            entities: vec![Entity::new("name", "Sam", 6, 21)],
        }
    }

    fn tracker_with_history(turns: usize) -> DialogueStateTracker {
        let d = domain();
        let mut tracker = DialogueStateTracker::new("default", d.slots().to_vec());
        for _ in 0..turns {
            tracker.update(Event::action("action_listen"));
            tracker.update(Event::user(greet_with_name()));
            tracker.update(Event::slot("name", "Sam"));
            tracker.update(Event::action("utter_greet"));
        }
        tracker
    }

    #[test]
    fn test_feature_names_are_ordered_by_block() {
        let d = domain();
        let names = d.feature_index().names();
        assert_eq!(
            names,
            &[
                "intent_greet",
                "intent_goodbye",
                "entity_name",
                "slot_cuisine_0",
                "slot_cuisine_1",
                "slot_name_0",
                "prev_action_listen",
                "prev_action_restart",
                "prev_utter_greet",
                "prev_utter_goodbye",
            ]
        );
    }

    #[test]
    fn test_feature_names_are_deterministic() {
        let a = FeatureIndex::from_domain(&domain());
        let b = FeatureIndex::from_domain(&domain());
        assert_eq!(a, b);
    }

    #[test]
    fn test_active_features_from_latest_message() {
        let d = domain();
        let tracker = tracker_with_history(1);
        let active = active_features(tracker.state(), d.slots(), d.feature_index());
        assert_eq!(active["intent_greet"], 0.9);
        assert_eq!(active["entity_name"], 1.0);
        assert_eq!(active["slot_name_0"], 1.0);
        assert_eq!(active["slot_cuisine_0"], 0.0);
        assert_eq!(active["prev_utter_greet"], 1.0);
    }

    #[test]
    fn test_intent_ranking_sets_every_ranked_intent() {
        let d = domain();
        let mut message = greet_with_name();
        message.intent_ranking = Some(vec![
            RankedIntent {
                name: "greet".into(),
                confidence: 0.6,
            },
            RankedIntent {
                name: "goodbye".into(),
                confidence: 0.4,
            },
        ]);
        let mut tracker = DialogueStateTracker::new("default", d.slots().to_vec());
        tracker.update(Event::user(message));
        let active = active_features(tracker.state(), d.slots(), d.feature_index());
        assert_eq!(active["intent_greet"], 0.6);
        assert_eq!(active["intent_goodbye"], 0.4);
    }

    #[test]
    fn test_unknown_previous_action_is_skipped() {
        let d = domain();
        let mut tracker = DialogueStateTracker::new("default", d.slots().to_vec());
        tracker.update(Event::action("action_removed_long_ago"));
        let active = active_features(tracker.state(), d.slots(), d.feature_index());
        assert!(active.keys().all(|k| !k.starts_with("prev_")));
    }

    #[test]
    fn test_binary_and_probabilistic_encoding() {
        let d = domain();
        let index = d.feature_index();
        let mut active = ActiveFeatures::new();
        active.insert("intent_greet".into(), 0.25);
        active.insert("intent_unknown".into(), 1.0);

        let binary = BinaryFeaturizer.encode(Some(&active), index);
        let probabilistic = ProbabilisticFeaturizer.encode(Some(&active), index);
        assert_eq!(binary[0], 1.0);
        assert_eq!(probabilistic[0], 0.25);
        assert_eq!(binary.iter().filter(|v| **v != 0.0).count(), 1);

        let padding = FeaturizerKind::Binary.encode(None, index);
        assert!(padding.iter().all(|v| *v == PADDING_VALUE));
    }

    #[test]
    fn test_slice_shape_is_independent_of_history_length() {
        let d = domain();
        let window = 3;
        // Prior states: 1 + 2 per turn, so 1, 3, 5 cover < w, == w and > w.
        for turns in [0, 1, 2] {
            let tracker = tracker_with_history(turns);
            let slice = d.slice_history(&FeaturizerKind::Binary, &tracker, window);
            assert_eq!(slice.dim(), (window, d.num_features()));
        }
        let empty: Vec<ActiveFeatures> = Vec::new();
        let slice = slice_feature_history(&BinaryFeaturizer, &empty, window, d.feature_index());
        assert_eq!(slice.dim(), (window, d.num_features()));
        assert!(slice.iter().all(|v| *v == PADDING_VALUE));
    }

    #[test]
    fn test_slice_pads_on_the_left() {
        let d = domain();
        let tracker = tracker_with_history(0);
        let slice = d.slice_history(&FeaturizerKind::Binary, &tracker, 2);
        assert!(slice.row(0).iter().all(|v| *v == PADDING_VALUE));
        assert!(slice.row(1).iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_encoding_is_deterministic() {
        let d = domain();
        let tracker = tracker_with_history(2);
        let a = d.slice_history(&FeaturizerKind::Probabilistic, &tracker, 4);
        let b = d.slice_history(&FeaturizerKind::Probabilistic, &tracker, 4);
        assert_eq!(a, b);
        assert_eq!(
            d.encode(&FeaturizerKind::Probabilistic, &tracker),
            d.encode(&FeaturizerKind::Probabilistic, &tracker)
        );
    }
}
