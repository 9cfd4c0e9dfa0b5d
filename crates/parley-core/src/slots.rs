use serde::{Deserialize, Serialize};
use serde_json::Value;

/// How a slot's value is turned into features.
///
/// Resolved once from the domain file's `type` string so encoding never
/// dispatches on strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SlotType {
    /// One feature: whether the slot is set.
    Text,
    /// Two features: whether the slot is set, and whether it is truthy.
    Bool,
    /// One feature: the value scaled into `[0, 1]` between `min_value` and `max_value`.
    Float { min_value: f32, max_value: f32 },
    /// One feature: whether the slot holds a non-empty list.
    List,
    /// One feature per allowed value, one-hot. Comparison is case-insensitive.
    Categorical { values: Vec<String> },
}

impl SlotType {
    pub fn type_name(&self) -> &'static str {
        match self {
            SlotType::Text => "text",
            SlotType::Bool => "bool",
            SlotType::Float { .. } => "float",
            SlotType::List => "list",
            SlotType::Categorical { .. } => "categorical",
        }
    }
}

/// A named piece of conversation memory declared by the domain.
#[derive(Debug, Clone, PartialEq)]
pub struct Slot {
    pub name: String,
    pub slot_type: SlotType,
    pub initial_value: Value,
}

impl Slot {
    pub fn new(name: impl Into<String>, slot_type: SlotType) -> Self {
        Self {
            name: name.into(),
            slot_type,
            initial_value: Value::Null,
        }
    }

    pub fn with_initial_value(mut self, value: Value) -> Self {
        self.initial_value = value;
        self
    }

    /// Number of feature columns this slot occupies. Always at least one.
    pub fn feature_dimensionality(&self) -> usize {
        match &self.slot_type {
            SlotType::Bool => 2,
            SlotType::Categorical { values } => values.len().max(1),
            _ => 1,
        }
    }

    /// Encode `value` into exactly [`feature_dimensionality`](Self::feature_dimensionality)
    /// numbers. An unset (`null`) value encodes to all zeros.
    pub fn as_feature(&self, value: &Value) -> Vec<f32> {
        let mut features = vec![0.0; self.feature_dimensionality()];
        if value.is_null() {
            return features;
        }
        match &self.slot_type {
            SlotType::Text => features[0] = 1.0,
            SlotType::Bool => {
                features[0] = 1.0;
                features[1] = if truthy(value) { 1.0 } else { 0.0 };
            }
            SlotType::Float {
                min_value,
                max_value,
            } => {
                if let Some(v) = as_f32(value) {
                    let range = max_value - min_value;
                    features[0] = if range > 0.0 {
                        ((v.clamp(*min_value, *max_value) - min_value) / range).clamp(0.0, 1.0)
                    } else {
                        1.0
                    };
                }
            }
            SlotType::List => {
                if value.as_array().is_some_and(|items| !items.is_empty()) {
                    features[0] = 1.0;
                }
            }
            SlotType::Categorical { values } => {
                let needle = categorical_key(value);
                if let Some(i) = values.iter().position(|v| v.to_lowercase() == needle) {
                    features[i] = 1.0;
                }
            }
        }
        features
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty() && !matches!(s.to_lowercase().as_str(), "false" | "0"),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

fn as_f32(value: &Value) -> Option<f32> {
    match value {
        Value::Number(n) => n.as_f64().map(|f| f as f32),
        Value::String(s) => s.trim().parse().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

fn categorical_key(value: &Value) -> String {
    match value {
        Value::String(s) => s.to_lowercase(),
        other => other.to_string().to_lowercase(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_unset_slots_encode_to_zeros() {
        let slots = [
            Slot::new("a", SlotType::Text),
            Slot::new("b", SlotType::Bool),
            Slot::new(
                "c",
                SlotType::Categorical {
                    values: vec!["x".into(), "y".into()],
                },
            ),
        ];
        for slot in &slots {
            let features = slot.as_feature(&Value::Null);
            assert_eq!(features.len(), slot.feature_dimensionality());
            assert!(features.iter().all(|f| *f == 0.0));
        }
    }

    #[test]
    fn test_text_slot() {
        let slot = Slot::new("name", SlotType::Text);
        assert_eq!(slot.as_feature(&json!("Sam")), vec![1.0]);
    }

    #[test]
    fn test_bool_slot() {
        let slot = Slot::new("vip", SlotType::Bool);
        assert_eq!(slot.as_feature(&json!(true)), vec![1.0, 1.0]);
        assert_eq!(slot.as_feature(&json!(false)), vec![1.0, 0.0]);
        assert_eq!(slot.as_feature(&json!("false")), vec![1.0, 0.0]);
    }

    #[test]
    fn test_float_slot_scales_and_clamps() {
        let slot = Slot::new(
            "people",
            SlotType::Float {
                min_value: 0.0,
                max_value: 10.0,
            },
        );
        assert_eq!(slot.as_feature(&json!(5)), vec![0.5]);
        assert_eq!(slot.as_feature(&json!(42)), vec![1.0]);
        assert_eq!(slot.as_feature(&json!("-3")), vec![0.0]);
        assert_eq!(slot.as_feature(&json!({"x": 1})), vec![0.0]);
    }

    #[test]
    fn test_list_slot() {
        let slot = Slot::new("items", SlotType::List);
        assert_eq!(slot.as_feature(&json!(["a"])), vec![1.0]);
        assert_eq!(slot.as_feature(&json!([])), vec![0.0]);
    }

    #[test]
    fn test_categorical_slot_is_case_insensitive() {
        let slot = Slot::new(
            "cuisine",
            SlotType::Categorical {
                values: vec!["Italian".into(), "thai".into()],
            },
        );
        assert_eq!(slot.feature_dimensionality(), 2);
        assert_eq!(slot.as_feature(&json!("ITALIAN")), vec![1.0, 0.0]);
        assert_eq!(slot.as_feature(&json!("Thai")), vec![0.0, 1.0]);
        assert_eq!(slot.as_feature(&json!("french")), vec![0.0, 0.0]);
    }

    #[test]
    fn test_empty_categorical_still_has_one_column() {
        let slot = Slot::new("c", SlotType::Categorical { values: vec![] });
        assert_eq!(slot.feature_dimensionality(), 1);
        assert_eq!(slot.as_feature(&json!("x")), vec![0.0]);
    }
}
