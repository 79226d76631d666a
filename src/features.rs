//! Feature definitions and evaluation results.
//!
//! Feature definitions are opaque to the refresh pipeline: they are decoded, stored and handed to
//! the evaluator as-is. Fields the SDK does not know about are kept in `extra` so that a
//! definition survives a decode/encode round-trip unchanged.
use std::collections::HashMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::conditions::Condition;

/// Mapping of feature key to feature definition.
pub type FeatureMap = HashMap<String, Feature>;

/// A feature: a default value plus an ordered list of override rules.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Feature {
    #[serde(
        default,
        deserialize_with = "deserialize_present",
        skip_serializing_if = "Option::is_none"
    )]
    pub default_value: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<FeatureRule>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A conditional override rule. A rule either forces a value or runs an inline experiment over
/// `variations`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureRule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<Condition>,
    /// Value forced for matching subjects. A present `null` is `Some(Value::Null)`.
    #[serde(
        default,
        deserialize_with = "deserialize_present",
        skip_serializing_if = "Option::is_none"
    )]
    pub force: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variations: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weights: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coverage: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash_attribute: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// An experiment definition, run either directly via
/// [`GrowthBook::run`](crate::GrowthBook::run) or inline from a feature rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Experiment {
    pub key: String,
    #[serde(default)]
    pub variations: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weights: Option<Vec<f64>>,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coverage: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<Condition>,
    /// Forces every subject into this variation index.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub force: Option<usize>,
    #[serde(default = "default_hash_attribute")]
    pub hash_attribute: String,
}

/// `None` only when the field is missing; an explicit `null` is kept.
fn deserialize_present<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Value>, D::Error> {
    Value::deserialize(deserializer).map(Some)
}

fn default_active() -> bool {
    true
}

fn default_hash_attribute() -> String {
    "id".to_owned()
}

impl Experiment {
    /// Create an active experiment with no variations.
    pub fn new(key: impl Into<String>) -> Experiment {
        Experiment {
            key: key.into(),
            variations: Vec::new(),
            weights: None,
            active: true,
            coverage: None,
            condition: None,
            force: None,
            hash_attribute: default_hash_attribute(),
        }
    }

    /// Replace the variations.
    pub fn with_variations(mut self, variations: Vec<Value>) -> Experiment {
        self.variations = variations;
        self
    }

    /// Replace the variation weights.
    pub fn with_weights(mut self, weights: Vec<f64>) -> Experiment {
        self.weights = Some(weights);
        self
    }

    /// Replace the targeting condition.
    pub fn with_condition(mut self, condition: Condition) -> Experiment {
        self.condition = Some(condition);
        self
    }
}

/// Result of running an experiment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExperimentResult {
    /// Whether the subject was bucketed into the experiment.
    pub in_experiment: bool,
    /// Index of the assigned variation. `0` when the subject is not in the experiment.
    pub variation_id: usize,
    /// Value of the assigned variation, `null` if the experiment has no variations.
    pub value: Value,
    pub hash_attribute: String,
    pub hash_value: Value,
}

/// How a feature value was determined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FeatureSource {
    /// The feature key is not present in the current feature map.
    UnknownFeature,
    DefaultValue,
    Force,
    Experiment,
}

/// Result of evaluating a feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureResult {
    pub value: Value,
    pub source: FeatureSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub experiment: Option<Experiment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub experiment_result: Option<ExperimentResult>,
}

impl FeatureResult {
    pub(crate) fn new(value: Value, source: FeatureSource) -> FeatureResult {
        FeatureResult {
            value,
            source,
            experiment: None,
            experiment_result: None,
        }
    }

    /// A feature is on when its value is truthy: anything but `null`, `false`, `0` and `""`.
    pub fn is_on(&self) -> bool {
        match &self.value {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => n.as_f64() != Some(0.0),
            Value::String(s) => !s.is_empty(),
            Value::Array(_) | Value::Object(_) => true,
        }
    }

    pub fn is_off(&self) -> bool {
        !self.is_on()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{Feature, FeatureResult, FeatureSource};

    #[test]
    fn keeps_unknown_fields() {
        let raw = json!({
            "defaultValue": 1,
            "rules": [
                {"condition": {"id": "1234"}, "force": 2, "tracks": ["a"]},
                {"force": 3, "namespace": ["ns", 0, 0.5]}
            ],
            "valueType": "number"
        });
        let feature: Feature = serde_json::from_value(raw.clone()).unwrap();

        assert_eq!(feature.rules.len(), 2);
        assert_eq!(feature.rules[1].force, Some(json!(3)));
        assert_eq!(serde_json::to_value(&feature).unwrap(), raw);
    }

    #[test]
    fn keeps_explicit_null_values() {
        let raw = json!({
            "defaultValue": null,
            "rules": [{"condition": {"id": "1"}, "force": null}, {"force": 1}]
        });
        let feature: Feature = serde_json::from_value(raw.clone()).unwrap();

        assert_eq!(feature.default_value, Some(json!(null)));
        assert_eq!(feature.rules[0].force, Some(json!(null)));
        assert_eq!(serde_json::to_value(&feature).unwrap(), raw);

        let missing: Feature = serde_json::from_value(json!({"rules": [{}]})).unwrap();
        assert_eq!(missing.default_value, None);
        assert_eq!(missing.rules[0].force, None);
    }

    #[test]
    fn truthiness() {
        let on = |v| FeatureResult::new(v, FeatureSource::DefaultValue).is_on();

        assert!(on(json!(true)));
        assert!(on(json!(1)));
        assert!(on(json!("x")));
        assert!(on(json!({})));
        assert!(!on(json!(null)));
        assert!(!on(json!(false)));
        assert!(!on(json!(0)));
        assert!(!on(json!(0.0)));
        assert!(!on(json!("")));
    }

    #[test]
    fn source_serializes_camel_case() {
        assert_eq!(
            serde_json::to_value(FeatureSource::UnknownFeature).unwrap(),
            "unknownFeature"
        );
    }
}
