//! Feature and experiment evaluation.
//!
//! Evaluation is a pure function of a [`Context`] snapshot and a key or experiment. The only side
//! effect is invoking the tracking callback carried in the context when a subject is bucketed into
//! an experiment.
use serde_json::Value;

use crate::{
    sharder::{Md5Sharder, Sharder},
    Context, Experiment, ExperimentResult, FeatureResult, FeatureSource,
};

/// Computes feature values and experiment assignments from a context snapshot.
///
/// The client hands every call an immutable snapshot and returns the result unchanged. Plug in your
/// own implementation with [`GrowthBookConfig::evaluator`](crate::GrowthBookConfig::evaluator).
pub trait Evaluator: Send + Sync {
    fn evaluate_feature(&self, context: &Context, key: &str) -> FeatureResult;

    fn evaluate_experiment(&self, context: &Context, experiment: &Experiment) -> ExperimentResult;
}

/// The built-in evaluator: ordered rule matching with [`Condition`](crate::Condition)s and
/// md5-based bucketing.
pub struct DefaultEvaluator<S = Md5Sharder> {
    sharder: S,
}

impl DefaultEvaluator {
    pub fn new() -> DefaultEvaluator {
        DefaultEvaluator {
            sharder: Md5Sharder,
        }
    }
}

impl<S: Sharder> DefaultEvaluator<S> {
    /// Use a custom bucketing hash.
    pub fn with_sharder(sharder: S) -> DefaultEvaluator<S> {
        DefaultEvaluator { sharder }
    }
}

impl Default for DefaultEvaluator {
    fn default() -> DefaultEvaluator {
        DefaultEvaluator::new()
    }
}

impl<S: Sharder + Send + Sync> Evaluator for DefaultEvaluator<S> {
    fn evaluate_feature(&self, context: &Context, key: &str) -> FeatureResult {
        let Some(feature) = context.features.get(key) else {
            log::trace!(target: "growthbook", key; "unknown feature");
            return FeatureResult::new(Value::Null, FeatureSource::UnknownFeature);
        };

        for rule in &feature.rules {
            if let Some(condition) = &rule.condition {
                if !condition.eval(&context.attributes) {
                    continue;
                }
            }

            if let Some(force) = &rule.force {
                if let Some(coverage) = rule.coverage {
                    let hash_attribute = rule.hash_attribute.as_deref().unwrap_or("id");
                    let Some(hash_value) = hash_string(&context.attributes, hash_attribute) else {
                        continue;
                    };
                    if self.sharder.get_bucket(&format!("{key}-{hash_value}")) >= coverage {
                        continue;
                    }
                }
                return FeatureResult::new(force.clone(), FeatureSource::Force);
            }

            let Some(variations) = &rule.variations else {
                continue;
            };
            let experiment = Experiment {
                key: rule.key.clone().unwrap_or_else(|| key.to_owned()),
                variations: variations.clone(),
                weights: rule.weights.clone(),
                active: true,
                coverage: rule.coverage,
                // The rule condition has already been checked.
                condition: None,
                force: None,
                hash_attribute: rule
                    .hash_attribute
                    .clone()
                    .unwrap_or_else(|| "id".to_owned()),
            };
            let result = self.evaluate_experiment(context, &experiment);
            if result.in_experiment {
                return FeatureResult {
                    value: result.value.clone(),
                    source: FeatureSource::Experiment,
                    experiment: Some(experiment),
                    experiment_result: Some(result),
                };
            }
        }

        FeatureResult::new(
            feature.default_value.clone().unwrap_or(Value::Null),
            FeatureSource::DefaultValue,
        )
    }

    fn evaluate_experiment(&self, context: &Context, experiment: &Experiment) -> ExperimentResult {
        let hash_value = context
            .attributes
            .get(&experiment.hash_attribute)
            .cloned()
            .unwrap_or(Value::Null);
        let result = |variation_id: usize, in_experiment: bool| ExperimentResult {
            in_experiment,
            variation_id,
            value: experiment
                .variations
                .get(variation_id)
                .cloned()
                .unwrap_or(Value::Null),
            hash_attribute: experiment.hash_attribute.clone(),
            hash_value: hash_value.clone(),
        };

        if experiment.variations.len() < 2 || !context.enabled {
            return result(0, false);
        }

        if let Some(&forced) = context
            .forced_variations
            .as_ref()
            .and_then(|forced| forced.get(&experiment.key))
        {
            if forced < experiment.variations.len() {
                return result(forced, false);
            }
        }

        if !experiment.active {
            return result(0, false);
        }

        let Some(hash_input) = hash_string(&context.attributes, &experiment.hash_attribute) else {
            return result(0, false);
        };

        if let Some(condition) = &experiment.condition {
            if !condition.eval(&context.attributes) {
                return result(0, false);
            }
        }

        if let Some(forced) = experiment.force {
            if forced < experiment.variations.len() {
                return result(forced, false);
            }
        }

        if context.qa_mode {
            return result(0, false);
        }

        let bucket = self
            .sharder
            .get_bucket(&format!("{}-{}", experiment.key, hash_input));
        let ranges = bucket_ranges(
            experiment.variations.len(),
            experiment.coverage.unwrap_or(1.0),
            experiment.weights.as_deref(),
        );
        let Some(variation_id) = ranges
            .iter()
            .position(|(start, end)| bucket >= *start && bucket < *end)
        else {
            return result(0, false);
        };

        let result = result(variation_id, true);
        context
            .tracking_callback
            .on_experiment_viewed(experiment, &result);
        result
    }
}

/// String form of the hash attribute, or `None` if the subject has no usable value.
fn hash_string(attributes: &Value, hash_attribute: &str) -> Option<String> {
    match attributes.get(hash_attribute)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Split `[0, coverage)` into consecutive ranges, one per variation, proportional to `weights`.
/// Missing or invalid weights (wrong length, not summing to ~1) fall back to an even split.
fn bucket_ranges(variations: usize, coverage: f64, weights: Option<&[f64]>) -> Vec<(f64, f64)> {
    let coverage = coverage.clamp(0.0, 1.0);
    let even = vec![1.0 / variations as f64; variations];
    let weights = match weights {
        Some(w) if w.len() == variations && (w.iter().sum::<f64>() - 1.0).abs() < 0.01 => w,
        _ => &even[..],
    };

    let mut cumulative = 0.0;
    weights
        .iter()
        .map(|weight| {
            let start = cumulative;
            cumulative += weight;
            (start, start + coverage * weight)
        })
        .collect()
}
