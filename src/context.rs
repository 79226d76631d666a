use std::{collections::HashMap, fmt, sync::Arc};

use serde_json::Value;

use crate::{tracking::NoopTrackingCallback, FeatureMap, TrackingCallback};

/// Everything the evaluator needs to compute feature values: configuration, the feature map
/// currently in effect and the attributes of the subject.
///
/// A `Context` is always observed as an immutable snapshot. Updates replace `features` or
/// `attributes` as whole values, so a snapshot never mixes two payloads.
#[derive(Clone)]
pub struct Context {
    /// Remote source of feature payloads.
    pub endpoint: Option<String>,
    /// Feature map produced by the last successful refresh or install.
    pub features: Arc<FeatureMap>,
    /// Attributes of the subject features are evaluated for.
    pub attributes: Value,
    /// Experiment key to variation index overrides.
    pub forced_variations: Option<HashMap<String, usize>>,
    /// When `false`, every experiment returns its control variation.
    pub enabled: bool,
    /// When `true`, subjects are never bucketed into experiments unless forced.
    pub qa_mode: bool,
    /// Invoked by the evaluator on experiment exposure.
    pub tracking_callback: Arc<dyn TrackingCallback>,
}

impl Context {
    /// Create an enabled context without features.
    pub fn new(endpoint: Option<String>, attributes: Value) -> Context {
        Context {
            endpoint,
            features: Arc::new(FeatureMap::new()),
            attributes,
            forced_variations: None,
            enabled: true,
            qa_mode: false,
            tracking_callback: Arc::new(NoopTrackingCallback),
        }
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("endpoint", &self.endpoint)
            .field("features", &self.features)
            .field("attributes", &self.attributes)
            .field("forced_variations", &self.forced_variations)
            .field("enabled", &self.enabled)
            .field("qa_mode", &self.qa_mode)
            .finish_non_exhaustive()
    }
}
