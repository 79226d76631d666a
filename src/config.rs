use std::{collections::HashMap, sync::Arc};

use log::LevelFilter;
use serde_json::Value;

use crate::{
    tracking::NoopTrackingCallback, AesCbcDecryptor, DefaultEvaluator, Decryptor, Evaluator,
    FeatureCache, FeatureFetcher, GrowthBook, Result, TrackingCallback,
};

pub(crate) type RefreshHandler = Box<dyn FnOnce(bool) + Send>;

/// Configuration for [`GrowthBook`].
///
/// A client needs a source of features: an endpoint to fetch them from, an explicit payload, or
/// both. When a payload is supplied it is installed directly and the endpoint is only used by
/// later [`GrowthBook::refresh`] calls.
///
/// ```
/// # use growthbook::GrowthBookConfig;
/// # use serde_json::json;
/// let config = GrowthBookConfig::from_endpoint("https://cdn.growthbook.io/api/features/key")
///     .attributes(json!({"id": "user-1"}))
///     .qa_mode(true);
/// ```
pub struct GrowthBookConfig {
    pub(crate) endpoint: Option<String>,
    pub(crate) features: Option<Vec<u8>>,
    pub(crate) attributes: Value,
    pub(crate) tracking_callback: Arc<dyn TrackingCallback>,
    pub(crate) enabled: bool,
    pub(crate) qa_mode: bool,
    pub(crate) forced_variations: Option<HashMap<String, usize>>,
    pub(crate) log_level: Option<LevelFilter>,
    pub(crate) fetcher: Option<Arc<dyn FeatureFetcher>>,
    pub(crate) cache: Option<Arc<dyn FeatureCache>>,
    pub(crate) decryptor: Arc<dyn Decryptor>,
    pub(crate) evaluator: Arc<dyn Evaluator>,
    pub(crate) on_initial_refresh: Option<RefreshHandler>,
}

impl GrowthBookConfig {
    /// Create a configuration with an optional endpoint and an optional explicit features payload
    /// (`{"features": {...}}`).
    pub fn new(endpoint: Option<String>, features: Option<Vec<u8>>) -> GrowthBookConfig {
        GrowthBookConfig {
            endpoint,
            features,
            attributes: Value::Object(Default::default()),
            tracking_callback: Arc::new(NoopTrackingCallback),
            enabled: true,
            qa_mode: false,
            forced_variations: None,
            log_level: None,
            fetcher: None,
            cache: None,
            decryptor: Arc::new(AesCbcDecryptor),
            evaluator: Arc::new(DefaultEvaluator::new()),
            on_initial_refresh: None,
        }
    }

    /// Fetch features from `endpoint`.
    pub fn from_endpoint(endpoint: impl Into<String>) -> GrowthBookConfig {
        GrowthBookConfig::new(Some(endpoint.into()), None)
    }

    /// Use an explicit features payload instead of fetching one.
    pub fn from_features(features: impl Into<Vec<u8>>) -> GrowthBookConfig {
        GrowthBookConfig::new(None, Some(features.into()))
    }

    /// Attributes of the subject features are evaluated for. Defaults to `{}`.
    pub fn attributes(mut self, attributes: Value) -> GrowthBookConfig {
        self.attributes = attributes;
        self
    }

    /// Callback invoked when a subject is bucketed into an experiment.
    ///
    /// ```
    /// # use growthbook::{Experiment, ExperimentResult, GrowthBookConfig};
    /// let config = GrowthBookConfig::from_endpoint("https://host/api/features/key")
    ///     .tracking_callback(|experiment: &Experiment, result: &ExperimentResult| {
    ///         println!("{} -> {}", experiment.key, result.variation_id);
    ///     });
    /// ```
    pub fn tracking_callback(
        mut self,
        tracking_callback: impl TrackingCallback + 'static,
    ) -> GrowthBookConfig {
        self.tracking_callback = Arc::new(tracking_callback);
        self
    }

    /// Switch experiments on or off. Defaults to `true`.
    pub fn enabled(mut self, enabled: bool) -> GrowthBookConfig {
        self.enabled = enabled;
        self
    }

    /// In QA mode subjects are never bucketed into experiments. Defaults to `false`.
    pub fn qa_mode(mut self, qa_mode: bool) -> GrowthBookConfig {
        self.qa_mode = qa_mode;
        self
    }

    /// Force experiments (by key) to a variation index.
    pub fn forced_variations(mut self, forced_variations: HashMap<String, usize>) -> GrowthBookConfig {
        self.forced_variations = Some(forced_variations);
        self
    }

    /// Set the maximum log level. Note that `log` levels are process-wide.
    pub fn log_level(mut self, level: LevelFilter) -> GrowthBookConfig {
        self.log_level = Some(level);
        self
    }

    /// Override the transport. Defaults to [`HttpFetcher`](crate::HttpFetcher).
    pub fn fetcher(mut self, fetcher: impl FeatureFetcher + 'static) -> GrowthBookConfig {
        self.fetcher = Some(Arc::new(fetcher));
        self
    }

    /// Override the payload cache. Defaults to a [`FileCache`](crate::FileCache) in the platform
    /// cache directory.
    pub fn cache(mut self, cache: Arc<dyn FeatureCache>) -> GrowthBookConfig {
        self.cache = Some(cache);
        self
    }

    /// Override the decrypt primitive used for encrypted payloads. Defaults to
    /// [`AesCbcDecryptor`].
    pub fn decryptor(mut self, decryptor: impl Decryptor + 'static) -> GrowthBookConfig {
        self.decryptor = Arc::new(decryptor);
        self
    }

    /// Override the evaluation engine. Defaults to [`DefaultEvaluator`].
    pub fn evaluator(mut self, evaluator: impl Evaluator + 'static) -> GrowthBookConfig {
        self.evaluator = Arc::new(evaluator);
        self
    }

    /// Called once the refresh started at construction completes, with its success flag. Not
    /// called when the client is built from an explicit payload.
    pub fn on_initial_refresh(
        mut self,
        handler: impl FnOnce(bool) + Send + 'static,
    ) -> GrowthBookConfig {
        self.on_initial_refresh = Some(Box::new(handler));
        self
    }

    /// Create a new [`GrowthBook`] client using this configuration.
    ///
    /// # Errors
    ///
    /// Returns an IO error if the client's worker threads failed to start.
    pub fn to_client(self) -> Result<GrowthBook> {
        GrowthBook::new(self)
    }
}
