use std::sync::Arc;

use serde_json::Value;

use crate::{
    access::AccessController,
    cache::FileCache,
    codec::decode_features,
    decrypt::{decrypt_features, DecryptError},
    refresh::RefreshPipeline,
    Context, Decryptor, Evaluator, Experiment, ExperimentResult, FeatureMap, FeatureResult,
    GrowthBookConfig, HttpFetcher, Result,
};

/// A GrowthBook client.
///
/// The client keeps a snapshot of the feature definitions and evaluates them synchronously. It is
/// cheap to clone and safe to share between threads: clones share the same snapshot.
///
/// In order to create a client instance, first create [`GrowthBookConfig`].
///
/// # Examples
/// ```no_run
/// # use growthbook::GrowthBookConfig;
/// let gb = GrowthBookConfig::from_endpoint("https://cdn.growthbook.io/api/features/key")
///     .to_client()
///     .unwrap();
///
/// if gb.is_on("new-checkout") {
///     // ...
/// }
/// ```
#[derive(Clone)]
pub struct GrowthBook {
    inner: Arc<Inner>,
}

struct Inner {
    controller: AccessController,
    pipeline: RefreshPipeline,
    decryptor: Arc<dyn Decryptor>,
    evaluator: Arc<dyn Evaluator>,
}

impl GrowthBook {
    /// Create a new client using the specified configuration.
    ///
    /// With an explicit features payload, the payload is installed and neither the cache nor the
    /// network is consulted. Otherwise the cached payload (if any) is installed right away and a
    /// refresh is started in the background; the refresh result always supersedes the cached one.
    pub fn new(config: GrowthBookConfig) -> Result<GrowthBook> {
        if let Some(level) = config.log_level {
            log::set_max_level(level);
        }

        let mut context = Context::new(config.endpoint.clone(), config.attributes);
        context.tracking_callback = config.tracking_callback;
        context.enabled = config.enabled;
        context.qa_mode = config.qa_mode;
        context.forced_variations = config.forced_variations;

        let pipeline = RefreshPipeline::new(
            config.endpoint,
            config
                .fetcher
                .unwrap_or_else(|| Arc::new(HttpFetcher::new())),
            config
                .cache
                .unwrap_or_else(|| Arc::new(FileCache::in_default_location())),
        );

        let explicit = config.features.is_some();
        if let Some(payload) = config.features {
            match decode_features(&payload) {
                Ok(features) => context.features = Arc::new(features),
                Err(err) => {
                    log::warn!(target: "growthbook", "failed to parse provided features: {:?}", err);
                }
            }
        } else if let Ok(features) = pipeline.load_from_cache() {
            // Seeding the initial context, before the refresh below is even started, keeps the
            // cached payload from overwriting a fresher network result.
            log::debug!(target: "growthbook", "using {} cached features", features.len());
            context.features = Arc::new(features);
        }

        let gb = GrowthBook {
            inner: Arc::new(Inner {
                controller: AccessController::new(context)?,
                pipeline,
                decryptor: config.decryptor,
                evaluator: config.evaluator,
            }),
        };

        if !explicit {
            let handler = config.on_initial_refresh;
            gb.refresh_with_result(move |result| {
                if let Some(handler) = handler {
                    handler(result.is_ok());
                }
            });
        }

        Ok(gb)
    }

    /// Fetch features in the background. `completion` receives `true` once the new features are
    /// in effect, or `false` if the refresh failed (the current features are kept).
    pub fn refresh(&self, completion: impl FnOnce(bool) + Send + 'static) {
        self.refresh_with_result(move |result| completion(result.is_ok()));
    }

    /// Same as [`GrowthBook::refresh`] but reports why a refresh failed.
    pub fn refresh_with_result(&self, completion: impl FnOnce(Result<()>) + Send + 'static) {
        let inner = Arc::clone(&self.inner);
        let (completion_sender, completion_receiver) = std::sync::mpsc::sync_channel(1);
        let spawned = std::thread::Builder::new()
            .name("growthbook-refresh".to_owned())
            .spawn(move || {
                // Blocks until the spawning thread decides who owns the completion.
                if let Ok(completion) = completion_receiver.recv() {
                    inner.pipeline.refresh(&inner.controller, completion);
                }
            });

        match spawned {
            Ok(_) => {
                let _ = completion_sender.send(completion);
            }
            Err(err) => {
                log::warn!(target: "growthbook", "failed to start refresh thread: {:?}", err);
                let err = crate::Error::from(err);
                self.inner.controller.then(move || completion(Err(err)));
            }
        }
    }

    /// Fetch features on the current thread and wait for them to take effect.
    ///
    /// # Errors
    ///
    /// Returns the reason the refresh failed. The current features are kept in that case.
    pub fn refresh_blocking(&self) -> Result<()> {
        self.inner.pipeline.refresh_blocking(&self.inner.controller)
    }

    /// Get a snapshot of the whole context.
    pub fn get_context(&self) -> Arc<Context> {
        self.inner.controller.snapshot()
    }

    /// Get the features currently in effect.
    pub fn get_features(&self) -> Arc<FeatureMap> {
        self.inner.controller.read(|ctx| Arc::clone(&ctx.features))
    }

    /// Get the value of the feature, or `default` if it evaluates to `null` or is unknown.
    pub fn get_feature_value(&self, key: &str, default: Value) -> Value {
        match self.eval_feature(key).value {
            Value::Null => default,
            value => value,
        }
    }

    /// Evaluate the feature with the given key.
    pub fn eval_feature(&self, key: &str) -> FeatureResult {
        self.inner
            .controller
            .read(|ctx| self.inner.evaluator.evaluate_feature(ctx, key))
    }

    /// Whether the feature with the given key is on.
    pub fn is_on(&self, key: &str) -> bool {
        self.eval_feature(key).is_on()
    }

    /// Whether the feature with the given key is off.
    pub fn is_off(&self, key: &str) -> bool {
        self.eval_feature(key).is_off()
    }

    /// Run an experiment against the current attributes.
    pub fn run(&self, experiment: &Experiment) -> ExperimentResult {
        self.inner
            .controller
            .read(|ctx| self.inner.evaluator.evaluate_experiment(ctx, experiment))
    }

    /// Replace the attributes used for evaluation.
    pub fn set_attributes(&self, attributes: Value) {
        self.inner
            .controller
            .write(move |ctx| ctx.attributes = attributes);
    }

    /// Decrypt an encrypted features payload and install it in place of the current features.
    ///
    /// A malformed token or key, or a payload that fails to decrypt, is ignored: the current
    /// features stay in effect and nothing is reported. Use
    /// [`GrowthBook::try_install_encrypted_features`] to learn why an install failed.
    pub fn install_encrypted_features(&self, token: &str, key: &str) {
        self.install_encrypted_features_with(token, key, &*self.inner.decryptor);
    }

    /// Same as [`GrowthBook::install_encrypted_features`] with a specific decrypt primitive.
    pub fn install_encrypted_features_with(&self, token: &str, key: &str, decryptor: &dyn Decryptor) {
        if let Err(err) = self.install(token, key, decryptor) {
            log::debug!(target: "growthbook", "ignoring encrypted features: {}", err);
        }
    }

    /// Same as [`GrowthBook::install_encrypted_features`] but reports failures.
    ///
    /// # Errors
    ///
    /// Returns why the payload could not be installed. The current features are kept in that case.
    pub fn try_install_encrypted_features(
        &self,
        token: &str,
        key: &str,
    ) -> std::result::Result<(), DecryptError> {
        self.install(token, key, &*self.inner.decryptor)
    }

    fn install(
        &self,
        token: &str,
        key: &str,
        decryptor: &dyn Decryptor,
    ) -> std::result::Result<(), DecryptError> {
        let features = Arc::new(decrypt_features(token, key, decryptor)?);
        // Decrypted payloads are never cached; only plain payloads are.
        self.inner
            .controller
            .write(move |ctx| ctx.features = features);
        Ok(())
    }
}
