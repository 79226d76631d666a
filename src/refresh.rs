//! The fetch, decode, cache and install sequence that keeps the feature snapshot fresh.
use std::sync::Arc;

use crate::{
    access::AccessController,
    cache::{FeatureCache, FEATURE_CACHE_KEY},
    codec::decode_features,
    Error, FeatureFetcher, FeatureMap, Result,
};

/// Orchestrates [`FeatureFetcher`], payload decoding, the [`FeatureCache`] and installation into
/// the shared context.
///
/// Failures never touch the context: the previous snapshot stays authoritative.
pub(crate) struct RefreshPipeline {
    endpoint: Option<String>,
    fetcher: Arc<dyn FeatureFetcher>,
    cache: Arc<dyn FeatureCache>,
}

impl RefreshPipeline {
    pub fn new(
        endpoint: Option<String>,
        fetcher: Arc<dyn FeatureFetcher>,
        cache: Arc<dyn FeatureCache>,
    ) -> RefreshPipeline {
        RefreshPipeline {
            endpoint,
            fetcher,
            cache,
        }
    }

    /// Fetch and decode the remote payload, persisting the raw bytes once they are known to decode.
    pub fn fetch(&self) -> Result<FeatureMap> {
        let endpoint = self.endpoint.as_deref().ok_or(Error::MissingEndpoint)?;

        let bytes = self.fetcher.fetch(endpoint).inspect_err(|err| {
            log::warn!(target: "growthbook", endpoint; "error while fetching features: {:?}", err);
        })?;

        let features = decode_features(&bytes).map_err(|err| {
            log::warn!(target: "growthbook", endpoint; "failed to parse features response body: {:?}", err);
            Error::MalformedPayload(err)
        })?;

        self.cache.put(FEATURE_CACHE_KEY, &bytes);

        log::debug!(target: "growthbook", endpoint; "successfully fetched {} features", features.len());
        Ok(features)
    }

    /// Run the pipeline and queue installation of the result into `controller`.
    ///
    /// `completion` is called exactly once: after the new features have committed, or, on
    /// failure, after every write queued before the failure was noticed.
    pub fn refresh(
        &self,
        controller: &AccessController,
        completion: impl FnOnce(Result<()>) + Send + 'static,
    ) {
        match self.fetch() {
            Ok(features) => {
                let features = Arc::new(features);
                controller.write_and_then(
                    move |ctx| ctx.features = features,
                    move || completion(Ok(())),
                );
            }
            Err(err) => controller.then(move || completion(Err(err))),
        }
    }

    /// Same as [`RefreshPipeline::refresh`] but blocks until the new features have committed.
    pub fn refresh_blocking(&self, controller: &AccessController) -> Result<()> {
        let features = Arc::new(self.fetch()?);
        controller.write_and_wait(move |ctx| ctx.features = features);
        Ok(())
    }

    /// Read the last successfully fetched payload from the cache. Never touches the network.
    pub fn load_from_cache(&self) -> Result<FeatureMap> {
        let bytes = self.cache.get(FEATURE_CACHE_KEY).ok_or_else(|| {
            log::debug!(target: "growthbook", "no cached features");
            Error::NoLocalData
        })?;

        decode_features(&bytes).map_err(|err| {
            log::warn!(target: "growthbook", "failed to parse cached features: {:?}", err);
            Error::MalformedLocalData(err)
        })
    }
}
