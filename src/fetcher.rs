//! Transport used to download feature payloads.
use reqwest::Url;

use crate::{Error, Result};

/// Performs one request against the features endpoint and returns the raw response body.
///
/// Implement this to route requests through your own HTTP stack, or to serve payloads from
/// somewhere other than the network. Transport-level timeouts and retries are the fetcher's
/// concern.
pub trait FeatureFetcher: Send + Sync {
    fn fetch(&self, endpoint: &str) -> Result<Vec<u8>>;
}

impl<T: Fn(&str) -> Result<Vec<u8>> + Send + Sync> FeatureFetcher for T {
    fn fetch(&self, endpoint: &str) -> Result<Vec<u8>> {
        self(endpoint)
    }
}

/// Default fetcher issuing a blocking `GET` with reqwest.
pub struct HttpFetcher {
    // Client holds a connection pool internally, so we're reusing the client between requests.
    client: reqwest::blocking::Client,
}

impl HttpFetcher {
    pub fn new() -> HttpFetcher {
        HttpFetcher::with_client(reqwest::blocking::Client::new())
    }

    /// Use a preconfigured client (proxies, timeouts, TLS settings, ...).
    pub fn with_client(client: reqwest::blocking::Client) -> HttpFetcher {
        HttpFetcher { client }
    }
}

impl Default for HttpFetcher {
    fn default() -> HttpFetcher {
        HttpFetcher::new()
    }
}

impl FeatureFetcher for HttpFetcher {
    fn fetch(&self, endpoint: &str) -> Result<Vec<u8>> {
        let url = Url::parse(endpoint).map_err(Error::InvalidEndpoint)?;

        log::debug!(target: "growthbook", endpoint; "fetching features");
        let response = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()?;

        let response = response.error_for_status().map_err(|err| {
            log::warn!(target: "growthbook", endpoint; "received non-200 response while fetching features: {:?}", err.status());
            Error::from(err)
        })?;

        Ok(response.bytes()?.to_vec())
    }
}
