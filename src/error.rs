use std::sync::Arc;

use crate::codec::DecodeError;

/// Represents a result type for operations in the GrowthBook SDK.
pub type Result<T> = std::result::Result<T, Error>;

/// Enum representing possible errors that can occur while refreshing or loading features.
///
/// None of these errors ever clear the features currently in effect. A failed refresh leaves the
/// previous snapshot authoritative.
#[derive(thiserror::Error, Debug, Clone)]
#[non_exhaustive]
pub enum Error {
    /// A refresh was requested but the client was configured without an endpoint.
    #[error("no features endpoint configured")]
    MissingEndpoint,

    /// The configured endpoint is not a valid URL.
    #[error("invalid endpoint configuration")]
    InvalidEndpoint(#[source] url::ParseError),

    /// The remote fetch failed (network error, non-2xx response, etc.).
    #[error("failed to fetch features")]
    TransportFailure(#[source] Arc<dyn std::error::Error + Send + Sync>),

    /// The remote payload could not be decoded.
    #[error("malformed features payload")]
    MalformedPayload(#[source] DecodeError),

    /// Nothing is stored in the local cache.
    #[error("no cached features available")]
    NoLocalData,

    /// The local cache holds a payload that could not be decoded.
    #[error("malformed cached features payload")]
    MalformedLocalData(#[source] DecodeError),

    /// An I/O error.
    #[error(transparent)]
    // std::io::Error is not clonable, so we're wrapping it in an Arc.
    Io(Arc<std::io::Error>),
}

impl Error {
    /// Wrap an arbitrary transport error.
    pub fn transport(err: impl std::error::Error + Send + Sync + 'static) -> Error {
        Error::TransportFailure(Arc::new(err))
    }
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::Io(Arc::new(value))
    }
}

impl From<reqwest::Error> for Error {
    fn from(value: reqwest::Error) -> Self {
        Error::transport(value.without_url())
    }
}
