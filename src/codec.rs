//! Decoding of feature payloads.
//!
//! The features endpoint (and the local cache) hold an envelope of the form
//! `{"features": {"<key>": <feature>, ...}, ...}`. Decrypted payloads hold the bare map.
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::FeatureMap;

/// Error decoding a feature payload.
#[derive(thiserror::Error, Debug, Clone)]
pub enum DecodeError {
    /// The payload is not valid JSON or does not match the feature schema.
    #[error("invalid features json")]
    Json(#[source] Arc<serde_json::Error>),
    /// The payload is valid JSON but carries no `features` map.
    #[error("payload has no features")]
    MissingFeatures,
}

impl From<serde_json::Error> for DecodeError {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(Arc::new(value))
    }
}

// serde_json::Error has no PartialEq, so errors compare by variant.
impl PartialEq for DecodeError {
    fn eq(&self, other: &Self) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct FeaturesEnvelope {
    #[serde(default)]
    features: Option<FeatureMap>,
}

/// Decode an endpoint payload into a feature map.
pub fn decode_features(bytes: &[u8]) -> Result<FeatureMap, DecodeError> {
    let envelope: FeaturesEnvelope = serde_json::from_slice(bytes)?;
    envelope.features.ok_or(DecodeError::MissingFeatures)
}

/// Decode a bare `{"<key>": <feature>}` map, as found in decrypted payloads.
pub fn decode_feature_map(bytes: &[u8]) -> Result<FeatureMap, DecodeError> {
    Ok(serde_json::from_slice(bytes)?)
}

/// Encode a feature map into an endpoint payload. Inverse of [`decode_features`].
pub fn encode_features(features: &FeatureMap) -> Vec<u8> {
    #[derive(Serialize)]
    struct Envelope<'a> {
        features: &'a FeatureMap,
    }
    // Serializing a map with string keys and JSON values cannot fail.
    serde_json::to_vec(&Envelope { features }).unwrap_or_default()
}
