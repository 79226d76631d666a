//! The Rust SDK for GrowthBook, an open-source feature flagging and experimentation platform.
//!
//! # Overview
//!
//! The SDK revolves around a [`GrowthBook`] client that keeps a local snapshot of feature
//! definitions and evaluates them synchronously for the subject described by the client's
//! attributes. Feature evaluation results in a [`FeatureResult`] carrying the value and how it was
//! determined.
//!
//! Features come from a remote endpoint, an explicitly supplied payload, or an encrypted payload
//! installed with [`GrowthBook::install_encrypted_features`]. The last successfully fetched payload
//! is cached on disk and used at start-up until the first refresh completes, so the client keeps
//! serving features while offline.
//!
//! A [`TrackingCallback`] should be provided to record experiment exposures in your analytics
//! pipeline.
//!
//! # Concurrency
//!
//! Any number of threads may evaluate features, refresh, or replace attributes and features at
//! the same time. Reads always observe a complete snapshot produced by a single payload.
//!
//! # Error Handling
//!
//! Errors are represented by the [`Error`] enum. A failed refresh never clears the features
//! currently in effect: the client favors serving stale features over serving none.
//!
//! # Logging
//!
//! The package uses the [`log`](https://docs.rs/log/latest/log/) crate for logging messages, with
//! the `growthbook` target. Consider integrating a `log`-compatible logger implementation for
//! better visibility into SDK operations.

#![warn(rustdoc::missing_crate_level_docs)]

mod access;
mod cache;
mod client;
pub mod codec;
mod conditions;
mod config;
mod context;
mod decrypt;
mod error;
mod eval;
mod features;
mod fetcher;
mod refresh;
mod sharder;
mod tracking;

pub use cache::{FeatureCache, FileCache, MemoryCache, FEATURE_CACHE_KEY};
pub use client::GrowthBook;
pub use conditions::Condition;
pub use config::GrowthBookConfig;
pub use context::Context;
pub use decrypt::{decrypt_features, AesCbcDecryptor, DecryptError, Decryptor};
pub use error::{Error, Result};
pub use eval::{DefaultEvaluator, Evaluator};
pub use features::{
    Experiment, ExperimentResult, Feature, FeatureMap, FeatureResult, FeatureRule, FeatureSource,
};
pub use fetcher::{FeatureFetcher, HttpFetcher};
pub use sharder::{Md5Sharder, Sharder};
pub use tracking::TrackingCallback;
