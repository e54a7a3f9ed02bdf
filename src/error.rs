use std::path::PathBuf;
use thiserror::Error;

use crate::model::RequestStatus;

/// Errors raised by a record store implementation
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("No record '{id}' in collection '{collection}'")]
    NotFound {
        collection: &'static str,
        id: String,
    },

    #[error("Conflicting write to '{collection}/{id}': {reason}")]
    Conflict {
        collection: &'static str,
        id: String,
        reason: String,
    },

    #[error("I/O error on record file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse record JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to serialize record: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Record store lock was poisoned")]
    Poisoned,
}

/// Errors that can occur when assembling a show's feed
#[derive(Error, Debug)]
pub enum FeedError {
    #[error("Show '{show_id}' not found")]
    NotFound { show_id: String },

    #[error("Record store error: {0}")]
    Store(#[from] StoreError),
}

/// A single episode that could not be rendered into the feed.
///
/// These never abort a feed render; the item is left out and the defect is
/// reported alongside the document.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RenderDefect {
    #[error("Episode '{title}' ({episode_id}) has no audio file")]
    MissingAudio { episode_id: String, title: String },

    #[error("Episode {episode_id} has an unusable audio file reference '{file}'")]
    InvalidAudioReference { episode_id: String, file: String },

    #[error("Server base URL '{base}' cannot carry a file path")]
    UnroutableBase { base: String },
}

/// Errors raised by the external generation worker
#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Generation request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Generation service returned HTTP {status} for {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("Generation service at {url} returned an unreadable show: {source}")]
    InvalidResponse {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to encode generation job: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Reasons a claimed request could not be turned into a published show.
///
/// The display text is persisted as the request's failure reason.
#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("{0}")]
    Validation(String),

    #[error("generation worker failed: {0}")]
    Worker(#[from] WorkerError),

    #[error("failed to store generated show: {0}")]
    Store(#[from] StoreError),
}

/// Errors surfaced by the request lifecycle manager
#[derive(Error, Debug)]
pub enum LifecycleError {
    #[error("Show request '{id}' not found")]
    NotFound { id: String },

    #[error("Show request '{id}' cannot be claimed while {status}")]
    AlreadyClaimed { id: String, status: RequestStatus },

    #[error("Lease on show request '{id}' was lost to another worker")]
    LeaseLost { id: String },

    #[error("Show request '{id}' cannot be re-queued while {status}")]
    NotRequeueable { id: String, status: RequestStatus },

    #[error("Show request '{id}' gave up after {attempts} attempts")]
    AttemptsExhausted { id: String, attempts: u32 },

    #[error("Record store error: {0}")]
    Store(#[from] StoreError),
}

/// Errors that can occur while loading settings
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    ParseFailed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Server base URL '{0}' cannot carry a file path")]
    UnroutableBase(String),

    #[error("Invalid setting {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}
