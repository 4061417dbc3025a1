//! Error types for the ingestion pipeline.
//!
//! None of these abort a batch: the orchestrator turns every error into a
//! logged diagnostic and carries on with the remaining inputs.

use std::path::PathBuf;

use thiserror::Error;

/// A single input could not be read or decoded.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse GPX file: {0}")]
    Gpx(String),
    #[error("failed to parse FIT file: {0}")]
    Fit(String),
    #[error("failed to query activity database: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("invalid start time for run {run_id}: {value}")]
    StartTime { run_id: String, value: String },
}

/// The cache directory or one of its entries is unusable.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("cache I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cache entry {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// No parser handles the file's extension.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unsupported file type: {0}")]
pub struct SchemaError(pub PathBuf);
