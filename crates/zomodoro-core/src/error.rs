//! Core error types for zomodoro-core.
//!
//! This module defines the error hierarchy using thiserror. Most failure
//! paths in the core degrade instead of propagating (corrupt saves fall back
//! to defaults, failed asset loads fall back to generated noise), so these
//! types mostly surface at API boundaries and in logs.

use std::path::PathBuf;
use thiserror::Error;

use crate::sound::NodeId;

/// Core error type for zomodoro-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Sound engine errors
    #[error("Sound error: {0}")]
    Sound(#[from] SoundError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic errors with context
    #[error("{0}")]
    Custom(String),
}

/// Database-specific errors.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Failed to open database connection
    #[error("Failed to open database at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Database is locked
    #[error("Database is locked")]
    Locked,
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Key does not name a setting
    #[error("unknown config key: {0}")]
    UnknownKey(String),

    /// Failed to parse configuration
    #[error("Failed to parse configuration: {0}")]
    ParseFailed(String),
}

/// Validation errors.
#[derive(Error, Debug)]
pub enum ValidationError {
    /// Empty value where content is required
    #[error("'{field}' must not be empty")]
    Empty { field: String },

    /// Lookup by id found nothing
    #[error("no {kind} with id '{id}'")]
    NotFound { kind: String, id: String },

    /// Invalid value
    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },
}

/// Errors returned by the ambient sound engine.
#[derive(Error, Debug)]
pub enum SoundError {
    /// No track with this name is registered
    #[error("unknown sound '{0}'")]
    UnknownSound(String),

    /// The audio backend refused to build the graph for a track
    #[error("audio graph error for '{name}': {source}")]
    Graph {
        name: String,
        #[source]
        source: AudioError,
    },

    /// Engine setup failed
    #[error("audio backend unavailable: {0}")]
    Unavailable(#[from] AudioError),
}

/// Errors raised by an [`AudioBackend`](crate::sound::AudioBackend).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AudioError {
    #[error("node {0:?} does not exist")]
    UnknownNode(NodeId),

    #[error("node {0:?} cannot be used this way")]
    InvalidNode(NodeId),

    #[error("node {0:?} was already stopped")]
    AlreadyStopped(NodeId),

    #[error("decode failed: {0}")]
    Decode(String),

    #[error("{0}")]
    Backend(String),
}

/// Why a remote asset could not be used. These are expected, ordinary
/// outcomes; the engine logs them and falls back to generated audio.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LoadError {
    #[error("server answered with status {0}")]
    Status(u16),

    #[error("network error: {0}")]
    Network(String),

    #[error("fetch timed out after {timeout_secs}s")]
    FetchTimeout { timeout_secs: u64 },

    #[error("decode timed out after {timeout_secs}s")]
    DecodeTimeout { timeout_secs: u64 },

    #[error(transparent)]
    Decode(#[from] AudioError),

    #[error("load task failed: {0}")]
    Task(String),
}

// Helper implementations for converting from other error types

impl From<rusqlite::Error> for DatabaseError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(err, _msg) => {
                if err.code == rusqlite::ErrorCode::DatabaseLocked {
                    DatabaseError::Locked
                } else {
                    DatabaseError::QueryFailed(err.to_string())
                }
            }
            _ => DatabaseError::QueryFailed(err.to_string()),
        }
    }
}

impl From<rusqlite::Error> for CoreError {
    fn from(err: rusqlite::Error) -> Self {
        CoreError::Database(err.into())
    }
}

impl From<reqwest::Error> for LoadError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LoadError::FetchTimeout {
                timeout_secs: crate::sound::FETCH_TIMEOUT.as_secs(),
            }
        } else if let Some(status) = err.status() {
            LoadError::Status(status.as_u16())
        } else {
            LoadError::Network(err.to_string())
        }
    }
}

impl From<Box<dyn std::error::Error + Send + Sync>> for CoreError {
    fn from(err: Box<dyn std::error::Error + Send + Sync>) -> Self {
        CoreError::Custom(err.to_string())
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
