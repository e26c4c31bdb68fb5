//! Error Types
//!
//! Only [`QuerySyntaxError`] is meant to reach an end user. Everything else
//! is either recovered inside the dispatcher (worker faults degrade to an
//! empty result) or reported by an opt-in API (strict builds, configuration).

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A selector string could not be parsed.
///
/// This is a value, not a panic: it is carried back across the worker
/// boundary inside a selection result and the caller decides whether to
/// show zero results or a validation message.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("invalid selector `{fragment}` at offset {position}: {reason}")]
pub struct QuerySyntaxError {
    /// The clause that failed to parse, as written by the user.
    pub fragment: String,
    /// Byte offset of the clause within the full query.
    pub position: usize,
    /// Short human-readable explanation.
    pub reason: String,
}

impl QuerySyntaxError {
    pub(crate) fn new(fragment: &str, position: usize, reason: impl Into<String>) -> Self {
        Self {
            fragment: fragment.to_string(),
            position,
            reason: reason.into(),
        }
    }
}

/// Failure of a strict graph build.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    /// Two input descriptors share a token.
    #[error("duplicate node token `{token}`")]
    DuplicateNode { token: String },
}

/// The offloaded execution context failed to produce a response.
///
/// A fault is never fatal for the consumer: the dispatcher logs it and
/// resolves the request with an empty result.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkerFault {
    /// The worker was told to terminate while the request was outstanding.
    #[error("worker terminated before responding")]
    Terminated,

    /// The worker stopped without being asked to.
    #[error("worker exited unexpectedly")]
    Crashed,

    /// The worker caught a failure while computing and reported it.
    #[error("worker reported an error: {0}")]
    Reported(String),

    /// A message could not be encoded or decoded.
    #[error("worker message codec failure: {0}")]
    Codec(String),
}

impl From<rmp_serde::encode::Error> for WorkerFault {
    fn from(err: rmp_serde::encode::Error) -> Self {
        WorkerFault::Codec(err.to_string())
    }
}

impl From<rmp_serde::decode::Error> for WorkerFault {
    fn from(err: rmp_serde::decode::Error) -> Self {
        WorkerFault::Codec(err.to_string())
    }
}

/// Configuration could not be loaded.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("malformed configuration: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid value `{value}` for {variable}")]
    InvalidVar { variable: &'static str, value: String },
}
