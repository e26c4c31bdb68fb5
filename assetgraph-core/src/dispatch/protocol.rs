//! Worker Wire Protocol
//!
//! Messages exchanged with an offloaded worker. Both directions are encoded
//! as MessagePack with named fields, so the worker never shares memory with
//! the dispatcher.

use serde::{Deserialize, Serialize};

use super::request::{ComputationRequest, ComputationResult, RequestKind};
use crate::error::WorkerFault;

/// `{type, id, payload}` request frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestEnvelope {
    #[serde(rename = "type")]
    pub kind: RequestKind,
    pub id: u64,
    pub payload: ComputationRequest,
}

impl RequestEnvelope {
    pub fn new(id: u64, payload: ComputationRequest) -> Self {
        Self {
            kind: payload.kind(),
            id,
            payload,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, WorkerFault> {
        Ok(rmp_serde::to_vec_named(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, WorkerFault> {
        Ok(rmp_serde::from_slice(bytes)?)
    }
}

/// Just enough of a request frame to answer it when the payload is
/// unreadable.
#[derive(Debug, Deserialize)]
pub(crate) struct EnvelopeHeader {
    pub id: u64,
}

impl EnvelopeHeader {
    pub fn decode(bytes: &[u8]) -> Result<Self, WorkerFault> {
        Ok(rmp_serde::from_slice(bytes)?)
    }
}

/// What the worker sends back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponsePayload {
    Result(ComputationResult),
    /// The worker failed while handling the request.
    Error(String),
}

/// `{id, payload}` response frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub id: u64,
    pub payload: ResponsePayload,
}

impl ResponseEnvelope {
    pub fn error(id: u64, message: impl Into<String>) -> Self {
        Self {
            id,
            payload: ResponsePayload::Error(message.into()),
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, WorkerFault> {
        Ok(rmp_serde::to_vec_named(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, WorkerFault> {
        Ok(rmp_serde::from_slice(bytes)?)
    }

    /// Unwrap the payload, turning a reported error into a fault.
    pub fn into_result(self) -> Result<ComputationResult, WorkerFault> {
        match self.payload {
            ResponsePayload::Result(result) => Ok(result),
            ResponsePayload::Error(message) => Err(WorkerFault::Reported(message)),
        }
    }
}

/// Handle one request frame. Shared by every execution strategy.
pub(crate) fn respond(request: RequestEnvelope) -> ResponseEnvelope {
    let RequestEnvelope { id, payload, .. } = request;
    guarded(id, move || payload.execute())
}

/// Run `compute` for request `id`. A panic is caught and reported as an
/// error response.
pub(crate) fn guarded<F>(id: u64, compute: F) -> ResponseEnvelope
where
    F: FnOnce() -> ComputationResult,
{
    match std::panic::catch_unwind(std::panic::AssertUnwindSafe(compute)) {
        Ok(result) => ResponseEnvelope {
            id,
            payload: ResponsePayload::Result(result),
        },
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "computation panicked".to_string());
            ResponseEnvelope::error(id, message)
        }
    }
}
