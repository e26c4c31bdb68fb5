//! Execution Strategies
//!
//! The dispatcher does not care where a computation runs. Anything that can
//! turn a request frame into a response frame implements [`GraphComputer`]:
//! the in-process [`InlineComputer`] below, or the thread-backed
//! [`WorkerComputer`](super::WorkerComputer).

use std::future::{ready, Future};
use std::pin::Pin;

use super::protocol::{respond, RequestEnvelope, ResponseEnvelope};
use crate::error::WorkerFault;

/// Future returned by [`GraphComputer::compute`].
pub type ComputeFuture = Pin<Box<dyn Future<Output = Result<ResponseEnvelope, WorkerFault>> + Send>>;

/// A place where graph computations can run.
pub trait GraphComputer: Send + Sync {
    /// Start computing `request`. The returned future resolves with the
    /// response tagged with the request's id, or with a fault.
    fn compute(&self, request: RequestEnvelope) -> ComputeFuture;

    /// Short name for logs.
    fn name(&self) -> &str;

    /// Stop accepting work. Outstanding requests resolve as terminated.
    fn shutdown(&self) {}
}

/// Runs every request synchronously on the calling thread.
///
/// The work is done before `compute` returns; the future is already
/// resolved.
#[derive(Debug, Clone, Copy, Default)]
pub struct InlineComputer;

impl GraphComputer for InlineComputer {
    fn compute(&self, request: RequestEnvelope) -> ComputeFuture {
        Box::pin(ready(Ok(respond(request))))
    }

    fn name(&self) -> &str {
        "inline"
    }
}
