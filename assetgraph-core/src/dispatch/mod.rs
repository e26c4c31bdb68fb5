//! Asynchronous Computation Dispatch
//!
//! Graph builds and selections can take a while on large asset sets, so
//! they run behind a dispatcher that keeps the consumer responsive.
//!
//! # Overview
//!
//! - [`ComputationRequest`] is the tagged request: build a graph index, or
//!   scope, annotate and filter a node list.
//! - [`GraphComputer`] is where requests run. [`InlineComputer`] computes in
//!   the calling thread; [`WorkerComputer`] ships MessagePack frames to a
//!   dedicated thread.
//! - [`ResultCache`] memoizes results by the canonical JSON form of the
//!   request.
//! - [`Dispatcher`] ties them together and drops responses that were
//!   overtaken by a newer request.
//!
//! # Example
//!
//! ```rust,ignore
//! let dispatcher = Dispatcher::inline();
//! let outcome = dispatcher
//!     .select(SelectionRequest::new(nodes, "orders+"))
//!     .await;
//!
//! if let Outcome::Delivered(result) = outcome {
//!     println!("{:?}", result.as_selection().map(|s| s.matched()));
//! }
//! ```

mod cache;
mod computer;
mod dispatcher;
mod protocol;
mod request;
mod worker;

pub use cache::{CacheStats, ResultCache};
pub use computer::{ComputeFuture, GraphComputer, InlineComputer};
pub use dispatcher::{Dispatcher, Observed, Outcome};
pub use protocol::{RequestEnvelope, ResponseEnvelope, ResponsePayload};
pub use request::{ComputationRequest, ComputationResult, RequestKind, SelectionRequest, SelectionResult};
pub use worker::WorkerComputer;
