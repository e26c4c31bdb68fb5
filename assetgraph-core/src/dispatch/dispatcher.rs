//! Dispatcher
//!
//! The dispatcher is the consumer-facing entry point. It numbers requests,
//! consults the result cache, hands misses to a [`GraphComputer`] and makes
//! sure the consumer only ever observes the result of its latest request.
//!
//! # How It Works
//!
//! 1. Every request takes the next id from a process-wide counter and
//!    becomes this dispatcher's latest request.
//!
//! 2. The canonical request string is looked up in the cache. A hit never
//!    touches the computer.
//!
//! 3. On a miss the computer runs the request. A fault is logged and
//!    replaced with the empty result for the request kind.
//!
//! 4. If a newer request was issued in the meantime, the result is stale and
//!    is dropped. Otherwise it is delivered and published to subscribers.
//!
//! Superseded requests are not aborted; their results still land in the
//! cache.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, warn};

use super::cache::ResultCache;
use super::computer::{GraphComputer, InlineComputer};
use super::protocol::RequestEnvelope;
use super::request::{ComputationRequest, ComputationResult, SelectionRequest};
use crate::error::WorkerFault;
use crate::graph::NodeDescriptor;

/// Counter for request ids. Ids are unique across dispatchers so several
/// consumers can share one worker.
static REQUEST_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Generate a new request id.
fn next_request_id() -> u64 {
    REQUEST_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// What became of a dispatched request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T> {
    /// The request was the latest one when it resolved.
    Delivered(T),
    /// A newer request was issued; this result was discarded.
    Stale { id: u64, latest: u64 },
}

impl<T> Outcome<T> {
    pub fn delivered(self) -> Option<T> {
        match self {
            Outcome::Delivered(value) => Some(value),
            Outcome::Stale { .. } => None,
        }
    }

    pub fn is_stale(&self) -> bool {
        matches!(self, Outcome::Stale { .. })
    }
}

/// Observed state of one consumer: the last delivered result.
pub type Observed = Option<Arc<ComputationResult>>;

/// Sequence-numbered, memoized front end over a [`GraphComputer`].
///
/// Use one dispatcher per logical consumer. Dispatchers may share a
/// computer and a cache.
pub struct Dispatcher {
    computer: Arc<dyn GraphComputer>,
    cache: Arc<ResultCache>,
    latest: AtomicU64,
    observed: watch::Sender<Observed>,
}

impl Dispatcher {
    pub fn new(computer: Arc<dyn GraphComputer>, cache: Arc<ResultCache>) -> Self {
        let (observed, _) = watch::channel(None);
        Self {
            computer,
            cache,
            latest: AtomicU64::new(0),
            observed,
        }
    }

    /// A dispatcher that computes in the calling thread with its own cache.
    pub fn inline() -> Self {
        Self::new(Arc::new(InlineComputer), Arc::new(ResultCache::new()))
    }

    /// Watch the consumer's observed state.
    pub fn subscribe(&self) -> watch::Receiver<Observed> {
        self.observed.subscribe()
    }

    /// The last delivered result.
    pub fn current(&self) -> Observed {
        self.observed.borrow().clone()
    }

    /// Id of the most recently issued request, 0 if none.
    pub fn latest_request(&self) -> u64 {
        self.latest.load(Ordering::SeqCst)
    }

    pub fn cache(&self) -> &Arc<ResultCache> {
        &self.cache
    }

    pub fn computer(&self) -> &Arc<dyn GraphComputer> {
        &self.computer
    }

    /// Build the graph index for a node list.
    pub async fn build_graph(&self, nodes: Vec<NodeDescriptor>) -> Outcome<Arc<ComputationResult>> {
        self.dispatch(ComputationRequest::BuildGraph { nodes }).await
    }

    /// Scope, annotate and filter a node list.
    pub async fn select(&self, request: SelectionRequest) -> Outcome<Arc<ComputationResult>> {
        self.dispatch(ComputationRequest::Select(request)).await
    }

    /// Issue a request. Any earlier request of this dispatcher becomes
    /// stale.
    pub async fn dispatch(&self, request: ComputationRequest) -> Outcome<Arc<ComputationResult>> {
        let id = next_request_id();
        self.latest.fetch_max(id, Ordering::SeqCst);
        let kind = request.kind();

        let computed = match request.canonical_key() {
            Ok(key) => {
                self.cache
                    .get_or_compute(key, || self.run(id, request))
                    .await
            }
            Err(err) => {
                warn!(id, error = %err, "request has no canonical form, bypassing cache");
                self.run(id, request).await.map(Arc::new)
            }
        };

        let result = computed.unwrap_or_else(|fault| {
            warn!(id, computer = self.computer.name(), error = %fault, "graph computation failed");
            Arc::new(kind.empty_result())
        });

        let latest = self.latest.load(Ordering::SeqCst);
        if id != latest {
            debug!(id, latest, "discarding stale response");
            return Outcome::Stale { id, latest };
        }

        self.observed.send_replace(Some(result.clone()));
        Outcome::Delivered(result)
    }

    async fn run(&self, id: u64, request: ComputationRequest) -> Result<ComputationResult, WorkerFault> {
        debug!(id, computer = self.computer.name(), "dispatching request");
        let response = self.computer.compute(RequestEnvelope::new(id, request)).await?;

        if response.id != id {
            return Err(WorkerFault::Reported(format!(
                "response {} does not answer request {id}",
                response.id
            )));
        }
        response.into_result()
    }

    /// Stop the underlying computer.
    pub fn shutdown(&self) {
        self.computer.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::ComputeFuture;
    use std::sync::atomic::AtomicUsize;

    fn nodes() -> Vec<NodeDescriptor> {
        vec![
            NodeDescriptor::new("a").with_downstream("b"),
            NodeDescriptor::new("b").with_upstream("a"),
        ]
    }

    /// Counts calls and always fails.
    struct Broken {
        calls: AtomicUsize,
    }

    impl GraphComputer for Broken {
        fn compute(&self, _request: RequestEnvelope) -> ComputeFuture {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Box::pin(std::future::ready(Err(WorkerFault::Crashed)))
        }

        fn name(&self) -> &str {
            "broken"
        }
    }

    #[test]
    fn request_ids_increase() {
        let a = next_request_id();
        let b = next_request_id();
        assert!(b > a);
    }

    #[tokio::test]
    async fn inline_dispatch_delivers_and_publishes() {
        let dispatcher = Dispatcher::inline();
        let rx = dispatcher.subscribe();

        let result = dispatcher
            .select(SelectionRequest::new(nodes(), "a++"))
            .await
            .delivered()
            .unwrap();

        assert_eq!(result.as_selection().unwrap().matched().len(), 2);
        assert!(Arc::ptr_eq(rx.borrow().as_ref().unwrap(), &result));
        assert!(dispatcher.latest_request() > 0);
    }

    #[tokio::test]
    async fn faults_degrade_to_empty_result_and_are_not_cached() {
        let broken = Arc::new(Broken {
            calls: AtomicUsize::new(0),
        });
        let dispatcher = Dispatcher::new(broken.clone(), Arc::new(ResultCache::new()));

        for _ in 0..2 {
            let result = dispatcher.build_graph(nodes()).await.delivered().unwrap();
            assert!(result.is_empty());
            assert!(result.as_graph().is_some());
        }

        assert_eq!(broken.calls.load(Ordering::SeqCst), 2);
        assert!(dispatcher.cache().is_empty());
    }

    #[test]
    fn outcome_helpers() {
        let stale: Outcome<u8> = Outcome::Stale { id: 1, latest: 2 };
        assert!(stale.is_stale());
        assert_eq!(stale.delivered(), None);
        assert_eq!(Outcome::Delivered(3u8).delivered(), Some(3));
    }
}
