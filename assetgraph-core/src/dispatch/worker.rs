//! Offloaded Worker
//!
//! Runs computations on a dedicated thread that talks to the rest of the
//! process only through byte channels.
//!
//! # How It Works
//!
//! 1. `compute` encodes the request frame, registers a oneshot sender under
//!    the request id and pushes the bytes onto the request channel.
//!
//! 2. The worker thread decodes each frame, runs the pipeline and pushes
//!    the encoded response onto the response channel.
//!
//! 3. A router thread decodes responses and completes the pending oneshot
//!    with the matching id.
//!
//! 4. When the response channel closes (the worker stopped), the router
//!    fails every pending request: `Terminated` if shutdown was requested,
//!    `Crashed` otherwise.
//!
//! # Cancellation
//!
//! `terminate` fails every outstanding request with `Terminated` at once.
//! A computation already running still finishes on the worker thread, but
//! its response is dropped, and queued requests are never started.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use super::computer::{ComputeFuture, GraphComputer};
use super::protocol::{respond, EnvelopeHeader, RequestEnvelope, ResponseEnvelope};
use crate::error::WorkerFault;

type Reply = oneshot::Sender<Result<ResponseEnvelope, WorkerFault>>;

/// Requests waiting for a response.
#[derive(Default)]
struct Pending {
    waiting: HashMap<u64, Reply>,
    /// Set once the worker is gone. New requests fail immediately.
    closed: Option<WorkerFault>,
}

/// A [`GraphComputer`] backed by a dedicated worker thread.
pub struct WorkerComputer {
    name: String,
    requests: Mutex<Option<mpsc::Sender<Vec<u8>>>>,
    pending: Arc<Mutex<Pending>>,
    terminated: Arc<AtomicBool>,
}

impl WorkerComputer {
    /// Spawn the worker and router threads.
    pub fn spawn(name: impl Into<String>) -> std::io::Result<Self> {
        Self::spawn_with(name, respond)
    }

    /// Spawn a worker that answers each request frame with `handler`.
    pub(crate) fn spawn_with<H>(name: impl Into<String>, handler: H) -> std::io::Result<Self>
    where
        H: Fn(RequestEnvelope) -> ResponseEnvelope + Send + 'static,
    {
        let name = name.into();
        let (request_tx, request_rx) = mpsc::channel::<Vec<u8>>();
        let (response_tx, response_rx) = mpsc::channel::<Vec<u8>>();
        let pending = Arc::new(Mutex::new(Pending::default()));
        let terminated = Arc::new(AtomicBool::new(false));

        {
            let terminated = terminated.clone();
            thread::Builder::new()
                .name(name.clone())
                .spawn(move || worker_loop(request_rx, response_tx, terminated, handler))?;
        }
        {
            let pending = pending.clone();
            let terminated = terminated.clone();
            thread::Builder::new()
                .name(format!("{name}-router"))
                .spawn(move || router_loop(response_rx, pending, terminated))?;
        }

        info!(worker = %name, "spawned graph worker");
        Ok(Self {
            name,
            requests: Mutex::new(Some(request_tx)),
            pending,
            terminated,
        })
    }

    /// Tell the worker to stop. Outstanding requests resolve as
    /// [`WorkerFault::Terminated`] right away, without waiting for the
    /// computation in progress.
    pub fn terminate(&self) {
        if self.terminated.swap(true, Ordering::SeqCst) {
            return;
        }
        // Dropping the sender wakes an idle worker so it can exit.
        self.requests.lock().take();

        let waiting = {
            let mut pending = self.pending.lock();
            pending.closed = Some(WorkerFault::Terminated);
            std::mem::take(&mut pending.waiting)
        };
        info!(worker = %self.name, cancelled = waiting.len(), "terminating graph worker");
        for (_, reply) in waiting {
            let _ = reply.send(Err(WorkerFault::Terminated));
        }
    }

    /// Whether the worker still accepts requests.
    pub fn is_running(&self) -> bool {
        !self.terminated.load(Ordering::SeqCst) && self.pending.lock().closed.is_none()
    }

    /// Number of requests awaiting a response.
    pub fn in_flight(&self) -> usize {
        self.pending.lock().waiting.len()
    }

    fn submit(&self, request: RequestEnvelope) -> Result<oneshot::Receiver<Result<ResponseEnvelope, WorkerFault>>, WorkerFault> {
        let id = request.id;
        let bytes = request.encode()?;

        let requests = self.requests.lock();
        let sender = (*requests).as_ref().ok_or(WorkerFault::Terminated)?;

        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock();
            if let Some(fault) = &pending.closed {
                return Err(fault.clone());
            }
            pending.waiting.insert(id, tx);
        }

        if sender.send(bytes).is_err() {
            self.pending.lock().waiting.remove(&id);
            return Err(WorkerFault::Crashed);
        }

        debug!(worker = %self.name, id, "posted request");
        Ok(rx)
    }
}

impl GraphComputer for WorkerComputer {
    fn compute(&self, request: RequestEnvelope) -> ComputeFuture {
        match self.submit(request) {
            Ok(rx) => Box::pin(async move {
                // A dropped sender means the router gave up on us.
                rx.await.unwrap_or(Err(WorkerFault::Terminated))
            }),
            Err(fault) => Box::pin(std::future::ready(Err(fault))),
        }
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn shutdown(&self) {
        self.terminate();
    }
}

impl Drop for WorkerComputer {
    fn drop(&mut self) {
        self.terminate();
    }
}

fn worker_loop<H>(requests: mpsc::Receiver<Vec<u8>>, responses: mpsc::Sender<Vec<u8>>, terminated: Arc<AtomicBool>, handler: H)
where
    H: Fn(RequestEnvelope) -> ResponseEnvelope,
{
    while let Ok(bytes) = requests.recv() {
        if terminated.load(Ordering::SeqCst) {
            break;
        }

        let response = match RequestEnvelope::decode(&bytes) {
            Ok(request) => handler(request),
            Err(fault) => match EnvelopeHeader::decode(&bytes) {
                Ok(header) => ResponseEnvelope::error(header.id, fault.to_string()),
                Err(_) => {
                    warn!(error = %fault, "dropping unreadable request frame");
                    continue;
                }
            },
        };

        let encoded = match response.encode() {
            Ok(encoded) => encoded,
            Err(fault) => match ResponseEnvelope::error(response.id, fault.to_string()).encode() {
                Ok(encoded) => encoded,
                Err(_) => continue,
            },
        };

        if responses.send(encoded).is_err() {
            break;
        }
    }
    debug!("graph worker exiting");
}

fn router_loop(responses: mpsc::Receiver<Vec<u8>>, pending: Arc<Mutex<Pending>>, terminated: Arc<AtomicBool>) {
    for bytes in responses {
        let response = match ResponseEnvelope::decode(&bytes) {
            Ok(response) => response,
            Err(fault) => {
                warn!(error = %fault, "dropping unreadable response frame");
                continue;
            }
        };

        let Some(reply) = pending.lock().waiting.remove(&response.id) else {
            debug!(id = response.id, "response for unknown request");
            continue;
        };

        let delivered = if terminated.load(Ordering::SeqCst) {
            Err(WorkerFault::Terminated)
        } else {
            Ok(response)
        };
        // The caller may have stopped waiting.
        let _ = reply.send(delivered);
    }

    let fault = if terminated.load(Ordering::SeqCst) {
        WorkerFault::Terminated
    } else {
        warn!("graph worker exited unexpectedly");
        WorkerFault::Crashed
    };

    let waiting = {
        let mut pending = pending.lock();
        pending.closed = Some(fault.clone());
        std::mem::take(&mut pending.waiting)
    };
    for (_, reply) in waiting {
        let _ = reply.send(Err(fault.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::protocol::guarded;
    use crate::dispatch::{ComputationRequest, Dispatcher, RequestKind, ResultCache, SelectionRequest};
    use crate::graph::NodeDescriptor;

    fn build(id: u64) -> RequestEnvelope {
        RequestEnvelope::new(
            id,
            ComputationRequest::BuildGraph {
                nodes: vec![
                    NodeDescriptor::new("a").with_downstream("b"),
                    NodeDescriptor::new("b"),
                ],
            },
        )
    }

    #[tokio::test]
    async fn worker_answers_requests() {
        let worker = WorkerComputer::spawn("test-worker").unwrap();
        assert!(worker.is_running());

        let response = worker.compute(build(1)).await.unwrap();
        assert_eq!(response.id, 1);
        let result = response.into_result().unwrap();
        assert_eq!(result.as_graph().unwrap().edge_count(), 1);
        assert_eq!(worker.in_flight(), 0);
    }

    #[tokio::test]
    async fn responses_route_by_id() {
        let worker = WorkerComputer::spawn("test-router").unwrap();

        let first = worker.compute(build(10));
        let second = worker.compute(RequestEnvelope::new(
            11,
            SelectionRequest::new(vec![NodeDescriptor::new("z")], "z").into(),
        ));

        let (first, second) = tokio::join!(first, second);
        assert_eq!(first.unwrap().id, 10);
        let second = second.unwrap();
        assert_eq!(second.id, 11);
        assert!(second.into_result().unwrap().as_selection().is_some());
    }

    #[tokio::test]
    async fn terminated_worker_rejects_requests() {
        let worker = WorkerComputer::spawn("test-terminate").unwrap();
        worker.terminate();

        assert!(!worker.is_running());
        assert_eq!(worker.compute(build(5)).await.unwrap_err(), WorkerFault::Terminated);
        // Terminating twice is harmless.
        worker.shutdown();
    }

    /// A worker whose computations block until the returned sender fires.
    fn gated_worker(name: &str) -> (WorkerComputer, mpsc::Sender<()>) {
        let (release, gate) = mpsc::channel::<()>();
        let worker = WorkerComputer::spawn_with(name, move |request| {
            let _ = gate.recv();
            respond(request)
        })
        .unwrap();
        (worker, release)
    }

    #[tokio::test]
    async fn terminating_cancels_outstanding_requests() {
        let (worker, release) = gated_worker("test-cancel");

        let nodes = (0..20_000)
            .map(|i| NodeDescriptor::new(format!("n{i}").as_str()).with_downstream(format!("n{}", i + 1).as_str()))
            .collect();
        let outstanding = worker.compute(RequestEnvelope::new(21, ComputationRequest::BuildGraph { nodes }));
        assert_eq!(worker.in_flight(), 1);

        worker.terminate();
        assert_eq!(outstanding.await.unwrap_err(), WorkerFault::Terminated);
        assert_eq!(worker.in_flight(), 0);

        // Let the blocked computation finish; its response goes nowhere.
        let _ = release.send(());
    }

    #[tokio::test]
    async fn cancelled_dispatch_delivers_empty_result() {
        let (worker, release) = gated_worker("test-cancel-dispatch");
        let worker = Arc::new(worker);
        let dispatcher = Arc::new(Dispatcher::new(worker.clone(), Arc::new(ResultCache::new())));

        let task = {
            let dispatcher = dispatcher.clone();
            tokio::spawn(async move {
                dispatcher
                    .build_graph(vec![NodeDescriptor::new("a").with_downstream("b"), NodeDescriptor::new("b")])
                    .await
            })
        };
        while worker.in_flight() == 0 {
            tokio::task::yield_now().await;
        }

        worker.terminate();
        let result = task.await.unwrap().delivered().unwrap();
        assert_eq!(*result, RequestKind::BuildGraph.empty_result());
        assert!(dispatcher.cache().is_empty());

        let _ = release.send(());
    }

    #[tokio::test]
    async fn panicking_computation_is_reported() {
        let worker = WorkerComputer::spawn_with("test-panic", |request| {
            guarded(request.id, || panic!("index exploded"))
        })
        .unwrap();

        let response = worker.compute(build(30)).await.unwrap();
        assert_eq!(response.id, 30);
        assert_eq!(
            response.into_result().unwrap_err(),
            WorkerFault::Reported("index exploded".to_string())
        );

        // The worker survives the panic.
        assert!(worker.is_running());
        let dispatcher = Dispatcher::new(Arc::new(worker), Arc::new(ResultCache::new()));
        let result = dispatcher.build_graph(Vec::new()).await.delivered().unwrap();
        assert!(result.is_empty());
    }
}
