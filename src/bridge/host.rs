//! Hosting of the worker context
//!
//! The coordinator never talks to the remote store directly. It reaches a
//! separate, transient context through a `WorkerHost`, which owns that
//! context's lifecycle and moves JSON envelopes in and out of it.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, warn};

/// Failures of the context transport
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HostError {
    #[error("worker context already exists")]
    AlreadyExists,

    #[error("worker contexts are not supported on this platform")]
    Unsupported,

    #[error("worker context failed to start: {0}")]
    Startup(String),

    #[error("no worker context")]
    NoContext,

    #[error("worker context closed before replying")]
    ChannelClosed,

    #[error("malformed reply: {0}")]
    Malformed(String),
}

/// Something that answers request envelopes inside the worker context
#[async_trait]
pub trait EnvelopeHandler: Send + Sync {
    async fn handle_envelope(&self, envelope: Value) -> Value;
}

/// Lifecycle and transport of the worker context
#[async_trait]
pub trait WorkerHost: Send + Sync {
    /// Whether this platform can host a worker context at all
    fn is_supported(&self) -> bool;

    async fn has_context(&self) -> bool;

    /// Start the context. Fails with `AlreadyExists` if one is running.
    async fn create_context(&self) -> Result<(), HostError>;

    /// Deliver an envelope and wait for the reply envelope
    async fn send(&self, envelope: Value) -> Result<Value, HostError>;

    async fn close_context(&self);
}

type Job = (Value, oneshot::Sender<Value>);

/// Builds the handler each time a context starts
pub type HandlerFactory = dyn Fn() -> Result<Arc<dyn EnvelopeHandler>, HostError> + Send + Sync;

struct Context {
    tx: mpsc::Sender<Job>,
    task: JoinHandle<()>,
}

impl Context {
    fn is_alive(&self) -> bool {
        !self.task.is_finished()
    }
}

/// Worker context as a spawned tokio task.
///
/// The task owns the handler and is reached only through an mpsc channel
/// carrying envelopes with oneshot reply channels. Requests inside the
/// context run concurrently.
pub struct TaskHost {
    factory: Arc<HandlerFactory>,
    supported: bool,
    queue_depth: usize,
    slot: Mutex<Option<Context>>,
    created: AtomicUsize,
}

impl TaskHost {
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn() -> Result<Arc<dyn EnvelopeHandler>, HostError> + Send + Sync + 'static,
    {
        Self {
            factory: Arc::new(factory),
            supported: true,
            queue_depth: 64,
            slot: Mutex::new(None),
            created: AtomicUsize::new(0),
        }
    }

    /// Host that starts every context with the same handler
    pub fn for_handler(handler: Arc<dyn EnvelopeHandler>) -> Self {
        Self::new(move || Ok(handler.clone()))
    }

    pub fn with_supported(mut self, supported: bool) -> Self {
        self.supported = supported;
        self
    }

    /// How many contexts have been started so far
    pub fn contexts_created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    async fn run(handler: Arc<dyn EnvelopeHandler>, mut rx: mpsc::Receiver<Job>) {
        let mut in_flight = JoinSet::new();
        loop {
            tokio::select! {
                job = rx.recv() => {
                    let Some((envelope, reply)) = job else { break };
                    let handler = handler.clone();
                    in_flight.spawn(async move {
                        let response = handler.handle_envelope(envelope).await;
                        // caller may have timed out and gone away
                        let _ = reply.send(response);
                    });
                }
                Some(done) = in_flight.join_next(), if !in_flight.is_empty() => {
                    if let Err(e) = done {
                        warn!(error = %e, "worker request task failed");
                    }
                }
            }
        }
        while let Some(done) = in_flight.join_next().await {
            if let Err(e) = done {
                warn!(error = %e, "worker request task failed");
            }
        }
        debug!("worker context stopped");
    }
}

#[async_trait]
impl WorkerHost for TaskHost {
    fn is_supported(&self) -> bool {
        self.supported
    }

    async fn has_context(&self) -> bool {
        self.slot.lock().unwrap().as_ref().is_some_and(Context::is_alive)
    }

    async fn create_context(&self) -> Result<(), HostError> {
        if !self.supported {
            return Err(HostError::Unsupported);
        }
        let mut slot = self.slot.lock().unwrap();
        if slot.as_ref().is_some_and(Context::is_alive) {
            return Err(HostError::AlreadyExists);
        }

        let handler = (self.factory)()?;
        let (tx, rx) = mpsc::channel(self.queue_depth);
        let task = tokio::spawn(Self::run(handler, rx));
        *slot = Some(Context { tx, task });
        let n = self.created.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(contexts_created = n, "worker context started");
        Ok(())
    }

    async fn send(&self, envelope: Value) -> Result<Value, HostError> {
        let tx = {
            let slot = self.slot.lock().unwrap();
            match slot.as_ref() {
                Some(ctx) if ctx.is_alive() => ctx.tx.clone(),
                _ => return Err(HostError::NoContext),
            }
        };

        let (reply_tx, reply_rx) = oneshot::channel();
        tx.send((envelope, reply_tx))
            .await
            .map_err(|_| HostError::ChannelClosed)?;
        reply_rx.await.map_err(|_| HostError::ChannelClosed)
    }

    async fn close_context(&self) {
        let ctx = self.slot.lock().unwrap().take();
        if let Some(ctx) = ctx {
            drop(ctx.tx);
            ctx.task.abort();
            debug!("worker context closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    struct Echo;

    #[async_trait]
    impl EnvelopeHandler for Echo {
        async fn handle_envelope(&self, envelope: Value) -> Value {
            json!({ "success": true, "data": envelope })
        }
    }

    struct Slow;

    #[async_trait]
    impl EnvelopeHandler for Slow {
        async fn handle_envelope(&self, _envelope: Value) -> Value {
            tokio::time::sleep(Duration::from_secs(60)).await;
            json!({ "success": true })
        }
    }

    #[tokio::test]
    async fn send_requires_a_context() {
        let host = TaskHost::for_handler(Arc::new(Echo));
        assert!(!host.has_context().await);
        assert_eq!(host.send(json!({})).await.unwrap_err(), HostError::NoContext);

        host.create_context().await.unwrap();
        assert!(host.has_context().await);
        let reply = host.send(json!({ "type": "PING" })).await.unwrap();
        assert_eq!(reply["data"]["type"], "PING");
    }

    #[tokio::test]
    async fn second_create_reports_already_exists() {
        let host = TaskHost::for_handler(Arc::new(Echo));
        host.create_context().await.unwrap();
        assert_eq!(host.create_context().await.unwrap_err(), HostError::AlreadyExists);
        assert_eq!(host.contexts_created(), 1);

        host.close_context().await;
        assert!(!host.has_context().await);
        host.create_context().await.unwrap();
        assert_eq!(host.contexts_created(), 2);
    }

    #[tokio::test]
    async fn factory_failure_is_a_startup_error() {
        let host = TaskHost::new(|| Err(HostError::Startup("no remote configured".into())));
        assert!(matches!(host.create_context().await, Err(HostError::Startup(_))));
        assert!(!host.has_context().await);
    }

    #[tokio::test]
    async fn unsupported_host_never_starts() {
        let host = TaskHost::for_handler(Arc::new(Echo)).with_supported(false);
        assert_eq!(host.create_context().await.unwrap_err(), HostError::Unsupported);
    }

    #[tokio::test]
    async fn closing_mid_request_closes_reply_channel() {
        let host = Arc::new(TaskHost::for_handler(Arc::new(Slow)));
        host.create_context().await.unwrap();

        let pending = {
            let host = host.clone();
            tokio::spawn(async move { host.send(json!({})).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        host.close_context().await;

        assert_eq!(pending.await.unwrap().unwrap_err(), HostError::ChannelClosed);
    }
}
