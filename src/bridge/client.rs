//! Coordinator-side end of the bridge

use super::host::{HostError, WorkerHost};
use super::message::{
    AnnotationPayload, BridgeError, DeletePayload, DrawingPayload, SyncAllResult, SyncRefResult,
    SyncRequest, SyncResponse, SyncStatus,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Request/response channel into the worker context.
///
/// The context is created on demand and closed again after a period without
/// requests. Only one caller at a time may create it; the rest wait and reuse
/// it. `request` never fails: every transport problem comes back as a
/// failure response.
pub struct SyncBridge {
    host: Arc<dyn WorkerHost>,
    creation: tokio::sync::Mutex<()>,
    in_flight: AtomicUsize,
    last_activity: Mutex<Instant>,
    idle_timeout: Duration,
    request_timeout: Option<Duration>,
    watcher: Mutex<Option<JoinHandle<()>>>,
}

/// Marks a request as in flight for the idle watcher
struct Activity<'a>(&'a SyncBridge);

impl<'a> Activity<'a> {
    fn begin(bridge: &'a SyncBridge) -> Self {
        bridge.in_flight.fetch_add(1, Ordering::SeqCst);
        bridge.touch();
        Self(bridge)
    }
}

impl Drop for Activity<'_> {
    fn drop(&mut self) {
        self.0.touch();
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

impl SyncBridge {
    pub fn new(host: Arc<dyn WorkerHost>) -> Self {
        Self {
            host,
            creation: tokio::sync::Mutex::new(()),
            in_flight: AtomicUsize::new(0),
            last_activity: Mutex::new(Instant::now()),
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            request_timeout: Some(DEFAULT_REQUEST_TIMEOUT),
            watcher: Mutex::new(None),
        }
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    /// `None` waits for the worker indefinitely
    pub fn with_request_timeout(mut self, request_timeout: Option<Duration>) -> Self {
        self.request_timeout = request_timeout;
        self
    }

    pub fn is_supported(&self) -> bool {
        self.host.is_supported()
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    fn touch(&self) {
        *self.last_activity.lock().unwrap() = Instant::now();
    }

    async fn ensure_context(&self) -> Result<(), HostError> {
        if !self.host.is_supported() {
            return Err(HostError::Unsupported);
        }
        let _owner = self.creation.lock().await;
        if self.host.has_context().await {
            return Ok(());
        }
        match self.host.create_context().await {
            Ok(()) => {
                info!("worker context created");
                Ok(())
            }
            Err(HostError::AlreadyExists) => {
                debug!("worker context already existed");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Send one request to the worker, creating its context if needed
    #[tracing::instrument(skip(self, request), fields(op = request.op()))]
    pub async fn request(&self, request: SyncRequest) -> SyncResponse {
        let _activity = Activity::begin(self);

        let envelope = match request.to_envelope() {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(error = %e, "could not encode request");
                return SyncResponse::failure(e.to_string());
            }
        };

        if let Err(e) = self.ensure_context().await {
            warn!(error = %e, "worker context unavailable");
            return SyncResponse::failure(e.to_string());
        }

        let sent = self.host.send(envelope);
        let reply = match self.request_timeout {
            Some(limit) => match tokio::time::timeout(limit, sent).await {
                Ok(reply) => reply,
                Err(_) => {
                    warn!(timeout_ms = limit.as_millis() as u64, "worker did not reply in time");
                    return SyncResponse::failure(format!("request timed out after {limit:?}"));
                }
            },
            None => sent.await,
        };

        let response = reply.and_then(|value| {
            SyncResponse::from_value(value).map_err(|e| HostError::Malformed(e.to_string()))
        });
        match response {
            Ok(response) => {
                if let Some(error) = response.error.as_deref().filter(|_| !response.success) {
                    warn!(error, "worker reported failure");
                }
                response
            }
            Err(e) => {
                warn!(error = %e, "worker transport failed");
                SyncResponse::failure(e.to_string())
            }
        }
    }

    pub async fn sync_annotation(&self, payload: AnnotationPayload) -> Result<SyncRefResult, BridgeError> {
        self.request(SyncRequest::SyncAnnotation(payload)).await.into_data()
    }

    pub async fn sync_drawing(&self, payload: DrawingPayload) -> Result<SyncRefResult, BridgeError> {
        self.request(SyncRequest::SyncDrawing(payload)).await.into_data()
    }

    pub async fn sync_all_pending(&self) -> Result<SyncAllResult, BridgeError> {
        self.request(SyncRequest::SyncAllPending).await.into_data()
    }

    pub async fn sync_status(&self) -> Result<SyncStatus, BridgeError> {
        self.request(SyncRequest::GetSyncStatus).await.into_data()
    }

    pub async fn delete_record(&self, remote_ref: impl Into<String>) -> Result<(), BridgeError> {
        let response = self
            .request(SyncRequest::DeleteRecord(DeletePayload {
                remote_ref: remote_ref.into(),
            }))
            .await;
        if response.success {
            Ok(())
        } else {
            Err(BridgeError::Failed(
                response.error.unwrap_or_else(|| "unknown error".to_string()),
            ))
        }
    }

    /// Close the worker context if nothing used it for `idle_timeout`.
    ///
    /// Runs under the creation lock so a concurrent request either sees the
    /// context before it closes or recreates it afterwards.
    pub async fn close_if_idle(&self) -> bool {
        let _owner = self.creation.lock().await;
        if self.in_flight() > 0 {
            return false;
        }
        if self.last_activity.lock().unwrap().elapsed() < self.idle_timeout {
            return false;
        }
        if !self.host.has_context().await {
            return false;
        }
        self.host.close_context().await;
        info!(idle_secs = self.idle_timeout.as_secs(), "worker context closed after idling");
        true
    }

    /// Spawn the background task that closes an idle context.
    ///
    /// The task holds only a weak reference and ends once the bridge is
    /// dropped.
    pub fn start_idle_watcher(self: &Arc<Self>) {
        let bridge = Arc::downgrade(self);
        let check_every = (self.idle_timeout / 4).max(Duration::from_millis(10));
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(check_every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let Some(bridge) = bridge.upgrade() else { break };
                bridge.close_if_idle().await;
            }
        });
        if let Some(previous) = self.watcher.lock().unwrap().replace(task) {
            previous.abort();
        }
    }

    /// Stop the idle watcher and close the context
    pub async fn shutdown(&self) {
        let watcher = self.watcher.lock().unwrap().take();
        if let Some(watcher) = watcher {
            watcher.abort();
        }
        let _owner = self.creation.lock().await;
        self.host.close_context().await;
    }
}

impl Drop for SyncBridge {
    fn drop(&mut self) {
        if let Some(watcher) = self.watcher.get_mut().ok().and_then(Option::take) {
            watcher.abort();
        }
    }
}
