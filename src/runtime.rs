//! Wiring of the full engine from configuration

use crate::anchor::{AnchorRefresher, HighlightSink};
use crate::bridge::{EnvelopeHandler, SyncBridge, TaskHost};
use crate::config::Config;
use crate::coordinator::{Coordinator, PagenoteResult};
use crate::identity::IdentityProvider;
use crate::merge::SearchService;
use crate::reconciler::Reconciler;
use crate::storage::{KvBackend, LocalAnnotationStore, LocalDrawingStore, OpenBackend, SqliteBackend};
use crate::worker::{RemoteStore, RemoteSyncWorker};
use std::sync::Arc;
use tracing::info;

/// Every long-lived component, built once per process.
///
/// Must be built inside a tokio runtime: the bridge's idle watcher is
/// spawned on construction.
pub struct Runtime {
    pub config: Config,
    pub annotations: Arc<LocalAnnotationStore>,
    pub drawings: Arc<LocalDrawingStore>,
    pub host: Arc<TaskHost>,
    pub bridge: Arc<SyncBridge>,
    pub coordinator: Arc<Coordinator>,
    identity: Arc<dyn IdentityProvider>,
}

impl Runtime {
    /// Open the SQLite database named by the config
    pub fn open(
        config: Config,
        remote: Arc<dyn RemoteStore>,
        identity: Arc<dyn IdentityProvider>,
        search: Arc<dyn SearchService>,
    ) -> PagenoteResult<Self> {
        let path = config.storage.resolved_db_path();
        let backend = Arc::new(SqliteBackend::open(&path, config.storage.capacity_bytes)?);
        info!(path = %path.display(), "opened local store");
        Ok(Self::with_backend(config, backend, remote, identity, search))
    }

    pub fn with_backend(
        config: Config,
        backend: Arc<dyn KvBackend>,
        remote: Arc<dyn RemoteStore>,
        identity: Arc<dyn IdentityProvider>,
        search: Arc<dyn SearchService>,
    ) -> Self {
        let annotations = Arc::new(LocalAnnotationStore::new(backend.clone()));
        let drawings = Arc::new(LocalDrawingStore::new(backend).with_thresholds(config.storage.thresholds()));

        let worker: Arc<dyn EnvelopeHandler> = Arc::new(RemoteSyncWorker::new(
            remote,
            annotations.clone(),
            drawings.clone(),
        ));
        let host = Arc::new(TaskHost::for_handler(worker));
        let bridge = Arc::new(
            SyncBridge::new(host.clone())
                .with_idle_timeout(config.sync.idle_timeout())
                .with_request_timeout(config.sync.request_timeout()),
        );
        bridge.start_idle_watcher();

        let coordinator = Arc::new(
            Coordinator::new(
                annotations.clone(),
                drawings.clone(),
                bridge.clone(),
                identity.clone(),
                search,
            )
            .with_limits(config.limits.clone()),
        );

        Self {
            config,
            annotations,
            drawings,
            host,
            bridge,
            coordinator,
            identity,
        }
    }

    /// Reconciler on the configured interval
    pub fn reconciler(&self) -> Arc<Reconciler> {
        Arc::new(
            Reconciler::new(self.bridge.clone(), self.identity.clone())
                .with_interval(self.config.sync.reconcile_interval()),
        )
    }

    /// Highlight refresher for this store, debounced as configured
    pub fn refresher(&self, sink: Arc<dyn HighlightSink>) -> AnchorRefresher {
        AnchorRefresher::new(self.annotations.clone(), sink, self.config.anchor.debounce())
    }

    /// Let pending remote deletes finish, then close the worker context
    pub async fn shutdown(&self) {
        self.coordinator.wait_background().await;
        self.bridge.shutdown().await;
    }
}
