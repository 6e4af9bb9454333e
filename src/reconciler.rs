//! Periodic retry of unsynced items
//!
//! Every tick re-derives what to do from current state: no session, no
//! worker support or nothing pending means the tick is skipped. Nothing is
//! remembered between ticks.

use crate::bridge::{SyncAllResult, SyncBridge};
use crate::identity::IdentityProvider;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

pub const DEFAULT_RECONCILE_INTERVAL: Duration = Duration::from_secs(300);

/// What a single tick did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Nobody signed in
    NoSession,
    /// The worker context cannot run on this platform
    Unsupported,
    NothingPending,
    Synced(SyncAllResult),
    Failed(String),
}

pub struct Reconciler {
    bridge: Arc<SyncBridge>,
    identity: Arc<dyn IdentityProvider>,
    interval: Duration,
}

impl Reconciler {
    pub fn new(bridge: Arc<SyncBridge>, identity: Arc<dyn IdentityProvider>) -> Self {
        Self {
            bridge,
            identity,
            interval: DEFAULT_RECONCILE_INTERVAL,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Run one reconciliation pass
    #[tracing::instrument(skip(self))]
    pub async fn tick(&self) -> TickOutcome {
        if self.identity.current_author().is_none() {
            debug!("no session, skipping");
            return TickOutcome::NoSession;
        }
        if !self.bridge.is_supported() {
            debug!("worker context unsupported, skipping");
            return TickOutcome::Unsupported;
        }

        let status = match self.bridge.sync_status().await {
            Ok(status) => status,
            Err(e) => {
                warn!(error = %e, "could not read sync status");
                return TickOutcome::Failed(e.to_string());
            }
        };
        if !status.has_pending {
            debug!("nothing pending");
            return TickOutcome::NothingPending;
        }

        match self.bridge.sync_all_pending().await {
            Ok(result) => {
                info!(
                    annotations = result.annotations_synced,
                    drawings = result.drawings_synced,
                    pending_annotations = status.pending_annotations,
                    pending_drawings = status.pending_drawings,
                    "reconciled pending items"
                );
                TickOutcome::Synced(result)
            }
            Err(e) => {
                warn!(error = %e, "bulk sync failed");
                TickOutcome::Failed(e.to_string())
            }
        }
    }

    /// Start ticking every `interval`, first tick one interval from now.
    ///
    /// Each tick runs as its own task, so even a panic inside a tick is
    /// logged and the loop carries on.
    pub fn spawn(self: Arc<Self>) -> ReconcilerHandle {
        let (stop_tx, mut stop_rx) = oneshot::channel();
        let (outcome_tx, outcome_rx) = watch::channel(None);
        let period = self.interval;

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = &mut stop_rx => break,
                }
                let this = self.clone();
                match tokio::spawn(async move { this.tick().await }).await {
                    Ok(outcome) => {
                        outcome_tx.send_replace(Some(outcome));
                    }
                    Err(e) => error!(error = %e, "reconcile tick aborted"),
                }
            }
            debug!("reconciler stopped");
        });

        ReconcilerHandle {
            stop: stop_tx,
            outcomes: outcome_rx,
            task,
        }
    }
}

/// Control over a running reconciler loop
pub struct ReconcilerHandle {
    stop: oneshot::Sender<()>,
    outcomes: watch::Receiver<Option<TickOutcome>>,
    task: JoinHandle<()>,
}

impl ReconcilerHandle {
    /// Outcome of the most recent tick
    pub fn latest(&self) -> Option<TickOutcome> {
        self.outcomes.borrow().clone()
    }

    /// Wait for the next tick to finish
    pub async fn next_outcome(&mut self) -> Option<TickOutcome> {
        self.outcomes.changed().await.ok()?;
        self.outcomes.borrow_and_update().clone()
    }

    /// Stop the loop and wait for it to exit
    pub async fn stop(self) {
        let _ = self.stop.send(());
        if let Err(e) = self.task.await {
            warn!(error = %e, "reconciler task ended abnormally");
        }
    }
}
