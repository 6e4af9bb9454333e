//! Re-resolution of a page's annotations
//!
//! A pass clears every rendered highlight, then resolves each annotation
//! stored for the page URL. Passes run on initial load, on client-side
//! navigation to a different URL, and after a burst of content mutations
//! has settled.

use super::{resolve, Document, ResolvedRange};
use crate::model::{normalize_url, Annotation, ItemId};
use crate::storage::{LocalAnnotationStore, StorageResult};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Where highlights are drawn. Implemented by the page UI.
pub trait HighlightSink: Send + Sync {
    /// Remove every highlight currently rendered
    fn clear_all(&self);

    /// Draw one annotation at its resolved location
    fn render(&self, annotation: &Annotation, range: &ResolvedRange);
}

/// The page currently shown
pub trait PageSource: Send + Sync {
    fn url(&self) -> String;

    /// Snapshot of the page content
    fn document(&self) -> Document;
}

/// Why a pass was requested
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshTrigger {
    Load,
    /// The URL changed without a full reload
    Navigated,
    /// Page content was replaced by a script
    Mutated,
}

/// Result of one pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshReport {
    pub url: String,
    pub rendered: usize,
    /// Annotations whose passage could not be found. They stay in storage.
    pub skipped: Vec<ItemId>,
}

pub struct AnchorRefresher {
    store: Arc<LocalAnnotationStore>,
    sink: Arc<dyn HighlightSink>,
    debounce: Duration,
    passes: AtomicUsize,
}

impl AnchorRefresher {
    pub fn new(store: Arc<LocalAnnotationStore>, sink: Arc<dyn HighlightSink>, debounce: Duration) -> Self {
        Self {
            store,
            sink,
            debounce,
            passes: AtomicUsize::new(0),
        }
    }

    pub fn debounce(&self) -> Duration {
        self.debounce
    }

    /// Number of completed passes
    pub fn passes(&self) -> usize {
        self.passes.load(Ordering::Relaxed)
    }

    /// Run one pass for `url` against `doc`.
    pub async fn refresh(&self, url: &str, doc: &Document) -> StorageResult<RefreshReport> {
        self.sink.clear_all();
        let annotations = self.store.get_for_url(url).await?;

        let mut report = RefreshReport {
            url: url.to_string(),
            ..Default::default()
        };
        for annotation in &annotations {
            match resolve(&annotation.anchor, doc) {
                Some(range) => {
                    self.sink.render(annotation, &range);
                    report.rendered += 1;
                }
                None => {
                    debug!(id = %annotation.id, url, "anchor not found on page, skipping");
                    report.skipped.push(annotation.id.clone());
                }
            }
        }

        self.passes.fetch_add(1, Ordering::Relaxed);
        debug!(url, rendered = report.rendered, skipped = report.skipped.len(), "refresh pass complete");
        Ok(report)
    }

    /// Drive passes from triggers sent through the returned handle.
    pub fn spawn(self: Arc<Self>, page: Arc<dyn PageSource>) -> RefreshHandle {
        let (tx, mut rx) = mpsc::unbounded_channel::<RefreshTrigger>();
        let (report_tx, report_rx) = watch::channel(None);

        let task = tokio::spawn(async move {
            let mut last_url: Option<String> = None;

            while let Some(trigger) = rx.recv().await {
                if trigger == RefreshTrigger::Mutated {
                    // Any trigger inside the window restarts it
                    loop {
                        match tokio::time::timeout(self.debounce, rx.recv()).await {
                            Ok(Some(_)) => continue,
                            Ok(None) | Err(_) => break,
                        }
                    }
                }

                let url = match normalize_url(&page.url()) {
                    Ok(url) => url,
                    Err(e) => {
                        debug!(error = %e, "page url not annotatable, skipping refresh");
                        continue;
                    }
                };
                if trigger == RefreshTrigger::Navigated && last_url.as_deref() == Some(url.as_str()) {
                    continue;
                }

                let doc = page.document();
                match self.refresh(&url, &doc).await {
                    Ok(report) => {
                        report_tx.send_replace(Some(report));
                    }
                    Err(e) => warn!(url = %url, error = %e, "refresh pass failed"),
                }
                last_url = Some(url);
            }
        });

        RefreshHandle {
            tx,
            reports: report_rx,
            task,
        }
    }
}

/// Handle to a running refresh loop
pub struct RefreshHandle {
    tx: mpsc::UnboundedSender<RefreshTrigger>,
    reports: watch::Receiver<Option<RefreshReport>>,
    task: JoinHandle<()>,
}

impl RefreshHandle {
    /// Request a pass. Returns false once the loop has stopped.
    pub fn notify(&self, trigger: RefreshTrigger) -> bool {
        self.tx.send(trigger).is_ok()
    }

    /// Report of the most recent pass
    pub fn latest(&self) -> Option<RefreshReport> {
        self.reports.borrow().clone()
    }

    /// Wait for the next pass to finish
    pub async fn next_report(&mut self) -> Option<RefreshReport> {
        self.reports.changed().await.ok()?;
        self.reports.borrow_and_update().clone()
    }

    pub fn stop(self) {
        self.task.abort();
    }
}
