//! End-to-end save, sync and read paths through the coordinator
//!
//! Run with: `cargo test --test sync_flow`

mod common;

use common::{remote_annotation, Harness, AUTHOR, PAGE};
use pagenote::bridge::{HostError, SyncBridge, TaskHost};
use pagenote::config::Config;
use pagenote::identity::StaticIdentity;
use pagenote::merge::StaticSearch;
use pagenote::storage::{KvBackend, LocalAnnotationStore, LocalDrawingStore, OpenBackend, QuotaLevel, SqliteBackend};
use pagenote::{AnchorData, Annotation, Coordinator, NewAnnotation, NewDrawing, QuoteAnchor, SyncState};
use std::collections::HashSet;
use std::sync::Arc;

fn new_note(text: &str, comment: &str) -> NewAnnotation {
    NewAnnotation::new(PAGE, text, comment, QuoteAnchor::new("Hello ", text, "! Goodbye."))
}

#[tokio::test]
async fn saved_annotation_reads_back_with_generated_id() {
    let h = Harness::sqlite();
    let outcome = h
        .runtime
        .coordinator
        .create_annotation(new_note("world", "first!"))
        .await
        .unwrap();

    let listed = h.runtime.coordinator.annotations_for_url(PAGE).await.unwrap();
    assert_eq!(listed.len(), 1);
    let stored = &listed[0];
    assert_eq!(stored.id, outcome.item.id);
    assert!(!stored.id.as_str().is_empty());
    assert_eq!(stored.selected_text, "world");
    assert_eq!(stored.comment, "first!");
    assert_eq!(stored.author, AUTHOR);
    assert_eq!(stored.color, "yellow");
    assert!(matches!(outcome.sync, SyncState::Synced(_)));
    assert_eq!(h.remote.record_count(), 1);
}

#[tokio::test]
async fn urls_are_normalized_before_storage() {
    let h = Harness::sqlite();
    let input = NewAnnotation::new(
        "HTTPS://Example.com/article#section-2",
        "world",
        "c",
        QuoteAnchor::new("", "world", ""),
    );
    h.runtime.coordinator.create_annotation(input).await.unwrap();
    assert_eq!(h.runtime.annotations.get_for_url(PAGE).await.unwrap().len(), 1);
}

#[tokio::test]
async fn local_copy_wins_over_search_result() {
    let local = Annotation::new(PAGE, "shared passage", "local", AnchorData::quote(QuoteAnchor::new("", "shared passage", "")))
        .with_id("A1")
        .with_author(AUTHOR);
    let search = Arc::new(StaticSearch::new(vec![
        remote_annotation("A1", "remote"),
        remote_annotation("A2", "from bob"),
    ]));
    let h = Harness::sqlite_with(Config::default(), search);
    h.runtime.annotations.save(&local.with_remote_ref("remote://app.pagenote.annotation/A1")).await.unwrap();

    let merged = h.runtime.coordinator.annotations_for_url(PAGE).await.unwrap();
    let ids: Vec<&str> = merged.iter().map(|a| a.id.as_str()).collect();
    assert_eq!(ids, vec!["A1", "A2"]);
    assert_eq!(merged[0].comment, "local");

    // read-through cache: A2 is now local and a second read adds nothing
    let again = h.runtime.coordinator.annotations_for_url(PAGE).await.unwrap();
    assert_eq!(again.len(), 2);
    assert_eq!(h.runtime.annotations.get_for_url(PAGE).await.unwrap().len(), 2);
    assert_eq!(h.runtime.coordinator.sync_status().await.unwrap().pending_annotations, 0);
}

#[tokio::test]
async fn concurrent_creates_share_one_worker_context() {
    let h = Arc::new(Harness::sqlite());
    let mut tasks = Vec::new();
    for i in 0..50 {
        let h = h.clone();
        tasks.push(tokio::spawn(async move {
            h.runtime
                .coordinator
                .create_annotation(new_note(&format!("passage {i}"), "c"))
                .await
                .unwrap()
        }));
    }
    let mut ids = HashSet::new();
    for t in tasks {
        let outcome = t.await.unwrap();
        assert!(matches!(outcome.sync, SyncState::Synced(_)));
        ids.insert(outcome.item.id);
    }

    assert_eq!(ids.len(), 50);
    assert_eq!(h.runtime.annotations.get_for_url(PAGE).await.unwrap().len(), 50);
    assert_eq!(h.runtime.host.contexts_created(), 1);
    assert_eq!(h.remote.record_count(), 50);
}

#[tokio::test]
async fn drawing_save_near_full_storage_succeeds() {
    let (h, backend) = Harness::memory(10_000);
    backend.set("filler", &"x".repeat(9_200)).unwrap();

    let outcome = h
        .runtime
        .coordinator
        .save_drawing(NewDrawing::new(PAGE, "data:image/png;base64,iVBORw=="))
        .await
        .unwrap();
    assert_eq!(outcome.quota, Some(QuotaLevel::Critical));
    assert!(matches!(outcome.sync, SyncState::Synced(_)));

    let status = h.runtime.coordinator.sync_status().await.unwrap();
    assert_eq!(status.pending_drawings, 0);
    assert_eq!(status.pending_annotations, 0);
    assert!(h.runtime.coordinator.quota().unwrap().percent_used >= 92.0);
}

#[tokio::test]
async fn drawing_over_capacity_is_a_quota_error() {
    let (h, _) = Harness::memory(1_000);
    h.runtime
        .coordinator
        .save_drawing(NewDrawing::new(PAGE, "data:,small"))
        .await
        .unwrap();

    let err = h
        .runtime
        .coordinator
        .save_drawing(NewDrawing::new(PAGE, format!("data:,{}", "z".repeat(2_000))))
        .await
        .unwrap_err();
    assert!(err.is_quota());

    let kept = h.runtime.coordinator.drawing_for_url(PAGE).await.unwrap().unwrap();
    assert_eq!(kept.canvas_data, "data:,small");
}

#[tokio::test]
async fn worker_that_cannot_start_leaves_annotation_pending() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(SqliteBackend::open(dir.path().join("p.db"), 1 << 20).unwrap());
    let annotations = Arc::new(LocalAnnotationStore::new(backend.clone()));
    let drawings = Arc::new(LocalDrawingStore::new(backend));
    let host = Arc::new(TaskHost::new(|| Err(HostError::Startup("remote client unavailable".into()))));
    let coordinator = Coordinator::new(
        annotations.clone(),
        drawings,
        Arc::new(SyncBridge::new(host.clone())),
        Arc::new(StaticIdentity::signed_in(AUTHOR)),
        Arc::new(StaticSearch::empty()),
    );

    let outcome = coordinator.create_annotation(new_note("world", "c")).await.unwrap();
    match &outcome.sync {
        SyncState::Pending { warning } => assert!(warning.contains("remote client unavailable")),
        other => panic!("expected pending, got {other:?}"),
    }

    let stored = annotations.get_for_url(PAGE).await.unwrap();
    assert_eq!(stored, vec![outcome.item]);
    assert!(stored[0].remote_ref.is_none());
    assert_eq!(host.contexts_created(), 0);
}

#[tokio::test]
async fn deleting_synced_annotation_removes_remote_record() {
    let h = Harness::sqlite();
    let outcome = h.runtime.coordinator.create_annotation(new_note("world", "c")).await.unwrap();
    let SyncState::Synced(remote_ref) = outcome.sync else {
        panic!("expected synced");
    };

    assert!(h.runtime.coordinator.delete_annotation(PAGE, &outcome.item.id).await.unwrap());
    h.runtime.shutdown().await;

    assert!(h.remote.record(&remote_ref).is_none());
    assert!(h.runtime.annotations.get_for_url(PAGE).await.unwrap().is_empty());
}

#[tokio::test]
async fn signed_out_items_never_become_pending() {
    let h = Harness::sqlite();
    h.identity.sign_out();
    let outcome = h.runtime.coordinator.create_annotation(new_note("world", "c")).await.unwrap();
    assert_eq!(outcome.sync, SyncState::LocalOnly);

    h.identity.sign_in(AUTHOR);
    let result = h.runtime.coordinator.sync_now().await.unwrap();
    assert_eq!(result.annotations_synced, 0);
    assert_eq!(h.remote.put_calls(), 0);
}
