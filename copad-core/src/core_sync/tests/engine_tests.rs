/*
    Engine lifecycle tests

    All over the in-memory backend: fetch-or-create, the redundant-save
    guard, rollback of the optimistic bump, backup recovery, refresh, echo
    suppression, and teardown flushing.
*/

use crate::config::Config;
use crate::core_sync::backend::{DocumentBackend, Subscription, SubscriptionEvent};
use crate::core_sync::backup::{BackupStore, MemoryBackupStore};
use crate::core_sync::document::DocumentRow;
use crate::core_sync::engine::{SyncEngine, SyncState};
use crate::core_sync::errors::{SyncError, SyncResult};
use crate::core_sync::memory::MemoryBackend;
use crate::core_sync::types::{ClientId, DocumentId};
use crate::test_utils::{recv_timeout, row};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

fn doc() -> DocumentId {
    DocumentId::new("doc1")
}

fn engine_for(
    backend: &MemoryBackend,
    backup: &Arc<MemoryBackupStore>,
    client: &str,
) -> (Arc<SyncEngine>, mpsc::Receiver<DocumentRow>) {
    SyncEngine::new(
        Arc::new(backend.clone()),
        Arc::clone(backup) as Arc<dyn BackupStore>,
        doc(),
        ClientId::new(client),
        Config::default(),
    )
}

#[tokio::test]
async fn test_initialize_creates_missing_document() {
    let backend = MemoryBackend::new();
    let backup = Arc::new(MemoryBackupStore::new());
    let (engine, _applied) = engine_for(&backend, &backup, "a");

    engine.initialize().await.unwrap();

    assert_eq!(engine.state().await, SyncState::Ready);
    assert_eq!(engine.known_version().await, 1);
    assert_eq!(engine.content().await, "");

    let row = backend.row(&doc()).unwrap();
    assert_eq!(row.version, 1);
    assert_eq!(row.content, "");
}

#[tokio::test]
async fn test_initialize_loads_existing_document() {
    let backend = MemoryBackend::new();
    backend
        .create(&doc(), "existing text", &ClientId::new("author"))
        .await
        .unwrap();

    let backup = Arc::new(MemoryBackupStore::new());
    let (engine, _applied) = engine_for(&backend, &backup, "b");
    engine.initialize().await.unwrap();

    assert_eq!(engine.content().await, "existing text");
    assert_eq!(engine.known_version().await, 1);
}

#[tokio::test]
async fn test_initialize_failure_recovers_backup() {
    let backend = MemoryBackend::new();
    let backup = Arc::new(MemoryBackupStore::new());
    backup.save(&doc(), "stale but readable").unwrap();

    let (engine, _applied) = engine_for(&backend, &backup, "a");
    backend.inject_fetch_failure();

    let err = engine.initialize().await;
    assert!(matches!(err, Err(SyncError::LoadFailure(_))));
    assert_eq!(engine.state().await, SyncState::Error);
    // never a blank editor when a backup exists
    assert_eq!(engine.content().await, "stale but readable");

    // the failure was one-shot; initialize is retryable
    engine.initialize().await.unwrap();
    assert_eq!(engine.state().await, SyncState::Ready);
}

#[tokio::test]
async fn test_create_failure_recovers_backup_and_stays_retryable() {
    let backend = MemoryBackend::new();
    let backup = Arc::new(MemoryBackupStore::new());
    backup.save(&doc(), "draft from last session").unwrap();

    let (engine, _applied) = engine_for(&backend, &backup, "a");
    backend.inject_create_failure();

    let err = engine.initialize().await;
    assert!(matches!(err, Err(SyncError::LoadFailure(_))));
    assert_eq!(engine.state().await, SyncState::Error);
    assert_eq!(engine.content().await, "draft from last session");

    // one-shot failure again; the retry creates the row
    engine.initialize().await.unwrap();
    assert_eq!(engine.state().await, SyncState::Ready);
    assert_eq!(backend.row(&doc()).unwrap().version, 1);
}

/// Scripts the loser's view of a concurrent create race: the first fetch
/// reports the row absent, create then collides with the winner, and the
/// follow-up fetch finds the winner's row.
struct LostCreateRaceBackend {
    winner: DocumentRow,
    first_fetch: AtomicBool,
}

#[async_trait]
impl DocumentBackend for LostCreateRaceBackend {
    async fn fetch(&self, _id: &DocumentId) -> SyncResult<Option<DocumentRow>> {
        if self.first_fetch.swap(false, Ordering::AcqRel) {
            Ok(None)
        } else {
            Ok(Some(self.winner.clone()))
        }
    }

    async fn create(
        &self,
        id: &DocumentId,
        _content: &str,
        _client_id: &ClientId,
    ) -> SyncResult<DocumentRow> {
        Err(SyncError::WriteFailure(format!(
            "document already exists: {}",
            id
        )))
    }

    async fn update(
        &self,
        _id: &DocumentId,
        _content: &str,
        _client_id: &ClientId,
        _version: u64,
    ) -> SyncResult<DocumentRow> {
        Err(SyncError::WriteFailure(
            "read-only scripted backend".to_string(),
        ))
    }

    async fn subscribe(&self, _id: &DocumentId) -> SyncResult<Subscription> {
        let (tx, rx) = mpsc::channel(4);
        let forwarder = tokio::spawn(async move {
            // hold the sender so the stream stays open
            let _tx = tx;
            std::future::pending::<()>().await;
        });
        Ok(Subscription::new(rx, forwarder))
    }
}

#[tokio::test]
async fn test_lost_create_race_adopts_winning_row() {
    let backend = Arc::new(LostCreateRaceBackend {
        winner: row("doc1", "peer won the race", 1, "peer", 100),
        first_fetch: AtomicBool::new(true),
    });
    let backup = Arc::new(MemoryBackupStore::new());
    let (engine, _applied) = SyncEngine::new(
        backend,
        Arc::clone(&backup) as Arc<dyn BackupStore>,
        doc(),
        ClientId::new("viewer"),
        Config::default(),
    );
    engine.initialize().await.unwrap();

    assert_eq!(engine.state().await, SyncState::Ready);
    assert_eq!(engine.content().await, "peer won the race");
    assert_eq!(engine.known_version().await, 1);
}

/// Backend whose notification stream already carries a newer peer revision
/// when the subscription is handed back: the write committed between the
/// initial fetch and the first poll of the listener.
struct StaleFetchBackend {
    fetched: DocumentRow,
    queued: DocumentRow,
}

#[async_trait]
impl DocumentBackend for StaleFetchBackend {
    async fn fetch(&self, _id: &DocumentId) -> SyncResult<Option<DocumentRow>> {
        Ok(Some(self.fetched.clone()))
    }

    async fn create(
        &self,
        _id: &DocumentId,
        _content: &str,
        _client_id: &ClientId,
    ) -> SyncResult<DocumentRow> {
        Err(SyncError::WriteFailure("row always present".to_string()))
    }

    async fn update(
        &self,
        _id: &DocumentId,
        _content: &str,
        _client_id: &ClientId,
        _version: u64,
    ) -> SyncResult<DocumentRow> {
        Err(SyncError::WriteFailure(
            "read-only scripted backend".to_string(),
        ))
    }

    async fn subscribe(&self, _id: &DocumentId) -> SyncResult<Subscription> {
        let (tx, rx) = mpsc::channel(4);
        let queued = self.queued.clone();
        let forwarder = tokio::spawn(async move {
            let _ = tx.send(SubscriptionEvent::Update(queued)).await;
            std::future::pending::<()>().await;
        });
        Ok(Subscription::new(rx, forwarder))
    }
}

#[tokio::test]
async fn test_update_arriving_during_initialize_is_not_regressed() {
    let backend = Arc::new(StaleFetchBackend {
        fetched: row("doc1", "fetched revision", 1, "author", 100),
        queued: row("doc1", "committed right after subscribe", 2, "peer", 200),
    });
    let backup = Arc::new(MemoryBackupStore::new());
    let (engine, mut applied) = SyncEngine::new(
        backend,
        Arc::clone(&backup) as Arc<dyn BackupStore>,
        doc(),
        ClientId::new("viewer"),
        Config::default(),
    );
    engine.initialize().await.unwrap();

    // the queued revision is newer: it must reach the applied channel and
    // stick, never be clobbered by the older fetched row
    let update = recv_timeout(&mut applied, Duration::from_secs(1)).await;
    assert_eq!(update.content, "committed right after subscribe");
    assert_eq!(engine.content().await, "committed right after subscribe");
    assert_eq!(engine.known_version().await, 2);
}

#[tokio::test]
async fn test_save_bumps_version_and_writes_backup() {
    let backend = MemoryBackend::new();
    let backup = Arc::new(MemoryBackupStore::new());
    let (engine, _applied) = engine_for(&backend, &backup, "a");
    engine.initialize().await.unwrap();

    engine.save("hello").await.unwrap();

    assert_eq!(engine.known_version().await, 2);
    let row = backend.row(&doc()).unwrap();
    assert_eq!(row.content, "hello");
    assert_eq!(row.version, 2);
    assert_eq!(backup.load(&doc()), Some("hello".to_string()));
}

#[tokio::test]
async fn test_save_identical_content_is_noop() {
    let backend = MemoryBackend::new();
    let backup = Arc::new(MemoryBackupStore::new());
    let (engine, _applied) = engine_for(&backend, &backup, "a");
    engine.initialize().await.unwrap();

    engine.save("hello").await.unwrap();
    let row_before = backend.row(&doc()).unwrap();

    engine.save("hello").await.unwrap();

    // zero writes, zero bumps
    assert_eq!(engine.known_version().await, 2);
    assert_eq!(backend.row(&doc()).unwrap(), row_before);
}

#[tokio::test]
async fn test_save_failure_reverts_bump_and_keeps_pending() {
    let backend = MemoryBackend::new();
    let backup = Arc::new(MemoryBackupStore::new());
    let (engine, _applied) = engine_for(&backend, &backup, "a");
    engine.initialize().await.unwrap();

    backend.inject_update_failure();
    let err = engine.save("doomed").await;
    assert!(matches!(err, Err(SyncError::WriteFailure(_))));

    // bump fully reverted, editing remains possible
    assert_eq!(engine.known_version().await, 1);
    assert_eq!(engine.state().await, SyncState::Ready);
    assert!(engine.is_dirty().await);
    // optimistic content retained locally and in the backup
    assert_eq!(engine.content().await, "doomed");
    assert_eq!(backup.load(&doc()), Some("doomed".to_string()));

    // manual retry picks up the pending edit
    engine.save_pending().await.unwrap();
    assert_eq!(engine.known_version().await, 2);
    assert_eq!(backend.row(&doc()).unwrap().content, "doomed");
    assert!(!engine.is_dirty().await);
}

#[tokio::test]
async fn test_own_echo_not_forwarded_to_surface() {
    let backend = MemoryBackend::new();
    let backup = Arc::new(MemoryBackupStore::new());
    let (engine, mut applied) = engine_for(&backend, &backup, "a");
    engine.initialize().await.unwrap();

    engine.save("typed locally").await.unwrap();

    crate::test_utils::assert_no_message(&mut applied, Duration::from_millis(50)).await;
}

#[tokio::test]
async fn test_remote_update_applied_and_forwarded() {
    let backend = MemoryBackend::new();
    let backup = Arc::new(MemoryBackupStore::new());
    let (engine, mut applied) = engine_for(&backend, &backup, "a");
    engine.initialize().await.unwrap();

    // a peer writes directly through the backend
    backend
        .update(&doc(), "peer text", &ClientId::new("peer"), 2)
        .await
        .unwrap();

    let row = recv_timeout(&mut applied, Duration::from_secs(1)).await;
    assert_eq!(row.content, "peer text");
    assert_eq!(engine.content().await, "peer text");
    assert_eq!(engine.known_version().await, 2);
    // accepted remote content also lands in the backup
    assert_eq!(backup.load(&doc()), Some("peer text".to_string()));
}

#[tokio::test]
async fn test_duplicate_notifications_apply_once() {
    let backend = MemoryBackend::new();
    backend.enable_duplicate_delivery();
    let backup = Arc::new(MemoryBackupStore::new());
    let (engine, mut applied) = engine_for(&backend, &backup, "a");
    engine.initialize().await.unwrap();

    backend
        .update(&doc(), "once", &ClientId::new("peer"), 2)
        .await
        .unwrap();

    let row = recv_timeout(&mut applied, Duration::from_secs(1)).await;
    assert_eq!(row.content, "once");
    crate::test_utils::assert_no_message(&mut applied, Duration::from_millis(50)).await;
    assert_eq!(engine.known_version().await, 2);
}

#[tokio::test]
async fn test_refresh_replaces_content_unconditionally() {
    let backend = MemoryBackend::new();
    let backup = Arc::new(MemoryBackupStore::new());
    let (engine, mut applied) = engine_for(&backend, &backup, "a");
    engine.initialize().await.unwrap();
    engine.save("local revision").await.unwrap();

    // a peer overwrote the row; simulate the notification being missed by
    // refreshing explicitly
    backend
        .update(&doc(), "authoritative", &ClientId::new("peer"), 3)
        .await
        .unwrap();

    let content = engine.refresh().await.unwrap();
    assert_eq!(content, "authoritative");
    assert_eq!(engine.content().await, "authoritative");
    assert_eq!(engine.known_version().await, 3);

    // refresh results reach the surface like accepted remote updates
    let row = recv_timeout(&mut applied, Duration::from_secs(1)).await;
    assert_eq!(row.content, "authoritative");
}

#[tokio::test]
async fn test_refresh_failure_leaves_state_unchanged() {
    let backend = MemoryBackend::new();
    let backup = Arc::new(MemoryBackupStore::new());
    let (engine, _applied) = engine_for(&backend, &backup, "a");
    engine.initialize().await.unwrap();
    engine.save("kept").await.unwrap();

    backend.inject_fetch_failure();
    let err = engine.refresh().await;
    assert!(matches!(err, Err(SyncError::RefreshFailure(_))));

    assert_eq!(engine.state().await, SyncState::Ready);
    assert_eq!(engine.content().await, "kept");
    assert_eq!(engine.known_version().await, 2);
}

#[tokio::test(start_paused = true)]
async fn test_debounced_edits_coalesce_into_one_save() {
    let backend = MemoryBackend::new();
    let backup = Arc::new(MemoryBackupStore::new());
    let (engine, _applied) = engine_for(&backend, &backup, "a");
    engine.initialize().await.unwrap();
    engine.attach_debouncer();

    for text in ["h", "he", "hel", "hell", "hello"] {
        engine.edit(text).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(engine.is_dirty().await);
    assert_eq!(backend.row(&doc()).unwrap().version, 1, "not yet persisted");

    // let the quiet period elapse and the save land
    tokio::time::sleep(Config::default().sync.debounce_quiet * 2).await;

    let row = backend.row(&doc()).unwrap();
    assert_eq!(row.content, "hello");
    assert_eq!(row.version, 2, "burst coalesced into a single write");
    assert!(!engine.is_dirty().await);
}

#[tokio::test]
async fn test_shutdown_flushes_pending_edit() {
    let backend = MemoryBackend::new();
    let backup = Arc::new(MemoryBackupStore::new());
    let (engine, _applied) = engine_for(&backend, &backup, "a");
    engine.initialize().await.unwrap();
    engine.attach_debouncer();

    engine.edit("typed right before closing").await;
    engine.shutdown().await;

    assert_eq!(
        backend.row(&doc()).unwrap().content,
        "typed right before closing"
    );
}

#[tokio::test]
async fn test_shutdown_keeps_backup_when_flush_fails() {
    let backend = MemoryBackend::new();
    let backup = Arc::new(MemoryBackupStore::new());
    let (engine, _applied) = engine_for(&backend, &backup, "a");
    engine.initialize().await.unwrap();

    engine.edit("almost lost").await;
    backend.inject_update_failure();
    engine.shutdown().await;

    assert_eq!(backend.row(&doc()).unwrap().content, "");
    assert_eq!(backup.load(&doc()), Some("almost lost".to_string()));
}
