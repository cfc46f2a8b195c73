/*
    memory.rs - In-memory document backend

    Reference implementation of the backend seam for tests and the CLI
    simulator. Behaves like the real thing where it matters:
    - server-assigned, strictly monotonic per-process commit timestamps
    - notifications fan out to all subscribers, writer included
    - at-least-once delivery (duplicate delivery can be switched on)
    - injectable fetch/create/update failures
*/

use super::backend::{DocumentBackend, Subscription, SubscriptionEvent};
use super::document::DocumentRow;
use super::errors::{SyncError, SyncResult};
use super::types::{ClientId, DocumentId, Timestamp};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::{broadcast, mpsc};
use tracing::debug;

const NOTIFY_CAPACITY: usize = 64;

#[derive(Default)]
struct State {
    rows: HashMap<DocumentId, DocumentRow>,
    channels: HashMap<DocumentId, broadcast::Sender<DocumentRow>>,
}

/// Shared in-memory row store with a broadcast notification channel per row.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    state: Arc<RwLock<State>>,
    server_clock: Arc<AtomicU64>,
    fail_next_fetch: Arc<AtomicBool>,
    fail_next_create: Arc<AtomicBool>,
    fail_next_update: Arc<AtomicBool>,
    duplicate_delivery: Arc<AtomicBool>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next fetch fail, once.
    pub fn inject_fetch_failure(&self) {
        self.fail_next_fetch.store(true, Ordering::Release);
    }

    /// Make the next create fail, once. No row is inserted.
    pub fn inject_create_failure(&self) {
        self.fail_next_create.store(true, Ordering::Release);
    }

    /// Make the next update fail, once. The row is left untouched.
    pub fn inject_update_failure(&self) {
        self.fail_next_update.store(true, Ordering::Release);
    }

    /// Deliver every notification twice, exercising at-least-once handling.
    pub fn enable_duplicate_delivery(&self) {
        self.duplicate_delivery.store(true, Ordering::Release);
    }

    /// Direct row read, bypassing failure injection. For assertions.
    pub fn row(&self, id: &DocumentId) -> Option<DocumentRow> {
        self.state.read().ok()?.rows.get(id).cloned()
    }

    /// Server-assigned commit time: wall clock, forced strictly increasing
    /// so two commits in the same millisecond still order.
    fn next_timestamp(&self) -> Timestamp {
        let now = Timestamp::now().as_millis();
        let mut last = self.server_clock.load(Ordering::Acquire);
        loop {
            let next = now.max(last + 1);
            match self.server_clock.compare_exchange_weak(
                last,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Timestamp::from_millis(next),
                Err(observed) => last = observed,
            }
        }
    }

    fn lock_err() -> SyncError {
        SyncError::LoadFailure("backend state lock poisoned".to_string())
    }

    fn commit(&self, row: DocumentRow) -> SyncResult<DocumentRow> {
        let mut state = self.state.write().map_err(|_| Self::lock_err())?;
        state.rows.insert(row.id.clone(), row.clone());
        if let Some(tx) = state.channels.get(&row.id) {
            // no receivers is fine; send only fails when nobody listens
            let _ = tx.send(row.clone());
        }
        Ok(row)
    }
}

#[async_trait]
impl DocumentBackend for MemoryBackend {
    async fn fetch(&self, id: &DocumentId) -> SyncResult<Option<DocumentRow>> {
        if self.fail_next_fetch.swap(false, Ordering::AcqRel) {
            return Err(SyncError::LoadFailure("injected fetch failure".to_string()));
        }
        let state = self.state.read().map_err(|_| Self::lock_err())?;
        Ok(state.rows.get(id).cloned())
    }

    async fn create(
        &self,
        id: &DocumentId,
        content: &str,
        client_id: &ClientId,
    ) -> SyncResult<DocumentRow> {
        if self.fail_next_create.swap(false, Ordering::AcqRel) {
            return Err(SyncError::WriteFailure(
                "injected create failure".to_string(),
            ));
        }
        {
            let state = self.state.read().map_err(|_| Self::lock_err())?;
            if state.rows.contains_key(id) {
                return Err(SyncError::WriteFailure(format!(
                    "document already exists: {}",
                    id
                )));
            }
        }
        let row = DocumentRow::new(
            id.clone(),
            content,
            1,
            client_id.clone(),
            self.next_timestamp(),
        );
        debug!(document = %id, client = %client_id, "created document row");
        self.commit(row)
    }

    async fn update(
        &self,
        id: &DocumentId,
        content: &str,
        client_id: &ClientId,
        version: u64,
    ) -> SyncResult<DocumentRow> {
        if self.fail_next_update.swap(false, Ordering::AcqRel) {
            return Err(SyncError::WriteFailure(
                "injected update failure".to_string(),
            ));
        }
        {
            let state = self.state.read().map_err(|_| Self::lock_err())?;
            if !state.rows.contains_key(id) {
                return Err(SyncError::NotFound(id.to_string()));
            }
        }
        // The row is a last-writer-wins register: the backend does not
        // validate the client's version against the stored one.
        let row = DocumentRow::new(
            id.clone(),
            content,
            version,
            client_id.clone(),
            self.next_timestamp(),
        );
        self.commit(row)
    }

    async fn subscribe(&self, id: &DocumentId) -> SyncResult<Subscription> {
        let mut rx = {
            let mut state = self.state.write().map_err(|_| Self::lock_err())?;
            state
                .channels
                .entry(id.clone())
                .or_insert_with(|| broadcast::channel(NOTIFY_CAPACITY).0)
                .subscribe()
        };

        let (event_tx, event_rx) = mpsc::channel(NOTIFY_CAPACITY);
        let duplicate = Arc::clone(&self.duplicate_delivery);

        let forwarder = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(row) => {
                        let redeliver = duplicate.load(Ordering::Acquire);
                        if event_tx
                            .send(SubscriptionEvent::Update(row.clone()))
                            .await
                            .is_err()
                        {
                            break;
                        }
                        if redeliver
                            && event_tx
                                .send(SubscriptionEvent::Update(row))
                                .await
                                .is_err()
                        {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        let msg = format!("subscriber lagged, missed {} updates", missed);
                        if event_tx.send(SubscriptionEvent::Error(msg)).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        Ok(Subscription::new(event_rx, forwarder))
    }
}
