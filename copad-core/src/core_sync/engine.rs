/*
    engine.rs - Document sync orchestrator

    Owns the version clock, drives initialization (fetch-or-create), routes
    the change-notification stream through the conflict resolver, persists
    debounced local edits with optimistic bump and rollback-on-failure, and
    exposes the current content plus status flags.

    State machine: Initializing -> Ready, with Saving and Refreshing as
    transient states and Error reserved for failures before content is
    available (initial load, subscription breakdown). Write failures are
    reported, never fatal: the engine returns to Ready and keeps the unsent
    content pending for retry.
*/

use super::backend::{DocumentBackend, SubscriptionEvent};
use super::backup::BackupStore;
use super::clock::VersionClock;
use super::debounce::{DebounceHandle, Debouncer};
use super::document::{DocumentRow, PendingEdit};
use super::errors::{SyncError, SyncResult};
use super::resolver::ConflictResolver;
use super::types::{ClientId, DocumentId};
use crate::config::Config;
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

const APPLIED_CAPACITY: usize = 64;

/// Engine lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// Initial fetch-or-create has not completed
    Initializing,
    /// Editing and syncing normally
    Ready,
    /// A persist call is in flight; further saves are rejected
    Saving,
    /// An explicit refresh fetch is in flight
    Refreshing,
    /// Blocking failure: load failed or the notification channel broke
    Error,
}

struct EngineState {
    sync_state: SyncState,
    clock: VersionClock,
    /// Current local content, optimistic during an in-flight save
    content: String,
    /// Typed-but-not-persisted content awaiting a save attempt
    pending: Option<PendingEdit>,
    edit_seq: u64,
    /// True between issuing a persist call and its acknowledgment; lets the
    /// host tell the echo of its own write from an external update
    local_update_in_flight: bool,
    last_error: Option<String>,
}

/// Document sync engine for one editing session of one document.
pub struct SyncEngine {
    backend: Arc<dyn DocumentBackend>,
    backup: Arc<dyn BackupStore>,
    document_id: DocumentId,
    client_id: ClientId,
    resolver: ConflictResolver,
    config: Config,
    state: RwLock<EngineState>,
    applied_tx: mpsc::Sender<DocumentRow>,
    listener: Mutex<Option<JoinHandle<()>>>,
    debounce: Mutex<Option<DebounceHandle>>,
}

impl SyncEngine {
    /// Build an engine. Returns the engine plus the applied-updates channel:
    /// every remotely accepted row (and every refresh result) is delivered
    /// there for the reconciler to put on the surface.
    pub fn new(
        backend: Arc<dyn DocumentBackend>,
        backup: Arc<dyn BackupStore>,
        document_id: DocumentId,
        client_id: ClientId,
        config: Config,
    ) -> (Arc<Self>, mpsc::Receiver<DocumentRow>) {
        let (applied_tx, applied_rx) = mpsc::channel(APPLIED_CAPACITY);
        let engine = Arc::new(SyncEngine {
            backend,
            backup,
            document_id,
            resolver: ConflictResolver::new(client_id.clone()),
            client_id,
            config,
            state: RwLock::new(EngineState {
                sync_state: SyncState::Initializing,
                clock: VersionClock::new(),
                content: String::new(),
                pending: None,
                edit_seq: 0,
                local_update_in_flight: false,
                last_error: None,
            }),
            applied_tx,
            listener: Mutex::new(None),
            debounce: Mutex::new(None),
        });
        (engine, applied_rx)
    }

    pub fn document_id(&self) -> &DocumentId {
        &self.document_id
    }

    pub fn client_id(&self) -> &ClientId {
        &self.client_id
    }

    /// Fetch the document, creating it when absent, then subscribe to the
    /// notification stream. Retryable: calling again after an `Error` state
    /// repeats the whole sequence; calling when already `Ready` is a no-op.
    pub async fn initialize(self: &Arc<Self>) -> SyncResult<()> {
        {
            let state = self.state.read().await;
            if state.sync_state == SyncState::Ready {
                return Ok(());
            }
        }

        let row = match self.fetch_or_create().await {
            Ok(row) => row,
            Err(e) => {
                // last resort: a stale backup beats a blank editor
                let recovered = self.backup.load(&self.document_id);
                let mut state = self.state.write().await;
                state.sync_state = SyncState::Error;
                state.last_error = Some(e.to_string());
                if let Some(content) = recovered {
                    warn!(document = %self.document_id, "load failed, recovered local backup");
                    state.content = content;
                }
                return Err(SyncError::LoadFailure(e.to_string()));
            }
        };

        // Hold the state lock across subscription setup: a peer write that
        // commits right after the subscription opens must not be overwritten
        // by the older fetched row once the listener task gets to run.
        let mut state = self.state.write().await;
        if let Err(e) = self.spawn_listener().await {
            state.sync_state = SyncState::Error;
            state.last_error = Some(e.to_string());
            return Err(e);
        }
        state.clock.observe(
            row.version,
            row.updated_at,
            row.client_id.clone(),
            row.content.clone(),
        );
        state.content = row.content;
        state.sync_state = SyncState::Ready;
        state.last_error = None;
        info!(
            document = %self.document_id,
            version = row.version,
            "sync engine ready"
        );
        Ok(())
    }

    /// Fetch the row, creating it when absent. A failed create re-fetches
    /// once: losing a concurrent create race means the row exists now.
    async fn fetch_or_create(&self) -> SyncResult<DocumentRow> {
        if let Some(row) = self.backend.fetch(&self.document_id).await? {
            return Ok(row);
        }
        info!(document = %self.document_id, "document absent, creating");
        match self
            .backend
            .create(&self.document_id, "", &self.client_id)
            .await
        {
            Ok(row) => Ok(row),
            Err(create_err) => {
                warn!(
                    document = %self.document_id,
                    error = %create_err,
                    "create failed, re-fetching"
                );
                match self.backend.fetch(&self.document_id).await? {
                    Some(row) => Ok(row),
                    None => Err(create_err),
                }
            }
        }
    }

    /// Register a local edit: remembers it as the pending edit and feeds the
    /// debouncer, which will call `save` after the quiet period.
    pub async fn edit(self: &Arc<Self>, content: impl Into<String>) {
        let content = content.into();
        {
            let mut state = self.state.write().await;
            state.edit_seq += 1;
            state.content = content.clone();
            state.pending = Some(PendingEdit {
                content: content.clone(),
                edit_seq: state.edit_seq,
            });
        }
        let handle = self.debounce_handle();
        match handle {
            Some(handle) => handle.update(content),
            None => debug!("edit without attached debouncer; waiting for explicit save"),
        }
    }

    /// Spawn the debouncer and the pump that turns its emissions into save
    /// calls. Idempotent per engine.
    pub fn attach_debouncer(self: &Arc<Self>) -> DebounceHandle {
        let mut slot = self.debounce.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(handle) = slot.as_ref() {
            return handle.clone();
        }

        let (handle, mut emissions) = Debouncer::spawn(self.config.sync.debounce_quiet);
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(content) = emissions.recv().await {
                if let Err(e) = engine.save(&content).await {
                    // content stays pending; the next emission or an
                    // explicit save retries it
                    warn!(error = %e, "debounced save failed");
                }
            }
        });

        *slot = Some(handle.clone());
        handle
    }

    /// Persist `content` as the next document revision.
    ///
    /// No-op when `content` equals the last successfully persisted content:
    /// zero writes, zero version bumps. On failure the optimistic version
    /// bump is abandoned (the clock was never committed) and the content is
    /// kept pending for retry.
    pub async fn save(&self, content: &str) -> SyncResult<()> {
        let version = {
            let mut state = self.state.write().await;
            match state.sync_state {
                SyncState::Ready => {}
                SyncState::Saving => {
                    return Err(SyncError::InvalidState(
                        "a save is already in flight".to_string(),
                    ));
                }
                other => {
                    return Err(SyncError::InvalidState(format!(
                        "cannot save while {:?}",
                        other
                    )));
                }
            }

            if content == state.clock.last_content() {
                debug!(document = %self.document_id, "content unchanged, skipping save");
                if state.pending.as_ref().map(|p| p.content.as_str()) == Some(content) {
                    state.pending = None;
                }
                return Ok(());
            }

            state.sync_state = SyncState::Saving;
            state.local_update_in_flight = true;
            state.content = content.to_string();
            state.clock.bump()
        };

        // optimistic local copy, survives a backend outage
        self.write_backup(content);

        let result = self
            .backend
            .update(&self.document_id, content, &self.client_id, version)
            .await;

        let mut state = self.state.write().await;
        state.sync_state = SyncState::Ready;
        state.local_update_in_flight = false;

        match result {
            Ok(row) => {
                state.clock.observe(
                    row.version,
                    row.updated_at,
                    row.client_id,
                    row.content.clone(),
                );
                if state.pending.as_ref().map(|p| p.content.as_str()) == Some(content) {
                    state.pending = None;
                }
                metrics::counter!("copad_saves", "result" => "ok").increment(1);
                debug!(
                    document = %self.document_id,
                    version = row.version,
                    "saved document revision"
                );
                Ok(())
            }
            Err(e) => {
                // bump abandoned: observe was never called, so known_version
                // is unchanged and the next save retries from the same base
                state.last_error = Some(e.to_string());
                if state.pending.is_none() {
                    state.edit_seq += 1;
                    state.pending = Some(PendingEdit {
                        content: content.to_string(),
                        edit_seq: state.edit_seq,
                    });
                }
                metrics::counter!("copad_saves", "result" => "error").increment(1);
                error!(document = %self.document_id, error = %e, "save failed");
                Err(SyncError::WriteFailure(e.to_string()))
            }
        }
    }

    /// Retry the pending edit, if any. Meant for a manual "save now" action
    /// after a write failure.
    pub async fn save_pending(&self) -> SyncResult<()> {
        let pending = {
            let state = self.state.read().await;
            state.pending.clone()
        };
        match pending {
            Some(edit) => self.save(&edit.content).await,
            None => Ok(()),
        }
    }

    /// Re-fetch the backend row and replace local content with it,
    /// regardless of dirty state. Explicit user override: bypasses the
    /// conflict resolver entirely. Returns the fetched content.
    pub async fn refresh(&self) -> SyncResult<String> {
        {
            let mut state = self.state.write().await;
            match state.sync_state {
                SyncState::Ready => state.sync_state = SyncState::Refreshing,
                other => {
                    return Err(SyncError::InvalidState(format!(
                        "cannot refresh while {:?}",
                        other
                    )));
                }
            }
        }

        let result = self.backend.fetch(&self.document_id).await;

        let mut state = self.state.write().await;
        state.sync_state = SyncState::Ready;

        let row = match result {
            Ok(Some(row)) => row,
            Ok(None) => {
                state.last_error = Some("document missing on refresh".to_string());
                return Err(SyncError::RefreshFailure(
                    "document missing on refresh".to_string(),
                ));
            }
            Err(e) => {
                state.last_error = Some(e.to_string());
                return Err(SyncError::RefreshFailure(e.to_string()));
            }
        };

        state.clock.observe(
            row.version,
            row.updated_at,
            row.client_id.clone(),
            row.content.clone(),
        );
        state.content = row.content.clone();
        state.pending = None;
        drop(state);

        metrics::counter!("copad_refreshes").increment(1);
        info!(document = %self.document_id, version = row.version, "refreshed from backend");

        // refresh always wins locally: hand it to the reconciler too
        let content = row.content.clone();
        let _ = self.applied_tx.send(row).await;
        Ok(content)
    }

    /// Current local content (optimistic during an in-flight save).
    pub async fn content(&self) -> String {
        self.state.read().await.content.clone()
    }

    pub async fn state(&self) -> SyncState {
        self.state.read().await.sync_state
    }

    pub async fn known_version(&self) -> u64 {
        self.state.read().await.clock.known_version()
    }

    pub async fn last_error(&self) -> Option<String> {
        self.state.read().await.last_error.clone()
    }

    /// True while local edits have not been acknowledged by the backend.
    pub async fn is_dirty(&self) -> bool {
        if self.state.read().await.pending.is_some() {
            return true;
        }
        self.debounce_handle().map(|h| h.is_dirty()).unwrap_or(false)
    }

    /// True between issuing a persist call and its acknowledgment.
    pub async fn is_local_update_in_flight(&self) -> bool {
        self.state.read().await.local_update_in_flight
    }

    /// Teardown: stop the notification listener, then best-effort flush of
    /// any pending edit so typed content is not lost.
    pub async fn shutdown(&self) {
        if let Some(listener) = self
            .listener
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            listener.abort();
        }

        let pending = {
            let state = self.state.read().await;
            state
                .pending
                .as_ref()
                .filter(|p| p.content != state.clock.last_content())
                .cloned()
        };
        if let Some(edit) = pending {
            if let Err(e) = self.save(&edit.content).await {
                // backend refused; the backup copy is all that survives
                warn!(error = %e, "final flush failed, content kept in backup");
                self.write_backup(&edit.content);
            }
        }

        debug!(document = %self.document_id, "sync engine shut down");
    }

    fn debounce_handle(&self) -> Option<DebounceHandle> {
        self.debounce
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn write_backup(&self, content: &str) {
        if !self.config.backup.enabled {
            return;
        }
        if let Err(e) = self.backup.save(&self.document_id, content) {
            warn!(document = %self.document_id, error = %e, "backup write failed");
        }
    }

    async fn spawn_listener(self: &Arc<Self>) -> SyncResult<()> {
        if self
            .listener
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
        {
            return Ok(());
        }

        let mut subscription = self.backend.subscribe(&self.document_id).await?;
        let engine = Arc::clone(self);
        let handle = tokio::spawn(async move {
            while let Some(event) = subscription.events.recv().await {
                match event {
                    SubscriptionEvent::Update(row) => engine.on_remote_update(row).await,
                    SubscriptionEvent::Error(msg) => {
                        error!(document = %engine.document_id, error = %msg, "subscription error");
                        let mut state = engine.state.write().await;
                        state.sync_state = SyncState::Error;
                        state.last_error =
                            Some(SyncError::SubscriptionError(msg).to_string());
                    }
                }
            }
        });

        let mut slot = self.listener.lock().unwrap_or_else(|e| e.into_inner());
        if slot.is_some() {
            // raced with another initialize; keep the first listener
            handle.abort();
        } else {
            *slot = Some(handle);
        }
        Ok(())
    }

    /// Evaluate one notification against the clock as of arrival. A remote
    /// update landing during an unconfirmed optimistic bump may be rejected
    /// against the optimistic timestamp; that window is an accepted
    /// last-writer-wins tradeoff, not an ordering bug.
    async fn on_remote_update(self: &Arc<Self>, row: DocumentRow) {
        let accepted = {
            let mut state = self.state.write().await;
            let resolution = self.resolver.resolve(&row, &state.clock);
            if resolution.is_accept() {
                state.clock.observe(
                    row.version,
                    row.updated_at,
                    row.client_id.clone(),
                    row.content.clone(),
                );
                state.content = row.content.clone();
                true
            } else {
                false
            }
        };

        if accepted {
            self.write_backup(&row.content);
            debug!(
                document = %self.document_id,
                version = row.version,
                "applied remote update"
            );
            let _ = self.applied_tx.send(row).await;
        }
    }
}
