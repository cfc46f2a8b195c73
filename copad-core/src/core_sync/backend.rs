/*
    backend.rs - Seam to the row-store / notification backend

    The engine talks to persistence through this trait so tests and the CLI
    simulator can run against the in-memory backend while real deployments
    adapt whatever row store they have. The contract, per operation:

    - fetch: by id, None when the row is absent
    - create: insert with version 1; the server assigns updated_at
    - update: whole-row replace tagged {client_id, version}; the server
      assigns updated_at, which is monotonic per row
    - subscribe: change-notification stream delivering post-update row
      snapshots, at-least-once, to all subscribers including the writer
*/

use super::document::DocumentRow;
use super::errors::SyncResult;
use super::types::{ClientId, DocumentId};
use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// One delivery on the change-notification stream
#[derive(Debug, Clone)]
pub enum SubscriptionEvent {
    /// A committed update to the watched row
    Update(DocumentRow),
    /// The channel itself reported an error payload
    Error(String),
}

/// A live change-notification subscription for one document.
///
/// Events arrive on `events`; dropping the subscription stops delivery.
pub struct Subscription {
    /// The delivery channel
    pub events: mpsc::Receiver<SubscriptionEvent>,
    forwarder: JoinHandle<()>,
}

impl Subscription {
    pub fn new(events: mpsc::Receiver<SubscriptionEvent>, forwarder: JoinHandle<()>) -> Self {
        Subscription { events, forwarder }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.forwarder.abort();
    }
}

/// Row storage plus change notification for shared documents.
#[async_trait]
pub trait DocumentBackend: Send + Sync {
    /// Fetch a row by id. `Ok(None)` when the row does not exist.
    async fn fetch(&self, id: &DocumentId) -> SyncResult<Option<DocumentRow>>;

    /// Insert a new row with version 1.
    async fn create(
        &self,
        id: &DocumentId,
        content: &str,
        client_id: &ClientId,
    ) -> SyncResult<DocumentRow>;

    /// Whole-row replace. Returns the written row with the server-assigned
    /// `updated_at`.
    async fn update(
        &self,
        id: &DocumentId,
        content: &str,
        client_id: &ClientId,
        version: u64,
    ) -> SyncResult<DocumentRow>;

    /// Subscribe to committed updates for one row. Delivery is
    /// at-least-once and includes the subscriber's own writes.
    async fn subscribe(&self, id: &DocumentId) -> SyncResult<Subscription>;
}
