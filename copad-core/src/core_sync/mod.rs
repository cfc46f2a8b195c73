/*
    core_sync - Document synchronization engine

    The client-side state layer for collaborative plain-text editing.
    Handles:
    - Version/timestamp tracking for the shared document row
    - Last-writer-wins conflict resolution for remote notifications
    - Debounced persistence of bursts of local edits
    - Fetch-or-create initialization with local backup recovery
    - Cursor-preserving application of remote content to a surface
*/

pub mod backend;
pub mod backup;
pub mod clock;
pub mod debounce;
pub mod document;
pub mod engine;
pub mod errors;
pub mod memory;
pub mod reconciler;
pub mod resolver;
pub mod types;

#[cfg(test)]
pub mod tests;

// Re-export commonly used types
pub use backend::{DocumentBackend, Subscription, SubscriptionEvent};
pub use backup::{backup_key, BackupStore, FileBackupStore, MemoryBackupStore};
pub use clock::VersionClock;
pub use debounce::{DebounceHandle, Debouncer};
pub use document::{CursorSnapshot, DocumentRow, PendingEdit};
pub use engine::{SyncEngine, SyncState};
pub use errors::{SyncError, SyncResult};
pub use memory::MemoryBackend;
pub use reconciler::{CursorPreservingReconciler, EditableSurface};
pub use resolver::{ConflictResolver, RejectReason, Resolution};
pub use types::{ClientId, DocumentId, Timestamp};
