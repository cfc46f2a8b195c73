//! Copad core - collaborative plain-text document synchronization
//!
//! Many clients edit one shared document through a backend that offers row
//! storage plus a change-notification stream. This crate is the client-side
//! engine that decides, for every local edit and every remote notification,
//! whether to apply it, when to persist it, and how to put externally sourced
//! content onto an editable surface without losing the caret or an open IME
//! composition.
//!
//! Conflicts resolve at whole-document granularity: last-writer-wins, ordered
//! by backend commit timestamp with the version counter as tiebreak. There is
//! no character-level merge.

pub mod config;
pub mod core_sync;
pub mod logging;

#[cfg(test)]
pub mod test_utils;

pub use config::Config;
pub use core_sync::{
    ClientId, ConflictResolver, CursorSnapshot, DocumentBackend, DocumentId, DocumentRow,
    Resolution, SyncEngine, SyncError, SyncResult, SyncState, Timestamp, VersionClock,
};
pub use logging::{init_logging, init_logging_with_config, LogConfig, LogLevel};
