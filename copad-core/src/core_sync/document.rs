/*
    document.rs - Shared document row and local transient edit state

    The document is a single flat string per document id. The row is only
    ever replaced whole; there are no deltas on the wire.
*/

use super::types::{ClientId, DocumentId, Timestamp};
use serde::{Deserialize, Serialize};

/// One row of the shared document table, as stored and as delivered on the
/// change-notification stream.
///
/// Invariant: `version` starts at 1 and increases by exactly 1 per accepted
/// write. `client_id` names the session that wrote this revision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRow {
    /// Document key
    pub id: DocumentId,

    /// Full document text
    pub content: String,

    /// Write counter, starts at 1
    pub version: u64,

    /// Session that produced this revision
    pub client_id: ClientId,

    /// Server-assigned commit time
    pub updated_at: Timestamp,
}

impl DocumentRow {
    pub fn new(
        id: DocumentId,
        content: impl Into<String>,
        version: u64,
        client_id: ClientId,
        updated_at: Timestamp,
    ) -> Self {
        DocumentRow {
            id,
            content: content.into(),
            version,
            client_id,
            updated_at,
        }
    }
}

/// Debounced, not-yet-persisted local content.
///
/// Exists between "user typed" and "write acknowledged or abandoned".
/// Discarded on successful persist, flushed on teardown, superseded by a
/// newer local edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingEdit {
    /// The content awaiting persistence
    pub content: String,

    /// Monotonically incrementing local edit counter
    pub edit_seq: u64,
}

/// Selection offsets in plain-text code units from the start of the surface.
///
/// Captured immediately before a programmatic content replacement and
/// consumed immediately after, then discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CursorSnapshot {
    /// Offset of the selection start
    pub start: usize,

    /// Offset of the selection end, always >= start
    pub end: usize,
}

impl CursorSnapshot {
    pub fn caret(offset: usize) -> Self {
        CursorSnapshot {
            start: offset,
            end: offset,
        }
    }

    pub fn is_caret(&self) -> bool {
        self.start == self.end
    }
}
