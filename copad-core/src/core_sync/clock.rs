/*
    clock.rs - Version clock for the local session

    Tracks the locally known document version and the timestamp, writer id,
    and content of the last accepted write. Pure state, no I/O. The conflict
    resolver reads it; the engine writes it.
*/

use super::types::{ClientId, Timestamp};

/// Locally known state of the shared document row.
#[derive(Debug, Clone)]
pub struct VersionClock {
    known_version: u64,
    last_timestamp: Timestamp,
    last_client_id: Option<ClientId>,
    last_content: String,
}

impl VersionClock {
    /// A clock that has observed nothing yet. Any real write is newer.
    pub fn new() -> Self {
        VersionClock {
            known_version: 0,
            last_timestamp: Timestamp::from_millis(0),
            last_client_id: None,
            last_content: String::new(),
        }
    }

    /// Record an accepted write, local or remote. Unconditionally overwrites
    /// all fields; acceptance is the resolver's decision, not the clock's.
    pub fn observe(
        &mut self,
        version: u64,
        timestamp: Timestamp,
        client_id: ClientId,
        content: impl Into<String>,
    ) {
        self.known_version = version;
        self.last_timestamp = timestamp;
        self.last_client_id = Some(client_id);
        self.last_content = content.into();
    }

    /// The version to attach to an outgoing local write.
    ///
    /// Does not commit: the caller calls `observe` only on confirmed
    /// persistence. On failure the attempted version is abandoned and the
    /// next `bump` yields the same number again (writes from one session
    /// are serialized, so there is no decrement race).
    pub fn bump(&self) -> u64 {
        self.known_version + 1
    }

    pub fn known_version(&self) -> u64 {
        self.known_version
    }

    pub fn last_timestamp(&self) -> Timestamp {
        self.last_timestamp
    }

    pub fn last_client_id(&self) -> Option<&ClientId> {
        self.last_client_id.as_ref()
    }

    /// Content of the last accepted write; the "already persisted" reference
    /// the engine compares against to skip redundant saves.
    pub fn last_content(&self) -> &str {
        &self.last_content
    }
}

impl Default for VersionClock {
    fn default() -> Self {
        VersionClock::new()
    }
}
