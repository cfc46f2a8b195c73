/*
    resolver.rs - Accept/reject decisions for remote notifications

    Whole-document last-writer-wins. Ordering is timestamp-primary with the
    version counter as tiebreak: version alone is not race-free because two
    clients can compute version+1 from the same stale base concurrently,
    while the backend's commit time is monotonic per row.

    Rejection has no observable effect beyond a log line, which is what
    makes at-least-once notification delivery idempotent.
*/

use super::clock::VersionClock;
use super::document::DocumentRow;
use super::types::ClientId;
use tracing::debug;

/// Why a notification was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// The notification carries this session's own client id
    SelfEcho,
    /// Not newer than the last accepted write
    Stale,
}

impl RejectReason {
    fn as_str(&self) -> &'static str {
        match self {
            RejectReason::SelfEcho => "self_echo",
            RejectReason::Stale => "stale",
        }
    }
}

/// Outcome of resolving one remote notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Accept,
    Reject(RejectReason),
}

impl Resolution {
    pub fn is_accept(&self) -> bool {
        matches!(self, Resolution::Accept)
    }
}

/// Decides whether an incoming remote update supersedes local state.
#[derive(Debug, Clone)]
pub struct ConflictResolver {
    local_client_id: ClientId,
}

impl ConflictResolver {
    pub fn new(local_client_id: ClientId) -> Self {
        ConflictResolver { local_client_id }
    }

    /// Apply the resolution policy, in order:
    /// 1. own echo -> reject (this session already applied the content
    ///    optimistically when it issued the write)
    /// 2. newer timestamp -> accept
    /// 3. equal timestamp and higher version -> accept (clock resolution tie)
    /// 4. otherwise -> reject as stale or duplicate
    pub fn resolve(&self, update: &DocumentRow, clock: &VersionClock) -> Resolution {
        let resolution = if update.client_id == self.local_client_id {
            Resolution::Reject(RejectReason::SelfEcho)
        } else if update.updated_at > clock.last_timestamp() {
            Resolution::Accept
        } else if update.updated_at == clock.last_timestamp()
            && update.version > clock.known_version()
        {
            Resolution::Accept
        } else {
            Resolution::Reject(RejectReason::Stale)
        };

        match resolution {
            Resolution::Accept => {
                metrics::counter!("copad_remote_updates_accepted").increment(1);
            }
            Resolution::Reject(reason) => {
                debug!(
                    document = %update.id,
                    version = update.version,
                    timestamp = %update.updated_at,
                    reason = reason.as_str(),
                    "rejected remote update"
                );
                metrics::counter!("copad_remote_updates_rejected", "reason" => reason.as_str())
                    .increment(1);
            }
        }

        resolution
    }
}
