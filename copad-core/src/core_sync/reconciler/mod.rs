/*
    reconciler - Cursor-preserving application of external content

    Puts externally sourced content (accepted remote updates, refresh
    results) onto the live editable surface without discarding the caret and
    without ever overwriting an open IME composition. The surface is behind
    a trait so the offset walk is testable without a widget.

    Restoration runs slightly after the replacement: the hosting UI layer
    commits new text runs asynchronously, so they may not be queryable in
    the same tick. The delay scales up for very large documents.
*/

use super::document::{CursorSnapshot, DocumentRow};
use crate::config::Config;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

pub mod offset_map;

pub use offset_map::{locate, RunPosition};

/// Seam to the editable text region.
///
/// Offsets are flat character counts from the start of the surface. The run
/// structure only matters for `set_selection`, which addresses a concrete
/// text node.
pub trait EditableSurface: Send + Sync {
    /// Full plain text currently displayed
    fn text(&self) -> String;

    /// Replace the displayed text wholesale
    fn set_text(&self, content: &str);

    /// Whether the surface currently owns keyboard focus
    fn has_focus(&self) -> bool;

    /// Whether an IME composition session is open
    fn is_composing(&self) -> bool;

    /// Current selection as flat offsets; `None` when the surface cannot
    /// report one (typically: not focused)
    fn selection(&self) -> Option<CursorSnapshot>;

    /// Place the selection across two run positions
    fn set_selection(&self, start: RunPosition, end: RunPosition);

    /// The ordered text runs currently backing the surface
    fn text_runs(&self) -> Vec<String>;
}

/// Applies external content to a surface while preserving the caret.
pub struct CursorPreservingReconciler {
    surface: Arc<dyn EditableSurface>,
    config: Config,
    restore_task: Mutex<Option<JoinHandle<()>>>,
}

impl CursorPreservingReconciler {
    pub fn new(surface: Arc<dyn EditableSurface>, config: Config) -> Self {
        CursorPreservingReconciler {
            surface,
            config,
            restore_task: Mutex::new(None),
        }
    }

    /// Apply externally sourced content. Returns `false` when the update was
    /// dropped because a composition is open; a later accepted update (or
    /// the user's own newer input) supersedes it.
    pub fn apply_external(&self, content: &str) -> bool {
        if self.surface.is_composing() {
            debug!("composition open, dropping external content");
            return false;
        }

        // capture only when the surface owns focus; an unfocused surface has
        // no caret worth preserving
        let snapshot = if self.surface.has_focus() {
            self.surface.selection()
        } else {
            None
        };

        self.surface.set_text(content);

        if let Some(snapshot) = snapshot {
            self.schedule_restore(snapshot, content.len());
        }
        true
    }

    /// Cancel a scheduled cursor restoration. Part of teardown.
    pub fn cancel_pending_restore(&self) {
        if let Some(task) = self
            .restore_task
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            task.abort();
        }
    }

    /// Pump accepted rows from the engine's applied-updates channel onto the
    /// surface until the channel closes.
    pub async fn run(&self, mut applied: mpsc::Receiver<DocumentRow>) {
        while let Some(row) = applied.recv().await {
            self.apply_external(&row.content);
        }
        self.cancel_pending_restore();
    }

    fn schedule_restore(&self, snapshot: CursorSnapshot, content_len: usize) {
        let delay = self.config.restore_delay_for(content_len);
        let surface = Arc::clone(&self.surface);

        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            restore_selection(surface.as_ref(), snapshot);
        });

        let mut slot = self.restore_task.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = slot.replace(task) {
            // a newer replacement supersedes the older restoration
            previous.abort();
        }
    }
}

impl Drop for CursorPreservingReconciler {
    fn drop(&mut self) {
        self.cancel_pending_restore();
    }
}

/// Map both ends of the snapshot onto the current run structure and set the
/// selection. A no-op when either offset lies beyond the content (the
/// surface keeps its default end-of-content caret).
fn restore_selection(surface: &dyn EditableSurface, snapshot: CursorSnapshot) {
    let runs = surface.text_runs();
    let start = locate(snapshot.start, &runs);
    let end = locate(snapshot.end, &runs);

    match (start, end) {
        (Some(start), Some(end)) => {
            trace!(?start, ?end, "restored selection");
            surface.set_selection(start, end);
        }
        _ => {
            trace!(
                start = snapshot.start,
                end = snapshot.end,
                "selection beyond content, leaving default caret"
            );
        }
    }
}
