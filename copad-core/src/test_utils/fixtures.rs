//! Test fixtures: row builders and a scriptable editable surface

use crate::core_sync::document::{CursorSnapshot, DocumentRow};
use crate::core_sync::reconciler::{EditableSurface, RunPosition};
use crate::core_sync::types::{ClientId, DocumentId, Timestamp};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

/// Build a document row with explicit version/timestamp/writer.
pub fn row(
    id: &str,
    content: &str,
    version: u64,
    client: &str,
    millis: u64,
) -> DocumentRow {
    DocumentRow::new(
        DocumentId::new(id),
        content,
        version,
        ClientId::new(client),
        Timestamp::from_millis(millis),
    )
}

/// Scriptable in-memory editable surface.
///
/// Splits content across two text runs on `set_text`, mimicking a surface
/// that breaks text across nodes, so offset restoration is exercised against
/// a non-trivial run structure.
pub struct FakeSurface {
    runs: RwLock<Vec<String>>,
    applied_selection: RwLock<Option<(RunPosition, RunPosition)>>,
    reported_selection: RwLock<Option<CursorSnapshot>>,
    focused: AtomicBool,
    composing: AtomicBool,
}

impl FakeSurface {
    pub fn new(text: &str) -> Self {
        FakeSurface {
            runs: RwLock::new(vec![text.to_string()]),
            applied_selection: RwLock::new(None),
            reported_selection: RwLock::new(None),
            focused: AtomicBool::new(false),
            composing: AtomicBool::new(false),
        }
    }

    /// Give the surface focus with the given caret/selection.
    pub fn focus_at(&self, snapshot: CursorSnapshot) {
        self.focused.store(true, Ordering::Release);
        *self.reported_selection.write().unwrap() = Some(snapshot);
    }

    pub fn begin_composition(&self) {
        self.composing.store(true, Ordering::Release);
    }

    pub fn end_composition(&self) {
        self.composing.store(false, Ordering::Release);
    }

    /// The run positions last passed to `set_selection`, if any.
    pub fn applied_selection(&self) -> Option<(RunPosition, RunPosition)> {
        *self.applied_selection.read().unwrap()
    }
}

impl EditableSurface for FakeSurface {
    fn text(&self) -> String {
        self.runs.read().unwrap().concat()
    }

    fn set_text(&self, content: &str) {
        let mid = content.chars().count() / 2;
        let head: String = content.chars().take(mid).collect();
        let tail: String = content.chars().skip(mid).collect();
        let runs = if tail.is_empty() {
            vec![head]
        } else {
            vec![head, tail]
        };
        *self.runs.write().unwrap() = runs;
    }

    fn has_focus(&self) -> bool {
        self.focused.load(Ordering::Acquire)
    }

    fn is_composing(&self) -> bool {
        self.composing.load(Ordering::Acquire)
    }

    fn selection(&self) -> Option<CursorSnapshot> {
        *self.reported_selection.read().unwrap()
    }

    fn set_selection(&self, start: RunPosition, end: RunPosition) {
        *self.applied_selection.write().unwrap() = Some((start, end));
    }

    fn text_runs(&self) -> Vec<String> {
        self.runs.read().unwrap().clone()
    }
}
