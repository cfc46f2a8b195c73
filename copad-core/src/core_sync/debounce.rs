/*
    debounce.rs - Trailing-edge debouncer for local edits

    Coalesces a rapid stream of values into a single emission after a quiet
    period. Trailing-edge only: the first value never emits immediately, and
    every new distinct value cancels and restarts the timer. Equality is
    direct string equality, no structural diffing.

    The "skip if equal to already-persisted content" guard deliberately does
    NOT live here: a value that reverts to the last-emitted one before the
    timer fires still emits, and the engine decides whether that emission is
    a no-op save.
*/

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::trace;

enum Command {
    Update(String),
    Flush,
}

/// Handle to a running debouncer task.
///
/// Dropping the last handle flushes any pending value and stops the task.
#[derive(Clone)]
pub struct DebounceHandle {
    tx: mpsc::UnboundedSender<Command>,
    dirty: Arc<AtomicBool>,
}

impl DebounceHandle {
    /// Feed a new value. Restarts the quiet timer unless the value is equal
    /// to the one already pending.
    pub fn update(&self, value: impl Into<String>) {
        let _ = self.tx.send(Command::Update(value.into()));
    }

    /// Emit the pending value immediately, if any. Used on teardown and on
    /// explicit user-requested save.
    pub fn flush(&self) {
        let _ = self.tx.send(Command::Flush);
    }

    /// True while an emission is pending. Drives "unsaved changes"
    /// indicators in the host.
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }
}

/// Factory for debouncer tasks.
pub struct Debouncer;

impl Debouncer {
    /// Spawn a debouncer with the given quiet period. Emitted values arrive
    /// on the returned receiver.
    pub fn spawn(quiet: Duration) -> (DebounceHandle, mpsc::Receiver<String>) {
        let (cmd_tx, mut cmd_rx) = mpsc::unbounded_channel();
        let (out_tx, out_rx) = mpsc::channel(16);
        let dirty = Arc::new(AtomicBool::new(false));
        let dirty_flag = Arc::clone(&dirty);

        tokio::spawn(async move {
            let mut pending: Option<String> = None;
            let mut deadline = Instant::now();

            loop {
                tokio::select! {
                    cmd = cmd_rx.recv() => match cmd {
                        Some(Command::Update(value)) => {
                            if pending.as_deref() != Some(value.as_str()) {
                                trace!(len = value.len(), "debounce timer restarted");
                                pending = Some(value);
                                deadline = Instant::now() + quiet;
                            }
                            dirty_flag.store(true, Ordering::Release);
                        }
                        Some(Command::Flush) => {
                            if let Some(value) = pending.take() {
                                dirty_flag.store(false, Ordering::Release);
                                if out_tx.send(value).await.is_err() {
                                    break;
                                }
                            }
                        }
                        // all handles dropped: best-effort final flush
                        None => {
                            if let Some(value) = pending.take() {
                                dirty_flag.store(false, Ordering::Release);
                                let _ = out_tx.send(value).await;
                            }
                            break;
                        }
                    },
                    _ = tokio::time::sleep_until(deadline), if pending.is_some() => {
                        if let Some(value) = pending.take() {
                            dirty_flag.store(false, Ordering::Release);
                            if out_tx.send(value).await.is_err() {
                                break;
                            }
                        }
                    }
                }
            }
        });

        (
            DebounceHandle {
                tx: cmd_tx,
                dirty,
            },
            out_rx,
        )
    }
}
