//! Async test helpers

use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;

/// Receive from a channel with a timeout, panicking with context on failure.
pub async fn recv_timeout<T>(rx: &mut mpsc::Receiver<T>, duration: Duration) -> T {
    timeout(duration, rx.recv())
        .await
        .expect("timed out waiting for channel message")
        .expect("channel closed while waiting for message")
}

/// Assert that nothing arrives on the channel within the window.
pub async fn assert_no_message<T: std::fmt::Debug>(
    rx: &mut mpsc::Receiver<T>,
    duration: Duration,
) {
    if let Ok(Some(msg)) = timeout(duration, rx.recv()).await {
        panic!("expected silence, received {:?}", msg);
    }
}
