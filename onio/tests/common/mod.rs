#![allow(dead_code)]

use onio::{
    App,
    testing::{MemoryConnection, MemoryTransport},
};
use std::{sync::Arc, time::Duration};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing_subscriber::EnvFilter;

// ============================================================================
// Setup
// ============================================================================

/// Upper bound for waiting on a dispatch driven by a connection task.
pub const WAIT: Duration = Duration::from_secs(2);

/// Install a test subscriber once; `RUST_LOG` selects the level.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Attach `app` to a fresh in-memory transport and open one client.
pub fn attached(app: &App) -> (MemoryTransport, Arc<MemoryConnection>) {
    init_tracing();
    let transport = MemoryTransport::new();
    app.attach(&transport).unwrap();
    let client = transport.connect();
    (transport, client)
}

// ============================================================================
// Signals
// ============================================================================

/// Channel a listener uses to report back to the test body.
pub fn signal<T>() -> (UnboundedSender<T>, UnboundedReceiver<T>) {
    mpsc::unbounded_channel()
}

/// Wait for the next signal, failing the test after [`WAIT`].
pub async fn next_signal<T>(rx: &mut UnboundedReceiver<T>) -> T {
    tokio::time::timeout(WAIT, rx.recv())
        .await
        .expect("timed out waiting for dispatch")
        .expect("signal channel closed")
}

/// Assert that no signal arrives within a short grace period.
pub async fn assert_silent<T: std::fmt::Debug>(rx: &mut UnboundedReceiver<T>) {
    let outcome = tokio::time::timeout(Duration::from_millis(50), rx.recv()).await;
    assert!(outcome.is_err(), "unexpected signal: {outcome:?}");
}
