//! Shutdown latch and the inputs that arm it.
//!
//! Every long-running task holds a `watch` receiver on the latch and
//! checks it at its loop head. The latch can be armed by an empty stdin
//! line (enter pressed twice), an optional fixed-duration timer, or
//! Ctrl-C.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncBufReadExt;
use tokio::sync::watch;
use tracing::info;

/// One-way latch observed by every component of the monitor.
#[derive(Debug)]
pub struct ShutdownLatch {
    tx: watch::Sender<bool>,
}

impl Default for ShutdownLatch {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownLatch {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    /// Receiver for loop-head checks and `select!` arms.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    pub fn is_armed(&self) -> bool {
        *self.tx.borrow()
    }

    /// Arm the latch. Idempotent.
    pub fn arm(&self) {
        if !self.is_armed() {
            info!("Shutdown latch armed");
            self.tx.send_replace(true);
        }
    }

    /// Wait until the latch is armed.
    pub async fn armed(&self) {
        let mut rx = self.subscribe();
        while !*rx.borrow() {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

/// Arm the latch when stdin delivers two consecutive newlines (an empty
/// input line).
pub async fn stdin_shutdown(latch: Arc<ShutdownLatch>) {
    info!("Click double Enter to shut down system");
    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if latch.is_armed() {
            break;
        }
        if line.trim().is_empty() {
            latch.arm();
            break;
        }
    }
}

/// Arm the latch after a fixed run time.
pub async fn shutdown_after(latch: Arc<ShutdownLatch>, seconds: u64) {
    info!("System will exit after [{}] seconds", seconds);
    tokio::time::sleep(Duration::from_secs(seconds)).await;
    latch.arm();
}

/// Arm the latch on Ctrl-C.
pub async fn signal_shutdown(latch: Arc<ShutdownLatch>) {
    tokio::signal::ctrl_c().await.ok();
    info!("Received shutdown signal");
    latch.arm();
}
