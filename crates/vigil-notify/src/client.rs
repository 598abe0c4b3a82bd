//! Event client: connect, drain, replay.

use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};
use vigil_models::NotifierConfig;

use crate::error::NotifyResult;

/// Floor between reconnection attempts.
pub const RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Persistent socket client draining one channel's event queue.
pub struct EventClient {
    address: String,
    channel: u32,
    queue: mpsc::Receiver<String>,
    shutdown: watch::Receiver<bool>,
    /// One-slot replay buffer holding the most recent failed message.
    history: Option<String>,
}

impl EventClient {
    pub fn new(
        cfg: &NotifierConfig,
        channel: u32,
        queue: mpsc::Receiver<String>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            address: cfg.address(),
            channel,
            queue,
            shutdown,
            history: None,
        }
    }

    /// Run until the queue is drained at shutdown or all senders are gone.
    pub async fn run(mut self) -> NotifyResult<()> {
        loop {
            if self.drained() {
                break;
            }
            let Some(mut stream) = self.connect().await else {
                break;
            };
            match self.pump(&mut stream).await {
                Ok(()) => break,
                Err(e) => {
                    warn!(
                        channel = self.channel,
                        "Connection to {} lost: {}", self.address, e
                    );
                }
            }
        }
        info!(channel = self.channel, "Event client exit");
        Ok(())
    }

    fn drained(&self) -> bool {
        *self.shutdown.borrow() && self.queue.is_empty() && self.history.is_none()
    }

    /// Connect with a bounded-backoff retry loop. Returns `None` when
    /// shutdown arms with nothing left to deliver.
    async fn connect(&mut self) -> Option<TcpStream> {
        loop {
            if self.drained() {
                return None;
            }
            info!(
                channel = self.channel,
                "Waiting to connect to notifier {}...", self.address
            );
            match TcpStream::connect(&self.address).await {
                Ok(stream) => {
                    info!(
                        channel = self.channel,
                        "Connected to notifier {}", self.address
                    );
                    return Some(stream);
                }
                Err(e) => {
                    debug!(channel = self.channel, "Connect failed: {}", e);
                    tokio::time::sleep(RECONNECT_DELAY).await;
                }
            }
        }
    }

    /// Send the replay slot, then drain the queue. A send failure stores
    /// the message back into the slot and bubbles up for a reconnect.
    async fn pump(&mut self, stream: &mut TcpStream) -> std::io::Result<()> {
        if let Some(msg) = self.history.take() {
            self.send(stream, msg).await?;
            info!(
                channel = self.channel,
                "Sent history message to notifier {}", self.address
            );
        }
        loop {
            if *self.shutdown.borrow() {
                // shutdown: deliver what is already queued, then stop
                while let Ok(msg) = self.queue.try_recv() {
                    self.send(stream, msg).await?;
                }
                return Ok(());
            }
            let msg = tokio::select! {
                msg = self.queue.recv() => match msg {
                    Some(msg) => msg,
                    None => return Ok(()),
                },
                _ = self.shutdown.changed() => continue,
            };
            self.send(stream, msg).await?;
            debug!(
                channel = self.channel,
                "Sent message to notifier {}", self.address
            );
        }
    }

    async fn send(&mut self, stream: &mut TcpStream, msg: String) -> std::io::Result<()> {
        if let Err(e) = stream.write_all(msg.as_bytes()).await {
            // overwrite semantics: the slot always holds the latest failure
            self.history = Some(msg);
            return Err(e);
        }
        stream.flush().await
    }
}
