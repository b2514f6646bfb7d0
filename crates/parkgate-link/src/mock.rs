//! In-process link for testing and development.
//!
//! [`MockLink`] is the host side; [`MockLinkHandle`] plays the device. Lines
//! the handle sends arrive at the link in order, and every line the link
//! sends is both recorded and delivered to the handle.

use crate::error::{LinkError, LinkResult};
use crate::traits::Link;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::time::{Instant, timeout_at};
use tracing::trace;

const CHANNEL_CAPACITY: usize = 64;

/// Host side of an in-process link.
///
/// # Examples
///
/// ```
/// use parkgate_link::{Link, MockLink};
/// use std::time::Duration;
/// use tokio::time::Instant;
///
/// #[tokio::main]
/// async fn main() -> parkgate_link::LinkResult<()> {
///     let (mut link, device) = MockLink::new();
///
///     device.send_line("PLATE:RAB123A").await?;
///     let line = link.receive_line(Instant::now() + Duration::from_secs(1)).await?;
///     assert_eq!(line, "PLATE:RAB123A");
///
///     link.send_line("STATUS:NOT_FOUND").await?;
///     assert_eq!(device.sent_lines(), vec!["STATUS:NOT_FOUND"]);
///
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct MockLink {
    /// Lines from the device
    inbound_rx: mpsc::Receiver<String>,

    /// Lines to the device
    outbound_tx: mpsc::UnboundedSender<String>,

    /// Everything the host has sent, in order
    sent: Arc<Mutex<Vec<String>>>,
}

impl MockLink {
    /// Create a connected link and device handle.
    pub fn new() -> (Self, MockLinkHandle) {
        let (inbound_tx, inbound_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let sent = Arc::new(Mutex::new(Vec::new()));

        let link = Self {
            inbound_rx,
            outbound_tx,
            sent: Arc::clone(&sent),
        };

        let handle = MockLinkHandle {
            inbound_tx,
            outbound_rx: Arc::new(tokio::sync::Mutex::new(outbound_rx)),
            sent,
        };

        (link, handle)
    }
}

impl Link for MockLink {
    async fn send_line(&mut self, line: &str) -> LinkResult<()> {
        trace!(line, "-> mock device");

        if let Ok(mut sent) = self.sent.lock() {
            sent.push(line.to_string());
        }

        // The device may have stopped listening; the record above still counts.
        let _ = self.outbound_tx.send(line.to_string());
        Ok(())
    }

    async fn receive_line(&mut self, deadline: Instant) -> LinkResult<String> {
        let started = Instant::now();

        match timeout_at(deadline, self.inbound_rx.recv()).await {
            Ok(Some(line)) => {
                trace!(line = %line, "<- mock device");
                Ok(line)
            }
            Ok(None) => Err(LinkError::Closed),
            Err(_) => Err(LinkError::timeout(started.elapsed())),
        }
    }
}

/// Device side of a [`MockLink`].
///
/// Cloning the handle gives another view of the same device. The link
/// reports `Closed` once every handle is dropped and queued lines are read.
#[derive(Debug, Clone)]
pub struct MockLinkHandle {
    inbound_tx: mpsc::Sender<String>,
    outbound_rx: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<String>>>,
    sent: Arc<Mutex<Vec<String>>>,
}

impl MockLinkHandle {
    /// Send a line from the device to the host.
    ///
    /// # Errors
    ///
    /// Returns `LinkError::Closed` if the link was dropped.
    pub async fn send_line(&self, line: impl Into<String>) -> LinkResult<()> {
        self.inbound_tx
            .send(line.into())
            .await
            .map_err(|_| LinkError::Closed)
    }

    /// Send several device lines in order.
    pub async fn send_lines<I, S>(&self, lines: I) -> LinkResult<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for line in lines {
            self.send_line(line).await?;
        }
        Ok(())
    }

    /// Wait for the next line the host sends.
    ///
    /// Returns `None` once the link is dropped and all lines were taken.
    pub async fn next_host_line(&self) -> Option<String> {
        self.outbound_rx.lock().await.recv().await
    }

    /// Every line the host has sent so far.
    pub fn sent_lines(&self) -> Vec<String> {
        self.sent.lock().map(|sent| sent.clone()).unwrap_or_default()
    }

    /// Forget the recorded host lines.
    pub fn clear_sent(&self) {
        if let Ok(mut sent) = self.sent.lock() {
            sent.clear();
        }
    }
}
