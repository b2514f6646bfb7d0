//! Link trait definition.
//!
//! Uses native `async fn` in traits (edition 2024). The trait is therefore
//! not object-safe; use generics, or [`AnyLink`](crate::AnyLink) when the
//! transport is chosen at runtime.

#![allow(async_fn_in_trait)]

use crate::error::{LinkError, LinkResult};
use parkgate_protocol::HostMessage;
use tokio::time::Instant;
use tracing::debug;

/// Line-oriented channel to the gate device with bounded waits.
///
/// # Example
///
/// ```no_run
/// use parkgate_link::{Link, LinkResult};
/// use std::time::Duration;
/// use tokio::time::Instant;
///
/// async fn wait_for_plate<L: Link>(link: &mut L) -> LinkResult<String> {
///     let deadline = Instant::now() + Duration::from_secs(1);
///     link.receive_line_matching(|line| line.starts_with("PLATE:"), deadline)
///         .await
/// }
/// ```
pub trait Link: Send {
    /// Write one line to the device. The terminator is appended.
    ///
    /// No acknowledgement is expected.
    async fn send_line(&mut self, line: &str) -> LinkResult<()>;

    /// Wait for the next complete line, without its terminator.
    ///
    /// # Errors
    ///
    /// - `LinkError::Timeout` if nothing arrives before `deadline`
    /// - `LinkError::Closed` if the device side went away
    async fn receive_line(&mut self, deadline: Instant) -> LinkResult<String>;

    /// Write a host message as one line.
    async fn send_message(&mut self, message: &HostMessage) -> LinkResult<()> {
        self.send_line(&message.to_string()).await
    }

    /// Wait for the next line accepted by `predicate`, discarding others.
    ///
    /// The deadline bounds the whole wait, not each line.
    async fn receive_line_matching<P>(
        &mut self,
        mut predicate: P,
        deadline: Instant,
    ) -> LinkResult<String>
    where
        P: FnMut(&str) -> bool + Send,
    {
        let started = Instant::now();

        loop {
            let line = match self.receive_line(deadline).await {
                Ok(line) => line,
                Err(LinkError::Timeout { .. }) => {
                    return Err(LinkError::timeout(started.elapsed()));
                }
                Err(e) => return Err(e),
            };

            if predicate(&line) {
                return Ok(line);
            }

            debug!(line = %line, "Discarding unexpected device line");
        }
    }
}
