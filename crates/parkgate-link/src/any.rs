//! Runtime transport selection.
//!
//! [`Link`] uses native `async fn`, so it cannot be boxed as a trait object.
//! `AnyLink` dispatches to the concrete transport instead.

use crate::error::LinkResult;
use crate::mock::MockLink;
use crate::serial::SerialLink;
use crate::stream::{DEFAULT_CONNECT_TIMEOUT, StreamLink};
use crate::traits::Link;
use parkgate_core::LinkConfig;
use tokio::net::TcpStream;
use tokio::time::Instant;

/// Enum wrapper over the available transports.
///
/// # Examples
///
/// ```
/// use parkgate_link::{AnyLink, Link, MockLink};
///
/// #[tokio::main]
/// async fn main() -> parkgate_link::LinkResult<()> {
///     let (mock, device) = MockLink::new();
///     let mut link = AnyLink::Mock(mock);
///
///     link.send_line("STATUS:PAID").await?;
///     assert_eq!(device.sent_lines(), vec!["STATUS:PAID"]);
///     Ok(())
/// }
/// ```
#[derive(Debug)]
#[non_exhaustive]
pub enum AnyLink {
    /// Device on a local serial port.
    Serial(SerialLink),

    /// Device behind a TCP serial bridge.
    Tcp(StreamLink<TcpStream>),

    /// In-process device for development and testing.
    Mock(MockLink),
}

impl AnyLink {
    /// Open the transport described by `config`.
    ///
    /// # Errors
    ///
    /// Returns the transport's error if the port cannot be opened or the
    /// bridge cannot be reached.
    pub async fn open(config: &LinkConfig) -> LinkResult<Self> {
        match config {
            LinkConfig::Serial(serial) => SerialLink::open(serial).await.map(Self::Serial),
            LinkConfig::Tcp { addr } => StreamLink::connect(*addr, DEFAULT_CONNECT_TIMEOUT)
                .await
                .map(Self::Tcp),
        }
    }

    /// Short transport name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Serial(_) => "serial",
            Self::Tcp(_) => "tcp",
            Self::Mock(_) => "mock",
        }
    }
}

impl Link for AnyLink {
    async fn send_line(&mut self, line: &str) -> LinkResult<()> {
        match self {
            Self::Serial(link) => link.send_line(line).await,
            Self::Tcp(link) => link.send_line(line).await,
            Self::Mock(link) => link.send_line(line).await,
        }
    }

    async fn receive_line(&mut self, deadline: Instant) -> LinkResult<String> {
        match self {
            Self::Serial(link) => link.receive_line(deadline).await,
            Self::Tcp(link) => link.receive_line(deadline).await,
            Self::Mock(link) => link.receive_line(deadline).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LinkError;
    use std::time::Duration;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_open_tcp_from_config() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let link = AnyLink::open(&LinkConfig::Tcp { addr }).await.unwrap();
        assert_eq!(link.kind(), "tcp");
    }

    #[tokio::test]
    async fn test_open_tcp_refused() {
        // Bind then drop to get a port with no listener.
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap()
        };

        let result = AnyLink::open(&LinkConfig::Tcp { addr }).await;
        assert!(matches!(result, Err(LinkError::Io(_))));
    }

    #[tokio::test]
    async fn test_open_missing_serial_port() {
        let config = LinkConfig::Serial(
            parkgate_core::SerialConfig::new("/dev/parkgate-does-not-exist")
                .reset_delay(Duration::ZERO),
        );

        let result = AnyLink::open(&config).await;
        assert!(matches!(result, Err(LinkError::Serial(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_mock_dispatch_receives() {
        let (mock, device) = MockLink::new();
        let mut link = AnyLink::Mock(mock);
        device.send_line("PLATE:RAB123A").await.unwrap();

        let deadline = Instant::now() + Duration::from_secs(1);
        assert_eq!(link.receive_line(deadline).await.unwrap(), "PLATE:RAB123A");
        assert_eq!(link.kind(), "mock");
    }
}
