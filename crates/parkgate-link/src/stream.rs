//! Link over any async byte stream.
//!
//! Used for TCP serial bridges, device emulators, and in tests over
//! `tokio::io::duplex`. Framing is done by [`GateLineCodec`].

use crate::error::{LinkError, LinkResult};
use crate::traits::Link;
use futures::{SinkExt, StreamExt};
use parkgate_protocol::GateLineCodec;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::time::{Instant, timeout, timeout_at};
use tokio_util::codec::Framed;
use tracing::{debug, info, trace, warn};

/// Default bound on a single outbound write.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_millis(1000);

/// Default bound on establishing a TCP connection.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_millis(3000);

/// Gate link over a framed byte stream.
///
/// # Example
///
/// ```
/// use parkgate_link::{Link, StreamLink};
/// use std::time::Duration;
/// use tokio::io::AsyncWriteExt;
/// use tokio::time::Instant;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> parkgate_link::LinkResult<()> {
/// let (host, mut device) = tokio::io::duplex(256);
/// let mut link = StreamLink::new(host);
///
/// device.write_all(b"PLATE:RAB123A\n").await?;
/// let line = link.receive_line(Instant::now() + Duration::from_secs(1)).await?;
/// assert_eq!(line, "PLATE:RAB123A");
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct StreamLink<T> {
    framed: Framed<T, GateLineCodec>,
    write_timeout: Duration,
}

impl<T> StreamLink<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Wrap a stream with the default write timeout.
    pub fn new(io: T) -> Self {
        Self {
            framed: Framed::new(io, GateLineCodec::new()),
            write_timeout: DEFAULT_WRITE_TIMEOUT,
        }
    }

    /// Set the bound on a single outbound write.
    pub fn with_write_timeout(mut self, write_timeout: Duration) -> Self {
        self.write_timeout = write_timeout;
        self
    }

    /// Get the underlying stream.
    pub fn get_ref(&self) -> &T {
        self.framed.get_ref()
    }
}

impl StreamLink<TcpStream> {
    /// Connect to a serial-over-TCP bridge.
    ///
    /// # Errors
    ///
    /// Returns `LinkError::Timeout` if the connection is not established
    /// within `connect_timeout`, or `LinkError::Io` if it is refused.
    pub async fn connect(addr: SocketAddr, connect_timeout: Duration) -> LinkResult<Self> {
        info!(%addr, "Connecting to gate bridge");

        let stream = match timeout(connect_timeout, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => {
                warn!(%addr, "Connection timeout after {}ms", connect_timeout.as_millis());
                return Err(LinkError::timeout(connect_timeout));
            }
        };

        // Lines are tiny and latency-sensitive.
        if let Err(e) = stream.set_nodelay(true) {
            warn!("Failed to set TCP_NODELAY: {}", e);
        }

        info!(%addr, "Connected to gate bridge");
        Ok(Self::new(stream))
    }
}

impl<T> Link for StreamLink<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn send_line(&mut self, line: &str) -> LinkResult<()> {
        trace!(line, "-> device");

        match timeout(self.write_timeout, self.framed.send(line.to_string())).await {
            Ok(result) => result.map_err(LinkError::from),
            Err(_) => {
                warn!("Send timeout after {}ms", self.write_timeout.as_millis());
                Err(LinkError::timeout(self.write_timeout))
            }
        }
    }

    async fn receive_line(&mut self, deadline: Instant) -> LinkResult<String> {
        let started = Instant::now();

        match timeout_at(deadline, self.framed.next()).await {
            Ok(Some(Ok(line))) => {
                trace!(line = %line, "<- device");
                Ok(line)
            }
            Ok(Some(Err(e))) => Err(e.into()),
            Ok(None) => {
                debug!("Device stream ended");
                Err(LinkError::Closed)
            }
            Err(_) => Err(LinkError::timeout(started.elapsed())),
        }
    }
}
