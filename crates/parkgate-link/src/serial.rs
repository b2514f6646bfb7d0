//! Link to a gate device on a serial port.
//!
//! The port is blocking, so reads happen on a dedicated thread that frames
//! lines with [`GateLineCodec`] and forwards them over a Tokio channel. Writes
//! run on the blocking pool.
//!
//! Opening the port resets most microcontroller boards, so [`SerialLink::open`]
//! waits for the configured reset delay before returning.

use crate::error::{LinkError, LinkResult};
use crate::traits::Link;
use bytes::BytesMut;
use parkgate_core::SerialConfig;
use parkgate_protocol::GateLineCodec;
use serialport::SerialPort;
use std::fmt;
use std::io::{self, Read, Write};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, timeout_at};
use tokio_util::codec::{Decoder, Encoder};
use tracing::{debug, error, info, trace, warn};

/// Read timeout of the port; bounds how long the reader thread blocks.
const READ_POLL: Duration = Duration::from_millis(100);

const LINE_CHANNEL_CAPACITY: usize = 64;

/// Gate link over a serial port.
pub struct SerialLink {
    port_name: String,

    /// Writer half; `None` while a write is in flight or after it failed
    writer: Option<Box<dyn SerialPort>>,

    lines: mpsc::Receiver<io::Result<String>>,

    codec: GateLineCodec,
}

impl SerialLink {
    /// Open the port and wait for the device to come out of reset.
    ///
    /// # Errors
    ///
    /// Returns `LinkError::Serial` if the port cannot be opened or cloned for
    /// the reader thread.
    pub async fn open(config: &SerialConfig) -> LinkResult<Self> {
        info!(port = %config.port, baud = config.baud_rate, "Opening serial port");

        let port = serialport::new(config.port.as_str(), config.baud_rate)
            .timeout(READ_POLL)
            .open()?;
        let reader = port.try_clone()?;

        if !config.reset_delay.is_zero() {
            debug!(
                delay_ms = config.reset_delay.as_millis() as u64,
                "Waiting for device reset"
            );
            tokio::time::sleep(config.reset_delay).await;
        }

        let (tx, rx) = mpsc::channel(LINE_CHANNEL_CAPACITY);
        let port_name = config.port.clone();
        let thread_name = format!("serial-reader:{port_name}");
        std::thread::Builder::new()
            .name(thread_name)
            .spawn(move || read_lines(reader, tx))?;

        info!(port = %port_name, "Serial link ready");

        Ok(Self {
            port_name,
            writer: Some(port),
            lines: rx,
            codec: GateLineCodec::new(),
        })
    }

    /// Name of the underlying port.
    pub fn port_name(&self) -> &str {
        &self.port_name
    }
}

impl fmt::Debug for SerialLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerialLink")
            .field("port_name", &self.port_name)
            .field("writable", &self.writer.is_some())
            .finish()
    }
}

impl Link for SerialLink {
    async fn send_line(&mut self, line: &str) -> LinkResult<()> {
        let mut buf = BytesMut::new();
        self.codec.encode(line.to_string(), &mut buf)?;

        let mut port = self.writer.take().ok_or(LinkError::Closed)?;
        trace!(line, "-> device");

        let (port, result) = tokio::task::spawn_blocking(move || {
            let result = port.write_all(&buf).and_then(|()| port.flush());
            (port, result)
        })
        .await
        .map_err(io::Error::other)?;

        self.writer = Some(port);
        result.map_err(LinkError::from)
    }

    async fn receive_line(&mut self, deadline: Instant) -> LinkResult<String> {
        let started = Instant::now();

        match timeout_at(deadline, self.lines.recv()).await {
            Ok(Some(Ok(line))) => {
                trace!(line = %line, "<- device");
                Ok(line)
            }
            Ok(Some(Err(e))) => Err(e.into()),
            Ok(None) => Err(LinkError::Closed),
            Err(_) => Err(LinkError::timeout(started.elapsed())),
        }
    }
}

/// Reader thread body. Runs until the port fails or the link is dropped.
fn read_lines(mut port: Box<dyn SerialPort>, tx: mpsc::Sender<io::Result<String>>) {
    let mut codec = GateLineCodec::new();
    let mut buf = BytesMut::with_capacity(256);
    let mut chunk = [0u8; 256];

    loop {
        if tx.is_closed() {
            debug!("Serial link dropped, stopping reader");
            return;
        }

        match port.read(&mut chunk) {
            Ok(0) => continue,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
            Err(e) if e.kind() == io::ErrorKind::TimedOut => continue,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                error!(error = %e, "Serial read failed");
                let _ = tx.blocking_send(Err(e));
                return;
            }
        }

        loop {
            match codec.decode(&mut buf) {
                Ok(Some(line)) => {
                    if tx.blocking_send(Ok(line)).is_err() {
                        return;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "Dropping undecodable serial input");
                    buf.clear();
                    break;
                }
            }
        }
    }
}
