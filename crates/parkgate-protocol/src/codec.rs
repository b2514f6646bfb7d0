//! Tokio codec for the gate line protocol.
//!
//! `GateLineCodec` splits the inbound byte stream on `\n` and yields each line
//! without its terminator (a trailing `\r` is dropped as well). Outbound, it
//! writes one line per item and appends the terminator.
//!
//! # Usage with Tokio Framed
//!
//! ```rust,no_run
//! use tokio::net::TcpStream;
//! use tokio_util::codec::Framed;
//! use parkgate_protocol::{GateLineCodec, HostMessage, SettlementStatus};
//! use futures::{SinkExt, StreamExt};
//!
//! # async fn example() -> Result<(), parkgate_protocol::ProtocolError> {
//! let stream = TcpStream::connect("127.0.0.1:7000").await?;
//! let mut framed = Framed::new(stream, GateLineCodec::new());
//!
//! framed.send(HostMessage::Status(SettlementStatus::Paid)).await?;
//!
//! if let Some(Ok(line)) = framed.next().await {
//!     println!("device said: {line}");
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Noise Protection
//!
//! Serial lines pick up garbage when a device resets or a cable is replugged.
//! A line longer than the configured maximum is dropped up to its terminator
//! instead of failing the stream, so one burst of noise cannot end the link.
//! Invalid UTF-8 is decoded lossily; such lines never match a protocol prefix
//! and are discarded by the reader.

use bytes::{BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::warn;

use crate::error::ProtocolError;
use crate::message::HostMessage;
use parkgate_core::constants::{LINE_TERMINATOR, MAX_LINE_LENGTH};

/// Newline framing for device lines.
#[derive(Debug, Clone)]
pub struct GateLineCodec {
    /// Longest accepted line, terminator excluded.
    max_line_length: usize,

    /// Bytes of the buffer already scanned for a terminator.
    next_index: usize,

    /// Set while skipping the remainder of an overlong line.
    discarding: bool,
}

impl GateLineCodec {
    /// Create a codec with the default maximum line length.
    pub fn new() -> Self {
        Self::with_max_line_length(MAX_LINE_LENGTH)
    }

    /// Create a codec with a custom maximum line length.
    ///
    /// ```
    /// use parkgate_protocol::GateLineCodec;
    ///
    /// let codec = GateLineCodec::with_max_line_length(256);
    /// assert_eq!(codec.max_line_length(), 256);
    /// ```
    pub fn with_max_line_length(max_line_length: usize) -> Self {
        Self {
            max_line_length,
            next_index: 0,
            discarding: false,
        }
    }

    /// Get the current maximum line length.
    pub fn max_line_length(&self) -> usize {
        self.max_line_length
    }

    fn take_line(&mut self, src: &mut BytesMut, terminator_at: usize) -> Option<String> {
        let raw = src.split_to(terminator_at + 1);
        self.next_index = 0;

        if self.discarding {
            self.discarding = false;
            return None;
        }

        let mut line = &raw[..raw.len() - 1];
        if let Some(stripped) = line.strip_suffix(b"\r") {
            line = stripped;
        }
        Some(String::from_utf8_lossy(line).into_owned())
    }
}

impl Default for GateLineCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for GateLineCodec {
    type Item = String;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<String>, ProtocolError> {
        loop {
            let terminator = src[self.next_index..]
                .iter()
                .position(|b| *b == LINE_TERMINATOR)
                .map(|offset| self.next_index + offset);

            match terminator {
                Some(index) => {
                    // A completed overlong line yields nothing; keep scanning.
                    if let Some(line) = self.take_line(src, index) {
                        return Ok(Some(line));
                    }
                }
                None if src.len() > self.max_line_length => {
                    if !self.discarding {
                        warn!(
                            buffered = src.len(),
                            max = self.max_line_length,
                            "Discarding overlong line from device"
                        );
                    }
                    self.discarding = true;
                    src.clear();
                    self.next_index = 0;
                    return Ok(None);
                }
                None => {
                    self.next_index = src.len();
                    return Ok(None);
                }
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<String>, ProtocolError> {
        if let Some(line) = self.decode(src)? {
            return Ok(Some(line));
        }

        // Unterminated tail at end of stream.
        if src.is_empty() || self.discarding {
            src.clear();
            self.next_index = 0;
            self.discarding = false;
            return Ok(None);
        }

        let tail = src.split();
        self.next_index = 0;
        let text = String::from_utf8_lossy(&tail);
        Ok(Some(text.trim_end_matches('\r').to_string()))
    }
}

impl Encoder<String> for GateLineCodec {
    type Error = ProtocolError;

    fn encode(&mut self, line: String, dst: &mut BytesMut) -> Result<(), ProtocolError> {
        if line.bytes().any(|b| b == LINE_TERMINATOR || b == b'\r') {
            return Err(ProtocolError::InvalidLine(format!(
                "{line:?} contains a line terminator"
            )));
        }
        if !line.is_ascii() {
            return Err(ProtocolError::InvalidLine(format!("{line:?} is not ASCII")));
        }

        dst.reserve(line.len() + 1);
        dst.put_slice(line.as_bytes());
        dst.put_u8(LINE_TERMINATOR);
        Ok(())
    }
}

impl Encoder<HostMessage> for GateLineCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: HostMessage, dst: &mut BytesMut) -> Result<(), ProtocolError> {
        Encoder::<String>::encode(self, item.to_string(), dst)
    }
}
