//! Line protocol spoken between the gate device and the host.
//!
//! - [`DeviceMessage`]: lines sent by the device (plate, balance, payment result)
//! - [`HostMessage`]: lines sent by the host (amount due, final status)
//! - [`GateLineCodec`]: newline framing for Tokio `Framed` streams

pub mod codec;
pub mod error;
pub mod message;

pub use codec::GateLineCodec;
pub use error::{ProtocolError, ProtocolResult};
pub use message::{DeviceMessage, HostMessage, MessageKind, SettlementStatus};
