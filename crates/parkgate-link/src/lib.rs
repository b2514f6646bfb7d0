//! Bounded-wait line channel to the gate device.
//!
//! The settlement logic talks to the device through the [`Link`] trait: send
//! one line, or wait for one line until a deadline. Nothing in this crate
//! interprets the lines beyond framing them.
//!
//! # Transports
//!
//! - [`SerialLink`]: the device attached to a serial port
//! - [`StreamLink`]: any async byte stream, typically a TCP serial bridge
//! - [`MockLink`]: in-process channel pair for tests and development
//!
//! [`AnyLink`] selects one of them at runtime.
//!
//! # Deadlines
//!
//! Receive calls take an absolute [`tokio::time::Instant`] deadline rather
//! than a duration, so a caller filtering several lines against one deadline
//! never waits longer in total than it asked for. Deadlines follow the Tokio
//! clock, so tests can run on a paused clock:
//!
//! ```
//! use parkgate_link::{Link, LinkError, MockLink};
//! use std::time::Duration;
//! use tokio::time::Instant;
//!
//! # #[tokio::main(flavor = "current_thread", start_paused = true)]
//! # async fn main() {
//! let (mut link, _device) = MockLink::new();
//!
//! let deadline = Instant::now() + Duration::from_secs(5);
//! let result = link.receive_line(deadline).await;
//! assert!(matches!(result, Err(LinkError::Timeout { .. })));
//! # }
//! ```

pub mod any;
pub mod error;
pub mod mock;
pub mod serial;
pub mod stream;
pub mod traits;

pub use any::AnyLink;
pub use error::{LinkError, LinkResult};
pub use mock::{MockLink, MockLinkHandle};
pub use serial::SerialLink;
pub use stream::StreamLink;
pub use traits::Link;
