//! Parking fee settlement for the exit gate.
//!
//! When the gate reads a plate, a [`SettlementSession`] collects the card
//! balance, looks the vehicle up in the [`Ledger`](parkgate_storage::Ledger),
//! records the fee and drives the payment on the device. [`SessionLoop`] runs
//! sessions back to back.
//!
//! # Modules
//!
//! - [`fee`]: hourly fee computation
//! - [`state`]: settlement state machine
//! - [`session`]: one plate-to-outcome settlement
//! - [`session_loop`]: top-level driver
//! - [`clock`]: wall-clock source for exit times

pub mod clock;
pub mod error;
pub mod fee;
pub mod outcome;
pub mod session;
pub mod session_loop;
pub mod state;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::SessionError;
pub use fee::{Fee, FeeCalculator, FeeError};
pub use outcome::{FailureReason, SettlementOutcome};
pub use session::SettlementSession;
pub use session_loop::{LoopStats, SessionLoop};
pub use state::{SettlementState, StateMachine, StateTransition};
