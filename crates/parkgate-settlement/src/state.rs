//! Settlement state machine.
//!
//! # States
//!
//! - `Idle`: no vehicle at the gate
//! - `AwaitingBalance`: plate read, waiting for the card balance
//! - `LookupRecord`: finding the plate in the ledger
//! - `ComputeDue`: computing and recording the fee
//! - `AwaitingConfirmation`: amount due sent, waiting for the payment result
//!
//! # Valid Transitions
//!
//! - Idle → AwaitingBalance → LookupRecord → ComputeDue → AwaitingConfirmation → Idle
//! - AwaitingBalance → Idle (no balance, malformed balance)
//! - LookupRecord → Idle (not found, already paid, ledger failure)
//! - ComputeDue → Idle (fee or ledger failure)
//!
//! ```
//! use parkgate_settlement::{SettlementState, StateMachine};
//!
//! let mut machine = StateMachine::new();
//! machine.transition_to(SettlementState::AwaitingBalance).unwrap();
//! assert!(machine.transition_to(SettlementState::ComputeDue).is_err());
//! ```

use crate::error::SessionError;
use parkgate_protocol::MessageKind;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Transitions kept for diagnostics; older ones are dropped.
const MAX_HISTORY_SIZE: usize = 100;

/// Phase of a settlement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementState {
    Idle,
    AwaitingBalance,
    LookupRecord,
    ComputeDue,
    AwaitingConfirmation,
}

impl fmt::Display for SettlementState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SettlementState::Idle => "Idle",
            SettlementState::AwaitingBalance => "AwaitingBalance",
            SettlementState::LookupRecord => "LookupRecord",
            SettlementState::ComputeDue => "ComputeDue",
            SettlementState::AwaitingConfirmation => "AwaitingConfirmation",
        };
        f.write_str(name)
    }
}

impl SettlementState {
    /// Whether the session may move from this phase to `target`.
    ///
    /// ```
    /// use parkgate_settlement::SettlementState;
    ///
    /// assert!(SettlementState::Idle.can_transition_to(&SettlementState::AwaitingBalance));
    /// assert!(!SettlementState::Idle.can_transition_to(&SettlementState::ComputeDue));
    /// ```
    pub fn can_transition_to(&self, target: &SettlementState) -> bool {
        use SettlementState::*;

        matches!(
            (self, target),
            (Idle, AwaitingBalance)
                | (AwaitingBalance, LookupRecord | Idle)
                | (LookupRecord, ComputeDue | Idle)
                | (ComputeDue, AwaitingConfirmation | Idle)
                | (AwaitingConfirmation, Idle)
        )
    }

    /// Device messages this state waits for, if it waits at all.
    ///
    /// ```
    /// use parkgate_protocol::MessageKind;
    /// use parkgate_settlement::SettlementState;
    ///
    /// assert_eq!(
    ///     SettlementState::AwaitingBalance.awaited_messages(),
    ///     &[MessageKind::CurrentBalance]
    /// );
    /// assert!(SettlementState::ComputeDue.awaited_messages().is_empty());
    /// ```
    pub fn awaited_messages(&self) -> &'static [MessageKind] {
        match self {
            SettlementState::Idle => &[MessageKind::Plate],
            SettlementState::AwaitingBalance => &[MessageKind::CurrentBalance],
            SettlementState::AwaitingConfirmation => {
                &[MessageKind::PaymentSuccess, MessageKind::InsufficientFunds]
            }
            SettlementState::LookupRecord | SettlementState::ComputeDue => &[],
        }
    }

    /// Returns `true` if `line` carries one of the awaited prefixes.
    pub fn awaits(&self, line: &str) -> bool {
        self.awaited_messages().iter().any(|kind| kind.matches(line))
    }
}

/// A single state transition with timestamp.
///
/// The timestamp follows the Tokio clock and is not serialized.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    pub from: SettlementState,
    pub to: SettlementState,

    #[serde(skip, default = "Instant::now")]
    pub timestamp: Instant,
}

impl StateTransition {
    /// Record a move happening now.
    pub fn new(from: SettlementState, to: SettlementState) -> Self {
        Self {
            from,
            to,
            timestamp: Instant::now(),
        }
    }

    /// Time since the move.
    pub fn elapsed(&self) -> Duration {
        self.timestamp.elapsed()
    }
}

/// Validating state holder with bounded history.
#[derive(Debug)]
pub struct StateMachine {
    current_state: SettlementState,
    state_entered_at: Instant,
    history: VecDeque<StateTransition>,
}

impl StateMachine {
    /// Start in `Idle` with an empty history.
    pub fn new() -> Self {
        Self {
            current_state: SettlementState::Idle,
            state_entered_at: Instant::now(),
            history: VecDeque::new(),
        }
    }

    /// Phase the session is in.
    pub fn current_state(&self) -> SettlementState {
        self.current_state
    }

    /// How long the session has been in its current phase.
    pub fn time_in_current_state(&self) -> Duration {
        self.state_entered_at.elapsed()
    }

    /// Recent transitions, oldest first.
    pub fn history(&self) -> &VecDeque<StateTransition> {
        &self.history
    }

    /// Path of states visited, starting with the first transition's origin.
    pub fn visited_states(&self) -> Vec<SettlementState> {
        let mut states: Vec<_> = self.history.front().map(|t| t.from).into_iter().collect();
        states.extend(self.history.iter().map(|t| t.to));
        states
    }

    /// Move to `new_state` if the transition table allows it.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidStateTransition` if the transition is not
    /// allowed from the current state; the machine is left unchanged.
    pub fn transition_to(&mut self, new_state: SettlementState) -> Result<StateTransition, SessionError> {
        if !self.current_state.can_transition_to(&new_state) {
            return Err(SessionError::InvalidStateTransition {
                from: self.current_state,
                to: new_state,
            });
        }

        let transition = StateTransition::new(self.current_state, new_state);
        debug!(from = %transition.from, to = %transition.to, "State transition");
        self.enter(&transition);
        Ok(transition)
    }

    /// Force the machine back to Idle, e.g. after a link failure.
    pub fn reset(&mut self) -> StateTransition {
        let transition = StateTransition::new(self.current_state, SettlementState::Idle);
        debug!(from = %transition.from, "State machine reset");
        self.enter(&transition);
        transition
    }

    fn enter(&mut self, transition: &StateTransition) {
        self.current_state = transition.to;
        self.state_entered_at = transition.timestamp;

        if self.history.len() == MAX_HISTORY_SIZE {
            self.history.pop_front();
        }
        self.history.push_back(transition.clone());
    }
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}
