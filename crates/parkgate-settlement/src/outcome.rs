//! Results of a settlement, as reported to the device.

use crate::fee::FeeError;
use parkgate_core::Amount;
use parkgate_protocol::SettlementStatus;
use std::fmt;

/// Why a settlement ended with `STATUS:FAILED` without a ledger failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// The `CURRENT_BALANCE` payload was not a whole amount
    MalformedBalance,

    /// No payment result arrived after `DUE` was sent
    ConfirmationTimeout,

    /// The payment result could not be parsed
    MalformedConfirmation,

    /// The fee could not be computed from the recorded entry time
    Fee(FeeError),
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::MalformedBalance => write!(f, "malformed balance"),
            FailureReason::ConfirmationTimeout => write!(f, "no payment confirmation"),
            FailureReason::MalformedConfirmation => write!(f, "malformed payment confirmation"),
            FailureReason::Fee(e) => write!(f, "fee error: {e}"),
        }
    }
}

/// How one settlement ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettlementOutcome {
    /// The device reported no card balance in time
    NoBalance,

    /// The plate has no ledger record
    NotFound,

    /// The record was settled by an earlier session
    AlreadyPaid,

    /// Payment recorded
    Paid {
        due: Amount,
        paid: Amount,
        balance: Amount,
        billed_hours: u64,
    },

    /// The device declined the payment; the fee stands for a retry
    Insufficient {
        due: Amount,
        balance: Amount,
        required: Amount,
    },

    /// Device-side failure; the record is still unpaid
    Failed { reason: FailureReason },
}

impl SettlementOutcome {
    /// Status line sent to the device for this outcome.
    ///
    /// ```
    /// use parkgate_protocol::SettlementStatus;
    /// use parkgate_settlement::SettlementOutcome;
    ///
    /// assert_eq!(SettlementOutcome::AlreadyPaid.status(), SettlementStatus::Paid);
    /// assert_eq!(SettlementOutcome::NotFound.status(), SettlementStatus::NotFound);
    /// ```
    pub fn status(&self) -> SettlementStatus {
        match self {
            SettlementOutcome::NoBalance => SettlementStatus::NoBalance,
            SettlementOutcome::NotFound => SettlementStatus::NotFound,
            SettlementOutcome::AlreadyPaid | SettlementOutcome::Paid { .. } => {
                SettlementStatus::Paid
            }
            SettlementOutcome::Insufficient { .. } => SettlementStatus::Insufficient,
            SettlementOutcome::Failed { .. } => SettlementStatus::Failed,
        }
    }

    pub(crate) fn failed(reason: FailureReason) -> Self {
        SettlementOutcome::Failed { reason }
    }
}
