use parkgate_core::{Amount, LedgerTimestamp, PaymentStatus, Plate};
use serde::{Deserialize, Serialize};

/// One parking visit in the ledger.
///
/// Rows are created by the entry side with only the plate and entry time set.
/// Settlement fills in the exit time and fee, then the payment status.
///
/// # Examples
///
/// ```
/// use parkgate_core::{LedgerTimestamp, Plate};
/// use parkgate_storage::models::VehicleRecord;
///
/// let record = VehicleRecord::new(
///     Plate::new("RAB123A").unwrap(),
///     LedgerTimestamp::parse("2024-01-01 10:00:00").unwrap(),
/// );
///
/// assert!(!record.is_paid());
/// assert!(!record.has_exited());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VehicleRecord {
    /// Plate as read at the entry gate
    pub plate: Plate,

    /// When the vehicle entered
    pub entry_time: LedgerTimestamp,

    /// When settlement computed the fee; `None` until then
    pub exit_time: Option<LedgerTimestamp>,

    /// Fee computed at exit; `None` until then
    pub due_amount: Option<Amount>,

    /// Whether the visit is settled
    pub payment_status: PaymentStatus,
}

impl VehicleRecord {
    /// Create an unpaid record for a vehicle that has just entered.
    pub fn new(plate: Plate, entry_time: LedgerTimestamp) -> Self {
        Self {
            plate,
            entry_time,
            exit_time: None,
            due_amount: None,
            payment_status: PaymentStatus::Unpaid,
        }
    }

    /// Returns `true` if the visit is settled.
    pub fn is_paid(&self) -> bool {
        self.payment_status.is_paid()
    }

    /// Returns `true` once an exit time was recorded.
    pub fn has_exited(&self) -> bool {
        self.exit_time.is_some()
    }
}
