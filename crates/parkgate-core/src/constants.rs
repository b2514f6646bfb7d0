//! Core constants for the gate line protocol and settlement timing.
//!
//! The gate device and the host exchange newline-terminated ASCII lines. Each
//! line starts with an uppercase prefix token followed by a colon:
//!
//! ```text
//! PLATE:RAB123A
//! CURRENT_BALANCE:1500
//! DUE:400
//! PAYMENT_SUCCESS:PAID=400,BALANCE=1100
//! STATUS:PAID
//! ```
//!
//! Prefix tokens are case-sensitive. Payloads made of `KEY=value` subfields are
//! separated by commas, and whitespace around keys and values is ignored.
//!
//! # Usage
//!
//! ```
//! use parkgate_core::constants::*;
//!
//! let line = "CURRENT_BALANCE: 1500";
//! assert!(line.starts_with(PREFIX_CURRENT_BALANCE));
//!
//! use std::time::Duration;
//! let timeout = Duration::from_millis(DEFAULT_BALANCE_TIMEOUT_MS);
//! assert_eq!(timeout.as_secs(), 5);
//! ```

// ============================================================================
// Inbound prefixes (device -> host)
// ============================================================================

/// A plate was read at the gate.
pub const PREFIX_PLATE: &str = "PLATE:";

/// Stored-value card balance, in currency units.
pub const PREFIX_CURRENT_BALANCE: &str = "CURRENT_BALANCE:";

/// Payment completed on the device; the card was already debited.
///
/// ```
/// use parkgate_core::constants::PREFIX_PAYMENT_SUCCESS;
///
/// assert!("PAYMENT_SUCCESS:PAID=400,BALANCE=1100".starts_with(PREFIX_PAYMENT_SUCCESS));
/// ```
pub const PREFIX_PAYMENT_SUCCESS: &str = "PAYMENT_SUCCESS:";

/// Payment rejected by the device for lack of funds.
pub const PREFIX_INSUFFICIENT_FUNDS: &str = "INSUFFICIENT_FUNDS:";

// ============================================================================
// Outbound prefixes (host -> device)
// ============================================================================

/// Amount the device must charge.
pub const PREFIX_DUE: &str = "DUE:";

/// Final status of a settlement.
pub const PREFIX_STATUS: &str = "STATUS:";

// ============================================================================
// Payload structure
// ============================================================================

/// Separator between `KEY=value` subfields.
pub const SUBFIELD_DELIMITER: char = ',';

/// Separator between a key and its value.
pub const KEY_VALUE_DELIMITER: char = '=';

/// Amount debited in a `PAYMENT_SUCCESS` payload.
pub const KEY_PAID: &str = "PAID";

/// Card balance in `PAYMENT_SUCCESS` and `INSUFFICIENT_FUNDS` payloads.
pub const KEY_BALANCE: &str = "BALANCE";

/// Amount that was required in an `INSUFFICIENT_FUNDS` payload.
pub const KEY_REQUIRED: &str = "REQUIRED";

/// Line terminator on the wire.
pub const LINE_TERMINATOR: u8 = b'\n';

/// Longest line accepted from the device before the input is rejected.
///
/// Real device lines are well under 64 bytes; anything beyond this is noise
/// on the line or a stuck transmitter.
pub const MAX_LINE_LENGTH: usize = 1024;

// ============================================================================
// Timing
// ============================================================================

/// How long to wait for `CURRENT_BALANCE` after a plate was read.
pub const DEFAULT_BALANCE_TIMEOUT_MS: u64 = 5_000;

/// How long to wait for the payment result after `DUE` was sent.
pub const DEFAULT_CONFIRMATION_TIMEOUT_MS: u64 = 10_000;

/// Idle wait between polls while no vehicle is at the gate.
pub const DEFAULT_IDLE_POLL_MS: u64 = 100;

/// Delay after opening the serial port; the device resets when the port opens.
pub const DEFAULT_RESET_DELAY_MS: u64 = 2_000;

/// Default serial line speed.
pub const DEFAULT_BAUD_RATE: u32 = 9_600;

/// Seconds in one billed hour.
pub const SECONDS_PER_HOUR: i64 = 3_600;

// ============================================================================
// Billing and ledger
// ============================================================================

/// Default parking rate per billed hour, in currency units.
pub const DEFAULT_RATE_PER_HOUR: u64 = 200;

/// Format of every timestamp stored in the ledger.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Ledger column holding the plate.
pub const COLUMN_PLATE: &str = "Plate Number";

/// Ledger column holding the entry timestamp.
pub const COLUMN_ENTRY_TIME: &str = "Timestamp";

/// Ledger column holding the exit timestamp.
pub const COLUMN_EXIT_TIME: &str = "Exit Time";

/// Ledger column holding the computed fee.
pub const COLUMN_DUE_AMOUNT: &str = "Due Amount";

/// Ledger column holding the payment status code.
pub const COLUMN_PAYMENT_STATUS: &str = "Payment Status";

/// Ledger header, in column order.
pub const LEDGER_COLUMNS: [&str; 5] = [
    COLUMN_PLATE,
    COLUMN_ENTRY_TIME,
    COLUMN_EXIT_TIME,
    COLUMN_DUE_AMOUNT,
    COLUMN_PAYMENT_STATUS,
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefixes_end_with_colon() {
        for prefix in [
            PREFIX_PLATE,
            PREFIX_CURRENT_BALANCE,
            PREFIX_PAYMENT_SUCCESS,
            PREFIX_INSUFFICIENT_FUNDS,
            PREFIX_DUE,
            PREFIX_STATUS,
        ] {
            assert!(prefix.ends_with(':'), "{prefix} must end with ':'");
            assert!(prefix.is_ascii());
        }
    }

    #[test]
    fn test_confirmation_wait_is_longer_than_balance_wait() {
        assert!(DEFAULT_CONFIRMATION_TIMEOUT_MS > DEFAULT_BALANCE_TIMEOUT_MS);
    }

    #[test]
    fn test_ledger_header_order() {
        assert_eq!(
            LEDGER_COLUMNS,
            [
                "Plate Number",
                "Timestamp",
                "Exit Time",
                "Due Amount",
                "Payment Status"
            ]
        );
    }
}
