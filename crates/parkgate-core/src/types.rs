use crate::{Result, constants::TIMESTAMP_FORMAT, error::Error};
use chrono::{Local, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Currency amount in whole units. The domain has no fractional units.
pub type Amount = u64;

/// Vehicle plate as read by the gate device.
///
/// Plates are compared exactly: case-sensitive, no normalization beyond the
/// surrounding whitespace removed when parsing a device line.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Plate(String);

impl Plate {
    /// Create a plate from raw device input.
    ///
    /// # Errors
    /// Returns `Error::InvalidPlate` if the trimmed input is empty or contains
    /// non-ASCII or control characters.
    pub fn new(raw: &str) -> Result<Self> {
        let plate = raw.trim();

        if plate.is_empty() {
            return Err(Error::InvalidPlate("plate is empty".to_string()));
        }

        if !plate.is_ascii() || plate.chars().any(|c| c.is_ascii_control()) {
            return Err(Error::InvalidPlate(format!(
                "plate must be printable ASCII, got {plate:?}"
            )));
        }

        Ok(Plate(plate.to_string()))
    }

    /// Get the plate as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Plate {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for Plate {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Plate::new(s)
    }
}

/// Payment state of a vehicle record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum PaymentStatus {
    #[default]
    Unpaid = 0,
    Paid = 1,
}

impl PaymentStatus {
    /// Create a payment status from its ledger code.
    ///
    /// # Errors
    /// Returns `Error::InvalidPaymentStatus` if the value is not 0 or 1.
    #[inline]
    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            0 => Ok(PaymentStatus::Unpaid),
            1 => Ok(PaymentStatus::Paid),
            _ => Err(Error::InvalidPaymentStatus(value.to_string())),
        }
    }

    /// Convert the payment status to its ledger code.
    #[inline]
    #[must_use]
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Returns `true` if the record has been paid.
    #[inline]
    #[must_use]
    pub fn is_paid(self) -> bool {
        matches!(self, PaymentStatus::Paid)
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PaymentStatus::Unpaid => write!(f, "Unpaid"),
            PaymentStatus::Paid => write!(f, "Paid"),
        }
    }
}

/// Wall-clock timestamp as stored in the ledger (`YYYY-MM-DD HH:MM:SS`).
///
/// The ledger holds whole seconds only. Sub-second precision is dropped on
/// construction so that a record written and reloaded compares equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LedgerTimestamp(NaiveDateTime);

impl LedgerTimestamp {
    /// Create a timestamp from the current local time.
    #[must_use]
    pub fn now() -> Self {
        Self::from_datetime(Local::now().naive_local())
    }

    /// Create a timestamp from a naive local date-time, truncated to seconds.
    #[must_use]
    pub fn from_datetime(dt: NaiveDateTime) -> Self {
        LedgerTimestamp(dt.with_nanosecond(0).unwrap_or(dt))
    }

    /// Parse from ledger format: "2024-01-01 10:00:00".
    ///
    /// # Errors
    /// Returns `Error::InvalidTimestamp` if the string does not match the
    /// ledger format.
    pub fn parse(s: &str) -> Result<Self> {
        let dt = NaiveDateTime::parse_from_str(s.trim(), TIMESTAMP_FORMAT).map_err(|e| {
            Error::InvalidTimestamp {
                value: s.to_string(),
                reason: e.to_string(),
            }
        })?;

        Ok(LedgerTimestamp(dt))
    }

    /// Format for the ledger.
    #[must_use]
    pub fn format(&self) -> String {
        self.0.format(TIMESTAMP_FORMAT).to_string()
    }

    /// Get the inner date-time.
    #[must_use]
    pub fn inner(&self) -> &NaiveDateTime {
        &self.0
    }
}

impl fmt::Display for LedgerTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.format())
    }
}

impl std::str::FromStr for LedgerTimestamp {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        LedgerTimestamp::parse(s)
    }
}

impl From<NaiveDateTime> for LedgerTimestamp {
    fn from(dt: NaiveDateTime) -> Self {
        LedgerTimestamp::from_datetime(dt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("RAB123A", "RAB123A")]
    #[case("  RAC 456 B \r", "RAC 456 B")]
    #[case("rab123a", "rab123a")]
    fn test_plate_valid(#[case] input: &str, #[case] expected: &str) {
        let plate: Plate = input.parse().unwrap();
        assert_eq!(plate.as_str(), expected);
    }

    #[rstest]
    #[case("")]
    #[case("   ")]
    #[case("RAB\u{7}123")]
    #[case("RÂB123")]
    fn test_plate_invalid(#[case] input: &str) {
        assert!(matches!(Plate::new(input), Err(Error::InvalidPlate(_))));
    }

    #[test]
    fn test_payment_status_codes() {
        assert_eq!(PaymentStatus::from_u8(0).unwrap(), PaymentStatus::Unpaid);
        assert_eq!(PaymentStatus::from_u8(1).unwrap(), PaymentStatus::Paid);
        assert!(PaymentStatus::from_u8(2).is_err());

        assert_eq!(PaymentStatus::Paid.to_u8(), 1);
        assert!(PaymentStatus::Paid.is_paid());
        assert!(!PaymentStatus::default().is_paid());
    }

    #[test]
    fn test_ledger_timestamp_round_trip() {
        let ts = LedgerTimestamp::parse("2024-01-01 10:00:00").unwrap();
        assert_eq!(ts.format(), "2024-01-01 10:00:00");
        assert_eq!(ts.to_string(), "2024-01-01 10:00:00");
    }

    #[rstest]
    #[case("01/01/2024 10:00:00")]
    #[case("2024-01-01T10:00:00")]
    #[case("2024-13-01 10:00:00")]
    #[case("")]
    fn test_ledger_timestamp_invalid(#[case] input: &str) {
        assert!(matches!(
            LedgerTimestamp::parse(input),
            Err(Error::InvalidTimestamp { .. })
        ));
    }

    #[test]
    fn test_ledger_timestamp_drops_subseconds() {
        let precise = NaiveDateTime::parse_from_str("2024-01-01 10:00:00.750", "%Y-%m-%d %H:%M:%S%.3f")
            .unwrap();
        let ts = LedgerTimestamp::from_datetime(precise);

        assert_eq!(ts, LedgerTimestamp::parse("2024-01-01 10:00:00").unwrap());
    }
}
