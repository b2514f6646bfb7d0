//! Parking fee computation.
//!
//! Every started hour is billed in full: an exact number of hours bills
//! exactly that many, anything more bills the next whole hour.
//!
//! ```text
//! 10:00:00 -> 12:00:00   2 hours
//! 10:00:00 -> 11:00:01   2 hours
//! 10:00:00 -> 10:00:00   0 hours
//! ```

use chrono::{NaiveDateTime, TimeDelta};
use parkgate_core::Amount;
use parkgate_core::constants::SECONDS_PER_HOUR;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while computing a fee.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FeeError {
    /// Exit is before entry
    #[error("Exit time {exit} is before entry time {entry}")]
    InvalidInterval {
        entry: NaiveDateTime,
        exit: NaiveDateTime,
    },

    /// Amount does not fit the currency type
    #[error("Fee for {billed_hours} hours at {rate_per_hour}/hour overflows")]
    AmountOverflow {
        billed_hours: u64,
        rate_per_hour: Amount,
    },
}

/// Fee for one visit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fee {
    /// Amount due, in currency units
    pub amount: Amount,

    /// Started hours billed
    pub billed_hours: u64,
}

/// Hourly fee calculator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeCalculator {
    rate_per_hour: Amount,
}

impl FeeCalculator {
    /// Create a calculator billing `rate_per_hour` per started hour.
    pub fn new(rate_per_hour: Amount) -> Self {
        Self { rate_per_hour }
    }

    /// Rate per billed hour.
    pub fn rate_per_hour(&self) -> Amount {
        self.rate_per_hour
    }

    /// Compute the fee for a stay from `entry` to `exit`.
    ///
    /// # Errors
    ///
    /// - `FeeError::InvalidInterval` if `exit` is before `entry`
    /// - `FeeError::AmountOverflow` if the amount exceeds [`Amount`]
    ///
    /// # Examples
    ///
    /// ```
    /// use chrono::NaiveDateTime;
    /// use parkgate_settlement::FeeCalculator;
    ///
    /// let at = |s| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap();
    /// let fees = FeeCalculator::new(200);
    ///
    /// let fee = fees.compute_due(&at("2024-01-01 10:00:00"), &at("2024-01-01 11:00:01")).unwrap();
    /// assert_eq!(fee.billed_hours, 2);
    /// assert_eq!(fee.amount, 400);
    /// ```
    pub fn compute_due(
        &self,
        entry: &NaiveDateTime,
        exit: &NaiveDateTime,
    ) -> Result<Fee, FeeError> {
        let stay = *exit - *entry;
        let billed_hours = billed_hours(stay).ok_or(FeeError::InvalidInterval {
            entry: *entry,
            exit: *exit,
        })?;

        let amount = billed_hours
            .checked_mul(self.rate_per_hour)
            .ok_or(FeeError::AmountOverflow {
                billed_hours,
                rate_per_hour: self.rate_per_hour,
            })?;

        Ok(Fee {
            amount,
            billed_hours,
        })
    }
}

/// Started hours in `stay`, or `None` for a negative stay.
pub fn billed_hours(stay: TimeDelta) -> Option<u64> {
    if stay < TimeDelta::zero() {
        return None;
    }

    let seconds = u64::try_from(stay.num_seconds()).ok()?;
    let hour = SECONDS_PER_HOUR.unsigned_abs();
    let full_hours = seconds / hour;
    let partial = seconds % hour != 0 || stay.subsec_nanos() != 0;

    Some(full_hours + u64::from(partial))
}
