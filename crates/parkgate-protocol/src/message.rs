//! Typed protocol messages.
//!
//! # Message Format
//!
//! ```text
//! device -> host                                   host -> device
//! PLATE:<plate>                                    DUE:<amount>
//! CURRENT_BALANCE:<amount>                         STATUS:<status>
//! PAYMENT_SUCCESS:PAID=<amount>,BALANCE=<amount>
//! INSUFFICIENT_FUNDS:BALANCE=<amount>,REQUIRED=<amount>
//! ```
//!
//! Prefixes are matched case-sensitively after the line has been trimmed.
//! Whitespace around payload values, keys and subfields is ignored.
//!
//! # Examples
//!
//! ```
//! use parkgate_protocol::{DeviceMessage, HostMessage, SettlementStatus};
//!
//! let msg: DeviceMessage = "PAYMENT_SUCCESS: PAID = 400 , BALANCE = 1100".parse().unwrap();
//! assert_eq!(msg, DeviceMessage::PaymentSuccess { paid: 400, balance: 1100 });
//!
//! assert_eq!(HostMessage::Status(SettlementStatus::NotFound).to_string(), "STATUS:NOT_FOUND");
//! ```

use crate::error::{ProtocolError, ProtocolResult};
use parkgate_core::constants::{
    KEY_BALANCE, KEY_PAID, KEY_REQUIRED, KEY_VALUE_DELIMITER, PREFIX_CURRENT_BALANCE, PREFIX_DUE,
    PREFIX_INSUFFICIENT_FUNDS, PREFIX_PAYMENT_SUCCESS, PREFIX_PLATE, PREFIX_STATUS,
    SUBFIELD_DELIMITER,
};
use parkgate_core::{Amount, Plate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Class of an inbound device message, identified by its prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageKind {
    Plate,
    CurrentBalance,
    PaymentSuccess,
    InsufficientFunds,
}

impl MessageKind {
    /// All inbound kinds, in protocol order.
    pub const ALL: [MessageKind; 4] = [
        MessageKind::Plate,
        MessageKind::CurrentBalance,
        MessageKind::PaymentSuccess,
        MessageKind::InsufficientFunds,
    ];

    /// Wire prefix of this kind, including the trailing colon.
    #[must_use]
    pub fn prefix(self) -> &'static str {
        match self {
            MessageKind::Plate => PREFIX_PLATE,
            MessageKind::CurrentBalance => PREFIX_CURRENT_BALANCE,
            MessageKind::PaymentSuccess => PREFIX_PAYMENT_SUCCESS,
            MessageKind::InsufficientFunds => PREFIX_INSUFFICIENT_FUNDS,
        }
    }

    /// Classify a raw line by prefix without parsing its payload.
    ///
    /// ```
    /// use parkgate_protocol::MessageKind;
    ///
    /// assert_eq!(MessageKind::of("  PLATE:RAB123A\r"), Some(MessageKind::Plate));
    /// assert_eq!(MessageKind::of("plate:RAB123A"), None);
    /// ```
    #[must_use]
    pub fn of(line: &str) -> Option<MessageKind> {
        let line = line.trim();
        Self::ALL
            .into_iter()
            .find(|kind| line.starts_with(kind.prefix()))
    }

    /// Returns `true` if the raw line carries this kind's prefix.
    #[must_use]
    pub fn matches(self, line: &str) -> bool {
        line.trim().starts_with(self.prefix())
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MessageKind::Plate => "PLATE",
            MessageKind::CurrentBalance => "CURRENT_BALANCE",
            MessageKind::PaymentSuccess => "PAYMENT_SUCCESS",
            MessageKind::InsufficientFunds => "INSUFFICIENT_FUNDS",
        };
        write!(f, "{name}")
    }
}

/// Message sent by the gate device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceMessage {
    /// A vehicle plate was read.
    Plate(Plate),

    /// Balance of the presented card.
    CurrentBalance { balance: Amount },

    /// The device debited the card.
    PaymentSuccess { paid: Amount, balance: Amount },

    /// The device refused to debit the card.
    InsufficientFunds { balance: Amount, required: Amount },
}

impl DeviceMessage {
    /// Parse a raw device line.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::UnknownMessage` if no known prefix matches
    /// - `ProtocolError::MalformedMessage` if the payload cannot be parsed
    pub fn parse(line: &str) -> ProtocolResult<Self> {
        let trimmed = line.trim();
        let kind = MessageKind::of(trimmed)
            .ok_or_else(|| ProtocolError::UnknownMessage(trimmed.to_string()))?;
        let payload = &trimmed[kind.prefix().len()..];

        match kind {
            MessageKind::Plate => Plate::new(payload)
                .map(DeviceMessage::Plate)
                .map_err(|e| ProtocolError::malformed(kind, e.to_string())),
            MessageKind::CurrentBalance => Ok(DeviceMessage::CurrentBalance {
                balance: parse_amount(kind, "balance", payload)?,
            }),
            MessageKind::PaymentSuccess => {
                let fields = Subfields::parse(kind, payload)?;
                Ok(DeviceMessage::PaymentSuccess {
                    paid: fields.amount(KEY_PAID)?,
                    balance: fields.amount(KEY_BALANCE)?,
                })
            }
            MessageKind::InsufficientFunds => {
                let fields = Subfields::parse(kind, payload)?;
                Ok(DeviceMessage::InsufficientFunds {
                    balance: fields.amount(KEY_BALANCE)?,
                    required: fields.amount(KEY_REQUIRED)?,
                })
            }
        }
    }

    /// Class of this message.
    #[must_use]
    pub fn kind(&self) -> MessageKind {
        match self {
            DeviceMessage::Plate(_) => MessageKind::Plate,
            DeviceMessage::CurrentBalance { .. } => MessageKind::CurrentBalance,
            DeviceMessage::PaymentSuccess { .. } => MessageKind::PaymentSuccess,
            DeviceMessage::InsufficientFunds { .. } => MessageKind::InsufficientFunds,
        }
    }
}

impl FromStr for DeviceMessage {
    type Err = ProtocolError;

    fn from_str(s: &str) -> ProtocolResult<Self> {
        DeviceMessage::parse(s)
    }
}

impl fmt::Display for DeviceMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceMessage::Plate(plate) => write!(f, "{PREFIX_PLATE}{plate}"),
            DeviceMessage::CurrentBalance { balance } => {
                write!(f, "{PREFIX_CURRENT_BALANCE}{balance}")
            }
            DeviceMessage::PaymentSuccess { paid, balance } => write!(
                f,
                "{PREFIX_PAYMENT_SUCCESS}{KEY_PAID}={paid},{KEY_BALANCE}={balance}"
            ),
            DeviceMessage::InsufficientFunds { balance, required } => write!(
                f,
                "{PREFIX_INSUFFICIENT_FUNDS}{KEY_BALANCE}={balance},{KEY_REQUIRED}={required}"
            ),
        }
    }
}

/// Final outcome reported to the device with `STATUS:`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SettlementStatus {
    /// No card balance arrived in time
    NoBalance,
    /// Plate is not in the ledger
    NotFound,
    /// Vehicle is settled (now or earlier)
    Paid,
    /// Card balance does not cover the fee
    Insufficient,
    /// Settlement could not be completed
    Failed,
}

impl SettlementStatus {
    /// Wire token following `STATUS:`.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SettlementStatus::NoBalance => "NO_BALANCE",
            SettlementStatus::NotFound => "NOT_FOUND",
            SettlementStatus::Paid => "PAID",
            SettlementStatus::Insufficient => "INSUFFICIENT",
            SettlementStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for SettlementStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SettlementStatus {
    type Err = ProtocolError;

    fn from_str(s: &str) -> ProtocolResult<Self> {
        match s.trim() {
            "NO_BALANCE" => Ok(SettlementStatus::NoBalance),
            "NOT_FOUND" => Ok(SettlementStatus::NotFound),
            "PAID" => Ok(SettlementStatus::Paid),
            "INSUFFICIENT" => Ok(SettlementStatus::Insufficient),
            "FAILED" => Ok(SettlementStatus::Failed),
            other => Err(ProtocolError::UnknownMessage(format!("{PREFIX_STATUS}{other}"))),
        }
    }
}

/// Message sent by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HostMessage {
    /// Amount the device must charge.
    Due(Amount),

    /// Final status of the settlement.
    Status(SettlementStatus),
}

impl fmt::Display for HostMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostMessage::Due(amount) => write!(f, "{PREFIX_DUE}{amount}"),
            HostMessage::Status(status) => write!(f, "{PREFIX_STATUS}{status}"),
        }
    }
}

impl FromStr for HostMessage {
    type Err = ProtocolError;

    /// Parse a host line, as a device (or a test double of one) would.
    fn from_str(s: &str) -> ProtocolResult<Self> {
        let line = s.trim();

        if let Some(amount) = line.strip_prefix(PREFIX_DUE) {
            return amount
                .trim()
                .parse()
                .map(HostMessage::Due)
                .map_err(|_| ProtocolError::UnknownMessage(line.to_string()));
        }

        if let Some(status) = line.strip_prefix(PREFIX_STATUS) {
            return status.parse().map(HostMessage::Status);
        }

        Err(ProtocolError::UnknownMessage(line.to_string()))
    }
}

fn parse_amount(kind: MessageKind, name: &str, value: &str) -> ProtocolResult<Amount> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ProtocolError::malformed(kind, format!("{name} is empty")));
    }
    value
        .parse::<Amount>()
        .map_err(|e| ProtocolError::malformed(kind, format!("{name} {value:?}: {e}")))
}

/// `KEY=value` pairs of a payload, in wire order.
struct Subfields<'a> {
    kind: MessageKind,
    pairs: Vec<(&'a str, &'a str)>,
}

impl<'a> Subfields<'a> {
    fn parse(kind: MessageKind, payload: &'a str) -> ProtocolResult<Self> {
        let pairs = payload
            .split(SUBFIELD_DELIMITER)
            .map(|field| {
                field
                    .split_once(KEY_VALUE_DELIMITER)
                    .map(|(key, value)| (key.trim(), value.trim()))
                    .ok_or_else(|| {
                        ProtocolError::malformed(kind, format!("subfield {:?} has no '='", field.trim()))
                    })
            })
            .collect::<ProtocolResult<Vec<_>>>()?;

        Ok(Self { kind, pairs })
    }

    /// First value for `key`, parsed as an amount.
    fn amount(&self, key: &str) -> ProtocolResult<Amount> {
        let value = self
            .pairs
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| *v)
            .ok_or_else(|| ProtocolError::malformed(self.kind, format!("missing {key}")))?;

        parse_amount(self.kind, key, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("PLATE:RAB123A", DeviceMessage::Plate(Plate::new("RAB123A").unwrap()))]
    #[case("PLATE: RAB123A \r", DeviceMessage::Plate(Plate::new("RAB123A").unwrap()))]
    #[case("CURRENT_BALANCE:1500", DeviceMessage::CurrentBalance { balance: 1500 })]
    #[case("CURRENT_BALANCE: 0 ", DeviceMessage::CurrentBalance { balance: 0 })]
    #[case(
        "PAYMENT_SUCCESS:PAID=400,BALANCE=1100",
        DeviceMessage::PaymentSuccess { paid: 400, balance: 1100 }
    )]
    #[case(
        "PAYMENT_SUCCESS: BALANCE=1100 , PAID= 400",
        DeviceMessage::PaymentSuccess { paid: 400, balance: 1100 }
    )]
    #[case(
        "INSUFFICIENT_FUNDS:BALANCE=100,REQUIRED=400",
        DeviceMessage::InsufficientFunds { balance: 100, required: 400 }
    )]
    fn test_parse_device_message(#[case] line: &str, #[case] expected: DeviceMessage) {
        assert_eq!(DeviceMessage::parse(line).unwrap(), expected);
    }

    #[rstest]
    #[case("HELLO")]
    #[case("plate:RAB123A")]
    #[case("")]
    #[case("DUE:400")]
    fn test_unknown_messages(#[case] line: &str) {
        assert!(matches!(
            DeviceMessage::parse(line),
            Err(ProtocolError::UnknownMessage(_))
        ));
    }

    #[rstest]
    #[case("PLATE:", MessageKind::Plate)]
    #[case("CURRENT_BALANCE:", MessageKind::CurrentBalance)]
    #[case("CURRENT_BALANCE:abc", MessageKind::CurrentBalance)]
    #[case("CURRENT_BALANCE:-5", MessageKind::CurrentBalance)]
    #[case("PAYMENT_SUCCESS:PAID=400", MessageKind::PaymentSuccess)]
    #[case("PAYMENT_SUCCESS:PAID=4x0,BALANCE=1", MessageKind::PaymentSuccess)]
    #[case("PAYMENT_SUCCESS:400,1100", MessageKind::PaymentSuccess)]
    #[case("INSUFFICIENT_FUNDS:BALANCE=100", MessageKind::InsufficientFunds)]
    #[case("INSUFFICIENT_FUNDS:BALANCE=,REQUIRED=400", MessageKind::InsufficientFunds)]
    fn test_malformed_payloads(#[case] line: &str, #[case] expected_kind: MessageKind) {
        match DeviceMessage::parse(line) {
            Err(ProtocolError::MalformedMessage { kind, .. }) => assert_eq!(kind, expected_kind),
            other => panic!("expected malformed {expected_kind}, got {other:?}"),
        }
    }

    #[test]
    fn test_kind_matching_is_case_sensitive() {
        assert!(MessageKind::CurrentBalance.matches("CURRENT_BALANCE:10"));
        assert!(!MessageKind::CurrentBalance.matches("current_balance:10"));
        assert!(!MessageKind::PaymentSuccess.matches("INSUFFICIENT_FUNDS:BALANCE=1,REQUIRED=2"));
    }

    #[test]
    fn test_device_message_display() {
        let msg = DeviceMessage::InsufficientFunds {
            balance: 100,
            required: 400,
        };
        assert_eq!(msg.to_string(), "INSUFFICIENT_FUNDS:BALANCE=100,REQUIRED=400");
        assert_eq!(DeviceMessage::parse(&msg.to_string()).unwrap(), msg);
    }

    #[rstest]
    #[case(HostMessage::Due(400), "DUE:400")]
    #[case(HostMessage::Status(SettlementStatus::NoBalance), "STATUS:NO_BALANCE")]
    #[case(HostMessage::Status(SettlementStatus::NotFound), "STATUS:NOT_FOUND")]
    #[case(HostMessage::Status(SettlementStatus::Paid), "STATUS:PAID")]
    #[case(HostMessage::Status(SettlementStatus::Insufficient), "STATUS:INSUFFICIENT")]
    #[case(HostMessage::Status(SettlementStatus::Failed), "STATUS:FAILED")]
    fn test_host_message_wire_format(#[case] msg: HostMessage, #[case] line: &str) {
        assert_eq!(msg.to_string(), line);
        assert_eq!(line.parse::<HostMessage>().unwrap(), msg);
    }

    #[test]
    fn test_host_message_rejects_unknown_status() {
        assert!("STATUS:MAYBE".parse::<HostMessage>().is_err());
        assert!("DUE:lots".parse::<HostMessage>().is_err());
    }
}
