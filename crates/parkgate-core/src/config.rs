//! Runtime configuration.
//!
//! Every component receives its configuration explicitly at construction.
//! [`AppConfig::from_env`] assembles the whole set from `PARKGATE_*`
//! environment variables, falling back to the defaults below.

use crate::constants::{
    DEFAULT_BALANCE_TIMEOUT_MS, DEFAULT_BAUD_RATE, DEFAULT_CONFIRMATION_TIMEOUT_MS,
    DEFAULT_IDLE_POLL_MS, DEFAULT_RATE_PER_HOUR, DEFAULT_RESET_DELAY_MS,
};
use crate::{Amount, Error, Result};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const ENV_LINK: &str = "PARKGATE_LINK";
pub const ENV_SERIAL_PORT: &str = "PARKGATE_SERIAL_PORT";
pub const ENV_BAUD_RATE: &str = "PARKGATE_BAUD_RATE";
pub const ENV_RESET_DELAY_MS: &str = "PARKGATE_RESET_DELAY_MS";
pub const ENV_TCP_ADDR: &str = "PARKGATE_TCP_ADDR";
pub const ENV_LEDGER: &str = "PARKGATE_LEDGER";
pub const ENV_LEDGER_BACKEND: &str = "PARKGATE_LEDGER_BACKEND";
pub const ENV_RATE_PER_HOUR: &str = "PARKGATE_RATE_PER_HOUR";
pub const ENV_BALANCE_TIMEOUT_MS: &str = "PARKGATE_BALANCE_TIMEOUT_MS";
pub const ENV_CONFIRMATION_TIMEOUT_MS: &str = "PARKGATE_CONFIRMATION_TIMEOUT_MS";
pub const ENV_IDLE_POLL_MS: &str = "PARKGATE_IDLE_POLL_MS";

/// Serial port settings for the gate device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialConfig {
    /// Device path, e.g. `/dev/ttyACM0` or `COM10`
    pub port: String,

    /// Line speed
    pub baud_rate: u32,

    /// Wait after opening the port before the device is usable
    pub reset_delay: Duration,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyACM0".to_string(),
            baud_rate: DEFAULT_BAUD_RATE,
            reset_delay: Duration::from_millis(DEFAULT_RESET_DELAY_MS),
        }
    }
}

impl SerialConfig {
    /// Create a serial configuration for the given port
    pub fn new(port: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            ..Default::default()
        }
    }

    /// Set the line speed
    pub fn baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    /// Set the post-open reset delay
    pub fn reset_delay(mut self, delay: Duration) -> Self {
        self.reset_delay = delay;
        self
    }
}

/// Transport used to reach the gate device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkConfig {
    /// Directly attached serial device
    Serial(SerialConfig),

    /// Serial-over-TCP bridge or device emulator
    Tcp { addr: SocketAddr },
}

impl Default for LinkConfig {
    fn default() -> Self {
        LinkConfig::Serial(SerialConfig::default())
    }
}

/// Backing store for the vehicle ledger.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LedgerBackend {
    /// Tabular text file with a header row
    #[default]
    Csv,

    /// Embedded SQLite database
    Sqlite,
}

impl FromStr for LedgerBackend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "csv" => Ok(LedgerBackend::Csv),
            "sqlite" => Ok(LedgerBackend::Sqlite),
            other => Err(Error::InvalidConfigValue {
                key: ENV_LEDGER_BACKEND.to_string(),
                reason: format!("unknown backend '{other}', expected csv or sqlite"),
            }),
        }
    }
}

/// Ledger location and backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerConfig {
    /// Path of the ledger file or database
    pub path: PathBuf,

    /// Store implementation
    pub backend: LedgerBackend,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("plates_log.csv"),
            backend: LedgerBackend::Csv,
        }
    }
}

impl LedgerConfig {
    /// Create a ledger configuration for the given path
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    /// Set the backend
    pub fn backend(mut self, backend: LedgerBackend) -> Self {
        self.backend = backend;
        self
    }
}

/// Billing rate and protocol deadlines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettlementConfig {
    /// Currency units charged per billed hour
    pub rate_per_hour: Amount,

    /// Deadline for `CURRENT_BALANCE` after a plate was read
    pub balance_timeout: Duration,

    /// Deadline for the payment result after `DUE` was sent
    pub confirmation_timeout: Duration,

    /// Idle wait between polls while the gate is empty
    pub idle_poll: Duration,
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            rate_per_hour: DEFAULT_RATE_PER_HOUR,
            balance_timeout: Duration::from_millis(DEFAULT_BALANCE_TIMEOUT_MS),
            confirmation_timeout: Duration::from_millis(DEFAULT_CONFIRMATION_TIMEOUT_MS),
            idle_poll: Duration::from_millis(DEFAULT_IDLE_POLL_MS),
        }
    }
}

impl SettlementConfig {
    /// Set the rate per billed hour
    pub fn rate_per_hour(mut self, rate: Amount) -> Self {
        self.rate_per_hour = rate;
        self
    }

    /// Set the balance deadline
    pub fn balance_timeout(mut self, timeout: Duration) -> Self {
        self.balance_timeout = timeout;
        self
    }

    /// Set the confirmation deadline
    pub fn confirmation_timeout(mut self, timeout: Duration) -> Self {
        self.confirmation_timeout = timeout;
        self
    }

    /// Set the idle poll interval
    pub fn idle_poll(mut self, interval: Duration) -> Self {
        self.idle_poll = interval;
        self
    }

    /// Reject settings that would make the protocol unusable.
    ///
    /// # Errors
    /// Returns `Error::Config` for a zero rate or any zero wait.
    pub fn validate(&self) -> Result<()> {
        if self.rate_per_hour == 0 {
            return Err(Error::Config("rate per hour must be positive".to_string()));
        }
        if self.balance_timeout.is_zero()
            || self.confirmation_timeout.is_zero()
            || self.idle_poll.is_zero()
        {
            return Err(Error::Config("timeouts must be positive".to_string()));
        }
        Ok(())
    }
}

/// Complete application configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppConfig {
    pub link: LinkConfig,
    pub ledger: LedgerConfig,
    pub settlement: SettlementConfig,
}

impl AppConfig {
    /// Build the configuration from `PARKGATE_*` environment variables.
    ///
    /// # Errors
    /// Returns an error if a variable is set to a value that cannot be parsed,
    /// or if the resulting settlement settings are invalid.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    ///
    /// Unset keys keep their defaults.
    ///
    /// ```
    /// use parkgate_core::{AppConfig, LinkConfig};
    ///
    /// let config = AppConfig::from_lookup(|key| match key {
    ///     "PARKGATE_LINK" => Some("tcp".to_string()),
    ///     "PARKGATE_TCP_ADDR" => Some("10.0.0.5:7000".to_string()),
    ///     _ => None,
    /// })
    /// .unwrap();
    ///
    /// assert!(matches!(config.link, LinkConfig::Tcp { .. }));
    /// ```
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let serial_defaults = SerialConfig::default();
        let link_kind = lookup(ENV_LINK).unwrap_or_else(|| "serial".to_string());

        let link = match link_kind.trim().to_ascii_lowercase().as_str() {
            "serial" => LinkConfig::Serial(SerialConfig {
                port: lookup(ENV_SERIAL_PORT).unwrap_or(serial_defaults.port),
                baud_rate: parse_or(&lookup, ENV_BAUD_RATE, serial_defaults.baud_rate)?,
                reset_delay: millis_or(&lookup, ENV_RESET_DELAY_MS, serial_defaults.reset_delay)?,
            }),
            "tcp" => LinkConfig::Tcp {
                addr: parse_or(
                    &lookup,
                    ENV_TCP_ADDR,
                    SocketAddr::from(([127, 0, 0, 1], 7000)),
                )?,
            },
            other => {
                return Err(Error::InvalidConfigValue {
                    key: ENV_LINK.to_string(),
                    reason: format!("unknown link '{other}', expected serial or tcp"),
                });
            }
        };

        let ledger_defaults = LedgerConfig::default();
        let ledger = LedgerConfig {
            path: lookup(ENV_LEDGER)
                .map(PathBuf::from)
                .unwrap_or(ledger_defaults.path),
            backend: parse_or(&lookup, ENV_LEDGER_BACKEND, ledger_defaults.backend)?,
        };

        let defaults = SettlementConfig::default();
        let settlement = SettlementConfig {
            rate_per_hour: parse_or(&lookup, ENV_RATE_PER_HOUR, defaults.rate_per_hour)?,
            balance_timeout: millis_or(&lookup, ENV_BALANCE_TIMEOUT_MS, defaults.balance_timeout)?,
            confirmation_timeout: millis_or(
                &lookup,
                ENV_CONFIRMATION_TIMEOUT_MS,
                defaults.confirmation_timeout,
            )?,
            idle_poll: millis_or(&lookup, ENV_IDLE_POLL_MS, defaults.idle_poll)?,
        };
        settlement.validate()?;

        Ok(Self {
            link,
            ledger,
            settlement,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| Error::InvalidConfigValue {
            key: key.to_string(),
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}

fn millis_or<F>(lookup: &F, key: &str, default: Duration) -> Result<Duration>
where
    F: Fn(&str) -> Option<String>,
{
    let default_ms = u64::try_from(default.as_millis()).unwrap_or(u64::MAX);
    parse_or(lookup, key, default_ms).map(Duration::from_millis)
}
