//! Top-level driver: wait for a plate, settle it, repeat.
//!
//! Sessions never overlap. A new plate is only accepted once the previous
//! session has sent its final status.

use crate::clock::{Clock, SystemClock};
use crate::error::SessionError;
use crate::outcome::SettlementOutcome;
use crate::session::SettlementSession;
use parkgate_core::{Plate, SettlementConfig};
use parkgate_link::{Link, LinkError};
use parkgate_protocol::{DeviceMessage, MessageKind};
use parkgate_storage::{Ledger, LedgerStore};
use serde::Serialize;
use std::future::Future;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Outcome counters since the loop started.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LoopStats {
    pub sessions: u64,
    pub paid: u64,
    pub already_paid: u64,
    pub not_found: u64,
    pub no_balance: u64,
    pub insufficient: u64,
    pub failed: u64,
    pub persistence_failures: u64,
}

impl LoopStats {
    fn record(&mut self, result: &Result<SettlementOutcome, SessionError>) {
        self.sessions += 1;

        match result {
            Ok(SettlementOutcome::Paid { .. }) => self.paid += 1,
            Ok(SettlementOutcome::AlreadyPaid) => self.already_paid += 1,
            Ok(SettlementOutcome::NotFound) => self.not_found += 1,
            Ok(SettlementOutcome::NoBalance) => self.no_balance += 1,
            Ok(SettlementOutcome::Insufficient { .. }) => self.insufficient += 1,
            Ok(SettlementOutcome::Failed { .. }) => self.failed += 1,
            Err(SessionError::Persistence(_)) => self.persistence_failures += 1,
            Err(_) => {}
        }
    }
}

/// Runs settlements one after another over a single link and ledger.
#[derive(Debug)]
pub struct SessionLoop<L, S, C = SystemClock> {
    link: L,
    ledger: Ledger<S>,
    clock: C,
    config: SettlementConfig,
    stats: LoopStats,
}

impl<L, S, C> SessionLoop<L, S, C>
where
    L: Link,
    S: LedgerStore,
    C: Clock,
{
    pub fn new(link: L, ledger: Ledger<S>, clock: C, config: SettlementConfig) -> Self {
        Self {
            link,
            ledger,
            clock,
            config,
            stats: LoopStats::default(),
        }
    }

    /// Get the ledger.
    pub fn ledger(&self) -> &Ledger<S> {
        &self.ledger
    }

    /// Outcome counters so far.
    pub fn stats(&self) -> LoopStats {
        self.stats
    }

    /// Wait for the next readable plate.
    ///
    /// Waits in bounded slices of the idle poll interval. Lines other than
    /// `PLATE:` arrive outside any session and are dropped. A payment
    /// result among them came after its session gave up: the card may have
    /// been charged while the record stayed unpaid, so it is logged as an
    /// error for the operator to reconcile.
    ///
    /// # Errors
    ///
    /// Returns the link error if the link fails or closes.
    pub async fn next_plate(&mut self) -> Result<Plate, LinkError> {
        loop {
            let deadline = Instant::now() + self.config.idle_poll;
            let line = match self.link.receive_line(deadline).await {
                Ok(line) => line,
                Err(e) if e.is_timeout() => continue,
                Err(e) => return Err(e),
            };

            match MessageKind::of(&line) {
                Some(MessageKind::Plate) => match DeviceMessage::parse(&line) {
                    Ok(DeviceMessage::Plate(plate)) => return Ok(plate),
                    other => warn!(line = %line, result = ?other, "Ignoring unreadable plate"),
                },
                Some(MessageKind::PaymentSuccess) => {
                    error!(
                        line = %line,
                        "Late payment result, card may be charged without a paid record"
                    );
                }
                Some(kind @ MessageKind::InsufficientFunds) => {
                    warn!(line = %line, %kind, "Late payment result outside a session");
                }
                Some(kind) => debug!(line = %line, %kind, "Discarding device line outside a session"),
                None => debug!(line = %line, "Discarding unrecognised device line"),
            }
        }
    }

    /// Run one settlement for `plate` and count its outcome.
    pub async fn settle(&mut self, plate: Plate) -> Result<SettlementOutcome, SessionError> {
        let mut session = SettlementSession::new(
            plate,
            &mut self.link,
            &mut self.ledger,
            &self.clock,
            &self.config,
        );
        let result = session.run().await;

        self.stats.record(&result);
        result
    }

    /// Settle plates until `shutdown` completes.
    ///
    /// Shutdown is only observed between sessions; a session in progress
    /// always runs to its final status. A ledger failure ends only the
    /// session it happened in.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Link` when the link fails or closes.
    pub async fn run_until<F>(&mut self, shutdown: F) -> Result<(), SessionError>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        info!("Settlement loop started, waiting for vehicles");

        loop {
            let plate = tokio::select! {
                biased;
                () = &mut shutdown => {
                    info!(stats = ?self.stats, "Shutdown requested, settlement loop stopped");
                    return Ok(());
                }
                plate = self.next_plate() => plate?,
            };

            match self.settle(plate).await {
                Ok(_) => {}
                Err(SessionError::Persistence(e)) => {
                    error!(
                        error = %e,
                        failures = self.stats.persistence_failures,
                        "Settlement aborted by ledger failure, continuing"
                    );
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Settle plates until the link fails.
    pub async fn run(&mut self) -> Result<(), SessionError> {
        self.run_until(std::future::pending()).await
    }
}
