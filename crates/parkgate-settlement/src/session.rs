//! One plate-to-outcome settlement.
//!
//! A [`SettlementSession`] starts once the gate has read a plate. It waits for
//! the card balance, finds the vehicle in the ledger, records the fee, asks the
//! device to charge it and records the payment. Every path ends with exactly
//! one `STATUS:` line to the device and the machine back in `Idle`.
//!
//! Device problems (silence, garbage, declined cards) become outcomes. Only a
//! ledger failure or a broken link ends the session with an error; a ledger
//! failure still sends `STATUS:FAILED` first.

use crate::clock::Clock;
use crate::error::SessionError;
use crate::fee::{Fee, FeeCalculator};
use crate::outcome::{FailureReason, SettlementOutcome};
use crate::state::{SettlementState, StateMachine, StateTransition};
use parkgate_core::{Amount, LedgerTimestamp, Plate, SettlementConfig};
use parkgate_link::{Link, LinkError};
use parkgate_protocol::{DeviceMessage, HostMessage, SettlementStatus};
use parkgate_storage::{Ledger, LedgerStore, RecordHandle, StorageError};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

/// Result of one phase: move on with a value, or end the session.
enum Step<T> {
    Continue(T),
    Finish(SettlementOutcome),
}

/// Drives one vehicle through settlement.
///
/// # Examples
///
/// ```
/// use chrono::{NaiveDate, TimeDelta};
/// use parkgate_core::{LedgerTimestamp, Plate, SettlementConfig};
/// use parkgate_link::MockLink;
/// use parkgate_settlement::{ManualClock, SettlementOutcome, SettlementSession};
/// use parkgate_storage::{Ledger, MemoryLedgerStore, VehicleRecord};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let entry = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap().and_hms_opt(10, 0, 0).unwrap();
/// let plate = Plate::new("RAB123A")?;
/// let store = MemoryLedgerStore::with_records(vec![VehicleRecord::new(
///     plate.clone(),
///     LedgerTimestamp::from_datetime(entry),
/// )]);
/// let mut ledger = Ledger::open(store).await?;
/// let clock = ManualClock::new(entry + TimeDelta::hours(2));
/// let config = SettlementConfig::default();
///
/// let (mut link, device) = MockLink::new();
/// device
///     .send_lines(["CURRENT_BALANCE:1500", "PAYMENT_SUCCESS:PAID=400,BALANCE=1100"])
///     .await?;
///
/// let mut session = SettlementSession::new(plate, &mut link, &mut ledger, &clock, &config);
/// let outcome = session.run().await?;
///
/// assert!(matches!(outcome, SettlementOutcome::Paid { due: 400, .. }));
/// assert_eq!(device.sent_lines(), vec!["DUE:400", "STATUS:PAID"]);
/// # Ok(())
/// # }
/// ```
pub struct SettlementSession<'a, L, S, C> {
    id: Uuid,
    plate: Plate,
    link: &'a mut L,
    ledger: &'a mut Ledger<S>,
    clock: &'a C,
    config: &'a SettlementConfig,
    fees: FeeCalculator,
    machine: StateMachine,
}

impl<'a, L, S, C> SettlementSession<'a, L, S, C>
where
    L: Link,
    S: LedgerStore,
    C: Clock,
{
    /// Create a session for a plate the gate has just read.
    pub fn new(
        plate: Plate,
        link: &'a mut L,
        ledger: &'a mut Ledger<S>,
        clock: &'a C,
        config: &'a SettlementConfig,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            plate,
            link,
            ledger,
            clock,
            config,
            fees: FeeCalculator::new(config.rate_per_hour),
            machine: StateMachine::new(),
        }
    }

    /// Session identifier, as it appears in logs.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Plate being settled.
    pub fn plate(&self) -> &Plate {
        &self.plate
    }

    /// Current phase.
    pub fn state(&self) -> SettlementState {
        self.machine.current_state()
    }

    /// Phases passed through so far.
    pub fn history(&self) -> &VecDeque<StateTransition> {
        self.machine.history()
    }

    /// Run the settlement to its end.
    ///
    /// # Errors
    ///
    /// - `SessionError::Persistence` if the ledger could not be read or
    ///   written; the device was sent `STATUS:FAILED`
    /// - `SessionError::Link` if the device link failed
    pub async fn run(&mut self) -> Result<SettlementOutcome, SessionError> {
        let span = info_span!("settlement", session = %self.id, plate = %self.plate);
        let result = self.settle().instrument(span).await;

        if result.is_err() && self.machine.current_state() != SettlementState::Idle {
            self.machine.reset();
        }

        result
    }

    async fn settle(&mut self) -> Result<SettlementOutcome, SessionError> {
        info!("Vehicle at gate, waiting for card balance");
        self.machine.transition_to(SettlementState::AwaitingBalance)?;

        let balance = match self.await_balance().await? {
            Step::Continue(balance) => balance,
            Step::Finish(outcome) => return self.finish(outcome).await,
        };

        self.machine.transition_to(SettlementState::LookupRecord)?;
        let handle = match self.lookup_record().await? {
            Step::Continue(handle) => handle,
            Step::Finish(outcome) => return self.finish(outcome).await,
        };

        self.machine.transition_to(SettlementState::ComputeDue)?;
        let fee = match self.compute_due(handle).await? {
            Step::Continue(fee) => fee,
            Step::Finish(outcome) => return self.finish(outcome).await,
        };

        self.machine.transition_to(SettlementState::AwaitingConfirmation)?;
        let outcome = self.await_confirmation(handle, fee, balance).await?;
        self.finish(outcome).await
    }

    async fn await_balance(&mut self) -> Result<Step<Amount>, SessionError> {
        let timeout = self.config.balance_timeout;
        let Some(line) = self.receive_awaited(timeout).await? else {
            warn!(timeout_ms = timeout.as_millis() as u64, "No card balance before deadline");
            return Ok(Step::Finish(SettlementOutcome::NoBalance));
        };

        match DeviceMessage::parse(&line) {
            Ok(DeviceMessage::CurrentBalance { balance }) => {
                info!(balance, "Card balance received");
                Ok(Step::Continue(balance))
            }
            other => {
                warn!(line = %line, result = ?other, "Malformed card balance");
                Ok(Step::Finish(SettlementOutcome::failed(
                    FailureReason::MalformedBalance,
                )))
            }
        }
    }

    async fn lookup_record(&mut self) -> Result<Step<RecordHandle>, SessionError> {
        // Entries are appended by the entry gate while we run.
        if let Err(e) = self.ledger.reload().await {
            return self.fail_persistence(e).await;
        }

        let Some(handle) = self.ledger.find_by_plate(&self.plate) else {
            info!("Plate not in ledger");
            return Ok(Step::Finish(SettlementOutcome::NotFound));
        };

        let already_paid = match self.ledger.record(handle) {
            Ok(record) => record.is_paid(),
            Err(e) => return self.fail_persistence(e).await,
        };

        if already_paid {
            info!("Visit already settled");
            return Ok(Step::Finish(SettlementOutcome::AlreadyPaid));
        }

        Ok(Step::Continue(handle))
    }

    async fn compute_due(&mut self, handle: RecordHandle) -> Result<Step<Fee>, SessionError> {
        let entry = match self.ledger.record(handle) {
            Ok(record) => *record.entry_time.inner(),
            Err(e) => return self.fail_persistence(e).await,
        };
        let exit = self.clock.now();

        let fee = match self.fees.compute_due(&entry, &exit) {
            Ok(fee) => fee,
            Err(e) => {
                error!(error = %e, "Cannot compute fee from ledger entry time");
                return Ok(Step::Finish(SettlementOutcome::failed(FailureReason::Fee(
                    e,
                ))));
            }
        };

        if let Err(e) =
            self.ledger
                .mark_exit(handle, LedgerTimestamp::from_datetime(exit), fee.amount)
        {
            return self.fail_persistence(e).await;
        }
        if let Err(e) = self.ledger.persist().await {
            return self.fail_persistence(e).await;
        }

        info!(
            billed_hours = fee.billed_hours,
            due = fee.amount,
            "Exit and fee recorded"
        );
        Ok(Step::Continue(fee))
    }

    async fn await_confirmation(
        &mut self,
        handle: RecordHandle,
        fee: Fee,
        card_balance: Amount,
    ) -> Result<SettlementOutcome, SessionError> {
        debug!(card_balance, due = fee.amount, "Sending amount due");
        self.link.send_message(&HostMessage::Due(fee.amount)).await?;

        let timeout = self.config.confirmation_timeout;
        let Some(line) = self.receive_awaited(timeout).await? else {
            warn!(
                timeout_ms = timeout.as_millis() as u64,
                "No payment result before deadline, fee stays recorded"
            );
            return Ok(SettlementOutcome::failed(FailureReason::ConfirmationTimeout));
        };

        match DeviceMessage::parse(&line) {
            Ok(DeviceMessage::PaymentSuccess { paid, balance }) => {
                if paid != fee.amount {
                    warn!(paid, due = fee.amount, "Device charged a different amount");
                }

                if let Err(e) = self.ledger.mark_paid(handle) {
                    return self.fail_persistence(e).await;
                }
                if let Err(e) = self.ledger.persist().await {
                    error!(paid, "Card was charged but the payment is not recorded");
                    return self.fail_persistence(e).await;
                }

                info!(paid, balance, "Payment recorded");
                Ok(SettlementOutcome::Paid {
                    due: fee.amount,
                    paid,
                    balance,
                    billed_hours: fee.billed_hours,
                })
            }
            Ok(DeviceMessage::InsufficientFunds { balance, required }) => {
                info!(balance, required, "Payment declined for insufficient funds");
                Ok(SettlementOutcome::Insufficient {
                    due: fee.amount,
                    balance,
                    required,
                })
            }
            other => {
                warn!(line = %line, result = ?other, "Malformed payment result");
                Ok(SettlementOutcome::failed(
                    FailureReason::MalformedConfirmation,
                ))
            }
        }
    }

    /// Next line the current state waits for, or `None` on timeout.
    async fn receive_awaited(&mut self, timeout: Duration) -> Result<Option<String>, LinkError> {
        let state = self.machine.current_state();
        let deadline = Instant::now() + timeout;

        match self
            .link
            .receive_line_matching(move |line| state.awaits(line), deadline)
            .await
        {
            Ok(line) => Ok(Some(line)),
            Err(e) if e.is_timeout() => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn finish(
        &mut self,
        outcome: SettlementOutcome,
    ) -> Result<SettlementOutcome, SessionError> {
        let status = outcome.status();
        self.link.send_message(&HostMessage::Status(status)).await?;
        self.machine.transition_to(SettlementState::Idle)?;

        let elapsed = self
            .machine
            .history()
            .front()
            .map(StateTransition::elapsed)
            .unwrap_or_default();
        info!(%status, elapsed_ms = elapsed.as_millis() as u64, "Settlement finished");
        Ok(outcome)
    }

    async fn fail_persistence<T>(&mut self, e: StorageError) -> Result<T, SessionError> {
        error!(
            error = %e,
            state = %self.machine.current_state(),
            "Ledger failure, aborting settlement"
        );

        let failed = HostMessage::Status(SettlementStatus::Failed);
        if let Err(link_error) = self.link.send_message(&failed).await {
            error!(error = %link_error, "Could not report the failure to the device");
        }

        self.machine.transition_to(SettlementState::Idle)?;
        Err(SessionError::Persistence(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
    use parkgate_core::PaymentStatus;
    use parkgate_link::{MockLink, MockLinkHandle};
    use parkgate_storage::{MemoryLedgerStore, VehicleRecord};
    use rstest::rstest;
    use SettlementState::*;

    const PLATE: &str = "RAB123A";

    fn entry_time() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap()
    }

    fn plate() -> Plate {
        Plate::new(PLATE).unwrap()
    }

    fn unpaid_record() -> VehicleRecord {
        VehicleRecord::new(plate(), LedgerTimestamp::from_datetime(entry_time()))
    }

    struct Gate {
        link: MockLink,
        device: MockLinkHandle,
        store: MemoryLedgerStore,
        ledger: Ledger<MemoryLedgerStore>,
        clock: ManualClock,
        config: SettlementConfig,
    }

    impl Gate {
        /// Gate two hours after the vehicle entered.
        async fn with_records(records: Vec<VehicleRecord>) -> Self {
            let (link, device) = MockLink::new();
            let store = MemoryLedgerStore::with_records(records);
            let ledger = Ledger::open(store.clone()).await.unwrap();

            Self {
                link,
                device,
                store,
                ledger,
                clock: ManualClock::new(entry_time() + TimeDelta::hours(2)),
                config: SettlementConfig::default(),
            }
        }

        async fn settle(&mut self) -> (Result<SettlementOutcome, SessionError>, Vec<SettlementState>) {
            let mut session = SettlementSession::new(
                plate(),
                &mut self.link,
                &mut self.ledger,
                &self.clock,
                &self.config,
            );
            let result = session.run().await;
            assert_eq!(session.state(), Idle);
            let path = session.history().iter().map(|t| t.to).collect();
            (result, path)
        }

        fn stored(&self) -> VehicleRecord {
            self.store.records()[0].clone()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_payment_marks_record_paid() {
        let mut gate = Gate::with_records(vec![unpaid_record()]).await;
        gate.device
            .send_lines(["CURRENT_BALANCE:1500", "PAYMENT_SUCCESS:PAID=400,BALANCE=1100"])
            .await
            .unwrap();

        let (result, path) = gate.settle().await;

        assert_eq!(
            result.unwrap(),
            SettlementOutcome::Paid {
                due: 400,
                paid: 400,
                balance: 1100,
                billed_hours: 2
            }
        );
        assert_eq!(
            path,
            vec![AwaitingBalance, LookupRecord, ComputeDue, AwaitingConfirmation, Idle]
        );
        assert_eq!(gate.device.sent_lines(), vec!["DUE:400", "STATUS:PAID"]);

        let stored = gate.stored();
        assert_eq!(stored.payment_status, PaymentStatus::Paid);
        assert_eq!(stored.due_amount, Some(400));
        assert_eq!(stored.exit_time.unwrap().format(), "2024-01-01 12:00:00");
        assert_eq!(gate.store.write_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_session_on_paid_record_does_not_charge() {
        let mut gate = Gate::with_records(vec![unpaid_record()]).await;
        gate.device
            .send_lines(["CURRENT_BALANCE:1500", "PAYMENT_SUCCESS:PAID=400,BALANCE=1100"])
            .await
            .unwrap();
        gate.settle().await.0.unwrap();
        gate.device.clear_sent();
        let writes = gate.store.write_count();

        gate.clock.advance(TimeDelta::hours(5));
        gate.device.send_line("CURRENT_BALANCE:1100").await.unwrap();
        let (result, path) = gate.settle().await;

        assert_eq!(result.unwrap(), SettlementOutcome::AlreadyPaid);
        assert_eq!(path, vec![AwaitingBalance, LookupRecord, Idle]);
        assert_eq!(gate.device.sent_lines(), vec!["STATUS:PAID"]);
        assert_eq!(gate.store.write_count(), writes);
        assert_eq!(gate.stored().due_amount, Some(400));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_plate_is_not_found() {
        let other = VehicleRecord::new(
            Plate::new("RAC456B").unwrap(),
            LedgerTimestamp::from_datetime(entry_time()),
        );
        let mut gate = Gate::with_records(vec![other]).await;
        gate.device.send_line("CURRENT_BALANCE:1500").await.unwrap();

        let (result, path) = gate.settle().await;

        assert_eq!(result.unwrap(), SettlementOutcome::NotFound);
        assert_eq!(path, vec![AwaitingBalance, LookupRecord, Idle]);
        assert_eq!(gate.device.sent_lines(), vec!["STATUS:NOT_FOUND"]);
        assert_eq!(gate.store.write_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_plate_lookup_is_case_sensitive() {
        let lower = VehicleRecord::new(
            Plate::new("rab123a").unwrap(),
            LedgerTimestamp::from_datetime(entry_time()),
        );
        let mut gate = Gate::with_records(vec![lower]).await;
        gate.device.send_line("CURRENT_BALANCE:1500").await.unwrap();

        let (result, _) = gate.settle().await;

        assert_eq!(result.unwrap(), SettlementOutcome::NotFound);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_balance_leaves_ledger_untouched() {
        let mut gate = Gate::with_records(vec![unpaid_record()]).await;
        let started = Instant::now();

        let (result, path) = gate.settle().await;

        assert_eq!(result.unwrap(), SettlementOutcome::NoBalance);
        assert!(started.elapsed() >= gate.config.balance_timeout);
        assert_eq!(path, vec![AwaitingBalance, Idle]);
        assert_eq!(gate.device.sent_lines(), vec!["STATUS:NO_BALANCE"]);
        assert_eq!(gate.store.write_count(), 0);
        assert_eq!(gate.stored(), unpaid_record());
    }

    #[tokio::test(start_paused = true)]
    async fn test_chatter_before_balance_is_skipped() {
        let mut gate = Gate::with_records(vec![unpaid_record()]).await;
        gate.device
            .send_lines([
                "PLATE:RAB123A",
                "noise",
                "CURRENT_BALANCE: 1500 ",
                "INSUFFICIENT_FUNDS: BALANCE = 100 , REQUIRED = 400",
            ])
            .await
            .unwrap();

        let (result, _) = gate.settle().await;

        assert_eq!(
            result.unwrap(),
            SettlementOutcome::Insufficient {
                due: 400,
                balance: 100,
                required: 400
            }
        );
    }

    #[rstest]
    #[case("CURRENT_BALANCE:lots")]
    #[case("CURRENT_BALANCE:-5")]
    #[case("CURRENT_BALANCE:")]
    #[tokio::test(start_paused = true)]
    async fn test_malformed_balance_fails_without_touching_ledger(#[case] line: &str) {
        let mut gate = Gate::with_records(vec![unpaid_record()]).await;
        gate.device.send_line(line).await.unwrap();

        let (result, path) = gate.settle().await;

        assert_eq!(
            result.unwrap(),
            SettlementOutcome::Failed {
                reason: FailureReason::MalformedBalance
            }
        );
        assert_eq!(path, vec![AwaitingBalance, Idle]);
        assert_eq!(gate.device.sent_lines(), vec!["STATUS:FAILED"]);
        assert_eq!(gate.store.write_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_confirmation_timeout_keeps_fee_and_unpaid_status() {
        let mut gate = Gate::with_records(vec![unpaid_record()]).await;
        gate.device.send_line("CURRENT_BALANCE:1500").await.unwrap();

        let (result, path) = gate.settle().await;

        assert_eq!(
            result.unwrap(),
            SettlementOutcome::Failed {
                reason: FailureReason::ConfirmationTimeout
            }
        );
        assert_eq!(path.last(), Some(&Idle));
        assert_eq!(gate.device.sent_lines(), vec!["DUE:400", "STATUS:FAILED"]);

        let stored = gate.stored();
        assert_eq!(stored.payment_status, PaymentStatus::Unpaid);
        assert_eq!(stored.due_amount, Some(400));
        assert!(stored.has_exited());
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_after_timeout_recomputes_fee() {
        let mut gate = Gate::with_records(vec![unpaid_record()]).await;
        gate.device.send_line("CURRENT_BALANCE:1500").await.unwrap();
        gate.settle().await.0.unwrap();
        gate.device.clear_sent();

        gate.clock.advance(TimeDelta::minutes(30));
        gate.device
            .send_lines(["CURRENT_BALANCE:1500", "PAYMENT_SUCCESS:PAID=600,BALANCE=900"])
            .await
            .unwrap();
        let (result, _) = gate.settle().await;

        assert!(matches!(
            result.unwrap(),
            SettlementOutcome::Paid {
                due: 600,
                billed_hours: 3,
                ..
            }
        ));
        assert_eq!(gate.device.sent_lines(), vec!["DUE:600", "STATUS:PAID"]);
        assert_eq!(gate.stored().exit_time.unwrap().format(), "2024-01-01 12:30:00");
    }

    #[rstest]
    #[case("PAYMENT_SUCCESS:PAID=400")]
    #[case("PAYMENT_SUCCESS:PAID=abc,BALANCE=1100")]
    #[case("INSUFFICIENT_FUNDS:BALANCE=100")]
    #[tokio::test(start_paused = true)]
    async fn test_malformed_confirmation_fails(#[case] line: &str) {
        let mut gate = Gate::with_records(vec![unpaid_record()]).await;
        gate.device
            .send_lines(["CURRENT_BALANCE:1500", line])
            .await
            .unwrap();

        let (result, _) = gate.settle().await;

        assert_eq!(
            result.unwrap(),
            SettlementOutcome::Failed {
                reason: FailureReason::MalformedConfirmation
            }
        );
        assert_eq!(gate.device.sent_lines(), vec!["DUE:400", "STATUS:FAILED"]);
        assert_eq!(gate.stored().payment_status, PaymentStatus::Unpaid);
    }

    #[tokio::test(start_paused = true)]
    async fn test_insufficient_funds_leaves_record_unpaid() {
        let mut gate = Gate::with_records(vec![unpaid_record()]).await;
        gate.device
            .send_lines(["CURRENT_BALANCE:100", "INSUFFICIENT_FUNDS:BALANCE=100,REQUIRED=400"])
            .await
            .unwrap();

        let (result, _) = gate.settle().await;

        assert!(matches!(
            result.unwrap(),
            SettlementOutcome::Insufficient { required: 400, .. }
        ));
        assert_eq!(gate.device.sent_lines(), vec!["DUE:400", "STATUS:INSUFFICIENT"]);

        let stored = gate.stored();
        assert_eq!(stored.payment_status, PaymentStatus::Unpaid);
        assert_eq!(stored.due_amount, Some(400));
        assert_eq!(gate.store.write_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mismatched_paid_amount_is_still_recorded() {
        let mut gate = Gate::with_records(vec![unpaid_record()]).await;
        gate.device
            .send_lines(["CURRENT_BALANCE:1500", "PAYMENT_SUCCESS:PAID=350,BALANCE=1150"])
            .await
            .unwrap();

        let (result, _) = gate.settle().await;

        assert!(matches!(
            result.unwrap(),
            SettlementOutcome::Paid {
                due: 400,
                paid: 350,
                ..
            }
        ));
        assert_eq!(gate.stored().payment_status, PaymentStatus::Paid);
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_matching_record_is_settled() {
        let later = VehicleRecord::new(
            plate(),
            LedgerTimestamp::from_datetime(entry_time() + TimeDelta::hours(1)),
        );
        let mut gate = Gate::with_records(vec![unpaid_record(), later.clone()]).await;
        gate.device
            .send_lines(["CURRENT_BALANCE:1500", "PAYMENT_SUCCESS:PAID=400,BALANCE=1100"])
            .await
            .unwrap();

        gate.settle().await.0.unwrap();

        let records = gate.store.records();
        assert!(records[0].is_paid());
        assert_eq!(records[1], later);
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_appended_after_open_is_found() {
        let mut gate = Gate::with_records(Vec::new()).await;
        gate.store.push(unpaid_record());
        gate.device
            .send_lines(["CURRENT_BALANCE:1500", "PAYMENT_SUCCESS:PAID=400,BALANCE=1100"])
            .await
            .unwrap();

        let (result, _) = gate.settle().await;

        assert!(matches!(result.unwrap(), SettlementOutcome::Paid { .. }));
        assert!(gate.ledger.records()[0].is_paid());
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_in_the_future_fails_without_writing() {
        let mut gate = Gate::with_records(vec![unpaid_record()]).await;
        gate.clock.set(entry_time() - TimeDelta::minutes(1));
        gate.device.send_line("CURRENT_BALANCE:1500").await.unwrap();

        let (result, path) = gate.settle().await;

        assert!(matches!(
            result.unwrap(),
            SettlementOutcome::Failed {
                reason: FailureReason::Fee(_)
            }
        ));
        assert_eq!(path, vec![AwaitingBalance, LookupRecord, ComputeDue, Idle]);
        assert_eq!(gate.device.sent_lines(), vec!["STATUS:FAILED"]);
        assert_eq!(gate.store.write_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_fee_write_reports_failure_and_never_sends_due() {
        let mut gate = Gate::with_records(vec![unpaid_record()]).await;
        gate.store.set_fail_writes(true);
        gate.device.send_line("CURRENT_BALANCE:1500").await.unwrap();

        let (result, path) = gate.settle().await;

        assert!(matches!(result, Err(SessionError::Persistence(_))));
        assert_eq!(path, vec![AwaitingBalance, LookupRecord, ComputeDue, Idle]);
        assert_eq!(gate.device.sent_lines(), vec!["STATUS:FAILED"]);
        assert_eq!(gate.ledger.records()[0], unpaid_record());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_payment_write_never_reports_paid() {
        let mut gate = Gate::with_records(vec![unpaid_record()]).await;
        gate.device.send_line("CURRENT_BALANCE:1500").await.unwrap();

        let device = gate.device.clone();
        let store = gate.store.clone();
        let script = tokio::spawn(async move {
            assert_eq!(device.next_host_line().await.as_deref(), Some("DUE:400"));
            store.set_fail_writes(true);
            device
                .send_line("PAYMENT_SUCCESS:PAID=400,BALANCE=1100")
                .await
                .unwrap();
        });

        let (result, _) = gate.settle().await;
        script.await.unwrap();

        assert!(matches!(result, Err(SessionError::Persistence(_))));
        assert_eq!(gate.device.sent_lines(), vec!["DUE:400", "STATUS:FAILED"]);

        let in_memory = &gate.ledger.records()[0];
        assert_eq!(in_memory.payment_status, PaymentStatus::Unpaid);
        assert_eq!(in_memory.due_amount, Some(400));
        assert_eq!(gate.stored().payment_status, PaymentStatus::Unpaid);
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_link_is_an_error() {
        let mut gate = Gate::with_records(vec![unpaid_record()]).await;
        let (link, device) = MockLink::new();
        gate.link = link;
        drop(device);

        let (result, _) = gate.settle().await;

        assert!(matches!(result, Err(SessionError::Link(LinkError::Closed))));
        assert_eq!(gate.store.write_count(), 0);
    }
}
