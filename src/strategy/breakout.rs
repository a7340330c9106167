use rust_decimal::Decimal;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::{HaltReason, Phase, StepOutcome};
use crate::broker::{BrokerGateway, GatewayError};
use crate::config::{AppConfig, ConfigError};
use crate::instrument::Instrument;
use crate::order::{OrderId, OrderSpec, OrderStatus, ProductType};

#[derive(Clone, Debug)]
pub struct BreakoutParams {
    pub instrument: Instrument,
    pub hold: Duration,
    pub entry_offset: Decimal,
    pub limit_buffer: Decimal,
    pub quantity: u32,
    pub product: ProductType,
    pub max_unknown_polls: u32,
}

impl BreakoutParams {
    pub fn from_config(config: &AppConfig, instrument: Instrument) -> Self {
        Self {
            instrument,
            hold: Duration::from_secs(config.trade.wait_secs),
            entry_offset: config.trade.entry_offset,
            limit_buffer: config.trade.limit_buffer,
            quantity: config.order.quantity,
            product: config.order.product,
            max_unknown_polls: config.trade.max_unknown_polls,
        }
    }
}

/// Drives one instrument through repeated bracket cycles : stop-entry above
/// the session high, hold for a fixed duration once filled, flatten at
/// market, start over. One `step()` advances by at most one transition and
/// never sleeps, the caller's tick cadence is the poll interval.
#[derive(Clone, Debug)]
pub struct BreakoutStrategy<G> {
    gateway: G,
    params: BreakoutParams,
    phase: Phase,
    cycles_completed: u32,
}

impl<G: BrokerGateway> BreakoutStrategy<G> {
    pub fn new(params: BreakoutParams, gateway: G) -> Result<Self, ConfigError> {
        if params.instrument.token.is_empty() {
            return Err(ConfigError::EmptyInstrumentToken);
        }
        if params.quantity < 1 {
            return Err(ConfigError::InvalidQuantity);
        }
        if params.entry_offset <= Decimal::ZERO {
            return Err(ConfigError::InvalidEntryOffset);
        }
        if params.limit_buffer < Decimal::ZERO {
            return Err(ConfigError::InvalidLimitBuffer);
        }
        if params.max_unknown_polls < 1 {
            return Err(ConfigError::InvalidUnknownPollCap);
        }

        Ok(Self {
            gateway,
            params,
            phase: Phase::EnteringOrder,
            cycles_completed: 0,
        })
    }

    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    pub fn instrument(&self) -> &Instrument {
        &self.params.instrument
    }

    pub fn cycles_completed(&self) -> u32 {
        self.cycles_completed
    }

    pub fn pending_order_id(&self) -> Option<&OrderId> {
        match &self.phase {
            Phase::AwaitingFill { order_id, .. } | Phase::WaitingToExit { order_id, .. } => {
                Some(order_id)
            }
            _ => None,
        }
    }

    pub fn reference_high(&self) -> Option<Decimal> {
        match &self.phase {
            Phase::AwaitingFill { reference_high, .. }
            | Phase::WaitingToExit { reference_high, .. } => Some(*reference_high),
            _ => None,
        }
    }

    pub fn exit_deadline(&self) -> Option<u64> {
        match &self.phase {
            Phase::WaitingToExit { exit_deadline, .. } => Some(*exit_deadline),
            _ => None,
        }
    }

    pub fn halt_reason(&self) -> Option<&HaltReason> {
        match &self.phase {
            Phase::Failed { reason } => Some(reason),
            _ => None,
        }
    }

    pub async fn step(&mut self, now: u64) -> StepOutcome {
        match self.phase.clone() {
            Phase::EnteringOrder => self.enter_pending_order().await,
            Phase::AwaitingFill {
                order_id,
                reference_high,
                unknown_polls,
            } => {
                self.poll_entry_fill(now, order_id, reference_high, unknown_polls)
                    .await
            }
            Phase::WaitingToExit {
                order_id,
                exit_deadline,
                ..
            } => self.exit_when_due(now, order_id, exit_deadline).await,
            Phase::Failed { .. } | Phase::Cancelled => StepOutcome::Halted,
        }
    }

    /// Force a terminal stop. Best effort : a resting entry order is
    /// cancelled broker-side, an already filled one leaves the position
    /// open for the operator.
    pub async fn cancel(&mut self) {
        match &self.phase {
            Phase::AwaitingFill { order_id, .. } => {
                if let Err(err) = self.gateway.cancel_order(order_id).await {
                    warn!("Could not cancel entry {} : {}", order_id, err);
                }
            }
            Phase::WaitingToExit { .. } => {
                warn!(
                    "Cancelling {} with an open position",
                    self.params.instrument
                );
            }
            _ => {}
        }
        if !self.phase.is_terminal() {
            info!("Runner for {} cancelled", self.params.instrument);
            self.phase = Phase::Cancelled;
        }
    }

    async fn enter_pending_order(&mut self) -> StepOutcome {
        let high = match self.gateway.reference_price(&self.params.instrument).await {
            Ok(Some(high)) => high,
            Ok(None) => {
                debug!("No reference price for {} yet", self.params.instrument);
                return StepOutcome::Idle;
            }
            Err(err) => {
                warn!(
                    "Reference price fetch failed for {} : {}",
                    self.params.instrument, err
                );
                return StepOutcome::Idle;
            }
        };

        let trigger = high + self.params.entry_offset;
        let price = trigger + self.params.limit_buffer;
        let spec = OrderSpec::stop_entry(
            &self.params.instrument,
            self.params.quantity,
            self.params.product,
            trigger,
            price,
        );

        match self.gateway.place_order(&spec).await {
            Ok(order_id) => {
                info!("Entry {} accepted as {} (high {})", spec, order_id, high);
                self.phase = Phase::AwaitingFill {
                    order_id: order_id.clone(),
                    reference_high: high,
                    unknown_polls: 0,
                };
                StepOutcome::EntryPlaced { order_id }
            }
            Err(GatewayError::Rejected(reason)) => {
                warn!("Entry rejected for {} : {}", self.params.instrument, reason);
                StepOutcome::Idle
            }
            Err(err) => {
                warn!(
                    "Entry placement failed for {} : {}",
                    self.params.instrument, err
                );
                StepOutcome::Idle
            }
        }
    }

    async fn poll_entry_fill(
        &mut self,
        now: u64,
        order_id: OrderId,
        reference_high: Decimal,
        unknown_polls: u32,
    ) -> StepOutcome {
        let status = match self.gateway.order_status(&order_id).await {
            Ok(status) => status,
            Err(err) => {
                warn!("Status poll failed for {} : {}", order_id, err);
                return self.count_unknown_poll(order_id, reference_high, unknown_polls);
            }
        };

        match status {
            OrderStatus::Complete => {
                let exit_deadline = now + self.params.hold.as_millis() as u64;
                info!("Entry {} filled, exit due at {}", order_id, exit_deadline);
                self.phase = Phase::WaitingToExit {
                    order_id,
                    reference_high,
                    exit_deadline,
                };
                StepOutcome::FillConfirmed { exit_deadline }
            }
            OrderStatus::Rejected | OrderStatus::Cancelled => {
                self.halt(HaltReason::EntryOrderFailed { status })
            }
            OrderStatus::TriggerPending | OrderStatus::Open => {
                // authoritative answer, the broker knows the order
                self.phase = Phase::AwaitingFill {
                    order_id,
                    reference_high,
                    unknown_polls: 0,
                };
                StepOutcome::Idle
            }
            OrderStatus::Unknown => self.count_unknown_poll(order_id, reference_high, unknown_polls),
        }
    }

    // the order id is missing from the broker's book : tolerated as
    // propagation delay up to the configured cap
    fn count_unknown_poll(
        &mut self,
        order_id: OrderId,
        reference_high: Decimal,
        unknown_polls: u32,
    ) -> StepOutcome {
        let unknown_polls = unknown_polls + 1;
        if unknown_polls > self.params.max_unknown_polls {
            return self.halt(HaltReason::UnknownStatusExhausted {
                polls: unknown_polls,
            });
        }
        debug!(
            "Order {} not in the book yet ({}/{})",
            order_id, unknown_polls, self.params.max_unknown_polls
        );
        self.phase = Phase::AwaitingFill {
            order_id,
            reference_high,
            unknown_polls,
        };
        StepOutcome::Idle
    }

    async fn exit_when_due(&mut self, now: u64, entry_id: OrderId, exit_deadline: u64) -> StepOutcome {
        if now < exit_deadline {
            return StepOutcome::Idle;
        }

        let spec = OrderSpec::market_exit(
            &self.params.instrument,
            self.params.quantity,
            self.params.product,
        );
        match self.gateway.place_order(&spec).await {
            Ok(exit_id) => {
                self.cycles_completed += 1;
                info!(
                    "Exit {} accepted as {} : cycle {} done (entry was {})",
                    spec, exit_id, self.cycles_completed, entry_id
                );
                self.phase = Phase::EnteringOrder;
                StepOutcome::CycleComplete
            }
            Err(GatewayError::Rejected(reason)) => self.halt(HaltReason::ExitRejected { reason }),
            Err(GatewayError::Transport(reason)) => {
                self.halt(HaltReason::ExitUnreachable { reason })
            }
        }
    }

    fn halt(&mut self, reason: HaltReason) -> StepOutcome {
        error!("Runner for {} halted : {}", self.params.instrument, reason);
        self.phase = Phase::Failed { reason };
        StepOutcome::Halted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::GatewayResult;
    use rust_decimal_macros::dec;
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::rc::Rc;

    #[derive(Default)]
    struct StubInner {
        reference_script: VecDeque<GatewayResult<Option<Decimal>>>,
        place_script: VecDeque<GatewayResult<OrderId>>,
        status_script: VecDeque<GatewayResult<OrderStatus>>,
        placed: Vec<OrderSpec>,
        cancelled: Vec<OrderId>,
        next_id: u32,
    }

    // scriptable gateway : queued results are consumed first, then the
    // always-succeeding defaults kick in
    #[derive(Clone, Default)]
    struct StubGateway {
        inner: Rc<RefCell<StubInner>>,
    }

    impl StubGateway {
        fn new() -> Self {
            Self::default()
        }

        fn queue_reference(&self, result: GatewayResult<Option<Decimal>>) {
            self.inner.borrow_mut().reference_script.push_back(result);
        }

        fn queue_place(&self, result: GatewayResult<OrderId>) {
            self.inner.borrow_mut().place_script.push_back(result);
        }

        fn queue_status(&self, result: GatewayResult<OrderStatus>) {
            self.inner.borrow_mut().status_script.push_back(result);
        }

        fn placed(&self) -> Vec<OrderSpec> {
            self.inner.borrow().placed.clone()
        }

        fn cancelled(&self) -> Vec<OrderId> {
            self.inner.borrow().cancelled.clone()
        }
    }

    impl BrokerGateway for StubGateway {
        async fn reference_price(&self, _instrument: &Instrument) -> GatewayResult<Option<Decimal>> {
            let mut inner = self.inner.borrow_mut();
            inner
                .reference_script
                .pop_front()
                .unwrap_or(Ok(Some(dec!(100.0))))
        }

        async fn place_order(&self, spec: &OrderSpec) -> GatewayResult<OrderId> {
            let mut inner = self.inner.borrow_mut();
            let result = match inner.place_script.pop_front() {
                Some(result) => result,
                None => {
                    inner.next_id += 1;
                    Ok(OrderId::from(format!("order-{}", inner.next_id).as_str()))
                }
            };
            if result.is_ok() {
                inner.placed.push(spec.clone());
            }
            result
        }

        async fn order_status(&self, _id: &OrderId) -> GatewayResult<OrderStatus> {
            let mut inner = self.inner.borrow_mut();
            inner
                .status_script
                .pop_front()
                .unwrap_or(Ok(OrderStatus::Complete))
        }

        async fn cancel_order(&self, id: &OrderId) -> GatewayResult<()> {
            self.inner.borrow_mut().cancelled.push(id.clone());
            Ok(())
        }
    }

    fn params(wait_secs: u64) -> BreakoutParams {
        BreakoutParams {
            instrument: Instrument {
                exchange: "NSE".to_string(),
                token: "X".to_string(),
                symbol: "NIFTY".to_string(),
            },
            hold: Duration::from_secs(wait_secs),
            entry_offset: dec!(0.5),
            limit_buffer: dec!(0.10),
            quantity: 50,
            product: ProductType::Intraday,
            max_unknown_polls: 20,
        }
    }

    fn runner(wait_secs: u64, gateway: &StubGateway) -> BreakoutStrategy<StubGateway> {
        BreakoutStrategy::new(params(wait_secs), gateway.clone()).unwrap()
    }

    #[test]
    fn construction_starts_clean() {
        let gateway = StubGateway::new();
        let runner = runner(5, &gateway);
        assert_eq!(*runner.phase(), Phase::EnteringOrder);
        assert_eq!(runner.pending_order_id(), None);
        assert_eq!(runner.reference_high(), None);
        assert_eq!(runner.exit_deadline(), None);
        assert_eq!(runner.cycles_completed(), 0);
    }

    #[test]
    fn construction_rejects_bad_params() {
        let gateway = StubGateway::new();

        let mut bad = params(5);
        bad.quantity = 0;
        assert!(matches!(
            BreakoutStrategy::new(bad, gateway.clone()),
            Err(ConfigError::InvalidQuantity)
        ));

        let mut bad = params(5);
        bad.instrument.token = String::new();
        assert!(matches!(
            BreakoutStrategy::new(bad, gateway.clone()),
            Err(ConfigError::EmptyInstrumentToken)
        ));

        let mut bad = params(5);
        bad.entry_offset = dec!(0);
        assert!(matches!(
            BreakoutStrategy::new(bad, gateway.clone()),
            Err(ConfigError::InvalidEntryOffset)
        ));

        let mut bad = params(5);
        bad.max_unknown_polls = 0;
        assert!(matches!(
            BreakoutStrategy::new(bad, gateway),
            Err(ConfigError::InvalidUnknownPollCap)
        ));
    }

    #[tokio::test]
    async fn full_cycle_places_entry_confirms_fill_and_flattens() {
        let gateway = StubGateway::new();
        let mut runner = runner(5, &gateway);
        gateway.queue_status(Ok(OrderStatus::Complete));

        let outcome = runner.step(1_000).await;
        assert!(matches!(outcome, StepOutcome::EntryPlaced { .. }));
        let entry = &gateway.placed()[0];
        assert_eq!(entry.trigger_price, Some(dec!(100.5)));
        assert_eq!(entry.price, Some(dec!(100.6)));
        assert_eq!(runner.reference_high(), Some(dec!(100.0)));
        assert!(runner.pending_order_id().is_some());

        let outcome = runner.step(2_000).await;
        assert_eq!(
            outcome,
            StepOutcome::FillConfirmed {
                exit_deadline: 7_000
            }
        );
        assert_eq!(runner.exit_deadline(), Some(7_000));

        // before the deadline nothing moves, however often we ask
        let before = runner.phase().clone();
        assert_eq!(runner.step(2_500).await, StepOutcome::Idle);
        assert_eq!(runner.step(6_999).await, StepOutcome::Idle);
        assert_eq!(*runner.phase(), before);
        assert_eq!(gateway.placed().len(), 1);

        assert_eq!(runner.step(7_000).await, StepOutcome::CycleComplete);
        assert_eq!(*runner.phase(), Phase::EnteringOrder);
        assert_eq!(runner.pending_order_id(), None);
        assert_eq!(runner.exit_deadline(), None);
        assert_eq!(runner.cycles_completed(), 1);

        let exit = &gateway.placed()[1];
        assert_eq!(exit.kind, crate::order::OrderKind::Market);
        assert_eq!(exit.side, crate::order::OrderSide::Sell);
        assert_eq!(exit.price, None);
    }

    #[tokio::test]
    async fn zero_hold_cycles_in_exactly_three_steps() {
        let gateway = StubGateway::new();
        let mut runner = runner(0, &gateway);

        assert!(matches!(
            runner.step(10).await,
            StepOutcome::EntryPlaced { .. }
        ));
        assert!(matches!(
            runner.step(11).await,
            StepOutcome::FillConfirmed { .. }
        ));
        assert_eq!(runner.step(12).await, StepOutcome::CycleComplete);
        assert_eq!(*runner.phase(), Phase::EnteringOrder);
    }

    #[tokio::test]
    async fn missing_reference_price_is_retried() {
        let gateway = StubGateway::new();
        let mut runner = runner(5, &gateway);
        gateway.queue_reference(Ok(None));
        gateway.queue_reference(Err(GatewayError::Transport("timeout".to_string())));

        assert_eq!(runner.step(1).await, StepOutcome::Idle);
        assert_eq!(runner.step(2).await, StepOutcome::Idle);
        assert_eq!(*runner.phase(), Phase::EnteringOrder);
        assert!(gateway.placed().is_empty());

        // once data is back the entry goes out
        assert!(matches!(
            runner.step(3).await,
            StepOutcome::EntryPlaced { .. }
        ));
    }

    #[tokio::test]
    async fn rejected_entry_is_retried_next_step() {
        let gateway = StubGateway::new();
        let mut runner = runner(5, &gateway);
        gateway.queue_place(Err(GatewayError::Rejected("margin".to_string())));

        assert_eq!(runner.step(1).await, StepOutcome::Idle);
        assert_eq!(*runner.phase(), Phase::EnteringOrder);
        assert_eq!(runner.reference_high(), None);
        assert!(gateway.placed().is_empty());

        assert!(matches!(
            runner.step(2).await,
            StepOutcome::EntryPlaced { .. }
        ));
    }

    #[tokio::test]
    async fn entry_dying_in_the_book_halts() {
        let gateway = StubGateway::new();
        let mut runner = runner(5, &gateway);
        gateway.queue_status(Ok(OrderStatus::Rejected));

        runner.step(1).await;
        assert_eq!(runner.step(2).await, StepOutcome::Halted);
        assert_eq!(
            runner.halt_reason(),
            Some(&HaltReason::EntryOrderFailed {
                status: OrderStatus::Rejected
            })
        );
    }

    #[tokio::test]
    async fn unknown_polls_beyond_cap_halt() {
        let gateway = StubGateway::new();
        let mut base = params(5);
        base.max_unknown_polls = 3;
        let mut runner = BreakoutStrategy::new(base, gateway.clone()).unwrap();
        for _ in 0..4 {
            gateway.queue_status(Ok(OrderStatus::Unknown));
        }

        runner.step(1).await;
        assert_eq!(runner.step(2).await, StepOutcome::Idle);
        assert_eq!(runner.step(3).await, StepOutcome::Idle);
        assert_eq!(runner.step(4).await, StepOutcome::Idle);
        assert_eq!(runner.step(5).await, StepOutcome::Halted);
        assert_eq!(
            runner.halt_reason(),
            Some(&HaltReason::UnknownStatusExhausted { polls: 4 })
        );
    }

    #[tokio::test]
    async fn authoritative_status_resets_the_unknown_count() {
        let gateway = StubGateway::new();
        let mut base = params(5);
        base.max_unknown_polls = 2;
        let mut runner = BreakoutStrategy::new(base, gateway.clone()).unwrap();
        gateway.queue_status(Ok(OrderStatus::Unknown));
        gateway.queue_status(Ok(OrderStatus::Unknown));
        gateway.queue_status(Ok(OrderStatus::TriggerPending));
        gateway.queue_status(Ok(OrderStatus::Unknown));
        gateway.queue_status(Ok(OrderStatus::Unknown));
        gateway.queue_status(Ok(OrderStatus::Unknown));

        runner.step(1).await;
        assert_eq!(runner.step(2).await, StepOutcome::Idle);
        assert_eq!(runner.step(3).await, StepOutcome::Idle);
        // two unknowns then the broker answers : counter starts over
        assert_eq!(runner.step(4).await, StepOutcome::Idle);
        assert_eq!(runner.step(5).await, StepOutcome::Idle);
        assert_eq!(runner.step(6).await, StepOutcome::Idle);
        assert_eq!(runner.step(7).await, StepOutcome::Halted);
    }

    #[tokio::test]
    async fn transport_errors_while_polling_count_against_the_cap() {
        let gateway = StubGateway::new();
        let mut base = params(5);
        base.max_unknown_polls = 1;
        let mut runner = BreakoutStrategy::new(base, gateway.clone()).unwrap();
        gateway.queue_status(Err(GatewayError::Transport("down".to_string())));
        gateway.queue_status(Err(GatewayError::Transport("down".to_string())));

        runner.step(1).await;
        assert_eq!(runner.step(2).await, StepOutcome::Idle);
        assert_eq!(runner.step(3).await, StepOutcome::Halted);
    }

    #[tokio::test]
    async fn rejected_exit_halts_and_places_nothing_more() {
        let gateway = StubGateway::new();
        let mut runner = runner(0, &gateway);

        runner.step(1).await;
        runner.step(2).await;
        gateway.queue_place(Err(GatewayError::Rejected("market closed".to_string())));
        assert_eq!(runner.step(3).await, StepOutcome::Halted);
        assert_eq!(
            runner.halt_reason(),
            Some(&HaltReason::ExitRejected {
                reason: "market closed".to_string()
            })
        );

        let placed_so_far = gateway.placed().len();
        assert_eq!(runner.step(4).await, StepOutcome::Halted);
        assert_eq!(runner.step(5).await, StepOutcome::Halted);
        assert_eq!(gateway.placed().len(), placed_so_far);
    }

    #[tokio::test]
    async fn exit_transport_error_is_terminal_too() {
        let gateway = StubGateway::new();
        let mut runner = runner(0, &gateway);

        runner.step(1).await;
        runner.step(2).await;
        gateway.queue_place(Err(GatewayError::Transport("socket".to_string())));
        assert_eq!(runner.step(3).await, StepOutcome::Halted);
        assert!(matches!(
            runner.halt_reason(),
            Some(HaltReason::ExitUnreachable { .. })
        ));
    }

    #[tokio::test]
    async fn cancel_while_awaiting_fill_cancels_broker_side() {
        let gateway = StubGateway::new();
        let mut runner = runner(5, &gateway);
        gateway.queue_status(Ok(OrderStatus::TriggerPending));

        runner.step(1).await;
        let entry_id = runner.pending_order_id().cloned().unwrap();

        runner.cancel().await;
        assert_eq!(*runner.phase(), Phase::Cancelled);
        assert_eq!(gateway.cancelled(), vec![entry_id]);

        let placed_so_far = gateway.placed().len();
        assert_eq!(runner.step(2).await, StepOutcome::Halted);
        assert_eq!(gateway.placed().len(), placed_so_far);
    }

    #[tokio::test]
    async fn cancel_before_any_order_is_local_only() {
        let gateway = StubGateway::new();
        let mut runner = runner(5, &gateway);

        runner.cancel().await;
        assert_eq!(*runner.phase(), Phase::Cancelled);
        assert!(gateway.cancelled().is_empty());
        assert!(gateway.placed().is_empty());
    }
}
