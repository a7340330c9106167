use colored::Colorize;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{BrokerGateway, GatewayError, GatewayResult};
use crate::feed::Tick;
use crate::instrument::Instrument;
use crate::order::{OrderId, OrderKind, OrderSide, OrderSpec, OrderStatus};

#[derive(Clone, Debug)]
pub struct PaperOrder {
    pub id: OrderId,
    pub spec: OrderSpec,
    pub status: OrderStatus,
    pub placed_at: u64,
    pub fill_price: Option<Decimal>,
    pub fill_time: Option<u64>,
    settle_polls_left: u32,
}

#[derive(Debug, Default, Clone)]
struct MarketState {
    ltp: Option<Decimal>,
    session_high: Option<Decimal>,
    position: i64,
}

#[derive(Debug, Default)]
struct PaperBook {
    orders: Vec<PaperOrder>,
    markets: HashMap<String, MarketState>,
    current_time: u64,
}

/// In-memory broker. Stop orders rest until a tick crosses their trigger,
/// market orders fill at the last traded price, fills are always full.
#[derive(Clone, Debug)]
pub struct PaperBroker {
    book: Arc<RwLock<PaperBook>>,
    settle_polls: u32,
}

impl PaperBroker {
    pub fn new() -> Self {
        Self {
            book: Arc::new(RwLock::new(PaperBook::default())),
            settle_polls: 0,
        }
    }

    // emulate broker-side propagation delay : the first `polls` status
    // lookups after acceptance answer Unknown
    pub fn with_settle_polls(mut self, polls: u32) -> Self {
        self.settle_polls = polls;
        self
    }

    pub async fn apply_tick(&self, tick: &Tick) {
        let mut book = self.book.write().await;
        book.current_time = tick.time;

        let market = book.markets.entry(tick.token.clone()).or_default();
        market.ltp = Some(tick.ltp);
        market.session_high = Some(match market.session_high {
            Some(high) if high >= tick.ltp => high,
            _ => tick.ltp,
        });

        self.match_resting_orders(&mut book, &tick.token, tick.ltp, tick.time);
    }

    fn match_resting_orders(&self, book: &mut PaperBook, token: &str, ltp: Decimal, time: u64) {
        let mut fills: Vec<(OrderSide, i64)> = Vec::new();

        for order in book
            .orders
            .iter_mut()
            .filter(|order| order.spec.token == token && order.status.is_working())
        {
            let fill_price = match (order.spec.kind, order.spec.side) {
                (OrderKind::StopLimit, OrderSide::Buy) => order
                    .spec
                    .trigger_price
                    .filter(|trigger| ltp >= *trigger),
                (OrderKind::StopLimit, OrderSide::Sell) => order
                    .spec
                    .trigger_price
                    .filter(|trigger| ltp <= *trigger),
                (OrderKind::Limit, OrderSide::Buy) => {
                    order.spec.price.filter(|price| ltp <= *price).map(|_| ltp)
                }
                (OrderKind::Limit, OrderSide::Sell) => {
                    order.spec.price.filter(|price| ltp >= *price).map(|_| ltp)
                }
                (OrderKind::Market, _) => None,
            };

            if let Some(price) = fill_price {
                order.status = OrderStatus::Complete;
                order.fill_price = Some(price);
                order.fill_time = Some(time);
                info!(
                    " {} {} x{} filled at {}",
                    side_tag(order.spec.side),
                    order.spec.symbol,
                    order.spec.quantity,
                    price
                );
                fills.push((order.spec.side, order.spec.quantity as i64));
            }
        }

        for (side, quantity) in fills {
            let market = book.markets.entry(token.to_string()).or_default();
            match side {
                OrderSide::Buy => market.position += quantity,
                OrderSide::Sell => market.position -= quantity,
            }
        }
    }

    pub async fn orders(&self) -> Vec<PaperOrder> {
        self.book.read().await.orders.clone()
    }

    pub async fn last_price(&self, token: &str) -> Option<Decimal> {
        self.book
            .read()
            .await
            .markets
            .get(token)
            .and_then(|market| market.ltp)
    }

    pub async fn position(&self, token: &str) -> i64 {
        self.book
            .read()
            .await
            .markets
            .get(token)
            .map(|market| market.position)
            .unwrap_or(0)
    }
}

fn side_tag(side: OrderSide) -> colored::ColoredString {
    match side {
        OrderSide::Buy => "BUY".green(),
        OrderSide::Sell => "SELL".red(),
    }
}

impl BrokerGateway for PaperBroker {
    async fn reference_price(&self, instrument: &Instrument) -> GatewayResult<Option<Decimal>> {
        let book = self.book.read().await;
        Ok(book
            .markets
            .get(&instrument.token)
            .and_then(|market| market.session_high))
    }

    async fn place_order(&self, spec: &OrderSpec) -> GatewayResult<OrderId> {
        if spec.quantity == 0 {
            return Err(GatewayError::Rejected("zero quantity".to_string()));
        }
        if spec.kind == OrderKind::StopLimit && spec.trigger_price.is_none() {
            return Err(GatewayError::Rejected(
                "stop order without trigger price".to_string(),
            ));
        }

        let mut book = self.book.write().await;
        let time = book.current_time;
        let ltp = book.markets.get(&spec.token).and_then(|market| market.ltp);

        let mut order = PaperOrder {
            id: OrderId::from(Uuid::new_v4()),
            spec: spec.clone(),
            status: OrderStatus::TriggerPending,
            placed_at: time,
            fill_price: None,
            fill_time: None,
            settle_polls_left: self.settle_polls,
        };

        match spec.kind {
            OrderKind::Market => match ltp {
                Some(price) => {
                    order.status = OrderStatus::Complete;
                    order.fill_price = Some(price);
                    order.fill_time = Some(time);
                    info!(
                        " {} {} x{} filled at {}",
                        side_tag(spec.side),
                        spec.symbol,
                        spec.quantity,
                        price
                    );
                    let market = book.markets.entry(spec.token.clone()).or_default();
                    match spec.side {
                        OrderSide::Buy => market.position += spec.quantity as i64,
                        OrderSide::Sell => market.position -= spec.quantity as i64,
                    }
                }
                None => {
                    warn!("No market price for {} : rejecting market order", spec.symbol);
                    return Err(GatewayError::Rejected(format!(
                        "no market price for {}",
                        spec.token
                    )));
                }
            },
            OrderKind::Limit => {
                order.status = OrderStatus::Open;
            }
            OrderKind::StopLimit => {
                order.status = OrderStatus::TriggerPending;
            }
        }

        let id = order.id.clone();
        info!(" ACCEPTED {} as {}", spec, id);
        book.orders.push(order);
        Ok(id)
    }

    async fn order_status(&self, id: &OrderId) -> GatewayResult<OrderStatus> {
        let mut book = self.book.write().await;
        match book.orders.iter_mut().find(|order| order.id == *id) {
            Some(order) => {
                if order.settle_polls_left > 0 {
                    order.settle_polls_left -= 1;
                    debug!("Order {} still settling", id);
                    return Ok(OrderStatus::Unknown);
                }
                Ok(order.status)
            }
            None => Ok(OrderStatus::Unknown),
        }
    }

    async fn cancel_order(&self, id: &OrderId) -> GatewayResult<()> {
        let mut book = self.book.write().await;
        match book.orders.iter_mut().find(|order| order.id == *id) {
            Some(order) => {
                if order.status.is_terminal() {
                    return Err(GatewayError::Rejected(format!(
                        "order {} already {}",
                        id, order.status
                    )));
                }
                order.status = OrderStatus::Cancelled;
                info!(" CANCELLED {} ({})", order.spec.symbol, id);
                Ok(())
            }
            None => Err(GatewayError::Rejected(format!("unknown order {}", id))),
        }
    }
}
