use rust_decimal::Decimal;
use thiserror::Error;

use crate::instrument::Instrument;
use crate::order::{OrderId, OrderSpec, OrderStatus};

pub mod paper;

pub use paper::PaperBroker;

#[derive(Error, Clone, Debug, PartialEq, Eq)]
pub enum GatewayError {
    #[error("order rejected : {0}")]
    Rejected(String),
    #[error("gateway unavailable : {0}")]
    Transport(String),
}

pub type GatewayResult<T> = Result<T, GatewayError>;

/// Narrow seam to the broker. The paper broker implements it in-crate, a
/// live integration implements it elsewhere.
pub trait BrokerGateway {
    /// Session high for the instrument, `None` until the broker has data.
    async fn reference_price(&self, instrument: &Instrument) -> GatewayResult<Option<Decimal>>;

    async fn place_order(&self, spec: &OrderSpec) -> GatewayResult<OrderId>;

    /// `OrderStatus::Unknown` when the id is absent from the broker's book.
    async fn order_status(&self, id: &OrderId) -> GatewayResult<OrderStatus>;

    async fn cancel_order(&self, id: &OrderId) -> GatewayResult<()>;
}
