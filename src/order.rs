use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use strum_macros::{Display as StrumDisplay, EnumString};
use uuid::Uuid;

use crate::instrument::Instrument;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, StrumDisplay, EnumString)]
#[strum(serialize_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, StrumDisplay, EnumString)]
pub enum OrderKind {
    #[strum(serialize = "MKT")]
    Market,
    #[strum(serialize = "LMT")]
    Limit,
    #[strum(serialize = "SL")]
    StopLimit,
}

#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, StrumDisplay, EnumString, Default,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
pub enum ProductType {
    Delivery,
    #[default]
    Intraday,
    Normal,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, StrumDisplay)]
pub enum OrderStatus {
    TriggerPending,
    Open,
    Complete,
    Rejected,
    Cancelled,
    Unknown,
}

impl OrderStatus {
    pub fn is_working(&self) -> bool {
        matches!(self, OrderStatus::TriggerPending | OrderStatus::Open)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Complete | OrderStatus::Rejected | OrderStatus::Cancelled
        )
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash)]
pub struct OrderId(String);

impl OrderId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<Uuid> for OrderId {
    fn from(id: Uuid) -> Self {
        OrderId(id.to_string())
    }
}

impl From<&str> for OrderId {
    fn from(id: &str) -> Self {
        OrderId(id.to_string())
    }
}

impl Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct OrderSpec {
    pub exchange: String,
    pub token: String,
    pub symbol: String,
    pub side: OrderSide,
    pub kind: OrderKind,
    pub quantity: u32,
    pub price: Option<Decimal>,
    pub trigger_price: Option<Decimal>,
    pub product: ProductType,
}

impl OrderSpec {
    pub fn stop_entry(
        instrument: &Instrument,
        quantity: u32,
        product: ProductType,
        trigger_price: Decimal,
        price: Decimal,
    ) -> Self {
        Self {
            exchange: instrument.exchange.clone(),
            token: instrument.token.clone(),
            symbol: instrument.symbol.clone(),
            side: OrderSide::Buy,
            kind: OrderKind::StopLimit,
            quantity,
            price: Some(price),
            trigger_price: Some(trigger_price),
            product,
        }
    }

    pub fn market_exit(instrument: &Instrument, quantity: u32, product: ProductType) -> Self {
        Self {
            exchange: instrument.exchange.clone(),
            token: instrument.token.clone(),
            symbol: instrument.symbol.clone(),
            side: OrderSide::Sell,
            kind: OrderKind::Market,
            quantity,
            price: None,
            trigger_price: None,
            product,
        }
    }
}

impl Display for OrderSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} x{} {} {}",
            self.side, self.kind, self.quantity, self.symbol, self.exchange
        )?;
        if let Some(trigger) = self.trigger_price {
            write!(f, " trg {}", trigger)?;
        }
        if let Some(price) = self.price {
            write!(f, " @ {}", price)?;
        }
        Ok(())
    }
}
