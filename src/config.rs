use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::instrument::{lookup_index, IndexSpec};
use crate::order::ProductType;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("could not read config file : {0}")]
    Io(#[from] std::io::Error),
    #[error("could not parse config file : {0}")]
    Parse(#[from] toml::de::Error),
    #[error("unknown symbol : {0}")]
    UnknownSymbol(String),
    #[error("instrument token must not be empty")]
    EmptyInstrumentToken,
    #[error("quantity must be at least 1")]
    InvalidQuantity,
    #[error("entry_offset must be positive")]
    InvalidEntryOffset,
    #[error("limit_buffer must not be negative")]
    InvalidLimitBuffer,
    #[error("max_unknown_polls must be at least 1")]
    InvalidUnknownPollCap,
    #[error("start_price must be positive")]
    InvalidStartPrice,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct AppConfig {
    pub trade: TradeConfig,
    pub order: OrderConfig,
    #[serde(default)]
    pub paper: PaperConfig,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct TradeConfig {
    pub wait_secs: u64,
    pub entry_offset: Decimal,
    #[serde(default = "default_limit_buffer")]
    pub limit_buffer: Decimal,
    #[serde(default = "default_max_unknown_polls")]
    pub max_unknown_polls: u32,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct OrderConfig {
    pub quantity: u32,
    #[serde(default)]
    pub product: ProductType,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct PaperConfig {
    #[serde(default = "default_start_price")]
    pub start_price: Decimal,
}

impl Default for PaperConfig {
    fn default() -> Self {
        Self {
            start_price: default_start_price(),
        }
    }
}

fn default_limit_buffer() -> Decimal {
    dec!(0.10)
}

fn default_max_unknown_polls() -> u32 {
    20
}

fn default_start_price() -> Decimal {
    dec!(22000)
}

impl AppConfig {
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = tokio::fs::read_to_string(path).await?;
        let config: AppConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.order.quantity < 1 {
            return Err(ConfigError::InvalidQuantity);
        }
        if self.trade.entry_offset <= dec!(0) {
            return Err(ConfigError::InvalidEntryOffset);
        }
        if self.trade.limit_buffer < dec!(0) {
            return Err(ConfigError::InvalidLimitBuffer);
        }
        if self.trade.max_unknown_polls < 1 {
            return Err(ConfigError::InvalidUnknownPollCap);
        }
        if self.paper.start_price <= dec!(0) {
            return Err(ConfigError::InvalidStartPrice);
        }
        Ok(())
    }
}

pub fn resolve_symbols(names: &[String]) -> Result<Vec<&'static IndexSpec>, ConfigError> {
    names
        .iter()
        .map(|name| lookup_index(name).ok_or_else(|| ConfigError::UnknownSymbol(name.clone())))
        .collect()
}
