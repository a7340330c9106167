pub mod broker;
pub mod config;
pub mod feed;
pub mod instrument;
pub mod order;
pub mod strategy;

pub use broker::{BrokerGateway, GatewayError, PaperBroker};
pub use config::{AppConfig, ConfigError};
pub use strategy::{BreakoutParams, BreakoutStrategy, HaltReason, Phase, StepOutcome};
