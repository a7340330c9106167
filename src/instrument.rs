use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use strum_macros::Display as StrumDisplay;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Instrument {
    pub exchange: String,
    pub token: String,
    pub symbol: String,
}

impl Display for Instrument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}:{})", self.symbol, self.exchange, self.token)
    }
}

#[derive(Clone, Copy, Debug)]
pub struct IndexSpec {
    pub name: &'static str,
    pub index: &'static str,
    pub exchange: &'static str,
    pub token: &'static str,
    pub strike_step: u32,
}

pub const INDEXES: [IndexSpec; 4] = [
    IndexSpec {
        name: "NIFTY",
        index: "Nifty 50",
        exchange: "NSE",
        token: "26000",
        strike_step: 50,
    },
    IndexSpec {
        name: "BANKNIFTY",
        index: "Nifty Bank",
        exchange: "NSE",
        token: "26009",
        strike_step: 100,
    },
    IndexSpec {
        name: "MIDCPNIFTY",
        index: "NIFTY MID SELECT",
        exchange: "NSE",
        token: "26074",
        strike_step: 100,
    },
    IndexSpec {
        name: "FINNIFTY",
        index: "Nifty Fin Services",
        exchange: "NSE",
        token: "26037",
        strike_step: 50,
    },
];

pub fn lookup_index(name: &str) -> Option<&'static IndexSpec> {
    INDEXES
        .iter()
        .find(|spec| spec.name.eq_ignore_ascii_case(name))
}

impl IndexSpec {
    pub fn instrument(&self) -> Instrument {
        Instrument {
            exchange: self.exchange.to_string(),
            token: self.token.to_string(),
            symbol: self.name.to_string(),
        }
    }
}

// nearest multiple of the strike step, ties round up
pub fn atm_strike(ltp: Decimal, step: u32) -> Decimal {
    let step = Decimal::from(step);
    let current = ltp - ltp % step;
    let next_higher = current + step;
    if ltp - current < next_higher - ltp {
        current.normalize()
    } else {
        next_higher.normalize()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, StrumDisplay)]
pub enum OptionKind {
    #[strum(serialize = "CE")]
    Call,
    #[strum(serialize = "PE")]
    Put,
}

#[derive(Clone, Debug)]
pub struct OptionSeries {
    pub base: String,
    pub expiry: String,
    pub strike_step: u32,
}

impl OptionSeries {
    pub fn new(index: &IndexSpec, expiry: &str) -> Self {
        Self {
            base: index.name.to_string(),
            expiry: expiry.to_string(),
            strike_step: index.strike_step,
        }
    }

    pub fn atm_strike(&self, ltp: Decimal) -> Decimal {
        atm_strike(ltp, self.strike_step)
    }

    // classify a trading symbol like BANKNIFTY26JUN24C48000 as call/put + strike
    pub fn classify(&self, trading_symbol: &str) -> Option<(OptionKind, u32)> {
        let rest = trading_symbol.strip_prefix(self.base.as_str())?;
        let rest = rest.strip_prefix(self.expiry.as_str())?;
        let mut chars = rest.chars();
        let kind = match chars.next()? {
            'C' => OptionKind::Call,
            'P' => OptionKind::Put,
            _ => return None,
        };
        let digits: String = chars.as_str().chars().take_while(char::is_ascii_digit).collect();
        if digits.is_empty() {
            return None;
        }
        let strike = digits.parse().ok()?;
        Some((kind, strike))
    }
}
