use rust_decimal::Decimal;
use std::fmt::Display;
use strum_macros::Display as StrumDisplay;

use crate::order::{OrderId, OrderStatus};

pub mod breakout;

pub use breakout::{BreakoutParams, BreakoutStrategy};

/// One variant per cycle stage, carrying exactly the state that stage needs.
#[derive(Clone, Debug, PartialEq, StrumDisplay)]
pub enum Phase {
    EnteringOrder,
    AwaitingFill {
        order_id: OrderId,
        reference_high: Decimal,
        unknown_polls: u32,
    },
    WaitingToExit {
        order_id: OrderId,
        reference_high: Decimal,
        exit_deadline: u64,
    },
    Failed {
        reason: HaltReason,
    },
    Cancelled,
}

impl Phase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Failed { .. } | Phase::Cancelled)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum StepOutcome {
    Idle,
    EntryPlaced { order_id: OrderId },
    FillConfirmed { exit_deadline: u64 },
    CycleComplete,
    Halted,
}

#[derive(Clone, Debug, PartialEq)]
pub enum HaltReason {
    EntryOrderFailed { status: OrderStatus },
    UnknownStatusExhausted { polls: u32 },
    ExitRejected { reason: String },
    ExitUnreachable { reason: String },
}

impl Display for HaltReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HaltReason::EntryOrderFailed { status } => write!(f, "entry order ended {}", status),
            HaltReason::UnknownStatusExhausted { polls } => {
                write!(f, "no order status after {} polls", polls)
            }
            HaltReason::ExitRejected { reason } => write!(f, "exit order rejected : {}", reason),
            HaltReason::ExitUnreachable { reason } => write!(f, "exit order failed : {}", reason),
        }
    }
}
