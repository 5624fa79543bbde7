use crate::domain::services::indicators::{percent_change, sma};
use crate::domain::value_objects::round_to;
use crate::domain::value_objects::quantity::QUANTITY_DECIMALS;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Decision {
    Buy,
    Sell,
    Hold,
    NotEnoughData,
}

/// Moving averages behind a crossover decision
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CrossoverSignal {
    pub decision: Decision,
    pub short_sma: Option<f64>,
    pub long_sma: Option<f64>,
}

/// Classic two-window SMA crossover.
///
/// Enters when the short average is above the long one and exits when it drops
/// below. Equal averages never trade.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SmaCrossover {
    pub short_window: usize,
    pub long_window: usize,
}

impl Default for SmaCrossover {
    fn default() -> Self {
        Self {
            short_window: 10,
            long_window: 50,
        }
    }
}

impl SmaCrossover {
    pub fn new(short_window: usize, long_window: usize) -> Self {
        Self {
            short_window,
            long_window,
        }
    }

    pub fn evaluate(&self, prices: &[f64], holding: bool) -> CrossoverSignal {
        let short_sma = sma(prices, self.short_window);
        let long_sma = sma(prices, self.long_window);

        let decision = match (short_sma, long_sma) {
            (Some(short), Some(long)) if short > long && !holding => Decision::Buy,
            (Some(short), Some(long)) if short < long && holding => Decision::Sell,
            (Some(_), Some(_)) => Decision::Hold,
            _ => Decision::NotEnoughData,
        };

        CrossoverSignal {
            decision,
            short_sma,
            long_sma,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Exit {
    TakeProfit,
    StopLoss,
}

impl Exit {
    pub fn label(&self) -> &'static str {
        match self {
            Exit::TakeProfit => "take profit",
            Exit::StopLoss => "stop loss",
        }
    }
}

/// Percentage take-profit / stop-loss around the entry price
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProfitGuard {
    pub take_profit_pct: f64,
    pub stop_loss_pct: f64,
}

impl ProfitGuard {
    pub fn new(take_profit_pct: f64, stop_loss_pct: f64) -> Self {
        Self {
            take_profit_pct,
            stop_loss_pct,
        }
    }

    pub fn check(&self, entry_price: f64, current_price: f64) -> Option<Exit> {
        let pnl_pct = percent_change(entry_price, current_price)?;
        if pnl_pct >= self.take_profit_pct {
            Some(Exit::TakeProfit)
        } else if pnl_pct <= -self.stop_loss_pct {
            Some(Exit::StopLoss)
        } else {
            None
        }
    }
}

/// Fixed price corridor: buy inside it, exit at either edge
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceBand {
    pub low: f64,
    pub high: f64,
}

impl PriceBand {
    pub fn new(low: f64, high: f64) -> Self {
        Self { low, high }
    }

    pub fn exit_for(&self, price: f64) -> Option<Exit> {
        if price <= self.low {
            Some(Exit::StopLoss)
        } else if price >= self.high {
            Some(Exit::TakeProfit)
        } else {
            None
        }
    }

    pub fn allows_entry(&self, price: f64) -> bool {
        self.low <= price && price <= self.high
    }
}

/// Quantity to buy for a USD allocation, capped by available cash
pub fn allocation_quantity(cash: f64, target: f64, price: f64) -> Option<f64> {
    if price <= 0.0 || !price.is_finite() {
        return None;
    }
    let amount = if cash >= target { target } else { cash };
    if amount <= 0.0 {
        return None;
    }
    Some(round_to(amount / price, QUANTITY_DECIMALS))
}
