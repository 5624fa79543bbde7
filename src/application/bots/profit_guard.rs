//! Take-profit / stop-loss bot
//!
//! Opens a small IOC position in each asset and exits it once the price moves
//! past either threshold. Entries live in memory only, so a restart forgets
//! them.

use super::{lifecycle_details, BotContext, CycleReport, TradingBot};
use crate::application::BotError;
use crate::config::BotSettings;
use crate::domain::entities::order::{Order, OrderSide, TimeInForce};
use crate::domain::services::indicators::percent_change;
use crate::domain::services::market_hours::MarketClock;
use crate::domain::services::strategies::ProfitGuard;
use crate::domain::value_objects::quantity::Quantity;
use crate::persistence::state::StatePosition;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{error, info, warn};

const NAME: &str = "profit-guard";

pub struct ProfitGuardBot {
    context: BotContext,
    guard: ProfitGuard,
    assets: Vec<String>,
    allocation: f64,
    check_interval: Duration,
    positions: BTreeMap<String, StatePosition>,
}

impl ProfitGuardBot {
    pub fn new(context: BotContext, settings: &BotSettings) -> Self {
        Self {
            context,
            guard: ProfitGuard::new(settings.take_profit_pct, settings.stop_loss_pct),
            assets: settings.assets.clone(),
            allocation: settings.trade_amount,
            check_interval: settings.check_interval,
            positions: BTreeMap::new(),
        }
    }

    pub fn positions(&self) -> &BTreeMap<String, StatePosition> {
        &self.positions
    }

    async fn price(&self, symbol: &str) -> Option<f64> {
        match self.context.client.latest_price(symbol).await {
            Ok(price) => Some(price),
            Err(e) => {
                error!("Error fetching price for {}: {}", symbol, e);
                None
            }
        }
    }

    async fn check_exits(&mut self, report: &mut CycleReport) -> Result<(), BotError> {
        let held: Vec<(String, StatePosition)> = self
            .positions
            .iter()
            .map(|(symbol, position)| (symbol.clone(), *position))
            .collect();

        for (symbol, position) in held {
            let Some(current) = self.price(&symbol).await else {
                continue;
            };
            let Some(exit) = self.guard.check(position.entry_price, current) else {
                continue;
            };

            info!(
                "{} triggered for {} at {} ({:+.2}%).",
                exit.label(),
                symbol,
                current,
                percent_change(position.entry_price, current).unwrap_or_default()
            );
            let order = Order::market(
                &symbol,
                OrderSide::Sell,
                Quantity::new(position.qty)?,
                TimeInForce::Ioc,
            )?;
            let result = self.context.submit(NAME, &order, Some(current)).await;
            report.order_result(&result);
            match result {
                Ok(_) => {
                    info!(
                        "Order sold: {}, Qty: {}, Allocation: ${:.2}",
                        symbol,
                        position.qty,
                        position.qty * current
                    );
                    self.positions.remove(&symbol);
                }
                Err(e) => error!("Error placing order for {}: {}", symbol, e),
            }
        }
        Ok(())
    }
}

#[async_trait]
impl TradingBot for ProfitGuardBot {
    fn name(&self) -> &str {
        NAME
    }

    async fn on_start(&mut self) -> Result<(), BotError> {
        info!("Starting trading bot on {}", self.context.client.name());
        self.context
            .log_event("bot_started", None, lifecycle_details(NAME))
            .await;
        Ok(())
    }

    async fn run_cycle(&mut self, _now: DateTime<Utc>) -> Result<CycleReport, BotError> {
        let mut report = CycleReport::default();
        self.check_exits(&mut report).await?;

        for asset in self.assets.clone() {
            if self.positions.contains_key(&asset) {
                info!("Skipping {} (already in position).", asset);
                report.skipped += 1;
                continue;
            }

            info!("Evaluating asset: {}", asset);
            let Some(price) = self.price(&asset).await else {
                warn!("Price unavailable for {}. Skipping.", asset);
                report.skipped += 1;
                continue;
            };

            let order = match Quantity::from_notional(self.allocation, price)
                .and_then(|qty| Order::market(&asset, OrderSide::Buy, qty, TimeInForce::Ioc))
            {
                Ok(order) => order,
                Err(e) => {
                    warn!("Skipping {}: {}", asset, e);
                    report.skipped += 1;
                    continue;
                }
            };
            let result = self.context.submit(NAME, &order, Some(price)).await;
            report.order_result(&result);
            match result {
                Ok(_) => {
                    info!(
                        "Order bought: {}, Qty: {}, Allocation: ${}",
                        asset, order.quantity, self.allocation
                    );
                    self.positions.insert(
                        asset,
                        StatePosition {
                            qty: order.quantity.value(),
                            entry_price: price,
                        },
                    );
                }
                Err(e) => error!("Error placing order for {}: {}", asset, e),
            }
        }
        Ok(report)
    }

    async fn on_stop(&mut self) -> Result<(), BotError> {
        info!("Bot stopped manually");
        if !self.positions.is_empty() {
            warn!(
                "{} positions remain open: {:?}",
                self.positions.len(),
                self.positions.keys().collect::<Vec<_>>()
            );
        }
        self.context
            .log_event("bot_stopped", None, lifecycle_details(NAME))
            .await;
        Ok(())
    }

    fn interval(&self, _clock: &MarketClock, _now: DateTime<Utc>) -> Duration {
        self.check_interval
    }
}
