//! Rebalance bot
//!
//! Adds `TRADE_AMOUNT` USD to every target each cycle. Equities are bought
//! while the stock market is in its safe window; the rest of the time the bot
//! works the crypto targets instead and checks back less often.

use super::{lifecycle_details, BotContext, CycleReport, TradingBot};
use crate::application::BotError;
use crate::config::BotSettings;
use crate::domain::entities::asset::AssetClass;
use crate::domain::entities::order::{Order, OrderSide, TimeInForce};
use crate::domain::services::market_hours::MarketClock;
use crate::domain::value_objects::quantity::Quantity;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;
use tracing::{error, info, warn};

const NAME: &str = "rebalance";
const STOCK_INTERVAL: Duration = Duration::from_secs(1800);
const CRYPTO_INTERVAL: Duration = Duration::from_secs(3600);

pub struct RebalanceBot {
    context: BotContext,
    clock: MarketClock,
    targets: Vec<String>,
    trade_amount: f64,
}

impl RebalanceBot {
    pub fn new(context: BotContext, settings: &BotSettings) -> Self {
        let targets = if settings.target_allocations.is_empty() {
            settings.assets.clone()
        } else {
            settings.target_allocations.keys().cloned().collect()
        };
        Self {
            context,
            clock: MarketClock::default(),
            targets,
            trade_amount: settings.trade_amount,
        }
    }

    async fn rebalance(&self, class: AssetClass, report: &mut CycleReport) {
        for symbol in self
            .targets
            .iter()
            .filter(|symbol| AssetClass::of(symbol) == class)
        {
            info!("Rebalancing for {}: Allocating ${}", symbol, self.trade_amount);
            match self.buy(symbol).await {
                Ok(_) => report.orders_submitted += 1,
                Err(e) => {
                    error!("Failed to place order for {}: {}", symbol, e);
                    report.orders_failed += 1;
                }
            }
        }
    }

    async fn buy(&self, symbol: &str) -> Result<String, BotError> {
        let price = self.context.client.latest_price(symbol).await?;
        let qty = Quantity::from_notional(self.trade_amount, price)?;
        info!(
            "Placing BUY order for ${:.2} of {} ({} units).",
            self.trade_amount, symbol, qty
        );
        let order = Order::market(symbol, OrderSide::Buy, qty, TimeInForce::Gtc)?;
        Ok(self.context.submit(NAME, &order, Some(price)).await?)
    }
}

#[async_trait]
impl TradingBot for RebalanceBot {
    fn name(&self) -> &str {
        NAME
    }

    async fn on_start(&mut self) -> Result<(), BotError> {
        if self.targets.is_empty() {
            warn!("No rebalance targets configured");
        }
        info!(
            "Starting rebalance bot on {} for {:?}",
            self.context.client.name(),
            self.targets
        );
        self.context
            .log_event("bot_started", None, lifecycle_details(NAME))
            .await;
        Ok(())
    }

    async fn run_cycle(&mut self, now: DateTime<Utc>) -> Result<CycleReport, BotError> {
        let mut report = CycleReport::default();
        if let Err(e) = self.context.log_portfolio().await {
            error!("Failed to get account info: {}", e);
        }

        if self.clock.is_safe_window(now) {
            info!("Stock market is open. Rebalancing stock portfolio...");
            self.rebalance(AssetClass::Equity, &mut report).await;
        } else if self.clock.crypto_open(now) {
            if self.clock.is_weekday(now) {
                info!("Outside the stock trading window");
            } else {
                info!("Stock market is closed today. Skipping stock rebalancing.");
            }
            info!("Crypto trading is active. Rebalancing crypto portfolio...");
            self.rebalance(AssetClass::Crypto, &mut report).await;
        } else {
            info!("Markets are closed. Waiting for the next cycle...");
        }
        Ok(report)
    }

    async fn on_stop(&mut self) -> Result<(), BotError> {
        info!("Trading bot stopped manually");
        self.context
            .log_event("bot_stopped", None, lifecycle_details(NAME))
            .await;
        Ok(())
    }

    fn interval(&self, clock: &MarketClock, now: DateTime<Utc>) -> Duration {
        if clock.is_safe_window(now) {
            STOCK_INTERVAL
        } else if clock.crypto_open(now) {
            CRYPTO_INTERVAL
        } else {
            STOCK_INTERVAL
        }
    }
}
