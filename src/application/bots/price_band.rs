//! Price band bot
//!
//! Each symbol gets a fixed `{low, high}` corridor. Inside trading hours the
//! bot exits positions that left their corridor, buys `TRADE_AMOUNT` USD of
//! every unheld symbol whose price is inside it, and stops for good once the
//! portfolio's open profit reaches `PROFIT_TARGET`.

use super::{lifecycle_details, BotContext, CycleReport, TradingBot};
use crate::application::BotError;
use crate::config::BotSettings;
use crate::domain::entities::asset::same_symbol;
use crate::domain::entities::order::{Order, OrderSide, TimeInForce};
use crate::domain::entities::position::Position;
use crate::domain::services::market_hours::MarketClock;
use crate::domain::services::strategies::PriceBand;
use crate::domain::value_objects::quantity::Quantity;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use serde_json::json;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{error, info};

const NAME: &str = "price-band";
const CHECK_INTERVAL: Duration = Duration::from_secs(3600);

pub struct PriceBandBot {
    context: BotContext,
    clock: MarketClock,
    bands: BTreeMap<String, PriceBand>,
    trade_amount: f64,
    profit_target: f64,
}

impl PriceBandBot {
    pub fn new(context: BotContext, settings: &BotSettings) -> Self {
        Self {
            context,
            clock: MarketClock::default(),
            bands: settings.price_bands.clone(),
            trade_amount: settings.trade_amount,
            profit_target: settings.profit_target,
        }
    }

    fn band_for(&self, symbol: &str) -> Option<&PriceBand> {
        self.bands
            .iter()
            .find(|(band_symbol, _)| same_symbol(band_symbol, symbol))
            .map(|(_, band)| band)
    }

    /// Latest prices for `symbols`, fetched concurrently; failures are logged and dropped
    async fn prices(&self, symbols: Vec<String>) -> Vec<(String, f64)> {
        let client = &self.context.client;
        let quotes = join_all(symbols.iter().map(|symbol| client.latest_price(symbol))).await;

        symbols
            .into_iter()
            .zip(quotes)
            .filter_map(|(symbol, quote)| match quote {
                Ok(price) if price > 0.0 => Some((symbol, price)),
                Ok(price) => {
                    error!("Invalid price {} for {}. Skipping.", price, symbol);
                    None
                }
                Err(e) => {
                    error!("Failed to fetch price for {}: {}", symbol, e);
                    None
                }
            })
            .collect()
    }

    async fn manage_positions(&self, positions: &[Position], report: &mut CycleReport) {
        let banded: Vec<String> = positions
            .iter()
            .filter(|p| self.band_for(&p.symbol).is_some())
            .map(|p| p.symbol.clone())
            .collect();

        for (symbol, price) in self.prices(banded).await {
            let (Some(band), Some(position)) = (
                self.band_for(&symbol),
                positions.iter().find(|p| p.symbol == symbol),
            ) else {
                continue;
            };
            let Some(exit) = band.exit_for(price) else {
                continue;
            };

            info!("{} hit {} at ${:.2}. Closing position.", symbol, exit.label(), price);
            let result = self.sell(position, price).await;
            report.order_result(&result);
            match result {
                Ok(_) => info!("Position closed for {}: {} units sold.", symbol, position.qty),
                Err(e) => error!("Failed to close position for {}: {}", symbol, e),
            }
        }
    }

    async fn sell(&self, position: &Position, price: f64) -> Result<String, BotError> {
        let order = Order::market(
            &position.symbol,
            OrderSide::Sell,
            Quantity::new(position.qty)?,
            TimeInForce::Gtc,
        )?;
        Ok(self.context.submit(NAME, &order, Some(price)).await?)
    }

    async fn rebalance(&self, positions: &[Position], report: &mut CycleReport) {
        let mut candidates = Vec::new();
        for symbol in self.bands.keys() {
            if positions.iter().any(|p| same_symbol(&p.symbol, symbol)) {
                info!("{} already has an open position. Skipping trade.", symbol);
                report.skipped += 1;
            } else {
                candidates.push(symbol.clone());
            }
        }

        for (symbol, price) in self.prices(candidates).await {
            let Some(band) = self.band_for(&symbol) else {
                continue;
            };
            if !band.allows_entry(price) {
                info!("{} price ${:.2} is out of trade limits. Skipping.", symbol, price);
                report.skipped += 1;
                continue;
            }

            info!("Placing order for {}.", symbol);
            let result = self.buy(&symbol, price).await;
            report.order_result(&result);
            if let Err(e) = result {
                error!("Failed to place order for {}: {}", symbol, e);
            }
        }
    }

    async fn buy(&self, symbol: &str, price: f64) -> Result<String, BotError> {
        let qty = Quantity::from_notional(self.trade_amount, price)?;
        let order = Order::market(symbol, OrderSide::Buy, qty, TimeInForce::Gtc)?;
        Ok(self.context.submit(NAME, &order, Some(price)).await?)
    }
}

#[async_trait]
impl TradingBot for PriceBandBot {
    fn name(&self) -> &str {
        NAME
    }

    async fn on_start(&mut self) -> Result<(), BotError> {
        let account = self.context.client.get_account().await?;
        info!(
            "Starting trading bot on {} (account {}, status {})",
            self.context.client.name(),
            account.id,
            account.status
        );
        self.context
            .log_event("bot_started", None, lifecycle_details(NAME))
            .await;
        Ok(())
    }

    async fn run_cycle(&mut self, now: DateTime<Utc>) -> Result<CycleReport, BotError> {
        let mut report = CycleReport::default();
        if !self.clock.is_trading_hour(now) {
            info!("Market is closed. Waiting for next session.");
            report.skipped = self.bands.len();
            return Ok(report);
        }

        let positions = self.context.client.list_positions().await?;
        let profit: f64 = positions.iter().filter_map(Position::open_pnl).sum();
        info!("Open portfolio profit: ${:.2}", profit);
        if profit >= self.profit_target {
            info!("Profit target reached: ${:.2}. Stopping trading.", profit);
            self.context
                .log_event(
                    "profit_target_reached",
                    None,
                    json!({ "profit": profit, "target": self.profit_target }),
                )
                .await;
            report.stop_requested = true;
            return Ok(report);
        }

        self.manage_positions(&positions, &mut report).await;
        self.rebalance(&positions, &mut report).await;
        Ok(report)
    }

    async fn on_stop(&mut self) -> Result<(), BotError> {
        info!("Bot stopped manually");
        self.context
            .log_event("bot_stopped", None, lifecycle_details(NAME))
            .await;
        Ok(())
    }

    fn interval(&self, _clock: &MarketClock, _now: DateTime<Utc>) -> Duration {
        CHECK_INTERVAL
    }
}
