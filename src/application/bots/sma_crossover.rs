//! SMA crossover bot
//!
//! Every cycle pulls a week of one-minute closes per asset and compares the
//! short and long simple moving averages. Positions opened by the bot are kept
//! in the state file, and anything left there from a previous run is sold on
//! start-up and again on shutdown.

use super::{lifecycle_details, BotContext, CycleReport, TradingBot};
use crate::application::BotError;
use crate::config::BotSettings;
use crate::domain::entities::order::{Order, OrderSide, TimeInForce};
use crate::domain::services::indicators::PriceSummary;
use crate::domain::services::market_hours::MarketClock;
use crate::domain::services::strategies::{allocation_quantity, Decision, SmaCrossover};
use crate::domain::value_objects::quantity::Quantity;
use crate::persistence::state::{BotState, StatePosition, StateStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;
use tracing::{error, info, warn};

const NAME: &str = "sma-crossover";
const LOOKBACK_DAYS: i64 = 7;
const CLOSED_MARKET_INTERVAL: Duration = Duration::from_secs(60);

pub struct SmaCrossoverBot {
    context: BotContext,
    store: StateStore,
    strategy: SmaCrossover,
    assets: Vec<String>,
    target_allocation: f64,
    check_interval: Duration,
    market_hours_only: bool,
    clock: MarketClock,
}

impl SmaCrossoverBot {
    pub fn new(context: BotContext, settings: &BotSettings, store: StateStore) -> Self {
        Self {
            context,
            store,
            strategy: SmaCrossover::new(settings.short_window, settings.long_window),
            assets: settings.assets.clone(),
            target_allocation: settings.target_allocation,
            check_interval: settings.check_interval,
            market_hours_only: settings.market_hours_only,
            clock: MarketClock::default(),
        }
    }

    fn save(&self, state: &BotState) {
        if let Err(e) = self.store.save(state) {
            error!("Failed to save state: {}", e);
        }
    }

    /// Sell every position recorded in the state file, then clear it
    async fn close_state_positions(&self) -> Result<(), BotError> {
        let mut state = self.store.load();
        if state.positions.is_empty() {
            return Ok(());
        }

        info!("Closing {} open positions from state", state.positions.len());
        for (asset, position) in &state.positions {
            info!("Closing position for {}. Qty: {}", asset, position.qty);
            let order = Order::market(
                asset,
                OrderSide::Sell,
                Quantity::new(position.qty)?,
                TimeInForce::Gtc,
            )?;
            match self.context.submit(NAME, &order, None).await {
                Ok(_) => info!("Successfully closed position for {}", asset),
                Err(e) => error!("Failed to close position for {}: {}", asset, e),
            }
        }

        state.positions.clear();
        self.save(&state);
        info!("All positions closed");
        Ok(())
    }

    async fn buy(
        &self,
        asset: &str,
        price: f64,
        cash: &mut f64,
        state: &mut BotState,
        report: &mut CycleReport,
    ) -> Result<(), BotError> {
        let Some(qty) = allocation_quantity(*cash, self.target_allocation, price) else {
            warn!("Cannot size a buy for {} at ${}", asset, price);
            report.skipped += 1;
            return Ok(());
        };

        info!("Buying {}", asset);
        let order = Order::market(asset, OrderSide::Buy, Quantity::new(qty)?, TimeInForce::Gtc)?;
        let result = self.context.submit(NAME, &order, Some(price)).await;
        report.order_result(&result);
        match result {
            Ok(_) => {
                state.positions.insert(
                    asset.to_string(),
                    StatePosition {
                        qty,
                        entry_price: price,
                    },
                );
                self.save(state);
                *cash -= qty * price;
                info!(
                    "Successfully bought {}. Qty: {}, Remaining Cash: ${:.2}",
                    asset, qty, cash
                );
            }
            Err(e) => error!("Failed to buy {}: {}", asset, e),
        }
        Ok(())
    }

    async fn sell(
        &self,
        asset: &str,
        state: &mut BotState,
        report: &mut CycleReport,
    ) -> Result<(), BotError> {
        let Some(position) = state.positions.remove(asset) else {
            return Ok(());
        };

        info!("Selling {}", asset);
        let order = Order::market(
            asset,
            OrderSide::Sell,
            Quantity::new(position.qty)?,
            TimeInForce::Gtc,
        )?;
        let result = self.context.submit(NAME, &order, None).await;
        report.order_result(&result);
        match result {
            Ok(_) => {
                self.save(state);
                info!("Successfully sold {}. Qty: {}", asset, position.qty);
            }
            Err(e) => {
                error!("Failed to sell {}: {}", asset, e);
                state.positions.insert(asset.to_string(), position);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl TradingBot for SmaCrossoverBot {
    fn name(&self) -> &str {
        NAME
    }

    async fn on_start(&mut self) -> Result<(), BotError> {
        info!(
            "Trading bot started on {} for {:?}",
            self.context.client.name(),
            self.assets
        );
        self.context
            .log_event("bot_started", None, lifecycle_details(NAME))
            .await;
        self.close_state_positions().await
    }

    async fn run_cycle(&mut self, now: DateTime<Utc>) -> Result<CycleReport, BotError> {
        let mut report = CycleReport::default();
        if self.market_hours_only && !self.clock.is_regular_session(now) {
            info!("Market is closed, skipping cycle");
            report.skipped = self.assets.len();
            return Ok(report);
        }

        let mut state = self.store.load();
        let mut cash = self.context.client.get_account().await?.cash;
        let lookback = chrono::Duration::days(LOOKBACK_DAYS);

        for asset in &self.assets {
            info!("Evaluating asset: {}", asset);
            let prices = match self.context.client.closing_prices(asset, lookback).await {
                Ok(prices) => prices,
                Err(e) => {
                    error!("Error fetching prices for {}: {}", asset, e);
                    Vec::new()
                }
            };
            let Some(&last) = prices.last() else {
                warn!("No price data for {}. Skipping.", asset);
                report.skipped += 1;
                continue;
            };
            if let Some(summary) = PriceSummary::of(&prices) {
                info!("{} {}", asset, summary);
            }

            let signal = self.strategy.evaluate(&prices, state.holds(asset));
            match signal.decision {
                Decision::NotEnoughData => {
                    warn!(
                        "Not enough data for SMA calculation for {}. Skipping.",
                        asset
                    );
                    report.skipped += 1;
                }
                Decision::Buy if cash < self.target_allocation => {
                    warn!(
                        "Insufficient cash to trade {}. Available: ${:.2}, Required: ${}. Skipping.",
                        asset, cash, self.target_allocation
                    );
                    report.skipped += 1;
                }
                Decision::Buy => {
                    self.buy(asset, last, &mut cash, &mut state, &mut report)
                        .await?;
                }
                Decision::Sell => self.sell(asset, &mut state, &mut report).await?,
                Decision::Hold => info!(
                    "No trade signal for {} (short SMA {:.6}, long SMA {:.6})",
                    asset,
                    signal.short_sma.unwrap_or_default(),
                    signal.long_sma.unwrap_or_default()
                ),
            }
        }

        self.save(&state);
        Ok(report)
    }

    async fn on_stop(&mut self) -> Result<(), BotError> {
        info!("Bot stopped manually");
        let result = self.close_state_positions().await;
        self.context
            .log_event("bot_stopped", None, lifecycle_details(NAME))
            .await;
        result
    }

    fn interval(&self, clock: &MarketClock, now: DateTime<Utc>) -> Duration {
        if self.market_hours_only && !clock.is_regular_session(now) {
            CLOSED_MARKET_INTERVAL
        } else {
            self.check_interval
        }
    }
}
