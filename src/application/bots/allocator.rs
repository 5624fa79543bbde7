//! Fixed-allocation bot
//!
//! Buys `TARGET_ALLOCATION` USD of every configured asset once and remembers
//! what it bought in the state file's `invested_assets` map.

use super::{lifecycle_details, BotContext, CycleReport, TradingBot};
use crate::application::BotError;
use crate::config::BotSettings;
use crate::domain::entities::asset::{same_symbol, strip_pair_separator};
use crate::domain::entities::order::{Order, OrderSide, TimeInForce};
use crate::domain::services::market_hours::MarketClock;
use crate::domain::value_objects::quantity::Quantity;
use crate::persistence::state::{InvestedAsset, StateStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;
use tracing::{error, info, warn};

const NAME: &str = "allocator";

pub struct AllocatorBot {
    context: BotContext,
    store: StateStore,
    assets: Vec<String>,
    tradable: Vec<String>,
    target_allocation: f64,
    check_interval: Duration,
}

impl AllocatorBot {
    pub fn new(context: BotContext, settings: &BotSettings, store: StateStore) -> Self {
        Self {
            context,
            store,
            assets: settings.assets.clone(),
            tradable: Vec::new(),
            target_allocation: settings.target_allocation,
            check_interval: settings.check_interval,
        }
    }

    /// Configured assets that survived the tradability check
    pub fn tradable_assets(&self) -> &[String] {
        &self.tradable
    }

    async fn verify_tradable_assets(&self) -> Vec<String> {
        info!("Verifying tradable assets...");
        let available = match self.context.client.list_tradable_assets().await {
            Ok(assets) => assets,
            Err(e) => {
                error!("Error verifying tradable assets: {}", e);
                return Vec::new();
            }
        };
        if available.is_empty() {
            error!("No tradable assets returned. Check your API permissions.");
            return Vec::new();
        }

        let filtered: Vec<String> = self
            .assets
            .iter()
            .filter(|asset| available.iter().any(|a| same_symbol(&a.symbol, asset)))
            .cloned()
            .collect();
        info!("Filtered tradable assets: {:?}", filtered);
        filtered
    }

    async fn allocate(
        &self,
        asset: &str,
        cash: &mut f64,
        report: &mut CycleReport,
    ) -> Result<Option<InvestedAsset>, BotError> {
        let price = self.context.client.latest_price(asset).await?;
        let qty = Quantity::from_notional(self.target_allocation, price)?;

        if *cash < self.target_allocation {
            warn!(
                "Insufficient cash to allocate ${} to {}.",
                self.target_allocation, asset
            );
            report.skipped += 1;
            return Ok(None);
        }

        let order = Order::market(
            &strip_pair_separator(asset),
            OrderSide::Buy,
            qty,
            TimeInForce::Day,
        )?;
        let result = self.context.submit(NAME, &order, Some(price)).await;
        report.order_result(&result);
        result?;

        info!(
            "Allocated ${} to {} (Qty: {}).",
            self.target_allocation, asset, qty
        );
        *cash -= self.target_allocation;
        Ok(Some(InvestedAsset {
            qty: qty.value(),
            price,
        }))
    }
}

#[async_trait]
impl TradingBot for AllocatorBot {
    fn name(&self) -> &str {
        NAME
    }

    async fn on_start(&mut self) -> Result<(), BotError> {
        info!("Starting allocator bot on {}", self.context.client.name());
        self.tradable = self.verify_tradable_assets().await;
        self.context
            .log_event("bot_started", None, lifecycle_details(NAME))
            .await;
        Ok(())
    }

    async fn run_cycle(&mut self, _now: DateTime<Utc>) -> Result<CycleReport, BotError> {
        let mut report = CycleReport::default();
        if let Err(e) = self.context.log_portfolio().await {
            error!("Error fetching portfolio: {}", e);
        }

        let mut cash = self.context.client.get_account().await?.cash;
        let mut state = self.store.load();

        for asset in &self.tradable {
            if state.invested_assets.contains_key(asset) {
                info!("Already invested in {}. Skipping allocation.", asset);
                report.skipped += 1;
                continue;
            }

            match self.allocate(asset, &mut cash, &mut report).await {
                Ok(Some(invested)) => {
                    state.invested_assets.insert(asset.clone(), invested);
                    if let Err(e) = self.store.save(&state) {
                        error!("Failed to save state: {}", e);
                    }
                }
                Ok(None) => {}
                Err(e) => error!("Error allocating funds for {}: {}", asset, e),
            }
        }
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
        self.check_interval
    }
}
