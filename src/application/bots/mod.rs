//! Trading Bots
//!
//! Every strategy script becomes a `TradingBot`: a struct that owns its state
//! and exposes one `run_cycle` per check interval. The runner owns the loop,
//! the sleeps and the shutdown handling, so bots only decide and submit.

pub mod allocator;
pub mod price_band;
pub mod profit_guard;
pub mod rebalance;
pub mod sma_crossover;

#[cfg(test)]
pub(crate) mod mock;

use crate::application::journal::TradeJournal;
use crate::application::BotError;
use crate::config::{BotKind, BotSettings};
use crate::domain::entities::order::Order;
use crate::domain::entities::position::Position;
use crate::domain::repositories::broker_client::{BrokerClient, BrokerResult};
use crate::domain::services::market_hours::MarketClock;
use crate::persistence::state::StateStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub use allocator::AllocatorBot;
pub use price_band::PriceBandBot;
pub use profit_guard::ProfitGuardBot;
pub use rebalance::RebalanceBot;
pub use sma_crossover::SmaCrossoverBot;

/// What one cycle did
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleReport {
    pub orders_submitted: usize,
    pub orders_failed: usize,
    /// Assets looked at but left alone (no data, no cash, market closed...)
    pub skipped: usize,
    /// The bot reached its goal and wants the runner to stop
    pub stop_requested: bool,
}

impl CycleReport {
    pub fn order_result<T, E>(&mut self, result: &Result<T, E>) {
        match result {
            Ok(_) => self.orders_submitted += 1,
            Err(_) => self.orders_failed += 1,
        }
    }
}

#[async_trait]
pub trait TradingBot: Send {
    fn name(&self) -> &str;

    /// Runs once before the first cycle
    async fn on_start(&mut self) -> Result<(), BotError> {
        Ok(())
    }

    async fn run_cycle(&mut self, now: DateTime<Utc>) -> Result<CycleReport, BotError>;

    /// Runs once when the loop is interrupted
    async fn on_stop(&mut self) -> Result<(), BotError> {
        Ok(())
    }

    /// Sleep before the next cycle
    fn interval(&self, clock: &MarketClock, now: DateTime<Utc>) -> Duration;
}

/// Broker access shared by the bots, with optional trade journaling
#[derive(Clone)]
pub struct BotContext {
    pub client: Arc<dyn BrokerClient>,
    journal: Option<TradeJournal>,
}

impl BotContext {
    pub fn new(client: Arc<dyn BrokerClient>) -> Self {
        Self {
            client,
            journal: None,
        }
    }

    pub fn with_journal(mut self, journal: TradeJournal) -> Self {
        self.journal = Some(journal);
        self
    }

    pub fn journal(&self) -> Option<&TradeJournal> {
        self.journal.as_ref()
    }

    /// Submit `order` and journal it on success
    ///
    /// Journal failures are logged and never fail the order.
    pub async fn submit(
        &self,
        strategy: &str,
        order: &Order,
        price: Option<f64>,
    ) -> BrokerResult<String> {
        let order_id = self.client.submit_order(order).await?;
        info!(
            "Order placed: {} {} {} ({}), id {}",
            order.side, order.quantity, order.symbol, order.time_in_force.as_str(), order_id
        );

        if let Some(journal) = &self.journal {
            if let Err(e) = journal
                .record_order(self.client.broker(), strategy, order, &order_id, price)
                .await
            {
                warn!("Failed to journal order {}: {}", order_id, e);
            }
        }
        Ok(order_id)
    }

    /// Append a lifecycle event to the audit log, if journaling is on
    pub async fn log_event(&self, event_type: &str, symbol: Option<&str>, details: Value) {
        if let Some(journal) = &self.journal {
            if let Err(e) = journal
                .log_event(event_type, self.client.broker(), symbol, details)
                .await
            {
                warn!("Failed to write audit event {}: {}", event_type, e);
            }
        }
    }

    /// Log cash and every open position
    pub async fn log_portfolio(&self) -> BrokerResult<Vec<Position>> {
        let account = self.client.get_account().await?;
        info!(
            "Account {} - Cash: ${:.2}, Buying power: ${:.2}",
            account.id, account.cash, account.buying_power
        );

        let positions = self.client.list_positions().await?;
        if positions.is_empty() {
            info!("No open positions");
        }
        for position in &positions {
            info!("Position - {}", position);
        }
        Ok(positions)
    }
}

/// Build the bot selected on the command line
pub fn build_bot(
    kind: BotKind,
    settings: &BotSettings,
    context: BotContext,
) -> Box<dyn TradingBot> {
    let store = StateStore::new(settings.state_file.clone());
    match kind {
        BotKind::SmaCrossover => Box::new(SmaCrossoverBot::new(context, settings, store)),
        BotKind::Allocator => Box::new(AllocatorBot::new(context, settings, store)),
        BotKind::ProfitGuard => Box::new(ProfitGuardBot::new(context, settings)),
        BotKind::Rebalance => Box::new(RebalanceBot::new(context, settings)),
        BotKind::PriceBand => Box::new(PriceBandBot::new(context, settings)),
    }
}

pub(crate) fn lifecycle_details(bot: &str) -> Value {
    json!({ "bot": bot })
}
