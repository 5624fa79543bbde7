//! Broker Client Trait
//!
//! `BrokerClient` is the seam between the trading bots and a concrete brokerage
//! REST API. Bots only ever hold an `Arc<dyn BrokerClient>`, which lets the same
//! strategy code run against Alpaca, Questrade or an in-memory mock in tests.

use crate::domain::entities::{
    account::Account,
    asset::Asset,
    bar::{closes, Bar},
    broker::Broker,
    order::Order,
    position::Position,
};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

/// Common result type for broker operations
pub type BrokerResult<T> = Result<T, BrokerError>;

/// Errors that can occur while talking to a broker
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {body}")]
    Forbidden { body: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Failed to decode response: {0}")]
    Decode(String),

    #[error("Invalid order: {0}")]
    InvalidOrder(String),

    #[error("No price available for {0}")]
    NoPrice(String),

    #[error("Operation not supported by {0}")]
    Unsupported(String),

    #[error("Token refresh failed: {0}")]
    TokenRefresh(String),
}

impl BrokerError {
    /// Alpaca refuses some crypto pairs (USDT) for EU tax residents with a 403
    pub fn is_regional_restriction(&self) -> bool {
        matches!(self, BrokerError::Forbidden { body } if body.contains("EU tax resident"))
    }
}

/// Brokerage operations used by the bots and tools
#[async_trait]
pub trait BrokerClient: Send + Sync {
    /// Human-readable client name for logs
    fn name(&self) -> &str;

    fn broker(&self) -> Broker;

    async fn get_account(&self) -> BrokerResult<Account>;

    async fn list_positions(&self) -> BrokerResult<Vec<Position>>;

    /// Position for one symbol, `None` when nothing is held
    async fn get_position(&self, symbol: &str) -> BrokerResult<Option<Position>>;

    /// Submit an order and return the broker-assigned order id
    async fn submit_order(&self, order: &Order) -> BrokerResult<String>;

    /// Flatten the whole position in `symbol`
    async fn close_position(&self, symbol: &str) -> BrokerResult<()>;

    /// Last traded price for `symbol`
    async fn latest_price(&self, symbol: &str) -> BrokerResult<f64>;

    /// One-minute bars between `start` and `end`
    async fn bars(
        &self,
        symbol: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> BrokerResult<Vec<Bar>>;

    /// Closing prices of the one-minute bars covering the last `lookback`
    async fn closing_prices(&self, symbol: &str, lookback: Duration) -> BrokerResult<Vec<f64>> {
        let end = Utc::now();
        let bars = self.bars(symbol, end - lookback, end).await?;
        Ok(closes(&bars))
    }

    /// Active assets the account is allowed to trade
    async fn list_tradable_assets(&self) -> BrokerResult<Vec<Asset>>;

    async fn is_healthy(&self) -> bool {
        self.get_account().await.is_ok()
    }
}
