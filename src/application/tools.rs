//! One-off account operations behind the CLI's utility subcommands
//!
//! Anything that sells or moves funds asks for confirmation through a
//! caller-supplied closure, so the CLI can prompt on stdin and tests can answer
//! directly.

use crate::domain::entities::asset::same_symbol;
use crate::domain::entities::order::{Order, OrderSide, TimeInForce};
use crate::domain::errors::ValidationError;
use crate::domain::repositories::broker_client::{BrokerClient, BrokerError};
use crate::domain::value_objects::quantity::Quantity;
use crate::infrastructure::alpaca_client::AlpacaClient;
use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};

pub const CONFIRMATION_WORD: &str = "CONFIRM";

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("No open position found for {0}")]
    NoPosition(String),

    #[error("No quantity available to liquidate for {0}")]
    NothingToSell(String),

    #[error("Operation canceled by user")]
    Aborted,

    #[error(transparent)]
    Broker(#[from] BrokerError),

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// `confirm`, `CONFIRM` and ` Confirm ` all count
pub fn is_confirmed(input: &str) -> bool {
    input.trim().eq_ignore_ascii_case(CONFIRMATION_WORD)
}

/// Sell the whole position in `symbol` with a GTC market order
///
/// `confirm` receives the prompt to show and returns whether the user agreed.
pub async fn liquidate_position<F>(
    client: &dyn BrokerClient,
    symbol: &str,
    confirm: F,
) -> Result<String, ToolError>
where
    F: FnOnce(&str) -> bool,
{
    let position = client
        .get_position(symbol)
        .await?
        .ok_or_else(|| ToolError::NoPosition(symbol.to_string()))?;
    info!("Position Details: {}", position);

    if position.qty <= 0.0 {
        return Err(ToolError::NothingToSell(symbol.to_string()));
    }

    let prompt = format!(
        "Type '{}' to sell {} of {}: ",
        CONFIRMATION_WORD, position.qty, symbol
    );
    if !confirm(&prompt) {
        info!("Position liquidation aborted by user.");
        return Err(ToolError::Aborted);
    }

    let order = Order::market(
        symbol,
        OrderSide::Sell,
        Quantity::new(position.qty)?,
        TimeInForce::Gtc,
    )?;
    let order_id = client.submit_order(&order).await.map_err(|e| {
        if matches!(e, BrokerError::Forbidden { .. }) {
            warn!("403 Forbidden: Ensure permissions and platform rules are correct.");
        }
        e
    })?;
    info!("Position successfully liquidated (order {})", order_id);
    Ok(order_id)
}

/// Close `symbol` through the broker's close-position endpoint
pub async fn close_position<F>(
    client: &dyn BrokerClient,
    symbol: &str,
    confirm: F,
) -> Result<(), ToolError>
where
    F: FnOnce(&str) -> bool,
{
    let prompt = format!(
        "Are you sure you want to CLOSE the position for {}? Type '{}' to proceed: ",
        symbol, CONFIRMATION_WORD
    );
    if !confirm(&prompt) {
        info!("Operation canceled by user.");
        return Err(ToolError::Aborted);
    }

    info!("Attempting to close position for {}...", symbol);
    match client.close_position(symbol).await {
        Ok(()) => {
            info!("Position for {} successfully closed.", symbol);
            Ok(())
        }
        Err(BrokerError::NotFound(_)) => {
            warn!("Position for {} not found or already closed.", symbol);
            Err(ToolError::NoPosition(symbol.to_string()))
        }
        Err(e) => {
            if e.is_regional_restriction() {
                warn!(
                    "{} is restricted for EU accounts. Consider converting it to another asset or transferring funds to another platform.",
                    symbol
                );
            }
            Err(e.into())
        }
    }
}

/// Move `qty` of `currency` to an external wallet
pub async fn withdraw<F>(
    alpaca: &AlpacaClient,
    currency: &str,
    qty: f64,
    address: &str,
    confirm: F,
) -> Result<Value, ToolError>
where
    F: FnOnce(&str) -> bool,
{
    info!("Checking if crypto-to-crypto conversion is supported...");
    match alpaca.check_crypto_conversion().await {
        Ok(true) => info!("Crypto conversion is supported."),
        Ok(false) => warn!("Crypto conversion not supported."),
        Err(e) => warn!("Error checking conversion support: {}", e),
    }

    let prompt = format!(
        "Withdraw {} {} to {}? Type '{}' to proceed: ",
        qty, currency, address, CONFIRMATION_WORD
    );
    if !confirm(&prompt) {
        return Err(ToolError::Aborted);
    }

    info!("Withdrawing {} {} to {}...", qty, currency, address);
    let response = alpaca.withdraw_crypto(currency, qty, address).await?;
    info!("Successfully withdrew {} {} to {}.", qty, currency, address);
    Ok(response)
}

#[derive(Debug, Clone, PartialEq)]
pub struct Tradability {
    pub symbol: String,
    pub tradable: bool,
}

/// Check each symbol against the broker's active, tradable asset list
pub async fn check_tradability(
    client: &dyn BrokerClient,
    symbols: &[String],
) -> Result<Vec<Tradability>, ToolError> {
    let assets = client.list_tradable_assets().await?;
    info!("Successfully connected to {}.", client.name());

    Ok(symbols
        .iter()
        .map(|symbol| {
            let tradable = assets.iter().any(|asset| same_symbol(&asset.symbol, symbol));
            if tradable {
                info!("{} is tradable", symbol);
            } else {
                warn!("{} is not tradable", symbol);
            }
            Tradability {
                symbol: symbol.clone(),
                tradable,
            }
        })
        .collect())
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionSummary {
    pub client: String,
    pub account_id: String,
    pub status: String,
    pub cash: f64,
}

impl std::fmt::Display for ConnectionSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Connected successfully to {}: Account ID: {}, Status: {}, Cash Balance: {:.2}",
            self.client, self.account_id, self.status, self.cash
        )
    }
}

pub async fn check_connection(client: &dyn BrokerClient) -> Result<ConnectionSummary, ToolError> {
    let account = client.get_account().await?;
    let summary = ConnectionSummary {
        client: client.name().to_string(),
        account_id: account.id,
        status: account.status,
        cash: account.cash,
    };
    info!("{}", summary);
    Ok(summary)
}
