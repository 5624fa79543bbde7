//! Database Models
//!
//! Rows of the trade journal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Trade record in database
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TradeRecord {
    pub id: i64,
    pub broker: String,
    pub symbol: String,
    pub side: String, // "buy" or "sell"
    pub quantity: f64,
    pub price: Option<f64>,
    pub order_id: Option<String>,
    pub strategy: String,
    pub executed_at: DateTime<Utc>,
}

/// Audit log record in database
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AuditLogRecord {
    pub id: i64,
    pub event_type: String,
    pub broker: String,
    pub symbol: Option<String>,
    pub details: String, // JSON string
    pub timestamp: DateTime<Utc>,
}

/// Create trade input
#[derive(Debug, Clone)]
pub struct CreateTrade {
    pub broker: String,
    pub symbol: String,
    pub side: String,
    pub quantity: f64,
    pub price: Option<f64>,
    pub order_id: Option<String>,
    pub strategy: String,
}

/// Create audit log input
#[derive(Debug, Clone)]
pub struct CreateAuditLog {
    pub event_type: String,
    pub broker: String,
    pub symbol: Option<String>,
    pub details: serde_json::Value,
}
