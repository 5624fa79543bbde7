//! Database Repository
//!
//! Data access for the trade journal and audit log.

use super::models::*;
use super::{DatabaseError, DbPool};
use chrono::Utc;
use tracing::{debug, error};

/// Trade repository
#[derive(Clone)]
pub struct TradeRepository {
    pool: DbPool,
}

impl TradeRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Append a submitted order to the journal
    pub async fn record(&self, trade: CreateTrade) -> Result<TradeRecord, DatabaseError> {
        let now = Utc::now();
        let record = sqlx::query_as::<_, TradeRecord>(
            r#"
            INSERT INTO trades (broker, symbol, side, quantity, price, order_id, strategy, executed_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            RETURNING *
            "#,
        )
        .bind(&trade.broker)
        .bind(&trade.symbol)
        .bind(&trade.side)
        .bind(trade.quantity)
        .bind(trade.price)
        .bind(&trade.order_id)
        .bind(&trade.strategy)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to record trade: {}", e);
            DatabaseError::QueryError(format!("Failed to record trade: {}", e))
        })?;

        debug!("Recorded trade {} for {}", record.id, record.symbol);
        Ok(record)
    }

    /// Most recent trades first
    pub async fn recent(&self, limit: i64) -> Result<Vec<TradeRecord>, DatabaseError> {
        let records = sqlx::query_as::<_, TradeRecord>(
            "SELECT * FROM trades ORDER BY executed_at DESC, id DESC LIMIT ?1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to get recent trades: {}", e);
            DatabaseError::QueryError(format!("Failed to get recent trades: {}", e))
        })?;

        Ok(records)
    }

    pub async fn count_by_symbol(&self, symbol: &str) -> Result<i64, DatabaseError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM trades WHERE symbol = ?1")
            .bind(symbol)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                error!("Failed to count trades for {}: {}", symbol, e);
                DatabaseError::QueryError(format!("Failed to count trades: {}", e))
            })?;

        Ok(count)
    }
}

/// Audit log repository
#[derive(Clone)]
pub struct AuditRepository {
    pool: DbPool,
}

impl AuditRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn log(&self, entry: CreateAuditLog) -> Result<AuditLogRecord, DatabaseError> {
        let now = Utc::now();
        let details_json = serde_json::to_string(&entry.details)
            .map_err(|e| DatabaseError::QueryError(format!("Failed to serialize details: {}", e)))?;

        let record = sqlx::query_as::<_, AuditLogRecord>(
            r#"
            INSERT INTO audit_log (event_type, broker, symbol, details, timestamp)
            VALUES (?1, ?2, ?3, ?4, ?5)
            RETURNING *
            "#,
        )
        .bind(&entry.event_type)
        .bind(&entry.broker)
        .bind(&entry.symbol)
        .bind(&details_json)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to create audit log: {}", e);
            DatabaseError::QueryError(format!("Failed to create audit log: {}", e))
        })?;

        debug!("Created audit log: {} for {}", record.event_type, record.broker);
        Ok(record)
    }

    pub async fn recent(&self, limit: i64) -> Result<Vec<AuditLogRecord>, DatabaseError> {
        let records = sqlx::query_as::<_, AuditLogRecord>(
            "SELECT * FROM audit_log ORDER BY timestamp DESC, id DESC LIMIT ?1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to get recent audit logs: {}", e);
            DatabaseError::QueryError(format!("Failed to get audit logs: {}", e))
        })?;

        Ok(records)
    }
}
