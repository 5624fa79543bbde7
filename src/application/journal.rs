//! Trade journal
//!
//! Records every order a bot submits, plus lifecycle events (start, stop,
//! exits) in the audit log.

use crate::domain::entities::broker::Broker;
use crate::domain::entities::order::Order;
use crate::persistence::models::{CreateAuditLog, CreateTrade, TradeRecord};
use crate::persistence::repository::{AuditRepository, TradeRepository};
use crate::persistence::{DatabaseError, DbPool};
use serde_json::Value;

#[derive(Clone)]
pub struct TradeJournal {
    trades: TradeRepository,
    audit: AuditRepository,
}

impl TradeJournal {
    pub fn new(pool: DbPool) -> Self {
        Self {
            trades: TradeRepository::new(pool.clone()),
            audit: AuditRepository::new(pool),
        }
    }

    pub fn trades(&self) -> &TradeRepository {
        &self.trades
    }

    pub fn audit(&self) -> &AuditRepository {
        &self.audit
    }

    pub async fn record_order(
        &self,
        broker: Broker,
        strategy: &str,
        order: &Order,
        order_id: &str,
        price: Option<f64>,
    ) -> Result<TradeRecord, DatabaseError> {
        self.trades
            .record(CreateTrade {
                broker: broker.name().to_string(),
                symbol: order.symbol.clone(),
                side: order.side.as_str().to_string(),
                quantity: order.quantity.value(),
                price,
                order_id: Some(order_id.to_string()),
                strategy: strategy.to_string(),
            })
            .await
    }

    pub async fn log_event(
        &self,
        event_type: &str,
        broker: Broker,
        symbol: Option<&str>,
        details: Value,
    ) -> Result<(), DatabaseError> {
        self.audit
            .log(CreateAuditLog {
                event_type: event_type.to_string(),
                broker: broker.name().to_string(),
                symbol: symbol.map(str::to_string),
                details,
            })
            .await?;
        Ok(())
    }
}
