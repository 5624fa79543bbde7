//! In-memory broker for bot unit tests

use crate::domain::entities::account::Account;
use crate::domain::entities::asset::{same_symbol, Asset, AssetClass};
use crate::domain::entities::bar::Bar;
use crate::domain::entities::broker::Broker;
use crate::domain::entities::order::Order;
use crate::domain::entities::position::Position;
use crate::domain::repositories::broker_client::{BrokerClient, BrokerError, BrokerResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

pub(crate) struct MockBroker {
    account: Mutex<Account>,
    positions: Mutex<Vec<Position>>,
    prices: Mutex<HashMap<String, f64>>,
    closes: Mutex<HashMap<String, Vec<f64>>>,
    assets: Mutex<Vec<Asset>>,
    failing: Mutex<HashSet<String>>,
    orders: Mutex<Vec<Order>>,
    closed: Mutex<Vec<String>>,
}

impl MockBroker {
    pub fn new(cash: f64) -> Self {
        Self {
            account: Mutex::new(Account {
                id: "mock-account".to_string(),
                status: "ACTIVE".to_string(),
                cash,
                equity: cash,
                buying_power: cash,
            }),
            positions: Mutex::new(Vec::new()),
            prices: Mutex::new(HashMap::new()),
            closes: Mutex::new(HashMap::new()),
            assets: Mutex::new(Vec::new()),
            failing: Mutex::new(HashSet::new()),
            orders: Mutex::new(Vec::new()),
            closed: Mutex::new(Vec::new()),
        }
    }

    pub fn with_price(self, symbol: &str, price: f64) -> Self {
        self.prices.lock().unwrap().insert(symbol.to_string(), price);
        self
    }

    pub fn with_closes(self, symbol: &str, closes: Vec<f64>) -> Self {
        self.closes.lock().unwrap().insert(symbol.to_string(), closes);
        self
    }

    pub fn with_position(self, position: Position) -> Self {
        self.positions.lock().unwrap().push(position);
        self
    }

    pub fn with_tradable(self, symbols: &[&str]) -> Self {
        self.assets.lock().unwrap().extend(symbols.iter().map(|symbol| Asset {
            symbol: symbol.to_string(),
            tradable: true,
            class: AssetClass::of(symbol),
        }));
        self
    }

    pub fn failing_orders_for(self, symbol: &str) -> Self {
        self.failing.lock().unwrap().insert(symbol.to_string());
        self
    }

    pub fn set_price(&self, symbol: &str, price: f64) {
        self.prices.lock().unwrap().insert(symbol.to_string(), price);
    }

    pub fn set_closes(&self, symbol: &str, closes: Vec<f64>) {
        self.closes.lock().unwrap().insert(symbol.to_string(), closes);
    }

    pub fn orders(&self) -> Vec<Order> {
        self.orders.lock().unwrap().clone()
    }

    pub fn closed(&self) -> Vec<String> {
        self.closed.lock().unwrap().clone()
    }
}

#[async_trait]
impl BrokerClient for MockBroker {
    fn name(&self) -> &str {
        "Mock"
    }

    fn broker(&self) -> Broker {
        Broker::Alpaca
    }

    async fn get_account(&self) -> BrokerResult<Account> {
        Ok(self.account.lock().unwrap().clone())
    }

    async fn list_positions(&self) -> BrokerResult<Vec<Position>> {
        Ok(self.positions.lock().unwrap().clone())
    }

    async fn get_position(&self, symbol: &str) -> BrokerResult<Option<Position>> {
        Ok(self
            .positions
            .lock()
            .unwrap()
            .iter()
            .find(|p| same_symbol(&p.symbol, symbol))
            .cloned())
    }

    async fn submit_order(&self, order: &Order) -> BrokerResult<String> {
        if self.failing.lock().unwrap().contains(&order.symbol) {
            return Err(BrokerError::Api {
                status: 422,
                body: "order rejected".to_string(),
            });
        }
        let mut orders = self.orders.lock().unwrap();
        orders.push(order.clone());
        Ok(format!("mock-{}", orders.len()))
    }

    async fn close_position(&self, symbol: &str) -> BrokerResult<()> {
        let mut positions = self.positions.lock().unwrap();
        let before = positions.len();
        positions.retain(|p| !same_symbol(&p.symbol, symbol));
        if positions.len() == before {
            return Err(BrokerError::NotFound(format!("position {}", symbol)));
        }
        self.closed.lock().unwrap().push(symbol.to_string());
        Ok(())
    }

    async fn latest_price(&self, symbol: &str) -> BrokerResult<f64> {
        self.prices
            .lock()
            .unwrap()
            .get(symbol)
            .copied()
            .ok_or_else(|| BrokerError::NoPrice(symbol.to_string()))
    }

    async fn bars(
        &self,
        symbol: &str,
        start: DateTime<Utc>,
        _end: DateTime<Utc>,
    ) -> BrokerResult<Vec<Bar>> {
        let closes = self.closes.lock().unwrap();
        Ok(closes
            .get(symbol)
            .map(|series| {
                series
                    .iter()
                    .enumerate()
                    .map(|(i, close)| Bar {
                        timestamp: start + chrono::Duration::minutes(i as i64),
                        open: *close,
                        high: *close,
                        low: *close,
                        close: *close,
                        volume: 1.0,
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn list_tradable_assets(&self) -> BrokerResult<Vec<Asset>> {
        Ok(self.assets.lock().unwrap().clone())
    }
}

/// `n` prices rising (or falling) by `step` from `start`
pub(crate) fn trend(start: f64, step: f64, n: usize) -> Vec<f64> {
    (0..n).map(|i| start + step * i as f64).collect()
}
