use crate::domain::errors::ValidationError;
use crate::domain::value_objects::{price::Price, quantity::Quantity};
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "buy",
            OrderSide::Sell => "sell",
        }
    }
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "BUY"),
            OrderSide::Sell => write!(f, "SELL"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderType {
    Market,
    Limit,
}

impl OrderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderType::Market => "market",
            OrderType::Limit => "limit",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeInForce {
    Day,
    /// Good 'til cancelled
    Gtc,
    /// Immediate or cancel
    Ioc,
}

impl TimeInForce {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeInForce::Day => "day",
            TimeInForce::Gtc => "gtc",
            TimeInForce::Ioc => "ioc",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Order {
    pub client_order_id: String,
    pub symbol: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub time_in_force: TimeInForce,
    pub quantity: Quantity,
    pub limit_price: Option<Price>,
}

impl Order {
    pub fn new(
        symbol: &str,
        side: OrderSide,
        order_type: OrderType,
        time_in_force: TimeInForce,
        quantity: Quantity,
        limit_price: Option<f64>,
    ) -> Result<Self, ValidationError> {
        let symbol = symbol.trim();
        if symbol.is_empty() {
            return Err(ValidationError::InvalidSymbol(
                "symbol must not be empty".to_string(),
            ));
        }
        if quantity.is_zero() {
            return Err(ValidationError::InvalidQuantity(format!(
                "order quantity for {} rounds to zero",
                symbol
            )));
        }
        let limit_price = limit_price.map(Price::new).transpose()?;

        if order_type == OrderType::Limit && limit_price.is_none() {
            return Err(ValidationError::InvalidOrder(
                "Limit orders must have a price".to_string(),
            ));
        }

        Ok(Order {
            client_order_id: generate_client_order_id(),
            symbol: symbol.to_string(),
            side,
            order_type,
            time_in_force,
            quantity,
            limit_price,
        })
    }

    pub fn market(
        symbol: &str,
        side: OrderSide,
        quantity: Quantity,
        time_in_force: TimeInForce,
    ) -> Result<Self, ValidationError> {
        Self::new(symbol, side, OrderType::Market, time_in_force, quantity, None)
    }

    /// Notional value at `price`
    pub fn notional(&self, price: f64) -> f64 {
        self.quantity.notional(price)
    }
}

fn generate_client_order_id() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    format!("stockbot-{}-{:08x}", millis, rand::random::<u32>())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn qty(value: f64) -> Quantity {
        Quantity::new(value).unwrap()
    }

    #[test]
    fn test_market_order() {
        let order = Order::market("DOGE/USD", OrderSide::Buy, qty(66.6667), TimeInForce::Gtc)
            .unwrap();
        assert_eq!(order.symbol, "DOGE/USD");
        assert_eq!(order.side.as_str(), "buy");
        assert_eq!(order.order_type.as_str(), "market");
        assert_eq!(order.time_in_force.as_str(), "gtc");
        assert!(order.limit_price.is_none());
        assert!(order.client_order_id.starts_with("stockbot-"));
    }

    #[test]
    fn test_limit_order_requires_price() {
        let result = Order::new(
            "AAPL",
            OrderSide::Buy,
            OrderType::Limit,
            TimeInForce::Day,
            qty(1.0),
            None,
        );
        assert_eq!(
            result.unwrap_err(),
            ValidationError::InvalidOrder("Limit orders must have a price".to_string())
        );

        let order = Order::new(
            "AAPL",
            OrderSide::Sell,
            OrderType::Limit,
            TimeInForce::Day,
            qty(1.0),
            Some(190.5),
        )
        .unwrap();
        assert_eq!(order.limit_price.unwrap().value(), 190.5);
    }

    #[test]
    fn test_order_rejects_zero_quantity_and_empty_symbol() {
        assert!(Order::market("AAPL", OrderSide::Buy, qty(0.0), TimeInForce::Day).is_err());
        assert!(Order::market("  ", OrderSide::Buy, qty(1.0), TimeInForce::Day).is_err());
    }

    #[test]
    fn test_client_order_ids_are_unique() {
        let a = Order::market("AAPL", OrderSide::Buy, qty(1.0), TimeInForce::Day).unwrap();
        let b = Order::market("AAPL", OrderSide::Buy, qty(1.0), TimeInForce::Day).unwrap();
        assert_ne!(a.client_order_id, b.client_order_id);
    }

    #[test]
    fn test_side_display() {
        assert_eq!(OrderSide::Buy.to_string(), "BUY");
        assert_eq!(OrderSide::Sell.to_string(), "SELL");
    }
}
