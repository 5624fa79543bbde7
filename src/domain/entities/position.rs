/// Open position as reported by the broker
#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub symbol: String,
    pub qty: f64,
    pub avg_entry_price: f64,
    pub current_price: Option<f64>,
    pub market_value: Option<f64>,
    pub unrealized_pnl: Option<f64>,
}

impl Position {
    pub fn new(symbol: &str, qty: f64, avg_entry_price: f64) -> Self {
        Position {
            symbol: symbol.to_string(),
            qty,
            avg_entry_price,
            current_price: None,
            market_value: None,
            unrealized_pnl: None,
        }
    }

    /// Broker-reported P&L, or one derived from the current price
    pub fn open_pnl(&self) -> Option<f64> {
        self.unrealized_pnl.or_else(|| {
            self.current_price
                .map(|current| (current - self.avg_entry_price) * self.qty)
        })
    }

    pub fn value(&self) -> Option<f64> {
        self.market_value
            .or_else(|| self.current_price.map(|current| current * self.qty))
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: {} units at ${}",
            self.symbol, self.qty, self.avg_entry_price
        )?;
        if let Some(value) = self.value() {
            write!(f, ", Value: ${:.2}", value)?;
        }
        Ok(())
    }
}
