use super::round_to;
use crate::domain::errors::ValidationError;

/// Fractional quantities are rounded to this many decimals before submission
pub const QUANTITY_DECIMALS: u32 = 4;

#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Quantity(f64);

impl Quantity {
    pub fn new(value: f64) -> Result<Self, ValidationError> {
        if !value.is_finite() {
            return Err(ValidationError::MustBeFinite);
        }
        if value >= 0.0 {
            Ok(Quantity(value))
        } else {
            Err(ValidationError::InvalidQuantity(
                "Quantity must be non-negative".to_string(),
            ))
        }
    }

    /// Units of an asset worth `amount` at `price`, rounded to four decimals
    pub fn from_notional(amount: f64, price: f64) -> Result<Self, ValidationError> {
        if !price.is_finite() || price <= 0.0 {
            return Err(ValidationError::InvalidPrice(format!(
                "cannot size an order at price {}",
                price
            )));
        }
        if !amount.is_finite() || amount < 0.0 {
            return Err(ValidationError::InvalidQuantity(format!(
                "notional amount {} is not a valid allocation",
                amount
            )));
        }
        Quantity::new(round_to(amount / price, QUANTITY_DECIMALS))
    }

    pub fn value(&self) -> f64 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0.0
    }

    pub fn notional(&self, price: f64) -> f64 {
        self.0 * price
    }
}

impl std::fmt::Display for Quantity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
