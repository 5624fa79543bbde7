use crate::domain::errors::ValidationError;

#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Price(f64);

impl Price {
    pub fn new(value: f64) -> Result<Self, ValidationError> {
        if !value.is_finite() {
            return Err(ValidationError::MustBeFinite);
        }
        if value >= 0.0 {
            Ok(Price(value))
        } else {
            Err(ValidationError::InvalidPrice(
                "Price must be non-negative".to_string(),
            ))
        }
    }

    pub fn value(&self) -> f64 {
        self.0
    }

    pub fn multiply(&self, factor: f64) -> Result<Price, ValidationError> {
        if !factor.is_finite() {
            return Err(ValidationError::MustBeFinite);
        }
        Price::new(self.0 * factor)
    }
}

impl std::fmt::Display for Price {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "${:.2}", self.0)
    }
}
