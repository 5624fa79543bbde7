use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Invalid price: {0}")]
    InvalidPrice(String),

    #[error("Invalid quantity: {0}")]
    InvalidQuantity(String),

    #[error("Invalid symbol: {0}")]
    InvalidSymbol(String),

    #[error("Invalid order: {0}")]
    InvalidOrder(String),

    #[error("Value must be non-negative")]
    MustBeNonNegative,

    #[error("Value must be finite")]
    MustBeFinite,
}

impl From<ValidationError> for String {
    fn from(error: ValidationError) -> Self {
        error.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_display() {
        assert_eq!(
            ValidationError::InvalidSymbol("".to_string()).to_string(),
            "Invalid symbol: "
        );
        assert_eq!(
            ValidationError::MustBeNonNegative.to_string(),
            "Value must be non-negative"
        );
    }

    #[test]
    fn test_validation_error_into_string() {
        let message: String = ValidationError::MustBeFinite.into();
        assert_eq!(message, "Value must be finite");
    }
}
