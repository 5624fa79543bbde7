pub mod price;
pub mod quantity;

/// Round `value` to `decimals` decimal places
pub fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::round_to;

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(0.123456, 4), 0.1235);
        assert_eq!(round_to(2.0, 4), 2.0);
        assert_eq!(round_to(1.23449, 2), 1.23);
    }
}
