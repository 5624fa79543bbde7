pub mod indicators;
pub mod market_hours;
pub mod strategies;
