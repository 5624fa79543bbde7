//! StockTradingBot Library
//!
//! Automated trading strategies against the Alpaca and Questrade brokerage
//! APIs: broker clients, strategy bots, the bot loop and account tools.

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod persistence;
pub mod rate_limit;
pub mod secrets;
pub mod task_runner;
