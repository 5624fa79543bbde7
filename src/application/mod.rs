//! Bots, the loop that drives them and the one-off account tools

pub mod bots;
pub mod journal;
pub mod runner;
pub mod tools;

use crate::config::ConfigError;
use crate::domain::errors::ValidationError;
use crate::domain::repositories::broker_client::BrokerError;
use crate::persistence::state::StateError;
use crate::persistence::DatabaseError;
use crate::task_runner::TaskError;
use thiserror::Error;

/// Top-level error for bot runs and CLI commands
#[derive(Debug, Error)]
pub enum BotError {
    #[error(transparent)]
    Broker(#[from] BrokerError),

    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Trade journal error: {0}")]
    Journal(#[from] DatabaseError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Task(#[from] TaskError),
}
