//! Persistence Layer
//!
//! Two stores live here:
//!
//! - the bot **state file** (`state`): a small pretty-printed JSON document that
//!   remembers what each bot bought, so a restart can pick up or flatten positions;
//! - the **trade journal**: SQLite via sqlx, an append-only record of every order a
//!   bot submitted plus an audit log of notable events.
//!
//! # Database Schema
//!
//! ## Trades Table
//! - id: Autoincrement
//! - broker: "alpaca" or "questrade"
//! - symbol: Ticker or crypto pair
//! - side: "buy" or "sell"
//! - quantity: Real
//! - price: Real, reference price when the order was sent
//! - order_id: Broker order id
//! - strategy: Bot that submitted the order
//! - executed_at: Timestamp
//!
//! ## Audit Log Table
//! - id: Autoincrement
//! - event_type: Event type (bot_started, order_failed, ...)
//! - broker: Broker name
//! - symbol: Optional symbol
//! - details: JSON details
//! - timestamp: Timestamp

pub mod models;
pub mod repository;
pub mod state;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use tracing::info;

pub const DEFAULT_DATABASE_URL: &str = "sqlite://data/stockbot.db";

/// Database connection pool
pub type DbPool = SqlitePool;

#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Database connection error: {0}")]
    ConnectionError(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    MigrationError(String),

    #[error("Query error: {0}")]
    QueryError(String),
}

/// Open (creating if needed) the journal database and run migrations
pub async fn init_database(database_url: &str) -> Result<DbPool, DatabaseError> {
    init_database_with(&DatabaseConfig {
        url: database_url.to_string(),
        ..DatabaseConfig::default()
    })
    .await
}

pub async fn init_database_with(config: &DatabaseConfig) -> Result<DbPool, DatabaseError> {
    info!("Initializing database: {}", config.url);

    if let Some(db_path) = config.url.strip_prefix("sqlite://") {
        if let Some(parent) = Path::new(db_path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    DatabaseError::ConnectionError(sqlx::Error::Configuration(Box::new(e)))
                })?;
            }
        }
    }

    let options = SqliteConnectOptions::from_str(&config.url)?.create_if_missing(true);

    // every connection to `:memory:` opens its own database
    let max_connections = if config.url.contains(":memory:") {
        1
    } else {
        config.max_connections
    };

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await?;

    run_migrations(&pool).await?;

    info!("✓ Database initialized successfully");

    Ok(pool)
}

async fn run_migrations(pool: &DbPool) -> Result<(), DatabaseError> {
    info!("Running database migrations...");

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS trades (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            broker TEXT NOT NULL,
            symbol TEXT NOT NULL,
            side TEXT NOT NULL CHECK(side IN ('buy', 'sell')),
            quantity REAL NOT NULL,
            price REAL,
            order_id TEXT,
            strategy TEXT NOT NULL,
            executed_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| DatabaseError::MigrationError(format!("Failed to create trades table: {}", e)))?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS audit_log (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_type TEXT NOT NULL,
            broker TEXT NOT NULL,
            symbol TEXT,
            details TEXT NOT NULL,
            timestamp DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| {
        DatabaseError::MigrationError(format!("Failed to create audit_log table: {}", e))
    })?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_trades_symbol ON trades(symbol)")
        .execute(pool)
        .await
        .map_err(|e| DatabaseError::MigrationError(format!("Failed to create index: {}", e)))?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_trades_executed_at ON trades(executed_at)")
        .execute(pool)
        .await
        .map_err(|e| DatabaseError::MigrationError(format!("Failed to create index: {}", e)))?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_audit_timestamp ON audit_log(timestamp)")
        .execute(pool)
        .await
        .map_err(|e| DatabaseError::MigrationError(format!("Failed to create index: {}", e)))?;

    info!("✓ Database migrations completed successfully");

    Ok(())
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Database URL (e.g., "sqlite://data/stockbot.db")
    pub url: String,

    /// Maximum number of connections in the pool
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_DATABASE_URL.to_string(),
            max_connections: 5,
        }
    }
}

impl DatabaseConfig {
    pub fn from_env() -> Self {
        let url =
            std::env::var("DATABASE_URL").unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string());

        let max_connections = std::env::var("DATABASE_MAX_CONNECTIONS")
            .ok()
            .and_then(|s| s.parse().ok())
            .filter(|n| *n > 0)
            .unwrap_or(5);

        Self {
            url,
            max_connections,
        }
    }
}
