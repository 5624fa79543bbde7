//! Bot loop
//!
//! Drives a `TradingBot`: start hook, then cycle / sleep until the bot asks to
//! stop or a shutdown signal arrives. A failed cycle never ends the loop on its
//! own; the circuit breaker spaces out retries and gives up after too many
//! failures in a row.
//!
//! The shutdown future is polled from the very start, so signal handlers are
//! armed before the start hook runs. A signal that arrives while the start hook
//! or a cycle is running lets that step finish, then stops the bot.

use crate::application::bots::TradingBot;
use crate::application::BotError;
use crate::domain::services::market_hours::MarketClock;
use crate::task_runner::{CircuitBreaker, CircuitBreakerConfig};
use chrono::Utc;
use std::future::Future;
use std::pin::Pin;
use tracing::{error, info};

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The bot reported `stop_requested`
    Completed { cycles: u64 },
    /// Ctrl+C or SIGTERM
    Interrupted { cycles: u64 },
}

pub async fn run_bot<S>(
    bot: &mut dyn TradingBot,
    clock: &MarketClock,
    breaker_config: CircuitBreakerConfig,
    shutdown: S,
) -> Result<RunOutcome, BotError>
where
    S: Future<Output = ()>,
{
    tokio::pin!(shutdown);
    let mut signalled = false;
    let mut breaker = CircuitBreaker::new(bot.name(), breaker_config);
    let mut cycles: u64 = 0;

    watch_shutdown(bot.on_start(), shutdown.as_mut(), &mut signalled).await?;
    info!("{} started", bot.name());
    if signalled {
        return interrupt(bot, cycles).await;
    }

    loop {
        let result =
            watch_shutdown(bot.run_cycle(Utc::now()), shutdown.as_mut(), &mut signalled).await;
        let delay = match result {
            Ok(report) => {
                breaker.record_success();
                cycles += 1;
                info!(
                    "Cycle {} done: {} orders submitted, {} failed, {} skipped",
                    cycles, report.orders_submitted, report.orders_failed, report.skipped
                );
                if report.stop_requested {
                    info!("{} finished after {} cycles", bot.name(), cycles);
                    return Ok(RunOutcome::Completed { cycles });
                }
                bot.interval(clock, Utc::now())
            }
            Err(e) => match breaker.record_failure(&e.to_string()) {
                Ok(delay) => delay,
                Err(open) => {
                    error!("{} giving up: {}", bot.name(), open);
                    if let Err(e) = bot.on_stop().await {
                        error!("Shutdown hook failed: {}", e);
                    }
                    return Err(open.into());
                }
            },
        };

        if signalled {
            return interrupt(bot, cycles).await;
        }

        info!("Sleeping for {} seconds.", delay.as_secs());
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shutdown.as_mut() => return interrupt(bot, cycles).await,
        }
    }
}

/// Run `work` to completion while polling `shutdown`
///
/// Shutdown is polled first and never cancels `work`; it only sets `signalled`.
async fn watch_shutdown<W, S>(
    work: W,
    mut shutdown: Pin<&mut S>,
    signalled: &mut bool,
) -> W::Output
where
    W: Future,
    S: Future<Output = ()>,
{
    tokio::pin!(work);
    loop {
        tokio::select! {
            biased;
            _ = shutdown.as_mut(), if !*signalled => *signalled = true,
            output = &mut work => return output,
        }
    }
}

async fn interrupt(bot: &mut dyn TradingBot, cycles: u64) -> Result<RunOutcome, BotError> {
    info!("{} received shutdown signal", bot.name());
    bot.on_stop().await?;
    info!("{} stopped", bot.name());
    Ok(RunOutcome::Interrupted { cycles })
}

/// Resolves on Ctrl+C, or SIGTERM on unix
pub async fn shutdown_signal() {
    let ctrl_c = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C signal"),
            Err(e) => error!("Failed to install Ctrl+C handler: {}", e),
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
                info!("Received SIGTERM signal");
            }
            Err(e) => error!("Failed to install SIGTERM handler: {}", e),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
