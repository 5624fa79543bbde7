use clap::{Parser, Subcommand};
use std::fs::OpenOptions;
use std::io::Write;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use stockbot::application::bots::{build_bot, BotContext};
use stockbot::application::journal::TradeJournal;
use stockbot::application::runner::{run_bot, shutdown_signal};
use stockbot::application::tools::{self, is_confirmed, ToolError};
use stockbot::config::{self, AlpacaSettings, BotKind, BotSettings, QuestradeSettings};
use stockbot::domain::entities::broker::Broker;
use stockbot::domain::services::market_hours::MarketClock;
use stockbot::infrastructure::alpaca_client::AlpacaClient;
use stockbot::infrastructure::broker_client_factory::BrokerClientFactory;
use stockbot::infrastructure::oauth_callback::{CallbackServer, QuestradeCodeExchanger};
use stockbot::infrastructure::questrade_client::{authorize_url, QuestradeClient};
use stockbot::persistence::state::merge_into_state_file;
use stockbot::persistence::{init_database_with, DatabaseConfig};
use stockbot::secrets::mask_key;
use stockbot::task_runner::CircuitBreakerConfig;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_SYMBOL: &str = "USDTUSD";

/// Stock and crypto trading bots for Alpaca and Questrade
#[derive(Parser)]
#[command(name = "stockbot")]
#[command(version)]
struct Cli {
    /// Credential profile: env var prefix such as PAPER, LIONHEART or LIONHEART1
    #[arg(long, global = true, env = "ALPACA_PROFILE", default_value = "")]
    profile: String,

    /// Brokerage to talk to
    #[arg(long, global = true, env = "BROKER", default_value = "alpaca")]
    broker: Broker,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a trading bot until Ctrl+C
    Run {
        /// sma-crossover, allocator, profit-guard, rebalance or price-band
        bot: BotKind,

        /// Overrides STATE_FILE
        #[arg(long)]
        state_file: Option<PathBuf>,

        /// Do not record orders in the trade journal database
        #[arg(long)]
        no_journal: bool,
    },
    /// Sell an entire position with a market order
    Liquidate {
        #[arg(env = "DEFAULT_SYMBOL", default_value = DEFAULT_SYMBOL)]
        symbol: String,
    },
    /// Close a position through the broker's close-position endpoint
    Close {
        #[arg(env = "DEFAULT_SYMBOL", default_value = DEFAULT_SYMBOL)]
        symbol: String,
    },
    /// Withdraw crypto to an external wallet (Alpaca)
    Withdraw {
        #[arg(long, default_value = "USDT")]
        currency: String,

        #[arg(long)]
        qty: f64,

        /// Deposit address; prompted for when omitted
        #[arg(long)]
        address: Option<String>,
    },
    /// Check which symbols the account can trade
    Tradability {
        /// Defaults to ASSETS
        symbols: Vec<String>,
    },
    /// Verify credentials and print the account summary
    Check,
    /// Run the Questrade OAuth authorization-code flow
    Authorize {
        #[arg(long, env = "QUESTRADE_CALLBACK_ADDR", default_value = "127.0.0.1:8080")]
        listen: SocketAddr,
    },
    /// Check the Questrade tokens and refresh them
    TokenCheck,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    if let Err(e) = dotenvy::dotenv() {
        eprintln!("Could not load .env file ({}), using the process environment", e);
    }
    init_tracing()?;

    let cli = Cli::parse();
    let mode = config::trading_mode(&config::env_lookup);
    info!("Running in {} mode.", mode.label());

    match cli.command {
        Commands::Run {
            bot,
            state_file,
            no_journal,
        } => run(cli.broker, &cli.profile, bot, state_file, no_journal).await,
        Commands::Liquidate { symbol } => {
            let client = BrokerClientFactory::create(cli.broker, &cli.profile)?;
            if mode.is_live() {
                println!("\n### WARNING: You are about to liquidate a LIVE position ###");
            }
            finish(tools::liquidate_position(client.as_ref(), &symbol, prompt_confirmation).await)
        }
        Commands::Close { symbol } => {
            let client = BrokerClientFactory::create(cli.broker, &cli.profile)?;
            finish(tools::close_position(client.as_ref(), &symbol, prompt_confirmation).await)
        }
        Commands::Withdraw {
            currency,
            qty,
            address,
        } => {
            let settings = AlpacaSettings::from_env(&cli.profile)?;
            let alpaca = AlpacaClient::new(&settings);
            let address = match address {
                Some(address) => address,
                None => prompt(&format!("Enter your {} deposit address: ", currency))?,
            };
            let result =
                tools::withdraw(&alpaca, &currency, qty, &address, prompt_confirmation).await;
            if let Ok(response) = &result {
                println!("Response: {}", response);
            }
            finish(result)
        }
        Commands::Tradability { symbols } => {
            let client = BrokerClientFactory::create(cli.broker, &cli.profile)?;
            let symbols = if symbols.is_empty() {
                BotSettings::from_env().assets
            } else {
                symbols
            };
            for entry in tools::check_tradability(client.as_ref(), &symbols).await? {
                println!(
                    "{}: {}",
                    entry.symbol,
                    if entry.tradable { "tradable" } else { "NOT tradable" }
                );
            }
            Ok(())
        }
        Commands::Check => {
            if cli.broker == Broker::Alpaca {
                let settings = AlpacaSettings::from_env(&cli.profile)?;
                println!(
                    "Using API Key: {}, Trading Mode: {}",
                    settings.credentials.masked_key(),
                    settings.mode.label()
                );
            }
            let client = BrokerClientFactory::create(cli.broker, &cli.profile)?;
            let summary = tools::check_connection(client.as_ref()).await?;
            println!("{}", summary);
            Ok(())
        }
        Commands::Authorize { listen } => authorize(listen).await,
        Commands::TokenCheck => token_check().await,
    }
}

fn init_tracing() -> std::io::Result<()> {
    let file_layer = match std::env::var("LOG_FILE") {
        Ok(path) if !path.trim().is_empty() => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_writer(Arc::new(file)),
            )
        }
        _ => None,
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "stockbot=info".into()))
        .with(fmt::layer())
        .with(file_layer)
        .init();
    Ok(())
}

async fn run(
    broker: Broker,
    profile: &str,
    kind: BotKind,
    state_file: Option<PathBuf>,
    no_journal: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut settings = BotSettings::from_env();
    if let Some(path) = state_file {
        settings.state_file = path;
    }

    let client = BrokerClientFactory::create(broker, profile)?;
    let mut context = BotContext::new(client);
    if no_journal {
        info!("Trade journal disabled");
    } else {
        let db_config = DatabaseConfig::from_env();
        let pool = init_database_with(&db_config).await?;
        info!("Trade journal at {}", db_config.url);
        context = context.with_journal(TradeJournal::new(pool));
    }

    let mut bot = build_bot(kind, &settings, context);
    let outcome = run_bot(
        bot.as_mut(),
        &MarketClock::default(),
        CircuitBreakerConfig::default(),
        shutdown_signal(),
    )
    .await?;
    info!("Bot exited: {:?}", outcome);
    Ok(())
}

async fn authorize(listen: SocketAddr) -> Result<(), Box<dyn std::error::Error>> {
    let settings = QuestradeSettings::from_env();
    let (client_id, redirect_uri) = settings.require_oauth_client()?;
    let url = authorize_url(&settings.login_url, client_id, redirect_uri)?;

    let exchanger = QuestradeCodeExchanger {
        http: reqwest::Client::new(),
        login_url: settings.login_url.clone(),
        client_id: client_id.to_string(),
        redirect_uri: redirect_uri.to_string(),
    };
    let server = CallbackServer::bind(listen, Arc::new(exchanger)).await?;
    info!("Waiting for the OAuth callback on {}", server.local_addr()?);
    println!("Open this URL in your browser to authorize the app:\n{}", url);

    let tokens = server.wait_for_tokens().await?;
    merge_into_state_file(&settings.token_file, tokens.to_json_map())?;
    info!(
        "Tokens saved to {} (access token {})",
        settings.token_file.display(),
        mask_key(&tokens.access_token)
    );
    Ok(())
}

async fn token_check() -> Result<(), Box<dyn std::error::Error>> {
    let settings = QuestradeSettings::from_env();
    match &settings.access_token {
        Some(token) => info!("QUESTRADE_ACCESS_TOKEN loaded successfully ({})", mask_key(token)),
        None => warn!("Failed to load QUESTRADE_ACCESS_TOKEN. Check your .env file."),
    }
    settings.require_refresh_token()?;

    let client = QuestradeClient::new(&settings);
    match client.refresh_access_token().await {
        Ok(tokens) => {
            merge_into_state_file(&settings.token_file, tokens.to_json_map())?;
            println!(
                "Token refresh OK, API server {}. Tokens saved to {}",
                tokens.api_server,
                settings.token_file.display()
            );
            Ok(())
        }
        Err(e) => {
            error!("Error refreshing access token: {}", e);
            Err(e.into())
        }
    }
}

/// Treat a user refusal as a clean exit
fn finish<T>(result: Result<T, ToolError>) -> Result<(), Box<dyn std::error::Error>> {
    match result {
        Ok(_) => Ok(()),
        Err(ToolError::Aborted) => {
            println!("Operation canceled by user.");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

fn prompt(message: &str) -> std::io::Result<String> {
    print!("{}", message);
    std::io::stdout().flush()?;
    let mut line = String::new();
    std::io::stdin().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

fn prompt_confirmation(message: &str) -> bool {
    match prompt(message) {
        Ok(answer) => is_confirmed(&answer),
        Err(e) => {
            error!("Failed to read confirmation: {}", e);
            false
        }
    }
}
