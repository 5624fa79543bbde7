use crate::domain::entities::broker::TradingMode;
use crate::domain::services::strategies::PriceBand;
use crate::secrets::{load_secret, mask_key, ApiCredentials, SecretError};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use zeroize::Zeroizing;

pub const DEFAULT_LIVE_BASE_URL: &str = "https://api.alpaca.markets";
pub const DEFAULT_PAPER_BASE_URL: &str = "https://paper-api.alpaca.markets";
pub const DEFAULT_DATA_URL: &str = "https://data.alpaca.markets";
pub const DEFAULT_QUESTRADE_API_URL: &str = "https://api01.iq.questrade.com";
pub const DEFAULT_QUESTRADE_LOGIN_URL: &str = "https://login.questrade.com";
pub const DEFAULT_ALPACA_REQUESTS_PER_MINUTE: u32 = 180;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing credentials: {0} is not set")]
    MissingCredentials(String),

    #[error("Invalid value for {name}: {reason}")]
    Invalid { name: String, reason: String },

    #[error(transparent)]
    Secret(#[from] SecretError),
}

/// Process environment lookup used outside of tests
pub fn env_lookup(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

/// `TRADING_MODE`, paper unless explicitly `live`
pub fn trading_mode<F>(lookup: &F) -> TradingMode
where
    F: Fn(&str) -> Option<String>,
{
    match lookup("TRADING_MODE") {
        Some(raw) => {
            let mode = TradingMode::parse_lenient(&raw);
            if !raw.trim().eq_ignore_ascii_case(mode.label()) {
                tracing::warn!(
                    "Unknown TRADING_MODE '{}', using default: {}",
                    raw,
                    mode.label()
                );
            }
            mode
        }
        None => TradingMode::Paper,
    }
}

/// Name of a per-profile credential variable.
///
/// Live mode inserts `LIVE` after the profile prefix; paper mode uses the prefix
/// as-is. An empty prefix yields `LIVE_*` or `PAPER_*`.
pub fn profile_var(profile: &str, mode: TradingMode, suffix: &str) -> String {
    let prefix = profile.trim().to_uppercase();
    match (prefix.is_empty(), mode) {
        (true, TradingMode::Live) => format!("LIVE_{}", suffix),
        (true, TradingMode::Paper) => format!("PAPER_{}", suffix),
        (false, TradingMode::Live) => format!("{}_LIVE_{}", prefix, suffix),
        (false, TradingMode::Paper) => format!("{}_{}", prefix, suffix),
    }
}

/// Alpaca connection settings for one credential profile
#[derive(Debug, Clone)]
pub struct AlpacaSettings {
    pub mode: TradingMode,
    pub profile: String,
    pub credentials: ApiCredentials,
    pub base_url: String,
    pub data_url: String,
    pub requests_per_minute: u32,
}

impl AlpacaSettings {
    pub fn from_env(profile: &str) -> Result<Self, ConfigError> {
        Self::from_lookup(profile, &env_lookup)
    }

    pub fn from_lookup<F>(profile: &str, lookup: &F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mode = trading_mode(lookup);
        let key_var = profile_var(profile, mode, "API_KEY");
        let secret_var = profile_var(profile, mode, "SECRET_KEY");
        let url_var = profile_var(profile, mode, "BASE_URL");

        let key = load_secret(&key_var, lookup)
            .map_err(|_| ConfigError::MissingCredentials(key_var.clone()))?;
        let secret = load_secret(&secret_var, lookup)
            .map_err(|_| ConfigError::MissingCredentials(secret_var.clone()))?;
        let credentials = ApiCredentials::new(&key, &secret)?;

        let default_url = if mode.is_live() {
            DEFAULT_LIVE_BASE_URL
        } else {
            DEFAULT_PAPER_BASE_URL
        };
        let base_url = non_empty(lookup(&url_var)).unwrap_or_else(|| default_url.to_string());
        let data_url =
            non_empty(lookup("ALPACA_DATA_URL")).unwrap_or_else(|| DEFAULT_DATA_URL.to_string());

        let requests_per_minute = parse_or(
            lookup,
            "ALPACA_REQUESTS_PER_MINUTE",
            DEFAULT_ALPACA_REQUESTS_PER_MINUTE,
            |value| *value > 0,
        );

        tracing::info!(
            "Alpaca {} profile '{}' using key {} at {}",
            mode.label(),
            profile,
            credentials.masked_key(),
            base_url
        );

        Ok(AlpacaSettings {
            mode,
            profile: profile.to_string(),
            credentials,
            base_url: trim_slash(&base_url),
            data_url: trim_slash(&data_url),
            requests_per_minute,
        })
    }
}

/// Questrade OAuth and API endpoints
#[derive(Clone)]
pub struct QuestradeSettings {
    pub refresh_token: Option<Zeroizing<String>>,
    pub access_token: Option<Zeroizing<String>>,
    pub api_base_url: String,
    pub login_url: String,
    pub client_id: Option<String>,
    pub redirect_uri: Option<String>,
    pub token_file: PathBuf,
}

impl QuestradeSettings {
    pub fn from_env() -> Self {
        Self::from_lookup(&env_lookup)
    }

    pub fn from_lookup<F>(lookup: &F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        QuestradeSettings {
            refresh_token: load_secret("QUESTRADE_REFRESH_TOKEN", lookup).ok(),
            access_token: load_secret("QUESTRADE_ACCESS_TOKEN", lookup).ok(),
            api_base_url: trim_slash(
                &non_empty(lookup("QUESTRADE_API_BASE_URL"))
                    .unwrap_or_else(|| DEFAULT_QUESTRADE_API_URL.to_string()),
            ),
            login_url: trim_slash(
                &non_empty(lookup("QUESTRADE_LOGIN_URL"))
                    .unwrap_or_else(|| DEFAULT_QUESTRADE_LOGIN_URL.to_string()),
            ),
            client_id: non_empty(lookup("QUESTRADE_CLIENT_ID")),
            redirect_uri: non_empty(lookup("QUESTRADE_REDIRECT_URI")),
            token_file: non_empty(lookup("QUESTRADE_TOKEN_FILE"))
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("questrade_tokens.json")),
        }
    }

    /// The refresh token is mandatory for unattended trading
    pub fn require_refresh_token(&self) -> Result<&str, ConfigError> {
        self.refresh_token
            .as_deref()
            .map(String::as_str)
            .ok_or_else(|| ConfigError::MissingCredentials("QUESTRADE_REFRESH_TOKEN".to_string()))
    }

    pub fn require_oauth_client(&self) -> Result<(&str, &str), ConfigError> {
        let client_id = self
            .client_id
            .as_deref()
            .ok_or_else(|| ConfigError::MissingCredentials("QUESTRADE_CLIENT_ID".to_string()))?;
        let redirect_uri = self
            .redirect_uri
            .as_deref()
            .ok_or_else(|| ConfigError::MissingCredentials("QUESTRADE_REDIRECT_URI".to_string()))?;
        Ok((client_id, redirect_uri))
    }
}

impl fmt::Debug for QuestradeSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuestradeSettings")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|t| mask_key(t)),
            )
            .field(
                "access_token",
                &self.access_token.as_ref().map(|t| mask_key(t)),
            )
            .field("api_base_url", &self.api_base_url)
            .field("login_url", &self.login_url)
            .field("client_id", &self.client_id)
            .field("redirect_uri", &self.redirect_uri)
            .finish()
    }
}

/// Which bot `stockbot run` starts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BotKind {
    SmaCrossover,
    Allocator,
    ProfitGuard,
    Rebalance,
    PriceBand,
}

impl BotKind {
    pub fn name(&self) -> &'static str {
        match self {
            BotKind::SmaCrossover => "sma-crossover",
            BotKind::Allocator => "allocator",
            BotKind::ProfitGuard => "profit-guard",
            BotKind::Rebalance => "rebalance",
            BotKind::PriceBand => "price-band",
        }
    }
}

impl fmt::Display for BotKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for BotKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sma" | "sma-crossover" | "crossover" => Ok(BotKind::SmaCrossover),
            "allocator" | "allocate" => Ok(BotKind::Allocator),
            "profit-guard" | "tp-sl" => Ok(BotKind::ProfitGuard),
            "rebalance" => Ok(BotKind::Rebalance),
            "price-band" | "band" => Ok(BotKind::PriceBand),
            other => Err(format!(
                "unknown bot '{}' (expected sma-crossover, allocator, profit-guard, rebalance or price-band)",
                other
            )),
        }
    }
}

#[derive(Debug, Deserialize)]
struct BandLimits {
    low: f64,
    high: f64,
}

/// Tunables shared by the bots
#[derive(Debug, Clone)]
pub struct BotSettings {
    pub assets: Vec<String>,
    /// USD committed per asset by the crossover and allocator bots
    pub target_allocation: f64,
    pub check_interval: Duration,
    pub state_file: PathBuf,
    pub take_profit_pct: f64,
    pub stop_loss_pct: f64,
    /// USD per order for the rebalance and price-band bots
    pub trade_amount: f64,
    pub target_allocations: BTreeMap<String, f64>,
    pub price_bands: BTreeMap<String, PriceBand>,
    pub short_window: usize,
    pub long_window: usize,
    pub profit_target: f64,
    pub market_hours_only: bool,
}

impl Default for BotSettings {
    fn default() -> Self {
        BotSettings {
            assets: vec![
                "DOGE/USD".to_string(),
                "BCH/USD".to_string(),
                "USDT/USD".to_string(),
            ],
            target_allocation: 20.0,
            check_interval: Duration::from_secs(300),
            state_file: PathBuf::from("paper_state.json"),
            take_profit_pct: 10.0,
            stop_loss_pct: 5.0,
            trade_amount: 10.0,
            target_allocations: BTreeMap::new(),
            price_bands: default_price_bands(),
            short_window: 10,
            long_window: 50,
            profit_target: 1000.0,
            market_hours_only: false,
        }
    }
}

fn default_price_bands() -> BTreeMap<String, PriceBand> {
    [
        ("AAPL", 150.0, 200.0),
        ("AMZN", 3000.0, 3500.0),
        ("TSLA", 600.0, 800.0),
        ("GOOGL", 2500.0, 3000.0),
        ("MSFT", 200.0, 300.0),
    ]
    .into_iter()
    .map(|(symbol, low, high)| (symbol.to_string(), PriceBand::new(low, high)))
    .collect()
}

impl BotSettings {
    pub fn from_env() -> Self {
        Self::from_lookup(&env_lookup)
    }

    pub fn from_lookup<F>(lookup: &F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = BotSettings::default();

        if let Some(raw) = non_empty(lookup("ASSETS")) {
            let assets: Vec<String> = raw
                .split(',')
                .map(|s| s.trim().to_uppercase())
                .filter(|s| !s.is_empty())
                .collect();
            if assets.is_empty() {
                tracing::warn!("ASSETS is empty, using default: {:?}", config.assets);
            } else {
                config.assets = assets;
            }
        }

        config.target_allocation = parse_or(
            lookup,
            "TARGET_ALLOCATION",
            config.target_allocation,
            |v: &f64| *v > 0.0,
        );
        config.check_interval = Duration::from_secs(parse_or(
            lookup,
            "CHECK_INTERVAL_SECONDS",
            config.check_interval.as_secs(),
            |v: &u64| *v > 0,
        ));
        if let Some(path) = non_empty(lookup("STATE_FILE")) {
            config.state_file = PathBuf::from(path);
        }
        config.take_profit_pct = parse_or(
            lookup,
            "TAKE_PROFIT_PERCENT",
            config.take_profit_pct,
            |v: &f64| *v > 0.0,
        );
        config.stop_loss_pct = parse_or(
            lookup,
            "STOP_LOSS_PERCENT",
            config.stop_loss_pct,
            |v: &f64| *v > 0.0 && *v < 100.0,
        );
        config.trade_amount =
            parse_or(lookup, "TRADE_AMOUNT", config.trade_amount, |v: &f64| *v > 0.0);
        config.profit_target = parse_or(
            lookup,
            "PROFIT_TARGET",
            config.profit_target,
            |v: &f64| *v > 0.0,
        );
        config.short_window = parse_or(
            lookup,
            "SHORT_SMA_WINDOW",
            config.short_window,
            |v: &usize| *v > 0,
        );
        config.long_window = parse_or(
            lookup,
            "LONG_SMA_WINDOW",
            config.long_window,
            |v: &usize| *v > 0,
        );
        if config.short_window >= config.long_window {
            tracing::warn!(
                "SHORT_SMA_WINDOW ({}) must be below LONG_SMA_WINDOW ({}), using defaults: 10/50",
                config.short_window,
                config.long_window
            );
            config.short_window = 10;
            config.long_window = 50;
        }

        if let Some(raw) = lookup("MARKET_HOURS_ONLY") {
            config.market_hours_only = raw.to_lowercase() == "true" || raw == "1";
        }

        if let Some(raw) = non_empty(lookup("TARGET_ALLOCATIONS")) {
            config.target_allocations = parse_target_allocations(&raw);
        }

        if let Some(raw) = non_empty(lookup("TRADE_LIMITS")) {
            match serde_json::from_str::<BTreeMap<String, BandLimits>>(&raw) {
                Ok(limits) => {
                    config.price_bands = limits
                        .into_iter()
                        .filter(|(symbol, band)| {
                            let valid = band.low > 0.0 && band.low < band.high;
                            if !valid {
                                tracing::warn!(
                                    "Ignoring TRADE_LIMITS entry for {}: low {} must be positive and below high {}",
                                    symbol,
                                    band.low,
                                    band.high
                                );
                            }
                            valid
                        })
                        .map(|(symbol, band)| {
                            (symbol.to_uppercase(), PriceBand::new(band.low, band.high))
                        })
                        .collect();
                }
                Err(e) => {
                    tracing::warn!("Failed to parse TRADE_LIMITS: {}, using defaults", e);
                }
            }
        }

        config
    }
}

/// `TARGET_ALLOCATIONS` must be a JSON object of symbol to number
pub fn parse_target_allocations(raw: &str) -> BTreeMap<String, f64> {
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(serde_json::Value::Object(map)) => map
            .into_iter()
            .filter_map(|(symbol, value)| match value.as_f64() {
                Some(weight) => Some((symbol.to_uppercase(), weight)),
                None => {
                    tracing::warn!("Ignoring non-numeric allocation for {}: {}", symbol, value);
                    None
                }
            })
            .collect(),
        Ok(other) => {
            tracing::error!(
                "Failed to parse TARGET_ALLOCATIONS: must be a valid JSON object, got {}",
                other
            );
            BTreeMap::new()
        }
        Err(e) => {
            tracing::error!("Failed to parse TARGET_ALLOCATIONS: {}", e);
            BTreeMap::new()
        }
    }
}

fn parse_or<T, F, V>(lookup: &F, name: &str, default: T, valid: V) -> T
where
    T: FromStr + fmt::Display,
    T::Err: fmt::Display,
    F: Fn(&str) -> Option<String>,
    V: Fn(&T) -> bool,
{
    let Some(raw) = non_empty(lookup(name)) else {
        return default;
    };
    match raw.parse::<T>() {
        Ok(value) if valid(&value) => value,
        Ok(value) => {
            tracing::warn!("Invalid {} value: {}, using default: {}", name, value, default);
            default
        }
        Err(e) => {
            tracing::warn!(
                "Failed to parse {} '{}': {}, using default: {}",
                name,
                raw,
                e,
                default
            );
            default
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn trim_slash(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_profile_var_names() {
        assert_eq!(profile_var("", TradingMode::Paper, "API_KEY"), "PAPER_API_KEY");
        assert_eq!(profile_var("", TradingMode::Live, "API_KEY"), "LIVE_API_KEY");
        assert_eq!(
            profile_var("lionheart1", TradingMode::Live, "SECRET_KEY"),
            "LIONHEART1_LIVE_SECRET_KEY"
        );
        assert_eq!(
            profile_var("LIONHEART", TradingMode::Paper, "BASE_URL"),
            "LIONHEART_BASE_URL"
        );
    }

    #[test]
    fn test_alpaca_paper_defaults() {
        let lookup = lookup_from(&[
            ("PAPER_API_KEY", "PKTEST1234"),
            ("PAPER_SECRET_KEY", "secret"),
        ]);
        let settings = AlpacaSettings::from_lookup("", &lookup).unwrap();
        assert_eq!(settings.mode, TradingMode::Paper);
        assert_eq!(settings.base_url, DEFAULT_PAPER_BASE_URL);
        assert_eq!(settings.data_url, DEFAULT_DATA_URL);
        assert_eq!(settings.credentials.key_id(), "PKTEST1234");
        assert_eq!(settings.requests_per_minute, 180);
    }

    #[test]
    fn test_alpaca_live_profile() {
        let lookup = lookup_from(&[
            ("TRADING_MODE", "LIVE"),
            ("LIONHEART_LIVE_API_KEY", "AKLIVE"),
            ("LIONHEART_LIVE_SECRET_KEY", "s3cret"),
            ("LIONHEART_LIVE_BASE_URL", "https://example.test/"),
        ]);
        let settings = AlpacaSettings::from_lookup("lionheart", &lookup).unwrap();
        assert!(settings.mode.is_live());
        assert_eq!(settings.base_url, "https://example.test");
    }

    #[test]
    fn test_alpaca_missing_secret_names_variable() {
        let lookup = lookup_from(&[("PAPER_API_KEY", "PK")]);
        match AlpacaSettings::from_lookup("", &lookup) {
            Err(ConfigError::MissingCredentials(name)) => assert_eq!(name, "PAPER_SECRET_KEY"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_trading_mode_is_paper() {
        let lookup = lookup_from(&[("TRADING_MODE", "sandbox")]);
        assert_eq!(trading_mode(&lookup), TradingMode::Paper);
    }

    #[test]
    fn test_bot_settings_defaults() {
        let settings = BotSettings::from_lookup(&lookup_from(&[]));
        assert_eq!(settings.assets, vec!["DOGE/USD", "BCH/USD", "USDT/USD"]);
        assert_eq!(settings.target_allocation, 20.0);
        assert_eq!(settings.check_interval, Duration::from_secs(300));
        assert_eq!(settings.price_bands.len(), 5);
        assert_eq!(settings.price_bands["AAPL"], PriceBand::new(150.0, 200.0));
    }

    #[test]
    fn test_bot_settings_invalid_values_fall_back() {
        let lookup = lookup_from(&[
            ("ASSETS", "aapl, msft ,"),
            ("TARGET_ALLOCATION", "-5"),
            ("CHECK_INTERVAL_SECONDS", "abc"),
            ("TAKE_PROFIT_PERCENT", "12.5"),
            ("SHORT_SMA_WINDOW", "60"),
        ]);
        let settings = BotSettings::from_lookup(&lookup);
        assert_eq!(settings.assets, vec!["AAPL", "MSFT"]);
        assert_eq!(settings.target_allocation, 20.0);
        assert_eq!(settings.check_interval, Duration::from_secs(300));
        assert_eq!(settings.take_profit_pct, 12.5);
        assert_eq!(settings.short_window, 10);
        assert_eq!(settings.long_window, 50);
    }

    #[test]
    fn test_target_allocations_must_be_object() {
        let parsed = parse_target_allocations(r#"{"aapl": 10, "BTC/USD": 5.5, "bad": "x"}"#);
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed["AAPL"], 10.0);
        assert_eq!(parsed["BTC/USD"], 5.5);

        assert!(parse_target_allocations("[1, 2]").is_empty());
        assert!(parse_target_allocations("{not json").is_empty());
    }

    #[test]
    fn test_trade_limits_override() {
        let lookup = lookup_from(&[(
            "TRADE_LIMITS",
            r#"{"nvda": {"low": 100, "high": 140}, "BAD": {"low": 5, "high": 1}}"#,
        )]);
        let settings = BotSettings::from_lookup(&lookup);
        assert_eq!(settings.price_bands.len(), 1);
        assert_eq!(settings.price_bands["NVDA"], PriceBand::new(100.0, 140.0));
    }

    #[test]
    fn test_bot_kind_from_str() {
        assert_eq!("sma".parse::<BotKind>().unwrap(), BotKind::SmaCrossover);
        assert_eq!("Price-Band".parse::<BotKind>().unwrap(), BotKind::PriceBand);
        assert!("scalper".parse::<BotKind>().is_err());
    }

    #[test]
    fn test_questrade_settings_debug_masks_tokens() {
        let lookup = lookup_from(&[
            ("QUESTRADE_REFRESH_TOKEN", "refreshtokenvalue"),
            ("QUESTRADE_API_BASE_URL", "https://api05.iq.questrade.com/"),
        ]);
        let settings = QuestradeSettings::from_lookup(&lookup);
        assert_eq!(settings.require_refresh_token().unwrap(), "refreshtokenvalue");
        assert_eq!(settings.api_base_url, "https://api05.iq.questrade.com");
        let debug = format!("{:?}", settings);
        assert!(!debug.contains("refreshtokenvalue"));
        assert!(debug.contains("refr***"));
        assert!(settings.require_oauth_client().is_err());
    }
}
