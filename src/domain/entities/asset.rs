//! Asset classification and symbol forms
//!
//! Crypto pairs show up in two spellings across the brokers' endpoints:
//! `DOGE/USD` (market data, asset listing) and `DOGEUSD` (positions). Equities
//! are plain tickers.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssetClass {
    Crypto,
    Equity,
}

impl AssetClass {
    /// Classify a configured symbol
    pub fn of(symbol: &str) -> Self {
        let symbol = symbol.trim().to_uppercase();
        if symbol.contains('/') {
            return AssetClass::Crypto;
        }
        if symbol.len() > 4 && (symbol.ends_with("USD") || symbol.ends_with("USDT")) {
            return AssetClass::Crypto;
        }
        AssetClass::Equity
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Asset {
    pub symbol: String,
    pub tradable: bool,
    pub class: AssetClass,
}

/// `DOGE/USD` -> `DOGEUSD`
pub fn strip_pair_separator(symbol: &str) -> String {
    symbol.replace('/', "")
}

/// `LTCUSD` -> `LTC/USD`. Symbols that already carry a separator, and equities,
/// are returned unchanged.
pub fn to_pair_symbol(symbol: &str) -> String {
    if symbol.contains('/') || AssetClass::of(symbol) == AssetClass::Equity {
        return symbol.to_string();
    }
    for quote in ["USD", "USDT"] {
        if let Some(base) = symbol.strip_suffix(quote) {
            if !base.is_empty() {
                return format!("{}/{}", base, quote);
            }
        }
    }
    symbol.to_string()
}

/// Compare symbols ignoring case and pair separators
pub fn same_symbol(a: &str, b: &str) -> bool {
    strip_pair_separator(a).eq_ignore_ascii_case(&strip_pair_separator(b))
}
