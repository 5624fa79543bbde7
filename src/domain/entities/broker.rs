use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Broker {
    Alpaca,
    Questrade,
}

impl Broker {
    pub fn name(&self) -> &'static str {
        match self {
            Broker::Alpaca => "alpaca",
            Broker::Questrade => "questrade",
        }
    }
}

impl std::fmt::Display for Broker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Broker {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "alpaca" => Ok(Broker::Alpaca),
            "questrade" => Ok(Broker::Questrade),
            other => Err(format!(
                "Unknown broker '{}'. Must be 'alpaca' or 'questrade'",
                other
            )),
        }
    }
}

/// Paper accounts trade against a simulated ledger; live accounts move real money.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TradingMode {
    #[default]
    Paper,
    Live,
}

impl TradingMode {
    /// Anything other than `live` (case-insensitive) runs in paper mode.
    pub fn parse_lenient(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("live") {
            TradingMode::Live
        } else {
            TradingMode::Paper
        }
    }

    pub fn is_live(&self) -> bool {
        matches!(self, TradingMode::Live)
    }

    pub fn label(&self) -> &'static str {
        match self {
            TradingMode::Paper => "PAPER",
            TradingMode::Live => "LIVE",
        }
    }
}
