use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The direction of a trade. Always upper-cased on the wire (`BUY` / `SELL`),
/// but accepted in any case when parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE", try_from = "String")]
pub enum TradeSide {
    Buy,
    Sell,
}

impl TradeSide {
    /// The upper-cased form the backend expects in a trade request.
    pub fn as_wire(&self) -> &'static str {
        match self {
            TradeSide::Buy => "BUY",
            TradeSide::Sell => "SELL",
        }
    }

    /// Lower-case verb, e.g. for "Successfully buy 2 BTC".
    pub fn verb(&self) -> &'static str {
        match self {
            TradeSide::Buy => "buy",
            TradeSide::Sell => "sell",
        }
    }

    pub fn past_tense(&self) -> &'static str {
        match self {
            TradeSide::Buy => "Bought",
            TradeSide::Sell => "Sold",
        }
    }
}

impl fmt::Display for TradeSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_wire())
    }
}

impl FromStr for TradeSide {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "BUY" => Ok(TradeSide::Buy),
            "SELL" => Ok(TradeSide::Sell),
            other => Err(CoreError::InvalidInput("trade side".to_string(), other.to_string())),
        }
    }
}

impl TryFrom<String> for TradeSide {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// The fixed set of named views the desk can show. Presentation dispatches on
/// this exhaustively instead of comparing free-form strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum View {
    #[default]
    Market,
    Trade,
    Portfolio,
    History,
}

impl View {
    pub const ALL: [View; 4] = [View::Market, View::Trade, View::Portfolio, View::History];

    pub fn name(&self) -> &'static str {
        match self {
            View::Market => "market",
            View::Trade => "trade",
            View::Portfolio => "portfolio",
            View::History => "history",
        }
    }
}

impl fmt::Display for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for View {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        View::ALL
            .into_iter()
            .find(|v| v.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| CoreError::InvalidInput("view".to_string(), s.to_string()))
    }
}
