use crate::enums::TradeSide;
use crate::timestamp;
use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// `#[serde(rename_all = "camelCase")]` maps the backend's camelCase JSON to snake_case.

/// One row of the market price snapshot. The symbol is the unique key; the
/// order of quotes inside a snapshot is the display order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceQuote {
    pub symbol: String,
    pub name: String,
    pub price: Decimal,
    #[serde(rename = "change24h", default)]
    pub change_24h: Decimal,
    #[serde(rename = "change24hPercent", default)]
    pub change_24h_percent: Decimal,
    #[serde(rename = "volume24h", default)]
    pub volume_24h: Option<Decimal>,
    #[serde(rename = "high24h", default)]
    pub high_24h: Option<Decimal>,
    #[serde(rename = "low24h", default)]
    pub low_24h: Option<Decimal>,
    #[serde(default, deserialize_with = "timestamp::deserialize")]
    pub last_updated: Option<NaiveDateTime>,
}

/// A position in a single asset, as reported by the backend.
///
/// The backend is the only mutator. The valuation fields are computed by the
/// backend at request time and are only ever displayed, never recomputed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Holding {
    pub symbol: String,
    pub quantity: Decimal,
    pub avg_price: Decimal,
    pub total_invested: Decimal,
    #[serde(default)]
    pub current_price: Option<Decimal>,
    #[serde(default)]
    pub current_value: Option<Decimal>,
    #[serde(default)]
    pub pnl: Option<Decimal>,
    #[serde(default)]
    pub pnl_percent: Option<Decimal>,
    #[serde(default, deserialize_with = "timestamp::deserialize")]
    pub last_updated: Option<NaiveDateTime>,
}

/// The normalized account view. Every total is taken verbatim from the backend;
/// `total_value == balance + portfolio_value` is the backend's invariant, not ours.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Account {
    pub balance: Decimal,
    pub initial_balance: Option<Decimal>,
    pub portfolio_value: Decimal,
    pub total_value: Decimal,
    pub total_invested: Decimal,
    pub total_pnl: Decimal,
    pub total_pnl_percentage: Decimal,
    pub realized_pnl: Decimal,
    pub unrealized_pnl: Decimal,
    pub transaction_count: Option<u64>,
    /// Keyed by symbol, one entry per symbol.
    pub holdings: HashMap<String, Holding>,
}

impl Account {
    pub fn holding(&self, symbol: &str) -> Option<&Holding> {
        self.holdings.get(symbol)
    }
}

/// An entry of the append-only trade history.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Transaction {
    pub id: String,
    #[serde(rename = "type")]
    pub side: TradeSide,
    pub symbol: String,
    pub quantity: Decimal,
    pub price: Decimal,
    pub total: Decimal,
    pub timestamp: Option<NaiveDateTime>,
    pub status: Option<String>,
}

/// The body of `POST /simple-trading/trade`. The price is advisory; the
/// backend settles at whatever price it considers authoritative.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TradeRequest {
    pub symbol: String,
    #[serde(rename = "type")]
    pub side: TradeSide,
    #[serde(with = "rust_decimal::serde::float")]
    pub quantity: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
}

impl TradeRequest {
    /// Builds a request from the currently selected quote.
    pub fn from_quote(quote: &PriceQuote, side: TradeSide, quantity: Decimal) -> Self {
        Self {
            symbol: quote.symbol.clone(),
            side,
            quantity,
            price: quote.price,
        }
    }

    /// The client-side estimate of the trade value, used only when the backend
    /// does not report a settled total. `None` if the product overflows.
    pub fn notional(&self) -> Option<Decimal> {
        self.quantity.checked_mul(self.price)
    }
}

/// The trade record the backend returns once a trade has settled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettledTrade {
    pub symbol: String,
    #[serde(rename = "type")]
    pub side: TradeSide,
    pub quantity: Decimal,
    pub price: Decimal,
    #[serde(default)]
    pub total: Option<Decimal>,
    #[serde(default, deserialize_with = "timestamp::deserialize")]
    pub timestamp: Option<NaiveDateTime>,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageKind {
    Success,
    Error,
}

/// The transient inline feedback shown next to the trade panel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeMessage {
    pub kind: MessageKind,
    pub title: String,
    pub message: String,
}

impl TradeMessage {
    pub fn success(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: MessageKind::Success,
            title: title.into(),
            message: message.into(),
        }
    }

    pub fn error(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: MessageKind::Error,
            title: title.into(),
            message: message.into(),
        }
    }
}

/// What a single `execute` produced: the user-facing message and, on success,
/// the settled trade record.
#[derive(Debug, Clone, PartialEq)]
pub struct TradeOutcome {
    pub success: bool,
    pub message: TradeMessage,
    pub trade: Option<SettledTrade>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_price_quote_deserialize_numbers() {
        let json = r#"{
            "symbol": "BTC",
            "name": "Bitcoin",
            "price": 64250.5,
            "change24h": -120.25,
            "change24hPercent": -0.19,
            "volume24h": 1532.1,
            "lastUpdated": "2024-05-01T10:00:00"
        }"#;

        let quote: PriceQuote = serde_json::from_str(json).unwrap();
        assert_eq!(quote.symbol, "BTC");
        assert_eq!(quote.price, dec!(64250.5));
        assert_eq!(quote.change_24h, dec!(-120.25));
        assert_eq!(quote.high_24h, None);
        assert!(quote.last_updated.is_some());
    }

    #[test]
    fn test_price_quote_accepts_string_decimals() {
        let json = r#"{"symbol": "ETH", "name": "Ethereum", "price": "3100.10"}"#;
        let quote: PriceQuote = serde_json::from_str(json).unwrap();
        assert_eq!(quote.price, dec!(3100.10));
        assert_eq!(quote.change_24h_percent, Decimal::ZERO);
    }

    #[test]
    fn test_trade_request_wire_shape() {
        let quote = PriceQuote {
            symbol: "SOL".to_string(),
            name: "Solana".to_string(),
            price: dec!(100),
            change_24h: Decimal::ZERO,
            change_24h_percent: Decimal::ZERO,
            volume_24h: None,
            high_24h: None,
            low_24h: None,
            last_updated: None,
        };
        let request = TradeRequest::from_quote(&quote, TradeSide::Buy, dec!(2));
        assert_eq!(request.notional(), Some(dec!(200)));

        let value: serde_json::Value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["symbol"], "SOL");
        assert_eq!(value["type"], "BUY");
        assert_eq!(value["quantity"].as_f64(), Some(2.0));
        assert_eq!(value["price"].as_f64(), Some(100.0));
    }

    #[test]
    fn test_notional_overflow_is_none() {
        let request = TradeRequest {
            symbol: "BTC".to_string(),
            side: TradeSide::Buy,
            quantity: dec!(10000000000000000000000000),
            price: dec!(64000),
        };
        assert_eq!(request.notional(), None);
    }

    #[test]
    fn test_settled_trade_total_is_optional() {
        let json = r#"{"symbol": "BTC", "type": "SELL", "quantity": 0.5, "price": 60000}"#;
        let trade: SettledTrade = serde_json::from_str(json).unwrap();
        assert_eq!(trade.side, TradeSide::Sell);
        assert_eq!(trade.total, None);
    }
}
