use chrono::NaiveDateTime;
use core_types::timestamp;
use core_types::{Holding, SettledTrade, TradeSide};
use rust_decimal::Decimal;
use serde::Deserialize;

// The backend wraps most payloads in a `{ "success": bool, ... }` envelope.
// Only the fields the desk consumes are modelled here.

/// The account as `GET /simple-trading/account` reports it, with holdings
/// still in list form.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountPayload {
    pub balance: Decimal,
    #[serde(default)]
    pub initial_balance: Option<Decimal>,
    #[serde(default)]
    pub portfolio_value: Decimal,
    #[serde(default)]
    pub total_value: Decimal,
    #[serde(default)]
    pub total_invested: Decimal,
    #[serde(rename = "totalPnL", default)]
    pub total_pnl: Decimal,
    #[serde(rename = "totalPnLPercentage", default)]
    pub total_pnl_percentage: Decimal,
    #[serde(rename = "realizedPnL", default)]
    pub realized_pnl: Decimal,
    #[serde(rename = "unrealizedPnL", default)]
    pub unrealized_pnl: Decimal,
    #[serde(default)]
    pub transaction_count: Option<u64>,
    /// `null` and a missing field both mean "no holdings".
    #[serde(default)]
    pub portfolio: Option<Vec<Holding>>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct AccountEnvelope {
    pub account: AccountPayload,
}

/// One record of `GET /simple-trading/transactions`. The backend does not
/// currently send an id; when it does, it may be a number or a string.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TransactionPayload {
    #[serde(default)]
    pub id: Option<serde_json::Value>,
    pub symbol: String,
    #[serde(rename = "type")]
    pub side: TradeSide,
    pub quantity: Decimal,
    pub price: Decimal,
    pub total: Decimal,
    #[serde(default, deserialize_with = "timestamp::deserialize")]
    pub timestamp: Option<NaiveDateTime>,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct TransactionsEnvelope {
    #[serde(default)]
    pub transactions: Vec<TransactionPayload>,
}

/// The response of `POST /simple-trading/trade`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TradeResponse {
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub trade: Option<SettledTrade>,
}

/// The response of `POST /simple-trading/account/reset`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ResetResponse {
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Represents an error body from the backend.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiErrorResponse {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl ApiErrorResponse {
    /// `error` wins over `message`; blank strings count as absent.
    pub fn reason(&self) -> Option<String> {
        [&self.error, &self.message]
            .into_iter()
            .flatten()
            .find(|s| !s.trim().is_empty())
            .cloned()
    }
}

/// Implemented by envelopes that can report `success: false` inside a 2xx response.
pub(crate) trait Envelope {
    fn failure_reason(&self) -> Option<String>;
}

impl Envelope for TradeResponse {
    fn failure_reason(&self) -> Option<String> {
        failure(self.success, &self.error, &self.message)
    }
}

impl Envelope for ResetResponse {
    fn failure_reason(&self) -> Option<String> {
        failure(self.success, &self.error, &self.message)
    }
}

fn failure(
    success: Option<bool>,
    error: &Option<String>,
    message: &Option<String>,
) -> Option<String> {
    if success != Some(false) {
        return None;
    }
    let body = ApiErrorResponse {
        error: error.clone(),
        message: message.clone(),
    };
    Some(body.reason().unwrap_or_else(|| "The backend rejected the request".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_account_payload_reads_backend_field_names() {
        let json = r#"{
            "success": true,
            "account": {
                "balance": 9800.0,
                "initialBalance": 10000,
                "portfolioValue": 210.5,
                "totalValue": 10010.5,
                "totalPnL": 10.5,
                "totalPnLPercentage": 0.105,
                "totalInvested": 10000,
                "realizedPnL": 0,
                "unrealizedPnL": 10.5,
                "transactionCount": 1,
                "portfolio": [
                    {"symbol": "SOL", "quantity": 2, "avgPrice": 100, "totalInvested": 200,
                     "currentPrice": 105.25}
                ]
            }
        }"#;
        let envelope: AccountEnvelope = serde_json::from_str(json).unwrap();
        let account = envelope.account;
        assert_eq!(account.total_pnl, dec!(10.5));
        assert_eq!(account.unrealized_pnl, dec!(10.5));
        assert_eq!(account.transaction_count, Some(1));
        let holdings = account.portfolio.unwrap();
        assert_eq!(holdings[0].current_price, Some(dec!(105.25)));
    }

    #[test]
    fn test_null_portfolio_is_accepted() {
        let json = r#"{"account": {"balance": 10000, "portfolio": null}}"#;
        let envelope: AccountEnvelope = serde_json::from_str(json).unwrap();
        assert_eq!(envelope.account.portfolio, None);
    }

    #[test]
    fn test_error_reason_prefers_error_over_message() {
        let json = r#"{"success": false, "error": "Insufficient balance", "message": "x"}"#;
        let body: ApiErrorResponse = serde_json::from_str(json).unwrap();
        assert_eq!(body.reason().as_deref(), Some("Insufficient balance"));

        let body: ApiErrorResponse =
            serde_json::from_str(r#"{"message": "Validation failed"}"#).unwrap();
        assert_eq!(body.reason().as_deref(), Some("Validation failed"));

        let body: ApiErrorResponse = serde_json::from_str(r#"{"error": "  "}"#).unwrap();
        assert_eq!(body.reason(), None);
    }

    #[test]
    fn test_success_false_inside_ok_response_is_a_failure() {
        let json = r#"{"success": true, "message": "BUY trade completed successfully"}"#;
        let ok: TradeResponse = serde_json::from_str(json).unwrap();
        assert_eq!(ok.failure_reason(), None);

        let rejected: ResetResponse =
            serde_json::from_str(r#"{"success": false, "error": "locked"}"#).unwrap();
        assert_eq!(rejected.failure_reason().as_deref(), Some("locked"));
    }
}
