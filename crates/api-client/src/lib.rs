use crate::error::ApiError;
use crate::responses::{AccountEnvelope, Envelope, TransactionsEnvelope};
use async_trait::async_trait;
use configuration::BackendConfig;
use core_types::{PriceQuote, TradeRequest};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::de::DeserializeOwned;
use std::time::Duration;
use url::Url;

pub mod error;
pub mod live_connector;
pub mod responses;
// --- Public API ---
pub use live_connector::{LiveConnector, PriceStream, SseDecoder};
pub use responses::{
    AccountPayload, ApiErrorResponse, ResetResponse, TradeResponse, TransactionPayload,
};

/// The abstract interface to the trading backend.
/// The desk only ever talks to the backend through this trait, so the live
/// implementation can be swapped for an in-memory one in tests.
#[async_trait]
pub trait ApiClient: Send + Sync {
    /// Fetches the full current price snapshot.
    async fn get_prices(&self) -> Result<Vec<PriceQuote>, ApiError>;

    /// Fetches the current quote for one symbol.
    async fn get_price(&self, symbol: &str) -> Result<PriceQuote, ApiError>;

    /// Opens the push feed of price snapshots.
    async fn open_price_stream(&self) -> Result<PriceStream, ApiError>;

    /// Fetches the account with its holdings in list form.
    async fn get_account(&self) -> Result<AccountPayload, ApiError>;

    /// Submits a trade. An error carries the backend's reason.
    async fn execute_trade(&self, request: &TradeRequest) -> Result<TradeResponse, ApiError>;

    /// Restores the account to its initial state.
    async fn reset_account(&self) -> Result<ResetResponse, ApiError>;

    /// Fetches the full transaction history, in backend order.
    async fn get_transactions(&self) -> Result<Vec<TransactionPayload>, ApiError>;
}

/// Appends `path` to the REST root, keeping the root's own path segments.
pub(crate) fn endpoint(base: &Url, path: &str) -> Result<Url, ApiError> {
    let mut base = base.clone();
    if !base.path().ends_with('/') {
        let with_slash = format!("{}/", base.path());
        base.set_path(&with_slash);
    }
    Ok(base.join(path.trim_start_matches('/'))?)
}

/// The HTTP implementation of `ApiClient` for the simulated trading backend.
#[derive(Clone)]
pub struct BackendClient {
    client: reqwest::Client,
    base_url: Url,
    timeout: Duration,
}

impl BackendClient {
    pub fn new(config: &BackendConfig) -> Result<Self, ApiError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        // No client-wide timeout: it would also cut the long-lived price stream.
        // REST calls get a per-request timeout instead.
        let client = reqwest::Client::builder()
            .default_headers(headers)
            .connect_timeout(config.request_timeout())
            .build()?;

        Ok(Self {
            client,
            base_url: Url::parse(&config.base_url)?,
            timeout: config.request_timeout(),
        })
    }

    async fn _get<T: DeserializeOwned>(&self, url: Url) -> Result<T, ApiError> {
        tracing::debug!(%url, "GET");
        let response = self.client.get(url).timeout(self.timeout).send().await?;
        Self::decode(response).await
    }

    async fn _post<T: DeserializeOwned>(
        &self,
        url: Url,
        body: Option<&TradeRequest>,
    ) -> Result<T, ApiError> {
        tracing::debug!(%url, "POST");
        let mut request = self.client.post(url).timeout(self.timeout);
        if let Some(body) = body {
            request = request.json(body);
        }
        Self::decode(request.send().await?).await
    }

    /// Turns a response into `T`, or into `ApiError::Backend` carrying the
    /// reason from the error body (falling back to the HTTP status).
    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ApiError> {
        let status = response.status();
        let text = response.text().await?;

        if status.is_success() {
            serde_json::from_str::<T>(&text).map_err(|e| ApiError::Deserialization(e.to_string()))
        } else {
            let reason = serde_json::from_str::<ApiErrorResponse>(&text)
                .ok()
                .and_then(|body| body.reason())
                .unwrap_or_else(|| ApiError::status_reason(status.as_u16()));
            tracing::warn!(status = status.as_u16(), %reason, "Backend returned an error.");
            Err(ApiError::Backend { status: status.as_u16(), reason })
        }
    }

    fn reject_failed<T: Envelope>(body: T) -> Result<T, ApiError> {
        match body.failure_reason() {
            Some(reason) => Err(ApiError::Backend { status: 200, reason }),
            None => Ok(body),
        }
    }
}

#[async_trait]
impl ApiClient for BackendClient {
    async fn get_prices(&self) -> Result<Vec<PriceQuote>, ApiError> {
        self._get(endpoint(&self.base_url, "market/prices")?).await
    }

    async fn get_price(&self, symbol: &str) -> Result<PriceQuote, ApiError> {
        let mut url = endpoint(&self.base_url, "market/prices")?;
        url.path_segments_mut()
            .map_err(|_| ApiError::InvalidUrl(url::ParseError::RelativeUrlWithCannotBeABaseBase))?
            .push(symbol);
        self._get(url).await
    }

    async fn open_price_stream(&self) -> Result<PriceStream, ApiError> {
        LiveConnector::new(self.client.clone(), &self.base_url, self.timeout)?
            .subscribe_to_prices()
            .await
    }

    async fn get_account(&self) -> Result<AccountPayload, ApiError> {
        let envelope: AccountEnvelope =
            self._get(endpoint(&self.base_url, "simple-trading/account")?).await?;
        Ok(envelope.account)
    }

    async fn execute_trade(&self, request: &TradeRequest) -> Result<TradeResponse, ApiError> {
        let url = endpoint(&self.base_url, "simple-trading/trade")?;
        Self::reject_failed(self._post(url, Some(request)).await?)
    }

    async fn reset_account(&self) -> Result<ResetResponse, ApiError> {
        let url = endpoint(&self.base_url, "simple-trading/account/reset")?;
        Self::reject_failed(self._post(url, None).await?)
    }

    async fn get_transactions(&self) -> Result<Vec<TransactionPayload>, ApiError> {
        let envelope: TransactionsEnvelope =
            self._get(endpoint(&self.base_url, "simple-trading/transactions")?).await?;
        Ok(envelope.transactions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_keeps_base_path() {
        let base = Url::parse("http://localhost:8080/api").unwrap();
        assert_eq!(
            endpoint(&base, "market/prices").unwrap().as_str(),
            "http://localhost:8080/api/market/prices"
        );
        let base = Url::parse("http://localhost:8080/api/").unwrap();
        assert_eq!(
            endpoint(&base, "/simple-trading/account/reset").unwrap().as_str(),
            "http://localhost:8080/api/simple-trading/account/reset"
        );
    }
}
