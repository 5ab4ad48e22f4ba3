//! In-memory doubles for the engine tests.

use crate::notifier::Notifier;
use api_client::error::ApiError;
use api_client::{
    AccountPayload, ApiClient, PriceStream, ResetResponse, TradeResponse, TransactionPayload,
};
use async_trait::async_trait;
use core_types::{Holding, PriceQuote, SettledTrade, TradeRequest, TradeSide};
use events::Toast;
use futures_util::stream::{self, StreamExt};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

pub fn quote(symbol: &str, price: Decimal) -> PriceQuote {
    PriceQuote {
        symbol: symbol.to_string(),
        name: format!("{symbol} coin"),
        price,
        change_24h: dec!(0),
        change_24h_percent: dec!(0),
        volume_24h: None,
        high_24h: None,
        low_24h: None,
        last_updated: None,
    }
}

pub fn snapshot_json(quotes: &[(&str, Decimal)]) -> String {
    let items: Vec<String> = quotes
        .iter()
        .map(|(symbol, price)| {
            format!(
                r#"{{"symbol":"{symbol}","name":"{symbol} coin","price":{price},"change24h":0,"change24hPercent":0}}"#
            )
        })
        .collect();
    format!("[{}]", items.join(","))
}

/// What the next `open_price_stream` call does.
pub enum StreamScript {
    FailToOpen,
    /// Yields the items, then either ends or stays open without yielding.
    Items {
        items: Vec<Result<String, ApiError>>,
        hold_open: bool,
    },
}

#[derive(Default)]
pub struct Calls {
    pub prices: AtomicUsize,
    pub trades: AtomicUsize,
    pub resets: AtomicUsize,
    pub accounts: AtomicUsize,
    pub stream_opens: AtomicUsize,
    pub stream_drops: AtomicUsize,
}

impl Calls {
    pub fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

struct Ledger {
    prices: Vec<PriceQuote>,
    poll_results: VecDeque<Result<Vec<PriceQuote>, ApiError>>,
    streams: VecDeque<StreamScript>,
    initial_balance: Decimal,
    balance: Decimal,
    holdings: Vec<Holding>,
    transactions: Vec<TransactionPayload>,
    reject_reason: Option<String>,
    omit_total: bool,
    reset_fails: bool,
    load_fails: bool,
}

/// A simulated trading backend holding a tiny ledger.
pub struct MockBackend {
    ledger: Mutex<Ledger>,
    pub calls: Arc<Calls>,
    trade_gate: Mutex<Option<Arc<Notify>>>,
}

struct StreamGuard(Arc<Calls>);

impl Drop for StreamGuard {
    fn drop(&mut self) {
        self.0.stream_drops.fetch_add(1, Ordering::SeqCst);
    }
}

impl MockBackend {
    pub fn new(prices: Vec<PriceQuote>) -> Self {
        Self {
            ledger: Mutex::new(Ledger {
                prices,
                poll_results: VecDeque::new(),
                streams: VecDeque::new(),
                initial_balance: dec!(10000),
                balance: dec!(10000),
                holdings: Vec::new(),
                transactions: Vec::new(),
                reject_reason: None,
                omit_total: false,
                reset_fails: false,
                load_fails: false,
            }),
            calls: Arc::new(Calls::default()),
            trade_gate: Mutex::new(None),
        }
    }

    pub fn push_poll_result(&self, result: Result<Vec<PriceQuote>, ApiError>) {
        self.ledger.lock().unwrap().poll_results.push_back(result);
    }

    pub fn push_stream(&self, script: StreamScript) {
        self.ledger.lock().unwrap().streams.push_back(script);
    }

    pub fn reject_trades(&self, reason: &str) {
        self.ledger.lock().unwrap().reject_reason = Some(reason.to_string());
    }

    pub fn omit_trade_total(&self) {
        self.ledger.lock().unwrap().omit_total = true;
    }

    pub fn fail_resets(&self) {
        self.ledger.lock().unwrap().reset_fails = true;
    }

    pub fn fail_loads(&self, fail: bool) {
        self.ledger.lock().unwrap().load_fails = fail;
    }

    /// Makes every trade wait until the returned `Notify` is signalled.
    pub fn gate_trades(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.trade_gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    pub fn live_streams(&self) -> usize {
        Calls::get(&self.calls.stream_opens) - Calls::get(&self.calls.stream_drops)
    }

    fn account_payload(ledger: &Ledger) -> AccountPayload {
        let portfolio_value: Decimal = ledger.holdings.iter().map(|h| h.total_invested).sum();
        AccountPayload {
            balance: ledger.balance,
            initial_balance: Some(ledger.initial_balance),
            portfolio_value,
            total_value: ledger.balance + portfolio_value,
            total_invested: ledger.initial_balance,
            total_pnl: dec!(0),
            total_pnl_percentage: dec!(0),
            realized_pnl: dec!(0),
            unrealized_pnl: dec!(0),
            transaction_count: Some(ledger.transactions.len() as u64),
            portfolio: Some(ledger.holdings.clone()),
        }
    }

    fn settle(ledger: &mut Ledger, request: &TradeRequest) -> Result<SettledTrade, ApiError> {
        let price = ledger
            .prices
            .iter()
            .find(|q| q.symbol == request.symbol)
            .map(|q| q.price)
            .unwrap_or(request.price);
        let total = request.quantity * price;
        let rejected = |reason: &str| ApiError::Backend {
            status: 400,
            reason: reason.to_string(),
        };

        match request.side {
            TradeSide::Buy => {
                if total > ledger.balance {
                    return Err(rejected("Insufficient balance"));
                }
                ledger.balance -= total;
                match ledger.holdings.iter_mut().find(|h| h.symbol == request.symbol) {
                    Some(holding) => {
                        holding.quantity += request.quantity;
                        holding.total_invested += total;
                        holding.avg_price = holding.total_invested / holding.quantity;
                    }
                    None => ledger.holdings.push(Holding {
                        symbol: request.symbol.clone(),
                        quantity: request.quantity,
                        avg_price: price,
                        total_invested: total,
                        current_price: None,
                        current_value: None,
                        pnl: None,
                        pnl_percent: None,
                        last_updated: None,
                    }),
                }
            }
            TradeSide::Sell => {
                let holding = ledger
                    .holdings
                    .iter_mut()
                    .find(|h| h.symbol == request.symbol && h.quantity >= request.quantity)
                    .ok_or_else(|| rejected("Insufficient holdings"))?;
                holding.quantity -= request.quantity;
                holding.total_invested = holding.quantity * holding.avg_price;
                ledger.balance += total;
                ledger.holdings.retain(|h| !h.quantity.is_zero());
            }
        }

        ledger.transactions.push(TransactionPayload {
            id: None,
            symbol: request.symbol.clone(),
            side: request.side,
            quantity: request.quantity,
            price,
            total,
            timestamp: None,
            status: Some("COMPLETED".to_string()),
        });

        Ok(SettledTrade {
            symbol: request.symbol.clone(),
            side: request.side,
            quantity: request.quantity,
            price,
            total: if ledger.omit_total { None } else { Some(total) },
            timestamp: None,
            status: Some("COMPLETED".to_string()),
        })
    }
}

fn unavailable() -> ApiError {
    ApiError::Backend {
        status: 503,
        reason: "HTTP error! status: 503".to_string(),
    }
}

#[async_trait]
impl ApiClient for MockBackend {
    async fn get_prices(&self) -> Result<Vec<PriceQuote>, ApiError> {
        self.calls.prices.fetch_add(1, Ordering::SeqCst);
        let mut ledger = self.ledger.lock().unwrap();
        if ledger.load_fails {
            return Err(unavailable());
        }
        match ledger.poll_results.pop_front() {
            Some(result) => result,
            None => Ok(ledger.prices.clone()),
        }
    }

    async fn get_price(&self, symbol: &str) -> Result<PriceQuote, ApiError> {
        let ledger = self.ledger.lock().unwrap();
        ledger
            .prices
            .iter()
            .find(|q| q.symbol == symbol)
            .cloned()
            .ok_or(ApiError::Backend {
                status: 404,
                reason: "HTTP error! status: 404".to_string(),
            })
    }

    async fn open_price_stream(&self) -> Result<PriceStream, ApiError> {
        let script = self.ledger.lock().unwrap().streams.pop_front();
        match script {
            None | Some(StreamScript::FailToOpen) => {
                Err(ApiError::Stream("connection refused".to_string()))
            }
            Some(StreamScript::Items { items, hold_open }) => {
                self.calls.stream_opens.fetch_add(1, Ordering::SeqCst);
                let guard = StreamGuard(self.calls.clone());
                let items = stream::iter(items);
                let stream = if hold_open {
                    items.chain(stream::pending()).boxed()
                } else {
                    items.boxed()
                };
                Ok(stream
                    .map(move |item| {
                        let _ = &guard;
                        item
                    })
                    .boxed())
            }
        }
    }

    async fn get_account(&self) -> Result<AccountPayload, ApiError> {
        self.calls.accounts.fetch_add(1, Ordering::SeqCst);
        let ledger = self.ledger.lock().unwrap();
        if ledger.load_fails {
            return Err(unavailable());
        }
        Ok(Self::account_payload(&ledger))
    }

    async fn execute_trade(&self, request: &TradeRequest) -> Result<TradeResponse, ApiError> {
        self.calls.trades.fetch_add(1, Ordering::SeqCst);
        let gate = self.trade_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        let mut ledger = self.ledger.lock().unwrap();
        if let Some(reason) = ledger.reject_reason.clone() {
            return Err(ApiError::Backend { status: 400, reason });
        }
        let trade = Self::settle(&mut ledger, request)?;
        Ok(TradeResponse {
            success: Some(true),
            message: Some(format!("{} trade completed successfully", request.side.as_wire())),
            error: None,
            trade: Some(trade),
        })
    }

    async fn reset_account(&self) -> Result<ResetResponse, ApiError> {
        self.calls.resets.fetch_add(1, Ordering::SeqCst);
        let mut ledger = self.ledger.lock().unwrap();
        if ledger.reset_fails {
            return Err(ApiError::Backend {
                status: 500,
                reason: "HTTP error! status: 500".to_string(),
            });
        }
        ledger.balance = ledger.initial_balance;
        ledger.holdings.clear();
        ledger.transactions.clear();
        Ok(ResetResponse {
            success: Some(true),
            message: Some("Account reset successfully".to_string()),
            error: None,
        })
    }

    async fn get_transactions(&self) -> Result<Vec<TransactionPayload>, ApiError> {
        let ledger = self.ledger.lock().unwrap();
        if ledger.load_fails {
            return Err(unavailable());
        }
        Ok(ledger.transactions.clone())
    }
}

/// Keeps every toast it is handed.
#[derive(Default)]
pub struct RecordingNotifier {
    toasts: Mutex<Vec<Toast>>,
}

impl RecordingNotifier {
    pub fn toasts(&self) -> Vec<Toast> {
        self.toasts.lock().unwrap().clone()
    }

    pub fn titles(&self) -> Vec<String> {
        self.toasts().into_iter().map(|t| t.title).collect()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, toast: Toast) {
        self.toasts.lock().unwrap().push(toast);
    }
}
