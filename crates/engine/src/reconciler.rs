use crate::error::EngineError;
use crate::state::{AccountView, ViewState};
use api_client::{AccountPayload, ApiClient, TransactionPayload};
use core_types::{Account, Holding, Transaction};
use std::collections::HashMap;
use std::sync::Arc;

/// Normalizes the backend's account and history into the view model.
///
/// Holdings arrive as a list and leave keyed by symbol. If the backend ever
/// repeats a symbol the later entry wins. Transactions keep backend order; a
/// record without an id gets its 1-based position.
pub fn build_view_model(
    account: AccountPayload,
    transactions: Vec<TransactionPayload>,
) -> AccountView {
    let mut holdings: HashMap<String, Holding> = HashMap::new();
    for holding in account.portfolio.unwrap_or_default() {
        let symbol = holding.symbol.clone();
        if holdings.insert(symbol.clone(), holding).is_some() {
            tracing::warn!(
                %symbol,
                "[RECONCILER] Backend reported a symbol twice; keeping the later holding."
            );
        }
    }

    let account = Account {
        balance: account.balance,
        initial_balance: account.initial_balance,
        portfolio_value: account.portfolio_value,
        total_value: account.total_value,
        total_invested: account.total_invested,
        total_pnl: account.total_pnl,
        total_pnl_percentage: account.total_pnl_percentage,
        realized_pnl: account.realized_pnl,
        unrealized_pnl: account.unrealized_pnl,
        transaction_count: account.transaction_count,
        holdings,
    };

    let transactions = transactions
        .into_iter()
        .enumerate()
        .map(|(index, tx)| Transaction {
            id: transaction_id(tx.id.as_ref(), index),
            side: tx.side,
            symbol: tx.symbol,
            quantity: tx.quantity,
            price: tx.price,
            total: tx.total,
            timestamp: tx.timestamp,
            status: tx.status,
        })
        .collect();

    AccountView { account, transactions }
}

fn transaction_id(raw: Option<&serde_json::Value>, index: usize) -> String {
    match raw {
        Some(serde_json::Value::String(s)) if !s.is_empty() => s.clone(),
        Some(serde_json::Value::Number(n)) => n.to_string(),
        _ => (index + 1).to_string(),
    }
}

/// Refreshes account and history from the backend after a load or a mutation.
#[derive(Clone)]
pub struct Reconciler {
    api_client: Arc<dyn ApiClient>,
    state: ViewState,
}

impl Reconciler {
    pub fn new(api_client: Arc<dyn ApiClient>, state: ViewState) -> Self {
        Self { api_client, state }
    }

    /// Fetches both halves concurrently and builds the view model without
    /// touching the shared state.
    pub async fn fetch(&self) -> Result<AccountView, EngineError> {
        let (account_result, transactions_result) =
            tokio::join!(self.api_client.get_account(), self.api_client.get_transactions());
        Ok(build_view_model(account_result?, transactions_result?))
    }

    /// Fetches and publishes. On failure the previous view stays in place.
    pub async fn refresh(&self) -> Result<AccountView, EngineError> {
        let view = self.fetch().await?;
        self.state.publish_account(view.clone());
        tracing::debug!(
            holdings = view.account.holdings.len(),
            transactions = view.transactions.len(),
            "[RECONCILER] Account view refreshed."
        );
        Ok(view)
    }
}
