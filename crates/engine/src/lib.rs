use crate::error::EngineError;
use crate::lifecycle::AccountLifecycle;
use crate::notifier::Notifier;
use crate::orchestrator::TradeOrchestrator;
use crate::price_sync::{PriceFeedHandle, PriceSyncController};
use crate::reconciler::Reconciler;
use crate::state::{AccountView, ViewState};
use api_client::ApiClient;
use configuration::{Config, PriceFeedConfig};
use core_types::{PriceQuote, TradeOutcome, TradeSide, View};
use events::Toast;
use std::sync::Arc;
use tokio::sync::Mutex;

pub mod error;
pub mod lifecycle;
pub mod notifier;
pub mod orchestrator;
pub mod price_sync;
pub mod reconciler;
pub mod state;

#[cfg(test)]
mod test_support;

pub use notifier::BroadcastNotifier;
pub use price_sync::FeedState;
pub use reconciler::build_view_model;

enum FeedSlot {
    Idle,
    Running(PriceFeedHandle),
    Stopped,
}

/// One client session against the trading backend.
///
/// Wires the price sync controller, the trade orchestrator and the lifecycle
/// manager to a single shared `ViewState`. Presentation reads the state and
/// calls the intent methods; it never writes the state directly.
pub struct TradingDesk {
    api_client: Arc<dyn ApiClient>,
    state: ViewState,
    notifier: Arc<dyn Notifier>,
    reconciler: Reconciler,
    orchestrator: TradeOrchestrator,
    lifecycle: AccountLifecycle,
    price_feed_config: PriceFeedConfig,
    price_feed: Mutex<FeedSlot>,
}

impl TradingDesk {
    pub fn new(
        api_client: Arc<dyn ApiClient>,
        notifier: Arc<dyn Notifier>,
        config: &Config,
    ) -> Self {
        let state = ViewState::new();
        let reconciler = Reconciler::new(api_client.clone(), state.clone());
        let orchestrator = TradeOrchestrator::new(
            api_client.clone(),
            reconciler.clone(),
            state.clone(),
            notifier.clone(),
            config.trading.feedback_clear_delay(),
        );
        let lifecycle = AccountLifecycle::new(
            api_client.clone(),
            reconciler.clone(),
            state.clone(),
            notifier.clone(),
        );

        Self {
            api_client,
            state,
            notifier,
            reconciler,
            orchestrator,
            lifecycle,
            price_feed_config: config.price_feed.clone(),
            price_feed: Mutex::new(FeedSlot::Idle),
        }
    }

    pub fn state(&self) -> &ViewState {
        &self.state
    }

    /// Loads prices, then account and history. A failure is reported once
    /// and leaves whatever could not be loaded empty; there is no retry.
    pub async fn load(&self) -> Result<(), EngineError> {
        self.state.set_loading(true);
        let result = self.load_all().await;
        self.state.set_loading(false);

        if let Err(e) = &result {
            tracing::error!(error = %e, "[TradeDesk] Initial load failed.");
            self.notifier.notify(Toast::destructive("Error", "Failed to load data from server"));
        }
        result
    }

    async fn load_all(&self) -> Result<(), EngineError> {
        let prices = self.api_client.get_prices().await?;
        tracing::info!(count = prices.len(), "[TradeDesk] Loaded price snapshot.");
        self.state.replace_prices(prices);
        self.reconciler.refresh().await?;
        Ok(())
    }

    /// Starts the live price feed. Returns false if it is already running or
    /// was stopped; a stopped desk does not restart its feed.
    pub async fn start_price_feed(&self) -> bool {
        let mut slot = self.price_feed.lock().await;
        if !matches!(*slot, FeedSlot::Idle) {
            return false;
        }
        let controller = PriceSyncController::new(
            self.api_client.clone(),
            self.state.clone(),
            &self.price_feed_config,
        );
        *slot = FeedSlot::Running(controller.start());
        true
    }

    /// Loads the initial data and then starts the price feed. The feed starts
    /// even if the load failed, so prices can still recover.
    pub async fn start(&self) -> Result<(), EngineError> {
        let loaded = self.load().await;
        self.start_price_feed().await;
        loaded
    }

    /// Stops the price feed. Safe to call repeatedly and before `start`.
    pub async fn shutdown(&self) {
        let previous = std::mem::replace(&mut *self.price_feed.lock().await, FeedSlot::Stopped);
        if let FeedSlot::Running(handle) = previous {
            handle.shutdown().await;
        }
    }

    /// Fetches one quote directly from the backend.
    pub async fn quote(&self, symbol: &str) -> Result<PriceQuote, EngineError> {
        Ok(self.api_client.get_price(symbol).await?)
    }

    /// Remembers `quote` for the trade panel and switches to it.
    pub fn select_quote(&self, quote: PriceQuote) {
        self.notifier.notify(Toast::info(
            "Crypto Selected",
            format!("Ready to trade {} ({})", quote.name, quote.symbol),
        ));
        self.state.select_quote(quote);
        self.state.set_view(View::Trade);
    }

    /// Selects the quote for `symbol` from the current snapshot, if listed.
    pub fn select_symbol(&self, symbol: &str) -> Option<PriceQuote> {
        let quote = self.state.quote(symbol)?;
        self.select_quote(quote.clone());
        Some(quote)
    }

    pub fn set_view(&self, view: View) {
        self.state.set_view(view);
    }

    pub fn set_amount(&self, text: impl Into<String>) {
        self.state.set_amount(text);
    }

    pub fn set_side(&self, side: TradeSide) {
        self.state.set_trade_side(side);
    }

    /// Executes the trade currently described by the panel: the selected
    /// quote, the amount text and the side. `None` means a trade was already
    /// settling and this call did nothing.
    pub async fn execute_trade(&self) -> Option<TradeOutcome> {
        let selection = self.state.selected_quote();
        let amount = self.state.amount();
        let side = self.state.trade_side();
        self.orchestrator.execute(selection.as_ref(), &amount, side).await
    }

    pub async fn reset(&self) -> Result<AccountView, EngineError> {
        self.lifecycle.reset().await
    }
}
