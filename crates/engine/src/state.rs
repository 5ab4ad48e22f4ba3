use crate::price_sync::FeedState;
use core_types::{Account, PriceQuote, TradeMessage, TradeSide, Transaction, View};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

/// Account and history as last reconciled from the backend. Published as one
/// value so a reader never sees a new account next to an old history.
#[derive(Debug, Clone, PartialEq)]
pub struct AccountView {
    pub account: Account,
    pub transactions: Vec<Transaction>,
}

/// The inline trade message together with the id of the write that put it
/// there. Delayed clears only remove the message they were scheduled for.
#[derive(Debug, Clone, PartialEq)]
pub struct Feedback {
    pub id: u64,
    pub message: TradeMessage,
}

/// The inner view state, one `watch` channel per slice.
///
/// Writer roles: the price sync controller owns `prices` and `feed`; the trade
/// orchestrator and lifecycle manager own `account`, `feedback` and
/// `executing`; the session owns the form fields and the active view.
/// Presentation only reads.
struct ViewStateInner {
    prices: watch::Sender<Vec<PriceQuote>>,
    feed: watch::Sender<FeedState>,
    account: watch::Sender<Option<AccountView>>,
    feedback: watch::Sender<Option<Feedback>>,
    executing: watch::Sender<bool>,
    loading: watch::Sender<bool>,
    selected: watch::Sender<Option<PriceQuote>>,
    amount: watch::Sender<String>,
    side: watch::Sender<TradeSide>,
    view: watch::Sender<View>,
    next_feedback_id: AtomicU64,
}

/// A clonable, thread-safe handle to the desk's shared view state.
#[derive(Clone)]
pub struct ViewState {
    inner: Arc<ViewStateInner>,
}

impl Default for ViewState {
    fn default() -> Self {
        Self::new()
    }
}

impl ViewState {
    /// Creates a new, empty view state.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ViewStateInner {
                prices: watch::Sender::new(Vec::new()),
                feed: watch::Sender::new(FeedState::Uninitialized),
                account: watch::Sender::new(None),
                feedback: watch::Sender::new(None),
                executing: watch::Sender::new(false),
                loading: watch::Sender::new(false),
                selected: watch::Sender::new(None),
                amount: watch::Sender::new(String::new()),
                side: watch::Sender::new(TradeSide::Buy),
                view: watch::Sender::new(View::default()),
                next_feedback_id: AtomicU64::new(1),
            }),
        }
    }

    // --- Readers ---

    pub fn prices(&self) -> Vec<PriceQuote> {
        self.inner.prices.borrow().clone()
    }

    pub fn quote(&self, symbol: &str) -> Option<PriceQuote> {
        self.inner.prices.borrow().iter().find(|q| q.symbol == symbol).cloned()
    }

    pub fn feed_state(&self) -> FeedState {
        *self.inner.feed.borrow()
    }

    pub fn account_view(&self) -> Option<AccountView> {
        self.inner.account.borrow().clone()
    }

    pub fn account(&self) -> Option<Account> {
        self.inner.account.borrow().as_ref().map(|v| v.account.clone())
    }

    pub fn transactions(&self) -> Vec<Transaction> {
        self.inner.account.borrow().as_ref().map(|v| v.transactions.clone()).unwrap_or_default()
    }

    pub fn trade_message(&self) -> Option<TradeMessage> {
        self.inner.feedback.borrow().as_ref().map(|f| f.message.clone())
    }

    pub fn is_executing(&self) -> bool {
        *self.inner.executing.borrow()
    }

    pub fn is_loading(&self) -> bool {
        *self.inner.loading.borrow()
    }

    pub fn selected_quote(&self) -> Option<PriceQuote> {
        self.inner.selected.borrow().clone()
    }

    pub fn amount(&self) -> String {
        self.inner.amount.borrow().clone()
    }

    pub fn trade_side(&self) -> TradeSide {
        *self.inner.side.borrow()
    }

    pub fn view(&self) -> View {
        *self.inner.view.borrow()
    }

    // --- Subscriptions ---

    pub fn watch_prices(&self) -> watch::Receiver<Vec<PriceQuote>> {
        self.inner.prices.subscribe()
    }

    pub fn watch_feed_state(&self) -> watch::Receiver<FeedState> {
        self.inner.feed.subscribe()
    }

    pub fn watch_executing(&self) -> watch::Receiver<bool> {
        self.inner.executing.subscribe()
    }

    // --- Form fields and navigation ---

    pub fn set_amount(&self, text: impl Into<String>) {
        self.inner.amount.send_replace(text.into());
    }

    pub fn set_trade_side(&self, side: TradeSide) {
        self.inner.side.send_replace(side);
    }

    pub fn set_view(&self, view: View) {
        self.inner.view.send_replace(view);
    }

    pub(crate) fn select_quote(&self, quote: PriceQuote) {
        self.inner.selected.send_replace(Some(quote));
    }

    pub(crate) fn set_loading(&self, loading: bool) {
        self.inner.loading.send_replace(loading);
    }

    // --- Price feed slice ---

    /// Replaces the whole snapshot. No merging: symbols missing from `quotes`
    /// disappear, and the new order is the display order. Dropped once the
    /// feed is terminated.
    pub(crate) fn replace_prices(&self, quotes: Vec<PriceQuote>) -> bool {
        let mut quotes = Some(quotes);
        self.inner.prices.send_if_modified(|current| {
            if *self.inner.feed.borrow() == FeedState::Terminated {
                return false;
            }
            match quotes.take() {
                Some(next) => {
                    *current = next;
                    true
                }
                None => false,
            }
        })
    }

    /// Moves the feed to `next`. `Terminated` is final; later transitions are dropped.
    pub(crate) fn set_feed_state(&self, next: FeedState) -> bool {
        self.inner.feed.send_if_modified(|current| {
            if *current == FeedState::Terminated || *current == next {
                return false;
            }
            *current = next;
            true
        })
    }

    // --- Account slice ---

    pub(crate) fn publish_account(&self, view: AccountView) {
        self.inner.account.send_replace(Some(view));
    }

    // --- Trade panel slice ---

    /// Atomically claims the single trade slot. Returns `None` if a trade is
    /// already in flight.
    pub(crate) fn try_begin_trade(&self) -> Option<TradeSlot> {
        let claimed = self.inner.executing.send_if_modified(|busy| {
            if *busy {
                return false;
            }
            *busy = true;
            true
        });
        claimed.then(|| TradeSlot { state: self.clone() })
    }

    /// Shows `message` and returns the id a delayed clear must present.
    pub(crate) fn show_trade_message(&self, message: TradeMessage) -> u64 {
        let id = self.inner.next_feedback_id.fetch_add(1, Ordering::Relaxed);
        self.inner.feedback.send_replace(Some(Feedback { id, message }));
        id
    }

    pub(crate) fn clear_trade_message(&self) {
        self.inner.feedback.send_if_modified(|slot| slot.take().is_some());
    }

    /// Clears the message only if it is still the one written with `id`.
    pub(crate) fn clear_trade_message_if(&self, id: u64) -> bool {
        self.inner.feedback.send_if_modified(|slot| {
            if slot.as_ref().map(|f| f.id) == Some(id) {
                *slot = None;
                return true;
            }
            false
        })
    }
}

/// The claimed trade slot. The panel stays busy until this is dropped, which
/// also covers a trade task that is cancelled or unwinds.
#[must_use]
pub(crate) struct TradeSlot {
    state: ViewState,
}

impl Drop for TradeSlot {
    fn drop(&mut self) {
        self.state.inner.executing.send_replace(false);
    }
}
