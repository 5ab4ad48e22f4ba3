use crate::state::ViewState;
use api_client::{ApiClient, PriceStream};
use configuration::PriceFeedConfig;
use core_types::PriceQuote;
use futures_util::StreamExt;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// Where the price feed currently gets its snapshots from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FeedState {
    #[default]
    Uninitialized,
    /// The push subscription is being opened.
    StreamConnecting,
    /// At least one snapshot has arrived over the push subscription.
    Streaming,
    /// The push subscription failed; snapshots come from timed polling.
    /// There is no way back to streaming from here.
    PollingFallback,
    /// Stopped. Final.
    Terminated,
}

/// Owns the market-data feed: push subscription first, timed polling once the
/// subscription fails. It writes only the price snapshot and the feed state.
pub struct PriceSyncController {
    api_client: Arc<dyn ApiClient>,
    state: ViewState,
    poll_interval: Duration,
    use_stream: bool,
}

impl PriceSyncController {
    pub fn new(api_client: Arc<dyn ApiClient>, state: ViewState, config: &PriceFeedConfig) -> Self {
        Self {
            api_client,
            state,
            poll_interval: config.poll_interval(),
            use_stream: config.use_stream,
        }
    }

    /// Spawns the acquisition task and returns the handle that stops it.
    /// Must be called from within a tokio runtime.
    pub fn start(self) -> PriceFeedHandle {
        let (shutdown, mut shutdown_rx) = watch::channel(false);
        let state = self.state.clone();

        let task = tokio::spawn(async move {
            tokio::select! {
                biased;
                // Dropping the acquisition future closes the subscription or timer it holds.
                _ = shutdown_rx.wait_for(|stopped| *stopped) => {
                    tracing::debug!("[PriceSync] Acquisition cancelled.");
                }
                _ = self.acquire() => {}
            }
        });

        PriceFeedHandle {
            shutdown,
            task: Some(task),
            state,
        }
    }

    async fn acquire(&self) {
        if self.use_stream {
            self.state.set_feed_state(FeedState::StreamConnecting);
            match self.api_client.open_price_stream().await {
                Ok(stream) => self.consume(stream).await,
                Err(e) => tracing::warn!(
                    error = %e,
                    "[PriceSync] Could not open the price stream. Falling back to polling."
                ),
            }
        }
        self.poll().await;
    }

    /// Applies snapshots until the stream fails or ends. The stream is
    /// dropped, closing the connection, when this returns.
    async fn consume(&self, mut stream: PriceStream) {
        while let Some(item) = stream.next().await {
            match item {
                Ok(payload) => match serde_json::from_str::<Vec<PriceQuote>>(&payload) {
                    Ok(quotes) => {
                        if self.state.set_feed_state(FeedState::Streaming) {
                            tracing::info!("[PriceSync] Streaming live prices.");
                        }
                        self.publish(quotes);
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "[PriceSync] Ignoring malformed price message.");
                    }
                },
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        "[PriceSync] Price stream failed. Falling back to polling."
                    );
                    return;
                }
            }
        }
        tracing::warn!("[PriceSync] Price stream closed by the server. Falling back to polling.");
    }

    /// Fetches a snapshot every interval, forever. Failures are logged and the
    /// next tick tries again.
    async fn poll(&self) {
        self.state.set_feed_state(FeedState::PollingFallback);
        tracing::info!(
            interval_ms = self.poll_interval.as_millis() as u64,
            "[PriceSync] Polling prices."
        );

        let mut ticker = interval_at(Instant::now() + self.poll_interval, self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match self.api_client.get_prices().await {
                Ok(quotes) => self.publish(quotes),
                Err(e) => tracing::warn!(error = %e, "[PriceSync] Price poll failed."),
            }
        }
    }

    fn publish(&self, quotes: Vec<PriceQuote>) {
        let quotes = unique_by_symbol(quotes);
        if !self.state.replace_prices(quotes) {
            tracing::debug!("[PriceSync] Snapshot arrived after stop; dropped.");
        }
    }
}

/// Keeps the first quote of each symbol, preserving order.
fn unique_by_symbol(quotes: Vec<PriceQuote>) -> Vec<PriceQuote> {
    let mut seen = HashSet::new();
    let before = quotes.len();
    let unique: Vec<PriceQuote> = quotes
        .into_iter()
        .filter(|q| seen.insert(q.symbol.clone()))
        .collect();
    if unique.len() != before {
        tracing::warn!(dropped = before - unique.len(), "[PriceSync] Snapshot repeated symbols.");
    }
    unique
}

/// Controls a running price feed. Dropping the handle stops the feed.
pub struct PriceFeedHandle {
    shutdown: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
    state: ViewState,
}

impl PriceFeedHandle {
    /// Stops the feed and marks it terminated. Only the first call has any
    /// effect; later calls, and calls racing the task's startup, are harmless.
    pub fn stop(&self) {
        let first = self.shutdown.send_if_modified(|stopped| {
            if *stopped {
                return false;
            }
            *stopped = true;
            true
        });
        if first {
            self.state.set_feed_state(FeedState::Terminated);
            tracing::info!("[PriceSync] Price feed stopped.");
        }
    }

    pub fn is_stopped(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Stops the feed and waits for the acquisition task to finish.
    pub async fn shutdown(mut self) {
        self.stop();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "[PriceSync] Acquisition task ended abnormally.");
            }
        }
    }
}

impl Drop for PriceFeedHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
