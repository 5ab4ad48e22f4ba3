use crate::notifier::Notifier;
use crate::reconciler::Reconciler;
use crate::state::{TradeSlot, ViewState};
use api_client::ApiClient;
use core_types::{PriceQuote, TradeMessage, TradeOutcome, TradeRequest, TradeSide};
use events::Toast;
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

pub const MISSING_INPUT: &str = "Please select a cryptocurrency and enter an amount";
pub const INVALID_AMOUNT: &str = "Please enter a valid amount";
const GENERIC_TRADE_FAILURE: &str = "An error occurred while executing the trade";

/// Checks a trade intent before anything touches the network. Returns the
/// selected quote with the parsed quantity, or the message to show inline.
///
/// An amount whose value at the quoted price does not fit a `Decimal` is
/// rejected as invalid.
pub fn validate_trade<'a>(
    selection: Option<&'a PriceQuote>,
    amount_text: &str,
) -> Result<(&'a PriceQuote, Decimal), TradeMessage> {
    let amount_text = amount_text.trim();
    let quote = match selection {
        Some(quote) if !amount_text.is_empty() => quote,
        _ => return Err(TradeMessage::error("Error", MISSING_INPUT)),
    };
    let quantity = Decimal::from_str(amount_text)
        .or_else(|_| Decimal::from_scientific(amount_text))
        .ok()
        .filter(|amount| *amount > Decimal::ZERO)
        .filter(|amount| amount.checked_mul(quote.price).is_some())
        .ok_or_else(|| TradeMessage::error("Error", INVALID_AMOUNT))?;
    Ok((quote, quantity))
}

/// Validates, submits and reconciles trades, one at a time.
#[derive(Clone)]
pub struct TradeOrchestrator {
    api_client: Arc<dyn ApiClient>,
    reconciler: Reconciler,
    state: ViewState,
    notifier: Arc<dyn Notifier>,
    feedback_delay: Duration,
}

impl TradeOrchestrator {
    pub fn new(
        api_client: Arc<dyn ApiClient>,
        reconciler: Reconciler,
        state: ViewState,
        notifier: Arc<dyn Notifier>,
        feedback_delay: Duration,
    ) -> Self {
        Self {
            api_client,
            reconciler,
            state,
            notifier,
            feedback_delay,
        }
    }

    /// Runs one trade intent to completion.
    ///
    /// Returns `None` without side effects when another trade is still
    /// settling. Otherwise the panel stays busy, and the outcome message stays
    /// visible, until the feedback delay has elapsed.
    pub async fn execute(
        &self,
        selection: Option<&PriceQuote>,
        amount_text: &str,
        side: TradeSide,
    ) -> Option<TradeOutcome> {
        let Some(slot) = self.state.try_begin_trade() else {
            tracing::debug!("[TRADE] A trade is already settling; ignoring request.");
            return None;
        };
        self.state.clear_trade_message();

        let (quote, quantity) = match validate_trade(selection, amount_text) {
            Ok(valid) => valid,
            Err(message) => {
                tracing::info!(reason = %message.message, "[TRADE] Rejected locally.");
                let id = self.state.show_trade_message(message.clone());
                drop(slot);
                self.schedule_clear(id, None);
                return Some(TradeOutcome {
                    success: false,
                    message,
                    trade: None,
                });
            }
        };

        let request = TradeRequest::from_quote(quote, side, quantity);
        tracing::info!(
            symbol = %request.symbol,
            side = request.side.as_wire(),
            quantity = %request.quantity,
            price = %request.price,
            "[TRADE] Submitting trade."
        );

        let outcome = match self.api_client.execute_trade(&request).await {
            Ok(response) => {
                let total = response
                    .trade
                    .as_ref()
                    .and_then(|t| t.total)
                    .or_else(|| request.notional());
                let title = response
                    .message
                    .clone()
                    .filter(|m| !m.trim().is_empty())
                    .unwrap_or_else(|| "Trade Successful".to_string());
                let summary = format!(
                    "{} {} {}",
                    side.past_tense(),
                    quantity.normalize(),
                    request.symbol
                );
                let text = match total {
                    Some(total) => format!("{summary} for ${total:.2}"),
                    None => summary,
                };
                let message = TradeMessage::success(title, text);
                let id = self.state.show_trade_message(message.clone());
                tracing::info!(symbol = %request.symbol, ?total, "[TRADE] Trade settled.");

                if let Err(e) = self.reconciler.refresh().await {
                    tracing::warn!(
                        error = %e,
                        "[TRADE] Post-trade refresh failed; showing the previous account view."
                    );
                    self.notifier.notify(Toast::destructive("Refresh Failed", e.reason()));
                }
                self.state.set_amount(String::new());
                self.notifier.notify(Toast::info(
                    "Trade Executed",
                    format!(
                        "Successfully {} {} {}",
                        side.verb(),
                        quantity.normalize(),
                        request.symbol
                    ),
                ));

                self.schedule_clear(id, Some(slot));
                TradeOutcome {
                    success: true,
                    message,
                    trade: response.trade,
                }
            }
            Err(e) => {
                let reason = Some(e.reason())
                    .filter(|r| !r.trim().is_empty())
                    .unwrap_or_else(|| GENERIC_TRADE_FAILURE.to_string());
                tracing::warn!(symbol = %request.symbol, %reason, "[TRADE] Trade failed.");
                let message = TradeMessage::error("Trade Failed", reason.clone());
                let id = self.state.show_trade_message(message.clone());
                self.notifier.notify(Toast::destructive("Trade Failed", reason));

                self.schedule_clear(id, Some(slot));
                TradeOutcome {
                    success: false,
                    message,
                    trade: None,
                }
            }
        };
        Some(outcome)
    }

    /// After the feedback delay, clears the message written with `id` (unless
    /// something newer replaced it) and, for submitted trades, frees the panel.
    fn schedule_clear(&self, id: u64, slot: Option<TradeSlot>) {
        let state = self.state.clone();
        let delay = self.feedback_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            state.clear_trade_message_if(id);
            drop(slot);
        });
    }
}
