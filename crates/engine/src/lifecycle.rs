use crate::error::EngineError;
use crate::notifier::Notifier;
use crate::reconciler::Reconciler;
use crate::state::{AccountView, ViewState};
use api_client::ApiClient;
use events::Toast;
use std::sync::Arc;

/// Resets the account and reconciles the view afterwards.
#[derive(Clone)]
pub struct AccountLifecycle {
    api_client: Arc<dyn ApiClient>,
    reconciler: Reconciler,
    state: ViewState,
    notifier: Arc<dyn Notifier>,
}

impl AccountLifecycle {
    pub fn new(
        api_client: Arc<dyn ApiClient>,
        reconciler: Reconciler,
        state: ViewState,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            api_client,
            reconciler,
            state,
            notifier,
        }
    }

    /// Resets the account on the backend. The fresh view is published only
    /// once both the reset and the refetch succeeded; on any failure the
    /// current view and feedback are left exactly as they were.
    pub async fn reset(&self) -> Result<AccountView, EngineError> {
        tracing::info!("[LIFECYCLE] Resetting account.");
        match self.reset_and_fetch().await {
            Ok(view) => {
                self.state.publish_account(view.clone());
                self.state.clear_trade_message();
                self.notifier.notify(Toast::info(
                    "Account Reset",
                    "Your account has been reset to its initial balance",
                ));
                tracing::info!(balance = %view.account.balance, "[LIFECYCLE] Account reset.");
                Ok(view)
            }
            Err(e) => {
                let reason = Some(e.reason())
                    .filter(|r| !r.trim().is_empty())
                    .unwrap_or_else(|| "Failed to reset account".to_string());
                tracing::error!(%reason, "[LIFECYCLE] Account reset failed.");
                self.notifier.notify(Toast::destructive("Reset Failed", reason));
                Err(e)
            }
        }
    }

    async fn reset_and_fetch(&self) -> Result<AccountView, EngineError> {
        self.api_client.reset_account().await?;
        self.reconciler.fetch().await
    }
}
