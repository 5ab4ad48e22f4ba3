use events::Toast;
use tokio::sync::broadcast;

/// The seam to whatever displays transient notifications.
pub trait Notifier: Send + Sync {
    fn notify(&self, toast: Toast);
}

/// Publishes toasts on a broadcast channel. Any number of listeners may
/// subscribe; a toast sent while nobody listens is dropped.
#[derive(Clone)]
pub struct BroadcastNotifier {
    tx: broadcast::Sender<Toast>,
}

impl BroadcastNotifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Toast> {
        self.tx.subscribe()
    }
}

impl Default for BroadcastNotifier {
    fn default() -> Self {
        Self::new(64)
    }
}

impl Notifier for BroadcastNotifier {
    fn notify(&self, toast: Toast) {
        tracing::debug!(
            title = %toast.title,
            destructive = toast.is_destructive(),
            "[NOTIFY] Toast."
        );
        // An Err only means there is no listener right now.
        let _ = self.tx.send(toast);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscribers_receive_toasts() {
        let notifier = BroadcastNotifier::default();
        let mut rx = notifier.subscribe();
        notifier.notify(Toast::info("Account Reset", "done"));
        let toast = rx.recv().await.unwrap();
        assert_eq!(toast.title, "Account Reset");
    }

    #[test]
    fn test_notify_without_listeners_is_harmless() {
        BroadcastNotifier::default().notify(Toast::destructive("Trade Failed", "x"));
    }
}
