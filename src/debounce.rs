//! Search input debouncing
//!
//! Typing into the search box re-fetches the list from the server, so raw
//! keystrokes are coalesced: a value is emitted only after it has sat
//! unchanged for the full quiescence window. At most one timer is pending at
//! a time; each update aborts and replaces it.

use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;

/// Default quiescence window.
pub const DEBOUNCE_WINDOW: Duration = Duration::from_millis(500);

/// Coalesces a stream of raw query updates into settled values, delivered on
/// the owner's event channel.
///
/// Dropping the debouncer (or calling [`QueryDebouncer::cancel`]) aborts any
/// pending emission; nothing fires after teardown.
pub struct QueryDebouncer {
    window: Duration,
    out: UnboundedSender<String>,
    pending: Option<JoinHandle<()>>,
}

impl QueryDebouncer {
    pub fn new(out: UnboundedSender<String>) -> Self {
        Self::with_window(DEBOUNCE_WINDOW, out)
    }

    pub fn with_window(window: Duration, out: UnboundedSender<String>) -> Self {
        Self {
            window,
            out,
            pending: None,
        }
    }

    /// Record a new raw value. Cancels the previously scheduled emission and
    /// schedules this value for `now + window`.
    pub fn update(&mut self, value: String) {
        self.cancel();
        let out = self.out.clone();
        let window = self.window;
        self.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(window).await;
            // Receiver gone means the owner is shutting down; nothing to do.
            let _ = out.send(value);
        }));
    }

    /// Abort the pending emission, if any.
    pub fn cancel(&mut self) {
        if let Some(handle) = self.pending.take() {
            handle.abort();
        }
    }
}

impl Drop for QueryDebouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;
    use tokio::time::advance;

    // Let the freshly spawned timer task register its sleep before the test
    // clock is advanced.
    async fn settle() {
        tokio::task::yield_now().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_emits_once_with_last_value() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut debouncer = QueryDebouncer::new(tx);

        debouncer.update("a".to_string());
        settle().await;
        advance(Duration::from_millis(100)).await;
        debouncer.update("ab".to_string());
        settle().await;
        advance(Duration::from_millis(100)).await;
        debouncer.update("abc".to_string());
        settle().await;

        // Just shy of the window: still quiet.
        advance(Duration::from_millis(499)).await;
        assert!(rx.try_recv().is_err());

        advance(Duration::from_millis(2)).await;
        assert_eq!(rx.recv().await, Some("abc".to_string()));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_value_never_emitted() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut debouncer = QueryDebouncer::new(tx);

        debouncer.update("draft".to_string());
        settle().await;
        advance(Duration::from_millis(450)).await;
        debouncer.update("final".to_string());
        settle().await;
        advance(Duration::from_millis(600)).await;
        settle().await;

        assert_eq!(rx.try_recv().ok(), Some("final".to_string()));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_suppresses_pending_emission() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut debouncer = QueryDebouncer::new(tx);

        debouncer.update("doomed".to_string());
        settle().await;
        debouncer.cancel();
        advance(Duration::from_millis(600)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_cancels_pending_emission() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut debouncer = QueryDebouncer::new(tx);

        debouncer.update("doomed".to_string());
        settle().await;
        drop(debouncer);
        advance(Duration::from_millis(600)).await;
        // Both senders are gone, so the channel reports closed, not a value.
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_custom_window() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut debouncer = QueryDebouncer::with_window(Duration::from_millis(50), tx);

        debouncer.update("quick".to_string());
        settle().await;
        advance(Duration::from_millis(60)).await;
        settle().await;
        assert_eq!(rx.try_recv().ok(), Some("quick".to_string()));
    }
}
