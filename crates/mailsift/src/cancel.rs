//! Broadcast cancellation shared by every pipeline stage.

use std::sync::Arc;

use tokio::sync::watch;

/// Set-once cancellation signal.
///
/// Clones observe the same flag. Once [`cancel`](Self::cancel) is called it
/// stays set; there is no reset.
#[derive(Debug, Clone)]
pub struct CancelToken {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    /// Creates a token that is not cancelled.
    #[must_use]
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self { tx: Arc::new(tx), rx }
    }

    /// Signals cancellation to every clone of this token.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    /// Returns `true` once cancellation was signalled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Completes when cancellation is signalled.
    ///
    /// Safe to use as a `tokio::select!` branch.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        // The sender lives as long as any token clone, so this only fails
        // if it was dropped, which cannot happen while `self` is borrowed.
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}
