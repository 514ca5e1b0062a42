//! Run cancellation.
//!
//! The orchestrator owns a [`CancelToken`] and `select!`s on it alongside its
//! poll loop. Callers get clonable [`CancelHandle`]s; cancelling is idempotent
//! and sticky until the orchestrator is reset.

use std::sync::Arc;

use tokio::sync::watch;

/// Clonable handle that cancels the orchestrator's active run.
#[derive(Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    /// Request cancellation. Calling this more than once has no further effect.
    pub fn cancel(&self) {
        if !self.tx.send_replace(true) {
            tracing::info!("run cancellation requested");
        }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }
}

pub(crate) struct CancelToken {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl CancelToken {
    pub(crate) fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self { tx: Arc::new(tx), rx }
    }

    pub(crate) fn handle(&self) -> CancelHandle {
        CancelHandle {
            tx: Arc::clone(&self.tx),
        }
    }

    /// Resolves once cancellation has been requested (immediately if it already was).
    pub(crate) async fn cancelled(&mut self) {
        // The token holds its own sender, so the channel cannot close under us.
        let _ = self.rx.wait_for(|cancelled| *cancelled).await;
    }

    pub(crate) fn clear(&mut self) {
        self.tx.send_replace(false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn cancel_wakes_waiter() {
        let mut token = CancelToken::new();
        let handle = token.handle();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            handle.cancel();
        });
        tokio::time::timeout(Duration::from_secs(1), token.cancelled())
            .await
            .expect("cancellation should wake the waiter");
    }

    #[tokio::test]
    async fn cancel_is_idempotent_and_sticky() {
        let mut token = CancelToken::new();
        let h1 = token.handle();
        let h2 = h1.clone();
        h1.cancel();
        h2.cancel();
        assert!(h1.is_cancelled());
        // already cancelled: resolves without waiting
        token.cancelled().await;
        token.cancelled().await;
    }

    #[tokio::test(start_paused = true)]
    async fn clear_rearms_token() {
        let mut token = CancelToken::new();
        let handle = token.handle();
        handle.cancel();
        token.clear();
        assert!(!handle.is_cancelled());
        let waited = tokio::time::timeout(Duration::from_secs(5), token.cancelled()).await;
        assert!(waited.is_err());
    }
}
