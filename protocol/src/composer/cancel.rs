//! Cooperative cancellation for the post flow.
//!
//! The UI holds a [`CancelHandle`]; the flow holds a [`CancelToken`] and
//! checks it at every point where it would otherwise wait on the ledger.

use tokio::sync::watch;

pub fn cancel_pair() -> (CancelHandle, CancelToken) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx }, CancelToken { rx })
}

#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        // Receivers may all be gone already; nothing left to cancel then.
        let _ = self.tx.send(true);
    }

    pub fn token(&self) -> CancelToken {
        CancelToken {
            rx: self.tx.subscribe(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

impl CancelToken {
    /// A token nobody can trigger.
    pub fn never() -> Self {
        let (_, token) = cancel_pair();
        token
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancelled. Pends forever if the handle was dropped
    /// without cancelling.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn cancel_wakes_waiter() {
        let (handle, token) = cancel_pair();
        assert!(!token.is_cancelled());
        let waiter = tokio::spawn({
            let token = token.clone();
            async move { token.cancelled().await }
        });
        handle.cancel();
        waiter.await.unwrap();
        assert!(token.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn never_token_never_fires() {
        let token = CancelToken::never();
        let fired = tokio::time::timeout(Duration::from_secs(60), token.cancelled()).await;
        assert!(fired.is_err());
        assert!(!token.is_cancelled());
    }
}
