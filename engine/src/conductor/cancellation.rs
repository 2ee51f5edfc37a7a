//! Cooperative turn cancellation
//!
//! Observed at every LLM suspension point and before every capability
//! invocation. A running capability is never interrupted.

use sdk::errors::EngineError;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

#[derive(Debug, Clone)]
pub struct TurnCancellation {
    sender: Arc<watch::Sender<bool>>,
    receiver: watch::Receiver<bool>,
}

impl Default for TurnCancellation {
    fn default() -> Self {
        Self::new()
    }
}

impl TurnCancellation {
    pub fn new() -> Self {
        let (sender, receiver) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
            receiver,
        }
    }

    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Fail with `Cancelled` if the turn was cancelled
    pub fn check(&self) -> Result<(), EngineError> {
        if self.is_cancelled() {
            Err(EngineError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Resolves once the turn is cancelled
    pub async fn cancelled(&self) {
        let mut receiver = self.receiver.clone();
        // The sender lives as long as `self`, so `changed` only errors if it is dropped
        while !*receiver.borrow_and_update() {
            if receiver.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }

    /// Run `fut` unless the turn is cancelled first
    pub async fn race<F: Future>(&self, fut: F) -> Result<F::Output, EngineError> {
        self.check()?;
        tokio::select! {
            biased;
            _ = self.cancelled() => Err(EngineError::Cancelled),
            output = fut => Ok(output),
        }
    }

    /// Sleep for `duration`, waking early with `Cancelled`
    pub async fn sleep(&self, duration: Duration) -> Result<(), EngineError> {
        if duration.is_zero() {
            return self.check();
        }
        self.race(tokio::time::sleep(duration)).await
    }
}
