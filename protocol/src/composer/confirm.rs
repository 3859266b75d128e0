//! Polling a signature until it lands, fails, or the window closes.

use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use super::cancel::CancelToken;
use crate::error::{Result, ShadowError};
use crate::ledger::{ConfirmationStatus, LedgerClient, TxSignature};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Confirmation {
    Landed { slot: u64 },
    TimedOut,
}

/// Poll `signature` every `poll` until confirmed or `window` elapses.
///
/// An execution failure comes back as the matching [`ShadowError`].
/// Transient read errors count as "not yet".
pub(crate) async fn await_confirmation(
    ledger: &dyn LedgerClient,
    signature: &TxSignature,
    window: Duration,
    poll: Duration,
    cancel: &CancelToken,
) -> Result<Confirmation> {
    let deadline = Instant::now() + window;
    loop {
        match ledger.confirmation_status(signature).await {
            Ok(ConfirmationStatus::Confirmed { slot }) => return Ok(Confirmation::Landed { slot }),
            Ok(ConfirmationStatus::Failed(rejection)) => return Err(rejection.into()),
            Ok(_) => {}
            Err(e) if e.is_transient() => {
                debug!(signature = %signature, error = %e, "status read failed");
            }
            Err(e) => return Err(e),
        }

        if Instant::now() >= deadline {
            return Ok(Confirmation::TimedOut);
        }
        tokio::select! {
            _ = cancel.cancelled() => return Err(ShadowError::Cancelled),
            _ = tokio::time::sleep(poll) => {}
        }
    }
}
