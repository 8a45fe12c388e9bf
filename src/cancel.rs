use crate::{LastFmError, Result};
use std::time::Duration;
use tokio::sync::watch;

/// Cooperative cancellation for backoff waits.
///
/// - `cancel()` flips a flag and wakes sleepers.
/// - `reset()` clears the flag so later operations can run again.
///
/// Clones share the same flag, so cancelling one client handle interrupts
/// waits started through any of its clones.
#[derive(Clone, Debug)]
pub struct CancellationState {
    tx: watch::Sender<bool>,
}

impl Default for CancellationState {
    fn default() -> Self {
        Self::new()
    }
}

impl CancellationState {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }

    pub fn reset(&self) {
        let _ = self.tx.send(false);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    /// Sleep for `duration` unless cancelled first.
    pub async fn sleep(&self, duration: Duration) -> Result<()> {
        sleep_with_cancel(self.subscribe(), duration).await
    }
}

pub async fn sleep_with_cancel(
    mut cancel_rx: watch::Receiver<bool>,
    duration: Duration,
) -> Result<()> {
    if *cancel_rx.borrow() {
        return Err(LastFmError::Cancelled);
    }
    if duration.is_zero() {
        return Ok(());
    }

    let sleeper = tokio::time::sleep(duration);
    tokio::pin!(sleeper);
    tokio::select! {
        _ = &mut sleeper => Ok(()),
        _ = async {
            loop {
                if cancel_rx.changed().await.is_err() {
                    // Sender gone: nobody can cancel any more.
                    std::future::pending::<()>().await;
                }
                if *cancel_rx.borrow() {
                    break;
                }
            }
        } => Err(LastFmError::Cancelled),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cancelled_before_sleep_fails_fast() {
        let state = CancellationState::new();
        state.cancel();
        assert!(matches!(
            state.sleep(Duration::from_secs(3600)).await,
            Err(LastFmError::Cancelled)
        ));

        state.reset();
        assert!(state.sleep(Duration::ZERO).await.is_ok());
    }

    #[tokio::test]
    async fn cancel_interrupts_running_sleep() {
        let state = CancellationState::new();
        let sleeper = {
            let state = state.clone();
            tokio::spawn(async move { state.sleep(Duration::from_secs(3600)).await })
        };
        tokio::task::yield_now().await;
        state.cancel();

        assert!(matches!(sleeper.await.unwrap(), Err(LastFmError::Cancelled)));
    }
}
