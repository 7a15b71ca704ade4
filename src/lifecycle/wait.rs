//! Fixed-interval block-height polling with cancellation.
use crate::adapter::ChainAdapter;
use std::time::Duration;
use tokio::{
    sync::watch,
    time,
};
use tracing::{
    trace,
    warn,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum WaitError {
    #[error("wait cancelled")]
    Cancelled,
    #[error("gave up after {0:?}")]
    TimedOut(Duration),
}

/// Owning side of a cancellation signal.
#[derive(Debug)]
pub struct CancelSource(watch::Sender<bool>);

impl CancelSource {
    pub fn new() -> Self {
        Self(watch::channel(false).0)
    }

    pub fn token(&self) -> CancelToken {
        CancelToken(self.0.subscribe())
    }

    pub fn cancel(&self) {
        self.0.send_replace(true);
    }
}

impl Default for CancelSource {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Debug)]
pub struct CancelToken(watch::Receiver<bool>);

impl CancelToken {
    pub fn is_cancelled(&self) -> bool {
        *self.0.borrow()
    }

    /// Resolves once cancelled. Never resolves if the source is dropped uncancelled.
    pub async fn cancelled(&mut self) {
        let closed = self.0.wait_for(|cancelled| *cancelled).await.is_err();
        if closed {
            std::future::pending::<()>().await;
        }
    }
}

/// Polls until the current height is at least `target`. Returns the height observed.
///
/// A height equal to `target` resolves on the first poll. Failed polls are logged and retried;
/// only cancellation ends the wait early.
pub async fn wait_for_block<A: ChainAdapter>(
    adapter: &A,
    target: u64,
    interval: Duration,
    cancel: &mut CancelToken,
) -> Result<u64, WaitError> {
    loop {
        if cancel.is_cancelled() {
            return Err(WaitError::Cancelled);
        }
        match adapter.current_block().await {
            Ok(height) if height >= target => return Ok(height),
            Ok(height) => trace!(height, target, "target block not reached"),
            Err(e) => warn!(target, error = %e, "block height poll failed, retrying"),
        }
        tokio::select! {
            _ = time::sleep(interval) => {}
            _ = cancel.cancelled() => return Err(WaitError::Cancelled),
        }
    }
}

/// Polls until the height is strictly past `block`, optionally bounded by `timeout`.
pub async fn wait_past_block<A: ChainAdapter>(
    adapter: &A,
    block: u64,
    interval: Duration,
    timeout: Option<Duration>,
    cancel: &mut CancelToken,
) -> Result<u64, WaitError> {
    let target = block.saturating_add(1);
    match timeout {
        None => wait_for_block(adapter, target, interval, cancel).await,
        Some(limit) => {
            time::timeout(limit, wait_for_block(adapter, target, interval, cancel))
                .await
                .unwrap_or(Err(WaitError::TimedOut(limit)))
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use crate::test_helpers::SimulatedChain;
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn wait_for_block__target_equals_current__resolves_without_sleeping() {
        // given
        let chain = SimulatedChain::new();
        chain.advance(10);
        let source = CancelSource::new();
        let mut token = source.token();
        let started = Instant::now();

        // when
        let height = wait_for_block(&chain, 10, Duration::from_secs(3600), &mut token)
            .await
            .unwrap();

        // then
        assert_eq!(height, 10);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn wait_for_block__polls_on_interval_until_reached() {
        // given
        let chain = SimulatedChain::new().with_blocks_per_poll(1);
        let source = CancelSource::new();
        let mut token = source.token();
        let started = Instant::now();

        // when
        let height = wait_for_block(&chain, 3, Duration::from_secs(1), &mut token)
            .await
            .unwrap();

        // then the height was 0, 1 and 2 on the first three polls
        assert_eq!(height, 3);
        assert_eq!(started.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn wait_for_block__cancelled__stops_waiting() {
        // given
        let chain = SimulatedChain::new();
        let source = CancelSource::new();
        let mut token = source.token();
        let cancel_later = async {
            time::sleep(Duration::from_secs(5)).await;
            source.cancel();
        };

        // when
        let (result, ()) = tokio::join!(
            wait_for_block(&chain, 100, Duration::from_secs(1), &mut token),
            cancel_later
        );

        // then
        assert_eq!(result, Err(WaitError::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn wait_for_block__failing_polls__are_retried() {
        let chain = SimulatedChain::new();
        chain.advance(4);
        chain.fail_next_block_polls(2);
        let mut token = CancelSource::new().token();
        let started = Instant::now();

        let height = wait_for_block(&chain, 4, Duration::from_secs(1), &mut token)
            .await
            .unwrap();

        assert_eq!(height, 4);
        assert_eq!(started.elapsed(), Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn wait_past_block__requires_strictly_greater_height() {
        let chain = SimulatedChain::new();
        chain.advance(5);
        let mut token = CancelSource::new().token();

        let result = wait_past_block(
            &chain,
            5,
            Duration::from_secs(1),
            Some(Duration::from_secs(10)),
            &mut token,
        )
        .await;

        assert_eq!(result, Err(WaitError::TimedOut(Duration::from_secs(10))));
    }

    #[tokio::test(start_paused = true)]
    async fn wait_past_block__next_block__resolves() {
        let chain = SimulatedChain::new().with_blocks_per_poll(1);
        chain.advance(5);
        let mut token = CancelSource::new().token();

        let height = wait_past_block(&chain, 5, Duration::from_secs(1), None, &mut token)
            .await
            .unwrap();

        assert_eq!(height, 6);
    }
}
