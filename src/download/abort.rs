//! Write-once abort flag shared by all workers of one download

use tokio_util::sync::CancellationToken;

/// Shared abort flag. Once triggered it stays set.
#[derive(Debug, Clone, Default)]
pub struct AbortSignal {
    token: CancellationToken,
}

impl AbortSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the flag
    pub fn trigger(&self) {
        self.token.cancel();
    }

    pub fn is_set(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Wait until the flag is set
    pub async fn triggered(&self) {
        self.token.cancelled().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_abort_signal_is_write_once() {
        let signal = AbortSignal::new();
        assert!(!signal.is_set());
        signal.trigger();
        assert!(signal.is_set());
        signal.trigger();
        assert!(signal.is_set());
    }

    #[test]
    fn test_triggered_resolves_once_set() {
        let signal = AbortSignal::new();
        signal.trigger();
        tokio_test::block_on(signal.triggered());
        tokio_test::assert_ready!(tokio_test::task::spawn(signal.triggered()).poll());
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let signal = AbortSignal::new();
        let worker_view = signal.clone();
        let waiter = tokio::spawn(async move { worker_view.triggered().await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        signal.trigger();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }
}
