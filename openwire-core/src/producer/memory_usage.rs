//! Producer-side flow control window (spec.md §3 "Flow control").
//!
//! Grounded on `activemq-cpp/src/main/activemq/core/ActiveMQProducerKernel.cpp`:
//! a producer bound to a positive `windowSize` tracks outstanding unacked
//! bytes, and `waitForSpace` blocks `send()` until the broker's
//! `ProducerAck` brings usage back under the window. A `windowSize` of `0`
//! disables flow control entirely (every send proceeds unthrottled).

use tokio::sync::Notify;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

pub struct MemoryUsage {
    window_size: i64,
    used: AtomicI64,
    notify: Notify,
}

impl MemoryUsage {
    pub fn new(window_size: i32) -> Self {
        Self {
            window_size: i64::from(window_size.max(0)),
            used: AtomicI64::new(0),
            notify: Notify::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.window_size > 0
    }

    pub fn used(&self) -> i64 {
        self.used.load(Ordering::SeqCst)
    }

    /// Reserves `size` bytes of window, waiting if the window is already
    /// full (spec.md invariant: a bound producer with `windowSize > 0` must
    /// never have more than `windowSize` bytes of unacknowledged sends in
    /// flight). Returns immediately if flow control is disabled.
    pub async fn wait_for_space(&self, size: i64, timeout: Option<Duration>) -> bool {
        if !self.is_enabled() {
            return true;
        }
        loop {
            if self.used.load(Ordering::SeqCst) + size <= self.window_size {
                self.used.fetch_add(size, Ordering::SeqCst);
                return true;
            }
            match timeout {
                None => self.notify.notified().await,
                Some(duration) => {
                    if tokio::time::timeout(duration, self.notify.notified())
                        .await
                        .is_err()
                    {
                        return false;
                    }
                }
            }
        }
    }

    /// Releases `size` bytes of window once the broker's `ProducerAck`
    /// confirms the send completed.
    pub fn release(&self, size: i64) {
        if !self.is_enabled() {
            return;
        }
        let previous = self.used.fetch_sub(size, Ordering::SeqCst);
        if previous - size < self.window_size {
            self.notify.notify_waiters();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn disabled_window_never_blocks() {
        let usage = MemoryUsage::new(0);
        assert!(usage.wait_for_space(1_000_000, Some(Duration::from_millis(10))).await);
    }

    #[tokio::test]
    async fn blocks_until_release_frees_space() {
        let usage = std::sync::Arc::new(MemoryUsage::new(100));
        assert!(usage.wait_for_space(80, None).await);
        assert_eq!(usage.used(), 80);

        let waiter = usage.clone();
        let handle = tokio::spawn(async move { waiter.wait_for_space(50, None).await });
        tokio::task::yield_now().await;
        usage.release(80);
        assert!(handle.await.unwrap());
        assert_eq!(usage.used(), 50);
    }

    #[tokio::test]
    async fn times_out_when_space_never_frees() {
        let usage = MemoryUsage::new(10);
        assert!(usage.wait_for_space(10, None).await);
        assert!(!usage.wait_for_space(5, Some(Duration::from_millis(20))).await);
    }
}
