use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uvcd_common::backend::FrameSignal;
use uvcd_common::types::StreamHandle;

/// Periodic task issuing one frame signal per tick for an open stream.
pub struct FramePump {
    handle: StreamHandle,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl FramePump {
    pub fn start(signal: Arc<dyn FrameSignal>, handle: StreamHandle, interval: Duration) -> Self {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => {
                        debug!(target: "uvcd", handle = handle.get(), "frame pump stopped");
                        break;
                    }
                    _ = ticker.tick() => signal.issue(handle),
                }
            }
        });
        Self {
            handle,
            cancel,
            task,
        }
    }

    pub fn handle(&self) -> StreamHandle {
        self.handle
    }

    /// Cancels the task and waits for it to finish; no signal is issued
    /// after this returns.
    pub async fn stop(mut self) {
        self.cancel.cancel();
        if let Err(e) = (&mut self.task).await {
            if !e.is_cancelled() {
                warn!(target: "uvcd", error = %e, "frame pump task failed");
            }
        }
    }
}

impl Drop for FramePump {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    #[derive(Default)]
    struct Counter(AtomicU64);

    impl FrameSignal for Counter {
        fn issue(&self, _handle: StreamHandle) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn no_signals_after_stop() {
        let counter = Arc::new(Counter::default());
        let pump = FramePump::start(
            counter.clone(),
            StreamHandle::from_raw(3).unwrap(),
            Duration::from_millis(2),
        );
        tokio::time::sleep(Duration::from_millis(30)).await;
        pump.stop().await;
        let stopped_at = counter.0.load(Ordering::SeqCst);
        assert!(stopped_at > 0);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(counter.0.load(Ordering::SeqCst), stopped_at);
    }

    #[tokio::test]
    async fn dropping_cancels() {
        let counter = Arc::new(Counter::default());
        let pump = FramePump::start(
            counter.clone(),
            StreamHandle::from_raw(1).unwrap(),
            Duration::from_millis(2),
        );
        drop(pump);
        tokio::time::sleep(Duration::from_millis(20)).await;
        let settled = counter.0.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(counter.0.load(Ordering::SeqCst), settled);
    }
}
