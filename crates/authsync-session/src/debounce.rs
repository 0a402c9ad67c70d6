//! Cancel-and-reschedule debouncing.
//!
//! Every [`Debouncer::trigger`] restarts the quiet window; the action runs
//! once the window elapses with no further triggers. The action is spawned
//! so the timer loop keeps accepting triggers while it runs; callers that
//! must not overlap pair this with [`crate::guard::ReentrancyGuard`].

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Handle to a running debounce loop. Dropping it stops the loop.
#[derive(Debug)]
pub struct Debouncer {
    tx: mpsc::UnboundedSender<()>,
    fired: Arc<AtomicU64>,
    handle: JoinHandle<()>,
}

impl Debouncer {
    /// Spawn the loop. `action` runs once per quiet `window`; `cancel` stops
    /// both the loop and any action still running.
    pub fn spawn<F, Fut>(window: Duration, cancel: CancellationToken, mut action: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (tx, mut rx) = mpsc::unbounded_channel::<()>();
        let fired = Arc::new(AtomicU64::new(0));
        let fired_in_loop = Arc::clone(&fired);

        let handle = tokio::spawn(async move {
            loop {
                // Idle until the first trigger of a burst.
                tokio::select! {
                    () = cancel.cancelled() => return,
                    msg = rx.recv() => {
                        if msg.is_none() {
                            return;
                        }
                    }
                }

                // Each further trigger restarts the window.
                loop {
                    tokio::select! {
                        () = cancel.cancelled() => return,
                        () = tokio::time::sleep(window) => break,
                        msg = rx.recv() => {
                            if msg.is_none() {
                                return;
                            }
                        }
                    }
                }

                let _ = fired_in_loop.fetch_add(1, Ordering::Relaxed);
                tracing::trace!(window_ms = window.as_millis(), "debounce window elapsed");
                let run = action();
                let cancel = cancel.clone();
                drop(tokio::spawn(async move {
                    tokio::select! {
                        () = cancel.cancelled() => {}
                        () = run => {}
                    }
                }));
            }
        });

        Self { tx, fired, handle }
    }

    /// Request the action, restarting the quiet window.
    pub fn trigger(&self) {
        let _ = self.tx.send(());
    }

    /// Number of times the action has been started.
    pub fn fired(&self) -> u64 {
        self.fired.load(Ordering::Relaxed)
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    fn counting(window_ms: u64, cancel: CancellationToken) -> (Debouncer, Arc<AtomicU32>) {
        let runs = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&runs);
        let debouncer = Debouncer::spawn(Duration::from_millis(window_ms), cancel, move || {
            let counter = Arc::clone(&counter);
            async move {
                let _ = counter.fetch_add(1, Ordering::SeqCst);
            }
        });
        (debouncer, runs)
    }

    async fn sleep_ms(ms: u64) {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn burst_collapses_to_one_run() {
        let (debouncer, runs) = counting(200, CancellationToken::new());
        for _ in 0..10 {
            debouncer.trigger();
            sleep_ms(20).await;
        }
        sleep_ms(500).await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(debouncer.fired(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn separated_bursts_run_twice() {
        let (debouncer, runs) = counting(200, CancellationToken::new());
        debouncer.trigger();
        sleep_ms(50).await;
        debouncer.trigger();
        sleep_ms(500).await;
        debouncer.trigger();
        sleep_ms(500).await;
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn nothing_runs_before_window_elapses() {
        let (debouncer, runs) = counting(200, CancellationToken::new());
        debouncer.trigger();
        sleep_ms(150).await;
        assert_eq!(runs.load(Ordering::SeqCst), 0);
        sleep_ms(100).await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_drops_pending_trigger() {
        let cancel = CancellationToken::new();
        let (debouncer, runs) = counting(200, cancel.clone());
        debouncer.trigger();
        sleep_ms(50).await;
        cancel.cancel();
        sleep_ms(500).await;
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn no_trigger_no_run() {
        let (_debouncer, runs) = counting(200, CancellationToken::new());
        sleep_ms(1_000).await;
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }
}
