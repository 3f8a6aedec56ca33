//! Debounced commit helper for user-driven edits.
//!
//! Namespace edits in settings views are committed only after an idle
//! period with no further edits. Each `schedule` supersedes the pending
//! action; dropping the debouncer cancels whatever is still waiting. The
//! timer is the only cancellable unit here; an action that has already
//! started runs to completion.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;

/// Idle period before a scheduled action fires.
pub const DEFAULT_IDLE: Duration = Duration::from_millis(1000);

pub struct Debouncer {
    idle: Duration,
    pending: Option<JoinHandle<()>>,
}

impl Debouncer {
    pub fn new(idle: Duration) -> Self {
        Self { idle, pending: None }
    }

    /// Schedule `action` to run after the idle period, cancelling any
    /// previously scheduled action.
    pub fn schedule<F>(&mut self, action: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.cancel();
        let idle = self.idle;
        self.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(idle).await;
            action.await;
        }));
    }

    /// Cancel the pending action, if any.
    pub fn cancel(&mut self) {
        if let Some(handle) = self.pending.take() {
            handle.abort();
        }
    }
}

impl Default for Debouncer {
    fn default() -> Self {
        Self::new(DEFAULT_IDLE)
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn bump(counter: Arc<AtomicUsize>) -> impl Future<Output = ()> + Send + 'static {
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn fires_after_idle_period() {
        let fired = Arc::new(AtomicUsize::new(0));
        let mut d = Debouncer::new(Duration::from_millis(10));
        d.schedule(bump(Arc::clone(&fired)));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn rescheduling_supersedes_pending_action() {
        let fired = Arc::new(AtomicUsize::new(0));
        let mut d = Debouncer::new(Duration::from_millis(30));
        d.schedule(bump(Arc::clone(&fired)));
        tokio::time::sleep(Duration::from_millis(10)).await;
        d.schedule(bump(Arc::clone(&fired)));
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1, "only the last schedule fires");
    }

    #[tokio::test]
    async fn drop_cancels_pending_action() {
        let fired = Arc::new(AtomicUsize::new(0));
        {
            let mut d = Debouncer::new(Duration::from_millis(10));
            d.schedule(bump(Arc::clone(&fired)));
        }
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }
}
