//! Undo what an interrupted write leaves behind.
//!
//! A cancelled batch drops in-flight `put` futures at whatever await point
//! they reached, so cleanup that only runs on error returns never fires.
//! [`CleanupGuard`] ties it to `Drop` instead; success paths disarm it.

/// Runs a cleanup closure when dropped, unless disarmed first.
#[must_use = "the cleanup runs as soon as the guard is dropped"]
pub struct CleanupGuard {
    cleanup: Option<Box<dyn FnOnce() + Send>>,
}

impl CleanupGuard {
    pub fn new(cleanup: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cleanup: Some(Box::new(cleanup)),
        }
    }

    /// The write completed; nothing to undo.
    pub fn disarm(mut self) {
        self.cleanup = None;
    }
}

impl Drop for CleanupGuard {
    fn drop(&mut self) {
        if let Some(cleanup) = self.cleanup.take() {
            cleanup();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_guard() -> (CleanupGuard, Arc<AtomicUsize>) {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();
        let guard = CleanupGuard::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        (guard, runs)
    }

    #[test]
    fn runs_once_on_drop() {
        let (guard, runs) = counting_guard();
        assert_eq!(runs.load(Ordering::SeqCst), 0);
        drop(guard);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn disarmed_guard_does_nothing() {
        let (guard, runs) = counting_guard();
        guard.disarm();
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn runs_when_an_owning_future_is_dropped() {
        let (guard, runs) = counting_guard();
        let pending = async move {
            let _guard = guard;
            std::future::pending::<()>().await;
        };
        drop(pending);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }
}
