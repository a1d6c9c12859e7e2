//! Deferred device teardown keyed by session generation

use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use tokio::task::JoinHandle;

/// Background tasks that release a session's device after its grace period.
///
/// The task only carries the generation it was scheduled for; the action it
/// runs must compare that generation with the current one before touching
/// anything, so a late task from an old session is inert.
#[derive(Default)]
pub struct TeardownScheduler {
    pending: Mutex<Vec<(u64, JoinHandle<()>)>>,
}

impl TeardownScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule<F, Fut>(&self, generation: u64, delay: Duration, action: F)
    where
        F: FnOnce(u64) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            action(generation).await;
        });

        let mut pending = self.lock();
        pending.retain(|(_, handle)| !handle.is_finished());
        pending.push((generation, handle));
    }

    /// Generations whose teardown has not run to completion yet
    pub fn pending(&self) -> Vec<u64> {
        let mut pending = self.lock();
        pending.retain(|(_, handle)| !handle.is_finished());
        pending.iter().map(|(generation, _)| *generation).collect()
    }

    /// Abort every pending teardown (shutdown path)
    pub fn abort_all(&self) {
        for (generation, handle) in self.lock().drain(..) {
            tracing::debug!(generation, "Aborting deferred teardown");
            handle.abort();
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(u64, JoinHandle<()>)>> {
        self.pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
