//! Completion handle for pipelines ending in a terminal stage.

use crate::stage::{self, Shared, StageHandle};
use crate::StageError;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Resolves once the terminal stage has consumed its whole input.
///
/// Returned by [`Pipeline::for_each`](crate::Pipeline::for_each),
/// `pipeline >> sink(f)` and [`terminate`](crate::terminate). Dropping the
/// handle without calling [`wait`](Self::wait) still blocks until every
/// worker has finished; the work is never silently detached.
#[must_use = "dropping a Completion blocks until the pipeline has finished"]
pub struct Completion {
    shared: Arc<Shared>,
    stages: Vec<StageHandle>,
}

impl Completion {
    pub(crate) fn new(shared: Arc<Shared>, stages: Vec<StageHandle>) -> Self {
        Self { shared, stages }
    }

    /// Blocks until every stage has finished and reports the first stage
    /// failure, if any.
    pub fn wait(mut self) -> Result<(), StageError> {
        self.join()
    }

    /// Returns `true` once every worker thread has exited.
    pub fn is_finished(&self) -> bool {
        self.stages.iter().all(StageHandle::is_finished)
    }

    fn join(&mut self) -> Result<(), StageError> {
        stage::join_all(&self.shared, &mut self.stages);
        self.shared.take_failure().map_or(Ok(()), Err)
    }
}

impl Drop for Completion {
    fn drop(&mut self) {
        if self.stages.is_empty() {
            return;
        }
        if let Err(error) = self.join() {
            debug!(%error, "completion dropped after stage failure");
        }
    }
}

impl fmt::Debug for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completion")
            .field("stages", &self.shared.stage_count())
            .field("finished", &self.is_finished())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use crate::{terminate, Config, Pipeline};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_wait_after_all_items_seen() {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);

        let completion = terminate(0..50, move |_: i32| {
            seen.fetch_add(1, Ordering::Relaxed);
        });
        assert!(completion.wait().is_ok());
        assert_eq!(count.load(Ordering::Relaxed), 50);
    }

    #[test]
    fn test_drop_joins_workers() {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);

        drop(
            Pipeline::with_config(0..20, Config::default().with_capacity(3))
                .unwrap()
                .then(|x: u32| x + 1)
                .for_each(move |_| {
                    seen.fetch_add(1, Ordering::Relaxed);
                }),
        );
        assert_eq!(count.load(Ordering::Relaxed), 20);
    }

    #[test]
    fn test_panicking_terminal_reports_stage() {
        let completion = Pipeline::from_source(0..10).for_each(|x: u8| {
            assert!(x < 5, "refusing {x}");
        });
        let error = completion.wait().unwrap_err();
        assert_eq!(error.stage(), 0);
        assert!(error.is_panic());
    }
}
