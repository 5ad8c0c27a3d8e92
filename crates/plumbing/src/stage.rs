//! Stage workers and the state a pipeline's workers share.
//!
//! Every stage is one named OS thread that drains its input iterator, feeds
//! each item to a step closure and, once the input is exhausted, runs a
//! completion hook (closing its output channel). The pipeline keeps the
//! [`StageHandle`]s and joins them; nothing is detached.
//!
//! Failure handling is centralised in [`Shared`]: the first recorded
//! [`StageError`] wins, and recording one aborts every channel the pipeline
//! allocated so that all workers, upstream and downstream, wake up and exit.

use crate::{Channel, Config, StageError};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use tracing::{debug, trace, warn};

/// Type-erased channel abort, so one list can hold channels of every stage type.
trait AbortChannel: Send + Sync {
    fn abort_channel(&self);
}

impl<T: Send + 'static> AbortChannel for Channel<T> {
    fn abort_channel(&self) {
        self.abort();
    }
}

/// State shared by a pipeline, its completion handle and all of its workers.
pub(crate) struct Shared {
    config: Config,
    next_index: AtomicUsize,
    aborted: AtomicBool,
    failure: Mutex<Option<StageError>>,
    channels: Mutex<Vec<Box<dyn AbortChannel>>>,
}

impl Shared {
    pub(crate) fn new(config: Config) -> Arc<Self> {
        Arc::new(Self {
            config,
            next_index: AtomicUsize::new(0),
            aborted: AtomicBool::new(false),
            failure: Mutex::new(None),
            channels: Mutex::new(Vec::new()),
        })
    }

    #[inline]
    pub(crate) fn config(&self) -> &Config {
        &self.config
    }

    /// Reserves the next stage index.
    pub(crate) fn next_stage(&self) -> usize {
        self.next_index.fetch_add(1, Ordering::Relaxed)
    }

    pub(crate) fn stage_count(&self) -> usize {
        self.next_index.load(Ordering::Relaxed)
    }

    #[inline]
    pub(crate) fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::Acquire)
    }

    /// Allocates a stage output channel owned by this pipeline.
    ///
    /// A channel allocated after the pipeline was aborted starts out aborted.
    pub(crate) fn channel<T: Send + 'static>(&self) -> Channel<T> {
        let channel = Channel::with_valid_capacity(self.config.capacity);

        let mut channels = lock(&self.channels);
        channels.push(Box::new(channel.clone()));
        let aborted = self.is_aborted();
        drop(channels);

        if aborted {
            channel.abort();
        }
        channel
    }

    /// Records `error` (only the first one is kept) and aborts the pipeline.
    pub(crate) fn fail(&self, error: StageError) {
        warn!(stage = error.stage(), %error, "stage failed, aborting pipeline");

        let mut failure = lock(&self.failure);
        if failure.is_none() {
            *failure = Some(error);
        }
        drop(failure);

        self.abort_all();
    }

    /// Aborts every channel of the pipeline. Idempotent.
    pub(crate) fn abort_all(&self) {
        if self.aborted.swap(true, Ordering::AcqRel) {
            return;
        }

        let channels = lock(&self.channels);
        trace!(channels = channels.len(), "aborting pipeline channels");
        for channel in channels.iter() {
            channel.abort_channel();
        }
    }

    pub(crate) fn take_failure(&self) -> Option<StageError> {
        lock(&self.failure).take()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// What a stage does after handing one item to its step closure.
pub(crate) enum Step {
    Continue,
    /// Output no longer accepts values; exit without error.
    Stop,
    Fail(StageError),
}

enum Outcome {
    Exhausted(u64),
    Stopped(u64),
    Aborted(u64),
    Failed(StageError),
}

/// A running stage worker.
pub(crate) struct StageHandle {
    index: usize,
    thread: JoinHandle<()>,
}

impl StageHandle {
    pub(crate) fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }
}

/// Starts stage `index` on its own thread.
///
/// `step` is called once per input item; `done` runs only if the input was
/// drained completely. Returns `None` (after recording
/// [`StageError::Spawn`]) if the thread could not be created.
pub(crate) fn spawn<I, S, D>(
    shared: &Arc<Shared>,
    index: usize,
    input: I,
    mut step: S,
    done: D,
) -> Option<StageHandle>
where
    I: Iterator + Send + 'static,
    S: FnMut(I::Item) -> Step + Send + 'static,
    D: FnOnce() + Send + 'static,
{
    let worker_shared = Arc::clone(shared);
    let body = move || {
        let shared = worker_shared;
        debug!(stage = index, "stage started");

        // Catches panics from the step closure and from the input iterator.
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| drive(&shared, input, &mut step)));

        match outcome {
            Ok(Outcome::Exhausted(items)) => {
                done();
                debug!(stage = index, items, "stage finished");
            }
            Ok(Outcome::Stopped(items)) => {
                debug!(stage = index, items, "stage output closed early");
            }
            Ok(Outcome::Aborted(items)) => {
                debug!(stage = index, items, "stage aborted");
            }
            Ok(Outcome::Failed(error)) => shared.fail(error),
            Err(payload) => shared.fail(StageError::Panicked {
                stage: index,
                message: panic_message(payload.as_ref()),
            }),
        }
    };

    let name = format!("{}-stage-{}", shared.config().name, index);
    match thread::Builder::new().name(name).spawn(body) {
        Ok(thread) => Some(StageHandle { index, thread }),
        Err(source) => {
            shared.fail(StageError::Spawn {
                stage: index,
                source,
            });
            None
        }
    }
}

fn drive<I, S>(shared: &Shared, input: I, step: &mut S) -> Outcome
where
    I: Iterator,
    S: FnMut(I::Item) -> Step,
{
    let mut items = 0;
    for item in input {
        if shared.is_aborted() {
            return Outcome::Aborted(items);
        }
        match step(item) {
            Step::Continue => items += 1,
            Step::Stop => return Outcome::Stopped(items),
            Step::Fail(error) => return Outcome::Failed(error),
        }
    }
    // An aborted upstream outlet ends like an exhausted one.
    if shared.is_aborted() {
        return Outcome::Aborted(items);
    }
    Outcome::Exhausted(items)
}

/// Joins every handle in `stages`, leaving it empty.
pub(crate) fn join_all(shared: &Shared, stages: &mut Vec<StageHandle>) {
    for stage in stages.drain(..) {
        if let Err(payload) = stage.thread.join() {
            shared.fail(StageError::Panicked {
                stage: stage.index,
                message: panic_message(payload.as_ref()),
            });
        }
    }
}

/// Closes a stage's output once its input is exhausted.
pub(crate) fn close_output<T>(channel: &Channel<T>, index: usize) {
    if let Err(error) = channel.close() {
        trace!(stage = index, %error, "output already closed");
    }
}

/// Calls `f(arg)`, turning a panic into its message.
pub(crate) fn guarded<A, R, F>(f: &mut F, arg: A) -> Result<R, String>
where
    F: FnMut(A) -> R,
{
    panic::catch_unwind(AssertUnwindSafe(|| f(arg))).map_err(|payload| panic_message(payload.as_ref()))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}
