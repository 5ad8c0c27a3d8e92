//! Pipeline composition: one worker per transformation, wired by channels.

use crate::stage::{self, Shared, StageHandle, Step};
use crate::{BoxError, ChannelError, Completion, Config, FailurePolicy, Outlet, StageError};
use std::fmt;
use std::mem;
use std::ops::Shr;
use std::sync::Arc;
use tracing::debug;

/// Where a pipeline's items currently come from.
enum Upstream<T> {
    /// No stage yet: the caller's iterator, consumed by the first stage.
    Source(Box<dyn Iterator<Item = T> + Send>),
    /// Output channel of the last stage.
    Outlet(Outlet<T>),
}

impl<T> Iterator for Upstream<T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        match self {
            Self::Source(source) => source.next(),
            Self::Outlet(outlet) => outlet.next(),
        }
    }
}

/// A chain of concurrently running stages.
///
/// Each [`then`](Self::then) starts one worker thread that reads the previous
/// stage's output (or the source), applies the function, and writes into a
/// fresh bounded channel. The pipeline is an iterator over the last channel
/// and owns every worker: [`wait`](Self::wait) and [`shutdown`](Self::shutdown)
/// join them, and so does dropping the pipeline.
///
/// # Example
///
/// ```
/// use plumbing_rs::Pipeline;
///
/// let labels: Vec<String> = Pipeline::from_source(vec![1, 2, 3, 4, 5])
///     .then(|x| x * 2)
///     .then(|x| format!("x{x}"))
///     .collect();
///
/// assert_eq!(labels, ["x2", "x4", "x6", "x8", "x10"]);
/// ```
pub struct Pipeline<T> {
    upstream: Upstream<T>,
    shared: Arc<Shared>,
    stages: Vec<StageHandle>,
}

impl<T: Send + 'static> Pipeline<T> {
    /// Starts a pipeline from any iterable, with the default [`Config`].
    pub fn from_source<S>(source: S) -> Self
    where
        S: IntoIterator<Item = T>,
        S::IntoIter: Send + 'static,
    {
        Self::build(source, Config::default())
    }

    /// Starts a pipeline with a custom configuration.
    ///
    /// Fails if `config.capacity` is below 2.
    pub fn with_config<S>(source: S, config: Config) -> Result<Self, ChannelError>
    where
        S: IntoIterator<Item = T>,
        S::IntoIter: Send + 'static,
    {
        config.validate()?;
        Ok(Self::build(source, config))
    }

    fn build<S>(source: S, config: Config) -> Self
    where
        S: IntoIterator<Item = T>,
        S::IntoIter: Send + 'static,
    {
        Self {
            upstream: Upstream::Source(Box::new(source.into_iter())),
            shared: Shared::new(config),
            stages: Vec::new(),
        }
    }

    /// Adds a stage applying `f` to every item.
    ///
    /// Returns immediately; the stage runs on its own thread. A panic in `f`
    /// aborts the whole pipeline regardless of the failure policy.
    pub fn then<U, F>(self, mut f: F) -> Pipeline<U>
    where
        U: Send + 'static,
        F: FnMut(T) -> U + Send + 'static,
    {
        self.stage(move |item, output| match output.push(f(item)) {
            Ok(()) => Step::Continue,
            Err(_) => Step::Stop,
        })
    }

    /// Adds a stage applying a fallible `f` to every item.
    ///
    /// What happens on `Err` (or a panic in `f`) depends on the
    /// [`FailurePolicy`]: under `AbortAll` the pipeline stops and the error is
    /// returned by [`wait`](Self::wait); under `Propagate` the error is
    /// emitted as an `Err` item and the stage carries on.
    pub fn try_then<U, E, F>(self, mut f: F) -> Pipeline<Result<U, StageError>>
    where
        U: Send + 'static,
        E: Into<BoxError>,
        F: FnMut(T) -> Result<U, E> + Send + 'static,
    {
        self.fallible_stage(move |item| f(item).map(Ok).map_err(Into::into))
    }

    /// Adds a terminal stage that consumes every item for its side effects.
    ///
    /// Returns a [`Completion`] that resolves once the stage has seen all
    /// input.
    pub fn for_each<F>(self, mut f: F) -> Completion
    where
        F: FnMut(T) + Send + 'static,
    {
        let (input, shared, mut stages) = self.into_parts();
        let index = shared.next_stage();

        stages.extend(stage::spawn(
            &shared,
            index,
            input,
            move |item| {
                f(item);
                Step::Continue
            },
            || {},
        ));
        debug!(stage = index, "terminal stage connected");

        Completion::new(shared, stages)
    }

    /// Shared plumbing for value-producing stages: allocates the output
    /// channel, spawns the worker and hands `step` the output to push into.
    fn stage<U, S>(self, mut step: S) -> Pipeline<U>
    where
        U: Send + 'static,
        S: FnMut(T, &crate::Channel<U>) -> Step + Send + 'static,
    {
        let (input, shared, mut stages) = self.into_parts();
        let index = shared.next_stage();
        let output = shared.channel::<U>();

        let sender = output.clone();
        let closer = output.clone();
        stages.extend(stage::spawn(
            &shared,
            index,
            input,
            move |item| step(item, &sender),
            move || stage::close_output(&closer, index),
        ));
        debug!(stage = index, capacity = output.capacity(), "stage connected");

        Pipeline {
            upstream: Upstream::Outlet(Outlet::new(output)),
            shared,
            stages,
        }
    }

    /// `attempt` returns `Err` for its own failure and `Ok(Err(_))` for an
    /// error item passed through from upstream.
    fn fallible_stage<U, A>(self, mut attempt: A) -> Pipeline<Result<U, StageError>>
    where
        U: Send + 'static,
        A: FnMut(T) -> Result<Result<U, StageError>, BoxError> + Send + 'static,
    {
        let policy = self.shared.config().failure_policy;
        let index = self.shared.stage_count();

        self.stage(move |item, output| {
            let error = match stage::guarded(&mut attempt, item) {
                Ok(Ok(produced)) => {
                    return match output.push(produced) {
                        Ok(()) => Step::Continue,
                        Err(_) => Step::Stop,
                    };
                }
                Ok(Err(source)) => StageError::Failed {
                    stage: index,
                    source,
                },
                Err(message) => StageError::Panicked {
                    stage: index,
                    message,
                },
            };

            match policy {
                FailurePolicy::AbortAll => Step::Fail(error),
                FailurePolicy::Propagate => {
                    debug!(stage = index, %error, "forwarding stage error");
                    match output.push(Err(error)) {
                        Ok(()) => Step::Continue,
                        Err(_) => Step::Stop,
                    }
                }
            }
        })
    }
}

impl<T: Send + 'static> Pipeline<Result<T, StageError>> {
    /// Adds a fallible stage that applies `f` to `Ok` items and forwards `Err`
    /// items from earlier stages untouched.
    ///
    /// Failures of `f` follow the [`FailurePolicy`] like
    /// [`try_then`](Self::try_then).
    pub fn then_ok<U, E, F>(self, mut f: F) -> Pipeline<Result<U, StageError>>
    where
        U: Send + 'static,
        E: Into<BoxError>,
        F: FnMut(T) -> Result<U, E> + Send + 'static,
    {
        self.fallible_stage(move |item| match item {
            Ok(value) => f(value).map(Ok).map_err(Into::into),
            Err(upstream) => Ok(Err(upstream)),
        })
    }
}

impl<T> Pipeline<T> {
    /// A competing consumer view of the last stage's output.
    ///
    /// `None` while the pipeline has no stage yet.
    pub fn outlet(&self) -> Option<Outlet<T>> {
        match &self.upstream {
            Upstream::Outlet(outlet) => Some(outlet.clone()),
            Upstream::Source(_) => None,
        }
    }

    /// Number of stages added so far.
    pub fn stage_count(&self) -> usize {
        self.shared.stage_count()
    }

    /// The configuration every stage of this pipeline uses.
    pub fn config(&self) -> Config {
        *self.shared.config()
    }

    /// Discards unread output, joins every worker and reports the first
    /// stage failure, if any.
    pub fn wait(mut self) -> Result<(), StageError> {
        self.upstream.by_ref().for_each(drop);
        stage::join_all(&self.shared, &mut self.stages);
        self.shared.take_failure().map_or(Ok(()), Err)
    }

    /// Aborts every stage, joins the workers and reports the first stage
    /// failure recorded before or during shutdown.
    ///
    /// Values still buffered in channels are dropped.
    pub fn shutdown(mut self) -> Result<(), StageError> {
        self.shared.abort_all();
        stage::join_all(&self.shared, &mut self.stages);
        self.shared.take_failure().map_or(Ok(()), Err)
    }

    /// Moves the parts out, leaving `self` without workers so its `Drop` is
    /// a no-op.
    fn into_parts(mut self) -> (Upstream<T>, Arc<Shared>, Vec<StageHandle>) {
        let upstream = mem::replace(&mut self.upstream, Upstream::Outlet(Outlet::end()));
        let stages = mem::take(&mut self.stages);
        (upstream, Arc::clone(&self.shared), stages)
    }
}

impl<T> Iterator for Pipeline<T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        self.upstream.next()
    }
}

impl<T> Drop for Pipeline<T> {
    fn drop(&mut self) {
        if self.stages.is_empty() {
            return;
        }
        self.shared.abort_all();
        stage::join_all(&self.shared, &mut self.stages);
        if let Some(error) = self.shared.take_failure() {
            debug!(%error, "pipeline dropped after stage failure");
        }
    }
}

impl<T> fmt::Debug for Pipeline<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("stages", &self.stage_count())
            .field("running", &self.stages.iter().filter(|s| !s.is_finished()).count())
            .field("config", self.shared.config())
            .finish_non_exhaustive()
    }
}

/// `pipeline >> f` is `pipeline.then(f)`.
impl<T, U, F> Shr<F> for Pipeline<T>
where
    T: Send + 'static,
    U: Send + 'static,
    F: FnMut(T) -> U + Send + 'static,
{
    type Output = Pipeline<U>;

    fn shr(self, f: F) -> Pipeline<U> {
        self.then(f)
    }
}

/// A terminal, no-value stage function. Built with [`sink`].
pub struct Terminal<F>(F);

/// Marks `f` as a terminal stage: `pipeline >> sink(f)` is
/// `pipeline.for_each(f)` and yields a [`Completion`].
pub fn sink<F>(f: F) -> Terminal<F> {
    Terminal(f)
}

impl<T, F> Shr<Terminal<F>> for Pipeline<T>
where
    T: Send + 'static,
    F: FnMut(T) + Send + 'static,
{
    type Output = Completion;

    fn shr(self, terminal: Terminal<F>) -> Completion {
        self.for_each(terminal.0)
    }
}

/// Runs `f` over `source` on a new worker and returns its output.
///
/// `connect(connect(source, f1), f2)` works too, but
/// [`Pipeline::then`] keeps all workers owned by one pipeline.
pub fn connect<S, U, F>(source: S, f: F) -> Pipeline<U>
where
    S: IntoIterator,
    S::IntoIter: Send + 'static,
    S::Item: Send + 'static,
    U: Send + 'static,
    F: FnMut(S::Item) -> U + Send + 'static,
{
    Pipeline::from_source(source).then(f)
}

/// Runs the no-value function `f` over `source` on a new worker.
pub fn terminate<S, F>(source: S, f: F) -> Completion
where
    S: IntoIterator,
    S::IntoIter: Send + 'static,
    S::Item: Send + 'static,
    F: FnMut(S::Item) + Send + 'static,
{
    Pipeline::from_source(source).for_each(f)
}

/// Connects a source through any number of stages, left to right.
///
/// `connect!(source, f1, f2, f3)` is
/// `Pipeline::from_source(source) >> f1 >> f2 >> f3`. Wrap the last function
/// in [`sink`] to get a [`Completion`] instead of a [`Pipeline`].
///
/// Closures passed through `>>` need annotated parameter types.
///
/// ```
/// use plumbing_rs::{connect, sink};
/// use std::sync::{Arc, Mutex};
///
/// let seen = Arc::new(Mutex::new(Vec::new()));
/// let log = Arc::clone(&seen);
///
/// connect!(
///     vec!["Hello", "World"],
///     |s: &str| s.chars().next(),
///     sink(move |c: Option<char>| log.lock().unwrap().extend(c)),
/// )
/// .wait()
/// .unwrap();
///
/// assert_eq!(*seen.lock().unwrap(), ['H', 'W']);
/// ```
#[macro_export]
macro_rules! connect {
    ($source:expr $(, $stage:expr)+ $(,)?) => {
        $crate::Pipeline::from_source($source) $(>> $stage)+
    };
}
