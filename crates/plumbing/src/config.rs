use crate::ChannelError;

/// Smallest legal channel capacity. One slot is always kept free so that a
/// full ring and an empty ring have different cursor positions.
pub const MIN_CAPACITY: usize = 2;

/// Capacity used when none is given.
pub const DEFAULT_CAPACITY: usize = 2;

/// What a pipeline does when a stage fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Record the first failure, abort every channel of the pipeline and let
    /// all workers exit. Consumers observe an early end of stream.
    #[default]
    AbortAll,
    /// Emit the failure as an `Err` item of fallible stages and keep going.
    ///
    /// Only applies to stages whose output can carry an error
    /// ([`try_then`](crate::Pipeline::try_then), [`then_ok`](crate::Pipeline::then_ok)).
    /// A panic in any other stage still aborts the pipeline.
    Propagate,
}

/// Configuration for channels and pipelines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// Number of slots in each stage's output channel (default: 2).
    ///
    /// At most `capacity - 1` values are buffered between two stages.
    pub capacity: usize,
    /// Failure handling for every stage of the pipeline.
    pub failure_policy: FailurePolicy,
    /// Prefix for worker thread names (`<name>-stage-<index>`).
    pub name: &'static str,
}

impl Config {
    /// Creates a new configuration with custom settings.
    pub const fn new(capacity: usize, failure_policy: FailurePolicy) -> Self {
        Self {
            capacity,
            failure_policy,
            name: "plumbing",
        }
    }

    /// Sets the channel capacity.
    pub const fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Sets the failure policy.
    pub const fn with_failure_policy(mut self, failure_policy: FailurePolicy) -> Self {
        self.failure_policy = failure_policy;
        self
    }

    /// Sets the worker thread name prefix.
    pub const fn with_name(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }

    /// Checks the capacity lower bound.
    pub fn validate(&self) -> Result<(), ChannelError> {
        if self.capacity < MIN_CAPACITY {
            return Err(ChannelError::CapacityTooSmall {
                capacity: self.capacity,
                min: MIN_CAPACITY,
            });
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY, FailurePolicy::AbortAll)
    }
}

/// Stages run in lockstep: one value in flight per channel.
pub const LOCKSTEP_CONFIG: Config = Config::new(2, FailurePolicy::AbortAll);

/// Lets fast stages run up to 63 values ahead of slow ones.
pub const BUFFERED_CONFIG: Config = Config::new(64, FailurePolicy::AbortAll);
