/// Counters for one channel, updated under the channel lock.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Metrics {
    /// Values written.
    pub pushed: u64,
    /// Values read.
    pub popped: u64,
    /// Pushes (and closes) that found the channel full and had to wait.
    pub push_waits: u64,
    /// Reads that found the channel empty and had to wait.
    pub pop_waits: u64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Values written but not yet read.
    #[inline]
    pub fn in_flight(&self) -> u64 {
        self.pushed - self.popped
    }
}
