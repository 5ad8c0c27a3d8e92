use crate::config::{DEFAULT_CAPACITY, MIN_CAPACITY};
use crate::invariants::{
    debug_assert_bounded_live, debug_assert_cursor_in_range, debug_assert_fifo_count,
    debug_assert_not_sealed,
};
use crate::{ChannelError, Config, Metrics, Outlet, SendError, TryPopError, TrySendError};
use std::fmt;
use std::mem;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

// =============================================================================
// SLOT PROTOCOL
// =============================================================================
//
// The ring holds `capacity` slots and two cursors, `write` and `read`, both
// taken modulo `capacity`. One slot always stays free, so:
//
//   readable = (write - read) mod capacity
//   writable = (read - write - 1) mod capacity
//
// Closing writes a `Closed` sentinel into the next write slot. The sentinel is
// never consumed: `read` stops in front of it, so once every value ahead of it
// has been taken, every reader sees end of stream on every later call.
//
// Abort is out of band (a flag, not a slot): it wakes every waiter, pushes fail
// and reads return end of stream immediately, abandoning buffered values.
//
// All cursor and slot updates happen under `state`; waiters release the lock
// while blocked on `ready_for_write` / `ready_for_read`. No user code runs
// under the lock, so a poisoned mutex still holds consistent state and is
// recovered rather than propagated.
//
// =============================================================================

enum Slot<T> {
    Vacant,
    Value(T),
    Closed,
}

struct State<T> {
    slots: Box<[Slot<T>]>,
    write: usize,
    read: usize,
    /// End-of-stream sentinel has been written.
    closed: bool,
    aborted: bool,
    metrics: Metrics,
}

impl<T> State<T> {
    fn new(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || Slot::Vacant);

        Self {
            slots: slots.into_boxed_slice(),
            write: 0,
            read: 0,
            closed: false,
            aborted: false,
            metrics: Metrics::new(),
        }
    }

    #[inline]
    fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Free slots available for writing.
    #[inline]
    fn write_headroom(&self) -> usize {
        let capacity = self.capacity();
        (self.read + capacity - self.write - 1) % capacity
    }

    /// Occupied slots available for reading, sentinel included.
    #[inline]
    fn read_headroom(&self) -> usize {
        let capacity = self.capacity();
        (self.write + capacity - self.read) % capacity
    }

    #[inline]
    fn advance(&self, pos: usize) -> usize {
        let next = (pos + 1) % self.capacity();
        debug_assert_cursor_in_range!("ring", next, self.capacity());
        next
    }

    /// No further writes are accepted.
    #[inline]
    fn sealed(&self) -> bool {
        self.closed || self.aborted
    }

    fn write_slot(&mut self, slot: Slot<T>) {
        debug_assert_not_sealed!(self.closed);
        let pos = self.write;
        self.slots[pos] = slot;
        self.write = self.advance(pos);
        debug_assert_bounded_live!(self.read_headroom(), self.capacity());
    }

    fn write_value(&mut self, value: T) {
        self.write_slot(Slot::Value(value));
        self.metrics.pushed += 1;
    }

    /// Takes the value at `read`. Returns `None` (leaving it in place) if the
    /// slot holds the sentinel. Caller guarantees `read_headroom() > 0`.
    fn take(&mut self) -> Option<T> {
        let pos = self.read;
        match mem::replace(&mut self.slots[pos], Slot::Vacant) {
            Slot::Value(value) => {
                self.read = self.advance(pos);
                self.metrics.popped += 1;
                debug_assert_fifo_count!(self.metrics.popped, self.metrics.pushed);
                Some(value)
            }
            slot => {
                self.slots[pos] = slot;
                None
            }
        }
    }
}

struct ChannelInner<T> {
    state: Mutex<State<T>>,
    ready_for_write: Condvar,
    ready_for_read: Condvar,
}

/// Bounded blocking FIFO with an explicit end of stream.
///
/// `Channel` is a shared handle: clones refer to the same ring, and the ring is
/// freed when the last handle is dropped. Intended for one producer and any
/// number of consumers; each value is delivered to exactly one consumer.
///
/// # Example
///
/// ```
/// use plumbing_rs::Channel;
///
/// let channel = Channel::new(4).unwrap();
/// channel.push(1).unwrap();
/// channel.push(2).unwrap();
/// channel.close().unwrap();
///
/// assert_eq!(channel.pop(), Some(1));
/// assert_eq!(channel.pop(), Some(2));
/// assert_eq!(channel.pop(), None);
/// ```
pub struct Channel<T> {
    inner: Arc<ChannelInner<T>>,
}

impl<T> Channel<T> {
    /// Creates a channel with `capacity` slots.
    ///
    /// One slot is reserved, so at most `capacity - 1` values are buffered.
    /// Fails with [`ChannelError::CapacityTooSmall`] if `capacity < 2`.
    pub fn new(capacity: usize) -> Result<Self, ChannelError> {
        if capacity < MIN_CAPACITY {
            return Err(ChannelError::CapacityTooSmall {
                capacity,
                min: MIN_CAPACITY,
            });
        }
        Ok(Self::with_valid_capacity(capacity))
    }

    /// Creates a channel sized by `config.capacity`.
    pub fn from_config(config: &Config) -> Result<Self, ChannelError> {
        config.validate()?;
        Ok(Self::with_valid_capacity(config.capacity))
    }

    pub(crate) fn with_valid_capacity(capacity: usize) -> Self {
        Self {
            inner: Arc::new(ChannelInner {
                state: Mutex::new(State::new(capacity)),
                ready_for_write: Condvar::new(),
                ready_for_read: Condvar::new(),
            }),
        }
    }

    #[inline]
    fn lock(&self) -> MutexGuard<'_, State<T>> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Blocks until a slot is free or the channel stops accepting writes.
    fn wait_writable<'a>(&'a self, mut state: MutexGuard<'a, State<T>>) -> MutexGuard<'a, State<T>> {
        if state.write_headroom() == 0 && !state.sealed() {
            state.metrics.push_waits += 1;
        }
        self.inner
            .ready_for_write
            .wait_while(state, |s| s.write_headroom() == 0 && !s.sealed())
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Blocks until a slot (value or sentinel) is readable or the channel is aborted.
    fn wait_readable<'a>(&'a self, mut state: MutexGuard<'a, State<T>>) -> MutexGuard<'a, State<T>> {
        if state.read_headroom() == 0 && !state.aborted {
            state.metrics.pop_waits += 1;
        }
        self.inner
            .ready_for_read
            .wait_while(state, |s| s.read_headroom() == 0 && !s.aborted)
            .unwrap_or_else(PoisonError::into_inner)
    }

    // ---------------------------------------------------------------------
    // PRODUCER API
    // ---------------------------------------------------------------------

    /// Writes `value`, blocking while the channel is full.
    ///
    /// Fails once the channel has been closed, handing the value back.
    pub fn push(&self, value: T) -> Result<(), SendError<T>> {
        let mut state = self.wait_writable(self.lock());
        if state.sealed() {
            return Err(SendError(value));
        }

        state.write_value(value);
        drop(state);

        self.inner.ready_for_read.notify_one();
        Ok(())
    }

    /// Writes `value` if a slot is free right now.
    pub fn try_push(&self, value: T) -> Result<(), TrySendError<T>> {
        let mut state = self.lock();
        if state.sealed() {
            return Err(TrySendError::Closed(value));
        }
        if state.write_headroom() == 0 {
            return Err(TrySendError::Full(value));
        }

        state.write_value(value);
        drop(state);

        self.inner.ready_for_read.notify_one();
        Ok(())
    }

    /// Ends the stream.
    ///
    /// Blocks while the channel is full, then writes the end-of-stream marker
    /// behind every value already pushed. Readers drain those values first and
    /// then see end of stream. Closing twice returns [`ChannelError::Closed`].
    pub fn close(&self) -> Result<(), ChannelError> {
        let mut state = self.wait_writable(self.lock());
        if state.sealed() {
            return Err(ChannelError::Closed);
        }

        state.write_slot(Slot::Closed);
        state.closed = true;
        drop(state);

        self.inner.ready_for_read.notify_all();
        // Other producers blocked on a full ring must observe the close.
        self.inner.ready_for_write.notify_all();
        Ok(())
    }

    // ---------------------------------------------------------------------
    // CONSUMER API
    // ---------------------------------------------------------------------

    /// Blocks until something is readable and reports whether it is a value.
    ///
    /// Consumes nothing. With several readers the answer can be stale by the
    /// time the caller acts on it; prefer [`pop`](Self::pop), which checks and
    /// takes in one step.
    pub fn is_open(&self) -> bool {
        let state = self.wait_readable(self.lock());
        let open = !state.aborted && matches!(state.slots[state.read], Slot::Value(_));
        drop(state);

        if open {
            // Pass the wakeup on; this call took a notification without taking a value.
            self.inner.ready_for_read.notify_one();
        }
        open
    }

    /// Removes and returns the next value, blocking while the channel is empty.
    ///
    /// Returns `None` at end of stream, and on every call after that.
    pub fn pop(&self) -> Option<T> {
        let mut state = self.wait_readable(self.lock());
        if state.aborted {
            return None;
        }

        let value = state.take();
        drop(state);

        if value.is_some() {
            self.inner.ready_for_write.notify_one();
        }
        value
    }

    /// Removes and returns the next value if one is available right now.
    pub fn try_pop(&self) -> Result<T, TryPopError> {
        let mut state = self.lock();
        if state.aborted {
            return Err(TryPopError::Closed);
        }
        if state.read_headroom() == 0 {
            return Err(TryPopError::Empty);
        }

        let value = state.take().ok_or(TryPopError::Closed)?;
        drop(state);

        self.inner.ready_for_write.notify_one();
        Ok(value)
    }

    // ---------------------------------------------------------------------
    // PIPELINE API
    // ---------------------------------------------------------------------

    /// Abandons the channel: wakes every waiter, rejects further pushes and
    /// ends the stream for readers without draining buffered values.
    pub(crate) fn abort(&self) {
        let mut state = self.lock();
        if state.aborted {
            return;
        }
        state.aborted = true;
        drop(state);

        self.inner.ready_for_read.notify_all();
        self.inner.ready_for_write.notify_all();
    }

    #[cfg(test)]
    pub(crate) fn is_aborted(&self) -> bool {
        self.lock().aborted
    }

    // ---------------------------------------------------------------------
    // STATUS
    // ---------------------------------------------------------------------

    /// Number of slots, including the reserved one.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.lock().capacity()
    }

    /// Number of buffered values (the end-of-stream marker is not counted).
    pub fn len(&self) -> usize {
        let state = self.lock();
        state.read_headroom() - usize::from(state.closed)
    }

    /// Returns `true` if no values are buffered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` once the channel no longer accepts values.
    ///
    /// Unlike [`is_open`](Self::is_open) this never blocks and says nothing
    /// about values still waiting to be read.
    pub fn is_closed(&self) -> bool {
        self.lock().sealed()
    }

    /// Snapshot of this channel's counters.
    pub fn metrics(&self) -> Metrics {
        self.lock().metrics
    }

    /// Returns `true` if both handles refer to the same channel.
    #[inline]
    pub fn same_channel(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Returns a consumer view over this channel.
    pub fn outlet(&self) -> Outlet<T> {
        Outlet::new(self.clone())
    }
}

impl<T> Clone for Channel<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Default for Channel<T> {
    fn default() -> Self {
        Self::with_valid_capacity(DEFAULT_CAPACITY)
    }
}

impl<T> fmt::Debug for Channel<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("Channel")
            .field("capacity", &state.capacity())
            .field("readable", &state.read_headroom())
            .field("closed", &state.closed)
            .field("aborted", &state.aborted)
            .finish()
    }
}
