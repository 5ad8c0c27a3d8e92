//! Debug assertion macros for channel invariants.
//!
//! Only active in debug builds (`debug_assert!`), so release builds pay nothing.

/// Assert that the ring never holds more than `capacity - 1` live slots.
///
/// One slot is always kept free so that `write == read` means empty.
///
/// Used in: `Channel::push()` and `Channel::close()` after advancing `write`
macro_rules! debug_assert_bounded_live {
    ($live:expr, $capacity:expr) => {
        debug_assert!(
            $live < $capacity,
            "live slots {} reached capacity {} (reserved slot was overwritten)",
            $live,
            $capacity
        )
    };
}

/// Assert that a cursor stays inside the slot array.
///
/// Used in: `State::advance()`
macro_rules! debug_assert_cursor_in_range {
    ($name:literal, $pos:expr, $capacity:expr) => {
        debug_assert!(
            $pos < $capacity,
            "{} cursor {} out of range for capacity {}",
            $name,
            $pos,
            $capacity
        )
    };
}

/// Assert that nothing is written behind the end-of-stream sentinel.
///
/// Used in: `State::write_slot()`
macro_rules! debug_assert_not_sealed {
    ($closed:expr) => {
        debug_assert!(!$closed, "write after the end-of-stream sentinel")
    };
}

/// Assert that reads never outrun writes.
///
/// Used in: `Channel::pop()` after taking a value
macro_rules! debug_assert_fifo_count {
    ($popped:expr, $pushed:expr) => {
        debug_assert!(
            $popped <= $pushed,
            "popped {} values but only {} were pushed",
            $popped,
            $pushed
        )
    };
}

pub(crate) use debug_assert_bounded_live;
pub(crate) use debug_assert_cursor_in_range;
pub(crate) use debug_assert_fifo_count;
pub(crate) use debug_assert_not_sealed;
