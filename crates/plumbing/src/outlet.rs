//! Consumer view over a channel's read side.

use crate::Channel;
use std::fmt;
use std::iter::FusedIterator;

/// Iterable read side of a [`Channel`].
///
/// Holds no data of its own: every `next()` is a blocking
/// [`Channel::pop`]. Clones read from the same channel and compete for its
/// values, so each value is seen by exactly one clone.
///
/// An outlet without a channel ([`Outlet::end`], also the `Default`) is the
/// end marker and yields nothing.
///
/// # Example
///
/// ```
/// use plumbing_rs::Channel;
///
/// let channel = Channel::new(4).unwrap();
/// channel.push("Hello").unwrap();
/// channel.push("World").unwrap();
/// channel.close().unwrap();
///
/// let words: Vec<_> = channel.outlet().collect();
/// assert_eq!(words, ["Hello", "World"]);
/// ```
pub struct Outlet<T> {
    channel: Option<Channel<T>>,
}

impl<T> Outlet<T> {
    /// Binds a view to `channel`'s read side.
    pub fn new(channel: Channel<T>) -> Self {
        Self {
            channel: Some(channel),
        }
    }

    /// The end marker.
    pub const fn end() -> Self {
        Self { channel: None }
    }

    /// The channel this view reads from, if any.
    pub fn channel(&self) -> Option<&Channel<T>> {
        self.channel.as_ref()
    }

    /// Returns `true` if this view has nothing more to yield.
    ///
    /// Blocks while the bound channel is empty but not yet closed.
    pub fn is_end(&self) -> bool {
        self.channel.as_ref().map_or(true, |channel| !channel.is_open())
    }
}

impl<T> Iterator for Outlet<T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        self.channel.as_ref()?.pop()
    }
}

// End of stream is permanent: the sentinel is never consumed.
impl<T> FusedIterator for Outlet<T> {}

impl<T> Clone for Outlet<T> {
    fn clone(&self) -> Self {
        Self {
            channel: self.channel.clone(),
        }
    }
}

impl<T> Default for Outlet<T> {
    fn default() -> Self {
        Self::end()
    }
}

impl<T> From<Channel<T>> for Outlet<T> {
    fn from(channel: Channel<T>) -> Self {
        Self::new(channel)
    }
}

/// Two views are equal if they read the same channel, or if both have
/// reached the end. Comparing against [`Outlet::end`] is therefore the
/// "anything left?" test, and may block like [`Outlet::is_end`].
impl<T> PartialEq for Outlet<T> {
    fn eq(&self, other: &Self) -> bool {
        if let (Some(a), Some(b)) = (&self.channel, &other.channel) {
            if a.same_channel(b) {
                return true;
            }
        }
        self.is_end() && other.is_end()
    }
}

impl<T> fmt::Debug for Outlet<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.channel {
            Some(channel) => f.debug_tuple("Outlet").field(channel).finish(),
            None => f.write_str("Outlet(end)"),
        }
    }
}
