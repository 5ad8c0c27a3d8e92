//! Plumbing - Concurrent Pipelines from Plain Functions
//!
//! Turns a chain of ordinary transformation functions into a chain of
//! concurrently running stages. Each stage runs on its own named thread and
//! hands its results to the next one through a bounded, blocking channel, so
//! a slow stage applies backpressure to everything upstream of it.
//!
//! # Key Features
//!
//! - Bounded FIFO [`Channel`] with blocking `push`/`pop` and an explicit close
//! - [`Outlet`] iterator views; cloned outlets compete for values
//! - [`Pipeline`] composition via `then`, `>>` or the [`connect!`] macro
//! - Terminal stages returning a joinable [`Completion`]
//! - Stage panics and errors surface as [`StageError`], never as hangs
//!
//! # Example
//!
//! ```
//! use plumbing_rs::{sink, Pipeline};
//! use std::sync::{Arc, Mutex};
//!
//! let log = Arc::new(Mutex::new(Vec::new()));
//! let out = Arc::clone(&log);
//!
//! let first_char = |s: String| s.chars().next().unwrap_or(' ');
//! let completion = Pipeline::from_source(vec!["Hello".to_string(), "World".to_string()])
//!     >> first_char
//!     >> sink(move |c: char| out.lock().unwrap().push(c));
//!
//! completion.wait().unwrap();
//! assert_eq!(*log.lock().unwrap(), ['H', 'W']);
//! ```

mod channel;
mod completion;
mod config;
mod error;
mod invariants;
mod metrics;
mod outlet;
mod pipeline;
mod stage;

pub use channel::Channel;
pub use completion::Completion;
pub use config::{
    Config, FailurePolicy, BUFFERED_CONFIG, DEFAULT_CAPACITY, LOCKSTEP_CONFIG, MIN_CAPACITY,
};
pub use error::{BoxError, ChannelError, SendError, StageError, TryPopError, TrySendError};
pub use metrics::Metrics;
pub use outlet::Outlet;
pub use pipeline::{connect, sink, terminate, Pipeline, Terminal};
