//! Blocking map shared library.
//!
//! [`BlockingMap`] is a concurrent associative container whose reads wait until a value for the
//! requested key has been published. It is meant for correlating producers and consumers by key,
//! e.g. matching asynchronous replies to the requests that are waiting for them.

/// Blocking map and its supporting cache primitives.
pub mod cache;
pub mod cancel;
pub mod config;
pub mod error;

pub use cache::blocking::BlockingMap;
pub use cancel::CancelToken;
pub use config::{MapConfig, OverwritePolicy};
pub use error::MapError;
