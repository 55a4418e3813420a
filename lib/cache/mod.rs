/// Blocking map implementation.
pub mod blocking;
mod slot;
/// Cache traits for non-blocking and blocking reads.
pub mod traits;
