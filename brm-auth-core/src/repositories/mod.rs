//! Storage seams for throttle bookkeeping.

pub mod attempts;

pub use attempts::{AttemptRepository, InMemoryAttemptRepository};
