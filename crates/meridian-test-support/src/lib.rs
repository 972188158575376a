//! Shared test mocks and utilities for the Meridian event backbone.

mod clock;
mod jitter;
mod transport;

pub use clock::FixedClock;
pub use jitter::FixedJitter;
pub use transport::ScriptedTransport;
