//! Meridian Dispatch — webhook delivery.
//!
//! Matches newly appended events against active subscriptions and POSTs
//! the serialized envelope to each subscriber's callback, with bounded
//! retry, exponential backoff, and dead-lettering on exhaustion. Delivery
//! is at-least-once; consumers must be idempotent.

pub mod backoff;
pub mod dispatcher;
pub mod transport;

pub use backoff::BackoffPolicy;
pub use dispatcher::{Dispatcher, DispatcherConfig};
pub use transport::{
    DeliveryFailure, DeliveryMode, DeliveryTransport, HttpTransport, NoOpTransport,
};
