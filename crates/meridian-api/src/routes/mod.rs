//! Route modules, one per resource.

pub mod dead_letters;
pub mod events;
pub mod health;
pub mod snapshots;
pub mod subscriptions;
