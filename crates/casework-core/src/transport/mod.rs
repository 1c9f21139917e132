//! Queue transport seam: the `Transport` trait, the in-process broker, and
//! the per-worker publisher pool.

pub mod broker;
pub mod publisher;

pub use broker::{QueueBroker, Subscription, Transport, TransportError};
pub use publisher::{Publisher, PublisherPool, WorkerId};
