//! Broker boundary - the external publisher collaborator and friends.
//!
//! The dispatcher never talks to a broker client directly. External
//! deliveries are sealed into an envelope and handed to a `Publisher`;
//! the consuming side pulls messages from a `Subscriber`.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       Dispatcher                             │
//! │  - route / resolve -> external driver                        │
//! │  - Envelope::seal(event) -> Message                          │
//! └─────────────────────────────────────────────────────────────┘
//!                            │ publish(ctx, message)
//!                            ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │              Publisher + Subscriber Traits                   │
//! │  Publisher: publish(ctx, message)                            │
//! │  Subscriber: poll(timeout) / ack(id) / nack(id)              │
//! └─────────────────────────────────────────────────────────────┘
//!          │                  │                     │
//!          ▼                  ▼                     ▼
//! ┌─────────────┐    ┌─────────────┐    ┌─────────────────────┐
//! │ InMemoryBus │    │LogPublisher │    │ Kafka / NATS client │
//! │ (included)  │    │ (included)  │    │    (external)       │
//! └─────────────┘    └─────────────┘    └─────────────────────┘
//! ```

mod in_memory_bus;
mod log_publisher;
mod publisher;
mod subscriber;

pub use in_memory_bus::InMemoryBus;
pub use log_publisher::LogPublisher;
pub use publisher::{Message, PublishError, Publisher};
pub use subscriber::Subscriber;
