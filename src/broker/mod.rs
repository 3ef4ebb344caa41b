//! The `broker` module defines the boundary to the message broker and a
//! local, embedded implementation of it.
//!
//! - `client`: directory/data client traits, receiver/sender handles and
//!   the size-bounded `MessageBatch`.
//! - `message`: received and sendable message types.
//! - `engine`: `LocalBroker`, a sled-backed broker with topics,
//!   subscriptions and dead-letter sub-queues.
//! - `topic`: topic registry records and queue naming.

pub mod client;
pub mod engine;
pub mod message;
pub mod topic;

pub use client::{
    AddError, BrokerClient, BrokerDirectory, MessageBatch, MessageReceiver, MessageSender,
    SubscriptionStats,
};
pub use engine::LocalBroker;
pub use message::{
    ApplicationProperties, MessageState, ReceiveMode, ReceivedMessage, SendableMessage, SubQueue,
};
