use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::broker::message::SubQueue;

/// Represents a topic in the local broker.
///
/// A topic fans every message sent to it out to each of its subscriptions.
/// The record is stored as JSON in the broker's `topics` tree, keyed by name.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct Topic {
    pub name: String,
    pub subscriptions: BTreeSet<String>,
}

impl Topic {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            subscriptions: BTreeSet::new(),
        }
    }

    /// Adds a subscription. Returns `false` if it already existed.
    pub fn subscribe(&mut self, subscription: &str) -> bool {
        self.subscriptions.insert(subscription.to_string())
    }

    pub fn has_subscription(&self, subscription: &str) -> bool {
        self.subscriptions.contains(subscription)
    }
}

/// Name of the sled tree holding one queue of a subscription.
///
/// Mirrors the broker's entity path, e.g.
/// `orders/Subscriptions/billing/$DeadLetterQueue`.
pub fn queue_tree_name(topic: &str, subscription: &str, sub_queue: SubQueue) -> String {
    match sub_queue {
        SubQueue::Main => format!("{topic}/Subscriptions/{subscription}"),
        SubQueue::DeadLetter => format!("{topic}/Subscriptions/{subscription}/$DeadLetterQueue"),
    }
}
