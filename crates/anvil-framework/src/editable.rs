//! Editable NORMAL responses.
//!
//! A NORMAL response stays linked to the message that issued it for a
//! retention window. If the invocation is edited within that window the
//! runtime re-dispatches it and updates the linked response.

use std::collections::HashMap;
use std::time::Duration;

use anvil_core::MessageRef;
use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::time::Instant;

/// Key-value store from invocation message to response message, with TTL.
#[async_trait]
pub trait EditStore: Send + Sync + 'static {
    async fn insert(&self, invocation: MessageRef, response: MessageRef, ttl: Duration);

    /// The live response linked to `invocation`, if not expired.
    async fn get(&self, invocation: &MessageRef) -> Option<MessageRef>;

    async fn remove(&self, invocation: &MessageRef) -> Option<MessageRef>;
}

/// In-memory [`EditStore`]. Expired entries are dropped lazily.
#[derive(Default)]
pub struct MemoryEditStore {
    entries: RwLock<HashMap<MessageRef, (MessageRef, Instant)>>,
}

impl MemoryEditStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops every expired entry.
    pub fn purge_expired(&self) {
        let now = Instant::now();
        self.entries.write().retain(|_, (_, expires)| *expires > now);
    }

    /// Number of entries, expired ones included until purged.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[async_trait]
impl EditStore for MemoryEditStore {
    async fn insert(&self, invocation: MessageRef, response: MessageRef, ttl: Duration) {
        self.purge_expired();
        self.entries
            .write()
            .insert(invocation, (response, Instant::now() + ttl));
    }

    async fn get(&self, invocation: &MessageRef) -> Option<MessageRef> {
        let now = Instant::now();
        self.entries
            .read()
            .get(invocation)
            .filter(|(_, expires)| *expires > now)
            .map(|(response, _)| response.clone())
    }

    async fn remove(&self, invocation: &MessageRef) -> Option<MessageRef> {
        let now = Instant::now();
        self.entries
            .write()
            .remove(invocation)
            .filter(|(_, expires)| *expires > now)
            .map(|(response, _)| response)
    }
}
