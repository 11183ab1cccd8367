//! TTL-bound quote storage.
//!
//! A quote is written once, read until its TTL elapses, and deleted when an
//! order consumes it. The store never hands back an expired entry; expired
//! entries are dropped on read and by the periodic sweeper. Keys are unique
//! opaque ids, so there is no cross-key contention.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::models::StoredQuote;

#[derive(Debug, Error)]
pub enum QuoteStoreError {
    #[error("quote store unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait QuoteStore: Send + Sync {
    async fn put(&self, quote: StoredQuote, ttl: Duration) -> Result<(), QuoteStoreError>;

    /// Returns the stored quote if present and unexpired.
    async fn get(&self, quote_id: &str) -> Result<Option<StoredQuote>, QuoteStoreError>;

    async fn delete(&self, quote_id: &str) -> Result<(), QuoteStoreError>;
}

struct Entry {
    quote: StoredQuote,
    expires_at: Instant,
}

impl Entry {
    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// Single-node in-memory implementation. A clustered deployment substitutes
/// an external store behind the same trait.
#[derive(Clone, Default)]
pub struct InMemoryQuoteStore {
    store: Arc<RwLock<HashMap<String, Entry>>>,
}

impl InMemoryQuoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops every expired entry. Called by the background sweeper so unread
    /// quotes do not linger past their TTL.
    pub fn sweep_expired(&self) -> usize {
        let mut store = self.store.write().unwrap_or_else(|e| e.into_inner());
        let before = store.len();
        store.retain(|_, entry| !entry.is_expired());
        before - store.len()
    }

    pub fn len(&self) -> usize {
        self.store.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Spawns the periodic sweeper task.
    pub fn spawn_sweeper(&self, interval: Duration) -> tokio::task::JoinHandle<()> {
        let store = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let evicted = store.sweep_expired();
                if evicted > 0 {
                    tracing::debug!(evicted, "evicted expired quotes");
                }
            }
        })
    }
}

#[async_trait]
impl QuoteStore for InMemoryQuoteStore {
    async fn put(&self, quote: StoredQuote, ttl: Duration) -> Result<(), QuoteStoreError> {
        let mut store = self.store.write().unwrap_or_else(|e| e.into_inner());
        store.insert(
            quote.response.quote_id.clone(),
            Entry {
                quote,
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn get(&self, quote_id: &str) -> Result<Option<StoredQuote>, QuoteStoreError> {
        {
            let store = self.store.read().unwrap_or_else(|e| e.into_inner());
            match store.get(quote_id) {
                Some(entry) if !entry.is_expired() => return Ok(Some(entry.quote.clone())),
                Some(_) => {}
                None => return Ok(None),
            }
        }
        // Expired: evict under the write lock.
        let mut store = self.store.write().unwrap_or_else(|e| e.into_inner());
        if store.get(quote_id).map(|e| e.is_expired()).unwrap_or(false) {
            store.remove(quote_id);
        }
        Ok(None)
    }

    async fn delete(&self, quote_id: &str) -> Result<(), QuoteStoreError> {
        let mut store = self.store.write().unwrap_or_else(|e| e.into_inner());
        store.remove(quote_id);
        Ok(())
    }
}
