//! In-process token cache
//!
//! One slot per normalized host. A slot is an async mutex so the resolver can
//! hold it across issuance: concurrent misses for the same host wait for the
//! first issuance instead of invoking the tool again. Entries are never
//! evicted; they live as long as the cache.

use cgr_keyring_issuer::Token;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::Mutex as AsyncMutex;

/// A cached token and when it was issued
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub token: Token,
    pub issued_at: Instant,
}

impl CacheEntry {
    pub fn new(token: Token) -> Self {
        Self {
            token,
            issued_at: Instant::now(),
        }
    }
}

/// Slot holding at most one entry for a key
pub type CacheSlot = Arc<AsyncMutex<Option<CacheEntry>>>;

/// Token cache keyed by normalized host
#[derive(Debug, Default)]
pub struct TokenCache {
    slots: Mutex<HashMap<String, CacheSlot>>,
}

impl TokenCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the slot for `key`, creating an empty one if needed
    pub fn slot(&self, key: &str) -> CacheSlot {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(None)))
            .clone()
    }

    /// Peek at the entry for `key`.
    ///
    /// Returns `None` while an issuance for `key` is in flight.
    pub fn get(&self, key: &str) -> Option<CacheEntry> {
        let slot = {
            let slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
            slots.get(key)?.clone()
        };
        let entry = slot.try_lock().ok()?;
        entry.clone()
    }

    /// Number of keys holding a token
    pub fn len(&self) -> usize {
        let slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots
            .values()
            .filter(|slot| matches!(slot.try_lock(), Ok(entry) if entry.is_some()))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
