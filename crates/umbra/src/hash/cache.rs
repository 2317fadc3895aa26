use std::collections::HashMap;
use std::sync::Mutex;

use super::fingerprint::ContentHash;

/// Identity-keyed memo table for hash computations.
///
/// Keys are the addresses of immutable, `Arc`-shared objects; the cache does
/// not own the keyed objects and an entry is only meaningful while its
/// object is alive. Callers must clear or drop the cache no later than the
/// evaluator discards the expressions/values it references.
///
/// Concurrent use is allowed: a race merely recomputes the same immutable
/// object's hash and overwrites an entry with an identical digest.
#[derive(Default)]
pub struct HashCache {
    entries: Mutex<HashMap<usize, ContentHash>>,
}

/// Cache for expression hashes, keyed by expression node identity.
pub type ExprHashCache = HashCache;

/// Cache for forced-value hashes, keyed by value payload identity.
pub type ValueHashCache = HashCache;

impl HashCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn get(&self, token: usize) -> Option<ContentHash> {
        if let Ok(entries) = self.entries.lock() {
            return entries.get(&token).copied();
        }
        None
    }

    pub(crate) fn insert(&self, token: usize, hash: ContentHash) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(token, hash);
        }
    }

    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
