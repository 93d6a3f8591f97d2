use std::collections::HashMap;
use std::time::Instant;

use bytes::Bytes;
use parking_lot::RwLock;

/// One cached read response.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub body: Bytes,
    /// Server-supplied change token (the `ETag` response header value),
    /// attached as `If-None-Match` on revalidation. Distinct from the
    /// topology etag.
    pub change_token: String,
    pub inserted_at: Instant,
}

/// Per-URL store of read responses used for conditional requests.
///
/// Keyed by the fully-qualified request URL including the query string. At
/// most one entry exists per URL; a later `put` replaces the earlier entry
/// atomically. Entries are never expired by time alone; they are replaced
/// by a fresh successful response for the same URL, or dropped by
/// [`clear`](Self::clear).
///
/// Writes never populate or consult the cache; the executor only calls in
/// here for read commands.
pub struct HttpCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    enabled: bool,
}

impl HttpCache {
    /// A disabled cache never stores or returns entries, so the executor
    /// never attaches conditional headers.
    pub fn new(enabled: bool) -> Self {
        HttpCache {
            entries: RwLock::new(HashMap::new()),
            enabled,
        }
    }

    pub fn get(&self, url: &str) -> Option<CacheEntry> {
        if !self.enabled {
            return None;
        }
        self.entries.read().get(url).cloned()
    }

    pub fn put(&self, url: &str, body: Bytes, change_token: impl Into<String>) {
        if !self.enabled {
            return;
        }
        let entry = CacheEntry {
            body,
            change_token: change_token.into(),
            inserted_at: Instant::now(),
        };
        self.entries.write().insert(url.to_string(), entry);
    }

    /// Drops every entry, forcing the next read of each URL to revalidate
    /// against the server. Exposed for callers that detected stale reads.
    pub fn clear(&self) {
        self.entries.write().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
