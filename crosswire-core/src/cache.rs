//! Continuation-token cache
//!
//! Some upstreams attach an opaque continuation token to a tool call
//! (Gemini's thought signature) that must be replayed on the next turn to
//! keep multi-step tool calling coherent. Entries are keyed by tool-call id
//! and owned exclusively by this cache; adapters read and write through the
//! interface and never hold references into the storage. Entries are removed
//! only by eviction, never by per-entry client deletion.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::debug;

/// Default maximum entry age before eviction
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(3600);
/// Default maximum entry count
pub const DEFAULT_MAX_ENTRIES: usize = 1000;

#[derive(Debug, Clone)]
struct CacheEntry {
    token: String,
    request_id: String,
    stored_at: Instant,
}

/// Aggregate counters for introspection and logging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
}

/// TTL/capacity-bounded store of continuation tokens, safe for concurrent
/// access from multiple in-flight requests.
#[derive(Debug, Default)]
pub struct ContinuationCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl ContinuationCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a token under a tool-call id. Overwrites any previous token for
    /// the same id.
    pub fn store(&self, tool_call_id: &str, token: &str, request_id: &str) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        debug!(tool_call_id, request_id, "storing continuation token");
        entries.insert(
            tool_call_id.to_string(),
            CacheEntry {
                token: token.to_string(),
                request_id: request_id.to_string(),
                stored_at: Instant::now(),
            },
        );
    }

    /// Look up the token for a tool-call id, if still cached
    pub fn get(&self, tool_call_id: &str) -> Option<String> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.get(tool_call_id).map(|entry| entry.token.clone())
    }

    /// The request id recorded when a token was stored
    pub fn request_id(&self, tool_call_id: &str) -> Option<String> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries
            .get(tool_call_id)
            .map(|entry| entry.request_id.clone())
    }

    /// Remove entries older than `max_age`; if the store still exceeds
    /// `max_entries`, keep only the most recently stored entries up to that
    /// count.
    pub fn evict(&self, max_age: Duration, max_entries: usize) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();
        let before = entries.len();

        entries.retain(|_, entry| now.duration_since(entry.stored_at) <= max_age);

        if entries.len() > max_entries {
            let mut by_age: Vec<(String, Instant)> = entries
                .iter()
                .map(|(id, entry)| (id.clone(), entry.stored_at))
                .collect();
            // Newest first
            by_age.sort_by(|a, b| b.1.cmp(&a.1));
            for (id, _) in by_age.into_iter().skip(max_entries) {
                entries.remove(&id);
            }
        }

        let removed = before - entries.len();
        if removed > 0 {
            debug!(removed, remaining = entries.len(), "evicted continuation tokens");
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats { entries: self.len() }
    }
}
