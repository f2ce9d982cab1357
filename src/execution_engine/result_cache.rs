//! Tool result cache
//!
//! Bounded map from call id to result. Each insert first evicts the oldest
//! entry when at capacity, then sweeps entries older than the TTL, so the size
//! never exceeds the configured maximum.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tracing::trace;

use crate::tools::ToolResult;

/// Cached result with its write time
#[derive(Debug, Clone)]
pub struct CachedToolResult {
    pub result: ToolResult,
    pub recorded_at: Instant,
    /// Insertion counter; orders entries written in the same instant
    seq: u64,
}

#[derive(Debug)]
pub struct ToolResultCache {
    entries: HashMap<String, CachedToolResult>,
    capacity: usize,
    ttl: Duration,
    next_seq: u64,
}

impl ToolResultCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            capacity: capacity.max(1),
            ttl,
            next_seq: 0,
        }
    }

    pub fn put(&mut self, call_id: impl Into<String>, result: ToolResult) {
        self.put_at(call_id.into(), result, Instant::now());
    }

    pub(crate) fn put_at(&mut self, call_id: String, result: ToolResult, now: Instant) {
        if !self.entries.contains_key(&call_id) && self.entries.len() >= self.capacity {
            self.evict_oldest();
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.insert(
            call_id,
            CachedToolResult {
                result,
                recorded_at: now,
                seq,
            },
        );

        self.sweep_expired(now);
    }

    /// Result for a call id, if present and not expired
    pub fn get(&self, call_id: &str) -> Option<&ToolResult> {
        self.entries
            .get(call_id)
            .filter(|e| e.recorded_at.elapsed() <= self.ttl)
            .map(|e| &e.result)
    }

    pub fn entry(&self, call_id: &str) -> Option<&CachedToolResult> {
        self.entries.get(call_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    fn evict_oldest(&mut self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|(_, e)| (e.recorded_at, e.seq))
            .map(|(id, _)| id.clone());
        if let Some(id) = oldest {
            trace!(call_id = %id, "Evicting oldest tool result");
            self.entries.remove(&id);
        }
    }

    fn sweep_expired(&mut self, now: Instant) {
        let ttl = self.ttl;
        self.entries
            .retain(|_, e| now.saturating_duration_since(e.recorded_at) <= ttl);
    }
}
