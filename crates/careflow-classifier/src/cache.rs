// SPDX-FileCopyrightText: 2026 Careflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bounded TTL cache for classification results.
//!
//! Keyed by the normalized redacted message text, so identical short
//! messages ("yes", "hi") skip the API round trip. Entries expire after
//! the configured TTL; at capacity, expired entries are pruned and new
//! inserts are dropped rather than evicting live ones.

use std::time::{Duration, Instant};

use careflow_core::IntentResult;
use dashmap::DashMap;

pub struct IntentCache {
    entries: DashMap<String, (IntentResult, Instant)>,
    capacity: usize,
    ttl: Duration,
}

impl IntentCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            capacity,
            ttl,
        }
    }

    /// Normalized cache key for a message text.
    pub fn key(text: &str) -> String {
        text.trim().to_lowercase()
    }

    pub fn get(&self, key: &str) -> Option<IntentResult> {
        let entry = self.entries.get(key)?;
        let (result, inserted_at) = entry.value();
        if inserted_at.elapsed() > self.ttl {
            drop(entry);
            self.entries.remove(key);
            return None;
        }
        Some(result.clone())
    }

    pub fn insert(&self, key: String, result: IntentResult) {
        if self.entries.len() >= self.capacity {
            self.entries
                .retain(|_, (_, inserted_at)| inserted_at.elapsed() <= self.ttl);
            if self.entries.len() >= self.capacity {
                return;
            }
        }
        self.entries.insert(key, (result, Instant::now()));
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
