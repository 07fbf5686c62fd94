// SPDX-FileCopyrightText: 2026 Careflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory holding area for identity fields collected before consent.
//!
//! Nothing here touches disk. Entries expire after the TTL and are
//! discarded outright when the patient declines consent, so an abandoned
//! or refused conversation leaves no PHI behind.

use std::time::{Duration, Instant};

use dashmap::DashMap;

/// Identity fields gathered during the collecting_info step.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingIdentity {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
}

pub struct EphemeralStore {
    entries: DashMap<i64, (PendingIdentity, Instant)>,
    ttl: Duration,
}

impl EphemeralStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    pub fn get(&self, conversation_id: i64) -> Option<PendingIdentity> {
        let entry = self.entries.get(&conversation_id)?;
        let (identity, touched) = entry.value();
        if touched.elapsed() > self.ttl {
            drop(entry);
            self.entries.remove(&conversation_id);
            return None;
        }
        Some(identity.clone())
    }

    /// Merge `update` into the conversation's pending identity, refreshing
    /// the TTL.
    pub fn update(
        &self,
        conversation_id: i64,
        update: impl FnOnce(&mut PendingIdentity),
    ) -> PendingIdentity {
        let mut identity = self.get(conversation_id).unwrap_or_default();
        update(&mut identity);
        self.entries
            .insert(conversation_id, (identity.clone(), Instant::now()));
        identity
    }

    /// Drop everything held for a conversation (consent refused, flow
    /// finished, or identity persisted).
    pub fn discard(&self, conversation_id: i64) {
        self.entries.remove(&conversation_id);
    }

    /// Sweep expired entries. Called from periodic maintenance.
    pub fn sweep(&self) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, (_, touched)| touched.elapsed() <= self.ttl);
        before - self.entries.len()
    }
}

impl Default for EphemeralStore {
    fn default() -> Self {
        // Conversations that stall for half an hour forfeit their fields.
        Self::new(Duration::from_secs(30 * 60))
    }
}
