// SPDX-FileCopyrightText: 2026 Wabridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Delivery deduplication over `(tenant, messageId)` pairs.
//!
//! A key is claimed *before* the send goes out so two concurrent batches
//! carrying the same message id cannot both forward it. A failed delivery
//! releases its key, which re-permits the pair on a later inbound
//! notification. Entries expire after the 10-minute window.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;

use wabridge_core::TenantId;

/// How long a delivered `(tenant, messageId)` pair stays claimed.
pub const DEDUP_WINDOW: Duration = Duration::from_secs(10 * 60);

/// Process-wide dedup set, one mutex; contention is negligible at expected
/// delivery rates.
#[derive(Debug, Default)]
pub struct DedupStore {
    entries: Mutex<HashMap<(TenantId, String), Instant>>,
}

impl DedupStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims the pair. Returns false when it is already claimed within
    /// the window (the delivery must be dropped).
    pub fn try_claim(&self, tenant: &TenantId, message_id: &str) -> bool {
        let mut entries = self.entries.lock().expect("dedup mutex");
        let key = (tenant.clone(), message_id.to_string());
        match entries.get(&key) {
            Some(claimed_at) if claimed_at.elapsed() <= DEDUP_WINDOW => false,
            _ => {
                entries.insert(key, Instant::now());
                true
            }
        }
    }

    /// Releases a claim after a failed delivery so a later notification of
    /// the same id may retry.
    pub fn release(&self, tenant: &TenantId, message_id: &str) {
        self.entries
            .lock()
            .expect("dedup mutex")
            .remove(&(tenant.clone(), message_id.to_string()));
    }

    /// Drops entries older than the window.
    pub fn sweep(&self) {
        self.entries
            .lock()
            .expect("dedup mutex")
            .retain(|_, claimed_at| claimed_at.elapsed() <= DEDUP_WINDOW);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("dedup mutex").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tenant(id: &str) -> TenantId {
        TenantId::new(id).unwrap()
    }

    #[tokio::test]
    async fn second_claim_within_window_is_rejected() {
        let store = DedupStore::new();
        assert!(store.try_claim(&tenant("t-1"), "m-9"));
        assert!(!store.try_claim(&tenant("t-1"), "m-9"));
    }

    #[tokio::test]
    async fn claims_are_per_tenant() {
        let store = DedupStore::new();
        assert!(store.try_claim(&tenant("t-1"), "m-9"));
        assert!(store.try_claim(&tenant("t-2"), "m-9"));
    }

    #[tokio::test]
    async fn release_re_permits_the_pair() {
        let store = DedupStore::new();
        assert!(store.try_claim(&tenant("t-1"), "m-9"));
        store.release(&tenant("t-1"), "m-9");
        assert!(store.try_claim(&tenant("t-1"), "m-9"));
    }

    #[tokio::test(start_paused = true)]
    async fn claims_expire_after_the_window() {
        let store = DedupStore::new();
        assert!(store.try_claim(&tenant("t-1"), "m-9"));

        tokio::time::advance(DEDUP_WINDOW + Duration::from_secs(1)).await;
        assert!(store.try_claim(&tenant("t-1"), "m-9"));
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_evicts_only_expired_entries() {
        let store = DedupStore::new();
        store.try_claim(&tenant("t-1"), "old");
        tokio::time::advance(DEDUP_WINDOW + Duration::from_secs(1)).await;
        store.try_claim(&tenant("t-1"), "fresh");

        store.sweep();
        assert_eq!(store.len(), 1);
        assert!(!store.try_claim(&tenant("t-1"), "fresh"));
        assert!(store.try_claim(&tenant("t-1"), "old"));
    }
}
