// SPDX-FileCopyrightText: 2026 Wabridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-tenant delivery statistics.
//!
//! Counters plus a running average of response time. Entries idle for more
//! than 24 hours are evicted by the periodic sweep.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::Instant;

use wabridge_core::TenantId;

/// Stats entries idle past this are dropped.
pub const STATS_IDLE_AFTER: Duration = Duration::from_secs(24 * 60 * 60);

/// Delivery statistics for one tenant.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantStats {
    pub total: u64,
    pub success: u64,
    pub failure: u64,
    pub duplicates_skipped: u64,
    /// Running average over successful deliveries, milliseconds.
    pub avg_response_ms: f64,
    /// Successful deliveries as a percentage of all attempts.
    pub uptime_pct: f64,
    pub last_delivery: Option<DateTime<Utc>>,
}

impl Default for TenantStats {
    fn default() -> Self {
        Self::new()
    }
}

impl TenantStats {
    fn new() -> Self {
        Self {
            total: 0,
            success: 0,
            failure: 0,
            duplicates_skipped: 0,
            avg_response_ms: 0.0,
            uptime_pct: 100.0,
            last_delivery: None,
        }
    }

    fn recompute_uptime(&mut self) {
        if self.total > 0 {
            self.uptime_pct = (self.success as f64 / self.total as f64) * 100.0;
        }
    }
}

struct StatsEntry {
    stats: TenantStats,
    touched: Instant,
}

/// Process-wide stats store, one mutex.
#[derive(Default)]
pub struct StatsStore {
    entries: Mutex<HashMap<TenantId, StatsEntry>>,
}

impl StatsStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_success(&self, tenant: &TenantId, response_time: Duration) {
        self.update(tenant, |stats| {
            stats.total += 1;
            stats.success += 1;
            let ms = response_time.as_millis() as f64;
            // Running mean over successful deliveries.
            stats.avg_response_ms += (ms - stats.avg_response_ms) / stats.success as f64;
            stats.last_delivery = Some(Utc::now());
            stats.recompute_uptime();
        });
    }

    pub fn record_failure(&self, tenant: &TenantId) {
        self.update(tenant, |stats| {
            stats.total += 1;
            stats.failure += 1;
            stats.recompute_uptime();
        });
    }

    pub fn record_duplicate(&self, tenant: &TenantId) {
        self.update(tenant, |stats| {
            stats.duplicates_skipped += 1;
        });
    }

    pub fn get(&self, tenant: &TenantId) -> Option<TenantStats> {
        self.entries
            .lock()
            .expect("stats mutex")
            .get(tenant)
            .map(|e| e.stats.clone())
    }

    /// Drops entries idle past 24 hours.
    pub fn sweep(&self) {
        self.entries
            .lock()
            .expect("stats mutex")
            .retain(|_, entry| entry.touched.elapsed() <= STATS_IDLE_AFTER);
    }

    fn update(&self, tenant: &TenantId, mutate: impl FnOnce(&mut TenantStats)) {
        let mut entries = self.entries.lock().expect("stats mutex");
        let entry = entries.entry(tenant.clone()).or_insert_with(|| StatsEntry {
            stats: TenantStats::new(),
            touched: Instant::now(),
        });
        entry.touched = Instant::now();
        mutate(&mut entry.stats);
    }
}
