// SPDX-FileCopyrightText: 2026 Wabridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Persistent pairing-code service.
//!
//! Keeps the most recent pairing artifact available to callers for the
//! whole pairing window. The upstream pushes fresh artifacts on its own
//! schedule; this service tracks the newest one per tenant, counts
//! regenerations, and parks the tracker once the regeneration budget is
//! spent so an abandoned pairing flow cannot spin forever. Clients polling
//! the HTTP API therefore always see *some* artifact while pairing is
//! possible.
//!
//! One tracker per tenant, created when pairing starts and dropped on
//! connect (kept briefly for status reads), explicit stop, or idle sweep.

use std::sync::{Arc, Weak};
use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use wabridge_core::{SessionStatus, TenantId};

use crate::manager::SessionManager;

/// How long one pairing artifact stays fresh.
const ARTIFACT_LIFETIME: Duration = Duration::from_secs(45);
/// How often a tracker probes its session manager for a newer artifact.
const PROBE_INTERVAL: Duration = Duration::from_secs(30);
/// Regeneration budget; past this the tenant must restart the session.
const MAX_REGENERATIONS: u32 = 10;
/// How often idle trackers are swept.
const SWEEP_INTERVAL: Duration = Duration::from_secs(300);
/// Trackers idle past this (and not connected) are dropped by the sweep.
const IDLE_DROP_AFTER: Duration = Duration::from_secs(45 * 3);
/// How long `start` waits for the first artifact.
const FIRST_ARTIFACT_WAIT: Duration = Duration::from_secs(30);

/// Pairing flow state for one tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum PairingStatus {
    Generating,
    Available,
    Expired,
    Connected,
}

/// Point-in-time view of a tenant's pairing flow.
#[derive(Debug, Clone)]
pub struct PairingView {
    pub qr_code: Option<String>,
    pub status: PairingStatus,
    pub regeneration_count: u32,
}

struct PairingTracker {
    qr_code: Option<String>,
    last_generated: Instant,
    regeneration_count: u32,
    status: PairingStatus,
    manager: Weak<SessionManager>,
    probe_cancel: CancellationToken,
}

/// Process-wide pairing tracker registry.
pub struct PairingService {
    trackers: DashMap<TenantId, PairingTracker>,
    cancel: CancellationToken,
}

impl PairingService {
    pub fn new() -> Self {
        Self {
            trackers: DashMap::new(),
            cancel: CancellationToken::new(),
        }
    }

    /// Begins tracking a tenant's pairing flow and waits up to 30 s for the
    /// first artifact. Returns the artifact, or `None` when the session
    /// connected without pairing (credential resume) or the wait timed out.
    pub async fn start(self: &Arc<Self>, manager: &Arc<SessionManager>) -> Option<String> {
        let tenant = manager.tenant_id().clone();
        self.stop(&tenant);

        let probe_cancel = self.cancel.child_token();
        self.trackers.insert(
            tenant.clone(),
            PairingTracker {
                qr_code: None,
                last_generated: Instant::now(),
                regeneration_count: 0,
                status: PairingStatus::Generating,
                manager: Arc::downgrade(manager),
                probe_cancel: probe_cancel.clone(),
            },
        );
        tokio::spawn(Arc::clone(self).probe(tenant.clone(), probe_cancel));
        debug!(tenant = %tenant, "pairing tracker created");

        let mut status_rx = manager.watch_status();
        let wait = async {
            loop {
                let status = *status_rx.borrow_and_update();
                match status {
                    SessionStatus::Qr => {
                        self.refresh(&tenant);
                        let qr = self
                            .trackers
                            .get(&tenant)
                            .and_then(|t| t.qr_code.clone());
                        if let Some(qr) = qr {
                            return Some(qr);
                        }
                    }
                    SessionStatus::Connected => {
                        self.mark_connected(&tenant);
                        return None;
                    }
                    _ => {}
                }
                if status_rx.changed().await.is_err() {
                    return None;
                }
            }
        };

        match tokio::time::timeout(FIRST_ARTIFACT_WAIT, wait).await {
            Ok(qr) => qr,
            Err(_) => {
                debug!(tenant = %tenant, "no pairing artifact within the start window");
                None
            }
        }
    }

    /// The cached artifact for a tenant, refreshed opportunistically.
    ///
    /// A caller polling during pairing always receives a value: the cached
    /// artifact is returned even when past its lifetime, and the refresh
    /// adopts whatever newer artifact the session manager holds.
    pub fn current(&self, tenant: &TenantId) -> Option<PairingView> {
        self.refresh(tenant);
        self.trackers.get(tenant).map(|t| PairingView {
            qr_code: t.qr_code.clone(),
            status: t.status,
            regeneration_count: t.regeneration_count,
        })
    }

    /// Adopts an artifact observed on the session event stream.
    pub fn observe_qr(&self, tenant: &TenantId, qr_code: &str) {
        if let Some(mut entry) = self.trackers.get_mut(tenant) {
            adopt(entry.value_mut(), tenant, qr_code);
        }
    }

    /// Transitions the tracker to `connected`: artifact cleared, timers
    /// cancelled.
    pub fn mark_connected(&self, tenant: &TenantId) {
        if let Some(mut entry) = self.trackers.get_mut(tenant) {
            let tracker = entry.value_mut();
            tracker.qr_code = None;
            tracker.status = PairingStatus::Connected;
            tracker.probe_cancel.cancel();
            info!(tenant = %tenant, "pairing complete");
        }
    }

    /// Full teardown of a tenant's tracker.
    pub fn stop(&self, tenant: &TenantId) {
        if let Some((_, tracker)) = self.trackers.remove(tenant) {
            tracker.probe_cancel.cancel();
            debug!(tenant = %tenant, "pairing tracker removed");
        }
    }

    /// Starts the periodic idle sweep.
    pub fn spawn_sweep(self: &Arc<Self>) {
        let service = Arc::clone(self);
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(SWEEP_INTERVAL);
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = interval.tick() => service.sweep_idle(),
                }
            }
        });
    }

    /// Cancels every tracker and the sweep.
    pub fn shutdown(&self) {
        self.cancel.cancel();
        self.trackers.clear();
    }

    fn sweep_idle(&self) {
        self.trackers.retain(|tenant, tracker| {
            let keep = tracker.status == PairingStatus::Connected
                || tracker.last_generated.elapsed() <= IDLE_DROP_AFTER;
            if !keep {
                tracker.probe_cancel.cancel();
                debug!(tenant = %tenant, "idle pairing tracker dropped");
            }
            keep
        });
    }

    /// Reconciles a tracker against its session manager.
    fn refresh(&self, tenant: &TenantId) {
        let Some(mut entry) = self.trackers.get_mut(tenant) else {
            return;
        };
        let tracker = entry.value_mut();
        if tracker.status == PairingStatus::Connected
            || tracker.regeneration_count >= MAX_REGENERATIONS
        {
            return;
        }

        let Some(manager) = tracker.manager.upgrade() else {
            tracker.status = PairingStatus::Expired;
            return;
        };

        if manager.status() == SessionStatus::Connected {
            tracker.qr_code = None;
            tracker.status = PairingStatus::Connected;
            tracker.probe_cancel.cancel();
            return;
        }

        match manager.qr_snapshot() {
            Some((qr, _)) if tracker.qr_code.as_deref() != Some(qr.as_str()) => {
                adopt(tracker, tenant, &qr);
            }
            _ => {
                if tracker.qr_code.is_some()
                    && tracker.last_generated.elapsed() > ARTIFACT_LIFETIME
                {
                    tracker.status = PairingStatus::Expired;
                }
            }
        }
    }

    async fn probe(self: Arc<Self>, tenant: TenantId, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(PROBE_INTERVAL);
        interval.tick().await;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {
                    self.refresh(&tenant);
                    let done = match self.trackers.get(&tenant) {
                        Some(t) => {
                            t.status == PairingStatus::Connected
                                || t.regeneration_count >= MAX_REGENERATIONS
                        }
                        None => true,
                    };
                    if done {
                        break;
                    }
                }
            }
        }
    }
}

impl Default for PairingService {
    fn default() -> Self {
        Self::new()
    }
}

fn adopt(tracker: &mut PairingTracker, tenant: &TenantId, qr_code: &str) {
    if tracker.status == PairingStatus::Connected
        || tracker.regeneration_count >= MAX_REGENERATIONS
    {
        return;
    }
    if tracker.qr_code.as_deref() == Some(qr_code) {
        return;
    }

    let replacing = tracker.qr_code.is_some();
    tracker.qr_code = Some(qr_code.to_string());
    tracker.last_generated = Instant::now();
    if replacing {
        tracker.regeneration_count += 1;
    }

    if tracker.regeneration_count >= MAX_REGENERATIONS {
        // The budget is spent; keep the last artifact visible but stop
        // refreshing. Only an explicit session restart resumes pairing.
        tracker.status = PairingStatus::Expired;
        tracker.probe_cancel.cancel();
        warn!(
            tenant = %tenant,
            regenerations = tracker.regeneration_count,
            "pairing regeneration budget exhausted"
        );
    } else {
        tracker.status = PairingStatus::Available;
    }
}
