// SPDX-FileCopyrightText: 2026 Wabridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Process-wide mapping of tenants to session managers.
//!
//! A tenant has at most one session at a time; the registry is the only
//! place managers are created or dropped. Stopping with logout purges the
//! credential bundle (an explicit unlink); restart and process shutdown
//! keep it so the session resumes.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use wabridge_core::{SessionStatus, TenantId, UpstreamAdapter};

use crate::creds::CredentialStore;
use crate::events::SessionEventHandler;
use crate::manager::{SessionManager, SessionSettings, SessionSnapshot};

/// Delay between stop and start on restart.
const RESTART_DELAY: Duration = Duration::from_secs(2);
/// How often disconnected idle sessions are swept out of the registry.
const IDLE_SWEEP_INTERVAL: Duration = Duration::from_secs(30 * 60);
/// Disconnected sessions idle past this are dropped by the sweep.
const IDLE_DROP_AFTER: chrono::Duration = chrono::Duration::minutes(60);

/// Result of a start call.
#[derive(Debug, Clone)]
pub struct StartedSession {
    pub session_id: String,
    /// True when the tenant was already connected and start was a no-op.
    pub already_connected: bool,
}

/// Callback invoked whenever a brand-new session manager is created
/// (used to auto-register the configured default webhook sink).
pub type SessionCreatedHook = Arc<dyn Fn(&TenantId) + Send + Sync>;

/// Process-wide tenant -> session manager mapping.
pub struct SessionRegistry {
    sessions: DashMap<TenantId, Arc<SessionManager>>,
    adapter: Arc<dyn UpstreamAdapter>,
    store: Arc<CredentialStore>,
    event_handler: Arc<dyn SessionEventHandler>,
    settings: SessionSettings,
    on_session_created: Option<SessionCreatedHook>,
    cancel: CancellationToken,
}

impl SessionRegistry {
    pub fn new(
        adapter: Arc<dyn UpstreamAdapter>,
        store: Arc<CredentialStore>,
        event_handler: Arc<dyn SessionEventHandler>,
        settings: SessionSettings,
        on_session_created: Option<SessionCreatedHook>,
    ) -> Self {
        Self {
            sessions: DashMap::new(),
            adapter,
            store,
            event_handler,
            settings,
            on_session_created,
            cancel: CancellationToken::new(),
        }
    }

    /// Starts a session for the tenant.
    ///
    /// Idempotent while connected: the existing session id is returned and
    /// nothing changes. Any non-connected leftover manager is replaced.
    pub async fn start(&self, tenant: &TenantId) -> StartedSession {
        if let Some(existing) = self.get(tenant) {
            let snapshot = existing.snapshot();
            if snapshot.status == SessionStatus::Connected {
                debug!(tenant = %tenant, "start ignored, session already connected");
                return StartedSession {
                    session_id: snapshot.session_id,
                    already_connected: true,
                };
            }
            self.sessions.remove(tenant);
            existing.stop("superseded by new start").await;
        }

        // One channel and one pump task per tenant; a slow sink for one
        // tenant never delays another's events.
        let (events_tx, mut events_rx) = mpsc::channel(256);
        let handler = Arc::clone(&self.event_handler);
        tokio::spawn(async move {
            while let Some(event) = events_rx.recv().await {
                handler.handle(event).await;
            }
        });

        let manager = SessionManager::start(
            tenant.clone(),
            Arc::clone(&self.adapter),
            Arc::clone(&self.store),
            events_tx,
            self.settings.clone(),
        );
        let session_id = manager.snapshot().session_id;
        self.sessions.insert(tenant.clone(), manager);
        info!(tenant = %tenant, session_id = %session_id, "session started");

        if let Some(ref hook) = self.on_session_created {
            hook(tenant);
        }

        StartedSession {
            session_id,
            already_connected: false,
        }
    }

    /// Stops a session and purges its credentials (explicit logout).
    ///
    /// Returns false when the tenant has no session.
    pub async fn stop(&self, tenant: &TenantId) -> bool {
        let Some((_, manager)) = self.sessions.remove(tenant) else {
            return false;
        };
        manager.stop("logout requested").await;
        if let Err(e) = self.store.purge(tenant).await {
            warn!(tenant = %tenant, error = %e, "credential purge failed on logout");
        }
        true
    }

    /// Stop + start after a short settle delay; credentials are kept so the
    /// session resumes without re-pairing.
    pub async fn restart(&self, tenant: &TenantId) -> StartedSession {
        if let Some((_, manager)) = self.sessions.remove(tenant) {
            manager.stop("restart requested").await;
        }
        tokio::time::sleep(RESTART_DELAY).await;
        self.start(tenant).await
    }

    pub fn get(&self, tenant: &TenantId) -> Option<Arc<SessionManager>> {
        self.sessions.get(tenant).map(|e| Arc::clone(e.value()))
    }

    /// Snapshots of every registered session.
    pub fn list(&self) -> Vec<SessionSnapshot> {
        self.sessions.iter().map(|e| e.value().snapshot()).collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Stops every session, waiting at most `window` overall.
    ///
    /// Credentials are already persisted per-tenant, so nothing is lost
    /// when the window elapses before every logout finished.
    pub async fn shutdown_all(&self, window: Duration) {
        self.cancel.cancel();
        let managers: Vec<_> = self
            .sessions
            .iter()
            .map(|e| Arc::clone(e.value()))
            .collect();
        self.sessions.clear();

        let count = managers.len();
        let stop_all = futures::future::join_all(
            managers
                .into_iter()
                .map(|m| async move { m.stop("process shutdown").await }),
        );
        if tokio::time::timeout(window, stop_all).await.is_err() {
            warn!(count, "shutdown window elapsed with sessions still stopping");
        } else {
            info!(count, "all sessions stopped");
        }
    }

    /// Starts the periodic sweep removing disconnected idle sessions.
    pub fn spawn_idle_sweep(self: &Arc<Self>) {
        let registry = Arc::clone(self);
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(IDLE_SWEEP_INTERVAL);
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = interval.tick() => registry.sweep_idle(),
                }
            }
        });
    }

    fn sweep_idle(&self) {
        self.sweep_idle_before(Utc::now() - IDLE_DROP_AFTER);
    }

    fn sweep_idle_before(&self, cutoff: chrono::DateTime<Utc>) {
        let stale: Vec<TenantId> = self
            .sessions
            .iter()
            .filter(|e| {
                let snap = e.value().snapshot();
                snap.status == SessionStatus::Disconnected && snap.last_activity < cutoff
            })
            .map(|e| e.key().clone())
            .collect();

        for tenant in stale {
            if let Some((_, manager)) = self.sessions.remove(&tenant) {
                info!(tenant = %tenant, "idle disconnected session removed");
                // Already disconnected; stop only reaps the driver task.
                let _ = manager;
            }
        }
    }
}
