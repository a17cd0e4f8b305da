// SPDX-FileCopyrightText: 2026 Wabridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-tenant session state machine wrapping the upstream connection.
//!
//! States: `disconnected` (initial and terminal), `connecting`, `qr`,
//! `connected`. A single serial driver task per manager consumes upstream
//! updates in order; all mutations of the `Session` struct happen on that
//! task or under its mutex. External callers read snapshots, subscribe to
//! the status watch channel, or call [`SessionManager::send`] /
//! [`SessionManager::stop`].
//!
//! Reconnects use exponential backoff `min(5 s * 2^(n-1), 30 s)` up to the
//! configured attempt budget. An upstream close with `logged_out` purges
//! the credential bundle; transient closes never surface to callers.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use wabridge_core::{
    BridgeError, ConnectionState, InboundMessage, MessageData, MessageKind, OutboundContent,
    SessionEvent, SessionStatus, TenantId, UpstreamAdapter, UpstreamHandle, UpstreamSession,
    UpstreamUpdate,
};

use crate::creds::CredentialStore;

/// Base reconnect delay; doubles per attempt.
const RECONNECT_BASE: Duration = Duration::from_secs(5);
/// Reconnect delay ceiling.
const RECONNECT_CAP: Duration = Duration::from_secs(30);
/// Bound on media URL fetches before an outbound send.
const MEDIA_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Tuning knobs for a session manager, derived from configuration.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Bound on one upstream connect attempt.
    pub connect_timeout: Duration,
    /// Reconnect budget before the session parks in `disconnected`.
    pub max_reconnect_attempts: u32,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(60),
            max_reconnect_attempts: 5,
        }
    }
}

/// Mutable per-session state, guarded by the manager's mutex.
#[derive(Debug, Clone)]
struct Session {
    session_id: String,
    status: SessionStatus,
    qr_code: Option<String>,
    qr_generated_at: Option<DateTime<Utc>>,
    phone_number: Option<String>,
    business_name: Option<String>,
    last_activity: DateTime<Utc>,
    reconnect_attempts: u32,
}

/// A point-in-time copy of a tenant's session state.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub tenant_id: TenantId,
    pub session_id: String,
    pub status: SessionStatus,
    pub qr_code: Option<String>,
    pub qr_generated_at: Option<DateTime<Utc>>,
    pub phone_number: Option<String>,
    pub business_name: Option<String>,
    pub last_activity: DateTime<Utc>,
    pub reconnect_attempts: u32,
}

/// Why the update-consumption loop ended.
enum DriveOutcome {
    /// Explicit stop; the driver exits without emitting.
    Stopped,
    /// Upstream invalidated the credentials; purge and park.
    LoggedOut(String),
    /// Transient close; retry within the backoff budget.
    Retry(String),
}

/// State machine for one tenant's upstream session.
pub struct SessionManager {
    tenant_id: TenantId,
    session: Mutex<Session>,
    status_tx: watch::Sender<SessionStatus>,
    events_tx: mpsc::Sender<SessionEvent>,
    adapter: Arc<dyn UpstreamAdapter>,
    store: Arc<CredentialStore>,
    handle: Mutex<Option<Arc<dyn UpstreamHandle>>>,
    driver: Mutex<Option<JoinHandle<()>>>,
    cancel: CancellationToken,
    settings: SessionSettings,
    http: reqwest::Client,
}

impl SessionManager {
    /// Creates a manager and starts its driver task.
    pub fn start(
        tenant_id: TenantId,
        adapter: Arc<dyn UpstreamAdapter>,
        store: Arc<CredentialStore>,
        events_tx: mpsc::Sender<SessionEvent>,
        settings: SessionSettings,
    ) -> Arc<Self> {
        let now = Utc::now();
        let session = Session {
            session_id: format!("{}_{}", tenant_id, session_epoch_ms()),
            status: SessionStatus::Disconnected,
            qr_code: None,
            qr_generated_at: None,
            phone_number: None,
            business_name: None,
            last_activity: now,
            reconnect_attempts: 0,
        };
        let (status_tx, _) = watch::channel(SessionStatus::Disconnected);

        let manager = Arc::new(Self {
            tenant_id,
            session: Mutex::new(session),
            status_tx,
            events_tx,
            adapter,
            store,
            handle: Mutex::new(None),
            driver: Mutex::new(None),
            cancel: CancellationToken::new(),
            settings,
            http: reqwest::Client::new(),
        });

        let driver = tokio::spawn(Arc::clone(&manager).drive());
        *manager.driver.lock().expect("driver mutex") = Some(driver);
        manager
    }

    pub fn tenant_id(&self) -> &TenantId {
        &self.tenant_id
    }

    /// A copy of the current session state.
    pub fn snapshot(&self) -> SessionSnapshot {
        let session = self.session.lock().expect("session mutex");
        SessionSnapshot {
            tenant_id: self.tenant_id.clone(),
            session_id: session.session_id.clone(),
            status: session.status,
            qr_code: session.qr_code.clone(),
            qr_generated_at: session.qr_generated_at,
            phone_number: session.phone_number.clone(),
            business_name: session.business_name.clone(),
            last_activity: session.last_activity,
            reconnect_attempts: session.reconnect_attempts,
        }
    }

    pub fn status(&self) -> SessionStatus {
        self.session.lock().expect("session mutex").status
    }

    /// Subscribe to status transitions without polling.
    pub fn watch_status(&self) -> watch::Receiver<SessionStatus> {
        self.status_tx.subscribe()
    }

    /// The current pairing artifact and its generation time.
    pub fn qr_snapshot(&self) -> Option<(String, DateTime<Utc>)> {
        let session = self.session.lock().expect("session mutex");
        match (&session.qr_code, session.qr_generated_at) {
            (Some(qr), Some(at)) => Some((qr.clone(), at)),
            _ => None,
        }
    }

    /// Sends a message; precondition is a `connected` session.
    ///
    /// Media variants resolve `media_url` with an HTTP GET first; any
    /// non-success response or transport error surfaces as
    /// [`BridgeError::MediaFetchFailed`].
    pub async fn send(&self, data: &MessageData) -> Result<String, BridgeError> {
        let content = self.build_content(data).await?;
        self.send_content(&data.to, content).await
    }

    /// Sends pre-resolved content (multipart uploads arrive as bytes).
    pub async fn send_content(
        &self,
        to: &str,
        content: OutboundContent,
    ) -> Result<String, BridgeError> {
        let handle = {
            let session = self.session.lock().expect("session mutex");
            if session.status != SessionStatus::Connected {
                return Err(BridgeError::NotConnected {
                    tenant_id: self.tenant_id.to_string(),
                });
            }
            self.handle.lock().expect("handle mutex").clone()
        };
        let handle = handle.ok_or_else(|| BridgeError::NotConnected {
            tenant_id: self.tenant_id.to_string(),
        })?;

        let id = handle.send(to, content).await?;
        self.touch();
        Ok(id)
    }

    /// Stops the session: cancels in-flight work, closes the upstream
    /// connection best-effort, and parks in `disconnected`.
    ///
    /// Credential purging is the caller's decision (explicit logout purges,
    /// process shutdown and restart do not).
    pub async fn stop(&self, reason: &str) {
        self.cancel.cancel();

        let handle = self.handle.lock().expect("handle mutex").take();
        if let Some(handle) = handle {
            handle.logout().await;
        }

        let driver = self.driver.lock().expect("driver mutex").take();
        if let Some(driver) = driver {
            let _ = driver.await;
        }

        let was_active = {
            let mut session = self.session.lock().expect("session mutex");
            let was = session.status;
            session.status = SessionStatus::Disconnected;
            session.qr_code = None;
            session.qr_generated_at = None;
            was != SessionStatus::Disconnected
        };
        let _ = self.status_tx.send(SessionStatus::Disconnected);

        if was_active {
            self.emit(SessionEvent::Disconnected {
                tenant_id: self.tenant_id.clone(),
                reason: reason.to_string(),
            })
            .await;
        }
        info!(tenant = %self.tenant_id, reason, "session stopped");
    }

    // --- driver -----------------------------------------------------------

    async fn drive(self: Arc<Self>) {
        loop {
            self.enter_connecting().await;

            let credentials = match self.store.load(&self.tenant_id).await {
                Ok(creds) => creds,
                Err(e) => {
                    warn!(tenant = %self.tenant_id, error = %e, "credential load failed, pairing fresh");
                    None
                }
            };

            let connect = tokio::time::timeout(
                self.settings.connect_timeout,
                self.adapter.connect(&self.tenant_id, credentials),
            );
            let upstream = tokio::select! {
                _ = self.cancel.cancelled() => return,
                result = connect => match result {
                    Ok(Ok(session)) => session,
                    Ok(Err(e)) => {
                        warn!(tenant = %self.tenant_id, error = %e, "upstream connect failed");
                        if !self.backoff_or_park("connect failed").await {
                            return;
                        }
                        continue;
                    }
                    Err(_) => {
                        warn!(
                            tenant = %self.tenant_id,
                            timeout_ms = self.settings.connect_timeout.as_millis() as u64,
                            "upstream connect timed out"
                        );
                        if !self.backoff_or_park("connect timed out").await {
                            return;
                        }
                        continue;
                    }
                },
            };

            *self.handle.lock().expect("handle mutex") = Some(Arc::clone(&upstream.handle));
            let outcome = self.consume_updates(upstream).await;
            self.handle.lock().expect("handle mutex").take();

            match outcome {
                DriveOutcome::Stopped => return,
                DriveOutcome::LoggedOut(reason) => {
                    info!(tenant = %self.tenant_id, reason, "upstream logged out, purging credentials");
                    if let Err(e) = self.store.purge(&self.tenant_id).await {
                        warn!(tenant = %self.tenant_id, error = %e, "credential purge failed");
                    }
                    self.park(format!("logged out: {reason}")).await;
                    return;
                }
                DriveOutcome::Retry(reason) => {
                    if !self.backoff_or_park(&reason).await {
                        return;
                    }
                }
            }
        }
    }

    async fn consume_updates(&self, upstream: UpstreamSession) -> DriveOutcome {
        let UpstreamSession { handle, mut updates } = upstream;
        loop {
            let update = tokio::select! {
                _ = self.cancel.cancelled() => return DriveOutcome::Stopped,
                update = updates.recv() => update,
            };
            let Some(update) = update else {
                return DriveOutcome::Retry("upstream update stream ended".into());
            };

            match update {
                UpstreamUpdate::Pairing(bytes) => {
                    let qr_code = render_qr_data_url(&bytes);
                    {
                        let mut session = self.session.lock().expect("session mutex");
                        session.status = SessionStatus::Qr;
                        session.qr_code = Some(qr_code.clone());
                        session.qr_generated_at = Some(Utc::now());
                        session.last_activity = Utc::now();
                    }
                    let _ = self.status_tx.send(SessionStatus::Qr);
                    debug!(tenant = %self.tenant_id, "pairing artifact received");
                    self.emit(SessionEvent::Qr {
                        tenant_id: self.tenant_id.clone(),
                        qr_code,
                    })
                    .await;
                }
                UpstreamUpdate::State(ConnectionState::Connecting) => {
                    // Adapter-internal progress; the manager set `connecting`
                    // when the attempt began.
                }
                UpstreamUpdate::State(ConnectionState::Open) => {
                    let identity = handle.identity();
                    let (phone_number, business_name) = match identity {
                        Some(id) => (id.phone_number, id.business_name),
                        None => (String::new(), None),
                    };
                    {
                        let mut session = self.session.lock().expect("session mutex");
                        session.status = SessionStatus::Connected;
                        session.qr_code = None;
                        session.qr_generated_at = None;
                        session.reconnect_attempts = 0;
                        session.phone_number = Some(phone_number.clone());
                        session.business_name = business_name.clone();
                        session.last_activity = Utc::now();
                    }
                    let _ = self.status_tx.send(SessionStatus::Connected);
                    info!(tenant = %self.tenant_id, phone = %phone_number, "session connected");
                    self.emit(SessionEvent::Connected {
                        tenant_id: self.tenant_id.clone(),
                        phone_number,
                        business_name,
                    })
                    .await;
                }
                UpstreamUpdate::State(ConnectionState::Close { reason, logged_out }) => {
                    return if logged_out {
                        DriveOutcome::LoggedOut(reason)
                    } else {
                        DriveOutcome::Retry(reason)
                    };
                }
                UpstreamUpdate::CredsUpdated(bundle) => {
                    // A failed save never tears down a live session; the next
                    // update retries.
                    if let Err(e) = self.store.save(&self.tenant_id, &bundle).await {
                        warn!(tenant = %self.tenant_id, error = %e, "credential save failed");
                    }
                }
                UpstreamUpdate::Inbound(batch) => {
                    self.handle_inbound(batch).await;
                }
            }
        }
    }

    async fn handle_inbound(&self, batch: Vec<wabridge_core::RawInbound>) {
        for raw in batch {
            if raw.from_me {
                continue;
            }
            if raw.text.is_empty() && raw.media_url.is_none() {
                continue;
            }
            self.touch();
            self.emit(SessionEvent::Message(InboundMessage {
                tenant_id: self.tenant_id.clone(),
                from: raw.from,
                to: raw.to,
                text: raw.text,
                message_id: raw.id,
                timestamp_ms: raw.timestamp_ms,
                kind: raw.kind,
                media_url: raw.media_url,
                caption: raw.caption,
            }))
            .await;
        }
    }

    /// Marks the session `connecting` and emits the transition once.
    async fn enter_connecting(&self) {
        let changed = {
            let mut session = self.session.lock().expect("session mutex");
            if session.status == SessionStatus::Connecting {
                false
            } else {
                session.status = SessionStatus::Connecting;
                true
            }
        };
        if changed {
            let _ = self.status_tx.send(SessionStatus::Connecting);
            self.emit(SessionEvent::Connecting {
                tenant_id: self.tenant_id.clone(),
            })
            .await;
        }
    }

    /// Consumes one reconnect attempt and sleeps out its backoff.
    ///
    /// Returns false when the budget is exhausted (session parked) or the
    /// manager was stopped mid-wait.
    async fn backoff_or_park(&self, reason: &str) -> bool {
        let attempt = {
            let mut session = self.session.lock().expect("session mutex");
            if session.reconnect_attempts >= self.settings.max_reconnect_attempts {
                None
            } else {
                session.reconnect_attempts += 1;
                Some(session.reconnect_attempts)
            }
        };

        let Some(attempt) = attempt else {
            self.park(format!(
                "max reconnect attempts exceeded ({})",
                self.settings.max_reconnect_attempts
            ))
            .await;
            return false;
        };

        self.enter_connecting().await;
        let delay = reconnect_delay(attempt);
        info!(
            tenant = %self.tenant_id,
            attempt,
            delay_ms = delay.as_millis() as u64,
            reason,
            "scheduling reconnect"
        );
        tokio::select! {
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }

    /// Parks the session in `disconnected` and emits the transition.
    async fn park(&self, reason: String) {
        {
            let mut session = self.session.lock().expect("session mutex");
            session.status = SessionStatus::Disconnected;
            session.qr_code = None;
            session.qr_generated_at = None;
        }
        let _ = self.status_tx.send(SessionStatus::Disconnected);
        self.emit(SessionEvent::Disconnected {
            tenant_id: self.tenant_id.clone(),
            reason,
        })
        .await;
    }

    fn touch(&self) {
        self.session.lock().expect("session mutex").last_activity = Utc::now();
    }

    async fn emit(&self, event: SessionEvent) {
        if self.events_tx.send(event).await.is_err() {
            debug!(tenant = %self.tenant_id, "event channel closed, dropping event");
        }
    }

    // --- outbound content -------------------------------------------------

    async fn build_content(&self, data: &MessageData) -> Result<OutboundContent, BridgeError> {
        let kind = data.kind.unwrap_or(MessageKind::Text);
        match kind {
            MessageKind::Text | MessageKind::Unknown => Ok(OutboundContent::Text {
                body: data.message.clone(),
            }),
            MessageKind::Image | MessageKind::Video | MessageKind::Audio | MessageKind::Sticker => {
                let url = media_url(data)?;
                let (bytes, mime) = self.fetch_media(url).await?;
                Ok(OutboundContent::Media {
                    bytes,
                    mime,
                    caption: caption_of(data),
                })
            }
            MessageKind::Document => {
                let url = media_url(data)?;
                let (bytes, _) = self.fetch_media(url).await?;
                let filename = data
                    .file_name
                    .clone()
                    .or_else(|| url.rsplit('/').next().map(str::to_string))
                    .filter(|name| !name.is_empty())
                    .unwrap_or_else(|| "document".to_string());
                Ok(OutboundContent::Document {
                    bytes,
                    filename,
                    caption: caption_of(data),
                })
            }
        }
    }

    async fn fetch_media(&self, url: &str) -> Result<(Vec<u8>, String), BridgeError> {
        let fetch_failed = |detail: String| BridgeError::MediaFetchFailed {
            url: url.to_string(),
            detail,
        };

        let response = self
            .http
            .get(url)
            .timeout(MEDIA_FETCH_TIMEOUT)
            .send()
            .await
            .map_err(|e| fetch_failed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(fetch_failed(format!("status {}", response.status())));
        }

        let mime = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/octet-stream")
            .to_string();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| fetch_failed(e.to_string()))?;

        Ok((bytes.to_vec(), mime))
    }
}

fn media_url(data: &MessageData) -> Result<&str, BridgeError> {
    data.media_url
        .as_deref()
        .ok_or_else(|| BridgeError::Internal("mediaUrl is required for media messages".into()))
}

fn caption_of(data: &MessageData) -> Option<String> {
    data.caption
        .clone()
        .or_else(|| (!data.message.is_empty()).then(|| data.message.clone()))
}

/// Creation epoch for session ids: wall-clock milliseconds, bumped to stay
/// strictly increasing so two sessions created in the same millisecond get
/// distinct ids.
fn session_epoch_ms() -> i64 {
    use std::sync::atomic::{AtomicI64, Ordering};
    static LAST: AtomicI64 = AtomicI64::new(0);

    let now = Utc::now().timestamp_millis();
    let mut last = LAST.load(Ordering::Relaxed);
    loop {
        let next = now.max(last + 1);
        match LAST.compare_exchange(last, next, Ordering::Relaxed, Ordering::Relaxed) {
            Ok(_) => return next,
            Err(actual) => last = actual,
        }
    }
}

/// Delay before reconnect attempt `n` (1-based): `min(5 s * 2^(n-1), 30 s)`.
fn reconnect_delay(attempt: u32) -> Duration {
    let exp = attempt.saturating_sub(1).min(16);
    RECONNECT_BASE
        .saturating_mul(1u32 << exp)
        .min(RECONNECT_CAP)
}

/// Renders the upstream's pairing image bytes as a data URL clients can
/// show directly.
fn render_qr_data_url(bytes: &[u8]) -> String {
    format!("data:image/png;base64,{}", BASE64.encode(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use wabridge_core::{CredentialBundle, MessageKind, PhoneIdentity, RawInbound};
    use wabridge_test_utils::MockUpstream;

    fn tenant(id: &str) -> TenantId {
        TenantId::new(id).unwrap()
    }

    fn settings(max_attempts: u32) -> SessionSettings {
        SessionSettings {
            connect_timeout: Duration::from_secs(60),
            max_reconnect_attempts: max_attempts,
        }
    }

    async fn store() -> (tempfile::TempDir, Arc<CredentialStore>) {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::open(dir.path()).await.unwrap();
        (dir, Arc::new(store))
    }

    fn raw_inbound(id: &str, text: &str, from_me: bool) -> RawInbound {
        RawInbound {
            id: id.to_string(),
            from: "5511988887777@s.whatsapp.net".to_string(),
            to: "5511999999999@s.whatsapp.net".to_string(),
            text: text.to_string(),
            timestamp_ms: 1_700_000_000_000,
            from_me,
            kind: MessageKind::Text,
            media_url: None,
            caption: None,
        }
    }

    async fn next_event(rx: &mut mpsc::Receiver<SessionEvent>) -> SessionEvent {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for event")
            .expect("event channel closed")
    }

    #[tokio::test]
    async fn cold_start_pairs_then_connects() {
        let upstream = Arc::new(MockUpstream::new());
        let conn = upstream.script_connection();
        let (_dir, store) = store().await;
        let (events_tx, mut events_rx) = mpsc::channel(64);

        let manager = SessionManager::start(
            tenant("t-1"),
            upstream.clone(),
            store,
            events_tx,
            settings(5),
        );

        assert!(matches!(
            next_event(&mut events_rx).await,
            SessionEvent::Connecting { .. }
        ));

        conn.push(UpstreamUpdate::Pairing(vec![7u8; 16])).await;
        match next_event(&mut events_rx).await {
            SessionEvent::Qr { qr_code, .. } => {
                assert!(qr_code.starts_with("data:image/png;base64,"));
            }
            other => panic!("expected qr event, got {other:?}"),
        }
        assert_eq!(manager.status(), SessionStatus::Qr);
        assert!(manager.qr_snapshot().is_some());

        conn.set_identity(PhoneIdentity {
            phone_number: "+5511999999999".into(),
            business_name: Some("Acme".into()),
        });
        conn.push(UpstreamUpdate::State(ConnectionState::Open)).await;
        match next_event(&mut events_rx).await {
            SessionEvent::Connected { phone_number, .. } => {
                assert_eq!(phone_number, "+5511999999999");
            }
            other => panic!("expected connected event, got {other:?}"),
        }

        let snap = manager.snapshot();
        assert_eq!(snap.status, SessionStatus::Connected);
        assert!(snap.qr_code.is_none());
        assert_eq!(snap.reconnect_attempts, 0);
        assert_eq!(snap.phone_number.as_deref(), Some("+5511999999999"));

        manager.stop("test done").await;
    }

    #[tokio::test]
    async fn inbound_batch_is_filtered_and_ordered() {
        let upstream = Arc::new(MockUpstream::new());
        let conn = upstream.script_connection();
        let (_dir, store) = store().await;
        let (events_tx, mut events_rx) = mpsc::channel(64);

        let manager = SessionManager::start(
            tenant("t-2"),
            upstream.clone(),
            store,
            events_tx,
            settings(5),
        );
        let _ = next_event(&mut events_rx).await; // connecting

        conn.push(UpstreamUpdate::Inbound(vec![
            raw_inbound("m-1", "first", false),
            raw_inbound("m-own", "mine", true),
            raw_inbound("m-empty", "", false),
            raw_inbound("m-2", "second", false),
        ]))
        .await;

        match next_event(&mut events_rx).await {
            SessionEvent::Message(msg) => assert_eq!(msg.message_id, "m-1"),
            other => panic!("expected message, got {other:?}"),
        }
        match next_event(&mut events_rx).await {
            SessionEvent::Message(msg) => assert_eq!(msg.message_id, "m-2"),
            other => panic!("expected message, got {other:?}"),
        }

        manager.stop("test done").await;
    }

    #[tokio::test(start_paused = true)]
    async fn reconnect_backoff_follows_schedule_and_budget() {
        let upstream = Arc::new(MockUpstream::new());
        // Budget of 3 attempts: initial connect plus three reconnects.
        let conns: Vec<_> = (0..4).map(|_| upstream.script_connection()).collect();
        let (_dir, store) = store().await;
        let (events_tx, mut events_rx) = mpsc::channel(256);

        let manager = SessionManager::start(
            tenant("t-3"),
            upstream.clone(),
            store,
            events_tx,
            settings(3),
        );

        for conn in &conns {
            conn.wait_connected().await;
            conn.push(UpstreamUpdate::State(ConnectionState::Close {
                reason: "stream errored".into(),
                logged_out: false,
            }))
            .await;
        }

        // Fourth close exhausts the budget.
        loop {
            match next_event(&mut events_rx).await {
                SessionEvent::Disconnected { reason, .. } => {
                    assert!(reason.contains("max reconnect attempts"));
                    break;
                }
                _ => continue,
            }
        }
        assert_eq!(manager.status(), SessionStatus::Disconnected);
        assert_eq!(upstream.connect_count(), 4);

        // Delays between attempts: 5 s, 10 s, 20 s.
        let times = upstream.connect_times();
        let deltas: Vec<u64> = times
            .windows(2)
            .map(|w| w[1].duration_since(w[0]).as_secs())
            .collect();
        assert_eq!(deltas, vec![5, 10, 20]);

        // No further connect happens.
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(upstream.connect_count(), 4);

        manager.stop("test done").await;
    }

    #[tokio::test]
    async fn logged_out_close_purges_credentials() {
        let upstream = Arc::new(MockUpstream::new());
        let conn = upstream.script_connection();
        let (_dir, store) = store().await;
        let t = tenant("t-4");
        store
            .save(&t, &CredentialBundle(b"linked".to_vec()))
            .await
            .unwrap();
        let (events_tx, mut events_rx) = mpsc::channel(64);

        let manager =
            SessionManager::start(t.clone(), upstream.clone(), store.clone(), events_tx, settings(5));
        let _ = next_event(&mut events_rx).await; // connecting

        conn.push(UpstreamUpdate::State(ConnectionState::Close {
            reason: "logged out from phone".into(),
            logged_out: true,
        }))
        .await;

        loop {
            if let SessionEvent::Disconnected { reason, .. } = next_event(&mut events_rx).await {
                assert!(reason.contains("logged out"));
                break;
            }
        }
        assert_eq!(manager.status(), SessionStatus::Disconnected);
        assert!(!store.has_credentials(&t).await);
        assert!(!store.tenant_dir(&t).exists());
        assert_eq!(upstream.connect_count(), 1, "no reconnect after logout");

        manager.stop("test done").await;
    }

    #[tokio::test]
    async fn creds_updates_are_persisted() {
        let upstream = Arc::new(MockUpstream::new());
        let conn = upstream.script_connection();
        let (_dir, store) = store().await;
        let t = tenant("t-5");
        let (events_tx, mut events_rx) = mpsc::channel(64);

        let manager =
            SessionManager::start(t.clone(), upstream.clone(), store.clone(), events_tx, settings(5));
        let _ = next_event(&mut events_rx).await; // connecting

        conn.push(UpstreamUpdate::CredsUpdated(CredentialBundle(
            b"rotated".to_vec(),
        )))
        .await;
        // Drive another update through to order after the save.
        conn.push(UpstreamUpdate::Inbound(vec![raw_inbound("m-1", "hi", false)]))
            .await;
        let _ = next_event(&mut events_rx).await;

        let loaded = store.load(&t).await.unwrap().unwrap();
        assert_eq!(loaded.as_bytes(), b"rotated");

        manager.stop("test done").await;
    }

    #[tokio::test]
    async fn send_requires_connected_session() {
        let upstream = Arc::new(MockUpstream::new());
        let _conn = upstream.script_connection();
        let (_dir, store) = store().await;
        let (events_tx, mut events_rx) = mpsc::channel(64);

        let manager = SessionManager::start(
            tenant("t-6"),
            upstream.clone(),
            store,
            events_tx,
            settings(5),
        );
        let _ = next_event(&mut events_rx).await; // connecting

        let data = MessageData {
            to: "+5511988887777".into(),
            message: "hello".into(),
            kind: None,
            media_url: None,
            caption: None,
            file_name: None,
        };
        let err = manager.send(&data).await.unwrap_err();
        assert!(matches!(err, BridgeError::NotConnected { .. }));

        manager.stop("test done").await;
    }

    #[tokio::test]
    async fn connected_text_send_reaches_upstream() {
        let upstream = Arc::new(MockUpstream::new());
        let conn = upstream.script_connection();
        let (_dir, store) = store().await;
        let (events_tx, mut events_rx) = mpsc::channel(64);

        let manager = SessionManager::start(
            tenant("t-7"),
            upstream.clone(),
            store,
            events_tx,
            settings(5),
        );
        let _ = next_event(&mut events_rx).await; // connecting
        conn.push(UpstreamUpdate::State(ConnectionState::Open)).await;
        let _ = next_event(&mut events_rx).await; // connected

        let data = MessageData {
            to: "+5511988887777".into(),
            message: "hello".into(),
            kind: None,
            media_url: None,
            caption: None,
            file_name: None,
        };
        let id = manager.send(&data).await.unwrap();
        assert!(!id.is_empty());

        let sent = conn.sent().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "+5511988887777");
        match &sent[0].1 {
            OutboundContent::Text { body } => assert_eq!(body, "hello"),
            other => panic!("expected text content, got {other:?}"),
        }

        manager.stop("test done").await;
    }

    #[tokio::test]
    async fn media_send_failure_mentions_fetch() {
        let server = httpmock::MockServer::start_async().await;
        let media_mock = server
            .mock_async(|when, then| {
                when.method(httpmock::Method::GET).path("/x.jpg");
                then.status(502);
            })
            .await;

        let upstream = Arc::new(MockUpstream::new());
        let conn = upstream.script_connection();
        let (_dir, store) = store().await;
        let (events_tx, mut events_rx) = mpsc::channel(64);

        let manager = SessionManager::start(
            tenant("t-8"),
            upstream.clone(),
            store,
            events_tx,
            settings(5),
        );
        let _ = next_event(&mut events_rx).await; // connecting
        conn.push(UpstreamUpdate::State(ConnectionState::Open)).await;
        let _ = next_event(&mut events_rx).await; // connected

        let data = MessageData {
            to: "+5511988887777".into(),
            message: "x".into(),
            kind: Some(MessageKind::Image),
            media_url: Some(server.url("/x.jpg")),
            caption: None,
            file_name: None,
        };
        let err = manager.send(&data).await.unwrap_err();
        assert!(err.to_string().contains("fetch"), "got: {err}");
        media_mock.assert_async().await;
        assert!(conn.sent().await.is_empty(), "nothing reached the upstream");

        manager.stop("test done").await;
    }

    #[tokio::test]
    async fn media_send_success_carries_mime_and_caption() {
        let server = httpmock::MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(httpmock::Method::GET).path("/pic.jpg");
                then.status(200)
                    .header("content-type", "image/jpeg")
                    .body(vec![0xFFu8, 0xD8, 0xFF]);
            })
            .await;

        let upstream = Arc::new(MockUpstream::new());
        let conn = upstream.script_connection();
        let (_dir, store) = store().await;
        let (events_tx, mut events_rx) = mpsc::channel(64);

        let manager = SessionManager::start(
            tenant("t-9"),
            upstream.clone(),
            store,
            events_tx,
            settings(5),
        );
        let _ = next_event(&mut events_rx).await;
        conn.push(UpstreamUpdate::State(ConnectionState::Open)).await;
        let _ = next_event(&mut events_rx).await;

        let data = MessageData {
            to: "+5511988887777".into(),
            message: "look".into(),
            kind: Some(MessageKind::Image),
            media_url: Some(server.url("/pic.jpg")),
            caption: None,
            file_name: None,
        };
        manager.send(&data).await.unwrap();

        let sent = conn.sent().await;
        match &sent[0].1 {
            OutboundContent::Media { bytes, mime, caption } => {
                assert_eq!(bytes, &vec![0xFFu8, 0xD8, 0xFF]);
                assert_eq!(mime, "image/jpeg");
                assert_eq!(caption.as_deref(), Some("look"));
            }
            other => panic!("expected media content, got {other:?}"),
        }

        manager.stop("test done").await;
    }

    #[test]
    fn reconnect_delay_schedule() {
        assert_eq!(reconnect_delay(1), Duration::from_secs(5));
        assert_eq!(reconnect_delay(2), Duration::from_secs(10));
        assert_eq!(reconnect_delay(3), Duration::from_secs(20));
        assert_eq!(reconnect_delay(4), Duration::from_secs(30));
        assert_eq!(reconnect_delay(10), Duration::from_secs(30));
    }

    #[test]
    fn qr_data_url_shape() {
        let url = render_qr_data_url(&[1, 2, 3]);
        assert!(url.starts_with("data:image/png;base64,"));
    }
}
