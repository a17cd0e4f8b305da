// SPDX-FileCopyrightText: 2026 Wabridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Webhook dispatcher: per-tenant sink registry and delivery pipeline.
//!
//! One active sink per tenant; re-registration updates the sink in place,
//! preserving its id and counters. Message deliveries are deduplicated per
//! `(tenant, messageId)` with the key claimed *before* the POST goes out;
//! a delivery that ultimately fails releases its key so a later inbound
//! notification may retry. Retryable failures (5xx, transport errors) back
//! off with `min(1 s * 2^attempt, 5 s)` for up to 2 retries; 4xx responses
//! fail immediately. A sink accumulating more than 10 errors is
//! deactivated until the operator re-registers it.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use wabridge_core::{BridgeError, InboundMessage, TenantId};

use crate::dedup::DedupStore;
use crate::payload::{
    MessageEventData, StatusEventData, TestEventData, WebhookPayload, EVENT_MESSAGE, EVENT_STATUS,
    EVENT_TEST,
};
use crate::signature;
use crate::stats::{StatsStore, TenantStats};

pub const SIGNATURE_HEADER: &str = "X-Webhook-Signature";
pub const EVENT_HEADER: &str = "X-Webhook-Event";
pub const TENANT_HEADER: &str = "X-Tenant-ID";
pub const USER_AGENT_VALUE: &str = "WhatsApp-Microservice/1.0.0";

/// Bound on one delivery attempt.
const DELIVERY_TIMEOUT: Duration = Duration::from_secs(8);
/// Redirects followed per attempt.
const MAX_REDIRECTS: usize = 2;
/// Retries after the first attempt.
const MAX_RETRIES: u32 = 2;
/// Retry backoff base; doubles per attempt.
const RETRY_BASE: Duration = Duration::from_secs(1);
/// Retry backoff ceiling.
const RETRY_CAP: Duration = Duration::from_secs(5);
/// Cumulative error count past which a sink is deactivated.
const DEACTIVATION_THRESHOLD: u64 = 10;
/// Dedup sweep cadence.
const DEDUP_SWEEP_INTERVAL: Duration = Duration::from_secs(2 * 60);
/// Stats sweep cadence.
const STATS_SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Event classes a sink may subscribe to.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SinkEvent {
    Message,
    Status,
}

/// A tenant-owned HTTP endpoint receiving forwarded events.
#[derive(Debug, Clone)]
pub struct WebhookSink {
    pub id: String,
    pub url: String,
    pub secret: Option<String>,
    pub events: Vec<SinkEvent>,
    pub active: bool,
    pub success_count: u64,
    pub error_count: u64,
    pub created_at: DateTime<Utc>,
    pub last_used: Option<DateTime<Utc>>,
}

/// Registration request for a sink.
#[derive(Debug, Clone)]
pub struct RegisterSink {
    pub url: String,
    pub secret: Option<String>,
    pub events: Vec<SinkEvent>,
}

impl RegisterSink {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            secret: None,
            events: vec![SinkEvent::Message],
        }
    }
}

/// A sink as exposed to callers: the secret is reduced to its presence.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SinkView {
    pub id: String,
    pub url: String,
    pub events: Vec<SinkEvent>,
    pub active: bool,
    pub success_count: u64,
    pub error_count: u64,
    pub has_secret: bool,
    pub created_at: DateTime<Utc>,
    pub last_used: Option<DateTime<Utc>>,
}

impl From<&WebhookSink> for SinkView {
    fn from(sink: &WebhookSink) -> Self {
        Self {
            id: sink.id.clone(),
            url: sink.url.clone(),
            events: sink.events.clone(),
            active: sink.active,
            success_count: sink.success_count,
            error_count: sink.error_count,
            has_secret: sink.secret.is_some(),
            created_at: sink.created_at,
            last_used: sink.last_used,
        }
    }
}

/// Outcome of a sink test delivery.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestDelivery {
    pub success: bool,
    pub response_time_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// What one delivery needs, detached from the registry so no map lock is
/// held across network awaits.
#[derive(Clone)]
struct SinkTarget {
    url: String,
    secret: Option<String>,
}

enum DeliveryError {
    /// 4xx response; retrying cannot help.
    Rejected(u16),
    /// 5xx or transport failure after the retry budget.
    Exhausted(String),
}

/// Fan-out of inbound events to tenant sinks.
pub struct WebhookDispatcher {
    sinks: DashMap<TenantId, WebhookSink>,
    dedup: DedupStore,
    stats: StatsStore,
    client: reqwest::Client,
    cancel: CancellationToken,
}

impl WebhookDispatcher {
    pub fn new() -> Result<Self, BridgeError> {
        let client = reqwest::Client::builder()
            .timeout(DELIVERY_TIMEOUT)
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .build()
            .map_err(|e| BridgeError::Webhook(format!("failed to build http client: {e}")))?;
        Ok(Self {
            sinks: DashMap::new(),
            dedup: DedupStore::new(),
            stats: StatsStore::new(),
            client,
            cancel: CancellationToken::new(),
        })
    }

    // --- sink registry ----------------------------------------------------

    /// Registers the tenant's sink, or updates it in place.
    ///
    /// Re-registration keeps the id and counters stable and reactivates a
    /// sink that was deactivated for errors.
    pub fn register(&self, tenant: &TenantId, request: RegisterSink) -> SinkView {
        let mut entry = self
            .sinks
            .entry(tenant.clone())
            .or_insert_with(|| WebhookSink {
                id: uuid::Uuid::new_v4().to_string(),
                url: String::new(),
                secret: None,
                events: Vec::new(),
                active: true,
                success_count: 0,
                error_count: 0,
                created_at: Utc::now(),
                last_used: None,
            });
        let sink = entry.value_mut();
        sink.url = request.url;
        sink.secret = request.secret;
        sink.events = if request.events.is_empty() {
            vec![SinkEvent::Message]
        } else {
            request.events
        };
        sink.active = true;
        info!(tenant = %tenant, sink_id = %sink.id, url = %sink.url, "webhook sink registered");
        SinkView::from(&*sink)
    }

    /// The tenant's sink, if any (secret redacted).
    pub fn list(&self, tenant: &TenantId) -> Vec<SinkView> {
        self.sinks
            .get(tenant)
            .map(|sink| vec![SinkView::from(sink.value())])
            .unwrap_or_default()
    }

    /// Removes the sink with the given id. Returns false when no such sink
    /// exists for the tenant.
    pub fn remove(&self, tenant: &TenantId, sink_id: &str) -> bool {
        let matches = self
            .sinks
            .get(tenant)
            .map(|sink| sink.id == sink_id)
            .unwrap_or(false);
        if matches {
            self.sinks.remove(tenant);
            info!(tenant = %tenant, sink_id, "webhook sink removed");
        }
        matches
    }

    pub fn stats(&self, tenant: &TenantId) -> Option<TenantStats> {
        self.stats.get(tenant)
    }

    /// Constant-time signature verification, exposed so external validators
    /// can check inbound payloads symmetrically.
    pub fn verify_signature(secret: &str, payload: &[u8], sig: &str) -> bool {
        signature::verify(secret, payload, sig)
    }

    // --- delivery pipeline --------------------------------------------------

    /// Forwards an inbound message to the tenant's sink, once per
    /// `(tenant, messageId)` within the dedup window.
    pub async fn dispatch_message(&self, msg: &InboundMessage) {
        let tenant = &msg.tenant_id;
        let Some(target) = self.target_for(tenant, SinkEvent::Message) else {
            return;
        };

        // Claim before sending: concurrent batches carrying the same id
        // must not both forward it.
        if !self.dedup.try_claim(tenant, &msg.message_id) {
            debug!(tenant = %tenant, message_id = %msg.message_id, "duplicate delivery dropped");
            self.stats.record_duplicate(tenant);
            return;
        }

        let payload = WebhookPayload {
            event: EVENT_MESSAGE.to_string(),
            timestamp: Utc::now().timestamp_millis(),
            tenant_id: tenant.to_string(),
            data: MessageEventData::from(msg),
        };
        let body = match serde_json::to_vec(&payload) {
            Ok(body) => body,
            Err(e) => {
                warn!(tenant = %tenant, error = %e, "payload encoding failed");
                self.dedup.release(tenant, &msg.message_id);
                return;
            }
        };

        match self.deliver(tenant, &target, EVENT_MESSAGE, &body).await {
            Ok(elapsed) => self.record_success(tenant, elapsed),
            Err(e) => {
                self.log_failure(tenant, EVENT_MESSAGE, &e);
                // Release so a later delivery of the same id may retry.
                self.dedup.release(tenant, &msg.message_id);
                self.record_failure(tenant);
            }
        }
    }

    /// Forwards a state-machine transition to sinks subscribed to status
    /// events. Callers invoke this sequentially per tenant, which keeps
    /// status deliveries in transition order.
    pub async fn dispatch_status(
        &self,
        tenant: &TenantId,
        status: &str,
        phone_number: Option<&str>,
        transition: &str,
    ) {
        let Some(target) = self.target_for(tenant, SinkEvent::Status) else {
            return;
        };

        let payload = WebhookPayload {
            event: EVENT_STATUS.to_string(),
            timestamp: Utc::now().timestamp_millis(),
            tenant_id: tenant.to_string(),
            data: StatusEventData {
                status: status.to_string(),
                phone_number: phone_number.map(str::to_string),
                event: transition.to_string(),
            },
        };
        let Ok(body) = serde_json::to_vec(&payload) else {
            return;
        };

        match self.deliver(tenant, &target, EVENT_STATUS, &body).await {
            Ok(elapsed) => self.record_success(tenant, elapsed),
            Err(e) => {
                self.log_failure(tenant, EVENT_STATUS, &e);
                self.record_failure(tenant);
            }
        }
    }

    /// Sends a single test delivery to the identified sink and reports the
    /// round trip. Counters are untouched; this is an operator probe.
    pub async fn test_sink(
        &self,
        tenant: &TenantId,
        sink_id: &str,
    ) -> Result<TestDelivery, BridgeError> {
        let target = {
            let sink = self
                .sinks
                .get(tenant)
                .ok_or_else(|| BridgeError::Webhook("no sink registered".into()))?;
            if sink.id != sink_id {
                return Err(BridgeError::Webhook(format!("unknown sink `{sink_id}`")));
            }
            SinkTarget {
                url: sink.url.clone(),
                secret: sink.secret.clone(),
            }
        };

        let payload = WebhookPayload {
            event: EVENT_TEST.to_string(),
            timestamp: Utc::now().timestamp_millis(),
            tenant_id: tenant.to_string(),
            data: TestEventData {
                message: "webhook test delivery".to_string(),
            },
        };
        let body = serde_json::to_vec(&payload)
            .map_err(|e| BridgeError::Webhook(format!("payload encoding failed: {e}")))?;

        let started = Instant::now();
        let result = self.post_once(tenant, &target, EVENT_TEST, &body).await;
        let response_time_ms = started.elapsed().as_millis() as u64;

        Ok(match result {
            Ok(status) => TestDelivery {
                success: true,
                response_time_ms,
                status: Some(status),
                error: None,
            },
            Err(AttemptError::Status(status)) => TestDelivery {
                success: false,
                response_time_ms,
                status: Some(status),
                error: Some(format!("sink returned status {status}")),
            },
            Err(AttemptError::Transport(detail)) => TestDelivery {
                success: false,
                response_time_ms,
                status: None,
                error: Some(detail),
            },
        })
    }

    /// Starts the periodic dedup and stats sweeps.
    pub fn spawn_sweeps(self: &Arc<Self>) {
        let dispatcher = Arc::clone(self);
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            let mut dedup_tick = tokio::time::interval(DEDUP_SWEEP_INTERVAL);
            let mut stats_tick = tokio::time::interval(STATS_SWEEP_INTERVAL);
            dedup_tick.tick().await;
            stats_tick.tick().await;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = dedup_tick.tick() => dispatcher.dedup.sweep(),
                    _ = stats_tick.tick() => dispatcher.stats.sweep(),
                }
            }
        });
    }

    /// Stops background sweeps; pending deliveries finish on their own.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    // --- internals ----------------------------------------------------------

    fn target_for(&self, tenant: &TenantId, event: SinkEvent) -> Option<SinkTarget> {
        let sink = self.sinks.get(tenant)?;
        if !sink.active || !sink.events.contains(&event) {
            return None;
        }
        Some(SinkTarget {
            url: sink.url.clone(),
            secret: sink.secret.clone(),
        })
    }

    /// Full delivery with retry: one attempt plus up to [`MAX_RETRIES`]
    /// retries with exponential backoff for retryable failures.
    async fn deliver(
        &self,
        tenant: &TenantId,
        target: &SinkTarget,
        event: &str,
        body: &[u8],
    ) -> Result<Duration, DeliveryError> {
        let started = Instant::now();
        let mut attempt: u32 = 0;
        loop {
            match self.post_once(tenant, target, event, body).await {
                Ok(_status) => return Ok(started.elapsed()),
                Err(AttemptError::Status(status)) if (400..500).contains(&status) => {
                    return Err(DeliveryError::Rejected(status));
                }
                Err(e) => {
                    if attempt >= MAX_RETRIES {
                        return Err(DeliveryError::Exhausted(e.detail()));
                    }
                    let backoff = retry_backoff(attempt);
                    debug!(
                        tenant = %tenant,
                        attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e.detail(),
                        "retrying webhook delivery"
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
            }
        }
    }

    /// One POST to the sink with the full header set.
    async fn post_once(
        &self,
        tenant: &TenantId,
        target: &SinkTarget,
        event: &str,
        body: &[u8],
    ) -> Result<u16, AttemptError> {
        let mut request = self
            .client
            .post(&target.url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .header(reqwest::header::USER_AGENT, USER_AGENT_VALUE)
            .header(EVENT_HEADER, event)
            .header(TENANT_HEADER, tenant.as_str());

        if let Some(ref secret) = target.secret {
            let sig = signature::sign(secret, body)
                .map_err(|e| AttemptError::Transport(e.to_string()))?;
            request = request.header(SIGNATURE_HEADER, sig);
        }

        match request.body(body.to_vec()).send().await {
            Ok(response) if response.status().is_success() => Ok(response.status().as_u16()),
            Ok(response) => Err(AttemptError::Status(response.status().as_u16())),
            // Covers refused connections, DNS failures, and timeouts; all
            // retryable.
            Err(e) => Err(AttemptError::Transport(e.to_string())),
        }
    }

    fn record_success(&self, tenant: &TenantId, elapsed: Duration) {
        if let Some(mut sink) = self.sinks.get_mut(tenant) {
            sink.success_count += 1;
            sink.last_used = Some(Utc::now());
        }
        self.stats.record_success(tenant, elapsed);
    }

    fn record_failure(&self, tenant: &TenantId) {
        if let Some(mut sink) = self.sinks.get_mut(tenant) {
            sink.error_count += 1;
            sink.last_used = Some(Utc::now());
            if sink.active && sink.error_count > DEACTIVATION_THRESHOLD {
                sink.active = false;
                warn!(
                    tenant = %tenant,
                    sink_id = %sink.id,
                    errors = sink.error_count,
                    "sink deactivated after repeated failures; re-register to resume"
                );
            }
        }
        self.stats.record_failure(tenant);
    }

    fn log_failure(&self, tenant: &TenantId, event: &str, error: &DeliveryError) {
        match error {
            DeliveryError::Rejected(status) => {
                warn!(tenant = %tenant, event, status, "sink rejected delivery")
            }
            DeliveryError::Exhausted(detail) => {
                warn!(tenant = %tenant, event, detail = %detail, "delivery retries exhausted")
            }
        }
    }
}

enum AttemptError {
    Status(u16),
    Transport(String),
}

impl AttemptError {
    fn detail(&self) -> String {
        match self {
            AttemptError::Status(status) => format!("status {status}"),
            AttemptError::Transport(detail) => detail.clone(),
        }
    }
}

/// Backoff before retry number `attempt + 1`: `min(1 s * 2^attempt, 5 s)`.
fn retry_backoff(attempt: u32) -> Duration {
    RETRY_BASE
        .saturating_mul(1u32 << attempt.min(16))
        .min(RETRY_CAP)
}
