// SPDX-FileCopyrightText: 2026 Wabridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Routes session events to the pairing service and webhook dispatcher.
//!
//! One router instance serves every tenant; the registry's per-tenant pump
//! tasks call it, so a single tenant's events arrive here in order.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use wabridge_core::{SessionEvent, SessionStatus};
use wabridge_session::{PairingService, SessionEventHandler};
use wabridge_webhook::WebhookDispatcher;

pub struct EventRouter {
    pairing: Arc<PairingService>,
    dispatcher: Arc<WebhookDispatcher>,
}

impl EventRouter {
    pub fn new(pairing: Arc<PairingService>, dispatcher: Arc<WebhookDispatcher>) -> Self {
        Self {
            pairing,
            dispatcher,
        }
    }
}

#[async_trait]
impl SessionEventHandler for EventRouter {
    async fn handle(&self, event: SessionEvent) {
        match event {
            SessionEvent::Qr { tenant_id, qr_code } => {
                self.pairing.observe_qr(&tenant_id, &qr_code);
                self.dispatcher
                    .dispatch_status(&tenant_id, &SessionStatus::Qr.to_string(), None, "qr")
                    .await;
            }
            SessionEvent::Connecting { tenant_id } => {
                self.dispatcher
                    .dispatch_status(
                        &tenant_id,
                        &SessionStatus::Connecting.to_string(),
                        None,
                        "connecting",
                    )
                    .await;
            }
            SessionEvent::Connected {
                tenant_id,
                phone_number,
                ..
            } => {
                self.pairing.mark_connected(&tenant_id);
                self.dispatcher
                    .dispatch_status(
                        &tenant_id,
                        &SessionStatus::Connected.to_string(),
                        Some(&phone_number),
                        "connected",
                    )
                    .await;
            }
            SessionEvent::Disconnected { tenant_id, reason } => {
                debug!(tenant = %tenant_id, reason = %reason, "session disconnected");
                self.dispatcher
                    .dispatch_status(
                        &tenant_id,
                        &SessionStatus::Disconnected.to_string(),
                        None,
                        "disconnected",
                    )
                    .await;
            }
            SessionEvent::Message(msg) => {
                self.dispatcher.dispatch_message(&msg).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method, MockServer};
    use wabridge_core::{InboundMessage, MessageKind, TenantId};
    use wabridge_webhook::{RegisterSink, SinkEvent};

    fn tenant(id: &str) -> TenantId {
        TenantId::new(id).unwrap()
    }

    #[tokio::test]
    async fn message_events_reach_the_sink_and_pairing_tracks_qr() {
        let server = MockServer::start_async().await;
        let message_hook = server
            .mock_async(|when, then| {
                when.method(Method::POST)
                    .path("/wh")
                    .header("x-webhook-event", "message");
                then.status(200);
            })
            .await;
        let status_hook = server
            .mock_async(|when, then| {
                when.method(Method::POST)
                    .path("/wh")
                    .header("x-webhook-event", "status_change");
                then.status(200);
            })
            .await;

        let pairing = Arc::new(PairingService::new());
        let dispatcher = Arc::new(WebhookDispatcher::new().unwrap());
        let t = tenant("t-1");
        dispatcher.register(
            &t,
            RegisterSink {
                url: server.url("/wh"),
                secret: None,
                events: vec![SinkEvent::Message, SinkEvent::Status],
            },
        );

        let router = EventRouter::new(pairing, dispatcher);
        router
            .handle(SessionEvent::Connected {
                tenant_id: t.clone(),
                phone_number: "+5511999999999".into(),
                business_name: None,
            })
            .await;
        router
            .handle(SessionEvent::Message(InboundMessage {
                tenant_id: t.clone(),
                from: "5511988887777@s.whatsapp.net".into(),
                to: "5511999999999@s.whatsapp.net".into(),
                text: "hi".into(),
                message_id: "m-1".into(),
                timestamp_ms: 1_700_000_000_000,
                kind: MessageKind::Text,
                media_url: None,
                caption: None,
            }))
            .await;

        status_hook.assert_hits_async(1).await;
        message_hook.assert_hits_async(1).await;
    }
}
