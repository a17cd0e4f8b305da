// SPDX-FileCopyrightText: 2026 Wabridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Development loopback upstream.
//!
//! Production deployments link a real adapter crate for the upstream chat
//! network; this compiled-in stand-in lets the whole control plane run
//! without it. A fresh tenant receives a synthetic pairing artifact, then
//! "links" itself after a short delay and persists a credential bundle so
//! later connects resume straight to `open`.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tokio::sync::mpsc;
use tracing::debug;

use wabridge_core::{
    BridgeError, ConnectionState, CredentialBundle, OutboundContent, PhoneIdentity, TenantId,
    UpstreamAdapter, UpstreamHandle, UpstreamSession, UpstreamUpdate,
};

/// How long the synthetic pairing flow waits before "linking".
const PAIR_DELAY: Duration = Duration::from_secs(10);
/// Artifact size; large enough to resemble a rendered pairing image.
const ARTIFACT_BYTES: usize = 900;

pub struct LoopbackUpstream {
    pair_delay: Duration,
}

impl LoopbackUpstream {
    pub fn new() -> Self {
        Self {
            pair_delay: PAIR_DELAY,
        }
    }

    #[cfg(test)]
    fn with_pair_delay(pair_delay: Duration) -> Self {
        Self { pair_delay }
    }
}

impl Default for LoopbackUpstream {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UpstreamAdapter for LoopbackUpstream {
    async fn connect(
        &self,
        tenant: &TenantId,
        credentials: Option<CredentialBundle>,
    ) -> Result<UpstreamSession, BridgeError> {
        let (tx, rx) = mpsc::channel(64);
        let handle = Arc::new(LoopbackHandle {
            tenant: tenant.clone(),
            identity: Mutex::new(None),
        });

        let task_handle = Arc::clone(&handle);
        let tenant = tenant.clone();
        let pair_delay = self.pair_delay;
        tokio::spawn(async move {
            if credentials.is_some() {
                // Resume: straight to open.
                task_handle.set_identity(identity_for(&tenant));
                let _ = tx.send(UpstreamUpdate::State(ConnectionState::Open)).await;
                return;
            }

            // Fresh tenant: synthetic pairing, then self-link.
            let _ = tx
                .send(UpstreamUpdate::Pairing(artifact_for(&tenant)))
                .await;
            tokio::time::sleep(pair_delay).await;
            let _ = tx
                .send(UpstreamUpdate::CredsUpdated(CredentialBundle(
                    format!("loopback:{tenant}").into_bytes(),
                )))
                .await;
            task_handle.set_identity(identity_for(&tenant));
            let _ = tx.send(UpstreamUpdate::State(ConnectionState::Open)).await;
        });

        Ok(UpstreamSession {
            handle,
            updates: rx,
        })
    }
}

struct LoopbackHandle {
    tenant: TenantId,
    identity: Mutex<Option<PhoneIdentity>>,
}

impl LoopbackHandle {
    fn set_identity(&self, identity: PhoneIdentity) {
        *self.identity.lock().expect("identity mutex") = Some(identity);
    }
}

#[async_trait]
impl UpstreamHandle for LoopbackHandle {
    async fn send(&self, jid: &str, content: OutboundContent) -> Result<String, BridgeError> {
        let kind = match content {
            OutboundContent::Text { .. } => "text",
            OutboundContent::Media { .. } => "media",
            OutboundContent::Document { .. } => "document",
        };
        debug!(tenant = %self.tenant, jid, kind, "loopback send");
        Ok(format!("loopback-{}", uuid::Uuid::new_v4()))
    }

    fn identity(&self) -> Option<PhoneIdentity> {
        self.identity.lock().expect("identity mutex").clone()
    }

    async fn logout(&self) {
        debug!(tenant = %self.tenant, "loopback logout");
    }
}

/// Deterministic pseudo-image bytes for a tenant's pairing artifact.
fn artifact_for(tenant: &TenantId) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(ARTIFACT_BYTES);
    let mut block: Vec<u8> = Sha256::digest(tenant.as_str().as_bytes()).to_vec();
    while bytes.len() < ARTIFACT_BYTES {
        block = Sha256::digest(&block).to_vec();
        bytes.extend_from_slice(&block);
    }
    bytes.truncate(ARTIFACT_BYTES);
    bytes
}

/// Deterministic phone identity for a tenant.
fn identity_for(tenant: &TenantId) -> PhoneIdentity {
    let digest = Sha256::digest(tenant.as_str().as_bytes());
    let digits: String = digest
        .iter()
        .map(|b| char::from(b'0' + (b % 10)))
        .take(11)
        .collect();
    PhoneIdentity {
        phone_number: format!("+55{digits}"),
        business_name: None,
    }
}
