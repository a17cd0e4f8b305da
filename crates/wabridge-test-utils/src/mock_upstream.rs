// SPDX-FileCopyrightText: 2026 Wabridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock upstream adapter for deterministic testing.
//!
//! Tests script connections up front with [`MockUpstream::script_connection`];
//! each call to `connect()` consumes the next scripted connection in order.
//! The returned [`MockConnection`] control lets the test push updates onto
//! the session's stream and inspect what the session manager sent.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};

use wabridge_core::{
    BridgeError, CredentialBundle, OutboundContent, PhoneIdentity, TenantId, UpstreamAdapter,
    UpstreamHandle, UpstreamSession, UpstreamUpdate,
};

/// One `(jid, content)` pair captured by the mock handle.
pub type SentRecord = (String, OutboundContent);

struct MockHandleState {
    identity: Option<PhoneIdentity>,
    sent: Vec<SentRecord>,
    logout_calls: u32,
}

struct MockHandle {
    state: Arc<Mutex<MockHandleState>>,
}

#[async_trait]
impl UpstreamHandle for MockHandle {
    async fn send(&self, jid: &str, content: OutboundContent) -> Result<String, BridgeError> {
        let mut state = self.state.lock().unwrap();
        state.sent.push((jid.to_string(), content));
        Ok(format!("srv-{}", uuid::Uuid::new_v4()))
    }

    fn identity(&self) -> Option<PhoneIdentity> {
        self.state.lock().unwrap().identity.clone()
    }

    async fn logout(&self) {
        self.state.lock().unwrap().logout_calls += 1;
    }
}

/// Test-side control over one scripted connection.
#[derive(Clone)]
pub struct MockConnection {
    updates_tx: mpsc::Sender<UpstreamUpdate>,
    state: Arc<Mutex<MockHandleState>>,
    connected_rx: watch::Receiver<bool>,
}

impl MockConnection {
    /// Push an update onto the session's stream.
    ///
    /// Updates pushed before the adapter connects are buffered in order.
    pub async fn push(&self, update: UpstreamUpdate) {
        self.updates_tx
            .send(update)
            .await
            .expect("session update stream dropped");
    }

    /// Set the identity reported once the connection opens.
    pub fn set_identity(&self, identity: PhoneIdentity) {
        self.state.lock().unwrap().identity = Some(identity);
    }

    /// Resolves once `connect()` has handed this connection to a manager.
    pub async fn wait_connected(&self) {
        let mut rx = self.connected_rx.clone();
        while !*rx.borrow() {
            rx.changed().await.expect("mock adapter dropped");
        }
    }

    /// Everything the manager sent through this connection's handle.
    pub async fn sent(&self) -> Vec<SentRecord> {
        self.state.lock().unwrap().sent.clone()
    }

    /// How many times `logout()` was called on the handle.
    pub fn logout_calls(&self) -> u32 {
        self.state.lock().unwrap().logout_calls
    }
}

struct ScriptedConnection {
    session: UpstreamSession,
    connected_tx: watch::Sender<bool>,
}

/// A scriptable [`UpstreamAdapter`] with connect-call accounting.
pub struct MockUpstream {
    queue: Mutex<VecDeque<ScriptedConnection>>,
    connects: Mutex<Vec<ConnectRecord>>,
}

/// One observed `connect()` call.
#[derive(Clone)]
pub struct ConnectRecord {
    pub tenant_id: TenantId,
    pub had_credentials: bool,
    pub at: tokio::time::Instant,
}

impl MockUpstream {
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            connects: Mutex::new(Vec::new()),
        }
    }

    /// Queue one connection and return its test-side control.
    pub fn script_connection(&self) -> MockConnection {
        let (updates_tx, updates_rx) = mpsc::channel(64);
        let (connected_tx, connected_rx) = watch::channel(false);
        let state = Arc::new(Mutex::new(MockHandleState {
            identity: None,
            sent: Vec::new(),
            logout_calls: 0,
        }));

        let handle = Arc::new(MockHandle {
            state: Arc::clone(&state),
        });
        self.queue.lock().unwrap().push_back(ScriptedConnection {
            session: UpstreamSession {
                handle,
                updates: updates_rx,
            },
            connected_tx,
        });

        MockConnection {
            updates_tx,
            state,
            connected_rx,
        }
    }

    /// Number of `connect()` calls observed so far.
    pub fn connect_count(&self) -> usize {
        self.connects.lock().unwrap().len()
    }

    /// Timestamps of each `connect()` call, in order.
    pub fn connect_times(&self) -> Vec<tokio::time::Instant> {
        self.connects.lock().unwrap().iter().map(|r| r.at).collect()
    }

    /// Full records of each `connect()` call, in order.
    pub fn connect_records(&self) -> Vec<ConnectRecord> {
        self.connects.lock().unwrap().clone()
    }
}

impl Default for MockUpstream {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UpstreamAdapter for MockUpstream {
    async fn connect(
        &self,
        tenant: &TenantId,
        credentials: Option<CredentialBundle>,
    ) -> Result<UpstreamSession, BridgeError> {
        self.connects.lock().unwrap().push(ConnectRecord {
            tenant_id: tenant.clone(),
            had_credentials: credentials.is_some(),
            at: tokio::time::Instant::now(),
        });

        let scripted = self.queue.lock().unwrap().pop_front();
        match scripted {
            Some(scripted) => {
                let _ = scripted.connected_tx.send(true);
                Ok(scripted.session)
            }
            // Unscripted connects hang until the caller gives up; tests
            // script exactly as many connections as they expect.
            None => std::future::pending().await,
        }
    }
}
