// SPDX-FileCopyrightText: 2026 Wabridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `wabridge serve` command implementation.
//!
//! Loads and validates configuration (any error terminates the process),
//! wires the credential store, webhook dispatcher, pairing service, and
//! session registry together, and serves the HTTP API until SIGINT/SIGTERM.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use wabridge_config::{validate_config, BridgeConfig};
use wabridge_core::{BridgeError, TenantId, UpstreamAdapter};
use wabridge_gateway::{build_router, start_server, AppState, AuthState};
use wabridge_session::{
    CredentialStore, PairingService, SessionCreatedHook, SessionRegistry, SessionSettings,
};
use wabridge_webhook::{RegisterSink, SinkEvent, WebhookDispatcher};

use crate::events::EventRouter;
use crate::loopback::LoopbackUpstream;
use crate::shutdown;

/// How long shutdown waits for sessions to close.
const SHUTDOWN_WINDOW: Duration = Duration::from_secs(10);

/// Runs the `wabridge serve` command.
pub async fn run_serve() -> Result<(), BridgeError> {
    let config = wabridge_config::load_config()
        .map_err(|e| BridgeError::Config(format!("failed to load configuration: {e}")))?;

    init_tracing(&config.runtime.log_level);

    if let Err(errors) = validate_config(&config) {
        for e in &errors {
            eprintln!("error: {e}");
        }
        return Err(BridgeError::Config(format!(
            "{} configuration error(s)",
            errors.len()
        )));
    }

    info!(
        env = %config.runtime.env,
        host = %config.server.host,
        port = config.server.port,
        "starting wabridge serve"
    );

    // Credential store failure blocks every tenant: fatal at start.
    let store = Arc::new(CredentialStore::open(&config.upstream.session_dir).await?);

    let dispatcher = Arc::new(WebhookDispatcher::new()?);
    dispatcher.spawn_sweeps();

    let pairing = Arc::new(PairingService::new());
    pairing.spawn_sweep();

    let adapter: Arc<dyn UpstreamAdapter> = Arc::new(LoopbackUpstream::new());
    let event_router = Arc::new(EventRouter::new(
        Arc::clone(&pairing),
        Arc::clone(&dispatcher),
    ));

    let registry = Arc::new(SessionRegistry::new(
        adapter,
        store,
        event_router,
        SessionSettings {
            connect_timeout: Duration::from_millis(config.upstream.timeout_ms),
            max_reconnect_attempts: config.upstream.max_reconnect_attempts,
        },
        default_sink_hook(&config, &dispatcher),
    ));
    registry.spawn_idle_sweep();

    let cancel = shutdown::install_signal_handler();

    let state = AppState {
        registry: Arc::clone(&registry),
        pairing: Arc::clone(&pairing),
        dispatcher: Arc::clone(&dispatcher),
        auth: AuthState {
            api_key: config.auth.api_key.clone(),
            jwt_secret: config.auth.jwt_secret.clone(),
            require_auth: config.auth.require_auth,
        },
        started_at: std::time::Instant::now(),
        environment: config.runtime.env.to_string(),
        shutdown: cancel.clone(),
    };
    let app = build_router(state, &config.cors, config.uploads.max_file_size);

    start_server(&config.server.host, config.server.port, app, cancel.clone()).await?;

    info!("draining sessions");
    registry.shutdown_all(SHUTDOWN_WINDOW).await;
    pairing.shutdown();
    dispatcher.shutdown();
    info!("wabridge serve shutdown complete");
    Ok(())
}

/// Auto-registers the configured default sink on every newly created
/// session, without clobbering a sink the tenant registered itself.
fn default_sink_hook(
    config: &BridgeConfig,
    dispatcher: &Arc<WebhookDispatcher>,
) -> Option<SessionCreatedHook> {
    let url = config.default_sink.url.clone()?;
    let secret = config.default_sink.secret.clone();
    let dispatcher = Arc::clone(dispatcher);

    Some(Arc::new(move |tenant: &TenantId| {
        if !dispatcher.list(tenant).is_empty() {
            return;
        }
        dispatcher.register(
            tenant,
            RegisterSink {
                url: url.clone(),
                secret: secret.clone(),
                events: vec![SinkEvent::Message, SinkEvent::Status],
            },
        );
        info!(tenant = %tenant, "default webhook sink auto-registered");
    }))
}

/// Initializes the tracing subscriber with the given log level.
///
/// `fatal` is accepted for compatibility and maps to `error`.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let level = match log_level {
        "fatal" => "error",
        other => other,
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("wabridge={level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn default_sink_hook_requires_a_url() {
        let config = BridgeConfig::default();
        let dispatcher = Arc::new(WebhookDispatcher::new().unwrap());
        assert!(default_sink_hook(&config, &dispatcher).is_none());
    }

    #[tokio::test]
    async fn default_sink_hook_registers_once() {
        let mut config = BridgeConfig::default();
        config.default_sink.url = Some("https://sink.local/wh".into());
        config.default_sink.secret = Some("s".into());

        let dispatcher = Arc::new(WebhookDispatcher::new().unwrap());
        let hook = default_sink_hook(&config, &dispatcher).unwrap();
        let tenant = TenantId::new("t-1").unwrap();

        hook(&tenant);
        let sinks = dispatcher.list(&tenant);
        assert_eq!(sinks.len(), 1);
        assert_eq!(sinks[0].url, "https://sink.local/wh");
        assert!(sinks[0].has_secret);
        let original_id = sinks[0].id.clone();

        // Tenant replaces the sink; the hook must not clobber it later.
        dispatcher.register(
            &tenant,
            RegisterSink {
                url: "https://custom.example/wh".into(),
                secret: None,
                events: vec![SinkEvent::Message],
            },
        );
        hook(&tenant);
        let sinks = dispatcher.list(&tenant);
        assert_eq!(sinks[0].url, "https://custom.example/wh");
        assert_eq!(sinks[0].id, original_id);
    }
}
