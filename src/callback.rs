//! Inbound callback listener
//!
//! Long-lived HTTP endpoint the proxy pushes events to. Each delivery is
//! authenticated, parsed, classified and deduplicated before the normalized
//! message is dispatched to the registered consumer. The HTTP acknowledgement
//! never waits on the consumer, so slow hosts cannot pile up proxy retries.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{HeaderMap, Request, StatusCode},
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Router,
};
use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::BridgeConfig;
use crate::error::{BridgeError, BridgeResult};
use crate::types::{EventKind, InboundEvent, WechatMessageContext};

/// Header carrying the shared-secret API key on proxy deliveries
pub const API_KEY_HEADER: &str = "x-api-key";

/// How long a message id suppresses redeliveries
const DEDUP_WINDOW: Duration = Duration::from_secs(300);

// =============================================================================
// Consumer seam
// =============================================================================

/// Host-side sink for normalized inbound messages.
///
/// Invoked exactly once per accepted message, on a spawned task; failures
/// inside the consumer are the host's concern and never trigger redelivery.
#[async_trait]
pub trait MessageConsumer: Send + Sync + 'static {
    async fn on_message(&self, message: WechatMessageContext);
}

#[async_trait]
impl<F> MessageConsumer for F
where
    F: Fn(WechatMessageContext) + Send + Sync + 'static,
{
    async fn on_message(&self, message: WechatMessageContext) {
        self(message)
    }
}

// =============================================================================
// Listener configuration / metrics
// =============================================================================

/// Callback listener settings
#[derive(Debug, Clone)]
pub struct CallbackConfig {
    pub host: String,
    pub port: u16,
    pub path: String,
    pub api_key: String,
}

impl CallbackConfig {
    pub fn from_bridge(config: &BridgeConfig) -> Self {
        Self {
            host: config.webhook_host.clone(),
            port: config.webhook_port,
            path: config.webhook_path.clone(),
            api_key: config.api_key.clone(),
        }
    }
}

/// Snapshot of the listener's delivery counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListenerMetrics {
    pub received: u64,
    pub rejected_auth: u64,
    pub rejected_parse: u64,
    pub duplicates: u64,
    pub forwarded: u64,
    pub ignored: u64,
}

#[derive(Default)]
struct Counters {
    received: AtomicU64,
    rejected_auth: AtomicU64,
    rejected_parse: AtomicU64,
    duplicates: AtomicU64,
    forwarded: AtomicU64,
    ignored: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> ListenerMetrics {
        ListenerMetrics {
            received: self.received.load(Ordering::Relaxed),
            rejected_auth: self.rejected_auth.load(Ordering::Relaxed),
            rejected_parse: self.rejected_parse.load(Ordering::Relaxed),
            duplicates: self.duplicates.load(Ordering::Relaxed),
            forwarded: self.forwarded.load(Ordering::Relaxed),
            ignored: self.ignored.load(Ordering::Relaxed),
        }
    }
}

// =============================================================================
// Listener state
// =============================================================================

/// Shared across requests; read-only after startup apart from the dedup map
/// and counters
struct ListenerState {
    api_key: String,
    consumer: Arc<dyn MessageConsumer>,
    /// Recently seen message ids, pruned on insert
    seen: DashMap<i64, Instant>,
    counters: Counters,
}

impl ListenerState {
    /// Record the event's message id; true when it was already seen inside
    /// the dedup window. Events without a `newMsgId` are never deduplicated.
    fn note_duplicate(&self, event: &InboundEvent) -> bool {
        let Some(id) = event.data.get("newMsgId").and_then(Value::as_i64) else {
            return false;
        };
        self.seen.retain(|_, seen_at| seen_at.elapsed() < DEDUP_WINDOW);
        self.seen.insert(id, Instant::now()).is_some()
    }
}

// =============================================================================
// Server
// =============================================================================

/// The callback HTTP server
pub struct CallbackServer;

impl CallbackServer {
    /// Bind the listener and start serving deliveries.
    ///
    /// A port already in use fails with [`BridgeError::ListenerBind`].
    /// Port 0 binds an ephemeral port; the actual one is on the handle.
    pub async fn start(
        config: CallbackConfig,
        consumer: Arc<dyn MessageConsumer>,
    ) -> BridgeResult<CallbackHandle> {
        if !config.path.starts_with('/') {
            return Err(BridgeError::Configuration(format!(
                "webhook path must start with '/': {}",
                config.path
            )));
        }

        let addr: SocketAddr = format!("{}:{}", config.host, config.port)
            .parse()
            .map_err(|e| BridgeError::Configuration(format!("invalid listener address: {}", e)))?;

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|source| BridgeError::ListenerBind { addr, source })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| BridgeError::ListenerBind { addr, source })?;

        let state = Arc::new(ListenerState {
            api_key: config.api_key,
            consumer,
            seen: DashMap::new(),
            counters: Counters::default(),
        });

        let app = Router::new()
            .route(&config.path, post(handle_event))
            .route("/health", get(health_check))
            .layer(middleware::from_fn(log_request))
            .with_state(state.clone());

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let serve = axum::serve(listener, app).with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            });
            if let Err(e) = serve.await {
                error!("Callback listener error: {}", e);
            }
        });

        info!(
            "📡 Callback listener on {} (path {})",
            local_addr, config.path
        );

        Ok(CallbackHandle {
            port: local_addr.port(),
            state,
            shutdown: shutdown_tx,
            task,
        })
    }
}

/// Handle to a running callback listener
pub struct CallbackHandle {
    port: u16,
    state: Arc<ListenerState>,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl CallbackHandle {
    /// Port the listener is bound to
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Current delivery counters
    pub fn metrics(&self) -> ListenerMetrics {
        self.state.counters.snapshot()
    }

    /// Shut the listener down and release the port.
    ///
    /// Returns once the server task has drained; the port is reusable
    /// immediately afterwards.
    pub async fn stop(self) {
        let _ = self.shutdown.send(());
        if let Err(e) = self.task.await {
            error!("Callback listener task failed: {}", e);
        }
    }
}

// =============================================================================
// Handlers
// =============================================================================

async fn health_check() -> &'static str {
    "OK"
}

async fn log_request(req: Request<Body>, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let response = next.run(req).await;
    debug!("{} {} -> {}", method, path, response.status());
    response
}

/// One proxy delivery: authenticate, parse, classify, dedup, dispatch, ack
async fn handle_event(
    State(state): State<Arc<ListenerState>>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, &'static str) {
    state.counters.received.fetch_add(1, Ordering::Relaxed);

    // Authentication comes before any parsing or business logic
    let presented = headers.get(API_KEY_HEADER).and_then(|v| v.to_str().ok());
    if presented != Some(state.api_key.as_str()) {
        state.counters.rejected_auth.fetch_add(1, Ordering::Relaxed);
        warn!("Rejected callback delivery with missing or invalid API key");
        return (StatusCode::UNAUTHORIZED, "unauthorized");
    }

    let event: InboundEvent = match serde_json::from_slice(&body) {
        Ok(event) => event,
        Err(e) => {
            state.counters.rejected_parse.fetch_add(1, Ordering::Relaxed);
            warn!("Dropping unparseable callback body: {}", e);
            return (StatusCode::BAD_REQUEST, "bad request");
        }
    };

    match EventKind::classify(&event.message_type) {
        EventKind::Message { scope, kind } => {
            if state.note_duplicate(&event) {
                state.counters.duplicates.fetch_add(1, Ordering::Relaxed);
                debug!("Suppressed duplicate delivery for {}", event.wc_id);
            } else {
                let message = WechatMessageContext::from_event(&event, scope, kind);
                state.counters.forwarded.fetch_add(1, Ordering::Relaxed);
                debug!(
                    "Forwarding {} message {} from {}",
                    event.message_type, message.id, message.sender.id
                );

                // Ack promptly: the consumer runs on its own task
                let consumer = state.consumer.clone();
                tokio::spawn(async move {
                    consumer.on_message(message).await;
                });
            }
        }
        EventKind::LoginStatusChanged => {
            state.counters.ignored.fetch_add(1, Ordering::Relaxed);
            info!(
                "Login status change for {} (code {})",
                event.wc_id, event.message_type
            );
        }
        EventKind::Other => {
            state.counters.ignored.fetch_add(1, Ordering::Relaxed);
            debug!(
                "Acknowledged unhandled event type {} for {}",
                event.message_type, event.wc_id
            );
        }
    }

    // Accepted: consumer outcomes never turn into redelivery
    (StatusCode::OK, "success")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn empty_state() -> ListenerState {
        ListenerState {
            api_key: "k".to_string(),
            consumer: Arc::new(|_msg: WechatMessageContext| {}),
            seen: DashMap::new(),
            counters: Counters::default(),
        }
    }

    fn event_with_msg_id(id: Option<i64>) -> InboundEvent {
        let data = match id {
            Some(id) => json!({"newMsgId": id, "fromUser": "wxid_a", "content": "x"}),
            None => json!({"fromUser": "wxid_a", "content": "x"}),
        };
        serde_json::from_value(json!({
            "messageType": "60001",
            "wcId": "wxid_me",
            "data": data
        }))
        .unwrap()
    }

    #[test]
    fn test_duplicate_detection_by_msg_id() {
        let state = empty_state();
        let event = event_with_msg_id(Some(7));

        assert!(!state.note_duplicate(&event));
        assert!(state.note_duplicate(&event));

        let other = event_with_msg_id(Some(8));
        assert!(!state.note_duplicate(&other));
    }

    #[test]
    fn test_events_without_msg_id_never_dedup() {
        let state = empty_state();
        let event = event_with_msg_id(None);

        assert!(!state.note_duplicate(&event));
        assert!(!state.note_duplicate(&event));
    }

    #[test]
    fn test_counters_snapshot() {
        let state = empty_state();
        state.counters.received.fetch_add(3, Ordering::Relaxed);
        state.counters.forwarded.fetch_add(2, Ordering::Relaxed);
        state.counters.rejected_parse.fetch_add(1, Ordering::Relaxed);

        let metrics = state.counters.snapshot();
        assert_eq!(metrics.received, 3);
        assert_eq!(metrics.forwarded, 2);
        assert_eq!(metrics.rejected_parse, 1);
        assert_eq!(metrics.rejected_auth, 0);
    }
}
