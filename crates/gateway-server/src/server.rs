//! `GatewayServer`: Axum HTTP + WebSocket server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use gateway_core::selector::resolve_selector;
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Deserialize;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::engine::EngineHandle;
use crate::engine::clients::ClientId;
use crate::health::{self, HealthResponse};
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::session::{SessionConfig, run_client_session};

/// State cloned into every handler.
#[derive(Clone)]
pub struct AppState {
    /// Relay engine handle.
    pub engine: EngineHandle,
    /// Per-session settings.
    pub session: SessionConfig,
    /// Largest inbound frame accepted from a viewer.
    pub max_message_size: usize,
    /// Process start, for `uptime_secs`.
    pub start_time: Instant,
    /// Prometheus render handle.
    pub metrics: PrometheusHandle,
}

/// Optional `?location=a,b` query on the WebSocket routes.
#[derive(Debug, Default, Deserialize)]
pub struct SelectorQuery {
    /// Comma-separated location names.
    pub location: Option<String>,
}

/// The gateway's client-facing server.
pub struct GatewayServer {
    config: ServerConfig,
    engine: EngineHandle,
    metrics: PrometheusHandle,
    shutdown: Arc<ShutdownCoordinator>,
    start_time: Instant,
}

impl GatewayServer {
    /// Create a new server in front of a running engine.
    pub fn new(config: ServerConfig, engine: EngineHandle, metrics: PrometheusHandle) -> Self {
        Self {
            config,
            engine,
            metrics,
            shutdown: Arc::new(ShutdownCoordinator::new()),
            start_time: Instant::now(),
        }
    }

    /// `/health`, `/metrics`, and the WebSocket routes `/` and `/{selector}`.
    pub fn router(&self) -> Router {
        let state = AppState {
            engine: self.engine.clone(),
            session: SessionConfig::from(&self.config),
            max_message_size: self.config.max_message_size,
            start_time: self.start_time,
            metrics: self.metrics.clone(),
        };

        Router::new()
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .route("/", get(ws_root_handler))
            .route("/{*path}", get(ws_path_handler))
            .with_state(state)
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
    }

    /// Bind the listener and serve until the shutdown token fires.
    ///
    /// Returns the bound address (useful with port 0) and the serve task.
    pub async fn listen(&self) -> std::io::Result<(SocketAddr, JoinHandle<()>)> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        let local_addr = listener.local_addr()?;
        let router = self.router();
        let token = self.shutdown.token();

        info!(%local_addr, "gateway listening");

        let handle = tokio::spawn(async move {
            let served = axum::serve(listener, router)
                .with_graceful_shutdown(token.cancelled_owned())
                .await;
            if let Err(err) = served {
                warn!(error = %err, "server exited with error");
            }
        });
        Ok((local_addr, handle))
    }

    /// Relay engine this server subscribes viewers to.
    pub fn engine(&self) -> &EngineHandle {
        &self.engine
    }

    /// Stops the listener; see [`ShutdownCoordinator::graceful_shutdown`].
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Bind address and per-session limits.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Response {
    let engine = state.engine.status().await.ok();
    let resp: HealthResponse = health::health_check(state.start_time, engine);
    let code = if resp.is_ok() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(resp)).into_response()
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> String {
    crate::metrics::render(&state.metrics)
}

/// GET / (WebSocket upgrade, selector from the query only)
async fn ws_root_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<SelectorQuery>,
    State(state): State<AppState>,
) -> Response {
    let locations = resolve_selector(query.location.as_deref(), "/");
    upgrade(ws, locations, state)
}

/// GET /{selector} (WebSocket upgrade, selector from the first path segment)
async fn ws_path_handler(
    ws: WebSocketUpgrade,
    Path(path): Path<String>,
    Query(query): Query<SelectorQuery>,
    State(state): State<AppState>,
) -> Response {
    let locations = resolve_selector(query.location.as_deref(), &path);
    upgrade(ws, locations, state)
}

fn upgrade(ws: WebSocketUpgrade, locations: Vec<String>, state: AppState) -> Response {
    let client_id = ClientId::new();
    ws.max_message_size(state.max_message_size)
        .on_upgrade(move |socket: WebSocket| {
            run_client_session(socket, client_id, locations, state.engine, state.session)
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use gateway_core::{Location, LocationRegistry};
    use metrics_exporter_prometheus::PrometheusBuilder;
    use tokio_util::sync::CancellationToken;
    use tower::ServiceExt;

    use crate::config::EngineConfig;
    use crate::engine::spawn_engine;
    use crate::engine::upstream::{UpstreamConnector, UpstreamHandle, UpstreamSink};

    struct NeverConnects;

    impl UpstreamConnector for NeverConnects {
        fn open(&self, _location: &Location, _sink: UpstreamSink) -> UpstreamHandle {
            UpstreamHandle::new(CancellationToken::new())
        }
    }

    fn make_server() -> GatewayServer {
        let registry = LocationRegistry::from_config(
            [("north", "ws://north/WS/"), ("south", "ws://south/WS/")],
            None,
        )
        .unwrap();
        let (engine, _task) =
            spawn_engine(registry, Arc::new(NeverConnects), &EngineConfig::default());
        let metrics = PrometheusBuilder::new().build_recorder().handle();
        GatewayServer::new(ServerConfig::default(), engine, metrics)
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let req = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        let status = resp.status();
        let body = axum::body::to_bytes(resp.into_body(), 100_000).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn default_config_binds_loopback_ephemeral() {
        let server = make_server();
        assert_eq!(server.config().host, "127.0.0.1");
        assert_eq!(server.config().port, 0);
        assert!(!server.shutdown().is_shutting_down());
    }

    #[tokio::test]
    async fn health_lists_locations() {
        let server = make_server();
        let (status, body) = get_json(server.router(), "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["connections"], 0);
        assert_eq!(body["locations"][0]["name"], "north");
        assert_eq!(body["locations"][1]["name"], "south");
        assert_eq!(body["locations"][0]["status"], "connecting");
    }

    #[tokio::test]
    async fn health_unavailable_after_engine_stops() {
        let server = make_server();
        server.engine().shutdown().await.unwrap();
        let (status, body) = get_json(server.router(), "/health").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["status"], "stopping");
    }

    #[tokio::test]
    async fn metrics_endpoint_returns_text() {
        let server = make_server();
        let req = Request::builder()
            .uri("/metrics")
            .body(Body::empty())
            .unwrap();
        let resp = server.router().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn plain_get_on_ws_route_is_not_upgraded() {
        let server = make_server();
        let req = Request::builder()
            .uri("/north")
            .body(Body::empty())
            .unwrap();
        let resp = server.router().oneshot(req).await.unwrap();
        assert!(resp.status().is_client_error());
    }

    #[tokio::test]
    async fn listen_binds_ephemeral_port() {
        let server = make_server();
        let (addr, handle) = server.listen().await.unwrap();
        assert_ne!(addr.port(), 0);
        server.shutdown().shutdown();
        handle.await.unwrap();
    }
}
