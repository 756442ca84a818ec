//! Axum HTTP surface: `/mcp`, `/health`, `/sessions/{id}` and the `/` manifest.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::{DefaultBodyLimit, Path, State};
use axum::http::header::{ACCEPT, ALLOW, CACHE_CONTROL, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{any, delete, get};
use axum::Router;
use bytes::Bytes;
use dashmcp_core::{SessionError, SessionId, Settings};
use dashmcp_tools::ToolRegistry;
use futures::{Stream, StreamExt};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::dispatcher::{DispatchOutcome, RequestDispatcher, RequestKind};
use crate::health::{self, HealthResponse};
use crate::manifest::{self, Manifest};
use crate::protocol::ServerInfo;
use crate::reaper::IdleReaper;
use crate::rpc::RpcResponse;
use crate::session::{McpSessionFactory, SessionRegistry};
use crate::shutdown::{ShutdownCoordinator, ShutdownReport};
use crate::transport::{ResponseFraming, SessionStream, TransportResponse};
use crate::SESSION_HEADER;

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<RequestDispatcher>,
    /// The capability set every session is built with.
    pub tools: Arc<ToolRegistry>,
    pub server_info: ServerInfo,
    /// When the server started.
    pub start_time: Instant,
    pub max_body_bytes: usize,
}

impl AppState {
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        self.dispatcher.registry()
    }
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState) -> Router {
    let max_body = state.max_body_bytes;
    Router::new()
        .route("/mcp", any(mcp_handler))
        .route("/health", get(health_handler))
        .route("/sessions/{session_id}", delete(delete_session_handler))
        .route("/", get(root_handler))
        .with_state(state)
        .layer(DefaultBodyLimit::max(max_body))
        .layer(cors_layer())
        .layer(TraceLayer::new_for_http())
}

fn cors_layer() -> CorsLayer {
    let session_header = HeaderName::from_static(SESSION_HEADER);
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers(Any)
        .expose_headers([session_header])
}

/// Create and start the server. Returns a handle to shut it down.
pub async fn start(
    settings: &Settings,
    tools: Arc<ToolRegistry>,
) -> Result<ServerHandle, std::io::Error> {
    let server_info = ServerInfo {
        name: settings.server.name.clone(),
        version: settings.server.version.clone(),
    };
    let registry = Arc::new(SessionRegistry::new());
    let factory = Arc::new(McpSessionFactory::new(
        server_info.clone(),
        Arc::clone(&tools),
    ));
    let dispatcher = Arc::new(RequestDispatcher::new(Arc::clone(&registry), factory));

    let grace = settings.session.shutdown_grace();
    let coordinator = ShutdownCoordinator::new(Arc::clone(&registry), grace);
    let reaper = IdleReaper::new(
        Arc::clone(&registry),
        settings.session.max_idle_age(),
        settings.session.cleanup_interval(),
        grace,
    )
    .spawn(coordinator.token());

    let state = AppState {
        dispatcher,
        tools: Arc::clone(&tools),
        server_info,
        start_time: Instant::now(),
        max_body_bytes: settings.server.max_body_bytes,
    };
    let router = build_router(state);

    let addr = format!("{}:{}", settings.server.host, settings.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let local_addr = listener.local_addr()?;

    info!(
        addr = %local_addr,
        tools = tools.count(),
        max_idle_ms = settings.session.max_idle_age_ms,
        cleanup_interval_ms = settings.session.cleanup_interval_ms,
        "MCP server listening"
    );

    let stop = coordinator.token();
    let server = tokio::spawn(async move {
        if let Err(err) = axum::serve(listener, router)
            .with_graceful_shutdown(stop.cancelled_owned())
            .await
        {
            warn!(error = %err, "HTTP server exited with error");
        }
    });

    Ok(ServerHandle {
        port: local_addr.port(),
        registry,
        coordinator,
        grace,
        server,
        reaper,
    })
}

/// Handle returned by `start()`. Keeps background tasks alive until shutdown.
pub struct ServerHandle {
    pub port: u16,
    registry: Arc<SessionRegistry>,
    coordinator: ShutdownCoordinator,
    grace: std::time::Duration,
    server: JoinHandle<()>,
    reaper: JoinHandle<()>,
}

impl ServerHandle {
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.coordinator.token()
    }

    /// Stop accepting connections, stop the reaper, and close every session.
    pub async fn shutdown(self) -> ShutdownReport {
        let report = self.coordinator.shutdown().await;

        // Closing sessions ends their open streams, which lets the server drain.
        if tokio::time::timeout(self.grace, self.server).await.is_err() {
            warn!("HTTP server did not drain within the grace period");
        }
        if let Err(err) = self.reaper.await {
            warn!(error = %err, "idle reaper task failed");
        }

        // Sessions opened by requests that were in flight when shutdown began.
        let late = self.coordinator.shutdown().await;
        report.merge(late)
    }
}

async fn mcp_handler(
    State(state): State<AppState>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let supplied = headers.get(SESSION_HEADER).and_then(|v| v.to_str().ok());

    match method {
        Method::POST => {
            let accept = headers.get(ACCEPT).and_then(|v| v.to_str().ok());
            let outcome = state
                .dispatcher
                .dispatch(
                    RequestKind::Post,
                    supplied,
                    &body,
                    ResponseFraming::from_accept(accept),
                )
                .await;
            outcome_response(outcome)
        }
        Method::GET => {
            let outcome = state
                .dispatcher
                .dispatch(RequestKind::Get, supplied, &[], ResponseFraming::Json)
                .await;
            outcome_response(outcome)
        }
        Method::DELETE => match supplied.filter(|s| !s.is_empty()) {
            Some(id) => terminate_response(&state, SessionId::from_raw(id)).await,
            None => (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({
                    "error": format!("{SESSION_HEADER} header is required"),
                })),
            )
                .into_response(),
        },
        _ => (
            StatusCode::METHOD_NOT_ALLOWED,
            [(ALLOW, "GET, POST, DELETE")],
        )
            .into_response(),
    }
}

fn outcome_response(outcome: DispatchOutcome) -> Response {
    let mut response = match outcome.result {
        Ok(TransportResponse::Json(bytes)) => {
            ([(CONTENT_TYPE, "application/json")], bytes).into_response()
        }
        Ok(TransportResponse::EventStream(bytes)) => (
            [(CONTENT_TYPE, "text/event-stream"), (CACHE_CONTROL, "no-cache")],
            bytes,
        )
            .into_response(),
        Ok(TransportResponse::Accepted) => StatusCode::ACCEPTED.into_response(),
        Ok(TransportResponse::Stream(stream)) => event_stream(stream).into_response(),
        Err(err) => internal_error(&err),
    };
    if let Ok(value) = HeaderValue::from_str(outcome.session_id.as_str()) {
        response.headers_mut().insert(SESSION_HEADER, value);
    }
    response
}

/// A standalone stream carries keep-alives only and ends when the session closes.
fn event_stream(stream: SessionStream) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let events = futures::stream::pending::<Result<Event, Infallible>>()
        .take_until(stream.closed.cancelled_owned());
    Sse::new(events).keep_alive(KeepAlive::default())
}

fn internal_error(err: &SessionError) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(RpcResponse::internal_error(err.to_string())),
    )
        .into_response()
}

async fn terminate_response(state: &AppState, session_id: SessionId) -> Response {
    match state.dispatcher.terminate(&session_id).await {
        Ok(remaining) => Json(serde_json::json!({
            "message": format!("Session {session_id} cleaned up successfully"),
            "remainingSessions": remaining,
        }))
        .into_response(),
        Err(SessionError::NotFound(_)) => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({
                "error": format!("Session {session_id} not found"),
            })),
        )
            .into_response(),
        Err(err) => internal_error(&err),
    }
}

/// DELETE /sessions/{session_id}
async fn delete_session_handler(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Response {
    terminate_response(&state, SessionId::from_raw(session_id)).await
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(
        &state.server_info,
        state.start_time,
        state.tools.names(),
        state.registry().size(),
    ))
}

/// GET /
async fn root_handler(State(state): State<AppState>) -> Json<Manifest> {
    Json(manifest::build_manifest(&state.server_info, &state.tools))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::testing::CountingFactory;
    use crate::session::SessionFactory;
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn info() -> ServerInfo {
        ServerInfo {
            name: "dashboard-testing-mcp-server".into(),
            version: "1.0.0".into(),
        }
    }

    fn state_with(factory: Arc<dyn SessionFactory>) -> AppState {
        AppState {
            dispatcher: Arc::new(RequestDispatcher::new(
                Arc::new(SessionRegistry::new()),
                factory,
            )),
            tools: Arc::new(ToolRegistry::new()),
            server_info: info(),
            start_time: Instant::now(),
            max_body_bytes: 4 * 1024 * 1024,
        }
    }

    fn mcp_state() -> AppState {
        state_with(Arc::new(McpSessionFactory::new(
            info(),
            Arc::new(ToolRegistry::new()),
        )))
    }

    fn post(session: Option<&str>, body: Value) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/mcp")
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json, text/event-stream");
        if let Some(id) = session {
            builder = builder.header(SESSION_HEADER, id);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    fn initialize(id: i64) -> Value {
        json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": "initialize",
            "params": {
                "protocolVersion": "2025-03-26",
                "capabilities": {},
                "clientInfo": { "name": "test", "version": "0" }
            }
        })
    }

    async fn body_json(resp: Response) -> Value {
        let body = axum::body::to_bytes(resp.into_body(), 1_000_000)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    fn session_header(resp: &Response) -> String {
        resp.headers()
            .get(SESSION_HEADER)
            .unwrap()
            .to_str()
            .unwrap()
            .to_string()
    }

    #[tokio::test]
    async fn post_without_session_mints_one() {
        let state = mcp_state();
        let app = build_router(state.clone());

        let resp = app.oneshot(post(None, initialize(1))).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()[CONTENT_TYPE], "application/json");
        let id = session_header(&resp);
        assert!(id.starts_with("mcp_"));

        let json = body_json(resp).await;
        assert_eq!(json["result"]["serverInfo"]["name"], "dashboard-testing-mcp-server");
        assert_eq!(state.registry().size(), 1);
    }

    #[tokio::test]
    async fn same_session_keeps_protocol_state() {
        let state = mcp_state();
        let app = build_router(state.clone());
        let list = json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"});

        let resp = app
            .clone()
            .oneshot(post(Some("abc"), initialize(1)))
            .await
            .unwrap();
        assert_eq!(session_header(&resp), "abc");

        let resp = app
            .clone()
            .oneshot(post(Some("abc"), list.clone()))
            .await
            .unwrap();
        assert_eq!(session_header(&resp), "abc");
        let json = body_json(resp).await;
        assert!(json["result"]["tools"].is_array(), "got {json}");

        // A different id is a different, uninitialized session.
        let resp = app.oneshot(post(Some("xyz"), list)).await.unwrap();
        let json = body_json(resp).await;
        assert_eq!(json["error"]["code"], -32002);
        assert_eq!(state.registry().size(), 2);
    }

    #[tokio::test]
    async fn notification_returns_accepted() {
        let app = build_router(mcp_state());
        let resp = app
            .oneshot(post(
                Some("abc"),
                json!({"jsonrpc": "2.0", "method": "notifications/initialized"}),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::ACCEPTED);
        assert_eq!(session_header(&resp), "abc");
    }

    #[tokio::test]
    async fn sse_only_client_gets_event_framing() {
        let app = build_router(mcp_state());
        let req = Request::builder()
            .method("POST")
            .uri("/mcp")
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "text/event-stream")
            .body(Body::from(initialize(1).to_string()))
            .unwrap();

        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()[CONTENT_TYPE], "text/event-stream");
        let body = axum::body::to_bytes(resp.into_body(), 1_000_000)
            .await
            .unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.starts_with("event: message\ndata: "));
    }

    #[tokio::test]
    async fn get_opens_stream_on_fresh_session() {
        let state = mcp_state();
        let app = build_router(state.clone());
        let req = Request::builder()
            .method("GET")
            .uri("/mcp")
            .header(SESSION_HEADER, "abc")
            .body(Body::empty())
            .unwrap();

        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()[CONTENT_TYPE], "text/event-stream");
        let id = session_header(&resp);
        assert_ne!(id, "abc");
        assert!(state.registry().get(&SessionId::from_raw(id)).is_some());
    }

    #[tokio::test]
    async fn creation_failure_returns_internal_error_envelope() {
        let state = state_with(Arc::new(CountingFactory::failing()));
        let app = build_router(state.clone());

        let resp = app.oneshot(post(Some("abc"), initialize(1))).await.unwrap();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(session_header(&resp), "abc");
        let json = body_json(resp).await;
        assert_eq!(json["jsonrpc"], "2.0");
        assert!(json["id"].is_null());
        assert_eq!(json["error"]["code"], -32603);
        assert_eq!(json["error"]["message"], "Internal server error");
        assert!(json["error"]["data"]["error"]
            .as_str()
            .unwrap()
            .contains("injected handshake failure"));
        assert_eq!(state.registry().size(), 0);
    }

    #[tokio::test]
    async fn delete_session_then_not_found() {
        let state = mcp_state();
        let app = build_router(state.clone());
        for id in ["a", "b"] {
            app.clone()
                .oneshot(post(Some(id), initialize(1)))
                .await
                .unwrap();
        }

        let delete = || {
            Request::builder()
                .method("DELETE")
                .uri("/sessions/a")
                .body(Body::empty())
                .unwrap()
        };

        let resp = app.clone().oneshot(delete()).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(json["remainingSessions"], 1);
        assert_eq!(json["message"], "Session a cleaned up successfully");

        let resp = app.oneshot(delete()).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let json = body_json(resp).await;
        assert_eq!(json["error"], "Session a not found");
        assert_eq!(state.registry().size(), 1);
    }

    #[tokio::test]
    async fn delete_on_mcp_uses_session_header() {
        let state = mcp_state();
        let app = build_router(state.clone());
        app.clone()
            .oneshot(post(Some("abc"), initialize(1)))
            .await
            .unwrap();

        let resp = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri("/mcp")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = app
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri("/mcp")
                    .header(SESSION_HEADER, "abc")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(state.registry().size(), 0);
    }

    #[tokio::test]
    async fn other_methods_not_allowed() {
        let app = build_router(mcp_state());
        let resp = app
            .oneshot(
                Request::builder()
                    .method("PUT")
                    .uri("/mcp")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn health_counts_sessions() {
        let state = mcp_state();
        let app = build_router(state.clone());
        for id in ["a", "b", "c"] {
            app.clone()
                .oneshot(post(Some(id), initialize(1)))
                .await
                .unwrap();
        }

        let resp = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["activeSessions"], 3);
        assert_eq!(json["transport"], "Streamable HTTP");
    }

    #[tokio::test]
    async fn root_serves_manifest() {
        let app = build_router(mcp_state());
        let resp = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(json["endpoints"]["mcp"], "/mcp");
        assert_eq!(json["version"], "1.0.0");
    }

    #[tokio::test]
    async fn cors_preflight_exposes_session_header() {
        let app = build_router(mcp_state());
        let resp = app
            .oneshot(
                Request::builder()
                    .method("OPTIONS")
                    .uri("/mcp")
                    .header("origin", "http://example.com")
                    .header("access-control-request-method", "POST")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()["access-control-allow-origin"], "*");
    }

    #[tokio::test]
    async fn server_starts_serves_and_shuts_down() {
        let mut settings = Settings::default();
        settings.server.host = "127.0.0.1".into();
        settings.server.port = 0;
        let handle = start(&settings, Arc::new(ToolRegistry::new())).await.unwrap();
        assert!(handle.port > 0);

        let client = reqwest::Client::new();
        let resp = client
            .post(format!("http://127.0.0.1:{}/mcp", handle.port))
            .header(SESSION_HEADER, "live")
            .json(&initialize(1))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        assert_eq!(resp.headers()[SESSION_HEADER], "live");

        let health: Value = client
            .get(format!("http://127.0.0.1:{}/health", handle.port))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(health["activeSessions"], 1);

        let registry = Arc::clone(handle.registry());
        let token = handle.shutdown_token();
        let report = handle.shutdown().await;
        assert!(token.is_cancelled());
        assert_eq!(report.closed, 1);
        assert_eq!(registry.size(), 0);
    }
}
