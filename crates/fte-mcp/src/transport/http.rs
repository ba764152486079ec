//! HTTP transport: the same dispatcher behind `POST /call`, with bearer auth and /health.

use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    middleware,
    response::{IntoResponse, Json as AxumJson, Response},
    routing::{get, post},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;

use fte_dispatch::{parse_request_value, Dispatcher};

use crate::types::{McpError, McpResult, SERVER_NAME, SERVER_VERSION};

/// Shared server state passed to all handlers via axum State.
pub struct ServerState {
    pub token: Option<String>,
    pub adapter: String,
    pub dispatcher: Dispatcher,
}

pub struct HttpTransport {
    state: Arc<ServerState>,
}

impl HttpTransport {
    pub fn new(adapter: impl Into<String>, dispatcher: Dispatcher, token: Option<String>) -> Self {
        Self {
            state: Arc::new(ServerState {
                token,
                adapter: adapter.into(),
                dispatcher,
            }),
        }
    }

    /// The application router. /health bypasses auth.
    pub fn router(&self) -> Router {
        let state = self.state.clone();

        let protected = Router::new()
            .route("/call", post(handle_call))
            .route("/tools", get(handle_tools))
            .layer(middleware::from_fn_with_state(state.clone(), auth_layer));

        Router::new()
            .merge(protected)
            .route("/health", get(handle_health))
            .layer(ServiceBuilder::new().layer(CorsLayer::permissive()))
            .with_state(state)
    }

    /// Run the HTTP server on the given address.
    pub async fn run(&self, addr: &str) -> McpResult<()> {
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(McpError::Io)?;

        tracing::info!("HTTP transport listening on {addr}");

        axum::serve(listener, self.router())
            .await
            .map_err(|e| McpError::Transport(e.to_string()))?;

        Ok(())
    }
}

async fn auth_layer(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
    request: axum::extract::Request,
    next: middleware::Next,
) -> Response {
    if let Some(expected) = &state.token {
        let authorized = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .is_some_and(|token| token == expected);

        if !authorized {
            return (
                StatusCode::UNAUTHORIZED,
                AxumJson(json!({ "error": "Unauthorized" })),
            )
                .into_response();
        }
    }

    next.run(request).await
}

/// One `{tool, input}` request, answered with the same object a stdio line would get.
async fn handle_call(
    State(state): State<Arc<ServerState>>,
    AxumJson(body): AxumJson<Value>,
) -> Response {
    match parse_request_value(body) {
        Ok(request) => {
            let response = state.dispatcher.dispatch(request).await;
            AxumJson(response.to_value()).into_response()
        }
        Err(e) => {
            tracing::warn!(kind = e.kind(), "{e}");
            (
                StatusCode::BAD_REQUEST,
                AxumJson(json!({ "error": e.to_string() })),
            )
                .into_response()
        }
    }
}

async fn handle_tools(State(state): State<Arc<ServerState>>) -> AxumJson<Value> {
    let tools = state.dispatcher.registry().list();
    AxumJson(json!({
        "adapter": state.adapter,
        "tools": tools,
        "tool_count": tools.len(),
    }))
}

async fn handle_health(State(state): State<Arc<ServerState>>) -> AxumJson<Value> {
    AxumJson(json!({
        "status": "ok",
        "server": SERVER_NAME,
        "version": SERVER_VERSION,
        "adapter": state.adapter,
    }))
}
