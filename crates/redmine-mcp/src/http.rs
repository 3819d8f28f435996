//! HTTP transport.
//!
//! A REST-style front end over the same registry the line transport uses.
//! Tool calls answer with the `{success, data | error}` envelope rather
//! than MCP content blocks.

use std::sync::Arc;
use std::time::Instant;

use axum::body::Bytes;
use axum::extract::{Extension, MatchedPath, Request, State};
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE, WWW_AUTHENTICATE};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode, Uri};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use redmine_mcp_client::RedmineClient;
use serde::Deserialize;
use serde_json::{json, Value};
use tower::ServiceBuilder;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::context::AppContext;
use crate::protocol::{SERVER_NAME, SERVER_VERSION};
use crate::resources::read_resource;
use crate::tools::invoke_tool;

/// Paths served without authentication.
const PUBLIC_PATHS: [&str; 2] = ["/", "/health"];

const AUTH_REALM: &str = "Bearer realm=\"Redmine MCP API\"";

/// Shared state of the HTTP front end.
#[derive(Clone)]
pub struct HttpState {
    ctx: AppContext,
    client: Option<RedmineClient>,
    require_bearer: bool,
    redmine_url: String,
}

impl HttpState {
    pub fn new(ctx: AppContext, redmine_url: impl Into<String>) -> Self {
        Self {
            ctx,
            client: None,
            require_bearer: false,
            redmine_url: redmine_url.into(),
        }
    }

    /// Client that tenant clients are derived from when a request carries
    /// a bearer token.
    pub fn with_client(mut self, client: RedmineClient) -> Self {
        self.client = Some(client);
        self
    }

    /// Reject non-public requests that carry no bearer token.
    pub fn require_bearer(mut self, require: bool) -> Self {
        self.require_bearer = require;
        self
    }

    fn tenant_context(&self, token: &str) -> AppContext {
        match &self.client {
            Some(client) => self.ctx.with_api(Arc::new(client.with_bearer_token(token))),
            None => self.ctx.clone(),
        }
    }

    fn internal(&self, err: impl std::fmt::Display) -> HttpError {
        HttpError::Internal {
            message: err.to_string(),
            production: self.ctx.environment().is_production(),
        }
    }
}

/// Context resolved for one request by the auth middleware.
#[derive(Clone)]
struct RequestContext(AppContext);

/// Build the router with request-id, tracing, auth, and metrics layers.
pub fn router(state: HttpState) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .route("/mcp/info", get(info))
        .route("/mcp/tools", get(list_tools))
        .route("/mcp/resources", get(list_resources))
        .route("/mcp/tools/call", post(call_tool))
        .route("/mcp/resources/read", post(read_resource_handler))
        .route("/metrics", get(metrics_text))
        .route("/metrics/tools", get(metrics_tools))
        .route("/metrics/api", get(metrics_api))
        .route("/metrics/slow", get(metrics_slow))
        .fallback(not_found)
        .layer(middleware::from_fn_with_state(state.clone(), authenticate))
        .layer(middleware::from_fn_with_state(state.clone(), record_request))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::x_request_id()),
        )
        .with_state(state)
}

/// Bind `addr` and serve until the process ends.
pub async fn serve(state: HttpState, addr: &str) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "HTTP server listening");
    axum::serve(listener, router(state)).await
}

// =============================================================================
// Errors
// =============================================================================

#[derive(Debug)]
pub enum HttpError {
    /// Request body is not the expected JSON (400).
    InvalidJson(String),
    /// Bearer token required but absent (401).
    Unauthorized(&'static str),
    /// Unexpected failure (500). Production hides `message`.
    Internal { message: String, production: bool },
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        match self {
            HttpError::InvalidJson(message) => {
                let error_id = Uuid::new_v4().to_string();
                error!(error_id = %error_id, error = %message, "JSON parse error");
                (
                    StatusCode::BAD_REQUEST,
                    Json(json!({
                        "error": "Invalid JSON",
                        "message": message,
                        "error_id": error_id,
                    })),
                )
                    .into_response()
            }
            HttpError::Unauthorized(message) => {
                let mut response = (
                    StatusCode::UNAUTHORIZED,
                    Json(json!({"error": "Unauthorized", "message": message})),
                )
                    .into_response();
                response
                    .headers_mut()
                    .insert(WWW_AUTHENTICATE, HeaderValue::from_static(AUTH_REALM));
                response
            }
            HttpError::Internal {
                message,
                production,
            } => {
                let error_id = Uuid::new_v4().to_string();
                error!(error_id = %error_id, error = %message, "Server error");
                let message = if production {
                    format!(
                        "Internal error occurred. Please contact support with error ID: {}",
                        error_id
                    )
                } else {
                    message
                };
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({
                        "error": "Internal Server Error",
                        "message": message,
                        "error_id": error_id,
                    })),
                )
                    .into_response()
            }
        }
    }
}

// =============================================================================
// Middleware
// =============================================================================

/// `Bearer <token>` from the Authorization header, scheme case-insensitive.
fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let raw = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = raw.split_once(char::is_whitespace)?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then(|| token.to_string())
}

async fn authenticate(State(state): State<HttpState>, mut req: Request, next: Next) -> Response {
    if PUBLIC_PATHS.contains(&req.uri().path()) {
        return next.run(req).await;
    }

    let ctx = match bearer_token(req.headers()) {
        Some(token) => {
            debug!("Using bearer token authentication");
            state.tenant_context(&token)
        }
        None if state.require_bearer => {
            warn!(path = req.uri().path(), "No bearer token for protected path");
            return HttpError::Unauthorized("Bearer token required").into_response();
        }
        None => state.ctx.clone(),
    };

    req.extensions_mut().insert(RequestContext(ctx));
    next.run(req).await
}

/// Label used for requests that matched no route.
const UNMATCHED_ROUTE: &str = "unmatched";

/// Requests are keyed by route template so arbitrary paths cannot grow the
/// endpoint table.
async fn record_request(State(state): State<HttpState>, req: Request, next: Next) -> Response {
    let method = req.method().to_string();
    let path = req
        .extensions()
        .get::<MatchedPath>()
        .map_or(UNMATCHED_ROUTE, MatchedPath::as_str)
        .to_string();
    let started = Instant::now();

    let response = next.run(req).await;

    state.ctx.metrics().record_api_call(
        &path,
        &method,
        started.elapsed(),
        response.status().as_u16(),
    );
    response
}

// =============================================================================
// Handlers
// =============================================================================

async fn health(State(state): State<HttpState>) -> Json<Value> {
    let registry = state.ctx.registry();
    Json(json!({
        "status": "ok",
        "service": SERVER_NAME,
        "version": SERVER_VERSION,
        "tools_count": registry.tools().len(),
        "resources_count": registry.resources().len(),
        "redmine_url": state.redmine_url,
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

async fn info() -> Json<Value> {
    Json(json!({
        "name": SERVER_NAME,
        "version": SERVER_VERSION,
        "description": "Model Context Protocol server for Redmine",
        "capabilities": {"tools": {}, "resources": {}},
    }))
}

async fn list_tools(Extension(RequestContext(ctx)): Extension<RequestContext>) -> Json<Value> {
    Json(json!({ "tools": ctx.registry().tool_definitions() }))
}

async fn list_resources(Extension(RequestContext(ctx)): Extension<RequestContext>) -> Json<Value> {
    Json(json!({ "resources": ctx.registry().resource_definitions() }))
}

#[derive(Debug, Deserialize)]
struct ToolCallBody {
    name: String,
    #[serde(default)]
    params: Value,
}

async fn call_tool(
    State(state): State<HttpState>,
    Extension(RequestContext(ctx)): Extension<RequestContext>,
    body: Bytes,
) -> Result<Json<Value>, HttpError> {
    let request: ToolCallBody =
        serde_json::from_slice(&body).map_err(|e| HttpError::InvalidJson(e.to_string()))?;

    let Some(tool) = ctx.registry().tool(&request.name) else {
        error!(tool = %request.name, "Tool not found");
        let available: Vec<&str> = ctx.registry().tools().iter().map(|t| t.name()).collect();
        return Ok(Json(json!({
            "success": false,
            "error": {
                "type": "ToolNotFoundError",
                "message": format!(
                    "Tool '{}' not found. Available tools: {}",
                    request.name,
                    available.join(", ")
                ),
            },
        })));
    };

    let task_ctx = ctx.clone();
    let outcome =
        tokio::spawn(async move { invoke_tool(tool.as_ref(), &task_ctx, request.params).await })
            .await
            .map_err(|e| state.internal(e))?;

    Ok(Json(outcome.to_json()))
}

#[derive(Debug, Deserialize)]
struct ResourceReadBody {
    uri: String,
}

async fn read_resource_handler(
    State(state): State<HttpState>,
    Extension(RequestContext(ctx)): Extension<RequestContext>,
    body: Bytes,
) -> Result<Json<Value>, HttpError> {
    let request: ResourceReadBody =
        serde_json::from_slice(&body).map_err(|e| HttpError::InvalidJson(e.to_string()))?;

    let Some(resource) = ctx.registry().resource(&request.uri) else {
        error!(uri = %request.uri, "Resource not found");
        return Ok(Json(json!({
            "success": false,
            "error": {
                "type": "ResourceNotFoundError",
                "message": format!("Resource '{}' not found", request.uri),
            },
        })));
    };

    let task_resource = Arc::clone(&resource);
    let task_ctx = ctx.clone();
    let read = tokio::spawn(async move { read_resource(task_resource.as_ref(), &task_ctx).await })
        .await
        .map_err(|e| state.internal(e))?;

    let body = match read {
        Ok(result) => {
            let text = result
                .contents
                .into_iter()
                .next()
                .map(|c| c.text)
                .unwrap_or_default();
            json!({
                "success": true,
                "contents": text,
                "mimeType": resource.mime_type(),
            })
        }
        Err(err) => json!({"success": false, "error": err}),
    };
    Ok(Json(body))
}

async fn metrics_text(State(state): State<HttpState>) -> impl IntoResponse {
    (
        [(CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.ctx.metrics().prometheus_format(),
    )
}

async fn metrics_tools(State(state): State<HttpState>) -> Json<Value> {
    Json(json!({ "tools": state.ctx.metrics().tool_summary() }))
}

async fn metrics_api(State(state): State<HttpState>) -> Json<Value> {
    Json(json!({ "api_calls": state.ctx.metrics().api_summary() }))
}

async fn metrics_slow(State(state): State<HttpState>) -> Json<Value> {
    Json(json!({ "slow_requests": state.ctx.metrics().slow_requests_summary() }))
}

async fn not_found(method: Method, uri: Uri) -> (StatusCode, Json<Value>) {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": "Not Found",
            "path": uri.path(),
            "method": method.as_str(),
        })),
    )
}
