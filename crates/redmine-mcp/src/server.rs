//! MCP server implementation.
//!
//! The server handles the MCP protocol lifecycle:
//! 1. Initialize - exchange capabilities
//! 2. Initialized notification - session becomes operational
//! 3. Handle tool calls and resource reads through the registry
//!
//! One `McpServer` is one session. Requests other than `initialize` and
//! `ping` are rejected until the handshake has completed.

use std::fmt::Display;

use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::context::AppContext;
use crate::protocol::{
    parse_message, ClientInfo, IncomingMessage, InitializeParams, InitializeResult, JsonRpcError,
    JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, LoggingCapability, ResourcesCapability,
    RequestId, ResourcesListResult, ServerCapabilities, ServerInfo, ToolsCapability, ToolsListResult,
    MCP_VERSION,
};
use crate::resources::read_resource;
use crate::tools::invoke_tool;
use crate::transport::{recover_id, LineTransport, TransportError};

/// Handshake progress of one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Nothing received yet.
    Uninitialized,
    /// `initialize` answered, waiting for the `initialized` notification.
    Negotiating,
    /// Operational for the rest of the session.
    Initialized,
}

/// MCP protocol adapter for one session.
pub struct McpServer {
    ctx: AppContext,
    state: SessionState,
    client_info: Option<ClientInfo>,
}

impl McpServer {
    pub fn new(ctx: AppContext) -> Self {
        Self {
            ctx,
            state: SessionState::Uninitialized,
            client_info: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_initialized(&self) -> bool {
        self.state == SessionState::Initialized
    }

    /// Peer identity from the last `initialize` call.
    pub fn client_info(&self) -> Option<&ClientInfo> {
        self.client_info.as_ref()
    }

    pub fn context(&self) -> &AppContext {
        &self.ctx
    }

    /// Serve one session until EOF.
    ///
    /// Only unrecoverable transport failures end the loop early; every
    /// protocol or tool failure is answered on the wire. A line that is not
    /// UTF-8 gets a parse error with a null id.
    pub async fn run<R, W>(&mut self, transport: &mut LineTransport<R, W>) -> Result<(), TransportError>
    where
        R: tokio::io::AsyncBufRead + Unpin + Send,
        W: tokio::io::AsyncWrite + Unpin + Send,
    {
        info!(
            tools = self.ctx.registry().tools().len(),
            resources = self.ctx.registry().resources().len(),
            "Starting MCP server"
        );

        loop {
            let response = match transport.read_line().await {
                Ok(Some(line)) => self.handle_line(&line).await,
                Ok(None) => break,
                Err(e) if e.is_recoverable() => {
                    warn!(error = %e, "Rejected undecodable line");
                    Some(JsonRpcError::parse_error(&e.to_string()).to_response(RequestId::Null))
                }
                Err(e) => return Err(e),
            };
            if let Some(response) = response {
                if let Err(e) = transport.write_response(&response).await {
                    error!(error = %e, "Failed to write response");
                    return Err(e);
                }
            }
        }

        info!("EOF received, MCP server stopped");
        Ok(())
    }

    /// Decode and handle one raw line. `None` means nothing is sent back.
    pub async fn handle_line(&mut self, line: &str) -> Option<JsonRpcResponse> {
        match parse_message(line) {
            Ok(message) => self.handle_message(message).await,
            Err(err) => {
                warn!(error = %err, data = ?err.data, "Rejected malformed message");
                Some(err.to_response(recover_id(line)))
            }
        }
    }

    /// Handle a decoded message. Notifications never produce a response.
    pub async fn handle_message(&mut self, message: IncomingMessage) -> Option<JsonRpcResponse> {
        match message {
            IncomingMessage::Request(req) => Some(self.handle_request(req).await),
            IncomingMessage::Notification(notification) => {
                self.handle_notification(&notification);
                None
            }
        }
    }

    async fn handle_request(&mut self, req: JsonRpcRequest) -> JsonRpcResponse {
        debug!(method = %req.method, id = ?req.id, "Handling request");

        let id = req.id;
        if !self.is_initialized() && !matches!(req.method.as_str(), "initialize" | "ping") {
            warn!(method = %req.method, "Request before initialization");
            return JsonRpcError::not_initialized().to_response(id);
        }

        let result = match req.method.as_str() {
            "initialize" => self.handle_initialize(req.params),
            "ping" => Ok(json!({})),
            "tools/list" => self.handle_tools_list(),
            "tools/call" => self.handle_tools_call(req.params).await,
            "resources/list" => self.handle_resources_list(),
            "resources/read" => self.handle_resources_read(req.params).await,
            method => {
                warn!(method, "Unknown method");
                Err(JsonRpcError::method_not_found(method))
            }
        };

        match result {
            Ok(value) => JsonRpcResponse::success(id, value),
            Err(err) => err.to_response(id),
        }
    }

    fn handle_notification(&mut self, notification: &JsonRpcNotification) {
        match notification.method.as_str() {
            "notifications/initialized" | "initialized" => match self.state {
                SessionState::Uninitialized => {
                    warn!("Initialized notification before initialize, ignoring");
                }
                SessionState::Negotiating => {
                    self.state = SessionState::Initialized;
                    info!("Client initialized, server is operational");
                }
                SessionState::Initialized => {
                    debug!("Repeated initialized notification");
                }
            },
            "notifications/cancelled" => {
                let request_id = notification
                    .params
                    .as_ref()
                    .and_then(|p| p.get("requestId"))
                    .cloned()
                    .unwrap_or(Value::Null);
                info!(request_id = %request_id, "Client cancelled request");
            }
            method => {
                warn!(method, "Unknown notification");
            }
        }
    }

    fn handle_initialize(&mut self, params: Option<Value>) -> Result<Value, JsonRpcError> {
        let params = match params {
            Some(p) => serde_json::from_value::<InitializeParams>(p).unwrap_or_else(|e| {
                warn!(error = %e, "Failed to parse initialize params");
                InitializeParams::default()
            }),
            None => InitializeParams::default(),
        };

        if let Some(client) = &params.client_info {
            info!(client = %client.name, version = %client.version, "Client connected");
        }
        match params.protocol_version.as_deref() {
            Some(MCP_VERSION) => {}
            requested => {
                warn!(
                    client = ?requested,
                    server = MCP_VERSION,
                    "Protocol version mismatch, continuing with server version"
                );
            }
        }

        self.client_info = params.client_info;
        if self.state == SessionState::Uninitialized {
            self.state = SessionState::Negotiating;
        }

        let registry = self.ctx.registry();
        let result = InitializeResult {
            protocol_version: MCP_VERSION.to_string(),
            capabilities: ServerCapabilities {
                tools: (!registry.tools().is_empty()).then_some(ToolsCapability {}),
                resources: (!registry.resources().is_empty()).then_some(ResourcesCapability {
                    subscribe: false,
                    list_changed: false,
                }),
                logging: LoggingCapability {},
            },
            server_info: ServerInfo::default(),
        };
        self.to_result(&result)
    }

    fn handle_tools_list(&self) -> Result<Value, JsonRpcError> {
        self.to_result(&ToolsListResult {
            tools: self.ctx.registry().tool_definitions(),
        })
    }

    async fn handle_tools_call(&self, params: Option<Value>) -> Result<Value, JsonRpcError> {
        let params = params.unwrap_or(Value::Null);
        let Some(name) = params.get("name").and_then(Value::as_str) else {
            return Err(JsonRpcError::invalid_params("Missing required parameter: name"));
        };
        let Some(tool) = self.ctx.registry().tool(name) else {
            return Err(JsonRpcError::tool_not_found(name));
        };
        let arguments = params.get("arguments").cloned().unwrap_or(Value::Null);

        info!(tool = name, "Calling tool");
        let ctx = self.ctx.clone();
        let task = tokio::spawn(async move { invoke_tool(tool.as_ref(), &ctx, arguments).await });

        match task.await {
            Ok(outcome) => self.to_result(&outcome.to_call_result()),
            Err(e) => Err(self.internal_error(&format!("tools/call {}", name), e)),
        }
    }

    fn handle_resources_list(&self) -> Result<Value, JsonRpcError> {
        self.to_result(&ResourcesListResult {
            resources: self.ctx.registry().resource_definitions(),
        })
    }

    async fn handle_resources_read(&self, params: Option<Value>) -> Result<Value, JsonRpcError> {
        let Some(uri) = params
            .as_ref()
            .and_then(|p| p.get("uri"))
            .and_then(Value::as_str)
        else {
            return Err(JsonRpcError::invalid_params("Missing required parameter: uri"));
        };
        let Some(resource) = self.ctx.registry().resource(uri) else {
            return Err(JsonRpcError::resource_not_found(uri));
        };

        let ctx = self.ctx.clone();
        let task = tokio::spawn(async move { read_resource(resource.as_ref(), &ctx).await });

        match task.await {
            Ok(Ok(result)) => self.to_result(&result),
            Ok(Err(err)) => Err(JsonRpcError::internal_error(&err.to_string())),
            Err(e) => Err(self.internal_error(&format!("resources/read {}", uri), e)),
        }
    }

    fn to_result<T: Serialize>(&self, value: &T) -> Result<Value, JsonRpcError> {
        serde_json::to_value(value).map_err(|e| self.internal_error("serialize result", e))
    }

    /// Log an unexpected failure under a fresh correlation id and build the
    /// peer-facing error. Production hides the detail.
    fn internal_error(&self, during: &str, err: impl Display) -> JsonRpcError {
        let error_id = Uuid::new_v4().to_string();
        error!(error_id = %error_id, during, error = %err, "Internal error");

        let base = if self.ctx.environment().is_production() {
            JsonRpcError::new(JsonRpcError::INTERNAL_ERROR, "Internal error")
        } else {
            JsonRpcError::internal_error(&err.to_string())
        };
        base.with_data(json!({ "error_id": error_id }))
    }
}
