//! Shared harness for session tests.
//!
//! Builds a context against an `httpmock` backend and drives a complete
//! session through an in-memory line transport.

use std::sync::Arc;

use httpmock::MockServer;
use redmine_mcp::{AppContext, LineTransport, McpServer, Registry};
use redmine_mcp_client::{Auth, RedmineClient};
use redmine_mcp_core::MetricsCollector;
use serde_json::Value;

pub const INITIALIZE: &str = r#"{"jsonrpc":"2.0","id":0,"method":"initialize","params":{"protocolVersion":"2025-06-18","capabilities":{},"clientInfo":{"name":"session-test","version":"1.0"}}}"#;
pub const INITIALIZED: &str = r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#;

pub fn context(server: &MockServer) -> AppContext {
    let metrics = Arc::new(MetricsCollector::default());
    let client = RedmineClient::new(&server.base_url(), Auth::ApiKey("test-key".into()))
        .expect("client should build")
        .with_metrics(Arc::clone(&metrics));
    AppContext::new(Arc::new(Registry::with_defaults()), Arc::new(client), metrics)
}

/// Feed `lines` through a fresh session, returning every response line.
pub async fn run_session(ctx: AppContext, lines: &[&str]) -> Vec<Value> {
    let raw: Vec<&[u8]> = lines.iter().map(|line| line.as_bytes()).collect();
    run_session_bytes(ctx, &raw).await
}

/// Like [`run_session`], for input that need not be UTF-8.
pub async fn run_session_bytes(ctx: AppContext, lines: &[&[u8]]) -> Vec<Value> {
    let mut input = Vec::new();
    for line in lines {
        input.extend_from_slice(line);
        input.push(b'\n');
    }
    let mut transport = LineTransport::new(&input[..], Vec::new());

    McpServer::new(ctx)
        .run(&mut transport)
        .await
        .expect("session should end cleanly");

    let (_, output) = transport.into_parts();
    String::from_utf8(output)
        .expect("output should be UTF-8")
        .lines()
        .map(|line| serde_json::from_str(line).expect("every line should be JSON"))
        .collect()
}

/// Session that completes the handshake before `lines`. The initialize
/// response is dropped.
pub async fn run_initialized(ctx: AppContext, lines: &[&str]) -> Vec<Value> {
    let mut all = vec![INITIALIZE, INITIALIZED];
    all.extend_from_slice(lines);
    let mut responses = run_session(ctx, &all).await;
    responses.remove(0);
    responses
}

/// Parse the JSON text block of a `tools/call` result.
pub fn tool_text(response: &Value) -> Value {
    let text = response["result"]["content"][0]["text"]
        .as_str()
        .expect("tool result should carry a text block");
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}
