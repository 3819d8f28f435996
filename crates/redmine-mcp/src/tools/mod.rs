//! MCP tools: the capability contract, the invocation envelope, and the
//! built-in tool set.
//!
//! Every call goes through [`invoke_tool`], which validates parameters
//! against the tool's schema, times the call, records metrics, and turns
//! any error into a [`ToolOutcome::Failure`] rather than propagating it.

pub mod batch;
pub mod issues;
pub mod projects;
pub mod schema;
pub mod time_entries;
pub mod users;

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use redmine_mcp_core::{Error, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{error, info};

use crate::context::AppContext;
use crate::protocol::{ToolCallResult, ToolDefinition};

/// An invocable, schema-described operation.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    /// JSON-Schema-like description of accepted parameters.
    fn input_schema(&self) -> Value;

    /// Run the tool. `params` has already passed schema validation.
    async fn execute(&self, ctx: &AppContext, params: Value) -> Result<Value>;

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            input_schema: self.input_schema(),
        }
    }
}

/// All built-in tools, in listing order.
pub fn builtin_tools() -> Vec<Arc<dyn Tool>> {
    vec![
        Arc::new(projects::ListProjects),
        Arc::new(projects::GetProject),
        Arc::new(issues::ListIssues),
        Arc::new(issues::GetIssue),
        Arc::new(issues::CreateIssue),
        Arc::new(issues::UpdateIssue),
        Arc::new(issues::DeleteIssue),
        Arc::new(users::GetCurrentUser),
        Arc::new(users::ListUsers),
        Arc::new(time_entries::ListTimeEntries),
        Arc::new(time_entries::CreateTimeEntry),
        Arc::new(batch::BatchExecute),
    ]
}

// =============================================================================
// Invocation envelope
// =============================================================================

/// Failure details of a tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolError {
    #[serde(rename = "type")]
    pub error_type: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

impl ToolError {
    pub fn new(error_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error_type: error_type.into(),
            message: message.into(),
            status: None,
        }
    }

    pub fn from_error(err: &Error) -> Self {
        Self {
            error_type: err.error_type().to_string(),
            message: err.user_message(),
            status: err.status(),
        }
    }
}

impl fmt::Display for ToolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.error_type, self.message)?;
        if let Some(status) = self.status {
            write!(f, " (HTTP {})", status)?;
        }
        Ok(())
    }
}

/// Result of one tool invocation: exactly one of data or error.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutcome {
    Success(Value),
    Failure(ToolError),
}

impl ToolOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ToolOutcome::Success(_))
    }

    /// `{success, data}` or `{success, error}`.
    pub fn to_json(&self) -> Value {
        match self {
            ToolOutcome::Success(data) => json!({"success": true, "data": data}),
            ToolOutcome::Failure(err) => json!({"success": false, "error": err}),
        }
    }

    /// MCP `tools/call` payload: one text block plus the `isError` flag.
    pub fn to_call_result(&self) -> ToolCallResult {
        match self {
            ToolOutcome::Success(data) => ToolCallResult::text(data.to_string()),
            ToolOutcome::Failure(err) => ToolCallResult::error(err.to_string()),
        }
    }
}

/// Validate, run, time, and record one tool call.
pub async fn invoke_tool(tool: &dyn Tool, ctx: &AppContext, params: Value) -> ToolOutcome {
    let name = tool.name();
    let params = if params.is_null() {
        Value::Object(Map::new())
    } else {
        params
    };

    info!(tool = name, params = %redact_params(&params), "Executing tool");
    let started = Instant::now();

    let result = match schema::validate(&tool.input_schema(), &params) {
        Ok(()) => tool.execute(ctx, params).await,
        Err(e) => Err(e),
    };
    let elapsed = started.elapsed();

    match result {
        Ok(data) => {
            ctx.metrics().record_tool(name, elapsed, true, None);
            info!(tool = name, duration_ms = elapsed.as_millis() as u64, "Tool completed");
            ToolOutcome::Success(data)
        }
        Err(e) => {
            let err = ToolError::from_error(&e);
            ctx.metrics()
                .record_tool(name, elapsed, false, Some(&err.error_type));
            error!(tool = name, error_type = %err.error_type, error = %e, "Tool failed");
            ToolOutcome::Failure(err)
        }
    }
}

/// Copy of `params` with sensitive values replaced by `[REDACTED]`.
pub fn redact_params(params: &Value) -> Value {
    match params {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| {
                    let v = if is_sensitive_key(k) {
                        Value::String("[REDACTED]".to_string())
                    } else {
                        redact_params(v)
                    };
                    (k.clone(), v)
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(redact_params).collect()),
        other => other.clone(),
    }
}

fn is_sensitive_key(key: &str) -> bool {
    let key = key.to_lowercase();
    ["password", "secret", "token", "auth", "credential", "apikey"]
        .iter()
        .any(|needle| key.contains(needle))
        || key.contains("api_key")
        || key.contains("api-key")
}

// =============================================================================
// Shared parameter helpers
// =============================================================================

/// Numeric ID or string identifier, as Redmine accepts for projects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IdOrKey {
    Id(u64),
    Key(String),
}

impl fmt::Display for IdOrKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdOrKey::Id(id) => write!(f, "{}", id),
            IdOrKey::Key(key) => f.write_str(key),
        }
    }
}

/// Deserialize validated params into a typed struct.
pub(crate) fn parse_params<T: DeserializeOwned>(params: Value) -> Result<T> {
    serde_json::from_value(params).map_err(|e| Error::InvalidParams(e.to_string()))
}

/// Ordered query string builder that skips absent values.
#[derive(Debug, Default)]
pub(crate) struct Query(Vec<(String, String)>);

impl Query {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn opt<T: ToString>(mut self, key: &str, value: Option<T>) -> Self {
        if let Some(value) = value {
            self.0.push((key.to_string(), value.to_string()));
        }
        self
    }

    pub(crate) fn into_pairs(self) -> Vec<(String, String)> {
        self.0
    }
}

/// Unwrap `{key: {...}}`, falling back to the whole body.
pub(crate) fn unwrap_key(mut body: Value, key: &str) -> Value {
    match body.get_mut(key) {
        Some(inner) => inner.take(),
        None => body,
    }
}

/// Standard list envelope: `{key: [...], total_count, limit, offset}`.
pub(crate) fn list_envelope(
    response: &Value,
    key: &str,
    limit: Option<u32>,
    offset: Option<u32>,
) -> Value {
    json!({
        key: response.get(key).cloned().unwrap_or_else(|| json!([])),
        "total_count": response.get("total_count").cloned().unwrap_or(json!(0)),
        "limit": response.get("limit").cloned().unwrap_or(json!(limit.unwrap_or(25))),
        "offset": response.get("offset").cloned().unwrap_or(json!(offset.unwrap_or(0))),
    })
}
