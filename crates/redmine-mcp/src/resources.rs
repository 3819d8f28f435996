//! Read-only MCP resources.

use std::sync::Arc;

use async_trait::async_trait;
use redmine_mcp_client::extract_collection;
use redmine_mcp_core::Result;
use serde_json::Value;
use tracing::{error, info};

use crate::context::AppContext;
use crate::protocol::{ResourceContents, ResourceDefinition, ResourceReadResult};
use crate::tools::ToolError;

pub const JSON_MIME_TYPE: &str = "application/json";

/// A readable, URI-addressed document.
#[async_trait]
pub trait Resource: Send + Sync {
    fn uri(&self) -> &str;

    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn mime_type(&self) -> &str {
        JSON_MIME_TYPE
    }

    /// Produce the resource body.
    async fn fetch(&self, ctx: &AppContext) -> Result<String>;

    fn definition(&self) -> ResourceDefinition {
        ResourceDefinition {
            uri: self.uri().to_string(),
            name: self.name().to_string(),
            description: self.description().to_string(),
            mime_type: self.mime_type().to_string(),
        }
    }
}

/// Fetch a resource and wrap it in the `resources/read` shape.
///
/// Failures come back as a [`ToolError`] so callers can render them the
/// same way tool failures are rendered.
pub async fn read_resource(
    resource: &dyn Resource,
    ctx: &AppContext,
) -> std::result::Result<ResourceReadResult, ToolError> {
    info!(uri = resource.uri(), "Reading resource");
    match resource.fetch(ctx).await {
        Ok(text) => Ok(ResourceReadResult {
            contents: vec![ResourceContents {
                uri: resource.uri().to_string(),
                mime_type: resource.mime_type().to_string(),
                text,
            }],
        }),
        Err(e) => {
            error!(uri = resource.uri(), error = %e, "Resource read failed");
            Err(ToolError::from_error(&e))
        }
    }
}

/// Resource backed by one GET, rendered as pretty JSON.
///
/// With a `key` the named member is extracted: arrays through collection
/// detection, objects as-is.
pub struct ApiResource {
    uri: &'static str,
    name: &'static str,
    description: &'static str,
    path: &'static str,
    key: Option<&'static str>,
}

impl ApiResource {
    pub const fn new(
        uri: &'static str,
        name: &'static str,
        description: &'static str,
        path: &'static str,
    ) -> Self {
        Self {
            uri,
            name,
            description,
            path,
            key: None,
        }
    }

    pub const fn with_key(mut self, key: &'static str) -> Self {
        self.key = Some(key);
        self
    }

    fn select(&self, body: Value) -> Value {
        match self.key {
            Some(key) => match body.get(key) {
                Some(Value::Array(_)) => Value::Array(extract_collection(&body)),
                Some(inner) => inner.clone(),
                None => body,
            },
            None => body,
        }
    }
}

#[async_trait]
impl Resource for ApiResource {
    fn uri(&self) -> &str {
        self.uri
    }

    fn name(&self) -> &str {
        self.name
    }

    fn description(&self) -> &str {
        self.description
    }

    async fn fetch(&self, ctx: &AppContext) -> Result<String> {
        let body = ctx.api().get(self.path, &[]).await?;
        Ok(serde_json::to_string_pretty(&self.select(body))?)
    }
}

pub fn builtin_resources() -> Vec<Arc<dyn Resource>> {
    vec![
        Arc::new(
            ApiResource::new(
                "redmine://projects",
                "Projects",
                "All projects visible to the configured user",
                "/projects",
            )
            .with_key("projects"),
        ),
        Arc::new(
            ApiResource::new(
                "redmine://trackers",
                "Trackers",
                "Available issue trackers",
                "/trackers",
            )
            .with_key("trackers"),
        ),
        Arc::new(
            ApiResource::new(
                "redmine://issue_statuses",
                "Issue statuses",
                "Available issue statuses",
                "/issue_statuses",
            )
            .with_key("issue_statuses"),
        ),
        Arc::new(
            ApiResource::new(
                "redmine://users/current",
                "Current user",
                "The user the configured credentials belong to",
                "/users/current",
            )
            .with_key("user"),
        ),
    ]
}
