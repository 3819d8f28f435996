//! Issue tools.

use async_trait::async_trait;
use redmine_mcp_client::DEFAULT_PAGE_LIMIT;
use redmine_mcp_core::{ApiErrorKind, Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

use super::{list_envelope, parse_params, unwrap_key, IdOrKey, Query, Tool};
use crate::context::AppContext;

// =============================================================================
// list_issues
// =============================================================================

pub struct ListIssues;

#[derive(Debug, Deserialize)]
struct ListIssuesParams {
    query_id: Option<u64>,
    project_id: Option<IdOrKey>,
    tracker_id: Option<u64>,
    status_id: Option<IdOrKey>,
    assigned_to_id: Option<IdOrKey>,
    limit: Option<u32>,
    offset: Option<u32>,
    sort: Option<String>,
    include: Option<String>,
    #[serde(default)]
    fetch_all: bool,
}

#[async_trait]
impl Tool for ListIssues {
    fn name(&self) -> &'static str {
        "list_issues"
    }

    fn description(&self) -> &'static str {
        "List issues from Redmine with filtering, sorting, and pagination. Supports saved \
         queries via query_id, status and assignee filters, and fetching every page with fetch_all."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query_id": {"type": "integer", "description": "Apply a saved query by ID"},
                "project_id": {"type": ["string", "integer"], "description": "Filter by project ID or identifier"},
                "tracker_id": {"type": "integer", "description": "Filter by tracker ID"},
                "status_id": {"type": ["string", "integer"], "description": "Status ID, or \"open\", \"closed\", \"*\""},
                "assigned_to_id": {"type": ["string", "integer"], "description": "Assignee user ID or \"me\""},
                "limit": {"type": "integer", "description": "Maximum number of issues (1-100)", "minimum": 1, "maximum": 100},
                "offset": {"type": "integer", "description": "Number of issues to skip", "minimum": 0},
                "sort": {"type": "string", "description": "Sort field with optional :desc suffix (e.g. \"updated_on:desc\")"},
                "include": {"type": "string", "description": "Comma-separated: attachments,relations,journals,watchers"},
                "fetch_all": {"type": "boolean", "description": "Follow pagination and return every matching issue"}
            }
        })
    }

    async fn execute(&self, ctx: &AppContext, params: Value) -> Result<Value> {
        let params: ListIssuesParams = parse_params(params)?;

        let query = Query::new()
            .opt("query_id", params.query_id)
            .opt("project_id", params.project_id)
            .opt("tracker_id", params.tracker_id)
            .opt("status_id", params.status_id)
            .opt("assigned_to_id", params.assigned_to_id)
            .opt("sort", params.sort)
            .opt("include", params.include);

        if params.fetch_all {
            let query = query.opt("offset", params.offset).into_pairs();
            let issues = ctx
                .api()
                .paginate("/issues", &query, params.limit.unwrap_or(DEFAULT_PAGE_LIMIT))
                .await?;
            return Ok(json!({
                "total_count": issues.len(),
                "issues": issues,
            }));
        }

        let query = query
            .opt("limit", params.limit)
            .opt("offset", params.offset)
            .into_pairs();
        let response = ctx.api().get("/issues", &query).await?;
        Ok(list_envelope(&response, "issues", params.limit, params.offset))
    }
}

// =============================================================================
// get_issue
// =============================================================================

pub struct GetIssue;

#[derive(Debug, Deserialize)]
struct GetIssueParams {
    id: u64,
    include: Option<String>,
}

#[async_trait]
impl Tool for GetIssue {
    fn name(&self) -> &'static str {
        "get_issue"
    }

    fn description(&self) -> &'static str {
        "Get a single issue by ID, optionally including journals, relations, and attachments"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["id"],
            "properties": {
                "id": {"type": "integer", "description": "Issue ID"},
                "include": {"type": "string", "description": "Comma-separated: children,attachments,relations,changesets,journals,watchers"}
            }
        })
    }

    async fn execute(&self, ctx: &AppContext, params: Value) -> Result<Value> {
        let params: GetIssueParams = parse_params(params)?;
        let query = Query::new().opt("include", params.include).into_pairs();

        let response = ctx
            .api()
            .get(&format!("/issues/{}", params.id), &query)
            .await?;
        Ok(unwrap_key(response, "issue"))
    }
}

// =============================================================================
// create_issue
// =============================================================================

pub struct CreateIssue;

#[derive(Debug, Deserialize, Serialize)]
struct CreateIssueParams {
    project_id: IdOrKey,
    tracker_id: u64,
    subject: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    status_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    priority_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    assigned_to_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    parent_issue_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    start_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    due_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    estimated_hours: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    done_ratio: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    custom_fields: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    watcher_user_ids: Option<Vec<u64>>,
}

#[async_trait]
impl Tool for CreateIssue {
    fn name(&self) -> &'static str {
        "create_issue"
    }

    fn description(&self) -> &'static str {
        "Create a new issue in a Redmine project"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["project_id", "tracker_id", "subject"],
            "properties": {
                "project_id": {"type": ["string", "integer"], "description": "Project ID or identifier"},
                "tracker_id": {"type": "integer", "description": "Tracker ID"},
                "subject": {"type": "string", "description": "Issue subject/title"},
                "status_id": {"type": "integer", "description": "Status ID"},
                "priority_id": {"type": "integer", "description": "Priority ID"},
                "description": {"type": "string", "description": "Issue description"},
                "assigned_to_id": {"type": "integer", "description": "Assignee user ID"},
                "parent_issue_id": {"type": "integer", "description": "Parent issue ID"},
                "start_date": {"type": "string", "description": "Start date (YYYY-MM-DD)"},
                "due_date": {"type": "string", "description": "Due date (YYYY-MM-DD)"},
                "estimated_hours": {"type": "number", "description": "Estimated hours"},
                "done_ratio": {"type": "integer", "description": "Done ratio (0-100)", "minimum": 0, "maximum": 100},
                "custom_fields": {"type": "array", "description": "Custom field values ([{id, value}])"},
                "watcher_user_ids": {"type": "array", "items": {"type": "integer"}, "description": "Watcher user IDs"}
            }
        })
    }

    async fn execute(&self, ctx: &AppContext, params: Value) -> Result<Value> {
        let params: CreateIssueParams = parse_params(params)?;
        if params.subject.trim().is_empty() {
            return Err(Error::InvalidParams("subject must not be empty".to_string()));
        }

        let response = ctx
            .api()
            .post("/issues", &json!({ "issue": params }))
            .await?;
        Ok(unwrap_key(response, "issue"))
    }
}

// =============================================================================
// update_issue
// =============================================================================

pub struct UpdateIssue;

#[derive(Debug, Deserialize, Serialize)]
struct UpdateIssueParams {
    #[serde(skip_serializing)]
    id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    project_id: Option<IdOrKey>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tracker_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    status_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    priority_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    subject: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    assigned_to_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    start_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    due_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    parent_issue_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    estimated_hours: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    done_ratio: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    fixed_version_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    private_notes: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    custom_fields: Option<Vec<Value>>,
}

#[async_trait]
impl Tool for UpdateIssue {
    fn name(&self) -> &'static str {
        "update_issue"
    }

    fn description(&self) -> &'static str {
        "Update an existing issue; returns the issue as stored after the update"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["id"],
            "properties": {
                "id": {"type": "integer", "description": "Issue ID"},
                "project_id": {"type": ["string", "integer"], "description": "Move issue to this project"},
                "tracker_id": {"type": "integer", "description": "Tracker ID"},
                "status_id": {"type": "integer", "description": "Status ID"},
                "priority_id": {"type": "integer", "description": "Priority ID"},
                "subject": {"type": "string", "description": "Issue subject/title"},
                "description": {"type": "string", "description": "Issue description"},
                "assigned_to_id": {"type": "integer", "description": "Assignee user or group ID"},
                "start_date": {"type": "string", "description": "Start date (YYYY-MM-DD)"},
                "due_date": {"type": "string", "description": "Due date (YYYY-MM-DD)"},
                "parent_issue_id": {"type": "integer", "description": "Parent issue ID"},
                "estimated_hours": {"type": "number", "description": "Estimated hours"},
                "done_ratio": {"type": "integer", "description": "Done ratio (0-100)", "minimum": 0, "maximum": 100},
                "fixed_version_id": {"type": "integer", "description": "Target version ID"},
                "notes": {"type": "string", "description": "Add a comment to the issue"},
                "private_notes": {"type": "boolean", "description": "Make notes private"},
                "custom_fields": {"type": "array", "description": "Custom field values"}
            }
        })
    }

    async fn execute(&self, ctx: &AppContext, params: Value) -> Result<Value> {
        let params: UpdateIssueParams = parse_params(params)?;
        let id = params.id;

        let fields = serde_json::to_value(&params)?;
        if fields.as_object().map_or(true, |f| f.is_empty()) {
            return Err(Error::InvalidParams(
                "At least one field must be provided to update".to_string(),
            ));
        }

        let path = format!("/issues/{}", id);
        let response = ctx.api().put(&path, &json!({ "issue": fields })).await?;

        // Redmine answers updates with an empty body
        if response.as_object().is_some_and(|o| o.is_empty()) {
            let current = ctx.api().get(&path, &[]).await?;
            return Ok(unwrap_key(current, "issue"));
        }
        Ok(unwrap_key(response, "issue"))
    }
}

// =============================================================================
// delete_issue
// =============================================================================

pub struct DeleteIssue;

#[derive(Debug, Deserialize)]
struct DeleteIssueParams {
    id: u64,
    confirm: bool,
}

#[async_trait]
impl Tool for DeleteIssue {
    fn name(&self) -> &'static str {
        "delete_issue"
    }

    fn description(&self) -> &'static str {
        "Permanently delete an issue. Requires confirm: true."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["id", "confirm"],
            "properties": {
                "id": {"type": "integer", "description": "Issue ID"},
                "confirm": {"type": "boolean", "description": "Must be true to delete"}
            }
        })
    }

    async fn execute(&self, ctx: &AppContext, params: Value) -> Result<Value> {
        let params: DeleteIssueParams = parse_params(params)?;
        if !params.confirm {
            return Err(Error::InvalidParams(
                "Issue deletion requires explicit confirmation. Set confirm: true to proceed."
                    .to_string(),
            ));
        }

        let path = format!("/issues/{}", params.id);
        let issue = match ctx.api().get(&path, &[]).await {
            Ok(body) => unwrap_key(body, "issue"),
            Err(Error::Api(e)) if e.kind == ApiErrorKind::NotFound => {
                return Err(Error::InvalidParams(format!(
                    "Issue '{}' not found",
                    params.id
                )))
            }
            Err(e) => return Err(e),
        };
        let subject = issue["subject"].as_str().unwrap_or("Unknown").to_string();
        let project = issue["project"]["name"]
            .as_str()
            .unwrap_or("Unknown")
            .to_string();

        ctx.api().delete(&path).await?;
        info!(issue_id = params.id, "Issue deleted");

        Ok(json!({
            "success": true,
            "message": format!(
                "Issue #{} '{}' from project '{}' has been permanently deleted",
                params.id, subject, project
            ),
            "deleted_issue_id": params.id,
            "deleted_issue_subject": subject,
            "deleted_project_name": project,
        }))
    }
}
