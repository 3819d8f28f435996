use async_trait::async_trait;
use redmine_mcp_client::DEFAULT_PAGE_LIMIT;
use redmine_mcp_core::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{list_envelope, parse_params, unwrap_key, IdOrKey, Query, Tool};
use crate::context::AppContext;

pub struct ListTimeEntries;

#[derive(Debug, Deserialize)]
struct ListTimeEntriesParams {
    user_id: Option<IdOrKey>,
    project_id: Option<IdOrKey>,
    issue_id: Option<u64>,
    spent_on: Option<String>,
    from: Option<String>,
    to: Option<String>,
    limit: Option<u32>,
    offset: Option<u32>,
    #[serde(default)]
    fetch_all: bool,
}

#[async_trait]
impl Tool for ListTimeEntries {
    fn name(&self) -> &'static str {
        "list_time_entries"
    }

    fn description(&self) -> &'static str {
        "List time entries filtered by user, project, issue, or date range"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "user_id": {"type": ["string", "integer"], "description": "User ID or \"me\""},
                "project_id": {"type": ["string", "integer"], "description": "Project ID or identifier"},
                "issue_id": {"type": "integer", "description": "Issue ID"},
                "spent_on": {"type": "string", "description": "Specific date (YYYY-MM-DD)"},
                "from": {"type": "string", "description": "Entries from this date (YYYY-MM-DD)"},
                "to": {"type": "string", "description": "Entries until this date (YYYY-MM-DD)"},
                "limit": {"type": "integer", "description": "Maximum number to return (1-100, default: 25)", "minimum": 1, "maximum": 100},
                "offset": {"type": "integer", "description": "Pagination offset (default: 0)", "minimum": 0},
                "fetch_all": {"type": "boolean", "description": "Follow pagination and return every matching entry"}
            }
        })
    }

    async fn execute(&self, ctx: &AppContext, params: Value) -> Result<Value> {
        let params: ListTimeEntriesParams = parse_params(params)?;
        let query = Query::new()
            .opt("user_id", params.user_id)
            .opt("project_id", params.project_id)
            .opt("issue_id", params.issue_id)
            .opt("spent_on", params.spent_on)
            .opt("from", params.from)
            .opt("to", params.to);

        if params.fetch_all {
            let query = query.opt("offset", params.offset).into_pairs();
            let entries = ctx
                .api()
                .paginate(
                    "/time_entries",
                    &query,
                    params.limit.unwrap_or(DEFAULT_PAGE_LIMIT),
                )
                .await?;
            return Ok(json!({
                "total_count": entries.len(),
                "time_entries": entries,
            }));
        }

        let query = query
            .opt("limit", params.limit)
            .opt("offset", params.offset)
            .into_pairs();
        let response = ctx.api().get("/time_entries", &query).await?;
        Ok(list_envelope(
            &response,
            "time_entries",
            params.limit,
            params.offset,
        ))
    }
}

pub struct CreateTimeEntry;

#[derive(Debug, Deserialize, Serialize)]
struct CreateTimeEntryParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    issue_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    project_id: Option<IdOrKey>,
    hours: f64,
    activity_id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    spent_on: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    comments: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    user_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    custom_fields: Option<Vec<Value>>,
}

#[async_trait]
impl Tool for CreateTimeEntry {
    fn name(&self) -> &'static str {
        "create_time_entry"
    }

    fn description(&self) -> &'static str {
        "Log time on an issue or project. Requires either issue_id or project_id, plus hours and activity."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["hours", "activity_id"],
            "properties": {
                "issue_id": {"type": "integer", "description": "Issue to log time against (required without project_id)"},
                "project_id": {"type": ["string", "integer"], "description": "Project to log time against (required without issue_id)"},
                "hours": {"type": "number", "description": "Hours spent", "minimum": 0.01},
                "activity_id": {"type": "integer", "description": "Time entry activity ID"},
                "spent_on": {"type": "string", "description": "Date the time was spent (YYYY-MM-DD, default: today)"},
                "comments": {"type": "string", "description": "Description of the work done"},
                "user_id": {"type": "integer", "description": "Log on behalf of this user (admin only)"},
                "custom_fields": {"type": "array", "description": "Custom field values ([{id, value}])"}
            }
        })
    }

    async fn execute(&self, ctx: &AppContext, params: Value) -> Result<Value> {
        let params: CreateTimeEntryParams = parse_params(params)?;
        if params.issue_id.is_none() && params.project_id.is_none() {
            return Err(Error::InvalidParams(
                "Either issue_id or project_id must be provided".to_string(),
            ));
        }

        let response = ctx
            .api()
            .post("/time_entries", &json!({ "time_entry": params }))
            .await?;
        Ok(unwrap_key(response, "time_entry"))
    }
}
