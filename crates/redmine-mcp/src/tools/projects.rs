use async_trait::async_trait;
use redmine_mcp_core::Result;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{list_envelope, parse_params, unwrap_key, IdOrKey, Query, Tool};
use crate::context::AppContext;

pub struct ListProjects;

#[derive(Debug, Deserialize)]
struct ListProjectsParams {
    limit: Option<u32>,
    offset: Option<u32>,
    include: Option<String>,
    status: Option<ProjectStatus>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
enum ProjectStatus {
    Active,
    Archived,
    Closed,
}

impl ProjectStatus {
    /// Redmine's numeric project status code.
    fn code(self) -> u8 {
        match self {
            ProjectStatus::Active => 1,
            ProjectStatus::Archived => 5,
            ProjectStatus::Closed => 9,
        }
    }
}

#[async_trait]
impl Tool for ListProjects {
    fn name(&self) -> &'static str {
        "list_projects"
    }

    fn description(&self) -> &'static str {
        "List all accessible projects from Redmine. Supports pagination, filtering, and including related data."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "limit": {"type": "integer", "description": "Maximum number of projects to return (1-100, default: 25)", "minimum": 1, "maximum": 100},
                "offset": {"type": "integer", "description": "Number of projects to skip (default: 0)", "minimum": 0},
                "include": {"type": "string", "description": "Comma-separated: trackers,issue_categories,enabled_modules"},
                "status": {"type": "string", "description": "Filter by project status", "enum": ["active", "archived", "closed"]}
            }
        })
    }

    async fn execute(&self, ctx: &AppContext, params: Value) -> Result<Value> {
        let params: ListProjectsParams = parse_params(params)?;
        let query = Query::new()
            .opt("limit", params.limit)
            .opt("offset", params.offset)
            .opt("include", params.include)
            .opt("status", params.status.map(ProjectStatus::code))
            .into_pairs();

        let response = ctx.api().get("/projects", &query).await?;
        Ok(list_envelope(&response, "projects", params.limit, params.offset))
    }
}

pub struct GetProject;

#[derive(Debug, Deserialize)]
struct GetProjectParams {
    id: IdOrKey,
    include: Option<String>,
}

#[async_trait]
impl Tool for GetProject {
    fn name(&self) -> &'static str {
        "get_project"
    }

    fn description(&self) -> &'static str {
        "Get a project by numeric ID or string identifier, optionally with trackers, \
         issue categories, enabled modules, and time entry activities"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["id"],
            "properties": {
                "id": {"type": ["string", "integer"], "description": "Project ID or identifier"},
                "include": {"type": "string", "description": "Comma-separated: trackers,issue_categories,enabled_modules,time_entry_activities"}
            }
        })
    }

    async fn execute(&self, ctx: &AppContext, params: Value) -> Result<Value> {
        let params: GetProjectParams = parse_params(params)?;
        let query = Query::new().opt("include", params.include).into_pairs();

        let response = ctx
            .api()
            .get(&format!("/projects/{}", params.id), &query)
            .await?;
        Ok(unwrap_key(response, "project"))
    }
}
