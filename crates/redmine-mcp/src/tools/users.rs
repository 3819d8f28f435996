use async_trait::async_trait;
use redmine_mcp_core::Result;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{list_envelope, parse_params, unwrap_key, Query, Tool};
use crate::context::AppContext;

pub struct GetCurrentUser;

#[async_trait]
impl Tool for GetCurrentUser {
    fn name(&self) -> &'static str {
        "get_current_user"
    }

    fn description(&self) -> &'static str {
        "Get the user the configured credentials belong to"
    }

    fn input_schema(&self) -> Value {
        json!({"type": "object", "properties": {}})
    }

    async fn execute(&self, ctx: &AppContext, _params: Value) -> Result<Value> {
        let response = ctx.api().get("/users/current", &[]).await?;
        Ok(unwrap_key(response, "user"))
    }
}

pub struct ListUsers;

#[derive(Debug, Deserialize)]
struct ListUsersParams {
    limit: Option<u32>,
    offset: Option<u32>,
    status: Option<u8>,
    name: Option<String>,
    group_id: Option<u64>,
}

#[async_trait]
impl Tool for ListUsers {
    fn name(&self) -> &'static str {
        "list_users"
    }

    fn description(&self) -> &'static str {
        "List users, filtered by status, name, or group. Requires admin privileges to see all users."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "limit": {"type": "integer", "description": "Maximum number of users to return (1-100, default: 25)", "minimum": 1, "maximum": 100},
                "offset": {"type": "integer", "description": "Number of users to skip (default: 0)", "minimum": 0},
                "status": {"type": "integer", "description": "0=anonymous, 1=active, 2=registered, 3=locked", "enum": [0, 1, 2, 3]},
                "name": {"type": "string", "description": "Filter by login, firstname, lastname, or mail"},
                "group_id": {"type": "integer", "description": "Filter by group membership"}
            }
        })
    }

    async fn execute(&self, ctx: &AppContext, params: Value) -> Result<Value> {
        let params: ListUsersParams = parse_params(params)?;
        let query = Query::new()
            .opt("limit", params.limit)
            .opt("offset", params.offset)
            .opt("status", params.status)
            .opt("name", params.name)
            .opt("group_id", params.group_id)
            .into_pairs();

        let response = ctx.api().get("/users", &query).await?;
        Ok(list_envelope(&response, "users", params.limit, params.offset))
    }
}
