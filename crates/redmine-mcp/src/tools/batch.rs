use async_trait::async_trait;
use redmine_mcp_core::Result;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{parse_params, Tool};
use crate::batch::{BatchCall, BatchExecutor, BATCH_TOOL_NAME};
use crate::context::AppContext;

pub struct BatchExecute;

#[derive(Debug, Deserialize)]
struct BatchExecuteParams {
    calls: Vec<BatchCall>,
    max_concurrency: Option<i64>,
}

#[async_trait]
impl Tool for BatchExecute {
    fn name(&self) -> &'static str {
        BATCH_TOOL_NAME
    }

    fn description(&self) -> &'static str {
        "Execute multiple tools concurrently. Returns a result for every call in request order; \
         individual failures do not affect the other calls."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["calls"],
            "properties": {
                "calls": {
                    "type": "array",
                    "description": "Tool calls to execute concurrently",
                    "items": {
                        "type": "object",
                        "required": ["name"],
                        "properties": {
                            "name": {"type": "string", "description": "Name of the tool to call"},
                            "params": {"type": "object", "description": "Parameters for the tool call"}
                        }
                    }
                },
                "max_concurrency": {
                    "type": "integer",
                    "description": "Maximum number of concurrent executions, clamped to 1-20 (default: 5)"
                }
            }
        })
    }

    async fn execute(&self, ctx: &AppContext, params: Value) -> Result<Value> {
        let params: BatchExecuteParams = parse_params(params)?;
        let report = BatchExecutor::new(params.max_concurrency)
            .execute(ctx, params.calls)
            .await;
        Ok(serde_json::to_value(report)?)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::super::{invoke_tool, ToolOutcome};
    use super::*;

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_batch_tool_mixes_success_and_failure() {
        let mut api = MockApi::new();
        api.expect_get()
            .withf(|path: &str, _: &[(String, String)]| path == "/issues/1")
            .returning(|_, _| Ok(json!({"issue": {"id": 1}})));
        api.expect_get()
            .withf(|path: &str, _: &[(String, String)]| path == "/users/current")
            .returning(|_, _| Ok(json!({"user": {"id": 2}})));
        let ctx = context(api);
        let tool = ctx.registry().tool("batch_execute").unwrap();

        let outcome = invoke_tool(
            tool.as_ref(),
            &ctx,
            json!({
                "calls": [
                    {"name": "get_issue", "params": {"id": 1}},
                    {"name": "get_current_user"},
                    {"name": "get_issue", "params": {}},
                    {"name": "nope", "params": {}}
                ],
                "max_concurrency": 100
            }),
        )
        .await;

        let ToolOutcome::Success(data) = outcome else {
            panic!("batch itself must succeed");
        };
        assert_eq!(data["summary"], json!({"total": 4, "successful": 2, "failed": 2}));
        assert_eq!(data["results"][0]["data"], json!({"id": 1}));
        assert_eq!(data["results"][1]["data"], json!({"id": 2}));
        assert_eq!(data["results"][2]["error"]["type"], "InvalidParams");
        assert_eq!(data["results"][3]["error"]["type"], "ToolNotFoundError");
        assert!(data["results"][3]["duration_ms"].is_number());
    }

    #[tokio::test]
    async fn test_batch_tool_requires_calls() {
        let ctx = context(MockApi::new());
        let tool = ctx.registry().tool("batch_execute").unwrap();

        let ToolOutcome::Failure(err) = invoke_tool(tool.as_ref(), &ctx, json!({})).await else {
            panic!("expected failure");
        };
        assert_eq!(err.message, "Missing required parameters: calls");
    }
}
