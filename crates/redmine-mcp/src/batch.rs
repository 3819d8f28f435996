//! Concurrent fan-out of tool calls.
//!
//! Each call runs in its own task behind a semaphore sized to the clamped
//! concurrency hint. Results come back in input order and a failing call
//! never affects its siblings.

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Semaphore;
use tracing::{debug, error};

use crate::context::AppContext;
use crate::tools::{invoke_tool, ToolError, ToolOutcome};

pub const MIN_CONCURRENCY: usize = 1;
pub const MAX_CONCURRENCY: usize = 20;
pub const DEFAULT_CONCURRENCY: usize = 5;

/// Name under which the batch tool itself is registered.
pub const BATCH_TOOL_NAME: &str = "batch_execute";

/// Clamp a concurrency hint into `[MIN_CONCURRENCY, MAX_CONCURRENCY]`.
pub fn clamp_concurrency(hint: Option<i64>) -> usize {
    match hint {
        None => DEFAULT_CONCURRENCY,
        Some(n) => n.clamp(MIN_CONCURRENCY as i64, MAX_CONCURRENCY as i64) as usize,
    }
}

/// One requested sub-call.
#[derive(Debug, Clone, Deserialize)]
pub struct BatchCall {
    pub name: String,
    #[serde(default)]
    pub params: Value,
}

/// Outcome of one sub-call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchCallResult {
    pub tool: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ToolError>,
    pub duration_ms: f64,
}

impl BatchCallResult {
    fn from_outcome(tool: String, outcome: ToolOutcome, duration_ms: f64) -> Self {
        match outcome {
            ToolOutcome::Success(data) => Self {
                tool,
                success: true,
                data: Some(data),
                error: None,
                duration_ms,
            },
            ToolOutcome::Failure(err) => Self::failure(tool, err, duration_ms),
        }
    }

    fn failure(tool: String, err: ToolError, duration_ms: f64) -> Self {
        Self {
            tool,
            success: false,
            data: None,
            error: Some(err),
            duration_ms,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub results: Vec<BatchCallResult>,
    pub summary: BatchSummary,
}

impl BatchReport {
    fn new(results: Vec<BatchCallResult>) -> Self {
        let successful = results.iter().filter(|r| r.success).count();
        let summary = BatchSummary {
            total: results.len(),
            successful,
            failed: results.len() - successful,
        };
        Self { results, summary }
    }
}

/// Runs a list of tool calls with bounded parallelism.
#[derive(Debug, Clone, Copy)]
pub struct BatchExecutor {
    max_concurrency: usize,
}

impl Default for BatchExecutor {
    fn default() -> Self {
        Self {
            max_concurrency: DEFAULT_CONCURRENCY,
        }
    }
}

impl BatchExecutor {
    pub fn new(concurrency_hint: Option<i64>) -> Self {
        Self {
            max_concurrency: clamp_concurrency(concurrency_hint),
        }
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// Execute every call and wait for all of them.
    pub async fn execute(&self, ctx: &AppContext, calls: Vec<BatchCall>) -> BatchReport {
        debug!(
            calls = calls.len(),
            max_concurrency = self.max_concurrency,
            "Starting batch"
        );
        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));

        let handles: Vec<_> = calls
            .into_iter()
            .map(|call| {
                let ctx = ctx.clone();
                let semaphore = Arc::clone(&semaphore);
                let name = call.name.clone();
                let handle = tokio::spawn(async move {
                    // The semaphore is never closed, so acquiring cannot fail
                    let _permit = semaphore.acquire_owned().await;
                    run_call(&ctx, call).await
                });
                (name, handle)
            })
            .collect();

        let mut results = Vec::with_capacity(handles.len());
        for (name, handle) in handles {
            let result = match handle.await {
                Ok(result) => result,
                Err(e) => {
                    error!(tool = %name, error = %e, "Batch call aborted");
                    BatchCallResult::failure(name, ToolError::new("Error", e.to_string()), 0.0)
                }
            };
            results.push(result);
        }

        BatchReport::new(results)
    }
}

async fn run_call(ctx: &AppContext, call: BatchCall) -> BatchCallResult {
    let started = Instant::now();

    if call.name == BATCH_TOOL_NAME {
        return BatchCallResult::failure(
            call.name,
            ToolError::new("InvalidParams", "batch_execute cannot be nested"),
            elapsed_ms(started),
        );
    }

    let Some(tool) = ctx.registry().tool(&call.name) else {
        let message = format!("Tool '{}' not found", call.name);
        return BatchCallResult::failure(
            call.name,
            ToolError::new("ToolNotFoundError", message),
            elapsed_ms(started),
        );
    };

    let outcome = invoke_tool(tool.as_ref(), ctx, call.params).await;
    BatchCallResult::from_outcome(call.name, outcome, elapsed_ms(started))
}

fn elapsed_ms(started: Instant) -> f64 {
    (started.elapsed().as_secs_f64() * 100_000.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Registry;
    use crate::tools::test_support::{context_with_registry, MockApi};
    use crate::tools::Tool;
    use async_trait::async_trait;
    use redmine_mcp_core::{Error, Result};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Sleeps, tracking how many instances run at once.
    #[derive(Default)]
    struct SlowTool {
        running: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl Tool for SlowTool {
        fn name(&self) -> &'static str {
            "slow"
        }

        fn description(&self) -> &'static str {
            "sleeps"
        }

        fn input_schema(&self) -> Value {
            json!({"type": "object"})
        }

        async fn execute(&self, _ctx: &AppContext, params: Value) -> Result<Value> {
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.running.fetch_sub(1, Ordering::SeqCst);

            if params.get("fail").and_then(Value::as_bool) == Some(true) {
                return Err(Error::InvalidParams("asked to fail".into()));
            }
            Ok(params)
        }
    }

    struct PanicTool;

    #[async_trait]
    impl Tool for PanicTool {
        fn name(&self) -> &'static str {
            "panics"
        }

        fn description(&self) -> &'static str {
            "always panics"
        }

        fn input_schema(&self) -> Value {
            json!({"type": "object"})
        }

        async fn execute(&self, _ctx: &AppContext, _params: Value) -> Result<Value> {
            panic!("boom");
        }
    }

    fn setup() -> (AppContext, Arc<SlowTool>) {
        let slow = Arc::new(SlowTool::default());
        let mut registry = Registry::new();
        registry.register_tool(slow.clone());
        registry.register_tool(Arc::new(PanicTool));
        (context_with_registry(MockApi::new(), registry), slow)
    }

    fn calls(names: &[&str]) -> Vec<BatchCall> {
        names
            .iter()
            .enumerate()
            .map(|(i, name)| BatchCall {
                name: name.to_string(),
                params: json!({"n": i}),
            })
            .collect()
    }

    #[test]
    fn test_clamp_concurrency() {
        assert_eq!(clamp_concurrency(None), 5);
        assert_eq!(clamp_concurrency(Some(0)), 1);
        assert_eq!(clamp_concurrency(Some(-3)), 1);
        assert_eq!(clamp_concurrency(Some(7)), 7);
        assert_eq!(clamp_concurrency(Some(50)), 20);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_results_keep_input_order() {
        let (ctx, _) = setup();

        let report = BatchExecutor::new(Some(3))
            .execute(&ctx, calls(&["slow", "slow", "slow", "slow"]))
            .await;

        let ns: Vec<Value> = report
            .results
            .iter()
            .map(|r| r.data.as_ref().unwrap()["n"].clone())
            .collect();
        assert_eq!(ns, vec![json!(0), json!(1), json!(2), json!(3)]);
        assert_eq!(
            report.summary,
            BatchSummary {
                total: 4,
                successful: 4,
                failed: 0
            }
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrency_is_bounded() {
        let (ctx, slow) = setup();

        let report = BatchExecutor::new(Some(2))
            .execute(&ctx, calls(&["slow"; 8]))
            .await;

        assert_eq!(report.summary.successful, 8);
        let peak = slow.peak.load(Ordering::SeqCst);
        assert!(peak <= 2, "peak concurrency {} exceeded cap", peak);
        assert!(peak >= 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_failures_are_isolated() {
        let (ctx, _) = setup();
        let batch = vec![
            BatchCall {
                name: "slow".into(),
                params: json!({"ok": 1}),
            },
            BatchCall {
                name: "missing".into(),
                params: Value::Null,
            },
            BatchCall {
                name: "slow".into(),
                params: json!({"fail": true}),
            },
            BatchCall {
                name: "panics".into(),
                params: Value::Null,
            },
            BatchCall {
                name: BATCH_TOOL_NAME.into(),
                params: json!({"calls": []}),
            },
        ];

        let report = BatchExecutor::default().execute(&ctx, batch).await;

        let r = &report.results;
        assert!(r[0].success);
        assert_eq!(r[0].data, Some(json!({"ok": 1})));

        let err = r[1].error.as_ref().unwrap();
        assert_eq!(err.error_type, "ToolNotFoundError");
        assert_eq!(err.message, "Tool 'missing' not found");

        assert_eq!(r[2].error.as_ref().unwrap().error_type, "InvalidParams");
        assert_eq!(r[3].error.as_ref().unwrap().error_type, "Error");
        assert_eq!(r[4].error.as_ref().unwrap().error_type, "InvalidParams");

        assert_eq!(
            report.summary,
            BatchSummary {
                total: 5,
                successful: 1,
                failed: 4
            }
        );
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let (ctx, _) = setup();

        let report = BatchExecutor::default().execute(&ctx, Vec::new()).await;

        assert!(report.results.is_empty());
        assert_eq!(report.summary.total, 0);
    }

    #[test]
    fn test_result_serialization() {
        let ok = BatchCallResult::from_outcome("t".into(), ToolOutcome::Success(json!(1)), 1.5);
        assert_eq!(
            serde_json::to_value(&ok).unwrap(),
            json!({"tool": "t", "success": true, "data": 1, "duration_ms": 1.5})
        );
    }
}
