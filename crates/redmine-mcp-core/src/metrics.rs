//! Process-wide metrics for tool executions and backend API calls.
//!
//! All counters are atomics behind concurrent maps, so recording is safe
//! from any task without external locking. Entries are created lazily on
//! first observation and only cleared by [`MetricsCollector::reset`].

use std::collections::{BTreeMap, VecDeque};
use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;

use crate::config::MetricsConfig;

#[derive(Debug, Default)]
struct ToolStats {
    total_calls: AtomicU64,
    success_count: AtomicU64,
    error_count: AtomicU64,
    total_nanos: AtomicU64,
    errors_by_type: DashMap<String, AtomicU64>,
}

#[derive(Debug, Default)]
struct ApiStats {
    total_calls: AtomicU64,
    total_nanos: AtomicU64,
    status_counts: DashMap<u16, AtomicU64>,
}

#[derive(Debug, Clone)]
struct SlowRequest {
    kind: &'static str,
    name: String,
    duration: Duration,
    timestamp: DateTime<Utc>,
    error: Option<String>,
}

/// Per-tool summary.
#[derive(Debug, Clone, Serialize)]
pub struct ToolSummary {
    pub tool: String,
    pub total_calls: u64,
    pub success_count: u64,
    pub error_count: u64,
    pub total_duration_ms: f64,
    pub avg_duration_ms: f64,
    pub errors_by_type: BTreeMap<String, u64>,
}

/// Per-endpoint summary, keyed by `"METHOD path"`.
#[derive(Debug, Clone, Serialize)]
pub struct ApiSummary {
    pub endpoint: String,
    pub total_calls: u64,
    pub total_duration_ms: f64,
    pub avg_duration_ms: f64,
    pub status_counts: BTreeMap<u16, u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SlowRequestSummary {
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    pub duration_ms: f64,
    pub timestamp: String,
    pub error: Option<String>,
}

/// Thread-safe metrics collector.
#[derive(Debug)]
pub struct MetricsCollector {
    tools: DashMap<String, Arc<ToolStats>>,
    api: DashMap<String, Arc<ApiStats>>,
    slow_requests: Mutex<VecDeque<SlowRequest>>,
    slow_threshold: Duration,
    max_slow_requests: usize,
    started_at: Mutex<Instant>,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), 100)
    }
}

impl MetricsCollector {
    pub fn new(slow_threshold: Duration, max_slow_requests: usize) -> Self {
        Self {
            tools: DashMap::new(),
            api: DashMap::new(),
            slow_requests: Mutex::new(VecDeque::with_capacity(max_slow_requests)),
            slow_threshold,
            max_slow_requests,
            started_at: Mutex::new(Instant::now()),
        }
    }

    pub fn from_config(config: &MetricsConfig) -> Self {
        Self::new(config.slow_threshold(), config.max_slow_requests)
    }

    /// Record one tool execution.
    pub fn record_tool(
        &self,
        tool_name: &str,
        duration: Duration,
        success: bool,
        error_type: Option<&str>,
    ) {
        let stats = self.tool_stats(tool_name);

        stats.total_calls.fetch_add(1, Ordering::Relaxed);
        stats
            .total_nanos
            .fetch_add(duration_nanos(duration), Ordering::Relaxed);

        if success {
            stats.success_count.fetch_add(1, Ordering::Relaxed);
        } else {
            stats.error_count.fetch_add(1, Ordering::Relaxed);
            stats
                .errors_by_type
                .entry(error_type.unwrap_or("Error").to_string())
                .or_default()
                .fetch_add(1, Ordering::Relaxed);
        }

        if duration >= self.slow_threshold {
            self.push_slow(SlowRequest {
                kind: "tool",
                name: tool_name.to_string(),
                duration,
                timestamp: Utc::now(),
                error: error_type.map(str::to_string),
            });
        }
    }

    /// Record one backend call. `status` is 0 when no response was received.
    pub fn record_api_call(&self, endpoint: &str, method: &str, duration: Duration, status: u16) {
        let key = format!("{} {}", method.to_uppercase(), endpoint);
        let stats = self.api_stats(&key);

        stats.total_calls.fetch_add(1, Ordering::Relaxed);
        stats
            .total_nanos
            .fetch_add(duration_nanos(duration), Ordering::Relaxed);
        stats
            .status_counts
            .entry(status)
            .or_default()
            .fetch_add(1, Ordering::Relaxed);
    }

    /// Summaries for every tool with at least one call, sorted by name.
    pub fn tool_summary(&self) -> Vec<ToolSummary> {
        let mut summary: Vec<ToolSummary> = self
            .tools
            .iter()
            .filter_map(|entry| {
                let stats = entry.value();
                let total_calls = stats.total_calls.load(Ordering::Relaxed);
                if total_calls == 0 {
                    return None;
                }
                let total_ms = nanos_to_ms(stats.total_nanos.load(Ordering::Relaxed));

                Some(ToolSummary {
                    tool: entry.key().clone(),
                    total_calls,
                    success_count: stats.success_count.load(Ordering::Relaxed),
                    error_count: stats.error_count.load(Ordering::Relaxed),
                    total_duration_ms: round2(total_ms),
                    avg_duration_ms: round2(total_ms / total_calls as f64),
                    errors_by_type: stats
                        .errors_by_type
                        .iter()
                        .map(|e| (e.key().clone(), e.value().load(Ordering::Relaxed)))
                        .collect(),
                })
            })
            .collect();
        summary.sort_by(|a, b| a.tool.cmp(&b.tool));
        summary
    }

    /// Summaries for every endpoint with at least one call, sorted by key.
    pub fn api_summary(&self) -> Vec<ApiSummary> {
        let mut summary: Vec<ApiSummary> = self
            .api
            .iter()
            .filter_map(|entry| {
                let stats = entry.value();
                let total_calls = stats.total_calls.load(Ordering::Relaxed);
                if total_calls == 0 {
                    return None;
                }
                let total_ms = nanos_to_ms(stats.total_nanos.load(Ordering::Relaxed));

                Some(ApiSummary {
                    endpoint: entry.key().clone(),
                    total_calls,
                    total_duration_ms: round2(total_ms),
                    avg_duration_ms: round2(total_ms / total_calls as f64),
                    status_counts: stats
                        .status_counts
                        .iter()
                        .map(|e| (*e.key(), e.value().load(Ordering::Relaxed)))
                        .collect(),
                })
            })
            .collect();
        summary.sort_by(|a, b| a.endpoint.cmp(&b.endpoint));
        summary
    }

    /// Recent slow requests, oldest first.
    pub fn slow_requests_summary(&self) -> Vec<SlowRequestSummary> {
        self.slow_requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|req| SlowRequestSummary {
                kind: req.kind.to_string(),
                name: req.name.clone(),
                duration_ms: round2(req.duration.as_secs_f64() * 1000.0),
                timestamp: req.timestamp.to_rfc3339(),
                error: req.error.clone(),
            })
            .collect()
    }

    pub fn uptime(&self) -> Duration {
        self.started_at
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .elapsed()
    }

    /// Plaintext exposition format for scraping.
    pub fn prometheus_format(&self) -> String {
        let tools = self.sorted_tools();
        let api = self.sorted_api();
        let mut out = String::new();

        family(
            &mut out,
            "redmine_mcp_tool_calls_total",
            "Total number of tool calls",
            "counter",
        );
        for (name, stats) in &tools {
            let _ = writeln!(
                out,
                "redmine_mcp_tool_calls_total{{tool=\"{}\"}} {}",
                escape_label(name),
                stats.total_calls.load(Ordering::Relaxed)
            );
        }

        out.push('\n');
        family(
            &mut out,
            "redmine_mcp_tool_duration_seconds",
            "Tool execution duration",
            "summary",
        );
        for (name, stats) in &tools {
            let total_calls = stats.total_calls.load(Ordering::Relaxed);
            if total_calls == 0 {
                continue;
            }
            let total_secs = stats.total_nanos.load(Ordering::Relaxed) as f64 / 1e9;
            let _ = writeln!(
                out,
                "redmine_mcp_tool_duration_seconds_sum{{tool=\"{}\"}} {:.3}",
                escape_label(name),
                total_secs
            );
            let _ = writeln!(
                out,
                "redmine_mcp_tool_duration_seconds_count{{tool=\"{}\"}} {}",
                escape_label(name),
                total_calls
            );
        }

        out.push('\n');
        family(
            &mut out,
            "redmine_mcp_tool_errors_total",
            "Total number of tool errors",
            "counter",
        );
        for (name, stats) in &tools {
            let _ = writeln!(
                out,
                "redmine_mcp_tool_errors_total{{tool=\"{}\"}} {}",
                escape_label(name),
                stats.error_count.load(Ordering::Relaxed)
            );
        }

        out.push('\n');
        family(
            &mut out,
            "redmine_mcp_api_calls_total",
            "Total number of Redmine API calls",
            "counter",
        );
        for (endpoint, stats) in &api {
            let _ = writeln!(
                out,
                "redmine_mcp_api_calls_total{{endpoint=\"{}\"}} {}",
                escape_label(endpoint),
                stats.total_calls.load(Ordering::Relaxed)
            );
        }

        out.push('\n');
        family(
            &mut out,
            "redmine_mcp_api_responses_total",
            "Redmine API responses by status code",
            "counter",
        );
        for (endpoint, stats) in &api {
            let statuses: BTreeMap<u16, u64> = stats
                .status_counts
                .iter()
                .map(|e| (*e.key(), e.value().load(Ordering::Relaxed)))
                .collect();
            for (status, count) in statuses {
                let _ = writeln!(
                    out,
                    "redmine_mcp_api_responses_total{{endpoint=\"{}\",status=\"{}\"}} {}",
                    escape_label(endpoint),
                    status,
                    count
                );
            }
        }

        out.push('\n');
        family(
            &mut out,
            "redmine_mcp_uptime_seconds",
            "Server uptime in seconds",
            "gauge",
        );
        let _ = writeln!(
            out,
            "redmine_mcp_uptime_seconds {:.2}",
            self.uptime().as_secs_f64()
        );

        out
    }

    /// Clear all accumulated state. Intended for test isolation.
    pub fn reset(&self) {
        self.tools.clear();
        self.api.clear();
        self.slow_requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        *self
            .started_at
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Instant::now();
    }

    fn tool_stats(&self, name: &str) -> Arc<ToolStats> {
        if let Some(stats) = self.tools.get(name) {
            return stats.clone();
        }
        self.tools.entry(name.to_string()).or_default().clone()
    }

    fn api_stats(&self, key: &str) -> Arc<ApiStats> {
        if let Some(stats) = self.api.get(key) {
            return stats.clone();
        }
        self.api.entry(key.to_string()).or_default().clone()
    }

    fn sorted_tools(&self) -> Vec<(String, Arc<ToolStats>)> {
        let mut tools: Vec<_> = self
            .tools
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        tools.sort_by(|a, b| a.0.cmp(&b.0));
        tools
    }

    fn sorted_api(&self) -> Vec<(String, Arc<ApiStats>)> {
        let mut api: Vec<_> = self
            .api
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        api.sort_by(|a, b| a.0.cmp(&b.0));
        api
    }

    fn push_slow(&self, request: SlowRequest) {
        if self.max_slow_requests == 0 {
            return;
        }
        let mut slow = self
            .slow_requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        slow.push_back(request);
        while slow.len() > self.max_slow_requests {
            slow.pop_front();
        }
    }
}

fn family(out: &mut String, name: &str, help: &str, kind: &str) {
    let _ = writeln!(out, "# HELP {} {}", name, help);
    let _ = writeln!(out, "# TYPE {} {}", name, kind);
}

fn escape_label(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}

fn duration_nanos(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}

fn nanos_to_ms(nanos: u64) -> f64 {
    nanos as f64 / 1_000_000.0
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collector() -> MetricsCollector {
        MetricsCollector::new(Duration::from_secs(1), 3)
    }

    #[test]
    fn test_average_duration() {
        let metrics = collector();
        metrics.record_tool("list_issues", Duration::from_millis(200), true, None);
        metrics.record_tool("list_issues", Duration::from_millis(400), true, None);

        let summary = metrics.tool_summary();
        assert_eq!(summary.len(), 1);
        assert_eq!(summary[0].tool, "list_issues");
        assert_eq!(summary[0].total_calls, 2);
        assert_eq!(summary[0].success_count, 2);
        assert_eq!(summary[0].avg_duration_ms, 300.0);
        assert_eq!(summary[0].total_duration_ms, 600.0);
    }

    #[test]
    fn test_errors_by_type() {
        let metrics = collector();
        metrics.record_tool("get_issue", Duration::from_millis(5), true, None);
        metrics.record_tool(
            "get_issue",
            Duration::from_millis(5),
            false,
            Some("NotFoundError"),
        );
        metrics.record_tool(
            "get_issue",
            Duration::from_millis(5),
            false,
            Some("NotFoundError"),
        );
        metrics.record_tool("get_issue", Duration::from_millis(5), false, None);

        let summary = &metrics.tool_summary()[0];
        assert_eq!(summary.total_calls, 4);
        assert_eq!(summary.error_count, 3);
        assert_eq!(summary.errors_by_type.get("NotFoundError"), Some(&2));
        assert_eq!(summary.errors_by_type.get("Error"), Some(&1));
    }

    #[test]
    fn test_slow_requests_bounded() {
        let metrics = collector();
        metrics.record_tool("fast", Duration::from_millis(10), true, None);
        for i in 0..5 {
            metrics.record_tool(
                &format!("slow_{}", i),
                Duration::from_millis(1500),
                true,
                None,
            );
        }

        let slow = metrics.slow_requests_summary();
        assert_eq!(slow.len(), 3);
        // Oldest evicted first
        assert_eq!(slow[0].name, "slow_2");
        assert_eq!(slow[2].name, "slow_4");
        assert_eq!(slow[0].duration_ms, 1500.0);
        assert_eq!(slow[0].kind, "tool");
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let metrics = collector();
        metrics.record_tool("edge", Duration::from_secs(1), false, Some("ServerError"));
        let slow = metrics.slow_requests_summary();
        assert_eq!(slow.len(), 1);
        assert_eq!(slow[0].error.as_deref(), Some("ServerError"));
    }

    #[test]
    fn test_api_calls_by_status() {
        let metrics = collector();
        metrics.record_api_call("/issues.json", "get", Duration::from_millis(10), 200);
        metrics.record_api_call("/issues.json", "GET", Duration::from_millis(30), 200);
        metrics.record_api_call("/issues.json", "GET", Duration::from_millis(20), 404);
        metrics.record_api_call("/issues.json", "POST", Duration::from_millis(20), 201);

        let summary = metrics.api_summary();
        assert_eq!(summary.len(), 2);
        assert_eq!(summary[0].endpoint, "GET /issues.json");
        assert_eq!(summary[0].total_calls, 3);
        assert_eq!(summary[0].avg_duration_ms, 20.0);
        assert_eq!(summary[0].status_counts.get(&200), Some(&2));
        assert_eq!(summary[0].status_counts.get(&404), Some(&1));
        assert_eq!(summary[1].endpoint, "POST /issues.json");
    }

    #[test]
    fn test_prometheus_format() {
        let metrics = collector();
        metrics.record_tool("list_issues", Duration::from_millis(250), true, None);
        metrics.record_tool("list_issues", Duration::from_millis(250), false, Some("X"));
        metrics.record_api_call("/issues.json", "GET", Duration::from_millis(10), 200);

        let text = metrics.prometheus_format();
        assert!(text.contains("# HELP redmine_mcp_tool_calls_total Total number of tool calls"));
        assert!(text.contains("# TYPE redmine_mcp_tool_calls_total counter"));
        assert!(text.contains("redmine_mcp_tool_calls_total{tool=\"list_issues\"} 2"));
        assert!(text.contains("redmine_mcp_tool_errors_total{tool=\"list_issues\"} 1"));
        assert!(text.contains("redmine_mcp_tool_duration_seconds_sum{tool=\"list_issues\"} 0.500"));
        assert!(text.contains("redmine_mcp_api_calls_total{endpoint=\"GET /issues.json\"} 1"));
        assert!(text.contains(
            "redmine_mcp_api_responses_total{endpoint=\"GET /issues.json\",status=\"200\"} 1"
        ));
        assert!(text.contains("# TYPE redmine_mcp_uptime_seconds gauge"));
        assert!(text.contains("redmine_mcp_uptime_seconds "));
    }

    #[test]
    fn test_reset() {
        let metrics = collector();
        metrics.record_tool("a", Duration::from_secs(2), true, None);
        metrics.record_api_call("/x.json", "GET", Duration::from_millis(1), 200);

        metrics.reset();

        assert!(metrics.tool_summary().is_empty());
        assert!(metrics.api_summary().is_empty());
        assert!(metrics.slow_requests_summary().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_recording() {
        let metrics = Arc::new(collector());
        let mut handles = Vec::new();

        for _ in 0..8 {
            let metrics = metrics.clone();
            handles.push(tokio::spawn(async move {
                for _ in 0..250 {
                    metrics.record_tool("shared", Duration::from_millis(1), true, None);
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let summary = metrics.tool_summary();
        assert_eq!(summary[0].total_calls, 2000);
        assert_eq!(summary[0].success_count, 2000);
    }
}
