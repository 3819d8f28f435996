//! Core error taxonomy, configuration, and metrics for redmine-mcp.
//!
//! This crate provides the foundational pieces shared by the gateway client,
//! the MCP server, and the CLI.

pub mod config;
pub mod error;
pub mod metrics;

pub use config::{AuthMode, Config, Environment, MetricsConfig, RedmineConfig, ServerConfig};
pub use error::{ApiError, ApiErrorKind, Error, Result};
pub use metrics::MetricsCollector;
