//! Redmine API gateway for redmine-mcp.
//!
//! Turns `(method, path, query, body)` calls into parsed JSON bodies or
//! typed [`redmine_mcp_core::ApiError`]s, with bounded auto-pagination.

mod client;
mod types;

pub use client::{RedmineApi, RedmineClient};
pub use types::{
    detect_collection_key, ensure_json_extension, extract_collection, metrics_path, Auth,
    COLLECTION_KEYS,
};

/// Default page size for auto-pagination.
pub const DEFAULT_PAGE_LIMIT: u32 = 100;

/// Default page ceiling for auto-pagination.
pub const DEFAULT_MAX_PAGES: u32 = 100;
