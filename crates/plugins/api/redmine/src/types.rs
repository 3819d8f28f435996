//! Redmine wire conventions: auth headers, path suffixes, collection keys.

use serde_json::Value;

/// Collection keys Redmine uses for list responses.
pub const COLLECTION_KEYS: &[&str] = &[
    "projects",
    "issues",
    "users",
    "time_entries",
    "versions",
    "wiki_pages",
    "issue_statuses",
    "trackers",
    "custom_fields",
    "roles",
    "groups",
    "memberships",
    "issue_relations",
    "news",
    "queries",
    "attachments",
];

/// Authentication strategy for one client instance.
#[derive(Clone, PartialEq, Eq)]
pub enum Auth {
    /// Static `X-Redmine-API-Key` header
    ApiKey(String),
    /// `Authorization: Bearer` token, usually one per tenant
    Bearer(String),
    /// No credential header; only useful as a template for bearer tenants
    None,
}

impl Auth {
    pub(crate) fn header(&self) -> Option<(&'static str, String)> {
        match self {
            Auth::ApiKey(key) => Some(("X-Redmine-API-Key", key.clone())),
            Auth::Bearer(token) => Some(("Authorization", format!("Bearer {}", token))),
            Auth::None => None,
        }
    }
}

// Keep credentials out of logs.
impl std::fmt::Debug for Auth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Auth::ApiKey(_) => f.write_str("ApiKey(***)"),
            Auth::Bearer(_) => f.write_str("Bearer(***)"),
            Auth::None => f.write_str("None"),
        }
    }
}

/// Append the `.json` format suffix unless the path already carries it.
pub fn ensure_json_extension(path: &str) -> String {
    if path.ends_with(".json") || path.contains(".json?") {
        return path.to_string();
    }
    match path.split_once('?') {
        Some((base, query)) => format!("{}.json?{}", base, query),
        None => format!("{}.json", path),
    }
}

/// First known collection key present in a list response.
pub fn detect_collection_key(response: &Value) -> Option<&'static str> {
    let obj = response.as_object()?;
    COLLECTION_KEYS
        .iter()
        .copied()
        .find(|key| obj.contains_key(*key))
}

/// Items of a list response; unknown shapes yield an empty list.
pub fn extract_collection(response: &Value) -> Vec<Value> {
    detect_collection_key(response)
        .and_then(|key| response.get(key))
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

/// Endpoint key for metrics: numeric segments collapse to `:id`, query dropped.
pub fn metrics_path(path: &str) -> String {
    let path = path.split('?').next().unwrap_or_default();
    let mut out = String::with_capacity(path.len());
    let mut chars = path.chars().peekable();

    while let Some(c) = chars.next() {
        out.push(c);
        if c == '/' && chars.peek().is_some_and(char::is_ascii_digit) {
            while chars.peek().is_some_and(char::is_ascii_digit) {
                chars.next();
            }
            out.push_str(":id");
        }
    }
    out
}
