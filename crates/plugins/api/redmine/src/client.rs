//! Redmine API client implementation.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use redmine_mcp_core::error::parse_body;
use redmine_mcp_core::{ApiError, Error, MetricsCollector, RedmineConfig, Result};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::types::{ensure_json_extension, extract_collection, metrics_path, Auth};
use crate::DEFAULT_MAX_PAGES;

/// Backend operations used by tools and resources.
///
/// Query parameters are passed as ordered key/value pairs; paths are given
/// without the `.json` suffix (it is added when missing).
#[async_trait]
pub trait RedmineApi: Send + Sync {
    async fn get(&self, path: &str, query: &[(String, String)]) -> Result<Value>;

    async fn post(&self, path: &str, body: &Value) -> Result<Value>;

    async fn put(&self, path: &str, body: &Value) -> Result<Value>;

    async fn delete(&self, path: &str) -> Result<Value>;

    /// Fetch every page of a collection, bounded by the page ceiling.
    async fn paginate(
        &self,
        path: &str,
        query: &[(String, String)],
        limit: u32,
    ) -> Result<Vec<Value>>;
}

/// Redmine API client.
#[derive(Clone)]
pub struct RedmineClient {
    base_url: String,
    auth: Auth,
    client: reqwest::Client,
    read_timeout: Duration,
    max_pages: u32,
    metrics: Option<Arc<MetricsCollector>>,
}

impl std::fmt::Debug for RedmineClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedmineClient")
            .field("base_url", &self.base_url)
            .field("auth", &self.auth)
            .field("read_timeout", &self.read_timeout)
            .field("max_pages", &self.max_pages)
            .finish()
    }
}

impl RedmineClient {
    /// Create a client with default timeouts (30s connect, 60s read).
    pub fn new(base_url: &str, auth: Auth) -> Result<Self> {
        Self::with_timeouts(
            base_url,
            auth,
            Duration::from_secs(30),
            Duration::from_secs(60),
        )
    }

    /// Create a client with explicit connect and read timeouts.
    pub fn with_timeouts(
        base_url: &str,
        auth: Auth,
        connect_timeout: Duration,
        read_timeout: Duration,
    ) -> Result<Self> {
        let base_url = normalize_base_url(base_url)?;
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(read_timeout)
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            base_url,
            auth,
            client,
            read_timeout,
            max_pages: DEFAULT_MAX_PAGES,
            metrics: None,
        })
    }

    /// Create a client from the `[redmine]` config section.
    ///
    /// In bearer mode the configured key (if any) is used as the default token.
    pub fn from_config(config: &RedmineConfig) -> Result<Self> {
        let url = config
            .url
            .as_deref()
            .ok_or_else(|| Error::Config("REDMINE_URL must be set".to_string()))?;

        let key = config.api_key.clone().filter(|k| !k.is_empty());
        let auth = match (config.auth, key) {
            (redmine_mcp_core::AuthMode::ApiKey, Some(key)) => Auth::ApiKey(key),
            (redmine_mcp_core::AuthMode::ApiKey, None) => {
                return Err(Error::Config("REDMINE_API_KEY must be set".to_string()))
            }
            (redmine_mcp_core::AuthMode::Bearer, Some(token)) => Auth::Bearer(token),
            (redmine_mcp_core::AuthMode::Bearer, None) => Auth::None,
        };

        Ok(Self::with_timeouts(
            url,
            auth,
            config.connect_timeout(),
            config.read_timeout(),
        )?
        .with_max_pages(config.max_pages))
    }

    /// Override the auto-pagination page ceiling.
    pub fn with_max_pages(mut self, max_pages: u32) -> Self {
        self.max_pages = max_pages;
        self
    }

    /// Report every outbound call to a metrics collector.
    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Derive a tenant client that authenticates with `token`.
    ///
    /// The connection pool is shared with `self`.
    pub fn with_bearer_token(&self, token: impl Into<String>) -> Self {
        Self {
            auth: Auth::Bearer(token.into()),
            ..self.clone()
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn max_pages(&self) -> u32 {
        self.max_pages
    }

    /// Request `/users/current` to check URL and credentials.
    pub async fn test_connection(&self) -> Result<bool> {
        match self.request(reqwest::Method::GET, "/users/current", &[], None).await {
            Ok(body) => {
                let ok = body.get("user").is_some();
                info!(connected = ok, "Redmine connection test");
                Ok(ok)
            }
            Err(e) => {
                error!(error = %e, "Redmine connection test failed");
                Err(e)
            }
        }
    }

    /// Walk a collection page by page.
    ///
    /// `on_page` receives `(items, offset, total_count)` for each page. Fails
    /// with [`Error::PaginationLimit`] before fetching a page past the ceiling.
    pub async fn paginate_each<F>(
        &self,
        path: &str,
        query: &[(String, String)],
        limit: u32,
        mut on_page: F,
    ) -> Result<()>
    where
        F: FnMut(Vec<Value>, u64, u64) + Send,
    {
        let limit = limit.max(1);
        let mut offset: u64 = query
            .iter()
            .find(|(k, _)| k == "offset")
            .and_then(|(_, v)| v.parse().ok())
            .unwrap_or(0);
        let base_query: Vec<(String, String)> = query
            .iter()
            .filter(|(k, _)| k != "offset" && k != "limit")
            .cloned()
            .collect();

        let mut pages_fetched: u32 = 0;
        loop {
            if pages_fetched >= self.max_pages {
                warn!(
                    path = path,
                    max_pages = self.max_pages,
                    "Pagination ceiling reached"
                );
                return Err(Error::PaginationLimit {
                    max_pages: self.max_pages,
                });
            }

            let mut page_query = base_query.clone();
            page_query.push(("limit".to_string(), limit.to_string()));
            page_query.push(("offset".to_string(), offset.to_string()));

            let response = self
                .request(reqwest::Method::GET, path, &page_query, None)
                .await?;
            pages_fetched += 1;

            let items = extract_collection(&response);
            let page_size = items.len() as u64;
            let total_count = response
                .get("total_count")
                .and_then(Value::as_u64)
                .unwrap_or(page_size);

            debug!(
                path = path,
                offset = offset,
                page_size = page_size,
                total_count = total_count,
                "Fetched page"
            );
            on_page(items, offset, total_count);

            if page_size < u64::from(limit) || offset + page_size >= total_count {
                break;
            }
            offset += u64::from(limit);
        }

        Ok(())
    }

    /// Issue one request, recording it in metrics.
    async fn request(
        &self,
        method: reqwest::Method,
        path: &str,
        query: &[(String, String)],
        body: Option<&Value>,
    ) -> Result<Value> {
        let started = Instant::now();
        let outcome = self.send(method.clone(), path, query, body).await;

        if let Some(metrics) = &self.metrics {
            let status = match &outcome {
                Ok((status, _)) => *status,
                Err(e) => e.status().unwrap_or(0),
            };
            metrics.record_api_call(
                &metrics_path(path),
                method.as_str(),
                started.elapsed(),
                status,
            );
        }

        outcome.map(|(_, body)| body)
    }

    async fn send(
        &self,
        method: reqwest::Method,
        path: &str,
        query: &[(String, String)],
        body: Option<&Value>,
    ) -> Result<(u16, Value)> {
        let url = self.url(path);
        debug!(method = %method, url = url, "Redmine request");

        let mut builder = self
            .client
            .request(method, &url)
            .header(reqwest::header::ACCEPT, "application/json")
            .header(reqwest::header::CONTENT_TYPE, "application/json");
        if let Some((name, value)) = self.auth.header() {
            builder = builder.header(name, value);
        }
        if !query.is_empty() {
            builder = builder.query(query);
        }
        if let Some(body) = body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        self.handle_response(response).await
    }

    /// Read the whole body, then map status to success or a domain error.
    async fn handle_response(&self, response: reqwest::Response) -> Result<(u16, Value)> {
        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| self.transport_error(e))?;

        if let Some(err) = ApiError::from_response(status, &text) {
            warn!(
                status = status,
                kind = err.kind.as_str(),
                "Redmine API error response"
            );
            return Err(err.into());
        }

        Ok((status, parse_body(&text)))
    }

    fn transport_error(&self, e: reqwest::Error) -> Error {
        if e.is_timeout() {
            warn!(timeout = ?self.read_timeout, "Redmine request timed out");
            ApiError::timeout(self.read_timeout).into()
        } else {
            error!(error = %e, "Redmine HTTP error");
            ApiError::network(e).into()
        }
    }

    fn url(&self, path: &str) -> String {
        let path = ensure_json_extension(path);
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }
}

#[async_trait]
impl RedmineApi for RedmineClient {
    async fn get(&self, path: &str, query: &[(String, String)]) -> Result<Value> {
        self.request(reqwest::Method::GET, path, query, None).await
    }

    async fn post(&self, path: &str, body: &Value) -> Result<Value> {
        self.request(reqwest::Method::POST, path, &[], Some(body))
            .await
    }

    async fn put(&self, path: &str, body: &Value) -> Result<Value> {
        self.request(reqwest::Method::PUT, path, &[], Some(body))
            .await
    }

    async fn delete(&self, path: &str) -> Result<Value> {
        self.request(reqwest::Method::DELETE, path, &[], None).await
    }

    async fn paginate(
        &self,
        path: &str,
        query: &[(String, String)],
        limit: u32,
    ) -> Result<Vec<Value>> {
        let mut all = Vec::new();
        self.paginate_each(path, query, limit, |items, _, _| all.extend(items))
            .await?;
        Ok(all)
    }
}

/// Trim, default the scheme to `http`, and allow only `http`/`https`.
fn normalize_base_url(raw: &str) -> Result<String> {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(Error::InvalidUrl("empty URL".to_string()));
    }

    let candidate = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("http://{}", trimmed)
    };

    let parsed = reqwest::Url::parse(&candidate)
        .map_err(|e| Error::InvalidUrl(format!("{}: {}", candidate, e)))?;

    match parsed.scheme() {
        "http" | "https" => Ok(candidate),
        other => Err(Error::InvalidUrl(format!(
            "protocol '{}' is not allowed, only http and https",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use redmine_mcp_core::ApiErrorKind;

    #[test]
    fn test_normalize_base_url() {
        assert_eq!(
            normalize_base_url("  https://redmine.example.com/ ").unwrap(),
            "https://redmine.example.com"
        );
        assert_eq!(
            normalize_base_url("redmine.local:3000").unwrap(),
            "http://redmine.local:3000"
        );
        assert_eq!(
            normalize_base_url("http://host/redmine/").unwrap(),
            "http://host/redmine"
        );
    }

    #[test]
    fn test_rejects_other_schemes() {
        for url in ["ftp://redmine.example.com", "file:///etc/passwd", "javascript://x"] {
            let err = normalize_base_url(url).unwrap_err();
            assert!(matches!(err, Error::InvalidUrl(_)), "{}", url);
        }
        assert!(normalize_base_url("   ").is_err());
    }

    #[test]
    fn test_url_building() {
        let client = RedmineClient::new("http://r.test", Auth::None).unwrap();
        assert_eq!(client.url("/issues/1"), "http://r.test/issues/1.json");
        assert_eq!(client.url("projects"), "http://r.test/projects.json");
    }

    #[test]
    fn test_from_config() {
        let mut config = RedmineConfig::default();
        assert!(RedmineClient::from_config(&config).is_err());

        config.url = Some("https://r.test".into());
        assert!(RedmineClient::from_config(&config).is_err());

        config.api_key = Some("k".into());
        config.max_pages = 7;
        let client = RedmineClient::from_config(&config).unwrap();
        assert_eq!(client.max_pages(), 7);
        assert_eq!(client.auth, Auth::ApiKey("k".into()));

        config.auth = redmine_mcp_core::AuthMode::Bearer;
        config.api_key = None;
        let client = RedmineClient::from_config(&config).unwrap();
        assert_eq!(client.auth, Auth::None);
    }

    #[test]
    fn test_with_bearer_token_keeps_settings() {
        let client = RedmineClient::new("http://r.test", Auth::None)
            .unwrap()
            .with_max_pages(3);
        let tenant = client.with_bearer_token("tok");
        assert_eq!(tenant.auth, Auth::Bearer("tok".into()));
        assert_eq!(tenant.max_pages(), 3);
        assert_eq!(tenant.base_url(), "http://r.test");
    }

    mod integration {
        use super::*;
        use httpmock::prelude::*;
        use serde_json::json;

        fn create_test_client(server: &MockServer) -> RedmineClient {
            RedmineClient::new(&server.base_url(), Auth::ApiKey("test-key".into())).unwrap()
        }

        fn no_query() -> Vec<(String, String)> {
            Vec::new()
        }

        #[tokio::test]
        async fn test_get_sends_headers_and_suffix() {
            let server = MockServer::start();

            let mock = server.mock(|when, then| {
                when.method(GET)
                    .path("/issues/42.json")
                    .header("X-Redmine-API-Key", "test-key")
                    .header("Accept", "application/json");
                then.status(200)
                    .json_body(json!({"issue": {"id": 42, "subject": "Test"}}));
            });

            let client = create_test_client(&server);
            let body = client.get("/issues/42", &no_query()).await.unwrap();

            mock.assert();
            assert_eq!(body["issue"]["id"], 42);
        }

        #[tokio::test]
        async fn test_bearer_auth_header() {
            let server = MockServer::start();

            let mock = server.mock(|when, then| {
                when.method(GET)
                    .path("/projects.json")
                    .header("Authorization", "Bearer tenant-token");
                then.status(200).json_body(json!({"projects": []}));
            });

            let client = RedmineClient::new(&server.base_url(), Auth::None)
                .unwrap()
                .with_bearer_token("tenant-token");
            client.get("/projects", &no_query()).await.unwrap();

            mock.assert();
        }

        #[tokio::test]
        async fn test_query_params_forwarded() {
            let server = MockServer::start();

            let mock = server.mock(|when, then| {
                when.method(GET)
                    .path("/issues.json")
                    .query_param("project_id", "demo")
                    .query_param("status_id", "open");
                then.status(200).json_body(json!({"issues": []}));
            });

            let client = create_test_client(&server);
            let query = vec![
                ("project_id".to_string(), "demo".to_string()),
                ("status_id".to_string(), "open".to_string()),
            ];
            client.get("/issues", &query).await.unwrap();

            mock.assert();
        }

        #[tokio::test]
        async fn test_empty_bodies_are_empty_objects() {
            let server = MockServer::start();

            server.mock(|when, then| {
                when.method(PUT).path("/issues/1.json");
                then.status(204);
            });
            server.mock(|when, then| {
                when.method(POST).path("/issues.json");
                then.status(201).body("");
            });

            let client = create_test_client(&server);
            let updated = client.put("/issues/1", &json!({"issue": {}})).await.unwrap();
            let created = client.post("/issues", &json!({"issue": {}})).await.unwrap();

            assert_eq!(updated, json!({}));
            assert_eq!(created, json!({}));
        }

        #[tokio::test]
        async fn test_post_sends_json_body() {
            let server = MockServer::start();

            let mock = server.mock(|when, then| {
                when.method(POST)
                    .path("/issues.json")
                    .header("Content-Type", "application/json")
                    .json_body(json!({"issue": {"project_id": 1, "subject": "New"}}));
                then.status(201)
                    .json_body(json!({"issue": {"id": 9, "subject": "New"}}));
            });

            let client = create_test_client(&server);
            let body = client
                .post("/issues", &json!({"issue": {"project_id": 1, "subject": "New"}}))
                .await
                .unwrap();

            mock.assert();
            assert_eq!(body["issue"]["id"], 9);
        }

        #[tokio::test]
        async fn test_status_mapping() {
            let server = MockServer::start();
            let cases: [(u16, ApiErrorKind); 7] = [
                (401, ApiErrorKind::Authentication),
                (403, ApiErrorKind::Authorization),
                (404, ApiErrorKind::NotFound),
                (422, ApiErrorKind::Validation),
                (500, ApiErrorKind::Server),
                (502, ApiErrorKind::Server),
                (409, ApiErrorKind::Generic),
            ];

            for (status, _) in cases {
                server.mock(|when, then| {
                    when.method(GET).path(format!("/status/{}.json", status));
                    then.status(status)
                        .json_body(json!({"errors": ["Subject cannot be blank"]}));
                });
            }

            let client = create_test_client(&server);
            for (status, kind) in cases {
                let err = client
                    .get(&format!("/status/{}", status), &no_query())
                    .await
                    .unwrap_err();
                let Error::Api(api) = err else {
                    panic!("expected Api error for {}", status);
                };
                assert_eq!(api.kind, kind, "status {}", status);
                assert_eq!(api.status, Some(status));
                assert_eq!(api.response_body["errors"][0], "Subject cannot be blank");
            }
        }

        #[tokio::test]
        async fn test_validation_message() {
            let server = MockServer::start();

            server.mock(|when, then| {
                when.method(POST).path("/issues.json");
                then.status(422).json_body(json!({
                    "errors": ["Subject cannot be blank", "Tracker cannot be blank"]
                }));
            });

            let client = create_test_client(&server);
            let err = client.post("/issues", &json!({})).await.unwrap_err();

            assert_eq!(err.error_type(), "ValidationError");
            assert_eq!(
                err.to_string(),
                "Validation failed: Subject cannot be blank, Tracker cannot be blank"
            );
        }

        #[tokio::test]
        async fn test_malformed_error_body() {
            let server = MockServer::start();

            server.mock(|when, then| {
                when.method(DELETE).path("/issues/5.json");
                then.status(503).body("<html>Service Unavailable</html>");
            });

            let client = create_test_client(&server);
            let Error::Api(api) = client.delete("/issues/5").await.unwrap_err() else {
                panic!("expected Api error");
            };

            assert_eq!(api.kind, ApiErrorKind::Server);
            assert_eq!(api.response_body, json!({}));
        }

        #[tokio::test]
        async fn test_read_timeout() {
            let server = MockServer::start();

            server.mock(|when, then| {
                when.method(GET).path("/slow.json");
                then.status(200)
                    .delay(Duration::from_secs(3))
                    .json_body(json!({}));
            });

            let client = RedmineClient::with_timeouts(
                &server.base_url(),
                Auth::ApiKey("k".into()),
                Duration::from_secs(5),
                Duration::from_millis(200),
            )
            .unwrap();

            let Error::Api(api) = client.get("/slow", &no_query()).await.unwrap_err() else {
                panic!("expected Api error");
            };
            assert_eq!(api.kind, ApiErrorKind::Server);
            assert_eq!(api.status, Some(408));
            assert!(api.message.starts_with("Request timeout after"));
        }

        #[tokio::test]
        async fn test_network_error_has_no_status() {
            let client =
                RedmineClient::new("http://127.0.0.1:1", Auth::ApiKey("k".into())).unwrap();

            let Error::Api(api) = client.get("/issues", &no_query()).await.unwrap_err() else {
                panic!("expected Api error");
            };
            assert_eq!(api.kind, ApiErrorKind::Server);
            assert_eq!(api.status, None);
            assert!(api.message.starts_with("Network error:"));
        }

        #[tokio::test]
        async fn test_paginate_visits_each_page_once() {
            let server = MockServer::start();

            let page0 = server.mock(|when, then| {
                when.method(GET)
                    .path("/issues.json")
                    .query_param("limit", "2")
                    .query_param("offset", "0");
                then.status(200).json_body(json!({
                    "issues": [{"id": 1}, {"id": 2}],
                    "total_count": 5, "offset": 0, "limit": 2
                }));
            });
            let page1 = server.mock(|when, then| {
                when.method(GET)
                    .path("/issues.json")
                    .query_param("limit", "2")
                    .query_param("offset", "2");
                then.status(200).json_body(json!({
                    "issues": [{"id": 3}, {"id": 4}],
                    "total_count": 5, "offset": 2, "limit": 2
                }));
            });
            let page2 = server.mock(|when, then| {
                when.method(GET)
                    .path("/issues.json")
                    .query_param("limit", "2")
                    .query_param("offset", "4");
                then.status(200).json_body(json!({
                    "issues": [{"id": 5}],
                    "total_count": 5, "offset": 4, "limit": 2
                }));
            });

            let client = create_test_client(&server);
            let mut pages = Vec::new();
            client
                .paginate_each("/issues", &no_query(), 2, |items, offset, total| {
                    pages.push((offset, items.len(), total));
                })
                .await
                .unwrap();

            page0.assert();
            page1.assert();
            page2.assert();
            assert_eq!(pages, vec![(0, 2, 5), (2, 2, 5), (4, 1, 5)]);
        }

        #[tokio::test]
        async fn test_paginate_accumulates() {
            let server = MockServer::start();

            server.mock(|when, then| {
                when.method(GET)
                    .path("/projects.json")
                    .query_param("offset", "0");
                then.status(200).json_body(json!({
                    "projects": [{"id": 1}, {"id": 2}, {"id": 3}],
                    "total_count": 3
                }));
            });

            let client = create_test_client(&server);
            let items = client.paginate("/projects", &no_query(), 25).await.unwrap();

            assert_eq!(items.len(), 3);
            assert_eq!(items[2]["id"], 3);
        }

        #[tokio::test]
        async fn test_paginate_starts_at_given_offset() {
            let server = MockServer::start();

            let mock = server.mock(|when, then| {
                when.method(GET)
                    .path("/issues.json")
                    .query_param("offset", "10")
                    .query_param("limit", "5");
                then.status(200).json_body(json!({
                    "issues": [{"id": 11}],
                    "total_count": 11
                }));
            });

            let client = create_test_client(&server);
            let query = vec![("offset".to_string(), "10".to_string())];
            let items = client.paginate("/issues", &query, 5).await.unwrap();

            mock.assert();
            assert_eq!(items.len(), 1);
        }

        #[tokio::test]
        async fn test_paginate_ceiling_trips_on_next_page() {
            let server = MockServer::start();

            // Never shrinks and never reaches total_count
            server.mock(|when, then| {
                when.method(GET).path("/issues.json");
                then.status(200).json_body(json!({
                    "issues": [{"id": 1}, {"id": 2}],
                    "total_count": 1_000_000
                }));
            });

            let client = create_test_client(&server).with_max_pages(3);
            let mut pages_seen = 0;
            let err = client
                .paginate_each("/issues", &no_query(), 2, |_, _, _| pages_seen += 1)
                .await
                .unwrap_err();

            assert_eq!(pages_seen, 3);
            assert!(matches!(err, Error::PaginationLimit { max_pages: 3 }));
            assert_eq!(err.error_type(), "PaginationLimitExceeded");
        }

        #[tokio::test]
        async fn test_unknown_collection_shape_yields_empty() {
            let server = MockServer::start();

            server.mock(|when, then| {
                when.method(GET).path("/widgets.json");
                then.status(200).json_body(json!({"widgets": [1, 2, 3]}));
            });

            let client = create_test_client(&server);
            let items = client.paginate("/widgets", &no_query(), 10).await.unwrap();
            assert!(items.is_empty());
        }

        #[tokio::test]
        async fn test_metrics_recorded_with_normalized_path() {
            let server = MockServer::start();

            server.mock(|when, then| {
                when.method(GET).path("/issues/42.json");
                then.status(404);
            });

            let metrics = Arc::new(MetricsCollector::default());
            let client = create_test_client(&server).with_metrics(metrics.clone());
            let _ = client.get("/issues/42", &no_query()).await;

            let summary = metrics.api_summary();
            assert_eq!(summary.len(), 1);
            assert_eq!(summary[0].endpoint, "GET /issues/:id");
            assert_eq!(summary[0].status_counts.get(&404), Some(&1));
        }

        #[tokio::test]
        async fn test_connection_check() {
            let server = MockServer::start();

            server.mock(|when, then| {
                when.method(GET).path("/users/current.json");
                then.status(200)
                    .json_body(json!({"user": {"id": 1, "login": "admin"}}));
            });

            let client = create_test_client(&server);
            assert!(client.test_connection().await.unwrap());
        }
    }
}
