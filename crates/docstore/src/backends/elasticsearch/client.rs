//! [`SearchClient`] implementation over the Elasticsearch REST API.

use std::fmt::Debug;
use std::time::Duration;

use async_trait::async_trait;
use elasticsearch::auth::Credentials;
use elasticsearch::cert::{Certificate, CertificateValidation};
use elasticsearch::http::response::Response;
use elasticsearch::http::{StatusCode, Url};
use elasticsearch::http::transport::{SingleNodeConnectionPool, TransportBuilder};
use elasticsearch::cluster::ClusterHealthParts;
use elasticsearch::indices::{IndicesCreateParts, IndicesExistsParts, IndicesRefreshParts};
use elasticsearch::{
    ClearScrollParts, CountParts, Elasticsearch, GetParts, IndexParts, ScrollParts, SearchParts,
};
use futures::stream::{self, BoxStream, StreamExt};
use serde::Deserialize;
use serde_json::{Value, json};

use super::config::{ElasticsearchAuth, ElasticsearchConfig};
use crate::client::{Document, Hit, IndexCreation, SearchClient, SearchHits};
use crate::error::{BackendError, ConfigurationError, StoreError, StoreResult};

const BACKEND_NAME: &str = "elasticsearch";

/// Elasticsearch implementation of [`SearchClient`].
pub struct ElasticsearchClient {
    client: Elasticsearch,
    config: ElasticsearchConfig,
}

impl Debug for ElasticsearchClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ElasticsearchClient")
            .field("nodes", &self.config.nodes)
            .field("scan_batch_size", &self.config.scan_batch_size)
            .finish_non_exhaustive()
    }
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(rename = "_scroll_id", default)]
    scroll_id: Option<String>,
    #[serde(default)]
    hits: SearchHits,
}

#[derive(Deserialize)]
struct GetResponse {
    #[serde(default)]
    found: bool,
    #[serde(flatten)]
    hit: Hit,
}

#[derive(Deserialize)]
struct CountResponse {
    count: u64,
}

#[derive(Debug, Deserialize)]
struct ClusterHealth {
    #[serde(default)]
    cluster_name: String,
    status: String,
    #[serde(default)]
    unassigned_shards: u64,
}

impl ClusterHealth {
    /// Yellow still serves reads and writes; red means some primaries are missing.
    fn ensure_serving(self) -> Result<(), BackendError> {
        if self.status != "red" {
            return Ok(());
        }
        Err(BackendError::Unavailable {
            backend_name: BACKEND_NAME.to_string(),
            message: format!(
                "cluster '{}' is red with {} unassigned shards",
                self.cluster_name, self.unassigned_shards
            ),
        })
    }
}

enum ScrollState {
    Open(Value),
    Continue(String),
    Done,
}

impl ElasticsearchClient {
    /// Creates a client with the given configuration.
    ///
    /// No request is sent; use [`SearchClient::health_check`] to verify the
    /// connection.
    pub fn new(config: ElasticsearchConfig) -> StoreResult<Self> {
        config.validate()?;
        let client = Self::build_client(&config)?;
        Ok(Self { client, config })
    }

    fn build_client(config: &ElasticsearchConfig) -> StoreResult<Elasticsearch> {
        let pool = SingleNodeConnectionPool::new(node_url(config)?);
        let mut builder =
            TransportBuilder::new(pool).timeout(Duration::from_millis(config.request_timeout_ms));

        if let Some(validation) = certificate_validation(config)? {
            builder = builder.cert_validation(validation);
        }
        if let Some(ref auth) = config.auth {
            builder = builder.auth(credentials(auth));
        }

        let transport = builder.build().map_err(|e| BackendError::ConnectionFailed {
            backend_name: BACKEND_NAME.to_string(),
            message: format!("cannot set up transport to {}: {}", config.nodes.join(", "), e),
        })?;
        Ok(Elasticsearch::new(transport))
    }

    /// Returns the client configuration.
    pub fn config(&self) -> &ElasticsearchConfig {
        &self.config
    }

    async fn open_scroll(&self, index: &str, query: Value) -> Result<SearchResponse, BackendError> {
        let response = self
            .client
            .search(SearchParts::Index(&[index]))
            .scroll(&self.config.scroll_keep_alive)
            .size(self.config.scan_batch_size as i64)
            .body(query)
            .send()
            .await
            .map_err(|e| transport_error("scan", e))?;
        let response = check_status(response, index).await?;
        parse(response, "scan").await
    }

    async fn continue_scroll(
        &self,
        index: &str,
        scroll_id: &str,
    ) -> Result<SearchResponse, BackendError> {
        let response = self
            .client
            .scroll(ScrollParts::None)
            .body(json!({
                "scroll": self.config.scroll_keep_alive,
                "scroll_id": scroll_id
            }))
            .send()
            .await
            .map_err(|e| transport_error("scroll", e))?;
        let response = check_status(response, index).await?;
        parse(response, "scroll").await
    }

    async fn clear_scroll(&self, scroll_id: &str) {
        let result = self
            .client
            .clear_scroll(ClearScrollParts::None)
            .body(json!({ "scroll_id": [scroll_id] }))
            .send()
            .await;
        if let Err(e) = result {
            tracing::debug!(error = %e, "Failed to clear scroll context");
        }
    }
}

fn transport_option(option: &'static str, message: String) -> StoreError {
    StoreError::Configuration(ConfigurationError::InvalidTransport { option, message })
}

/// The node the connection pool talks to; only the first configured node is used.
fn node_url(config: &ElasticsearchConfig) -> StoreResult<Url> {
    let node = config
        .nodes
        .first()
        .ok_or_else(|| transport_option("nodes", "no node configured".to_string()))?;
    node.parse()
        .map_err(|e| transport_option("nodes", format!("'{}' is not a node URL: {}", node, e)))
}

fn certificate_validation(
    config: &ElasticsearchConfig,
) -> StoreResult<Option<CertificateValidation>> {
    if config.disable_certificate_validation {
        return Ok(Some(CertificateValidation::None));
    }
    let Some(ref path) = config.ca_certificate else {
        return Ok(None);
    };
    let pem = std::fs::read(path).map_err(|e| {
        transport_option("ca_certificate", format!("cannot read {}: {}", path.display(), e))
    })?;
    let certificate = Certificate::from_pem(&pem).map_err(|e| {
        transport_option(
            "ca_certificate",
            format!("{} holds no PEM certificate: {}", path.display(), e),
        )
    })?;
    Ok(Some(CertificateValidation::Full(certificate)))
}

fn credentials(auth: &ElasticsearchAuth) -> Credentials {
    match auth {
        ElasticsearchAuth::Basic { username, password } => {
            Credentials::Basic(username.clone(), password.clone())
        }
        ElasticsearchAuth::Bearer { token } => Credentials::Bearer(token.clone()),
    }
}

fn transport_error(operation: &str, e: elasticsearch::Error) -> BackendError {
    BackendError::ConnectionFailed {
        backend_name: BACKEND_NAME.to_string(),
        message: format!("{} request failed: {}", operation, e),
    }
}

/// Maps non-success responses to the matching [`BackendError`].
async fn check_status(response: Response, index: &str) -> Result<Response, BackendError> {
    let status = response.status_code();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(status_error(status, index, body))
}

fn status_error(status: StatusCode, index: &str, body: String) -> BackendError {
    if body.contains("index_not_found_exception") {
        return BackendError::IndexNotFound {
            backend_name: BACKEND_NAME.to_string(),
            index: index.to_string(),
        };
    }
    if status == StatusCode::SERVICE_UNAVAILABLE {
        return BackendError::Unavailable {
            backend_name: BACKEND_NAME.to_string(),
            message: body,
        };
    }
    BackendError::QueryRejected {
        backend_name: BACKEND_NAME.to_string(),
        status: status.as_u16(),
        message: body,
    }
}

async fn parse<T>(response: Response, operation: &str) -> Result<T, BackendError>
where
    T: serde::de::DeserializeOwned,
{
    response
        .json::<T>()
        .await
        .map_err(|e| BackendError::Internal {
            backend_name: BACKEND_NAME.to_string(),
            message: format!("Failed to parse {} response: {}", operation, e),
            source: Some(Box::new(e)),
        })
}

#[async_trait]
impl SearchClient for ElasticsearchClient {
    fn backend_name(&self) -> &'static str {
        BACKEND_NAME
    }

    async fn search(&self, index: &str, body: &Value) -> Result<SearchHits, BackendError> {
        let response = self
            .client
            .search(SearchParts::Index(&[index]))
            .body(body)
            .send()
            .await
            .map_err(|e| transport_error("search", e))?;
        let response = check_status(response, index).await?;
        let parsed: SearchResponse = parse(response, "search").await?;
        Ok(parsed.hits)
    }

    async fn get(&self, index: &str, id: &str) -> Result<Option<Hit>, BackendError> {
        let response = self
            .client
            .get(GetParts::IndexId(index, id))
            .send()
            .await
            .map_err(|e| transport_error("get", e))?;

        // A missing document is a 404 with `found: false`; a missing index is not.
        if response.status_code() == StatusCode::NOT_FOUND {
            let body = response.text().await.unwrap_or_default();
            if body.contains("index_not_found_exception") {
                return Err(status_error(StatusCode::NOT_FOUND, index, body));
            }
            return Ok(None);
        }

        let response = check_status(response, index).await?;
        let parsed: GetResponse = parse(response, "get").await?;
        Ok(parsed.found.then_some(parsed.hit))
    }

    async fn index(&self, index: &str, document: Document) -> Result<(), BackendError> {
        let response = self
            .client
            .index(IndexParts::Index(index))
            .body(document)
            .send()
            .await
            .map_err(|e| transport_error("index", e))?;
        check_status(response, index).await?;
        Ok(())
    }

    async fn count(&self, index: &str) -> Result<u64, BackendError> {
        let response = self
            .client
            .count(CountParts::Index(&[index]))
            .send()
            .await
            .map_err(|e| transport_error("count", e))?;
        let response = check_status(response, index).await?;
        let parsed: CountResponse = parse(response, "count").await?;
        Ok(parsed.count)
    }

    async fn create_index(
        &self,
        index: &str,
        body: &Value,
    ) -> Result<IndexCreation, BackendError> {
        let exists_response = self
            .client
            .indices()
            .exists(IndicesExistsParts::Index(&[index]))
            .send()
            .await
            .map_err(|e| transport_error("index exists", e))?;

        if exists_response.status_code().is_success() {
            return Ok(IndexCreation::AlreadyExists);
        }

        let response = self
            .client
            .indices()
            .create(IndicesCreateParts::Index(index))
            .body(body)
            .send()
            .await
            .map_err(|e| transport_error("create index", e))?;

        let status = response.status_code();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            // Another process created it between the two requests.
            if body.contains("resource_already_exists_exception") {
                return Ok(IndexCreation::AlreadyExists);
            }
            return Err(status_error(status, index, body));
        }

        Ok(IndexCreation::Created)
    }

    fn scan<'a>(
        &'a self,
        index: &'a str,
        query: Value,
    ) -> BoxStream<'a, Result<Vec<Hit>, BackendError>> {
        stream::try_unfold(ScrollState::Open(query), move |state| async move {
            let page = match state {
                ScrollState::Open(query) => self.open_scroll(index, query).await?,
                ScrollState::Continue(scroll_id) => self.continue_scroll(index, &scroll_id).await?,
                ScrollState::Done => return Ok(None),
            };

            if page.hits.hits.is_empty() {
                if let Some(ref scroll_id) = page.scroll_id {
                    self.clear_scroll(scroll_id).await;
                }
                return Ok(None);
            }

            tracing::debug!(index = %index, batch = page.hits.hits.len(), "Scroll batch");
            let next = match page.scroll_id {
                Some(scroll_id) => ScrollState::Continue(scroll_id),
                None => ScrollState::Done,
            };
            Ok(Some((page.hits.hits, next)))
        })
        .boxed()
    }

    async fn refresh(&self, index: &str) -> Result<(), BackendError> {
        let response = self
            .client
            .indices()
            .refresh(IndicesRefreshParts::Index(&[index]))
            .send()
            .await
            .map_err(|e| transport_error("refresh", e))?;
        check_status(response, index).await?;
        Ok(())
    }

    async fn health_check(&self) -> Result<(), BackendError> {
        let response = self
            .client
            .cluster()
            .health(ClusterHealthParts::None)
            .send()
            .await
            .map_err(|e| transport_error("cluster health", e))?;
        let response = check_status(response, "_cluster").await?;
        let health: ClusterHealth = parse(response, "cluster health").await?;
        health.ensure_serving()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_rejects_invalid_url() {
        let err = ElasticsearchClient::new(ElasticsearchConfig {
            nodes: vec!["not a url".to_string()],
            ..Default::default()
        })
        .unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_new_rejects_missing_ca_bundle() {
        let err = ElasticsearchClient::new(ElasticsearchConfig {
            ca_certificate: Some("/nonexistent/ca.pem".into()),
            ..Default::default()
        })
        .unwrap_err();
        assert!(err.to_string().contains("ca_certificate"));
    }

    #[test]
    fn test_status_error_mapping() {
        let not_found = status_error(
            StatusCode::NOT_FOUND,
            "faq",
            r#"{"error":{"type":"index_not_found_exception"}}"#.to_string(),
        );
        assert!(matches!(not_found, BackendError::IndexNotFound { ref index, .. } if index == "faq"));

        let rejected = status_error(
            StatusCode::BAD_REQUEST,
            "faq",
            r#"{"error":{"type":"parsing_exception"}}"#.to_string(),
        );
        assert!(matches!(rejected, BackendError::QueryRejected { status: 400, .. }));

        let unavailable = status_error(StatusCode::SERVICE_UNAVAILABLE, "faq", String::new());
        assert!(matches!(unavailable, BackendError::Unavailable { .. }));
    }

    #[test]
    fn test_get_response_parsing() {
        let parsed: GetResponse = serde_json::from_value(json!({
            "_index": "document",
            "_id": "abc",
            "_version": 1,
            "found": true,
            "_source": {"text": "hello"}
        }))
        .unwrap();
        assert!(parsed.found);
        assert_eq!(parsed.hit.id, "abc");
        assert_eq!(parsed.hit.score, None);
        assert_eq!(parsed.hit.source["text"], "hello");

        let missing: GetResponse =
            serde_json::from_value(json!({"_index": "document", "_id": "x", "found": false}))
                .unwrap();
        assert!(!missing.found);
    }

    #[test]
    fn test_scroll_response_parsing() {
        let parsed: SearchResponse = serde_json::from_value(json!({
            "_scroll_id": "c2Nyb2xs",
            "took": 3,
            "hits": {
                "total": {"value": 2, "relation": "eq"},
                "max_score": 1.0,
                "hits": [
                    {"_id": "a", "_score": 1.0, "_source": {}},
                    {"_id": "b", "_score": 1.0, "_source": {}}
                ]
            }
        }))
        .unwrap();
        assert_eq!(parsed.scroll_id.as_deref(), Some("c2Nyb2xs"));
        assert_eq!(parsed.hits.hits.len(), 2);
    }

    #[test]
    fn test_cluster_health_red_is_unavailable() {
        let green: ClusterHealth =
            serde_json::from_value(json!({"cluster_name": "docs", "status": "green"})).unwrap();
        assert!(green.ensure_serving().is_ok());

        let yellow: ClusterHealth = serde_json::from_value(
            json!({"cluster_name": "docs", "status": "yellow", "unassigned_shards": 1}),
        )
        .unwrap();
        assert!(yellow.ensure_serving().is_ok());

        let red: ClusterHealth = serde_json::from_value(
            json!({"cluster_name": "docs", "status": "red", "unassigned_shards": 4}),
        )
        .unwrap();
        let err = red.ensure_serving().unwrap_err();
        assert!(matches!(
            err,
            BackendError::Unavailable { ref message, .. } if message.contains("4 unassigned")
        ));
    }

    #[test]
    fn test_new_rejects_empty_node_list() {
        let err = ElasticsearchClient::new(ElasticsearchConfig {
            nodes: Vec::new(),
            ..Default::default()
        })
        .unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_index_not_found_names_requested_index() {
        let err = status_error(
            StatusCode::NOT_FOUND,
            "faq",
            r#"{"error":{"root_cause":[{"type":"index_not_found_exception"}]}}"#.to_string(),
        );
        assert!(matches!(err, BackendError::IndexNotFound { ref index, .. } if index == "faq"));
    }
}
