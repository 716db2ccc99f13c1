//! The search engine collaborator.
//!
//! [`SearchClient`] is the seam between the document store and the remote
//! search engine. The store builds query bodies and interprets hits; the
//! client only moves them over the wire. Transport, connection pooling,
//! authentication and scroll pagination are the client's concern.

use std::collections::BTreeMap;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::BackendError;

/// A document as written to the backend: an opaque field map.
pub type Document = Map<String, Value>;

/// A single hit returned by the backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Hit {
    /// Backend-assigned document id.
    #[serde(rename = "_id", default)]
    pub id: String,

    /// Relevance score; absent for filter-only queries.
    #[serde(rename = "_score", default)]
    pub score: Option<f64>,

    /// Stored source fields.
    #[serde(rename = "_source", default)]
    pub source: Document,

    /// Inner hits of nested queries, keyed by nested path.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub inner_hits: BTreeMap<String, InnerHits>,
}

impl Hit {
    /// Creates a hit with the given id, score and source.
    pub fn new(id: impl Into<String>, score: f64, source: Value) -> Self {
        Self {
            id: id.into(),
            score: Some(score),
            source: match source {
                Value::Object(map) => map,
                _ => Map::new(),
            },
            inner_hits: BTreeMap::new(),
        }
    }

    /// Attaches inner hits under `path`.
    pub fn with_inner_hits(mut self, path: impl Into<String>, hits: Vec<Hit>) -> Self {
        self.inner_hits.insert(
            path.into(),
            InnerHits {
                hits: SearchHits {
                    total: None,
                    max_score: None,
                    hits,
                },
            },
        );
        self
    }

    /// Returns the inner hits recorded for `path`, or an empty slice.
    pub fn inner(&self, path: &str) -> &[Hit] {
        self.inner_hits
            .get(path)
            .map(|inner| inner.hits.hits.as_slice())
            .unwrap_or_default()
    }
}

/// Inner hits for one nested path.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InnerHits {
    /// The matched nested objects.
    pub hits: SearchHits,
}

/// Total hit count as reported by the backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TotalHits {
    /// Number of matching documents.
    pub value: u64,
    /// `eq` for exact totals, `gte` for lower bounds.
    #[serde(default)]
    pub relation: String,
}

/// The `hits` section of a search response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchHits {
    /// Total matches.
    #[serde(default)]
    pub total: Option<TotalHits>,
    /// Highest score among the hits.
    #[serde(default)]
    pub max_score: Option<f64>,
    /// The hits, in backend order.
    #[serde(default)]
    pub hits: Vec<Hit>,
}

impl SearchHits {
    /// Wraps a list of hits.
    pub fn from_hits(hits: Vec<Hit>) -> Self {
        Self {
            total: Some(TotalHits {
                value: hits.len() as u64,
                relation: "eq".to_string(),
            }),
            max_score: hits.iter().filter_map(|h| h.score).reduce(f64::max),
            hits,
        }
    }
}

/// Outcome of an idempotent index creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexCreation {
    /// The index was created by this call.
    Created,
    /// The index existed already; nothing was changed.
    AlreadyExists,
}

/// Operations the document store needs from a search engine.
#[async_trait]
pub trait SearchClient: Send + Sync {
    /// Name used in logs and errors.
    fn backend_name(&self) -> &'static str;

    /// Executes a search request body against `index`.
    async fn search(&self, index: &str, body: &Value) -> Result<SearchHits, BackendError>;

    /// Fetches a single document by its backend id.
    async fn get(&self, index: &str, id: &str) -> Result<Option<Hit>, BackendError>;

    /// Writes one document. Ownership moves to the backend.
    async fn index(&self, index: &str, document: Document) -> Result<(), BackendError>;

    /// Counts the documents in `index`.
    async fn count(&self, index: &str) -> Result<u64, BackendError>;

    /// Creates `index` with the given body unless it already exists.
    async fn create_index(&self, index: &str, body: &Value)
    -> Result<IndexCreation, BackendError>;

    /// Iterates every hit matching `query`, one batch at a time.
    ///
    /// Batches are fetched on demand; dropping the stream stops the scan.
    fn scan<'a>(
        &'a self,
        index: &'a str,
        query: Value,
    ) -> BoxStream<'a, Result<Vec<Hit>, BackendError>>;

    /// Makes recent writes visible to search.
    async fn refresh(&self, index: &str) -> Result<(), BackendError>;

    /// Verifies that the backend is serving requests.
    async fn health_check(&self) -> Result<(), BackendError>;
}
