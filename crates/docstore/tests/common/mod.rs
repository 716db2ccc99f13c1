//! In-memory search client for integration tests.
//!
//! Evaluates the subset of the query DSL the store generates: `match_all`,
//! `bool`, `term`, `terms`, `multi_match` and `script_score` with cosine
//! similarity. Nested queries are answered from queued canned responses.

#![allow(dead_code)]

use std::collections::{BTreeMap, VecDeque};
use std::io;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use serde_json::{Map, Value, json};
use tracing_subscriber::fmt::MakeWriter;

use helios_docstore::{BackendError, Document, Hit, IndexCreation, SearchClient, SearchHits};

const BACKEND: &str = "mock";

#[derive(Debug, Default)]
struct MockIndex {
    body: Value,
    docs: Vec<(String, Document)>,
}

#[derive(Debug, Default)]
struct MockState {
    indices: BTreeMap<String, MockIndex>,
    next_id: u64,
    requests: usize,
    index_attempts: usize,
    create_calls: usize,
    searches: Vec<Value>,
    canned: VecDeque<Vec<Hit>>,
    fail_writes_where: Option<(String, Value)>,
    scan_batch_size: usize,
    scan_batches_served: usize,
    unavailable: bool,
}

#[derive(Debug, Clone)]
pub struct MockSearchClient {
    state: Arc<Mutex<MockState>>,
}

impl Default for MockSearchClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MockSearchClient {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                scan_batch_size: 2,
                ..Default::default()
            })),
        }
    }

    /// Stores `source` under `id` without counting it as a request.
    pub fn insert(&self, index: &str, id: &str, source: Value) {
        let mut state = self.state.lock().unwrap();
        let docs = &mut state.indices.entry(index.to_string()).or_default().docs;
        docs.retain(|(existing, _)| existing != id);
        docs.push((id.to_string(), into_document(source)));
    }

    /// Makes every write whose `field` equals `value` fail.
    pub fn fail_writes_where(&self, field: &str, value: Value) {
        self.state.lock().unwrap().fail_writes_where = Some((field.to_string(), value));
    }

    /// Queues hits returned verbatim by the next search.
    pub fn push_canned(&self, hits: Vec<Hit>) {
        self.state.lock().unwrap().canned.push_back(hits);
    }

    pub fn set_scan_batch_size(&self, size: usize) {
        self.state.lock().unwrap().scan_batch_size = size;
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.state.lock().unwrap().unavailable = unavailable;
    }

    pub fn requests(&self) -> usize {
        self.state.lock().unwrap().requests
    }

    pub fn index_attempts(&self) -> usize {
        self.state.lock().unwrap().index_attempts
    }

    pub fn create_calls(&self) -> usize {
        self.state.lock().unwrap().create_calls
    }

    pub fn scan_batches_served(&self) -> usize {
        self.state.lock().unwrap().scan_batches_served
    }

    pub fn last_search(&self) -> Option<Value> {
        self.state.lock().unwrap().searches.last().cloned()
    }

    pub fn index_body(&self, index: &str) -> Option<Value> {
        let state = self.state.lock().unwrap();
        state.indices.get(index).map(|i| i.body.clone())
    }

    pub fn stored(&self, index: &str) -> Vec<Document> {
        let state = self.state.lock().unwrap();
        state
            .indices
            .get(index)
            .map(|i| i.docs.iter().map(|(_, d)| d.clone()).collect())
            .unwrap_or_default()
    }
}

fn into_document(source: Value) -> Document {
    match source {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

fn not_found(index: &str) -> BackendError {
    BackendError::IndexNotFound {
        backend_name: BACKEND.to_string(),
        index: index.to_string(),
    }
}

fn field_matches(doc: &Document, field: &str, wanted: &Value) -> bool {
    match doc.get(field) {
        Some(Value::Array(items)) => items.contains(wanted),
        Some(value) => value == wanted,
        None => false,
    }
}

/// Term match against a `text` field: the stored value is lowercased and
/// split into tokens, the wanted value is not analyzed.
fn analyzed_matches(doc: &Document, field: &str, wanted: &Value) -> bool {
    let (Some(Value::String(stored)), Some(wanted)) = (doc.get(field), wanted.as_str()) else {
        return field_matches(doc, field, wanted);
    };
    stored
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .any(|token| token == wanted)
}

fn cosine(a: &[f64], b: &[f64]) -> f64 {
    let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm = |v: &[f64]| v.iter().map(|x| x * x).sum::<f64>().sqrt();
    dot / (norm(a) * norm(b))
}

fn floats(value: &Value) -> Vec<f64> {
    value
        .as_array()
        .map(|items| items.iter().filter_map(Value::as_f64).collect())
        .unwrap_or_default()
}

/// Returns the score of `doc` under `query`, or `None` when it does not match.
fn evaluate(query: &Value, id: &str, doc: &Document) -> Option<f64> {
    let (kind, clause) = query.as_object()?.iter().next()?;
    match kind.as_str() {
        "match_all" => Some(1.0),
        "term" => {
            let (field, wanted) = clause.as_object()?.iter().next()?;
            let hit = match field.strip_suffix(".keyword") {
                Some(keyword) => field_matches(doc, keyword, wanted),
                None => analyzed_matches(doc, field, wanted),
            };
            hit.then_some(1.0)
        }
        "terms" => {
            let (field, wanted) = clause.as_object()?.iter().next()?;
            let wanted = wanted.as_array()?;
            let hit = if field == "_id" {
                wanted.iter().any(|w| w.as_str() == Some(id))
            } else {
                wanted.iter().any(|w| field_matches(doc, field, w))
            };
            hit.then_some(1.0)
        }
        "multi_match" => {
            let text = clause["query"].as_str()?.to_lowercase();
            let fields = clause["fields"].as_array()?;
            let mut score = 0.0;
            for token in text.split_whitespace() {
                for field in fields.iter().filter_map(Value::as_str) {
                    if let Some(Value::String(value)) = doc.get(field) {
                        if value.to_lowercase().contains(token) {
                            score += 1.0;
                        }
                    }
                }
            }
            (score > 0.0).then_some(score)
        }
        "bool" => {
            let clauses = |key: &str| clause[key].as_array().cloned().unwrap_or_default();
            let (must, filter, should) = (clauses("must"), clauses("filter"), clauses("should"));
            let mut score = 0.0;
            for q in &must {
                score += evaluate(q, id, doc)?;
            }
            for q in &filter {
                evaluate(q, id, doc)?;
            }
            let should_scores: Vec<f64> =
                should.iter().filter_map(|q| evaluate(q, id, doc)).collect();
            if must.is_empty() && filter.is_empty() && should_scores.is_empty() {
                return None;
            }
            if must.is_empty() && !should.is_empty() && should_scores.is_empty() {
                return None;
            }
            Some(score + should_scores.iter().sum::<f64>())
        }
        "script_score" => {
            evaluate(&clause["query"], id, doc)?;
            let source = clause["script"]["source"].as_str()?;
            let start = source.find("doc['")? + 5;
            let end = start + source[start..].find("']")?;
            let stored = floats(doc.get(&source[start..end])?);
            let query_vector = floats(&clause["script"]["params"]["query_vector"]);
            Some(cosine(&query_vector, &stored) + 1.0)
        }
        _ => None,
    }
}

#[async_trait]
impl SearchClient for MockSearchClient {
    fn backend_name(&self) -> &'static str {
        BACKEND
    }

    async fn search(&self, index: &str, body: &Value) -> Result<SearchHits, BackendError> {
        let mut state = self.state.lock().unwrap();
        state.requests += 1;
        state.searches.push(body.clone());
        if let Some(hits) = state.canned.pop_front() {
            return Ok(SearchHits::from_hits(hits));
        }

        let docs = &state.indices.get(index).ok_or_else(|| not_found(index))?.docs;
        let mut hits: Vec<Hit> = docs
            .iter()
            .filter_map(|(id, doc)| {
                evaluate(&body["query"], id, doc).map(|score| {
                    let source = if body["_source"] == json!(false) {
                        Map::new()
                    } else {
                        let mut source = doc.clone();
                        for excluded in strings(&body["_source"]["excludes"]) {
                            source.remove(&excluded);
                        }
                        source
                    };
                    Hit {
                        id: id.clone(),
                        score: Some(score),
                        source,
                        inner_hits: BTreeMap::new(),
                    }
                })
            })
            .collect();
        hits.sort_by(|a, b| b.score.unwrap_or(0.0).total_cmp(&a.score.unwrap_or(0.0)));
        if let Some(size) = body["size"].as_u64() {
            hits.truncate(size as usize);
        }
        Ok(SearchHits::from_hits(hits))
    }

    async fn get(&self, index: &str, id: &str) -> Result<Option<Hit>, BackendError> {
        let mut state = self.state.lock().unwrap();
        state.requests += 1;
        let docs = &state.indices.get(index).ok_or_else(|| not_found(index))?.docs;
        Ok(docs
            .iter()
            .find(|(existing, _)| existing == id)
            .map(|(id, doc)| Hit {
                id: id.clone(),
                score: None,
                source: doc.clone(),
                inner_hits: BTreeMap::new(),
            }))
    }

    async fn index(&self, index: &str, document: Document) -> Result<(), BackendError> {
        let mut state = self.state.lock().unwrap();
        state.requests += 1;
        state.index_attempts += 1;
        if let Some((ref field, ref value)) = state.fail_writes_where {
            if document.get(field) == Some(value) {
                return Err(BackendError::QueryRejected {
                    backend_name: BACKEND.to_string(),
                    status: 400,
                    message: "mapper_parsing_exception".to_string(),
                });
            }
        }
        state.next_id += 1;
        let id = format!("auto-{}", state.next_id);
        state
            .indices
            .entry(index.to_string())
            .or_default()
            .docs
            .push((id, document));
        Ok(())
    }

    async fn count(&self, index: &str) -> Result<u64, BackendError> {
        let mut state = self.state.lock().unwrap();
        state.requests += 1;
        let index = state.indices.get(index).ok_or_else(|| not_found(index))?;
        Ok(index.docs.len() as u64)
    }

    async fn create_index(
        &self,
        index: &str,
        body: &Value,
    ) -> Result<IndexCreation, BackendError> {
        let mut state = self.state.lock().unwrap();
        state.requests += 1;
        state.create_calls += 1;
        if state.indices.contains_key(index) {
            return Ok(IndexCreation::AlreadyExists);
        }
        state.indices.insert(
            index.to_string(),
            MockIndex {
                body: body.clone(),
                docs: Vec::new(),
            },
        );
        Ok(IndexCreation::Created)
    }

    fn scan<'a>(
        &'a self,
        index: &'a str,
        query: Value,
    ) -> BoxStream<'a, Result<Vec<Hit>, BackendError>> {
        stream::unfold(Some(0usize), move |offset| {
            let query = query.clone();
            async move {
                let Some(offset) = offset else {
                    return None;
                };
                let mut state = self.state.lock().unwrap();
                if offset == 0 {
                    state.requests += 1;
                }
                let batch_size = state.scan_batch_size;
                let docs = match state.indices.get(index) {
                    Some(i) => &i.docs,
                    None => return Some((Err(not_found(index)), None)),
                };
                let batch: Vec<Hit> = docs
                    .iter()
                    .filter(|(id, doc)| evaluate(&query["query"], id, doc).is_some())
                    .skip(offset)
                    .take(batch_size)
                    .map(|(id, doc)| Hit {
                        id: id.clone(),
                        score: Some(1.0),
                        source: doc.clone(),
                        inner_hits: BTreeMap::new(),
                    })
                    .collect();
                if batch.is_empty() {
                    return None;
                }
                state.scan_batches_served += 1;
                let next = offset + batch.len();
                Some((Ok(batch), Some(next)))
            }
        })
        .boxed()
    }

    async fn refresh(&self, index: &str) -> Result<(), BackendError> {
        let mut state = self.state.lock().unwrap();
        state.requests += 1;
        state
            .indices
            .get(index)
            .map(|_| ())
            .ok_or_else(|| not_found(index))
    }

    async fn health_check(&self) -> Result<(), BackendError> {
        let state = self.state.lock().unwrap();
        if state.unavailable {
            return Err(BackendError::Unavailable {
                backend_name: BACKEND.to_string(),
                message: "cluster status is red".to_string(),
            });
        }
        Ok(())
    }
}

fn strings(value: &Value) -> Vec<String> {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

/// Shared buffer capturing formatted log output.
#[derive(Debug, Clone, Default)]
pub struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl LogBuffer {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }

    /// Number of captured lines containing `needle`.
    pub fn count_lines(&self, needle: &str) -> usize {
        self.contents().lines().filter(|l| l.contains(needle)).count()
    }
}

impl io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogBuffer {
    type Writer = LogBuffer;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Installs a subscriber writing into a fresh buffer for the current thread.
pub fn capture_logs() -> (LogBuffer, tracing::subscriber::DefaultGuard) {
    let buffer = LogBuffer::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(buffer.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::DEBUG)
        .finish();
    let guard = tracing::subscriber::set_default(subscriber);
    (buffer, guard)
}
