//! The document store facade.
//!
//! [`DocumentStore`] composes the field mapping, query builder and result
//! projector over a [`SearchClient`]. It holds no mutable state: every call
//! builds its own request body and projects its own hits, so one store can
//! be shared across concurrent callers.

use std::collections::BTreeMap;

use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use serde::Serialize;
use serde_json::Value;

use crate::client::{Document, Hit, IndexCreation, SearchClient};
use crate::config::DocumentStoreConfig;
use crate::error::{StoreError, StoreResult};
use crate::fields::FieldMapping;
use crate::projection::{ParagraphMeta, Projector, unzip};
use crate::query::QueryBuilder;
use crate::schema::{IndexSchema, ensure_index};

/// Maximum number of document writes in flight at once.
pub const WRITE_CONCURRENCY: usize = 16;

/// Parallel paragraph texts and metadata, in rank order.
pub type Paragraphs = (Vec<String>, Vec<ParagraphMeta>);

/// A stored document as read back by id, name or full scan.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentRecord {
    /// Value of the document id field.
    pub id: Value,
    /// Value of the name field.
    pub name: Value,
    /// Value of the text field.
    pub text: Value,
}

/// Paragraph-level document store over a search engine.
#[derive(Debug)]
pub struct DocumentStore<C> {
    client: C,
    config: DocumentStoreConfig,
    mapping: FieldMapping,
    schema: IndexSchema,
    name_lookup: String,
}

impl<C: SearchClient> DocumentStore<C> {
    /// Creates a store, resolving the field mapping and index schema.
    ///
    /// Nested-path and embedding configuration errors surface here, before
    /// any request is sent. The index itself is not touched; call
    /// [`initialize`](Self::initialize) to create it.
    pub fn new(client: C, config: DocumentStoreConfig) -> StoreResult<Self> {
        let mapping = FieldMapping::from_config(&config)?;
        let schema = match config.custom_mapping {
            Some(ref schema) => schema.clone(),
            None => IndexSchema::from_mapping(&mapping)?,
        };
        let name_lookup = schema.exact_match_field(&mapping, mapping.name_field());
        Ok(Self {
            client,
            config,
            mapping,
            schema,
            name_lookup,
        })
    }

    /// Creates the index if it does not exist yet.
    pub async fn initialize(&self) -> StoreResult<IndexCreation> {
        ensure_index(&self.client, self.index(), &self.schema).await
    }

    /// Name of the index this store reads and writes.
    pub fn index(&self) -> &str {
        &self.config.index
    }

    /// The resolved field mapping.
    pub fn mapping(&self) -> &FieldMapping {
        &self.mapping
    }

    /// The schema used when creating the index.
    pub fn schema(&self) -> &IndexSchema {
        &self.schema
    }

    /// The underlying search client.
    pub fn client(&self) -> &C {
        &self.client
    }

    fn queries(&self) -> QueryBuilder<'_> {
        QueryBuilder::new(&self.mapping, self.index())
    }

    fn record(&self, hit: &Hit) -> DocumentRecord {
        let read = |leaf: &str| {
            self.mapping
                .read_field(&hit.source, leaf)
                .cloned()
                .unwrap_or(Value::Null)
        };
        DocumentRecord {
            id: read(self.mapping.doc_id_field()),
            name: read(self.mapping.name_field()),
            text: read(self.mapping.text_field()),
        }
    }

    /// Fetches a document by its backend id.
    pub async fn get_by_id(&self, id: &str) -> StoreResult<Option<DocumentRecord>> {
        let hit = self.client.get(self.index(), id).await?;
        Ok(hit.map(|hit| self.record(&hit)))
    }

    /// Fetches the first document whose name field equals `name`.
    ///
    /// Matching is exact against the keyword form of the name field when the
    /// schema has one.
    pub async fn get_by_name(&self, name: &str) -> StoreResult<Option<DocumentRecord>> {
        let body = self.queries().name_query(&self.name_lookup, name);
        tracing::debug!(index = %self.index(), body = %body, "Name lookup");
        let hits = self.client.search(self.index(), &body).await?;
        Ok(hits.hits.first().map(|hit| self.record(hit)))
    }

    /// Returns the ids of documents matching every tag field.
    ///
    /// Each field matches when it holds any of the listed values. At most
    /// [`MAX_TAG_RESULTS`](crate::query::MAX_TAG_RESULTS) ids are returned.
    /// An empty tag map matches nothing and sends no request. Keys outside
    /// the configured tag fields fail with a configuration error before any
    /// request is sent.
    pub async fn get_ids_by_tags(
        &self,
        tags: &BTreeMap<String, Vec<Value>>,
    ) -> StoreResult<Vec<String>> {
        if tags.is_empty() {
            return Ok(Vec::new());
        }
        self.mapping.check_tag_fields(tags.keys())?;
        let body = self.queries().tag_query(tags);
        tracing::debug!(index = %self.index(), body = %body, "Tag query");
        let hits = self.client.search(self.index(), &body).await?;
        Ok(hits.hits.into_iter().map(|hit| hit.id).collect())
    }

    /// Writes documents independently of each other.
    ///
    /// A failed write is logged and skipped; the remaining documents are
    /// still written. Writes may complete in any order and the caller is
    /// not told how many succeeded.
    pub async fn write_documents<I>(&self, documents: I)
    where
        I: IntoIterator<Item = Document>,
    {
        let index = self.index();
        stream::iter(documents)
            .for_each_concurrent(WRITE_CONCURRENCY, |document| async move {
                let document_id = self
                    .mapping
                    .read_field(&document, self.mapping.doc_id_field())
                    .cloned();
                if let Err(e) = self.client.index(index, document).await {
                    tracing::error!(
                        index = %index,
                        document_id = ?document_id,
                        error = %e,
                        "Failed to index document"
                    );
                }
            })
            .await;
    }

    /// Counts the documents in this store's index.
    pub async fn count(&self) -> StoreResult<u64> {
        Ok(self.client.count(self.index()).await?)
    }

    /// Streams every document in the index.
    ///
    /// Batches are fetched as the stream is polled; dropping it stops the scan.
    pub fn get_all(&self) -> BoxStream<'_, StoreResult<DocumentRecord>> {
        let query = self.queries().match_all();
        self.client
            .scan(self.index(), query)
            .map_err(StoreError::from)
            .map_ok(move |hits| {
                stream::iter(
                    hits.into_iter()
                        .map(move |hit| Ok::<_, StoreError>(self.record(&hit))),
                )
            })
            .try_flatten()
            .boxed()
    }

    /// Runs a text query and returns the top `top_k` paragraphs.
    ///
    /// `candidate_ids` restricts the search to those ids; `None` or an empty
    /// slice leaves it unrestricted.
    pub async fn query(
        &self,
        query: &str,
        top_k: usize,
        candidate_ids: Option<&[String]>,
    ) -> StoreResult<Paragraphs> {
        let body = self.queries().text_query(query, top_k, candidate_ids);
        tracing::debug!(index = %self.index(), body = %body, "Text query");
        let hits = self.client.search(self.index(), &body).await?;
        let results = Projector::new(&self.mapping).text_results(hits.hits, top_k);
        Ok(unzip(results))
    }

    /// Runs a cosine-similarity query against the embedding field.
    ///
    /// Fails with a configuration error, without contacting the backend,
    /// when the store has no embedding field.
    pub async fn query_by_embedding(
        &self,
        embedding: &[f32],
        top_k: usize,
        candidate_ids: Option<&[String]>,
    ) -> StoreResult<Paragraphs> {
        let body = self
            .queries()
            .embedding_query(embedding, top_k, candidate_ids)?;
        tracing::debug!(
            index = %self.index(),
            dims = embedding.len(),
            "Embedding query"
        );
        let hits = self.client.search(self.index(), &body).await?;
        let results = Projector::new(&self.mapping).embedding_results(hits.hits);
        Ok(unzip(results))
    }

    /// Makes recent writes visible to queries.
    pub async fn refresh(&self) -> StoreResult<()> {
        Ok(self.client.refresh(self.index()).await?)
    }

    /// Checks that the backend is reachable.
    pub async fn health_check(&self) -> StoreResult<()> {
        Ok(self.client.health_check().await?)
    }
}
