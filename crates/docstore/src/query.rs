//! Query DSL builder.
//!
//! Translates caller requests (text queries, embedding vectors, tag
//! filters, name lookups) into search request bodies for the configured
//! field mapping.

use std::collections::BTreeMap;

use serde_json::{Value, json};

use crate::error::ConfigurationError;
use crate::fields::FieldMapping;

/// Number of results returned when the caller does not specify one.
pub const DEFAULT_TOP_K: usize = 10;

/// Upper bound on the ids returned by a tag query.
///
/// Documents matching beyond this bound are not returned.
pub const MAX_TAG_RESULTS: usize = 10_000;

/// Constant added to cosine similarity so script scores are never negative.
///
/// Result projection subtracts it again; both sides must use this constant.
pub const EMBEDDING_SCORE_OFFSET: f64 = 1.0;

/// Builds search request bodies for one field mapping.
#[derive(Debug, Clone, Copy)]
pub struct QueryBuilder<'a> {
    mapping: &'a FieldMapping,
    index: &'a str,
}

impl<'a> QueryBuilder<'a> {
    /// Creates a builder for `index`.
    pub fn new(mapping: &'a FieldMapping, index: &'a str) -> Self {
        Self { mapping, index }
    }

    /// Builds a multi-field text query.
    ///
    /// Candidate ids become a non-scoring `terms` filter on `_id`; an empty
    /// or absent candidate set adds no filter. Nested mappings wrap the whole
    /// clause in a `nested` query that requests inner hits.
    pub fn text_query(&self, query: &str, top_k: usize, candidate_ids: Option<&[String]>) -> Value {
        let mut clause = json!({
            "bool": {
                "should": [{
                    "multi_match": {
                        "query": query,
                        "type": "most_fields",
                        "fields": self.mapping.search_fields()
                    }
                }]
            }
        });

        if let Some(ids) = non_empty(candidate_ids) {
            clause["bool"]["filter"] = json!([ids_filter(ids)]);
        }

        if self.mapping.is_nested() {
            clause = json!({
                "nested": {
                    "path": self.mapping.nested_path(),
                    "query": clause,
                    "inner_hits": {}
                }
            });
        }

        self.envelope(clause, top_k)
    }

    /// Builds a script-scored cosine similarity query.
    ///
    /// Scores are `cosineSimilarity + 1.0`; see [`EMBEDDING_SCORE_OFFSET`].
    /// Fails before any request is made when no embedding field is configured.
    pub fn embedding_query(
        &self,
        vector: &[f32],
        top_k: usize,
        candidate_ids: Option<&[String]>,
    ) -> Result<Value, ConfigurationError> {
        let embedding =
            self.mapping
                .embedding()
                .ok_or_else(|| ConfigurationError::EmbeddingFieldMissing {
                    index: self.index.to_string(),
                })?;

        let base = match non_empty(candidate_ids) {
            Some(ids) => json!({
                "bool": {
                    "should": [{ "match_all": {} }],
                    "filter": [ids_filter(ids)]
                }
            }),
            None => json!({ "match_all": {} }),
        };

        let clause = json!({
            "script_score": {
                "query": base,
                "script": {
                    "source": format!(
                        "cosineSimilarity(params.query_vector, doc['{}']) + {:.1}",
                        embedding.name, EMBEDDING_SCORE_OFFSET
                    ),
                    "params": { "query_vector": vector }
                }
            }
        });

        Ok(self.envelope(clause, top_k))
    }

    /// Builds a query matching documents whose tag fields hold any of the given values.
    ///
    /// Every tag field must match (`must` across fields); the result size is
    /// capped at [`MAX_TAG_RESULTS`].
    pub fn tag_query(&self, tags: &BTreeMap<String, Vec<Value>>) -> Value {
        let terms: Vec<Value> = tags
            .iter()
            .map(|(field, values)| json!({ "terms": { field: values } }))
            .collect();

        json!({
            "size": MAX_TAG_RESULTS,
            "_source": false,
            "query": { "bool": { "must": terms } }
        })
    }

    /// Builds a single-hit exact lookup of `name` on `field`.
    ///
    /// `field` is the qualified exact-match path of the name field, usually
    /// resolved with [`IndexSchema::exact_match_field`](crate::schema::IndexSchema::exact_match_field).
    pub fn name_query(&self, field: &str, name: &str) -> Value {
        let mut clause = json!({ "term": { field: name } });
        if self.mapping.is_nested() {
            clause = json!({
                "nested": {
                    "path": self.mapping.nested_path(),
                    "query": clause
                }
            });
        }
        json!({
            "size": 1,
            "query": { "bool": { "filter": [clause] } }
        })
    }

    /// Builds the query used to scan the whole index.
    pub fn match_all(&self) -> Value {
        json!({ "query": { "match_all": {} } })
    }

    fn envelope(&self, clause: Value, top_k: usize) -> Value {
        let mut body = json!({
            "size": top_k,
            "query": clause
        });
        let excluded = self.mapping.excluded_meta_fields();
        if !excluded.is_empty() {
            body["_source"] = json!({ "excludes": excluded });
        }
        body
    }
}

fn non_empty(ids: Option<&[String]>) -> Option<&[String]> {
    ids.filter(|ids| !ids.is_empty())
}

fn ids_filter(ids: &[String]) -> Value {
    json!({ "terms": { "_id": ids } })
}
