//! Result projection.
//!
//! Turns raw hits into `(paragraph text, metadata)` pairs. Text queries on
//! flat mappings keep the backend order; text queries on nested mappings
//! flatten inner hits across all outer hits, then re-rank by score and cut
//! to `top_k`. Embedding queries report the raw cosine similarity by
//! removing [`EMBEDDING_SCORE_OFFSET`].
//!
//! Metadata is built as a new record from the hit's source; the hit itself
//! is consumed and never mutated in place.

use serde::Serialize;
use serde_json::Value;

use crate::client::{Document, Hit};
use crate::fields::{FieldMapping, HitShape};
use crate::query::EMBEDDING_SCORE_OFFSET;

/// Extra source fields carried alongside the standard metadata.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ExtraMeta {
    /// Text queries: remaining source fields under a `custom_meta` key.
    Custom {
        /// The remaining fields.
        custom_meta: Document,
    },
    /// Embedding queries: remaining source fields merged into the record.
    Inline(Document),
}

impl ExtraMeta {
    /// The extra fields regardless of placement.
    pub fn fields(&self) -> &Document {
        match self {
            ExtraMeta::Custom { custom_meta } => custom_meta,
            ExtraMeta::Inline(fields) => fields,
        }
    }
}

/// Metadata of one projected paragraph.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParagraphMeta {
    /// Id of the hit the paragraph came from (the parent document for nested hits).
    pub paragraph_id: String,
    /// Value of the document id field.
    pub document_id: Value,
    /// Value of the document name field.
    pub document_name: Value,
    /// Relevance or similarity score.
    pub score: f64,
    /// Remaining source fields.
    #[serde(flatten)]
    pub extra: ExtraMeta,
}

/// A paragraph and its metadata.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectedResult {
    /// Paragraph text.
    pub text: String,
    /// Paragraph metadata.
    pub meta: ParagraphMeta,
}

/// Splits projected results into parallel text and metadata lists.
///
/// An empty input yields two empty lists.
pub fn unzip(results: Vec<ProjectedResult>) -> (Vec<String>, Vec<ParagraphMeta>) {
    results.into_iter().map(|r| (r.text, r.meta)).unzip()
}

/// Projects hits according to a field mapping.
#[derive(Debug, Clone, Copy)]
pub struct Projector<'a> {
    mapping: &'a FieldMapping,
}

impl<'a> Projector<'a> {
    /// Creates a projector for `mapping`.
    pub fn new(mapping: &'a FieldMapping) -> Self {
        Self { mapping }
    }

    /// Projects the hits of a text query.
    pub fn text_results(&self, hits: Vec<Hit>, top_k: usize) -> Vec<ProjectedResult> {
        match self.mapping.hit_shape() {
            HitShape::Flat => hits.into_iter().map(|hit| self.text_result(hit)).collect(),
            HitShape::Nested { path } => self.nested_results(hits, &path, top_k),
        }
    }

    /// Projects the hits of an embedding query.
    ///
    /// Document id and name are moved out of the extra fields; every other
    /// source field except the text is merged into the metadata.
    pub fn embedding_results(&self, hits: Vec<Hit>) -> Vec<ProjectedResult> {
        hits.into_iter()
            .map(|hit| {
                let Hit {
                    id, score, source, ..
                } = hit;
                let promoted = self.promote(source, &id);
                ProjectedResult {
                    text: promoted.text,
                    meta: ParagraphMeta {
                        paragraph_id: id,
                        document_id: promoted.document_id.unwrap_or(Value::Null),
                        document_name: promoted.document_name.unwrap_or(Value::Null),
                        score: score.unwrap_or_default() - EMBEDDING_SCORE_OFFSET,
                        extra: ExtraMeta::Inline(promoted.rest),
                    },
                }
            })
            .collect()
    }

    fn nested_results(&self, hits: Vec<Hit>, path: &str, top_k: usize) -> Vec<ProjectedResult> {
        let mut results: Vec<ProjectedResult> = Vec::new();
        for mut hit in hits {
            let inner = hit
                .inner_hits
                .remove(path)
                .map(|inner| inner.hits.hits)
                .unwrap_or_default();
            for inner_hit in inner {
                let Hit { score, source, .. } = inner_hit;
                results.push(self.custom_result(hit.id.clone(), score, source));
            }
        }

        // Inner hits from several outer hits exceed top_k once flattened.
        results.sort_by(|a, b| b.meta.score.total_cmp(&a.meta.score));
        results.truncate(top_k);
        results
    }

    fn text_result(&self, hit: Hit) -> ProjectedResult {
        let Hit {
            id, score, source, ..
        } = hit;
        self.custom_result(id, score, source)
    }

    fn custom_result(
        &self,
        paragraph_id: String,
        score: Option<f64>,
        source: Document,
    ) -> ProjectedResult {
        let document_id = source
            .get(self.mapping.doc_id_field())
            .cloned()
            .unwrap_or(Value::Null);
        let document_name = source
            .get(self.mapping.name_field())
            .cloned()
            .unwrap_or(Value::Null);
        let (text, custom_meta) = self.take_text(source, &paragraph_id);
        ProjectedResult {
            text,
            meta: ParagraphMeta {
                paragraph_id,
                document_id,
                document_name,
                score: score.unwrap_or_default(),
                extra: ExtraMeta::Custom { custom_meta },
            },
        }
    }

    fn take_text(&self, source: Document, paragraph_id: &str) -> (String, Document) {
        let mut text = None;
        let mut rest = Document::new();
        for (key, value) in source {
            if key == self.mapping.text_field() {
                text = Some(value);
            } else {
                rest.insert(key, value);
            }
        }
        (self.text_value(text, paragraph_id), rest)
    }

    fn promote(&self, source: Document, paragraph_id: &str) -> Promoted {
        let mut text = None;
        let mut promoted = Promoted::default();
        for (key, value) in source {
            if key == self.mapping.text_field() {
                text = Some(value);
            } else if key == self.mapping.doc_id_field() {
                promoted.document_id = Some(value);
            } else if key == self.mapping.name_field() {
                promoted.document_name = Some(value);
            } else {
                promoted.rest.insert(key, value);
            }
        }
        promoted.text = self.text_value(text, paragraph_id);
        promoted
    }

    fn text_value(&self, value: Option<Value>, paragraph_id: &str) -> String {
        match value {
            Some(Value::String(s)) => s,
            Some(Value::Null) | None => {
                tracing::warn!(
                    paragraph_id = %paragraph_id,
                    field = %self.mapping.text_field(),
                    "Hit has no text field"
                );
                String::new()
            }
            Some(other) => other.to_string(),
        }
    }
}

#[derive(Default)]
struct Promoted {
    text: String,
    document_id: Option<Value>,
    document_name: Option<Value>,
    rest: Document,
}
