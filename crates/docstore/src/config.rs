//! Document store configuration.
//!
//! [`DocumentStoreConfig`] holds the constructor-time options that decide
//! which index a store talks to and which (possibly nested) source fields
//! carry the paragraph text, the document name and the document id.
//!
//! # Example
//!
//! ```
//! use helios_docstore::DocumentStoreConfig;
//!
//! let config = DocumentStoreConfig {
//!     index: "paragraphs".to_string(),
//!     text_field: "sections.text".to_string(),
//!     name_field: "sections.name".to_string(),
//!     doc_id_field: "sections.document_id".to_string(),
//!     search_fields: vec!["sections.text".to_string()],
//!     ..Default::default()
//! };
//! assert_eq!(config.index, "paragraphs");
//! ```

use serde::{Deserialize, Serialize};

use crate::schema::IndexSchema;

/// Configuration for a [`DocumentStore`](crate::DocumentStore).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentStoreConfig {
    /// Index holding the documents (default: `"document"`).
    #[serde(default = "default_index")]
    pub index: String,

    /// Fields searched by text queries (default: `["text"]`).
    #[serde(default = "default_search_fields")]
    pub search_fields: Vec<String>,

    /// Field holding the paragraph text, dot-separated when nested (default: `"text"`).
    #[serde(default = "default_text_field")]
    pub text_field: String,

    /// Field holding the document name (default: `"name"`).
    #[serde(default = "default_name_field")]
    pub name_field: String,

    /// Field holding the document id (default: `"document_id"`).
    #[serde(default = "default_doc_id_field")]
    pub doc_id_field: String,

    /// Fields allowed as keys of tag queries; generated schemas map them as `keyword`.
    #[serde(default)]
    pub tag_fields: Vec<String>,

    /// Field holding the dense embedding vector, if any.
    #[serde(default)]
    pub embedding_field: Option<String>,

    /// Dimensionality of the embedding vector.
    #[serde(default)]
    pub embedding_dim: Option<usize>,

    /// Explicit index schema. When absent, one is generated from the field mapping.
    #[serde(default)]
    pub custom_mapping: Option<IndexSchema>,

    /// Source fields the backend should omit from returned hits.
    #[serde(default)]
    pub excluded_meta_fields: Vec<String>,
}

fn default_index() -> String {
    "document".to_string()
}

fn default_search_fields() -> Vec<String> {
    vec!["text".to_string()]
}

fn default_text_field() -> String {
    "text".to_string()
}

fn default_name_field() -> String {
    "name".to_string()
}

fn default_doc_id_field() -> String {
    "document_id".to_string()
}

impl Default for DocumentStoreConfig {
    fn default() -> Self {
        Self {
            index: default_index(),
            search_fields: default_search_fields(),
            text_field: default_text_field(),
            name_field: default_name_field(),
            doc_id_field: default_doc_id_field(),
            tag_fields: Vec::new(),
            embedding_field: None,
            embedding_dim: None,
            custom_mapping: None,
            excluded_meta_fields: Vec::new(),
        }
    }
}

impl DocumentStoreConfig {
    /// Sets the embedding field and its dimensionality.
    pub fn with_embedding(mut self, field: impl Into<String>, dim: usize) -> Self {
        self.embedding_field = Some(field.into());
        self.embedding_dim = Some(dim);
        self
    }

    /// Sets the fields omitted from returned hits.
    pub fn with_excluded_meta_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.excluded_meta_fields = fields.into_iter().map(Into::into).collect();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = DocumentStoreConfig::default();
        assert_eq!(config.index, "document");
        assert_eq!(config.search_fields, vec!["text"]);
        assert_eq!(config.text_field, "text");
        assert_eq!(config.name_field, "name");
        assert_eq!(config.doc_id_field, "document_id");
        assert!(config.embedding_field.is_none());
        assert!(config.custom_mapping.is_none());
    }

    #[test]
    fn test_config_deserialize_partial() {
        let config: DocumentStoreConfig = serde_json::from_str(
            r#"{"index": "faq", "embedding_field": "question_emb", "embedding_dim": 768}"#,
        )
        .unwrap();
        assert_eq!(config.index, "faq");
        assert_eq!(config.text_field, "text");
        assert_eq!(config.embedding_field.as_deref(), Some("question_emb"));
        assert_eq!(config.embedding_dim, Some(768));
    }

    #[test]
    fn test_with_embedding() {
        let config = DocumentStoreConfig::default().with_embedding("emb", 3);
        assert_eq!(config.embedding_field.as_deref(), Some("emb"));
        assert_eq!(config.embedding_dim, Some(3));
    }
}
