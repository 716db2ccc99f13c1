//! Resolved field mapping.
//!
//! The text, name and document-id fields may be addressed with dotted paths
//! (`paragraphs.text`). When any of them is nested, all three must sit under
//! the same prefix, which becomes the nested path used by queries and result
//! projection. The mapping is resolved once, when a store is built, and is
//! immutable afterwards.

use serde_json::{Map, Value};

use crate::config::DocumentStoreConfig;
use crate::error::ConfigurationError;

/// Separator between the segments of a field path.
pub const PATH_SEPARATOR: char = '.';

/// How hits returned by text queries are shaped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HitShape {
    /// One hit per paragraph; fields live at the top of `_source`.
    Flat,
    /// Paragraphs are nested objects reported as inner hits under `path`.
    Nested {
        /// Path of the nested objects.
        path: String,
    },
}

/// The embedding vector field of a store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddingField {
    /// Field name.
    pub name: String,
    /// Vector dimensionality, when known.
    pub dim: Option<usize>,
}

/// Field configuration resolved from a [`DocumentStoreConfig`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMapping {
    text_field: String,
    name_field: String,
    doc_id_field: String,
    nested_path: String,
    search_fields: Vec<String>,
    tag_fields: Vec<String>,
    embedding: Option<EmbeddingField>,
    excluded_meta_fields: Vec<String>,
}

impl FieldMapping {
    /// Resolves the field mapping for `config`.
    ///
    /// Fails with [`ConfigurationError::NestedPathMismatch`] when the text,
    /// name and document-id paths do not share one prefix.
    pub fn from_config(config: &DocumentStoreConfig) -> Result<Self, ConfigurationError> {
        let text = split_path("text_field", &config.text_field)?;
        let name = split_path("name_field", &config.name_field)?;
        let doc_id = split_path("doc_id_field", &config.doc_id_field)?;

        let any_nested = text.len() > 1 || name.len() > 1 || doc_id.len() > 1;
        let text_prefix = &text[..text.len() - 1];
        if any_nested
            && !(text_prefix == &name[..name.len() - 1]
                && text_prefix == &doc_id[..doc_id.len() - 1])
        {
            return Err(ConfigurationError::NestedPathMismatch {
                text_field: config.text_field.clone(),
                name_field: config.name_field.clone(),
                doc_id_field: config.doc_id_field.clone(),
            });
        }

        if config.search_fields.is_empty() {
            return Err(ConfigurationError::NoSearchFields);
        }

        let embedding = match config.embedding_field.as_deref() {
            Some(name) if !name.is_empty() => Some(EmbeddingField {
                name: name.to_string(),
                dim: config.embedding_dim,
            }),
            _ => None,
        };

        Ok(Self {
            text_field: leaf(&text),
            name_field: leaf(&name),
            doc_id_field: leaf(&doc_id),
            nested_path: text_prefix.join(PATH_SEPARATOR.to_string().as_str()),
            search_fields: config.search_fields.clone(),
            tag_fields: config.tag_fields.clone(),
            embedding,
            excluded_meta_fields: config.excluded_meta_fields.clone(),
        })
    }

    /// Leaf name of the text field.
    pub fn text_field(&self) -> &str {
        &self.text_field
    }

    /// Leaf name of the document name field.
    pub fn name_field(&self) -> &str {
        &self.name_field
    }

    /// Leaf name of the document id field.
    pub fn doc_id_field(&self) -> &str {
        &self.doc_id_field
    }

    /// Whether the text, name and id fields live in nested objects.
    pub fn is_nested(&self) -> bool {
        !self.nested_path.is_empty()
    }

    /// Shared nested path, empty when the mapping is flat.
    pub fn nested_path(&self) -> &str {
        &self.nested_path
    }

    /// Shape of hits returned by text queries.
    pub fn hit_shape(&self) -> HitShape {
        if self.is_nested() {
            HitShape::Nested {
                path: self.nested_path.clone(),
            }
        } else {
            HitShape::Flat
        }
    }

    /// Prefixes `leaf` with the nested path, if any.
    pub fn qualified(&self, leaf: &str) -> String {
        if self.is_nested() {
            format!("{}{}{}", self.nested_path, PATH_SEPARATOR, leaf)
        } else {
            leaf.to_string()
        }
    }

    /// Fields searched by text queries.
    pub fn search_fields(&self) -> &[String] {
        &self.search_fields
    }

    /// Fields usable for tag filtering.
    pub fn tag_fields(&self) -> &[String] {
        &self.tag_fields
    }

    /// Checks that every key of a tag query is a configured tag field.
    pub fn check_tag_fields<'k, I>(&self, fields: I) -> Result<(), ConfigurationError>
    where
        I: IntoIterator<Item = &'k String>,
    {
        match fields
            .into_iter()
            .find(|field| !self.tag_fields.contains(*field))
        {
            Some(field) => Err(ConfigurationError::UnknownTagField {
                field: field.clone(),
                allowed: self.tag_fields.join(", "),
            }),
            None => Ok(()),
        }
    }

    /// The embedding field, if configured.
    pub fn embedding(&self) -> Option<&EmbeddingField> {
        self.embedding.as_ref()
    }

    /// Fields the backend omits from returned hits.
    pub fn excluded_meta_fields(&self) -> &[String] {
        &self.excluded_meta_fields
    }

    /// Reads a leaf field of the paragraph object inside a document source.
    ///
    /// For flat mappings this is a top-level lookup. For nested mappings the
    /// nested path is walked first; arrays resolve to their first element.
    pub fn read_field<'a>(&self, source: &'a Map<String, Value>, leaf: &str) -> Option<&'a Value> {
        if !self.is_nested() {
            return source.get(leaf);
        }
        let mut current = source;
        for segment in self.nested_path.split(PATH_SEPARATOR) {
            let next = current.get(segment)?;
            let next = match next {
                Value::Array(items) => items.first()?,
                other => other,
            };
            current = next.as_object()?;
        }
        current.get(leaf)
    }
}

fn split_path<'a>(role: &'static str, path: &'a str) -> Result<Vec<&'a str>, ConfigurationError> {
    let parts: Vec<&str> = path.split(PATH_SEPARATOR).collect();
    if parts.iter().any(|p| p.is_empty()) {
        return Err(ConfigurationError::InvalidFieldPath {
            role,
            path: path.to_string(),
        });
    }
    Ok(parts)
}

fn leaf(parts: &[&str]) -> String {
    parts.last().map(|s| s.to_string()).unwrap_or_default()
}
