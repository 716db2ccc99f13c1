//! Index schema definitions.
//!
//! An [`IndexSchema`] maps field names to backend field types. Stores either
//! take one from configuration or generate one from their [`FieldMapping`]:
//! `text` fields for the name, text and id fields (inside a `nested` object
//! when the mapping is nested, the name with a `keyword` sub-field for exact
//! lookups), `keyword` tag fields and a `dense_vector` for the embedding field.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::client::{IndexCreation, SearchClient};
use crate::error::{ConfigurationError, StoreResult};
use crate::fields::FieldMapping;

/// Sub-field name under which generated schemas index the name as a keyword.
pub const KEYWORD_SUBFIELD: &str = "keyword";

/// Type and options of one mapped field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSchema {
    /// Backend field type (`text`, `keyword`, `dense_vector`, `nested`, ...).
    #[serde(rename = "type")]
    pub field_type: String,

    /// Vector dimensionality for `dense_vector` fields.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dims: Option<usize>,

    /// Sub-fields of `nested` and `object` fields.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, FieldSchema>,

    /// Any other mapping options (analyzers, multi-fields, ...), passed through verbatim.
    #[serde(flatten)]
    pub options: Map<String, Value>,
}

impl FieldSchema {
    fn of_type(field_type: &str) -> Self {
        Self {
            field_type: field_type.to_string(),
            dims: None,
            properties: BTreeMap::new(),
            options: Map::new(),
        }
    }

    /// An analyzed text field.
    pub fn text() -> Self {
        Self::of_type("text")
    }

    /// An analyzed text field with an exact-match `keyword` sub-field.
    pub fn text_with_keyword() -> Self {
        let mut field = Self::text();
        field.options.insert(
            "fields".to_string(),
            json!({ KEYWORD_SUBFIELD: { "type": "keyword" } }),
        );
        field
    }

    /// An exact-match keyword field.
    pub fn keyword() -> Self {
        Self::of_type("keyword")
    }

    /// A dense vector of `dims` dimensions.
    pub fn dense_vector(dims: usize) -> Self {
        Self {
            dims: Some(dims),
            ..Self::of_type("dense_vector")
        }
    }

    /// A nested object with the given sub-fields.
    pub fn nested(properties: BTreeMap<String, FieldSchema>) -> Self {
        Self {
            properties,
            ..Self::of_type("nested")
        }
    }
}

/// Field mapping of an index, plus optional index settings.
///
/// Deserializes from either the bare mapping (`{"properties": ...}`) or a
/// full index-creation body (`{"mappings": {"properties": ...}}`); unknown
/// keys are rejected in both shapes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "SchemaDocument")]
pub struct IndexSchema {
    /// Mapped fields by name.
    #[serde(default)]
    pub properties: BTreeMap<String, FieldSchema>,

    /// Index settings sent with the create request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<Value>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct CreateBody {
    mappings: Mappings,
    #[serde(default)]
    settings: Option<Value>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct Mappings {
    #[serde(default)]
    properties: BTreeMap<String, FieldSchema>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct BareMapping {
    #[serde(default)]
    properties: BTreeMap<String, FieldSchema>,
    #[serde(default)]
    settings: Option<Value>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SchemaDocument {
    CreateBody(CreateBody),
    Bare(BareMapping),
}

impl From<SchemaDocument> for IndexSchema {
    fn from(document: SchemaDocument) -> Self {
        match document {
            SchemaDocument::CreateBody(body) => Self {
                properties: body.mappings.properties,
                settings: body.settings,
            },
            SchemaDocument::Bare(mapping) => Self {
                properties: mapping.properties,
                settings: mapping.settings,
            },
        }
    }
}

impl IndexSchema {
    /// Generates the default schema for a field mapping.
    ///
    /// Fails when an embedding field is configured without a dimension.
    pub fn from_mapping(mapping: &FieldMapping) -> Result<Self, ConfigurationError> {
        let mut leaves = BTreeMap::new();
        leaves.insert(
            mapping.name_field().to_string(),
            FieldSchema::text_with_keyword(),
        );
        leaves.insert(mapping.text_field().to_string(), FieldSchema::text());
        leaves.insert(mapping.doc_id_field().to_string(), FieldSchema::text());

        let mut properties = if mapping.is_nested() {
            let mut top = BTreeMap::new();
            top.insert(
                mapping.nested_path().to_string(),
                FieldSchema::nested(leaves),
            );
            top
        } else {
            leaves
        };

        if let Some(embedding) = mapping.embedding() {
            let dims = match embedding.dim {
                Some(dims) if dims > 0 => dims,
                _ => {
                    return Err(ConfigurationError::EmbeddingDimMissing {
                        field: embedding.name.clone(),
                    });
                }
            };
            properties.insert(embedding.name.clone(), FieldSchema::dense_vector(dims));
        }

        for tag in mapping.tag_fields() {
            properties
                .entry(tag.clone())
                .or_insert_with(FieldSchema::keyword);
        }

        Ok(Self {
            properties,
            settings: None,
        })
    }

    /// Returns the schema of `field`, if mapped at the top level.
    pub fn field(&self, field: &str) -> Option<&FieldSchema> {
        self.properties.get(field)
    }

    /// Returns the qualified path to query for exact matches on the mapping leaf `leaf`.
    ///
    /// A `keyword` field is used as is; a field with a `keyword` multi-field
    /// resolves to that sub-field. Anything else falls back to the field
    /// itself, which only matches values the analyzer leaves intact.
    pub fn exact_match_field(&self, mapping: &FieldMapping, leaf: &str) -> String {
        let qualified = mapping.qualified(leaf);
        let field = if mapping.is_nested() {
            self.field(mapping.nested_path())
                .and_then(|nested| nested.properties.get(leaf))
        } else {
            self.field(leaf)
        };
        let Some(field) = field else {
            return qualified;
        };
        if field.field_type == "keyword" {
            return qualified;
        }
        let keyword_subfield = field
            .options
            .get("fields")
            .and_then(Value::as_object)
            .and_then(|fields| {
                fields
                    .iter()
                    .find(|(_, sub)| sub.get("type").and_then(Value::as_str) == Some("keyword"))
            })
            .map(|(name, _)| name);
        match keyword_subfield {
            Some(name) => format!("{}.{}", qualified, name),
            None => qualified,
        }
    }

    /// Builds the index-creation request body.
    pub fn to_create_body(&self) -> Value {
        let mut body = json!({
            "mappings": { "properties": self.properties }
        });
        if let Some(ref settings) = self.settings {
            body["settings"] = settings.clone();
        }
        body
    }
}

/// Ensures `index` exists with `schema`, creating it if necessary.
///
/// An existing index is left untouched and reported as
/// [`IndexCreation::AlreadyExists`]; its mapping is not compared.
pub async fn ensure_index<C>(
    client: &C,
    index: &str,
    schema: &IndexSchema,
) -> StoreResult<IndexCreation>
where
    C: SearchClient + ?Sized,
{
    let outcome = client.create_index(index, &schema.to_create_body()).await?;
    match outcome {
        IndexCreation::Created => {
            tracing::info!(
                index = %index,
                backend = client.backend_name(),
                "Created index"
            );
        }
        IndexCreation::AlreadyExists => {
            tracing::debug!(index = %index, "Index already exists");
        }
    }
    Ok(outcome)
}
