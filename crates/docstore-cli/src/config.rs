//! Command-line configuration for `hds`.
//!
//! Every connection and field-mapping option can also be set through the
//! environment.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `HDS_ES_URL` | http://localhost:9200 | Elasticsearch node URL |
//! | `HDS_ES_USERNAME` / `HDS_ES_PASSWORD` | | Basic auth credentials |
//! | `HDS_ES_TOKEN` | | Bearer token |
//! | `HDS_CA_CERTIFICATE` | | PEM bundle for TLS validation |
//! | `HDS_INSECURE` | false | Skip certificate validation |
//! | `HDS_TIMEOUT_MS` | 30000 | Request timeout |
//! | `HDS_INDEX` | document | Index name |
//! | `HDS_SEARCH_FIELDS` | text | Fields searched by text queries |
//! | `HDS_TEXT_FIELD` | text | Paragraph text field |
//! | `HDS_NAME_FIELD` | name | Document name field |
//! | `HDS_DOC_ID_FIELD` | document_id | Document id field |
//! | `HDS_TAG_FIELDS` | | Tag fields |
//! | `HDS_EMBEDDING_FIELD` / `HDS_EMBEDDING_DIM` | | Dense vector field and size |
//! | `HDS_EXCLUDED_META_FIELDS` | | Fields omitted from results |
//! | `HDS_CUSTOM_MAPPING` | | JSON file with an explicit index schema |
//! | `HDS_LOG_LEVEL` | info | Log level |

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde_json::Value;

use helios_docstore::backends::elasticsearch::{ElasticsearchAuth, ElasticsearchConfig};
use helios_docstore::{DEFAULT_TOP_K, DocumentStoreConfig};

/// Command-line configuration.
#[derive(Debug, Clone, Parser)]
#[command(name = "hds")]
#[command(about = "Helios document store command line")]
pub struct CliConfig {
    /// Elasticsearch node URL.
    #[arg(long, env = "HDS_ES_URL", default_value = "http://localhost:9200", global = true)]
    pub es_url: String,

    /// Username for basic authentication.
    #[arg(long, env = "HDS_ES_USERNAME", global = true)]
    pub username: Option<String>,

    /// Password for basic authentication.
    #[arg(long, env = "HDS_ES_PASSWORD", hide_env_values = true, global = true)]
    pub password: Option<String>,

    /// Bearer token.
    #[arg(long, env = "HDS_ES_TOKEN", hide_env_values = true, global = true)]
    pub token: Option<String>,

    /// PEM bundle used to validate the server certificate.
    #[arg(long, env = "HDS_CA_CERTIFICATE", global = true)]
    pub ca_certificate: Option<PathBuf>,

    /// Skip TLS certificate validation.
    #[arg(long, env = "HDS_INSECURE", global = true)]
    pub insecure: bool,

    /// Request timeout in milliseconds.
    #[arg(long, env = "HDS_TIMEOUT_MS", default_value = "30000", global = true)]
    pub timeout_ms: u64,

    /// Index name.
    #[arg(long, env = "HDS_INDEX", default_value = "document", global = true)]
    pub index: String,

    /// Fields searched by text queries (comma-separated).
    #[arg(
        long,
        env = "HDS_SEARCH_FIELDS",
        default_value = "text",
        value_delimiter = ',',
        global = true
    )]
    pub search_fields: Vec<String>,

    /// Paragraph text field, dot-separated when nested.
    #[arg(long, env = "HDS_TEXT_FIELD", default_value = "text", global = true)]
    pub text_field: String,

    /// Document name field.
    #[arg(long, env = "HDS_NAME_FIELD", default_value = "name", global = true)]
    pub name_field: String,

    /// Document id field.
    #[arg(long, env = "HDS_DOC_ID_FIELD", default_value = "document_id", global = true)]
    pub doc_id_field: String,

    /// Fields allowed in tag queries, mapped as keywords (comma-separated).
    #[arg(long, env = "HDS_TAG_FIELDS", value_delimiter = ',', global = true)]
    pub tag_fields: Vec<String>,

    /// Dense vector field.
    #[arg(long, env = "HDS_EMBEDDING_FIELD", global = true)]
    pub embedding_field: Option<String>,

    /// Dense vector dimensionality.
    #[arg(long, env = "HDS_EMBEDDING_DIM", global = true)]
    pub embedding_dim: Option<usize>,

    /// Fields omitted from returned hits (comma-separated).
    #[arg(long, env = "HDS_EXCLUDED_META_FIELDS", value_delimiter = ',', global = true)]
    pub excluded_meta_fields: Vec<String>,

    /// JSON file holding an explicit index schema.
    #[arg(long, env = "HDS_CUSTOM_MAPPING", global = true)]
    pub custom_mapping: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long, env = "HDS_LOG_LEVEL", default_value = "info", global = true)]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

/// Store operations.
#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Create the index if it does not exist.
    Init,

    /// Write documents from an NDJSON file (`-` reads stdin).
    Ingest {
        /// NDJSON file, one document per line.
        path: PathBuf,
    },

    /// Run a text query.
    Query {
        /// Query text.
        text: String,

        /// Number of paragraphs to return.
        #[arg(long, default_value_t = DEFAULT_TOP_K)]
        top_k: usize,

        /// Restrict the search to these ids (comma-separated).
        #[arg(long, value_delimiter = ',')]
        candidates: Vec<String>,
    },

    /// Run a cosine-similarity query with a JSON vector (`[0.1, 0.2, ...]`).
    QueryEmbedding {
        /// Query vector as a JSON array.
        vector: String,

        /// Number of paragraphs to return.
        #[arg(long, default_value_t = DEFAULT_TOP_K)]
        top_k: usize,

        /// Restrict the search to these ids (comma-separated).
        #[arg(long, value_delimiter = ',')]
        candidates: Vec<String>,
    },

    /// Fetch a document by backend id.
    Get {
        /// Backend document id.
        id: String,
    },

    /// Fetch a document by name.
    GetByName {
        /// Document name.
        name: String,
    },

    /// List ids of documents matching tags (`field=value,...`).
    IdsByTags {
        /// Tag filters; repeating a field allows any of its values.
        #[arg(value_delimiter = ',', required = true)]
        tags: Vec<String>,
    },

    /// Count documents in the index.
    Count,

    /// Stream every document as NDJSON.
    Dump,
}

impl CliConfig {
    /// Validates option combinations that clap cannot express.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.username.is_some() != self.password.is_some() {
            errors.push("Username and password must be given together".to_string());
        }

        if self.token.is_some() && self.username.is_some() {
            errors.push("Use either basic auth or a bearer token, not both".to_string());
        }

        if self.timeout_ms == 0 {
            errors.push("Timeout cannot be 0".to_string());
        }

        if self.search_fields.iter().all(|f| f.trim().is_empty()) {
            errors.push("At least one search field is required".to_string());
        }

        if self.embedding_field.is_some() && self.embedding_dim.is_none_or(|d| d == 0) {
            errors.push("An embedding field requires a non-zero embedding dimension".to_string());
        }

        if let Command::Query { top_k: 0, .. } | Command::QueryEmbedding { top_k: 0, .. } =
            self.command
        {
            errors.push("--top-k cannot be 0".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Transport configuration for the Elasticsearch client.
    pub fn elasticsearch_config(&self) -> ElasticsearchConfig {
        let auth = match (&self.username, &self.password, &self.token) {
            (Some(username), Some(password), _) => Some(ElasticsearchAuth::Basic {
                username: username.clone(),
                password: password.clone(),
            }),
            (_, _, Some(token)) => Some(ElasticsearchAuth::Bearer {
                token: token.clone(),
            }),
            _ => None,
        };

        ElasticsearchConfig {
            nodes: vec![self.es_url.clone()],
            request_timeout_ms: self.timeout_ms,
            auth,
            disable_certificate_validation: self.insecure,
            ca_certificate: self.ca_certificate.clone(),
            ..Default::default()
        }
    }

    /// Store configuration, reading the custom mapping file if one is given.
    pub fn store_config(&self) -> anyhow::Result<DocumentStoreConfig> {
        let custom_mapping = match self.custom_mapping {
            Some(ref path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read {}", path.display()))?;
                Some(
                    serde_json::from_str(&raw)
                        .with_context(|| format!("Invalid index schema in {}", path.display()))?,
                )
            }
            None => None,
        };

        Ok(DocumentStoreConfig {
            index: self.index.clone(),
            search_fields: self.search_fields.clone(),
            text_field: self.text_field.clone(),
            name_field: self.name_field.clone(),
            doc_id_field: self.doc_id_field.clone(),
            tag_fields: self.tag_fields.clone(),
            embedding_field: self.embedding_field.clone(),
            embedding_dim: self.embedding_dim,
            custom_mapping,
            excluded_meta_fields: self.excluded_meta_fields.clone(),
        })
    }
}

/// Parses `field=value` pairs into a tag map.
pub fn parse_tags(pairs: &[String]) -> Result<BTreeMap<String, Vec<Value>>, String> {
    let mut tags: BTreeMap<String, Vec<Value>> = BTreeMap::new();
    for pair in pairs {
        let (field, value) = pair
            .split_once('=')
            .filter(|(field, _)| !field.is_empty())
            .ok_or_else(|| format!("Invalid tag filter '{}', expected field=value", pair))?;
        tags.entry(field.to_string())
            .or_default()
            .push(Value::String(value.to_string()));
    }
    Ok(tags)
}

/// Parses a JSON array of numbers into a query vector.
pub fn parse_vector(raw: &str) -> anyhow::Result<Vec<f32>> {
    let vector: Vec<f32> =
        serde_json::from_str(raw).context("Query vector must be a JSON array of numbers")?;
    anyhow::ensure!(!vector.is_empty(), "Query vector cannot be empty");
    Ok(vector)
}
