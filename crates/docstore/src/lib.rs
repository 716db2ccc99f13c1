//! # Helios Docstore
//!
//! A paragraph-level document store over a remote search engine.
//!
//! The store translates retrieval requests into the engine's query
//! language and normalizes what comes back:
//!
//! - **Text queries** match across the configured search fields, optionally
//!   restricted to a set of candidate ids.
//! - **Embedding queries** rank by cosine similarity against a dense vector field.
//! - **Tag filtering** returns the ids of documents matching tag values.
//! - **Bulk ingestion** writes documents independently, logging and skipping failures.
//! - **Full scans** stream the whole index batch by batch.
//!
//! Text, name and document-id fields may live inside nested objects
//! (`paragraphs.text`); queries and result projection follow the nested
//! path automatically.
//!
//! ## Architecture
//!
//! ```text
//! DocumentStoreConfig ─▶ FieldMapping ─┬─▶ IndexSchema ──▶ ensure_index
//!                                      ├─▶ QueryBuilder ─▶ SearchClient::search
//!                                      └─▶ Projector ◀──── hits
//! ```
//!
//! [`SearchClient`] is the only component that talks to the network. The
//! Elasticsearch implementation lives in [`backends::elasticsearch`] behind
//! the `elasticsearch` feature.
//!
//! ## Quick Start
//!
//! ```ignore
//! use helios_docstore::backends::elasticsearch::{ElasticsearchClient, ElasticsearchConfig};
//! use helios_docstore::{DEFAULT_TOP_K, DocumentStore, DocumentStoreConfig};
//!
//! let client = ElasticsearchClient::new(ElasticsearchConfig::default())?;
//! let store = DocumentStore::new(client, DocumentStoreConfig::default())?;
//! store.initialize().await?;
//!
//! let (texts, meta) = store.query("reset the device", DEFAULT_TOP_K, None).await?;
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `elasticsearch` | Elasticsearch backend |
//! | `docker-tests` | Live tests against a containerised Elasticsearch |

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod backends;
pub mod client;
pub mod config;
pub mod error;
pub mod fields;
pub mod projection;
pub mod query;
pub mod schema;
pub mod store;

pub use client::{Document, Hit, IndexCreation, SearchClient, SearchHits};
pub use config::DocumentStoreConfig;
pub use error::{BackendError, ConfigurationError, StoreError, StoreResult};
pub use fields::{FieldMapping, HitShape};
pub use projection::{ExtraMeta, ParagraphMeta, ProjectedResult};
pub use query::{DEFAULT_TOP_K, EMBEDDING_SCORE_OFFSET, MAX_TAG_RESULTS, QueryBuilder};
pub use schema::{FieldSchema, IndexSchema, ensure_index};
pub use store::{DocumentRecord, DocumentStore, Paragraphs};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name.
pub const NAME: &str = env!("CARGO_PKG_NAME");
