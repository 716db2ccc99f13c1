//! Elasticsearch backend.
//!
//! [`ElasticsearchClient`] speaks the Elasticsearch REST API through the
//! official `elasticsearch` crate. Searches, lookups and writes map one to
//! one onto the search, get and index endpoints; full-index scans use the
//! scroll API, fetching one batch per poll.
//!
//! # Example
//!
//! ```ignore
//! use helios_docstore::backends::elasticsearch::{ElasticsearchClient, ElasticsearchConfig};
//! use helios_docstore::{DocumentStore, DocumentStoreConfig};
//!
//! let client = ElasticsearchClient::new(ElasticsearchConfig {
//!     nodes: vec!["http://localhost:9200".to_string()],
//!     ..Default::default()
//! })?;
//! let store = DocumentStore::new(client, DocumentStoreConfig::default())?;
//! store.initialize().await?;
//! ```

mod client;
mod config;

pub use client::ElasticsearchClient;
pub use config::{ElasticsearchAuth, ElasticsearchConfig};
