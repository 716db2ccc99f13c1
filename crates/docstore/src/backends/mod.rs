//! Search engine backends.
//!
//! Each backend implements [`SearchClient`](crate::SearchClient) and sits
//! behind a cargo feature.

#[cfg(feature = "elasticsearch")]
pub mod elasticsearch;
