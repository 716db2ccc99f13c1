//! Elasticsearch transport configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;

/// Authentication configuration for Elasticsearch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ElasticsearchAuth {
    /// Basic username/password authentication.
    Basic {
        /// The username for basic auth.
        username: String,
        /// The password for basic auth.
        password: String,
    },
    /// Bearer token authentication.
    Bearer {
        /// The bearer token.
        token: String,
    },
}

/// Configuration for the Elasticsearch client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElasticsearchConfig {
    /// Elasticsearch node URLs (e.g., `["http://localhost:9200"]`).
    /// Currently uses the first node (single-node connection pool).
    pub nodes: Vec<String>,

    /// Request timeout in milliseconds (default: 30000).
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Optional authentication.
    #[serde(default)]
    pub auth: Option<ElasticsearchAuth>,

    /// Whether to disable certificate validation (default: false).
    /// Only use for development/testing.
    #[serde(default)]
    pub disable_certificate_validation: bool,

    /// PEM bundle used to validate the server certificate.
    #[serde(default)]
    pub ca_certificate: Option<PathBuf>,

    /// Hits fetched per scroll request (default: 1000).
    #[serde(default = "default_scan_batch_size")]
    pub scan_batch_size: usize,

    /// How long the scroll context stays alive between batches (default: `"5m"`).
    #[serde(default = "default_scroll_keep_alive")]
    pub scroll_keep_alive: String,
}

fn default_request_timeout_ms() -> u64 {
    30000
}

fn default_scan_batch_size() -> usize {
    1000
}

fn default_scroll_keep_alive() -> String {
    "5m".to_string()
}

impl Default for ElasticsearchConfig {
    fn default() -> Self {
        Self {
            nodes: vec!["http://localhost:9200".to_string()],
            request_timeout_ms: default_request_timeout_ms(),
            auth: None,
            disable_certificate_validation: false,
            ca_certificate: None,
            scan_batch_size: default_scan_batch_size(),
            scroll_keep_alive: default_scroll_keep_alive(),
        }
    }
}

impl ElasticsearchConfig {
    /// Checks the options that cannot be caught by deserialization.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.nodes.is_empty() {
            return Err(ConfigurationError::InvalidTransport {
                option: "nodes",
                message: "at least one node URL is required".to_string(),
            });
        }
        if self.scan_batch_size == 0 {
            return Err(ConfigurationError::InvalidTransport {
                option: "scan_batch_size",
                message: "must be greater than zero".to_string(),
            });
        }
        if self.scroll_keep_alive.trim().is_empty() {
            return Err(ConfigurationError::InvalidTransport {
                option: "scroll_keep_alive",
                message: "must not be empty".to_string(),
            });
        }
        if self.disable_certificate_validation && self.ca_certificate.is_some() {
            return Err(ConfigurationError::InvalidTransport {
                option: "ca_certificate",
                message: "cannot be combined with disabled certificate validation".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ElasticsearchConfig::default();
        assert_eq!(config.nodes, vec!["http://localhost:9200"]);
        assert_eq!(config.request_timeout_ms, 30000);
        assert_eq!(config.scan_batch_size, 1000);
        assert_eq!(config.scroll_keep_alive, "5m");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_deserialize_with_auth() {
        let config: ElasticsearchConfig = serde_json::from_str(
            r#"{"nodes": ["https://es:9200"], "auth": {"Basic": {"username": "elastic", "password": "pw"}}}"#,
        )
        .unwrap();
        assert_eq!(
            config.auth,
            Some(ElasticsearchAuth::Basic {
                username: "elastic".to_string(),
                password: "pw".to_string()
            })
        );
        assert_eq!(config.scan_batch_size, 1000);
    }

    #[test]
    fn test_validate_rejects_bad_options() {
        let no_nodes = ElasticsearchConfig {
            nodes: vec![],
            ..Default::default()
        };
        assert!(matches!(
            no_nodes.validate(),
            Err(ConfigurationError::InvalidTransport { option: "nodes", .. })
        ));

        let zero_batch = ElasticsearchConfig {
            scan_batch_size: 0,
            ..Default::default()
        };
        assert!(zero_batch.validate().is_err());

        let conflicting_tls = ElasticsearchConfig {
            disable_certificate_validation: true,
            ca_certificate: Some(PathBuf::from("/etc/ssl/ca.pem")),
            ..Default::default()
        };
        assert!(conflicting_tls.validate().is_err());
    }
}
