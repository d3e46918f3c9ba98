//! Gateway configuration.

use serde::{Deserialize, Serialize};

use docgate_core::GatewayResult;

/// Settings shared by every command handler.
///
/// ```ignore
/// let config = GatewayConfig::from_json_str(r#"{ "default_database": "app" }"#)?;
/// assert!(config.generate_ids);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Database used when a command carries no `$db`.
    pub default_database: String,
    /// Whether documents inserted or upserted without an `_id` get a generated ObjectId.
    /// When disabled such documents are rejected.
    pub generate_ids: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self { default_database: "test".to_string(), generate_ids: true }
    }
}

impl GatewayConfig {
    /// Parses a JSON configuration. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> GatewayResult<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = GatewayConfig::default();

        assert_eq!(config.default_database, "test");
        assert!(config.generate_ids);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config = GatewayConfig::from_json_str(r#"{ "generate_ids": false }"#).unwrap();

        assert_eq!(config, GatewayConfig { default_database: "test".into(), generate_ids: false });
    }

    #[test]
    fn malformed_json_is_a_decode_error() {
        assert!(matches!(
            GatewayConfig::from_json_str("{ default_database"),
            Err(docgate_core::GatewayError::Decode(_))
        ));
    }
}
