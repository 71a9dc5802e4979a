//! Hub configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Configuration for a [`PortletHub`](crate::hub::PortletHub).
///
/// # Attributes
///
/// * `base_url` - Prefix of every generated URL.
/// * `token_parameter` - Query parameter that carries the encoded payload.
/// * `announce_on_subscribe` - Deliver the current render state to a
///   listener right after it is added, before any mutation happens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HubConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_token_parameter")]
    pub token_parameter: String,
    #[serde(default)]
    pub announce_on_subscribe: bool,
}

fn default_base_url() -> String {
    "/portal".to_string()
}

fn default_token_parameter() -> String {
    "ph".to_string()
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            token_parameter: default_token_parameter(),
            announce_on_subscribe: false,
        }
    }
}

impl HubConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from JSON; missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        log::debug!("[HubConfig] Loading {}", path.display());
        Self::from_json_str(&std::fs::read_to_string(path)?)
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_announce_on_subscribe(mut self, announce: bool) -> Self {
        self.announce_on_subscribe = announce;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = HubConfig::default();
        assert_eq!(config.base_url, "/portal");
        assert_eq!(config.token_parameter, "ph");
        assert!(!config.announce_on_subscribe);
    }

    #[test]
    fn test_partial_json() {
        let config = HubConfig::from_json_str(r#"{"announce_on_subscribe": true}"#).unwrap();
        assert!(config.announce_on_subscribe);
        assert_eq!(config.base_url, "/portal");
    }

    #[test]
    fn test_bad_json() {
        assert!(HubConfig::from_json_str("{").is_err());
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hub.json");
        std::fs::write(&path, r#"{"base_url": "/site", "token_parameter": "t"}"#).unwrap();
        let config = HubConfig::from_file(&path).unwrap();
        assert_eq!(config.base_url, "/site");
        assert_eq!(config.token_parameter, "t");

        let missing = HubConfig::from_file(dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(missing, crate::error::HubError::Io(_)));
    }
}
