//! URL tokens.
//!
//! A generated URL is `{base_url}?{token_parameter}={payload}` where the
//! payload is the base64url-wrapped JSON form of a [`UrlToken`]. The server
//! side decodes it with [`UrlToken::decode`].

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::cacheability::CacheLevel;
use crate::codec::{decode_payload, encode_payload, ParameterMap};
use crate::error::{HubError, Result};
use crate::state::{FragmentId, PageState, RenderState};

/// Payload format version. Bumped whenever the token layout changes.
pub const TOKEN_VERSION: u32 = 1;

/// The three URL kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UrlKind {
    Render,
    Action,
    Resource,
}

impl fmt::Display for UrlKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Render => "render",
            Self::Action => "action",
            Self::Resource => "resource",
        })
    }
}

/// Decoded content of a generated URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlToken {
    pub version: u32,
    pub kind: UrlKind,
    pub initiator: FragmentId,
    /// Resource, action or render parameters, depending on `kind`.
    pub parameters: ParameterMap,
    /// Only present on resource URLs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_level: Option<CacheLevel>,
    /// Embedded render states keyed by fragment id.
    #[serde(default)]
    pub state: PageState,
}

impl UrlToken {
    pub fn new(kind: UrlKind, initiator: impl Into<FragmentId>, parameters: ParameterMap) -> Self {
        Self {
            version: TOKEN_VERSION,
            kind,
            initiator: initiator.into(),
            parameters,
            cache_level: None,
            state: PageState::new(),
        }
    }

    pub fn with_cache_level(mut self, level: CacheLevel) -> Self {
        self.cache_level = Some(level);
        self
    }

    pub fn with_state(mut self, state: PageState) -> Self {
        self.state = state;
        self
    }

    pub fn initiator(&self) -> &str {
        &self.initiator
    }

    pub fn is_resource_url(&self) -> bool {
        self.kind == UrlKind::Resource
    }

    /// Embedded render state of `fragment`; empty when not embedded.
    pub fn state_of(&self, fragment: &str) -> RenderState {
        self.state.get(fragment).cloned().unwrap_or_default()
    }

    /// Render the token as a URL string.
    pub fn to_url(&self, base_url: &str, token_parameter: &str) -> Result<String> {
        let payload = encode_payload(self)?;
        let separator = if base_url.contains('?') { '&' } else { '?' };
        Ok(format!("{base_url}{separator}{token_parameter}={payload}"))
    }

    /// Recover a token from a URL produced by [`to_url`](Self::to_url).
    pub fn decode(url: &str, token_parameter: &str) -> Result<Self> {
        let (_, query) = url
            .split_once('?')
            .ok_or_else(|| HubError::InvalidToken("missing query string".to_string()))?;
        let payload = query
            .split('&')
            .find_map(|pair| {
                let (key, value) = pair.split_once('=')?;
                (key == token_parameter).then_some(value)
            })
            .ok_or_else(|| {
                HubError::InvalidToken(format!("missing '{token_parameter}' parameter"))
            })?;

        let token: Self = decode_payload(payload)?;
        if token.version != TOKEN_VERSION {
            return Err(HubError::InvalidToken(format!(
                "unsupported token version {}",
                token.version
            )));
        }
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token() -> UrlToken {
        let mut state = PageState::new();
        state.insert(
            "portletB".to_string(),
            ParameterMap::new().with("parm1", vec![None, Some("x".into())]),
        );
        UrlToken::new(
            UrlKind::Resource,
            "portletB",
            ParameterMap::new().with("rp1", vec![Some("resVal".into())]),
        )
        .with_cache_level(CacheLevel::Page)
        .with_state(state)
    }

    #[test]
    fn test_url_round_trip() {
        let token = token();
        let url = token.to_url("/portal", "ph").unwrap();
        assert!(url.starts_with("/portal?ph="));
        assert_eq!(UrlToken::decode(&url, "ph").unwrap(), token);
    }

    #[test]
    fn test_base_with_query() {
        let url = token().to_url("/portal?lang=en", "ph").unwrap();
        assert!(url.starts_with("/portal?lang=en&ph="));
        assert_eq!(UrlToken::decode(&url, "ph").unwrap().initiator(), "portletB");
    }

    #[test]
    fn test_state_of_missing_is_empty() {
        assert!(token().state_of("portletC").is_empty());
        assert_eq!(token().state_of("portletB").get_value("parm1"), None);
    }

    #[test]
    fn test_render_token_has_no_cache_level() {
        let token = UrlToken::new(UrlKind::Render, "portletA", ParameterMap::new());
        let url = token.to_url("/p", "ph").unwrap();
        let back = UrlToken::decode(&url, "ph").unwrap();
        assert_eq!(back.cache_level, None);
        assert!(!back.is_resource_url());
    }

    #[test]
    fn test_decode_errors() {
        assert!(UrlToken::decode("/portal", "ph").is_err());
        assert!(UrlToken::decode("/portal?other=1", "ph").is_err());
        assert!(UrlToken::decode("/portal?ph=%%%", "ph").is_err());
    }

    #[test]
    fn test_version_checked() {
        let mut token = token();
        token.version = TOKEN_VERSION + 1;
        let url = token.to_url("/portal", "ph").unwrap();
        assert!(matches!(
            UrlToken::decode(&url, "ph"),
            Err(HubError::InvalidToken(_))
        ));
    }
}
