//! Cacheability policy for resource URLs.
//!
//! The cache level decides how much render state is embedded in a resource
//! URL: the whole page, only the initiating fragment, or nothing.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{HubError, Result};
use crate::state::PageState;

/// Token for [`CacheLevel::Page`].
pub const CACHE_LEVEL_PAGE: &str = "cacheLevelPage";
/// Token for [`CacheLevel::Portlet`].
pub const CACHE_LEVEL_PORTLET: &str = "cacheLevelPortlet";
/// Token for [`CacheLevel::Full`].
pub const CACHE_LEVEL_FULL: &str = "cacheLevelFull";

/// Closed set of resource cache levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CacheLevel {
    /// Embed the full page state.
    #[serde(rename = "cacheLevelPage")]
    Page,
    /// Embed only the initiator's render state.
    #[serde(rename = "cacheLevelPortlet")]
    Portlet,
    /// Embed no state.
    #[default]
    #[serde(rename = "cacheLevelFull")]
    Full,
}

impl CacheLevel {
    /// The wire token for this level.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Page => CACHE_LEVEL_PAGE,
            Self::Portlet => CACHE_LEVEL_PORTLET,
            Self::Full => CACHE_LEVEL_FULL,
        }
    }

    /// Whether `token` is one of the three recognized tokens.
    pub fn is_token(token: &str) -> bool {
        Self::from_str(token).is_ok()
    }
}

impl fmt::Display for CacheLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CacheLevel {
    type Err = HubError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            CACHE_LEVEL_PAGE => Ok(Self::Page),
            CACHE_LEVEL_PORTLET => Ok(Self::Portlet),
            CACHE_LEVEL_FULL => Ok(Self::Full),
            other => Err(HubError::InvalidCacheability(other.to_string())),
        }
    }
}

/// Parse a cacheability token.
pub fn normalize(token: &str) -> Result<CacheLevel> {
    token.parse()
}

/// Parse at most one cacheability token out of a call's candidates.
///
/// More than one candidate is a [`HubError::DuplicateCacheability`] even when
/// the tokens agree.
pub fn normalize_one(candidates: &[&str]) -> Result<Option<CacheLevel>> {
    match candidates {
        [] => Ok(None),
        [token] => normalize(token).map(Some),
        _ => Err(HubError::DuplicateCacheability),
    }
}

/// The part of `page` a resource URL at `level` embeds.
pub fn state_scope(level: CacheLevel, page: &PageState, initiator: &str) -> PageState {
    match level {
        CacheLevel::Page => page.clone(),
        CacheLevel::Portlet => page
            .get_key_value(initiator)
            .map(|(id, state)| (id.clone(), state.clone()))
            .into_iter()
            .collect(),
        CacheLevel::Full => PageState::new(),
    }
}
