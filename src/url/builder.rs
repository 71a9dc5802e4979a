//! URL builder.
//!
//! Composes render, action and resource URLs from the initiating fragment,
//! the bound arguments and a snapshot of the page state store. Building a
//! URL only reads the store.

use serde_json::Value;

use crate::cacheability::{state_scope, CacheLevel};
use crate::codec::ParameterMap;
use crate::config::HubConfig;
use crate::error::Result;
use crate::state::{PageState, PageStateStore};

use super::args::{resolve_parameter_args, resolve_resource_args};
use super::token::{UrlKind, UrlToken};

/// Builds URL strings over a borrowed store snapshot.
pub struct UrlBuilder<'a> {
    config: &'a HubConfig,
    store: &'a PageStateStore,
}

impl<'a> UrlBuilder<'a> {
    pub fn new(config: &'a HubConfig, store: &'a PageStateStore) -> Self {
        Self { config, store }
    }

    /// Resource URL from loosely typed `(resourceParams?, cacheability?)`.
    pub fn resource(&self, initiator: &str, args: &[Value]) -> Result<String> {
        let args = resolve_resource_args(args)?;
        self.resource_with(initiator, args.parameters, args.cache_level)
    }

    /// Resource URL from already typed arguments.
    pub fn resource_with(
        &self,
        initiator: &str,
        parameters: ParameterMap,
        cache_level: CacheLevel,
    ) -> Result<String> {
        let page = match cache_level {
            CacheLevel::Full => PageState::new(),
            _ => self.store.page_state(),
        };
        let token = UrlToken::new(UrlKind::Resource, initiator, parameters)
            .with_cache_level(cache_level)
            .with_state(state_scope(cache_level, &page, initiator));
        self.finish(token)
    }

    pub fn action(&self, initiator: &str, args: &[Value]) -> Result<String> {
        let parameters = resolve_parameter_args(UrlKind::Action, args)?;
        self.stateful(UrlKind::Action, initiator, parameters)
    }

    pub fn render(&self, initiator: &str, args: &[Value]) -> Result<String> {
        let parameters = resolve_parameter_args(UrlKind::Render, args)?;
        self.stateful(UrlKind::Render, initiator, parameters)
    }

    /// Render and action URLs always carry the initiator's render state.
    pub fn stateful(
        &self,
        kind: UrlKind,
        initiator: &str,
        parameters: ParameterMap,
    ) -> Result<String> {
        let mut state = PageState::new();
        state.insert(initiator.to_string(), self.store.render_state(initiator)?);
        self.finish(UrlToken::new(kind, initiator, parameters).with_state(state))
    }

    fn finish(&self, token: UrlToken) -> Result<String> {
        log::debug!(
            "[UrlBuilder] Created {} URL for '{}' embedding {} state(s)",
            token.kind,
            token.initiator,
            token.state.len()
        );
        token.to_url(&self.config.base_url, &self.config.token_parameter)
    }
}
