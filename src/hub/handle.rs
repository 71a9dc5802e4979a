//! Fragment handles.
//!
//! A [`FragmentHandle`] is what a fragment gets back from registration. Every
//! operation on it acts with that fragment's identity and permissions.

use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use serde_json::Value;

use crate::cacheability::CacheLevel;
use crate::codec::ParameterMap;
use crate::error::{HubError, Result};
use crate::events::{ListenerHandle, ListenerScope};
use crate::state::{CapabilityDescriptor, FragmentId, RenderState};
use crate::url::{UrlBuilder, UrlKind};

use super::registry::PortletHub;

/// Deferred result of a URL builder call.
pub type UrlFuture = BoxFuture<'static, Result<String>>;

/// The URL is fixed when the call is made; resolution waits one scheduler
/// turn.
fn deferred(url: String) -> UrlFuture {
    async move {
        tokio::task::yield_now().await;
        Ok::<_, HubError>(url)
    }
    .boxed()
}

/// A registered fragment's view of the hub.
#[derive(Debug, Clone)]
pub struct FragmentHandle {
    id: FragmentId,
    hub: PortletHub,
}

impl FragmentHandle {
    pub(crate) fn new(id: FragmentId, hub: PortletHub) -> Self {
        Self { id, hub }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn capabilities(&self) -> Result<CapabilityDescriptor> {
        let state = self.hub.inner.state.lock();
        let store = state.registered_store(&self.id)?;
        Ok(store
            .capabilities(&self.id)
            .cloned()
            .unwrap_or_default())
    }

    /// An empty parameter map to fill in before a mutation or URL call.
    pub fn new_parameters(&self) -> ParameterMap {
        ParameterMap::new()
    }

    /// Current render state of this fragment, computed fresh.
    pub fn render_state(&self) -> Result<RenderState> {
        let state = self.hub.inner.state.lock();
        state.registered_store(&self.id)?.render_state(&self.id)
    }

    /// Merge `delta` into the page as this fragment.
    ///
    /// Fails with [`HubError::AccessDenied`] and changes nothing if any name
    /// is not writable by this fragment.
    pub fn set_render_state(&self, delta: &ParameterMap) -> Result<()> {
        self.hub.apply_mutation(&self.id, delta)
    }

    // --- URL builders ---

    /// `createResourceUrl(resourceParams?, cacheability?)`.
    ///
    /// Argument errors are returned immediately; on success the URL is
    /// delivered by the returned future.
    pub fn create_resource_url(&self, args: &[Value]) -> Result<UrlFuture> {
        self.build(|builder| builder.resource(&self.id, args))
    }

    /// Typed form of [`create_resource_url`](Self::create_resource_url).
    pub fn resource_url(
        &self,
        parameters: Option<ParameterMap>,
        cache_level: Option<CacheLevel>,
    ) -> Result<UrlFuture> {
        self.build(|builder| {
            builder.resource_with(
                &self.id,
                parameters.unwrap_or_default(),
                cache_level.unwrap_or_default(),
            )
        })
    }

    pub fn create_action_url(&self, args: &[Value]) -> Result<UrlFuture> {
        self.build(|builder| builder.action(&self.id, args))
    }

    pub fn action_url(&self, parameters: Option<ParameterMap>) -> Result<UrlFuture> {
        self.build(|builder| {
            builder.stateful(UrlKind::Action, &self.id, parameters.unwrap_or_default())
        })
    }

    pub fn create_render_url(&self, args: &[Value]) -> Result<UrlFuture> {
        self.build(|builder| builder.render(&self.id, args))
    }

    pub fn render_url(&self, parameters: Option<ParameterMap>) -> Result<UrlFuture> {
        self.build(|builder| {
            builder.stateful(UrlKind::Render, &self.id, parameters.unwrap_or_default())
        })
    }

    fn build<F>(&self, f: F) -> Result<UrlFuture>
    where
        F: FnOnce(&UrlBuilder<'_>) -> Result<String>,
    {
        let url = {
            let state = self.hub.inner.state.lock();
            let store = state.registered_store(&self.id)?;
            f(&UrlBuilder::new(&self.hub.inner.config, store))?
        };
        Ok(deferred(url))
    }

    // --- Listeners ---

    /// Register a portlet-scope listener.
    pub fn add_event_listener<F>(&self, event_type: &str, callback: F) -> Result<ListenerHandle>
    where
        F: Fn(&str, &RenderState) + Send + Sync + 'static,
    {
        self.add_event_listener_scoped(event_type, ListenerScope::Portlet, callback)
    }

    /// Register a listener with an explicit scope.
    ///
    /// The listener sees mutations committed after this call returns.
    pub fn add_event_listener_scoped<F>(
        &self,
        event_type: &str,
        scope: ListenerScope,
        callback: F,
    ) -> Result<ListenerHandle>
    where
        F: Fn(&str, &RenderState) + Send + Sync + 'static,
    {
        let handle = {
            let mut state = self.hub.inner.state.lock();
            state.registered_store(&self.id)?;
            let handle = state
                .fabric
                .add(&self.id, event_type, scope, Arc::new(callback))?;
            if self.hub.inner.config.announce_on_subscribe {
                state.fabric.enqueue_listener(handle);
            }
            handle
        };
        self.hub.schedule_drain();
        Ok(handle)
    }

    /// Remove a listener. No further callback reaches it once this returns,
    /// including deliveries already queued. Unknown handles and handles owned
    /// by other fragments are ignored.
    pub fn remove_event_listener(&self, handle: ListenerHandle) -> bool {
        // Waits out a delivery in progress on another worker.
        let _gate = self.hub.inner.dispatch.lock();
        let mut state = self.hub.inner.state.lock();
        let owned = state
            .fabric
            .get(handle)
            .is_some_and(|reg| reg.fragment == self.id);
        if !owned {
            log::debug!("[FragmentHandle] '{}' ignored removal of {handle}", self.id);
            return false;
        }
        state.fabric.remove(handle)
    }
}
