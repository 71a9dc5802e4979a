//! # Portlet Hub
//!
//! Client-side coordination hub for the independently authored fragments
//! (portlets) composed onto one page.
//!
//! The hub owns the page's parameter state. Each fragment registers against
//! a [`PortletHub`] and gets a [`FragmentHandle`] through which it reads its
//! render state, commits mutations, builds resource, action and render URLs
//! and subscribes to `portlet.onStateChange` notifications. Public parameters
//! are shared: one fragment owns the value and subscribers read it.
//!
//! Notifications are delivered on a later turn of the tokio scheduler, never
//! from inside the call that caused them.

pub mod cacheability;
pub mod codec;
pub mod config;
pub mod error;
pub mod events;
pub mod hub;
pub mod state;
pub mod url;

pub use cacheability::{CacheLevel, CACHE_LEVEL_FULL, CACHE_LEVEL_PAGE, CACHE_LEVEL_PORTLET};
pub use codec::ParameterMap;
pub use config::HubConfig;
pub use error::{ErrorKind, HubError, Result};
pub use events::{ListenerHandle, ListenerScope, STATE_CHANGE_EVENT};
pub use hub::{FragmentHandle, PortletHub, UrlFuture};
pub use state::{
    CapabilityDescriptor, FragmentDefinition, FragmentId, PageDefinition, PageState, RenderState,
};
pub use url::{UrlKind, UrlToken};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
