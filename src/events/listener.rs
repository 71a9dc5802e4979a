//! Listener registrations.

use std::fmt;
use std::sync::Arc;

use crate::state::{FragmentId, RenderState};

/// The one event type the hub recognizes: page render state changed.
pub const STATE_CHANGE_EVENT: &str = "portlet.onStateChange";

/// Callback invoked with the event type and the listener's render state.
pub type StateChangeCallback = Arc<dyn Fn(&str, &RenderState) + Send + Sync>;

/// Opaque token identifying one listener registration.
///
/// Handles are issued in increasing order, so ordering handles orders
/// registrations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerHandle(u64);

impl ListenerHandle {
    pub(crate) fn new(seq: u64) -> Self {
        Self(seq)
    }
}

impl fmt::Display for ListenerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

/// Which mutations wake a listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ListenerScope {
    /// Every committed mutation on the page.
    Page,
    /// Only mutations that touch the owning fragment's render state.
    #[default]
    Portlet,
}

/// One registered listener.
#[derive(Clone)]
pub struct ListenerRegistration {
    pub handle: ListenerHandle,
    pub event_type: String,
    pub fragment: FragmentId,
    pub scope: ListenerScope,
    pub(crate) callback: StateChangeCallback,
    /// Set while the listener sits in the delivery queue.
    pub(crate) queued: bool,
}

impl fmt::Debug for ListenerRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerRegistration")
            .field("handle", &self.handle)
            .field("event_type", &self.event_type)
            .field("fragment", &self.fragment)
            .field("scope", &self.scope)
            .field("queued", &self.queued)
            .finish()
    }
}
