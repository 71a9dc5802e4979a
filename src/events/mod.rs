//! State-change notification.
//!
//! Fragments register callbacks for the single `portlet.onStateChange`
//! event. Every committed page mutation runs one notification cycle: each
//! affected listener is queued and later invoked with a fresh render state
//! snapshot on a subsequent turn of the scheduler.

/// Listener handles, scopes and registrations.
pub mod listener;

/// Registration table and delivery queue.
pub mod fabric;

pub use fabric::{Delivery, NotificationFabric};
pub use listener::{
    ListenerHandle, ListenerRegistration, ListenerScope, StateChangeCallback, STATE_CHANGE_EVENT,
};
