//! Notification fabric.
//!
//! Keeps listener registrations in registration order and a queue of
//! listeners awaiting delivery. A committed mutation enqueues every affected
//! listener once; a listener already waiting in the queue is not enqueued
//! again, so several mutations before a delivery collapse into one callback
//! that sees the latest render state.
//!
//! The fabric never invokes callbacks while its owner holds a lock. The hub
//! pops one [`Delivery`] at a time, computes the snapshot, releases the lock
//! and only then calls [`Delivery::invoke`]. A listener removed while still
//! queued is skipped.

use std::collections::{BTreeMap, VecDeque};

use crate::error::{HubError, Result};
use crate::state::{FragmentId, Mutation, RenderState};

use super::listener::{
    ListenerHandle, ListenerRegistration, ListenerScope, StateChangeCallback, STATE_CHANGE_EVENT,
};

/// One pending callback invocation.
#[derive(Clone)]
pub struct Delivery {
    pub handle: ListenerHandle,
    pub fragment: FragmentId,
    event_type: String,
    callback: StateChangeCallback,
}

impl Delivery {
    /// Run the callback, containing any panic it raises.
    ///
    /// Returns `false` if the callback panicked.
    pub fn invoke(&self, snapshot: &RenderState) -> bool {
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            (self.callback)(&self.event_type, snapshot);
        }));
        if let Err(e) = result {
            log::error!(
                "[NotificationFabric] Listener {} of '{}' panicked: {:?}",
                self.handle,
                self.fragment,
                e
            );
            return false;
        }
        true
    }
}

/// Listener registry plus the pending-delivery queue.
#[derive(Debug, Default)]
pub struct NotificationFabric {
    next_seq: u64,
    listeners: BTreeMap<ListenerHandle, ListenerRegistration>,
    queue: VecDeque<ListenerHandle>,
    cycles: u64,
}

impl NotificationFabric {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener for `fragment`.
    pub fn add(
        &mut self,
        fragment: &str,
        event_type: &str,
        scope: ListenerScope,
        callback: StateChangeCallback,
    ) -> Result<ListenerHandle> {
        if event_type != STATE_CHANGE_EVENT {
            return Err(HubError::UnsupportedEventType(event_type.to_string()));
        }
        self.next_seq += 1;
        let handle = ListenerHandle::new(self.next_seq);
        self.listeners.insert(
            handle,
            ListenerRegistration {
                handle,
                event_type: event_type.to_string(),
                fragment: fragment.to_string(),
                scope,
                callback,
                queued: false,
            },
        );
        log::debug!("[NotificationFabric] Added {handle} for '{fragment}' ({scope:?})");
        Ok(handle)
    }

    /// Drop a registration and its callback. Unknown handles are ignored.
    pub fn remove(&mut self, handle: ListenerHandle) -> bool {
        let removed = self.listeners.remove(&handle).is_some();
        if removed {
            log::debug!("[NotificationFabric] Removed {handle}");
        }
        removed
    }

    /// Drop every registration owned by `fragment`.
    pub fn remove_fragment(&mut self, fragment: &str) -> usize {
        let before = self.listeners.len();
        self.listeners.retain(|_, reg| reg.fragment != fragment);
        before - self.listeners.len()
    }

    pub fn get(&self, handle: ListenerHandle) -> Option<&ListenerRegistration> {
        self.listeners.get(&handle)
    }

    pub fn is_registered(&self, handle: ListenerHandle) -> bool {
        self.listeners.contains_key(&handle)
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Listeners waiting for delivery.
    pub fn pending(&self) -> usize {
        self.queue
            .iter()
            .filter(|handle| self.listeners.contains_key(*handle))
            .count()
    }

    /// Number of mutation cycles enqueued so far.
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Enqueue the listeners a committed mutation affects, in registration
    /// order. Returns how many were newly queued.
    pub fn enqueue_cycle(&mut self, mutation: &Mutation) -> usize {
        self.cycles += 1;
        let mut queued = 0;
        for reg in self.listeners.values_mut() {
            let affected = match reg.scope {
                ListenerScope::Page => true,
                ListenerScope::Portlet => mutation.touches(&reg.fragment),
            };
            if affected && !reg.queued {
                reg.queued = true;
                self.queue.push_back(reg.handle);
                queued += 1;
            }
        }
        queued
    }

    /// Enqueue a single listener outside of a mutation cycle.
    pub fn enqueue_listener(&mut self, handle: ListenerHandle) -> bool {
        match self.listeners.get_mut(&handle) {
            Some(reg) if !reg.queued => {
                reg.queued = true;
                self.queue.push_back(handle);
                true
            }
            _ => false,
        }
    }

    /// Pop the next delivery, skipping listeners removed since they were
    /// queued.
    pub fn next_delivery(&mut self) -> Option<Delivery> {
        while let Some(handle) = self.queue.pop_front() {
            if let Some(reg) = self.listeners.get_mut(&handle) {
                reg.queued = false;
                return Some(Delivery {
                    handle,
                    fragment: reg.fragment.clone(),
                    event_type: reg.event_type.clone(),
                    callback: reg.callback.clone(),
                });
            }
        }
        None
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
