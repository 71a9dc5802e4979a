//! The hub registry: the explicitly owned context shared by every fragment
//! handle.
//!
//! A [`PortletHub`] starts uninitialized. [`PortletHub::bootstrap`] installs
//! the page definition; only then can fragments [`register`](PortletHub::register).
//! All page state, listener registrations and the delivery queue sit behind
//! one lock, and callbacks always run after that lock is released.
//!
//! Deliveries are serialized by a second, reentrant dispatch gate held from
//! the moment a delivery is popped until its callback returns. Listener
//! removal takes the same gate, so once a removal returns no callback of
//! that listener is running or about to run, whichever worker drains.

use std::collections::BTreeSet;
use std::sync::Arc;

use parking_lot::{Mutex, ReentrantMutex};

use crate::codec::ParameterMap;
use crate::config::HubConfig;
use crate::error::{HubError, Result};
use crate::events::NotificationFabric;
use crate::state::{FragmentId, PageDefinition, PageState, PageStateStore};

use super::handle::FragmentHandle;

#[derive(Debug, Default)]
pub(crate) struct HubState {
    /// `None` until bootstrap completes.
    pub(crate) store: Option<PageStateStore>,
    pub(crate) fabric: NotificationFabric,
    /// Fragments that currently hold handles.
    pub(crate) registered: BTreeSet<FragmentId>,
    /// Set while a spawned drain is pending or running; cleared only by a
    /// drain that found the queue empty.
    pub(crate) drain_scheduled: bool,
}

impl HubState {
    pub(crate) fn store(&self) -> Result<&PageStateStore> {
        self.store.as_ref().ok_or(HubError::NotInitialized)
    }

    /// Lifecycle check, then membership check, for operations made through a
    /// fragment handle.
    pub(crate) fn registered_store(&self, fragment: &str) -> Result<&PageStateStore> {
        let store = self.store()?;
        if !self.registered.contains(fragment) {
            return Err(HubError::UnknownFragment(fragment.to_string()));
        }
        Ok(store)
    }
}

#[derive(Debug)]
pub(crate) struct HubInner {
    pub(crate) config: HubConfig,
    pub(crate) state: Mutex<HubState>,
    /// Held across pop and invoke of one delivery. Lock order: gate, then
    /// state.
    pub(crate) dispatch: ReentrantMutex<()>,
}

/// Client-side coordination hub for the fragments on one page.
///
/// Cloning is cheap; clones share the same page.
#[derive(Debug, Clone)]
pub struct PortletHub {
    pub(crate) inner: Arc<HubInner>,
}

impl Default for PortletHub {
    fn default() -> Self {
        Self::new(HubConfig::default())
    }
}

impl PortletHub {
    pub fn new(config: HubConfig) -> Self {
        Self {
            inner: Arc::new(HubInner {
                config,
                state: Mutex::new(HubState::default()),
                dispatch: ReentrantMutex::new(()),
            }),
        }
    }

    pub fn config(&self) -> &HubConfig {
        &self.inner.config
    }

    /// Install the page definition. This is the initialization barrier:
    /// before it completes every operation fails with
    /// [`HubError::NotInitialized`].
    pub fn bootstrap(&self, page: &PageDefinition) -> Result<()> {
        let mut state = self.inner.state.lock();
        if state.store.is_some() {
            return Err(HubError::AlreadyInitialized);
        }
        let store = PageStateStore::from_definition(page)?;
        log::info!(
            "[PortletHub] Bootstrapped page with {} fragment(s)",
            store.fragment_ids().len()
        );
        state.store = Some(store);
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.state.lock().store.is_some()
    }

    /// Fragment ids declared on the page, in page order.
    pub fn fragment_ids(&self) -> Result<Vec<FragmentId>> {
        Ok(self.inner.state.lock().store()?.fragment_ids().to_vec())
    }

    /// Render state of every fragment.
    pub fn page_state(&self) -> Result<PageState> {
        Ok(self.inner.state.lock().store()?.page_state())
    }

    /// Register a fragment and hand back its handle.
    ///
    /// Fails with [`HubError::NotInitialized`] before bootstrap and with
    /// [`HubError::UnknownFragment`] for ids not declared on the page. The
    /// handle is delivered on a later turn of the scheduler.
    pub async fn register(&self, fragment: &str) -> Result<FragmentHandle> {
        {
            let mut state = self.inner.state.lock();
            if !state.store()?.contains(fragment) {
                log::warn!("[PortletHub] Registration of unknown fragment '{fragment}'");
                return Err(HubError::UnknownFragment(fragment.to_string()));
            }
            state.registered.insert(fragment.to_string());
        }
        log::debug!("[PortletHub] Registered fragment '{fragment}'");
        tokio::task::yield_now().await;
        Ok(FragmentHandle::new(fragment.to_string(), self.clone()))
    }

    /// Destroy a fragment's registration: its handles stop working and its
    /// listeners are dropped.
    pub fn unregister(&self, fragment: &str) -> bool {
        let _gate = self.inner.dispatch.lock();
        let mut state = self.inner.state.lock();
        let removed = state.registered.remove(fragment);
        if removed {
            let listeners = state.fabric.remove_fragment(fragment);
            log::debug!(
                "[PortletHub] Unregistered '{fragment}', dropped {listeners} listener(s)"
            );
        }
        removed
    }

    pub fn is_registered(&self, fragment: &str) -> bool {
        self.inner.state.lock().registered.contains(fragment)
    }

    /// Listeners waiting for their next delivery.
    pub fn pending_notifications(&self) -> usize {
        self.inner.state.lock().fabric.pending()
    }

    /// Deliver every queued notification now, on the calling thread.
    ///
    /// Returns the number of callbacks invoked.
    pub fn flush_notifications(&self) -> usize {
        self.inner.drain()
    }

    /// Commit `delta` for `fragment` and start a notification cycle.
    pub(crate) fn apply_mutation(&self, fragment: &str, delta: &ParameterMap) -> Result<()> {
        {
            let mut state = self.inner.state.lock();
            let state = &mut *state;
            state.registered_store(fragment)?;
            let store = state.store.as_mut().ok_or(HubError::NotInitialized)?;
            let mutation = store.apply_mutation(fragment, delta)?;
            state.fabric.enqueue_cycle(&mutation);
        }
        self.schedule_drain();
        Ok(())
    }

    /// Spawn a drain on the current runtime unless one is already pending.
    pub(crate) fn schedule_drain(&self) {
        let mut state = self.inner.state.lock();
        if state.drain_scheduled || state.fabric.pending() == 0 {
            return;
        }
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                state.drain_scheduled = true;
                drop(state);
                let inner = Arc::clone(&self.inner);
                runtime.spawn(async move {
                    inner.drain();
                });
            }
            Err(_) => {
                log::warn!(
                    "[PortletHub] No async runtime; notifications wait for flush_notifications()"
                );
            }
        }
    }
}

impl HubInner {
    /// Deliver queued notifications one at a time, computing each snapshot
    /// at delivery time and invoking the callback outside the state lock.
    ///
    /// Mutations committed by a callback are picked up by the same loop; the
    /// scheduled flag is released only once the queue is observed empty.
    fn drain(&self) -> usize {
        let mut delivered = 0;
        loop {
            let _gate = self.dispatch.lock();
            let next = {
                let mut state = self.state.lock();
                let Some(delivery) = state.fabric.next_delivery() else {
                    state.drain_scheduled = false;
                    break;
                };
                let snapshot = state
                    .store
                    .as_ref()
                    .and_then(|store| store.render_state(&delivery.fragment).ok());
                snapshot.map(|snapshot| (delivery, snapshot))
            };
            if let Some((delivery, snapshot)) = next {
                delivery.invoke(&snapshot);
                delivered += 1;
            }
        }
        delivered
    }
}
