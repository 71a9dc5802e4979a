//! Page state store.
//!
//! Holds each fragment's private parameters and the single shared value of
//! every public parameter. Render states are computed fresh on every read.
//! All writes go through [`PageStateStore::apply_mutation`], which checks the
//! whole delta before touching anything.

use std::collections::{BTreeMap, BTreeSet};

use crate::codec::ParameterMap;
use crate::error::{HubError, Result};

use super::capability::{CapabilityDescriptor, PageDefinition, ParameterAccess};
use super::{FragmentId, PageState, RenderState};

#[derive(Debug, Clone)]
struct FragmentSlot {
    capabilities: CapabilityDescriptor,
    private: ParameterMap,
}

/// Outcome of a committed mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mutation {
    /// Fragment that wrote the delta.
    pub initiator: FragmentId,
    /// Fragments whose render state the delta touched, in page order.
    pub affected: Vec<FragmentId>,
}

impl Mutation {
    pub fn touches(&self, fragment: &str) -> bool {
        self.affected.iter().any(|id| id == fragment)
    }
}

/// Owner of the page state.
#[derive(Debug, Clone, Default)]
pub struct PageStateStore {
    /// Fragment ids in page order.
    order: Vec<FragmentId>,
    fragments: BTreeMap<FragmentId, FragmentSlot>,
    /// Current value of each public parameter that has one.
    public_values: ParameterMap,
    public_owners: BTreeMap<String, FragmentId>,
}

impl PageStateStore {
    /// Build the store from a validated page definition.
    pub fn from_definition(page: &PageDefinition) -> Result<Self> {
        page.validate()?;
        let mut store = Self {
            public_owners: page.public_owners()?,
            ..Self::default()
        };

        for fragment in &page.fragments {
            let mut private = ParameterMap::new();
            for (name, values) in fragment.initial_state.iter() {
                match fragment.capabilities.access(name) {
                    ParameterAccess::Private => private.set(name, values.to_vec()),
                    ParameterAccess::PublicOwner => store.public_values.set(name, values.to_vec()),
                    _ => {}
                }
            }
            store.order.push(fragment.id.clone());
            store.fragments.insert(
                fragment.id.clone(),
                FragmentSlot {
                    capabilities: fragment.capabilities.clone(),
                    private,
                },
            );
        }
        Ok(store)
    }

    pub fn contains(&self, fragment: &str) -> bool {
        self.fragments.contains_key(fragment)
    }

    /// Fragment ids in page order.
    pub fn fragment_ids(&self) -> &[FragmentId] {
        &self.order
    }

    pub fn capabilities(&self, fragment: &str) -> Option<&CapabilityDescriptor> {
        self.fragments.get(fragment).map(|slot| &slot.capabilities)
    }

    /// Owner of a public parameter, if any fragment on the page owns it.
    pub fn public_owner(&self, name: &str) -> Option<&str> {
        self.public_owners.get(name).map(String::as_str)
    }

    /// Compute the render state `fragment` currently sees.
    pub fn render_state(&self, fragment: &str) -> Result<RenderState> {
        let slot = self
            .fragments
            .get(fragment)
            .ok_or_else(|| HubError::UnknownFragment(fragment.to_string()))?;

        let mut state = slot.private.clone();
        for name in slot.capabilities.readable_public() {
            if let Some(values) = self.public_values.get(name) {
                state.set(name, values.to_vec());
            }
        }
        Ok(state)
    }

    /// Render state of every fragment on the page.
    pub fn page_state(&self) -> PageState {
        self.order
            .iter()
            .filter_map(|id| Some((id.clone(), self.render_state(id).ok()?)))
            .collect()
    }

    /// Merge `delta` into the page on behalf of `fragment`.
    ///
    /// Private names go to the fragment's own map, owned public names to the
    /// shared value. An empty value list removes the parameter. If any name
    /// in the delta is not writable by `fragment`, nothing is applied.
    pub fn apply_mutation(&mut self, fragment: &str, delta: &ParameterMap) -> Result<Mutation> {
        let slot = self
            .fragments
            .get(fragment)
            .ok_or_else(|| HubError::UnknownFragment(fragment.to_string()))?;

        let mut private_writes = Vec::new();
        let mut public_writes = Vec::new();
        for (name, values) in delta.iter() {
            match slot.capabilities.access(name) {
                ParameterAccess::Private => private_writes.push((name, values)),
                ParameterAccess::PublicOwner => public_writes.push((name, values)),
                ParameterAccess::PublicReader | ParameterAccess::None => {
                    log::warn!(
                        "[PageStateStore] Rejected write of '{name}' by fragment '{fragment}'"
                    );
                    return Err(HubError::access_denied(fragment, name));
                }
            }
        }

        let mut touched_public = BTreeSet::new();
        if let Some(slot) = self.fragments.get_mut(fragment) {
            for (name, values) in private_writes {
                write(&mut slot.private, name, values);
            }
        }
        for (name, values) in public_writes {
            write(&mut self.public_values, name, values);
            touched_public.insert(name);
        }

        let affected = self
            .order
            .iter()
            .filter(|id| {
                id.as_str() == fragment
                    || self.fragments.get(id.as_str()).is_some_and(|slot| {
                        touched_public
                            .iter()
                            .any(|name| slot.capabilities.access(name).is_public())
                    })
            })
            .cloned()
            .collect();

        log::debug!(
            "[PageStateStore] Fragment '{fragment}' committed {} parameter(s)",
            delta.len()
        );
        Ok(Mutation {
            initiator: fragment.to_string(),
            affected,
        })
    }
}

fn write(target: &mut ParameterMap, name: &str, values: &[Option<String>]) {
    if values.is_empty() {
        target.remove(name);
    } else {
        target.set(name, values.to_vec());
    }
}
