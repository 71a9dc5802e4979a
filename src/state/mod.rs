//! Page state: capability descriptors, the page definition used to
//! bootstrap the hub, and the store holding every fragment's parameters.
//!
//! Fragments never hold a reference into the store. They only receive
//! [`RenderState`] snapshots computed on demand.

pub mod capability;
pub mod store;

pub use capability::{CapabilityDescriptor, FragmentDefinition, PageDefinition, ParameterAccess};
pub use store::{Mutation, PageStateStore};

use std::collections::BTreeMap;

use crate::codec::ParameterMap;

/// Opaque identifier of a fragment, assigned by the page composer.
pub type FragmentId = String;

/// A fragment's private parameters merged with every public parameter it may
/// read.
pub type RenderState = ParameterMap;

/// Render state of every fragment on the page, keyed by fragment id.
pub type PageState = BTreeMap<FragmentId, RenderState>;
