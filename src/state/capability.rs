//! Capability descriptors and the page definition.
//!
//! A fragment's descriptor lists the private parameters it owns, the public
//! parameters it owns, and the public parameters it only reads. The page
//! definition is checked once at bootstrap: a name is never both private and
//! public for one fragment, and every public name has a single owner.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::codec::ParameterMap;
use crate::error::{HubError, Result};

use super::FragmentId;

/// How a fragment may touch a given parameter name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterAccess {
    /// Private to the fragment: read and write.
    Private,
    /// Public and owned by the fragment: read and write.
    PublicOwner,
    /// Public, owned elsewhere: read only.
    PublicReader,
    /// Not declared by the fragment.
    None,
}

impl ParameterAccess {
    pub fn can_write(self) -> bool {
        matches!(self, Self::Private | Self::PublicOwner)
    }

    pub fn can_read(self) -> bool {
        !matches!(self, Self::None)
    }

    pub fn is_public(self) -> bool {
        matches!(self, Self::PublicOwner | Self::PublicReader)
    }
}

/// Per-fragment parameter capabilities.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityDescriptor {
    /// Names visible and writable only by this fragment.
    #[serde(default)]
    pub private_parameters: BTreeSet<String>,
    /// Public names this fragment owns (writes).
    #[serde(default)]
    pub owned_public_parameters: BTreeSet<String>,
    /// Public names this fragment reads but does not own.
    #[serde(default)]
    pub subscribed_public_parameters: BTreeSet<String>,
}

impl CapabilityDescriptor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add private parameter names.
    pub fn with_private<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.private_parameters
            .extend(names.into_iter().map(Into::into));
        self
    }

    /// Add owned public parameter names.
    pub fn owning<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.owned_public_parameters
            .extend(names.into_iter().map(Into::into));
        self
    }

    /// Add subscribed (read-only) public parameter names.
    pub fn subscribing<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.subscribed_public_parameters
            .extend(names.into_iter().map(Into::into));
        self
    }

    /// Resolve the access this fragment has to `name`.
    pub fn access(&self, name: &str) -> ParameterAccess {
        if self.private_parameters.contains(name) {
            ParameterAccess::Private
        } else if self.owned_public_parameters.contains(name) {
            ParameterAccess::PublicOwner
        } else if self.subscribed_public_parameters.contains(name) {
            ParameterAccess::PublicReader
        } else {
            ParameterAccess::None
        }
    }

    /// Every public name this fragment can read, owned or subscribed.
    pub fn readable_public(&self) -> impl Iterator<Item = &str> {
        self.owned_public_parameters
            .union(&self.subscribed_public_parameters)
            .map(String::as_str)
    }

    /// Check the private/public disjointness invariant.
    pub fn validate(&self, fragment: &str) -> Result<()> {
        let clash = self.private_parameters.iter().find(|name| {
            self.owned_public_parameters.contains(*name)
                || self.subscribed_public_parameters.contains(*name)
        });
        if let Some(name) = clash {
            return Err(HubError::InvalidPageDefinition(format!(
                "fragment '{fragment}' declares '{name}' as both private and public"
            )));
        }
        if let Some(name) = self
            .owned_public_parameters
            .intersection(&self.subscribed_public_parameters)
            .next()
        {
            return Err(HubError::InvalidPageDefinition(format!(
                "fragment '{fragment}' both owns and subscribes to '{name}'"
            )));
        }
        Ok(())
    }
}

/// One fragment as declared by the page composer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FragmentDefinition {
    pub id: FragmentId,
    #[serde(default)]
    pub capabilities: CapabilityDescriptor,
    /// Initial values for private and owned public parameters.
    #[serde(default)]
    pub initial_state: ParameterMap,
}

impl FragmentDefinition {
    pub fn new(id: impl Into<FragmentId>, capabilities: CapabilityDescriptor) -> Self {
        Self {
            id: id.into(),
            capabilities,
            initial_state: ParameterMap::new(),
        }
    }

    pub fn with_initial_state(mut self, state: ParameterMap) -> Self {
        self.initial_state = state;
        self
    }
}

/// The set of fragments on a page, in page order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageDefinition {
    #[serde(default)]
    pub fragments: Vec<FragmentDefinition>,
}

impl PageDefinition {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_fragment(mut self, fragment: FragmentDefinition) -> Self {
        self.fragments.push(fragment);
        self
    }

    /// Load a page definition from JSON.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let page: Self = serde_json::from_str(json)?;
        page.validate()?;
        Ok(page)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_json_str(&std::fs::read_to_string(path)?)
    }

    /// Owner of every public parameter on the page.
    pub fn public_owners(&self) -> Result<BTreeMap<String, FragmentId>> {
        let mut owners: BTreeMap<String, FragmentId> = BTreeMap::new();
        for fragment in &self.fragments {
            for name in &fragment.capabilities.owned_public_parameters {
                if let Some(existing) = owners.insert(name.clone(), fragment.id.clone()) {
                    return Err(HubError::InvalidPageDefinition(format!(
                        "public parameter '{name}' is owned by both '{existing}' and '{}'",
                        fragment.id
                    )));
                }
            }
        }
        Ok(owners)
    }

    /// Check all page-level invariants.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for fragment in &self.fragments {
            if fragment.id.is_empty() {
                return Err(HubError::InvalidPageDefinition(
                    "fragment id must not be empty".to_string(),
                ));
            }
            if !seen.insert(fragment.id.as_str()) {
                return Err(HubError::InvalidPageDefinition(format!(
                    "duplicate fragment id '{}'",
                    fragment.id
                )));
            }
            fragment.capabilities.validate(&fragment.id)?;
            for name in fragment.initial_state.names() {
                if !fragment.capabilities.access(name).can_write() {
                    return Err(HubError::InvalidPageDefinition(format!(
                        "fragment '{}' sets initial value for '{name}' it does not own",
                        fragment.id
                    )));
                }
            }
        }
        self.public_owners().map(|_| ())
    }
}
