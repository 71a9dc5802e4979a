//! Error types for the portlet hub.
//!
//! Every fallible hub operation returns [`HubError`]. Errors fall into the
//! four classes reported by [`HubError::kind`]; argument errors are the
//! "TypeError" class and are always raised before any deferred work starts.

use thiserror::Error;

/// Broad classification of a [`HubError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed call: wrong arity, ambiguous or invalid arguments.
    Argument,
    /// A fragment touched a parameter it does not own, or is not on the page.
    Access,
    /// The hub has not been (or has already been) bootstrapped.
    Lifecycle,
    /// A URL token, configuration or page definition could not be loaded.
    Codec,
}

/// Errors raised by the portlet hub.
#[derive(Debug, Error)]
pub enum HubError {
    /// More positional arguments than the operation accepts.
    #[error("Too many arguments: expected at most {max}, got {given}")]
    TooManyArguments { max: usize, given: usize },

    /// Arguments whose roles cannot be told apart by position and shape.
    #[error("Ambiguous arguments: {0}")]
    AmbiguousArguments(String),

    /// Two cacheability tokens were supplied.
    #[error("Duplicate cacheability arguments")]
    DuplicateCacheability,

    /// Two parameter maps were supplied.
    #[error("Duplicate parameter arguments")]
    DuplicateParameters,

    /// A parameter map did not have the `name -> [string | null]` shape.
    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    /// A cacheability token outside the recognized set.
    #[error("Invalid cacheability: {0}")]
    InvalidCacheability(String),

    /// Event type other than the state-change event.
    #[error("Unsupported event type: {0}")]
    UnsupportedEventType(String),

    /// A fragment tried to write a parameter it does not own.
    #[error("Access denied: fragment '{fragment}' may not write parameter '{parameter}'")]
    AccessDenied { fragment: String, parameter: String },

    /// The fragment id is not declared on the page.
    #[error("Unknown fragment: {0}")]
    UnknownFragment(String),

    /// The hub has not completed its page-state bootstrap.
    #[error("Portlet hub is not initialized")]
    NotInitialized,

    /// Bootstrap was attempted twice.
    #[error("Portlet hub is already initialized")]
    AlreadyInitialized,

    /// The page definition violates a capability invariant.
    #[error("Invalid page definition: {0}")]
    InvalidPageDefinition(String),

    /// A URL token could not be decoded.
    #[error("Invalid URL token: {0}")]
    InvalidToken(String),

    /// JSON (de)serialization failure.
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// A configuration or page definition file could not be read.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl HubError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::TooManyArguments { .. }
            | Self::AmbiguousArguments(_)
            | Self::DuplicateCacheability
            | Self::DuplicateParameters
            | Self::InvalidParameters(_)
            | Self::InvalidCacheability(_)
            | Self::UnsupportedEventType(_) => ErrorKind::Argument,
            Self::AccessDenied { .. } | Self::UnknownFragment(_) => ErrorKind::Access,
            Self::NotInitialized | Self::AlreadyInitialized => ErrorKind::Lifecycle,
            Self::InvalidPageDefinition(_)
            | Self::InvalidToken(_)
            | Self::Json(_)
            | Self::Io(_) => ErrorKind::Codec,
        }
    }

    /// Whether this is an argument-shape error (the TypeError class).
    pub fn is_type_error(&self) -> bool {
        self.kind() == ErrorKind::Argument
    }

    pub(crate) fn access_denied(fragment: &str, parameter: &str) -> Self {
        Self::AccessDenied {
            fragment: fragment.to_string(),
            parameter: parameter.to_string(),
        }
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, HubError>;
