//! URL construction.
//!
//! - [`args`]: classifies and binds the loosely typed builder arguments.
//! - [`token`]: the encoded URL payload shared with the server side.
//! - [`builder`]: composes URLs from a page state snapshot.

pub mod args;
pub mod builder;
pub mod token;

pub use args::{resolve_parameter_args, resolve_resource_args, ArgShape, ResourceArgs};
pub use builder::UrlBuilder;
pub use token::{UrlKind, UrlToken, TOKEN_VERSION};
