//! Positional argument resolver for the URL builders.
//!
//! URL builder calls take loosely typed positional arguments. Each argument
//! is first classified by shape, then the shapes are bound to parameters.
//! Excess arity and ambiguous combinations are rejected before anything else
//! happens.

use serde_json::Value;

use crate::cacheability::{normalize_one, CacheLevel};
use crate::codec::ParameterMap;
use crate::error::{HubError, Result};

use super::token::UrlKind;

/// Most positional arguments any builder accepts.
pub const MAX_ARGUMENTS: usize = 2;

/// Shape of one positional argument.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgShape {
    /// `null`, treated as omitted.
    Absent,
    /// One of the recognized cacheability tokens.
    Cacheability(CacheLevel),
    /// Any other string.
    Text(String),
    /// Anything else; expected to be a parameter map.
    Parameters(Value),
}

impl ArgShape {
    pub fn classify(value: &Value) -> Self {
        match value {
            Value::Null => Self::Absent,
            Value::String(s) => match s.parse::<CacheLevel>() {
                Ok(level) => Self::Cacheability(level),
                Err(_) => Self::Text(s.clone()),
            },
            other => Self::Parameters(other.clone()),
        }
    }

    fn into_parameters(self) -> Result<ParameterMap> {
        match self {
            Self::Absent => Ok(ParameterMap::new()),
            Self::Parameters(value) => ParameterMap::from_value(&value),
            Self::Text(s) => Err(HubError::InvalidParameters(format!(
                "expected a parameter map, got string '{s}'"
            ))),
            Self::Cacheability(level) => Err(HubError::InvalidParameters(format!(
                "expected a parameter map, got cacheability '{level}'"
            ))),
        }
    }

    fn into_cache_level(self) -> Result<CacheLevel> {
        match self {
            Self::Absent => Ok(CacheLevel::default()),
            Self::Cacheability(level) => Ok(level),
            Self::Text(s) => Err(HubError::InvalidCacheability(s)),
            Self::Parameters(_) => Err(HubError::AmbiguousArguments(
                "resource parameters must precede cacheability".to_string(),
            )),
        }
    }
}

/// Bound arguments of a resource URL call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceArgs {
    pub parameters: ParameterMap,
    pub cache_level: CacheLevel,
}

fn classify_all(args: &[Value]) -> Result<Vec<ArgShape>> {
    if args.len() > MAX_ARGUMENTS {
        return Err(HubError::TooManyArguments {
            max: MAX_ARGUMENTS,
            given: args.len(),
        });
    }
    Ok(args.iter().map(ArgShape::classify).collect())
}

/// Bind `createResourceUrl(resourceParams?, cacheability?)` arguments.
///
/// A lone cacheability token fills the cacheability slot; any other lone
/// value is the parameter map. With two arguments the cacheability token
/// must come second.
pub fn resolve_resource_args(args: &[Value]) -> Result<ResourceArgs> {
    let shapes = classify_all(args)?;
    let tokens: Vec<&str> = args
        .iter()
        .filter_map(Value::as_str)
        .filter(|s| CacheLevel::is_token(s))
        .collect();
    normalize_one(&tokens)?;

    let (parameters, cache_level) = match shapes.as_slice() {
        [] => (ParameterMap::new(), CacheLevel::default()),
        [ArgShape::Cacheability(level)] => (ParameterMap::new(), *level),
        [only] => (only.clone().into_parameters()?, CacheLevel::default()),
        [ArgShape::Parameters(_), ArgShape::Parameters(_)] => {
            return Err(HubError::DuplicateParameters)
        }
        [ArgShape::Cacheability(_), _] => {
            return Err(HubError::AmbiguousArguments(
                "cacheability must follow the resource parameters".to_string(),
            ))
        }
        [first, second] => {
            let parameters = first.clone().into_parameters()?;
            (parameters, second.clone().into_cache_level()?)
        }
        _ => {
            return Err(HubError::TooManyArguments {
                max: MAX_ARGUMENTS,
                given: shapes.len(),
            })
        }
    };
    Ok(ResourceArgs {
        parameters,
        cache_level,
    })
}

/// Bind render or action URL arguments: an optional parameter map.
///
/// The arity rule matches resource URLs; a trailing `null` is ignored and
/// cacheability is rejected because it does not apply to these kinds.
pub fn resolve_parameter_args(kind: UrlKind, args: &[Value]) -> Result<ParameterMap> {
    let shapes = classify_all(args)?;
    if shapes
        .iter()
        .any(|shape| matches!(shape, ArgShape::Cacheability(_)))
    {
        return Err(HubError::AmbiguousArguments(format!(
            "cacheability does not apply to {kind} URLs"
        )));
    }
    match shapes.as_slice() {
        [] => Ok(ParameterMap::new()),
        [only] | [only, ArgShape::Absent] => only.clone().into_parameters(),
        [ArgShape::Parameters(_), ArgShape::Parameters(_)] => Err(HubError::DuplicateParameters),
        _ => Err(HubError::AmbiguousArguments(format!(
            "{kind} URLs take a single parameter map"
        ))),
    }
}
