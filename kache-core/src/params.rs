//! Parameter sets, call arguments and signature binding.
//!
//! A [`Signature`] declares the parameters a computation accepts, in order,
//! with optional defaults. Binding a [`CallArgs`] against it yields the
//! complete, canonical [`ParameterSet`] that key derivation works on, so the
//! same logical call produces the same parameters whether its arguments were
//! supplied positionally or by keyword.

use std::collections::btree_map::{self, BTreeMap};
use std::collections::HashSet;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::BindError;

/// Any value that can be bound to a parameter.
pub type ParamValue = serde_json::Value;

/// Complete mapping from parameter name to bound value.
///
/// Backed by a `BTreeMap`, so iteration is always in name order no matter
/// how the entries were inserted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterSet {
    entries: BTreeMap<String, ParamValue>,
}

impl ParameterSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.insert(name, value);
        self
    }

    /// Insert or replace a parameter, returning the previous value.
    pub fn insert(
        &mut self,
        name: impl Into<String>,
        value: impl Into<ParamValue>,
    ) -> Option<ParamValue> {
        self.entries.insert(name.into(), value.into())
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.entries.get(name)
    }

    /// Decode a bound parameter into a concrete type.
    pub fn get_as<T: DeserializeOwned>(&self, name: &str) -> Result<T, BindError> {
        let value = self.get(name).ok_or_else(|| BindError::MissingArgument {
            name: name.to_string(),
        })?;
        T::deserialize(value).map_err(|e| BindError::InvalidType {
            name: name.to_string(),
            reason: e.to_string(),
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate entries in name order.
    pub fn iter(&self) -> btree_map::Iter<'_, String, ParamValue> {
        self.entries.iter()
    }
}

impl<K, V> FromIterator<(K, V)> for ParameterSet
where
    K: Into<String>,
    V: Into<ParamValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl<'a> IntoIterator for &'a ParameterSet {
    type Item = (&'a String, &'a ParamValue);
    type IntoIter = btree_map::Iter<'a, String, ParamValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// Arguments of a single call, as the caller wrote them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallArgs {
    pub positional: Vec<ParamValue>,
    pub keyword: BTreeMap<String, ParamValue>,
}

impl CallArgs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a positional argument.
    pub fn arg(mut self, value: impl Into<ParamValue>) -> Self {
        self.positional.push(value.into());
        self
    }

    /// Set a keyword argument.
    pub fn kwarg(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.keyword.insert(name.into(), value.into());
        self
    }
}

/// One declared parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub default: Option<ParamValue>,
}

/// Ordered parameter declarations of a computation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Signature {
    params: Vec<Parameter>,
}

impl Signature {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a required parameter.
    pub fn param(mut self, name: impl Into<String>) -> Self {
        self.params.push(Parameter {
            name: name.into(),
            default: None,
        });
        self
    }

    /// Declare a parameter with a default value.
    pub fn param_with_default(
        mut self,
        name: impl Into<String>,
        default: impl Into<ParamValue>,
    ) -> Self {
        self.params.push(Parameter {
            name: name.into(),
            default: Some(default.into()),
        });
        self
    }

    pub fn params(&self) -> &[Parameter] {
        &self.params
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Resolve call arguments into a complete parameter set.
    ///
    /// Positional arguments fill parameters in declaration order, keyword
    /// arguments fill them by name, and anything left takes its default.
    pub fn bind(&self, args: &CallArgs) -> Result<ParameterSet, BindError> {
        let mut seen = HashSet::with_capacity(self.params.len());
        for param in &self.params {
            if !seen.insert(param.name.as_str()) {
                return Err(BindError::DuplicateDeclaration {
                    name: param.name.clone(),
                });
            }
        }

        if args.positional.len() > self.params.len() {
            return Err(BindError::TooManyPositional {
                expected: self.params.len(),
                got: args.positional.len(),
            });
        }

        if let Some(name) = args.keyword.keys().find(|name| !seen.contains(name.as_str())) {
            return Err(BindError::UnknownParameter { name: name.clone() });
        }

        let mut bound = ParameterSet::new();
        for (index, param) in self.params.iter().enumerate() {
            let positional = args.positional.get(index);
            let keyword = args.keyword.get(&param.name);

            let value = match (positional, keyword) {
                (Some(_), Some(_)) => {
                    return Err(BindError::DuplicateArgument {
                        name: param.name.clone(),
                    })
                }
                (Some(value), None) | (None, Some(value)) => value.clone(),
                (None, None) => match &param.default {
                    Some(default) => default.clone(),
                    None => {
                        return Err(BindError::MissingArgument {
                            name: param.name.clone(),
                        })
                    }
                },
            };
            bound.insert(param.name.clone(), value);
        }

        Ok(bound)
    }
}
