//! Typed, named parameters bound to operations.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The declared type of an operation parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamKind {
    /// A UTF-8 string.
    String,
    /// A signed integer.
    Integer,
    /// A boolean flag.
    Bool,
    /// A list of strings.
    List,
}

impl ParamKind {
    /// Returns `true` if `value` has this kind.
    #[must_use]
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Bool => value.is_boolean(),
            Self::List => value
                .as_array()
                .is_some_and(|items| items.iter().all(Value::is_string)),
        }
    }
}

impl fmt::Display for ParamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String => write!(f, "string"),
            Self::Integer => write!(f, "integer"),
            Self::Bool => write!(f, "bool"),
            Self::List => write!(f, "list"),
        }
    }
}

/// Declaration of one input parameter of an operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamSpec {
    /// Parameter name, referenced as `{name}` in command templates.
    pub name: String,
    /// Expected kind of the bound value.
    pub kind: ParamKind,
    /// Whether the parameter must be bound.
    #[serde(default = "default_required")]
    pub required: bool,
}

fn default_required() -> bool {
    true
}

impl ParamSpec {
    /// A required parameter.
    #[must_use]
    pub fn required(name: impl Into<String>, kind: ParamKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: true,
        }
    }

    /// An optional parameter.
    #[must_use]
    pub fn optional(name: impl Into<String>, kind: ParamKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: false,
        }
    }
}

/// Errors raised while checking bound parameters against their declarations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParamError {
    /// A required parameter has no value.
    #[error("missing required parameter `{name}`")]
    Missing {
        /// Parameter name.
        name: String,
    },
    /// A parameter has a value of the wrong kind.
    #[error("parameter `{name}` must be a {expected}")]
    WrongKind {
        /// Parameter name.
        name: String,
        /// Declared kind.
        expected: ParamKind,
    },
}

/// Concrete parameter values bound to a step.
///
/// Ordered so that serialized plans and rendered diagnostics are stable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Params(BTreeMap<String, Value>);

impl Params {
    /// Empty parameter set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    /// Insert or replace a value.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(name.into(), value.into());
    }

    /// Raw value lookup.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// String value lookup.
    #[must_use]
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(Value::as_str)
    }

    /// Render a value the way it is substituted into a command line.
    ///
    /// Lists are joined with commas; `null` renders as nothing.
    #[must_use]
    pub fn render(&self, name: &str) -> Option<String> {
        self.0.get(name).and_then(render_value)
    }

    /// Check the bound values against `specs`.
    ///
    /// Values without a declaration are allowed; templates may carry extra
    /// context (for example a request id) that no command consumes.
    pub fn check(&self, specs: &[ParamSpec]) -> Result<(), ParamError> {
        for spec in specs {
            match self.0.get(&spec.name) {
                None | Some(Value::Null) if spec.required => {
                    return Err(ParamError::Missing {
                        name: spec.name.clone(),
                    });
                }
                None | Some(Value::Null) => {}
                Some(value) if !spec.kind.accepts(value) => {
                    return Err(ParamError::WrongKind {
                        name: spec.name.clone(),
                        expected: spec.kind,
                    });
                }
                Some(_) => {}
            }
        }
        Ok(())
    }

    /// Iterate over bound names and values.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Number of bound values.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if nothing is bound.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, Value)> for Params {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

fn render_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Array(items) => Some(
            items
                .iter()
                .filter_map(render_value)
                .collect::<Vec<_>>()
                .join(","),
        ),
        Value::Object(_) => Some(value.to_string()),
    }
}
