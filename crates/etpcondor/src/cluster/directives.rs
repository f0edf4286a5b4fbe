use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use serde::Serialize;
use serde_yaml::Value;

use crate::common::error::EtpError;

/// HTCondor submit directives (`name = value`), keyed case-sensitively.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct DirectiveSet(BTreeMap<String, String>);

impl DirectiveSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<K: Into<String>, V: Into<String>>(&mut self, name: K, value: V) {
        self.0.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(|v| v.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Builds a directive set out of a YAML mapping. Scalars are converted to their textual
    /// form; null values are skipped.
    pub fn from_yaml(value: &Value) -> crate::Result<Self> {
        let mapping = match value {
            Value::Null => return Ok(Self::new()),
            Value::Mapping(mapping) => mapping,
            _ => {
                return Err(EtpError::InvalidValue(
                    "job directives have to be a mapping".to_string(),
                ));
            }
        };
        let mut directives = Self::new();
        for (name, value) in mapping {
            let name = scalar_to_string(name)
                .ok_or_else(|| EtpError::InvalidValue(format!("invalid directive {name:?}")))?;
            if value.is_null() {
                continue;
            }
            let value = scalar_to_string(value).ok_or_else(|| {
                EtpError::InvalidValue(format!("directive '{name}' has to be a scalar"))
            })?;
            directives.insert(name, value);
        }
        Ok(directives)
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for DirectiveSet {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// Named source of directives taking part in resolution.
#[derive(Debug, Clone)]
pub struct DirectiveLayer {
    name: &'static str,
    directives: DirectiveSet,
}

impl DirectiveLayer {
    pub fn new(name: &'static str, directives: DirectiveSet) -> Self {
        Self { name, directives }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn directives(&self) -> &DirectiveSet {
        &self.directives
    }
}

impl Display for DirectiveLayer {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({} directives)", self.name, self.directives.len())
    }
}

/// Folds `layers` into a single directive set. A directive from a later layer replaces the
/// same directive from any earlier layer.
pub fn resolve_layers(layers: &[DirectiveLayer]) -> DirectiveSet {
    layers.iter().fold(DirectiveSet::new(), |mut resolved, layer| {
        for (name, value) in layer.directives.iter() {
            if let Some(previous) = resolved.get(name) {
                if previous != value {
                    log::debug!(
                        "Directive {name} overridden by {}: {previous} -> {value}",
                        layer.name
                    );
                }
            }
            resolved.insert(name, value);
        }
        resolved
    })
}
