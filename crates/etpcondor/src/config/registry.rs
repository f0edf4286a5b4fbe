use serde::de::DeserializeOwned;
use serde_yaml::{Mapping, Value};

use crate::common::error::EtpError;

pub type ConfigValue = Value;

/// Decides which side wins when a merged key already exists in the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Priority {
    /// Existing values are kept, incoming values only fill in missing keys.
    Old,
    /// Incoming values overwrite existing ones.
    New,
}

/// Hierarchical configuration tree addressed by dotted paths (`jobqueue.kitetp.cores`).
///
/// Keys are matched with `-` and `_` treated as equivalent, so `worker_extra_args` and
/// `worker-extra-args` address the same entry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigRegistry {
    root: Mapping,
}

impl ConfigRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_mapping(root: Mapping) -> Self {
        Self { root }
    }

    pub fn as_mapping(&self) -> &Mapping {
        &self.root
    }

    /// Returns the value stored under a dotted `path`, if it exists.
    pub fn get(&self, path: &str) -> Option<&Value> {
        let mut current = &self.root;
        let mut segments = split_path(path).peekable();
        while let Some(segment) = segments.next() {
            let key = find_key(current, segment)?;
            let value = current.get(&key)?;
            if segments.peek().is_none() {
                return Some(value);
            }
            current = value.as_mapping()?;
        }
        None
    }

    /// Deserializes the value under `path`. Returns `Ok(None)` if the path does not exist.
    pub fn get_as<T: DeserializeOwned>(&self, path: &str) -> crate::Result<Option<T>> {
        match self.get(path) {
            Some(value) => serde_yaml::from_value(value.clone())
                .map(Some)
                .map_err(|e| EtpError::ParseError(format!("Invalid value of '{path}': {e}"))),
            None => Ok(None),
        }
    }

    /// Stores `value` under a dotted `path`, creating intermediate mappings on the way.
    /// Intermediate values that are not mappings are replaced.
    pub fn set(&mut self, path: &str, value: Value) {
        let segments: Vec<&str> = split_path(path).collect();
        let Some((last, parents)) = segments.split_last() else {
            return;
        };
        let mut current = &mut self.root;
        for segment in parents {
            let key = find_key(current, segment).unwrap_or_else(|| Value::from(*segment));
            let entry = current
                .entry(key)
                .or_insert_with(|| Value::Mapping(Mapping::new()));
            if !entry.is_mapping() {
                *entry = Value::Mapping(Mapping::new());
            }
            current = match entry {
                Value::Mapping(mapping) => mapping,
                _ => unreachable!(),
            };
        }
        let key = find_key(current, last).unwrap_or_else(|| Value::from(*last));
        current.insert(key, value);
    }

    /// Merges `source` into the registry.
    ///
    /// Mappings are merged recursively. For leaf values, `priority` decides whether the
    /// existing or the incoming value is kept.
    pub fn update(&mut self, source: &Mapping, priority: Priority) {
        update_mapping(&mut self.root, source, priority);
    }
}

fn split_path(path: &str) -> impl Iterator<Item = &str> {
    path.split('.').filter(|s| !s.is_empty())
}

fn alternative_key(key: &str) -> Option<String> {
    if key.contains('-') {
        Some(key.replace('-', "_"))
    } else if key.contains('_') {
        Some(key.replace('_', "-"))
    } else {
        None
    }
}

/// Finds the key under which `name` is stored in `mapping`, preferring an exact match.
fn find_key(mapping: &Mapping, name: &str) -> Option<Value> {
    let exact = Value::from(name);
    if mapping.contains_key(&exact) {
        return Some(exact);
    }
    let alternative = Value::from(alternative_key(name)?);
    mapping.contains_key(&alternative).then_some(alternative)
}

fn update_mapping(target: &mut Mapping, source: &Mapping, priority: Priority) {
    for (key, value) in source {
        let key = match key.as_str() {
            Some(name) => find_key(target, name).unwrap_or_else(|| key.clone()),
            None => key.clone(),
        };
        match value {
            Value::Mapping(inner) => {
                if let Some(Value::Mapping(existing)) = target.get_mut(&key) {
                    update_mapping(existing, inner, priority);
                } else if priority == Priority::Old
                    && target.get(&key).is_some_and(|existing| !existing.is_null())
                {
                    log::debug!("Keeping existing non-mapping value of {key:?}");
                } else {
                    let mut fresh = Mapping::new();
                    update_mapping(&mut fresh, inner, priority);
                    target.insert(key, Value::Mapping(fresh));
                }
            }
            _ => {
                if priority == Priority::New || !target.contains_key(&key) {
                    target.insert(key, value.clone());
                }
            }
        }
    }
}
