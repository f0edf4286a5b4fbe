use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};
use serde_yaml::{Mapping, Value};

use crate::common::error::EtpError;
use crate::config::ConfigRegistry;

/// Settings of a cluster profile, as stored under `jobqueue.<profile>` in the registry.
///
/// Every field is optional; explicitly passed settings are layered over the registry values
/// with [`ProfileSettings::overlay`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ProfileSettings {
    pub name: Option<String>,
    pub cores: Option<u32>,
    #[serde(deserialize_with = "deserialize_size")]
    pub memory: Option<String>,
    #[serde(deserialize_with = "deserialize_size")]
    pub disk: Option<String>,
    pub processes: Option<u32>,
    pub python: Option<String>,
    pub death_timeout: Option<Value>,
    pub local_directory: Option<String>,
    pub log_directory: Option<String>,
    pub worker_extra_args: Option<Vec<String>>,
    pub job_extra_directives: Option<Value>,
    pub job_script_prologue: Option<Vec<String>>,
    pub submit_command_extra: Option<Vec<String>>,
    pub cancel_command_extra: Option<Vec<String>>,
    pub scheduler_options: Option<Value>,
}

impl ProfileSettings {
    /// Reads the settings of `profile` out of the registry. A missing profile yields
    /// empty settings.
    pub fn from_registry(registry: &ConfigRegistry, profile: &str) -> crate::Result<Self> {
        let path = format!("jobqueue.{profile}");
        match registry.get(&path) {
            None | Some(Value::Null) => Ok(Self::default()),
            Some(Value::Mapping(mapping)) => {
                serde_yaml::from_value(Value::Mapping(normalize_keys(mapping))).map_err(|e| {
                    EtpError::ParseError(format!("Invalid settings of profile '{profile}': {e}"))
                })
            }
            Some(_) => Err(EtpError::ParseError(format!(
                "Settings of profile '{profile}' have to be a mapping"
            ))),
        }
    }

    /// Returns settings where every value set in `other` replaces the value of `self`.
    pub fn overlay(self, other: ProfileSettings) -> ProfileSettings {
        ProfileSettings {
            name: other.name.or(self.name),
            cores: other.cores.or(self.cores),
            memory: other.memory.or(self.memory),
            disk: other.disk.or(self.disk),
            processes: other.processes.or(self.processes),
            python: other.python.or(self.python),
            death_timeout: other.death_timeout.or(self.death_timeout),
            local_directory: other.local_directory.or(self.local_directory),
            log_directory: other.log_directory.or(self.log_directory),
            worker_extra_args: other.worker_extra_args.or(self.worker_extra_args),
            job_extra_directives: other.job_extra_directives.or(self.job_extra_directives),
            job_script_prologue: other.job_script_prologue.or(self.job_script_prologue),
            submit_command_extra: other.submit_command_extra.or(self.submit_command_extra),
            cancel_command_extra: other.cancel_command_extra.or(self.cancel_command_extra),
            scheduler_options: other.scheduler_options.or(self.scheduler_options),
        }
    }

    /// Parses the configured death timeout. Numbers are seconds, strings may carry a unit
    /// (`90s`, `2m`).
    pub fn death_timeout(&self) -> crate::Result<Option<Duration>> {
        let Some(value) = &self.death_timeout else {
            return Ok(None);
        };
        match value {
            Value::Null => Ok(None),
            Value::Number(n) => n
                .as_f64()
                .filter(|secs| secs.is_finite() && *secs >= 0.0)
                .map(|secs| Some(Duration::from_secs_f64(secs)))
                .ok_or_else(|| EtpError::InvalidValue(format!("invalid death timeout {n}"))),
            Value::String(s) => match s.trim().parse::<u64>() {
                Ok(secs) => Ok(Some(Duration::from_secs(secs))),
                Err(_) => humantime::parse_duration(s.trim())
                    .map(Some)
                    .map_err(|e| EtpError::InvalidValue(format!("invalid death timeout '{s}': {e}"))),
            },
            _ => Err(EtpError::InvalidValue(
                "death timeout has to be a number or a duration".to_string(),
            )),
        }
    }
}

/// Sizes are either a plain number of bytes or a text with a unit (`2 GiB`).
fn deserialize_size<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Size {
        Bytes(u64),
        Text(String),
    }

    Ok(Option::<Size>::deserialize(deserializer)?.map(|size| match size {
        Size::Bytes(bytes) => bytes.to_string(),
        Size::Text(text) => text,
    }))
}

/// Converts top-level keys to the kebab-case form used by the settings fields.
fn normalize_keys(mapping: &Mapping) -> Mapping {
    mapping
        .iter()
        .map(|(key, value)| {
            let key = match key.as_str() {
                Some(name) => Value::from(name.replace('_', "-")),
                None => key.clone(),
            };
            (key, value.clone())
        })
        .collect()
}
