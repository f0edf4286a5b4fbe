//! Layered configuration of cluster profiles.
//!
//! The configuration is a tree of YAML values. It is assembled once at start-up from user
//! configuration files, `DASK_*` environment variables and the bundled profile defaults, and
//! is then frozen into a [`ConfigContext`] that is passed explicitly to everything that needs
//! to read it.
mod loader;
mod registry;

pub use loader::{
    BUNDLED_CONFIG_FILENAME, ConfigDocument, collect, collect_env, default_config_dir,
    default_search_path, ensure_default_config_file, ensure_file, merge_defaults,
};
pub use registry::{ConfigRegistry, ConfigValue, Priority};

use std::path::{Path, PathBuf};

/// Locations that take part in configuration start-up.
#[derive(Debug, Clone)]
pub struct ConfigPaths {
    /// Directories (or files) from which user configuration is collected, in increasing
    /// priority.
    pub search_path: Vec<PathBuf>,
    /// Directory that receives the user-editable copy of the bundled defaults.
    pub user_dir: PathBuf,
}

impl ConfigPaths {
    pub fn from_env() -> Self {
        Self {
            search_path: default_search_path(),
            user_dir: default_config_dir(),
        }
    }

    /// Uses a single directory both as the search path and as the destination of the
    /// user-editable defaults.
    pub fn with_user_dir(user_dir: PathBuf) -> Self {
        Self {
            search_path: vec![user_dir.clone()],
            user_dir,
        }
    }
}

/// Immutable result of configuration start-up.
#[derive(Debug, Clone)]
pub struct ConfigContext {
    registry: ConfigRegistry,
    user_config_file: Option<PathBuf>,
}

impl ConfigContext {
    /// Collects user configuration, applies environment overrides, makes sure that the
    /// user-editable copy of the bundled defaults exists and finally merges the bundled
    /// defaults underneath everything that is already set.
    pub fn initialize<I>(paths: &ConfigPaths, env: I) -> crate::Result<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let document = ConfigDocument::bundled();

        let mut registry = ConfigRegistry::new();
        collect(&mut registry, &paths.search_path)?;
        collect_env(&mut registry, env);

        let user_config_file = ensure_default_config_file(&document, &paths.user_dir)?;
        merge_defaults(&mut registry, &document, Priority::Old)?;

        Ok(Self {
            registry,
            user_config_file: Some(user_config_file),
        })
    }

    /// Creates a context out of an already assembled registry.
    pub fn from_registry(registry: ConfigRegistry) -> Self {
        Self {
            registry,
            user_config_file: None,
        }
    }

    pub fn registry(&self) -> &ConfigRegistry {
        &self.registry
    }

    pub fn user_config_file(&self) -> Option<&Path> {
        self.user_config_file.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::{BUNDLED_CONFIG_FILENAME, ConfigContext, ConfigPaths};
    use crate::common::error::EtpError;
    use tempfile::TempDir;

    #[test]
    fn test_initialize_creates_user_file_and_merges_defaults() {
        let dir = TempDir::with_prefix("etp").unwrap();
        let paths = ConfigPaths::with_user_dir(dir.path().to_path_buf());

        let context = ConfigContext::initialize(&paths, vec![]).unwrap();
        assert_eq!(
            context.user_config_file().unwrap(),
            dir.path().join(BUNDLED_CONFIG_FILENAME)
        );
        assert_eq!(
            context.registry().get("jobqueue.kitetp.cores").unwrap(),
            &serde_yaml::Value::from(1)
        );
    }

    #[test]
    fn test_initialize_user_settings_win() {
        let dir = TempDir::with_prefix("etp").unwrap();
        std::fs::write(
            dir.path().join("site.yaml"),
            "jobqueue:\n  kitetp:\n    cores: 8\n",
        )
        .unwrap();
        let paths = ConfigPaths::with_user_dir(dir.path().to_path_buf());

        let context = ConfigContext::initialize(
            &paths,
            vec![(
                "DASK_JOBQUEUE__KITETP__MEMORY".to_string(),
                "16 GiB".to_string(),
            )],
        )
        .unwrap();
        let registry = context.registry();
        assert_eq!(
            registry.get("jobqueue.kitetp.cores").unwrap(),
            &serde_yaml::Value::from(8)
        );
        assert_eq!(
            registry.get("jobqueue.kitetp.memory").unwrap(),
            &serde_yaml::Value::from("16 GiB")
        );
        assert_eq!(
            registry.get("jobqueue.kitetp.disk").unwrap(),
            &serde_yaml::Value::from("4 GiB")
        );
    }

    #[test]
    fn test_initialize_twice_is_stable() {
        let dir = TempDir::with_prefix("etp").unwrap();
        let paths = ConfigPaths::with_user_dir(dir.path().to_path_buf());

        let first = ConfigContext::initialize(&paths, vec![]).unwrap();
        // The user-editable copy is fully commented out, so collecting it again changes nothing.
        let second = ConfigContext::initialize(&paths, vec![]).unwrap();
        assert_eq!(first.registry(), second.registry());
    }

    #[test]
    fn test_initialize_unwritable_user_dir() {
        let dir = TempDir::with_prefix("etp").unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "").unwrap();
        let paths = ConfigPaths::with_user_dir(blocker.join("dask"));

        assert!(matches!(
            ConfigContext::initialize(&paths, vec![]),
            Err(EtpError::IoError(_))
        ));
    }
}
