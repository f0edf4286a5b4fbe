use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Context;
use itertools::Itertools;
use serde_yaml::{Mapping, Value};
use tempfile::NamedTempFile;

use crate::common::env::{DASK_CONFIG, DASK_ENV_PREFIX, DASK_ROOT_CONFIG, is_dask_env};
use crate::common::error::EtpError;
use crate::common::utils::fs::{expand_home, is_yaml_file};
use crate::config::registry::{ConfigRegistry, Priority};

/// File name of the bundled profile defaults (and of their user-editable copy).
pub const BUNDLED_CONFIG_FILENAME: &str = "jobqueue-kitetp.yaml";

const BUNDLED_CONFIG: &str = include_str!("jobqueue-kitetp.yaml");

/// A configuration document together with the name under which it is installed.
#[derive(Debug, Clone)]
pub struct ConfigDocument {
    name: String,
    content: String,
}

impl ConfigDocument {
    /// The profile defaults compiled into the binary.
    pub fn bundled() -> Self {
        Self {
            name: BUNDLED_CONFIG_FILENAME.to_string(),
            content: BUNDLED_CONFIG.to_string(),
        }
    }

    /// Reads a document from disk. A missing file results in a `NotFound` I/O error.
    pub fn read(path: &Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .ok_or_else(|| EtpError::InvalidValue(format!("{} is not a file", path.display())))?;
        Ok(Self { name, content })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    /// Parses the document into a mapping. An empty document yields an empty mapping.
    pub fn parse(&self) -> crate::Result<Mapping> {
        parse_document(&self.content)
            .map_err(|e| EtpError::ParseError(format!("Cannot parse {}: {e}", self.name)))
    }
}

fn parse_document(content: &str) -> anyhow::Result<Mapping> {
    match serde_yaml::from_str::<Value>(content)? {
        Value::Null => Ok(Mapping::new()),
        Value::Mapping(mapping) => Ok(mapping),
        _ => anyhow::bail!("top-level value has to be a mapping"),
    }
}

/// Directory that holds the user configuration: `$DASK_CONFIG` or `~/.config/dask`.
pub fn default_config_dir() -> PathBuf {
    match std::env::var_os(DASK_CONFIG) {
        Some(dir) if !dir.is_empty() => expand_home(Path::new(&dir)),
        _ => {
            let mut dir = dirs::home_dir().unwrap_or_else(std::env::temp_dir);
            dir.push(".config");
            dir.push("dask");
            dir
        }
    }
}

/// Locations searched for user configuration, in increasing priority.
pub fn default_search_path() -> Vec<PathBuf> {
    let root = std::env::var_os(DASK_ROOT_CONFIG)
        .filter(|dir| !dir.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("/etc"));

    let mut paths = vec![root.join("dask")];
    if let Some(home) = dirs::home_dir() {
        paths.push(home.join(".config").join("dask"));
    }
    paths.push(default_config_dir());
    paths.into_iter().unique().collect()
}

/// Makes sure that a copy of `document` exists in `destination`.
///
/// If `destination` is a directory (or has no extension), the document name is appended to it.
/// An existing file is never touched. With `comment`, every line of the copy is commented
/// out, so that it documents the defaults without overriding anything.
/// Returns the path of the (possibly pre-existing) file.
pub fn ensure_file(
    document: &ConfigDocument,
    destination: &Path,
    comment: bool,
) -> crate::Result<PathBuf> {
    let destination = expand_home(destination);
    let (directory, path) = if destination.is_dir() || destination.extension().is_none() {
        (destination.clone(), destination.join(document.name()))
    } else {
        let directory = destination
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        (directory, destination)
    };

    if path.exists() {
        log::debug!("Configuration file {} already exists", path.display());
        return Ok(path);
    }

    std::fs::create_dir_all(&directory)?;

    let content = if comment {
        comment_out(document.content())
    } else {
        document.content().to_string()
    };

    // Write into a temporary file first, so that a partially written file is never observed
    let mut file = NamedTempFile::new_in(&directory)?;
    file.write_all(content.as_bytes())?;
    file.persist_noclobber(&path).map_err(|e| e.error)?;

    log::info!("Default configuration written into {}", path.display());
    Ok(path)
}

/// Makes sure that the user-editable (commented out) copy of the profile defaults exists
/// in `config_dir`.
pub fn ensure_default_config_file(
    document: &ConfigDocument,
    config_dir: &Path,
) -> crate::Result<PathBuf> {
    ensure_file(document, config_dir, true)
}

fn comment_out(content: &str) -> String {
    content
        .lines()
        .map(|line| {
            if line.is_empty() {
                String::new()
            } else {
                format!("# {line}")
            }
        })
        .join("\n")
        + "\n"
}

/// Merges `document` into `registry`. With [`Priority::Old`], values that are already present
/// in the registry are kept and the document only provides defaults.
pub fn merge_defaults(
    registry: &mut ConfigRegistry,
    document: &ConfigDocument,
    priority: Priority,
) -> crate::Result<()> {
    let defaults = document.parse()?;
    registry.update(&defaults, priority);
    log::debug!("Merged {} into the configuration", document.name());
    Ok(())
}

/// Collects configuration files from `paths` into `registry`, later files overriding
/// earlier ones.
///
/// Directories contribute all of their `.yaml`/`.yml` files in alphabetical order.
/// Paths that do not exist are skipped.
pub fn collect(registry: &mut ConfigRegistry, paths: &[PathBuf]) -> crate::Result<()> {
    for path in paths {
        let files = if path.is_dir() {
            let mut files = std::fs::read_dir(path)
                .with_context(|| format!("Cannot read configuration directory {}", path.display()))?
                .map(|entry| entry.map(|e| e.path()))
                .collect::<std::io::Result<Vec<_>>>()?;
            files.retain(|file| is_yaml_file(file));
            files.sort();
            files
        } else if path.is_file() {
            vec![path.clone()]
        } else {
            continue;
        };

        for file in files {
            log::debug!("Loading configuration file {}", file.display());
            let mapping = ConfigDocument::read(&file)?.parse()?;
            registry.update(&mapping, Priority::New);
        }
    }
    Ok(())
}

/// Applies `DASK_*` environment variables to `registry`.
///
/// `DASK_JOBQUEUE__KITETP__CORES=4` sets `jobqueue.kitetp.cores` to the integer `4`.
/// Values are parsed as YAML scalars and fall back to plain strings.
pub fn collect_env<I>(registry: &mut ConfigRegistry, env: I)
where
    I: IntoIterator<Item = (String, String)>,
{
    let mut variables: Vec<(String, String)> = env
        .into_iter()
        .filter(|(name, _)| is_dask_env(name) && name != DASK_CONFIG && name != DASK_ROOT_CONFIG)
        .collect();
    variables.sort();

    for (name, value) in variables {
        let path = name[DASK_ENV_PREFIX.len()..]
            .to_lowercase()
            .split("__")
            .join(".");
        let value = serde_yaml::from_str::<Value>(&value)
            .ok()
            .filter(|parsed| !parsed.is_mapping() && !parsed.is_sequence())
            .unwrap_or(Value::String(value));
        log::debug!("Environment override of {path}");
        registry.set(&path, value);
    }
}

#[cfg(test)]
mod tests {
    use super::{
        BUNDLED_CONFIG_FILENAME, ConfigDocument, collect, collect_env, ensure_default_config_file,
        ensure_file, merge_defaults,
    };
    use crate::common::error::EtpError;
    use crate::config::{ConfigRegistry, Priority};
    use serde_yaml::Value;
    use tempfile::TempDir;

    fn document(content: &str) -> ConfigDocument {
        ConfigDocument {
            name: "test.yaml".to_string(),
            content: content.to_string(),
        }
    }

    #[test]
    fn test_bundled_document_parses() {
        let mapping = ConfigDocument::bundled().parse().unwrap();
        let registry = ConfigRegistry::from_mapping(mapping);
        assert!(registry.get("jobqueue.kitetp.job-extra-directives").is_some());
        assert_eq!(
            registry.get("jobqueue.kitetp.memory"),
            Some(&Value::from("2 GiB"))
        );
    }

    #[test]
    fn test_read_missing_document() {
        let dir = TempDir::with_prefix("etp").unwrap();
        match ConfigDocument::read(&dir.path().join("missing.yaml")) {
            Err(EtpError::IoError(e)) => assert_eq!(e.kind(), std::io::ErrorKind::NotFound),
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn test_parse_malformed_document() {
        assert!(matches!(
            document("a: [1, 2\n").parse(),
            Err(EtpError::ParseError(_))
        ));
        assert!(matches!(
            document("- 1\n- 2\n").parse(),
            Err(EtpError::ParseError(_))
        ));
        assert!(document("# only comments\n").parse().unwrap().is_empty());
    }

    #[test]
    fn test_ensure_file_creates_commented_copy() {
        let dir = TempDir::with_prefix("etp").unwrap();
        let target = dir.path().join("nested");
        let path = ensure_file(&ConfigDocument::bundled(), &target, true).unwrap();
        assert_eq!(path, target.join(BUNDLED_CONFIG_FILENAME));

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(
            content
                .lines()
                .all(|line| line.is_empty() || line.starts_with('#'))
        );
        assert!(content.contains("# jobqueue:"));
    }

    #[test]
    fn test_ensure_file_never_overwrites() {
        let dir = TempDir::with_prefix("etp").unwrap();
        let path = dir.path().join(BUNDLED_CONFIG_FILENAME);
        std::fs::write(&path, "jobqueue: {}\n").unwrap();

        let result = ensure_file(&ConfigDocument::bundled(), dir.path(), true).unwrap();
        assert_eq!(result, path);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "jobqueue: {}\n");
    }

    #[test]
    fn test_ensure_default_config_file_unwritable() {
        let dir = TempDir::with_prefix("etp").unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "").unwrap();

        assert!(matches!(
            ensure_default_config_file(&ConfigDocument::bundled(), &blocker.join("dask")),
            Err(EtpError::IoError(_))
        ));
    }

    #[test]
    fn test_ensure_file_explicit_file_name() {
        let dir = TempDir::with_prefix("etp").unwrap();
        let target = dir.path().join("custom.yaml");
        let path = ensure_file(&document("a: 1\n"), &target, false).unwrap();
        assert_eq!(path, target);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "a: 1\n");
    }

    #[test]
    fn test_merge_defaults_keeps_existing() {
        let mut registry = ConfigRegistry::new();
        registry.set("jobqueue.kitetp.cores", Value::from(16));
        merge_defaults(&mut registry, &ConfigDocument::bundled(), Priority::Old).unwrap();
        assert_eq!(registry.get("jobqueue.kitetp.cores"), Some(&Value::from(16)));

        let merged = registry.clone();
        merge_defaults(&mut registry, &ConfigDocument::bundled(), Priority::Old).unwrap();
        assert_eq!(registry, merged);
    }

    #[test]
    fn test_merge_defaults_malformed() {
        let mut registry = ConfigRegistry::new();
        assert!(matches!(
            merge_defaults(&mut registry, &document("a: b: c"), Priority::Old),
            Err(EtpError::ParseError(_))
        ));
    }

    #[test]
    fn test_collect_sorted_files() {
        let dir = TempDir::with_prefix("etp").unwrap();
        std::fs::write(dir.path().join("a.yaml"), "x: 1\ny: 1\n").unwrap();
        std::fs::write(dir.path().join("b.yml"), "x: 2\n").unwrap();
        std::fs::write(dir.path().join("c.txt"), "x: 3\n").unwrap();

        let mut registry = ConfigRegistry::new();
        collect(
            &mut registry,
            &[dir.path().to_path_buf(), dir.path().join("missing")],
        )
        .unwrap();
        assert_eq!(registry.get("x"), Some(&Value::from(2)));
        assert_eq!(registry.get("y"), Some(&Value::from(1)));
    }

    #[test]
    fn test_collect_invalid_file() {
        let dir = TempDir::with_prefix("etp").unwrap();
        std::fs::write(dir.path().join("broken.yaml"), "x: [1\n").unwrap();
        let mut registry = ConfigRegistry::new();
        assert!(matches!(
            collect(&mut registry, &[dir.path().to_path_buf()]),
            Err(EtpError::ParseError(_))
        ));
    }

    #[test]
    fn test_collect_env() {
        let mut registry = ConfigRegistry::new();
        collect_env(
            &mut registry,
            vec![
                ("DASK_JOBQUEUE__KITETP__CORES".to_string(), "4".to_string()),
                (
                    "DASK_JOBQUEUE__KITETP__PYTHON".to_string(),
                    "/opt/bin/python".to_string(),
                ),
                ("DASK_JOBQUEUE__KITETP__X".to_string(), "[1".to_string()),
                ("DASK_CONFIG".to_string(), "/tmp".to_string()),
                ("HOME".to_string(), "/home/user".to_string()),
            ],
        );
        assert_eq!(registry.get("jobqueue.kitetp.cores"), Some(&Value::from(4)));
        assert_eq!(
            registry.get("jobqueue.kitetp.python"),
            Some(&Value::from("/opt/bin/python"))
        );
        assert_eq!(registry.get("jobqueue.kitetp.x"), Some(&Value::from("[1")));
        assert_eq!(registry.get("config"), None);
        assert_eq!(registry.as_mapping().len(), 1);
    }
}
