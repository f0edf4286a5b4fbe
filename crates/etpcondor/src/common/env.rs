use std::ffi::OsString;
use std::path::PathBuf;

/// Prefix of variables that override configuration registry values.
pub const DASK_ENV_PREFIX: &str = "DASK_";

macro_rules! create_dask_env {
    ($name: literal) => {
        concat!("DASK_", $name)
    };
}

pub fn is_dask_env(name: &str) -> bool {
    name.starts_with(DASK_ENV_PREFIX)
}

/// Known environment variables
pub const VIRTUAL_ENV: &str = "VIRTUAL_ENV";
pub const DASK_CONFIG: &str = create_dask_env!("CONFIG");
pub const DASK_ROOT_CONFIG: &str = create_dask_env!("ROOT_CONFIG");

/// Keeps the variables whose name and value are valid UTF-8.
pub fn utf8_vars<I>(vars: I) -> Vec<(String, String)>
where
    I: IntoIterator<Item = (OsString, OsString)>,
{
    vars.into_iter()
        .filter_map(|(name, value)| Some((name.into_string().ok()?, value.into_string().ok()?)))
        .collect()
}

/// Values of the process environment that influence how a cluster is built.
///
/// Captured once so that the builder itself never reads the environment.
#[derive(Debug, Clone, Default)]
pub struct BuildEnv {
    virtual_env: Option<PathBuf>,
}

impl BuildEnv {
    pub fn from_process() -> Self {
        Self::new(std::env::var_os(VIRTUAL_ENV))
    }

    pub fn new(virtual_env: Option<OsString>) -> Self {
        Self {
            virtual_env: virtual_env.filter(|v| !v.is_empty()).map(PathBuf::from),
        }
    }

    pub fn with_virtual_env<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            virtual_env: Some(path.into()),
        }
    }

    /// Root of the currently active virtual environment, if any.
    pub fn virtual_env(&self) -> Option<&PathBuf> {
        self.virtual_env.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::{BuildEnv, is_dask_env, utf8_vars};
    use std::ffi::{OsStr, OsString};
    use std::os::unix::ffi::OsStrExt;
    use std::path::Path;

    #[test]
    fn test_empty_virtual_env_is_ignored() {
        assert!(BuildEnv::new(Some("".into())).virtual_env().is_none());
        assert_eq!(
            BuildEnv::new(Some("/venv".into())).virtual_env().unwrap(),
            Path::new("/venv")
        );
    }

    #[test]
    fn test_dask_env() {
        assert!(is_dask_env("DASK_JOBQUEUE__KITETP__CORES"));
        assert!(!is_dask_env("VIRTUAL_ENV"));
    }

    #[test]
    fn test_utf8_vars_skip_invalid_entries() {
        let invalid = OsStr::from_bytes(b"\xff").to_os_string();
        let vars = utf8_vars(vec![
            (OsString::from("OTHER"), invalid.clone()),
            (invalid, OsString::from("1")),
            (
                OsString::from("DASK_JOBQUEUE__KITETP__CORES"),
                OsString::from("4"),
            ),
        ]);
        assert_eq!(
            vars,
            vec![(
                "DASK_JOBQUEUE__KITETP__CORES".to_string(),
                "4".to_string()
            )]
        );
    }
}
