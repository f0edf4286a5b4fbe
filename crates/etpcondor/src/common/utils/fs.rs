use std::ffi::OsStr;
use std::os::unix::prelude::OsStrExt;
use std::path::{Path, PathBuf};

pub fn absolute_path(path: PathBuf) -> PathBuf {
    if path.is_absolute() {
        path
    } else {
        get_current_dir().join(path)
    }
}

pub fn get_current_dir() -> PathBuf {
    std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}

/// Expands a leading `~` to the home directory of the current user.
pub fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => match dirs::home_dir() {
            Some(home) => home.join(rest),
            None => path.to_path_buf(),
        },
        Err(_) => path.to_path_buf(),
    }
}

pub fn path_has_extension(path: &Path, extension: &str) -> bool {
    path.extension() == Some(OsStr::from_bytes(extension.as_bytes()))
}

/// Returns true if `path` looks like a configuration document (`.yaml` or `.yml`).
pub fn is_yaml_file(path: &Path) -> bool {
    path.is_file() && (path_has_extension(path, "yaml") || path_has_extension(path, "yml"))
}
