use std::path::PathBuf;

pub mod commands;
pub mod globalsettings;
pub mod output;

pub fn default_work_directory_path() -> PathBuf {
    let mut home = dirs::home_dir().unwrap_or_else(std::env::temp_dir);
    home.push(".etp-condor");
    home
}
