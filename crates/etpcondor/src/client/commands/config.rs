use std::path::PathBuf;

use clap::Parser;

use crate::client::globalsettings::GlobalSettings;
use crate::common::error::EtpError;
use crate::config::{
    ConfigDocument, ConfigPaths, ConfigValue, default_config_dir, ensure_default_config_file,
};

#[derive(Parser)]
pub struct ConfigOpts {
    #[clap(subcommand)]
    pub subcmd: ConfigCommand,
}

#[derive(Parser)]
pub enum ConfigCommand {
    /// Make sure that a user-editable copy of the profile defaults exists
    Ensure(ConfigEnsureOpts),
    /// Display the resolved configuration
    Show(ConfigShowOpts),
    /// Display the locations that configuration is loaded from
    Path,
}

#[derive(Parser)]
pub struct ConfigEnsureOpts {
    /// Directory that receives the copy [default: $DASK_CONFIG or ~/.config/dask]
    #[arg(long, value_hint = clap::ValueHint::DirPath)]
    pub destination: Option<PathBuf>,
}

#[derive(Parser)]
pub struct ConfigShowOpts {
    /// Display only the value under a dotted path (e.g. `jobqueue.kitetp.cores`)
    #[arg(long)]
    pub key: Option<String>,
}

pub fn command_config_ensure(
    gsettings: &GlobalSettings,
    opts: ConfigEnsureOpts,
) -> anyhow::Result<()> {
    let destination = opts.destination.unwrap_or_else(default_config_dir);
    let path = ensure_default_config_file(&ConfigDocument::bundled(), &destination)?;
    gsettings.printer().print_config_paths(&[], Some(&path));
    Ok(())
}

pub fn command_config_show(gsettings: &GlobalSettings, opts: ConfigShowOpts) -> anyhow::Result<()> {
    let registry = gsettings.config().registry();
    let value = match opts.key {
        Some(key) => registry
            .get(&key)
            .cloned()
            .ok_or_else(|| EtpError::InvalidValue(format!("Key '{key}' is not configured")))?,
        None => ConfigValue::Mapping(registry.as_mapping().clone()),
    };
    gsettings.printer().print_config(&value)?;
    Ok(())
}

pub fn command_config_path(gsettings: &GlobalSettings, paths: &ConfigPaths) -> anyhow::Result<()> {
    let search_path: Vec<_> = paths.search_path.iter().map(|p| p.as_path()).collect();
    gsettings
        .printer()
        .print_config_paths(&search_path, gsettings.config().user_config_file());
    Ok(())
}
