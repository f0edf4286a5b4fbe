use std::path::PathBuf;

use clap::Parser;

use crate::client::commands::cluster::ClusterOpts;
use crate::client::commands::config::ConfigOpts;
use crate::client::output::Outputs;

// Common CLI options
#[derive(Parser)]
pub struct CommonOpts {
    /// Directory with user configuration files
    #[arg(
        long,
        value_hint = clap::ValueHint::DirPath,
        global = true,
        env = "DASK_CONFIG",
        help_heading("GLOBAL OPTIONS"),
        hide_short_help(true)
    )]
    pub config_dir: Option<PathBuf>,

    /// Directory where submit descriptions and debug information are stored
    #[arg(
        long,
        value_hint = clap::ValueHint::DirPath,
        global = true,
        env = "ETP_WORK_DIR",
        help_heading("GLOBAL OPTIONS"),
        hide_short_help(true)
    )]
    pub work_dir: Option<PathBuf>,

    /// Sets output formatting
    #[arg(
        long,
        env = "ETP_OUTPUT_MODE",
        default_value_t = Outputs::CLI,
        value_enum,
        global = true,
        help_heading("GLOBAL OPTIONS"),
        hide_short_help(true)
    )]
    pub output_mode: Outputs,

    /// Enables more detailed log output
    #[arg(
        long,
        env = "ETP_DEBUG",
        global = true,
        help_heading("GLOBAL OPTIONS"),
        hide_short_help(true)
    )]
    pub debug: bool,
}

// Root CLI options
#[derive(Parser)]
#[command(
    author,
    about,
    version(crate::ETP_VERSION),
    disable_help_subcommand(true),
    help_expected(true)
)]
pub struct RootOptions {
    #[clap(flatten)]
    pub common: CommonOpts,

    #[clap(subcommand)]
    pub subcmd: SubCommand,
}

#[derive(Parser)]
pub enum SubCommand {
    /// Inspect and initialize the profile configuration
    Config(ConfigOpts),
    /// Render, submit and remove worker jobs
    Cluster(ClusterOpts),
}
