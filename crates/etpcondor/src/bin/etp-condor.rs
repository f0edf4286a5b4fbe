use clap::{CommandFactory, FromArgMatches};

use etpcondor::client::commands::cluster::{
    ClusterCommand, ClusterOpts, command_cluster_remove, command_cluster_render,
    command_cluster_submit,
};
use etpcondor::client::commands::config::{
    ConfigCommand, ConfigOpts, command_config_ensure, command_config_path, command_config_show,
};
use etpcondor::client::default_work_directory_path;
use etpcondor::client::globalsettings::GlobalSettings;
use etpcondor::client::output::create_output;
use etpcondor::common::cli::{CommonOpts, RootOptions, SubCommand};
use etpcondor::common::env::utf8_vars;
use etpcondor::common::setup::setup_logging;
use etpcondor::common::utils::fs::absolute_path;
use etpcondor::config::{ConfigContext, ConfigPaths};

fn make_config_paths(opts: &CommonOpts) -> ConfigPaths {
    let mut paths = ConfigPaths::from_env();
    if let Some(dir) = &opts.config_dir {
        let dir = absolute_path(dir.clone());
        if !paths.search_path.contains(&dir) {
            paths.search_path.push(dir.clone());
        }
        paths.user_dir = dir;
    }
    paths
}

fn make_global_settings(
    opts: CommonOpts,
    paths: &ConfigPaths,
) -> etpcondor::Result<GlobalSettings> {
    let config = ConfigContext::initialize(paths, utf8_vars(std::env::vars_os()))?;
    let work_dir = opts
        .work_dir
        .map(absolute_path)
        .unwrap_or_else(default_work_directory_path);
    Ok(GlobalSettings::new(
        config,
        work_dir,
        create_output(&opts.output_mode),
    ))
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> etpcondor::Result<()> {
    let matches = RootOptions::command().get_matches();
    let top_opts = match RootOptions::from_arg_matches(&matches) {
        Ok(opts) => opts,
        Err(error) => error.exit(),
    };

    setup_logging(top_opts.common.debug);

    let paths = make_config_paths(&top_opts.common);
    let gsettings = match make_global_settings(top_opts.common, &paths) {
        Ok(gsettings) => gsettings,
        Err(error) => {
            log::error!("Cannot load configuration: {error}");
            std::process::exit(1);
        }
    };

    let result = match top_opts.subcmd {
        SubCommand::Config(ConfigOpts {
            subcmd: ConfigCommand::Ensure(opts),
        }) => command_config_ensure(&gsettings, opts),
        SubCommand::Config(ConfigOpts {
            subcmd: ConfigCommand::Show(opts),
        }) => command_config_show(&gsettings, opts),
        SubCommand::Config(ConfigOpts {
            subcmd: ConfigCommand::Path,
        }) => command_config_path(&gsettings, &paths),
        SubCommand::Cluster(ClusterOpts {
            subcmd: ClusterCommand::Render(opts),
        }) => command_cluster_render(&gsettings, opts),
        SubCommand::Cluster(ClusterOpts {
            subcmd: ClusterCommand::Submit(opts),
        }) => command_cluster_submit(&gsettings, opts).await,
        SubCommand::Cluster(ClusterOpts {
            subcmd: ClusterCommand::Remove(opts),
        }) => command_cluster_remove(&gsettings, opts).await,
    };

    if let Err(e) = result {
        gsettings.printer().print_error(e);
        std::process::exit(1);
    }

    Ok(())
}
