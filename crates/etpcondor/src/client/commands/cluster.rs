use clap::Parser;

use crate::client::globalsettings::GlobalSettings;
use crate::cluster::{
    ClusterBackend, ClusterOptions, ClusterProfileBuilder, ClusterSpec, CondorJob, DirectiveSet,
    HtCondorBackend, ProfileSettings, SubmitMode,
};
use crate::common::env::BuildEnv;

#[derive(Parser)]
pub struct ClusterOpts {
    #[clap(subcommand)]
    pub subcmd: ClusterCommand,
}

#[derive(Parser)]
pub enum ClusterCommand {
    /// Print the HTCondor submit description of worker jobs
    Render(ClusterRenderOpts),
    /// Submit worker jobs into HTCondor
    Submit(ClusterSubmitOpts),
    /// Remove the worker jobs of a submitted cluster
    Remove(ClusterRemoveOpts),
}

#[derive(Parser)]
pub struct ClusterArgs {
    /// Address of the Dask scheduler that the workers connect to
    #[arg(long)]
    pub scheduler: String,

    /// Docker image that the workers run in
    #[arg(long, conflicts_with = "cvmfs_image")]
    pub docker_image: Option<String>,

    /// Container image on CVMFS that the workers run in
    #[arg(long)]
    pub cvmfs_image: Option<String>,

    /// Files transferred to every worker (in this order)
    #[arg(long = "transfer-input-file", value_delimiter(','))]
    pub transfer_input_files: Vec<String>,

    /// Do not ship the active virtual environment to the workers
    #[arg(long)]
    pub no_ship_env: bool,

    /// Number of GPUs per job (currently not translated into any directive)
    #[arg(long)]
    pub gpus: Option<u32>,

    /// Additional submit directive in the form `NAME=VALUE`
    #[arg(long = "directive", value_parser = parse_directive)]
    pub directives: Vec<(String, String)>,

    /// Argument passed to every worker, replaces the configured worker arguments
    #[arg(long = "worker-arg", allow_hyphen_values = true)]
    pub worker_args: Vec<String>,

    /// Number of cores per job
    #[arg(long)]
    pub cores: Option<u32>,

    /// Memory per job (e.g. `4 GiB`)
    #[arg(long)]
    pub memory: Option<String>,

    /// Disk per job (e.g. `10 GiB`)
    #[arg(long)]
    pub disk: Option<String>,

    /// Number of worker processes per job
    #[arg(long)]
    pub processes: Option<u32>,

    /// Name prefix of the workers
    #[arg(long)]
    pub name: Option<String>,

    /// Interpreter used to start the workers
    #[arg(long)]
    pub python: Option<String>,

    /// Log directory of the worker jobs
    #[arg(long)]
    pub log_directory: Option<String>,

    /// Command executed before the worker starts (can be used multiple times)
    #[arg(long = "prologue")]
    pub job_script_prologue: Vec<String>,
}

#[derive(Parser)]
pub struct ClusterRenderOpts {
    #[clap(flatten)]
    pub cluster: ClusterArgs,

    /// Number of queued worker jobs
    #[arg(long, short = 'n', default_value_t = 1)]
    pub count: u32,
}

#[derive(Parser)]
pub struct ClusterSubmitOpts {
    #[clap(flatten)]
    pub cluster: ClusterArgs,

    /// Number of submitted worker jobs
    #[arg(long, short = 'n', default_value_t = 1)]
    pub count: u32,

    /// Only validate the submit description with `condor_submit -dry-run`
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Parser)]
pub struct ClusterRemoveOpts {
    /// HTCondor cluster id
    pub cluster_id: String,
}

fn parse_directive(value: &str) -> anyhow::Result<(String, String)> {
    match value.split_once('=') {
        Some((name, value)) if !name.trim().is_empty() => {
            Ok((name.trim().to_string(), value.trim().to_string()))
        }
        _ => anyhow::bail!("Directive '{value}' has to be in the form NAME=VALUE"),
    }
}

impl ClusterArgs {
    fn into_options(self) -> (String, ClusterOptions) {
        let non_empty = |v: Vec<String>| if v.is_empty() { None } else { Some(v) };
        let options = ClusterOptions {
            docker_image: self.docker_image,
            cvmfs_image: self.cvmfs_image,
            transfer_input_files: self.transfer_input_files,
            ship_env: !self.no_ship_env,
            gpus: self.gpus,
            job_extra_directives: if self.directives.is_empty() {
                None
            } else {
                Some(DirectiveSet::from_iter(self.directives))
            },
            worker_extra_args: non_empty(self.worker_args),
            settings: ProfileSettings {
                name: self.name,
                cores: self.cores,
                memory: self.memory,
                disk: self.disk,
                processes: self.processes,
                python: self.python,
                log_directory: self.log_directory,
                job_script_prologue: non_empty(self.job_script_prologue),
                ..Default::default()
            },
        };
        (self.scheduler, options)
    }
}

fn build_cluster(gsettings: &GlobalSettings, args: ClusterArgs) -> anyhow::Result<(String, ClusterSpec)> {
    let (scheduler, options) = args.into_options();
    let spec = ClusterProfileBuilder::new(gsettings.config())
        .build(options, &BuildEnv::from_process())?;
    Ok((scheduler, spec))
}

pub fn command_cluster_render(
    gsettings: &GlobalSettings,
    opts: ClusterRenderOpts,
) -> anyhow::Result<()> {
    let (scheduler, spec) = build_cluster(gsettings, opts.cluster)?;
    let description = CondorJob::new(&spec, &scheduler)?.submit_description(opts.count)?;
    gsettings
        .printer()
        .print_cluster_render(&spec, &description)?;
    Ok(())
}

pub async fn command_cluster_submit(
    gsettings: &GlobalSettings,
    opts: ClusterSubmitOpts,
) -> anyhow::Result<()> {
    let (scheduler, spec) = build_cluster(gsettings, opts.cluster)?;
    let mode = if opts.dry_run {
        SubmitMode::DryRun
    } else {
        SubmitMode::Submit
    };
    let mut backend = HtCondorBackend::new(gsettings.work_directory().to_path_buf());
    let handle = backend
        .submit(&spec, &scheduler, opts.count, mode)
        .await?;
    gsettings.printer().print_cluster_submit(&handle);
    Ok(())
}

pub async fn command_cluster_remove(
    gsettings: &GlobalSettings,
    opts: ClusterRemoveOpts,
) -> anyhow::Result<()> {
    let settings = ProfileSettings::from_registry(gsettings.config().registry(), crate::PROFILE_NAME)?;
    let backend = HtCondorBackend::new(gsettings.work_directory().to_path_buf());
    backend
        .remove(
            &opts.cluster_id,
            settings.cancel_command_extra.as_deref().unwrap_or_default(),
        )
        .await
}
