use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::process::Output;

use anyhow::Context;
use bstr::ByteSlice;
use tokio::process::Command;

use crate::cluster::builder::ClusterSpec;
use crate::cluster::job::CondorJob;
use crate::common::utils::str::pluralize;

/// Name of the submit description written for every submission.
const SUBMIT_FILE_NAME: &str = "etp-worker.sub";

/// Name of a file that will store the id of the submitted HTCondor cluster.
const CLUSTER_ID_FILE_NAME: &str = "cluster-id";

pub type BackendResult<T> = anyhow::Result<T>;

pub enum SubmitMode {
    /// Submit the worker jobs in a normal way.
    Submit,
    /// Only let `condor_submit` validate the submit description.
    DryRun,
}

/// Identifies worker jobs handed over to HTCondor.
#[derive(Debug, Clone)]
pub struct ClusterHandle {
    /// HTCondor cluster id, missing for dry runs.
    cluster_id: Option<String>,
    /// Directory with the submit description and debug information.
    working_dir: PathBuf,
}

impl ClusterHandle {
    pub fn new(cluster_id: Option<String>, working_dir: PathBuf) -> Self {
        Self {
            cluster_id,
            working_dir,
        }
    }

    pub fn cluster_id(&self) -> Option<&str> {
        self.cluster_id.as_deref()
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }
}

/// Backend that turns a resolved cluster into running worker jobs.
pub trait ClusterBackend {
    /// Submits `count` worker jobs that connect to `scheduler`.
    fn submit(
        &mut self,
        spec: &ClusterSpec,
        scheduler: &str,
        count: u32,
        mode: SubmitMode,
    ) -> Pin<Box<dyn Future<Output = BackendResult<ClusterHandle>>>>;

    /// Removes all worker jobs of an existing cluster.
    fn remove(
        &self,
        cluster_id: &str,
        extra_args: &[String],
    ) -> Pin<Box<dyn Future<Output = BackendResult<()>>>>;
}

/// Submits worker jobs with `condor_submit` and removes them with `condor_rm`.
pub struct HtCondorBackend {
    work_directory: PathBuf,
    submission_counter: u64,
}

impl HtCondorBackend {
    pub fn new(work_directory: PathBuf) -> Self {
        Self {
            work_directory,
            submission_counter: 0,
        }
    }

    fn next_submission_id(&mut self) -> u64 {
        self.submission_counter += 1;
        self.submission_counter
    }
}

impl ClusterBackend for HtCondorBackend {
    fn submit(
        &mut self,
        spec: &ClusterSpec,
        scheduler: &str,
        count: u32,
        mode: SubmitMode,
    ) -> Pin<Box<dyn Future<Output = BackendResult<ClusterHandle>>>> {
        let description = CondorJob::new(spec, scheduler)
            .and_then(|job| job.submit_description(count))
            .map_err(anyhow::Error::from);
        let extra_args = spec
            .settings
            .submit_command_extra
            .clone()
            .unwrap_or_default();
        let work_directory = self.work_directory.clone();
        let profile = spec.profile.clone();
        let submission_num = self.next_submission_id();

        Box::pin(async move {
            let description = description?;
            let directory = create_submission_dir(work_directory, &profile, submission_num)?;
            let path = directory.join(SUBMIT_FILE_NAME);
            std::fs::write(&path, description)
                .with_context(|| format!("Cannot write submit description into {}", path.display()))?;

            let path = path.display().to_string();
            let mut arguments = vec!["condor_submit"];
            arguments.extend(extra_args.iter().map(|s| s.as_str()));
            if let SubmitMode::DryRun = mode {
                arguments.extend(["-dry-run", "-"]);
            }
            arguments.push(&path);

            log::debug!("Running command `{}`", arguments.join(" "));
            let output = create_command(arguments, &directory)
                .output()
                .await
                .context("condor_submit start failed")?;
            let output =
                check_command_output(output).context("condor_submit execution failed")?;
            let stdout = output
                .stdout
                .to_str()
                .map_err(|e| anyhow::anyhow!("Invalid UTF-8 condor_submit output: {e:?}"))?;

            let cluster_id = match mode {
                SubmitMode::DryRun => {
                    log::info!("Submit description {path} is valid");
                    None
                }
                SubmitMode::Submit => {
                    let id = parse_cluster_id(stdout)?;
                    // Write the cluster id to the submission directory as a debug information
                    std::fs::write(directory.join(CLUSTER_ID_FILE_NAME), &id)?;
                    log::info!(
                        "Submitted {count} worker {} to HTCondor cluster {id}",
                        pluralize("job", count as usize)
                    );
                    Some(id)
                }
            };
            Ok(ClusterHandle::new(cluster_id, directory))
        })
    }

    fn remove(
        &self,
        cluster_id: &str,
        extra_args: &[String],
    ) -> Pin<Box<dyn Future<Output = BackendResult<()>>>> {
        let cluster_id = cluster_id.to_string();
        let extra_args = extra_args.to_vec();
        let workdir = self.work_directory.clone();

        Box::pin(async move {
            let mut arguments = vec!["condor_rm"];
            arguments.extend(extra_args.iter().map(|s| s.as_str()));
            arguments.push(&cluster_id);
            log::debug!("Running command `{}`", arguments.join(" "));

            std::fs::create_dir_all(&workdir)?;
            let output = create_command(arguments, &workdir)
                .output()
                .await
                .context("condor_rm start failed")?;
            check_command_output(output).context("condor_rm execution failed")?;
            log::info!("Removed HTCondor cluster {cluster_id}");
            Ok(())
        })
    }
}

pub fn create_submission_dir(
    work_directory: PathBuf,
    profile: &str,
    submission_num: u64,
) -> Result<PathBuf, std::io::Error> {
    let mut dir = work_directory;
    dir.push("submissions");
    dir.push(profile);
    dir.push(format!("{}-{submission_num:03}", std::process::id()));

    std::fs::create_dir_all(&dir)?;

    Ok(dir)
}

/// Extracts the cluster id out of `condor_submit` output
/// (`3 job(s) submitted to cluster 1234.`).
pub fn parse_cluster_id(output: &str) -> BackendResult<String> {
    output
        .lines()
        .filter_map(|line| line.trim().split_once("submitted to cluster"))
        .map(|(_, id)| id.trim().trim_end_matches('.').to_string())
        .find(|id| !id.is_empty() && id.chars().all(|c| c.is_ascii_digit()))
        .ok_or_else(|| anyhow::anyhow!("Missing cluster id in condor_submit output\n{output}"))
}

pub fn create_command(arguments: Vec<&str>, workdir: &Path) -> Command {
    let mut command = Command::new(arguments[0]);
    command.args(&arguments[1..]);
    command.current_dir(workdir);
    command
}

pub fn check_command_output(output: Output) -> BackendResult<Output> {
    let status = output.status;
    if !status.success() {
        return Err(anyhow::anyhow!(
            "Exit code: {}\nStderr: {}\nStdout: {}",
            status.code().unwrap_or(-1),
            output.stderr.to_str_lossy().trim(),
            output.stdout.to_str_lossy().trim()
        ));
    }
    Ok(output)
}
