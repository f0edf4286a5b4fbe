//! Rendering of worker jobs into HTCondor submit descriptions.
use std::time::Duration;

use itertools::Itertools;

use crate::cluster::builder::ClusterSpec;
use crate::common::error::EtpError;
use crate::common::parser::parse_size;
use crate::common::utils::str::{condor_quote_words, quoted};

const DEFAULT_WORKER_NAME: &str = "dask-worker";
const DEFAULT_DEATH_TIMEOUT: Duration = Duration::from_secs(60);

const MIB: u64 = 1024 * 1024;
const KIB: u64 = 1024;

/// Splits `cores` into worker processes and threads per process.
///
/// Small jobs get one single-threaded process per core, larger jobs roughly the square root
/// of the core count.
pub fn processes_and_threads(cores: u32) -> (u32, u32) {
    if cores <= 4 {
        return (cores.max(1), 1);
    }
    let sqrt = (cores as f64).sqrt();
    let processes = (1..=cores)
        .filter(|f| cores % f == 0 && (*f as f64) >= sqrt)
        .min()
        .unwrap_or(cores);
    (processes, cores / processes)
}

/// Worker job of a resolved cluster, connected to a particular scheduler.
#[derive(Debug)]
pub struct CondorJob<'a> {
    spec: &'a ClusterSpec,
    scheduler: String,
    cores: u32,
    processes: u32,
    threads: u32,
    memory: u64,
    disk: u64,
    death_timeout: Duration,
}

impl<'a> CondorJob<'a> {
    pub fn new(spec: &'a ClusterSpec, scheduler: &str) -> crate::Result<Self> {
        let settings = &spec.settings;
        let cores = settings.cores.ok_or_else(|| {
            EtpError::InvalidValue("the number of cores per job has to be set".to_string())
        })?;
        if cores == 0 {
            return Err(EtpError::InvalidValue(
                "the number of cores per job has to be positive".to_string(),
            ));
        }
        let memory = settings.memory.as_deref().ok_or_else(|| {
            EtpError::InvalidValue("the amount of memory per job has to be set".to_string())
        })?;
        let memory = parse_size(memory)
            .map_err(|e| EtpError::InvalidValue(format!("invalid memory '{memory}': {e}")))?;
        let disk = match settings.disk.as_deref() {
            Some(disk) => parse_size(disk)
                .map_err(|e| EtpError::InvalidValue(format!("invalid disk '{disk}': {e}")))?,
            None => 0,
        };

        let (processes, threads) = match settings.processes {
            Some(0) => {
                return Err(EtpError::InvalidValue(
                    "the number of processes per job has to be positive".to_string(),
                ));
            }
            Some(processes) => (processes, (cores / processes).max(1)),
            None => processes_and_threads(cores),
        };

        Ok(Self {
            spec,
            scheduler: scheduler.to_string(),
            cores,
            processes,
            threads,
            memory,
            disk,
            death_timeout: settings.death_timeout()?.unwrap_or(DEFAULT_DEATH_TIMEOUT),
        })
    }

    fn worker_name(&self) -> String {
        let name = self
            .spec
            .settings
            .name
            .as_deref()
            .unwrap_or(DEFAULT_WORKER_NAME);
        format!("{name}-$(ClusterId).$(ProcId)")
    }

    /// Command line that starts the Dask workers of one job.
    pub fn worker_command(&self) -> Vec<String> {
        let mut command = vec![
            self.spec.python.clone(),
            "-m".to_string(),
            "distributed.cli.dask_worker".to_string(),
            self.scheduler.clone(),
            "--name".to_string(),
            self.worker_name(),
            "--nthreads".to_string(),
            self.threads.to_string(),
            "--nworkers".to_string(),
            self.processes.to_string(),
            "--memory-limit".to_string(),
            (self.memory / self.processes as u64).to_string(),
            "--nanny".to_string(),
            "--death-timeout".to_string(),
            self.death_timeout.as_secs().to_string(),
        ];
        if let Some(directory) = &self.spec.settings.local_directory {
            command.extend(["--local-directory".to_string(), directory.clone()]);
        }
        command.extend(self.spec.worker_extra_args.iter().cloned());
        command
    }

    /// Shell script executed by the job: prologue commands followed by the worker command.
    pub fn job_script(&self) -> String {
        let worker = self
            .worker_command()
            .iter()
            .map(|arg| shell_quote(arg))
            .join(" ");
        self.spec
            .settings
            .job_script_prologue
            .iter()
            .flatten()
            .map(|s| s.as_str())
            .chain(std::iter::once(worker.as_str()))
            .join("; ")
    }

    /// HTCondor submit description that queues `count` worker jobs.
    pub fn submit_description(&self, count: u32) -> crate::Result<String> {
        let mut lines: Vec<(String, String)> = vec![
            ("executable".to_string(), "/bin/sh".to_string()),
            (
                "arguments".to_string(),
                condor_quote_words(["-c".to_string(), self.job_script()]),
            ),
            ("MY.JobId".to_string(), quoted("$(ClusterId).$(ProcId)")),
            ("MY.DaskWorkerName".to_string(), quoted(&self.worker_name())),
            ("MY.DaskWorkerCores".to_string(), self.cores.to_string()),
            ("MY.DaskWorkerMemory".to_string(), self.memory.to_string()),
            ("MY.DaskWorkerDisk".to_string(), self.disk.to_string()),
            ("request_cpus".to_string(), "MY.DaskWorkerCores".to_string()),
            (
                "request_memory".to_string(),
                format!("floor(MY.DaskWorkerMemory / {MIB})"),
            ),
            (
                "request_disk".to_string(),
                format!("floor(MY.DaskWorkerDisk / {KIB})"),
            ),
        ];
        if let Some(directory) = &self.spec.settings.log_directory {
            let directory = directory.trim_end_matches('/');
            lines.extend([
                (
                    "log".to_string(),
                    format!("{directory}/worker-$(ClusterId).log"),
                ),
                (
                    "output".to_string(),
                    format!("{directory}/worker-$(ClusterId).$(ProcId).out"),
                ),
                (
                    "error".to_string(),
                    format!("{directory}/worker-$(ClusterId).$(ProcId).err"),
                ),
            ]);
        }
        lines.extend(
            self.spec
                .directives
                .iter()
                .map(|(name, value)| (name.to_string(), value.to_string())),
        );

        if let Some((name, _)) = lines
            .iter()
            .find(|(name, value)| name.contains('\n') || value.contains('\n'))
        {
            return Err(EtpError::InvalidValue(format!(
                "submit directive '{}' must not contain a newline",
                name.trim()
            )));
        }
        let mut description: String = lines
            .iter()
            .map(|(name, value)| format!("{name} = {value}\n"))
            .collect();
        description.push_str(&format!("queue {count}\n"));
        Ok(description)
    }
}

/// Quotes `value` for a POSIX shell if it contains anything but safe characters.
fn shell_quote(value: &str) -> String {
    let is_safe = |c: char| c.is_ascii_alphanumeric() || "-_./:=,+@%".contains(c);
    if !value.is_empty() && value.chars().all(is_safe) {
        value.to_string()
    } else {
        format!("'{}'", value.replace('\'', "'\\''"))
    }
}
