use std::path::{Path, PathBuf};

use itertools::Itertools;
use serde::Serialize;

use crate::PROFILE_NAME;
use crate::cluster::directives::{DirectiveLayer, DirectiveSet, resolve_layers};
use crate::cluster::profile::ProfileSettings;
use crate::common::env::BuildEnv;
use crate::common::error::EtpError;
use crate::common::utils::str::quoted;
use crate::config::ConfigContext;

/// Name of the job class that describes a single worker job of the profile.
pub const JOB_CLASS_NAME: &str = "ETPCondorJob";

/// Interpreter used by workers when nothing else is configured.
pub const DEFAULT_PYTHON: &str = "python3";

/// Range of ports that workers may listen on. Only this range is open on the pool nodes.
pub const WORKER_PORT_RANGE: (u16, u16) = (10000, 10100);

pub fn worker_port_args() -> [String; 2] {
    [
        "--worker-port".to_string(),
        format!("{}:{}", WORKER_PORT_RANGE.0, WORKER_PORT_RANGE.1),
    ]
}

/// Parameters of a cluster construction.
#[derive(Debug, Clone)]
pub struct ClusterOptions {
    /// Docker image that workers run in (selects the docker universe).
    pub docker_image: Option<String>,
    /// Unpacked container image on CVMFS that workers run in.
    pub cvmfs_image: Option<String>,
    /// Files shipped to every worker, in transfer order.
    pub transfer_input_files: Vec<String>,
    /// Ship the active virtual environment and run workers with its interpreter.
    pub ship_env: bool,
    /// Requested GPUs. Accepted, but not translated into any directive yet.
    pub gpus: Option<u32>,
    /// Directives layered over the profile defaults.
    pub job_extra_directives: Option<DirectiveSet>,
    /// Replaces the worker arguments of the profile.
    pub worker_extra_args: Option<Vec<String>>,
    /// Explicit profile settings (cores, memory, ...) layered over the registry.
    pub settings: ProfileSettings,
}

impl Default for ClusterOptions {
    fn default() -> Self {
        Self {
            docker_image: None,
            cvmfs_image: None,
            transfer_input_files: Vec::new(),
            ship_env: true,
            gpus: None,
            job_extra_directives: None,
            worker_extra_args: None,
            settings: ProfileSettings::default(),
        }
    }
}

/// Fully resolved description of the worker jobs of a cluster.
#[derive(Debug, Clone, Serialize)]
pub struct ClusterSpec {
    pub job_class: &'static str,
    pub profile: String,
    pub settings: ProfileSettings,
    pub directives: DirectiveSet,
    pub worker_extra_args: Vec<String>,
    pub python: String,
}

/// Resolves [`ClusterOptions`] against the configuration of a cluster profile.
pub struct ClusterProfileBuilder<'a> {
    context: &'a ConfigContext,
    profile: String,
}

impl<'a> ClusterProfileBuilder<'a> {
    pub fn new(context: &'a ConfigContext) -> Self {
        Self::with_profile(context, PROFILE_NAME)
    }

    pub fn with_profile(context: &'a ConfigContext, profile: &str) -> Self {
        Self {
            context,
            profile: profile.to_string(),
        }
    }

    /// Resolves the final directives, worker arguments and interpreter of a cluster.
    ///
    /// Directives are resolved from the following layers, later layers winning:
    /// 1. `job-extra-directives` of the profile in the registry
    /// 2. `job_extra_directives` passed in `options`
    /// 3. container image directives (always contains `universe`)
    /// 4. file transfer directives
    pub fn build(&self, options: ClusterOptions, env: &BuildEnv) -> crate::Result<ClusterSpec> {
        let image = image_layer(
            options.docker_image.as_deref(),
            options.cvmfs_image.as_deref(),
        )?;

        if let Some(gpus) = options.gpus {
            log::warn!("Requested {gpus} GPU(s), but GPU requests are not supported yet");
        }

        let shipped_env = if options.ship_env {
            env.virtual_env()
        } else {
            None
        };

        let registry_settings =
            ProfileSettings::from_registry(self.context.registry(), &self.profile)?;
        let explicit_python = options.settings.python.clone();
        let settings = registry_settings.overlay(options.settings);

        let defaults = match &settings.job_extra_directives {
            Some(value) => DirectiveSet::from_yaml(value)?,
            None => DirectiveSet::new(),
        };
        let layers = [
            DirectiveLayer::new("profile defaults", defaults),
            DirectiveLayer::new(
                "user directives",
                options.job_extra_directives.unwrap_or_default(),
            ),
            image,
            transfer_layer(options.transfer_input_files, shipped_env),
        ];
        log::debug!("Resolving directive layers: {}", layers.iter().join(", "));
        let directives = resolve_layers(&layers);

        let mut worker_extra_args = options
            .worker_extra_args
            .or_else(|| settings.worker_extra_args.clone())
            .unwrap_or_default();
        worker_extra_args.extend(worker_port_args());

        let python = match (explicit_python, shipped_env) {
            (Some(python), _) => python,
            (None, Some(venv)) => venv_python(venv),
            (None, None) => settings
                .python
                .clone()
                .unwrap_or_else(|| DEFAULT_PYTHON.to_string()),
        };
        log::debug!("Workers of profile {} use interpreter {python}", self.profile);

        Ok(ClusterSpec {
            job_class: JOB_CLASS_NAME,
            profile: self.profile.clone(),
            settings: ProfileSettings {
                python: Some(python.clone()),
                worker_extra_args: Some(worker_extra_args.clone()),
                ..settings
            },
            directives,
            worker_extra_args,
            python,
        })
    }
}

fn venv_python(venv: &Path) -> String {
    venv.join("bin").join("python").display().to_string()
}

/// Directives selecting the HTCondor universe and the container the workers run in.
pub fn image_layer(
    docker_image: Option<&str>,
    cvmfs_image: Option<&str>,
) -> crate::Result<DirectiveLayer> {
    let mut directives = DirectiveSet::new();
    directives.insert("universe", "vanilla");
    match (docker_image, cvmfs_image) {
        (Some(_), Some(_)) => {
            return Err(EtpError::ConfigConflict(
                "Cannot specify both a docker image and a cvmfs image".to_string(),
            ));
        }
        (Some(docker_image), None) => {
            directives.insert("universe", "docker");
            directives.insert("docker_image", quoted(docker_image));
        }
        (None, Some(cvmfs_image)) => {
            directives.insert("MY.SingularityImage", quoted(cvmfs_image));
        }
        (None, None) => {}
    }
    Ok(DirectiveLayer::new("container image", directives))
}

/// Directives shipping `files` (followed by the virtual environment, if any) to the workers.
pub fn transfer_layer(files: Vec<String>, virtual_env: Option<&PathBuf>) -> DirectiveLayer {
    let mut files = files;
    if let Some(venv) = virtual_env {
        files.push(venv.display().to_string());
    }
    let mut directives = DirectiveSet::new();
    if !files.is_empty() {
        directives.insert("transfer_input_files", files.join(","));
    }
    DirectiveLayer::new("file transfer", directives)
}

#[cfg(test)]
mod tests {
    use super::{
        ClusterOptions, ClusterProfileBuilder, DEFAULT_PYTHON, JOB_CLASS_NAME, image_layer,
        transfer_layer,
    };
    use crate::cluster::directives::DirectiveSet;
    use crate::cluster::profile::ProfileSettings;
    use crate::common::env::BuildEnv;
    use crate::common::error::EtpError;
    use crate::config::{ConfigContext, ConfigDocument, ConfigRegistry, Priority, merge_defaults};
    use std::path::PathBuf;

    fn context(yaml: &str) -> ConfigContext {
        ConfigContext::from_registry(ConfigRegistry::from_mapping(
            serde_yaml::from_str(yaml).unwrap(),
        ))
    }

    fn bundled_context() -> ConfigContext {
        let mut registry = ConfigRegistry::new();
        merge_defaults(&mut registry, &ConfigDocument::bundled(), Priority::Old).unwrap();
        ConfigContext::from_registry(registry)
    }

    fn no_env() -> BuildEnv {
        BuildEnv::default()
    }

    #[test]
    fn test_image_layer_combinations() {
        let layer = image_layer(None, None).unwrap();
        assert_eq!(
            layer.directives(),
            &DirectiveSet::from_iter([("universe", "vanilla")])
        );

        let layer = image_layer(Some("myrepo/img:tag"), None).unwrap();
        assert_eq!(layer.directives().get("universe"), Some("docker"));
        assert_eq!(
            layer.directives().get("docker_image"),
            Some("\"myrepo/img:tag\"")
        );

        let layer = image_layer(None, Some("/path/to/image")).unwrap();
        assert_eq!(layer.directives().get("universe"), Some("vanilla"));
        assert_eq!(
            layer.directives().get("MY.SingularityImage"),
            Some("\"/path/to/image\"")
        );
        assert!(!layer.directives().contains("docker_image"));
    }

    #[test]
    fn test_image_conflict() {
        assert!(matches!(
            image_layer(Some("img"), Some("/cvmfs/img")),
            Err(EtpError::ConfigConflict(_))
        ));

        let context = bundled_context();
        let options = ClusterOptions {
            docker_image: Some("img".to_string()),
            cvmfs_image: Some("/cvmfs/img".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            ClusterProfileBuilder::new(&context).build(options, &no_env()),
            Err(EtpError::ConfigConflict(_))
        ));
    }

    #[test]
    fn test_transfer_layer() {
        let layer = transfer_layer(vec!["/a".to_string(), "/b".to_string()], None);
        assert_eq!(layer.directives().get("transfer_input_files"), Some("/a,/b"));

        let venv = PathBuf::from("/venv");
        let layer = transfer_layer(vec!["/a".to_string()], Some(&venv));
        assert_eq!(
            layer.directives().get("transfer_input_files"),
            Some("/a,/venv")
        );

        assert!(transfer_layer(vec![], None).directives().is_empty());
    }

    #[test]
    fn test_transfer_without_shipping_env() {
        let context = bundled_context();
        let options = ClusterOptions {
            transfer_input_files: vec!["/a".to_string(), "/b".to_string()],
            ship_env: false,
            ..Default::default()
        };
        let spec = ClusterProfileBuilder::new(&context)
            .build(options, &BuildEnv::with_virtual_env("/venv"))
            .unwrap();
        assert_eq!(spec.directives.get("transfer_input_files"), Some("/a,/b"));
        assert_eq!(spec.python, "python3");
    }

    #[test]
    fn test_ship_env() {
        let context = bundled_context();
        let spec = ClusterProfileBuilder::new(&context)
            .build(
                ClusterOptions::default(),
                &BuildEnv::with_virtual_env("/venv"),
            )
            .unwrap();
        assert_eq!(spec.python, "/venv/bin/python");
        assert_eq!(spec.settings.python.as_deref(), Some("/venv/bin/python"));
        assert_eq!(spec.directives.get("transfer_input_files"), Some("/venv"));
    }

    #[test]
    fn test_ship_env_without_virtual_env() {
        let spec = ClusterProfileBuilder::new(&context("jobqueue: {kitetp: {}}"))
            .build(ClusterOptions::default(), &no_env())
            .unwrap();
        assert_eq!(spec.python, DEFAULT_PYTHON);
        assert!(!spec.directives.contains("transfer_input_files"));
    }

    #[test]
    fn test_explicit_python_wins_over_env() {
        let context = bundled_context();
        let options = ClusterOptions {
            settings: ProfileSettings {
                python: Some("/opt/python".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        let spec = ClusterProfileBuilder::new(&context)
            .build(options, &BuildEnv::with_virtual_env("/venv"))
            .unwrap();
        assert_eq!(spec.python, "/opt/python");
        assert_eq!(spec.directives.get("transfer_input_files"), Some("/venv"));
    }

    #[test]
    fn test_directive_resolution_order() {
        let context = context(
            "jobqueue:
  kitetp:
    job-extra-directives:
      universe: grid
      accounting_group: default
      transfer_input_files: /from/defaults
      getenv: 'False'
",
        );
        let options = ClusterOptions {
            docker_image: Some("myrepo/img:tag".to_string()),
            transfer_input_files: vec!["/data".to_string()],
            ship_env: false,
            job_extra_directives: Some(DirectiveSet::from_iter([
                ("accounting_group", "user"),
                ("universe", "local"),
                ("request_gpus", "1"),
            ])),
            ..Default::default()
        };
        let spec = ClusterProfileBuilder::new(&context)
            .build(options, &no_env())
            .unwrap();

        assert_eq!(
            spec.directives,
            DirectiveSet::from_iter([
                ("universe", "docker"),
                ("docker_image", "\"myrepo/img:tag\""),
                ("accounting_group", "user"),
                ("transfer_input_files", "/data"),
                ("getenv", "False"),
                ("request_gpus", "1"),
            ])
        );
        assert_eq!(spec.job_class, JOB_CLASS_NAME);
    }

    #[test]
    fn test_worker_port_range_always_present() {
        let context = bundled_context();
        let spec = ClusterProfileBuilder::new(&context)
            .build(ClusterOptions::default(), &no_env())
            .unwrap();
        assert_eq!(spec.worker_extra_args, vec!["--worker-port", "10000:10100"]);

        let options = ClusterOptions {
            worker_extra_args: Some(vec!["--lifetime".to_string(), "1h".to_string()]),
            ..Default::default()
        };
        let spec = ClusterProfileBuilder::new(&context)
            .build(options, &no_env())
            .unwrap();
        assert_eq!(
            spec.worker_extra_args,
            vec!["--lifetime", "1h", "--worker-port", "10000:10100"]
        );
    }

    #[test]
    fn test_worker_args_from_registry() {
        let context = context("jobqueue:\n  kitetp:\n    worker-extra-args: [--resources, GPU=1]\n");
        let spec = ClusterProfileBuilder::new(&context)
            .build(ClusterOptions::default(), &no_env())
            .unwrap();
        assert_eq!(
            spec.worker_extra_args,
            vec!["--resources", "GPU=1", "--worker-port", "10000:10100"]
        );
    }

    #[test]
    fn test_gpus_have_no_effect() {
        let context = bundled_context();
        let without = ClusterProfileBuilder::new(&context)
            .build(ClusterOptions::default(), &no_env())
            .unwrap();
        let options = ClusterOptions {
            gpus: Some(2),
            ..Default::default()
        };
        let with = ClusterProfileBuilder::new(&context)
            .build(options, &no_env())
            .unwrap();
        assert_eq!(without.directives, with.directives);
        assert_eq!(without.worker_extra_args, with.worker_extra_args);
    }

    #[test]
    fn test_builder_does_not_modify_context() {
        let context = bundled_context();
        let before = context.registry().clone();
        ClusterProfileBuilder::new(&context)
            .build(
                ClusterOptions::default(),
                &BuildEnv::with_virtual_env("/venv"),
            )
            .unwrap();
        assert_eq!(context.registry(), &before);
    }
}
