use std::path::Path;

use serde_json::json;

use crate::cluster::{ClusterHandle, ClusterSpec};
use crate::config::ConfigValue;

#[derive(clap::ValueEnum, Clone)]
pub enum Outputs {
    CLI,
    JSON,
    Quiet,
}

pub fn create_output(mode: &Outputs) -> Box<dyn Output> {
    match mode {
        Outputs::CLI => Box::new(CliOutput),
        Outputs::JSON => Box::new(JsonOutput),
        Outputs::Quiet => Box::new(Quiet),
    }
}

pub trait Output {
    // Configuration
    fn print_config(&self, value: &ConfigValue) -> crate::Result<()>;
    fn print_config_paths(&self, search_path: &[&Path], user_file: Option<&Path>);

    // Clusters
    fn print_cluster_render(&self, spec: &ClusterSpec, description: &str) -> crate::Result<()>;
    fn print_cluster_submit(&self, handle: &ClusterHandle);

    // Errors
    fn print_error(&self, error: anyhow::Error);
}

pub struct CliOutput;

impl Output for CliOutput {
    fn print_config(&self, value: &ConfigValue) -> crate::Result<()> {
        print!("{}", serde_yaml::to_string(value)?);
        Ok(())
    }

    fn print_config_paths(&self, search_path: &[&Path], user_file: Option<&Path>) {
        for path in search_path {
            println!("{}", path.display());
        }
        if let Some(file) = user_file {
            println!("Defaults: {}", file.display());
        }
    }

    fn print_cluster_render(&self, _spec: &ClusterSpec, description: &str) -> crate::Result<()> {
        print!("{description}");
        Ok(())
    }

    fn print_cluster_submit(&self, handle: &ClusterHandle) {
        match handle.cluster_id() {
            Some(id) => println!("HTCondor cluster {id}"),
            None => println!("Dry run, nothing submitted"),
        }
        println!("Submission directory: {}", handle.working_dir().display());
    }

    fn print_error(&self, error: anyhow::Error) {
        log::error!("{error:?}");
    }
}

pub struct JsonOutput;

impl Output for JsonOutput {
    fn print_config(&self, value: &ConfigValue) -> crate::Result<()> {
        println!("{}", serde_json::to_string_pretty(value)?);
        Ok(())
    }

    fn print_config_paths(&self, search_path: &[&Path], user_file: Option<&Path>) {
        let value = json!({
            "search_path": search_path,
            "user_file": user_file,
        });
        println!("{value:#}");
    }

    fn print_cluster_render(&self, spec: &ClusterSpec, description: &str) -> crate::Result<()> {
        let value = json!({
            "spec": spec,
            "submit_description": description,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        Ok(())
    }

    fn print_cluster_submit(&self, handle: &ClusterHandle) {
        let value = json!({
            "cluster_id": handle.cluster_id(),
            "working_dir": handle.working_dir(),
        });
        println!("{value:#}");
    }

    fn print_error(&self, error: anyhow::Error) {
        println!("{:#}", json!({ "error": format!("{error:?}") }));
    }
}

pub struct Quiet;

impl Output for Quiet {
    fn print_config(&self, _value: &ConfigValue) -> crate::Result<()> {
        Ok(())
    }

    fn print_config_paths(&self, _search_path: &[&Path], _user_file: Option<&Path>) {}

    fn print_cluster_render(&self, _spec: &ClusterSpec, _description: &str) -> crate::Result<()> {
        Ok(())
    }

    fn print_cluster_submit(&self, handle: &ClusterHandle) {
        if let Some(id) = handle.cluster_id() {
            println!("{id}");
        }
    }

    fn print_error(&self, error: anyhow::Error) {
        log::error!("{error:?}");
    }
}
