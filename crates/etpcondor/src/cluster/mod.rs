//! Resolution of a cluster profile into HTCondor worker jobs.
//!
//! [`ClusterProfileBuilder`] performs a single pass over the configuration and the caller's
//! options and produces a [`ClusterSpec`]. A [`ClusterBackend`] takes the resolved cluster
//! and hands the worker jobs over to the batch system.
mod builder;
mod condor;
mod directives;
mod job;
mod profile;

pub use builder::{
    ClusterOptions, ClusterProfileBuilder, ClusterSpec, DEFAULT_PYTHON, JOB_CLASS_NAME,
    WORKER_PORT_RANGE, image_layer, transfer_layer, worker_port_args,
};
pub use condor::{ClusterBackend, ClusterHandle, HtCondorBackend, SubmitMode, parse_cluster_id};
pub use directives::{DirectiveLayer, DirectiveSet, resolve_layers};
pub use job::{CondorJob, processes_and_threads};
pub use profile::ProfileSettings;
