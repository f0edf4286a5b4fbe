//! Dask worker clusters for the KIT-ETP HTCondor pool.
//!
//! The crate resolves the HTCondor submit directives of the `kitetp` cluster profile out of
//! a layered configuration (user files, environment, bundled defaults) and site-mandated
//! overrides, and hands the rendered worker jobs over to `condor_submit`.
pub mod client;
pub mod cluster;
pub mod common;
pub mod config;

pub type Error = crate::common::error::EtpError;
pub type Result<T> = std::result::Result<T, Error>;

/// Name of the cluster profile (and of its section in the configuration registry).
pub const PROFILE_NAME: &str = "kitetp";

pub const ETP_VERSION: &str = {
    match option_env!("ETP_BUILD_VERSION") {
        Some(version) => version,
        None => const_format::concatcp!(env!("CARGO_PKG_VERSION"), "-dev"),
    }
};
