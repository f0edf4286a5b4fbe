use crate::client::output::Output;
use crate::config::ConfigContext;
use std::path::{Path, PathBuf};

pub struct GlobalSettings {
    config: ConfigContext,
    work_dir: PathBuf,
    printer: Box<dyn Output>,
}

impl GlobalSettings {
    pub fn new(config: ConfigContext, work_dir: PathBuf, printer: Box<dyn Output>) -> Self {
        GlobalSettings {
            config,
            work_dir,
            printer,
        }
    }

    pub fn config(&self) -> &ConfigContext {
        &self.config
    }

    pub fn work_directory(&self) -> &Path {
        &self.work_dir
    }

    pub fn printer(&self) -> &dyn Output {
        self.printer.as_ref()
    }
}
