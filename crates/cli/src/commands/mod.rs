//! CLI Commands

pub mod api;
pub mod compile;
pub mod exports;
pub mod scan;
pub mod virtual_test;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use quiver_common::Settings;
use quiver_engine::{EsbuildBundler, NodeHost};

use crate::output::OutputFormat;

/// Settings and output format shared by every command
pub struct Context {
    pub settings: Settings,
    pub format: OutputFormat,
}

impl Context {
    pub fn cwd(&self) -> PathBuf {
        self.settings.cwd()
    }

    /// `path` resolved against the working directory
    pub fn resolve(&self, path: &Path) -> PathBuf {
        self.cwd().join(path)
    }

    pub fn host(&self) -> Arc<NodeHost> {
        Arc::new(NodeHost::from_settings(&self.settings))
    }

    pub fn bundler(&self) -> Arc<EsbuildBundler> {
        Arc::new(EsbuildBundler::from_settings(&self.settings))
    }
}
