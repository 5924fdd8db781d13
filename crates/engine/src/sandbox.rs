//! Sandboxed runner for in-memory script text
//!
//! Script text runs inside a function boundary that receives `module`,
//! a patched `require`, `__filename` and `__dirname`. Module resolution
//! always uses the real path of the file the text came from; diagnostics may
//! attribute the code to a separate virtual identity.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use quiver_common::Result;

use crate::bundler::Bundler;
use crate::host::{EvalUnit, RequireScope, ScriptHost, TestRegistrar};
use crate::module::Export;

/// Executes script text on a host
#[derive(Clone)]
pub struct Sandbox {
    host: Arc<dyn ScriptHost>,
    registrar: Arc<dyn TestRegistrar>,
    real_path: PathBuf,
    virtual_path: PathBuf,
    cwd: PathBuf,
}

impl Sandbox {
    pub fn new(
        host: Arc<dyn ScriptHost>,
        registrar: Arc<dyn TestRegistrar>,
        real_path: impl Into<PathBuf>,
        cwd: impl Into<PathBuf>,
    ) -> Self {
        let real_path = real_path.into();
        Self {
            host,
            registrar,
            virtual_path: real_path.clone(),
            real_path,
            cwd: cwd.into(),
        }
    }

    /// Attribute executed code to `path` in diagnostics
    pub fn with_virtual_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.virtual_path = path.into();
        self
    }

    pub fn real_path(&self) -> &Path {
        &self.real_path
    }

    pub fn virtual_path(&self) -> &Path {
        &self.virtual_path
    }

    /// Wrap script text in the module function boundary
    pub fn wrap(code: &str) -> String {
        format!(
            "(function (module, require, __filename, __dirname) {{\n  var exports = module.exports;\n\n{}\n}})",
            code
        )
    }

    pub fn unit(&self, code: &str) -> EvalUnit {
        EvalUnit {
            wrapped: Self::wrap(code),
            real_path: self.real_path.clone(),
            virtual_path: self.virtual_path.clone(),
            scope: RequireScope::new(&self.real_path, &self.cwd),
        }
    }

    /// Run `script` and return its exports, default-unwrapped. Test cases
    /// the script registers are forwarded to the registrar.
    pub fn execute(&self, script: &str) -> Result<Export> {
        debug!(
            "Executing {} bytes for {}",
            script.len(),
            self.virtual_path.display()
        );

        let outcome = self.host.evaluate(&self.unit(script))?;
        for registration in outcome.registrations {
            self.registrar.register(registration);
        }

        let (exports, _) = outcome.exports.unwrap_default();
        Ok(exports)
    }
}

/// Bundle the sandbox's real file and execute the result in it
pub async fn compile_and_run(bundler: &dyn Bundler, sandbox: &Sandbox) -> Result<Export> {
    let compiled = bundler.build(sandbox.real_path()).await?;
    sandbox.execute(&compiled.text)
}
