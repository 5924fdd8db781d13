//! Script host abstraction
//!
//! The host is the JavaScript runtime extension modules are written for.
//! It offers the two loading primitives the resolver bridges between and
//! the evaluation primitive the sandbox runs wrapped script text with.

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use quiver_common::Result;

use crate::module::Export;

pub mod memory;
pub mod node;

pub use memory::MemoryHost;
pub use node::NodeHost;

/// Runtime modules resolved by name, never through a package root
pub const BUILTIN_MODULES: &[&str] = &[
    "assert", "buffer", "child_process", "crypto", "events", "fs", "http", "https", "module",
    "net", "os", "path", "process", "querystring", "readline", "stream", "string_decoder",
    "timers", "tty", "url", "util", "vm", "worker_threads", "zlib",
];

/// A JavaScript runtime that can load and evaluate modules
pub trait ScriptHost: Send + Sync {
    /// Eager, synchronous load. Fails with `Error::RequireEsm` when the
    /// module uses the other module convention.
    fn require(&self, path: &Path) -> Result<Export>;

    /// Asynchronous load; resolves to the module namespace.
    fn import(&self, path: &Path) -> BoxFuture<'static, Result<Export>>;

    /// Evaluate a function-boundary wrapped script.
    fn evaluate(&self, unit: &EvalUnit) -> Result<EvalOutcome>;
}

/// Script text plus the identity it runs under
#[derive(Debug, Clone, Serialize)]
pub struct EvalUnit {
    /// Function expression taking `(module, require, __filename, __dirname)`
    pub wrapped: String,
    /// Identity used for module resolution
    pub real_path: PathBuf,
    /// Identity used in diagnostics
    pub virtual_path: PathBuf,
    pub scope: RequireScope,
}

/// What an evaluation produced
#[derive(Debug, Clone, Default)]
pub struct EvalOutcome {
    /// `module.exports` after the script ran, before default unwrapping
    pub exports: Export,
    pub registrations: Vec<TestRegistration>,
}

/// One test case registered through the ambient `describe`/`it` facility
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestRegistration {
    pub suite: Option<String>,
    pub title: String,
    /// Identity of the script that registered it
    pub origin: PathBuf,
}

/// Resolution rules of the patched `require` handed to sandboxed code
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequireScope {
    /// Directory of the real file; relative requests resolve here
    pub base_dir: PathBuf,
    /// Package root; bare requests resolve here
    pub package_root: PathBuf,
}

/// Where a sandboxed `require` request points
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequireTarget {
    Builtin(String),
    Path(PathBuf),
}

impl RequireScope {
    pub fn new(real_path: &Path, cwd: &Path) -> Self {
        Self {
            base_dir: real_path
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| cwd.to_path_buf()),
            package_root: cwd.join("node_modules"),
        }
    }

    pub fn resolve(&self, request: &str) -> RequireTarget {
        let bare = request.strip_prefix("node:").unwrap_or(request);
        if request.starts_with("node:") || BUILTIN_MODULES.contains(&bare) {
            return RequireTarget::Builtin(bare.to_string());
        }

        let requested = Path::new(request);
        if requested.is_absolute() {
            RequireTarget::Path(requested.to_path_buf())
        } else if request.starts_with('.') {
            RequireTarget::Path(self.base_dir.join(requested))
        } else {
            RequireTarget::Path(self.package_root.join(requested))
        }
    }
}

/// Receives the test cases executed scripts register
pub trait TestRegistrar: Send + Sync {
    fn register(&self, registration: TestRegistration);
}

/// Registrar that keeps every registration in memory
#[derive(Debug, Default)]
pub struct CollectingRegistrar {
    registrations: parking_lot::Mutex<Vec<TestRegistration>>,
}

impl CollectingRegistrar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn registrations(&self) -> Vec<TestRegistration> {
        self.registrations.lock().clone()
    }
}

impl TestRegistrar for CollectingRegistrar {
    fn register(&self, registration: TestRegistration) {
        self.registrations.lock().push(registration);
    }
}
