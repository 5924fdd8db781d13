//! In-process host for natively defined modules

use futures::future::{self, BoxFuture, FutureExt};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use quiver_common::{Error, Result};

use super::{EvalOutcome, EvalUnit, ScriptHost};
use crate::module::Export;

type Evaluator = dyn Fn(&EvalUnit) -> Result<EvalOutcome> + Send + Sync;

#[derive(Clone)]
struct MemoryModule {
    export: Export,
    /// Only reachable through the asynchronous loader
    esm: bool,
}

/// Host whose modules are Rust values registered by path.
///
/// Modules registered with [`MemoryHost::insert_esm`] refuse the synchronous
/// loader the way an ES module does, so callers exercise the same fallback
/// as with a real runtime.
#[derive(Clone, Default)]
pub struct MemoryHost {
    modules: Arc<RwLock<HashMap<PathBuf, MemoryModule>>>,
    evaluator: Option<Arc<Evaluator>>,
    evaluated: Arc<RwLock<Vec<EvalUnit>>>,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `evaluate` calls with `evaluator`
    pub fn with_evaluator<F>(mut self, evaluator: F) -> Self
    where
        F: Fn(&EvalUnit) -> Result<EvalOutcome> + Send + Sync + 'static,
    {
        self.evaluator = Some(Arc::new(evaluator));
        self
    }

    pub fn insert(&self, path: impl Into<PathBuf>, export: Export) {
        self.modules
            .write()
            .insert(path.into(), MemoryModule { export, esm: false });
    }

    /// Register a module namespace that only the asynchronous loader accepts
    pub fn insert_esm(&self, path: impl Into<PathBuf>, namespace: Export) {
        self.modules.write().insert(
            path.into(),
            MemoryModule {
                export: namespace,
                esm: true,
            },
        );
    }

    /// Units passed to `evaluate`, in call order
    pub fn evaluated(&self) -> Vec<EvalUnit> {
        self.evaluated.read().clone()
    }

    fn lookup(&self, path: &Path) -> Result<MemoryModule> {
        self.modules
            .read()
            .get(path)
            .cloned()
            .ok_or_else(|| Error::module(path, "Cannot find module"))
    }
}

impl ScriptHost for MemoryHost {
    fn require(&self, path: &Path) -> Result<Export> {
        let module = self.lookup(path)?;
        if module.esm {
            return Err(Error::RequireEsm {
                path: path.display().to_string(),
            });
        }
        Ok(module.export)
    }

    fn import(&self, path: &Path) -> BoxFuture<'static, Result<Export>> {
        future::ready(self.lookup(path).map(|module| module.export)).boxed()
    }

    fn evaluate(&self, unit: &EvalUnit) -> Result<EvalOutcome> {
        self.evaluated.write().push(unit.clone());
        match &self.evaluator {
            Some(evaluator) => evaluator(unit),
            None => Err(Error::HostUnavailable(
                "in-memory host has no script evaluator".to_string(),
            )),
        }
    }
}
