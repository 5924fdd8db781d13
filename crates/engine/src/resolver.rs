//! Module resolution across the two loading conventions

use futures::future::{BoxFuture, FutureExt};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use quiver_common::Result;

use crate::host::ScriptHost;
use crate::module::LoadedModule;

/// A module that is either available now or still loading
pub enum Loaded {
    Ready(LoadedModule),
    Deferred(BoxFuture<'static, Result<LoadedModule>>),
}

impl fmt::Debug for Loaded {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Loaded::Ready(module) => f.debug_tuple("Ready").field(module).finish(),
            Loaded::Deferred(_) => f.write_str("Deferred(..)"),
        }
    }
}

impl Loaded {
    pub fn is_deferred(&self) -> bool {
        matches!(self, Loaded::Deferred(_))
    }

    /// Normalize to a module, awaiting the deferred load if needed
    pub async fn resolve(self) -> Result<LoadedModule> {
        match self {
            Loaded::Ready(module) => Ok(module),
            Loaded::Deferred(pending) => pending.await,
        }
    }

    /// Blocking form of [`Loaded::resolve`] for synchronous callers
    pub fn wait(self) -> Result<LoadedModule> {
        match self {
            Loaded::Ready(module) => Ok(module),
            Loaded::Deferred(pending) => futures::executor::block_on(pending),
        }
    }
}

/// Loads modules through a script host, falling back to the asynchronous
/// loader when the synchronous one reports the other module convention.
#[derive(Clone)]
pub struct ModuleResolver {
    host: Arc<dyn ScriptHost>,
}

impl ModuleResolver {
    pub fn new(host: Arc<dyn ScriptHost>) -> Self {
        Self { host }
    }

    pub fn host(&self) -> &Arc<dyn ScriptHost> {
        &self.host
    }

    pub fn load(&self, path: &Path) -> Result<Loaded> {
        match self.host.require(path) {
            Ok(raw) => Ok(Loaded::Ready(LoadedModule::required(path, raw))),
            Err(err) if err.is_require_esm() => {
                debug!("{} needs the asynchronous loader", path.display());
                let pending = self.host.import(path);
                let path: PathBuf = path.to_path_buf();
                Ok(Loaded::Deferred(
                    async move {
                        let namespace = pending.await?;
                        Ok::<_, quiver_common::Error>(LoadedModule::imported(&path, namespace))
                    }
                    .boxed(),
                ))
            }
            Err(err) => Err(err),
        }
    }

    /// Load and normalize in one step
    pub async fn load_resolved(&self, path: &Path) -> Result<LoadedModule> {
        self.load(path)?.resolve().await
    }
}
