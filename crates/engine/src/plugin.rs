//! Plugin identifier resolution

use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

use quiver_common::{Error, Result, LOADABLE_EXTENSIONS};

const PACKAGE_MANIFEST: &str = "package.json";
const DEFAULT_MAIN: &str = "index.js";

#[derive(Debug, Default, Deserialize)]
struct PackageManifest {
    main: Option<String>,
}

/// Resolves plugin identifiers against the working directory's package root
#[derive(Debug, Clone)]
pub struct PluginResolver {
    cwd: PathBuf,
}

impl PluginResolver {
    pub fn new(cwd: impl Into<PathBuf>) -> Self {
        Self { cwd: cwd.into() }
    }

    pub fn package_root(&self) -> PathBuf {
        self.cwd.join("node_modules")
    }

    /// Entry file of the plugin named by `identifier`
    pub fn resolve(&self, identifier: &str) -> Result<PathBuf> {
        let candidate = if identifier.starts_with('.') || Path::new(identifier).is_absolute() {
            self.cwd.join(identifier)
        } else {
            self.package_root().join(identifier)
        };

        let entry = self
            .entry_point(&candidate)?
            .ok_or_else(|| Error::not_found("plugin", identifier))?;

        debug!("Plugin {} resolved to {}", identifier, entry.display());
        Ok(entry)
    }

    fn entry_point(&self, candidate: &Path) -> Result<Option<PathBuf>> {
        if candidate.is_file() {
            return Ok(Some(candidate.to_path_buf()));
        }

        if candidate.is_dir() {
            let main = read_main(&candidate.join(PACKAGE_MANIFEST))?;
            let target = candidate.join(main.as_deref().unwrap_or(DEFAULT_MAIN));
            if target != candidate {
                if let Some(entry) = with_extension(&target) {
                    return Ok(Some(entry));
                }
                let index = target.join(DEFAULT_MAIN);
                if index.is_file() {
                    return Ok(Some(index));
                }
            }
            return Ok(None);
        }

        Ok(with_extension(candidate))
    }
}

fn read_main(manifest: &Path) -> Result<Option<String>> {
    if !manifest.is_file() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(manifest)?;
    let parsed: PackageManifest = serde_json::from_str(&content)?;
    Ok(parsed.main.filter(|main| !main.trim().is_empty()))
}

/// `path` itself, or `path` with one of the loadable extensions appended
fn with_extension(path: &Path) -> Option<PathBuf> {
    if path.is_file() {
        return Some(path.to_path_buf());
    }
    LOADABLE_EXTENSIONS.iter().find_map(|ext| {
        let mut with_ext = path.as_os_str().to_owned();
        with_ext.push(".");
        with_ext.push(ext);
        let with_ext = PathBuf::from(with_ext);
        trace!("Trying {}", with_ext.display());
        with_ext.is_file().then_some(with_ext)
    })
}
