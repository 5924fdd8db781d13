//! Quiver configuration

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// One path or a list of paths, as accepted by the `*_path` settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SourcePaths {
    One(String),
    Many(Vec<String>),
}

impl Default for SourcePaths {
    fn default() -> Self {
        Self::Many(Vec::new())
    }
}

impl SourcePaths {
    pub fn to_vec(&self) -> Vec<String> {
        match self {
            SourcePaths::One(path) if path.is_empty() => Vec::new(),
            SourcePaths::One(path) => vec![path.clone()],
            SourcePaths::Many(paths) => paths.clone(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.to_vec().is_empty()
    }
}

impl From<Vec<String>> for SourcePaths {
    fn from(paths: Vec<String>) -> Self {
        Self::Many(paths)
    }
}

/// Top-level settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Folders holding user commands
    pub custom_commands_path: SourcePaths,

    /// Folders holding user assertions
    pub custom_assertions_path: SourcePaths,

    /// Folders holding page objects
    pub page_objects_path: SourcePaths,

    /// Plugin identifiers, resolved against the working directory
    pub plugins: Vec<String>,

    /// Module exporting the list of virtual suite declarations
    pub virtuals_path: Option<PathBuf>,

    /// Built-in definitions
    pub builtins: BuiltinsConfig,

    /// Fallback for the bundled example folders
    pub bundled: BundledConfig,

    /// Host runtime and bundler
    pub runtime: RuntimeConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            custom_commands_path: SourcePaths::default(),
            custom_assertions_path: SourcePaths::default(),
            page_objects_path: SourcePaths::default(),
            plugins: Vec::new(),
            virtuals_path: None,
            builtins: BuiltinsConfig::default(),
            bundled: BundledConfig::default(),
            runtime: RuntimeConfig::default(),
        }
    }
}

/// Built-in definition configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BuiltinsConfig {
    /// Root folder holding the built-in category folders
    pub root: Option<PathBuf>,
}

/// Bundled examples fallback
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BundledConfig {
    /// Prefix of an un-resolved path that may be served from the bundled root
    pub prefix: String,

    /// Location the bundled examples ship in
    pub root: PathBuf,
}

impl Default for BundledConfig {
    fn default() -> Self {
        Self {
            prefix: "examples/".to_string(),
            root: PathBuf::from("node_modules/nightwatch"),
        }
    }
}

/// Host runtime configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Script runtime binary
    pub node: PathBuf,

    /// Bundler binary
    pub esbuild: PathBuf,

    /// Working directory; the process one when unset
    pub cwd: Option<PathBuf>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            node: PathBuf::from("node"),
            esbuild: PathBuf::from("esbuild"),
            cwd: None,
        }
    }
}

impl Settings {
    /// Load configuration from file
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            Self::from_toml(&content)
        } else {
            tracing::debug!("No config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::InvalidConfig(e.to_string()))
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| Error::InvalidConfig(e.to_string()))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Working directory every relative path is resolved against
    pub fn cwd(&self) -> PathBuf {
        self.runtime
            .cwd
            .clone()
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Virtuals module location, defaulting to `nightwatch/virtuals.js`
    pub fn virtuals_path(&self) -> PathBuf {
        let relative = self
            .virtuals_path
            .clone()
            .unwrap_or_else(|| Path::new("nightwatch").join("virtuals.js"));
        self.cwd().join(relative)
    }
}
