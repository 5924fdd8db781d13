//! Compilation pipeline
//!
//! Bundles a source file and its static dependencies into one CommonJS
//! script the sandbox can run eagerly. The configuration is fixed: CommonJS
//! output, node platform, `node12` target floor and one loader table.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use quiver_common::{Error, Result, Settings};

/// Output module format
pub const OUTPUT_FORMAT: &str = "cjs";

/// Minimum runtime the output must run on
pub const TARGET: &str = "node12";

pub const PLATFORM: &str = "node";

/// How the bundler interprets a file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoaderKind {
    Js,
    Jsx,
    Ts,
    Tsx,
    Css,
    Json,
    Text,
    Binary,
    DataUrl,
}

impl LoaderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoaderKind::Js => "js",
            LoaderKind::Jsx => "jsx",
            LoaderKind::Ts => "ts",
            LoaderKind::Tsx => "tsx",
            LoaderKind::Css => "css",
            LoaderKind::Json => "json",
            LoaderKind::Text => "text",
            LoaderKind::Binary => "binary",
            LoaderKind::DataUrl => "dataurl",
        }
    }
}

/// Extension to loader table
pub const LOADERS: &[(&str, LoaderKind)] = &[
    (".js", LoaderKind::Js),
    (".cjs", LoaderKind::Js),
    (".jsx", LoaderKind::Jsx),
    (".ts", LoaderKind::Ts),
    (".cts", LoaderKind::Ts),
    (".tsx", LoaderKind::Tsx),
    (".css", LoaderKind::Css),
    (".json", LoaderKind::Json),
    (".txt", LoaderKind::Text),
    (".data", LoaderKind::Binary),
    (".svg", LoaderKind::DataUrl),
    (".png", LoaderKind::DataUrl),
    (".jpeg", LoaderKind::DataUrl),
    (".webp", LoaderKind::DataUrl),
    (".avif", LoaderKind::DataUrl),
];

/// Loader for a file, by extension
pub fn loader_for(path: &Path) -> Option<LoaderKind> {
    let ext = path.extension()?.to_str()?;
    LOADERS
        .iter()
        .find(|(candidate, _)| candidate.trim_start_matches('.') == ext)
        .map(|(_, loader)| *loader)
}

/// Bundler output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledScript {
    pub text: String,
    /// Entry file the script was built from
    pub source: PathBuf,
}

/// Options for compiling in-memory source text
#[derive(Debug, Clone)]
pub struct TransformOptions {
    /// Identity reported in diagnostics
    pub source_file: PathBuf,
    pub loader: LoaderKind,
}

impl TransformOptions {
    /// Options for text that stands in for `module_path`, reported as `source_file`
    pub fn for_module(module_path: &Path, source_file: impl Into<PathBuf>) -> Self {
        Self {
            source_file: source_file.into(),
            loader: loader_for(module_path).unwrap_or(LoaderKind::Js),
        }
    }
}

/// Compiles source into eagerly loadable scripts
#[async_trait]
pub trait Bundler: Send + Sync {
    /// Bundle `entry` and its static dependencies into one script
    async fn build(&self, entry: &Path) -> Result<CompiledScript>;

    /// Compile in-memory source text without bundling
    async fn transform(&self, code: &str, options: &TransformOptions) -> Result<String>;
}

/// Bundler backed by the `esbuild` command-line tool
#[derive(Debug, Clone)]
pub struct EsbuildBundler {
    binary: PathBuf,
    cwd: PathBuf,
}

impl EsbuildBundler {
    pub fn new(binary: impl Into<PathBuf>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            cwd: cwd.into(),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.runtime.esbuild.clone(), settings.cwd())
    }

    fn common_args() -> Vec<String> {
        vec![
            format!("--format={}", OUTPUT_FORMAT),
            format!("--platform={}", PLATFORM),
            format!("--target={}", TARGET),
            "--log-level=error".to_string(),
        ]
    }

    /// Arguments for bundling `entry`
    pub fn build_args(entry: &Path) -> Vec<String> {
        let mut args = vec![entry.display().to_string(), "--bundle".to_string()];
        args.extend(Self::common_args());
        args.extend(
            LOADERS
                .iter()
                .map(|(ext, loader)| {
                    format!("--loader:{}={}", ext, loader.as_str())
                }),
        );
        args
    }

    /// Arguments for compiling text read from stdin
    pub fn transform_args(options: &TransformOptions) -> Vec<String> {
        let mut args = Self::common_args();
        args.push(format!("--loader={}", options.loader.as_str()));
        args.push(format!("--sourcefile={}", options.source_file.display()));
        args
    }

    fn command(&self, args: &[String]) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.args(args)
            .current_dir(&self.cwd)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        cmd
    }

    fn spawn_error(&self, err: std::io::Error) -> Error {
        Error::HostUnavailable(format!("{}: {}", self.binary.display(), err))
    }
}

#[async_trait]
impl Bundler for EsbuildBundler {
    async fn build(&self, entry: &Path) -> Result<CompiledScript> {
        debug!("Bundling {}", entry.display());

        let output = self
            .command(&Self::build_args(entry))
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| self.spawn_error(e))?;

        if !output.status.success() {
            return Err(Error::compilation(
                entry,
                String::from_utf8_lossy(&output.stderr).trim(),
            ));
        }

        let text = String::from_utf8(output.stdout).map_err(|e| {
            Error::compilation(entry, format!("output is not UTF-8: {}", e))
        })?;

        Ok(CompiledScript {
            text,
            source: entry.to_path_buf(),
        })
    }

    async fn transform(&self, code: &str, options: &TransformOptions) -> Result<String> {
        debug!("Transforming {}", options.source_file.display());

        let mut child = self
            .command(&Self::transform_args(options))
            .stdin(Stdio::piped())
            .spawn()
            .map_err(|e| self.spawn_error(e))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(code.as_bytes()).await?;
        }

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            return Err(Error::compilation(
                &options.source_file,
                String::from_utf8_lossy(&output.stderr).trim(),
            ));
        }

        String::from_utf8(output.stdout).map_err(|e| {
            Error::compilation(&options.source_file, format!("output is not UTF-8: {}", e))
        })
    }
}

/// Run [`Bundler::build`] to completion from synchronous code. Inside a
/// runtime this must be called from a blocking thread, never from a task.
pub fn build_blocking(bundler: &dyn Bundler, entry: &Path) -> Result<CompiledScript> {
    let build = bundler.build(entry);
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => handle.block_on(build),
        Err(_) => tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?
            .block_on(build),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("widget.tsx", Some(LoaderKind::Tsx))]
    #[test_case("widget.cts", Some(LoaderKind::Ts))]
    #[test_case("logo.avif", Some(LoaderKind::DataUrl))]
    #[test_case("blob.data", Some(LoaderKind::Binary))]
    #[test_case("module.mjs", None)]
    #[test_case("Makefile", None)]
    fn test_loader_for(file: &str, expected: Option<LoaderKind>) {
        assert_eq!(loader_for(Path::new(file)), expected);
    }

    #[test]
    fn test_build_args_carry_fixed_configuration() {
        let args = EsbuildBundler::build_args(Path::new("/src/button.tsx"));
        assert_eq!(args[0], "/src/button.tsx");
        assert!(args.contains(&"--bundle".to_string()));
        assert!(args.contains(&"--format=cjs".to_string()));
        assert!(args.contains(&"--target=node12".to_string()));
        assert!(args.contains(&"--loader:.png=dataurl".to_string()));
        assert!(args.contains(&"--loader:.txt=text".to_string()));
    }

    #[test]
    fn test_transform_args() {
        let options = TransformOptions::for_module(Path::new("/src/button.tsx"), "/src/button.js");
        let args = EsbuildBundler::transform_args(&options);
        assert!(args.contains(&"--loader=tsx".to_string()));
        assert!(args.contains(&"--sourcefile=/src/button.js".to_string()));
        assert!(!args.contains(&"--bundle".to_string()));
    }

    #[tokio::test]
    async fn test_missing_binary_is_host_unavailable() {
        let bundler = EsbuildBundler::new("/nonexistent/quiver-esbuild", std::env::temp_dir());
        let err = bundler.build(Path::new("/tmp/entry.js")).await.unwrap_err();
        assert!(matches!(err, Error::HostUnavailable(_)));
    }
}
