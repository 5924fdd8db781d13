//! Directory scanner for extension definition files
//!
//! Traversal is lexicographic at every level so registration order does not
//! depend on the platform's directory listing order.

use globset::{GlobBuilder, GlobSetBuilder};
use std::path::{Component, Path, PathBuf};
use tracing::{debug, trace};
use walkdir::WalkDir;

use quiver_common::config::BundledConfig;
use quiver_common::{is_loadable_file, Error, Result};

/// One discovered definition file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanEntry {
    pub dir: PathBuf,
    pub file_name: String,
    pub namespace: Vec<String>,
}

impl ScanEntry {
    pub fn path(&self) -> PathBuf {
        self.dir.join(&self.file_name)
    }
}

/// Result of one scan; consumed once
#[derive(Debug)]
pub struct Scan {
    entries: std::vec::IntoIter<ScanEntry>,
}

impl Iterator for Scan {
    type Item = ScanEntry;

    fn next(&mut self) -> Option<Self::Item> {
        self.entries.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.entries.size_hint()
    }
}

impl ExactSizeIterator for Scan {}

/// Whether a path is a glob pattern rather than a directory
pub fn is_glob(path: &str) -> bool {
    path.contains(['*', '?', '[', '{'])
}

/// Scans definition folders
#[derive(Debug, Clone)]
pub struct DirectoryScanner {
    bundled: BundledConfig,
    cwd: PathBuf,
}

impl DirectoryScanner {
    pub fn new(bundled: BundledConfig, cwd: impl Into<PathBuf>) -> Self {
        Self {
            bundled,
            cwd: cwd.into(),
        }
    }

    /// Scan `root`. `original` is the path as configured, before resolution
    /// against the working directory. It decides whether the root is a
    /// glob pattern and whether the bundled examples fallback applies; a
    /// resolved path alone is never treated as a pattern.
    pub fn scan(&self, root: &Path, original: Option<&str>) -> Result<Scan> {
        let mut entries = Vec::new();

        match original.filter(|o| is_glob(o)) {
            Some(pattern) => self.expand_glob(pattern, &mut entries)?,
            None => {
                let root = self.locate(root, original)?;
                walk(&root, &[], &mut entries)?;
            }
        }

        debug!(
            "Scanned {}: {} definition file(s)",
            root.display(),
            entries.len()
        );
        Ok(Scan {
            entries: entries.into_iter(),
        })
    }

    fn locate(&self, root: &Path, original: Option<&str>) -> Result<PathBuf> {
        if root.is_dir() {
            return Ok(root.to_path_buf());
        }
        if root.exists() {
            return Err(Error::InvalidConfig(format!(
                "{} is not a directory",
                root.display()
            )));
        }

        if let Some(original) = original.filter(|o| o.starts_with(&self.bundled.prefix)) {
            let fallback = self.cwd.join(&self.bundled.root).join(original);
            debug!(
                "{} is missing, trying bundled location {}",
                root.display(),
                fallback.display()
            );
            if fallback.is_dir() {
                return Ok(fallback);
            }
        }

        Err(Error::not_found("directory", root))
    }

    /// Relative patterns match paths relative to the working directory
    fn expand_glob(&self, pattern: &str, out: &mut Vec<ScanEntry>) -> Result<()> {
        let pattern = pattern.strip_prefix("./").unwrap_or(pattern);
        let invalid =
            |e: globset::Error| Error::InvalidConfig(format!("invalid pattern {}: {}", pattern, e));
        let glob = GlobBuilder::new(pattern)
            .literal_separator(true)
            .build()
            .map_err(invalid)?;
        let matcher = GlobSetBuilder::new().add(glob).build().map_err(invalid)?;

        let relative = Path::new(pattern).is_relative();
        let base = self.cwd.join(literal_prefix(Path::new(pattern)));
        if !base.exists() {
            return Ok(());
        }

        let mut matches: Vec<PathBuf> = WalkDir::new(&base)
            .follow_links(true)
            .min_depth(1)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.into_path())
            .filter(|path| {
                let candidate = if relative {
                    path.strip_prefix(&self.cwd).unwrap_or(path)
                } else {
                    path.as_path()
                };
                matcher.is_match(candidate)
            })
            .collect();
        matches.sort();

        for path in matches {
            let Some(name) = path.file_name().map(|n| n.to_string_lossy().into_owned()) else {
                continue;
            };
            if path.is_dir() {
                walk(&path, &[name], out)?;
            } else if is_loadable_file(&name) {
                out.push(ScanEntry {
                    dir: path.parent().map(Path::to_path_buf).unwrap_or_default(),
                    file_name: name,
                    namespace: Vec::new(),
                });
            }
        }

        Ok(())
    }
}

/// Depth-first, sorted walk; sub-directory names become namespace segments
fn walk(root: &Path, namespace: &[String], out: &mut Vec<ScanEntry>) -> Result<()> {
    for entry in WalkDir::new(root)
        .follow_links(true)
        .min_depth(1)
        .sort_by_file_name()
    {
        let entry = entry.map_err(std::io::Error::from)?;
        if entry.file_type().is_dir() {
            continue;
        }

        let file_name = entry.file_name().to_string_lossy().into_owned();
        if !is_loadable_file(&file_name) {
            trace!("Skipping {}", entry.path().display());
            continue;
        }

        let dir = entry
            .path()
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| root.to_path_buf());

        let mut segments = namespace.to_vec();
        if let Ok(relative) = dir.strip_prefix(root) {
            segments.extend(relative.components().filter_map(|c| match c {
                Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
                _ => None,
            }));
        }

        out.push(ScanEntry {
            dir,
            file_name,
            namespace: segments,
        });
    }

    Ok(())
}

/// Leading components of a pattern that contain no glob syntax
fn literal_prefix(pattern: &Path) -> PathBuf {
    let mut base = PathBuf::new();
    for component in pattern.components() {
        if is_glob(&component.as_os_str().to_string_lossy()) {
            break;
        }
        base.push(component);
    }
    if base.as_os_str().is_empty() {
        PathBuf::from(".")
    } else {
        base
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "module.exports = {};").unwrap();
    }

    fn scanner(cwd: &Path) -> DirectoryScanner {
        DirectoryScanner::new(BundledConfig::default(), cwd)
    }

    fn relative_names(scan: Scan, root: &Path) -> Vec<String> {
        scan.map(|e| {
            e.path()
                .strip_prefix(root)
                .unwrap()
                .to_string_lossy()
                .replace('\\', "/")
        })
        .collect()
    }

    #[test]
    fn test_scan_is_lexicographic_and_depth_first() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("b.js"));
        touch(&dir.path().join("sub").join("c.js"));
        touch(&dir.path().join("a.js"));

        let scan = scanner(dir.path()).scan(dir.path(), None).unwrap();
        assert_eq!(
            relative_names(scan, dir.path()),
            vec!["a.js", "b.js", "sub/c.js"]
        );
    }

    #[test]
    fn test_nested_dirs_become_namespace_segments() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("window").join("tabs").join("switchTo.ts"));
        touch(&dir.path().join("notes.md"));

        let entries: Vec<_> = scanner(dir.path()).scan(dir.path(), None).unwrap().collect();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].file_name, "switchTo.ts");
        assert_eq!(entries[0].namespace, vec!["window", "tabs"]);
    }

    #[test]
    fn test_glob_root_lists_matches_without_namespace() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("cmds").join("one.js"));
        touch(&dir.path().join("cmds").join("two.ts"));
        touch(&dir.path().join("cmds").join("deep").join("three.js"));

        let pattern = "cmds/*.js";
        let entries: Vec<_> = scanner(dir.path())
            .scan(&dir.path().join(pattern), Some(pattern))
            .unwrap()
            .collect();

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].file_name, "one.js");
        assert!(entries[0].namespace.is_empty());
    }

    #[test]
    fn test_glob_matching_directory_descends() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("pages").join("login").join("form.js"));

        let pattern = format!("{}/pages/*", dir.path().display());
        let entries: Vec<_> = scanner(dir.path())
            .scan(Path::new(&pattern), Some(&pattern))
            .unwrap()
            .collect();

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].namespace, vec!["login"]);
    }

    #[test]
    fn test_missing_root_without_fallback_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("custom-commands");
        let err = scanner(dir.path())
            .scan(&missing, Some("custom-commands"))
            .unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[test]
    fn test_bundled_examples_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let bundled = dir
            .path()
            .join("node_modules/nightwatch/examples/custom-commands");
        touch(&bundled.join("strictClick.js"));

        let configured = dir.path().join("examples/custom-commands");
        let entries: Vec<_> = scanner(dir.path())
            .scan(&configured, Some("examples/custom-commands"))
            .unwrap()
            .collect();

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].dir, bundled);
    }

    #[test]
    fn test_pattern_characters_in_cwd_are_literal() {
        let dir = tempfile::tempdir().unwrap();
        let cwd = dir.path().join("work[1]");
        touch(&cwd.join("cmds").join("a.js"));

        let entries: Vec<_> = scanner(&cwd)
            .scan(&cwd.join("cmds"), Some("cmds"))
            .unwrap()
            .collect();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].dir, cwd.join("cmds"));

        let entries: Vec<_> = scanner(&cwd)
            .scan(&cwd.join("cmds/*.js"), Some("./cmds/*.js"))
            .unwrap()
            .collect();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].file_name, "a.js");
    }

    #[test]
    fn test_file_root_is_invalid_config() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("commands.js");
        touch(&file);

        let err = scanner(dir.path())
            .scan(&file, Some("commands.js"))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn test_literal_prefix() {
        assert_eq!(
            literal_prefix(Path::new("/a/b/*/c.js")),
            PathBuf::from("/a/b")
        );
        assert_eq!(literal_prefix(Path::new("*.js")), PathBuf::from("."));
    }
}
