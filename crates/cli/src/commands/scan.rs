//! Scan Command

use anyhow::Result;
use clap::Args;
use serde::Serialize;
use std::path::Path;

use quiver_engine::{DirectoryScanner, ScanEntry};

use super::Context;
use crate::output::{print_list, TableDisplay};

#[derive(Args)]
pub struct ScanArgs {
    /// Folder or glob pattern, relative to the working directory
    pub path: String,
}

#[derive(Serialize)]
pub struct EntryDisplay {
    pub file: String,
    pub namespace: String,
}

impl From<ScanEntry> for EntryDisplay {
    fn from(entry: ScanEntry) -> Self {
        Self {
            file: entry.path().display().to_string(),
            namespace: entry.namespace.join("."),
        }
    }
}

impl TableDisplay for EntryDisplay {
    fn headers() -> Vec<&'static str> {
        vec!["File", "Namespace"]
    }

    fn row(&self) -> Vec<String> {
        vec![self.file.clone(), self.namespace.clone()]
    }
}

pub async fn execute(args: ScanArgs, ctx: &Context) -> Result<()> {
    let scanner = DirectoryScanner::new(ctx.settings.bundled.clone(), ctx.cwd());
    let root = ctx.resolve(Path::new(&args.path));

    let entries: Vec<EntryDisplay> = scanner
        .scan(&root, Some(&args.path))?
        .map(EntryDisplay::from)
        .collect();

    print_list(&entries, ctx.format);
    Ok(())
}
