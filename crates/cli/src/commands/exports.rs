//! Exports Command

use anyhow::Result;
use clap::Args;
use serde::Serialize;
use std::path::PathBuf;

use quiver_engine::discover_exports;

use super::Context;
use crate::output::{print_list, TableDisplay};

#[derive(Args)]
pub struct ExportsArgs {
    /// Source file to scan
    pub file: PathBuf,
}

#[derive(Serialize)]
pub struct ExportDisplay {
    pub name: String,
}

impl TableDisplay for ExportDisplay {
    fn headers() -> Vec<&'static str> {
        vec!["Export"]
    }

    fn row(&self) -> Vec<String> {
        vec![self.name.clone()]
    }
}

pub async fn execute(args: ExportsArgs, ctx: &Context) -> Result<()> {
    let record = discover_exports(&ctx.resolve(&args.file)).await?;

    let names: Vec<ExportDisplay> = record
        .iter()
        .map(|name| ExportDisplay {
            name: name.to_string(),
        })
        .collect();

    print_list(&names, ctx.format);
    Ok(())
}
