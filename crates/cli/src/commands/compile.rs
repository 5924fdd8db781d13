//! Compile Command

use anyhow::Result;
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;

use quiver_engine::{compile_and_run, Bundler, CollectingRegistrar, Sandbox};

use super::Context;
use crate::output::{print_success, print_value};

#[derive(Args)]
pub struct CompileArgs {
    /// Entry file to bundle
    pub file: PathBuf,

    /// Write the bundle here instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Execute the bundle and print its exports
    #[arg(long, conflicts_with = "output")]
    pub run: bool,
}

pub async fn execute(args: CompileArgs, ctx: &Context) -> Result<()> {
    let entry = ctx.resolve(&args.file);
    let bundler = ctx.bundler();

    if args.run {
        let sandbox = Sandbox::new(
            ctx.host(),
            Arc::new(CollectingRegistrar::new()),
            &entry,
            ctx.cwd(),
        );
        let exports = compile_and_run(bundler.as_ref(), &sandbox).await?;
        print_value(&exports.to_value(), ctx.format);
        return Ok(());
    }

    let compiled = bundler.build(&entry).await?;
    match args.output {
        Some(path) => {
            tokio::fs::write(&path, &compiled.text).await?;
            print_success(&format!(
                "Bundled {} into {} ({} bytes)",
                compiled.source.display(),
                path.display(),
                compiled.text.len()
            ));
        }
        None => print!("{}", compiled.text),
    }

    Ok(())
}
