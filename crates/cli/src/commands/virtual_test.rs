//! Virtual Command

use anyhow::{Context as _, Result};
use clap::Args;
use futures::future::{self, BoxFuture, FutureExt};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use quiver_engine::{
    CaseTitle, CollectingRegistrar, TestRegistration, VirtualTestSpec, VirtualTestSynthesizer,
};

use super::api::compose;
use super::Context;
use crate::output::{print_info, print_list, TableDisplay};

#[derive(Args)]
pub struct VirtualArgs {
    /// Source file to build the suite for
    pub file: PathBuf,

    /// JSON suite declaration; without it, the configured virtual
    /// declarations that match the file are used
    #[arg(long)]
    pub spec: Option<PathBuf>,

    /// Print the generated script instead of running it
    #[arg(long)]
    pub dry_run: bool,
}

/// Suite declaration as written in a JSON file
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SpecFile {
    name: String,
    filter: Option<String>,
    /// Exports to generate cases for; all but the default export when absent
    exports: Option<Vec<String>>,
    create_test: String,
}

/// Keep the discovered names that appear in `wanted`, in discovery order
fn select_listed(
    discovered: &[String],
    wanted: &[String],
) -> BoxFuture<'static, quiver_common::Result<Vec<String>>> {
    let selected = discovered
        .iter()
        .filter(|name| wanted.contains(name))
        .cloned()
        .collect();
    future::ready(Ok(selected)).boxed()
}

impl SpecFile {
    fn into_spec(self) -> Result<VirtualTestSpec> {
        let mut spec = VirtualTestSpec::new(CaseTitle::Literal(self.name), self.create_test);
        if let Some(filter) = self.filter {
            spec = spec.with_filter(regex::Regex::new(&filter).context("invalid filter")?);
        }
        if let Some(wanted) = self.exports {
            spec = spec.with_exports(move |discovered, _path| select_listed(&discovered, &wanted));
        }
        Ok(spec)
    }
}

#[derive(Serialize)]
pub struct RegistrationDisplay {
    pub suite: String,
    pub title: String,
}

impl From<TestRegistration> for RegistrationDisplay {
    fn from(registration: TestRegistration) -> Self {
        Self {
            suite: registration.suite.unwrap_or_default(),
            title: registration.title,
        }
    }
}

impl TableDisplay for RegistrationDisplay {
    fn headers() -> Vec<&'static str> {
        vec!["Suite", "Test"]
    }

    fn row(&self) -> Vec<String> {
        vec![self.suite.clone(), self.title.clone()]
    }
}

async fn load_specs(args: &VirtualArgs, file: &Path, ctx: Context) -> Result<Vec<VirtualTestSpec>> {
    if let Some(path) = &args.spec {
        let content = tokio::fs::read_to_string(ctx.resolve(path))
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        let declaration: SpecFile = serde_json::from_str(&content)?;
        return Ok(vec![declaration.into_spec()?]);
    }

    let api = compose(ctx).await?;
    Ok(api.virtuals_for(file).cloned().collect())
}

pub async fn execute(args: VirtualArgs, ctx: Context) -> Result<()> {
    let format = ctx.format;
    let cwd = ctx.cwd();
    let file = ctx.resolve(&args.file);
    let registrar = Arc::new(CollectingRegistrar::new());
    let synthesizer =
        VirtualTestSynthesizer::new(ctx.bundler(), ctx.host(), registrar.clone(), cwd);

    let specs: Vec<VirtualTestSpec> = load_specs(&args, &file, ctx)
        .await?
        .into_iter()
        .filter(|spec| spec.matches(&file))
        .collect();
    if specs.is_empty() {
        print_info(&format!(
            "No virtual suite declaration applies to {}",
            file.display()
        ));
        return Ok(());
    }

    for spec in &specs {
        if args.dry_run {
            let suite = synthesizer.synthesize(&file, spec).await?;
            print!("{}", suite.script);
        } else {
            synthesizer.run(&file, spec).await?;
        }
    }

    if !args.dry_run {
        let registrations: Vec<RegistrationDisplay> = registrar
            .registrations()
            .into_iter()
            .map(RegistrationDisplay::from)
            .collect();
        print_list(&registrations, format);
    }

    Ok(())
}
