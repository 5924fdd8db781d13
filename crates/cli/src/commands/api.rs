//! API Command

use anyhow::{Context as _, Result};
use clap::Args;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

use quiver_engine::{Bundler, ComposedApi, ExtensionRegistry, Namespace, Policy, ScriptHost};

use super::Context;
use crate::output::{print_info, print_list, print_value, TableDisplay};

#[derive(Args)]
pub struct ApiArgs {
    /// Method to call, as a dotted path such as `assert.not.visible`
    #[arg(long)]
    pub call: Option<String>,

    /// Call arguments as a JSON array
    #[arg(long, default_value = "[]", requires = "call")]
    pub args: String,
}

#[derive(Serialize)]
pub struct MethodDisplay {
    pub path: String,
    pub policy: Policy,
    pub element: bool,
}

impl TableDisplay for MethodDisplay {
    fn headers() -> Vec<&'static str> {
        vec!["Method", "Policy", "Element"]
    }

    fn row(&self) -> Vec<String> {
        let policy = match self.policy {
            Policy::Plain => "-",
            Policy::Affirming => "abort",
            Policy::Soft => "record",
        };
        vec![
            self.path.clone(),
            policy.to_string(),
            if self.element { "yes" } else { "" }.to_string(),
        ]
    }
}

/// Compose the API off the async runtime; definition loads block.
/// Typed-source definitions are compiled with esbuild first.
pub async fn compose(ctx: Context) -> Result<ComposedApi> {
    let host: Arc<dyn ScriptHost> = ctx.host();
    let bundler: Arc<dyn Bundler> = ctx.bundler();
    let registry = ExtensionRegistry::new(ctx.settings, host).with_bundler(bundler);
    let api = tokio::task::spawn_blocking(move || registry.compose()).await??;
    Ok(api)
}

fn collect_methods(ns: &Namespace, prefix: &str, api: &ComposedApi, out: &mut Vec<MethodDisplay>) {
    for method in ns.methods() {
        out.push(MethodDisplay {
            path: format!("{}{}", prefix, method),
            policy: ns.policy(),
            element: api.is_element_command(method),
        });
    }
    for child in ns.children() {
        collect_methods(child, &format!("{}{}.", prefix, child.name()), api, out);
    }
}

pub async fn execute(args: ApiArgs, ctx: Context) -> Result<()> {
    let format = ctx.format;
    let api = compose(ctx).await?;

    if let Some(path) = args.call {
        let call_args: Vec<Value> =
            serde_json::from_str(&args.args).context("--args must be a JSON array")?;
        let result = tokio::task::spawn_blocking(move || {
            let value = api.call(&path, call_args);
            (value, api.failures.entries())
        })
        .await?;

        let (value, failures) = result;
        print_value(&value?, format);
        for failure in failures {
            print_info(&format!(
                "{}.{}{} failed: {}",
                failure.namespace,
                if failure.negated { "not." } else { "" },
                failure.method,
                failure.message
            ));
        }
        return Ok(());
    }

    let mut methods = Vec::new();
    collect_methods(&api.root, "", &api, &mut methods);
    print_list(&methods, format);

    if !api.virtuals.is_empty() {
        let count = api.virtuals.len();
        print_info(&format!("{} virtual suite declaration(s)", count));
    }
    Ok(())
}
