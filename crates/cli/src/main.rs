//! Quiver CLI - Main Entry Point
//!
//! Exposes the engine operations: scanning definition folders, discovering
//! exports, bundling files, composing the API and running virtual suites.

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;
mod output;

use commands::{api, compile, exports, scan, virtual_test, Context};
use quiver_common::Settings;

/// Quiver - directory-driven extension loading and virtual test synthesis
#[derive(Parser)]
#[command(name = "quiver")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file
    #[arg(short, long, default_value = "quiver.toml", env = "QUIVER_CONFIG", global = true)]
    config: PathBuf,

    /// Working directory, overriding the configured one
    #[arg(long, global = true)]
    cwd: Option<PathBuf>,

    /// Output format
    #[arg(long, default_value = "table", global = true)]
    format: output::OutputFormat,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the definition files found under a folder or glob
    Scan(scan::ScanArgs),

    /// List the names a source file exports
    Exports(exports::ExportsArgs),

    /// Bundle a source file into one CommonJS script
    Compile(compile::CompileArgs),

    /// Compose the API and list or call its methods
    Api(api::ApiArgs),

    /// Synthesize and run a virtual test suite for a source file
    Virtual(virtual_test::VirtualArgs),

    /// Write a configuration file with default settings
    Init,

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let mut settings = Settings::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    if let Some(cwd) = cli.cwd {
        settings.runtime.cwd = Some(cwd);
    }

    let ctx = Context {
        settings,
        format: cli.format,
    };

    let result = match cli.command {
        Commands::Scan(args) => scan::execute(args, &ctx).await,
        Commands::Exports(args) => exports::execute(args, &ctx).await,
        Commands::Compile(args) => compile::execute(args, &ctx).await,
        Commands::Api(args) => api::execute(args, ctx).await,
        Commands::Virtual(args) => virtual_test::execute(args, ctx).await,
        Commands::Init => {
            if cli.config.exists() {
                anyhow::bail!("{} already exists", cli.config.display());
            }
            Settings::default().save(&cli.config)?;
            output::print_success(&format!("Wrote {}", cli.config.display()));
            Ok(())
        }
        Commands::Version => {
            println!("Quiver CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("Engine: quiver-common v{}", quiver_common::VERSION);
            Ok(())
        }
    };

    if let Err(err) = &result {
        output::print_error(&format!("{:#}", err));
        std::process::exit(1);
    }

    Ok(())
}
