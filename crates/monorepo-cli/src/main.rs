//! `monorepo` - the hermetic monorepository build tool.
//!
//! Discovers the current codebase by directory position under the nearest
//! `monorepository` ancestor, builds it (recursively building its declared
//! dependencies and restoring from cache where possible), and optionally
//! archives and uploads the resulting prefix.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use monorepo_core::stager::LocalStager;
use monorepo_core::uploader::LocalDirectoryUploader;
use monorepo_core::BuildContext;
use tracing::error;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Hermetic monorepository build tool", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: CommandArgs,
}

#[derive(Subcommand, Debug)]
enum CommandArgs {
    /// Build the current codebase and its declared dependencies.
    Build(SharedArgs),
    /// Build the current codebase, then archive and upload its prefix.
    Upload {
        #[command(flatten)]
        shared: SharedArgs,

        /// Override the default archive name (without the `.tar.xz` suffix).
        #[arg(long)]
        archive_name: Option<String>,
    },
}

#[derive(Parser, Debug)]
struct SharedArgs {
    /// Install prefix. Defaults to `<monorepository_root>/prefix`.
    #[arg(long)]
    prefix: Option<PathBuf>,

    /// Root for manifests, the CAS, and build logs. Defaults to
    /// `<monorepository_root>/metadata_prefix`.
    #[arg(long)]
    metadata_prefix: Option<PathBuf>,

    /// Raise the default log level to debug for this invocation. `RUST_LOG`,
    /// when set, still takes precedence.
    #[arg(long)]
    debug: bool,
}

fn init_tracing(debug: bool) {
    let default_directive = if debug { "debug" } else { "info" };
    let filter = EnvFilter::builder()
        .with_default_directive(default_directive.parse().expect("valid directive"))
        .from_env_lossy();
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn main() -> ExitCode {
    let args = Args::parse();

    let debug = match &args.command {
        CommandArgs::Build(shared) => shared.debug,
        CommandArgs::Upload { shared, .. } => shared.debug,
    };
    init_tracing(debug);

    let result = match args.command {
        CommandArgs::Build(shared) => run_build(&shared),
        CommandArgs::Upload {
            shared,
            archive_name,
        } => run_upload(&shared, archive_name),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

fn build_context(shared: &SharedArgs) -> anyhow::Result<BuildContext> {
    let ctx = BuildContext::discover(shared.prefix.clone(), shared.metadata_prefix.clone())?;

    if shared.prefix.is_none() && ctx.prefix.exists() {
        std::fs::remove_dir_all(&ctx.prefix)?;
    }
    std::fs::create_dir_all(&ctx.prefix)?;

    Ok(ctx)
}

fn run_build(shared: &SharedArgs) -> anyhow::Result<()> {
    let ctx = build_context(shared)?;
    let stager = LocalStager::new(ctx.monorepository_root.join("input_sources"));
    monorepo_core::build(&ctx, &ctx.current_codebase.clone(), &stager)?;
    Ok(())
}

fn run_upload(shared: &SharedArgs, archive_name: Option<String>) -> anyhow::Result<()> {
    let ctx = build_context(shared)?;
    let stager = LocalStager::new(ctx.monorepository_root.join("input_sources"));
    let uploader = LocalDirectoryUploader::new(
        std::env::var_os("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("monorepo_artifacts"),
    );

    let archive_path = monorepo_core::upload::upload(
        &ctx,
        &ctx.current_codebase.clone(),
        &stager,
        &uploader,
        archive_name,
        chrono::Local::now(),
    )?;
    tracing::info!(archive = %archive_path.display(), "upload complete");
    Ok(())
}
