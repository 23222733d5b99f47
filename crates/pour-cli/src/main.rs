//! pour - CLI entry point
#![allow(missing_docs)]

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use pour_cli::cmd::{self, Context};
use pour_cli::{Cli, Commands};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins over the flags when set.
    let default_level = if cli.verbose {
        "pour_core=debug,pour_cli=debug"
    } else if cli.quiet {
        "error"
    } else {
        "warn"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let ctx = Context::load(cli.home.clone(), cli.quiet)?;

    match cli.command {
        Commands::Install {
            recipe,
            skip_test,
            dry_run,
        } => cmd::install::install(&ctx, recipe.as_deref(), skip_test, dry_run).await,
        Commands::Uninstall { name } => cmd::uninstall::uninstall(&ctx, &name),
        Commands::Test { recipe } => cmd::test::test(&ctx, recipe.as_deref()),
        Commands::Adapt { libexec, recipe } => {
            cmd::adapt::adapt(&ctx, &libexec, recipe.as_deref())
        }
        Commands::List => cmd::list::list(&ctx),
        Commands::Host => cmd::host::host(&ctx),
    }
}
