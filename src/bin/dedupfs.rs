//! dedupfs CLI Binary

use anyhow::Context;
use clap::Parser;
use dedupfs::logging::init_logging;
use dedupfs::tooling::cli::{Cli, CliContext, Commands};
use std::io::Write;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let context = CliContext::new(
        cli.root.clone(),
        cli.user.clone(),
        cli.config.clone(),
        cli.init,
    )
    .context("failed to load configuration")?;

    let logging = cli.logging_config(&context.config().logging);
    init_logging(Some(&logging)).context("failed to initialize logging")?;

    // File contents go to stdout byte for byte.
    if let Commands::Cat { path } = &cli.command {
        let stdout = std::io::stdout();
        let mut out = stdout.lock();
        context.cat_to(path, &mut out)?;
        out.flush().context("failed to flush stdout")?;
        return Ok(());
    }

    let output = context.execute(&cli.command)?;
    if !output.is_empty() {
        println!("{}", output);
    }
    Ok(())
}
