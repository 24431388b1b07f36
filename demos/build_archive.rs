//! Build a sweep archive from a config file.
//!
//! Usage: cargo run --example build_archive -- <sweep.in> <help.txt> [workers]

use anyhow::{bail, Context, Result};
use sweep_db::builder::ArchiveBuilder;
use sweep_db::config::SweepConfig;
use sweep_db::help::HelpDict;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let [config_path, help_path, rest @ ..] = args.as_slice() else {
        bail!("usage: build_archive <sweep.in> <help.txt> [workers]");
    };
    let workers: usize = rest.first().map_or(Ok(0), |w| w.parse())?;

    let config = SweepConfig::from_file(config_path).context("reading sweep config")?;
    let help = HelpDict::from_file(help_path).context("reading help text")?;

    let summary = ArchiveBuilder::new(config.clone(), &help)
        .workers(workers)
        .run()
        .context("archive build failed")?;

    if summary.already_complete {
        println!("archive {} is already complete", config.archive_file.display());
    } else {
        println!(
            "archived {}/{} trials into {} (digest {})",
            summary.written,
            summary.total,
            config.archive_file.display(),
            summary.digest.as_deref().unwrap_or("-"),
        );
    }
    Ok(())
}
