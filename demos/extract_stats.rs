//! Extract columns from a built archive.
//!
//! Usage: cargo run --example extract_stats -- <archive.bpa> <key> [key ...]

use anyhow::{bail, Context, Result};
use sweep_db::extract::{ArchiveReader, Column};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let [archive, keys @ ..] = args.as_slice() else {
        bail!("usage: extract_stats <archive.bpa> <key> [key ...]");
    };
    if keys.is_empty() {
        bail!("no keys requested");
    }

    let reader = ArchiveReader::open(archive).context("opening archive")?;
    println!("{} trials: {:?}", reader.groups().len(), reader.groups());

    for key in keys {
        let units = reader.units(key).unwrap_or_default();
        match reader.column(key).with_context(|| format!("extracting {key}"))? {
            Column::Scalars(v) => println!("{key} [{units}]: {v:?}"),
            Column::Text(v) => println!("{key}: {v:?}"),
            Column::Series(s) => {
                println!("{key} [{units}]: {} series", s.len());
                for (i, series) in s.iter().enumerate() {
                    println!("  trial {i}: {} points", series.len());
                }
            }
            Column::Grids(g) => println!("{key} [{units}]: {} grids", g.len()),
            Column::Schema(v) => println!("{key}: schema {v:?}"),
        }
    }
    Ok(())
}
