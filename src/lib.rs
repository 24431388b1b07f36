//! # sweep-db: parameter-sweep archive builder and extractor
//!
//! A parameter sweep leaves behind hundreds of trial directories, each full
//! of simulator text output. sweep-db consolidates them into one queryable,
//! checksummed archive and answers statistical questions about it:
//!
//! 1. **Build**: a fixed pool of workers drains a persisted checkpoint
//!    queue; each worker parses one trial (log, option files, series and
//!    grid tables) into a flat key → value dictionary and appends it to the
//!    shared archive as a write-once group. A killed run resumes exactly
//!    where it stopped.
//! 2. **Extract**: composite keys (`earth:TMan:forward`) address raw data;
//!    derived statistics (`earth:TMan:mean`) are recomputed from the raw
//!    series on every read, so summaries can never go stale.
//! 3. **Filter**: project chosen keys into a flat container or a delimited
//!    text file, from the archive when it exists or straight from the raw
//!    trial directories when it does not.
//!
//! ## Example
//!
//! ```no_run
//! use sweep_db::builder::ArchiveBuilder;
//! use sweep_db::config::SweepConfig;
//! use sweep_db::extract::ArchiveReader;
//! use sweep_db::help::HelpDict;
//!
//! # fn main() -> sweep_db::Result<()> {
//! let config = SweepConfig::from_file("sweep.in")?;
//! let help = HelpDict::from_file("simulator_help.txt")?;
//!
//! let summary = ArchiveBuilder::new(config.clone(), &help).workers(8).run()?;
//! println!("archived {} trials", summary.total);
//!
//! let reader = ArchiveReader::open(&config.archive_file)?;
//! let means = reader.column("earth:TMan:mean")?;
//! # let _ = means;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod archive;
pub mod builder;
pub mod checkpoint;
pub mod config;
pub mod error;
pub mod extract;
pub mod filter;
pub mod help;
pub mod integrity;
pub mod key;
pub mod parse;
pub mod sweep;

pub use error::{Error, Result};
