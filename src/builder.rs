//! Archive build orchestration: checkpoint-coordinated worker pool.
//!
//! A fixed pool of W workers drains the checkpoint queue. Workers never talk
//! to each other; coordination happens entirely through the shared queue
//! and archive, both guarded by one mutex. Only two steps hold the lock:
//!
//! 1. `claim_next`: flip the first pending trial to in-progress.
//! 2. existence-check + `write_group` + `complete`: one unit, so no two
//!    workers can double-write a group or race a partial one.
//!
//! Trial parsing runs unlocked and fully parallel. There is no cancellation
//! and no timeout: a killed worker simply stops claiming, and its in-progress
//! trial is demoted (and its partial group deleted) by the next run's
//! recovery pass. A first parser error stops the pool and fails the build;
//! re-running resumes from the checkpoint.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::Mutex;
use rayon::ThreadPoolBuilder;
use tracing::{debug, info, warn};

use crate::archive::{Archive, Compression, Dataset, GroupData, Shape};
use crate::checkpoint::Checkpoint;
use crate::config::SweepConfig;
use crate::help::HelpDict;
use crate::integrity;
use crate::parse::{gather_trial, KeyFilter, SweepContext};
use crate::sweep::{discover_trials, trial_group_name};
use crate::{Error, Result};

/// Outcome of a completed (or skipped) build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildSummary {
    /// Trials in the sweep
    pub total: usize,
    /// Groups newly written by this run
    pub written: usize,
    /// In-progress records demoted (and partial groups deleted) on startup
    pub recovered: usize,
    /// True when every trial was already done and `force` was off (no-op run)
    pub already_complete: bool,
    /// Sidecar digest stamped after a successful build
    pub digest: Option<String>,
}

/// Checkpoint-coordinated multi-worker archive builder.
///
/// ```no_run
/// use sweep_db::builder::ArchiveBuilder;
/// use sweep_db::config::SweepConfig;
/// use sweep_db::help::HelpDict;
///
/// # fn main() -> sweep_db::Result<()> {
/// let config = SweepConfig::from_file("sweep.in")?;
/// let help = HelpDict::from_file("simulator_help.txt")?;
/// let summary = ArchiveBuilder::new(config, &help).workers(4).run()?;
/// println!("wrote {} of {} trials", summary.written, summary.total);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ArchiveBuilder<'h> {
    config: SweepConfig,
    help: &'h HelpDict,
    workers: usize,
    force: bool,
    compression: Compression,
}

struct Shared {
    checkpoint: Checkpoint,
    archive: Archive,
}

impl<'h> ArchiveBuilder<'h> {
    /// New builder with the default worker count (one per core) and LZ4
    /// payload compression.
    #[must_use]
    pub const fn new(config: SweepConfig, help: &'h HelpDict) -> Self {
        Self {
            config,
            help,
            workers: 0,
            force: false,
            compression: Compression::Lz4,
        }
    }

    /// Fixed worker count; `0` means one per core.
    #[must_use]
    pub const fn workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Force a rebuild: delete archive, sidecar and checkpoint first.
    #[must_use]
    pub const fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Payload compression for newly created containers.
    #[must_use]
    pub const fn compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    /// Run the build to completion.
    ///
    /// # Errors
    /// Fails fast on config/checkpoint problems; any worker's parse or write
    /// error stops the pool and is returned. A re-run resumes from the
    /// checkpoint.
    pub fn run(&self) -> Result<BuildSummary> {
        let trials = discover_trials(&self.config.dest_folder, None)?;
        let ctx = SweepContext::resolve(&self.config, self.help, &trials[0])?;

        let (checkpoint, archive, recovered, already_complete) = self.prepare(&trials)?;
        let total = checkpoint.records().len();
        if already_complete {
            info!("all trials already archived; nothing to do");
            return Ok(BuildSummary {
                total,
                written: 0,
                recovered,
                already_complete: true,
                digest: None,
            });
        }

        let shared = Mutex::new(Shared {
            checkpoint,
            archive,
        });
        let stop = AtomicBool::new(false);
        let written = AtomicUsize::new(0);
        let failure: Mutex<Option<Error>> = Mutex::new(None);

        // archive builds store every key; only an exclude list thins them
        let filter = if self.config.exclude.is_empty() {
            KeyFilter::all()
        } else {
            KeyFilter::exclude(self.config.exclude.iter().cloned())
        };

        let pool = ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .thread_name(|i| format!("sweep-worker-{i}"))
            .build()
            .map_err(|e| Error::Other(format!("cannot build worker pool: {e}")))?;
        let worker_count = pool.current_num_threads();
        info!(workers = worker_count, trials = total, "starting archive build");

        pool.scope(|scope| {
            for _ in 0..worker_count {
                scope.spawn(|_| {
                    worker_loop(&shared, &ctx, self.help, &filter, &stop, &written, &failure);
                });
            }
        });

        if let Some(err) = failure.into_inner() {
            return Err(err);
        }

        let shared = shared.into_inner();
        drop(shared.archive);
        let digest = integrity::write_sidecar(&self.config.archive_file)?;
        info!(
            written = written.load(Ordering::Relaxed),
            digest = %digest,
            "archive build complete"
        );

        Ok(BuildSummary {
            total,
            written: written.load(Ordering::Relaxed),
            recovered,
            already_complete: false,
            digest: Some(digest),
        })
    }

    /// Create or recover the queue + archive pair.
    ///
    /// Restart semantics: in-progress records are demoted to pending and
    /// their (possibly partial) archive groups deleted; a fully-done
    /// checkpoint is a no-op unless `force`, which wipes archive, sidecar
    /// and checkpoint and starts from scratch.
    fn prepare(&self, trials: &[PathBuf]) -> Result<(Checkpoint, Archive, usize, bool)> {
        let cp_path = self.config.checkpoint_path();
        let archive_path = &self.config.archive_file;

        if !cp_path.is_file() {
            let checkpoint = Checkpoint::initialize(&cp_path, &self.config.source, trials)?;
            let archive = Archive::open_or_create(archive_path, Shape::Grouped, self.compression)?;
            return Ok((checkpoint, archive, 0, false));
        }

        let mut checkpoint = Checkpoint::load(&cp_path)?;
        let mut archive = if archive_path.is_file() {
            Archive::open_repair(archive_path)?
        } else {
            warn!(
                archive = %archive_path.display(),
                "checkpoint present but archive missing; starting an empty container"
            );
            Archive::create(archive_path, Shape::Grouped, self.compression)?
        };

        let demoted = checkpoint.demote_in_progress()?;
        for trial in &demoted {
            let group = trial_group_name(trial);
            if archive.delete_group(&group)? {
                info!(group = %group, "rolled back partial group from crashed worker");
            }
        }

        if checkpoint.all_done() {
            if !self.force {
                return Ok((checkpoint, archive, demoted.len(), true));
            }
            info!("force rebuild: deleting archive and checkpoint");
            drop(archive);
            std::fs::remove_file(archive_path)?;
            let sidecar = integrity::sidecar_path(archive_path);
            if sidecar.is_file() {
                std::fs::remove_file(sidecar)?;
            }
            checkpoint.remove()?;
            let checkpoint = Checkpoint::initialize(&cp_path, &self.config.source, trials)?;
            let archive = Archive::create(archive_path, Shape::Grouped, self.compression)?;
            return Ok((checkpoint, archive, 0, false));
        }

        info!(demoted = demoted.len(), "continuing from checkpoint");
        Ok((checkpoint, archive, demoted.len(), false))
    }
}

fn worker_loop(
    shared: &Mutex<Shared>,
    ctx: &SweepContext<'_>,
    help: &HelpDict,
    filter: &KeyFilter,
    stop: &AtomicBool,
    written: &AtomicUsize,
    failure: &Mutex<Option<Error>>,
) {
    loop {
        if stop.load(Ordering::Relaxed) {
            return;
        }

        // claim step: lock-held, O(n) scan, mutually exclusive
        let claimed = {
            let mut guard = shared.lock();
            guard.checkpoint.claim_next()
        };
        let trial = match claimed {
            Ok(Some(trial)) => trial,
            Ok(None) => return,
            Err(e) => {
                fail(stop, failure, e);
                return;
            }
        };
        let group = trial_group_name(&trial);

        // parse step: unlocked, fully parallel
        let data = match gather_trial(&trial, ctx, filter.clone()) {
            Ok(data) => data,
            Err(e) => {
                fail(stop, failure, e);
                return;
            }
        };
        let datasets: GroupData = data
            .into_entries()
            .into_iter()
            .map(|(key, raw)| {
                let ds = Dataset::from_raw(&key, raw, help);
                (key, ds)
            })
            .collect();

        // write step: existence-check + write + complete as one lock-held unit
        let mut guard = shared.lock();
        if guard.archive.has_group(&group) {
            debug!(group = %group, "group already present; marking done");
        } else {
            info!(group = %group, "creating group");
            if let Err(e) = guard.archive.write_group(&group, &datasets) {
                fail(stop, failure, e);
                return;
            }
            written.fetch_add(1, Ordering::Relaxed);
        }
        if let Err(e) = guard.checkpoint.complete(&trial) {
            fail(stop, failure, e);
            return;
        }
    }
}

fn fail(stop: &AtomicBool, failure: &Mutex<Option<Error>>, err: Error) {
    warn!(error = %err, "worker stopping on error");
    stop.store(true, Ordering::Relaxed);
    let mut slot = failure.lock();
    if slot.is_none() {
        *slot = Some(err);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_options_chain() {
        let config = SweepConfig::from_str_at(
            "sDestFolder d\nsPrimaryFile vpl.in\n",
            std::path::Path::new("/work/sweep.in"),
        )
        .expect("config");
        let help = HelpDict::parse("");
        let builder = ArchiveBuilder::new(config, &help)
            .workers(2)
            .force(true)
            .compression(Compression::Zstd);
        assert_eq!(builder.workers, 2);
        assert!(builder.force);
        assert_eq!(builder.compression, Compression::Zstd);
    }
}
