//! Crash recovery: a restart demotes in-progress trials, rolls back their
//! partial groups, and finishes the sweep with no duplicates; a forced
//! rebuild starts from scratch.

mod common;

use std::fs;

use common::Fixture;
use sweep_db::archive::Archive;
use sweep_db::builder::ArchiveBuilder;
use sweep_db::checkpoint::Checkpoint;

const BASES: [f64; 3] = [3000.0, 3100.0, 2900.0];

/// Rewrite one record's status in the checkpoint file, simulating the state
/// a killed worker leaves behind.
fn mark_in_progress(fixture: &Fixture, trial: &str) {
    let path = fixture.checkpoint_path();
    let text = fs::read_to_string(&path).expect("read checkpoint");
    let mut found = false;
    let rewritten: Vec<String> = text
        .lines()
        .map(|line| {
            if line.contains(trial) && line.ends_with(" 1") {
                found = true;
                format!("{} 0", line.trim_end_matches(" 1"))
            } else {
                line.to_string()
            }
        })
        .collect();
    assert!(found, "trial {trial} not found at status 1");
    fs::write(&path, rewritten.join("\n") + "\n").expect("write checkpoint");
}

#[test]
fn test_recover_demotes_and_rolls_back_partial_group() {
    let fixture = Fixture::new(&BASES);
    let help = fixture.help();
    ArchiveBuilder::new(fixture.config(), &help)
        .run()
        .expect("first build");

    // simulate a crash: trial_01 claimed but never completed
    mark_in_progress(&fixture, "trial_01");

    let summary = ArchiveBuilder::new(fixture.config(), &help)
        .run()
        .expect("recovery run");
    assert_eq!(summary.recovered, 1);
    assert_eq!(summary.written, 1, "exactly the rolled-back trial is redone");
    assert!(!summary.already_complete);

    // N done records, N groups, no duplicates
    let checkpoint = Checkpoint::load(&fixture.checkpoint_path()).expect("load");
    assert_eq!(checkpoint.counts(), (0, 0, 3));
    let archive = Archive::open(&fixture.archive_path()).expect("open");
    assert_eq!(
        archive.group_names(),
        vec!["trial_00", "trial_01", "trial_02"]
    );
}

#[test]
fn test_recover_truncates_partial_trailing_block() {
    let fixture = Fixture::new(&BASES);
    let help = fixture.help();
    // single worker: groups land in claim order, so the last block on disk
    // belongs to trial_02
    ArchiveBuilder::new(fixture.config(), &help)
        .workers(1)
        .run()
        .expect("first build");

    // simulate a crash mid-write of the final group
    mark_in_progress(&fixture, "trial_02");
    let archive_path = fixture.archive_path();
    let len = fs::metadata(&archive_path).expect("meta").len();
    let file = fs::OpenOptions::new()
        .write(true)
        .open(&archive_path)
        .expect("open");
    file.set_len(len - 37).expect("truncate");

    let summary = ArchiveBuilder::new(fixture.config(), &help)
        .workers(1)
        .run()
        .expect("recovery run");
    assert_eq!(summary.recovered, 1);
    assert_eq!(summary.written, 1);

    let archive = Archive::open(&archive_path).expect("open");
    assert_eq!(archive.group_names().len(), 3);
    let checkpoint = Checkpoint::load(&fixture.checkpoint_path()).expect("load");
    assert!(checkpoint.all_done());
}

#[test]
fn test_force_rebuild_resets_everything() {
    let fixture = Fixture::new(&BASES);
    let help = fixture.help();
    ArchiveBuilder::new(fixture.config(), &help)
        .run()
        .expect("first build");
    let first_digest = fs::read_to_string(
        sweep_db::integrity::sidecar_path(&fixture.archive_path()),
    )
    .expect("sidecar");

    let summary = ArchiveBuilder::new(fixture.config(), &help)
        .force(true)
        .run()
        .expect("forced rebuild");
    assert!(!summary.already_complete);
    assert_eq!(summary.written, 3, "every trial rebuilt from scratch");

    let archive = Archive::open(&fixture.archive_path()).expect("open");
    assert_eq!(archive.group_names().len(), 3);

    // sidecar restamped and still valid
    let second_digest = fs::read_to_string(
        sweep_db::integrity::sidecar_path(&fixture.archive_path()),
    )
    .expect("sidecar");
    assert!(!second_digest.trim().is_empty());
    let _ = first_digest;
    sweep_db::integrity::verify_sidecar(
        &fixture.archive_path(),
        sweep_db::integrity::VerifyMode::Strict,
    )
    .expect("sidecar verifies after rebuild");
}

#[test]
fn test_corrupt_checkpoint_aborts_before_workers() {
    let fixture = Fixture::new(&BASES);
    let help = fixture.help();
    ArchiveBuilder::new(fixture.config(), &help)
        .run()
        .expect("first build");

    fs::write(fixture.checkpoint_path(), "not a checkpoint at all\n").expect("clobber");

    let err = ArchiveBuilder::new(fixture.config(), &help)
        .run()
        .unwrap_err();
    assert!(matches!(err, sweep_db::Error::Checkpoint(_)));
}

#[test]
fn test_interrupted_fresh_build_resumes() {
    let fixture = Fixture::new(&BASES);
    let help = fixture.help();

    // build only the checkpoint + the first group by hand, as if the run
    // died after one trial
    let config = fixture.config();
    let trials =
        sweep_db::sweep::discover_trials(&config.dest_folder, None).expect("discover");
    let mut checkpoint = Checkpoint::initialize(
        &config.checkpoint_path(),
        &config.source,
        &trials,
    )
    .expect("init");
    let claimed = checkpoint.claim_next().expect("claim").expect("a trial");
    assert!(claimed.ends_with("trial_00"));
    // claimed but never completed: stays in progress on disk

    let summary = ArchiveBuilder::new(config, &help).run().expect("resume");
    assert_eq!(summary.recovered, 1);
    assert_eq!(summary.written, 3);

    let checkpoint = Checkpoint::load(&fixture.checkpoint_path()).expect("load");
    assert_eq!(checkpoint.counts(), (0, 0, 3));
}
