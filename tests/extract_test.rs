//! Extraction/aggregation against a real built archive: lazy statistics,
//! schema metadata, unique values, and the matrix-reshape helper.

mod common;

use common::Fixture;
use sweep_db::builder::ArchiveBuilder;
use sweep_db::extract::stats::reshape_grid;
use sweep_db::extract::{ArchiveReader, Column};

const BASES: [f64; 3] = [3000.0, 3100.0, 2900.0];

fn built_reader(fixture: &Fixture) -> ArchiveReader {
    let help = fixture.help();
    ArchiveBuilder::new(fixture.config(), &help)
        .workers(2)
        .run()
        .expect("build succeeds");
    ArchiveReader::open(fixture.archive_path()).expect("open reader")
}

#[test]
fn test_derived_statistics_from_forward_series() {
    let fixture = Fixture::new(&BASES);
    let reader = built_reader(&fixture);

    match reader.column("earth:TMan:mean").expect("mean") {
        Column::Scalars(v) => assert_eq!(v, vec![2950.0, 3050.0, 2850.0]),
        other => panic!("unexpected {other:?}"),
    }
    match reader.column("earth:TMan:min").expect("min") {
        Column::Scalars(v) => assert_eq!(v, vec![2900.0, 3000.0, 2800.0]),
        other => panic!("unexpected {other:?}"),
    }
    match reader.column("earth:TMan:max").expect("max") {
        Column::Scalars(v) => assert_eq!(v, vec![3000.0, 3100.0, 2900.0]),
        other => panic!("unexpected {other:?}"),
    }
    match reader.column("earth:TMan:stddev").expect("stddev") {
        Column::Scalars(v) => {
            // population stddev of [base, base-50, base-100]
            let expected = (5000.0f64 / 3.0).sqrt();
            for x in v {
                assert!((x - expected).abs() < 1e-9);
            }
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn test_statistics_never_stored_in_archive() {
    let fixture = Fixture::new(&BASES);
    let reader = built_reader(&fixture);
    assert!(
        !reader
            .dataset_keys()
            .iter()
            .any(|k| k.ends_with(":mean") || k.ends_with(":stddev")),
        "derived statistics must not be materialized in the archive"
    );
}

#[test]
fn test_unknown_aggregation_tag_is_explicit_error() {
    let fixture = Fixture::new(&BASES);
    let reader = built_reader(&fixture);
    let err = reader.column("earth:TMan:rms").unwrap_err();
    assert!(matches!(err, sweep_db::Error::UnknownAggregation(_)));
}

#[test]
fn test_schema_metadata_from_representative_trial() {
    let fixture = Fixture::new(&BASES);
    let reader = built_reader(&fixture);
    match reader.column("earth:OutputOrder").expect("schema") {
        Column::Schema(v) => assert_eq!(v, vec!["Time", "sec", "TMan", "K"]),
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn test_unique_values_across_trials() {
    let fixture = Fixture::new(&[3000.0, 3000.0, 2900.0]);
    let reader = built_reader(&fixture);
    // finals are base - 100 with a duplicate pair
    assert_eq!(
        reader.unique_values("earth:TMan:final").expect("unique"),
        vec![2800.0, 2900.0]
    );
}

#[test]
fn test_matrix_reshape_from_extracted_axes() {
    // 2 x 3 sweep over (dSemi, dTMan): unique axis values plus a dependent
    // column reshape into a plot-ready matrix
    let xaxis = [1.0, 2.0, 3.0];
    let yaxis = [10.0, 20.0];
    let z = [100.0, 200.0, 300.0, 400.0, 500.0, 600.0];

    let matrix = reshape_grid(&xaxis, &yaxis, &z, 0).expect("reshape");
    assert_eq!(
        matrix,
        vec![vec![100.0, 200.0, 300.0], vec![400.0, 500.0, 600.0]]
    );

    let err = reshape_grid(&xaxis, &yaxis, &z[..5], 0).unwrap_err();
    assert!(matches!(err, sweep_db::Error::MatrixShape { len: 5, .. }));
}

#[test]
fn test_units_for_raw_and_derived_keys() {
    let fixture = Fixture::new(&BASES);
    let reader = built_reader(&fixture);
    assert_eq!(reader.units("earth:TMan:forward").expect("units"), "K");
    assert_eq!(reader.units("earth:TMan:geomean").expect("units"), "K");
    assert!(reader.units("earth:Missing:forward").is_err());
}
