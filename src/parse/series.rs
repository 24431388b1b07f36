//! Series and grid table parsers.
//!
//! Forward/backward/climate files are whitespace-delimited numeric tables
//! with no header; column *i* is labeled by the *i*-th (name, unit) pair of
//! the body's matching schema. Seasonal climate files live under a fixed
//! subdirectory and carry no schema at all; their units come from a static
//! name → unit table.

use std::fs;
use std::path::Path;

use tracing::warn;

use crate::key::value_key;
use crate::key::Tag;
use crate::parse::TrialData;
use crate::{Error, Result};

/// Seasonal climate file stems, in processing order.
pub const SEASONAL_FILES: [&str; 8] = [
    "DailyInsol",
    "PlanckB",
    "SeasonalDivF",
    "SeasonalFIn",
    "SeasonalFMerid",
    "SeasonalFOut",
    "SeasonalIceBalance",
    "SeasonalTemp",
];

/// Static units for seasonal climate files.
#[must_use]
pub fn seasonal_units(name: &str) -> &'static str {
    match name {
        "DailyInsol" | "SeasonalFIn" | "SeasonalFOut" | "SeasonalDivF" => "W/m^2",
        "PlanckB" => "W/m^2/K",
        "SeasonalIceBalance" => "kg/m^2/s",
        "SeasonalTemp" => "deg C",
        "SeasonalFMerid" => "W",
        _ => "",
    }
}

/// Parse a series table, labeling each column from the schema and storing it
/// under `body:<name>:<tag>`.
///
/// # Errors
/// Returns [`Error::Parse`] for unreadable files, non-numeric cells, ragged
/// rows, or more columns than the schema declares.
pub fn parse_table_into(
    path: &Path,
    body: &str,
    schema: &[(String, String)],
    tag: Tag,
    data: &mut TrialData,
) -> Result<()> {
    let columns = read_columns(path)?;
    if columns.len() > schema.len() {
        return Err(Error::Parse {
            path: path.to_path_buf(),
            reason: format!(
                "table has {} columns but the schema declares {}",
                columns.len(),
                schema.len()
            ),
        });
    }

    for (column, (name, unit)) in columns.into_iter().zip(schema) {
        let unit = if unit.is_empty() { "nd" } else { unit.as_str() };
        data.set_series(&value_key(body, name, tag), unit, column);
    }
    Ok(())
}

/// Parse the eight seasonal grid files for a body, storing each transposed
/// table under the bare key `body:<name>`. Absent files are skipped; not
/// every climate run produces every grid.
///
/// # Errors
/// Returns [`Error::Parse`] if a present file is malformed.
pub fn parse_seasonal_into(
    trial: &Path,
    system_name: &str,
    body: &str,
    data: &mut TrialData,
) -> Result<()> {
    for name in SEASONAL_FILES {
        let path = trial
            .join("SeasonalClimateFiles")
            .join(format!("{system_name}.{body}.{name}.0"));
        if !path.is_file() {
            warn!(body, file = %path.display(), "seasonal file absent; skipping");
            continue;
        }
        let columns = read_columns(&path)?;
        data.set_grid(&format!("{body}:{name}"), seasonal_units(name), columns);
    }
    Ok(())
}

/// Read a whitespace-delimited numeric table, transposed into columns.
fn read_columns(path: &Path) -> Result<Vec<Vec<f64>>> {
    let text = fs::read_to_string(path).map_err(|e| Error::Parse {
        path: path.to_path_buf(),
        reason: format!("cannot read table: {e}"),
    })?;

    let mut columns: Vec<Vec<f64>> = Vec::new();
    let mut width = 0usize;

    for (lineno, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        let cells: Vec<f64> = line
            .split_whitespace()
            .map(|tok| {
                tok.parse::<f64>().map_err(|_| Error::Parse {
                    path: path.to_path_buf(),
                    reason: format!("non-numeric cell '{tok}' on line {}", lineno + 1),
                })
            })
            .collect::<Result<_>>()?;

        if columns.is_empty() {
            width = cells.len();
            columns = vec![Vec::new(); width];
        } else if cells.len() != width {
            return Err(Error::Parse {
                path: path.to_path_buf(),
                reason: format!(
                    "ragged table: line {} has {} cells, expected {width}",
                    lineno + 1,
                    cells.len()
                ),
            });
        }
        for (column, cell) in columns.iter_mut().zip(cells) {
            column.push(cell);
        }
    }
    Ok(columns)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::RawValue;
    use std::io::Write;

    fn write_file(path: &Path, content: &str) {
        let mut f = fs::File::create(path).expect("create");
        f.write_all(content.as_bytes()).expect("write");
    }

    fn schema() -> Vec<(String, String)> {
        vec![
            ("Time".to_string(), "sec".to_string()),
            ("TMan".to_string(), "K".to_string()),
        ]
    }

    #[test]
    fn test_table_columns_labeled_from_schema() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("solar.earth.forward");
        write_file(&path, "0.0 3000.0\n1.0 2950.0\n2.0 2900.0\n");

        let mut data = TrialData::new();
        parse_table_into(&path, "earth", &schema(), Tag::Forward, &mut data).expect("parse");

        match data.get("earth:TMan:forward") {
            Some(RawValue::Series { units, values }) => {
                assert_eq!(units, "K");
                assert_eq!(values, &vec![3000.0, 2950.0, 2900.0]);
            }
            other => panic!("unexpected {other:?}"),
        }
        match data.get("earth:Time:forward") {
            Some(RawValue::Series { values, .. }) => {
                assert_eq!(values, &vec![0.0, 1.0, 2.0]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_ragged_table_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("bad.forward");
        write_file(&path, "0.0 3000.0\n1.0\n");
        let mut data = TrialData::new();
        let err =
            parse_table_into(&path, "earth", &schema(), Tag::Forward, &mut data).unwrap_err();
        assert!(err.to_string().contains("ragged"));
    }

    #[test]
    fn test_non_numeric_cell_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("bad.forward");
        write_file(&path, "0.0 hello\n");
        let mut data = TrialData::new();
        let err =
            parse_table_into(&path, "earth", &schema(), Tag::Forward, &mut data).unwrap_err();
        assert!(err.to_string().contains("non-numeric"));
    }

    #[test]
    fn test_wider_than_schema_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("bad.forward");
        write_file(&path, "0.0 1.0 2.0\n");
        let mut data = TrialData::new();
        let err =
            parse_table_into(&path, "earth", &schema(), Tag::Forward, &mut data).unwrap_err();
        assert!(err.to_string().contains("schema declares"));
    }

    #[test]
    fn test_seasonal_grid_transposed() {
        let dir = tempfile::tempdir().expect("tempdir");
        let season_dir = dir.path().join("SeasonalClimateFiles");
        fs::create_dir(&season_dir).expect("mkdir");
        write_file(
            &season_dir.join("solar.earth.SeasonalTemp.0"),
            "1.0 2.0\n3.0 4.0\n5.0 6.0\n",
        );

        let mut data = TrialData::new();
        parse_seasonal_into(dir.path(), "solar", "earth", &mut data).expect("parse");

        match data.get("earth:SeasonalTemp") {
            Some(RawValue::Grid { units, rows }) => {
                assert_eq!(units, "deg C");
                // transposed: each row is one file column
                assert_eq!(rows, &vec![vec![1.0, 3.0, 5.0], vec![2.0, 4.0, 6.0]]);
            }
            other => panic!("unexpected {other:?}"),
        }
        // absent files skipped quietly
        assert!(data.get("earth:DailyInsol").is_none());
    }

    #[test]
    fn test_seasonal_units_table() {
        assert_eq!(seasonal_units("DailyInsol"), "W/m^2");
        assert_eq!(seasonal_units("PlanckB"), "W/m^2/K");
        assert_eq!(seasonal_units("SeasonalIceBalance"), "kg/m^2/s");
        assert_eq!(seasonal_units("NotAThing"), "");
    }
}
