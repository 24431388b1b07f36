//! Statistical reduction kernels and plotting helpers.
//!
//! Statistics are never stored in the archive; they are recomputed from the
//! raw forward series on every read, which costs a little CPU and buys the
//! guarantee that a summary can never desynchronize from its data.

use crate::key::Tag;
use crate::{Error, Result};

/// A named reduction over one trial's series.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stat {
    /// Arithmetic mean
    Mean,
    /// Population standard deviation
    Stddev,
    /// Minimum
    Min,
    /// Maximum
    Max,
    /// Most frequent value (smallest wins ties)
    Mode,
    /// Geometric mean
    Geomean,
}

impl Stat {
    /// Map a derived-statistic tag to its reduction.
    #[must_use]
    pub const fn from_tag(tag: Tag) -> Option<Self> {
        Some(match tag {
            Tag::Mean => Self::Mean,
            Tag::Stddev => Self::Stddev,
            Tag::Min => Self::Min,
            Tag::Max => Self::Max,
            Tag::Mode => Self::Mode,
            Tag::Geomean => Self::Geomean,
            _ => return None,
        })
    }

    /// Reduce one series. Empty series reduce to NaN.
    #[must_use]
    pub fn reduce(self, series: &[f64]) -> f64 {
        if series.is_empty() {
            return f64::NAN;
        }
        match self {
            Self::Mean => mean(series),
            Self::Stddev => {
                let m = mean(series);
                let var = series.iter().map(|x| (x - m).powi(2)).sum::<f64>()
                    / series.len() as f64;
                var.sqrt()
            }
            Self::Min => series.iter().copied().fold(f64::INFINITY, f64::min),
            Self::Max => series.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            Self::Mode => mode(series),
            Self::Geomean => {
                let log_mean =
                    series.iter().map(|x| x.ln()).sum::<f64>() / series.len() as f64;
                log_mean.exp()
            }
        }
    }
}

fn mean(series: &[f64]) -> f64 {
    series.iter().sum::<f64>() / series.len() as f64
}

/// Most frequent value; the smallest such value on ties (bit-exact equality,
/// matching the reference statistics library).
fn mode(series: &[f64]) -> f64 {
    let mut sorted = series.to_vec();
    sorted.sort_by(f64::total_cmp);

    let mut best = sorted[0];
    let mut best_count = 0usize;
    let mut i = 0;
    while i < sorted.len() {
        let mut j = i + 1;
        while j < sorted.len() && sorted[j] == sorted[i] {
            j += 1;
        }
        if j - i > best_count {
            best_count = j - i;
            best = sorted[i];
        }
        i = j;
    }
    best
}

/// Sorted unique values of a column (bit-exact equality).
#[must_use]
pub fn unique_sorted(mut values: Vec<f64>) -> Vec<f64> {
    values.sort_by(f64::total_cmp);
    values.dedup();
    values
}

/// Reshape a dependent column into a `|y| x |x|` matrix for contour
/// plotting, with the plotting normalization the visualization stack
/// expects: vertical flip, `orientation` clockwise quarter-turns, vertical
/// flip again (so `orientation = 0` is a plain row-major reshape).
///
/// # Errors
/// Returns [`Error::MatrixShape`] when `|x| * |y| != |z|`.
pub fn reshape_grid(
    xaxis: &[f64],
    yaxis: &[f64],
    zarray: &[f64],
    orientation: usize,
) -> Result<Vec<Vec<f64>>> {
    let cols = xaxis.len();
    let rows = yaxis.len();
    if cols * rows != zarray.len() {
        return Err(Error::MatrixShape {
            rows,
            cols,
            len: zarray.len(),
        });
    }

    let mut matrix: Vec<Vec<f64>> = zarray.chunks(cols.max(1)).map(<[f64]>::to_vec).collect();

    matrix.reverse();
    for _ in 0..orientation % 4 {
        matrix = rotate_clockwise(&matrix);
    }
    matrix.reverse();
    Ok(matrix)
}

/// Clockwise quarter-turn producing a fresh matrix (works for rectangles,
/// unlike an in-place swap).
fn rotate_clockwise(matrix: &[Vec<f64>]) -> Vec<Vec<f64>> {
    let rows = matrix.len();
    let cols = matrix.first().map_or(0, Vec::len);
    (0..cols)
        .map(|i| (0..rows).map(|j| matrix[rows - 1 - j][i]).collect())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_mean_min_max_on_known_series() {
        let series = [3000.0, 2950.0, 2900.0];
        assert!((Stat::Mean.reduce(&series) - 2950.0).abs() < 1e-12);
        assert!((Stat::Min.reduce(&series) - 2900.0).abs() < f64::EPSILON);
        assert!((Stat::Max.reduce(&series) - 3000.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_stddev_population() {
        // np.std([1, 2, 3, 4]) = sqrt(1.25)
        let series = [1.0, 2.0, 3.0, 4.0];
        assert!((Stat::Stddev.reduce(&series) - 1.25f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_mode_prefers_smallest_on_tie() {
        assert!((Stat::Mode.reduce(&[2.0, 1.0, 2.0, 1.0, 3.0]) - 1.0).abs() < f64::EPSILON);
        assert!((Stat::Mode.reduce(&[5.0, 5.0, 3.0]) - 5.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_geomean() {
        let series = [1.0, 10.0, 100.0];
        assert!((Stat::Geomean.reduce(&series) - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_series_is_nan() {
        assert!(Stat::Mean.reduce(&[]).is_nan());
    }

    #[test]
    fn test_from_tag() {
        assert_eq!(Stat::from_tag(Tag::Mean), Some(Stat::Mean));
        assert_eq!(Stat::from_tag(Tag::Forward), None);
    }

    #[test]
    fn test_unique_sorted() {
        assert_eq!(
            unique_sorted(vec![3.0, 1.0, 2.0, 1.0, 3.0]),
            vec![1.0, 2.0, 3.0]
        );
    }

    #[test]
    fn test_reshape_grid_known_example() {
        let x = [1.0, 2.0, 3.0];
        let y = [10.0, 20.0];
        let z = [100.0, 200.0, 300.0, 400.0, 500.0, 600.0];
        let m = reshape_grid(&x, &y, &z, 0).expect("reshape");
        assert_eq!(m, vec![vec![100.0, 200.0, 300.0], vec![400.0, 500.0, 600.0]]);
    }

    #[test]
    fn test_reshape_grid_size_mismatch() {
        let x = [1.0, 2.0, 3.0];
        let y = [10.0, 20.0];
        let z = [1.0, 2.0, 3.0, 4.0, 5.0];
        let err = reshape_grid(&x, &y, &z, 0).unwrap_err();
        assert!(matches!(
            err,
            Error::MatrixShape {
                rows: 2,
                cols: 3,
                len: 5
            }
        ));
    }

    #[test]
    fn test_reshape_grid_orientation_rotates() {
        let x = [1.0, 2.0];
        let y = [10.0, 20.0];
        let z = [1.0, 2.0, 3.0, 4.0];
        // orientation 0: plain reshape
        assert_eq!(
            reshape_grid(&x, &y, &z, 0).expect("reshape"),
            vec![vec![1.0, 2.0], vec![3.0, 4.0]]
        );
        // four quarter-turns come back around
        assert_eq!(
            reshape_grid(&x, &y, &z, 4).expect("reshape"),
            reshape_grid(&x, &y, &z, 0).expect("reshape")
        );
    }

    #[test]
    fn test_rotate_rectangular() {
        let m = vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]];
        assert_eq!(
            rotate_clockwise(&m),
            vec![vec![4.0, 1.0], vec![5.0, 2.0], vec![6.0, 3.0]]
        );
    }

    proptest! {
        /// Property: min <= mean <= max for any non-empty series.
        #[test]
        fn prop_mean_bounded(series in prop::collection::vec(-1e6f64..1e6, 1..200)) {
            let mean = Stat::Mean.reduce(&series);
            let min = Stat::Min.reduce(&series);
            let max = Stat::Max.reduce(&series);
            prop_assert!(min <= mean + 1e-9 && mean <= max + 1e-9);
        }

        /// Property: reshape preserves every element in row-major order when
        /// orientation is 0.
        #[test]
        fn prop_reshape_preserves_elements(cols in 1usize..12, rows in 1usize..12) {
            let x: Vec<f64> = (0..cols).map(|i| i as f64).collect();
            let y: Vec<f64> = (0..rows).map(|i| i as f64).collect();
            let z: Vec<f64> = (0..cols * rows).map(|i| i as f64).collect();
            let m = reshape_grid(&x, &y, &z, 0).expect("reshape");
            let flat: Vec<f64> = m.into_iter().flatten().collect();
            prop_assert_eq!(flat, z);
        }
    }
}
