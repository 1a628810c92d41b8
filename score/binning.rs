//! # Bin Assignment
//!
//! Discretizes a continuous value into the index of the half-open interval
//! `[b_i, b_{i+1})` that contains it. Boundaries are fixed at construction and
//! never mutated afterwards.
//!
//! The last boundary is exclusive. A value equal to `b_k` falls outside every
//! interval and is reported as unassigned, exactly like a value below `b_0` or
//! above `b_k`. Callers decide what an unassigned value means for their row.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Fixed age thresholds, taken from sextile edges of the training set.
pub const AGE_BOUNDARIES: [f64; 7] = [0.0, 18.0, 24.0, 29.0, 35.0, 42.0, 80.10];

/// Fixed fare thresholds, taken from sextile edges of the training set.
pub const FARE_BOUNDARIES: [f64; 7] = [
    0.0,
    7.775,
    8.6625,
    14.4542,
    26.0,
    52.36946667,
    512.3293,
];

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BinTableError {
    #[error("A bin table needs at least two boundaries, but {0} were given.")]
    TooFewBoundaries(usize),
    #[error("Bin boundary {index} is not a finite number ({value}).")]
    NonFinite { index: usize, value: f64 },
    #[error(
        "Bin boundaries must be strictly increasing, but boundary {index} ({value}) does not exceed its predecessor ({previous})."
    )]
    NotIncreasing {
        index: usize,
        previous: f64,
        value: f64,
    },
}

/// An ordered, strictly increasing sequence of bin boundaries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f64>", into = "Vec<f64>")]
pub struct BinTable {
    boundaries: Vec<f64>,
}

impl BinTable {
    pub fn new(boundaries: Vec<f64>) -> Result<Self, BinTableError> {
        if boundaries.len() < 2 {
            return Err(BinTableError::TooFewBoundaries(boundaries.len()));
        }
        for (index, &value) in boundaries.iter().enumerate() {
            if !value.is_finite() {
                return Err(BinTableError::NonFinite { index, value });
            }
        }
        for (index, pair) in boundaries.windows(2).enumerate() {
            if pair[1] <= pair[0] {
                return Err(BinTableError::NotIncreasing {
                    index: index + 1,
                    previous: pair[0],
                    value: pair[1],
                });
            }
        }
        Ok(Self { boundaries })
    }

    pub fn age() -> Self {
        Self {
            boundaries: AGE_BOUNDARIES.to_vec(),
        }
    }

    pub fn fare() -> Self {
        Self {
            boundaries: FARE_BOUNDARIES.to_vec(),
        }
    }

    pub fn boundaries(&self) -> &[f64] {
        &self.boundaries
    }

    /// Number of intervals, one fewer than the number of boundaries.
    pub fn num_bins(&self) -> usize {
        self.boundaries.len() - 1
    }

    /// Returns the index `i` with `b_i <= value < b_{i+1}`, or `None` when no
    /// interval contains the value (including NaN).
    pub fn assign(&self, value: f64) -> Option<usize> {
        // partition_point gives the count of boundaries <= value; the containing
        // interval starts one before that.
        let upper = self.boundaries.partition_point(|&b| b <= value);
        if upper == 0 || upper == self.boundaries.len() {
            return None;
        }
        Some(upper - 1)
    }
}

impl TryFrom<Vec<f64>> for BinTable {
    type Error = BinTableError;

    fn try_from(boundaries: Vec<f64>) -> Result<Self, Self::Error> {
        Self::new(boundaries)
    }
}

impl From<BinTable> for Vec<f64> {
    fn from(table: BinTable) -> Self {
        table.boundaries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn assigns_interior_values_to_containing_interval() {
        let table = BinTable::age();
        assert_eq!(table.assign(0.0), Some(0));
        assert_eq!(table.assign(17.99), Some(0));
        assert_eq!(table.assign(18.0), Some(1));
        assert_eq!(table.assign(28.5), Some(2));
        assert_eq!(table.assign(42.0), Some(5));
        assert_eq!(table.assign(80.0), Some(5));
    }

    #[test]
    fn last_age_boundary_is_unassigned() {
        let table = BinTable::age();
        assert_eq!(table.assign(80.10), None);
    }

    #[test]
    fn values_outside_the_range_are_unassigned() {
        let table = BinTable::fare();
        assert_eq!(table.assign(-0.01), None);
        assert_eq!(table.assign(512.3293), None);
        assert_eq!(table.assign(1000.0), None);
        assert_eq!(table.assign(f64::NAN), None);
        assert_eq!(table.assign(f64::INFINITY), None);
    }

    #[test]
    fn fare_boundaries_are_lower_closed() {
        let table = BinTable::fare();
        assert_eq!(table.assign(7.775), Some(1));
        assert_eq!(table.assign(8.6625), Some(2));
        assert_eq!(table.assign(8.66249), Some(1));
        assert_eq!(table.assign(512.3292), Some(5));
    }

    fn linear_scan(bounds: &[f64], v: f64) -> Option<usize> {
        (0..bounds.len() - 1).find(|&i| bounds[i] <= v && v < bounds[i + 1])
    }

    #[test]
    fn matches_a_linear_scan_on_the_fare_table() {
        let table = BinTable::fare();
        let values = [
            -1.0, 0.0, 3.2, 7.775, 7.8, 8.6625, 10.0, 14.4542, 20.0, 26.0, 40.0, 52.36946667,
            300.0, 512.3293, 600.0,
        ];
        for &v in &values {
            assert_eq!(table.assign(v), linear_scan(table.boundaries(), v), "value {v}");
        }
    }

    #[test]
    fn matches_a_linear_scan_on_random_tables() {
        let mut rng = StdRng::seed_from_u64(0x5eed);
        for _ in 0..500 {
            let len = rng.gen_range(2..16);
            let mut bounds = Vec::with_capacity(len);
            let mut edge: f64 = rng.gen_range(-1_000.0..1_000.0);
            for _ in 0..len {
                bounds.push(edge);
                edge += rng.gen_range(0.001..50.0);
            }
            let table = BinTable::new(bounds.clone()).unwrap();

            let (low, high) = (bounds[0], bounds[len - 1]);
            let span = high - low;
            let mut values: Vec<f64> = (0..64)
                .map(|_| rng.gen_range(low - span..high + span))
                .collect();
            // Every boundary itself, where the half-open rule matters most.
            values.extend_from_slice(&bounds);
            for v in values {
                assert_eq!(
                    table.assign(v),
                    linear_scan(&bounds, v),
                    "value {v} against {bounds:?}"
                );
            }
        }
    }

    #[test]
    fn rejects_malformed_boundaries() {
        assert_eq!(
            BinTable::new(vec![1.0]),
            Err(BinTableError::TooFewBoundaries(1))
        );
        assert!(matches!(
            BinTable::new(vec![0.0, 2.0, 2.0]),
            Err(BinTableError::NotIncreasing { index: 2, .. })
        ));
        assert!(matches!(
            BinTable::new(vec![0.0, f64::NAN]),
            Err(BinTableError::NonFinite { index: 1, .. })
        ));
    }

    #[test]
    fn deserializes_through_validation() {
        #[derive(Deserialize)]
        struct Holder {
            bins: BinTable,
        }
        let ok: Holder = toml::from_str("bins = [0.0, 1.5, 3.0]").unwrap();
        assert_eq!(ok.bins.num_bins(), 2);
        assert!(toml::from_str::<Holder>("bins = [3.0, 1.0]").is_err());
    }
}
