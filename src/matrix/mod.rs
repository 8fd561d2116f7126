mod builder;
mod cache;

pub use builder::{MatrixBuildStats, MatrixBuilder};
pub use cache::get_or_build;

use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result};
use h3o::{CellIndex, Resolution};
use polars::prelude::*;

use crate::common::data::{read_from_parquet, write_to_parquet};
use crate::error::PipelineError;

/// Column names of the persisted matrix artifact. Exactly these three
/// columns, in this order; the resolution is recovered from the stored
/// cell indices rather than a sidecar.
pub const SOURCE_KEY: &str = "source_key";
pub const CELL_INDEX: &str = "cell_index";
pub const WEIGHT: &str = "weight";

/// One source-geometry → cell area fraction, before normalization.
#[derive(Debug, Clone)]
pub struct WeightEntry {
    pub source_key: String,
    pub cell: CellIndex,
    pub weight: f64,
}

/// Sparse source → cell weight table. Per source key the weights sum to
/// 1.0, so 100% of a source attribute's mass lands on cells.
#[derive(Debug, Clone)]
pub struct WeightMatrix {
    data: DataFrame,
    resolution: Resolution,
}

impl WeightMatrix {
    /// Normalize raw entries (divide by the per-key weight sum) and wrap
    /// them as a matrix at `resolution`.
    pub fn from_entries(entries: Vec<WeightEntry>, resolution: Resolution) -> Result<Self> {
        if entries.is_empty() {
            return Err(PipelineError::EmptyResult("weight-matrix build").into());
        }

        let keys: Vec<&str> = entries.iter().map(|e| e.source_key.as_str()).collect();
        let cells: Vec<String> = entries.iter().map(|e| e.cell.to_string()).collect();
        let weights: Vec<f64> = entries.iter().map(|e| e.weight).collect();

        let raw = df!(
            SOURCE_KEY => keys,
            CELL_INDEX => cells,
            WEIGHT => weights,
        )?;

        // Per-key renormalization restores the sum-to-1 invariant after
        // sub-threshold entries were dropped during the build.
        let totals = raw
            .clone()
            .lazy()
            .group_by([col(SOURCE_KEY)])
            .agg([col(WEIGHT).sum().alias("weight_total")]);

        let data = raw
            .lazy()
            .join(totals, [col(SOURCE_KEY)], [col(SOURCE_KEY)], JoinArgs::new(JoinType::Inner))
            .with_column((col(WEIGHT) / col("weight_total")).alias(WEIGHT))
            .select([col(SOURCE_KEY), col(CELL_INDEX), col(WEIGHT)])
            .collect()?;

        Ok(Self { data, resolution })
    }

    #[inline]
    pub fn data(&self) -> &DataFrame {
        &self.data
    }

    #[inline]
    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.height()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.height() == 0
    }

    /// Persist as Parquet (atomic write; see `common::data`).
    pub fn save(&self, path: &Path) -> Result<()> {
        write_to_parquet(self.data.clone(), path)
            .with_context(|| format!("Failed to save weight matrix to {}", path.display()))
    }

    /// Load a persisted matrix and verify it is complete and was built at
    /// `expected` resolution. A file that exists but fails these checks is
    /// never a cache hit.
    pub fn load(path: &Path, expected: Resolution) -> Result<Self> {
        let data = read_from_parquet(path)
            .with_context(|| format!("Failed to load weight matrix from {}", path.display()))?;
        let resolution = Self::validate(&data, expected)?;
        Ok(Self { data, resolution })
    }

    fn validate(data: &DataFrame, expected: Resolution) -> Result<Resolution, PipelineError> {
        let names = data.get_column_names_str();
        if names != [SOURCE_KEY, CELL_INDEX, WEIGHT] {
            return Err(PipelineError::MatrixIncomplete(format!(
                "unexpected schema {names:?}"
            )));
        }
        if data.height() == 0 {
            return Err(PipelineError::MatrixIncomplete("no entries".into()));
        }

        let first = data
            .column(CELL_INDEX)
            .ok()
            .and_then(|c| c.str().ok())
            .and_then(|c| c.get(0))
            .ok_or_else(|| PipelineError::MatrixIncomplete("cell_index column unreadable".into()))?;
        let cell = CellIndex::from_str(first)
            .map_err(|_| PipelineError::MatrixIncomplete(format!("bad cell index {first:?}")))?;

        if cell.resolution() != expected {
            return Err(PipelineError::ResolutionMismatch {
                expected,
                found: cell.resolution(),
            });
        }
        Ok(expected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hex::HEX_RESOLUTION;
    use approx::assert_relative_eq;

    fn cell_at(lat: f64, lon: f64) -> CellIndex {
        crate::hex::cell_from_point(lat, lon).unwrap()
    }

    fn sample_entries() -> Vec<WeightEntry> {
        let a = cell_at(48.0, 2.0);
        let b = cell_at(48.1, 2.1);
        vec![
            WeightEntry { source_key: "s1".into(), cell: a, weight: 0.6 },
            WeightEntry { source_key: "s1".into(), cell: b, weight: 0.2 },
            WeightEntry { source_key: "s2".into(), cell: a, weight: 0.5 },
        ]
    }

    #[test]
    fn normalization_makes_each_key_sum_to_one() {
        let matrix = WeightMatrix::from_entries(sample_entries(), HEX_RESOLUTION).unwrap();
        let sums = matrix
            .data()
            .clone()
            .lazy()
            .group_by([col(SOURCE_KEY)])
            .agg([col(WEIGHT).sum().alias("total")])
            .collect()
            .unwrap();

        let totals = sums.column("total").unwrap().f64().unwrap();
        for total in totals.into_no_null_iter() {
            assert_relative_eq!(total, 1.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn save_then_load_round_trips_and_checks_resolution() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("matrix.parquet");

        let matrix = WeightMatrix::from_entries(sample_entries(), HEX_RESOLUTION).unwrap();
        matrix.save(&path).unwrap();

        let loaded = WeightMatrix::load(&path, HEX_RESOLUTION).unwrap();
        assert_eq!(loaded.len(), matrix.len());

        let err = WeightMatrix::load(&path, Resolution::Seven).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::ResolutionMismatch { .. })
        ));
    }

    #[test]
    fn empty_or_misshapen_artifacts_are_incomplete() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("matrix.parquet");

        let bogus = df!("a" => ["x"], "b" => [1.0f64]).unwrap();
        write_to_parquet(bogus, &path).unwrap();

        let err = WeightMatrix::load(&path, HEX_RESOLUTION).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::MatrixIncomplete(_))
        ));
    }
}
