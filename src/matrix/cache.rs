use std::path::Path;

use anyhow::{Context, Result};
use h3o::Resolution;

use crate::common::fs::ensure_dir_exists;

use super::{MatrixBuildStats, WeightMatrix};

/// Cache-first matrix access: reuse the artifact at `path` when it exists
/// and passes the completeness/resolution checks, otherwise build, persist
/// atomically and return.
///
/// An existing-but-invalid artifact aborts with the validation error
/// rather than being silently rebuilt: rebuild is an explicit operator
/// decision (delete the file and rerun).
pub fn get_or_build<F>(
    path: &Path,
    resolution: Resolution,
    build: F,
) -> Result<(WeightMatrix, Option<MatrixBuildStats>)>
where
    F: FnOnce() -> Result<(WeightMatrix, MatrixBuildStats)>,
{
    if path.exists() {
        let matrix = WeightMatrix::load(path, resolution).with_context(|| {
            format!(
                "Existing matrix at {} is not usable; delete it to force a rebuild",
                path.display()
            )
        })?;
        return Ok((matrix, None));
    }

    if let Some(parent) = path.parent() {
        ensure_dir_exists(parent)?;
    }

    let (matrix, stats) = build()?;
    matrix.save(path)?;
    Ok((matrix, Some(stats)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hex::HEX_RESOLUTION;
    use crate::matrix::WeightEntry;

    fn sample_matrix() -> (WeightMatrix, MatrixBuildStats) {
        let cell = crate::hex::cell_from_point(49.0, 6.0).unwrap();
        let entries = vec![WeightEntry { source_key: "s".into(), cell, weight: 0.4 }];
        let matrix = WeightMatrix::from_entries(entries, HEX_RESOLUTION).unwrap();
        let stats = MatrixBuildStats { sources: 1, entries: 1, skipped: 0 };
        (matrix, stats)
    }

    #[test]
    fn builds_once_then_hits_the_cache() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("matrix.parquet");

        let (_, stats) = get_or_build(&path, HEX_RESOLUTION, || Ok(sample_matrix())).unwrap();
        assert!(stats.is_some());
        assert!(path.exists());

        // Second call must not invoke the builder.
        let (matrix, stats) = get_or_build(&path, HEX_RESOLUTION, || {
            panic!("builder must not run on a cache hit")
        })
        .unwrap();
        assert!(stats.is_none());
        assert_eq!(matrix.len(), 1);
    }

    #[test]
    fn invalid_artifact_is_an_error_not_a_rebuild() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("matrix.parquet");
        std::fs::write(&path, b"not parquet").unwrap();

        let result = get_or_build(&path, HEX_RESOLUTION, || Ok(sample_matrix()));
        assert!(result.is_err());
    }
}
