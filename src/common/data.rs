use std::fs::File;
use std::path::Path;

use anyhow::{Context, Result};
use polars::{
    frame::DataFrame,
    io::SerReader,
    prelude::{CsvReader, ParquetReader, ParquetWriter},
};
use tempfile::NamedTempFile;

/// Reads a CSV file from `path` into a Polars DataFrame.
pub fn read_from_csv(path: &Path) -> Result<DataFrame> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open csv file: {}", path.display()))?;
    let df = CsvReader::new(file).finish()?;
    Ok(df)
}

/// Reads a Parquet file from `path` into a Polars DataFrame.
pub fn read_from_parquet(path: &Path) -> Result<DataFrame> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open parquet file: {}", path.display()))?;
    let df = ParquetReader::new(file).finish()?;
    Ok(df)
}

/// Writes a Polars DataFrame to a Parquet file at `path`.
///
/// The write is atomic: bytes go to a temp file in the destination
/// directory, renamed into place on success. A crashed run never leaves a
/// partial file that a later run could mistake for a complete artifact.
pub fn write_to_parquet(mut df: DataFrame, path: &Path) -> Result<()> {
    let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir)
        .with_context(|| format!("Failed to create temp file in {}", dir.display()))?;
    ParquetWriter::new(&mut tmp).finish(&mut df)?;
    tmp.persist(path)
        .with_context(|| format!("Failed to move parquet file into place: {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::prelude::*;

    #[test]
    fn parquet_round_trip_preserves_frame() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("table.parquet");
        let df = df!(
            "key" => ["a", "b"],
            "value" => [1.5f64, 2.5],
        )
        .unwrap();

        write_to_parquet(df.clone(), &path).unwrap();
        let back = read_from_parquet(&path).unwrap();
        assert!(back.equals(&df));
    }
}
