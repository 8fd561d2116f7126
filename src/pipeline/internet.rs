use std::path::Path;

use anyhow::{anyhow, Result};
use polars::prelude::*;

use crate::aggregate::{aggregate, ColumnSpec};
use crate::common::data::{read_from_parquet, write_to_parquet};
use crate::error::PipelineError;
use crate::matrix::{WeightMatrix, CELL_INDEX};

use super::with_cell_coords;

pub const QUADKEY: &str = "quadkey";

pub const MODALITIES: &[&str] = &["fixed", "mobile"];

/// All quarters with published tile measurements.
pub const QUARTERS: &[(u16, u8)] = &[
    (2019, 1), (2019, 2), (2019, 3), (2019, 4),
    (2020, 1), (2020, 2), (2020, 3), (2020, 4),
    (2021, 1), (2021, 2), (2021, 3), (2021, 4),
    (2022, 1), (2022, 2), (2022, 3), (2022, 4),
    (2023, 1), (2023, 2), (2023, 3), (2023, 4),
    (2024, 1), (2024, 2), (2024, 3), (2024, 4),
    (2025, 1), (2025, 2), (2025, 3),
];

/// Reference period kept as its own rollup alongside the all-quarters one.
pub const REFERENCE_YEAR: u16 = 2023;

/// Speeds and latency are rates: weight-averaged. Test/device counts are
/// mass: summed.
const INTENSIVE_COLUMNS: &[&str] = &["avg_d_kbps", "avg_u_kbps", "avg_lat_ms"];
const ADDITIVE_COLUMNS: &[&str] = &["tests", "devices"];

/// (raw measurement column, rollup label)
const ROLLUP_QUANTITIES: &[(&str, &str)] =
    &[("avg_d_kbps", "download"), ("avg_u_kbps", "upload"), ("avg_lat_ms", "latency")];

/// Aggregate one quarter/modality tile table onto cells, prefixing every
/// metric column with `{modality}_{year}_q{quarter}_`.
pub fn aggregate_quarter(
    table: &DataFrame,
    matrix: &WeightMatrix,
    modality: &str,
    year: u16,
    quarter: u8,
) -> Result<(DataFrame, f64)> {
    let mut specs = Vec::new();
    for name in INTENSIVE_COLUMNS {
        if table.column(name).is_ok() {
            specs.push(ColumnSpec::intensive(*name));
        }
    }
    for name in ADDITIVE_COLUMNS {
        if table.column(name).is_ok() {
            specs.push(ColumnSpec::additive(*name));
        }
    }
    if specs.is_empty() {
        return Err(anyhow!("tile table has no known metric columns"));
    }

    let result = aggregate(table, QUADKEY, matrix, &specs)?;
    let coverage = result.coverage();
    let mut cells = result.cells;

    let prefix = format!("{modality}_{year}_q{quarter}");
    for spec in &specs {
        cells.rename(&spec.name, format!("{prefix}_{}", spec.name).into())?;
    }

    Ok((cells, coverage))
}

/// Equal-weight mean across `columns`, ignoring nulls per row; null when
/// every input is null.
fn mean_across(columns: &[String]) -> Expr {
    let mut num = lit(0.0f64);
    let mut den = lit(0.0f64);
    for name in columns {
        let value = col(name.as_str());
        num = num + when(value.clone().is_not_null()).then(value.clone()).otherwise(lit(0.0f64));
        den = den + value.is_not_null().cast(DataType::Float64);
    }
    when(den.clone().gt(lit(0.0f64))).then(num / den).otherwise(lit(NULL))
}

/// Merge per-quarter cell tables into one frame keyed by cell, then roll
/// quarters up to `{modality}_{quantity}_{2023,total}` columns. Quarter
/// columns are dropped from the result.
pub fn merge_quarters(frames: Vec<DataFrame>) -> Result<DataFrame> {
    if frames.is_empty() {
        return Err(PipelineError::EmptyResult("internet quarter merge").into());
    }

    let keys = concat(
        frames
            .iter()
            .map(|frame| frame.clone().lazy().select([col(CELL_INDEX)]))
            .collect::<Vec<_>>(),
        UnionArgs::default(),
    )?
    .group_by([col(CELL_INDEX)])
    .agg(Vec::<Expr>::new());

    let mut merged = keys;
    for frame in &frames {
        merged = merged.join(
            frame.clone().lazy(),
            [col(CELL_INDEX)],
            [col(CELL_INDEX)],
            JoinArgs::new(JoinType::Left),
        );
    }
    let merged = merged.collect()?;

    let names: Vec<String> =
        merged.get_column_names_str().into_iter().map(str::to_string).collect();

    let mut rollups: Vec<Expr> = Vec::new();
    for modality in MODALITIES {
        for (raw, label) in ROLLUP_QUANTITIES {
            let reference_prefix = format!("{modality}_{REFERENCE_YEAR}_");
            let reference: Vec<String> = names
                .iter()
                .filter(|n| n.starts_with(&reference_prefix) && n.ends_with(raw))
                .cloned()
                .collect();
            let all_prefix = format!("{modality}_");
            let all: Vec<String> = names
                .iter()
                .filter(|n| n.starts_with(&all_prefix) && n.contains("_q") && n.ends_with(raw))
                .cloned()
                .collect();

            if !reference.is_empty() {
                rollups.push(
                    mean_across(&reference).alias(format!("{modality}_{label}_{REFERENCE_YEAR}")),
                );
            }
            if !all.is_empty() {
                rollups.push(mean_across(&all).alias(format!("{modality}_{label}_total")));
            }
        }
    }

    let mut selection: Vec<Expr> = vec![col(CELL_INDEX)];
    selection.extend(rollups);
    let result = merged.lazy().select(selection).collect()?;
    with_cell_coords(result)
}

/// Aggregate every available `{year}_q{q}_{modality}.parquet` under
/// `input_dir`, caching each quarter's per-cell table beside its input,
/// and produce the merged internet table.
pub fn build_internet_table(
    input_dir: &Path,
    matrix: &WeightMatrix,
    verbose: u8,
) -> Result<DataFrame> {
    let mut frames = Vec::new();

    for &(year, quarter) in QUARTERS {
        for modality in MODALITIES {
            let input = input_dir.join(format!("{year}_q{quarter}_{modality}.parquet"));
            if !input.exists() {
                continue;
            }

            let cache = input_dir.join(format!("{year}_q{quarter}_{modality}_h3res8.parquet"));
            let frame = if cache.exists() {
                read_from_parquet(&cache)?
            } else {
                let table = read_from_parquet(&input)?;
                let (cells, coverage) = aggregate_quarter(&table, matrix, modality, year, quarter)?;
                if verbose > 0 {
                    eprintln!(
                        "[internet] {year} q{quarter} {modality}: {} cells, coverage {:.1}%",
                        cells.height(),
                        coverage * 100.0
                    );
                }
                write_to_parquet(cells.clone(), &cache)?;
                cells
            };
            frames.push(frame);
        }
    }

    merge_quarters(frames)
}
