use ahash::AHashMap;
use anyhow::Result;
use h3o::CellIndex;
use polars::prelude::*;

use crate::common::proj::LaeaToWgs84;
use crate::error::PipelineError;
use crate::hex;

use super::with_cell_coords;

/// Raw accessibility values are travel seconds; downstream tables carry
/// minutes, and this is the only place the conversion happens.
const SECONDS_PER_MINUTE: f64 = 60.0;

/// Per-cell accumulation counters from a health aggregation run.
#[derive(Debug, Clone, Copy, Default)]
pub struct HealthStats {
    pub samples: usize,
    pub skipped: usize,
}

/// Aggregate healthcare-accessibility point samples onto cells.
///
/// `samples` carries EPSG:3035 coordinates (`x`, `y` meters) and an
/// `accessibility` column in seconds with nodata already mapped to null.
/// Unprojectable points and nulls are skipped and counted, never fatal.
pub fn aggregate_health(samples: &DataFrame) -> Result<(DataFrame, HealthStats)> {
    let xs = samples.column("x")?.cast(&DataType::Float64)?;
    let ys = samples.column("y")?.cast(&DataType::Float64)?;
    let values = samples.column("accessibility")?.cast(&DataType::Float64)?;
    let xs = xs.f64()?;
    let ys = ys.f64()?;
    let values = values.f64()?;

    let proj = LaeaToWgs84::new()?;
    let mut per_cell: AHashMap<CellIndex, Vec<f64>> = AHashMap::new();
    let mut stats = HealthStats::default();

    for ((x, y), value) in xs.into_iter().zip(ys.into_iter()).zip(values.into_iter()) {
        let (Some(x), Some(y), Some(seconds)) = (x, y, value) else {
            stats.skipped += 1;
            continue;
        };
        let Ok((lon, lat)) = proj.point(x, y) else {
            stats.skipped += 1;
            continue;
        };
        let Ok(cell) = hex::cell_from_point(lat, lon) else {
            stats.skipped += 1;
            continue;
        };
        per_cell.entry(cell).or_default().push(seconds / SECONDS_PER_MINUTE);
        stats.samples += 1;
    }

    if per_cell.is_empty() {
        return Err(PipelineError::EmptyResult("health aggregation").into());
    }

    let mut index = Vec::with_capacity(per_cell.len());
    let mut means = Vec::with_capacity(per_cell.len());
    let mut medians = Vec::with_capacity(per_cell.len());
    let mut mins = Vec::with_capacity(per_cell.len());
    let mut maxs = Vec::with_capacity(per_cell.len());
    let mut stds = Vec::with_capacity(per_cell.len());
    let mut counts = Vec::with_capacity(per_cell.len());

    let mut per_cell: Vec<(CellIndex, Vec<f64>)> = per_cell.into_iter().collect();
    per_cell.sort_by_key(|(cell, _)| *cell);

    for (cell, mut minutes) in per_cell {
        minutes.sort_by(|a, b| a.total_cmp(b));
        let n = minutes.len();
        let mean = minutes.iter().sum::<f64>() / n as f64;
        let median = if n % 2 == 1 {
            minutes[n / 2]
        } else {
            (minutes[n / 2 - 1] + minutes[n / 2]) / 2.0
        };
        let variance = minutes.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n as f64;

        index.push(cell.to_string());
        means.push(mean);
        medians.push(median);
        mins.push(minutes[0]);
        maxs.push(minutes[n - 1]);
        stds.push(variance.sqrt());
        counts.push(n as u32);
    }

    let table = df!(
        "cell_index" => index,
        "accessibility_mean" => means,
        "accessibility_median" => medians,
        "accessibility_min" => mins,
        "accessibility_max" => maxs,
        "accessibility_std" => stds,
        "pixel_count" => counts,
    )?;

    Ok((with_cell_coords(table)?, stats))
}
