pub mod fuse;
pub mod health;
pub mod internet;
pub mod population;

use std::str::FromStr;

use anyhow::{anyhow, Result};
use h3o::CellIndex;
use polars::prelude::*;

use crate::hex;
use crate::matrix::CELL_INDEX;

/// Append `lat`/`lon` centroid columns derived from the `cell_index`
/// column. Every per-cell artifact carries these for downstream mapping.
pub fn with_cell_coords(df: DataFrame) -> Result<DataFrame> {
    let index = df.column(CELL_INDEX)?.str()?;
    let mut lats = Vec::with_capacity(df.height());
    let mut lons = Vec::with_capacity(df.height());

    for value in index.into_iter() {
        let raw = value.ok_or_else(|| anyhow!("null cell index in per-cell table"))?;
        let cell = CellIndex::from_str(raw)
            .map_err(|e| anyhow!("unparsable cell index {raw:?}: {e}"))?;
        let (lat, lon) = hex::cell_centroid(cell);
        lats.push(lat);
        lons.push(lon);
    }

    let mut df = df;
    df.with_column(Series::new("lat".into(), lats))?;
    df.with_column(Series::new("lon".into(), lons))?;
    Ok(df)
}
