use anyhow::Result;
use polars::prelude::*;

use crate::aggregate::{aggregate, ColumnSpec};
use crate::matrix::WeightMatrix;

use super::with_cell_coords;

/// Census population subgroups, additive by definition: totals, sex, age
/// bands, employment, citizenship, and residence-change counts.
pub const POPULATION_COLUMNS: &[&str] = &[
    "T", "M", "F", "Y_LT15", "Y_1564", "Y_GE65", "EMP", "NAT", "EU_OTH", "OTH", "SAME", "CHG_IN",
    "CHG_OUT",
];

pub const LAND_SURFACE: &str = "LAND_SURFACE";

pub const GRID_KEY: &str = "grid_id";

/// Eurostat's "confidential or not available" sentinel. Mapped to null
/// before any arithmetic; treating it as a count would poison every sum.
const NODATA: f64 = -9999.0;

/// Aggregate the census grid attribute table onto cells via the grid
/// weight matrix. Returns the per-cell table (with centroid coords) and
/// the coverage of the attribute join.
pub fn aggregate_population(census: &DataFrame, matrix: &WeightMatrix) -> Result<(DataFrame, f64)> {
    let mut census = census.clone();
    if census.column(GRID_KEY).is_err() && census.column("GRD_ID").is_ok() {
        census.rename("GRD_ID", GRID_KEY.into())?;
    }

    let available: Vec<&str> = POPULATION_COLUMNS
        .iter()
        .copied()
        .filter(|name| census.column(name).is_ok())
        .collect();

    // Sentinel -9999 -> null on the subgroup columns only; LAND_SURFACE
    // has no sentinel in the source.
    let cleaned = census
        .lazy()
        .with_columns(
            available
                .iter()
                .map(|name| {
                    let value = col(*name).cast(DataType::Float64);
                    when(value.clone().eq(lit(NODATA)))
                        .then(lit(NULL))
                        .otherwise(value)
                        .alias(*name)
                })
                .collect::<Vec<_>>(),
        )
        .collect()?;

    let mut specs: Vec<ColumnSpec> = available.iter().map(|name| ColumnSpec::additive(*name)).collect();
    if cleaned.column(LAND_SURFACE).is_ok() {
        specs.push(ColumnSpec::additive(LAND_SURFACE));
    }

    let result = aggregate(&cleaned, GRID_KEY, matrix, &specs)?;
    let coverage = result.coverage();

    Ok((with_cell_coords(result.cells)?, coverage))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hex::HEX_RESOLUTION;
    use crate::matrix::{WeightEntry, CELL_INDEX};
    use approx::assert_relative_eq;

    #[test]
    fn nodata_sentinel_becomes_null_not_mass() {
        let cell = crate::hex::cell_from_point(47.0, 7.0).unwrap();
        let matrix = WeightMatrix::from_entries(
            vec![
                WeightEntry { source_key: "g1".into(), cell, weight: 1.0 },
                WeightEntry { source_key: "g2".into(), cell, weight: 1.0 },
            ],
            HEX_RESOLUTION,
        )
        .unwrap();

        let census = df!(
            "GRD_ID" => ["g1", "g2"],
            "T" => [100i64, -9999],
            "EMP" => [-9999i64, -9999],
        )
        .unwrap();

        let (table, coverage) = aggregate_population(&census, &matrix).unwrap();
        assert_relative_eq!(coverage, 1.0);
        assert_eq!(table.height(), 1);

        let total = table.column("T").unwrap().f64().unwrap().get(0).unwrap();
        assert_relative_eq!(total, 100.0, epsilon = 1e-9);
        // All contributions were sentinels: null, not zero.
        assert!(table.column("EMP").unwrap().f64().unwrap().get(0).is_none());
        assert!(table.column(CELL_INDEX).is_ok());
        assert!(table.column("lat").is_ok() && table.column("lon").is_ok());
    }

    #[test]
    fn population_mass_is_conserved_across_cells() {
        let c1 = crate::hex::cell_from_point(47.0, 7.0).unwrap();
        let c2 = crate::hex::cell_from_point(47.1, 7.1).unwrap();
        let matrix = WeightMatrix::from_entries(
            vec![
                WeightEntry { source_key: "g1".into(), cell: c1, weight: 0.7 },
                WeightEntry { source_key: "g1".into(), cell: c2, weight: 0.3 },
            ],
            HEX_RESOLUTION,
        )
        .unwrap();

        let census = df!(
            "grid_id" => ["g1"],
            "T" => [1000i64],
        )
        .unwrap();

        let (table, _) = aggregate_population(&census, &matrix).unwrap();
        let total: f64 = table.column("T").unwrap().f64().unwrap().sum().unwrap();
        assert_relative_eq!(total, 1000.0, epsilon = 1e-9);
    }
}
