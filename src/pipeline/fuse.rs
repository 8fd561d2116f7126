use anyhow::Result;
use polars::prelude::*;

use crate::error::PipelineError;
use crate::matrix::CELL_INDEX;

/// Census column names → canonical fused names, in output order.
pub const POPULATION_RENAMES: &[(&str, &str)] = &[
    ("T", "pop_total"),
    ("M", "pop_male"),
    ("F", "pop_female"),
    ("Y_LT15", "pop_age_lt15"),
    ("Y_1564", "pop_age_15_64"),
    ("Y_GE65", "pop_age_ge65"),
    ("EMP", "pop_employed"),
    ("NAT", "pop_national"),
    ("EU_OTH", "pop_eu_other"),
    ("OTH", "pop_other"),
    ("SAME", "pop_same_residence"),
    ("CHG_IN", "pop_change_in"),
    ("CHG_OUT", "pop_change_out"),
];

pub const HEALTH_DISTANCE: &str = "health_distance";

/// Join the three per-cell tables into the canonical fused dataset.
///
/// Population is the backbone; health joins inner (a cell without a
/// health value is dropped), internet joins left (missing measurements
/// stay as nulls). Cells whose total population rounds to nothing are
/// filtered out last.
pub fn fuse(population: &DataFrame, health: &DataFrame, internet: &DataFrame) -> Result<DataFrame> {
    let pop = prepare_population(population)?;
    let health = prepare_health(health)?;
    let internet = prepare_internet(internet)?;

    let merged = pop
        .lazy()
        .join(health.lazy(), [col(CELL_INDEX)], [col(CELL_INDEX)], JoinArgs::new(JoinType::Inner))
        .join(internet.lazy(), [col(CELL_INDEX)], [col(CELL_INDEX)], JoinArgs::new(JoinType::Left))
        .filter(col("pop_total").gt(lit(0.0)).and(col(HEALTH_DISTANCE).is_not_null()))
        .collect()?;

    if merged.height() == 0 {
        return Err(PipelineError::EmptyResult("dataset fusion").into());
    }

    stabilize(merged)
}

fn prepare_population(population: &DataFrame) -> Result<DataFrame> {
    let mut selection: Vec<Expr> = vec![col(CELL_INDEX), col("lat"), col("lon")];
    for (source, target) in POPULATION_RENAMES {
        if population.column(source).is_ok() {
            selection.push(col(*source).alias(*target));
        }
    }
    Ok(population.clone().lazy().select(selection).collect()?)
}

fn prepare_health(health: &DataFrame) -> Result<DataFrame> {
    Ok(health
        .clone()
        .lazy()
        .select([col(CELL_INDEX), col("accessibility_mean").alias(HEALTH_DISTANCE)])
        .collect()?)
}

fn prepare_internet(internet: &DataFrame) -> Result<DataFrame> {
    let mut selection: Vec<Expr> = vec![col(CELL_INDEX)];
    for name in internet.get_column_names_str() {
        if name.ends_with("_2023") || name.ends_with("_total") {
            selection.push(col(name));
        }
    }
    Ok(internet.clone().lazy().select(selection).collect()?)
}

/// Round for output size, strictly after all aggregation math: population
/// counts to integers, lat/lon to 6 decimals, remaining floats to 2.
fn stabilize(df: DataFrame) -> Result<DataFrame> {
    let integer_columns: Vec<&str> = POPULATION_RENAMES.iter().map(|(_, name)| *name).collect();

    let mut columns: Vec<Column> = Vec::with_capacity(df.width());
    for column in df.get_columns() {
        let name = column.name().as_str();
        if name == CELL_INDEX {
            columns.push(column.clone());
        } else if name == "lat" || name == "lon" {
            columns.push(round_column(column, 6)?);
        } else if integer_columns.contains(&name) {
            columns.push(round_column(column, 0)?.cast(&DataType::Int64)?);
        } else if matches!(column.dtype(), DataType::Float32 | DataType::Float64) {
            columns.push(round_column(column, 2)?);
        } else {
            columns.push(column.clone());
        }
    }

    Ok(DataFrame::new(columns)?)
}

fn round_column(column: &Column, decimals: i32) -> Result<Column> {
    let factor = 10f64.powi(decimals);
    let values = column.cast(&DataType::Float64)?;
    let rounded = values.f64()?.apply_values(|v| (v * factor).round() / factor);
    Ok(rounded.into_series().into_column())
}
