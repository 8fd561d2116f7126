use anyhow::Result;
use polars::prelude::*;

use crate::matrix::{CELL_INDEX, SOURCE_KEY, WEIGHT, WeightMatrix};

/// How a numeric attribute column redistributes over cells. This is a
/// static per-dataset decision, never inferred from the data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggKind {
    /// Counts and other mass-like quantities: per-cell `sum(value * weight)`.
    Additive,
    /// Rates, speeds, times: per-cell `sum(value * weight) / sum(weight)`,
    /// denominators restricted to rows where the value is non-null.
    Intensive,
}

#[derive(Debug, Clone)]
pub struct ColumnSpec {
    pub name: String,
    pub kind: AggKind,
}

impl ColumnSpec {
    pub fn additive(name: impl Into<String>) -> Self {
        Self { name: name.into(), kind: AggKind::Additive }
    }

    pub fn intensive(name: impl Into<String>) -> Self {
        Self { name: name.into(), kind: AggKind::Intensive }
    }
}

/// Per-cell aggregation result plus the coverage statistic: attribute rows
/// whose key has no matrix entry are excluded silently, and that loss is
/// reported here instead of raised.
#[derive(Debug)]
pub struct Aggregation {
    pub cells: DataFrame,
    pub matched_rows: usize,
    pub total_rows: usize,
}

impl Aggregation {
    /// Fraction of attribute rows that mapped onto at least one cell.
    pub fn coverage(&self) -> f64 {
        if self.total_rows == 0 {
            1.0
        } else {
            self.matched_rows as f64 / self.total_rows as f64
        }
    }
}

/// Join `attributes` (keyed by `key_column`) to the weight matrix and
/// aggregate every column in `specs` per cell.
///
/// Null attribute values contribute to neither numerator nor denominator
/// of their own column; other columns of the same row are unaffected. A
/// cell with zero contributing rows for a column gets null, never zero.
pub fn aggregate(
    attributes: &DataFrame,
    key_column: &str,
    matrix: &WeightMatrix,
    specs: &[ColumnSpec],
) -> Result<Aggregation> {
    let total_rows = attributes.height();

    let matched_rows = attributes
        .clone()
        .lazy()
        .join(
            matrix.data().clone().lazy().select([col(SOURCE_KEY)]),
            [col(key_column)],
            [col(SOURCE_KEY)],
            JoinArgs::new(JoinType::Semi),
        )
        .collect()?
        .height();

    let joined = attributes
        .clone()
        .lazy()
        .with_columns(
            specs
                .iter()
                .map(|spec| col(spec.name.as_str()).cast(DataType::Float64))
                .collect::<Vec<_>>(),
        )
        .join(
            matrix.data().clone().lazy(),
            [col(key_column)],
            [col(SOURCE_KEY)],
            JoinArgs::new(JoinType::Inner),
        );

    let mut aggs = Vec::with_capacity(specs.len() * 2);
    for spec in specs {
        let name = spec.name.as_str();
        aggs.push((col(name) * col(WEIGHT)).sum().alias(format!("__num_{name}")));
        match spec.kind {
            AggKind::Additive => {
                aggs.push(col(name).is_not_null().sum().alias(format!("__cnt_{name}")));
            }
            AggKind::Intensive => {
                aggs.push(
                    when(col(name).is_not_null())
                        .then(col(WEIGHT))
                        .otherwise(lit(NULL))
                        .sum()
                        .alias(format!("__den_{name}")),
                );
            }
        }
    }

    let mut finals: Vec<Expr> = vec![col(CELL_INDEX)];
    for spec in specs {
        let name = spec.name.as_str();
        let num = col(format!("__num_{name}").as_str());
        let expr = match spec.kind {
            AggKind::Additive => when(col(format!("__cnt_{name}").as_str()).gt(lit(0)))
                .then(num)
                .otherwise(lit(NULL)),
            AggKind::Intensive => {
                let den = col(format!("__den_{name}").as_str());
                when(den.clone().gt(lit(0.0))).then(num / den).otherwise(lit(NULL))
            }
        };
        finals.push(expr.alias(name));
    }

    let cells = joined
        .group_by([col(CELL_INDEX)])
        .agg(aggs)
        .select(finals)
        .collect()?;

    Ok(Aggregation { cells, matched_rows, total_rows })
}
