use anyhow::{Context, Result};
use geo::{Area, BooleanOps, Centroid};
use rayon::prelude::*;

use crate::common::proj::LaeaToWgs84;
use crate::error::PipelineError;
use crate::hex::{self, HEX_RESOLUTION};
use crate::sources::{SourceCrs, SourcePolygon};

use super::{WeightEntry, WeightMatrix};

/// Raw weights at or below this fraction of the source area are dropped;
/// renormalization afterwards restores the per-key sum-to-1 invariant.
const MIN_RAW_WEIGHT: f64 = 0.001;

const DEFAULT_BATCH_SIZE: usize = 500;

/// Counters reported after a matrix build. Skipped geometries never abort
/// the batch; they are the operator's signal that input needs a look.
#[derive(Debug, Clone, Copy, Default)]
pub struct MatrixBuildStats {
    pub sources: usize,
    pub entries: usize,
    pub skipped: usize,
}

/// Computes the source → cell weight table by polygon intersection.
///
/// Source geometries are independent work units: they are processed in
/// fixed-size batches on a rayon pool, each batch accumulating entries
/// locally, merged by concatenation at the end.
#[derive(Debug, Clone)]
pub struct MatrixBuilder {
    k_ring: u32,
    batch_size: usize,
    threads: usize,
}

impl Default for MatrixBuilder {
    fn default() -> Self {
        let available = std::thread::available_parallelism().map_or(1, |n| n.get());
        Self {
            k_ring: 1,
            batch_size: DEFAULT_BATCH_SIZE,
            // Leave one unit for coordination and I/O.
            threads: available.saturating_sub(1).max(1),
        }
    }
}

impl MatrixBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Candidate search radius around the centroid cell. Radius 1 covers
    /// sources no larger than a hex cell; coarser sources need more.
    pub fn with_k_ring(mut self, k_ring: u32) -> Self {
        self.k_ring = k_ring;
        self
    }

    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads.max(1);
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Build and normalize the matrix for `sources`.
    pub fn build(&self, sources: &[SourcePolygon]) -> Result<(WeightMatrix, MatrixBuildStats)> {
        if sources.is_empty() {
            return Err(PipelineError::EmptyResult("weight-matrix build").into());
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.threads)
            .build()
            .context("Failed to build matrix worker pool")?;

        let batches: Vec<(Vec<WeightEntry>, usize)> = pool.install(|| {
            sources
                .par_chunks(self.batch_size)
                .map(|batch| self.process_batch(batch))
                .collect::<Result<_>>()
        })?;

        let mut entries = Vec::new();
        let mut skipped = 0;
        for (batch_entries, batch_skipped) in batches {
            entries.extend(batch_entries);
            skipped += batch_skipped;
        }

        let stats = MatrixBuildStats {
            sources: sources.len(),
            entries: entries.len(),
            skipped,
        };
        let matrix = WeightMatrix::from_entries(entries, HEX_RESOLUTION)?;
        Ok((matrix, stats))
    }

    /// Process one batch; the transform is rebuilt per batch so workers
    /// share no mutable state.
    fn process_batch(&self, batch: &[SourcePolygon]) -> Result<(Vec<WeightEntry>, usize)> {
        let proj = LaeaToWgs84::new()?;
        let mut entries = Vec::new();
        let mut skipped = 0;

        for source in batch {
            let shape = match source.crs {
                SourceCrs::Wgs84 => source.polygon.clone(),
                SourceCrs::LaeaEurope => match proj.polygon(&source.polygon) {
                    Ok(shape) => shape,
                    Err(_) => {
                        skipped += 1;
                        continue;
                    }
                },
            };

            let area = shape.unsigned_area();
            if area <= 0.0 {
                skipped += 1;
                continue;
            }

            let Some(center) = shape.centroid() else {
                skipped += 1;
                continue;
            };
            let Ok(center_cell) = hex::cell_from_point(center.y(), center.x()) else {
                skipped += 1;
                continue;
            };

            let before = entries.len();
            for candidate in hex::neighbors(center_cell, self.k_ring) {
                let overlap = shape.intersection(&hex::cell_boundary(candidate));
                let weight = overlap.unsigned_area() / area;
                if weight > MIN_RAW_WEIGHT {
                    entries.push(WeightEntry {
                        source_key: source.key.clone(),
                        cell: candidate,
                        weight,
                    });
                }
            }
            // No candidate overlap at all: the source is dropped and counted,
            // it must not silently vanish.
            if entries.len() == before {
                skipped += 1;
            }
        }

        Ok((entries, skipped))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::{CELL_INDEX, SOURCE_KEY, WEIGHT};
    use crate::sources::grid::parse_grid_id;
    use approx::assert_relative_eq;
    use geo::{Coord, LineString, Polygon};
    use polars::prelude::*;

    /// Square of side `deg` degrees centered on (lat, lon).
    fn square_around(lat: f64, lon: f64, deg: f64) -> Polygon<f64> {
        let half = deg / 2.0;
        Polygon::new(
            LineString::new(vec![
                Coord { x: lon - half, y: lat - half },
                Coord { x: lon + half, y: lat - half },
                Coord { x: lon + half, y: lat + half },
                Coord { x: lon - half, y: lat + half },
                Coord { x: lon - half, y: lat - half },
            ]),
            vec![],
        )
    }

    fn weight_sums(matrix: &WeightMatrix) -> DataFrame {
        matrix
            .data()
            .clone()
            .lazy()
            .group_by([col(SOURCE_KEY)])
            .agg([col(WEIGHT).sum().alias("total")])
            .collect()
            .unwrap()
    }

    #[test]
    fn weights_for_each_source_sum_to_one() {
        let cell = crate::hex::cell_from_point(47.5, 8.5).unwrap();
        let (lat, lon) = crate::hex::cell_centroid(cell);
        let sources = vec![
            SourcePolygon::new("q1", square_around(lat, lon, 0.008), SourceCrs::Wgs84),
            SourcePolygon::new("q2", square_around(lat + 0.004, lon, 0.008), SourceCrs::Wgs84),
        ];

        let (matrix, stats) = MatrixBuilder::new().with_threads(1).build(&sources).unwrap();
        assert_eq!(stats.skipped, 0);
        assert_eq!(stats.sources, 2);

        let sums = weight_sums(&matrix);
        for total in sums.column("total").unwrap().f64().unwrap().into_no_null_iter() {
            assert_relative_eq!(total, 1.0, epsilon = 1e-6);
        }
    }

    #[test]
    fn square_inside_one_cell_gets_a_single_full_weight() {
        let cell = crate::hex::cell_from_point(50.0, 10.0).unwrap();
        let (lat, lon) = crate::hex::cell_centroid(cell);
        // Res-8 hexes are ~0.46 km² so a tiny square sits fully inside.
        let sources = vec![SourcePolygon::new(
            "tiny",
            square_around(lat, lon, 0.0005),
            SourceCrs::Wgs84,
        )];

        let (matrix, _) = MatrixBuilder::new().with_threads(1).build(&sources).unwrap();
        assert_eq!(matrix.len(), 1);

        let weight = matrix.data().column(WEIGHT).unwrap().f64().unwrap().get(0).unwrap();
        assert_relative_eq!(weight, 1.0, epsilon = 1e-9);

        let index = matrix.data().column(CELL_INDEX).unwrap().str().unwrap().get(0).unwrap();
        assert_eq!(index, cell.to_string());
    }

    #[test]
    fn degenerate_sources_are_skipped_and_counted() {
        let cell = crate::hex::cell_from_point(50.0, 10.0).unwrap();
        let (lat, lon) = crate::hex::cell_centroid(cell);
        let degenerate = Polygon::new(
            LineString::new(vec![
                Coord { x: 10.0, y: 50.0 },
                Coord { x: 10.0, y: 50.0 },
                Coord { x: 10.0, y: 50.0 },
            ]),
            vec![],
        );
        let sources = vec![
            SourcePolygon::new("ok", square_around(lat, lon, 0.004), SourceCrs::Wgs84),
            SourcePolygon::new("zero-area", degenerate, SourceCrs::Wgs84),
        ];

        let (matrix, stats) = MatrixBuilder::new().with_threads(1).build(&sources).unwrap();
        assert_eq!(stats.skipped, 1);
        let keys = matrix.data().column(SOURCE_KEY).unwrap().str().unwrap();
        assert!(keys.into_no_null_iter().all(|k| k == "ok"));
    }

    #[test]
    fn census_grid_squares_reproject_and_normalize() {
        // A real-format Eurostat cell near Paris (EPSG:3035).
        let source = parse_grid_id("CRS3035RES1000mN2884000E3754000").unwrap();
        let (matrix, stats) = MatrixBuilder::new().with_threads(1).build(&[source]).unwrap();
        assert_eq!(stats.skipped, 0);

        let sums = weight_sums(&matrix);
        let total = sums.column("total").unwrap().f64().unwrap().get(0).unwrap();
        assert_relative_eq!(total, 1.0, epsilon = 1e-6);
        // A 1 km square at res 8 straddles at most a handful of hexes.
        assert!(matrix.len() >= 1 && matrix.len() <= 7);
    }

    #[test]
    fn rebuilds_are_deterministic_up_to_float_epsilon() {
        let cell = crate::hex::cell_from_point(52.0, 4.5).unwrap();
        let (lat, lon) = crate::hex::cell_centroid(cell);
        let sources: Vec<SourcePolygon> = (0..20)
            .map(|i| {
                let offset = f64::from(i) * 0.0011;
                SourcePolygon::new(
                    format!("s{i}"),
                    square_around(lat + offset, lon, 0.006),
                    SourceCrs::Wgs84,
                )
            })
            .collect();

        let builder = MatrixBuilder::new().with_threads(2).with_batch_size(4);
        let (first, _) = builder.build(&sources).unwrap();
        let (second, _) = builder.build(&sources).unwrap();

        let sort = |m: &WeightMatrix| {
            m.data()
                .clone()
                .lazy()
                .sort([SOURCE_KEY, CELL_INDEX], Default::default())
                .collect()
                .unwrap()
        };
        let (a, b) = (sort(&first), sort(&second));
        assert_eq!(a.height(), b.height());

        let wa = a.column(WEIGHT).unwrap().f64().unwrap();
        let wb = b.column(WEIGHT).unwrap().f64().unwrap();
        for (x, y) in wa.into_no_null_iter().zip(wb.into_no_null_iter()) {
            assert_relative_eq!(x, y, epsilon = 1e-9);
        }
    }
}
