pub mod grid;
pub mod quadkey;

use geo::Polygon;

/// Coordinate reference system a source geometry arrives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceCrs {
    /// Lon/lat degrees; no reprojection needed before hex matching.
    Wgs84,
    /// EPSG:3035 meters (Eurostat census grid).
    LaeaEurope,
}

/// A source geometry awaiting weight computation: native key plus its
/// polygon in `crs`. Discarded once its matrix entries are produced.
#[derive(Debug, Clone)]
pub struct SourcePolygon {
    pub key: String,
    pub polygon: Polygon<f64>,
    pub crs: SourceCrs,
}

impl SourcePolygon {
    pub fn new(key: impl Into<String>, polygon: Polygon<f64>, crs: SourceCrs) -> Self {
        Self { key: key.into(), polygon, crs }
    }
}
