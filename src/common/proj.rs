use anyhow::{anyhow, Context, Result};
use geo::{Coord, MapCoords, Polygon};
use proj4rs::{proj::Proj as Proj4, transform::transform};

/// PROJ.4 string for EPSG:3035 (ETRS89 Lambert azimuthal equal-area, the
/// Eurostat census grid CRS).
const LAEA_EUROPE_PROJ4: &str =
    "+proj=laea +lat_0=52 +lon_0=10 +x_0=4321000 +y_0=3210000 +ellps=GRS80 +towgs84=0,0,0,0,0,0,0 +units=m +no_defs +type=crs";

const WGS84_PROJ4: &str = "+proj=longlat +datum=WGS84 +no_defs +type=crs";

/// One-way EPSG:3035 → WGS84 transform, built once and shared per worker.
pub struct LaeaToWgs84 {
    from: Proj4,
    to: Proj4,
}

impl LaeaToWgs84 {
    pub fn new() -> Result<Self> {
        let from = Proj4::from_proj_string(LAEA_EUROPE_PROJ4)
            .with_context(|| anyhow!("failed to build source PROJ.4: {LAEA_EUROPE_PROJ4}"))?;
        let to = Proj4::from_proj_string(WGS84_PROJ4)
            .with_context(|| anyhow!("failed to build target PROJ.4: {WGS84_PROJ4}"))?;
        Ok(Self { from, to })
    }

    /// Project a single EPSG:3035 point (meters) to (lon, lat) degrees.
    pub fn point(&self, x: f64, y: f64) -> Result<(f64, f64)> {
        let mut point = (x, y, 0.0);
        transform(&self.from, &self.to, &mut point)
            .map_err(|e| anyhow!("CRS transform failed at ({x}, {y}): {e}"))?;
        // Meters in, radians out.
        Ok((point.0.to_degrees(), point.1.to_degrees()))
    }

    /// Project a polygon vertex-by-vertex. Square grid cells stay simple
    /// quadrilaterals under this transform, so no densification is needed.
    pub fn polygon(&self, shape: &Polygon<f64>) -> Result<Polygon<f64>> {
        shape.try_map_coords(|coord: Coord<f64>| {
            let (lon, lat) = self.point(coord.x, coord.y)?;
            Ok(Coord { x: lon, y: lat })
        })
    }
}
