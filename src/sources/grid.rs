use std::sync::LazyLock;

use anyhow::{anyhow, Result};
use geo::{Coord, LineString, Polygon};
use regex::Regex;

use super::{SourceCrs, SourcePolygon};

/// Eurostat census grid identifier, e.g. `CRS3035RES1000mN2684000E4334000`:
/// resolution in meters, then the south-west corner as northing/easting.
static GRD_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^CRS3035RES(\d+)mN(\d+)E(\d+)$").expect("valid grid-id regex"));

/// Decode a `GRD_ID` into its square cell polygon in EPSG:3035 meters.
/// The identifier itself carries the full geometry, so no geometry file
/// is needed to rebuild the weight matrix.
pub fn parse_grid_id(grid_id: &str) -> Result<SourcePolygon> {
    let caps = GRD_ID
        .captures(grid_id)
        .ok_or_else(|| anyhow!("malformed grid id: {grid_id}"))?;

    let res: f64 = caps[1].parse()?;
    let north: f64 = caps[2].parse()?;
    let east: f64 = caps[3].parse()?;
    if res <= 0.0 {
        return Err(anyhow!("non-positive grid resolution in id: {grid_id}"));
    }

    let square = Polygon::new(
        LineString::new(vec![
            Coord { x: east, y: north },
            Coord { x: east + res, y: north },
            Coord { x: east + res, y: north + res },
            Coord { x: east, y: north + res },
            Coord { x: east, y: north },
        ]),
        vec![],
    );

    Ok(SourcePolygon::new(grid_id, square, SourceCrs::LaeaEurope))
}
