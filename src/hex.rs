use geo::{Coord, LineString, Polygon};
use h3o::{CellIndex, LatLng, Resolution};

use crate::error::PipelineError;

/// Every artifact in the pipeline lives at this H3 resolution.
/// Matrix loads verify it; mixing resolutions is a structural error.
pub const HEX_RESOLUTION: Resolution = Resolution::Eight;

/// Map a geographic point to its containing cell at [`HEX_RESOLUTION`].
/// Out-of-range angles are rejected rather than wrapped.
pub fn cell_from_point(lat: f64, lon: f64) -> Result<CellIndex, PipelineError> {
    if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
        return Err(PipelineError::InvalidCoordinate { lat, lon });
    }
    let point = LatLng::new(lat, lon)
        .map_err(|_| PipelineError::InvalidCoordinate { lat, lon })?;
    Ok(point.to_cell(HEX_RESOLUTION))
}

/// Boundary ring of a cell as a lon/lat polygon (x = lon, y = lat).
pub fn cell_boundary(cell: CellIndex) -> Polygon<f64> {
    let ring: Vec<Coord<f64>> = cell
        .boundary()
        .iter()
        .map(|vertex| Coord { x: vertex.lng(), y: vertex.lat() })
        .collect();
    Polygon::new(LineString::new(ring), vec![])
}

/// Centroid of a cell as (lat, lon) degrees.
pub fn cell_centroid(cell: CellIndex) -> (f64, f64) {
    let center = LatLng::from(cell);
    (center.lat(), center.lng())
}

/// All cells within `k` grid steps of `cell`, including `cell` itself.
pub fn neighbors(cell: CellIndex, k: u32) -> Vec<CellIndex> {
    cell.grid_disk::<Vec<_>>(k)
}
