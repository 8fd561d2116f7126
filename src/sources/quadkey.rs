use anyhow::{anyhow, Result};
use geo::{Coord, LineString, Polygon};

use super::{SourceCrs, SourcePolygon};

/// Web-mercator tile address decoded from a base-4 quadkey path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tile {
    pub x: u32,
    pub y: u32,
    pub z: u8,
}

/// Decode a quadkey string ("0".."3" per zoom level) into its tile.
pub fn tile_from_quadkey(quadkey: &str) -> Result<Tile> {
    if quadkey.is_empty() || quadkey.len() > 23 {
        return Err(anyhow!("quadkey length out of range: {quadkey:?}"));
    }

    let mut x: u32 = 0;
    let mut y: u32 = 0;
    for ch in quadkey.chars() {
        x <<= 1;
        y <<= 1;
        match ch {
            '0' => {}
            '1' => x |= 1,
            '2' => y |= 1,
            '3' => {
                x |= 1;
                y |= 1;
            }
            _ => return Err(anyhow!("invalid quadkey digit {ch:?} in {quadkey:?}")),
        }
    }

    Ok(Tile { x, y, z: quadkey.len() as u8 })
}

/// Geographic bounds of a tile as (west, south, east, north) degrees.
pub fn tile_bounds(tile: Tile) -> (f64, f64, f64, f64) {
    let n = f64::from(1u32 << tile.z);
    let lon = |x: f64| x / n * 360.0 - 180.0;
    let lat = |y: f64| {
        let t = std::f64::consts::PI * (1.0 - 2.0 * y / n);
        t.sinh().atan().to_degrees()
    };
    (
        lon(f64::from(tile.x)),
        lat(f64::from(tile.y + 1)),
        lon(f64::from(tile.x + 1)),
        lat(f64::from(tile.y)),
    )
}

/// Decode a quadkey into its tile's lon/lat bounding-box polygon.
/// Degree-space areas of these boxes only ever enter weight ratios, so the
/// non-equal-area distortion cancels out.
pub fn parse_quadkey(quadkey: &str) -> Result<SourcePolygon> {
    let tile = tile_from_quadkey(quadkey)?;
    let (west, south, east, north) = tile_bounds(tile);

    let boundary = Polygon::new(
        LineString::new(vec![
            Coord { x: west, y: south },
            Coord { x: east, y: south },
            Coord { x: east, y: north },
            Coord { x: west, y: north },
            Coord { x: west, y: south },
        ]),
        vec![],
    );

    Ok(SourcePolygon::new(quadkey, boundary, SourceCrs::Wgs84))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn single_digit_quadkeys_cover_the_four_hemiquads() {
        let tile = tile_from_quadkey("0").unwrap();
        assert_eq!(tile, Tile { x: 0, y: 0, z: 1 });
        let (west, south, east, north) = tile_bounds(tile);
        assert_relative_eq!(west, -180.0);
        assert_relative_eq!(east, 0.0);
        assert_relative_eq!(south, 0.0, epsilon = 1e-12);
        assert_relative_eq!(north, 85.05112877980659, epsilon = 1e-9);

        let tile = tile_from_quadkey("3").unwrap();
        assert_eq!(tile, Tile { x: 1, y: 1, z: 1 });
    }

    #[test]
    fn deeper_quadkeys_nest_inside_their_parent() {
        let parent = tile_bounds(tile_from_quadkey("120").unwrap());
        let child = tile_bounds(tile_from_quadkey("1202").unwrap());
        assert!(child.0 >= parent.0 && child.2 <= parent.2);
        assert!(child.1 >= parent.1 && child.3 <= parent.3);
    }

    #[test]
    fn invalid_digits_and_empty_keys_are_rejected() {
        assert!(tile_from_quadkey("").is_err());
        assert!(tile_from_quadkey("0124x").is_err());
    }
}
