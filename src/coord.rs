//! Tile identifiers, geographic bounding boxes and the conversions between them.
//!
//! Tile addressing follows the slippy map (XYZ) convention: `x` grows eastward from the
//! antimeridian and `y` grows southward from the northern edge of the Web Mercator square.

use std::fmt;

use slippy_map_tilenames::{lonlat2tile, tile2lonlat};

use crate::error::{Error, Result};

/// Highest zoom level the grid math accepts. Tile indexes at this zoom still fit in a `u32`.
pub const MAX_ZOOM: u8 = 30;

/// Northernmost (and, negated, southernmost) latitude representable in Web Mercator.
pub const MAX_LATITUDE: f64 = 85.051_128_779_806_59;

/// The address of a single cell in the tile grid.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileId {
    pub x: u32,
    pub y: u32,
    pub z: u8,
}

impl TileId {
    pub fn new(x: u32, y: u32, z: u8) -> TileId {
        TileId { x, y, z }
    }

    /// Web Mercator bounds of this tile in geographic degrees.
    pub fn bounds(&self) -> BoundingBox {
        WebMercator.bounds_for_tile(*self)
    }
}

impl fmt::Display for TileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.z, self.x, self.y)
    }
}

/// A north/south/east/west rectangle in geographic degrees.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    pub north: f64,
    pub south: f64,
    pub east: f64,
    pub west: f64,
}

impl BoundingBox {
    pub fn new(north: f64, south: f64, east: f64, west: f64) -> BoundingBox {
        BoundingBox {
            north,
            south,
            east,
            west,
        }
    }

    /// Smallest box containing every `[lon, lat]` point.
    ///
    /// Fails on an empty slice, and on any point with a non-finite or out-of-range ordinate.
    pub fn from_points(points: &[[f64; 2]]) -> Result<BoundingBox> {
        let (first, rest) = points.split_first().ok_or_else(|| {
            Error::InconsistentEnvelopeShape("no points to take bounds from".to_string())
        })?;

        for [lon, lat] in points {
            BoundingBox::new(*lat, *lat, *lon, *lon).validate()?;
        }

        let start = BoundingBox::new(first[1], first[1], first[0], first[0]);
        Ok(rest.iter().fold(start, |acc, [lon, lat]| BoundingBox {
            north: acc.north.max(*lat),
            south: acc.south.min(*lat),
            east: acc.east.max(*lon),
            west: acc.west.min(*lon),
        }))
    }

    /// Checks that all edges are finite geographic coordinates and that the box is not
    /// inverted.
    ///
    /// Longitudes must lie in `[-180, 180]` and latitudes in `[-90, 90]`. Boxes crossing the
    /// antimeridian (`east < west`) are rejected as well.
    pub fn validate(&self) -> Result<()> {
        let longitudes = [self.east, self.west]
            .iter()
            .all(|v| (-180.0..=180.0).contains(v));
        let latitudes = [self.north, self.south]
            .iter()
            .all(|v| (-90.0..=90.0).contains(v));

        if longitudes && latitudes && self.north >= self.south && self.east >= self.west {
            Ok(())
        } else {
            Err(self.invalid())
        }
    }

    /// The same box with its latitudes limited to `[-limit, limit]`.
    pub fn clamp_latitude(&self, limit: f64) -> BoundingBox {
        BoundingBox {
            north: self.north.clamp(-limit, limit),
            south: self.south.clamp(-limit, limit),
            ..*self
        }
    }

    pub(crate) fn invalid(&self) -> Error {
        Error::InvalidBoundingBox {
            north: self.north,
            south: self.south,
            east: self.east,
            west: self.west,
        }
    }

    pub fn width(&self) -> f64 {
        self.east - self.west
    }

    pub fn height(&self) -> f64 {
        self.north - self.south
    }

    /// Area in square degrees. Only meaningful for comparing boxes against each other.
    pub fn area(&self) -> f64 {
        self.height() * self.width()
    }

    pub fn contains(&self, other: &BoundingBox) -> bool {
        self.north >= other.north
            && self.south <= other.south
            && self.east >= other.east
            && self.west <= other.west
    }

    /// True when the boxes share interior area; touching edges do not count.
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.west < other.east
            && other.west < self.east
            && self.south < other.north
            && other.south < self.north
    }
}

/// Conversion between geographic points and the cells of a tile grid.
///
/// Implementations must agree with themselves: the bounds of the tile returned for a point
/// always contain that point.
pub trait TileScheme {
    /// The cell containing the point at `zoom`.
    fn tile_for_point(&self, lon: f64, lat: f64, zoom: u8) -> TileId;

    /// The geographic bounds of a cell.
    fn bounds_for_tile(&self, tile: TileId) -> BoundingBox;

    /// Largest valid tile index along either axis at `zoom`.
    fn max_index(&self, zoom: u8) -> u32 {
        ((1u64 << zoom.min(32)) - 1) as u32
    }

    /// Highest absolute latitude the grid covers: the northern edge of the top row.
    fn latitude_limit(&self) -> f64 {
        self.bounds_for_tile(TileId::new(0, 0, 1)).north
    }
}

/// The spherical Web Mercator (EPSG:3857) slippy map grid.
#[derive(Clone, Copy, Debug, Default)]
pub struct WebMercator;

impl TileScheme for WebMercator {
    fn tile_for_point(&self, lon: f64, lat: f64, zoom: u8) -> TileId {
        let clamped_lat = lat.clamp(-MAX_LATITUDE, MAX_LATITUDE);
        if clamped_lat != lat {
            tracing::warn!(
                "Latitude {} is outside the Web Mercator range, clamped to {}",
                lat,
                clamped_lat
            );
        }

        let (x, y) = lonlat2tile(lon, clamped_lat, zoom);
        let max = self.max_index(zoom);

        TileId::new(x.min(max), y.min(max), zoom)
    }

    fn bounds_for_tile(&self, tile: TileId) -> BoundingBox {
        let (west, north) = tile2lonlat(tile.x, tile.y, tile.z);
        let (east, south) = tile2lonlat(tile.x + 1, tile.y + 1, tile.z);

        BoundingBox {
            north,
            south,
            east,
            west,
        }
    }
}

/// Rejects zoom levels the grid cannot be planned at.
///
/// At zoom 0 the whole world is a single cell, which leaves nothing to align against.
pub fn check_zoom(zoom: u8) -> Result<()> {
    if zoom == 0 || zoom > MAX_ZOOM {
        Err(Error::InvalidZoom(zoom))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use assert_approx_eq::assert_approx_eq;

    use super::*;

    #[test]
    fn test_tile_bounds_at_zoom_two() {
        let bounds = TileId::new(2, 1, 2).bounds();

        assert_approx_eq!(0.0, bounds.west);
        assert_approx_eq!(90.0, bounds.east);
        assert_approx_eq!(66.51326044311186, bounds.north);
        assert_approx_eq!(0.0, bounds.south);
    }

    #[test]
    fn test_tile_for_point() {
        assert_eq!(TileId::new(1, 2, 2), WebMercator.tile_for_point(-1.0, -1.0, 2));
        assert_eq!(TileId::new(2, 1, 2), WebMercator.tile_for_point(1.0, 1.0, 2));
    }

    #[test]
    fn test_tile_for_point_clamps_to_grid() {
        let max = WebMercator.max_index(3);
        assert_eq!(7, max);

        assert_eq!(TileId::new(7, 0, 3), WebMercator.tile_for_point(180.0, 89.9, 3));
        assert_eq!(TileId::new(0, 7, 3), WebMercator.tile_for_point(-180.0, -89.9, 3));
    }

    #[test]
    fn test_adjacent_tiles_share_edges() {
        let left = TileId::new(5, 9, 4).bounds();
        let right = TileId::new(6, 9, 4).bounds();
        let below = TileId::new(5, 10, 4).bounds();

        assert_eq!(left.east, right.west);
        assert_eq!(left.south, below.north);
    }

    #[test]
    fn test_validate_bounding_box() {
        assert!(BoundingBox::new(1.0, -1.0, 1.0, -1.0).validate().is_ok());
        assert!(BoundingBox::new(0.0, 0.0, 0.0, 0.0).validate().is_ok());
        assert!(BoundingBox::new(90.0, -90.0, 180.0, -180.0).validate().is_ok());

        assert!(matches!(
            BoundingBox::new(-1.0, 1.0, 1.0, -1.0).validate(),
            Err(Error::InvalidBoundingBox { .. })
        ));
        assert!(matches!(
            BoundingBox::new(1.0, -1.0, 170.0, 190.0).validate(),
            Err(Error::InvalidBoundingBox { .. })
        ));
        assert!(BoundingBox::new(f64::NAN, 0.0, 1.0, 0.0).validate().is_err());
        assert!(BoundingBox::new(f64::INFINITY, 0.0, 1.0, 0.0).validate().is_err());
    }

    #[test]
    fn test_validate_rejects_out_of_range_coordinates() {
        for bbox in [
            BoundingBox::new(1.0, -1.0, 200.0, 170.0),
            BoundingBox::new(1.0, -1.0, -170.0, -180.5),
            BoundingBox::new(91.0, 0.0, 1.0, -1.0),
            BoundingBox::new(0.0, -90.5, 1.0, -1.0),
        ] {
            assert!(
                matches!(bbox.validate(), Err(Error::InvalidBoundingBox { .. })),
                "{:?} should be rejected",
                bbox
            );
        }
    }

    #[test]
    fn test_clamp_latitude() {
        let world = BoundingBox::new(90.0, -90.0, 180.0, -180.0).clamp_latitude(MAX_LATITUDE);

        assert_eq!(BoundingBox::new(MAX_LATITUDE, -MAX_LATITUDE, 180.0, -180.0), world);
        assert_approx_eq!(MAX_LATITUDE, WebMercator.latitude_limit());
        assert_eq!(
            WebMercator.latitude_limit(),
            TileId::new(5, 0, 9).bounds().north
        );

        let inside = BoundingBox::new(10.0, -10.0, 5.0, -5.0);
        assert_eq!(inside, inside.clamp_latitude(MAX_LATITUDE));
    }

    #[test]
    fn test_from_points() {
        let ring = [[-10.0, 20.0], [-10.0, 40.0], [30.0, 40.0], [30.0, 20.0], [-10.0, 20.0]];
        let bounds = BoundingBox::from_points(&ring).unwrap();

        assert_eq!(BoundingBox::new(40.0, 20.0, 30.0, -10.0), bounds);
        assert_eq!(800.0, bounds.area());
        assert!(matches!(
            BoundingBox::from_points(&[]),
            Err(Error::InconsistentEnvelopeShape(_))
        ));
    }

    #[test]
    fn test_from_points_rejects_non_finite_ordinates() {
        for bad in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let middle = BoundingBox::from_points(&[[0.0, 0.0], [bad, 0.0], [1.0, 1.0]]);
            assert!(matches!(middle, Err(Error::InvalidBoundingBox { .. })));

            let first = BoundingBox::from_points(&[[0.0, bad], [1.0, 1.0]]);
            assert!(matches!(first, Err(Error::InvalidBoundingBox { .. })));
        }

        assert!(BoundingBox::from_points(&[[0.0, 0.0], [181.0, 0.0]]).is_err());
    }

    #[test]
    fn test_contains_and_intersects() {
        let outer = BoundingBox::new(10.0, -10.0, 10.0, -10.0);
        let inner = BoundingBox::new(1.0, -1.0, 1.0, -1.0);
        let touching = BoundingBox::new(10.0, -10.0, 20.0, 10.0);

        assert!(outer.contains(&inner));
        assert!(!inner.contains(&outer));
        assert!(outer.intersects(&inner));
        assert!(!outer.intersects(&touching));
    }

    #[test]
    fn test_check_zoom() {
        assert!(check_zoom(0).is_err());
        assert!(check_zoom(1).is_ok());
        assert!(check_zoom(MAX_ZOOM).is_ok());
        assert!(check_zoom(MAX_ZOOM + 1).is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!("4/5/9", TileId::new(5, 9, 4).to_string());
    }
}
