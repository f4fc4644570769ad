//! Snapping extents to the tile grid and enumerating the tiles that cover them.

use crate::coord::{check_zoom, BoundingBox, TileId, TileScheme};
use crate::error::{Error, Result};

/// Largest number of tiles [`enumerate`] will materialize.
pub const MAX_TILES: u64 = 1 << 22;

/// Snaps `bbox` outward to the enclosing tile-grid lines at `zoom`.
///
/// The result contains `bbox`, and every edge of it coincides with a grid line. A box whose
/// edges already sit on grid lines comes back unchanged.
///
/// Boxes reaching beyond the scheme's [`TileScheme::latitude_limit`] are rejected with
/// `InvalidBoundingBox`; clamp them with [`BoundingBox::clamp_latitude`] first.
pub fn align<S: TileScheme + ?Sized>(
    scheme: &S,
    bbox: &BoundingBox,
    zoom: u8,
) -> Result<BoundingBox> {
    let (south_west, north_east) = corner_tiles(scheme, bbox, zoom)?;
    let south_west = scheme.bounds_for_tile(south_west);
    let north_east = scheme.bounds_for_tile(north_east);

    Ok(BoundingBox {
        north: north_east.north,
        south: south_west.south,
        east: north_east.east,
        west: south_west.west,
    })
}

/// Every tile covering `bbox` at `zoom`, rows south to north and west to east within a row.
///
/// The box is aligned first, so callers may pass arbitrary extents. Fails with
/// `TooManyTiles` when more than [`MAX_TILES`] tiles would be needed.
pub fn enumerate<S: TileScheme + ?Sized>(
    scheme: &S,
    bbox: &BoundingBox,
    zoom: u8,
) -> Result<Vec<TileId>> {
    enumerate_with_limit(scheme, bbox, zoom, MAX_TILES)
}

/// Like [`enumerate`], with a caller-chosen cap on the number of tiles.
pub fn enumerate_with_limit<S: TileScheme + ?Sized>(
    scheme: &S,
    bbox: &BoundingBox,
    zoom: u8,
    limit: u64,
) -> Result<Vec<TileId>> {
    let aligned = align(scheme, bbox, zoom)?;
    let range = TileRange::covering(scheme, &aligned, zoom)?;

    let count = range.tile_count();
    if count > limit {
        return Err(Error::TooManyTiles { count, zoom, limit });
    }

    let tiles: Vec<TileId> = range.tiles().collect();

    tracing::debug!(
        "Enumerated {} tiles ({} columns x {} rows) at zoom {}",
        tiles.len(),
        range.columns(),
        range.rows(),
        zoom
    );

    Ok(tiles)
}

/// An inclusive rectangle of tile indexes at a single zoom level.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TileRange {
    pub zoom: u8,
    pub min_x: u32,
    pub max_x: u32,
    /// Northernmost row.
    pub min_y: u32,
    /// Southernmost row.
    pub max_y: u32,
}

impl TileRange {
    /// The tiles spanned by the corner cells of `bbox`.
    pub fn covering<S: TileScheme + ?Sized>(
        scheme: &S,
        bbox: &BoundingBox,
        zoom: u8,
    ) -> Result<TileRange> {
        let (south_west, north_east) = corner_tiles(scheme, bbox, zoom)?;

        Ok(TileRange {
            zoom,
            min_x: south_west.x,
            max_x: north_east.x,
            min_y: north_east.y,
            max_y: south_west.y,
        })
    }

    pub fn columns(&self) -> u64 {
        u64::from(self.max_x - self.min_x) + 1
    }

    pub fn rows(&self) -> u64 {
        u64::from(self.max_y - self.min_y) + 1
    }

    pub fn tile_count(&self) -> u64 {
        self.columns() * self.rows()
    }

    /// Width and height in degrees of the south-west cell.
    ///
    /// Widths are uniform across a row, but Web Mercator cell heights shrink toward the
    /// poles, so the height only describes the southernmost row.
    pub fn cell_size<S: TileScheme + ?Sized>(&self, scheme: &S) -> (f64, f64) {
        let cell = scheme.bounds_for_tile(TileId::new(self.min_x, self.max_y, self.zoom));
        (cell.width(), cell.height())
    }

    /// Row-major walk from the south-west tile, stepping by whole tile indexes.
    pub fn tiles(&self) -> impl Iterator<Item = TileId> {
        let range = *self;

        (range.min_y..=range.max_y).rev().flat_map(move |y| {
            (range.min_x..=range.max_x).map(move |x| TileId::new(x, y, range.zoom))
        })
    }
}

/// The south-west and north-east cells of `bbox`.
///
/// A corner sitting exactly on a grid line touches two cells; the one inside the box wins,
/// unless that would put the north-east cell west or south of the south-west one.
fn corner_tiles<S: TileScheme + ?Sized>(
    scheme: &S,
    bbox: &BoundingBox,
    zoom: u8,
) -> Result<(TileId, TileId)> {
    check_zoom(zoom)?;
    bbox.validate()?;

    let limit = scheme.latitude_limit();
    if bbox.north > limit || bbox.south < -limit {
        return Err(bbox.invalid());
    }

    let max = scheme.max_index(zoom);

    let mut south_west = scheme.tile_for_point(bbox.west, bbox.south, zoom);
    let cell = scheme.bounds_for_tile(south_west);
    if cell.west > bbox.west && south_west.x > 0 {
        south_west.x -= 1;
    } else if cell.east <= bbox.west && south_west.x < max {
        south_west.x += 1;
    }
    if cell.south > bbox.south && south_west.y < max {
        south_west.y += 1;
    } else if cell.north <= bbox.south && south_west.y > 0 {
        south_west.y -= 1;
    }

    let mut north_east = scheme.tile_for_point(bbox.east, bbox.north, zoom);
    let cell = scheme.bounds_for_tile(north_east);
    if cell.east < bbox.east && north_east.x < max {
        north_east.x += 1;
    } else if cell.west >= bbox.east && north_east.x > 0 {
        north_east.x -= 1;
    }
    if cell.north < bbox.north && north_east.y > 0 {
        north_east.y -= 1;
    } else if cell.south >= bbox.north && north_east.y < max {
        north_east.y += 1;
    }

    north_east.x = north_east.x.max(south_west.x);
    north_east.y = north_east.y.min(south_west.y);

    Ok((south_west, north_east))
}
