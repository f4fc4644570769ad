//! # Tile Scout
//!
//! Tools for planning the tiles of a PostGIS vector tile source.
//!
//! ## Current features
//!
//! Given a PostGIS table, this crate will
//!
//! * compute the geographic extent of the dataset,
//! * snap that extent outward to the slippy map tile grid at a chosen zoom level,
//! * enumerate every tile covering the snapped extent, and
//! * rank individual features by the area of their envelopes, so the largest features can
//!   be served first at coarse zoom levels.
//!
//! The grid math in [`grid`] and [`rank`] is pure and synchronous. Database access lives
//! behind the [`ExtentSource`] trait and always runs on a connection owned by the caller.
//!
//! ## Known Limitations
//!
//! Bounding boxes crossing the antimeridian are rejected rather than split. Tiles are
//! addressed in the Web Mercator grid, so dataset extents beyond ±85.0511° are clamped before
//! planning. A plan is capped at [`grid::MAX_TILES`] tiles. Areas are
//! computed in square degrees, which is good enough for ranking but is not a true geodesic
//! area.

#![deny(warnings)]

use async_trait::async_trait;

use sqlx::PgConnection;

pub mod config;
pub mod coord;
pub mod error;
pub mod feature;
pub mod grid;
pub mod postgis;
pub mod rank;

pub use crate::config::SourceConfig;
pub use crate::coord::{BoundingBox, TileId, TileScheme, WebMercator};
pub use crate::error::{Error, Result};
pub use crate::feature::{Feature, FeatureCollection, Properties, PropertyValue};
pub use crate::grid::TileRange;
pub use crate::postgis::PostGisSource;
pub use crate::rank::Extent;

/// Overall extent and size of a dataset.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DatasetSummary {
    pub extent: BoundingBox,
    pub row_count: i64,
}

/// The tiles needed to cover a dataset at one zoom level.
#[derive(Clone, Debug, PartialEq)]
pub struct TilePlan {
    pub zoom: u8,
    /// Extent as reported by the database.
    pub extent: BoundingBox,
    /// Extent snapped to the tile grid.
    pub aligned: BoundingBox,
    pub row_count: i64,
    /// Rows south to north, west to east within a row. Treat it as a set.
    pub tiles: Vec<TileId>,
}

impl TilePlan {
    /// Plans the Web Mercator tiles covering `summary.extent` at `zoom`.
    ///
    /// The extent is clamped to the latitudes the grid covers before it is aligned.
    pub fn for_summary(summary: DatasetSummary, zoom: u8) -> Result<TilePlan> {
        coord::check_zoom(zoom)?;

        let extent = summary.extent;
        let clamped = extent.clamp_latitude(WebMercator.latitude_limit());
        if clamped != extent {
            tracing::warn!(
                "Extent {:?} reaches past the Web Mercator grid, clamped to {:?}",
                extent,
                clamped
            );
        }

        let aligned = grid::align(&WebMercator, &clamped, zoom)?;
        let tiles = grid::enumerate(&WebMercator, &aligned, zoom)?;

        tracing::info!(
            "Planned {} tiles at zoom {} for {} rows",
            tiles.len(),
            zoom,
            summary.row_count
        );

        Ok(TilePlan {
            zoom,
            extent,
            aligned,
            row_count: summary.row_count,
            tiles,
        })
    }
}

/// A source of dataset extents and features.
///
/// Callers own the connection; implementations must not keep it past the call.
#[async_trait]
pub trait ExtentSource: Send + Sync {
    /// The geographic bounding box of every geometry in the dataset.
    async fn extent(&self, conn: &mut PgConnection) -> Result<BoundingBox>;

    async fn row_count(&self, conn: &mut PgConnection) -> Result<i64>;

    /// One extent per feature, in the order the database returned them.
    async fn feature_extents(&self, conn: &mut PgConnection) -> Result<Vec<Extent<PropertyValue>>>;

    /// Features whose geometry overlaps the tile's bounds. Geometries are not clipped.
    async fn features_in_tile(
        &self,
        conn: &mut PgConnection,
        tile: TileId,
    ) -> Result<FeatureCollection>;

    async fn summary(&self, conn: &mut PgConnection) -> Result<DatasetSummary> {
        let extent = self.extent(&mut *conn).await?;
        let row_count = self.row_count(conn).await?;

        Ok(DatasetSummary { extent, row_count })
    }

    /// Feature extents, largest area first.
    async fn ranked_extents(&self, conn: &mut PgConnection) -> Result<Vec<Extent<PropertyValue>>> {
        let extents = self.feature_extents(conn).await?;
        Ok(rank::rank(extents))
    }

    /// Aligns the dataset extent to the grid at `zoom` and lists the tiles covering it.
    async fn plan_tiles(&self, conn: &mut PgConnection, zoom: u8) -> Result<TilePlan> {
        coord::check_zoom(zoom)?;

        let summary = self.summary(conn).await?;
        TilePlan::for_summary(summary, zoom)
    }
}
