//! PostGIS-backed extents and features.
//!
//! Every call takes a caller-owned connection; nothing here opens or pools connections.

use async_trait::async_trait;
use futures::TryStreamExt;
use serde::Deserialize;
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::query::Query;
use sqlx::types::chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use sqlx::types::Uuid;
use sqlx::{Column, PgConnection, Postgres, Row, TypeInfo};

use crate::config::SourceConfig;
use crate::coord::{BoundingBox, TileId};
use crate::error::{Error, Result};
use crate::feature::{Feature, FeatureCollection, Properties, PropertyValue};
use crate::rank::Extent;
use crate::ExtentSource;

const WGS84: i32 = 4326;

/// Parses the text form of a PostGIS `box2d`, e.g. `BOX(-10 20,30 40)`.
///
/// The four numbers are west, south, east and north, in that order.
pub fn parse_box2d(text: &str) -> Result<BoundingBox> {
    let malformed = |reason: &str| Error::MalformedExtent {
        input: text.to_string(),
        reason: reason.to_string(),
    };

    let inner = text
        .trim()
        .strip_prefix("BOX(")
        .and_then(|rest| rest.strip_suffix(')'))
        .ok_or_else(|| malformed("expected BOX(<west> <south>,<east> <north>)"))?;

    let values = inner
        .replacen(',', " ", 1)
        .split_whitespace()
        .map(|token| {
            token
                .parse::<f64>()
                .map_err(|e| malformed(&format!("{:?} is not a number: {}", token, e)))
        })
        .collect::<Result<Vec<f64>>>()?;

    match values[..] {
        [west, south, east, north] => {
            let bbox = BoundingBox::new(north, south, east, west);
            bbox.validate()?;
            Ok(bbox)
        }
        _ => Err(malformed(&format!(
            "expected 4 coordinates, found {}",
            values.len()
        ))),
    }
}

#[derive(Deserialize)]
#[serde(tag = "type")]
enum EnvelopeGeometry {
    Point { coordinates: Vec<f64> },
    LineString { coordinates: Vec<Vec<f64>> },
    Polygon { coordinates: Vec<Vec<Vec<f64>>> },
}

fn position(ordinates: &[f64]) -> Result<[f64; 2]> {
    match ordinates {
        [lon, lat, ..] => Ok([*lon, *lat]),
        _ => Err(Error::InconsistentEnvelopeShape(format!(
            "position has {} ordinates",
            ordinates.len()
        ))),
    }
}

fn positions(ordinates: &[Vec<f64>]) -> Result<Vec<[f64; 2]>> {
    ordinates.iter().map(|p| position(p)).collect()
}

/// Builds an extent from the GeoJSON of an `ST_Envelope` result.
///
/// PostGIS collapses the envelope of a point to a `Point` and that of an axis-parallel line
/// to a `LineString`; both yield zero-area extents. Polygon envelopes go through the ring
/// checks in [`Extent::from_ring`].
pub fn envelope_extent<K>(key: K, geojson: &str) -> Result<Extent<K>> {
    let geometry: EnvelopeGeometry = serde_json::from_str(geojson)?;

    match geometry {
        EnvelopeGeometry::Polygon { coordinates } => {
            let ring = coordinates.first().ok_or_else(|| {
                Error::InconsistentEnvelopeShape("polygon has no rings".to_string())
            })?;
            Extent::from_ring(key, &positions(ring)?)
        }
        EnvelopeGeometry::LineString { coordinates } => {
            let bounds = BoundingBox::from_points(&positions(&coordinates)?)?;
            Extent::new(key, bounds)
        }
        EnvelopeGeometry::Point { coordinates } => {
            let [lon, lat] = position(&coordinates)?;
            Extent::new(key, BoundingBox::new(lat, lat, lon, lon))
        }
    }
}

/// Decodes one column of a row into a property value.
///
/// UUIDs and timestamps become strings. Anything else outside the closed set of property
/// types is an error; cast such columns in SQL.
pub fn decode_column(row: &PgRow, index: usize) -> Result<PropertyValue> {
    let column = row.try_column(index)?;

    let value: PropertyValue = match column.type_info().name() {
        "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" => row.try_get::<Option<String>, _>(index)?.into(),
        "INT2" => row.try_get::<Option<i16>, _>(index)?.map(i64::from).into(),
        "INT4" => row.try_get::<Option<i32>, _>(index)?.map(i64::from).into(),
        "INT8" => row.try_get::<Option<i64>, _>(index)?.into(),
        "FLOAT4" => row.try_get::<Option<f32>, _>(index)?.map(f64::from).into(),
        "FLOAT8" => row.try_get::<Option<f64>, _>(index)?.into(),
        "BOOL" => row.try_get::<Option<bool>, _>(index)?.into(),
        "UUID" => row
            .try_get::<Option<Uuid>, _>(index)?
            .map(|v| v.to_string())
            .into(),
        "TIMESTAMPTZ" => row
            .try_get::<Option<DateTime<Utc>>, _>(index)?
            .map(|v| v.to_rfc3339())
            .into(),
        "TIMESTAMP" => row
            .try_get::<Option<NaiveDateTime>, _>(index)?
            .map(|v| v.to_string())
            .into(),
        "DATE" => row
            .try_get::<Option<NaiveDate>, _>(index)?
            .map(|v| v.to_string())
            .into(),
        other => {
            return Err(Error::UnsupportedColumnType {
                column: column.name().to_string(),
                type_name: other.to_string(),
            })
        }
    };

    Ok(value)
}

/// Runs a query whose last column is a geometry rendered with `ST_AsGeoJSON`.
///
/// Every other column becomes a feature property, keyed by column name.
pub async fn fetch_features<'q>(
    conn: &mut PgConnection,
    query: Query<'q, Postgres, PgArguments>,
) -> Result<FeatureCollection> {
    let mut collection = FeatureCollection::default();
    let mut rows = query.fetch(conn);

    while let Some(row) = rows.try_next().await? {
        let geometry_index = row
            .len()
            .checked_sub(1)
            .ok_or_else(|| Error::InvalidQuery("query returned no columns".to_string()))?;

        let mut properties = Properties::new();
        for index in 0..geometry_index {
            let name = row.try_column(index)?.name().to_string();
            properties.insert(name, decode_column(&row, index)?);
        }

        let geometry = match row.try_get::<Option<String>, _>(geometry_index)? {
            Some(geojson) => serde_json::from_str(&geojson)?,
            None => serde_json::Value::Null,
        };

        collection.features.push(Feature {
            geometry,
            properties,
        });
    }

    Ok(collection)
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// A single PostGIS table described by a [`SourceConfig`].
#[derive(Clone, Debug)]
pub struct PostGisSource {
    config: SourceConfig,
}

impl PostGisSource {
    pub fn new(config: SourceConfig) -> Result<PostGisSource> {
        config.validate()?;
        Ok(PostGisSource { config })
    }

    pub fn config(&self) -> &SourceConfig {
        &self.config
    }

    fn table(&self) -> String {
        self.config
            .table
            .split('.')
            .map(quote_ident)
            .collect::<Vec<_>>()
            .join(".")
    }

    fn geometry(&self) -> String {
        format!("{}.{}", self.table(), quote_ident(&self.config.geometry_column))
    }

    /// The geometry column in geographic coordinates.
    fn geographic_geometry(&self) -> String {
        if self.config.srid == WGS84 {
            self.geometry()
        } else {
            format!("ST_Transform({}, {})", self.geometry(), WGS84)
        }
    }

    fn extent_sql(&self) -> String {
        format!(
            "SELECT ST_Extent({})::text AS table_extent FROM {}",
            self.geographic_geometry(),
            self.table()
        )
    }

    fn count_sql(&self) -> String {
        format!("SELECT COUNT(*) AS count FROM {}", self.table())
    }

    fn envelopes_sql(&self) -> String {
        format!(
            "SELECT {}, ST_AsGeoJSON(ST_Envelope({})) FROM {} WHERE {} IS NOT NULL AND NOT ST_IsEmpty({})",
            quote_ident(&self.config.unique_column),
            self.geographic_geometry(),
            self.table(),
            self.geometry(),
            self.geometry()
        )
    }

    /// Predicate matching rows whose geometry overlaps a tile. The tile's west, south, east
    /// and north edges in degrees are bound as `$1` to `$4`.
    pub fn bbox_filter_sql(&self) -> String {
        let envelope = format!("ST_MakeEnvelope($1, $2, $3, $4, {})", WGS84);
        let envelope = if self.config.srid == WGS84 {
            envelope
        } else {
            format!("ST_Transform({}, {})", envelope, self.config.srid)
        };

        format!("({} && {})", self.geometry(), envelope)
    }

    fn tile_features_sql(&self) -> String {
        let mut columns = vec![quote_ident(&self.config.unique_column)];
        columns.extend(
            self.config
                .properties
                .iter()
                .filter(|column| **column != self.config.unique_column)
                .map(|column| quote_ident(column)),
        );
        columns.push(format!("ST_AsGeoJSON({})", self.geographic_geometry()));

        format!(
            "SELECT {} FROM {} WHERE {}",
            columns.join(", "),
            self.table(),
            self.bbox_filter_sql()
        )
    }
}

#[async_trait]
impl ExtentSource for PostGisSource {
    async fn extent(&self, conn: &mut PgConnection) -> Result<BoundingBox> {
        let sql = self.extent_sql();
        tracing::debug!("Fetching extent of {}: {}", self.config.name, sql);

        let extent: Option<String> = sqlx::query_scalar(&sql).fetch_one(&mut *conn).await?;
        match extent {
            Some(text) => parse_box2d(&text),
            None => Err(Error::EmptyDataset(self.config.table.clone())),
        }
    }

    async fn row_count(&self, conn: &mut PgConnection) -> Result<i64> {
        let sql = self.count_sql();
        tracing::debug!("Counting rows of {}: {}", self.config.name, sql);

        let count: i64 = sqlx::query_scalar(&sql).fetch_one(&mut *conn).await?;
        Ok(count)
    }

    async fn feature_extents(&self, conn: &mut PgConnection) -> Result<Vec<Extent<PropertyValue>>> {
        let sql = self.envelopes_sql();
        tracing::debug!("Fetching feature envelopes of {}: {}", self.config.name, sql);

        let mut extents = Vec::new();
        let mut rows = sqlx::query(&sql).fetch(&mut *conn);
        while let Some(row) = rows.try_next().await? {
            let key = decode_column(&row, 0)?;
            let envelope: String = row.try_get(1)?;
            extents.push(envelope_extent(key, &envelope)?);
        }

        Ok(extents)
    }

    async fn features_in_tile(
        &self,
        conn: &mut PgConnection,
        tile: TileId,
    ) -> Result<FeatureCollection> {
        let bounds = tile.bounds();
        let sql = self.tile_features_sql();
        tracing::debug!("Fetching features of {} in tile {}: {}", self.config.name, tile, sql);

        let query = sqlx::query(&sql)
            .bind(bounds.west)
            .bind(bounds.south)
            .bind(bounds.east)
            .bind(bounds.north);

        fetch_features(conn, query).await
    }
}
