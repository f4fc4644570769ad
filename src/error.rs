#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Malformed extent string {input:?}: {reason}")]
    MalformedExtent { input: String, reason: String },

    #[error("Invalid bounding box (north {north}, south {south}, east {east}, west {west})")]
    InvalidBoundingBox {
        north: f64,
        south: f64,
        east: f64,
        west: f64,
    },

    #[error("Inconsistent envelope shape: {0}")]
    InconsistentEnvelopeShape(String),

    #[error("Zoom level {0} is outside the supported range 1..={max}", max = crate::coord::MAX_ZOOM)]
    InvalidZoom(u8),

    #[error("Covering the extent at zoom {zoom} needs {count} tiles, more than the limit of {limit}")]
    TooManyTiles { count: u64, zoom: u8, limit: u64 },

    #[error("Table {0} has no geometries to compute an extent from")]
    EmptyDataset(String),

    #[error("Invalid SQL identifier {0:?}")]
    InvalidIdentifier(String),

    #[error("Column {column} has unsupported type {type_name}")]
    UnsupportedColumnType { column: String, type_name: String },

    #[error("Invalid feature query: {0}")]
    InvalidQuery(String),

    #[error("Invalid source configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid GeoJSON from the database.")]
    GeoJson(#[from] serde_json::Error),

    #[error("Invalid YAML in source configuration.")]
    Config(#[from] serde_yaml::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl Error {
    /// Whether retrying the failed operation could succeed.
    ///
    /// Only transient database failures qualify. Everything else describes the shape of the
    /// data or configuration and fails the same way every time.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Database(sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
