//! YAML description of a PostGIS-backed layer.
//!
//! ```yaml
//! name: Counties
//! table: public.counties
//! geometry: geom
//! unique: gid
//! properties: [name, population]
//! srid: 4326
//! minzoom: 3
//! maxzoom: 12
//! ```
use serde::Deserialize;

use crate::coord::{check_zoom, MAX_ZOOM};
use crate::error::{Error, Result};

/// A PostGIS table served as a tile layer.
#[derive(Clone, Deserialize, Debug, PartialEq)]
pub struct SourceConfig {
    pub name: String,
    /// Table name, optionally qualified with its schema.
    pub table: String,
    #[serde(rename = "geometry", default = "default_geometry_column")]
    pub geometry_column: String,
    #[serde(rename = "unique")]
    pub unique_column: String,
    /// Attribute columns copied into feature properties.
    #[serde(default)]
    pub properties: Vec<String>,
    #[serde(default = "default_srid")]
    pub srid: i32,
    #[serde(rename = "minzoom")]
    pub min_zoom: u8,
    #[serde(rename = "maxzoom", default = "default_max_zoom")]
    pub max_zoom: u8,
}

fn default_geometry_column() -> String {
    String::from("geom")
}

fn default_srid() -> i32 {
    4326
}

fn default_max_zoom() -> u8 {
    MAX_ZOOM
}

impl SourceConfig {
    /// Parses and validates a source description from a YAML string.
    pub fn from_yaml(data: &str) -> Result<SourceConfig> {
        let mut result: SourceConfig = serde_yaml::from_str(data)?;

        result.table = result.table.trim().to_string();
        result.validate()?;

        Ok(result)
    }

    /// Every name that ends up in generated SQL must be a plain identifier, and the zoom
    /// range must be one the grid can be planned at.
    pub fn validate(&self) -> Result<()> {
        for part in self.table.splitn(2, '.') {
            check_identifier(part)?;
        }

        check_identifier(&self.geometry_column)?;
        check_identifier(&self.unique_column)?;
        for column in &self.properties {
            check_identifier(column)?;
        }

        check_zoom(self.min_zoom)?;
        check_zoom(self.max_zoom)?;
        if self.min_zoom > self.max_zoom {
            return Err(Error::InvalidConfig(format!(
                "minzoom {} is above maxzoom {}",
                self.min_zoom, self.max_zoom
            )));
        }

        Ok(())
    }
}

fn is_valid_identifier(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 63
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        && name
            .chars()
            .next()
            .map_or(false, |c| c.is_ascii_alphabetic() || c == '_')
}

fn check_identifier(name: &str) -> Result<()> {
    if is_valid_identifier(name) {
        Ok(())
    } else {
        Err(Error::InvalidIdentifier(name.to_string()))
    }
}
