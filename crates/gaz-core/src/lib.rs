//! Core domain model for the gazetteer: location rows, remote feature rows,
//! remap rows and per-table source configuration.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const CRATE_NAME: &str = "gaz-core";

/// Surrogate identifier assigned by the store, stable across syncs.
pub type LocationId = u64;

/// A GeoJSON geometry carried in its serialized text form, exactly as the
/// remote provider hands it over. The store never interprets coordinates;
/// only the type tag matters for column selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Geometry(String);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeometryKind {
    Point,
    Polygon,
}

impl Geometry {
    pub fn new(geojson: impl Into<String>) -> Self {
        Self(geojson.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Point-like geometries (`Point`, `MultiPoint`) land in the `point`
    /// column, everything else in `geom`.
    pub fn kind(&self) -> GeometryKind {
        let tag = serde_json::from_str::<serde_json::Value>(&self.0)
            .ok()
            .and_then(|v| v.get("type").and_then(|t| t.as_str()).map(String::from));
        match tag {
            Some(tag) if tag.contains("Point") => GeometryKind::Point,
            Some(_) => GeometryKind::Polygon,
            // Unparseable payloads fall back to the raw text tag.
            None if self.0.contains("Point") => GeometryKind::Point,
            None => GeometryKind::Polygon,
        }
    }
}

impl fmt::Display for Geometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One feature row fetched from a remote provider. Transient: consumed by a
/// single synchronization pass, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
    pub pcode: String,
    pub name: String,
    #[serde(default)]
    pub parent_code: Option<String>,
    #[serde(default)]
    pub geometry: Option<Geometry>,
}

/// One row of a provider remap table. `matching` defaults to true because
/// table-driven remap feeds (ArcGIS) carry no such column: every row there
/// is a rename.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemapRow {
    pub old_pcode: String,
    pub new_pcode: String,
    #[serde(default = "default_matching")]
    pub matching: bool,
}

fn default_matching() -> bool {
    true
}

/// A node of the location tree as the store persists it. `path` and `depth`
/// form the materialized-path ordering rebuilt after batch mutation; they
/// are derived state and must agree with the `parent` pointers on every
/// committed snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationRecord {
    pub id: LocationId,
    pub p_code: String,
    pub name: String,
    pub admin_level: i16,
    pub admin_level_name: String,
    pub parent: Option<LocationId>,
    pub point: Option<Geometry>,
    pub geom: Option<Geometry>,
    pub is_active: bool,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
    pub path: String,
    pub depth: u32,
}

impl fmt::Display for LocationRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{} ({}: {})",
            self.name,
            if self.is_active { "" } else { " [Archived]" },
            self.admin_level_name,
            self.p_code,
        )
    }
}

/// Audit record appended when a remap is absorbed: the retired location and
/// its successor. Immutable once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemapHistory {
    pub old_location: LocationId,
    pub new_location: LocationId,
    pub comment: String,
    pub created_at: DateTime<Utc>,
}

/// Per-table configuration consumed (not owned) by the sync engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceTableConfig {
    pub name: String,
    pub provider: ProviderConfig,
    #[serde(default = "default_name_col")]
    pub name_col: String,
    #[serde(default = "default_pcode_col")]
    pub pcode_col: String,
    #[serde(default)]
    pub parent_code_col: Option<String>,
    pub admin_level: i16,
    pub admin_level_name: String,
}

fn default_name_col() -> String {
    "name".to_string()
}

fn default_pcode_col() -> String {
    "pcode".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProviderConfig {
    Cartodb {
        domain: String,
        table_name: String,
        #[serde(default)]
        api_key: Option<String>,
        #[serde(default)]
        remap_table: Option<String>,
    },
    Arcgis {
        service_url: String,
        #[serde(default)]
        remap_service_url: Option<String>,
    },
}

impl SourceTableConfig {
    /// The provider-side dataset identifier, for logs.
    pub fn dataset_name(&self) -> &str {
        match &self.provider {
            ProviderConfig::Cartodb { table_name, .. } => table_name,
            ProviderConfig::Arcgis { service_url, .. } => service_url,
        }
    }

    pub fn has_remap_table(&self) -> bool {
        match &self.provider {
            ProviderConfig::Cartodb { remap_table, .. } => remap_table.is_some(),
            ProviderConfig::Arcgis {
                remap_service_url, ..
            } => remap_service_url.is_some(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn point_geometry_targets_point_column() {
        let geom = Geometry::new(r#"{"type":"Point","coordinates":[30.06,-1.94]}"#);
        assert_eq!(geom.kind(), GeometryKind::Point);
        let geom = Geometry::new(r#"{"type":"MultiPoint","coordinates":[[30.06,-1.94]]}"#);
        assert_eq!(geom.kind(), GeometryKind::Point);
    }

    #[test]
    fn polygon_geometry_targets_geom_column() {
        let geom = Geometry::new(r#"{"type":"MultiPolygon","coordinates":[[[[28.89,-2.43]]]]}"#);
        assert_eq!(geom.kind(), GeometryKind::Polygon);
    }

    #[test]
    fn remap_row_matching_defaults_to_rename() {
        let row: RemapRow =
            serde_json::from_str(r#"{"old_pcode":"RW01","new_pcode":"RW02"}"#).expect("remap row");
        assert!(row.matching);
        let row: RemapRow =
            serde_json::from_str(r#"{"old_pcode":"RW01","new_pcode":"RW02","matching":false}"#)
                .expect("remap row");
        assert!(!row.matching);
    }

    #[test]
    fn archived_locations_are_labelled() {
        let loc = LocationRecord {
            id: 7,
            p_code: "RW01".into(),
            name: "Kigali".into(),
            admin_level: 1,
            admin_level_name: "Province".into(),
            parent: None,
            point: None,
            geom: None,
            is_active: false,
            created: Utc::now(),
            modified: Utc::now(),
            path: String::new(),
            depth: 0,
        };
        assert_eq!(loc.to_string(), "Kigali [Archived] (Province: RW01)");
    }

    #[test]
    fn table_config_reads_provider_defaults() {
        let raw = r#"{"name":"rwa_admin1","provider":{"type":"cartodb","domain":"unicef","table_name":"rwa_adm1"},"admin_level":1,"admin_level_name":"Province"}"#;
        let table: SourceTableConfig = serde_json::from_str(raw).expect("table config");
        assert_eq!(table.name_col, "name");
        assert_eq!(table.pcode_col, "pcode");
        assert_eq!(table.dataset_name(), "rwa_adm1");
        assert!(!table.has_remap_table());
    }
}
