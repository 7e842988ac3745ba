//! JSON fixtures and a scripted feature service.
//!
//! The payloads follow what an ArcGIS Server feature service returns for a
//! small water utility: a hydrant point layer, a water main line layer and
//! an inspections table.

use restgis_core::{FeatureService, FeatureSet, MockTransport};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

/// URL of the fixture service.
pub const SERVICE_URL: &str = "https://gis.example.com/arcgis/rest/services/Water/FeatureServer";

/// Raw value of the fixture's known inspection date (2015-04-24 14:26:35 UTC).
pub const INSPECTION_MILLIS: i64 = 1_429_885_595_000;

/// Field list of the hydrant layer.
pub fn hydrant_fields() -> Value {
    json!([
        {"name": "OBJECTID", "type": "esriFieldTypeOID", "alias": "OBJECTID"},
        {"name": "FACILITYID", "type": "esriFieldTypeString", "alias": "Facility ID", "length": 20},
        {"name": "Rating", "type": "esriFieldTypeSmallInteger"},
        {"name": "Inspection_Date", "type": "esriFieldTypeDate", "length": 8},
        {"name": "SHAPE", "type": "esriFieldTypeGeometry"}
    ])
}

/// Query response with three hydrants; the last has no geometry and no date.
pub fn hydrant_feature_set() -> Value {
    json!({
        "objectIdFieldName": "OBJECTID",
        "geometryType": "esriGeometryPoint",
        "spatialReference": {"wkid": 102100, "latestWkid": 3857},
        "fields": hydrant_fields(),
        "features": [
            {
                "attributes": {
                    "OBJECTID": 1,
                    "FACILITYID": "HYD-001",
                    "Rating": 90,
                    "Inspection_Date": INSPECTION_MILLIS
                },
                "geometry": {"x": -10350208.415443439, "y": 5663994.806146532}
            },
            {
                "attributes": {
                    "OBJECTID": 2,
                    "FACILITYID": "HYD-002",
                    "Rating": 75,
                    "Inspection_Date": 0
                },
                "geometry": {"x": -10350100.0, "y": 5664000.0}
            },
            {
                "attributes": {
                    "OBJECTID": 3,
                    "FACILITYID": "HYD-003",
                    "Rating": null,
                    "Inspection_Date": null
                }
            }
        ]
    })
}

/// [`hydrant_feature_set`] parsed.
pub fn hydrant_batch() -> FeatureSet {
    FeatureSet::from_json(hydrant_feature_set()).expect("fixture feature set parses")
}

/// Service metadata with sync enabled.
pub fn service_json() -> Value {
    json!({
        "currentVersion": 10.91,
        "serviceDescription": "Water distribution",
        "capabilities": "Create,Delete,Query,Sync,Update",
        "syncEnabled": true,
        "syncCapabilities": {
            "supportsAsync": true,
            "supportsRegisteringExistingData": true,
            "supportsSyncDirectionControl": true,
            "supportsPerLayerSync": true,
            "supportsPerReplicaSync": true,
            "supportsRollbackOnFailure": false
        },
        "maxRecordCount": 2,
        "spatialReference": {"wkid": 102100, "latestWkid": 3857},
        "initialExtent": {
            "xmin": -10352000.0, "ymin": 5662000.0, "xmax": -10348000.0, "ymax": 5666000.0,
            "spatialReference": {"wkid": 102100}
        },
        "layers": [
            {"id": 0, "name": "Hydrants"},
            {"id": 1, "name": "Water Mains"}
        ],
        "tables": [
            {"id": 2, "name": "Inspections"}
        ]
    })
}

/// Metadata of the hydrant layer.
pub fn hydrant_layer_json() -> Value {
    json!({
        "id": 0,
        "name": "Hydrants",
        "type": "Feature Layer",
        "geometryType": "esriGeometryPoint",
        "objectIdField": "OBJECTID",
        "capabilities": "Create,Delete,Query,Update,Editing",
        "hasAttachments": true,
        "supportsCalculate": true,
        "maxRecordCount": 2,
        "fields": hydrant_fields()
    })
}

/// Metadata of the water main layer.
pub fn main_layer_json() -> Value {
    json!({
        "id": 1,
        "name": "Water Mains",
        "type": "Feature Layer",
        "geometryType": "esriGeometryPolyline",
        "capabilities": "Query",
        "fields": [
            {"name": "OBJECTID", "type": "esriFieldTypeOID"},
            {"name": "DIAMETER", "type": "esriFieldTypeDouble"},
            {"name": "Shape", "type": "esriFieldTypeGeometry"}
        ]
    })
}

/// Replica data for the hydrant and water main layers.
pub fn replica_payload() -> Value {
    json!({
        "replicaName": "field_crew",
        "replicaID": "{5C1A2B3D-0000-4E5F-8A9B-ABCDEF012345}",
        "serverGen": 2_480_119,
        "transportType": "esriTransportTypeUrl",
        "layers": [
            {
                "id": 0,
                "features": [
                    {
                        "attributes": {
                            "OBJECTID": 1,
                            "FACILITYID": "HYD-001",
                            "Inspection_Date": INSPECTION_MILLIS
                        },
                        "geometry": {"x": -10350208.4, "y": 5663994.8}
                    }
                ],
                "attachments": [{"id": 7, "name": "photo.jpg"}]
            },
            {
                "id": 1,
                "features": [
                    {"attributes": {"OBJECTID": 10, "DIAMETER": 8.0},
                     "geometry": {"paths": [[[0.0, 0.0], [10.0, 5.0]]]}}
                ]
            }
        ]
    })
}

/// A scripted feature service on a [`MockTransport`].
pub struct MockService {
    /// The transport every client of this service uses.
    pub transport: Arc<MockTransport>,
}

impl MockService {
    /// A service with the fixture metadata and both layer endpoints.
    pub fn water() -> Self {
        Self::with_service_json(service_json())
    }

    /// Same layers, but with `service` as the service metadata.
    pub fn with_service_json(service: Value) -> Self {
        let transport = Arc::new(MockTransport::new());
        transport
            .respond(SERVICE_URL, service)
            .respond(layer_url(0), hydrant_layer_json())
            .respond(layer_url(1), main_layer_json());
        Self { transport }
    }

    /// Queues a response for an operation below the service URL.
    pub fn respond(&self, operation: &str, response: Value) -> &Self {
        self.transport.respond(service_endpoint(operation), response);
        self
    }

    /// Connects a service client.
    pub fn connect(&self) -> FeatureService<MockTransport> {
        FeatureService::connect(SERVICE_URL, Arc::clone(&self.transport))
            .expect("fixture service connects")
    }
}

/// URL of a fixture layer.
pub fn layer_url(id: i64) -> String {
    format!("{SERVICE_URL}/{id}")
}

/// URL of an operation below the fixture service.
pub fn service_endpoint(operation: &str) -> String {
    format!("{SERVICE_URL}/{operation}")
}

/// JSON files in a temporary directory.
pub struct FixtureDir {
    dir: TempDir,
}

impl FixtureDir {
    /// Creates an empty directory.
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temp directory"),
        }
    }

    /// Directory path.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Writes `value` as `name` and returns the file path.
    pub fn write_json(&self, name: &str, value: &Value) -> PathBuf {
        let path = self.dir.path().join(name);
        let text = serde_json::to_string_pretty(value).expect("fixture serialises");
        std::fs::write(&path, text).expect("Failed to write fixture");
        path
    }
}

impl Default for FixtureDir {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixtures_parse() {
        let batch = hydrant_batch();
        assert_eq!(batch.len(), 3);
        assert_eq!(batch.fields.oid_field_name(), Some("OBJECTID"));
        assert_eq!(batch.fields.date_fields(), vec!["Inspection_Date"]);
    }

    #[test]
    fn mock_service_connects() {
        let service = MockService::water().connect();
        assert!(service.capabilities().sync_enabled);
        assert_eq!(service.layer_id("water mains"), Some(1));
    }

    #[test]
    fn fixture_dir_writes_files() {
        let dir = FixtureDir::new();
        let path = dir.write_json("batch.json", &hydrant_feature_set());
        let text = std::fs::read_to_string(path).unwrap();
        assert!(FeatureSet::parse(&text).is_ok());
    }
}
