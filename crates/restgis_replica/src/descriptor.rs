//! Replica descriptors and the payloads that produce them.

use restgis_core::{
    Cursor, FeatureRecord, FeatureSet, FieldSchema, FieldSelection, GeometryType,
    LayerDescriptor, SpatialReference,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

/// How a replica is synchronised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SyncModel {
    /// The whole replica syncs at once.
    PerReplica,
    /// Each layer syncs on its own.
    PerLayer,
}

impl SyncModel {
    /// Wire value.
    pub fn as_wire(self) -> &'static str {
        match self {
            Self::PerReplica => "perReplica",
            Self::PerLayer => "perLayer",
        }
    }
}

impl fmt::Display for SyncModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_wire())
    }
}

/// One layer of a replica.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplicaLayer {
    /// Layer id in the service.
    pub id: i64,
    /// Layer endpoint URL.
    pub url: String,
    /// Layer name.
    pub name: String,
    /// Field schema read from the layer endpoint.
    pub fields: FieldSchema,
    /// Geometry type read from the layer endpoint.
    pub geometry_type: Option<GeometryType>,
    /// Spatial reference of the replica data.
    pub spatial_reference: Option<SpatialReference>,
    /// Attachment entries; empty when the payload has none.
    pub attachments: Vec<Value>,
    data: Arc<FeatureSet>,
}

impl ReplicaLayer {
    /// Creates a layer from its endpoint descriptor; the features are
    /// wrapped in a feature set carrying the layer schema, geometry type and
    /// the replica spatial reference.
    pub fn new(
        id: i64,
        descriptor: LayerDescriptor,
        spatial_reference: Option<SpatialReference>,
        attachments: Vec<Value>,
        features: Vec<FeatureRecord>,
    ) -> Self {
        let LayerDescriptor {
            url,
            name,
            fields,
            geometry_type,
        } = descriptor;
        let mut data = FeatureSet::new(fields.clone(), spatial_reference.clone(), features);
        data.geometry_type = geometry_type;
        Self {
            id,
            url,
            name,
            fields,
            geometry_type,
            spatial_reference,
            attachments,
            data: Arc::new(data),
        }
    }

    /// Replica rows of this layer.
    pub fn feature_set(&self) -> &FeatureSet {
        &self.data
    }

    /// Number of replica rows.
    pub fn feature_count(&self) -> usize {
        self.data.len()
    }

    /// A cursor over the replica rows; every cursor shares one batch.
    pub fn cursor(&self, fields: impl Into<FieldSelection>) -> Cursor {
        Cursor::new(Arc::clone(&self.data), fields)
    }
}

/// A created (or re-queried) replica.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplicaDescriptor {
    /// Replica name.
    pub replica_name: Option<String>,
    /// Server-issued replica id.
    pub replica_id: Option<String>,
    /// Server generation number of the snapshot.
    pub server_gen: Option<i64>,
    /// Replica layers in request order.
    pub layers: Vec<ReplicaLayer>,
    /// Status handle returned by the create request.
    pub status_url: Option<String>,
    /// Sync model requested at creation.
    pub sync_model: SyncModel,
    /// Remaining payload keys.
    pub extra: Map<String, Value>,
}

impl ReplicaDescriptor {
    /// Layer by id.
    pub fn layer(&self, id: i64) -> Option<&ReplicaLayer> {
        self.layers.iter().find(|l| l.id == id)
    }

    /// Layer by name, case-insensitive.
    pub fn layer_named(&self, name: &str) -> Option<&ReplicaLayer> {
        self.layers.iter().find(|l| l.name.eq_ignore_ascii_case(name))
    }
}

/// Replica data as returned by the result handle.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ReplicaPayload {
    #[serde(default)]
    pub replica_name: Option<String>,
    #[serde(default, rename = "replicaID")]
    pub replica_id: Option<String>,
    #[serde(default)]
    pub server_gen: Option<i64>,
    #[serde(default)]
    pub sync_model: Option<SyncModel>,
    #[serde(default)]
    pub layers: Vec<PayloadLayer>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PayloadLayer {
    #[serde(default, alias = "layerId")]
    pub id: Option<i64>,
    #[serde(default)]
    pub features: Vec<FeatureRecord>,
    #[serde(default)]
    pub attachments: Option<Vec<Value>>,
}

/// State of an asynchronous create job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    /// Still queued or running.
    Running(String),
    /// Finished; the data is at `result_url`.
    Completed {
        /// Where the replica payload can be fetched.
        result_url: Option<String>,
    },
    /// Ended with a failure.
    Failed(String),
}

impl JobStatus {
    /// Reads a status payload.
    pub fn from_json(value: &Value) -> Self {
        let status = value
            .get("status")
            .and_then(Value::as_str)
            .unwrap_or("Pending");
        match status {
            "Completed" => Self::Completed {
                result_url: value
                    .get("resultUrl")
                    .and_then(Value::as_str)
                    .map(str::to_string),
            },
            "Failed" | "CompletedWithErrors" => Self::Failed(status.to_string()),
            other => Self::Running(other.to_string()),
        }
    }
}

/// Response of a synchronize request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SyncResult {
    /// Replica name.
    pub replica_name: Option<String>,
    /// Replica id.
    #[serde(rename = "replicaID")]
    pub replica_id: Option<String>,
    /// New server generations per layer.
    pub layer_server_gens: Vec<Value>,
    /// Per-layer edit results.
    pub edit_results: Vec<Value>,
    /// Job handle when the sync ran asynchronously.
    pub status_url: Option<String>,
    /// Remaining payload keys.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Response of an unregister request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UnregisterResult {
    /// Whether the registration was released.
    pub success: bool,
}

/// Entry of a service's replica list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicaSummary {
    /// Replica name.
    #[serde(rename = "replicaName", default)]
    pub replica_name: String,
    /// Replica id.
    #[serde(rename = "replicaID")]
    pub replica_id: String,
}
