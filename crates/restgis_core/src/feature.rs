//! Feature records and result batches.

use crate::error::ServiceResult;
use crate::geometry::{GeometryType, SpatialReference};
use crate::schema::FieldSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One feature: attribute values plus optional raw geometry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureRecord {
    /// Attribute values keyed by field name.
    #[serde(default)]
    pub attributes: Map<String, Value>,
    /// Raw geometry JSON.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geometry: Option<Map<String, Value>>,
}

impl FeatureRecord {
    /// Creates a record from attributes and optional geometry.
    pub fn new(attributes: Map<String, Value>, geometry: Option<Map<String, Value>>) -> Self {
        Self {
            attributes,
            geometry,
        }
    }

    /// Raw attribute value.
    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }
}

/// A result batch ("feature set"): schema, spatial reference and features.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureSet {
    /// Declared fields in order.
    #[serde(default)]
    pub fields: FieldSchema,
    /// Spatial reference of all geometries in the batch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spatial_reference: Option<SpatialReference>,
    /// Geometry type of the batch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geometry_type: Option<GeometryType>,
    /// Identity field name as reported by the service.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_id_field_name: Option<String>,
    /// Features in service order.
    #[serde(default)]
    pub features: Vec<FeatureRecord>,
    /// Set when the service truncated the result at its record limit.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub exceeded_transfer_limit: bool,
}

impl FeatureSet {
    /// Creates a feature set.
    pub fn new(
        fields: FieldSchema,
        spatial_reference: Option<SpatialReference>,
        features: Vec<FeatureRecord>,
    ) -> Self {
        Self {
            fields,
            spatial_reference,
            features,
            ..Self::default()
        }
    }

    /// Parses a query response.
    pub fn from_json(value: Value) -> ServiceResult<Self> {
        Ok(serde_json::from_value(value)?)
    }

    /// Parses query response text.
    pub fn parse(text: &str) -> ServiceResult<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Merges consecutive result pages into one batch.
    ///
    /// Schema, spatial reference and geometry type come from the first page
    /// that declares them; features are concatenated in page order.
    pub fn from_pages(pages: impl IntoIterator<Item = FeatureSet>) -> Self {
        let mut merged = FeatureSet::default();
        for page in pages {
            if merged.fields.is_empty() {
                merged.fields = page.fields;
            }
            if merged.spatial_reference.is_none() {
                merged.spatial_reference = page.spatial_reference;
            }
            if merged.geometry_type.is_none() {
                merged.geometry_type = page.geometry_type;
            }
            if merged.object_id_field_name.is_none() {
                merged.object_id_field_name = page.object_id_field_name;
            }
            merged.exceeded_transfer_limit = page.exceeded_transfer_limit;
            merged.features.extend(page.features);
        }
        merged
    }

    /// Number of features.
    pub fn len(&self) -> usize {
        self.features.len()
    }

    /// Returns true if the batch holds no features.
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}
