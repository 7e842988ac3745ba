//! Feature edits: add, update, delete, apply edits and field calculation.

use crate::error::{ServiceError, ServiceResult};
use crate::feature::FeatureRecord;
use crate::geometry::{Geometry, GeometryType, SpatialReference};
use crate::service::FeatureLayer;
use crate::transport::{request_checked, RequestParams, RestTransport};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Default spatial relationship for geometry-based deletes.
pub const DEFAULT_SPATIAL_REL: &str = "esriSpatialRelIntersects";

/// Formats object ids the way edit endpoints expect them: `1, 2, 3`.
pub fn join_object_ids(ids: &[i64]) -> String {
    ids.iter()
        .map(i64::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Options shared by every edit request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditOptions {
    /// Geodatabase version to edit.
    pub gdb_version: Option<String>,
    /// Apply edits only if all of them succeed.
    pub rollback_on_failure: bool,
}

impl Default for EditOptions {
    fn default() -> Self {
        Self {
            gdb_version: None,
            rollback_on_failure: true,
        }
    }
}

impl EditOptions {
    /// Creates default options (rollback on failure).
    pub fn new() -> Self {
        Self::default()
    }

    /// Targets a geodatabase version.
    pub fn with_gdb_version(mut self, version: impl Into<String>) -> Self {
        self.gdb_version = Some(version.into());
        self
    }

    /// Sets rollback on failure.
    pub fn with_rollback_on_failure(mut self, rollback: bool) -> Self {
        self.rollback_on_failure = rollback;
        self
    }

    fn apply(&self, params: &mut RequestParams) {
        params.set("rollbackOnFailure", self.rollback_on_failure.to_string());
        if let Some(version) = &self.gdb_version {
            params.set("gdbVersion", version.clone());
        }
    }
}

/// Selects features to delete by ids, where clause and/or geometry.
#[derive(Debug, Clone, PartialEq)]
pub struct DeleteQuery {
    /// Object ids to delete.
    pub object_ids: Vec<i64>,
    /// Where clause.
    pub where_clause: Option<String>,
    /// Filter geometry.
    pub geometry: Option<Geometry>,
    /// Type of the filter geometry.
    pub geometry_type: GeometryType,
    /// Spatial relationship of the filter.
    pub spatial_rel: String,
    /// Spatial reference of the filter geometry.
    pub in_sr: Option<SpatialReference>,
}

impl Default for DeleteQuery {
    fn default() -> Self {
        Self {
            object_ids: Vec::new(),
            where_clause: None,
            geometry: None,
            geometry_type: GeometryType::Envelope,
            spatial_rel: DEFAULT_SPATIAL_REL.to_string(),
            in_sr: None,
        }
    }
}

impl DeleteQuery {
    /// Deletes by object id.
    pub fn object_ids(ids: impl IntoIterator<Item = i64>) -> Self {
        Self {
            object_ids: ids.into_iter().collect(),
            ..Self::default()
        }
    }

    /// Deletes by where clause.
    pub fn where_clause(where_clause: impl Into<String>) -> Self {
        Self {
            where_clause: Some(where_clause.into()),
            ..Self::default()
        }
    }

    /// Adds a filter geometry; its type becomes the filter type.
    pub fn with_geometry(mut self, geometry: Geometry) -> Self {
        self.geometry_type = geometry.geometry_type();
        self.geometry = Some(geometry);
        self
    }

    /// Sets the spatial relationship.
    pub fn with_spatial_rel(mut self, spatial_rel: impl Into<String>) -> Self {
        self.spatial_rel = spatial_rel.into();
        self
    }

    /// Sets the input spatial reference.
    pub fn with_in_sr(mut self, in_sr: SpatialReference) -> Self {
        self.in_sr = Some(in_sr);
        self
    }

    fn is_empty(&self) -> bool {
        self.object_ids.is_empty() && self.where_clause.is_none() && self.geometry.is_none()
    }

    fn to_params(&self) -> RequestParams {
        let mut params = RequestParams::json()
            .with("objectIds", join_object_ids(&self.object_ids))
            .with("where", self.where_clause.clone().unwrap_or_default())
            .with("geometryType", self.geometry_type.as_wire())
            .with("spatialRel", self.spatial_rel.clone());
        if let Some(geometry) = &self.geometry {
            params.set("geometry", geometry.dumps());
        }
        if let Some(sr) = &self.in_sr {
            params.set("inSR", sr.to_param());
        }
        params
    }
}

/// Error reported for a single edit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditError {
    /// Error code.
    pub code: i64,
    /// Error text.
    pub description: String,
}

/// Result of one add, update or delete.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EditOutcome {
    /// Affected object id.
    pub object_id: Option<i64>,
    /// Affected global id.
    pub global_id: Option<String>,
    /// Whether the edit succeeded.
    pub success: bool,
    /// Failure details.
    pub error: Option<EditError>,
}

/// Result lists of an edit request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EditResult {
    /// Results of adds.
    pub add_results: Vec<EditOutcome>,
    /// Results of updates.
    pub update_results: Vec<EditOutcome>,
    /// Results of deletes.
    pub delete_results: Vec<EditOutcome>,
}

impl EditResult {
    /// Parses an edit response.
    pub fn from_json(value: Value) -> ServiceResult<Self> {
        Ok(serde_json::from_value(value)?)
    }

    fn all(&self) -> impl Iterator<Item = &EditOutcome> {
        self.add_results
            .iter()
            .chain(&self.update_results)
            .chain(&self.delete_results)
    }

    /// Number of successful edits.
    pub fn success_count(&self) -> usize {
        self.all().filter(|o| o.success).count()
    }

    /// Failed edits.
    pub fn failures(&self) -> Vec<&EditOutcome> {
        self.all().filter(|o| !o.success).collect()
    }

    /// Returns true if every edit succeeded.
    pub fn is_success(&self) -> bool {
        self.all().all(|o| o.success)
    }

    /// Logs per-list success counts and every failure.
    pub fn summary(&self) {
        for (kind, results) in [
            ("add", &self.add_results),
            ("update", &self.update_results),
            ("delete", &self.delete_results),
        ] {
            if results.is_empty() {
                continue;
            }
            let succeeded = results.iter().filter(|o| o.success).count();
            tracing::info!(kind, succeeded, failed = results.len() - succeeded, "edit results");
            for outcome in results.iter().filter(|o| !o.success) {
                let (code, description) = outcome
                    .error
                    .as_ref()
                    .map_or((0, ""), |e| (e.code, e.description.as_str()));
                tracing::warn!(
                    kind,
                    object_id = ?outcome.object_id,
                    code,
                    description,
                    "edit failed"
                );
            }
        }
    }
}

/// Adds, updates and deletes sent in one request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Edits {
    /// Features to add.
    pub adds: Vec<FeatureRecord>,
    /// Features to update; attributes must carry the object id.
    pub updates: Vec<FeatureRecord>,
    /// Object ids to delete.
    pub deletes: Vec<i64>,
}

impl Edits {
    /// Creates an empty edit set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues an add.
    pub fn add(mut self, feature: FeatureRecord) -> Self {
        self.adds.push(feature);
        self
    }

    /// Queues an update.
    pub fn update(mut self, feature: FeatureRecord) -> Self {
        self.updates.push(feature);
        self
    }

    /// Queues deletes.
    pub fn delete(mut self, ids: impl IntoIterator<Item = i64>) -> Self {
        self.deletes.extend(ids);
        self
    }

    /// Returns true if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.adds.is_empty() && self.updates.is_empty() && self.deletes.is_empty()
    }
}

/// One field assignment of a calculate request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalculateExpression {
    /// Target field.
    pub field: String,
    /// Literal value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    /// SQL expression evaluated per row.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sql_expression: Option<String>,
}

impl CalculateExpression {
    /// Assigns a literal value.
    pub fn value(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            value: Some(value.into()),
            sql_expression: None,
        }
    }

    /// Assigns the result of a SQL expression.
    pub fn sql(field: impl Into<String>, expression: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            value: None,
            sql_expression: Some(expression.into()),
        }
    }
}

/// SQL dialect of calculate expressions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SqlFormat {
    /// Standardized SQL.
    #[default]
    Standard,
    /// The database's native SQL.
    Native,
}

impl SqlFormat {
    fn as_wire(self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::Native => "native",
        }
    }
}

/// Result of a calculate request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CalculateResult {
    /// Whether the calculation ran.
    pub success: bool,
    /// Number of updated features.
    pub updated_feature_count: Option<u64>,
}

impl<T: RestTransport> FeatureLayer<T> {
    fn require(&self, allowed: bool, operation: &str) -> ServiceResult<()> {
        // layers that publish no capability list are not gated
        if allowed || self.info().capabilities.is_empty() {
            Ok(())
        } else {
            Err(ServiceError::UnsupportedOperation(format!(
                "layer {} does not support {operation}",
                self.info().name
            )))
        }
    }

    fn send_edit(
        &self,
        operation: &str,
        mut params: RequestParams,
        options: &EditOptions,
    ) -> ServiceResult<EditResult> {
        options.apply(&mut params);
        let response = request_checked(self.transport(), &self.endpoint(operation), &params)?;
        let result = EditResult::from_json(response)?;
        result.summary();
        Ok(result)
    }

    /// Adds features.
    pub fn add_features(
        &self,
        features: &[FeatureRecord],
        options: &EditOptions,
    ) -> ServiceResult<EditResult> {
        self.require(self.capabilities().create, "adding features")?;
        let params = RequestParams::json().with("features", serde_json::to_string(features)?);
        self.send_edit("addFeatures", params, options)
    }

    /// Updates features; each must carry its object id attribute.
    pub fn update_features(
        &self,
        features: &[FeatureRecord],
        options: &EditOptions,
    ) -> ServiceResult<EditResult> {
        self.require(self.capabilities().update, "updating features")?;
        let params = RequestParams::json().with("features", serde_json::to_string(features)?);
        self.send_edit("updateFeatures", params, options)
    }

    /// Deletes the features selected by `query`.
    pub fn delete_features(
        &self,
        query: &DeleteQuery,
        options: &EditOptions,
    ) -> ServiceResult<EditResult> {
        self.require(self.capabilities().delete, "deleting features")?;
        if query.is_empty() {
            return Err(ServiceError::UnsupportedOperation(
                "delete needs object ids, a where clause or a geometry".to_string(),
            ));
        }
        self.send_edit("deleteFeatures", query.to_params(), options)
    }

    /// Sends adds, updates and deletes in one request.
    pub fn apply_edits(&self, edits: &Edits, options: &EditOptions) -> ServiceResult<EditResult> {
        if !edits.adds.is_empty() {
            self.require(self.capabilities().create, "adding features")?;
        }
        if !edits.updates.is_empty() {
            self.require(self.capabilities().update, "updating features")?;
        }
        if !edits.deletes.is_empty() {
            self.require(self.capabilities().delete, "deleting features")?;
        }
        if edits.is_empty() {
            return Ok(EditResult::default());
        }

        let mut params = RequestParams::json();
        if !edits.adds.is_empty() {
            params.set("adds", serde_json::to_string(&edits.adds)?);
        }
        if !edits.updates.is_empty() {
            params.set("updates", serde_json::to_string(&edits.updates)?);
        }
        if !edits.deletes.is_empty() {
            params.set("deletes", join_object_ids(&edits.deletes));
        }
        self.send_edit("applyEdits", params, options)
    }

    /// Calculates field values for the features matching `where_clause`.
    pub fn calculate(
        &self,
        expressions: &[CalculateExpression],
        where_clause: &str,
        sql_format: SqlFormat,
    ) -> ServiceResult<CalculateResult> {
        if !self.capabilities().calculate {
            return Err(ServiceError::UnsupportedOperation(format!(
                "layer {} does not support field calculations",
                self.info().name
            )));
        }
        let params = RequestParams::json()
            .with("where", where_clause)
            .with("calcExpression", serde_json::to_string(expressions)?)
            .with("sqlFormat", sql_format.as_wire())
            .with("returnIdsOnly", "true")
            .with("returnGeometry", "false")
            .with("outFields", "");
        let response = request_checked(self.transport(), &self.endpoint("calculate"), &params)?;
        let result: CalculateResult = serde_json::from_value(response)?;
        tracing::info!(
            layer = %self.info().name,
            updated = ?result.updated_feature_count,
            "calculate finished"
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::LayerInfo;
    use crate::transport::MockTransport;
    use serde_json::json;
    use std::sync::Arc;

    const LAYER: &str = "https://gis.example.com/arcgis/rest/services/Water/FeatureServer/0";

    fn layer(
        transport: &Arc<MockTransport>,
        capabilities: &str,
        calculate: bool,
    ) -> FeatureLayer<MockTransport> {
        let info = LayerInfo {
            id: 0,
            name: "Hydrants".into(),
            capabilities: capabilities.into(),
            supports_calculate: calculate,
            ..LayerInfo::default()
        };
        FeatureLayer::from_info(LAYER, Arc::clone(transport), info)
    }

    fn hydrant(oid: Option<i64>) -> FeatureRecord {
        let mut attributes = serde_json::Map::new();
        attributes.insert("Rating".into(), json!(90));
        attributes.insert("Inspection_Date".into(), json!(1_429_885_595_000_i64));
        if let Some(oid) = oid {
            attributes.insert("OBJECTID".into(), json!(oid));
        }
        let geometry = json!({"x": -10350208.4, "y": 5663994.8}).as_object().cloned();
        FeatureRecord::new(attributes, geometry)
    }

    #[test]
    fn object_ids_join_with_comma_space() {
        assert_eq!(join_object_ids(&[1, 2, 3]), "1, 2, 3");
        assert_eq!(join_object_ids(&[]), "");
    }

    #[test]
    fn delete_defaults_to_envelope_intersects() {
        let transport = Arc::new(MockTransport::new());
        transport.respond(
            format!("{LAYER}/deleteFeatures"),
            json!({"deleteResults": [
                {"objectId": 1, "success": true},
                {"objectId": 2, "success": false, "error": {"code": 1000, "description": "locked"}}
            ]}),
        );
        let layer = layer(&transport, "Query,Delete", false);

        let result = layer
            .delete_features(&DeleteQuery::object_ids([1, 2]), &EditOptions::new())
            .unwrap();
        assert_eq!(result.success_count(), 1);
        assert_eq!(result.failures()[0].object_id, Some(2));
        assert!(!result.is_success());

        let params = &transport.requests()[0].params;
        assert_eq!(params.get("objectIds"), Some("1, 2"));
        assert_eq!(params.get("geometryType"), Some("esriGeometryEnvelope"));
        assert_eq!(params.get("spatialRel"), Some("esriSpatialRelIntersects"));
        assert_eq!(params.get("rollbackOnFailure"), Some("true"));
        assert!(!params.contains("gdbVersion"));
    }

    #[test]
    fn empty_delete_is_rejected() {
        let transport = Arc::new(MockTransport::new());
        let layer = layer(&transport, "Editing", false);
        assert!(layer
            .delete_features(&DeleteQuery::default(), &EditOptions::new())
            .is_err());
        assert!(transport.requests().is_empty());
    }

    #[test]
    fn add_features_sends_feature_json() {
        let transport = Arc::new(MockTransport::new());
        transport.respond(
            format!("{LAYER}/addFeatures"),
            json!({"addResults": [{"objectId": 11, "globalId": "{A}", "success": true}]}),
        );
        let layer = layer(&transport, "Create,Query", false);
        let options = EditOptions::new()
            .with_gdb_version("SDE.Edits")
            .with_rollback_on_failure(false);

        let result = layer.add_features(&[hydrant(None)], &options).unwrap();
        assert!(result.is_success());
        assert_eq!(result.add_results[0].object_id, Some(11));

        let params = &transport.requests()[0].params;
        assert_eq!(params.get("gdbVersion"), Some("SDE.Edits"));
        assert_eq!(params.get("rollbackOnFailure"), Some("false"));
        let sent: Value = serde_json::from_str(params.get("features").unwrap()).unwrap();
        assert_eq!(sent[0]["attributes"]["Inspection_Date"], 1_429_885_595_000_i64);
    }

    #[test]
    fn update_requires_capability() {
        let transport = Arc::new(MockTransport::new());
        let layer = layer(&transport, "Query", false);
        assert!(matches!(
            layer.update_features(&[hydrant(Some(1))], &EditOptions::new()),
            Err(ServiceError::UnsupportedOperation(_))
        ));
    }

    #[test]
    fn apply_edits_sends_one_request() {
        let transport = Arc::new(MockTransport::new());
        transport.respond(
            format!("{LAYER}/applyEdits"),
            json!({
                "addResults": [{"objectId": 12, "success": true}],
                "updateResults": [{"objectId": 1, "success": true}],
                "deleteResults": [
                    {"objectId": 3, "success": true},
                    {"objectId": 4, "success": true}
                ]
            }),
        );
        let layer = layer(&transport, "Editing", false);
        let edits = Edits::new()
            .add(hydrant(None))
            .update(hydrant(Some(1)))
            .delete([3, 4]);

        let result = layer.apply_edits(&edits, &EditOptions::new()).unwrap();
        assert_eq!(result.success_count(), 4);

        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].params.get("deletes"), Some("3, 4"));
        assert!(requests[0].params.contains("adds"));
        assert!(requests[0].params.contains("updates"));
    }

    #[test]
    fn empty_apply_edits_sends_nothing() {
        let transport = Arc::new(MockTransport::new());
        let layer = layer(&transport, "Editing", false);
        let result = layer.apply_edits(&Edits::new(), &EditOptions::new()).unwrap();
        assert_eq!(result, EditResult::default());
        assert!(transport.requests().is_empty());
    }

    #[test]
    fn calculate_requires_support() {
        let transport = Arc::new(MockTransport::new());
        let exp = [CalculateExpression::value("Quality", 3)];

        let unsupported = layer(&transport, "Editing", false);
        assert!(matches!(
            unsupported.calculate(&exp, "1=1", SqlFormat::Standard),
            Err(ServiceError::UnsupportedOperation(_))
        ));

        transport.respond(
            format!("{LAYER}/calculate"),
            json!({"success": true, "updatedFeatureCount": 42}),
        );
        let supported = layer(&transport, "Editing", true);
        let result = supported
            .calculate(&[CalculateExpression::sql("A", "B*3")], "A IS NULL", SqlFormat::Native)
            .unwrap();
        assert_eq!(result.updated_feature_count, Some(42));

        let params = &transport.requests()[0].params;
        assert_eq!(params.get("sqlFormat"), Some("native"));
        assert_eq!(params.get("calcExpression"), Some(r#"[{"field":"A","sqlExpression":"B*3"}]"#));
        assert_eq!(params.get("where"), Some("A IS NULL"));
    }
}
