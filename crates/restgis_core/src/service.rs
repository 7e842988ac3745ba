//! Feature service and feature layer clients.
//!
//! Service and layer metadata is fetched once, on connect, and turned into
//! capability descriptors with named boolean fields. Operations consult those
//! descriptors before any request is sent.

use crate::cursor::{Cursor, FieldSelection, OID_TOKEN, SHAPE_TOKEN};
use crate::error::{ServiceError, ServiceResult};
use crate::feature::FeatureSet;
use crate::geometry::{Envelope, GeometryType, SpatialReference};
use crate::schema::FieldSchema;
use crate::transport::{request_checked, RequestParams, RestTransport};
use serde::{Deserialize, Deserializer, Serialize};
use std::sync::Arc;

const DEFAULT_PAGE_SIZE: usize = 1000;

/// Reads a geometry type tag, treating empty or unknown tags as absent.
fn lenient_geometry_type<'de, D>(deserializer: D) -> Result<Option<GeometryType>, D::Error>
where
    D: Deserializer<'de>,
{
    let tag: Option<String> = Option::deserialize(deserializer)?;
    Ok(tag.as_deref().and_then(GeometryType::from_wire))
}

fn has_capability(list: &str, name: &str) -> bool {
    list.split(',')
        .any(|c| c.trim().eq_ignore_ascii_case(name))
}

/// Id and name of a layer or table listed by a service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerSummary {
    /// Layer id.
    pub id: i64,
    /// Layer name.
    pub name: String,
}

/// Sync capability block of a service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SyncCapabilities {
    /// Replica creation can run as a server job.
    pub supports_async: bool,
    /// Replicas can be synchronised as a whole.
    pub supports_per_replica_sync: bool,
    /// Layers can be synchronised individually.
    pub supports_per_layer_sync: bool,
    /// Sync direction can be chosen per request.
    pub supports_sync_direction_control: bool,
    /// Existing data can be registered without download.
    pub supports_registering_existing_data: bool,
    /// Edits can roll back on failure during sync.
    pub supports_rollback_on_failure: bool,
}

/// Metadata of a feature service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServiceInfo {
    /// Description text.
    pub service_description: Option<String>,
    /// Layers in the service.
    pub layers: Vec<LayerSummary>,
    /// Tables in the service.
    pub tables: Vec<LayerSummary>,
    /// Default extent.
    pub initial_extent: Option<Envelope>,
    /// Extent of all data.
    pub full_extent: Option<Envelope>,
    /// Service spatial reference.
    pub spatial_reference: Option<SpatialReference>,
    /// Comma-delimited capability list, e.g. `Create,Query,Sync`.
    pub capabilities: String,
    /// Explicit sync switch.
    pub sync_enabled: Option<bool>,
    /// Sync capability block.
    pub sync_capabilities: Option<SyncCapabilities>,
    /// Maximum features per query page.
    pub max_record_count: Option<usize>,
}

/// Named capability flags of a service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServiceCapabilities {
    /// Query is allowed.
    pub query: bool,
    /// Any kind of edit is allowed.
    pub editing: bool,
    /// Replicas can be created: the explicit `syncEnabled` flag, else `Sync`
    /// in the capabilities list. A service that declares neither is treated
    /// as not supporting sync.
    pub sync_enabled: bool,
    /// Replica creation can run asynchronously.
    pub supports_async: bool,
    /// Per-replica sync model is available.
    pub supports_per_replica_sync: bool,
    /// Per-layer sync model is available.
    pub supports_per_layer_sync: bool,
}

impl ServiceCapabilities {
    /// Derives the capability descriptor from service metadata.
    pub fn from_info(info: &ServiceInfo) -> Self {
        let sync = info.sync_capabilities.clone().unwrap_or_default();
        let list = info.capabilities.as_str();
        Self {
            query: has_capability(list, "Query"),
            editing: ["Create", "Update", "Delete", "Editing"]
                .iter()
                .any(|c| has_capability(list, c)),
            sync_enabled: info
                .sync_enabled
                .unwrap_or_else(|| has_capability(list, "Sync")),
            supports_async: sync.supports_async,
            supports_per_replica_sync: sync.supports_per_replica_sync,
            supports_per_layer_sync: sync.supports_per_layer_sync,
        }
    }
}

/// Metadata of a single layer.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LayerInfo {
    /// Layer id.
    pub id: i64,
    /// Layer name.
    pub name: String,
    /// Layer type, e.g. `Feature Layer` or `Table`.
    #[serde(rename = "type")]
    pub layer_type: Option<String>,
    /// Geometry type, absent for tables.
    #[serde(deserialize_with = "lenient_geometry_type")]
    pub geometry_type: Option<GeometryType>,
    /// Field schema.
    pub fields: FieldSchema,
    /// Identity field name.
    pub object_id_field: Option<String>,
    /// Data extent.
    pub extent: Option<Envelope>,
    /// Features may carry attachments.
    pub has_attachments: bool,
    /// The calculate operation is available.
    pub supports_calculate: bool,
    /// Comma-delimited capability list.
    pub capabilities: String,
    /// Maximum features per query page.
    pub max_record_count: Option<usize>,
}

/// Named capability flags of a layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LayerCapabilities {
    /// Query is allowed.
    pub query: bool,
    /// Features can be added.
    pub create: bool,
    /// Features can be updated.
    pub update: bool,
    /// Features can be deleted.
    pub delete: bool,
    /// Attachments are enabled.
    pub attachments: bool,
    /// Field calculation is available.
    pub calculate: bool,
}

impl LayerCapabilities {
    /// Derives the capability descriptor from layer metadata.
    pub fn from_info(info: &LayerInfo) -> Self {
        let list = info.capabilities.as_str();
        let editing = has_capability(list, "Editing");
        Self {
            query: has_capability(list, "Query"),
            create: editing || has_capability(list, "Create"),
            update: editing || has_capability(list, "Update"),
            delete: editing || has_capability(list, "Delete"),
            attachments: info.has_attachments,
            calculate: info.supports_calculate,
        }
    }
}

/// What callers need to describe a layer: endpoint, name, schema, type.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerDescriptor {
    /// Layer endpoint URL.
    pub url: String,
    /// Layer name.
    pub name: String,
    /// Field schema.
    pub fields: FieldSchema,
    /// Geometry type, absent for tables.
    pub geometry_type: Option<GeometryType>,
}

/// A layer addressed by id or by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayerKey {
    /// Numeric layer id.
    Id(i64),
    /// Layer name; case-insensitive, `*` matches any run of characters.
    Name(String),
}

impl From<i64> for LayerKey {
    fn from(id: i64) -> Self {
        Self::Id(id)
    }
}

impl From<&str> for LayerKey {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

impl From<String> for LayerKey {
    fn from(name: String) -> Self {
        Self::Name(name)
    }
}

/// Case-insensitive layer name match; `*` in `pattern` matches any run of characters.
pub fn layer_name_matches(pattern: &str, name: &str) -> bool {
    let pattern = pattern.to_lowercase();
    let name = name.to_lowercase();
    if !pattern.contains('*') {
        return pattern == name;
    }
    let parts: Vec<&str> = pattern.split('*').collect();
    let mut rest = name.as_str();
    for (i, part) in parts.iter().enumerate() {
        if part.is_empty() {
            continue;
        }
        if i == 0 {
            match rest.strip_prefix(part) {
                Some(r) => rest = r,
                None => return false,
            }
        } else if i == parts.len() - 1 {
            return rest.ends_with(part);
        } else {
            match rest.find(part) {
                Some(pos) => rest = &rest[pos + part.len()..],
                None => return false,
            }
        }
    }
    true
}

fn join_url(base: &str, tail: impl std::fmt::Display) -> String {
    format!("{}/{}", base.trim_end_matches('/'), tail)
}

/// Client for a feature service endpoint.
#[derive(Debug)]
pub struct FeatureService<T: RestTransport> {
    url: String,
    transport: Arc<T>,
    info: ServiceInfo,
    capabilities: ServiceCapabilities,
}

impl<T: RestTransport> Clone for FeatureService<T> {
    fn clone(&self) -> Self {
        Self {
            url: self.url.clone(),
            transport: Arc::clone(&self.transport),
            info: self.info.clone(),
            capabilities: self.capabilities,
        }
    }
}

impl<T: RestTransport> FeatureService<T> {
    /// Fetches service metadata and builds the client.
    pub fn connect(url: impl Into<String>, transport: Arc<T>) -> ServiceResult<Self> {
        let url = url.into().trim_end_matches('/').to_string();
        let response = request_checked(transport.as_ref(), &url, &RequestParams::json())?;
        let info: ServiceInfo = serde_json::from_value(response)?;
        tracing::debug!(url = %url, layers = info.layers.len(), "connected to feature service");
        Ok(Self::from_info(url, transport, info))
    }

    /// Builds the client from already fetched metadata.
    pub fn from_info(url: impl Into<String>, transport: Arc<T>, info: ServiceInfo) -> Self {
        let capabilities = ServiceCapabilities::from_info(&info);
        Self {
            url: url.into().trim_end_matches('/').to_string(),
            transport,
            info,
            capabilities,
        }
    }

    /// Service URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Service metadata.
    pub fn info(&self) -> &ServiceInfo {
        &self.info
    }

    /// Capability descriptor.
    pub fn capabilities(&self) -> &ServiceCapabilities {
        &self.capabilities
    }

    /// The transport used for requests.
    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    /// Endpoint URL of a layer id.
    pub fn layer_url(&self, id: i64) -> String {
        join_url(&self.url, id)
    }

    /// Resolves a layer name to its id. Tables are searched after layers.
    pub fn layer_id(&self, name: &str) -> Option<i64> {
        self.info
            .layers
            .iter()
            .chain(self.info.tables.iter())
            .find(|l| layer_name_matches(name, &l.name))
            .map(|l| l.id)
    }

    /// Resolves a key to a layer id; `None` if a name matches nothing.
    pub fn resolve_layer(&self, key: &LayerKey) -> Option<i64> {
        match key {
            LayerKey::Id(id) => Some(*id),
            LayerKey::Name(name) => {
                let id = self.layer_id(name);
                if id.is_none() {
                    tracing::warn!(layer = %name, service = %self.url, "layer not found");
                }
                id
            }
        }
    }

    /// Connects to a layer of this service.
    ///
    /// An unresolvable name yields `Ok(None)` and a warning so batch callers
    /// can carry on; see [`FeatureService::require_layer`] for a hard error.
    pub fn layer(&self, key: impl Into<LayerKey>) -> ServiceResult<Option<FeatureLayer<T>>> {
        match self.resolve_layer(&key.into()) {
            Some(id) => FeatureLayer::connect(self.layer_url(id), Arc::clone(&self.transport))
                .map(Some),
            None => Ok(None),
        }
    }

    /// Connects to a layer, failing with [`ServiceError::MissingResource`].
    pub fn require_layer(&self, key: impl Into<LayerKey>) -> ServiceResult<FeatureLayer<T>> {
        let key = key.into();
        self.layer(key.clone())?
            .ok_or_else(|| ServiceError::MissingResource(format!("layer {key:?} in {}", self.url)))
    }

    /// Queries a layer endpoint for its descriptor.
    pub fn layer_descriptor(
        &self,
        key: impl Into<LayerKey>,
    ) -> ServiceResult<Option<LayerDescriptor>> {
        Ok(self.layer(key)?.map(|layer| layer.descriptor()))
    }
}

/// Query settings.
#[derive(Debug, Clone)]
pub struct QueryOptions {
    /// SQL where clause.
    pub where_clause: String,
    /// Whether geometry is returned.
    pub return_geometry: bool,
    /// Output spatial reference.
    pub out_sr: Option<SpatialReference>,
    /// Maximum number of features to return.
    pub record_limit: Option<usize>,
    /// Follow pagination until the service reports no more features.
    pub fetch_all: bool,
    /// Features per page; defaults to the layer's maximum record count.
    pub page_size: Option<usize>,
    /// Extra parameters passed through verbatim.
    pub extra: RequestParams,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            where_clause: "1=1".to_string(),
            return_geometry: true,
            out_sr: None,
            record_limit: None,
            fetch_all: false,
            page_size: None,
            extra: RequestParams::new(),
        }
    }
}

impl QueryOptions {
    /// Creates default options (`1=1`, geometry returned, one page).
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the where clause.
    pub fn with_where(mut self, where_clause: impl Into<String>) -> Self {
        self.where_clause = where_clause.into();
        self
    }

    /// Sets the output spatial reference.
    pub fn with_out_sr(mut self, out_sr: SpatialReference) -> Self {
        self.out_sr = Some(out_sr);
        self
    }

    /// Limits the number of features.
    pub fn with_record_limit(mut self, limit: usize) -> Self {
        self.record_limit = Some(limit);
        self
    }

    /// Fetches every page.
    pub fn with_fetch_all(mut self, fetch_all: bool) -> Self {
        self.fetch_all = fetch_all;
        self
    }

    /// Sets the page size.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = Some(page_size);
        self
    }

    /// Adds a verbatim parameter.
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.set(key, value);
        self
    }
}

/// Client for one feature layer.
#[derive(Debug)]
pub struct FeatureLayer<T: RestTransport> {
    url: String,
    transport: Arc<T>,
    info: LayerInfo,
    capabilities: LayerCapabilities,
}

impl<T: RestTransport> FeatureLayer<T> {
    /// Fetches layer metadata and builds the client.
    pub fn connect(url: impl Into<String>, transport: Arc<T>) -> ServiceResult<Self> {
        let url = url.into().trim_end_matches('/').to_string();
        let response = request_checked(transport.as_ref(), &url, &RequestParams::json())?;
        let info: LayerInfo = serde_json::from_value(response)?;
        Ok(Self::from_info(url, transport, info))
    }

    /// Builds the client from already fetched metadata.
    pub fn from_info(url: impl Into<String>, transport: Arc<T>, info: LayerInfo) -> Self {
        let capabilities = LayerCapabilities::from_info(&info);
        Self {
            url: url.into(),
            transport,
            info,
            capabilities,
        }
    }

    /// Layer URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Layer metadata.
    pub fn info(&self) -> &LayerInfo {
        &self.info
    }

    /// Capability descriptor.
    pub fn capabilities(&self) -> &LayerCapabilities {
        &self.capabilities
    }

    pub(crate) fn transport(&self) -> &T {
        self.transport.as_ref()
    }

    pub(crate) fn endpoint(&self, operation: &str) -> String {
        join_url(&self.url, operation)
    }

    /// Endpoint, name, schema and geometry type of this layer.
    pub fn descriptor(&self) -> LayerDescriptor {
        LayerDescriptor {
            url: self.url.clone(),
            name: self.info.name.clone(),
            fields: self.info.fields.clone(),
            geometry_type: self.info.geometry_type,
        }
    }

    /// `outFields` text for a selection; tokens map to real field names.
    pub fn out_fields(&self, selection: &FieldSelection) -> String {
        let FieldSelection::Names(names) = selection else {
            return "*".to_string();
        };
        let oid = self.info.fields.oid_field_name();
        let mut out: Vec<&str> = Vec::with_capacity(names.len());
        for name in names {
            let upper = name.to_uppercase();
            let field = if upper == OID_TOKEN {
                match oid {
                    Some(oid) => oid,
                    None => continue,
                }
            } else if upper == SHAPE_TOKEN {
                continue;
            } else {
                name.as_str()
            };
            if !out.contains(&field) {
                out.push(field);
            }
        }
        // the identity field always travels so rows can be addressed
        if let Some(oid) = oid {
            if !out.contains(&oid) {
                out.push(oid);
            }
        }
        out.join(",")
    }

    /// Runs a query with `outFields=*`.
    pub fn query(&self, options: &QueryOptions) -> ServiceResult<FeatureSet> {
        self.query_fields("*", options)
    }

    /// Runs a query, following pages when `fetch_all` is set.
    pub fn query_fields(
        &self,
        out_fields: &str,
        options: &QueryOptions,
    ) -> ServiceResult<FeatureSet> {
        if !self.capabilities.query && !self.info.capabilities.is_empty() {
            return Err(ServiceError::UnsupportedOperation(format!(
                "layer {} does not support query",
                self.info.name
            )));
        }

        let page_size = options
            .page_size
            .or(self.info.max_record_count)
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .max(1);
        let url = self.endpoint("query");

        let mut pages = Vec::new();
        let mut fetched = 0usize;
        loop {
            let mut params = options.extra.clone();
            params.set("f", "json");
            params.set("where", options.where_clause.clone());
            params.set("outFields", out_fields);
            params.set("returnGeometry", options.return_geometry.to_string());
            if let Some(sr) = &options.out_sr {
                params.set("outSR", sr.to_param());
            }
            if options.fetch_all || options.record_limit.is_some() {
                let remaining = options
                    .record_limit
                    .map_or(page_size, |limit| limit.saturating_sub(fetched));
                params.set("resultOffset", fetched.to_string());
                params.set("resultRecordCount", remaining.min(page_size).to_string());
            }

            let page = FeatureSet::from_json(request_checked(self.transport(), &url, &params)?)?;
            let count = page.len();
            let more = page.exceeded_transfer_limit;
            fetched += count;
            pages.push(page);

            let limit_reached = options.record_limit.is_some_and(|limit| fetched >= limit);
            if !options.fetch_all || !more || count == 0 || limit_reached {
                break;
            }
        }

        let page_count = pages.len();
        let mut merged = FeatureSet::from_pages(pages);
        if let Some(limit) = options.record_limit {
            merged.features.truncate(limit);
        }
        tracing::debug!(
            layer = %self.info.name,
            features = merged.len(),
            pages = page_count,
            "query complete"
        );
        Ok(merged)
    }

    /// Queries the layer and wraps the result in a cursor.
    pub fn cursor(
        &self,
        fields: impl Into<FieldSelection>,
        options: &QueryOptions,
    ) -> ServiceResult<Cursor> {
        let selection = fields.into();
        let feature_set = self.query_fields(&self.out_fields(&selection), options)?;
        Ok(Cursor::new(feature_set, selection))
    }
}
