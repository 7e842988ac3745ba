//! Configuration for replica creation and synchronisation.

use restgis_core::RequestParams;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Limits for polling an asynchronous create job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollConfig {
    /// Delay between status checks.
    pub interval: Duration,
    /// Maximum number of status checks; `None` for no limit.
    pub max_attempts: Option<u32>,
    /// Maximum total wait; `None` for no limit.
    pub max_wait: Option<Duration>,
}

impl PollConfig {
    /// Creates a bounded poll configuration.
    pub fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts: Some(max_attempts),
            max_wait: None,
        }
    }

    /// Polls every second until the job finishes or the handle is cancelled.
    pub fn unbounded() -> Self {
        Self {
            interval: Duration::from_secs(1),
            max_attempts: None,
            max_wait: None,
        }
    }

    /// Sets the delay between status checks.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Sets the maximum number of status checks.
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    /// Sets the maximum total wait.
    pub fn with_max_wait(mut self, wait: Duration) -> Self {
        self.max_wait = Some(wait);
        self
    }

    /// Returns true if neither attempts nor wait time are limited.
    pub fn is_unbounded(&self) -> bool {
        self.max_attempts.is_none() && self.max_wait.is_none()
    }

    /// Returns true if another status check is allowed.
    pub fn allows(&self, attempts: u32, waited: Duration) -> bool {
        self.max_attempts.map_or(true, |max| attempts < max)
            && self.max_wait.map_or(true, |max| waited < max)
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            max_attempts: Some(300),
            max_wait: Some(Duration::from_secs(600)),
        }
    }
}

/// Workflow-wide configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplicaConfig {
    /// Poll limits for asynchronous creates.
    pub poll: PollConfig,
}

impl ReplicaConfig {
    /// Creates the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the poll configuration.
    pub fn with_poll(mut self, poll: PollConfig) -> Self {
        self.poll = poll;
        self
    }
}

/// How replica data is delivered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TransportType {
    /// The response links to the data.
    #[default]
    Url,
    /// The data is embedded in the response.
    Embedded,
}

impl TransportType {
    /// Wire value.
    pub fn as_wire(self) -> &'static str {
        match self {
            Self::Url => "esriTransportTypeUrl",
            Self::Embedded => "esriTransportTypeEmbedded",
        }
    }
}

/// Format of replica data.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DataFormat {
    /// JSON feature sets.
    #[default]
    Json,
    /// A mobile geodatabase.
    Sqlite,
}

impl DataFormat {
    /// Wire value.
    pub fn as_wire(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Sqlite => "sqlite",
        }
    }
}

/// Which rows of a layer go into the replica.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum QueryOption {
    /// Every row.
    All,
    /// No rows, schema only.
    None,
    /// Rows matching the where clause and geometry.
    UseFilter,
}

/// Per-layer override of the replica query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerQuery {
    /// Row selection mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_option: Option<QueryOption>,
    /// Where clause for this layer.
    #[serde(default, rename = "where", skip_serializing_if = "Option::is_none")]
    pub where_clause: Option<String>,
    /// Whether the replica geometry filters this layer. Set by the workflow.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_geometry: Option<bool>,
    /// Include related rows.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include_related: Option<bool>,
}

impl LayerQuery {
    /// Creates an empty override.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the row selection mode.
    pub fn with_query_option(mut self, option: QueryOption) -> Self {
        self.query_option = Some(option);
        self
    }

    /// Sets the where clause.
    pub fn with_where(mut self, where_clause: impl Into<String>) -> Self {
        self.where_clause = Some(where_clause.into());
        self
    }

    /// Sets whether related rows are included.
    pub fn with_include_related(mut self, include: bool) -> Self {
        self.include_related = Some(include);
        self
    }
}

/// Options of a create request.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplicaOptions {
    /// Delivery of replica data.
    pub transport_type: TransportType,
    /// Include attachments.
    pub return_attachments: bool,
    /// Link attachment data instead of embedding it.
    pub return_attachments_data_by_url: bool,
    /// Run the create as a server job when the service supports it.
    pub async_mode: bool,
    /// Format of replica data.
    pub data_format: DataFormat,
    /// Per-layer query overrides keyed by layer id.
    pub layer_queries: BTreeMap<String, LayerQuery>,
    /// Extra parameters merged in verbatim, last.
    pub extra: RequestParams,
}

impl Default for ReplicaOptions {
    fn default() -> Self {
        Self {
            transport_type: TransportType::Url,
            return_attachments: true,
            return_attachments_data_by_url: true,
            async_mode: false,
            data_format: DataFormat::Json,
            layer_queries: BTreeMap::new(),
            extra: RequestParams::new(),
        }
    }
}

impl ReplicaOptions {
    /// Creates default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the transport type.
    pub fn with_transport_type(mut self, transport_type: TransportType) -> Self {
        self.transport_type = transport_type;
        self
    }

    /// Sets attachment handling.
    pub fn with_attachments(mut self, attachments: bool, by_url: bool) -> Self {
        self.return_attachments = attachments;
        self.return_attachments_data_by_url = by_url;
        self
    }

    /// Requests an asynchronous create.
    pub fn with_async(mut self, async_mode: bool) -> Self {
        self.async_mode = async_mode;
        self
    }

    /// Sets the data format.
    pub fn with_data_format(mut self, format: DataFormat) -> Self {
        self.data_format = format;
        self
    }

    /// Adds a per-layer query override.
    pub fn with_layer_query(mut self, layer_id: impl ToString, query: LayerQuery) -> Self {
        self.layer_queries.insert(layer_id.to_string(), query);
        self
    }

    /// Adds a verbatim parameter.
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.set(key, value);
        self
    }

    /// `layerQueries` text with `useGeometry` set on every entry.
    ///
    /// Each entry is rewritten on its own; applying it twice gives the same
    /// text.
    pub fn layer_queries_param(&self, use_geometry: bool) -> serde_json::Result<String> {
        if self.layer_queries.is_empty() {
            return Ok(String::new());
        }
        let queries: BTreeMap<&str, LayerQuery> = self
            .layer_queries
            .iter()
            .map(|(key, query)| {
                let mut query = query.clone();
                query.use_geometry = Some(use_geometry);
                (key.as_str(), query)
            })
            .collect();
        serde_json::to_string(&queries)
    }
}

/// Direction of a synchronisation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncDirection {
    /// Server to client only.
    Download,
    /// Client to server only.
    Upload,
    /// Both ways.
    Bidirectional,
}

impl SyncDirection {
    /// Wire value.
    pub fn as_wire(self) -> &'static str {
        match self {
            Self::Download => "download",
            Self::Upload => "upload",
            Self::Bidirectional => "bidirectional",
        }
    }
}

/// Options of a synchronize request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncOptions {
    /// Sync direction; the service default when unset.
    pub sync_direction: Option<SyncDirection>,
    /// Unregister the replica after syncing.
    pub close_replica: bool,
    /// Return object ids of added rows.
    pub return_ids_for_adds: bool,
    /// Roll back all edits if one fails.
    pub rollback_on_failure: Option<bool>,
    /// Extra parameters merged in verbatim, last.
    pub extra: RequestParams,
}

impl SyncOptions {
    /// Creates default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the direction.
    pub fn with_direction(mut self, direction: SyncDirection) -> Self {
        self.sync_direction = Some(direction);
        self
    }

    /// Unregisters the replica after syncing.
    pub fn with_close_replica(mut self, close: bool) -> Self {
        self.close_replica = close;
        self
    }

    /// Adds a verbatim parameter.
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.set(key, value);
        self
    }

    pub(crate) fn to_params(&self, replica_id: &str) -> RequestParams {
        let mut params = RequestParams::json()
            .with("replicaID", replica_id)
            .with("closeReplica", self.close_replica.to_string())
            .with("returnIdsForAdds", self.return_ids_for_adds.to_string());
        if let Some(direction) = self.sync_direction {
            params.set("syncDirection", direction.as_wire());
        }
        if let Some(rollback) = self.rollback_on_failure {
            params.set("rollbackOnFailure", rollback.to_string());
        }
        params.extend(self.extra.to_form());
        params
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn poll_defaults_are_bounded() {
        let poll = PollConfig::default();
        assert!(!poll.is_unbounded());
        assert!(poll.allows(0, Duration::ZERO));
        assert!(!poll.allows(300, Duration::ZERO));
        assert!(!poll.allows(1, Duration::from_secs(600)));

        let open = PollConfig::unbounded();
        assert!(open.is_unbounded());
        assert!(open.allows(u32::MAX - 1, Duration::from_secs(86_400)));
    }

    #[test]
    fn poll_builder() {
        let poll =
            PollConfig::new(Duration::from_millis(5), 3).with_max_wait(Duration::from_secs(1));
        assert_eq!(poll.interval, Duration::from_millis(5));
        assert_eq!(poll.max_attempts, Some(3));
        assert_eq!(poll.max_wait, Some(Duration::from_secs(1)));
        let config = ReplicaConfig::new().with_poll(poll.clone());
        assert_eq!(config.poll, poll);
    }

    #[test]
    fn layer_queries_inject_use_geometry_per_key() {
        let options = ReplicaOptions::new()
            .with_layer_query(0, LayerQuery::new().with_query_option(QueryOption::All))
            .with_layer_query(
                1,
                LayerQuery::new()
                    .with_query_option(QueryOption::UseFilter)
                    .with_where("STATUS = 'ACTIVE'"),
            );

        let text = options.layer_queries_param(false).unwrap();
        let parsed: BTreeMap<String, LayerQuery> = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed.len(), 2);
        assert!(parsed.values().all(|q| q.use_geometry == Some(false)));
        assert_eq!(parsed["1"].where_clause.as_deref(), Some("STATUS = 'ACTIVE'"));

        // stored options are untouched, so a second call gives the same text
        assert_eq!(options.layer_queries_param(false).unwrap(), text);
        assert!(options.layer_queries.values().all(|q| q.use_geometry.is_none()));
    }

    #[test]
    fn layer_query_wire_names() {
        let query = LayerQuery::new()
            .with_query_option(QueryOption::UseFilter)
            .with_where("1=1");
        let json = serde_json::to_value(&query).unwrap();
        assert_eq!(json, serde_json::json!({"queryOption": "useFilter", "where": "1=1"}));
        assert_eq!(ReplicaOptions::new().layer_queries_param(true).unwrap(), "");
    }

    #[test]
    fn sync_params() {
        let params = SyncOptions::new()
            .with_direction(SyncDirection::Download)
            .with_close_replica(true)
            .with_param("syncLayers", "all")
            .to_params("{ABC}");
        assert_eq!(params.get("replicaID"), Some("{ABC}"));
        assert_eq!(params.get("syncDirection"), Some("download"));
        assert_eq!(params.get("closeReplica"), Some("true"));
        assert_eq!(params.get("syncLayers"), Some("all"));
        assert!(!params.contains("rollbackOnFailure"));
    }
}
