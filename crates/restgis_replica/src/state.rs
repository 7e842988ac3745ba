//! Replica workflow state machine.

use crate::config::{ReplicaConfig, ReplicaOptions, SyncOptions};
use crate::descriptor::{
    JobStatus, ReplicaDescriptor, ReplicaLayer, ReplicaPayload, ReplicaSummary, SyncModel,
    SyncResult, UnregisterResult,
};
use crate::error::{ReplicaError, ReplicaResult};
use crate::layers::{join_layer_ids, LayerSelector};
use parking_lot::RwLock;
use restgis_core::{
    request_checked, FeatureLayer, FeatureService, Geometry, GeometryType, LayerDescriptor,
    RequestParams, RestTransport, ServiceError, SpatialReference,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

fn decode<D: DeserializeOwned>(value: Value) -> ReplicaResult<D> {
    serde_json::from_value(value).map_err(|e| ServiceError::from(e).into())
}

/// The lifecycle state of a replica workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplicaState {
    /// No request has been sent yet.
    Built,
    /// The create request is in flight.
    Submitted,
    /// Waiting for an asynchronous create job.
    Pending,
    /// The replica has been created and its layers described.
    Materialized,
    /// The replica has been synchronised.
    Synced,
    /// The server registration has been released.
    Unregistered,
    /// The last operation failed.
    Failed,
}

impl ReplicaState {
    /// Returns true while a create is in progress.
    pub fn is_active(&self) -> bool {
        matches!(self, ReplicaState::Submitted | ReplicaState::Pending)
    }

    /// Returns true if a new operation may start.
    pub fn can_start(&self) -> bool {
        !self.is_active()
    }
}

/// Statistics about replica operations.
#[derive(Debug, Clone, Default)]
pub struct ReplicaStats {
    /// Replicas created.
    pub replicas_created: u64,
    /// Status checks made while waiting for create jobs.
    pub poll_rounds: u64,
    /// Synchronisations performed.
    pub syncs: u64,
    /// Registrations released.
    pub unregistrations: u64,
    /// Last error message.
    pub last_error: Option<String>,
}

/// Shared cancellation flag of a workflow.
///
/// Clones observe the same flag, so a handle can be moved to another thread
/// and cancel a create that is waiting on a job.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    flag: Arc<AtomicBool>,
}

impl CancelHandle {
    /// Creates an unset flag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Returns true if cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Clears the flag.
    pub fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

/// Arguments of a create request.
#[derive(Debug, Clone, Default)]
pub struct CreateReplica {
    /// Layers to include.
    pub layers: LayerSelector,
    /// Replica name.
    pub replica_name: String,
    /// Filter geometry. When neither it nor `geometry_type` is set, the
    /// service's initial extent is sent and `useGeometry` is false.
    pub geometry: Option<Geometry>,
    /// Filter geometry type; the geometry's own type when unset. Set alone,
    /// it is sent with an empty geometry and `useGeometry` true.
    pub geometry_type: Option<GeometryType>,
    /// Spatial reference of the filter geometry.
    pub in_sr: Option<SpatialReference>,
    /// Spatial reference of the replica data; the service's when unset.
    pub replica_sr: Option<SpatialReference>,
    /// Request options.
    pub options: ReplicaOptions,
}

impl CreateReplica {
    /// Creates a request for `layers` under `replica_name`.
    pub fn new(layers: impl Into<LayerSelector>, replica_name: impl Into<String>) -> Self {
        Self {
            layers: layers.into(),
            replica_name: replica_name.into(),
            ..Self::default()
        }
    }

    /// Filters by geometry.
    pub fn with_geometry(mut self, geometry: Geometry) -> Self {
        self.geometry = Some(geometry);
        self
    }

    /// Overrides the filter geometry type.
    pub fn with_geometry_type(mut self, geometry_type: GeometryType) -> Self {
        self.geometry_type = Some(geometry_type);
        self
    }

    /// Sets the filter geometry's spatial reference.
    pub fn with_in_sr(mut self, in_sr: SpatialReference) -> Self {
        self.in_sr = Some(in_sr);
        self
    }

    /// Sets the replica spatial reference.
    pub fn with_replica_sr(mut self, replica_sr: SpatialReference) -> Self {
        self.replica_sr = Some(replica_sr);
        self
    }

    /// Sets request options.
    pub fn with_options(mut self, options: ReplicaOptions) -> Self {
        self.options = options;
        self
    }
}

/// Drives replica creation, synchronisation and release against one service.
pub struct ReplicaWorkflow<T: RestTransport> {
    service: FeatureService<T>,
    config: ReplicaConfig,
    state: RwLock<ReplicaState>,
    stats: RwLock<ReplicaStats>,
    cancel: CancelHandle,
}

impl<T: RestTransport> ReplicaWorkflow<T> {
    /// Creates a workflow for `service`.
    pub fn new(service: FeatureService<T>, config: ReplicaConfig) -> Self {
        Self {
            service,
            config,
            state: RwLock::new(ReplicaState::Built),
            stats: RwLock::new(ReplicaStats::default()),
            cancel: CancelHandle::new(),
        }
    }

    /// The service this workflow talks to.
    pub fn service(&self) -> &FeatureService<T> {
        &self.service
    }

    /// Gets the current state.
    pub fn state(&self) -> ReplicaState {
        *self.state.read()
    }

    /// Gets the current stats.
    pub fn stats(&self) -> ReplicaStats {
        self.stats.read().clone()
    }

    /// A handle that cancels the running create.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    fn check_cancelled(&self) -> ReplicaResult<()> {
        if self.cancel.is_cancelled() {
            Err(ReplicaError::Cancelled)
        } else {
            Ok(())
        }
    }

    fn set_state(&self, state: ReplicaState) {
        let previous = std::mem::replace(&mut *self.state.write(), state);
        if previous != state {
            tracing::debug!(from = ?previous, to = ?state, "replica state change");
        }
    }

    fn begin(&self, operation: &str) -> ReplicaResult<()> {
        let state = self.state();
        if !state.can_start() {
            return Err(ReplicaError::InvalidStateTransition {
                from: format!("{state:?}"),
                to: operation.to_string(),
            });
        }
        Ok(())
    }

    fn handle_error(&self, error: &ReplicaError) {
        self.set_state(ReplicaState::Failed);
        self.stats.write().last_error = Some(error.to_string());
        tracing::warn!(error = %error, "replica operation failed");
    }

    fn require_sync(&self) -> ReplicaResult<()> {
        if self.service.capabilities().sync_enabled {
            Ok(())
        } else {
            Err(ReplicaError::unsupported(format!(
                "feature service {} does not support sync",
                self.service.url()
            )))
        }
    }

    fn endpoint(&self, operation: &str) -> String {
        format!("{}/{}", self.service.url(), operation)
    }

    fn request(&self, url: &str, params: &RequestParams) -> ReplicaResult<Value> {
        Ok(request_checked(self.service.transport().as_ref(), url, params)?)
    }

    /// Creates a replica and describes each of its layers.
    ///
    /// Fails before sending anything if the service does not support sync.
    pub fn create(&self, request: &CreateReplica) -> ReplicaResult<ReplicaDescriptor> {
        self.begin("create")?;
        self.cancel.reset();
        self.require_sync()?;

        match self.run_create(request) {
            Ok(descriptor) => {
                self.set_state(ReplicaState::Materialized);
                let mut stats = self.stats.write();
                stats.replicas_created += 1;
                stats.last_error = None;
                tracing::info!(
                    replica = ?descriptor.replica_id,
                    layers = descriptor.layers.len(),
                    sync_model = %descriptor.sync_model,
                    "replica created"
                );
                Ok(descriptor)
            }
            Err(e) => {
                self.handle_error(&e);
                Err(e)
            }
        }
    }

    fn run_create(&self, request: &CreateReplica) -> ReplicaResult<ReplicaDescriptor> {
        let layer_ids = request.layers.resolve(&self.service);
        let (params, sync_model, replica_sr, use_async) = self.create_params(request, &layer_ids)?;

        self.set_state(ReplicaState::Submitted);
        let submitted = self.request(&self.endpoint("createReplica"), &params)?;
        let status_url = submitted
            .get("statusUrl")
            .and_then(Value::as_str)
            .map(str::to_string);

        let handle = if use_async {
            let status_url = status_url.clone().ok_or_else(|| {
                ReplicaError::remote("asynchronous createReplica returned no statusUrl")
            })?;
            self.set_state(ReplicaState::Pending);
            self.wait_for_job(&status_url)?
        } else {
            submitted
                .get("URL")
                .and_then(Value::as_str)
                .map(str::to_string)
                .or_else(|| status_url.clone())
                .ok_or_else(|| {
                    ReplicaError::remote("createReplica response has neither URL nor statusUrl")
                })?
        };

        self.check_cancelled()?;
        let payload: ReplicaPayload = decode(self.request(&handle, &RequestParams::json())?)?;
        self.materialize(payload, &layer_ids, status_url, sync_model, replica_sr)
    }

    fn create_params(
        &self,
        request: &CreateReplica,
        layer_ids: &[i64],
    ) -> ReplicaResult<(RequestParams, SyncModel, Option<SpatialReference>, bool)> {
        let info = self.service.info();
        let capabilities = self.service.capabilities();
        let options = &request.options;
        let mut params = RequestParams::json()
            .with("replicaName", request.replica_name.clone())
            .with("layers", join_layer_ids(layer_ids))
            .with("transportType", options.transport_type.as_wire())
            .with("returnAttachments", options.return_attachments.to_string())
            .with(
                "returnAttachmentsDataByUrl",
                options.return_attachments_data_by_url.to_string(),
            )
            .with("dataFormat", options.data_format.as_wire());

        let use_geometry = match (&request.geometry, request.geometry_type) {
            (Some(geometry), geometry_type) => {
                let geometry_type = geometry_type.unwrap_or(geometry.geometry_type());
                params.set("geometry", geometry.dumps());
                params.set("geometryType", geometry_type.as_wire());
                if let Some(sr) = request.in_sr.as_ref().or(geometry.spatial_reference()) {
                    params.set("inSR", sr.to_param());
                }
                true
            }
            (None, Some(geometry_type)) => {
                params.set("geometry", "");
                params.set("geometryType", geometry_type.as_wire());
                if let Some(sr) = &request.in_sr {
                    params.set("inSR", sr.to_param());
                }
                true
            }
            (None, None) => {
                let extent = info.initial_extent.as_ref().or(info.full_extent.as_ref());
                if let Some(extent) = extent {
                    params.set("geometry", extent.bbox_text());
                    params.set("geometryType", GeometryType::Envelope.as_wire());
                    let in_sr = info
                        .spatial_reference
                        .as_ref()
                        .or(extent.spatial_reference.as_ref());
                    if let Some(sr) = in_sr {
                        params.set("inSR", sr.to_param());
                    }
                }
                false
            }
        };

        let replica_sr = request
            .replica_sr
            .clone()
            .or_else(|| info.spatial_reference.clone());
        if let Some(sr) = &replica_sr {
            params.set("replicaSR", sr.to_param());
        }

        params.set(
            "layerQueries",
            options
                .layer_queries_param(use_geometry)
                .map_err(ServiceError::from)?,
        );

        let sync_model = if capabilities.supports_per_replica_sync {
            SyncModel::PerReplica
        } else {
            SyncModel::PerLayer
        };
        params.set("syncModel", sync_model.as_wire());

        let use_async = options.async_mode && capabilities.supports_async;
        if options.async_mode && !use_async {
            tracing::debug!(
                service = %self.service.url(),
                "service does not support async create, running synchronously"
            );
        }
        params.set("async", use_async.to_string());

        params.extend(options.extra.to_form());
        Ok((params, sync_model, replica_sr, use_async))
    }

    fn wait_for_job(&self, status_url: &str) -> ReplicaResult<String> {
        let poll = &self.config.poll;
        let started = Instant::now();
        let mut attempts = 0u32;

        loop {
            self.check_cancelled()?;
            if !poll.allows(attempts, started.elapsed()) {
                return Err(ReplicaError::Timeout { attempts });
            }
            if attempts > 0 {
                std::thread::sleep(poll.interval);
                self.check_cancelled()?;
            }
            attempts += 1;
            self.stats.write().poll_rounds += 1;

            let status = match self.request(status_url, &RequestParams::json()) {
                Ok(status) => status,
                Err(e) if e.is_retryable() => {
                    tracing::debug!(
                        error = %e,
                        attempt = attempts,
                        "status check failed, retrying"
                    );
                    continue;
                }
                Err(e) => return Err(e),
            };
            match JobStatus::from_json(&status) {
                JobStatus::Running(status) => {
                    tracing::debug!(%status, attempt = attempts, "replica job still running");
                }
                JobStatus::Completed { result_url } => {
                    return result_url.ok_or_else(|| {
                        ReplicaError::remote("completed replica job has no resultUrl")
                    });
                }
                JobStatus::Failed(status) => {
                    return Err(ReplicaError::remote(format!("replica job ended with {status}")));
                }
            }
        }
    }

    fn materialize(
        &self,
        payload: ReplicaPayload,
        layer_ids: &[i64],
        status_url: Option<String>,
        sync_model: SyncModel,
        replica_sr: Option<SpatialReference>,
    ) -> ReplicaResult<ReplicaDescriptor> {
        let mut layers = Vec::with_capacity(payload.layers.len());
        for (index, raw) in payload.layers.into_iter().enumerate() {
            self.check_cancelled()?;
            // payload id first, request position second
            let id = raw
                .id
                .or_else(|| layer_ids.get(index).copied())
                .ok_or_else(|| {
                    ServiceError::Protocol(format!("replica layer {index} has no layer id"))
                })?;
            let endpoint = FeatureLayer::connect(
                self.service.layer_url(id),
                Arc::clone(self.service.transport()),
            )?;
            layers.push(ReplicaLayer::new(
                id,
                endpoint.descriptor(),
                replica_sr.clone(),
                raw.attachments.unwrap_or_default(),
                raw.features,
            ));
        }

        Ok(ReplicaDescriptor {
            replica_name: payload.replica_name,
            replica_id: payload.replica_id,
            server_gen: payload.server_gen,
            layers,
            status_url,
            sync_model: payload.sync_model.unwrap_or(sync_model),
            extra: payload.extra,
        })
    }

    /// Re-reads a replica registered with the service.
    ///
    /// Layers are described from the service's layer list; no features are
    /// downloaded and the workflow state is left alone.
    pub fn get_info(&self, replica_id: &str) -> ReplicaResult<ReplicaDescriptor> {
        self.require_sync()?;
        let url = self.endpoint(&format!("replicas/{replica_id}"));
        let payload: ReplicaPayload = decode(self.request(&url, &RequestParams::json())?)?;
        let info = self.service.info();
        let replica_sr = payload
            .extra
            .get("spatialReference")
            .and_then(SpatialReference::from_value);

        let layers = payload
            .layers
            .into_iter()
            .filter_map(|raw| {
                let id = raw.id?;
                let name = info
                    .layers
                    .iter()
                    .chain(info.tables.iter())
                    .find(|l| l.id == id)
                    .map(|l| l.name.clone())
                    .unwrap_or_default();
                let descriptor = LayerDescriptor {
                    url: self.service.layer_url(id),
                    name,
                    fields: Default::default(),
                    geometry_type: None,
                };
                Some(ReplicaLayer::new(
                    id,
                    descriptor,
                    replica_sr.clone(),
                    raw.attachments.unwrap_or_default(),
                    raw.features,
                ))
            })
            .collect();

        Ok(ReplicaDescriptor {
            replica_name: payload.replica_name,
            replica_id: payload.replica_id,
            server_gen: payload.server_gen,
            layers,
            status_url: None,
            sync_model: payload.sync_model.unwrap_or(SyncModel::PerLayer),
            extra: payload.extra,
        })
    }

    /// Lists replicas registered with the service; empty when sync is off.
    pub fn list_replicas(&self) -> ReplicaResult<Vec<ReplicaSummary>> {
        if !self.service.capabilities().sync_enabled {
            return Ok(Vec::new());
        }
        let response = self.request(&self.endpoint("replicas"), &RequestParams::json())?;
        decode(response)
    }

    /// Synchronises a replica.
    ///
    /// Local descriptors are not touched; call [`ReplicaWorkflow::get_info`]
    /// or create again to see the new content.
    pub fn sync(&self, replica_id: &str, options: &SyncOptions) -> ReplicaResult<SyncResult> {
        self.begin("sync")?;
        self.require_sync()?;
        let params = options.to_params(replica_id);
        let result = self
            .request(&self.endpoint("synchronizeReplica"), &params)
            .and_then(decode::<SyncResult>);

        match result {
            Ok(result) => {
                self.set_state(ReplicaState::Synced);
                let mut stats = self.stats.write();
                stats.syncs += 1;
                stats.last_error = None;
                tracing::info!(replica = %replica_id, "replica synchronised");
                Ok(result)
            }
            Err(e) => {
                self.handle_error(&e);
                Err(e)
            }
        }
    }

    /// Releases a replica registration.
    pub fn unregister(&self, replica_id: &str) -> ReplicaResult<UnregisterResult> {
        self.begin("unregister")?;
        let params = RequestParams::json().with("replicaID", replica_id);
        let result = self
            .request(&self.endpoint("unRegisterReplica"), &params)
            .and_then(decode::<UnregisterResult>);

        match result {
            Ok(result) => {
                self.set_state(ReplicaState::Unregistered);
                let mut stats = self.stats.write();
                stats.unregistrations += 1;
                stats.last_error = None;
                tracing::info!(
                    replica = %replica_id,
                    success = result.success,
                    "replica unregistered"
                );
                Ok(result)
            }
            Err(e) => {
                self.handle_error(&e);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_checks() {
        assert!(ReplicaState::Built.can_start());
        assert!(ReplicaState::Materialized.can_start());
        assert!(ReplicaState::Failed.can_start());
        assert!(!ReplicaState::Submitted.can_start());
        assert!(ReplicaState::Pending.is_active());
        assert!(!ReplicaState::Unregistered.is_active());
    }

    #[test]
    fn cancel_handle_is_shared() {
        let handle = CancelHandle::new();
        let remote = handle.clone();
        std::thread::spawn(move || remote.cancel()).join().unwrap();
        assert!(handle.is_cancelled());
        handle.reset();
        assert!(!handle.is_cancelled());
    }

    #[test]
    fn create_request_builder() {
        let request = CreateReplica::new("0,1", "crew")
            .with_geometry_type(GeometryType::Polygon)
            .with_replica_sr(SpatialReference::wkid(4326));
        assert_eq!(request.layers.layers().len(), 2);
        assert_eq!(request.replica_name, "crew");
        assert_eq!(request.geometry_type, Some(GeometryType::Polygon));
        assert!(request.geometry.is_none());
    }
}
