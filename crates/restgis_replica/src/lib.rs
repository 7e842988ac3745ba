//! # RestGIS Replica
//!
//! Offline replica lifecycle for feature services.
//!
//! ## Lifecycle
//!
//! ```text
//! Built → Submitted → (Pending ⟲ poll) → Materialized → Synced → Unregistered
//!                                   ╲
//!                                    Failed
//! ```
//!
//! A create resolves the requested layers, submits `createReplica`, waits
//! for the server job when running asynchronously, fetches the replica data
//! and describes every layer from its endpoint. Each [`ReplicaLayer`] keeps
//! its rows and hands out row cursors over them.
//!
//! Polling is bounded by [`PollConfig`] and can be stopped from another
//! thread through a [`CancelHandle`].

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod descriptor;
mod error;
mod layers;
mod state;

pub use config::{
    DataFormat, LayerQuery, PollConfig, QueryOption, ReplicaConfig, ReplicaOptions,
    SyncDirection, SyncOptions, TransportType,
};
pub use descriptor::{
    JobStatus, ReplicaDescriptor, ReplicaLayer, ReplicaSummary, SyncModel, SyncResult,
    UnregisterResult,
};
pub use error::{ReplicaError, ReplicaResult};
pub use layers::{join_layer_ids, LayerRef, LayerSelector};
pub use state::{CancelHandle, CreateReplica, ReplicaState, ReplicaStats, ReplicaWorkflow};
