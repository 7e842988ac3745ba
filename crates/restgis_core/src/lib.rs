//! # RestGIS Core
//!
//! Client-side building blocks for ArcGIS-style REST feature services.
//!
//! This crate provides:
//! - Row cursors over query results with `OID@`/`SHAPE@` field tokens
//! - Geometry normalisation into the `{geometryType, geometries}` shape
//! - Service and layer clients with capability descriptors
//! - Paginated queries and feature edits
//! - A transport seam and a scripted mock for tests
//!
//! ## Data flow
//!
//! ```text
//! FeatureService ──layer()──▶ FeatureLayer ──query()──▶ FeatureSet ──▶ Cursor ──▶ rows
//!        │                         │
//!        └──── RestTransport ◀─────┘
//! ```
//!
//! ## Key Invariants
//!
//! - A cursor's field order is resolved once, when the cursor is built
//! - Geometry handed out by a row is an independent copy
//! - Capabilities are checked before a request is sent
//! - Service error payloads always surface as `RemoteError`

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cursor;
mod datetime;
mod edit;
mod error;
mod export;
mod feature;
mod geometry;
mod http;
mod normalize;
mod schema;
mod service;
mod transport;

pub use cursor::{
    Cursor, FieldOrder, FieldSelection, FieldToken, Row, RowValue, RowValues, Rows, OID_TOKEN,
    SHAPE_TOKEN,
};
pub use datetime::{datetime_to_millis, millis_to_datetime};
pub use edit::{
    join_object_ids, CalculateExpression, CalculateResult, DeleteQuery, EditError, EditOptions,
    EditOutcome, EditResult, Edits, SqlFormat, DEFAULT_SPATIAL_REL,
};
pub use error::{ServiceError, ServiceResult};
pub use export::{ExportSummary, ExportedTable, MemoryExporter, RowExporter};
pub use feature::{FeatureRecord, FeatureSet};
pub use geometry::{
    Envelope, Geometry, GeometryCollection, GeometryType, SpatialReference, SPATIAL_REFERENCE,
};
pub use http::{HttpClient, HttpTransport};
pub use normalize::{
    normalize, return_geometry, GeometryInput, GeometryItem, NormalizedGeometries,
    ReturnedGeometry,
};
pub use schema::{Field, FieldSchema, FieldType};
pub use service::{
    layer_name_matches, FeatureLayer, FeatureService, LayerCapabilities, LayerDescriptor,
    LayerInfo, LayerKey, LayerSummary, QueryOptions, ServiceCapabilities, ServiceInfo,
    SyncCapabilities,
};
pub use transport::{
    check_response, request_checked, MockTransport, RecordedRequest, RequestParams, RestTransport,
};
