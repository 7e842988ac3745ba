//! # RestGIS Testkit
//!
//! Test utilities for RestGIS.
//!
//! This crate provides:
//! - JSON fixtures for a small water utility feature service
//! - A scripted mock service built on `MockTransport`
//! - Property-based test generators using proptest
//! - Temporary fixture directories for file-based tests
//!
//! ## Usage
//!
//! ```rust,ignore
//! use restgis_testkit::prelude::*;
//!
//! #[test]
//! fn hydrants_have_three_rows() {
//!     let cursor = Cursor::new(hydrant_batch(), "OID@,FACILITYID");
//!     assert_eq!(cursor.len(), 3);
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use restgis_core::*;
}

pub use fixtures::*;
pub use generators::*;
