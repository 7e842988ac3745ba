//! Normalize command implementation.

use restgis_core::{normalize, NormalizedGeometries, ServiceError, ServiceResult};
use std::path::Path;

/// Normalizes `input`, reading it from a file when it names one.
pub fn normalize_input(input: &str, envelopes: bool) -> ServiceResult<NormalizedGeometries> {
    let path = Path::new(input);
    let text = if path.is_file() {
        std::fs::read_to_string(path).map_err(|e| {
            ServiceError::InvalidGeometry(format!("cannot read {}: {e}", path.display()))
        })?
    } else {
        input.to_string()
    };
    normalize(text.trim(), envelopes)
}

/// Runs the normalize command.
pub fn run(input: &str, envelopes: bool) -> Result<(), Box<dyn std::error::Error>> {
    let normalized = normalize_input(input, envelopes)?;
    tracing::debug!(
        geometry_type = %normalized.geometry_type,
        count = normalized.geometries.len(),
        "normalized geometry input"
    );
    println!("{}", serde_json::to_string_pretty(&normalized.to_json())?);
    Ok(())
}
