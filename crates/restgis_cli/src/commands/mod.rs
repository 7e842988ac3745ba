//! CLI command implementations.

pub mod export;
pub mod normalize;
pub mod rows;
pub mod schema;

use restgis_core::FeatureSet;
use std::path::Path;

/// Reads a saved query response.
pub fn load_feature_set(path: &Path) -> Result<FeatureSet, Box<dyn std::error::Error>> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| format!("cannot read {}: {e}", path.display()))?;
    let value: serde_json::Value = serde_json::from_str(&text)?;
    Ok(FeatureSet::from_json(restgis_core::check_response(value)?)?)
}
