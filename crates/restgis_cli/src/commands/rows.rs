//! Rows command implementation.

use super::load_feature_set;
use restgis_core::Cursor;
use serde_json::{Map, Value};
use std::path::Path;

/// Rows of `cursor` as JSON objects keyed by column name, up to `limit`.
pub fn records(cursor: &Cursor, limit: Option<usize>) -> Vec<Map<String, Value>> {
    let names = cursor.field_names();
    cursor
        .row_values()
        .take(limit.unwrap_or(usize::MAX))
        .map(|values| {
            names
                .iter()
                .cloned()
                .zip(values.iter().map(|v| v.to_json()))
                .collect()
        })
        .collect()
}

/// Runs the rows command.
pub fn run(
    path: &Path,
    fields: &str,
    limit: Option<usize>,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let cursor = Cursor::new(load_feature_set(path)?, fields);
    tracing::debug!(rows = cursor.len(), columns = ?cursor.field_names(), "cursor ready");

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&records(&cursor, limit))?);
        }
        _ => {
            println!("{}", cursor.field_names().join("\t"));
            for values in cursor.row_values().take(limit.unwrap_or(usize::MAX)) {
                let cells: Vec<String> = values.iter().map(ToString::to_string).collect();
                println!("{}", cells.join("\t"));
            }
            let shown = limit.map_or(cursor.len(), |l| l.min(cursor.len()));
            println!("({shown} of {} rows)", cursor.len());
        }
    }

    Ok(())
}
