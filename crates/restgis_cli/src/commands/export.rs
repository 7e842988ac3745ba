//! Export command implementation.

use super::load_feature_set;
use restgis_core::{Cursor, ExportSummary, RowExporter, RowValue, ServiceError, ServiceResult};
use serde_json::{Map, Value};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Writes rows as JSON lines, one object per row, to the file named by the target.
#[derive(Debug, Default)]
pub struct JsonLinesExporter;

impl JsonLinesExporter {
    fn write_rows(
        target: &str,
        fields: &[String],
        rows: &[Vec<RowValue>],
    ) -> std::io::Result<()> {
        let mut out = BufWriter::new(File::create(target)?);
        for values in rows {
            let line: Map<String, Value> = fields
                .iter()
                .cloned()
                .zip(values.iter().map(RowValue::to_json))
                .collect();
            serde_json::to_writer(&mut out, &line)?;
            out.write_all(b"\n")?;
        }
        out.flush()
    }
}

impl RowExporter for JsonLinesExporter {
    fn export_rows(
        &mut self,
        target: &str,
        fields: &[String],
        rows: &[Vec<RowValue>],
    ) -> ServiceResult<ExportSummary> {
        Self::write_rows(target, fields, rows).map_err(|e| ServiceError::Export {
            target: target.to_string(),
            message: e.to_string(),
        })?;
        Ok(ExportSummary {
            target: target.to_string(),
            rows_written: rows.len(),
        })
    }
}

/// Runs the export command.
pub fn run(path: &Path, out: &Path, fields: &str) -> Result<(), Box<dyn std::error::Error>> {
    let cursor = Cursor::new(load_feature_set(path)?, fields);
    let target = out.to_string_lossy();
    let summary = cursor.export(&mut JsonLinesExporter, &target)?;
    tracing::info!(target_path = %summary.target, rows = summary.rows_written, "export complete");
    println!("Wrote {} rows to {}", summary.rows_written, summary.target);
    Ok(())
}
