//! Sink abstraction for materialised cursor rows.
//!
//! Writers for concrete formats live outside this crate; they implement
//! [`RowExporter`] and receive column names plus ordered row values.

use crate::cursor::RowValue;
use crate::error::ServiceResult;
use std::collections::BTreeMap;

/// Outcome of one export.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportSummary {
    /// Where the rows were written.
    pub target: String,
    /// Number of rows written.
    pub rows_written: usize,
}

/// Receives cursor rows for writing.
pub trait RowExporter {
    /// Writes `rows` with columns `fields` to `target`.
    fn export_rows(
        &mut self,
        target: &str,
        fields: &[String],
        rows: &[Vec<RowValue>],
    ) -> ServiceResult<ExportSummary>;
}

/// Rows captured by [`MemoryExporter`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExportedTable {
    /// Column names.
    pub fields: Vec<String>,
    /// Row values.
    pub rows: Vec<Vec<RowValue>>,
}

/// An exporter that keeps everything in memory, keyed by target.
#[derive(Debug, Default)]
pub struct MemoryExporter {
    outputs: BTreeMap<String, ExportedTable>,
}

impl MemoryExporter {
    /// Creates an empty exporter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rows written to `target`, if any.
    pub fn output(&self, target: &str) -> Option<&ExportedTable> {
        self.outputs.get(target)
    }

    /// Targets written so far.
    pub fn targets(&self) -> Vec<&str> {
        self.outputs.keys().map(String::as_str).collect()
    }
}

impl RowExporter for MemoryExporter {
    fn export_rows(
        &mut self,
        target: &str,
        fields: &[String],
        rows: &[Vec<RowValue>],
    ) -> ServiceResult<ExportSummary> {
        self.outputs.insert(
            target.to_string(),
            ExportedTable {
                fields: fields.to_vec(),
                rows: rows.to_vec(),
            },
        );
        Ok(ExportSummary {
            target: target.to_string(),
            rows_written: rows.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_exporter_replaces_target() {
        let mut sink = MemoryExporter::new();
        let fields = vec!["A".to_string()];
        sink.export_rows("t", &fields, &[vec![RowValue::Integer(1)]])
            .unwrap();
        let summary = sink.export_rows("t", &fields, &[]).unwrap();
        assert_eq!(summary.rows_written, 0);
        assert!(sink.output("t").unwrap().rows.is_empty());
        assert_eq!(sink.targets(), vec!["t"]);
    }
}
