//! Row cursor over a feature set.
//!
//! A [`Cursor`] projects every feature of a [`FeatureSet`] through a
//! resolved [`FieldOrder`]. The field order accepts two reserved tokens,
//! `OID@` for the identity field and `SHAPE@` for the geometry, which are
//! case-insensitive. Literal names equal to the schema's identity or shape
//! field are rewritten to the matching token.
//!
//! ## Soft failures
//!
//! Names that do not exist in the schema are kept in the order and read as
//! [`RowValue::Null`]. A partially invalid order never aborts iteration.

use crate::datetime::millis_to_datetime;
use crate::error::{ServiceError, ServiceResult};
use crate::export::{ExportSummary, RowExporter};
use crate::feature::{FeatureRecord, FeatureSet};
use crate::geometry::{Geometry, GeometryType};
use crate::schema::FieldSchema;
use chrono::NaiveDateTime;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Identity token.
pub const OID_TOKEN: &str = "OID@";
/// Geometry token.
pub const SHAPE_TOKEN: &str = "SHAPE@";

/// One resolved entry of a field order.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldToken {
    /// The identity field.
    Oid,
    /// The geometry.
    Shape,
    /// A literal attribute name.
    Name(String),
}

impl fmt::Display for FieldToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldToken::Oid => f.write_str(OID_TOKEN),
            FieldToken::Shape => f.write_str(SHAPE_TOKEN),
            FieldToken::Name(name) => f.write_str(name),
        }
    }
}

/// Fields requested by a caller before resolution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum FieldSelection {
    /// Every field in schema order.
    #[default]
    All,
    /// Explicit names and tokens in order.
    Names(Vec<String>),
}

impl FieldSelection {
    /// Parses a comma-delimited list. Empty input and `*` select all fields.
    pub fn parse(text: &str) -> Self {
        let names: Vec<String> = text
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        Self::from_names(names)
    }

    fn from_names(names: Vec<String>) -> Self {
        if names.is_empty() || (names.len() == 1 && names[0] == "*") {
            Self::All
        } else {
            Self::Names(names)
        }
    }
}

impl From<&str> for FieldSelection {
    fn from(text: &str) -> Self {
        Self::parse(text)
    }
}

impl From<String> for FieldSelection {
    fn from(text: String) -> Self {
        Self::parse(&text)
    }
}

impl From<Vec<String>> for FieldSelection {
    fn from(names: Vec<String>) -> Self {
        Self::from_names(names)
    }
}

impl From<Vec<&str>> for FieldSelection {
    fn from(names: Vec<&str>) -> Self {
        Self::from_names(names.into_iter().map(str::to_string).collect())
    }
}

impl From<&[&str]> for FieldSelection {
    fn from(names: &[&str]) -> Self {
        Self::from_names(names.iter().map(|s| s.to_string()).collect())
    }
}

impl From<Option<&str>> for FieldSelection {
    fn from(text: Option<&str>) -> Self {
        text.map(Self::parse).unwrap_or_default()
    }
}

/// A field order resolved against a schema.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldOrder {
    tokens: Vec<FieldToken>,
}

impl FieldOrder {
    /// Resolves a selection against a schema.
    pub fn resolve(selection: &FieldSelection, schema: &FieldSchema) -> Self {
        let names: Vec<String> = match selection {
            FieldSelection::All => schema.names().into_iter().map(str::to_string).collect(),
            FieldSelection::Names(names) => names.clone(),
        };
        let oid = schema.oid_field_name();
        let shape = schema.shape_field_name();

        let tokens = names
            .into_iter()
            .map(|name| {
                let name = if name.contains('@') {
                    name.to_uppercase()
                } else {
                    name
                };
                if name == OID_TOKEN || Some(name.as_str()) == oid {
                    FieldToken::Oid
                } else if name == SHAPE_TOKEN || Some(name.as_str()) == shape {
                    FieldToken::Shape
                } else {
                    if schema.field(&name).is_none() {
                        tracing::debug!(field = %name, "field not in schema, values will be null");
                    }
                    FieldToken::Name(name)
                }
            })
            .collect();

        Self { tokens }
    }

    /// Resolved tokens in order.
    pub fn tokens(&self) -> &[FieldToken] {
        &self.tokens
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Returns true if no columns are selected.
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Token text of every column, the inverse of resolution.
    pub fn to_selection(&self) -> FieldSelection {
        FieldSelection::Names(self.tokens.iter().map(ToString::to_string).collect())
    }
}

/// A typed cell value.
#[derive(Debug, Clone, PartialEq)]
pub enum RowValue {
    /// Absent or null attribute.
    Null,
    /// Boolean.
    Bool(bool),
    /// Integral number.
    Integer(i64),
    /// Floating point number.
    Double(f64),
    /// Text.
    Text(String),
    /// Date converted from epoch milliseconds.
    Date(NaiveDateTime),
    /// Geometry with the batch spatial reference.
    Geometry(Geometry),
    /// Any other JSON structure, passed through.
    Json(Value),
}

impl RowValue {
    /// Returns true for [`RowValue::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, RowValue::Null)
    }

    /// Integer content.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            RowValue::Integer(n) => Some(*n),
            _ => None,
        }
    }

    /// Floating point content; integers are widened.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            RowValue::Double(n) => Some(*n),
            RowValue::Integer(n) => Some(*n as f64),
            _ => None,
        }
    }

    /// Text content.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            RowValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Date content.
    pub fn as_date(&self) -> Option<&NaiveDateTime> {
        match self {
            RowValue::Date(d) => Some(d),
            _ => None,
        }
    }

    /// Geometry content.
    pub fn as_geometry(&self) -> Option<&Geometry> {
        match self {
            RowValue::Geometry(g) => Some(g),
            _ => None,
        }
    }

    /// JSON form; dates become ISO-8601 text, geometries their raw shape.
    pub fn to_json(&self) -> Value {
        match self {
            RowValue::Null => Value::Null,
            RowValue::Bool(b) => Value::Bool(*b),
            RowValue::Integer(n) => Value::from(*n),
            RowValue::Double(n) => Value::from(*n),
            RowValue::Text(s) => Value::String(s.clone()),
            RowValue::Date(d) => Value::String(d.format("%Y-%m-%dT%H:%M:%S%.3f").to_string()),
            RowValue::Geometry(g) => Value::Object(g.to_json()),
            RowValue::Json(v) => v.clone(),
        }
    }
}

impl From<&Value> for RowValue {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => RowValue::Null,
            Value::Bool(b) => RowValue::Bool(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => RowValue::Integer(i),
                None => n.as_f64().map(RowValue::Double).unwrap_or(RowValue::Null),
            },
            Value::String(s) => RowValue::Text(s.clone()),
            other => RowValue::Json(other.clone()),
        }
    }
}

impl fmt::Display for RowValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowValue::Null => f.write_str("null"),
            RowValue::Bool(b) => write!(f, "{b}"),
            RowValue::Integer(n) => write!(f, "{n}"),
            RowValue::Double(n) => write!(f, "{n}"),
            RowValue::Text(s) => f.write_str(s),
            RowValue::Date(d) => write!(f, "{d}"),
            RowValue::Geometry(g) => write!(f, "{g}"),
            RowValue::Json(v) => write!(f, "{v}"),
        }
    }
}

/// Cursor over one feature set with a fixed field order.
#[derive(Debug, Clone)]
pub struct Cursor {
    batch: Arc<FeatureSet>,
    order: FieldOrder,
    date_fields: Vec<String>,
}

impl Cursor {
    /// Creates a cursor. The field order is resolved once here and never again.
    pub fn new(batch: impl Into<Arc<FeatureSet>>, fields: impl Into<FieldSelection>) -> Self {
        let batch = batch.into();
        let order = FieldOrder::resolve(&fields.into(), &batch.fields);
        let date_fields = batch
            .fields
            .date_fields()
            .into_iter()
            .map(str::to_string)
            .collect();
        Self {
            batch,
            order,
            date_fields,
        }
    }

    /// The underlying feature set.
    pub fn feature_set(&self) -> &FeatureSet {
        &self.batch
    }

    /// The resolved field order.
    pub fn field_order(&self) -> &FieldOrder {
        &self.order
    }

    /// Identity field name, if the schema declares one.
    pub fn oid_field_name(&self) -> Option<&str> {
        self.batch.fields.oid_field_name()
    }

    /// Shape field name, if the schema declares one.
    pub fn shape_field_name(&self) -> Option<&str> {
        self.batch.fields.shape_field_name()
    }

    /// Names of the date fields in the schema.
    pub fn date_fields(&self) -> &[String] {
        &self.date_fields
    }

    /// Display names of the columns.
    ///
    /// Tokens map back to the schema's identity/shape field names; without
    /// such a field the token text itself is used.
    pub fn field_names(&self) -> Vec<String> {
        self.order
            .tokens()
            .iter()
            .map(|token| match token {
                FieldToken::Oid => self.oid_field_name().unwrap_or(OID_TOKEN).to_string(),
                FieldToken::Shape => self.shape_field_name().unwrap_or(SHAPE_TOKEN).to_string(),
                FieldToken::Name(name) => name.clone(),
            })
            .collect()
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.batch.len()
    }

    /// Returns true if there are no rows.
    pub fn is_empty(&self) -> bool {
        self.batch.is_empty()
    }

    /// Lazy row views in batch order. Every call starts from the first row.
    pub fn rows(&self) -> Rows<'_> {
        Rows {
            cursor: self,
            features: self.batch.features.iter(),
        }
    }

    /// Lazy row value tuples in batch order.
    pub fn row_values(&self) -> RowValues<'_> {
        RowValues { rows: self.rows() }
    }

    /// Row at `index`.
    ///
    /// Convenience only: materialises every row before indexing.
    pub fn row_at(&self, index: usize) -> ServiceResult<Row<'_>> {
        let mut rows: Vec<Row<'_>> = self.rows().collect();
        let len = rows.len();
        if index >= len {
            return Err(ServiceError::IndexOutOfRange { index, len });
        }
        Ok(rows.swap_remove(index))
    }

    /// Hands column names and all row values to an exporter.
    pub fn export<E: RowExporter + ?Sized>(
        &self,
        exporter: &mut E,
        target: &str,
    ) -> ServiceResult<ExportSummary> {
        let fields = self.field_names();
        let rows: Vec<Vec<RowValue>> = self.row_values().collect();
        tracing::debug!(target_path = target, rows = rows.len(), "exporting cursor rows");
        exporter.export_rows(target, &fields, &rows)
    }

    fn is_date_field(&self, name: &str) -> bool {
        self.date_fields.iter().any(|d| d == name)
    }
}

impl<'a> IntoIterator for &'a Cursor {
    type Item = Vec<RowValue>;
    type IntoIter = RowValues<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.row_values()
    }
}

/// Iterator over row views.
#[derive(Debug, Clone)]
pub struct Rows<'c> {
    cursor: &'c Cursor,
    features: std::slice::Iter<'c, FeatureRecord>,
}

impl<'c> Iterator for Rows<'c> {
    type Item = Row<'c>;

    fn next(&mut self) -> Option<Self::Item> {
        self.features.next().map(|feature| Row {
            cursor: self.cursor,
            feature,
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.features.size_hint()
    }
}

impl ExactSizeIterator for Rows<'_> {}

/// Iterator over row value tuples.
#[derive(Debug, Clone)]
pub struct RowValues<'c> {
    rows: Rows<'c>,
}

impl Iterator for RowValues<'_> {
    type Item = Vec<RowValue>;

    fn next(&mut self) -> Option<Self::Item> {
        self.rows.next().map(|row| row.values())
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.rows.size_hint()
    }
}

impl ExactSizeIterator for RowValues<'_> {}

/// Read-only projection of one feature through the cursor's field order.
#[derive(Debug, Clone, Copy)]
pub struct Row<'c> {
    cursor: &'c Cursor,
    feature: &'c FeatureRecord,
}

impl<'c> Row<'c> {
    /// The underlying feature record.
    pub fn feature(&self) -> &'c FeatureRecord {
        self.feature
    }

    /// Raw attribute value by field name.
    pub fn get(&self, field: &str) -> Option<&'c Value> {
        self.feature.attributes.get(field)
    }

    /// Identity value, null when the schema has no identity field.
    pub fn oid(&self) -> RowValue {
        self.cursor
            .oid_field_name()
            .and_then(|name| self.get(name))
            .map(RowValue::from)
            .unwrap_or(RowValue::Null)
    }

    /// Deep copy of the feature geometry carrying the batch spatial reference.
    pub fn geometry(&self) -> Option<Geometry> {
        let raw = self.feature.geometry.clone()?;
        let batch = self.cursor.feature_set();
        let geometry_type = batch
            .geometry_type
            .unwrap_or_else(|| GeometryType::sniff(&raw));
        let geometry = Geometry::new(geometry_type, raw);
        Some(match &batch.spatial_reference {
            Some(sr) => geometry.with_spatial_reference(sr.clone()),
            None => geometry,
        })
    }

    /// Value of one resolved column.
    pub fn value_of(&self, token: &FieldToken) -> RowValue {
        match token {
            FieldToken::Name(name) if self.cursor.is_date_field(name) => self
                .get(name)
                .and_then(epoch_millis)
                .and_then(millis_to_datetime)
                .map(RowValue::Date)
                .unwrap_or(RowValue::Null),
            FieldToken::Oid => self.oid(),
            FieldToken::Shape => self
                .geometry()
                .map(RowValue::Geometry)
                .unwrap_or(RowValue::Null),
            FieldToken::Name(name) => self.get(name).map(RowValue::from).unwrap_or(RowValue::Null),
        }
    }

    /// All column values in field order.
    pub fn values(&self) -> Vec<RowValue> {
        self.cursor
            .order
            .tokens()
            .iter()
            .map(|token| self.value_of(token))
            .collect()
    }

    /// Column value by position.
    pub fn value(&self, index: usize) -> Option<RowValue> {
        self.cursor
            .order
            .tokens()
            .get(index)
            .map(|token| self.value_of(token))
    }
}

fn epoch_millis(value: &Value) -> Option<i64> {
    value
        .as_i64()
        .or_else(|| value.as_f64().map(|f| f.trunc() as i64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::MemoryExporter;
    use crate::geometry::SpatialReference;
    use crate::schema::{Field, FieldType};
    use chrono::NaiveDate;
    use serde_json::json;

    fn schema() -> FieldSchema {
        FieldSchema::new(vec![
            Field::new("OBJECTID", FieldType::Oid),
            Field::new("NAME", FieldType::String),
            Field::new("SHAPE", FieldType::Geometry),
        ])
    }

    fn batch() -> FeatureSet {
        FeatureSet::from_json(json!({
            "geometryType": "esriGeometryPoint",
            "spatialReference": {"wkid": 102100},
            "fields": [
                {"name": "OBJECTID", "type": "esriFieldTypeOID"},
                {"name": "NAME", "type": "esriFieldTypeString"},
                {"name": "INSPECTED", "type": "esriFieldTypeDate"},
                {"name": "SHAPE", "type": "esriFieldTypeGeometry"}
            ],
            "features": [
                {
                    "attributes": {
                        "OBJECTID": 1,
                        "NAME": "Hydrant",
                        "INSPECTED": 1429885595000_i64
                    },
                    "geometry": {"x": -10350208.4, "y": 5663994.8}
                },
                {
                    "attributes": {"OBJECTID": 2, "NAME": null, "INSPECTED": null}
                }
            ]
        }))
        .unwrap()
    }

    #[test]
    fn resolves_tokens_and_names() {
        let order = FieldOrder::resolve(&"SHAPE@,NAME,OID@".into(), &schema());
        assert_eq!(
            order.tokens(),
            &[
                FieldToken::Shape,
                FieldToken::Name("NAME".into()),
                FieldToken::Oid
            ]
        );

        let cursor = Cursor::new(
            FeatureSet::new(schema(), None, vec![]),
            "SHAPE@,NAME,OID@",
        );
        assert_eq!(cursor.field_names(), vec!["SHAPE", "NAME", "OBJECTID"]);
    }

    #[test]
    fn literal_special_names_become_tokens() {
        let order = FieldOrder::resolve(&vec!["NAME", "OBJECTID", "shape@"].into(), &schema());
        assert_eq!(
            order.tokens(),
            &[
                FieldToken::Name("NAME".into()),
                FieldToken::Oid,
                FieldToken::Shape
            ]
        );
    }

    #[test]
    fn default_order_is_schema_order() {
        let cursor = Cursor::new(batch(), FieldSelection::All);
        assert_eq!(
            cursor.field_order().tokens(),
            &[
                FieldToken::Oid,
                FieldToken::Name("NAME".into()),
                FieldToken::Name("INSPECTED".into()),
                FieldToken::Shape
            ]
        );
        assert_eq!(Cursor::new(batch(), "").field_order().len(), 4);
        assert_eq!(Cursor::new(batch(), "*").field_order().len(), 4);
    }

    #[test]
    fn tokens_without_schema_fields_keep_token_labels() {
        let schema = FieldSchema::new(vec![Field::new("NAME", FieldType::String)]);
        let fs = FeatureSet::new(
            schema,
            None,
            vec![FeatureRecord::new(
                json!({"NAME": "a"}).as_object().unwrap().clone(),
                None,
            )],
        );
        let cursor = Cursor::new(fs, "oid@,NAME,SHAPE@");
        assert_eq!(cursor.field_names(), vec!["OID@", "NAME", "SHAPE@"]);
        let values = cursor.row_values().next().unwrap();
        assert_eq!(
            values,
            vec![RowValue::Null, RowValue::Text("a".into()), RowValue::Null]
        );
    }

    #[test]
    fn row_values_follow_extraction_rules() {
        let cursor = Cursor::new(batch(), "OID@,NAME,INSPECTED,SHAPE@,MISSING");
        let rows: Vec<_> = cursor.row_values().collect();
        assert_eq!(rows.len(), 2);

        let first = &rows[0];
        assert_eq!(first[0], RowValue::Integer(1));
        assert_eq!(first[1], RowValue::Text("Hydrant".into()));
        let expected = NaiveDate::from_ymd_opt(2015, 4, 24)
            .unwrap()
            .and_hms_opt(14, 26, 35)
            .unwrap();
        assert_eq!(first[2], RowValue::Date(expected));
        let geometry = first[3].as_geometry().unwrap();
        assert_eq!(geometry.spatial_reference(), Some(&SpatialReference::wkid(102100)));
        assert_eq!(geometry.geometry_type(), GeometryType::Point);
        assert!(first[4].is_null());

        let second = &rows[1];
        assert_eq!(second[0], RowValue::Integer(2));
        assert!(second[1].is_null());
        assert!(second[2].is_null());
        assert!(second[3].is_null());
    }

    #[test]
    fn geometry_copy_does_not_touch_batch() {
        let cursor = Cursor::new(batch(), "SHAPE@");
        let row = cursor.rows().next().unwrap();
        let geometry = row.geometry().unwrap();
        assert_eq!(geometry.to_json()["spatialReference"]["wkid"], 102100);
        let raw = cursor.feature_set().features[0].geometry.as_ref().unwrap();
        assert!(!raw.contains_key("spatialReference"));
    }

    #[test]
    fn rows_are_restartable() {
        let cursor = Cursor::new(batch(), "NAME");
        assert_eq!(cursor.rows().count(), 2);
        assert_eq!(cursor.rows().count(), 2);
        assert_eq!((&cursor).into_iter().len(), 2);
    }

    #[test]
    fn row_access_by_index() {
        let cursor = Cursor::new(batch(), "NAME,OID@");
        let row = cursor.row_at(1).unwrap();
        assert_eq!(row.value(1), Some(RowValue::Integer(2)));
        assert_eq!(row.value(5), None);
        assert_eq!(row.get("OBJECTID"), Some(&json!(2)));

        let err = cursor.row_at(2).unwrap_err();
        assert!(matches!(
            err,
            ServiceError::IndexOutOfRange { index: 2, len: 2 }
        ));
    }

    #[test]
    fn empty_batch_yields_no_rows() {
        let cursor = Cursor::new(FeatureSet::new(schema(), None, vec![]), "");
        assert!(cursor.is_empty());
        assert_eq!(cursor.rows().next().map(|r| r.values()), None);
        assert!(cursor.row_at(0).is_err());
    }

    #[test]
    fn cursors_share_one_batch() {
        let shared = Arc::new(batch());
        let a = Cursor::new(Arc::clone(&shared), "NAME");
        let b = Cursor::new(Arc::clone(&shared), "OID@");
        assert_eq!(a.len(), b.len());
        assert_eq!(Arc::strong_count(&shared), 3);
    }

    #[test]
    fn export_hands_rows_to_sink() {
        let cursor = Cursor::new(batch(), "OID@,NAME");
        let mut sink = MemoryExporter::new();
        let summary = cursor.export(&mut sink, "memory://hydrants").unwrap();
        assert_eq!(summary.rows_written, 2);
        let written = sink.output("memory://hydrants").unwrap();
        assert_eq!(written.fields, vec!["OBJECTID", "NAME"]);
        assert_eq!(written.rows[0][1], RowValue::Text("Hydrant".into()));
    }

    proptest::proptest! {
        #[test]
        fn parse_ignores_padding_and_empty_segments(
            names in proptest::collection::vec("[A-Za-z_][A-Za-z0-9_@]{0,10}", 1..6),
            pad in "[ \t]{0,3}",
        ) {
            let text = names
                .iter()
                .map(|n| format!("{pad}{n}{pad}"))
                .collect::<Vec<_>>()
                .join(",,");
            proptest::prop_assert_eq!(FieldSelection::parse(&text), FieldSelection::Names(names));
        }
    }
}
