//! Field schema of a service layer or feature set.

use serde::{Deserialize, Serialize};

/// Type tag of a service field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FieldType {
    /// Object identity field.
    Oid,
    /// Shape (geometry) field.
    Geometry,
    /// Date stored as epoch milliseconds.
    Date,
    /// Text.
    String,
    /// 32-bit integer.
    Integer,
    /// 16-bit integer.
    SmallInteger,
    /// Double precision float.
    Double,
    /// Single precision float.
    Single,
    /// Global id.
    GlobalId,
    /// GUID.
    Guid,
    /// Binary blob.
    Blob,
    /// Raster.
    Raster,
    /// XML document.
    Xml,
    /// Any tag this crate does not know about.
    Other(String),
}

impl FieldType {
    /// Parses a wire tag such as `esriFieldTypeOID`.
    pub fn from_wire(tag: &str) -> Self {
        match tag {
            "esriFieldTypeOID" => Self::Oid,
            "esriFieldTypeGeometry" => Self::Geometry,
            "esriFieldTypeDate" => Self::Date,
            "esriFieldTypeString" => Self::String,
            "esriFieldTypeInteger" => Self::Integer,
            "esriFieldTypeSmallInteger" => Self::SmallInteger,
            "esriFieldTypeDouble" => Self::Double,
            "esriFieldTypeSingle" => Self::Single,
            "esriFieldTypeGlobalID" => Self::GlobalId,
            "esriFieldTypeGUID" => Self::Guid,
            "esriFieldTypeBlob" => Self::Blob,
            "esriFieldTypeRaster" => Self::Raster,
            "esriFieldTypeXML" => Self::Xml,
            other => Self::Other(other.to_string()),
        }
    }

    /// Returns the wire tag for this type.
    pub fn as_wire(&self) -> &str {
        match self {
            Self::Oid => "esriFieldTypeOID",
            Self::Geometry => "esriFieldTypeGeometry",
            Self::Date => "esriFieldTypeDate",
            Self::String => "esriFieldTypeString",
            Self::Integer => "esriFieldTypeInteger",
            Self::SmallInteger => "esriFieldTypeSmallInteger",
            Self::Double => "esriFieldTypeDouble",
            Self::Single => "esriFieldTypeSingle",
            Self::GlobalId => "esriFieldTypeGlobalID",
            Self::Guid => "esriFieldTypeGUID",
            Self::Blob => "esriFieldTypeBlob",
            Self::Raster => "esriFieldTypeRaster",
            Self::Xml => "esriFieldTypeXML",
            Self::Other(tag) => tag.as_str(),
        }
    }
}

impl From<String> for FieldType {
    fn from(tag: String) -> Self {
        Self::from_wire(&tag)
    }
}

impl From<FieldType> for String {
    fn from(field_type: FieldType) -> Self {
        field_type.as_wire().to_string()
    }
}

/// One field of a service schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    /// Field name as used in feature attributes.
    pub name: String,
    /// Type tag.
    #[serde(rename = "type")]
    pub field_type: FieldType,
    /// Display alias.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    /// Maximum length for text fields.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<u32>,
}

impl Field {
    /// Creates a field without alias or length.
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            alias: None,
            length: None,
        }
    }
}

/// Ordered field list of a layer or feature set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldSchema {
    fields: Vec<Field>,
}

impl FieldSchema {
    /// Creates a schema from an ordered field list.
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    /// All fields in declaration order.
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Field names in declaration order.
    pub fn names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    /// Looks up a field by exact name.
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Name of the first identity field, if the schema declares one.
    pub fn oid_field_name(&self) -> Option<&str> {
        self.first_of(&FieldType::Oid)
    }

    /// Name of the first shape field, if the schema declares one.
    pub fn shape_field_name(&self) -> Option<&str> {
        self.first_of(&FieldType::Geometry)
    }

    /// Names of all date fields.
    pub fn date_fields(&self) -> Vec<&str> {
        self.fields
            .iter()
            .filter(|f| f.field_type == FieldType::Date)
            .map(|f| f.name.as_str())
            .collect()
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns true if the schema declares no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    fn first_of(&self, field_type: &FieldType) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| &f.field_type == field_type)
            .map(|f| f.name.as_str())
    }
}

impl From<Vec<Field>> for FieldSchema {
    fn from(fields: Vec<Field>) -> Self {
        Self::new(fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parcels() -> FieldSchema {
        FieldSchema::new(vec![
            Field::new("OBJECTID", FieldType::Oid),
            Field::new("NAME", FieldType::String),
            Field::new("SURVEYED", FieldType::Date),
            Field::new("SHAPE", FieldType::Geometry),
        ])
    }

    #[test]
    fn special_field_names() {
        let schema = parcels();
        assert_eq!(schema.oid_field_name(), Some("OBJECTID"));
        assert_eq!(schema.shape_field_name(), Some("SHAPE"));
        assert_eq!(schema.date_fields(), vec!["SURVEYED"]);
        assert_eq!(schema.len(), 4);
    }

    #[test]
    fn schema_without_special_fields() {
        let schema = FieldSchema::new(vec![Field::new("NAME", FieldType::String)]);
        assert_eq!(schema.oid_field_name(), None);
        assert_eq!(schema.shape_field_name(), None);
        assert!(schema.date_fields().is_empty());
    }

    #[test]
    fn field_deserializes_from_wire() {
        let json = r#"[
            {"name": "OBJECTID", "type": "esriFieldTypeOID", "alias": "Object ID"},
            {"name": "CODE", "type": "esriFieldTypeSomethingNew"}
        ]"#;
        let schema: FieldSchema = serde_json::from_str(json).unwrap();
        assert_eq!(schema.fields()[0].field_type, FieldType::Oid);
        assert_eq!(schema.fields()[0].alias.as_deref(), Some("Object ID"));
        assert_eq!(
            schema.fields()[1].field_type,
            FieldType::Other("esriFieldTypeSomethingNew".into())
        );

        let back = serde_json::to_value(&schema).unwrap();
        assert_eq!(back[1]["type"], "esriFieldTypeSomethingNew");
    }
}
