//! Schema command implementation.

use super::load_feature_set;
use restgis_core::FieldSchema;
use serde::Serialize;
use std::path::Path;

/// One line of schema output.
#[derive(Debug, Serialize, PartialEq)]
pub struct FieldLine {
    /// Field name.
    pub name: String,
    /// Wire type tag.
    #[serde(rename = "type")]
    pub field_type: String,
    /// Alias, if different from the name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    /// Role of the field in a cursor (`OID@`, `SHAPE@`, `date`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<&'static str>,
}

/// Describes every field of `schema`.
pub fn describe(schema: &FieldSchema) -> Vec<FieldLine> {
    let oid = schema.oid_field_name();
    let shape = schema.shape_field_name();
    let dates = schema.date_fields();
    schema
        .fields()
        .iter()
        .map(|field| {
            let name = field.name.as_str();
            let role = if Some(name) == oid {
                Some("OID@")
            } else if Some(name) == shape {
                Some("SHAPE@")
            } else if dates.contains(&name) {
                Some("date")
            } else {
                None
            };
            FieldLine {
                name: field.name.clone(),
                field_type: field.field_type.as_wire().to_string(),
                alias: field.alias.clone().filter(|a| a != &field.name),
                role,
            }
        })
        .collect()
}

/// Runs the schema command.
pub fn run(path: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let batch = load_feature_set(path)?;
    let lines = describe(&batch.fields);

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&lines)?);
        }
        _ => {
            println!("{} fields", lines.len());
            for line in &lines {
                let role = line.role.map(|r| format!(" [{r}]")).unwrap_or_default();
                match &line.alias {
                    Some(alias) => {
                        println!("  {} ({}) \"{}\"{role}", line.name, line.field_type, alias)
                    }
                    None => println!("  {} ({}){role}", line.name, line.field_type),
                }
            }
        }
    }

    Ok(())
}
