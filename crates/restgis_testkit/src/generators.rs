//! Property-based test generators using proptest.
//!
//! Strategies produce schemas, field orders, raw geometries and feature sets
//! shaped like real service payloads.

use proptest::prelude::*;
use restgis_core::{
    FeatureRecord, FeatureSet, Field, FieldSchema, FieldType, GeometryType, SpatialReference,
};
use serde_json::{json, Map, Value};

/// Identity field name used by generated schemas.
pub const OID_FIELD: &str = "OBJECTID";

/// Shape field name used by generated schemas.
pub const SHAPE_FIELD: &str = "SHAPE";

/// Strategy for plain attribute field names.
pub fn field_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[A-Z][A-Z0-9_]{0,11}")
        .expect("Invalid regex")
        .prop_filter("reserved names", |s| s != OID_FIELD && s != SHAPE_FIELD)
}

fn attribute_type_strategy() -> impl Strategy<Value = FieldType> {
    prop_oneof![
        Just(FieldType::String),
        Just(FieldType::Integer),
        Just(FieldType::Double),
        Just(FieldType::Date),
    ]
}

/// Strategy for schemas: `OBJECTID`, up to six attributes, optionally `SHAPE`.
pub fn schema_strategy() -> impl Strategy<Value = FieldSchema> {
    (
        prop::collection::btree_map(field_name_strategy(), attribute_type_strategy(), 0..6),
        any::<bool>(),
    )
        .prop_map(|(attributes, with_shape)| {
            let mut fields = vec![Field::new(OID_FIELD, FieldType::Oid)];
            fields.extend(
                attributes
                    .into_iter()
                    .map(|(name, field_type)| Field::new(name, field_type)),
            );
            if with_shape {
                fields.push(Field::new(SHAPE_FIELD, FieldType::Geometry));
            }
            FieldSchema::new(fields)
        })
}

/// Strategy for a schema plus a requested order drawn from its field names.
///
/// The order may contain `SHAPE@` in any casing; it never contains `OID@`,
/// so the identity field appears at most once.
pub fn schema_and_order_strategy() -> impl Strategy<Value = (FieldSchema, Vec<String>)> {
    schema_strategy().prop_flat_map(|schema| {
        let mut candidates: Vec<String> = schema.names().into_iter().map(str::to_string).collect();
        candidates.push("shape@".to_string());
        let len = candidates.len();
        let order = prop::sample::subsequence(candidates, 0..=len).prop_shuffle();
        (Just(schema), order)
    })
}

fn coordinate() -> impl Strategy<Value = f64> {
    (-20_000_000i64..20_000_000i64).prop_map(|v| v as f64 / 10.0)
}

fn point_list(min: usize) -> impl Strategy<Value = Vec<Value>> {
    prop::collection::vec((coordinate(), coordinate()), min..8)
        .prop_map(|points| points.into_iter().map(|(x, y)| json!([x, y])).collect())
}

fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

/// Strategy for raw point geometry.
pub fn point_strategy() -> impl Strategy<Value = Map<String, Value>> {
    (coordinate(), coordinate()).prop_map(|(x, y)| object(json!({"x": x, "y": y})))
}

/// Strategy for raw multipoint geometry.
pub fn multipoint_strategy() -> impl Strategy<Value = Map<String, Value>> {
    point_list(1).prop_map(|points| object(json!({"points": points})))
}

/// Strategy for raw polyline geometry.
pub fn polyline_strategy() -> impl Strategy<Value = Map<String, Value>> {
    prop::collection::vec(point_list(2), 1..3).prop_map(|paths| object(json!({"paths": paths})))
}

/// Strategy for raw polygon geometry.
pub fn polygon_strategy() -> impl Strategy<Value = Map<String, Value>> {
    prop::collection::vec(point_list(3), 1..3).prop_map(|rings| object(json!({"rings": rings})))
}

/// Strategy for raw envelope geometry.
pub fn envelope_strategy() -> impl Strategy<Value = Map<String, Value>> {
    (coordinate(), coordinate(), 0.0f64..1000.0, 0.0f64..1000.0).prop_map(|(x, y, w, h)| {
        object(json!({"xmin": x, "ymin": y, "xmax": x + w, "ymax": y + h}))
    })
}

/// Strategy for raw geometry of any type, paired with that type.
pub fn geometry_json_strategy() -> impl Strategy<Value = (GeometryType, Map<String, Value>)> {
    prop_oneof![
        point_strategy().prop_map(|g| (GeometryType::Point, g)),
        multipoint_strategy().prop_map(|g| (GeometryType::Multipoint, g)),
        polyline_strategy().prop_map(|g| (GeometryType::Polyline, g)),
        polygon_strategy().prop_map(|g| (GeometryType::Polygon, g)),
        envelope_strategy().prop_map(|g| (GeometryType::Envelope, g)),
    ]
}

/// Strategy for epoch milliseconds between 1900 and 2200.
pub fn epoch_millis_strategy() -> impl Strategy<Value = i64> {
    -2_208_988_800_000i64..7_258_118_400_000i64
}

fn attribute_value(field_type: &FieldType) -> BoxedStrategy<Value> {
    let value = match field_type {
        FieldType::String => "[a-zA-Z0-9 ]{0,16}".prop_map(Value::from).boxed(),
        FieldType::Integer => any::<i32>().prop_map(Value::from).boxed(),
        FieldType::Double => (-1.0e6f64..1.0e6).prop_map(Value::from).boxed(),
        FieldType::Date => epoch_millis_strategy().prop_map(Value::from).boxed(),
        _ => Just(Value::Null).boxed(),
    };
    prop_oneof![9 => value, 1 => Just(Value::Null)].boxed()
}

/// Strategy for feature sets with point geometry and `0..max` features.
pub fn feature_set_strategy(max: usize) -> impl Strategy<Value = FeatureSet> {
    schema_strategy().prop_flat_map(move |schema| {
        let attributes: Vec<(String, FieldType)> = schema
            .fields()
            .iter()
            .filter(|f| !matches!(f.field_type, FieldType::Oid | FieldType::Geometry))
            .map(|f| (f.name.clone(), f.field_type.clone()))
            .collect();
        let row = (
            attributes
                .iter()
                .map(|(_, t)| attribute_value(t))
                .collect::<Vec<_>>(),
            prop::option::of(point_strategy()),
        );
        let names: Vec<String> = attributes.into_iter().map(|(n, _)| n).collect();
        prop::collection::vec(row, 0..max).prop_map(move |rows| {
            let features = rows
                .into_iter()
                .enumerate()
                .map(|(i, (values, geometry))| {
                    let mut map = Map::new();
                    map.insert(OID_FIELD.to_string(), json!(i as i64 + 1));
                    for (name, value) in names.iter().zip(values) {
                        map.insert(name.clone(), value);
                    }
                    FeatureRecord::new(map, geometry)
                })
                .collect();
            let mut batch =
                FeatureSet::new(schema.clone(), Some(SpatialReference::wkid(102100)), features);
            batch.geometry_type = Some(GeometryType::Point);
            batch
        })
    })
}
