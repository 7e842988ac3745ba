//! Property tests for cursor resolution, geometry normalisation and dates.

use proptest::prelude::*;
use restgis_core::{
    datetime_to_millis, join_object_ids, millis_to_datetime, normalize, Cursor, FeatureSet,
    FieldOrder, FieldSelection, FieldToken, NormalizedGeometries,
};
use restgis_testkit::generators::*;
use serde_json::{json, Value};

proptest! {
    #[test]
    fn identity_name_becomes_token_in_place((schema, order) in schema_and_order_strategy()) {
        prop_assume!(!order.is_empty());
        let resolved = FieldOrder::resolve(&FieldSelection::from(order.clone()), &schema);

        prop_assert_eq!(resolved.len(), order.len());
        for (name, token) in order.iter().zip(resolved.tokens()) {
            if name == OID_FIELD {
                prop_assert_eq!(token, &FieldToken::Oid);
            }
        }
        let oid_names = order.iter().filter(|n| *n == OID_FIELD).count();
        let oid_tokens = resolved.tokens().iter().filter(|t| **t == FieldToken::Oid).count();
        prop_assert_eq!(oid_names, oid_tokens);
        prop_assert!(oid_tokens <= 1);
    }

    #[test]
    fn resolution_is_idempotent((schema, order) in schema_and_order_strategy()) {
        let selection = FieldSelection::from(order);
        let first = FieldOrder::resolve(&selection, &schema);
        let second = FieldOrder::resolve(&selection, &schema);
        prop_assert_eq!(&first, &second);

        let again = FieldOrder::resolve(&first.to_selection(), &schema);
        prop_assert_eq!(&first, &again);
    }

    #[test]
    fn empty_batches_yield_no_rows(schema in schema_strategy(), order in "[A-Z@,]{0,20}") {
        let batch = FeatureSet::new(schema, None, Vec::new());
        let cursor = Cursor::new(batch, order.as_str());
        prop_assert_eq!(cursor.rows().count(), 0);
        prop_assert_eq!(cursor.row_values().count(), 0);
        prop_assert!(cursor.row_at(0).is_err());
    }

    #[test]
    fn every_row_has_one_value_per_column(batch in feature_set_strategy(12)) {
        let expected = batch.len();
        let cursor = Cursor::new(batch, "OID@,SHAPE@");
        let columns = cursor.field_names().len();
        let mut rows = 0;
        for values in cursor.row_values() {
            prop_assert_eq!(values.len(), columns);
            rows += 1;
        }
        prop_assert_eq!(rows, expected);
        // restartable
        prop_assert_eq!(cursor.rows().count(), expected);
    }

    #[test]
    fn canonical_form_round_trips(
        (geometry_type, raw) in geometry_json_strategy(),
        envelopes in any::<bool>(),
    ) {
        let canonical = json!({
            "geometryType": geometry_type.as_wire(),
            "geometries": [raw.clone()]
        });
        let normalized = normalize(canonical.clone(), envelopes).unwrap();
        prop_assert_eq!(
            &normalized,
            &NormalizedGeometries { geometry_type, geometries: vec![raw] }
        );
        prop_assert_eq!(normalized.to_json(), canonical);
    }

    #[test]
    fn untyped_geometry_type_is_sniffed((geometry_type, raw) in geometry_json_strategy()) {
        let normalized = normalize(Value::Object(raw), false).unwrap();
        prop_assert_eq!(normalized.geometry_type, geometry_type);
        prop_assert_eq!(normalized.geometries.len(), 1);
    }

    #[test]
    fn dates_are_plain_millisecond_arithmetic(millis in epoch_millis_strategy()) {
        let date = millis_to_datetime(millis).unwrap();
        prop_assert_eq!(datetime_to_millis(&date), millis);
    }

    #[test]
    fn object_ids_join_and_split(ids in prop::collection::vec(any::<i64>(), 1..20)) {
        let text = join_object_ids(&ids);
        let parsed: Vec<i64> = text.split(", ").map(|s| s.parse().unwrap()).collect();
        prop_assert_eq!(parsed, ids);
    }
}

#[test]
fn known_example_from_schema() {
    use restgis_core::{Field, FieldSchema, FieldType};

    let schema = FieldSchema::new(vec![
        Field::new("OBJECTID", FieldType::Oid),
        Field::new("NAME", FieldType::String),
        Field::new("SHAPE", FieldType::Geometry),
    ]);
    let cursor = Cursor::new(FeatureSet::new(schema, None, Vec::new()), "SHAPE@,NAME,OID@");
    assert_eq!(
        cursor.field_order().tokens(),
        &[
            FieldToken::Shape,
            FieldToken::Name("NAME".into()),
            FieldToken::Oid
        ]
    );
    assert_eq!(cursor.field_names(), vec!["SHAPE", "NAME", "OBJECTID"]);
}
