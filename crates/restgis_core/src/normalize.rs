//! Canonicalisation of geometry inputs into the `{geometryType, geometries}`
//! wire form used by spatial operations.
//!
//! Accepted inputs are a typed [`Geometry`], a [`GeometryCollection`], raw
//! JSON (one geometry, a `{geometries: [...]}` collection, or an array), a
//! mixed sequence of typed and raw items, or text holding any of those. Text
//! without JSON structure is read as an `xmin,ymin,xmax,ymax` box.

use crate::error::{ServiceError, ServiceResult};
use crate::geometry::{Envelope, Geometry, GeometryCollection, GeometryType, SpatialReference};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

const GEOMETRY_TYPE: &str = "geometryType";
const GEOMETRIES: &str = "geometries";

/// One element of a geometry sequence.
#[derive(Debug, Clone, PartialEq)]
pub enum GeometryItem {
    /// A typed geometry value.
    Geometry(Geometry),
    /// Raw geometry JSON, passed through unchanged.
    Raw(Map<String, Value>),
}

impl From<Geometry> for GeometryItem {
    fn from(geometry: Geometry) -> Self {
        Self::Geometry(geometry)
    }
}

impl From<Map<String, Value>> for GeometryItem {
    fn from(json: Map<String, Value>) -> Self {
        Self::Raw(json)
    }
}

/// Anything [`normalize`] accepts.
#[derive(Debug, Clone, PartialEq)]
pub enum GeometryInput {
    /// JSON text or a plain `xmin,ymin,xmax,ymax` box.
    Text(String),
    /// A single typed geometry.
    Geometry(Geometry),
    /// A typed collection.
    Collection(GeometryCollection),
    /// Structured JSON: one geometry, a collection mapping, or an array.
    Json(Value),
    /// A sequence of typed and raw geometries.
    Items(Vec<GeometryItem>),
}

impl From<&str> for GeometryInput {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for GeometryInput {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<Geometry> for GeometryInput {
    fn from(geometry: Geometry) -> Self {
        Self::Geometry(geometry)
    }
}

impl From<GeometryCollection> for GeometryInput {
    fn from(collection: GeometryCollection) -> Self {
        Self::Collection(collection)
    }
}

impl From<Value> for GeometryInput {
    fn from(value: Value) -> Self {
        Self::Json(value)
    }
}

impl From<Map<String, Value>> for GeometryInput {
    fn from(json: Map<String, Value>) -> Self {
        Self::Json(Value::Object(json))
    }
}

impl From<Envelope> for GeometryInput {
    fn from(envelope: Envelope) -> Self {
        Self::Json(Value::Object(envelope.to_json()))
    }
}

impl From<Vec<Geometry>> for GeometryInput {
    fn from(geometries: Vec<Geometry>) -> Self {
        Self::Items(geometries.into_iter().map(GeometryItem::Geometry).collect())
    }
}

impl From<Vec<GeometryItem>> for GeometryInput {
    fn from(items: Vec<GeometryItem>) -> Self {
        Self::Items(items)
    }
}

/// Canonical geometries parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedGeometries {
    /// Type tag shared by all geometries.
    #[serde(rename = "geometryType")]
    pub geometry_type: GeometryType,
    /// Raw geometries in input order.
    pub geometries: Vec<Map<String, Value>>,
}

impl NormalizedGeometries {
    /// JSON value form.
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Request parameter text.
    pub fn to_param(&self) -> String {
        self.to_json().to_string()
    }
}

#[derive(Default)]
struct Accumulator {
    declared: Option<GeometryType>,
    first_typed: Option<GeometryType>,
    geometries: Vec<Map<String, Value>>,
}

impl Accumulator {
    fn push_typed(&mut self, geometry: &Geometry, use_envelopes: bool) {
        let (json, geometry_type) = if use_envelopes {
            (geometry.envelope_json(), GeometryType::Envelope)
        } else {
            (geometry.to_json(), geometry.geometry_type())
        };
        self.geometries.push(json);
        self.first_typed.get_or_insert(geometry_type);
    }

    fn push_item(&mut self, item: GeometryItem, use_envelopes: bool) {
        match item {
            GeometryItem::Geometry(geometry) => self.push_typed(&geometry, use_envelopes),
            GeometryItem::Raw(json) => self.geometries.push(json),
        }
    }

    fn push_value(&mut self, value: Value) -> ServiceResult<()> {
        match value {
            Value::Object(json) => {
                self.geometries.push(json);
                Ok(())
            }
            Value::Array(ref coords) if coords.len() == 4 => {
                let bbox = coords
                    .iter()
                    .map(Value::as_f64)
                    .collect::<Option<Vec<_>>>()
                    .ok_or_else(|| invalid(&value))?;
                let envelope = Envelope::new(bbox[0], bbox[1], bbox[2], bbox[3]);
                self.geometries.push(envelope.to_json());
                Ok(())
            }
            other => Err(invalid(&other)),
        }
    }

    fn finish(self) -> ServiceResult<NormalizedGeometries> {
        let geometry_type = match self.declared.or(self.first_typed) {
            Some(tag) => tag,
            None => match self.geometries.first() {
                Some(first) => GeometryType::sniff(first),
                None => {
                    return Err(ServiceError::InvalidGeometry(
                        "no geometries supplied".into(),
                    ))
                }
            },
        };
        Ok(NormalizedGeometries {
            geometry_type,
            geometries: self.geometries,
        })
    }
}

fn invalid(value: &Value) -> ServiceError {
    ServiceError::InvalidGeometry(format!("unsupported geometry element: {value}"))
}

fn declared_type(json: &Map<String, Value>) -> Option<GeometryType> {
    let tag = json.get(GEOMETRY_TYPE)?.as_str()?;
    let parsed = GeometryType::from_wire(tag);
    if parsed.is_none() {
        tracing::debug!(tag, "unknown geometry type tag, falling back to structure");
    }
    parsed
}

fn parse_text(text: &str) -> ServiceResult<GeometryInput> {
    if text.contains('{') || text.contains('[') {
        return Ok(GeometryInput::Json(serde_json::from_str(text)?));
    }
    Envelope::parse_bbox(text)
        .map(GeometryInput::from)
        .ok_or_else(|| ServiceError::InvalidGeometry(format!("cannot interpret {text:?}")))
}

/// Canonicalises `input` into `{geometryType, geometries}`.
///
/// With `use_envelopes`, typed geometries are replaced by their bounding
/// envelopes; raw JSON always passes through untouched. The type tag is the
/// mapping's declared `geometryType` if any, else that of the first typed
/// geometry, else inferred from the structure of the first raw geometry.
pub fn normalize(
    input: impl Into<GeometryInput>,
    use_envelopes: bool,
) -> ServiceResult<NormalizedGeometries> {
    let input = match input.into() {
        GeometryInput::Text(text) => parse_text(&text)?,
        other => other,
    };

    let mut acc = Accumulator::default();
    match input {
        GeometryInput::Text(text) => {
            return Err(ServiceError::InvalidGeometry(format!("cannot interpret {text:?}")))
        }
        GeometryInput::Geometry(geometry) => acc.push_typed(&geometry, use_envelopes),
        GeometryInput::Collection(collection) => {
            for geometry in collection.iter() {
                acc.push_typed(geometry, use_envelopes);
            }
        }
        GeometryInput::Items(items) => {
            for item in items {
                acc.push_item(item, use_envelopes);
            }
        }
        GeometryInput::Json(Value::Object(mut json)) => {
            acc.declared = declared_type(&json);
            match json.remove(GEOMETRIES) {
                Some(Value::Array(items)) => {
                    for item in items {
                        acc.push_value(item)?;
                    }
                }
                Some(other) => return Err(invalid(&other)),
                None => {
                    json.remove(GEOMETRY_TYPE);
                    acc.geometries.push(json);
                }
            }
        }
        GeometryInput::Json(Value::Array(items)) => {
            for item in items {
                acc.push_value(item)?;
            }
        }
        GeometryInput::Json(other) => return Err(invalid(&other)),
    }
    acc.finish()
}

/// What a geometry-service response turned into.
#[derive(Debug, Clone, PartialEq)]
pub enum ReturnedGeometry {
    /// Exactly one geometry.
    Single(Geometry),
    /// Several geometries.
    Collection(GeometryCollection),
    /// The response as received (no spatial reference to stamp).
    Raw(Value),
}

/// Interprets a `{geometries: [...]}` response.
///
/// With a wkid every member is stamped with that spatial reference and the
/// result is typed; a single member is returned on its own. Without a wkid
/// the response is handed back unchanged.
pub fn return_geometry(response: Value, wkid: Option<i64>) -> ServiceResult<ReturnedGeometry> {
    if response.get(GEOMETRIES).is_none() {
        return Err(ServiceError::Protocol(
            "geometry response lacks a geometries array".into(),
        ));
    }
    let Some(wkid) = wkid else {
        return Ok(ReturnedGeometry::Raw(response));
    };
    let collection = GeometryCollection::from_json(&response)?;
    let mut geometries: Vec<Geometry> = collection
        .into_iter()
        .map(|g| g.with_spatial_reference(SpatialReference::wkid(wkid)))
        .collect();
    if geometries.len() == 1 {
        if let Some(single) = geometries.pop() {
            return Ok(ReturnedGeometry::Single(single));
        }
    }
    Ok(ReturnedGeometry::Collection(GeometryCollection::new(
        geometries,
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(value: Value) -> Map<String, Value> {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn raw_point_is_sniffed() {
        let out = normalize(json!({"x": 10, "y": 20}), false).unwrap();
        assert_eq!(out.geometry_type, GeometryType::Point);
        assert_eq!(out.geometries, vec![raw(json!({"x": 10, "y": 20}))]);
    }

    #[test]
    fn rings_are_polygons() {
        let out = normalize(json!({"rings": [[[0, 0], [1, 0], [1, 1], [0, 0]]]}), false).unwrap();
        assert_eq!(out.geometry_type, GeometryType::Polygon);
    }

    #[test]
    fn text_json_is_parsed() {
        let out = normalize(r#"{"paths": [[[0, 0], [5, 5]]]}"#, false).unwrap();
        assert_eq!(out.geometry_type, GeometryType::Polyline);
        assert_eq!(out.geometries.len(), 1);
    }

    #[test]
    fn text_bbox_is_an_envelope() {
        let out = normalize("-120,30,-110,40", false).unwrap();
        assert_eq!(out.geometry_type, GeometryType::Envelope);
        assert_eq!(out.geometries[0]["xmax"], -110.0);
        assert!(normalize("not a geometry", false).is_err());
    }

    #[test]
    fn single_typed_geometry_is_promoted() {
        let polygon = Geometry::from_json(json!({
            "rings": [[[0, 0], [2, 0], [2, 3], [0, 0]]],
            "spatialReference": {"wkid": 4326}
        }))
        .unwrap();

        let out = normalize(polygon.clone(), false).unwrap();
        assert_eq!(out.geometry_type, GeometryType::Polygon);
        assert_eq!(out.geometries, vec![polygon.to_json()]);

        let out = normalize(polygon, true).unwrap();
        assert_eq!(out.geometry_type, GeometryType::Envelope);
        assert_eq!(out.geometries[0]["ymax"], 3.0);
        assert_eq!(out.geometries[0]["spatialReference"]["wkid"], 4326);
    }

    #[test]
    fn first_typed_element_sets_tag() {
        let line = Geometry::from_json(json!({"paths": [[[0, 0], [1, 1]]]})).unwrap();
        let items = vec![
            GeometryItem::Raw(raw(json!({"x": 1, "y": 1}))),
            GeometryItem::Geometry(line),
        ];
        let out = normalize(items, false).unwrap();
        assert_eq!(out.geometry_type, GeometryType::Polyline);
        assert_eq!(out.geometries.len(), 2);
        assert_eq!(out.geometries[0], raw(json!({"x": 1, "y": 1})));
    }

    #[test]
    fn declared_tag_wins() {
        let out = normalize(
            json!({
                "geometryType": "esriGeometryMultipoint",
                "geometries": [{"x": 1, "y": 2}]
            }),
            false,
        )
        .unwrap();
        assert_eq!(out.geometry_type, GeometryType::Multipoint);
    }

    #[test]
    fn canonical_form_is_a_fixed_point() {
        let first = normalize(
            json!({"geometries": [{"rings": [[[0, 0], [1, 1], [0, 1], [0, 0]]]}, {"rings": []}]}),
            false,
        )
        .unwrap();
        let second = normalize(first.to_json(), false).unwrap();
        assert_eq!(first, second);
        let third = normalize(first.to_param(), true).unwrap();
        assert_eq!(first, third);
    }

    #[test]
    fn array_of_boxes_and_maps() {
        let boxes = json!([[0, 0, 1, 1], {"xmin": 2, "ymin": 2, "xmax": 3, "ymax": 3}]);
        let out = normalize(boxes, false).unwrap();
        assert_eq!(out.geometry_type, GeometryType::Envelope);
        assert_eq!(out.geometries.len(), 2);
        assert!(normalize(json!([1, 2]), false).is_err());
    }

    #[test]
    fn empty_input_is_rejected() {
        let err = normalize(json!({"geometries": []}), false).unwrap_err();
        assert!(matches!(err, ServiceError::InvalidGeometry(_)));
        assert!(normalize(Vec::<Geometry>::new(), false).is_err());
    }

    #[test]
    fn returned_geometry_shapes() {
        let one = json!({"geometries": [{"x": 1, "y": 2}]});
        match return_geometry(one.clone(), Some(3857)).unwrap() {
            ReturnedGeometry::Single(g) => {
                assert_eq!(g.spatial_reference(), Some(&SpatialReference::wkid(3857)))
            }
            other => panic!("expected single geometry, got {other:?}"),
        }
        assert_eq!(
            return_geometry(one.clone(), None).unwrap(),
            ReturnedGeometry::Raw(one)
        );

        let two = json!({"geometries": [{"x": 1, "y": 2}, {"x": 3, "y": 4}]});
        assert!(matches!(
            return_geometry(two, Some(4326)).unwrap(),
            ReturnedGeometry::Collection(c) if c.len() == 2
        ));
        assert!(return_geometry(json!({}), Some(4326)).is_err());
    }
}
