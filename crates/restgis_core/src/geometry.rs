//! Geometry values in the service's JSON representation.
//!
//! Geometries are kept as raw JSON maps (the wire form) together with their
//! type tag and spatial reference. Nothing here evaluates spatial predicates;
//! the only derived quantity is the bounding envelope.

use crate::error::{ServiceError, ServiceResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Key carrying a spatial reference inside geometry JSON.
pub const SPATIAL_REFERENCE: &str = "spatialReference";

/// Coordinate system descriptor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpatialReference {
    /// Well-known id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wkid: Option<i64>,
    /// Latest well-known id for the same system.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_wkid: Option<i64>,
    /// Full well-known-text definition.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wkt: Option<String>,
}

impl SpatialReference {
    /// Creates a spatial reference from a well-known id.
    pub fn wkid(wkid: i64) -> Self {
        Self {
            wkid: Some(wkid),
            ..Self::default()
        }
    }

    /// Request parameter form: the bare wkid when known, JSON otherwise.
    pub fn to_param(&self) -> String {
        match self.wkid {
            Some(wkid) => wkid.to_string(),
            None => serde_json::to_string(self).unwrap_or_default(),
        }
    }

    /// JSON value form.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Reads a spatial reference from a JSON value; a bare number is a wkid.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_i64().map(Self::wkid),
            Value::Object(_) => serde_json::from_value(value.clone()).ok(),
            Value::String(s) => s.trim().parse().ok().map(Self::wkid),
            _ => None,
        }
    }
}

/// Geometry type tag used on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GeometryType {
    /// Single coordinate pair.
    #[serde(rename = "esriGeometryPoint")]
    Point,
    /// Set of points.
    #[serde(rename = "esriGeometryMultipoint")]
    Multipoint,
    /// One or more paths.
    #[serde(rename = "esriGeometryPolyline")]
    Polyline,
    /// One or more rings.
    #[serde(rename = "esriGeometryPolygon")]
    Polygon,
    /// Axis-aligned bounding box.
    #[serde(rename = "esriGeometryEnvelope")]
    Envelope,
}

impl GeometryType {
    /// Returns the wire tag.
    pub fn as_wire(&self) -> &'static str {
        match self {
            Self::Point => "esriGeometryPoint",
            Self::Multipoint => "esriGeometryMultipoint",
            Self::Polyline => "esriGeometryPolyline",
            Self::Polygon => "esriGeometryPolygon",
            Self::Envelope => "esriGeometryEnvelope",
        }
    }

    /// Parses a wire tag.
    pub fn from_wire(tag: &str) -> Option<Self> {
        match tag {
            "esriGeometryPoint" => Some(Self::Point),
            "esriGeometryMultipoint" => Some(Self::Multipoint),
            "esriGeometryPolyline" => Some(Self::Polyline),
            "esriGeometryPolygon" => Some(Self::Polygon),
            "esriGeometryEnvelope" => Some(Self::Envelope),
            _ => None,
        }
    }

    /// Infers a type from the structure of raw geometry JSON.
    ///
    /// Priority is fixed: `x` → point, `points` → multipoint, `paths` →
    /// polyline, `rings` → polygon, anything else → envelope.
    pub fn sniff(json: &Map<String, Value>) -> Self {
        if json.contains_key("x") {
            Self::Point
        } else if json.contains_key("points") {
            Self::Multipoint
        } else if json.contains_key("paths") {
            Self::Polyline
        } else if json.contains_key("rings") {
            Self::Polygon
        } else {
            Self::Envelope
        }
    }
}

impl fmt::Display for GeometryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_wire())
    }
}

/// Axis-aligned bounding box.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    /// Minimum x.
    pub xmin: f64,
    /// Minimum y.
    pub ymin: f64,
    /// Maximum x.
    pub xmax: f64,
    /// Maximum y.
    pub ymax: f64,
    /// Spatial reference of the box.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spatial_reference: Option<SpatialReference>,
}

impl Envelope {
    /// Creates an envelope without a spatial reference.
    pub fn new(xmin: f64, ymin: f64, xmax: f64, ymax: f64) -> Self {
        Self {
            xmin,
            ymin,
            xmax,
            ymax,
            spatial_reference: None,
        }
    }

    /// Comma-delimited `xmin,ymin,xmax,ymax` form.
    pub fn bbox_text(&self) -> String {
        format!("{},{},{},{}", self.xmin, self.ymin, self.xmax, self.ymax)
    }

    /// Parses a `xmin,ymin,xmax,ymax` bounding box.
    pub fn parse_bbox(text: &str) -> Option<Self> {
        let parts: Vec<f64> = text
            .split(',')
            .map(|p| p.trim().parse::<f64>())
            .collect::<Result<_, _>>()
            .ok()?;
        match parts.as_slice() {
            [xmin, ymin, xmax, ymax] => Some(Self::new(*xmin, *ymin, *xmax, *ymax)),
            _ => None,
        }
    }

    /// Raw JSON form.
    pub fn to_json(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }

    fn extend(&mut self, x: f64, y: f64) {
        self.xmin = self.xmin.min(x);
        self.ymin = self.ymin.min(y);
        self.xmax = self.xmax.max(x);
        self.ymax = self.ymax.max(y);
    }
}

/// A typed geometry value.
#[derive(Debug, Clone, PartialEq)]
pub struct Geometry {
    geometry_type: GeometryType,
    json: Map<String, Value>,
    spatial_reference: Option<SpatialReference>,
}

impl Geometry {
    /// Creates a geometry with an explicit type from raw JSON.
    pub fn new(geometry_type: GeometryType, mut json: Map<String, Value>) -> Self {
        let spatial_reference = json
            .remove(SPATIAL_REFERENCE)
            .and_then(|sr| SpatialReference::from_value(&sr));
        Self {
            geometry_type,
            json,
            spatial_reference,
        }
    }

    /// Builds a geometry from raw JSON, inferring its type from structure.
    pub fn from_json(value: Value) -> ServiceResult<Self> {
        match value {
            Value::Object(map) => {
                let geometry_type = GeometryType::sniff(&map);
                Ok(Self::new(geometry_type, map))
            }
            other => Err(ServiceError::InvalidGeometry(format!(
                "expected a JSON object, found {other}"
            ))),
        }
    }

    /// Parses geometry JSON text.
    pub fn parse(text: &str) -> ServiceResult<Self> {
        Self::from_json(serde_json::from_str(text)?)
    }

    /// Replaces the spatial reference.
    pub fn with_spatial_reference(mut self, spatial_reference: SpatialReference) -> Self {
        self.spatial_reference = Some(spatial_reference);
        self
    }

    /// The declared geometry type.
    pub fn geometry_type(&self) -> GeometryType {
        self.geometry_type
    }

    /// The spatial reference, if one is attached.
    pub fn spatial_reference(&self) -> Option<&SpatialReference> {
        self.spatial_reference.as_ref()
    }

    /// Raw shape form, including the spatial reference when present.
    pub fn to_json(&self) -> Map<String, Value> {
        let mut json = self.json.clone();
        if let Some(sr) = &self.spatial_reference {
            json.insert(SPATIAL_REFERENCE.to_string(), sr.to_value());
        }
        json
    }

    /// Raw shape form as JSON text.
    pub fn dumps(&self) -> String {
        Value::Object(self.to_json()).to_string()
    }

    /// Bounding box of all coordinates, `None` for an empty geometry.
    pub fn envelope(&self) -> Option<Envelope> {
        let mut envelope = match self.geometry_type {
            GeometryType::Envelope => {
                let value = Value::Object(self.json.clone());
                serde_json::from_value::<Envelope>(value).ok()?
            }
            GeometryType::Point => {
                let x = self.json.get("x")?.as_f64()?;
                let y = self.json.get("y")?.as_f64()?;
                Envelope::new(x, y, x, y)
            }
            GeometryType::Multipoint => bounds_of(self.json.get("points")?)?,
            GeometryType::Polyline => bounds_of(self.json.get("paths")?)?,
            GeometryType::Polygon => bounds_of(self.json.get("rings")?)?,
        };
        envelope.spatial_reference = self.spatial_reference.clone();
        Some(envelope)
    }

    /// Raw bounding-envelope form. Empty geometries give a null `xmin`.
    pub fn envelope_json(&self) -> Map<String, Value> {
        match self.envelope() {
            Some(envelope) => envelope.to_json(),
            None => {
                let mut json = Map::new();
                json.insert("xmin".to_string(), Value::Null);
                if let Some(sr) = &self.spatial_reference {
                    json.insert(SPATIAL_REFERENCE.to_string(), sr.to_value());
                }
                json
            }
        }
    }
}

impl fmt::Display for Geometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.dumps())
    }
}

/// Walks nested coordinate arrays and returns their bounds.
fn bounds_of(value: &Value) -> Option<Envelope> {
    let mut envelope: Option<Envelope> = None;
    collect_bounds(value, &mut envelope);
    envelope
}

fn collect_bounds(value: &Value, envelope: &mut Option<Envelope>) {
    let Value::Array(items) = value else {
        return;
    };
    // a coordinate is an array whose first two entries are numbers
    if let (Some(x), Some(y)) = (
        items.first().and_then(Value::as_f64),
        items.get(1).and_then(Value::as_f64),
    ) {
        match envelope {
            Some(env) => env.extend(x, y),
            None => *envelope = Some(Envelope::new(x, y, x, y)),
        }
        return;
    }
    for item in items {
        collect_bounds(item, envelope);
    }
}

/// An ordered collection of typed geometries.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeometryCollection {
    geometries: Vec<Geometry>,
}

impl GeometryCollection {
    /// Creates a collection.
    pub fn new(geometries: Vec<Geometry>) -> Self {
        Self { geometries }
    }

    /// Reads a `{geometryType?, geometries: [...]}` payload.
    ///
    /// A declared `geometryType` wins over structural sniffing; a top-level
    /// spatial reference is applied to members that carry none.
    pub fn from_json(value: &Value) -> ServiceResult<Self> {
        let items = value
            .get("geometries")
            .and_then(Value::as_array)
            .ok_or_else(|| ServiceError::InvalidGeometry("missing geometries array".into()))?;
        let declared = value
            .get("geometryType")
            .and_then(Value::as_str)
            .and_then(GeometryType::from_wire);
        let shared_sr = value
            .get(SPATIAL_REFERENCE)
            .and_then(SpatialReference::from_value);

        let mut geometries = Vec::with_capacity(items.len());
        for item in items {
            let Value::Object(map) = item else {
                return Err(ServiceError::InvalidGeometry(
                    "collection member is not an object".into(),
                ));
            };
            let geometry_type = declared.unwrap_or_else(|| GeometryType::sniff(map));
            let mut geometry = Geometry::new(geometry_type, map.clone());
            if geometry.spatial_reference.is_none() {
                geometry.spatial_reference = shared_sr.clone();
            }
            geometries.push(geometry);
        }
        Ok(Self { geometries })
    }

    /// Member geometries.
    pub fn geometries(&self) -> &[Geometry] {
        &self.geometries
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.geometries.len()
    }

    /// Returns true if the collection is empty.
    pub fn is_empty(&self) -> bool {
        self.geometries.is_empty()
    }

    /// Iterates over member geometries.
    pub fn iter(&self) -> std::slice::Iter<'_, Geometry> {
        self.geometries.iter()
    }
}

impl IntoIterator for GeometryCollection {
    type Item = Geometry;
    type IntoIter = std::vec::IntoIter<Geometry>;

    fn into_iter(self) -> Self::IntoIter {
        self.geometries.into_iter()
    }
}

impl From<Vec<Geometry>> for GeometryCollection {
    fn from(geometries: Vec<Geometry>) -> Self {
        Self::new(geometries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sniff_priority() {
        let point = json!({"x": 10, "y": 20});
        let rings = json!({"rings": [[[0, 0], [0, 1], [1, 1], [0, 0]]]});
        let paths = json!({"paths": [[[0, 0], [3, 4]]]});
        let points = json!({"points": [[1, 2], [3, 4]]});
        let other = json!({"xmin": 0, "ymin": 0, "xmax": 1, "ymax": 1});

        let sniff = |v: &Value| GeometryType::sniff(v.as_object().unwrap());
        assert_eq!(sniff(&point), GeometryType::Point);
        assert_eq!(sniff(&rings), GeometryType::Polygon);
        assert_eq!(sniff(&paths), GeometryType::Polyline);
        assert_eq!(sniff(&points), GeometryType::Multipoint);
        assert_eq!(sniff(&other), GeometryType::Envelope);
    }

    #[test]
    fn spatial_reference_is_split_from_shape() {
        let geometry =
            Geometry::from_json(json!({"x": 1.5, "y": 2.5, "spatialReference": {"wkid": 4326}}))
                .unwrap();
        assert_eq!(geometry.geometry_type(), GeometryType::Point);
        assert_eq!(geometry.spatial_reference(), Some(&SpatialReference::wkid(4326)));
        assert_eq!(geometry.to_json()["spatialReference"]["wkid"], 4326);
    }

    #[test]
    fn polygon_envelope() {
        let geometry = Geometry::from_json(json!({
            "rings": [[[-2.0, 1.0], [4.0, 1.0], [4.0, 7.5], [-2.0, 1.0]]],
            "spatialReference": {"wkid": 102100}
        }))
        .unwrap();
        let envelope = geometry.envelope().unwrap();
        assert_eq!(
            (envelope.xmin, envelope.ymin, envelope.xmax, envelope.ymax),
            (-2.0, 1.0, 4.0, 7.5)
        );
        let json = geometry.envelope_json();
        assert_eq!(json["xmax"], 4.0);
        assert_eq!(json["spatialReference"]["wkid"], 102100);
    }

    #[test]
    fn empty_point_has_no_envelope() {
        let geometry = Geometry::from_json(json!({"x": null, "y": null})).unwrap();
        assert!(geometry.envelope().is_none());
        assert_eq!(geometry.envelope_json()["xmin"], Value::Null);
    }

    #[test]
    fn bbox_text_round_trip() {
        let envelope = Envelope::parse_bbox("-10, 5.5, 20, 30").unwrap();
        assert_eq!(envelope.bbox_text(), "-10,5.5,20,30");
        assert!(Envelope::parse_bbox("1,2,3").is_none());
        assert!(Envelope::parse_bbox("a,b,c,d").is_none());
    }

    #[test]
    fn spatial_reference_param() {
        assert_eq!(SpatialReference::wkid(3857).to_param(), "3857");
        let wkt = SpatialReference {
            wkt: Some("PROJCS[...]".into()),
            ..SpatialReference::default()
        };
        assert_eq!(wkt.to_param(), r#"{"wkt":"PROJCS[...]"}"#);
        assert_eq!(
            SpatialReference::from_value(&json!(4326)),
            Some(SpatialReference::wkid(4326))
        );
    }

    #[test]
    fn collection_uses_declared_type_and_shared_sr() {
        let collection = GeometryCollection::from_json(&json!({
            "geometryType": "esriGeometryPolyline",
            "spatialReference": {"wkid": 2229},
            "geometries": [{"paths": [[[0, 0], [1, 1]]]}, {"paths": []}]
        }))
        .unwrap();
        assert_eq!(collection.len(), 2);
        assert!(collection
            .iter()
            .all(|g| g.geometry_type() == GeometryType::Polyline));
        assert_eq!(
            collection.geometries()[1].spatial_reference(),
            Some(&SpatialReference::wkid(2229))
        );
    }
}
