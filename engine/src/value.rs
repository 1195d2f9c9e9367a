//! Typed field values.
//!
//! Both stores keep tree attributes as loosely typed JSON maps. Records are
//! normalized into [`FieldValue`] on read so the classifier can pick the
//! comparison rule from the variant instead of guessing at runtime.

use crate::{error::Result, Error, FieldName, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// A geographic coordinate in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

/// A document-store timestamp at nanosecond resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TimePoint {
    pub seconds: u64,
    /// Always below one second
    pub nanoseconds: u32,
}

impl TimePoint {
    pub fn new(seconds: u64, nanoseconds: u32) -> Self {
        Self {
            seconds: seconds.saturating_add(u64::from(nanoseconds / NANOS_PER_SECOND)),
            nanoseconds: nanoseconds % NANOS_PER_SECOND,
        }
    }

    pub fn from_millis(millis: Timestamp) -> Self {
        Self::new(millis / 1000, ((millis % 1000) as u32) * 1_000_000)
    }

    /// Truncating conversion to milliseconds.
    pub fn as_millis(&self) -> Timestamp {
        self.seconds
            .saturating_mul(1000)
            .saturating_add(u64::from(self.nanoseconds / 1_000_000))
    }
}

const NANOS_PER_SECOND: u32 = 1_000_000_000;

/// The value of a single tree attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "camelCase")]
pub enum FieldValue {
    String(String),
    /// A JSON integer that fits in `i64`
    Integer(i64),
    Number(f64),
    Bool(bool),
    Timestamp(TimePoint),
    GeoPoint(GeoPoint),
}

impl FieldValue {
    /// Name of the variant, used in logs and error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            FieldValue::String(_) => "String",
            FieldValue::Integer(_) => "Integer",
            FieldValue::Number(_) => "Number",
            FieldValue::Bool(_) => "Bool",
            FieldValue::Timestamp(_) => "Timestamp",
            FieldValue::GeoPoint(_) => "GeoPoint",
        }
    }

    /// Normalize a loosely typed JSON value.
    ///
    /// Returns `Ok(None)` for `null`, which is treated as an absent field.
    /// Integers keep their exact value; only integers beyond `i64` fall back
    /// to `Number`.
    pub fn from_json(field: &str, value: &Value) -> Result<Option<FieldValue>> {
        match value {
            Value::Null => Ok(None),
            Value::Bool(b) => Ok(Some(FieldValue::Bool(*b))),
            Value::String(s) => Ok(Some(FieldValue::String(s.clone()))),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    return Ok(Some(FieldValue::Integer(i)));
                }
                n.as_f64()
                    .map(|f| Some(FieldValue::Number(f)))
                    .ok_or_else(|| unsupported(field, format!("number {} is not representable", n)))
            }
            Value::Object(obj) => {
                if let Some(point) = geo_point_from_object(obj) {
                    return Ok(Some(FieldValue::GeoPoint(point)));
                }
                if let Some(time) = timestamp_from_object(obj) {
                    return Ok(Some(FieldValue::Timestamp(time)));
                }
                Err(unsupported(field, "nested objects are not supported"))
            }
            Value::Array(_) => Err(unsupported(field, "arrays are not supported")),
        }
    }

    /// Render to the loose JSON shape the stores persist.
    ///
    /// Used for records built in code. Records read from a store keep their
    /// original document, see [`crate::RawTreeRecord::from_record`].
    /// Non-finite numbers have no JSON form and become `null`.
    pub fn to_json(&self) -> Value {
        match self {
            FieldValue::String(s) => Value::String(s.clone()),
            FieldValue::Integer(i) => Value::from(*i),
            FieldValue::Number(n) => serde_json::Number::from_f64(*n)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            FieldValue::Bool(b) => Value::Bool(*b),
            FieldValue::Timestamp(time) => serde_json::json!({
                "seconds": time.seconds,
                "nanoseconds": time.nanoseconds,
            }),
            FieldValue::GeoPoint(point) => serde_json::json!({
                "lat": point.lat,
                "lng": point.lng,
            }),
        }
    }
}

impl std::fmt::Display for FieldValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldValue::String(s) => write!(f, "{:?}", s),
            FieldValue::Integer(i) => write!(f, "{}", i),
            FieldValue::Number(n) => write!(f, "{}", n),
            FieldValue::Bool(b) => write!(f, "{}", b),
            FieldValue::Timestamp(t) => write!(f, "@{}.{:09}s", t.seconds, t.nanoseconds),
            FieldValue::GeoPoint(p) => write!(f, "({}, {})", p.lat, p.lng),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::String(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::String(s)
    }
}

impl From<f64> for FieldValue {
    fn from(n: f64) -> Self {
        FieldValue::Number(n)
    }
}

impl From<i64> for FieldValue {
    fn from(i: i64) -> Self {
        FieldValue::Integer(i)
    }
}

impl From<TimePoint> for FieldValue {
    fn from(t: TimePoint) -> Self {
        FieldValue::Timestamp(t)
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        FieldValue::Bool(b)
    }
}

impl From<GeoPoint> for FieldValue {
    fn from(p: GeoPoint) -> Self {
        FieldValue::GeoPoint(p)
    }
}

/// Normalize a whole JSON attribute map.
pub fn fields_from_json(obj: &Map<String, Value>) -> Result<BTreeMap<FieldName, FieldValue>> {
    let mut fields = BTreeMap::new();
    for (name, raw) in obj {
        if let Some(value) = FieldValue::from_json(name, raw)? {
            fields.insert(name.clone(), value);
        }
    }
    Ok(fields)
}

/// Render a typed attribute map back to a JSON object.
pub fn fields_to_json(fields: &BTreeMap<FieldName, FieldValue>) -> Value {
    let obj: Map<String, Value> = fields
        .iter()
        .map(|(name, value)| (name.clone(), value.to_json()))
        .collect();
    Value::Object(obj)
}

fn unsupported(field: &str, reason: impl Into<String>) -> Error {
    Error::UnsupportedFieldValue {
        field: field.to_string(),
        reason: reason.into(),
    }
}

fn geo_point_from_object(obj: &Map<String, Value>) -> Option<GeoPoint> {
    if obj.len() != 2 {
        return None;
    }
    let lat = obj.get("lat").or_else(|| obj.get("latitude"))?.as_f64()?;
    let lng = obj
        .get("lng")
        .or_else(|| obj.get("lon"))
        .or_else(|| obj.get("longitude"))?
        .as_f64()?;
    Some(GeoPoint::new(lat, lng))
}

fn timestamp_from_object(obj: &Map<String, Value>) -> Option<TimePoint> {
    if obj.len() != 2 {
        return None;
    }
    let seconds = obj.get("seconds").or_else(|| obj.get("_seconds"))?.as_u64()?;
    let nanos = obj
        .get("nanoseconds")
        .or_else(|| obj.get("_nanoseconds"))?
        .as_u64()?;
    let nanos = u32::try_from(nanos).ok().filter(|n| *n < NANOS_PER_SECOND)?;
    Some(TimePoint::new(seconds, nanos))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn scalars_from_json() {
        assert_eq!(
            FieldValue::from_json("name", &json!("Cay A")).unwrap(),
            Some(FieldValue::String("Cay A".into()))
        );
        assert_eq!(
            FieldValue::from_json("fruitCount", &json!(12)).unwrap(),
            Some(FieldValue::Integer(12))
        );
        assert_eq!(
            FieldValue::from_json("height", &json!(2.5)).unwrap(),
            Some(FieldValue::Number(2.5))
        );
        assert_eq!(
            FieldValue::from_json("isActive", &json!(true)).unwrap(),
            Some(FieldValue::Bool(true))
        );
        assert_eq!(FieldValue::from_json("notes", &Value::Null).unwrap(), None);
    }

    #[test]
    fn geo_point_shapes() {
        let expected = Some(FieldValue::GeoPoint(GeoPoint::new(10.5, 106.25)));
        assert_eq!(
            FieldValue::from_json("gps", &json!({"lat": 10.5, "lng": 106.25})).unwrap(),
            expected
        );
        assert_eq!(
            FieldValue::from_json("gps", &json!({"latitude": 10.5, "longitude": 106.25}))
                .unwrap(),
            expected
        );
    }

    #[test]
    fn document_store_timestamp() {
        let value = json!({"_seconds": 1706745600, "_nanoseconds": 250000000});
        assert_eq!(
            FieldValue::from_json("plantedAt", &value).unwrap(),
            Some(FieldValue::Timestamp(TimePoint::new(1706745600, 250000000)))
        );
    }

    #[test]
    fn timestamp_keeps_nanoseconds() {
        let a = json!({"seconds": 1706745600, "nanoseconds": 1000});
        let b = json!({"seconds": 1706745600, "nanoseconds": 999000});
        assert_ne!(
            FieldValue::from_json("inspectedAt", &a).unwrap(),
            FieldValue::from_json("inspectedAt", &b).unwrap()
        );

        let out_of_range = json!({"seconds": 1, "nanoseconds": 1_000_000_000u64});
        assert!(FieldValue::from_json("inspectedAt", &out_of_range).is_err());
    }

    #[test]
    fn large_integers_stay_exact() {
        assert_eq!(
            FieldValue::from_json("sensorSerial", &json!(9007199254740993u64)).unwrap(),
            Some(FieldValue::Integer(9007199254740993))
        );
    }

    #[test]
    fn time_point_millis() {
        let t = TimePoint::from_millis(1706745600250);
        assert_eq!(t, TimePoint::new(1706745600, 250_000_000));
        assert_eq!(t.as_millis(), 1706745600250);
        assert_eq!(TimePoint::new(1, 1_500_000_000), TimePoint::new(2, 500_000_000));
    }

    #[test]
    fn rejects_nested_shapes() {
        let err = FieldValue::from_json("tags", &json!(["a", "b"])).unwrap_err();
        assert!(matches!(err, Error::UnsupportedFieldValue { ref field, .. } if field == "tags"));

        let err = FieldValue::from_json("extra", &json!({"a": 1})).unwrap_err();
        assert!(matches!(err, Error::UnsupportedFieldValue { .. }));
    }

    #[test]
    fn json_shape_is_stable() {
        let fields: BTreeMap<_, _> = [
            ("name".to_string(), FieldValue::from("Cay A")),
            ("fruitCount".to_string(), FieldValue::Integer(10)),
            ("height".to_string(), FieldValue::Number(2.5)),
            ("plantedAt".to_string(), FieldValue::Timestamp(TimePoint::new(1706745600, 123456789))),
            (
                "gps".to_string(),
                FieldValue::GeoPoint(GeoPoint::new(10.5, 106.25)),
            ),
        ]
        .into_iter()
        .collect();

        let raw = fields_to_json(&fields);
        let parsed = fields_from_json(raw.as_object().unwrap()).unwrap();
        assert_eq!(parsed, fields);
    }

    #[test]
    fn tagged_serialization_format() {
        let json = serde_json::to_string(&FieldValue::Number(3.5)).unwrap();
        assert_eq!(json, r#"{"type":"number","value":3.5}"#);

        let json = serde_json::to_string(&FieldValue::GeoPoint(GeoPoint::new(1.0, 2.0))).unwrap();
        assert_eq!(json, r#"{"type":"geoPoint","value":{"lat":1.0,"lng":2.0}}"#);
    }
}
