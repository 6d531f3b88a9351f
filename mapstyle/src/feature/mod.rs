use crate::error::{MapStyleError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A single geographic feature. Geometry is carried through untouched; only
/// the attributes take part in style matching.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(default)]
    pub attributes: Map<String, Value>,
    #[serde(default)]
    pub geometry: Value,
}

impl Feature {
    /// Feature with the given attributes and no geometry (mostly for matching).
    pub fn with_attributes<I, K, V>(attributes: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        Feature {
            id: None,
            attributes: attributes
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            geometry: Value::Null,
        }
    }

    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }
}

/// A finite, in-memory list of features.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureCollection {
    pub features: Vec<Feature>,
}

impl FeatureCollection {
    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Parse GeoJSON bytes.
    ///
    /// Accepts a `FeatureCollection`, a single `Feature`, or a bare array of
    /// features. Anything else is `MalformedData`.
    pub fn from_geojson_slice(bytes: &[u8]) -> Result<Self> {
        let value: Value = serde_json::from_slice(bytes)
            .map_err(|e| MapStyleError::MalformedData(format!("invalid JSON: {e}")))?;
        Self::from_geojson_value(value)
    }

    pub fn from_geojson_value(value: Value) -> Result<Self> {
        let features = match value {
            Value::Array(items) => items,
            Value::Object(mut obj) => match obj.get("type").and_then(Value::as_str) {
                Some("FeatureCollection") => match obj.remove("features") {
                    Some(Value::Array(items)) => items,
                    _ => {
                        return Err(MapStyleError::MalformedData(
                            "FeatureCollection without a 'features' array".into(),
                        ))
                    }
                },
                Some("Feature") => vec![Value::Object(obj)],
                Some(other) => {
                    return Err(MapStyleError::MalformedData(format!(
                        "expected a FeatureCollection or Feature, got type '{other}'"
                    )))
                }
                None => {
                    return Err(MapStyleError::MalformedData(
                        "GeoJSON object has no 'type'".into(),
                    ))
                }
            },
            other => {
                return Err(MapStyleError::MalformedData(format!(
                    "expected a GeoJSON object, got {}",
                    json_type_name(&other)
                )))
            }
        };

        let features = features
            .into_iter()
            .enumerate()
            .map(|(i, item)| parse_feature(i, item))
            .collect::<Result<Vec<_>>>()?;

        Ok(FeatureCollection { features })
    }
}

impl FromIterator<Feature> for FeatureCollection {
    fn from_iter<I: IntoIterator<Item = Feature>>(iter: I) -> Self {
        FeatureCollection {
            features: iter.into_iter().collect(),
        }
    }
}

fn parse_feature(index: usize, item: Value) -> Result<Feature> {
    let Value::Object(mut obj) = item else {
        return Err(MapStyleError::MalformedData(format!(
            "feature {index} is not an object"
        )));
    };

    if let Some(kind) = obj.get("type").and_then(Value::as_str) {
        if kind != "Feature" {
            return Err(MapStyleError::MalformedData(format!(
                "feature {index} has type '{kind}'"
            )));
        }
    }

    let attributes = match obj.remove("properties") {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(props)) => props,
        Some(other) => {
            return Err(MapStyleError::MalformedData(format!(
                "feature {index} properties must be an object, got {}",
                json_type_name(&other)
            )))
        }
    };

    Ok(Feature {
        id: obj.remove("id"),
        attributes,
        geometry: obj.remove("geometry").unwrap_or(Value::Null),
    })
}

pub(crate) fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_feature_collection() {
        let bytes = br#"{
            "type": "FeatureCollection",
            "features": [
                {"type": "Feature", "id": 7, "properties": {"type": "park", "area": 12.5},
                 "geometry": {"type": "Point", "coordinates": [1.0, 2.0]}},
                {"type": "Feature", "properties": null, "geometry": null}
            ]
        }"#;

        let fc = FeatureCollection::from_geojson_slice(bytes).unwrap();
        assert_eq!(fc.len(), 2);
        assert_eq!(fc.features[0].id, Some(json!(7)));
        assert_eq!(fc.features[0].attribute("type"), Some(&json!("park")));
        assert_eq!(fc.features[0].geometry["type"], "Point");
        assert!(fc.features[1].attributes.is_empty());
    }

    #[test]
    fn test_parse_single_feature_and_array() {
        let single = json!({"type": "Feature", "properties": {"a": 1}});
        assert_eq!(FeatureCollection::from_geojson_value(single).unwrap().len(), 1);

        let array = json!([{"properties": {"a": 1}}, {"properties": {"a": 2}}]);
        assert_eq!(FeatureCollection::from_geojson_value(array).unwrap().len(), 2);
    }

    #[test]
    fn test_malformed_inputs() {
        for bad in [
            json!("text"),
            json!({"type": "Point", "coordinates": [0, 0]}),
            json!({"type": "FeatureCollection"}),
            json!({"features": []}),
            json!([1, 2]),
            json!([{"type": "Feature", "properties": [1]}]),
        ] {
            let err = FeatureCollection::from_geojson_value(bad.clone()).unwrap_err();
            assert!(
                matches!(err, MapStyleError::MalformedData(_)),
                "{bad} gave {err:?}"
            );
        }

        assert!(matches!(
            FeatureCollection::from_geojson_slice(b"{not json"),
            Err(MapStyleError::MalformedData(_))
        ));
    }

    #[test]
    fn test_with_attributes() {
        let f = Feature::with_attributes([("type", json!("river")), ("depth", json!(3))]);
        assert_eq!(f.attribute("depth"), Some(&json!(3)));
        assert_eq!(f.attribute("missing"), None);
    }
}
