use serde::{Deserialize, Serialize};

/// Point-in-time copy of the administrative records, as stored.
///
/// Records keep the shape of the relational store: a layer points at its data
/// provider through two optional columns, a rule carries its operator as free
/// text. Nothing here is trusted until it has passed through
/// [`crate::validation::validate_and_prepare`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub layers: Vec<LayerRecord>,
    #[serde(default)]
    pub styles: Vec<StyleRecord>,
    #[serde(default)]
    pub style_rules: Vec<StyleOnLayerRecord>,
    #[serde(default)]
    pub icons: Vec<IconRecord>,
    #[serde(default)]
    pub geojson_files: Vec<GeoJsonRecord>,
    #[serde(default)]
    pub open_green_maps: Vec<OpenGreenMapRecord>,
}

/// A `Layer` row
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LayerRecord {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "data_GeoJSON", default)]
    pub data_geojson: Option<String>,
    #[serde(rename = "data_OpenGreenMap", default)]
    pub data_open_green_map: Option<String>,
}

/// A `Style` row. Stroke, fill, icon and event options are flattened the
/// way the admin store groups them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StyleRecord {
    pub id: String,
    #[serde(default)]
    pub title: String,

    #[serde(default)]
    pub stroke: bool,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub weight: Option<f64>,
    #[serde(default)]
    pub opacity: Option<f64>,
    #[serde(default)]
    pub line_cap: Option<String>,
    #[serde(default)]
    pub line_join: Option<String>,
    #[serde(default)]
    pub dash_array: Option<String>,
    #[serde(default)]
    pub dash_offset: Option<String>,

    #[serde(default)]
    pub fill: bool,
    #[serde(default)]
    pub fill_color: Option<String>,
    #[serde(default)]
    pub fill_opacity: Option<f64>,
    #[serde(default)]
    pub fill_rule: Option<String>,

    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub icon_opacity: Option<f64>,

    #[serde(default)]
    pub on_hover: Option<String>,
}

/// A `StyleOnLayer` row: one conditional style assignment on a layer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StyleOnLayerRecord {
    pub id: String,
    #[serde(default)]
    pub layer: Option<String>,
    #[serde(default)]
    pub style: Option<String>,
    #[serde(default)]
    pub map_attr_key: String,
    #[serde(default)]
    pub map_attr_val: String,
    #[serde(default)]
    pub map_attr_oper: String,
    #[serde(default)]
    pub legend_text: String,
    /// Order within the layer. Rules without a position keep their listing
    /// order after every positioned rule.
    #[serde(default)]
    pub position: Option<i64>,
}

/// An `Icon` row
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IconRecord {
    pub id: String,
    #[serde(default)]
    pub width: Option<i64>,
    #[serde(default)]
    pub height: Option<i64>,
    #[serde(default)]
    pub anchor_x: Option<i64>,
    #[serde(default)]
    pub anchor_y: Option<i64>,
    #[serde(default)]
    pub bg_color: Option<String>,
    #[serde(default)]
    pub fill_color: Option<String>,
    #[serde(default)]
    pub stroke_color: Option<String>,
    /// Stored path of the SVG asset in the image bucket
    #[serde(default)]
    pub svg: Option<String>,
}

/// A `Data_GeoJSON` row
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeoJsonRecord {
    pub id: String,
    /// Stored path of the GeoJSON asset in the geojson bucket
    #[serde(rename = "geoJSON", default)]
    pub geo_json: Option<String>,
}

/// A `Data_OpenGreenMap` row
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OpenGreenMapRecord {
    pub id: String,
    #[serde(rename = "ogmMapId", default)]
    pub ogm_map_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::parse_snapshot_str;

    #[test]
    fn test_parse_store_field_names() {
        let snapshot = parse_snapshot_str(
            r##"
layers:
  - id: parks
    title: Parks
    data_GeoJSON: parks-file
styles:
  - id: green
    title: Green
    fill: true
    fillColor: "#0f0"
    fillOpacity: 0.5
    onHover: dark-green
style_rules:
  - id: r1
    layer: parks
    style: green
    mapAttrKey: type
    mapAttrVal: park
    mapAttrOper: equals
    legendText: Park
icons:
  - id: tree
    anchorX: 8
    anchorY: 16
    svg: /tree.svg
geojson_files:
  - id: parks-file
    geoJSON: /parks.geojson
open_green_maps:
  - id: ogm
    ogmMapId: "5ab3"
"##,
        )
        .unwrap();

        assert_eq!(snapshot.layers[0].data_geojson.as_deref(), Some("parks-file"));
        assert_eq!(snapshot.layers[0].data_open_green_map, None);
        assert_eq!(snapshot.styles[0].fill_color.as_deref(), Some("#0f0"));
        assert_eq!(snapshot.styles[0].on_hover.as_deref(), Some("dark-green"));
        assert!(!snapshot.styles[0].stroke);
        assert_eq!(snapshot.style_rules[0].map_attr_oper, "equals");
        assert_eq!(snapshot.icons[0].anchor_x, Some(8));
        assert_eq!(snapshot.geojson_files[0].geo_json.as_deref(), Some("/parks.geojson"));
        assert_eq!(snapshot.open_green_maps[0].ogm_map_id, "5ab3");
    }

    #[test]
    fn test_empty_snapshot() {
        let snapshot = parse_snapshot_str("{}").unwrap();
        assert_eq!(snapshot, Snapshot::default());
    }
}
