// Typed, validated view of a snapshot. Built only by the validation module.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

macro_rules! id_type {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                $name(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                $name(s)
            }
        }
    };
}

id_type!(LayerId);
id_type!(StyleId);
id_type!(IconId);

/// Where a layer's features come from. Exactly one per layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DataProviderRef {
    /// A GeoJSON asset in the geojson bucket, addressed by its stored path
    GeoJsonFile { path: String },
    /// An external OpenGreenMap dataset
    OpenGreenMap { dataset_id: String },
}

impl DataProviderRef {
    pub fn describe(&self) -> String {
        match self {
            DataProviderRef::GeoJsonFile { path } => format!("geojson file {path}"),
            DataProviderRef::OpenGreenMap { dataset_id } => {
                format!("OpenGreenMap dataset {dataset_id}")
            }
        }
    }
}

/// Comparison applied between a feature attribute and a rule's value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Operator {
    Equals,
    NotEquals,
    Contains,
    GreaterThan,
    LessThan,
    Exists,
}

impl Operator {
    pub const ALL: [Operator; 6] = [
        Operator::Equals,
        Operator::NotEquals,
        Operator::Contains,
        Operator::GreaterThan,
        Operator::LessThan,
        Operator::Exists,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Equals => "equals",
            Operator::NotEquals => "notEquals",
            Operator::Contains => "contains",
            Operator::GreaterThan => "greaterThan",
            Operator::LessThan => "lessThan",
            Operator::Exists => "exists",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operator {
    type Err = String;

    /// Accepts the canonical camelCase names, their snake_case forms, and the
    /// symbolic spellings administrators tend to type.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "equals" | "=" | "==" => Ok(Operator::Equals),
            "notEquals" | "not_equals" | "!=" => Ok(Operator::NotEquals),
            "contains" => Ok(Operator::Contains),
            "greaterThan" | "greater_than" | ">" => Ok(Operator::GreaterThan),
            "lessThan" | "less_than" | "<" => Ok(Operator::LessThan),
            "exists" => Ok(Operator::Exists),
            other => Err(format!(
                "unknown operator '{other}' (expected one of: {})",
                Operator::ALL
                    .iter()
                    .map(|op| op.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            )),
        }
    }
}

/// One conditional style assignment on a layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StyleRule {
    pub id: String,
    pub style: StyleId,
    pub attribute_key: String,
    pub attribute_value: String,
    pub operator: Operator,
    pub legend_text: String,
}

/// Rules in evaluation order. Order is significant: the matcher walks it
/// front to back.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleList(Vec<StyleRule>);

impl RuleList {
    pub fn new(rules: Vec<StyleRule>) -> Self {
        RuleList(rules)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, StyleRule> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&StyleRule> {
        self.0.get(index)
    }

    pub fn as_slice(&self) -> &[StyleRule] {
        &self.0
    }
}

impl<'a> IntoIterator for &'a RuleList {
    type Item = &'a StyleRule;
    type IntoIter = std::slice::Iter<'a, StyleRule>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl FromIterator<StyleRule> for RuleList {
    fn from_iter<I: IntoIterator<Item = StyleRule>>(iter: I) -> Self {
        RuleList(iter.into_iter().collect())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Layer {
    pub id: LayerId,
    pub title: String,
    pub description: Option<String>,
    pub provider: DataProviderRef,
    pub rules: RuleList,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stroke {
    pub enabled: bool,
    pub color: String,
    pub weight: Option<f64>,
    pub opacity: Option<f64>,
    pub line_cap: Option<String>,
    pub line_join: Option<String>,
    pub dash_array: Option<String>,
    pub dash_offset: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    pub enabled: bool,
    pub color: String,
    pub opacity: Option<f64>,
    pub fill_rule: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Style {
    pub id: StyleId,
    pub title: String,
    pub stroke: Stroke,
    pub fill: Fill,
    pub icon: Option<IconId>,
    pub icon_opacity: Option<f64>,
    pub on_hover: Option<StyleId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Icon {
    pub id: IconId,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub anchor_x: Option<i32>,
    pub anchor_y: Option<i32>,
    pub bg_color: String,
    pub fill_color: String,
    pub stroke_color: String,
    pub svg: Option<String>,
}

/// A layer that failed the data-provider invariant and is not resolvable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectedLayer {
    pub id: LayerId,
    pub title: String,
    pub reason: String,
}

/// Immutable, validated snapshot of every record the core reads.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    layers: Vec<Layer>,
    layer_index: HashMap<LayerId, usize>,
    styles: HashMap<StyleId, Style>,
    icons: HashMap<IconId, Icon>,
    rejected: Vec<RejectedLayer>,
}

impl Catalog {
    pub fn new(
        layers: Vec<Layer>,
        styles: Vec<Style>,
        icons: Vec<Icon>,
        rejected: Vec<RejectedLayer>,
    ) -> Self {
        let layer_index = layers
            .iter()
            .enumerate()
            .map(|(i, layer)| (layer.id.clone(), i))
            .collect();
        Catalog {
            layers,
            layer_index,
            styles: styles.into_iter().map(|s| (s.id.clone(), s)).collect(),
            icons: icons.into_iter().map(|i| (i.id.clone(), i)).collect(),
            rejected,
        }
    }

    /// Resolvable layers, in snapshot order.
    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn layer(&self, id: &LayerId) -> Option<&Layer> {
        self.layer_index.get(id).map(|&i| &self.layers[i])
    }

    pub fn style(&self, id: &StyleId) -> Option<&Style> {
        self.styles.get(id)
    }

    pub fn styles(&self) -> impl Iterator<Item = &Style> {
        self.styles.values()
    }

    pub fn icon(&self, id: &IconId) -> Option<&Icon> {
        self.icons.get(id)
    }

    pub fn icon_count(&self) -> usize {
        self.icons.len()
    }

    pub fn rejected_layers(&self) -> &[RejectedLayer] {
        &self.rejected
    }

    pub fn rejected_layer(&self, id: &LayerId) -> Option<&RejectedLayer> {
        self.rejected.iter().find(|r| &r.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operator_spellings() {
        assert_eq!("equals".parse::<Operator>(), Ok(Operator::Equals));
        assert_eq!("==".parse::<Operator>(), Ok(Operator::Equals));
        assert_eq!("not_equals".parse::<Operator>(), Ok(Operator::NotEquals));
        assert_eq!(" > ".parse::<Operator>(), Ok(Operator::GreaterThan));
        assert_eq!("lessThan".parse::<Operator>(), Ok(Operator::LessThan));
        assert_eq!("exists".parse::<Operator>(), Ok(Operator::Exists));
    }

    #[test]
    fn test_operator_unknown() {
        let err = "like".parse::<Operator>().unwrap_err();
        assert!(err.contains("like"));
        assert!(err.contains("greaterThan"));
    }

    #[test]
    fn test_operator_display_roundtrips() {
        for op in Operator::ALL {
            assert_eq!(op.to_string().parse::<Operator>(), Ok(op));
        }
    }

    #[test]
    fn test_provider_ref_serializes_tagged() {
        let provider = DataProviderRef::OpenGreenMap {
            dataset_id: "abc".into(),
        };
        let json = serde_json::to_value(&provider).unwrap();
        assert_eq!(json["kind"], "open_green_map");
        assert_eq!(json["dataset_id"], "abc");
    }
}
