use crate::error::{MapStyleError, Result};
use crate::model::{
    Catalog, DataProviderRef, Fill, Icon, IconId, Layer, LayerId, Operator, RejectedLayer,
    RuleList, Stroke, Style, StyleId, StyleRule,
};
use crate::schema::{IconRecord, LayerRecord, Snapshot, StyleOnLayerRecord, StyleRecord};
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

pub const LAYER_TITLE_MIN_LENGTH: usize = 3;
pub const LAYER_TITLE_MAX_LENGTH: usize = 60;

pub const DEFAULT_STROKE_COLOR: &str = "#FFF";
pub const DEFAULT_FILL_COLOR: &str = "#000";
pub const DEFAULT_ICON_COLOR: &str = "#000";

/// Result of validating a snapshot
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    /// Layers that break the one-data-provider invariant. They are skipped,
    /// not counted as errors, so sibling layers stay usable.
    pub rejected_layers: Vec<RejectedLayer>,
}

impl ValidationResult {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// Whether a string is a `#RGB` or `#RRGGBB` hex color.
pub fn is_hex_color(value: &str) -> bool {
    static HEX: OnceLock<Regex> = OnceLock::new();
    HEX.get_or_init(|| Regex::new(r"^#([0-9a-fA-F]{3}){1,2}$").expect("static regex"))
        .is_match(value)
}

/// Validate a snapshot without building a catalog.
pub fn validate_snapshot(snapshot: &Snapshot) -> ValidationResult {
    build_catalog(snapshot).0
}

/// Validate a snapshot and convert it into the typed catalog.
/// Returns an error if any hard validation failure was found; warnings are
/// returned alongside the catalog.
pub fn validate_and_prepare(snapshot: &Snapshot) -> Result<(Catalog, Vec<String>)> {
    let (result, catalog) = build_catalog(snapshot);

    if !result.is_ok() {
        return Err(MapStyleError::Validation(format!(
            "Snapshot validation failed:\n  - {}",
            result.errors.join("\n  - ")
        )));
    }

    for rejected in &result.rejected_layers {
        log::warn!(
            "Skipping layer '{}': {}",
            rejected.id,
            rejected.reason
        );
    }

    Ok((catalog, result.warnings))
}

fn build_catalog(snapshot: &Snapshot) -> (ValidationResult, Catalog) {
    let mut result = ValidationResult::default();

    let icons: Vec<Icon> = snapshot
        .icons
        .iter()
        .filter_map(|record| validate_icon(record, &mut result))
        .collect();
    let icon_ids: HashSet<&str> = icons.iter().map(|i| i.id.as_str()).collect();

    let mut style_titles = HashSet::new();
    let styles: Vec<Style> = snapshot
        .styles
        .iter()
        .filter_map(|record| validate_style(record, &mut style_titles, &mut result))
        .collect();
    let style_ids: HashSet<&str> = styles.iter().map(|s| s.id.as_str()).collect();

    for style in &styles {
        if let Some(icon) = &style.icon {
            if !icon_ids.contains(icon.as_str()) {
                result.warnings.push(format!(
                    "Style '{}' references missing icon '{icon}'",
                    style.id
                ));
            }
        }
        if let Some(hover) = &style.on_hover {
            if !style_ids.contains(hover.as_str()) {
                result.warnings.push(format!(
                    "Style '{}' has onHover pointing at missing style '{hover}'",
                    style.id
                ));
            }
        }
    }

    let layer_ids: HashSet<&str> = snapshot.layers.iter().map(|l| l.id.as_str()).collect();
    let mut rules_by_layer = collect_rules(snapshot, &layer_ids, &style_ids, &mut result);

    let mut layer_titles = HashSet::new();
    let mut layers = Vec::new();
    for record in &snapshot.layers {
        if !validate_layer_title(record, &mut layer_titles, &mut result) {
            continue;
        }

        match resolve_provider(snapshot, record) {
            Ok(provider) => layers.push(Layer {
                id: LayerId(record.id.clone()),
                title: record.title.clone(),
                description: record.description.clone(),
                provider,
                rules: rules_by_layer.remove(record.id.as_str()).unwrap_or_default(),
            }),
            Err(reason) => result.rejected_layers.push(RejectedLayer {
                id: LayerId(record.id.clone()),
                title: record.title.clone(),
                reason,
            }),
        }
    }

    let catalog = Catalog::new(layers, styles, icons, result.rejected_layers.clone());
    (result, catalog)
}

fn validate_layer_title(
    record: &LayerRecord,
    seen: &mut HashSet<String>,
    result: &mut ValidationResult,
) -> bool {
    let len = record.title.chars().count();
    if !(LAYER_TITLE_MIN_LENGTH..=LAYER_TITLE_MAX_LENGTH).contains(&len) {
        result.errors.push(format!(
            "Layer '{}' title must be {LAYER_TITLE_MIN_LENGTH}-{LAYER_TITLE_MAX_LENGTH} characters, got {len}",
            record.id
        ));
        return false;
    }
    if !seen.insert(record.title.clone()) {
        result.errors.push(format!(
            "Layer '{}' title '{}' is not unique",
            record.id, record.title
        ));
        return false;
    }
    true
}

/// Enforce exactly one data provider per layer and resolve it to its record.
fn resolve_provider(
    snapshot: &Snapshot,
    record: &LayerRecord,
) -> std::result::Result<DataProviderRef, String> {
    match (&record.data_geojson, &record.data_open_green_map) {
        (Some(_), Some(_)) => {
            Err("both a GeoJSON file and an OpenGreenMap dataset are set".into())
        }
        (None, None) => Err("no data provider is set".into()),
        (Some(file_id), None) => {
            let file = snapshot
                .geojson_files
                .iter()
                .find(|f| &f.id == file_id)
                .ok_or_else(|| format!("GeoJSON provider '{file_id}' does not exist"))?;
            match file.geo_json.as_deref() {
                Some(path) if !path.is_empty() => Ok(DataProviderRef::GeoJsonFile {
                    path: path.to_string(),
                }),
                _ => Err(format!("GeoJSON provider '{file_id}' has no file")),
            }
        }
        (None, Some(ogm_id)) => {
            let ogm = snapshot
                .open_green_maps
                .iter()
                .find(|o| &o.id == ogm_id)
                .ok_or_else(|| format!("OpenGreenMap provider '{ogm_id}' does not exist"))?;
            if ogm.ogm_map_id.trim().is_empty() {
                return Err(format!("OpenGreenMap provider '{ogm_id}' has no map id"));
            }
            Ok(DataProviderRef::OpenGreenMap {
                dataset_id: ogm.ogm_map_id.trim().to_string(),
            })
        }
    }
}

fn collect_rules(
    snapshot: &Snapshot,
    layer_ids: &HashSet<&str>,
    style_ids: &HashSet<&str>,
    result: &mut ValidationResult,
) -> HashMap<String, RuleList> {
    let mut grouped: HashMap<String, Vec<(Option<i64>, StyleRule)>> = HashMap::new();

    for record in &snapshot.style_rules {
        let Some((layer, rule)) = validate_rule(record, layer_ids, style_ids, result) else {
            continue;
        };
        grouped
            .entry(layer)
            .or_default()
            .push((record.position, rule));
    }

    grouped
        .into_iter()
        .map(|(layer, mut rules)| {
            // Stable: equal or missing positions keep listing order
            rules.sort_by_key(|(position, _)| position.unwrap_or(i64::MAX));
            (layer, rules.into_iter().map(|(_, rule)| rule).collect())
        })
        .collect()
}

fn validate_rule(
    record: &StyleOnLayerRecord,
    layer_ids: &HashSet<&str>,
    style_ids: &HashSet<&str>,
    result: &mut ValidationResult,
) -> Option<(String, StyleRule)> {
    let mut ok = true;

    let layer = match record.layer.as_deref() {
        Some(layer) if layer_ids.contains(layer) => Some(layer),
        Some(layer) => {
            result.errors.push(format!(
                "Rule '{}' references missing layer '{layer}'",
                record.id
            ));
            ok = false;
            None
        }
        None => {
            result
                .errors
                .push(format!("Rule '{}' is not attached to a layer", record.id));
            ok = false;
            None
        }
    };

    let style = match record.style.as_deref() {
        Some(style) if style_ids.contains(style) => Some(style),
        Some(style) => {
            result.errors.push(format!(
                "Rule '{}' references missing style '{style}'",
                record.id
            ));
            ok = false;
            None
        }
        None => {
            result
                .errors
                .push(format!("Rule '{}' has no style", record.id));
            ok = false;
            None
        }
    };

    if record.map_attr_key.trim().is_empty() {
        result
            .errors
            .push(format!("Rule '{}' has an empty attribute key", record.id));
        ok = false;
    }

    let operator = match record.map_attr_oper.parse::<Operator>() {
        Ok(op) => Some(op),
        Err(e) => {
            result.errors.push(format!("Rule '{}': {e}", record.id));
            ok = false;
            None
        }
    };

    match (ok, layer, style, operator) {
        (true, Some(layer), Some(style), Some(operator)) => Some((
            layer.to_string(),
            StyleRule {
                id: record.id.clone(),
                style: StyleId::from(style),
                attribute_key: record.map_attr_key.clone(),
                attribute_value: record.map_attr_val.clone(),
                operator,
                legend_text: record.legend_text.clone(),
            },
        )),
        _ => None,
    }
}

fn validate_style(
    record: &StyleRecord,
    seen: &mut HashSet<String>,
    result: &mut ValidationResult,
) -> Option<Style> {
    let mut ok = true;

    if record.title.trim().is_empty() {
        result
            .errors
            .push(format!("Style '{}' title is required", record.id));
        ok = false;
    } else if !seen.insert(record.title.clone()) {
        result.errors.push(format!(
            "Style '{}' title '{}' is not unique",
            record.id, record.title
        ));
        ok = false;
    }

    let color = checked_color(&record.id, "color", &record.color, DEFAULT_STROKE_COLOR, result);
    let fill_color = checked_color(
        &record.id,
        "fillColor",
        &record.fill_color,
        DEFAULT_FILL_COLOR,
        result,
    );
    ok &= color.is_some() && fill_color.is_some();

    check_opacity(&record.id, "opacity", record.opacity, result);
    check_opacity(&record.id, "fillOpacity", record.fill_opacity, result);
    check_opacity(&record.id, "iconOpacity", record.icon_opacity, result);

    if !ok {
        return None;
    }

    Some(Style {
        id: StyleId(record.id.clone()),
        title: record.title.clone(),
        stroke: Stroke {
            enabled: record.stroke,
            color: color?,
            weight: record.weight,
            opacity: record.opacity,
            line_cap: record.line_cap.clone(),
            line_join: record.line_join.clone(),
            dash_array: record.dash_array.clone(),
            dash_offset: record.dash_offset.clone(),
        },
        fill: Fill {
            enabled: record.fill,
            color: fill_color?,
            opacity: record.fill_opacity,
            fill_rule: record.fill_rule.clone(),
        },
        icon: record.icon.as_deref().map(IconId::from),
        icon_opacity: record.icon_opacity,
        on_hover: record.on_hover.as_deref().map(StyleId::from),
    })
}

fn validate_icon(record: &IconRecord, result: &mut ValidationResult) -> Option<Icon> {
    let bg_color = checked_color(&record.id, "bgColor", &record.bg_color, DEFAULT_ICON_COLOR, result);
    let fill_color = checked_color(
        &record.id,
        "fillColor",
        &record.fill_color,
        DEFAULT_ICON_COLOR,
        result,
    );
    let stroke_color = checked_color(
        &record.id,
        "strokeColor",
        &record.stroke_color,
        DEFAULT_ICON_COLOR,
        result,
    );

    let width = non_negative(&record.id, "width", record.width, result);
    let height = non_negative(&record.id, "height", record.height, result);

    Some(Icon {
        id: IconId(record.id.clone()),
        width,
        height,
        anchor_x: pixel_offset(&record.id, "anchorX", record.anchor_x, result),
        anchor_y: pixel_offset(&record.id, "anchorY", record.anchor_y, result),
        bg_color: bg_color?,
        fill_color: fill_color?,
        stroke_color: stroke_color?,
        svg: record.svg.clone().filter(|s| !s.is_empty()),
    })
}

fn checked_color(
    owner: &str,
    field: &str,
    value: &Option<String>,
    default: &str,
    result: &mut ValidationResult,
) -> Option<String> {
    match value.as_deref() {
        None | Some("") => Some(default.to_string()),
        Some(color) if is_hex_color(color) => Some(color.to_string()),
        Some(color) => {
            result.errors.push(format!(
                "'{owner}' field '{field}' value '{color}' must be a hex color in the format #FFF or #FFFFFF"
            ));
            None
        }
    }
}

fn check_opacity(owner: &str, field: &str, value: Option<f64>, result: &mut ValidationResult) {
    if let Some(v) = value {
        if !(0.0..=1.0).contains(&v) {
            result.warnings.push(format!(
                "Style '{owner}' field '{field}' value {v} is outside 0..1"
            ));
        }
    }
}

fn non_negative(
    owner: &str,
    field: &str,
    value: Option<i64>,
    result: &mut ValidationResult,
) -> Option<u32> {
    let v = value?;
    match u32::try_from(v) {
        Ok(v) => Some(v),
        Err(_) => {
            result.warnings.push(format!(
                "Icon '{owner}' field '{field}' value {v} is not a valid pixel size, ignoring"
            ));
            None
        }
    }
}

fn pixel_offset(
    owner: &str,
    field: &str,
    value: Option<i64>,
    result: &mut ValidationResult,
) -> Option<i32> {
    let v = value?;
    match i32::try_from(v) {
        Ok(v) => Some(v),
        Err(_) => {
            result.warnings.push(format!(
                "Icon '{owner}' field '{field}' value {v} is out of range, ignoring"
            ));
            None
        }
    }
}
