use crate::asset::{AssetKind, AssetStorage};
use crate::error::{MapStyleError, Result};
use crate::model::{Catalog, Fill, IconId, Stroke, Style, StyleId};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

/// Longest `onHover` chain followed before giving up on it.
pub const MAX_HOVER_DEPTH: usize = 32;

/// Icon with every reference replaced by its value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedIcon {
    pub id: IconId,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub anchor_x: Option<i32>,
    pub anchor_y: Option<i32>,
    pub bg_color: String,
    pub fill_color: String,
    pub stroke_color: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum IconResolution {
    Resolved(ResolvedIcon),
    /// The icon or its SVG could not be found. Stroke and fill still apply.
    Unavailable { icon: IconId, reason: String },
}

/// Flat rendering attributes with no further references.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedStyle {
    /// Style that was asked for
    pub requested: StyleId,
    /// Style whose attributes were used (differs from `requested` after hover links)
    pub source: StyleId,
    pub hovered: bool,
    pub stroke: Stroke,
    pub fill: Fill,
    pub icon: Option<IconResolution>,
    pub icon_opacity: Option<f64>,
}

impl ResolvedStyle {
    /// Equal rendering attributes, ignoring which style ids produced them.
    pub fn same_appearance(&self, other: &ResolvedStyle) -> bool {
        self.stroke == other.stroke
            && self.fill == other.fill
            && self.icon == other.icon
            && self.icon_opacity == other.icon_opacity
    }

    /// `AssetUnavailable` for an icon that could not be resolved.
    pub fn asset_error(&self) -> Option<MapStyleError> {
        match &self.icon {
            Some(IconResolution::Unavailable { icon, reason }) => Some(
                MapStyleError::AssetUnavailable(format!("icon '{icon}': {reason}")),
            ),
            _ => None,
        }
    }
}

/// Resolves style ids against one catalog snapshot.
///
/// Results are memoised by `(style id, hovered)` for the lifetime of the
/// resolver, so a resolver should not outlive the snapshot it was built on.
/// Safe to share between threads.
pub struct StyleResolver<'a> {
    catalog: &'a Catalog,
    assets: &'a AssetStorage,
    cache: RwLock<HashMap<(StyleId, bool), ResolvedStyle>>,
}

impl<'a> StyleResolver<'a> {
    pub fn new(catalog: &'a Catalog, assets: &'a AssetStorage) -> Self {
        StyleResolver {
            catalog,
            assets,
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn resolve_style(&self, style_id: &StyleId, hovered: bool) -> Result<ResolvedStyle> {
        let key = (style_id.clone(), hovered);
        if let Ok(cache) = self.cache.read() {
            if let Some(hit) = cache.get(&key) {
                return Ok(hit.clone());
            }
        }

        let base = self
            .catalog
            .style(style_id)
            .ok_or_else(|| MapStyleError::not_found("style", style_id.as_str()))?;
        let target = if hovered { self.follow_hover(base) } else { base };

        let resolved = ResolvedStyle {
            requested: style_id.clone(),
            source: target.id.clone(),
            hovered,
            stroke: target.stroke.clone(),
            fill: target.fill.clone(),
            icon: target.icon.as_ref().map(|icon| self.resolve_icon(icon)),
            icon_opacity: target.icon_opacity,
        };

        if let Some(err) = resolved.asset_error() {
            log::warn!("Style '{}': {err}", target.id);
        }

        if let Ok(mut cache) = self.cache.write() {
            cache.insert(key, resolved.clone());
        }
        Ok(resolved)
    }

    /// Walk the `onHover` chain from `base` to its end.
    ///
    /// Stops at the last distinct style when an id repeats, when a link
    /// dangles, or after `MAX_HOVER_DEPTH` styles.
    fn follow_hover(&self, base: &'a Style) -> &'a Style {
        let mut current = base;
        let mut visited: HashSet<&StyleId> = HashSet::from([&base.id]);

        while let Some(next_id) = &current.on_hover {
            if visited.contains(next_id) {
                log::warn!(
                    "Hover cycle from style '{}' back to '{next_id}', using '{}'",
                    base.id,
                    current.id
                );
                break;
            }
            if visited.len() >= MAX_HOVER_DEPTH {
                log::warn!(
                    "Hover chain from style '{}' exceeds {MAX_HOVER_DEPTH} styles, using '{}'",
                    base.id,
                    current.id
                );
                break;
            }
            match self.catalog.style(next_id) {
                Some(next) => {
                    visited.insert(&next.id);
                    current = next;
                }
                None => {
                    log::warn!(
                        "Style '{}' hovers to missing style '{next_id}', using '{}'",
                        current.id,
                        current.id
                    );
                    break;
                }
            }
        }

        current
    }

    fn resolve_icon(&self, icon_id: &IconId) -> IconResolution {
        let Some(icon) = self.catalog.icon(icon_id) else {
            return IconResolution::Unavailable {
                icon: icon_id.clone(),
                reason: "icon does not exist".into(),
            };
        };
        let Some(svg) = icon.svg.as_deref() else {
            return IconResolution::Unavailable {
                icon: icon_id.clone(),
                reason: "icon has no SVG asset".into(),
            };
        };
        if !self.assets.contains(AssetKind::Image, svg) {
            return IconResolution::Unavailable {
                icon: icon_id.clone(),
                reason: format!("SVG asset '{svg}' is missing from storage"),
            };
        }

        IconResolution::Resolved(ResolvedIcon {
            id: icon.id.clone(),
            width: icon.width,
            height: icon.height,
            anchor_x: icon.anchor_x,
            anchor_y: icon.anchor_y,
            bg_color: icon.bg_color.clone(),
            fill_color: icon.fill_color.clone(),
            stroke_color: icon.stroke_color.clone(),
            url: self.assets.public_url(AssetKind::Image, svg),
        })
    }

    /// Number of memoised entries (for diagnostics and tests).
    pub fn cached(&self) -> usize {
        self.cache.read().map(|c| c.len()).unwrap_or(0)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::model::Icon;
    use tempfile::TempDir;

    pub(crate) fn style(id: &str, on_hover: Option<&str>) -> Style {
        Style {
            id: StyleId::from(id),
            title: format!("Title {id}"),
            stroke: Stroke {
                enabled: true,
                color: "#123".into(),
                weight: Some(id.len() as f64),
                opacity: Some(1.0),
                line_cap: Some("round".into()),
                line_join: None,
                dash_array: Some(format!("{id} 2")),
                dash_offset: None,
            },
            fill: Fill {
                enabled: false,
                color: "#000".into(),
                opacity: None,
                fill_rule: None,
            },
            icon: None,
            icon_opacity: None,
            on_hover: on_hover.map(StyleId::from),
        }
    }

    fn catalog(styles: Vec<Style>, icons: Vec<Icon>) -> Catalog {
        Catalog::new(Vec::new(), styles, icons, Vec::new())
    }

    fn ids(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("s{i}")).collect()
    }

    /// `n` styles whose hover links form a ring s0 -> s1 -> ... -> s0.
    fn ring(n: usize) -> Catalog {
        let names = ids(n);
        let styles = (0..n)
            .map(|i| style(&names[i], Some(&names[(i + 1) % n])))
            .collect();
        catalog(styles, Vec::new())
    }

    #[test]
    fn test_unhovered_matches_declared_fields() {
        let s = style("plain", None);
        let cat = catalog(vec![s.clone()], Vec::new());
        let assets = AssetStorage::default();
        let resolver = StyleResolver::new(&cat, &assets);

        let resolved = resolver.resolve_style(&s.id, false).unwrap();
        assert_eq!(resolved.stroke, s.stroke);
        assert_eq!(resolved.fill, s.fill);
        assert_eq!(resolved.icon, None);
        assert_eq!(resolved.source, s.id);

        // No hover link: hovered resolution is the style itself
        let hovered = resolver.resolve_style(&s.id, true).unwrap();
        assert_eq!(hovered.stroke, s.stroke);
        assert_eq!(hovered.source, s.id);
    }

    #[test]
    fn test_two_cycle_takes_one_hop() {
        let cat = catalog(
            vec![style("S1", Some("S2")), style("S2", Some("S1"))],
            Vec::new(),
        );
        let assets = AssetStorage::default();
        let resolver = StyleResolver::new(&cat, &assets);

        let resolved = resolver.resolve_style(&StyleId::from("S1"), true).unwrap();
        assert_eq!(resolved.source, StyleId::from("S2"));
        assert_eq!(resolved.stroke, cat.style(&StyleId::from("S2")).unwrap().stroke);
        assert_eq!(resolved.requested, StyleId::from("S1"));
    }

    #[test]
    fn test_cycles_of_any_length_terminate_in_cycle() {
        for n in 1..=40 {
            let cat = ring(n);
            let assets = AssetStorage::default();
            let resolver = StyleResolver::new(&cat, &assets);
            let resolved = resolver.resolve_style(&StyleId::from("s0"), true).unwrap();
            assert!(
                cat.style(&resolved.source).is_some(),
                "ring of {n} returned {}",
                resolved.source
            );
            if n <= MAX_HOVER_DEPTH {
                // Last distinct style before the id repeats
                assert_eq!(resolved.source, StyleId(format!("s{}", n - 1)), "ring of {n}");
            }
        }
    }

    #[test]
    fn test_self_hover() {
        let cat = catalog(vec![style("me", Some("me"))], Vec::new());
        let assets = AssetStorage::default();
        let resolver = StyleResolver::new(&cat, &assets);
        let resolved = resolver.resolve_style(&StyleId::from("me"), true).unwrap();
        assert_eq!(resolved.source, StyleId::from("me"));
    }

    #[test]
    fn test_chain_followed_to_end() {
        let cat = catalog(
            vec![style("a", Some("b")), style("b", Some("c")), style("c", None)],
            Vec::new(),
        );
        let assets = AssetStorage::default();
        let resolver = StyleResolver::new(&cat, &assets);
        let resolved = resolver.resolve_style(&StyleId::from("a"), true).unwrap();
        assert_eq!(resolved.source, StyleId::from("c"));
    }

    #[test]
    fn test_long_chain_bounded() {
        let names = ids(100);
        let styles = (0..100)
            .map(|i| style(&names[i], names.get(i + 1).map(String::as_str)))
            .collect();
        let cat = catalog(styles, Vec::new());
        let assets = AssetStorage::default();
        let resolver = StyleResolver::new(&cat, &assets);
        let resolved = resolver.resolve_style(&StyleId::from("s0"), true).unwrap();
        assert_eq!(resolved.source, StyleId(format!("s{}", MAX_HOVER_DEPTH - 1)));
    }

    #[test]
    fn test_dangling_hover_stops_at_referrer() {
        let cat = catalog(vec![style("a", Some("ghost"))], Vec::new());
        let assets = AssetStorage::default();
        let resolver = StyleResolver::new(&cat, &assets);
        let resolved = resolver.resolve_style(&StyleId::from("a"), true).unwrap();
        assert_eq!(resolved.source, StyleId::from("a"));
    }

    #[test]
    fn test_missing_style_is_not_found() {
        let cat = catalog(Vec::new(), Vec::new());
        let assets = AssetStorage::default();
        let resolver = StyleResolver::new(&cat, &assets);
        assert!(matches!(
            resolver.resolve_style(&StyleId::from("x"), false),
            Err(MapStyleError::NotFound { .. })
        ));
    }

    #[test]
    fn test_icon_resolution() {
        let tmp = TempDir::new().unwrap();
        let assets = AssetStorage::new(
            "https://maps.example.org",
            tmp.path().join("geojson"),
            tmp.path().join("images"),
        );
        std::fs::create_dir_all(&assets.images_dir).unwrap();
        std::fs::write(assets.images_dir.join("tree.svg"), "<svg/>").unwrap();

        let icon = |id: &str, svg: Option<&str>| Icon {
            id: IconId::from(id),
            width: Some(16),
            height: Some(24),
            anchor_x: Some(8),
            anchor_y: Some(24),
            bg_color: "#fff".into(),
            fill_color: "#0a0".into(),
            stroke_color: "#000".into(),
            svg: svg.map(String::from),
        };
        let with_icon = |id: &str, icon: &str| Style {
            icon: Some(IconId::from(icon)),
            icon_opacity: Some(0.8),
            ..style(id, None)
        };

        let cat = catalog(
            vec![
                with_icon("ok", "tree"),
                with_icon("no-svg", "blank"),
                with_icon("lost", "lost"),
                with_icon("gone", "nonexistent"),
            ],
            vec![
                icon("tree", Some("/tree.svg")),
                icon("blank", None),
                icon("lost", Some("/lost.svg")),
            ],
        );
        let resolver = StyleResolver::new(&cat, &assets);

        let ok = resolver.resolve_style(&StyleId::from("ok"), false).unwrap();
        match ok.icon {
            Some(IconResolution::Resolved(ref icon)) => {
                assert_eq!(icon.url, "https://maps.example.org/images/tree.svg");
                assert_eq!(icon.anchor_y, Some(24));
            }
            ref other => panic!("expected resolved icon, got {other:?}"),
        }
        assert!(ok.asset_error().is_none());

        for id in ["no-svg", "lost", "gone"] {
            let resolved = resolver.resolve_style(&StyleId::from(id), false).unwrap();
            assert!(matches!(
                resolved.asset_error(),
                Some(MapStyleError::AssetUnavailable(_))
            ));
            // Stroke and fill are still usable
            assert!(resolved.stroke.enabled);
        }
    }

    #[test]
    fn test_memoised_per_key() {
        let cat = catalog(vec![style("a", Some("b")), style("b", None)], Vec::new());
        let assets = AssetStorage::default();
        let resolver = StyleResolver::new(&cat, &assets);

        let first = resolver.resolve_style(&StyleId::from("a"), true).unwrap();
        let second = resolver.resolve_style(&StyleId::from("a"), true).unwrap();
        resolver.resolve_style(&StyleId::from("a"), false).unwrap();
        assert_eq!(first, second);
        assert_eq!(resolver.cached(), 2);
    }

    #[test]
    fn test_same_appearance_ignores_ids() {
        let cat = catalog(
            vec![
                Style { title: "x".into(), ..style("aa", None) },
                Style { title: "y".into(), ..style("bb", None) },
            ],
            Vec::new(),
        );
        let assets = AssetStorage::default();
        let resolver = StyleResolver::new(&cat, &assets);
        let mut a = resolver.resolve_style(&StyleId::from("aa"), false).unwrap();
        let b = resolver.resolve_style(&StyleId::from("bb"), false).unwrap();
        // dash_array differs by id in the fixture
        assert!(!a.same_appearance(&b));
        a.stroke.dash_array = b.stroke.dash_array.clone();
        assert!(a.same_appearance(&b));
    }
}
