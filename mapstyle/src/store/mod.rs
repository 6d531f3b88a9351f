use crate::config::{Config, MatchingConfig};
use crate::error::{MapStyleError, Result};
use crate::feature::{Feature, FeatureCollection};
use crate::legend::{build_legend, LegendEntry};
use crate::matcher::{match_style_with, MatchedRule};
use crate::model::{Catalog, DataProviderRef, Layer, LayerId, RejectedLayer, StyleId};
use crate::provider::{AsyncHttpClient, FeatureSource, ReqwestClient};
use crate::resolver::{ResolvedStyle, StyleResolver};
use crate::schema::{self, Snapshot};
use crate::snapshot_db::SnapshotDb;
use crate::validation::validate_and_prepare;
use futures_util::future::join_all;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// The main entry point.
/// Holds one validated catalog snapshot together with the feature source,
/// and runs resolution passes over it.
pub struct Store<C = ReqwestClient> {
    config: Config,
    catalog: Catalog,
    warnings: Vec<String>,
    source: FeatureSource<C>,
}

impl Store<ReqwestClient> {
    /// Open the snapshot named by `config.snapshot` and validate it.
    pub fn open(config: Config) -> Result<Self> {
        let path = config.snapshot.clone().ok_or_else(|| {
            MapStyleError::Config(
                "no snapshot configured (set `snapshot` in mapstyle.yaml or MAPSTYLE_SNAPSHOT)"
                    .into(),
            )
        })?;
        let snapshot = load_snapshot(&path)?;
        let source = FeatureSource::from_config(&config)?;
        Self::from_snapshot(config, &snapshot, source)
    }
}

impl<C: AsyncHttpClient> Store<C> {
    pub fn from_snapshot(config: Config, snapshot: &Snapshot, source: FeatureSource<C>) -> Result<Self> {
        let (catalog, warnings) = validate_and_prepare(snapshot)?;
        for warning in &warnings {
            log::warn!("{warning}");
        }
        Self::from_parts(config, catalog, warnings, source)
    }

    pub fn from_parts(
        config: Config,
        catalog: Catalog,
        warnings: Vec<String>,
        source: FeatureSource<C>,
    ) -> Result<Self> {
        if let Some(fallback) = &config.matching.fallback_style {
            if catalog.style(fallback).is_none() {
                return Err(MapStyleError::Config(format!(
                    "matching.fallback_style '{fallback}' is not a known style"
                )));
            }
        }

        log::info!(
            "Loaded {} layers ({} rejected), {} styles",
            catalog.layers().len(),
            catalog.rejected_layers().len(),
            catalog.styles().count()
        );

        Ok(Store {
            config,
            catalog,
            warnings,
            source,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Validation warnings collected when the snapshot was loaded.
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Start a resolution pass. Styles resolved through the pass are
    /// memoised until it is dropped.
    pub fn begin_pass(&self) -> ResolutionPass<'_> {
        ResolutionPass {
            catalog: &self.catalog,
            matching: &self.config.matching,
            resolver: StyleResolver::new(&self.catalog, self.source.assets()),
        }
    }

    // ── Single-shot operations ───────────────────────────────────────

    pub fn resolve_style(&self, style_id: &StyleId, hovered: bool) -> Result<ResolvedStyle> {
        self.begin_pass().resolve_style(style_id, hovered)
    }

    pub fn legend(&self, layer_id: &LayerId) -> Result<Vec<LegendEntry>> {
        self.begin_pass().legend(layer_id)
    }

    /// Winning rule for `feature` under the configured policy.
    pub fn match_feature<'s>(
        &'s self,
        layer_id: &LayerId,
        feature: &Feature,
    ) -> Result<Option<MatchedRule<'s>>> {
        let layer = lookup_layer(&self.catalog, layer_id)?;
        Ok(match_style_with(feature, &layer.rules, self.config.matching.policy))
    }

    pub fn style_features(
        &self,
        layer_id: &LayerId,
        features: FeatureCollection,
    ) -> Result<Vec<StyledFeature>> {
        self.begin_pass().style_features(layer_id, features)
    }

    // ── Layer resolution ─────────────────────────────────────────────

    /// Fetch a layer's features, style each one and build its legend.
    pub async fn resolve_layer(&self, layer_id: &LayerId) -> Result<LayerResolution> {
        let pass = self.begin_pass();
        self.resolve_layer_in(&pass, layer_id).await
    }

    /// Resolve every layer concurrently. A failing layer only fails its own
    /// entry; rejected layers are reported as failures after the rest.
    pub async fn resolve_all(&self) -> BatchReport {
        let pass = self.begin_pass();
        let pass = &pass;

        let pending = self.catalog.layers().iter().map(|layer| async move {
            LayerOutcome {
                layer: layer.id.clone(),
                result: self.resolve_layer_in(pass, &layer.id).await,
            }
        });
        let mut outcomes = join_all(pending).await;

        outcomes.extend(self.catalog.rejected_layers().iter().map(|rejected| LayerOutcome {
            layer: rejected.id.clone(),
            result: Err(rejected_error(rejected)),
        }));

        for outcome in &outcomes {
            if let Err(e) = &outcome.result {
                log::warn!("Layer '{}' failed: {e}", outcome.layer);
            }
        }

        BatchReport { outcomes }
    }

    async fn resolve_layer_in(
        &self,
        pass: &ResolutionPass<'_>,
        layer_id: &LayerId,
    ) -> Result<LayerResolution> {
        let layer = pass.layer(layer_id)?;
        let budget = self.config.layer_timeout();

        log::debug!("Resolving layer '{}' from {}", layer.id, layer.provider.describe());
        let features =
            match tokio::time::timeout(budget, self.source.fetch_features(&layer.provider)).await {
                Ok(result) => result?,
                Err(_) => {
                    return Err(MapStyleError::UpstreamUnavailable(format!(
                        "layer '{}' did not load within {}s",
                        layer.id,
                        budget.as_secs()
                    )))
                }
            };

        let styled = pass.style_layer_features(layer, features)?;
        let legend = build_legend(&layer.rules, &pass.resolver)?;
        let unmatched = styled.iter().filter(|f| f.rule.is_none()).count();

        Ok(LayerResolution {
            layer: layer.id.clone(),
            title: layer.title.clone(),
            provider: layer.provider.clone(),
            features: styled,
            legend,
            unmatched,
        })
    }

    pub fn status(&self) -> StoreStatus {
        StoreStatus {
            snapshot: self.config.snapshot.clone(),
            layers: self.catalog.layers().len(),
            rules: self.catalog.layers().iter().map(|l| l.rules.len()).sum(),
            styles: self.catalog.styles().count(),
            icons: self.catalog.icon_count(),
            warnings: self.warnings.len(),
            rejected_layers: self.catalog.rejected_layers().to_vec(),
        }
    }
}

/// Read a snapshot from a SQLite database (`.db`, `.sqlite`, `.sqlite3`)
/// or a YAML export (anything else).
pub fn load_snapshot(path: &Path) -> Result<Snapshot> {
    let is_db = matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("db" | "sqlite" | "sqlite3")
    );
    if is_db {
        log::debug!("Reading snapshot database {}", path.display());
        SnapshotDb::open_read_only(path)?.load_snapshot()
    } else {
        log::debug!("Reading snapshot file {}", path.display());
        schema::parse_snapshot(path)
    }
}

fn lookup_layer<'c>(catalog: &'c Catalog, layer_id: &LayerId) -> Result<&'c Layer> {
    if let Some(layer) = catalog.layer(layer_id) {
        return Ok(layer);
    }
    match catalog.rejected_layer(layer_id) {
        Some(rejected) => Err(rejected_error(rejected)),
        None => Err(MapStyleError::not_found("layer", layer_id.as_str())),
    }
}

fn rejected_error(rejected: &RejectedLayer) -> MapStyleError {
    MapStyleError::ConfigurationInvariantViolated {
        layer: rejected.id.to_string(),
        reason: rejected.reason.clone(),
    }
}

// ── Resolution pass ──────────────────────────────────────────────────

/// One consistent view of the catalog with a shared style cache.
pub struct ResolutionPass<'a> {
    catalog: &'a Catalog,
    matching: &'a MatchingConfig,
    resolver: StyleResolver<'a>,
}

impl<'a> ResolutionPass<'a> {
    pub fn layer(&self, layer_id: &LayerId) -> Result<&'a Layer> {
        lookup_layer(self.catalog, layer_id)
    }

    pub fn resolve_style(&self, style_id: &StyleId, hovered: bool) -> Result<ResolvedStyle> {
        self.resolver.resolve_style(style_id, hovered)
    }

    pub fn legend(&self, layer_id: &LayerId) -> Result<Vec<LegendEntry>> {
        let layer = self.layer(layer_id)?;
        build_legend(&layer.rules, &self.resolver)
    }

    pub fn style_features(
        &self,
        layer_id: &LayerId,
        features: FeatureCollection,
    ) -> Result<Vec<StyledFeature>> {
        let layer = self.layer(layer_id)?;
        self.style_layer_features(layer, features)
    }

    /// Number of styles resolved so far in this pass.
    pub fn cached_styles(&self) -> usize {
        self.resolver.cached()
    }

    fn style_layer_features(
        &self,
        layer: &Layer,
        features: FeatureCollection,
    ) -> Result<Vec<StyledFeature>> {
        let mut styled = Vec::with_capacity(features.len());

        for feature in features.features {
            let matched = match_style_with(&feature, &layer.rules, self.matching.policy);
            let rule = matched.map(|m| m.rule.id.clone());
            let style_id = matched
                .map(|m| &m.rule.style)
                .or(self.matching.fallback_style.as_ref());

            let (style, hover_style) = match style_id {
                Some(id) => (
                    Some(self.resolver.resolve_style(id, false)?),
                    Some(self.resolver.resolve_style(id, true)?),
                ),
                None => (None, None),
            };

            styled.push(StyledFeature {
                feature,
                rule,
                style,
                hover_style,
            });
        }

        Ok(styled)
    }
}

// ── Results ──────────────────────────────────────────────────────────

/// A feature with the styles it renders with.
///
/// `rule` is the matched rule id; `None` means no rule matched, in which
/// case the styles come from the configured fallback (or are absent).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StyledFeature {
    pub feature: Feature,
    pub rule: Option<String>,
    pub style: Option<ResolvedStyle>,
    pub hover_style: Option<ResolvedStyle>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayerResolution {
    pub layer: LayerId,
    pub title: String,
    pub provider: DataProviderRef,
    pub features: Vec<StyledFeature>,
    pub legend: Vec<LegendEntry>,
    /// Features no rule matched
    pub unmatched: usize,
}

#[derive(Debug)]
pub struct LayerOutcome {
    pub layer: LayerId,
    pub result: Result<LayerResolution>,
}

/// Per-layer results of [`Store::resolve_all`].
#[derive(Debug, Default)]
pub struct BatchReport {
    pub outcomes: Vec<LayerOutcome>,
}

impl BatchReport {
    pub fn resolved(&self) -> impl Iterator<Item = &LayerResolution> {
        self.outcomes.iter().filter_map(|o| o.result.as_ref().ok())
    }

    pub fn failures(&self) -> impl Iterator<Item = (&LayerId, &MapStyleError)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().err().map(|e| (&o.layer, e)))
    }

    pub fn outcome(&self, layer_id: &LayerId) -> Option<&LayerOutcome> {
        self.outcomes.iter().find(|o| &o.layer == layer_id)
    }

    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(|o| o.result.is_ok())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoreStatus {
    pub snapshot: Option<PathBuf>,
    pub layers: usize,
    pub rules: usize,
    pub styles: usize,
    pub icons: usize,
    pub warnings: usize,
    pub rejected_layers: Vec<RejectedLayer>,
}
