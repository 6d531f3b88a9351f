//! Data provider adapters: turn a layer's provider reference into features.

pub mod http;
mod open_green_map;

pub use http::{AsyncHttpClient, HttpError, ReqwestClient};
pub use open_green_map::OpenGreenMapProvider;

use crate::asset::{AssetKind, AssetStorage};
use crate::config::Config;
use crate::error::{MapStyleError, Result};
use crate::feature::FeatureCollection;
use crate::model::DataProviderRef;

/// Fetches feature collections for either provider kind.
///
/// Nothing is cached: every call reads the file or hits the service again.
pub struct FeatureSource<C = ReqwestClient> {
    assets: AssetStorage,
    open_green_map: OpenGreenMapProvider<C>,
}

impl FeatureSource<ReqwestClient> {
    /// Build a source with a real HTTP client from configuration.
    pub fn from_config(config: &Config) -> Result<Self> {
        let client = ReqwestClient::with_timeout(config.open_green_map.attempt_timeout())
            .map_err(|e| MapStyleError::Config(e.to_string()))?;
        Ok(Self::new(
            config.assets.clone(),
            OpenGreenMapProvider::new(client, config.open_green_map.clone()),
        ))
    }
}

impl<C: AsyncHttpClient> FeatureSource<C> {
    pub fn new(assets: AssetStorage, open_green_map: OpenGreenMapProvider<C>) -> Self {
        Self {
            assets,
            open_green_map,
        }
    }

    pub fn assets(&self) -> &AssetStorage {
        &self.assets
    }

    pub async fn fetch_features(&self, provider: &DataProviderRef) -> Result<FeatureCollection> {
        log::debug!("Fetching features from {}", provider.describe());
        match provider {
            DataProviderRef::GeoJsonFile { path } => {
                let bytes = self.assets.read(AssetKind::GeoJson, path).await?;
                parse_geojson(path, &bytes)
            }
            DataProviderRef::OpenGreenMap { dataset_id } => {
                self.open_green_map.fetch(dataset_id).await
            }
        }
    }
}

fn parse_geojson(path: &str, bytes: &[u8]) -> Result<FeatureCollection> {
    FeatureCollection::from_geojson_slice(bytes).map_err(|e| match e {
        MapStyleError::MalformedData(msg) => MapStyleError::MalformedData(format!("{path}: {msg}")),
        other => other,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OpenGreenMapConfig;
    use crate::provider::http::mock::MockHttpClient;
    use tempfile::TempDir;

    fn source(tmp: &TempDir, client: MockHttpClient) -> FeatureSource<MockHttpClient> {
        let assets = AssetStorage::new(
            "http://localhost:3000",
            tmp.path().join("geojson"),
            tmp.path().join("images"),
        );
        std::fs::create_dir_all(&assets.geojson_dir).unwrap();
        let ogm = OpenGreenMapProvider::new(
            client,
            OpenGreenMapConfig {
                backoff_ms: 1,
                ..OpenGreenMapConfig::default()
            },
        );
        FeatureSource::new(assets, ogm)
    }

    #[tokio::test]
    async fn test_geojson_file() {
        let tmp = TempDir::new().unwrap();
        let source = source(&tmp, MockHttpClient::ok("[]"));
        std::fs::write(
            source.assets().geojson_dir.join("parks.geojson"),
            r#"{"type":"FeatureCollection","features":[{"type":"Feature","properties":{"type":"park"}}]}"#,
        )
        .unwrap();

        let fc = source
            .fetch_features(&DataProviderRef::GeoJsonFile {
                path: "/parks.geojson".into(),
            })
            .await
            .unwrap();
        assert_eq!(fc.len(), 1);
    }

    #[tokio::test]
    async fn test_geojson_missing_and_malformed() {
        let tmp = TempDir::new().unwrap();
        let source = source(&tmp, MockHttpClient::ok("[]"));
        std::fs::write(source.assets().geojson_dir.join("bad.geojson"), "{oops").unwrap();

        let missing = source
            .fetch_features(&DataProviderRef::GeoJsonFile {
                path: "/nope.geojson".into(),
            })
            .await;
        assert!(matches!(missing, Err(MapStyleError::NotFound { .. })));

        let bad = source
            .fetch_features(&DataProviderRef::GeoJsonFile {
                path: "/bad.geojson".into(),
            })
            .await
            .unwrap_err();
        assert!(matches!(bad, MapStyleError::MalformedData(_)));
        assert!(bad.to_string().contains("/bad.geojson"));
    }

    #[tokio::test]
    async fn test_open_green_map_dispatch() {
        let tmp = TempDir::new().unwrap();
        let source = source(&tmp, MockHttpClient::ok(r#"{"type":"FeatureCollection","features":[]}"#));
        let fc = source
            .fetch_features(&DataProviderRef::OpenGreenMap {
                dataset_id: "abc".into(),
            })
            .await
            .unwrap();
        assert!(fc.is_empty());
    }
}
