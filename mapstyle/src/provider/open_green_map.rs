//! OpenGreenMap dataset provider

use super::http::{AsyncHttpClient, HttpError};
use crate::config::OpenGreenMapConfig;
use crate::error::{MapStyleError, Result};
use crate::feature::FeatureCollection;
use std::time::Duration;
use url::Url;

/// Fetches a dataset's features from the OpenGreenMap service.
///
/// Every attempt is bounded by the configured timeout. Transport failures and
/// 5xx/429 answers are retried with exponential backoff up to `max_attempts`
/// in total; anything else fails at once.
pub struct OpenGreenMapProvider<C> {
    http_client: C,
    config: OpenGreenMapConfig,
}

impl<C: AsyncHttpClient> OpenGreenMapProvider<C> {
    pub fn new(http_client: C, config: OpenGreenMapConfig) -> Self {
        Self {
            http_client,
            config,
        }
    }

    /// URL of a dataset's feature collection.
    ///
    /// The dataset id fills one whole path segment of the template and is
    /// percent-encoded as such, `/` included.
    pub fn dataset_url(&self, dataset_id: &str) -> Result<Url> {
        let template = self
            .config
            .url_template
            .replace("{api_url}", self.config.api_url.trim_end_matches('/'));
        let invalid = |reason: String| {
            MapStyleError::Config(format!("invalid OpenGreenMap URL template '{template}': {reason}"))
        };

        let (prefix, suffix) = template
            .split_once("{dataset_id}")
            .ok_or_else(|| invalid("missing {dataset_id}".into()))?;
        let mut url = Url::parse(prefix).map_err(|e| invalid(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| invalid("not a hierarchical URL".into()))?
            .pop_if_empty()
            .push(dataset_id)
            .extend(suffix.split('/').filter(|s| !s.is_empty()));
        Ok(url)
    }

    pub async fn fetch(&self, dataset_id: &str) -> Result<FeatureCollection> {
        let url = self.dataset_url(dataset_id)?;
        let url = url.as_str();
        let attempts = self.config.max_attempts.max(1);
        let mut delay = self.config.backoff();
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            log::debug!("OpenGreenMap fetch {url} (attempt {attempt}/{attempts})");

            let outcome =
                match tokio::time::timeout(self.config.attempt_timeout(), self.http_client.get(url))
                    .await
                {
                    Ok(outcome) => outcome,
                    Err(_) => Err(HttpError::Transport(format!(
                        "timed out after {:?}",
                        self.config.attempt_timeout()
                    ))),
                };

            match outcome {
                Ok(body) => return decode(dataset_id, &body),
                Err(HttpError::Status { status: 404, .. }) => {
                    return Err(MapStyleError::not_found("OpenGreenMap dataset", dataset_id));
                }
                Err(e) if e.is_transient() => {
                    last_error = e.to_string();
                    if attempt < attempts {
                        log::warn!(
                            "OpenGreenMap dataset {dataset_id}: {e}; retrying in {delay:?}"
                        );
                        tokio::time::sleep(delay).await;
                        delay = next_delay(delay);
                    }
                }
                Err(e) => return Err(MapStyleError::UpstreamUnavailable(e.to_string())),
            }
        }

        Err(MapStyleError::UpstreamUnavailable(format!(
            "dataset {dataset_id} unreachable after {attempts} attempt(s): {last_error}"
        )))
    }
}

fn next_delay(delay: Duration) -> Duration {
    delay.saturating_mul(2)
}

fn decode(dataset_id: &str, body: &[u8]) -> Result<FeatureCollection> {
    FeatureCollection::from_geojson_slice(body).map_err(|e| match e {
        MapStyleError::MalformedData(msg) => MapStyleError::UpstreamInvalidResponse(format!(
            "dataset {dataset_id}: {msg}"
        )),
        other => other,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::http::mock::MockHttpClient;

    const BODY: &str = r#"{"type":"FeatureCollection","features":[{"type":"Feature","properties":{"type":"garden"},"geometry":null}]}"#;

    fn config() -> OpenGreenMapConfig {
        OpenGreenMapConfig {
            api_url: "https://ogm.test/api/".into(),
            timeout_secs: 1,
            max_attempts: 3,
            backoff_ms: 1,
            ..OpenGreenMapConfig::default()
        }
    }

    #[test]
    fn test_dataset_url() {
        let provider = OpenGreenMapProvider::new(MockHttpClient::ok(BODY), config());
        assert_eq!(
            provider.dataset_url("5ab3c").unwrap().as_str(),
            "https://ogm.test/api/maps/5ab3c/geojson"
        );
        assert_eq!(
            provider.dataset_url("a b/c").unwrap().as_str(),
            "https://ogm.test/api/maps/a%20b%2Fc/geojson"
        );
    }

    #[test]
    fn test_dataset_url_custom_template() {
        let cfg = OpenGreenMapConfig {
            url_template: "{api_url}/datasets/{dataset_id}".into(),
            ..config()
        };
        let provider = OpenGreenMapProvider::new(MockHttpClient::ok(BODY), cfg);
        assert_eq!(
            provider.dataset_url("5ab3c").unwrap().as_str(),
            "https://ogm.test/api/datasets/5ab3c"
        );
    }

    #[tokio::test]
    async fn test_unparseable_api_url_is_config_error() {
        let cfg = OpenGreenMapConfig {
            api_url: "not a url".into(),
            ..config()
        };
        let provider = OpenGreenMapProvider::new(MockHttpClient::ok(BODY), cfg);
        assert!(matches!(
            provider.fetch("x").await,
            Err(MapStyleError::Config(_))
        ));
        assert_eq!(provider.http_client.calls(), 0);
    }

    #[tokio::test]
    async fn test_fetch_success() {
        let provider = OpenGreenMapProvider::new(MockHttpClient::ok(BODY), config());
        let fc = provider.fetch("5ab3c").await.unwrap();
        assert_eq!(fc.len(), 1);
        assert_eq!(fc.features[0].attribute("type").unwrap(), "garden");
    }

    #[tokio::test]
    async fn test_retries_then_succeeds() {
        let client = MockHttpClient::new(vec![
            Err(HttpError::Transport("reset".into())),
            Err(HttpError::Status { status: 503, url: "u".into() }),
            Ok(BODY.as_bytes().to_vec()),
        ]);
        let provider = OpenGreenMapProvider::new(client, config());
        assert_eq!(provider.fetch("x").await.unwrap().len(), 1);
        assert_eq!(provider.http_client.calls(), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let client = MockHttpClient::new(vec![Err(HttpError::Transport("down".into()))]);
        let provider = OpenGreenMapProvider::new(client, config());
        let err = provider.fetch("x").await.unwrap_err();
        assert!(matches!(err, MapStyleError::UpstreamUnavailable(_)));
        assert!(err.to_string().contains("3 attempt"));
        assert_eq!(provider.http_client.calls(), 3);
    }

    #[tokio::test]
    async fn test_client_error_not_retried() {
        let client = MockHttpClient::new(vec![Err(HttpError::Status {
            status: 403,
            url: "u".into(),
        })]);
        let provider = OpenGreenMapProvider::new(client, config());
        let err = provider.fetch("x").await.unwrap_err();
        assert!(matches!(err, MapStyleError::UpstreamUnavailable(_)));
        assert_eq!(provider.http_client.calls(), 1);
    }

    #[tokio::test]
    async fn test_missing_dataset_is_not_found() {
        let client = MockHttpClient::new(vec![Err(HttpError::Status {
            status: 404,
            url: "u".into(),
        })]);
        let provider = OpenGreenMapProvider::new(client, config());
        assert!(matches!(
            provider.fetch("gone").await,
            Err(MapStyleError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_schema_mismatch_is_invalid_response() {
        let client = MockHttpClient::ok(r#"{"sites": []}"#);
        let provider = OpenGreenMapProvider::new(client, config());
        let err = provider.fetch("x").await.unwrap_err();
        assert!(matches!(err, MapStyleError::UpstreamInvalidResponse(_)));
        assert_eq!(provider.http_client.calls(), 1);
    }

    #[tokio::test]
    async fn test_attempt_timeout_counts_as_transport_failure() {
        let client = MockHttpClient::ok(BODY).with_delay(Duration::from_millis(300));
        // Zero per-attempt budget: the mock's delay always loses
        let cfg = OpenGreenMapConfig {
            max_attempts: 2,
            timeout_secs: 0,
            ..config()
        };
        let provider = OpenGreenMapProvider::new(client, cfg);
        let err = provider.fetch("x").await.unwrap_err();
        assert!(matches!(err, MapStyleError::UpstreamUnavailable(_)));
        assert!(err.to_string().contains("timed out"));
        assert_eq!(provider.http_client.calls(), 2);
    }

    #[test]
    fn test_backoff_doubles() {
        assert_eq!(next_delay(Duration::from_millis(250)), Duration::from_millis(500));
    }
}
