use crate::asset::AssetStorage;
use crate::error::{MapStyleError, Result};
use crate::matcher::MatchPolicy;
use crate::model::StyleId;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_FILE: &str = "mapstyle.yaml";
pub const DEFAULT_OGM_API_URL: &str = "https://api.greenmap.org/v1";
pub const DEFAULT_OGM_URL_TEMPLATE: &str = "{api_url}/maps/{dataset_id}/geojson";
pub const DEFAULT_OGM_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_OGM_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_OGM_BACKOFF_MS: u64 = 250;
pub const DEFAULT_LAYER_TIMEOUT_SECS: u64 = 30;

/// Top-level configuration, read from `mapstyle.yaml`.
///
/// Every field has a default, so an empty file (or no file at all) is a
/// working configuration. Environment variables override the file:
/// `BASE_URL`, `MAPSTYLE_SNAPSHOT`, `OPENGREENMAP_API_URL`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Snapshot to load: a `.yaml` export or a SQLite database
    pub snapshot: Option<PathBuf>,
    pub assets: AssetStorage,
    pub open_green_map: OpenGreenMapConfig,
    pub matching: MatchingConfig,
    /// Time budget for resolving a single layer, fetch included
    pub layer_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            snapshot: None,
            assets: AssetStorage::default(),
            open_green_map: OpenGreenMapConfig::default(),
            matching: MatchingConfig::default(),
            layer_timeout_secs: DEFAULT_LAYER_TIMEOUT_SECS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenGreenMapConfig {
    pub api_url: String,
    /// `{api_url}` and `{dataset_id}` are substituted
    pub url_template: String,
    /// Per-attempt timeout
    pub timeout_secs: u64,
    pub max_attempts: u32,
    /// First retry delay; doubles on every further attempt
    pub backoff_ms: u64,
}

impl Default for OpenGreenMapConfig {
    fn default() -> Self {
        OpenGreenMapConfig {
            api_url: DEFAULT_OGM_API_URL.to_string(),
            url_template: DEFAULT_OGM_URL_TEMPLATE.to_string(),
            timeout_secs: DEFAULT_OGM_TIMEOUT_SECS,
            max_attempts: DEFAULT_OGM_MAX_ATTEMPTS,
            backoff_ms: DEFAULT_OGM_BACKOFF_MS,
        }
    }
}

impl OpenGreenMapConfig {
    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingConfig {
    pub policy: MatchPolicy,
    /// Style applied to features no rule matches. Unset means such features
    /// are reported unstyled.
    pub fallback_style: Option<StyleId>,
}

impl Config {
    /// Load configuration from `path`, or from `mapstyle.yaml` in the working
    /// directory when no path is given and that file exists. Environment
    /// overrides are applied on top.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => Config::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        config.check()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            MapStyleError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_yaml_str(&content)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Config::default());
        }
        let config: Config = serde_yaml::from_str(content)?;
        Ok(config)
    }

    /// Apply environment overrides using `lookup` as the variable source.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(base_url) = lookup("BASE_URL").filter(|v| !v.is_empty()) {
            self.assets.base_url = base_url;
        }
        if let Some(snapshot) = lookup("MAPSTYLE_SNAPSHOT").filter(|v| !v.is_empty()) {
            self.snapshot = Some(PathBuf::from(snapshot));
        }
        if let Some(api_url) = lookup("OPENGREENMAP_API_URL").filter(|v| !v.is_empty()) {
            self.open_green_map.api_url = api_url;
        }
    }

    /// Reject settings that would make the remote provider unbounded or inert.
    pub fn check(&self) -> Result<()> {
        if self.open_green_map.max_attempts == 0 {
            return Err(MapStyleError::Config(
                "open_green_map.max_attempts must be at least 1".into(),
            ));
        }
        if self.open_green_map.timeout_secs == 0 || self.layer_timeout_secs == 0 {
            return Err(MapStyleError::Config("timeouts must be greater than zero".into()));
        }
        if !self.open_green_map.url_template.contains("{dataset_id}") {
            return Err(MapStyleError::Config(
                "open_green_map.url_template must contain {dataset_id}".into(),
            ));
        }
        Ok(())
    }

    pub fn layer_timeout(&self) -> Duration {
        Duration::from_secs(self.layer_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_from_empty_file() {
        let config = Config::from_yaml_str("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.assets.base_url, "http://localhost:3000");
        assert_eq!(config.open_green_map.max_attempts, 3);
        assert_eq!(config.matching.policy, MatchPolicy::FirstMatch);
    }

    #[test]
    fn test_partial_file() {
        let config = Config::from_yaml_str(
            "assets:\n  base_url: https://maps.example.org\nopen_green_map:\n  max_attempts: 2\nmatching:\n  policy: last_match\n  fallback_style: hidden\n",
        )
        .unwrap();
        assert_eq!(config.assets.base_url, "https://maps.example.org");
        assert_eq!(config.assets.geojson_dir, PathBuf::from("public/geojson"));
        assert_eq!(config.open_green_map.max_attempts, 2);
        assert_eq!(config.open_green_map.timeout_secs, DEFAULT_OGM_TIMEOUT_SECS);
        assert_eq!(config.matching.policy, MatchPolicy::LastMatch);
        assert_eq!(config.matching.fallback_style, Some(StyleId::from("hidden")));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("BASE_URL", "https://green.example"),
            ("MAPSTYLE_SNAPSHOT", "snap.db"),
            ("OPENGREENMAP_API_URL", ""),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_env(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(config.assets.base_url, "https://green.example");
        assert_eq!(config.snapshot, Some(PathBuf::from("snap.db")));
        assert_eq!(config.open_green_map.api_url, DEFAULT_OGM_API_URL);
    }

    #[test]
    fn test_check_rejects_unbounded_settings() {
        let mut config = Config::default();
        config.open_green_map.max_attempts = 0;
        assert!(config.check().is_err());

        let mut config = Config::default();
        config.layer_timeout_secs = 0;
        assert!(config.check().is_err());

        let mut config = Config::default();
        config.open_green_map.url_template = "{api_url}/maps".into();
        assert!(config.check().is_err());

        assert!(Config::default().check().is_ok());
    }

    #[test]
    fn test_load_from_file() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(tmp.path(), "layer_timeout_secs: 5\n").unwrap();
        let config = Config::from_file(tmp.path()).unwrap();
        assert_eq!(config.layer_timeout(), Duration::from_secs(5));

        let err = Config::from_file(Path::new("/definitely/missing.yaml")).unwrap_err();
        assert!(matches!(err, MapStyleError::Config(_)));
    }
}
