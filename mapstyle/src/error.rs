use thiserror::Error;

#[derive(Error, Debug)]
pub enum MapStyleError {
    #[error("Not found: {kind} '{id}'")]
    NotFound { kind: &'static str, id: String },

    #[error("Malformed data: {0}")]
    MalformedData(String),

    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Upstream returned an invalid response: {0}")]
    UpstreamInvalidResponse(String),

    #[error("Asset unavailable: {0}")]
    AssetUnavailable(String),

    #[error("Configuration invariant violated for layer '{layer}': {reason}")]
    ConfigurationInvariantViolated { layer: String, reason: String },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

impl MapStyleError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        MapStyleError::NotFound {
            kind,
            id: id.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, MapStyleError>;
