// Asset buckets: public URL generation and local byte access

use crate::error::{MapStyleError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};

pub const DEFAULT_BASE_URL: &str = "http://localhost:3000";

/// The two storage buckets the admin store writes files into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetKind {
    GeoJson,
    Image,
}

impl AssetKind {
    /// Fixed route prefix under which the bucket is served.
    pub fn route(&self) -> &'static str {
        match self {
            AssetKind::GeoJson => "/geojson",
            AssetKind::Image => "/images",
        }
    }
}

impl std::str::FromStr for AssetKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "geojson" | "geo_json" => Ok(AssetKind::GeoJson),
            "image" | "images" => Ok(AssetKind::Image),
            other => Err(format!("unknown asset kind '{other}' (expected geojson or image)")),
        }
    }
}

/// Locally stored asset buckets plus the base URL they are published under.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetStorage {
    pub base_url: String,
    pub geojson_dir: PathBuf,
    pub images_dir: PathBuf,
}

impl Default for AssetStorage {
    fn default() -> Self {
        AssetStorage {
            base_url: DEFAULT_BASE_URL.to_string(),
            geojson_dir: PathBuf::from("public/geojson"),
            images_dir: PathBuf::from("public/images"),
        }
    }
}

impl AssetStorage {
    pub fn new(base_url: impl Into<String>, geojson_dir: PathBuf, images_dir: PathBuf) -> Self {
        AssetStorage {
            base_url: base_url.into(),
            geojson_dir,
            images_dir,
        }
    }

    /// Map a stored asset path to its public URL.
    ///
    /// `{base_url}{route}{path}`, with the seams between the three parts
    /// normalised to a single `/`. Feeding an already-generated URL back in
    /// returns it unchanged.
    pub fn public_url(&self, kind: AssetKind, path: &str) -> String {
        let prefix = format!("{}{}", self.base_url.trim_end_matches('/'), kind.route());
        if path == prefix || path.starts_with(&format!("{prefix}/")) {
            return path.to_string();
        }
        let path = path.trim_start_matches('/');
        if path.is_empty() {
            prefix
        } else {
            format!("{prefix}/{path}")
        }
    }

    /// Whether the stored path names a file that exists in the bucket.
    pub fn contains(&self, kind: AssetKind, path: &str) -> bool {
        self.local_path(kind, path)
            .map(|p| p.is_file())
            .unwrap_or(false)
    }

    /// Read an asset's bytes from the bucket.
    ///
    /// The read runs on tokio's blocking pool, so a slow file system only
    /// holds up its own caller and the future can be abandoned on timeout.
    pub async fn read(&self, kind: AssetKind, path: &str) -> Result<Vec<u8>> {
        let local = self.existing_path(kind, path)?;
        match tokio::fs::read(&local).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(MapStyleError::not_found("asset", local.display().to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn existing_path(&self, kind: AssetKind, path: &str) -> Result<PathBuf> {
        self.local_path(kind, path)
            .ok_or_else(|| MapStyleError::not_found("asset", path))
    }

    fn dir(&self, kind: AssetKind) -> &Path {
        match kind {
            AssetKind::GeoJson => &self.geojson_dir,
            AssetKind::Image => &self.images_dir,
        }
    }

    /// Resolve a stored path inside its bucket directory. Paths that would
    /// escape the bucket resolve to nothing.
    fn local_path(&self, kind: AssetKind, path: &str) -> Option<PathBuf> {
        let relative = Path::new(path.trim_start_matches('/'));
        if relative.as_os_str().is_empty() {
            return None;
        }
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            return None;
        }
        Some(self.dir(kind).join(relative))
    }
}
