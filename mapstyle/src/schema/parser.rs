use crate::error::Result;
use super::types::Snapshot;
use std::path::Path;

/// Parse a snapshot YAML file into a Snapshot
pub fn parse_snapshot(path: &Path) -> Result<Snapshot> {
    let content = std::fs::read_to_string(path)?;
    parse_snapshot_str(&content)
}

/// Parse a snapshot YAML string into a Snapshot
pub fn parse_snapshot_str(content: &str) -> Result<Snapshot> {
    let snapshot: Snapshot = serde_yaml::from_str(content)?;
    Ok(snapshot)
}
