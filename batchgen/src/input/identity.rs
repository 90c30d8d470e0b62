//! Worker identity discovery.

use std::path::Path;
use tracing::{info, warn};

use crate::Result;
use crate::driver::Identity;

/// Load every `*.json` file in `dir` as an identity, sorted by name.
///
/// The file stem is the identity name and the file itself is the session
/// seed. Files that are not valid JSON are skipped.
pub async fn load_identities(dir: &Path) -> Result<Vec<Identity>> {
    if !tokio::fs::try_exists(dir).await? {
        warn!(dir = %dir.display(), "Profiles directory not found");
        return Ok(Vec::new());
    }

    let mut identities = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };

        let raw = tokio::fs::read_to_string(&path).await?;
        if let Err(e) = serde_json::from_str::<serde_json::Value>(&raw) {
            warn!(profile = %name, error = %e, "Skipping profile with invalid JSON");
            continue;
        }
        identities.push(Identity::new(name, path.clone()));
    }

    identities.sort_by(|a, b| a.name.cmp(&b.name));
    info!(count = identities.len(), "Loaded identities");
    Ok(identities)
}
