//! Watermarks command implementation.

use catalyst_protocol::Timestamp;
use catalyst_sync_engine::{JsonFilePropertiesStore, SystemPropertiesManager, Watermarks};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Parses a `<peer>=<timestamp>` override.
pub fn parse_override(raw: &str) -> Result<(String, Timestamp), String> {
    let (peer, timestamp) = raw
        .rsplit_once('=')
        .ok_or_else(|| format!("Expected <peer>=<timestamp>, got '{raw}'"))?;
    if peer.is_empty() {
        return Err(format!("Missing peer address in '{raw}'"));
    }
    let timestamp = timestamp
        .parse()
        .map_err(|e| format!("Invalid timestamp in '{raw}': {e}"))?;
    Ok((peer.to_string(), timestamp))
}

/// Applies `overrides` to the stored watermarks and returns the result.
pub async fn apply(
    properties: &Path,
    overrides: &[String],
) -> Result<Watermarks, Box<dyn std::error::Error>> {
    let manager = SystemPropertiesManager::new(Arc::new(JsonFilePropertiesStore::new(properties)));
    let mut watermarks = manager.get_last_known_local_deployments().await?;

    if !overrides.is_empty() {
        for raw in overrides {
            let (peer, timestamp) = parse_override(raw)?;
            watermarks.insert(peer, timestamp);
        }
        manager.set_last_known_local_deployments(&watermarks).await?;
        info!(path = %properties.display(), count = overrides.len(), "watermarks updated");
    }
    Ok(watermarks)
}

/// Runs the watermarks command.
pub async fn run(
    properties: &Path,
    overrides: &[String],
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let watermarks = apply(properties, overrides).await?;

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&watermarks)?);
        return Ok(());
    }

    println!("Watermarks in {}", properties.display());
    if watermarks.is_empty() {
        println!("  (none)");
    }
    for (peer, timestamp) in &watermarks {
        println!("  {peer}: {timestamp}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_split_on_the_last_equals_sign() {
        assert_eq!(
            parse_override("https://peer?x=1=42").unwrap(),
            ("https://peer?x=1".to_string(), 42)
        );
        assert!(parse_override("https://peer").is_err());
        assert!(parse_override("=5").is_err());
        assert!(parse_override("https://peer=soon").is_err());
    }

    #[tokio::test]
    async fn overrides_are_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("system_properties.json");

        assert!(apply(&path, &[]).await.unwrap().is_empty());
        apply(&path, &["https://a.example=100".to_string()]).await.unwrap();
        apply(&path, &["https://b.example=7".to_string()]).await.unwrap();

        let watermarks = apply(&path, &[]).await.unwrap();
        assert_eq!(watermarks.get("https://a.example"), Some(&100));
        assert_eq!(watermarks.get("https://b.example"), Some(&7));
    }
}
