//! Validate command implementation.
//!
//! Runs the full rule set against a deployment read from disk. There is no
//! node behind the command: nothing counts as stored or deployed, and no
//! author is rate limited.

use async_trait::async_trait;
use bytes::Bytes;
use catalyst_protocol::{
    hashing, ContentHash, DeploymentFiles, DeploymentWithAuditInfo, Entity, EntityType, Pointer,
};
use catalyst_validation::{
    DeploymentContext, DeploymentToValidate, ExternalCallError, ExternalCalls, ServerEnvironment,
    ValidationOutcome, Validator,
};
use clap::ValueEnum;
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

/// Deployment context selectable from the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Context {
    /// Submitted by a client.
    Local,
    /// Received from a peer.
    Synced,
    /// Received from a peer while bootstrapping.
    Bootstrap,
}

impl From<Context> for DeploymentContext {
    fn from(context: Context) -> Self {
        match context {
            Context::Local => DeploymentContext::Local,
            Context::Synced => DeploymentContext::Synced,
            Context::Bootstrap => DeploymentContext::Bootstrap,
        }
    }
}

/// External calls for a node with empty storage.
#[derive(Debug, Default)]
pub struct OfflineCalls;

#[async_trait]
impl ExternalCalls for OfflineCalls {
    async fn fetch_deployments_by_pointers(
        &self,
        _entity_type: EntityType,
        _pointers: &[Pointer],
    ) -> Result<Vec<DeploymentWithAuditInfo>, ExternalCallError> {
        Ok(Vec::new())
    }

    async fn are_there_newer_entities(&self, _entity: &Entity) -> Result<bool, ExternalCallError> {
        Ok(false)
    }

    async fn is_content_stored_already(
        &self,
        hashes: &[ContentHash],
    ) -> Result<HashMap<ContentHash, bool>, ExternalCallError> {
        Ok(hashes.iter().map(|h| (h.clone(), false)).collect())
    }

    async fn is_entity_rate_limited(&self, _entity: &Entity) -> Result<bool, ExternalCallError> {
        Ok(false)
    }

    async fn fetch_content_file_size(&self, _hash: &str) -> Result<Option<u64>, ExternalCallError> {
        Ok(None)
    }
}

/// Reads every regular file in `dir`, keyed by its content address.
pub fn load_files(dir: &Path) -> std::io::Result<DeploymentFiles> {
    let mut files = DeploymentFiles::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let bytes = std::fs::read(entry.path())?;
        let hash = hashing::ipfs_hash(&bytes);
        debug!(file = %entry.path().display(), %hash, "loaded upload");
        files.insert(hash, Bytes::from(bytes));
    }
    Ok(files)
}

/// Reads the deployment and its uploads and validates them.
pub async fn validate_path(
    deployment: &Path,
    files: Option<&Path>,
    context: Context,
) -> Result<ValidationOutcome, Box<dyn std::error::Error>> {
    let raw = std::fs::read(deployment)
        .map_err(|e| format!("Cannot read {}: {e}", deployment.display()))?;
    let record: DeploymentWithAuditInfo = serde_json::from_slice(&raw)
        .map_err(|e| format!("Invalid deployment file {}: {e}", deployment.display()))?;

    let mut candidate = DeploymentToValidate::new(record.entity, record.audit_info);
    if let Some(dir) = files {
        candidate = candidate.with_files(load_files(dir)?);
    }

    let outcome = Validator::new(ServerEnvironment::new())
        .validate(&candidate, context.into(), &OfflineCalls)
        .await?;
    Ok(outcome)
}

/// Runs the validate command.
pub async fn run(
    deployment: &Path,
    files: Option<&Path>,
    context: Context,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let outcome = validate_path(deployment, files, context).await?;

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else if outcome.is_ok() {
        println!("✓ Deployment is valid");
    } else {
        println!("✗ Deployment rejected");
        for failure in &outcome.failures {
            println!("  [{}] {}", failure.rule, failure.message);
        }
    }

    if outcome.is_ok() {
        Ok(())
    } else {
        Err("Validation failed".into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use catalyst_protocol::{AuditInfo, AuthChain, EntityVersion};

    fn write_deployment(dir: &Path, entity: Entity) -> std::path::PathBuf {
        let record = DeploymentWithAuditInfo::new(entity, AuditInfo::new(EntityVersion::V3, AuthChain::new()));
        let path = dir.join("deployment.json");
        std::fs::write(&path, serde_json::to_vec(&record).unwrap()).unwrap();
        path
    }

    #[test]
    fn uploads_are_keyed_by_hash() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"a").unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();

        let files = load_files(dir.path()).unwrap();
        assert_eq!(files.len(), 1);
        assert!(files.contains_key(&hashing::ipfs_hash(b"a")));
    }

    #[tokio::test]
    async fn unsigned_deployment_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let entity = Entity::new(
            hashing::ipfs_hash(b"entity"),
            EntityType::Scene,
            vec!["0,0".to_string()],
            catalyst_validation::system_now(),
        );
        let path = write_deployment(dir.path(), entity);

        let outcome = validate_path(&path, None, Context::Local).await.unwrap();
        assert_eq!(
            outcome.errors(),
            vec!["The signature is invalid. the authorization chain is empty"]
        );
    }

    #[tokio::test]
    async fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deployment.json");
        std::fs::write(&path, b"{}").unwrap();
        assert!(validate_path(&path, None, Context::Synced).await.is_err());
    }
}
