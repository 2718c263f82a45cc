//! Rules about the files an entity references and uploads.

use super::{RuleKind, RuleResult, Validation, ValidationArgs};
use crate::error::ExternalCallError;
use async_trait::async_trait;
use catalyst_protocol::{hashing, ContentHash, EntityType};
use serde_json::Value;

/// Referenced hashes that were neither uploaded nor stored before.
async fn missing_content(args: &ValidationArgs<'_>) -> RuleResult {
    let deployment = args.deployment;
    let not_uploaded: Vec<ContentHash> = deployment
        .entity
        .referenced_hashes()
        .into_iter()
        .filter(|hash| !deployment.files.contains_key(*hash))
        .map(str::to_string)
        .collect();
    if not_uploaded.is_empty() {
        return Ok(Vec::new());
    }

    let stored = args
        .external_calls
        .is_content_stored_already(&not_uploaded)
        .await?;
    Ok(not_uploaded
        .into_iter()
        .filter(|hash| !stored.get(hash).copied().unwrap_or(false))
        .map(|hash| {
            format!("This hash is referenced in the entity but was not uploaded or previously available: {hash}")
        })
        .collect())
}

/// Every referenced hash is available.
#[derive(Debug, Clone, Copy)]
pub struct ContentV3;

#[async_trait]
impl Validation for ContentV3 {
    fn kind(&self) -> RuleKind {
        RuleKind::ContentV3
    }

    async fn validate(&self, args: &ValidationArgs<'_>) -> RuleResult {
        missing_content(args).await
    }
}

/// Every referenced hash is available, every upload is referenced, and
/// profile files are the avatar snapshots the metadata declares.
#[derive(Debug, Clone, Copy)]
pub struct ContentV4;

impl ContentV4 {
    fn unreferenced_uploads(args: &ValidationArgs<'_>) -> Vec<String> {
        let entity = args.entity();
        args.deployment
            .files
            .keys()
            .filter(|hash| **hash != entity.id && !entity.references(hash))
            .map(|hash| format!("This hash was uploaded but is not referenced in the entity: {hash}"))
            .collect()
    }

    fn unexpected_profile_files(args: &ValidationArgs<'_>) -> Vec<String> {
        let entity = args.entity();
        if entity.entity_type != EntityType::Profile {
            return Vec::new();
        }
        let snapshots = declared_snapshots(entity.metadata.as_ref());
        entity
            .content
            .iter()
            .filter(|(name, hash)| {
                !snapshots
                    .iter()
                    .any(|(key, expected)| format!("{key}.png") == **name && expected == hash)
            })
            .map(|(name, hash)| {
                format!(
                    "This file is not expected: '{name}' or its hash is invalid: '{hash}'. Please, include only valid snapshot files."
                )
            })
            .collect()
    }
}

/// `(snapshot name, hash)` pairs declared by every avatar of a profile.
fn declared_snapshots(metadata: Option<&Value>) -> Vec<(&str, &str)> {
    metadata
        .and_then(|m| m.get("avatars"))
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|avatar| avatar.pointer("/avatar/snapshots")?.as_object())
        .flat_map(|snapshots| {
            snapshots
                .iter()
                .filter_map(|(key, hash)| Some((key.as_str(), hash.as_str()?)))
        })
        .collect()
}

#[async_trait]
impl Validation for ContentV4 {
    fn kind(&self) -> RuleKind {
        RuleKind::ContentV4
    }

    async fn validate(&self, args: &ValidationArgs<'_>) -> RuleResult {
        let mut errors = missing_content(args).await?;
        errors.extend(Self::unreferenced_uploads(args));
        errors.extend(Self::unexpected_profile_files(args));
        Ok(errors)
    }
}

/// Size check shared by both request size rules.
fn size_errors(args: &ValidationArgs<'_>, total: u64) -> Vec<String> {
    let entity = args.entity();
    let Some(per_pointer) = args.env.max_upload_size_bytes(entity.entity_type) else {
        return vec![format!(
            "There is no upload size limit configured for entity type ({}).",
            entity.entity_type
        )];
    };
    let pointers = entity.pointers.len().max(1) as u64;
    let allowed = per_pointer.saturating_mul(pointers);
    if total > allowed {
        let max_mb = args
            .env
            .max_upload_size_per_type_mb
            .get(&entity.entity_type)
            .copied()
            .unwrap_or_default();
        return vec![format!(
            "The deployment is too big. The maximum allowed size per pointer is {max_mb} MB for {}. You can upload up to {allowed} bytes but you tried to upload {total}.",
            entity.entity_type
        )];
    }
    Vec::new()
}

fn uploaded_size(args: &ValidationArgs<'_>) -> u64 {
    args.deployment
        .files
        .values()
        .map(|bytes| bytes.len() as u64)
        .sum()
}

/// Uploaded files fit the per-pointer limit.
#[derive(Debug, Clone, Copy)]
pub struct RequestSizeV3;

#[async_trait]
impl Validation for RequestSizeV3 {
    fn kind(&self) -> RuleKind {
        RuleKind::RequestSizeV3
    }

    async fn validate(&self, args: &ValidationArgs<'_>) -> RuleResult {
        Ok(size_errors(args, uploaded_size(args)))
    }
}

/// Uploaded files plus previously stored referenced files fit the
/// per-pointer limit.
#[derive(Debug, Clone, Copy)]
pub struct RequestSizeV4;

impl RequestSizeV4 {
    async fn stored_size(args: &ValidationArgs<'_>) -> Result<Result<u64, Vec<String>>, ExternalCallError> {
        let deployment = args.deployment;
        let mut total = 0u64;
        let mut unavailable = Vec::new();
        for hash in deployment.entity.referenced_hashes() {
            if deployment.files.contains_key(hash) {
                continue;
            }
            match args.external_calls.fetch_content_file_size(hash).await? {
                Some(size) => total = total.saturating_add(size),
                None => unavailable.push(format!("Couldn't fetch content file with hash: {hash}")),
            }
        }
        Ok(if unavailable.is_empty() {
            Ok(total)
        } else {
            Err(unavailable)
        })
    }
}

#[async_trait]
impl Validation for RequestSizeV4 {
    fn kind(&self) -> RuleKind {
        RuleKind::RequestSizeV4
    }

    async fn validate(&self, args: &ValidationArgs<'_>) -> RuleResult {
        match Self::stored_size(args).await? {
            Ok(stored) => Ok(size_errors(args, uploaded_size(args).saturating_add(stored))),
            Err(unavailable) => Ok(unavailable),
        }
    }
}

/// Entity id and content hashes are CIDv1 and uploaded files match them.
#[derive(Debug, Clone, Copy)]
pub struct IpfsHashing;

#[async_trait]
impl Validation for IpfsHashing {
    fn kind(&self) -> RuleKind {
        RuleKind::IpfsHashing
    }

    async fn validate(&self, args: &ValidationArgs<'_>) -> RuleResult {
        let entity = args.entity();
        let mut errors: Vec<String> = std::iter::once(entity.id.as_str())
            .chain(entity.referenced_hashes())
            .filter(|hash| !hashing::is_valid_ipfs_hash(hash))
            .map(|hash| format!("This hash '{hash}' is not valid. It should be IPFS v2 format."))
            .collect();

        errors.extend(
            args.deployment
                .files
                .iter()
                .filter(|(hash, _)| **hash == entity.id || entity.references(hash))
                .filter(|(hash, _)| hashing::is_valid_ipfs_hash(hash))
                .filter(|(hash, bytes)| !hashing::verify_ipfs_hash(hash, bytes))
                .map(|(hash, _)| format!("The hash of the uploaded file doesn't match: {hash}")),
        );
        Ok(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use bytes::Bytes;
    use proptest::prelude::*;

    const MB: usize = 1024 * 1024;

    fn file_of(size_mb: usize) -> Bytes {
        Bytes::from(vec![0u8; size_mb * MB])
    }

    #[tokio::test]
    async fn missing_reference_is_reported() {
        let deployment = deployment(entity().with_content("name", "hash"));
        let errors = run(&ContentV4, &deployment, &env(), &StubCalls::default()).await;
        assert_eq!(
            errors,
            vec!["This hash is referenced in the entity but was not uploaded or previously available: hash"]
        );
    }

    #[tokio::test]
    async fn stored_reference_passes() {
        let deployment = deployment(entity().with_content("name", "hash"));
        let calls = StubCalls {
            stored: ["hash".to_string()].into(),
            ..StubCalls::default()
        };
        assert!(run(&ContentV4, &deployment, &env(), &calls).await.is_empty());
    }

    #[tokio::test]
    async fn uploaded_reference_passes() {
        let deployment = deployment(entity().with_content("name", "hash")).with_file("hash", Bytes::new());
        assert!(run(&ContentV4, &deployment, &env(), &StubCalls::default()).await.is_empty());
    }

    #[tokio::test]
    async fn unreferenced_upload_is_reported_by_v4_only() {
        let deployment = deployment(entity().with_content("name-1", "hash-1"))
            .with_file("hash-1", Bytes::new())
            .with_file("hash-2", Bytes::new())
            .with_file(entity_id(), Bytes::new());

        let v4 = run(&ContentV4, &deployment, &env(), &StubCalls::default()).await;
        assert_eq!(v4, vec!["This hash was uploaded but is not referenced in the entity: hash-2"]);

        let v3 = run(&ContentV3, &deployment, &env(), &StubCalls::default()).await;
        assert!(v3.is_empty());
    }

    #[tokio::test]
    async fn both_content_mismatches_are_reported_together() {
        let deployment = deployment(entity().with_content("name", "missing")).with_file("extra", Bytes::new());
        let errors = run(&ContentV4, &deployment, &env(), &StubCalls::default()).await;
        assert_eq!(errors.len(), 2);
    }

    #[tokio::test]
    async fn content_check_propagates_external_failures() {
        let deployment = deployment(entity().with_content("name", "hash"));
        let calls = StubCalls {
            failing: true,
            ..StubCalls::default()
        };
        let env = env();
        let args = ValidationArgs::new(&deployment, &env, &calls);
        assert!(ContentV4.validate(&args).await.is_err());
    }

    #[tokio::test]
    async fn v3_size_counts_uploads() {
        let env = env().with_max_upload_size(EntityType::Scene, 2);
        let too_big = deployment(entity()).with_file("someHash", file_of(3));
        let errors = run(&RequestSizeV3, &too_big, &env, &StubCalls::default()).await;
        assert_eq!(errors.len(), 1);
        assert!(errors[0].starts_with("The deployment is too big. The maximum allowed size per pointer is 2 MB"));

        let mut spread = entity();
        spread.pointers = vec!["P1".into(), "P2".into()];
        let spread = deployment(spread).with_file("someHash", file_of(3));
        assert!(run(&RequestSizeV3, &spread, &env, &StubCalls::default()).await.is_empty());
    }

    #[tokio::test]
    async fn v4_size_counts_stored_content() {
        let env = env().with_max_upload_size(EntityType::Scene, 10);
        let entity = entity()
            .with_content("A", "A")
            .with_content("B", "B")
            .with_content("C", "C");
        let deployment = deployment(entity).with_file("C", file_of(3));
        let calls = StubCalls {
            sizes: [("A".to_string(), 5 * MB as u64), ("B".to_string(), 5 * MB as u64)].into(),
            ..StubCalls::default()
        };

        let errors = run(&RequestSizeV4, &deployment, &env, &calls).await;
        assert_eq!(errors.len(), 1);
        assert!(errors[0].starts_with("The deployment is too big."));
    }

    #[tokio::test]
    async fn v4_size_reports_unknown_content() {
        let env = env().with_max_upload_size(EntityType::Scene, 10);
        let entity = entity().with_content("A", "A").with_content("C", "C");
        let deployment = deployment(entity).with_file("C", file_of(3));

        let errors = run(&RequestSizeV4, &deployment, &env, &StubCalls::default()).await;
        assert_eq!(errors, vec!["Couldn't fetch content file with hash: A"]);
    }

    #[tokio::test]
    async fn size_requires_a_configured_limit() {
        let env = env().without_upload_sizes();
        let errors = run(&RequestSizeV3, &deployment(entity()), &env, &StubCalls::default()).await;
        assert_eq!(
            errors,
            vec!["There is no upload size limit configured for entity type (scene)."]
        );
    }

    #[tokio::test]
    async fn cid_v0_hashes_are_rejected() {
        let v0 = "QmTBPcZLFQf1rZpZg2T8nMDwWRoqeftRdvkaexgAECaqHp";
        let mut entity = entity().with_content("key", "QmaG2d2bsb4fW8En9ZUVVhjvAghSpPbfD1XSeoHrYPpn3P");
        entity.id = v0.to_string();

        let errors = run(&IpfsHashing, &deployment(entity), &env(), &StubCalls::default()).await;
        assert_eq!(
            errors,
            vec![
                format!("This hash '{v0}' is not valid. It should be IPFS v2 format."),
                "This hash 'QmaG2d2bsb4fW8En9ZUVVhjvAghSpPbfD1XSeoHrYPpn3P' is not valid. It should be IPFS v2 format.".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn well_formed_hashes_pass() {
        let hash = hashing::ipfs_hash(b"some file");
        let deployment = deployment(entity().with_content("key", hash.clone()))
            .with_file(hash, Bytes::from_static(b"some file"));
        assert!(run(&IpfsHashing, &deployment, &env(), &StubCalls::default()).await.is_empty());
    }

    #[tokio::test]
    async fn tampered_upload_is_rejected() {
        let hash = hashing::ipfs_hash(b"some file");
        let deployment = deployment(entity().with_content("key", hash.clone()))
            .with_file(hash.clone(), Bytes::from_static(b"other file"));
        let errors = run(&IpfsHashing, &deployment, &env(), &StubCalls::default()).await;
        assert_eq!(errors, vec![format!("The hash of the uploaded file doesn't match: {hash}")]);
    }

    proptest! {
        #[test]
        fn size_limit_scales_with_pointers(
            size_kb in 1u64..8192,
            pointers in 1usize..6,
            limit_mb in 1u64..4,
        ) {
            let env = env().with_max_upload_size(EntityType::Scene, limit_mb);
            let mut entity = entity();
            entity.pointers = (0..pointers).map(|i| format!("{i},0")).collect();
            let deployment = deployment(entity);
            let calls = StubCalls::default();
            let args = ValidationArgs::new(&deployment, &env, &calls);

            let total = size_kb * 1024;
            let errors = size_errors(&args, total);
            let fits = total <= limit_mb * MB as u64 * pointers as u64;
            prop_assert_eq!(errors.is_empty(), fits);
        }
    }
}
