//! Rules about the entity itself and how it relates to deployed history.

use super::{DeploymentContext, RuleKind, RuleResult, Validation, ValidationArgs};
use crate::env::ServerEnvironment;
use async_trait::async_trait;
use catalyst_protocol::Entity;
use std::collections::HashSet;
use tracing::debug;

/// The entity claims at least one pointer and no pointer twice.
#[derive(Debug, Clone, Copy)]
pub struct EntityStructure;

#[async_trait]
impl Validation for EntityStructure {
    fn kind(&self) -> RuleKind {
        RuleKind::EntityStructure
    }

    async fn validate(&self, args: &ValidationArgs<'_>) -> RuleResult {
        let pointers = &args.entity().pointers;
        if pointers.is_empty() {
            return Ok(vec![
                "The entity needs to be pointed by one or more pointers.".to_string(),
            ]);
        }
        let mut seen = HashSet::new();
        if !pointers.iter().all(|p| seen.insert(p.to_lowercase())) {
            return Ok(vec!["There are repeated pointers in your request.".to_string()]);
        }
        Ok(Vec::new())
    }
}

/// The entity timestamp is close to the node's clock.
///
/// Only local submissions are checked; synced deployments are old by the
/// time they arrive.
#[derive(Debug, Clone, Copy)]
pub struct Recent;

impl Recent {
    pub(crate) fn check(env: &ServerEnvironment, entity: &Entity) -> Vec<String> {
        let now = env.now();
        let backwards = env.request_ttl_backwards.as_millis() as u64;
        let forwards = env.request_ttl_forwards.as_millis() as u64;

        if entity.timestamp.saturating_add(backwards) < now {
            vec!["The request is not recent enough, please submit it again with a new timestamp.".to_string()]
        } else if entity.timestamp > now.saturating_add(forwards) {
            vec!["The request is too far in the future, please submit it again with a new timestamp.".to_string()]
        } else {
            Vec::new()
        }
    }
}

#[async_trait]
impl Validation for Recent {
    fn kind(&self) -> RuleKind {
        RuleKind::Recent
    }

    fn applies_to(&self, context: DeploymentContext) -> bool {
        context.is_local()
    }

    async fn validate(&self, args: &ValidationArgs<'_>) -> RuleResult {
        Ok(Self::check(args.env, args.entity()))
    }
}

/// A migrated entity may not replace an overlapping entity of a higher
/// effective version.
///
/// Overlapping entities with a later timestamp are ignored: the incoming
/// entity will not become current on their pointers anyway.
#[derive(Debug, Clone, Copy)]
pub struct LegacyEntity;

#[async_trait]
impl Validation for LegacyEntity {
    fn kind(&self) -> RuleKind {
        RuleKind::LegacyEntity
    }

    async fn validate(&self, args: &ValidationArgs<'_>) -> RuleResult {
        let audit_info = &args.deployment.audit_info;
        if !audit_info.is_migrated() {
            return Ok(Vec::new());
        }

        let entity = args.entity();
        let incoming = audit_info.effective_version();
        let overlapping = args
            .external_calls
            .fetch_deployments_by_pointers(entity.entity_type, &entity.pointers)
            .await?;

        let blocked = overlapping.iter().any(|existing| {
            existing.entity.timestamp <= entity.timestamp
                && existing.audit_info.effective_version() > incoming
        });
        if blocked {
            debug!(entity = %entity.id, version = %incoming, "overlapping entity has a higher version");
            return Ok(vec![
                "Found an overlapping entity with a higher version already deployed.".to_string(),
            ]);
        }
        Ok(Vec::new())
    }
}

/// No newer entity already owns one of the pointers.
///
/// Skipped during bootstrap, when the node's history may be incomplete.
#[derive(Debug, Clone, Copy)]
pub struct NoNewerEntities;

#[async_trait]
impl Validation for NoNewerEntities {
    fn kind(&self) -> RuleKind {
        RuleKind::NoNewerEntities
    }

    fn applies_to(&self, context: DeploymentContext) -> bool {
        context != DeploymentContext::Bootstrap
    }

    async fn validate(&self, args: &ValidationArgs<'_>) -> RuleResult {
        if args.external_calls.are_there_newer_entities(args.entity()).await? {
            return Ok(vec![
                "There is a newer entity pointed by one or more of the pointers you provided."
                    .to_string(),
            ]);
        }
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::super::DeploymentToValidate;
    use super::*;
    use catalyst_protocol::{AuditInfo, DeploymentWithAuditInfo, EntityVersion, MigrationData};
    use proptest::prelude::*;

    const MINUTE: u64 = 60_000;

    #[tokio::test]
    async fn structure_requires_pointers() {
        let mut entity = entity();
        entity.pointers.clear();
        let errors = run(&EntityStructure, &deployment(entity), &env(), &StubCalls::default()).await;
        assert_eq!(errors, vec!["The entity needs to be pointed by one or more pointers."]);
    }

    #[tokio::test]
    async fn structure_rejects_repeated_pointers() {
        let mut entity = entity();
        entity.pointers = vec!["0,0".into(), "1,1".into(), "0,0".into()];
        let errors = run(&EntityStructure, &deployment(entity), &env(), &StubCalls::default()).await;
        assert_eq!(errors, vec!["There are repeated pointers in your request."]);
    }

    #[test]
    fn recent_rejects_old_and_future_timestamps() {
        let env = env();
        let mut entity = entity();

        entity.timestamp = NOW - 25 * MINUTE;
        assert_eq!(
            Recent::check(&env, &entity),
            vec!["The request is not recent enough, please submit it again with a new timestamp."]
        );

        entity.timestamp = NOW + 20 * MINUTE;
        assert_eq!(
            Recent::check(&env, &entity),
            vec!["The request is too far in the future, please submit it again with a new timestamp."]
        );

        entity.timestamp = NOW;
        assert!(Recent::check(&env, &entity).is_empty());
    }

    #[test]
    fn recent_only_checks_local_submissions() {
        assert!(Recent.applies_to(DeploymentContext::Local));
        assert!(!Recent.applies_to(DeploymentContext::Synced));
        assert!(!NoNewerEntities.applies_to(DeploymentContext::Bootstrap));
        assert!(NoNewerEntities.applies_to(DeploymentContext::Synced));
    }

    proptest! {
        #[test]
        fn recent_window(offset in -(40 * MINUTE as i64)..(40 * MINUTE as i64)) {
            let env = env();
            let mut entity = entity();
            entity.timestamp = (NOW as i64 + offset) as u64;

            let inside = offset >= -(10 * MINUTE as i64) && offset <= 15 * MINUTE as i64;
            let errors = Recent::check(&env, &entity);
            prop_assert_eq!(errors.len(), usize::from(!inside));
        }
    }

    fn legacy_audit_info() -> AuditInfo {
        AuditInfo::new(EntityVersion::V3, Vec::new())
            .with_deployed_timestamp(10)
            .with_migration_data(MigrationData::new(EntityVersion::V2))
    }

    fn existing(timestamp: u64, audit_info: AuditInfo) -> StubCalls {
        let mut entity = entity();
        entity.id = "bafkreiexisting".into();
        entity.timestamp = timestamp;
        StubCalls {
            existing: vec![DeploymentWithAuditInfo::new(entity, audit_info)],
            ..StubCalls::default()
        }
    }

    async fn legacy(calls: StubCalls) -> Vec<String> {
        let mut entity = entity();
        entity.timestamp = 1000;
        let deployment = DeploymentToValidate::new(entity, legacy_audit_info());
        run(&LegacyEntity, &deployment, &env(), &calls).await
    }

    #[tokio::test]
    async fn legacy_without_overlap_passes() {
        assert!(legacy(StubCalls::default()).await.is_empty());
    }

    #[tokio::test]
    async fn legacy_ignores_newer_overlapping_entity() {
        let calls = existing(1001, AuditInfo::new(EntityVersion::V3, Vec::new()));
        assert!(legacy(calls).await.is_empty());
    }

    #[tokio::test]
    async fn legacy_ignores_unmigrated_deployments() {
        let calls = existing(999, AuditInfo::new(EntityVersion::V4, Vec::new()));
        let deployment = deployment(entity());
        assert!(run(&LegacyEntity, &deployment, &env(), &calls).await.is_empty());
    }
}
