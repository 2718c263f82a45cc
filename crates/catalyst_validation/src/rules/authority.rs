//! Rules about who deployed the entity.

use super::{DeploymentContext, RuleKind, RuleResult, Validation, ValidationArgs};
use crate::access::AccessRequest;
use async_trait::async_trait;
use tracing::debug;

/// The authorization chain signs the entity id.
#[derive(Debug, Clone, Copy)]
pub struct Signature;

#[async_trait]
impl Validation for Signature {
    fn kind(&self) -> RuleKind {
        RuleKind::Signature
    }

    async fn validate(&self, args: &ValidationArgs<'_>) -> RuleResult {
        let entity = args.entity();
        let chain = &args.deployment.audit_info.auth_chain;
        match args
            .env
            .authenticator
            .validate_signature(&entity.id, chain, entity.timestamp)
        {
            Ok(_) => Ok(Vec::new()),
            Err(reason) => {
                debug!(entity = %entity.id, %reason, "signature rejected");
                Ok(vec![format!("The signature is invalid. {reason}")])
            }
        }
    }
}

/// The signer may deploy to the entity's pointers.
///
/// Deployments whose signature does not verify are left to [`Signature`].
#[derive(Debug, Clone, Copy)]
pub struct Access;

#[async_trait]
impl Validation for Access {
    fn kind(&self) -> RuleKind {
        RuleKind::Access
    }

    async fn validate(&self, args: &ValidationArgs<'_>) -> RuleResult {
        let entity = args.entity();
        let Ok(owner) = args.env.authenticator.validate_signature(
            &entity.id,
            &args.deployment.audit_info.auth_chain,
            entity.timestamp,
        ) else {
            return Ok(Vec::new());
        };

        let request = AccessRequest {
            entity_type: entity.entity_type,
            pointers: &entity.pointers,
            timestamp: entity.timestamp,
            owner_address: &owner,
        };
        args.env.access_checker.has_access(&request).await
    }
}

/// The author has not exceeded the deployment rate.
#[derive(Debug, Clone, Copy)]
pub struct RateLimit;

#[async_trait]
impl Validation for RateLimit {
    fn kind(&self) -> RuleKind {
        RuleKind::RateLimit
    }

    fn applies_to(&self, context: DeploymentContext) -> bool {
        context.is_local()
    }

    async fn validate(&self, args: &ValidationArgs<'_>) -> RuleResult {
        let entity = args.entity();
        if args.external_calls.is_entity_rate_limited(entity).await? {
            return Ok(vec![format!(
                "The entity with id ({}) has been rate limited.",
                entity.id
            )]);
        }
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::super::DeploymentToValidate;
    use super::*;
    use crate::access::AllowAllAccessChecker;
    use crate::auth::ContentAuthenticator;
    use catalyst_protocol::{AuditInfo, AuthLink, EntityType, EntityVersion};
    use chrono::{TimeZone, Utc};
    use ed25519_dalek::SigningKey;
    use rand::rngs::OsRng;
    use std::sync::Arc;

    fn signed(chain: Vec<AuthLink>) -> DeploymentToValidate {
        let mut deployment = deployment(entity());
        deployment.audit_info = AuditInfo::new(EntityVersion::V4, chain);
        deployment
    }

    fn key() -> SigningKey {
        SigningKey::generate(&mut OsRng)
    }

    #[tokio::test]
    async fn single_signer_verifies() {
        let chain = ContentAuthenticator::create_simple_auth_chain(&entity_id(), &key());
        let errors = run(&Signature, &signed(chain), &env(), &StubCalls::default()).await;
        assert!(errors.is_empty());
    }

    #[tokio::test]
    async fn delegated_chain_verifies_until_expiration() {
        let expiration = |millis: u64| Utc.timestamp_millis_opt(millis as i64).unwrap();

        let valid = ContentAuthenticator::create_ephemeral_auth_chain(
            &entity_id(),
            &key(),
            &key(),
            expiration(NOW + 30 * 60_000),
        );
        assert!(run(&Signature, &signed(valid), &env(), &StubCalls::default()).await.is_empty());

        let expired = ContentAuthenticator::create_ephemeral_auth_chain(
            &entity_id(),
            &key(),
            &key(),
            expiration(NOW - 1),
        );
        let errors = run(&Signature, &signed(expired), &env(), &StubCalls::default()).await;
        assert_eq!(errors.len(), 1);
    }

    #[tokio::test]
    async fn invalid_signatures_are_reported_once() {
        let owner = ContentAuthenticator::address_of(&key().verifying_key());
        let forged = vec![
            AuthLink::signer(owner),
            AuthLink::signed_entity(entity_id(), "some-signature"),
        ];
        for chain in [Vec::new(), forged] {
            let errors = run(&Signature, &signed(chain), &env(), &StubCalls::default()).await;
            assert_eq!(errors.len(), 1);
            assert!(errors[0].starts_with("The signature is invalid."));
        }
    }

    #[tokio::test]
    async fn profiles_belong_to_their_signer() {
        let owner = key();
        let address = ContentAuthenticator::address_of(&owner.verifying_key());
        let chain = ContentAuthenticator::create_simple_auth_chain(&entity_id(), &owner);

        let mut deployment = signed(chain);
        deployment.entity.entity_type = EntityType::Profile;
        deployment.entity.pointers = vec![address];
        assert!(run(&Access, &deployment, &env(), &StubCalls::default()).await.is_empty());

        deployment.entity.pointers = vec!["someone-else".into()];
        assert_eq!(run(&Access, &deployment, &env(), &StubCalls::default()).await.len(), 1);

        let open = env().with_access_checker(Arc::new(AllowAllAccessChecker));
        assert!(run(&Access, &deployment, &open, &StubCalls::default()).await.is_empty());
    }

    #[tokio::test]
    async fn rate_limited_entities_are_rejected() {
        let deployment = deployment(entity());
        assert!(run(&RateLimit, &deployment, &env(), &StubCalls::default()).await.is_empty());

        let calls = StubCalls {
            rate_limited: true,
            ..StubCalls::default()
        };
        assert_eq!(
            run(&RateLimit, &deployment, &env(), &calls).await,
            vec![format!("The entity with id ({}) has been rate limited.", entity_id())]
        );
        assert!(!RateLimit.applies_to(DeploymentContext::Synced));
    }
}
