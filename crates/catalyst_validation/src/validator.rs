//! Runs the rule set for a deployment.

use crate::env::ServerEnvironment;
use crate::error::{ValidationError, ValidationResult};
use crate::external::ExternalCalls;
use crate::rules::{rules_for, DeploymentContext, DeploymentToValidate, RuleKind, ValidationArgs};
use serde::Serialize;
use tracing::{debug, warn};

/// One error reported by one rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuleFailure {
    /// Rule that reported the error.
    pub rule: RuleKind,
    /// Human-readable message.
    pub message: String,
}

/// Verdict for one deployment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationOutcome {
    /// Errors in rule order; empty when the deployment is admitted.
    pub failures: Vec<RuleFailure>,
}

impl ValidationOutcome {
    /// Returns true if every rule passed.
    pub fn is_ok(&self) -> bool {
        self.failures.is_empty()
    }

    /// Error messages in rule order.
    pub fn errors(&self) -> Vec<&str> {
        self.failures.iter().map(|f| f.message.as_str()).collect()
    }

    /// Consumes the outcome, returning the messages.
    pub fn into_errors(self) -> Vec<String> {
        self.failures.into_iter().map(|f| f.message).collect()
    }

    /// Returns true if `rule` reported at least one error.
    pub fn failed(&self, rule: RuleKind) -> bool {
        self.failures.iter().any(|f| f.rule == rule)
    }
}

/// Evaluates deployments against the rules of their protocol version.
///
/// Every applicable rule runs; errors are collected rather than stopping at
/// the first failing rule.
#[derive(Debug, Clone, Default)]
pub struct Validator {
    env: ServerEnvironment,
}

impl Validator {
    /// Creates a validator.
    pub fn new(env: ServerEnvironment) -> Self {
        Self { env }
    }

    /// The environment rules run against.
    pub fn env(&self) -> &ServerEnvironment {
        &self.env
    }

    /// Validates a deployment.
    ///
    /// Returns `Err` if an external call failed; the deployment must then be
    /// treated as not admitted.
    pub async fn validate(
        &self,
        deployment: &DeploymentToValidate,
        context: DeploymentContext,
        external_calls: &dyn ExternalCalls,
    ) -> ValidationResult<ValidationOutcome> {
        let args = ValidationArgs::new(deployment, &self.env, external_calls);
        let mut outcome = ValidationOutcome::default();

        for rule in rules_for(deployment.audit_info.version) {
            if !rule.applies_to(context) {
                continue;
            }
            let kind = rule.kind();
            let errors = rule.validate(&args).await.map_err(|source| {
                warn!(rule = %kind, entity = %deployment.entity.id, error = %source, "rule could not complete");
                ValidationError::ExternalCall {
                    rule: kind.name(),
                    source,
                }
            })?;
            outcome
                .failures
                .extend(errors.into_iter().map(|message| RuleFailure { rule: kind, message }));
        }

        debug!(
            entity = %deployment.entity.id,
            ?context,
            errors = outcome.failures.len(),
            "deployment validated"
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::test_support::*;
    use crate::ContentAuthenticator;
    use catalyst_protocol::{AuditInfo, EntityVersion};
    use ed25519_dalek::SigningKey;
    use rand::rngs::OsRng;
    use serde_json::json;

    fn signed_scene() -> DeploymentToValidate {
        let entity = entity().with_metadata(json!({
            "main": "bin/main.js",
            "scene": { "base": "0,0", "parcels": ["0,0"] }
        }));
        let chain =
            ContentAuthenticator::create_simple_auth_chain(&entity.id, &SigningKey::generate(&mut OsRng));
        DeploymentToValidate::new(entity, AuditInfo::new(EntityVersion::V4, chain))
    }

    #[tokio::test]
    async fn valid_deployment_passes() {
        let outcome = Validator::new(env())
            .validate(&signed_scene(), DeploymentContext::Local, &StubCalls::default())
            .await
            .unwrap();
        assert!(outcome.is_ok(), "{:?}", outcome.errors());
    }

    #[tokio::test]
    async fn errors_from_every_rule_are_collected_in_order() {
        let mut deployment = signed_scene();
        deployment.entity.timestamp = NOW - 60 * 60_000;
        deployment.entity.metadata = None;
        let calls = StubCalls {
            rate_limited: true,
            ..StubCalls::default()
        };

        let outcome = Validator::new(env())
            .validate(&deployment, DeploymentContext::Local, &calls)
            .await
            .unwrap();
        let rules: Vec<_> = outcome.failures.iter().map(|f| f.rule).collect();
        assert_eq!(
            rules,
            vec![
                RuleKind::Recent,
                RuleKind::MetadataSchema,
                RuleKind::RateLimit
            ]
        );
    }

    #[tokio::test]
    async fn synced_deployments_skip_local_only_rules() {
        let mut deployment = signed_scene();
        deployment.entity.timestamp = NOW - 60 * 60_000;
        let calls = StubCalls {
            rate_limited: true,
            newer: true,
            ..StubCalls::default()
        };
        let validator = Validator::new(env());

        let synced = validator
            .validate(&deployment, DeploymentContext::Synced, &calls)
            .await
            .unwrap();
        assert!(!synced.failed(RuleKind::Recent));
        assert!(!synced.failed(RuleKind::RateLimit));
        assert!(synced.failed(RuleKind::NoNewerEntities));

        let bootstrap = validator
            .validate(&deployment, DeploymentContext::Bootstrap, &calls)
            .await
            .unwrap();
        assert!(bootstrap.is_ok());
    }

    #[tokio::test]
    async fn external_failures_stop_the_pipeline() {
        let calls = StubCalls {
            failing: true,
            ..StubCalls::default()
        };
        let result = Validator::new(env())
            .validate(&signed_scene(), DeploymentContext::Local, &calls)
            .await;
        assert!(matches!(result, Err(ValidationError::ExternalCall { .. })));
    }
}
