//! Metadata schema rule.

use super::{RuleKind, RuleResult, Validation, ValidationArgs};
use async_trait::async_trait;
use serde_json::Value;

/// Entity metadata conforms to the schema registered for its type.
#[derive(Debug, Clone, Copy)]
pub struct MetadataSchema;

#[async_trait]
impl Validation for MetadataSchema {
    fn kind(&self) -> RuleKind {
        RuleKind::MetadataSchema
    }

    async fn validate(&self, args: &ValidationArgs<'_>) -> RuleResult {
        let entity = args.entity();
        let metadata = entity.metadata.as_ref().unwrap_or(&Value::Null);
        if args.env.schemas.validate(entity.entity_type, metadata) {
            Ok(Vec::new())
        } else {
            Ok(vec![format!(
                "The metadata for this entity type ({}) is not valid.",
                entity.entity_type
            )])
        }
    }
}
