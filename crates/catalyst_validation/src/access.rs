//! Pointer access control.

use crate::error::ExternalCallError;
use async_trait::async_trait;
use catalyst_protocol::{EntityType, Pointer, Timestamp};

/// What the ACCESS rule asks an [`AccessChecker`].
#[derive(Debug, Clone, Copy)]
pub struct AccessRequest<'a> {
    /// Type of the entity being deployed.
    pub entity_type: EntityType,
    /// Pointers the entity claims.
    pub pointers: &'a [Pointer],
    /// Entity timestamp.
    pub timestamp: Timestamp,
    /// Address that signed the entity.
    pub owner_address: &'a str,
}

/// Decides whether an address may deploy to a set of pointers.
#[async_trait]
pub trait AccessChecker: Send + Sync {
    /// Returns one message per denied pointer; empty when access is granted.
    async fn has_access(&self, request: &AccessRequest<'_>) -> Result<Vec<String>, ExternalCallError>;
}

/// Grants every request.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAllAccessChecker;

#[async_trait]
impl AccessChecker for AllowAllAccessChecker {
    async fn has_access(&self, _request: &AccessRequest<'_>) -> Result<Vec<String>, ExternalCallError> {
        Ok(Vec::new())
    }
}

/// Profiles may only be deployed to the signer's own address.
///
/// Other entity types are granted; parcel and collection ownership live
/// outside this node.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProfileOwnershipChecker;

#[async_trait]
impl AccessChecker for ProfileOwnershipChecker {
    async fn has_access(&self, request: &AccessRequest<'_>) -> Result<Vec<String>, ExternalCallError> {
        if request.entity_type != EntityType::Profile {
            return Ok(Vec::new());
        }
        Ok(request
            .pointers
            .iter()
            .filter(|pointer| !pointer.eq_ignore_ascii_case(request.owner_address))
            .map(|pointer| {
                format!(
                    "You can only alter your own profile. The pointer address and the signer address are different (pointer: {pointer} signer: {}).",
                    request.owner_address
                )
            })
            .collect())
    }
}
