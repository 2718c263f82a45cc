//! Authorization chain verification.
//!
//! A chain starts with a `Signer` link naming the owner's public key (hex),
//! optionally delegates to ephemeral keys, and ends with a `SignedEntity`
//! link whose payload is the entity id. Every link after the first is
//! signed (Ed25519, hex) by the key the previous link introduced.
//!
//! ## Delegation payload
//!
//! ```text
//! Catalyst Login
//! Ephemeral address: <hex public key>
//! Expiration: <RFC 3339 timestamp>
//! ```

use catalyst_protocol::{AuthChain, AuthLink, AuthLinkType, Timestamp};
use chrono::{DateTime, SecondsFormat, Utc};
use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use thiserror::Error;

/// First line of every delegation payload.
pub const DELEGATION_HEADER: &str = "Catalyst Login";

const ADDRESS_PREFIX: &str = "Ephemeral address: ";
const EXPIRATION_PREFIX: &str = "Expiration: ";

/// Reasons an authorization chain is rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// The chain has no links.
    #[error("the authorization chain is empty")]
    EmptyChain,

    /// The first link does not declare a signer.
    #[error("the first link must be a signer")]
    MissingSigner,

    /// An address is not a valid public key.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// A link's signature does not verify against the previous key.
    #[error("invalid signature at link {index}")]
    InvalidSignature {
        /// Position of the link in the chain.
        index: usize,
    },

    /// A delegation payload could not be parsed.
    #[error("malformed delegation: {0}")]
    MalformedDelegation(String),

    /// A delegation expired before the time being validated.
    #[error("delegation expired at {expiration}")]
    DelegationExpired {
        /// Expiration declared by the delegation.
        expiration: String,
    },

    /// A link appears where the chain does not allow it.
    #[error("unexpected {link_type:?} link at {index}")]
    UnexpectedLink {
        /// Position of the link in the chain.
        index: usize,
        /// Kind of the offending link.
        link_type: AuthLinkType,
    },

    /// The final link signs a different entity.
    #[error("the chain signs a different entity")]
    EntityMismatch,

    /// The chain never signs the entity.
    #[error("the chain does not sign the entity")]
    Incomplete,
}

/// Verifies and builds authorization chains.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContentAuthenticator;

impl ContentAuthenticator {
    /// Creates an authenticator.
    pub fn new() -> Self {
        Self
    }

    /// Address of a public key: its lowercase hex encoding.
    pub fn address_of(key: &VerifyingKey) -> String {
        hex::encode(key.as_bytes())
    }

    /// Signs a payload, returning the hex signature.
    pub fn sign(key: &SigningKey, payload: &str) -> String {
        hex::encode(key.sign(payload.as_bytes()).to_bytes())
    }

    /// Builds a chain where the owner signs the entity directly.
    pub fn create_simple_auth_chain(entity_id: &str, owner: &SigningKey) -> AuthChain {
        vec![
            AuthLink::signer(Self::address_of(&owner.verifying_key())),
            AuthLink::signed_entity(entity_id, Self::sign(owner, entity_id)),
        ]
    }

    /// Builds a chain where the owner delegates to an ephemeral key until
    /// `expiration` and the ephemeral key signs the entity.
    pub fn create_ephemeral_auth_chain(
        entity_id: &str,
        owner: &SigningKey,
        ephemeral: &SigningKey,
        expiration: DateTime<Utc>,
    ) -> AuthChain {
        let payload = Self::delegation_payload(&ephemeral.verifying_key(), expiration);
        let delegation_signature = Self::sign(owner, &payload);
        vec![
            AuthLink::signer(Self::address_of(&owner.verifying_key())),
            AuthLink::ephemeral_delegation(payload, delegation_signature),
            AuthLink::signed_entity(entity_id, Self::sign(ephemeral, entity_id)),
        ]
    }

    /// Renders the delegation statement signed by the delegating key.
    pub fn delegation_payload(ephemeral: &VerifyingKey, expiration: DateTime<Utc>) -> String {
        format!(
            "{DELEGATION_HEADER}\n{ADDRESS_PREFIX}{}\n{EXPIRATION_PREFIX}{}",
            Self::address_of(ephemeral),
            expiration.to_rfc3339_opts(SecondsFormat::Millis, true)
        )
    }

    /// Validates `chain` as an authorization of `entity_id` at time `at`.
    ///
    /// Returns the owner address on success.
    pub fn validate_signature(
        &self,
        entity_id: &str,
        chain: &AuthChain,
        at: Timestamp,
    ) -> Result<String, AuthError> {
        let mut links = chain.iter().enumerate();
        let (_, first) = links.next().ok_or(AuthError::EmptyChain)?;
        if first.link_type != AuthLinkType::Signer {
            return Err(AuthError::MissingSigner);
        }

        let owner = first.payload.to_ascii_lowercase();
        let mut current_key = parse_address(&owner)?;
        let mut entity_signed = false;

        for (index, link) in links {
            let unexpected = AuthError::UnexpectedLink {
                index,
                link_type: link.link_type,
            };
            if entity_signed {
                return Err(unexpected);
            }

            match link.link_type {
                AuthLinkType::Signer => return Err(unexpected),
                _ if !verifies(&current_key, &link.payload, &link.signature) => {
                    return Err(AuthError::InvalidSignature { index });
                }
                AuthLinkType::EphemeralDelegation => {
                    let (address, expiration) = parse_delegation(&link.payload)?;
                    if expiration.timestamp_millis() < at as i64 {
                        return Err(AuthError::DelegationExpired {
                            expiration: expiration.to_rfc3339(),
                        });
                    }
                    current_key = parse_address(&address)?;
                }
                AuthLinkType::SignedEntity => {
                    if link.payload != entity_id {
                        return Err(AuthError::EntityMismatch);
                    }
                    entity_signed = true;
                }
            }
        }

        if entity_signed {
            Ok(owner)
        } else {
            Err(AuthError::Incomplete)
        }
    }
}

fn parse_address(address: &str) -> Result<VerifyingKey, AuthError> {
    let bytes: [u8; 32] = hex::decode(address)
        .ok()
        .and_then(|b| b.try_into().ok())
        .ok_or_else(|| AuthError::InvalidAddress(address.to_string()))?;
    VerifyingKey::from_bytes(&bytes).map_err(|_| AuthError::InvalidAddress(address.to_string()))
}

fn verifies(key: &VerifyingKey, payload: &str, signature: &str) -> bool {
    hex::decode(signature)
        .ok()
        .and_then(|bytes| Signature::from_slice(&bytes).ok())
        .is_some_and(|signature| key.verify_strict(payload.as_bytes(), &signature).is_ok())
}

fn parse_delegation(payload: &str) -> Result<(String, DateTime<Utc>), AuthError> {
    let malformed = || AuthError::MalformedDelegation(payload.to_string());
    let mut lines = payload.lines();

    if lines.next() != Some(DELEGATION_HEADER) {
        return Err(malformed());
    }
    let address = lines
        .next()
        .and_then(|l| l.strip_prefix(ADDRESS_PREFIX))
        .ok_or_else(malformed)?
        .to_ascii_lowercase();
    let expiration = lines
        .next()
        .and_then(|l| l.strip_prefix(EXPIRATION_PREFIX))
        .and_then(|l| DateTime::parse_from_rfc3339(l).ok())
        .ok_or_else(malformed)?
        .with_timezone(&Utc);

    Ok((address, expiration))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rand::rngs::OsRng;

    const ENTITY_ID: &str = "bafkreientity";

    fn key() -> SigningKey {
        SigningKey::generate(&mut OsRng)
    }

    fn now() -> Timestamp {
        Utc::now().timestamp_millis() as Timestamp
    }

    #[test]
    fn simple_chain_verifies() {
        let owner = key();
        let chain = ContentAuthenticator::create_simple_auth_chain(ENTITY_ID, &owner);

        let address = ContentAuthenticator
            .validate_signature(ENTITY_ID, &chain, now())
            .unwrap();
        assert_eq!(address, ContentAuthenticator::address_of(&owner.verifying_key()));
    }

    #[test]
    fn ephemeral_chain_verifies() {
        let chain = ContentAuthenticator::create_ephemeral_auth_chain(
            ENTITY_ID,
            &key(),
            &key(),
            Utc::now() + Duration::minutes(30),
        );
        assert!(ContentAuthenticator
            .validate_signature(ENTITY_ID, &chain, now())
            .is_ok());
    }

    #[test]
    fn expired_delegation_is_rejected() {
        let chain = ContentAuthenticator::create_ephemeral_auth_chain(
            ENTITY_ID,
            &key(),
            &key(),
            Utc::now() - Duration::minutes(1),
        );
        let result = ContentAuthenticator.validate_signature(ENTITY_ID, &chain, now());
        assert!(matches!(result, Err(AuthError::DelegationExpired { .. })));
    }

    #[test]
    fn empty_chain_is_rejected() {
        let result = ContentAuthenticator.validate_signature(ENTITY_ID, &vec![], now());
        assert_eq!(result, Err(AuthError::EmptyChain));
    }

    #[test]
    fn forged_signature_is_rejected() {
        let owner = key();
        let forger = key();
        let chain = vec![
            AuthLink::signer(ContentAuthenticator::address_of(&owner.verifying_key())),
            AuthLink::signed_entity(ENTITY_ID, ContentAuthenticator::sign(&forger, ENTITY_ID)),
        ];
        let result = ContentAuthenticator.validate_signature(ENTITY_ID, &chain, now());
        assert_eq!(result, Err(AuthError::InvalidSignature { index: 1 }));
    }

    #[test]
    fn garbage_signature_is_rejected() {
        let owner = key();
        let chain = vec![
            AuthLink::signer(ContentAuthenticator::address_of(&owner.verifying_key())),
            AuthLink::signed_entity(ENTITY_ID, "some-signature"),
        ];
        assert!(ContentAuthenticator
            .validate_signature(ENTITY_ID, &chain, now())
            .is_err());
    }

    #[test]
    fn chain_for_other_entity_is_rejected() {
        let chain = ContentAuthenticator::create_simple_auth_chain("bafkreiother", &key());
        let result = ContentAuthenticator.validate_signature(ENTITY_ID, &chain, now());
        assert_eq!(result, Err(AuthError::EntityMismatch));
    }

    #[test]
    fn signer_only_chain_is_incomplete() {
        let owner = key();
        let chain = vec![AuthLink::signer(ContentAuthenticator::address_of(
            &owner.verifying_key(),
        ))];
        let result = ContentAuthenticator.validate_signature(ENTITY_ID, &chain, now());
        assert_eq!(result, Err(AuthError::Incomplete));
    }

    #[test]
    fn delegation_payload_round_trip() {
        let ephemeral = key();
        let expiration = Utc::now();
        let payload =
            ContentAuthenticator::delegation_payload(&ephemeral.verifying_key(), expiration);

        let (address, parsed) = parse_delegation(&payload).unwrap();
        assert_eq!(address, ContentAuthenticator::address_of(&ephemeral.verifying_key()));
        assert_eq!(parsed.timestamp_millis(), expiration.timestamp_millis());
    }
}
