//! Content-address hashing.
//!
//! Entity ids and content hashes are CIDv1 strings (base32, `baf...`).
//! Files hashed by this node use the raw codec with a SHA2-256 multihash.
//! CIDv0 (`Qm...`) hashes are rejected by the validation pipeline.

use crate::entity::ContentHash;
use cid::{Cid, Version};
use multihash_codetable::{Code, MultihashDigest};

/// Multicodec for raw binary content.
pub const RAW_CODEC: u64 = 0x55;

/// Computes the CIDv1 of the given bytes.
pub fn ipfs_hash(bytes: &[u8]) -> ContentHash {
    Cid::new_v1(RAW_CODEC, Code::Sha2_256.digest(bytes)).to_string()
}

/// Returns true if `hash` parses as a CIDv1.
pub fn is_valid_ipfs_hash(hash: &str) -> bool {
    matches!(Cid::try_from(hash), Ok(cid) if cid.version() == Version::V1)
}

/// Returns true if `hash` is a CIDv1 whose multihash matches `bytes`.
///
/// Hashes using an algorithm this node does not implement never verify.
pub fn verify_ipfs_hash(hash: &str, bytes: &[u8]) -> bool {
    let Ok(cid) = Cid::try_from(hash) else {
        return false;
    };
    if cid.version() != Version::V1 {
        return false;
    }
    match Code::try_from(cid.hash().code()) {
        Ok(code) => code.digest(bytes) == *cid.hash(),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn computed_hash_is_cid_v1() {
        let hash = ipfs_hash(b"some file");
        assert!(hash.starts_with("bafkrei"));
        assert!(is_valid_ipfs_hash(&hash));
    }

    #[test]
    fn cid_v0_is_rejected() {
        assert!(!is_valid_ipfs_hash("QmTBPcZLFQf1rZpZg2T8nMDwWRoqeftRdvkaexgAECaqHp"));
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(!is_valid_ipfs_hash("hash"));
        assert!(!is_valid_ipfs_hash(""));
        assert!(!is_valid_ipfs_hash("someInvalidHash"));
    }

    #[test]
    fn verify_detects_tampering() {
        let hash = ipfs_hash(b"original");
        assert!(verify_ipfs_hash(&hash, b"original"));
        assert!(!verify_ipfs_hash(&hash, b"tampered"));
        assert!(!verify_ipfs_hash("hash", b"original"));
    }

    proptest! {
        #[test]
        fn every_hash_verifies_its_input(data in proptest::collection::vec(any::<u8>(), 0..256)) {
            let hash = ipfs_hash(&data);
            prop_assert!(is_valid_ipfs_hash(&hash));
            prop_assert!(verify_ipfs_hash(&hash, &data));
        }
    }
}
