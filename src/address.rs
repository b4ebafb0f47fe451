//! Bech32 addresses and code hashes.
//!
//! The canonical form of an address is its bech32 data part as 5-bit words,
//! one word per byte. Humanizing re-encodes those words under the configured
//! prefix, so the two conversions are exact inverses.

use bech32::{u5, ToBase32, Variant};
use sha2::{Digest, Sha256};

use crate::error::MocknetError;
use crate::runtime::CodeId;

pub fn canonicalize(prefix: &str, human: &str) -> Result<Vec<u8>, MocknetError> {
    let invalid = |reason: String| MocknetError::Address {
        address: human.to_string(),
        reason,
    };

    let (hrp, words, _variant) = bech32::decode(human).map_err(|e| invalid(e.to_string()))?;
    if hrp != prefix {
        return Err(invalid(format!("expected prefix `{prefix}`, found `{hrp}`")));
    }
    Ok(words.iter().map(|word| word.to_u8()).collect())
}

pub fn humanize(prefix: &str, canonical: &[u8]) -> Result<String, MocknetError> {
    let invalid = |reason: String| MocknetError::Address {
        address: hex::encode(canonical),
        reason,
    };

    let words = canonical
        .iter()
        .map(|byte| u5::try_from_u8(*byte))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| invalid(e.to_string()))?;
    bech32::encode(prefix, words, Variant::Bech32).map_err(|e| invalid(e.to_string()))
}

/// Address of the `sequence`-th contract instantiated on a mocknet.
///
/// The address depends only on the code id and the sequence number, so the
/// same sequence of calls yields the same addresses on every run.
pub fn derive_address(prefix: &str, code_id: CodeId, sequence: u64) -> Result<String, MocknetError> {
    let digest = Sha256::digest(format!("{code_id}:{sequence}").as_bytes());
    bech32::encode(prefix, (&digest[..20]).to_base32(), Variant::Bech32).map_err(|e| {
        MocknetError::Address {
            address: format!("{prefix}:{code_id}:{sequence}"),
            reason: e.to_string(),
        }
    })
}

/// Lowercase hex SHA-256 of a code blob.
pub fn code_hash(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_round_trip() {
        let human = derive_address("secret", 1, 1).unwrap();
        let canonical = canonicalize("secret", &human).unwrap();
        assert_eq!(humanize("secret", &canonical).unwrap(), human);
    }

    #[test]
    fn derived_addresses_are_stable_and_distinct() {
        let first = derive_address("secret", 1, 1).unwrap();
        assert_eq!(first, derive_address("secret", 1, 1).unwrap());
        assert_ne!(first, derive_address("secret", 1, 2).unwrap());
        assert!(first.starts_with("secret1"));
    }

    #[test]
    fn wrong_prefix_is_rejected() {
        let human = derive_address("cosmos", 1, 1).unwrap();
        let err = canonicalize("secret", &human).unwrap_err();
        assert!(err.to_string().contains("expected prefix `secret`"));
    }

    #[test]
    fn malformed_addresses_are_rejected() {
        assert!(canonicalize("secret", "not-an-address").is_err());
        assert!(humanize("secret", &[0xff]).is_err());
    }

    #[test]
    fn code_hash_is_hex_sha256() {
        assert_eq!(
            code_hash(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
