use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::canonical::{sha256_hex, to_canonical_string};

/// Signature algorithms an RPT may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RptAlgorithm {
    #[default]
    Ed25519,
}

impl RptAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            RptAlgorithm::Ed25519 => "ed25519",
        }
    }

    /// Parse a configured algorithm name.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "ed25519" => Some(RptAlgorithm::Ed25519),
            _ => None,
        }
    }
}

impl fmt::Display for RptAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The signed content of an RPT.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RptPayload {
    pub bank_line_id: String,
    pub policy_hash: String,
    /// Finalized allocation, any JSON shape
    pub allocation: serde_json::Value,
    /// ISO-8601 UTC with millisecond precision
    pub timestamp: String,
}

impl RptPayload {
    /// Hex SHA-256 of the canonical payload string.
    pub fn digest(&self) -> String {
        // A payload made of strings and a JSON value always serializes.
        let canonical = to_canonical_string(self).unwrap_or_default();
        sha256_hex(canonical)
    }
}

/// Remittance proof token: one node of a signed hash chain.
///
/// Tokens are append-only and never mutated after minting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RptToken {
    pub payload: RptPayload,
    pub payload_hash: String,
    /// Rolling hash linking this token to its predecessor
    pub hash: String,
    pub prev_hash: Option<String>,
    /// Hex-encoded signature over the bytes of `hash`
    pub signature: String,
    pub algorithm: RptAlgorithm,
    /// Signer's SPKI public key, PEM encoded
    pub public_key: String,
}

impl RptToken {
    #[inline]
    pub fn is_genesis(&self) -> bool {
        self.prev_hash.as_deref().map_or(true, str::is_empty)
    }
}

/// `SHA-256(prev_hash || payload_hash)` over the hex strings.
///
/// A missing or empty `prev_hash` hashes `payload_hash` alone.
pub fn compute_rolling_hash(prev_hash: Option<&str>, payload_hash: &str) -> String {
    let mut hasher = Sha256::new();
    if let Some(prev) = prev_hash.filter(|p| !p.is_empty()) {
        hasher.update(prev.as_bytes());
    }
    hasher.update(payload_hash.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload() -> RptPayload {
        RptPayload {
            bank_line_id: "BL-1".to_string(),
            policy_hash: "abc".to_string(),
            allocation: json!([{"accountId": "TAX_PAYABLE", "amount": 1250.5}]),
            timestamp: "2024-07-01T00:00:00.000Z".to_string(),
        }
    }

    #[test]
    fn test_genesis_hash_is_hash_of_payload_hash() {
        let payload_hash = payload().digest();
        assert_eq!(
            compute_rolling_hash(None, &payload_hash),
            sha256_hex(&payload_hash)
        );
        assert_eq!(
            compute_rolling_hash(Some(""), &payload_hash),
            sha256_hex(&payload_hash)
        );
    }

    #[test]
    fn test_rolling_hash_concatenates_hex() {
        let prev = "ff".repeat(32);
        let payload_hash = payload().digest();
        assert_eq!(
            compute_rolling_hash(Some(&prev), &payload_hash),
            sha256_hex(format!("{prev}{payload_hash}"))
        );
    }

    #[test]
    fn test_digest_ignores_allocation_key_order() {
        let mut reordered = payload();
        reordered.allocation = json!([{"amount": 1250.5, "accountId": "TAX_PAYABLE"}]);
        assert_eq!(payload().digest(), reordered.digest());
    }

    #[test]
    fn test_token_wire_format() {
        let value = serde_json::to_value(RptAlgorithm::Ed25519).unwrap();
        assert_eq!(value, json!("ed25519"));
        assert_eq!(RptAlgorithm::parse("rsa"), None);

        let payload = serde_json::to_value(payload()).unwrap();
        assert!(payload.get("bankLineId").is_some());
        assert!(payload.get("policyHash").is_some());
    }
}
