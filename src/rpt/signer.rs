use chrono::{DateTime, SecondsFormat, Utc};
use ed25519_dalek::pkcs8::spki::der::pem::LineEnding;
use ed25519_dalek::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey};
use ed25519_dalek::{Signature, Signer as _, SigningKey, Verifier as _, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::error::ValidationError;
use crate::rpt::token::{compute_rolling_hash, RptAlgorithm, RptPayload, RptToken};

/// Signer construction failures. Fatal at startup.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignerError {
    #[error("unsupported RPT algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("invalid private key: {0}")]
    InvalidPrivateKey(String),

    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("public key does not belong to the private key")]
    KeyMismatch,
}

/// Key material and algorithm for an [`RptSigner`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RptSignerConfig {
    /// PKCS#8 PEM private key
    pub private_key: String,

    /// SPKI PEM public key; derived from the private key when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,

    /// Defaults to `ed25519`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub algorithm: Option<String>,
}

/// Inputs for minting one token.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateTokenParams {
    pub bank_line_id: String,
    pub policy_hash: String,
    pub allocation: serde_json::Value,
    /// Defaults to now
    pub timestamp: Option<String>,
    pub prev_hash: Option<String>,
}

/// Mints and verifies RPT tokens.
///
/// Constructed once and shared by `Arc`; holds no mutable state.
pub struct RptSigner {
    algorithm: RptAlgorithm,
    signing_key: SigningKey,
    public_key_pem: String,
}

impl std::fmt::Debug for RptSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RptSigner")
            .field("algorithm", &self.algorithm)
            .field("public_key_pem", &self.public_key_pem)
            .finish_non_exhaustive()
    }
}

impl RptSigner {
    /// Build a signer from PEM key material.
    pub fn new(config: &RptSignerConfig) -> Result<Self, SignerError> {
        let algorithm = resolve_algorithm(config.algorithm.as_deref())?;

        let signing_key = SigningKey::from_pkcs8_pem(&config.private_key)
            .map_err(|e| SignerError::InvalidPrivateKey(e.to_string()))?;

        if let Some(pem) = &config.public_key {
            let verifying_key = VerifyingKey::from_public_key_pem(pem)
                .map_err(|e| SignerError::InvalidPublicKey(e.to_string()))?;
            if verifying_key != signing_key.verifying_key() {
                return Err(SignerError::KeyMismatch);
            }
        }

        Self::from_signing_key(algorithm, signing_key)
    }

    /// Build a signer from a hex-encoded 32 byte seed.
    pub fn from_hex_seed(seed_hex: &str) -> Result<Self, SignerError> {
        let bytes = hex::decode(seed_hex.trim())
            .map_err(|e| SignerError::InvalidPrivateKey(format!("invalid seed hex: {e}")))?;
        let seed: [u8; 32] = bytes
            .try_into()
            .map_err(|_| SignerError::InvalidPrivateKey("seed must be 32 bytes".to_string()))?;

        Self::from_signing_key(RptAlgorithm::Ed25519, SigningKey::from_bytes(&seed))
    }

    /// Build a signer around a freshly generated key pair.
    pub fn generate() -> Result<Self, SignerError> {
        let signing_key = SigningKey::generate(&mut OsRng);
        info!("Generated ephemeral RPT signing key");
        Self::from_signing_key(RptAlgorithm::Ed25519, signing_key)
    }

    fn from_signing_key(
        algorithm: RptAlgorithm,
        signing_key: SigningKey,
    ) -> Result<Self, SignerError> {
        let public_key_pem = signing_key
            .verifying_key()
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| SignerError::InvalidPublicKey(e.to_string()))?;

        Ok(RptSigner {
            algorithm,
            signing_key,
            public_key_pem,
        })
    }

    pub fn algorithm(&self) -> RptAlgorithm {
        self.algorithm
    }

    /// SPKI PEM of the verifying key.
    pub fn public_key_pem(&self) -> &str {
        &self.public_key_pem
    }

    /// PKCS#8 PEM of the private key, for persisting a generated key.
    pub fn private_key_pem(&self) -> Result<String, SignerError> {
        self.signing_key
            .to_pkcs8_pem(LineEnding::LF)
            .map(|pem| pem.as_str().to_owned())
            .map_err(|e| SignerError::InvalidPrivateKey(e.to_string()))
    }

    /// Mint a token linked to `params.prev_hash`.
    pub fn create_token(&self, params: CreateTokenParams) -> Result<RptToken, ValidationError> {
        let timestamp = normalise_timestamp(params.timestamp.as_deref())?;
        let payload = RptPayload {
            bank_line_id: params.bank_line_id,
            policy_hash: params.policy_hash,
            allocation: params.allocation,
            timestamp,
        };

        let payload_hash = payload.digest();
        let prev_hash = params.prev_hash.filter(|p| !p.is_empty());
        let hash = compute_rolling_hash(prev_hash.as_deref(), &payload_hash);

        // `hash` is hex we just produced; decoding cannot fail.
        let message = hex::decode(&hash).unwrap_or_default();
        let signature = hex::encode(self.signing_key.sign(&message).to_bytes());

        debug!(
            bank_line_id = %payload.bank_line_id,
            hash = %hash,
            genesis = prev_hash.is_none(),
            "Minted RPT"
        );

        Ok(RptToken {
            payload,
            payload_hash,
            hash,
            prev_hash,
            signature,
            algorithm: self.algorithm,
            public_key: self.public_key_pem.clone(),
        })
    }

    /// Check a token's hashes and signature against its embedded key.
    ///
    /// Never fails: any malformed field yields `false`.
    pub fn verify_token(&self, token: &RptToken) -> bool {
        verify_token(token)
    }
}

/// Verify a single token without a signer instance.
pub fn verify_token(token: &RptToken) -> bool {
    if token.algorithm != RptAlgorithm::Ed25519 {
        return false;
    }

    if token.payload.digest() != token.payload_hash {
        return false;
    }

    if compute_rolling_hash(token.prev_hash.as_deref(), &token.payload_hash) != token.hash {
        return false;
    }

    let Ok(verifying_key) = VerifyingKey::from_public_key_pem(&token.public_key) else {
        return false;
    };
    let Ok(message) = hex::decode(&token.hash) else {
        return false;
    };
    let Ok(signature_bytes) = hex::decode(&token.signature) else {
        return false;
    };
    let Ok(signature) = Signature::from_slice(&signature_bytes) else {
        return false;
    };

    verifying_key.verify(&message, &signature).is_ok()
}

/// Normalise a timestamp to ISO-8601 UTC with milliseconds; `None` is now.
pub fn normalise_timestamp(timestamp: Option<&str>) -> Result<String, ValidationError> {
    let instant = match timestamp {
        None => Utc::now(),
        Some(raw) => DateTime::parse_from_rfc3339(raw.trim())
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|_| ValidationError::InvalidTimestamp(raw.to_string()))?,
    };
    Ok(instant.to_rfc3339_opts(SecondsFormat::Millis, true))
}

fn resolve_algorithm(name: Option<&str>) -> Result<RptAlgorithm, SignerError> {
    match name {
        None => Ok(RptAlgorithm::Ed25519),
        Some(name) => RptAlgorithm::parse(name)
            .ok_or_else(|| SignerError::UnsupportedAlgorithm(name.to_string())),
    }
}
