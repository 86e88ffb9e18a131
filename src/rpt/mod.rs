//! Remittance proof tokens: a singly linked, Ed25519-signed hash chain
//! over finalized allocations.

pub mod chain;
pub mod signer;
pub mod token;

pub use chain::{verify_chain, ChainBreak, ChainReport};
pub use signer::{
    normalise_timestamp, verify_token, CreateTokenParams, RptSigner, RptSignerConfig, SignerError,
};
pub use token::{compute_rolling_hash, RptAlgorithm, RptPayload, RptToken};
