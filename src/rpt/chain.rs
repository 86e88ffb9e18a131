use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

use crate::rpt::signer::verify_token;
use crate::rpt::token::RptToken;

/// Why a chain stopped verifying.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ChainBreak {
    /// The first token has a predecessor
    NotGenesis,
    /// `prev_hash` does not match the preceding token's hash
    BrokenLink,
    /// Hash or signature check failed
    InvalidToken,
}

impl fmt::Display for ChainBreak {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChainBreak::NotGenesis => write!(f, "first token is not a genesis token"),
            ChainBreak::BrokenLink => write!(f, "prevHash does not match preceding hash"),
            ChainBreak::InvalidToken => write!(f, "token failed verification"),
        }
    }
}

/// Outcome of walking a chain from genesis.
///
/// Every token from `first_broken` onward is untrusted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainReport {
    pub valid: bool,
    pub length: usize,
    /// Tokens verified before the first failure
    pub verified: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_broken: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<ChainBreak>,
    /// Hash of the last verified token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub head: Option<String>,
}

/// Verify tokens in insertion order.
///
/// An empty chain is valid.
pub fn verify_chain(tokens: &[RptToken]) -> ChainReport {
    let mut previous: Option<&str> = None;

    for (index, token) in tokens.iter().enumerate() {
        let linked = match previous {
            None => token.is_genesis(),
            Some(hash) => token.prev_hash.as_deref() == Some(hash),
        };

        let failure = if !linked {
            Some(if index == 0 {
                ChainBreak::NotGenesis
            } else {
                ChainBreak::BrokenLink
            })
        } else if !verify_token(token) {
            Some(ChainBreak::InvalidToken)
        } else {
            None
        };

        if let Some(reason) = failure {
            warn!(index, hash = %token.hash, %reason, "RPT chain broken");
            return ChainReport {
                valid: false,
                length: tokens.len(),
                verified: index,
                first_broken: Some(index),
                reason: Some(reason),
                head: previous.map(str::to_string),
            };
        }

        previous = Some(&token.hash);
    }

    ChainReport {
        valid: true,
        length: tokens.len(),
        verified: tokens.len(),
        first_broken: None,
        reason: None,
        head: previous.map(str::to_string),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpt::signer::{CreateTokenParams, RptSigner};
    use serde_json::json;

    fn chain(signer: &RptSigner, length: usize) -> Vec<RptToken> {
        let mut tokens: Vec<RptToken> = Vec::with_capacity(length);
        for i in 0..length {
            let token = signer
                .create_token(CreateTokenParams {
                    bank_line_id: format!("BL-{i}"),
                    policy_hash: "policy".to_string(),
                    allocation: json!([{"accountId": "OPS", "amount": i * 10}]),
                    timestamp: None,
                    prev_hash: tokens.last().map(|t| t.hash.clone()),
                })
                .unwrap();
            tokens.push(token);
        }
        tokens
    }

    #[test]
    fn test_valid_chain() {
        let signer = RptSigner::generate().unwrap();
        let tokens = chain(&signer, 4);

        let report = verify_chain(&tokens);
        assert!(report.valid);
        assert_eq!(report.verified, 4);
        assert_eq!(report.head.as_deref(), Some(tokens[3].hash.as_str()));

        assert!(verify_chain(&[]).valid);
    }

    #[test]
    fn test_reordered_chain_breaks() {
        let signer = RptSigner::generate().unwrap();
        let mut tokens = chain(&signer, 4);
        tokens.swap(1, 2);

        let report = verify_chain(&tokens);
        assert!(!report.valid);
        assert_eq!(report.first_broken, Some(1));
        assert_eq!(report.reason, Some(ChainBreak::BrokenLink));
        assert_eq!(report.head.as_deref(), Some(tokens[0].hash.as_str()));
    }

    #[test]
    fn test_tampered_middle_token() {
        let signer = RptSigner::generate().unwrap();
        let mut tokens = chain(&signer, 5);
        tokens[2].payload.allocation = json!([{"accountId": "OPS", "amount": 999}]);

        let report = verify_chain(&tokens);
        assert_eq!(report.first_broken, Some(2));
        assert_eq!(report.reason, Some(ChainBreak::InvalidToken));
        assert_eq!(report.verified, 2);
    }

    #[test]
    fn test_missing_genesis() {
        let signer = RptSigner::generate().unwrap();
        let tokens = chain(&signer, 3);

        let report = verify_chain(&tokens[1..]);
        assert_eq!(report.first_broken, Some(0));
        assert_eq!(report.reason, Some(ChainBreak::NotGenesis));
    }
}
