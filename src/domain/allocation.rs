use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::rule::AllocationCondition;

/// One line of a computed allocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllocationBreakdown {
    pub account_id: String,

    /// Amount in cents precision
    pub amount: Decimal,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ratio: Option<Decimal>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memo: Option<String>,
}

impl AllocationBreakdown {
    pub fn new(account_id: impl Into<String>, amount: Decimal) -> Self {
        AllocationBreakdown {
            account_id: account_id.into(),
            amount,
            ratio: None,
            memo: None,
        }
    }

    pub fn with_memo(mut self, memo: impl Into<String>) -> Self {
        self.memo = Some(memo.into());
        self
    }
}

/// Candidate allocation produced by a matching rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllocationProposal {
    pub rule_id: String,
    pub rule_name: String,

    /// Deterministic identity of (rule set, rule, breakdown)
    pub policy_hash: String,

    pub allocation: Vec<AllocationBreakdown>,

    pub total_amount: Decimal,

    /// Fraction of conditions that matched (0..=1)
    pub confidence: f64,

    pub matched_conditions: Vec<AllocationCondition>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Map<String, serde_json::Value>>,
}

/// Identity of the rule set used for an evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleSetRef {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// Result of evaluating a rule set against a bank line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyEvaluation {
    pub bank_line_id: String,
    pub rule_set: RuleSetRef,
    pub proposals: Vec<AllocationProposal>,
    pub evaluated_at: DateTime<Utc>,
}

impl PolicyEvaluation {
    /// Highest ranked proposal, if any matched.
    pub fn best(&self) -> Option<&AllocationProposal> {
        self.proposals.first()
    }

    /// Find the proposal carrying a given policy hash.
    pub fn find_by_hash(&self, policy_hash: &str) -> Option<&AllocationProposal> {
        self.proposals.iter().find(|p| p.policy_hash == policy_hash)
    }
}
