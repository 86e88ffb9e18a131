use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::domain::Contribution;

/// Contribution refused at ingestion because the pool cannot hold it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectedContribution {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub amount: f64,
}

/// Accepted and refused contributions from one ingest call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IngestOutcome {
    pub contributions: Vec<Contribution>,
    pub rejected: Vec<RejectedContribution>,
}

/// Amount assigned to one policy by the round loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Allocation {
    pub policy_id: String,
    pub amount: Decimal,
    /// Fraction of the pooled total (9 dp)
    pub share: Decimal,
}

/// Allocation with a request identifier attached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestToPay {
    #[serde(flatten)]
    pub allocation: Allocation,
    pub request_id: Uuid,
}

impl RequestToPay {
    #[inline]
    pub fn policy_id(&self) -> &str {
        &self.allocation.policy_id
    }

    #[inline]
    pub fn amount(&self) -> Decimal {
        self.allocation.amount
    }
}

/// Outcome of gating a single request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GateDecision {
    #[serde(flatten)]
    pub request: RequestToPay,
    pub approved: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Aggregates the gate rules are evaluated against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GateContext {
    pub total_amount: Decimal,
    pub average_risk: f64,
    pub max_risk: f64,
    pub unallocated: Decimal,
}

/// Requests partitioned by their gate outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GateResult {
    pub approved: Vec<GateDecision>,
    pub rejected: Vec<GateDecision>,
    pub rejected_total: Decimal,
    pub context: GateContext,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RemittanceStatus {
    Ready,
}

/// Instruction to pay an approved request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemittanceInstruction {
    pub policy_id: String,
    pub request_id: Uuid,
    pub amount: Decimal,
    pub status: RemittanceStatus,
}

/// Reconciliation totals for one run.
///
/// `leftover` is everything not remitted: the unallocated pool plus
/// gate-rejected amounts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineTotals {
    pub input: Decimal,
    pub allocated: Decimal,
    pub remitted: Decimal,
    pub unallocated: Decimal,
    pub rejected: Decimal,
    pub leftover: Decimal,
}

/// A reconciliation failure found by the audit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum AuditIssue {
    AllocatedExceedsInput {
        allocated: Decimal,
        input: Decimal,
    },
    Unbalanced {
        input: Decimal,
        remitted: Decimal,
        leftover: Decimal,
    },
    #[serde(rename_all = "camelCase")]
    ContributionOutOfRange {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        amount: f64,
        limit: Decimal,
    },
    #[serde(rename_all = "camelCase")]
    UnknownPolicy { policy_id: String },
    #[serde(rename_all = "camelCase")]
    NegativeRemittance { policy_id: String, amount: Decimal },
    #[serde(rename_all = "camelCase")]
    ExceedsCap {
        policy_id: String,
        amount: Decimal,
        cap: Decimal,
    },
    #[serde(rename_all = "camelCase")]
    BelowFloor {
        policy_id: String,
        amount: Decimal,
        floor: Decimal,
    },
}

impl fmt::Display for AuditIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuditIssue::AllocatedExceedsInput { allocated, input } => {
                write!(f, "allocated amount {allocated} exceeds input {input}")
            }
            AuditIssue::Unbalanced {
                input,
                remitted,
                leftover,
            } => write!(
                f,
                "funds not balanced: input {input}, remitted {remitted}, leftover {leftover}"
            ),
            AuditIssue::ContributionOutOfRange { id, amount, limit } => match id {
                Some(id) => write!(f, "contribution {id} of {amount} exceeds pool limit {limit}"),
                None => write!(f, "contribution of {amount} exceeds pool limit {limit}"),
            },
            AuditIssue::UnknownPolicy { policy_id } => {
                write!(f, "remittance references unknown policy {policy_id}")
            }
            AuditIssue::NegativeRemittance { policy_id, amount } => {
                write!(f, "negative remittance {amount} for {policy_id}")
            }
            AuditIssue::ExceedsCap {
                policy_id,
                amount,
                cap,
            } => write!(f, "remittance {amount} exceeds cap {cap} for {policy_id}"),
            AuditIssue::BelowFloor {
                policy_id,
                amount,
                floor,
            } => write!(f, "remittance {amount} below floor {floor} for {policy_id}"),
        }
    }
}

/// Audit verdict for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditReport {
    pub ok: bool,
    pub issues: Vec<AuditIssue>,
    pub totals: EngineTotals,
}

/// Full trace of a waterfall run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineRunResult {
    pub contributions: Vec<Contribution>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rejected_contributions: Vec<RejectedContribution>,
    pub allocations: Vec<Allocation>,
    pub requests: Vec<RequestToPay>,
    pub gate: GateResult,
    pub remittances: Vec<RemittanceInstruction>,
    pub totals: EngineTotals,
    pub audit: AuditReport,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gate_decision_flattens() {
        let decision = GateDecision {
            request: RequestToPay {
                allocation: Allocation {
                    policy_id: "tax".to_string(),
                    amount: Decimal::new(500, 0),
                    share: Decimal::new(5, 1),
                },
                request_id: Uuid::nil(),
            },
            approved: false,
            reason: Some("average risk 0.900 exceeds 0.500".to_string()),
        };

        let value = serde_json::to_value(&decision).unwrap();
        assert_eq!(value["policyId"], "tax");
        assert_eq!(value["requestId"], Uuid::nil().to_string());
        assert_eq!(value["approved"], false);

        let back: GateDecision = serde_json::from_value(value).unwrap();
        assert_eq!(back, decision);
    }

    #[test]
    fn test_audit_issue_tagging() {
        let issue = AuditIssue::ExceedsCap {
            policy_id: "ops".to_string(),
            amount: Decimal::new(101, 0),
            cap: Decimal::new(100, 0),
        };
        let value = serde_json::to_value(&issue).unwrap();
        assert_eq!(value["kind"], "exceedsCap");
        assert_eq!(value["policyId"], "ops");
        assert_eq!(issue.to_string(), "remittance 101 exceeds cap 100 for ops");
    }

    #[test]
    fn test_out_of_range_issue_wire_form() {
        let issue = AuditIssue::ContributionOutOfRange {
            id: Some("big".to_string()),
            amount: 5e28,
            limit: Decimal::new(1, 0),
        };
        let value = serde_json::to_value(&issue).unwrap();
        assert_eq!(value["kind"], "contributionOutOfRange");
        assert_eq!(value["id"], "big");
        assert!(issue.to_string().starts_with("contribution big of "));
    }

    #[test]
    fn test_remittance_status_wire_name() {
        assert_eq!(
            serde_json::to_value(RemittanceStatus::Ready).unwrap(),
            serde_json::json!("ready")
        );
    }
}
