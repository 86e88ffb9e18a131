use rust_decimal::Decimal;

use crate::domain::money::{round_internal, saturating_sum, MAX_POOL};
use crate::domain::{Contribution, ResolvedPolicy};
use crate::waterfall::stages::{
    Allocation, AuditIssue, AuditReport, EngineTotals, GateResult, RejectedContribution,
    RemittanceInstruction,
};

/// Everything the audit reconciles.
#[derive(Debug, Clone, Copy)]
pub struct AuditInput<'a> {
    pub contributions: &'a [Contribution],
    /// Inputs refused at ingestion; each one fails the audit
    pub rejected: &'a [RejectedContribution],
    pub allocations: &'a [Allocation],
    pub remittances: &'a [RemittanceInstruction],
    pub unallocated: Decimal,
    pub gate: &'a GateResult,
}

/// Compute run totals from the pipeline stages.
pub fn totals(input: &AuditInput<'_>) -> EngineTotals {
    let total_input = saturating_sum(input.contributions.iter().map(|c| c.amount));
    let allocated = saturating_sum(input.allocations.iter().map(|a| a.amount));
    let remitted = saturating_sum(input.remittances.iter().map(|r| r.amount));
    let rejected = input.gate.rejected_total;

    EngineTotals {
        input: round_internal(total_input),
        allocated: round_internal(allocated),
        remitted: round_internal(remitted),
        unallocated: round_internal(input.unallocated),
        rejected: round_internal(rejected),
        leftover: round_internal(input.unallocated.saturating_add(rejected)),
    }
}

/// Reconcile a run, listing every issue found.
///
/// `lookup` resolves a policy id; remittances naming an unknown policy are
/// reported rather than skipped silently.
pub fn audit<'p>(
    input: &AuditInput<'_>,
    tolerance: Decimal,
    lookup: impl Fn(&str) -> Option<&'p ResolvedPolicy>,
) -> AuditReport {
    let totals = totals(input);
    let mut issues: Vec<AuditIssue> = input
        .rejected
        .iter()
        .map(|r| AuditIssue::ContributionOutOfRange {
            id: r.id.clone(),
            amount: r.amount,
            limit: MAX_POOL,
        })
        .collect();

    // Decimal keeps 28 significant digits, so large pools are compared
    // against a tolerance scaled by the input
    let scale = totals.input.max(Decimal::ONE);
    let scaled_tolerance = tolerance.saturating_mul(scale);

    if totals.allocated.saturating_sub(totals.input) > scaled_tolerance {
        issues.push(AuditIssue::AllocatedExceedsInput {
            allocated: totals.allocated,
            input: totals.input,
        });
    }

    let accounted = totals.remitted.saturating_add(totals.leftover);
    if totals.input.saturating_sub(accounted).abs() > scaled_tolerance {
        issues.push(AuditIssue::Unbalanced {
            input: totals.input,
            remitted: totals.remitted,
            leftover: totals.leftover,
        });
    }

    for remittance in input.remittances {
        let Some(policy) = lookup(&remittance.policy_id) else {
            issues.push(AuditIssue::UnknownPolicy {
                policy_id: remittance.policy_id.clone(),
            });
            continue;
        };

        if remittance.amount < -tolerance {
            issues.push(AuditIssue::NegativeRemittance {
                policy_id: policy.id.clone(),
                amount: remittance.amount,
            });
        }

        if let Some(cap) = policy.cap {
            if remittance.amount.saturating_sub(cap) > tolerance {
                issues.push(AuditIssue::ExceedsCap {
                    policy_id: policy.id.clone(),
                    amount: remittance.amount,
                    cap,
                });
            }
        }

        if policy.floor > tolerance
            && remittance.amount > tolerance
            && policy.floor - remittance.amount > tolerance
        {
            issues.push(AuditIssue::BelowFloor {
                policy_id: policy.id.clone(),
                amount: remittance.amount,
                floor: policy.floor,
            });
        }
    }

    AuditReport {
        ok: issues.is_empty(),
        issues,
        totals,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::money::DEFAULT_TOLERANCE;
    use crate::waterfall::stages::{GateContext, RemittanceStatus};
    use uuid::Uuid;

    fn policy(id: &str, cap: Option<i64>, floor: i64) -> ResolvedPolicy {
        ResolvedPolicy {
            id: id.to_string(),
            weight: Decimal::ONE,
            cap: cap.map(|c| Decimal::new(c, 0)),
            floor: Decimal::new(floor, 0),
            gate: None,
        }
    }

    fn contribution(amount: i64) -> Contribution {
        Contribution {
            id: "c".to_string(),
            amount: Decimal::new(amount, 0),
            risk_score: 0.0,
            metadata: None,
        }
    }

    fn allocation(policy_id: &str, amount: i64) -> Allocation {
        Allocation {
            policy_id: policy_id.to_string(),
            amount: Decimal::new(amount, 0),
            share: Decimal::ZERO,
        }
    }

    fn remittance(policy_id: &str, amount: i64) -> RemittanceInstruction {
        RemittanceInstruction {
            policy_id: policy_id.to_string(),
            request_id: Uuid::new_v4(),
            amount: Decimal::new(amount, 0),
            status: RemittanceStatus::Ready,
        }
    }

    fn empty_gate(rejected_total: i64) -> GateResult {
        GateResult {
            approved: vec![],
            rejected: vec![],
            rejected_total: Decimal::new(rejected_total, 0),
            context: GateContext {
                total_amount: Decimal::ZERO,
                average_risk: 0.0,
                max_risk: 0.0,
                unallocated: Decimal::ZERO,
            },
        }
    }

    #[test]
    fn test_balanced_run_is_ok() {
        let policies = [policy("a", Some(600), 0), policy("b", None, 100)];
        let contributions = [contribution(1000)];
        let allocations = [allocation("a", 600), allocation("b", 400)];
        let remittances = [remittance("a", 600), remittance("b", 400)];
        let gate = empty_gate(0);
        let input = AuditInput {
            contributions: &contributions,
            rejected: &[],
            allocations: &allocations,
            remittances: &remittances,
            unallocated: Decimal::ZERO,
            gate: &gate,
        };

        let report = audit(&input, DEFAULT_TOLERANCE, |id| {
            policies.iter().find(|p| p.id == id)
        });
        assert!(report.ok, "{:?}", report.issues);
        assert_eq!(report.totals.remitted, Decimal::new(1000, 0));
        assert!(report.totals.leftover.is_zero());
    }

    #[test]
    fn test_rejected_amount_counts_as_leftover() {
        let policies = [policy("a", None, 0), policy("b", None, 0)];
        let contributions = [contribution(1000)];
        let allocations = [allocation("a", 500), allocation("b", 500)];
        let remittances = [remittance("a", 500)];
        let gate = empty_gate(500);
        let input = AuditInput {
            contributions: &contributions,
            rejected: &[],
            allocations: &allocations,
            remittances: &remittances,
            unallocated: Decimal::ZERO,
            gate: &gate,
        };

        let report = audit(&input, DEFAULT_TOLERANCE, |id| {
            policies.iter().find(|p| p.id == id)
        });
        assert!(report.ok);
        assert_eq!(report.totals.rejected, Decimal::new(500, 0));
        assert_eq!(report.totals.leftover, Decimal::new(500, 0));
    }

    #[test]
    fn test_every_issue_kind_detected() {
        let policies = [policy("capped", Some(100), 0), policy("floored", None, 300)];
        let contributions = [contribution(100)];
        let allocations = [allocation("capped", 150), allocation("floored", 50)];
        let remittances = [
            remittance("capped", 150),
            remittance("floored", 50),
            remittance("ghost", -5),
        ];
        let gate = empty_gate(0);
        let input = AuditInput {
            contributions: &contributions,
            rejected: &[],
            allocations: &allocations,
            remittances: &remittances,
            unallocated: Decimal::ZERO,
            gate: &gate,
        };

        let report = audit(&input, DEFAULT_TOLERANCE, |id| {
            policies.iter().find(|p| p.id == id)
        });
        assert!(!report.ok);

        let kinds: Vec<&str> = report
            .issues
            .iter()
            .map(|issue| match issue {
                AuditIssue::ContributionOutOfRange { .. } => "contributionOutOfRange",
                AuditIssue::AllocatedExceedsInput { .. } => "allocatedExceedsInput",
                AuditIssue::Unbalanced { .. } => "unbalanced",
                AuditIssue::UnknownPolicy { .. } => "unknownPolicy",
                AuditIssue::NegativeRemittance { .. } => "negativeRemittance",
                AuditIssue::ExceedsCap { .. } => "exceedsCap",
                AuditIssue::BelowFloor { .. } => "belowFloor",
            })
            .collect();
        assert_eq!(
            kinds,
            vec![
                "allocatedExceedsInput",
                "unbalanced",
                "exceedsCap",
                "belowFloor",
                "unknownPolicy"
            ]
        );
    }

    #[test]
    fn test_rejected_contribution_fails_audit() {
        let policies = [policy("a", None, 0)];
        let contributions = [contribution(100)];
        let rejected = [RejectedContribution {
            id: Some("huge".to_string()),
            amount: 1e30,
        }];
        let allocations = [allocation("a", 100)];
        let remittances = [remittance("a", 100)];
        let gate = empty_gate(0);
        let input = AuditInput {
            contributions: &contributions,
            rejected: &rejected,
            allocations: &allocations,
            remittances: &remittances,
            unallocated: Decimal::ZERO,
            gate: &gate,
        };

        let report = audit(&input, DEFAULT_TOLERANCE, |id| {
            policies.iter().find(|p| p.id == id)
        });
        assert!(!report.ok);
        assert_eq!(
            report.issues,
            vec![AuditIssue::ContributionOutOfRange {
                id: Some("huge".to_string()),
                amount: 1e30,
                limit: MAX_POOL,
            }]
        );
        assert_eq!(report.totals.input, Decimal::new(100, 0));
    }

    #[test]
    fn test_negative_remittance() {
        let policies = [policy("a", None, 0)];
        let contributions: [Contribution; 0] = [];
        let remittances = [remittance("a", -1)];
        let gate = empty_gate(0);
        let input = AuditInput {
            contributions: &contributions,
            rejected: &[],
            allocations: &[],
            remittances: &remittances,
            unallocated: Decimal::ONE,
            gate: &gate,
        };

        let report = audit(&input, DEFAULT_TOLERANCE, |id| {
            policies.iter().find(|p| p.id == id)
        });
        assert!(report
            .issues
            .iter()
            .any(|i| matches!(i, AuditIssue::NegativeRemittance { .. })));
    }
}
