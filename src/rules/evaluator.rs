use chrono::Utc;
use rust_decimal::Decimal;
use tracing::debug;

use crate::domain::money::round_cents;
use crate::domain::{
    AllocationBreakdown, AllocationCondition, AllocationProposal, AllocationRule,
    AllocationRuleSet, AllocationTarget, PolicyEvaluation, RuleSetRef, TransactionRecord,
};
use crate::rules::hash::compute_policy_hash;
use crate::rules::matcher::ConditionMatcher;

/// Options controlling which proposals survive evaluation.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EvaluateOptions {
    /// Proposals below this confidence are dropped (default 0).
    pub minimum_confidence: f64,
}

impl EvaluateOptions {
    pub fn with_minimum_confidence(minimum_confidence: f64) -> Self {
        EvaluateOptions { minimum_confidence }
    }
}

/// Evaluate a rule set against a transaction.
///
/// Rules run in descending priority; rules sharing a priority keep their
/// declared order. Each viable rule yields one proposal.
pub fn evaluate(
    tx: &TransactionRecord,
    rule_set: &AllocationRuleSet,
    options: EvaluateOptions,
) -> Vec<AllocationProposal> {
    let mut ordered: Vec<&AllocationRule> = rule_set.rules.iter().collect();
    // sort_by is stable
    ordered.sort_by(|a, b| b.priority.cmp(&a.priority));

    let proposals: Vec<AllocationProposal> = ordered
        .into_iter()
        .filter_map(|rule| evaluate_rule(tx, rule_set, rule))
        .filter(|proposal| proposal.confidence >= options.minimum_confidence)
        .collect();

    debug!(
        bank_line_id = %tx.id,
        rule_set_id = %rule_set.id,
        proposals = proposals.len(),
        "Evaluated rule set"
    );

    proposals
}

/// Evaluate and wrap the proposals with the rule set identity.
pub fn evaluate_rule_set(
    tx: &TransactionRecord,
    rule_set: &AllocationRuleSet,
    options: EvaluateOptions,
) -> PolicyEvaluation {
    PolicyEvaluation {
        bank_line_id: tx.id.clone(),
        rule_set: RuleSetRef {
            id: rule_set.id.clone(),
            version: rule_set.version.clone(),
        },
        proposals: evaluate(tx, rule_set, options),
        evaluated_at: Utc::now(),
    }
}

/// Amount a single target receives out of `amount`.
///
/// An explicit amount wins over the ratio; a target with neither gets zero.
/// The result is rounded to cents, half away from zero.
pub fn derive_allocation(amount: Decimal, target: &AllocationTarget) -> AllocationBreakdown {
    let raw = match (target.amount, target.ratio) {
        (Some(fixed), _) => fixed,
        (None, Some(ratio)) => amount * ratio,
        (None, None) => Decimal::ZERO,
    };

    AllocationBreakdown {
        account_id: target.account_id.clone(),
        amount: round_cents(raw),
        ratio: target.ratio,
        memo: target.memo.clone(),
    }
}

fn evaluate_rule(
    tx: &TransactionRecord,
    rule_set: &AllocationRuleSet,
    rule: &AllocationRule,
) -> Option<AllocationProposal> {
    if rule.conditions.is_empty() {
        return Some(build_proposal(tx, rule_set, rule, 1.0, Vec::new()));
    }

    let matched: Vec<_> = rule
        .conditions
        .iter()
        .filter(|condition| condition.matches(tx))
        .cloned()
        .collect();

    if matched.len() < rule.required_matches() {
        return None;
    }

    let confidence = matched.len() as f64 / rule.conditions.len() as f64;
    Some(build_proposal(tx, rule_set, rule, confidence, matched))
}

fn build_proposal(
    tx: &TransactionRecord,
    rule_set: &AllocationRuleSet,
    rule: &AllocationRule,
    confidence: f64,
    matched_conditions: Vec<AllocationCondition>,
) -> AllocationProposal {
    let allocation: Vec<AllocationBreakdown> = rule
        .allocation
        .iter()
        .map(|target| derive_allocation(tx.amount, target))
        .collect();
    let total_amount = allocation.iter().map(|line| line.amount).sum();
    let policy_hash = compute_policy_hash(rule_set, rule, &allocation);

    AllocationProposal {
        rule_id: rule.id.clone(),
        rule_name: rule.name.clone(),
        policy_hash,
        allocation,
        total_amount,
        confidence,
        matched_conditions,
        metadata: rule.metadata.clone(),
    }
}
