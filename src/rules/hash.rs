use rust_decimal::Decimal;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::canonical::canonical_string;
use crate::domain::money::{round_cents, round_ratio};
use crate::domain::{AllocationBreakdown, AllocationCondition, AllocationRule, AllocationRuleSet};

/// Largest amount difference (exclusive) at which two breakdown lines still
/// count as equal.
pub const AMOUNT_MATCH_TOLERANCE: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

/// Canonical form of a breakdown line used for hashing and comparison.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalBreakdown {
    pub account_id: String,
    pub amount: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ratio: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memo: Option<String>,
}

/// Sort by account id, round amounts to cents and ratios to 6 dp.
///
/// Trailing zeros are stripped so `500` and `500.00` hash identically.
pub fn canonicalize_allocation(allocation: &[AllocationBreakdown]) -> Vec<CanonicalBreakdown> {
    let mut entries: Vec<CanonicalBreakdown> = allocation
        .iter()
        .map(|entry| CanonicalBreakdown {
            account_id: entry.account_id.clone(),
            amount: round_cents(entry.amount).normalize(),
            ratio: entry.ratio.map(|r| round_ratio(r).normalize()),
            memo: entry.memo.clone(),
        })
        .collect();
    entries.sort_by(|a, b| a.account_id.cmp(&b.account_id));
    entries
}

/// Compare a submitted allocation against a recomputed one.
///
/// Both sides are canonicalized identically. Amounts must agree to within
/// one cent (exclusive) and memos must match, an absent memo being null.
pub fn allocations_equal(a: &[AllocationBreakdown], b: &[AllocationBreakdown]) -> bool {
    let left = canonicalize_allocation(a);
    let right = canonicalize_allocation(b);

    if left.len() != right.len() {
        return false;
    }

    left.iter().zip(right.iter()).all(|(x, y)| {
        x.account_id == y.account_id
            && (x.amount - y.amount).abs() < AMOUNT_MATCH_TOLERANCE
            && x.memo == y.memo
    })
}

/// Deterministic digest of a (rule set, rule, breakdown) triple.
pub fn compute_policy_hash(
    rule_set: &AllocationRuleSet,
    rule: &AllocationRule,
    allocation: &[AllocationBreakdown],
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(rule_set.id.as_bytes());
    if let Some(version) = &rule_set.version {
        hasher.update(version.as_bytes());
    }
    hasher.update(rule.id.as_bytes());
    hasher.update(canonical_conditions(&rule.conditions).as_bytes());
    hasher.update(canonical_json(&canonicalize_allocation(allocation)).as_bytes());
    hex::encode(hasher.finalize())
}

/// Conditions in canonical form; text values are case-folded unless the
/// condition is case sensitive, and amount values lose trailing zeros.
fn canonical_conditions(conditions: &[AllocationCondition]) -> String {
    let normalized: Vec<AllocationCondition> = conditions
        .iter()
        .map(|condition| match condition {
            AllocationCondition::Text(text) if !text.is_case_sensitive() => {
                let mut text = text.clone();
                text.value = text.value.to_lowercase();
                AllocationCondition::Text(text)
            }
            AllocationCondition::Amount(amount) => {
                let mut amount = amount.clone();
                amount.value = amount.value.normalize();
                AllocationCondition::Amount(amount)
            }
            other => other.clone(),
        })
        .collect();
    canonical_json(&normalized)
}

fn canonical_json<T: Serialize>(value: &T) -> String {
    serde_json::to_value(value)
        .map(|v| canonical_string(&v))
        .unwrap_or_default()
}
