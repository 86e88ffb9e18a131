use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use crate::domain::money::{round_internal, saturating_sum};
use crate::domain::{Contribution, GateRule, ResolvedPolicy};
use crate::waterfall::stages::GateContext;

/// Verdict of a single gate rule.
#[derive(Debug, Clone, PartialEq)]
pub enum GateVerdict {
    Approved,
    Rejected(String),
}

impl GateVerdict {
    #[inline]
    pub fn is_approved(&self) -> bool {
        matches!(self, GateVerdict::Approved)
    }
}

/// Aggregate the contributions into the context gates see.
pub fn build_context(contributions: &[Contribution], unallocated: Decimal) -> GateContext {
    let total = saturating_sum(contributions.iter().map(|c| c.amount));

    let average_risk = if contributions.is_empty() {
        0.0
    } else {
        contributions.iter().map(|c| c.risk_score).sum::<f64>() / contributions.len() as f64
    };

    let max_risk = contributions
        .iter()
        .map(|c| c.risk_score)
        .fold(0.0_f64, f64::max);

    GateContext {
        total_amount: round_internal(total),
        average_risk: round_risk(average_risk),
        max_risk: round_risk(max_risk),
        unallocated: round_internal(unallocated),
    }
}

/// Evaluate a policy's gate against the context. No gate approves.
pub fn evaluate_gate(
    policy: &ResolvedPolicy,
    context: &GateContext,
    tolerance: Decimal,
) -> GateVerdict {
    let Some(rule) = &policy.gate else {
        return GateVerdict::Approved;
    };

    let risk_tolerance = tolerance.to_f64().unwrap_or(0.0);

    match rule {
        GateRule::MaxAverageRisk { threshold } => {
            if context.average_risk - risk_tolerance > *threshold {
                GateVerdict::Rejected(format!(
                    "average risk {:.3} exceeds {:.3}",
                    context.average_risk, threshold
                ))
            } else {
                GateVerdict::Approved
            }
        }
        GateRule::MaxSingleRisk { threshold } => {
            if context.max_risk - risk_tolerance > *threshold {
                GateVerdict::Rejected(format!(
                    "max risk {:.3} exceeds {:.3}",
                    context.max_risk, threshold
                ))
            } else {
                GateVerdict::Approved
            }
        }
        GateRule::MinTotal { threshold } => {
            if context.total_amount.saturating_add(tolerance) < *threshold {
                GateVerdict::Rejected(format!(
                    "total amount {:.2} below {:.2}",
                    context.total_amount, threshold
                ))
            } else {
                GateVerdict::Approved
            }
        }
        GateRule::MaxTotal { threshold } => {
            if context.total_amount.saturating_sub(tolerance) > *threshold {
                GateVerdict::Rejected(format!(
                    "total amount {:.2} above {:.2}",
                    context.total_amount, threshold
                ))
            } else {
                GateVerdict::Approved
            }
        }
    }
}

fn round_risk(value: f64) -> f64 {
    (value * 1e9).round() / 1e9
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::money::DEFAULT_TOLERANCE;

    fn contribution(amount: i64, risk: f64) -> Contribution {
        Contribution {
            id: "c".to_string(),
            amount: Decimal::new(amount, 0),
            risk_score: risk,
            metadata: None,
        }
    }

    fn gated(rule: GateRule) -> ResolvedPolicy {
        ResolvedPolicy {
            id: "p".to_string(),
            weight: Decimal::ONE,
            cap: None,
            floor: Decimal::ZERO,
            gate: Some(rule),
        }
    }

    #[test]
    fn test_context_aggregates() {
        let ctx = build_context(
            &[contribution(600, 0.2), contribution(400, 0.6)],
            Decimal::new(5, 0),
        );
        assert_eq!(ctx.total_amount, Decimal::new(1000, 0));
        assert!((ctx.average_risk - 0.4).abs() < 1e-9);
        assert_eq!(ctx.max_risk, 0.6);
        assert_eq!(ctx.unallocated, Decimal::new(5, 0));

        let empty = build_context(&[], Decimal::ZERO);
        assert_eq!(empty.average_risk, 0.0);
        assert_eq!(empty.max_risk, 0.0);
    }

    #[test]
    fn test_risk_gates() {
        let ctx = build_context(
            &[contribution(500, 0.9), contribution(500, 0.1)],
            Decimal::ZERO,
        );

        let avg = gated(GateRule::MaxAverageRisk { threshold: 0.5 });
        assert!(evaluate_gate(&avg, &ctx, DEFAULT_TOLERANCE).is_approved());

        let single = gated(GateRule::MaxSingleRisk { threshold: 0.5 });
        assert_eq!(
            evaluate_gate(&single, &ctx, DEFAULT_TOLERANCE),
            GateVerdict::Rejected("max risk 0.900 exceeds 0.500".to_string())
        );
    }

    #[test]
    fn test_threshold_equality_approves() {
        let ctx = build_context(&[contribution(1000, 0.5)], Decimal::ZERO);

        for rule in [
            GateRule::MaxAverageRisk { threshold: 0.5 },
            GateRule::MinTotal {
                threshold: Decimal::new(1000, 0),
            },
            GateRule::MaxTotal {
                threshold: Decimal::new(1000, 0),
            },
        ] {
            assert!(evaluate_gate(&gated(rule), &ctx, DEFAULT_TOLERANCE).is_approved());
        }
    }

    #[test]
    fn test_total_gates() {
        let ctx = build_context(&[contribution(1000, 0.0)], Decimal::ZERO);

        let min = gated(GateRule::MinTotal {
            threshold: Decimal::new(5000, 0),
        });
        assert_eq!(
            evaluate_gate(&min, &ctx, DEFAULT_TOLERANCE),
            GateVerdict::Rejected("total amount 1000.00 below 5000.00".to_string())
        );

        let max = gated(GateRule::MaxTotal {
            threshold: Decimal::new(999, 0),
        });
        assert!(!evaluate_gate(&max, &ctx, DEFAULT_TOLERANCE).is_approved());
    }
}
