//! Built-in allocation rule set applied to organisations without their own.

use rust_decimal::Decimal;
use serde_json::{json, Map, Value};

use crate::domain::{
    AllocationCondition, AllocationRule, AllocationRuleSet, AllocationTarget, AmountOperator,
    TextField, TextOperator,
};

/// Version stamped on the default rule set.
pub const DEFAULT_RULE_VERSION: &str = "2024.09";

/// Build the default rule set for an organisation.
///
/// Every call returns a fresh, independently owned value.
pub fn resolve_rule_set_for_org(org_id: &str) -> AllocationRuleSet {
    let mut metadata = Map::new();
    metadata.insert("orgId".to_string(), Value::String(org_id.to_string()));
    metadata.insert("template".to_string(), json!("default"));

    AllocationRuleSet {
        id: format!("default-{org_id}"),
        name: "Default allocation policy".to_string(),
        version: Some(DEFAULT_RULE_VERSION.to_string()),
        rules: base_rules(),
        metadata: Some(metadata),
    }
}

fn base_rules() -> Vec<AllocationRule> {
    vec![
        base_rule(
            "tax-ato",
            "ATO liability allocation",
            100,
            "tax",
            vec![AllocationCondition::text(
                TextField::Payee,
                TextOperator::Contains,
                "ATO",
            )],
            vec![AllocationTarget::ratio("TAX_PAYABLE", Decimal::ONE).with_memo("ATO remittance")],
        ),
        base_rule(
            "payroll-salaries",
            "Payroll wages",
            90,
            "payroll",
            vec![
                AllocationCondition::text(TextField::Desc, TextOperator::Contains, "salary"),
                AllocationCondition::amount(AmountOperator::Lte, Decimal::new(-100, 0)),
            ],
            vec![
                AllocationTarget::ratio("WAGES_PAYABLE", Decimal::new(9, 1)).with_memo("Net wages"),
                AllocationTarget::ratio("PAYROLL_TAX", Decimal::new(1, 1)).with_memo("Payroll tax"),
            ],
        ),
        base_rule(
            "subscriptions",
            "Software subscriptions",
            70,
            "software",
            vec![AllocationCondition::text(
                TextField::Desc,
                TextOperator::Contains,
                "subscription",
            )],
            vec![AllocationTarget::ratio("SOFTWARE_EXPENSE", Decimal::ONE).with_memo("Subscription")],
        ),
        base_rule(
            "merchant-fees",
            "Merchant fees",
            60,
            "payments",
            vec![AllocationCondition::text(
                TextField::Desc,
                TextOperator::Contains,
                "stripe",
            )],
            vec![
                AllocationTarget::ratio("MERCHANT_FEES", Decimal::new(6, 1)),
                AllocationTarget::ratio("PLATFORM_COSTS", Decimal::new(4, 1)),
            ],
        ),
        base_rule(
            "general-expense",
            "General operating expense",
            10,
            "general",
            vec![AllocationCondition::amount(AmountOperator::Lte, Decimal::ZERO)],
            vec![AllocationTarget::ratio("OPERATING_EXPENSES", Decimal::ONE)],
        ),
    ]
}

fn base_rule(
    id: &str,
    name: &str,
    priority: i32,
    category: &str,
    conditions: Vec<AllocationCondition>,
    allocation: Vec<AllocationTarget>,
) -> AllocationRule {
    let mut metadata = Map::new();
    metadata.insert("category".to_string(), json!(category));

    AllocationRule {
        id: id.to_string(),
        name: name.to_string(),
        conditions,
        allocation,
        min_match_count: None,
        priority,
        metadata: Some(metadata),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_rule_set_shape() {
        let rules = resolve_rule_set_for_org("ORG-42");
        assert_eq!(rules.id, "default-ORG-42");
        assert_eq!(rules.version.as_deref(), Some(DEFAULT_RULE_VERSION));
        assert_eq!(rules.rules.len(), 5);

        let priorities: Vec<i32> = rules.rules.iter().map(|r| r.priority).collect();
        assert_eq!(priorities, vec![100, 90, 70, 60, 10]);

        let payroll = rules.rule("payroll-salaries").unwrap();
        let ratio_sum: Decimal = payroll.allocation.iter().filter_map(|t| t.ratio).sum();
        assert_eq!(ratio_sum, Decimal::ONE);
        assert_eq!(payroll.metadata.as_ref().unwrap()["category"], "payroll");
    }

    #[test]
    fn test_each_call_is_independent() {
        let mut a = resolve_rule_set_for_org("ORG-1");
        a.rules.clear();
        let b = resolve_rule_set_for_org("ORG-1");
        assert_eq!(b.rules.len(), 5);
    }
}
