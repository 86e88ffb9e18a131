use rust_decimal::Decimal;
use serde_json::Value;

use crate::domain::{
    AllocationCondition, AmountCondition, AmountOperator, MetadataCondition, MetadataOperator,
    TextCondition, TextField, TextOperator, TransactionRecord,
};

/// Epsilon used for amount equality.
pub const AMOUNT_EPSILON: Decimal = Decimal::from_parts(1, 0, 0, false, 6);

/// A predicate that can be tested against a single transaction.
///
/// Matching is pure: no state, no I/O, and never fails. A malformed
/// condition is rejected when the rule set is loaded, not here.
pub trait ConditionMatcher {
    fn matches(&self, tx: &TransactionRecord) -> bool;
}

impl ConditionMatcher for TextCondition {
    fn matches(&self, tx: &TransactionRecord) -> bool {
        let source = match self.field {
            TextField::Payee => tx.payee.as_str(),
            TextField::Desc => tx.desc.as_str(),
        };

        if self.is_case_sensitive() {
            compare_text(self.operator, source, &self.value)
        } else {
            compare_text(
                self.operator,
                &source.to_lowercase(),
                &self.value.to_lowercase(),
            )
        }
    }
}

impl ConditionMatcher for AmountCondition {
    fn matches(&self, tx: &TransactionRecord) -> bool {
        match self.operator {
            AmountOperator::Gte => tx.amount >= self.value,
            AmountOperator::Lte => tx.amount <= self.value,
            AmountOperator::Eq => (tx.amount - self.value).abs() < AMOUNT_EPSILON,
        }
    }
}

impl ConditionMatcher for MetadataCondition {
    fn matches(&self, tx: &TransactionRecord) -> bool {
        let equal = tx
            .metadata_value(&self.key)
            .is_some_and(|actual| scalar_eq(actual, &self.value));

        match self.operator {
            MetadataOperator::Equals => equal,
            MetadataOperator::NotEquals => !equal,
        }
    }
}

impl ConditionMatcher for AllocationCondition {
    fn matches(&self, tx: &TransactionRecord) -> bool {
        match self {
            AllocationCondition::Text(c) => c.matches(tx),
            AllocationCondition::Amount(c) => c.matches(tx),
            AllocationCondition::Metadata(c) => c.matches(tx),
        }
    }
}

fn compare_text(operator: TextOperator, haystack: &str, needle: &str) -> bool {
    match operator {
        TextOperator::Contains => haystack.contains(needle),
        TextOperator::StartsWith => haystack.starts_with(needle),
        TextOperator::EndsWith => haystack.ends_with(needle),
        TextOperator::Equals => haystack == needle,
    }
}

/// Strict scalar equality; numbers compare by value so `1` equals `1.0`.
fn scalar_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => x == y,
        },
        _ => a == b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tx(amount: i64, payee: &str, desc: &str) -> TransactionRecord {
        TransactionRecord::new("BL-1", "ORG-1", Decimal::new(amount, 2), payee, desc)
    }

    fn text(field: TextField, operator: TextOperator, value: &str, cs: Option<bool>) -> TextCondition {
        TextCondition {
            field,
            operator,
            value: value.to_string(),
            case_sensitive: cs,
        }
    }

    #[test]
    fn test_text_case_insensitive_by_default() {
        let t = tx(-10000, "ATO Tax Office", "BAS Q1");
        assert!(text(TextField::Payee, TextOperator::Contains, "ato", None).matches(&t));
        assert!(text(TextField::Payee, TextOperator::StartsWith, "ato tax", None).matches(&t));
        assert!(text(TextField::Payee, TextOperator::EndsWith, "OFFICE", None).matches(&t));
        assert!(text(TextField::Desc, TextOperator::Equals, "bas q1", None).matches(&t));
        assert!(!text(TextField::Desc, TextOperator::Equals, "bas", None).matches(&t));
    }

    #[test]
    fn test_text_case_sensitive() {
        let t = tx(-10000, "ATO Tax Office", "BAS Q1");
        assert!(!text(TextField::Payee, TextOperator::Contains, "ato", Some(true)).matches(&t));
        assert!(text(TextField::Payee, TextOperator::Contains, "ATO", Some(true)).matches(&t));
    }

    #[test]
    fn test_amount_operators() {
        let t = tx(-10000, "p", "d"); // -100.00
        let gte = AmountCondition { operator: AmountOperator::Gte, value: Decimal::new(-100, 0) };
        let lte = AmountCondition { operator: AmountOperator::Lte, value: Decimal::new(-101, 0) };
        let eq = AmountCondition { operator: AmountOperator::Eq, value: Decimal::new(-10_000_000_005, 8) };
        assert!(gte.matches(&t));
        assert!(!lte.matches(&t));
        // -100.00000005 is within 1e-6 of -100.00
        assert!(eq.matches(&t));

        let far = AmountCondition { operator: AmountOperator::Eq, value: Decimal::new(-10001, 2) };
        assert!(!far.matches(&t));
    }

    #[test]
    fn test_metadata_equals_and_absent_key() {
        let t = tx(100, "p", "d")
            .with_metadata("channel", json!("npp"))
            .with_metadata("batch", json!(7));

        let eq = MetadataCondition { key: "channel".into(), operator: MetadataOperator::Equals, value: json!("npp") };
        let ne = MetadataCondition { key: "channel".into(), operator: MetadataOperator::NotEquals, value: json!("npp") };
        let num = MetadataCondition { key: "batch".into(), operator: MetadataOperator::Equals, value: json!(7.0) };
        let absent_eq = MetadataCondition { key: "missing".into(), operator: MetadataOperator::Equals, value: json!(null) };
        let absent_ne = MetadataCondition { key: "missing".into(), operator: MetadataOperator::NotEquals, value: json!("x") };

        assert!(eq.matches(&t));
        assert!(!ne.matches(&t));
        assert!(num.matches(&t));
        assert!(!absent_eq.matches(&t));
        assert!(absent_ne.matches(&t));
    }

    #[test]
    fn test_metadata_types_are_strict() {
        let t = tx(100, "p", "d").with_metadata("flag", json!("true"));
        let cond = MetadataCondition { key: "flag".into(), operator: MetadataOperator::Equals, value: json!(true) };
        assert!(!cond.matches(&t));
    }

    #[test]
    fn test_condition_dispatch() {
        let t = tx(5000, "Stripe", "stripe payout");
        let cond = AllocationCondition::text(TextField::Desc, TextOperator::Contains, "STRIPE");
        assert!(cond.matches(&t));
    }
}
