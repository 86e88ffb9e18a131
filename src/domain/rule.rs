use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Transaction text field a condition inspects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TextField {
    Payee,
    Desc,
}

/// Comparison applied to a text field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TextOperator {
    Contains,
    StartsWith,
    EndsWith,
    Equals,
}

/// Comparison applied to the transaction amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AmountOperator {
    Gte,
    Lte,
    Eq,
}

/// Comparison applied to a metadata entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MetadataOperator {
    Equals,
    NotEquals,
}

/// Text predicate on payee or description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextCondition {
    pub field: TextField,
    pub operator: TextOperator,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub case_sensitive: Option<bool>,
}

impl TextCondition {
    /// Whether comparison should respect case. Defaults to false.
    #[inline]
    pub fn is_case_sensitive(&self) -> bool {
        self.case_sensitive.unwrap_or(false)
    }
}

/// Numeric predicate on the transaction amount.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AmountCondition {
    pub operator: AmountOperator,
    pub value: Decimal,
}

/// Scalar predicate on a metadata key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataCondition {
    pub key: String,
    pub operator: MetadataOperator,
    pub value: serde_json::Value,
}

/// A single predicate in an allocation rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum AllocationCondition {
    Text(TextCondition),
    Amount(AmountCondition),
    Metadata(MetadataCondition),
}

impl AllocationCondition {
    /// Case-insensitive text condition.
    pub fn text(field: TextField, operator: TextOperator, value: impl Into<String>) -> Self {
        AllocationCondition::Text(TextCondition {
            field,
            operator,
            value: value.into(),
            case_sensitive: None,
        })
    }

    /// Amount condition.
    pub fn amount(operator: AmountOperator, value: Decimal) -> Self {
        AllocationCondition::Amount(AmountCondition { operator, value })
    }

    /// Metadata condition.
    pub fn metadata(
        key: impl Into<String>,
        operator: MetadataOperator,
        value: serde_json::Value,
    ) -> Self {
        AllocationCondition::Metadata(MetadataCondition {
            key: key.into(),
            operator,
            value,
        })
    }

    /// Short label for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            AllocationCondition::Text(_) => "text",
            AllocationCondition::Amount(_) => "amount",
            AllocationCondition::Metadata(_) => "metadata",
        }
    }
}

/// Destination account and share of a matched transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllocationTarget {
    pub account_id: String,

    /// Fraction of the transaction amount (0..=1)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ratio: Option<Decimal>,

    /// Explicit amount; wins over `ratio` when both are set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<Decimal>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memo: Option<String>,
}

impl AllocationTarget {
    /// Target receiving a ratio of the amount.
    pub fn ratio(account_id: impl Into<String>, ratio: Decimal) -> Self {
        AllocationTarget {
            account_id: account_id.into(),
            ratio: Some(ratio),
            amount: None,
            memo: None,
        }
    }

    /// Target receiving a fixed amount.
    pub fn fixed(account_id: impl Into<String>, amount: Decimal) -> Self {
        AllocationTarget {
            account_id: account_id.into(),
            ratio: None,
            amount: Some(amount),
            memo: None,
        }
    }

    pub fn with_memo(mut self, memo: impl Into<String>) -> Self {
        self.memo = Some(memo.into());
        self
    }
}

/// A rule mapping matching transactions onto allocation targets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllocationRule {
    /// Unique identifier within the rule set
    pub id: String,

    /// Human-readable name
    pub name: String,

    /// Ordered predicates
    #[serde(default)]
    pub conditions: Vec<AllocationCondition>,

    /// Targets applied when the rule matches
    pub allocation: Vec<AllocationTarget>,

    /// Conditions required to pass (defaults to all of them)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_match_count: Option<usize>,

    /// Evaluation priority; higher runs first
    #[serde(default)]
    pub priority: i32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Map<String, serde_json::Value>>,
}

impl AllocationRule {
    /// Effective minimum number of matching conditions.
    #[inline]
    pub fn required_matches(&self) -> usize {
        self.min_match_count.unwrap_or(self.conditions.len())
    }
}

/// Versioned collection of allocation rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllocationRuleSet {
    pub id: String,

    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(default)]
    pub rules: Vec<AllocationRule>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Map<String, serde_json::Value>>,
}

impl AllocationRuleSet {
    /// Find a rule by id.
    pub fn rule(&self, id: &str) -> Option<&AllocationRule> {
        self.rules.iter().find(|r| r.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_set_yaml() {
        let yaml = r#"
id: default-ORG1
name: Default allocation policy
version: "2024.09"
rules:
  - id: tax-ato
    name: ATO liability allocation
    priority: 100
    conditions:
      - kind: text
        field: payee
        operator: contains
        value: ATO
    allocation:
      - accountId: TAX_PAYABLE
        ratio: 1
        memo: ATO remittance
  - id: large-credit
    name: Large credit
    minMatchCount: 1
    conditions:
      - kind: amount
        operator: gte
        value: 10000
      - kind: metadata
        key: channel
        operator: notEquals
        value: internal
    allocation:
      - accountId: RESERVE
        amount: "250.00"
"#;

        let rule_set: AllocationRuleSet = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(rule_set.version.as_deref(), Some("2024.09"));
        assert_eq!(rule_set.rules.len(), 2);

        let tax = rule_set.rule("tax-ato").unwrap();
        assert_eq!(tax.priority, 100);
        assert_eq!(tax.required_matches(), 1);
        assert!(matches!(
            tax.conditions[0],
            AllocationCondition::Text(TextCondition {
                field: TextField::Payee,
                operator: TextOperator::Contains,
                ..
            })
        ));

        let large = rule_set.rule("large-credit").unwrap();
        assert_eq!(large.priority, 0);
        assert_eq!(large.required_matches(), 1);
        assert_eq!(large.conditions[1].kind(), "metadata");
        assert_eq!(large.allocation[0].amount, Some(Decimal::new(25000, 2)));
    }

    #[test]
    fn test_unknown_condition_kind_rejected() {
        let raw = r#"{"kind":"regex","pattern":".*"}"#;
        let parsed: Result<AllocationCondition, _> = serde_json::from_str(raw);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_condition_serialization_uses_tag() {
        let cond = AllocationCondition::amount(AmountOperator::Lte, Decimal::new(-100, 0));
        let value = serde_json::to_value(&cond).unwrap();
        assert_eq!(value["kind"], "amount");
        assert_eq!(value["operator"], "lte");
    }
}
