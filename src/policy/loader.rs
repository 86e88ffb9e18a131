use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use thiserror::Error;
use tracing::info;

use crate::domain::{AllocationCondition, AllocationRuleSet, PolicyDefinition};
use crate::error::ValidationError;

/// Errors that can occur while loading rule sets or policies.
#[derive(Error, Debug)]
pub enum PolicyError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unsupported file format: {}", .0.display())]
    UnsupportedFormat(PathBuf),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

/// Parse a file as YAML or JSON, chosen by extension.
fn read_document<T: DeserializeOwned>(path: &Path) -> Result<T, PolicyError> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);

    match extension.as_deref() {
        Some("yaml") | Some("yml") => {
            let content = fs::read_to_string(path)?;
            Ok(serde_yaml::from_str(&content)?)
        }
        Some("json") => {
            let content = fs::read_to_string(path)?;
            Ok(serde_json::from_str(&content)?)
        }
        _ => Err(PolicyError::UnsupportedFormat(path.to_path_buf())),
    }
}

/// Load and validate an allocation rule set.
pub fn load_rule_set(path: impl AsRef<Path>) -> Result<AllocationRuleSet, PolicyError> {
    let path = path.as_ref();
    let rule_set: AllocationRuleSet = read_document(path)?;

    validate_rule_set(&rule_set)?;

    info!(
        path = %path.display(),
        rule_set_id = %rule_set.id,
        rules = rule_set.rules.len(),
        "Loaded rule set"
    );

    Ok(rule_set)
}

/// Either a bare list or a `policies:` document.
#[derive(Deserialize)]
#[serde(untagged)]
enum PolicyDocument {
    List(Vec<PolicyDefinition>),
    Wrapped { policies: Vec<PolicyDefinition> },
}

/// Load waterfall policy definitions.
///
/// Structural checks (weights, floors, caps) happen when the engine is built.
pub fn load_policies(path: impl AsRef<Path>) -> Result<Vec<PolicyDefinition>, PolicyError> {
    let path = path.as_ref();
    let policies = match read_document(path)? {
        PolicyDocument::List(policies) => policies,
        PolicyDocument::Wrapped { policies } => policies,
    };

    info!(path = %path.display(), policies = policies.len(), "Loaded policies");

    Ok(policies)
}

/// Check a rule set for structural problems.
pub fn validate_rule_set(rule_set: &AllocationRuleSet) -> Result<(), ValidationError> {
    if rule_set.id.trim().is_empty() {
        return Err(ValidationError::EmptyId { what: "rule set" });
    }

    let mut seen_ids = HashSet::new();
    for rule in &rule_set.rules {
        if rule.id.trim().is_empty() {
            return Err(ValidationError::EmptyId { what: "rule" });
        }
        if !seen_ids.insert(rule.id.as_str()) {
            return Err(ValidationError::DuplicateRuleId(rule.id.clone()));
        }

        if rule.allocation.is_empty() {
            return Err(ValidationError::NoTargets {
                rule: rule.id.clone(),
            });
        }

        if let Some(required) = rule.min_match_count {
            if required > rule.conditions.len() {
                return Err(ValidationError::MinMatchCount {
                    rule: rule.id.clone(),
                    required,
                    available: rule.conditions.len(),
                });
            }
        }

        for target in &rule.allocation {
            match (target.ratio, target.amount) {
                (None, None) => {
                    return Err(ValidationError::MissingTargetValue {
                        rule: rule.id.clone(),
                        account: target.account_id.clone(),
                    });
                }
                (Some(ratio), _) if ratio < Decimal::ZERO || ratio > Decimal::ONE => {
                    return Err(ValidationError::RatioOutOfRange {
                        rule: rule.id.clone(),
                        account: target.account_id.clone(),
                        ratio: ratio.to_string(),
                    });
                }
                _ => {}
            }
        }

        for condition in &rule.conditions {
            if let AllocationCondition::Metadata(metadata) = condition {
                if metadata.value.is_array() || metadata.value.is_object() {
                    return Err(ValidationError::NonScalarMetadata {
                        rule: rule.id.clone(),
                        key: metadata.key.clone(),
                    });
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn temp_file(suffix: &str, content: &str) -> NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        writeln!(file, "{content}").unwrap();
        file
    }

    const RULE_SET_YAML: &str = r#"
id: default-ORG1
name: Default allocation policy
version: "2024.09"
rules:
  - id: tax-ato
    name: Tax payments to the ATO
    priority: 100
    conditions:
      - kind: text
        field: payee
        operator: contains
        value: ATO
    allocation:
      - accountId: TAX_PAYABLE
        ratio: 1
  - id: general-expense
    name: General operating expense
    priority: 10
    allocation:
      - accountId: OPERATING_EXPENSES
        ratio: 1
"#;

    #[test]
    fn test_load_rule_set_yaml() {
        let file = temp_file(".yaml", RULE_SET_YAML);

        let rule_set = load_rule_set(file.path()).unwrap();

        assert_eq!(rule_set.id, "default-ORG1");
        assert_eq!(rule_set.version.as_deref(), Some("2024.09"));
        assert_eq!(rule_set.rules.len(), 2);
        assert_eq!(rule_set.rules[0].allocation[0].ratio, Some(Decimal::ONE));
    }

    #[test]
    fn test_load_rule_set_json() {
        let file = temp_file(
            ".json",
            r#"{
  "id": "rs-1",
  "name": "JSON rules",
  "rules": [
    {
      "id": "payroll",
      "name": "Payroll",
      "conditions": [
        {"kind": "amount", "operator": "lte", "value": "-1000"}
      ],
      "allocation": [{"accountId": "WAGES", "amount": "-1000"}]
    }
  ]
}"#,
        );

        let rule_set = load_rule_set(file.path()).unwrap();
        assert_eq!(rule_set.rules[0].id, "payroll");
        assert_eq!(
            rule_set.rules[0].allocation[0].amount,
            Some(Decimal::new(-1000, 0))
        );
    }

    #[test]
    fn test_duplicate_rule_ids() {
        let file = temp_file(
            ".yml",
            r#"
id: rs
name: dupes
rules:
  - id: r1
    name: one
    allocation: [{accountId: A, ratio: 1}]
  - id: r1
    name: two
    allocation: [{accountId: B, ratio: 1}]
"#,
        );

        let err = load_rule_set(file.path()).unwrap_err();
        assert!(matches!(
            err,
            PolicyError::Validation(ValidationError::DuplicateRuleId(ref id)) if id == "r1"
        ));
    }

    #[test]
    fn test_validation_failures() {
        let base = || -> AllocationRuleSet { serde_yaml::from_str(RULE_SET_YAML).unwrap() };

        let mut empty_id = base();
        empty_id.id = " ".to_string();
        assert_eq!(
            validate_rule_set(&empty_id),
            Err(ValidationError::EmptyId { what: "rule set" })
        );

        let mut too_many = base();
        too_many.rules[0].min_match_count = Some(2);
        assert!(matches!(
            validate_rule_set(&too_many),
            Err(ValidationError::MinMatchCount { required: 2, available: 1, .. })
        ));

        let mut no_value = base();
        no_value.rules[0].allocation[0].ratio = None;
        assert!(matches!(
            validate_rule_set(&no_value),
            Err(ValidationError::MissingTargetValue { .. })
        ));

        let mut bad_ratio = base();
        bad_ratio.rules[1].allocation[0].ratio = Some(Decimal::new(15, 1));
        assert!(matches!(
            validate_rule_set(&bad_ratio),
            Err(ValidationError::RatioOutOfRange { .. })
        ));

        let mut no_targets = base();
        no_targets.rules[1].allocation.clear();
        assert!(matches!(
            validate_rule_set(&no_targets),
            Err(ValidationError::NoTargets { .. })
        ));

        let mut non_scalar = base();
        non_scalar.rules[0].conditions.push(AllocationCondition::metadata(
            "tags",
            crate::domain::MetadataOperator::Equals,
            serde_json::json!(["a"]),
        ));
        assert!(matches!(
            validate_rule_set(&non_scalar),
            Err(ValidationError::NonScalarMetadata { .. })
        ));

        assert!(validate_rule_set(&base()).is_ok());
    }

    #[test]
    fn test_load_policies_both_shapes() {
        let list = temp_file(
            ".yaml",
            r#"
- id: tax
  weight: 1
  floor: 100
- id: ops
  weight: 1
  cap: 400
  gate:
    type: maxAverageRisk
    threshold: 0.7
"#,
        );
        let policies = load_policies(list.path()).unwrap();
        assert_eq!(policies.len(), 2);
        assert_eq!(policies[0].floor, Some(Decimal::new(100, 0)));
        assert_eq!(policies[1].cap, Some(Decimal::new(400, 0)));
        assert!(policies[1].gate.is_some());

        let wrapped = temp_file(
            ".json",
            r#"{"policies": [{"id": "tax", "weight": 2}]}"#,
        );
        let policies = load_policies(wrapped.path()).unwrap();
        assert_eq!(policies[0].weight, Decimal::new(2, 0));
    }

    #[test]
    fn test_unsupported_extension() {
        let file = temp_file(".toml", "id = 'x'");
        assert!(matches!(
            load_rule_set(file.path()),
            Err(PolicyError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            load_policies("/nonexistent/policies.yaml"),
            Err(PolicyError::Io(_))
        ));
    }
}
