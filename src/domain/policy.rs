use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Threshold rule that can veto an allocation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum GateRule {
    /// Reject when mean contribution risk exceeds the threshold
    MaxAverageRisk { threshold: f64 },
    /// Reject when any contribution risk exceeds the threshold
    MaxSingleRisk { threshold: f64 },
    /// Reject when the pooled total is below the threshold
    MinTotal { threshold: Decimal },
    /// Reject when the pooled total is above the threshold
    MaxTotal { threshold: Decimal },
}

impl fmt::Display for GateRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GateRule::MaxAverageRisk { threshold } => write!(f, "maxAverageRisk({threshold})"),
            GateRule::MaxSingleRisk { threshold } => write!(f, "maxSingleRisk({threshold})"),
            GateRule::MinTotal { threshold } => write!(f, "minTotal({threshold})"),
            GateRule::MaxTotal { threshold } => write!(f, "maxTotal({threshold})"),
        }
    }
}

/// Policy as supplied by configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyDefinition {
    pub id: String,

    pub weight: Decimal,

    /// Maximum the policy may receive; absent means unbounded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cap: Option<Decimal>,

    /// Minimum the policy must receive to receive anything
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub floor: Option<Decimal>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gate: Option<GateRule>,
}

impl PolicyDefinition {
    /// Uncapped policy without floor or gate.
    pub fn new(id: impl Into<String>, weight: Decimal) -> Self {
        PolicyDefinition {
            id: id.into(),
            weight,
            cap: None,
            floor: None,
            gate: None,
        }
    }

    pub fn with_cap(mut self, cap: Decimal) -> Self {
        self.cap = Some(cap);
        self
    }

    pub fn with_floor(mut self, floor: Decimal) -> Self {
        self.floor = Some(floor);
        self
    }

    pub fn with_gate(mut self, gate: GateRule) -> Self {
        self.gate = Some(gate);
        self
    }
}

/// Validated policy held by the waterfall engine.
///
/// `WaterfallEngine::new` resolves definitions into these, clamping caps and
/// floors at zero. Values built by hand skip those checks.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedPolicy {
    pub id: String,
    pub weight: Decimal,
    /// `None` is an infinite cap
    pub cap: Option<Decimal>,
    pub floor: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gate: Option<GateRule>,
}

impl ResolvedPolicy {
    /// Capacity left after `allocated` has been assigned.
    #[inline]
    pub fn remaining_capacity(&self, allocated: Decimal) -> Option<Decimal> {
        self.cap.map(|cap| cap - allocated)
    }

    /// Whether the policy can ever receive more than `tolerance`.
    #[inline]
    pub fn has_capacity(&self, tolerance: Decimal) -> bool {
        self.cap.map_or(true, |cap| cap > tolerance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_definitions_yaml() {
        let yaml = r#"
- id: tax
  weight: 2
  floor: 100
  gate:
    type: maxAverageRisk
    threshold: 0.5
- id: ops
  weight: 1
  cap: "2500.00"
  gate:
    type: minTotal
    threshold: 1000
- id: reserve
  weight: 0.5
"#;

        let defs: Vec<PolicyDefinition> = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(defs.len(), 3);
        assert_eq!(defs[0].floor, Some(Decimal::new(100, 0)));
        assert_eq!(
            defs[0].gate,
            Some(GateRule::MaxAverageRisk { threshold: 0.5 })
        );
        assert_eq!(defs[1].cap, Some(Decimal::new(250000, 2)));
        assert_eq!(
            defs[1].gate,
            Some(GateRule::MinTotal {
                threshold: Decimal::new(1000, 0)
            })
        );
        assert_eq!(defs[2].weight, Decimal::new(5, 1));
        assert!(defs[2].cap.is_none());
    }

    #[test]
    fn test_remaining_capacity() {
        let capped = ResolvedPolicy {
            id: "a".to_string(),
            weight: Decimal::ONE,
            cap: Some(Decimal::new(100, 0)),
            floor: Decimal::ZERO,
            gate: None,
        };
        assert_eq!(
            capped.remaining_capacity(Decimal::new(40, 0)),
            Some(Decimal::new(60, 0))
        );

        let unbounded = ResolvedPolicy {
            cap: None,
            ..capped
        };
        assert_eq!(unbounded.remaining_capacity(Decimal::new(40, 0)), None);
        assert!(unbounded.has_capacity(Decimal::new(1, 6)));
    }
}
