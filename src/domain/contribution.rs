use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Raw contribution as received from the caller.
///
/// Amounts are plain JSON numbers at this boundary; the engine converts
/// them to decimals during ingestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContributionInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    pub amount: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_score: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl ContributionInput {
    pub fn new(amount: f64, risk_score: f64) -> Self {
        ContributionInput {
            id: None,
            amount,
            risk_score: Some(risk_score),
            metadata: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}

/// Normalised contribution accepted into a waterfall run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contribution {
    pub id: String,

    /// Amount at internal (9 dp) precision
    pub amount: Decimal,

    /// Risk score clamped into [0, 1]
    pub risk_score: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

/// Clamp a risk score into [0, 1]; missing or NaN scores become 0.
pub fn clamp_risk(value: Option<f64>) -> f64 {
    match value {
        Some(v) if v.is_nan() => 0.0,
        Some(v) => v.clamp(0.0, 1.0),
        None => 0.0,
    }
}
