use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Scalar metadata attached to a transaction (string, number, bool or null).
pub type MetadataMap = HashMap<String, serde_json::Value>;

/// An incoming bank line to be allocated.
///
/// Immutable input to the rule evaluator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRecord {
    /// Bank line identifier
    pub id: String,

    /// Owning organisation
    pub org_id: String,

    /// Value date of the line
    pub date: DateTime<Utc>,

    /// Signed amount (negative for outgoing funds)
    pub amount: Decimal,

    /// Counterparty name
    pub payee: String,

    /// Free-text description
    pub desc: String,

    /// Optional scalar metadata
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<MetadataMap>,
}

impl TransactionRecord {
    /// Create a transaction dated now without metadata.
    pub fn new(
        id: impl Into<String>,
        org_id: impl Into<String>,
        amount: Decimal,
        payee: impl Into<String>,
        desc: impl Into<String>,
    ) -> Self {
        TransactionRecord {
            id: id.into(),
            org_id: org_id.into(),
            date: Utc::now(),
            amount,
            payee: payee.into(),
            desc: desc.into(),
            metadata: None,
        }
    }

    /// Attach a metadata entry, returning the updated record.
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata
            .get_or_insert_with(HashMap::new)
            .insert(key.into(), value);
        self
    }

    /// Look up a metadata value.
    pub fn metadata_value(&self, key: &str) -> Option<&serde_json::Value> {
        self.metadata.as_ref().and_then(|m| m.get(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_transaction_deserialization() {
        let raw = json!({
            "id": "BL-1",
            "orgId": "ORG-1",
            "date": "2024-07-01T00:00:00Z",
            "amount": "-1250.50",
            "payee": "ATO Tax Office",
            "desc": "BAS payment",
            "metadata": { "channel": "npp" }
        });

        let tx: TransactionRecord = serde_json::from_value(raw).unwrap();
        assert_eq!(tx.org_id, "ORG-1");
        assert_eq!(tx.amount, Decimal::new(-125050, 2));
        assert_eq!(tx.metadata_value("channel"), Some(&json!("npp")));
        assert_eq!(tx.metadata_value("missing"), None);
    }

    #[test]
    fn test_with_metadata() {
        let tx = TransactionRecord::new("BL-2", "ORG-1", Decimal::ONE, "p", "d")
            .with_metadata("source", json!("csv"));
        assert_eq!(tx.metadata_value("source"), Some(&json!("csv")));
    }
}
