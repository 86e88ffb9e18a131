use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::domain::AllocationBreakdown;
use crate::rpt::{CreateTokenParams, RptSigner, RptToken};

/// Which hash chain a token is appended to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ChainScope {
    /// One chain shared by every organisation
    #[default]
    Global,
    /// A chain per organisation
    Organisation(String),
}

impl ChainScope {
    /// Stable key used to partition storage and lock a chain.
    pub fn key(&self) -> String {
        match self {
            ChainScope::Global => "global".to_string(),
            ChainScope::Organisation(org_id) => format!("org:{org_id}"),
        }
    }
}

impl fmt::Display for ChainScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

/// Persisted allocation, keyed by transaction id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    pub id: Uuid,
    pub org_id: String,
    pub transaction_id: String,
    pub rule_id: String,
    pub policy_hash: String,
    pub allocation: Vec<AllocationBreakdown>,
    /// Hash of the RPT minted for this allocation
    pub rpt_hash: String,
    pub created_at: DateTime<Utc>,
}

/// A verified allocation waiting to be chained and recorded.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerDraft {
    pub org_id: String,
    pub transaction_id: String,
    pub rule_id: String,
    pub policy_hash: String,
    pub allocation: Vec<AllocationBreakdown>,
    /// Already normalised RPT timestamp
    pub timestamp: String,
}

impl LedgerDraft {
    /// Token parameters for this draft, linked to `prev_hash`.
    pub fn token_params(&self, prev_hash: Option<String>) -> anyhow::Result<CreateTokenParams> {
        Ok(CreateTokenParams {
            bank_line_id: self.transaction_id.clone(),
            policy_hash: self.policy_hash.clone(),
            allocation: serde_json::to_value(&self.allocation)?,
            timestamp: Some(self.timestamp.clone()),
            prev_hash,
        })
    }

    /// Ledger row for this draft once its token exists.
    pub fn into_entry(self, rpt_hash: String) -> LedgerEntry {
        LedgerEntry {
            id: Uuid::new_v4(),
            org_id: self.org_id,
            transaction_id: self.transaction_id,
            rule_id: self.rule_id,
            policy_hash: self.policy_hash,
            allocation: self.allocation,
            rpt_hash,
            created_at: Utc::now(),
        }
    }
}

/// Result of an atomic append.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppendedAllocation {
    pub entry: LedgerEntry,
    pub token: RptToken,
}

/// Persistence collaborator for ledger rows and RPT chains.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Read the scope's last hash, mint a token linked to it, upsert the
    /// ledger entry and append the token, all as one atomic unit.
    ///
    /// Concurrent appends to the same scope serialize; two tokens never
    /// share a predecessor.
    async fn append_allocation(
        &self,
        scope: &ChainScope,
        draft: LedgerDraft,
        signer: &RptSigner,
    ) -> anyhow::Result<AppendedAllocation>;

    /// Insert or replace the entry for its transaction id.
    async fn upsert_ledger_entry(&self, entry: &LedgerEntry) -> anyhow::Result<LedgerEntry>;

    async fn ledger_entry(&self, transaction_id: &str) -> anyhow::Result<Option<LedgerEntry>>;

    async fn last_token(&self, scope: &ChainScope) -> anyhow::Result<Option<RptToken>>;

    /// Every token of a scope in insertion order.
    async fn chain(&self, scope: &ChainScope) -> anyhow::Result<Vec<RptToken>>;
}
