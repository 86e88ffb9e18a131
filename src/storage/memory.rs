use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;

use crate::rpt::{RptSigner, RptToken};

use super::traits::{AppendedAllocation, ChainScope, LedgerDraft, LedgerEntry, LedgerStore};

#[derive(Debug, Default)]
struct State {
    entries: HashMap<String, LedgerEntry>,
    chains: HashMap<String, Vec<RptToken>>,
}

/// In-process ledger store.
///
/// A single mutex guards entries and chains together, which makes
/// `append_allocation` atomic with respect to every other call.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of ledger entries (for assertions).
    pub fn entry_count(&self) -> usize {
        self.state.lock().entries.len()
    }

    /// Number of tokens across all chains (for assertions).
    pub fn token_count(&self) -> usize {
        self.state.lock().chains.values().map(Vec::len).sum()
    }
}

/// Keep the original id and creation time when replacing an entry.
fn merge_entry(existing: Option<&LedgerEntry>, entry: &LedgerEntry) -> LedgerEntry {
    match existing {
        Some(current) => LedgerEntry {
            id: current.id,
            created_at: current.created_at,
            ..entry.clone()
        },
        None => entry.clone(),
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn append_allocation(
        &self,
        scope: &ChainScope,
        draft: LedgerDraft,
        signer: &RptSigner,
    ) -> anyhow::Result<AppendedAllocation> {
        let key = scope.key();
        let mut state = self.state.lock();

        let prev_hash = state
            .chains
            .get(&key)
            .and_then(|chain| chain.last())
            .map(|token| token.hash.clone());

        // Mint before touching state so a failure leaves nothing behind.
        let token = signer.create_token(draft.token_params(prev_hash)?)?;

        let entry = draft.into_entry(token.hash.clone());
        let entry = merge_entry(state.entries.get(&entry.transaction_id), &entry);
        state
            .entries
            .insert(entry.transaction_id.clone(), entry.clone());
        state.chains.entry(key).or_default().push(token.clone());

        Ok(AppendedAllocation { entry, token })
    }

    async fn upsert_ledger_entry(&self, entry: &LedgerEntry) -> anyhow::Result<LedgerEntry> {
        let mut state = self.state.lock();
        let stored = merge_entry(state.entries.get(&entry.transaction_id), entry);
        state
            .entries
            .insert(stored.transaction_id.clone(), stored.clone());
        Ok(stored)
    }

    async fn ledger_entry(&self, transaction_id: &str) -> anyhow::Result<Option<LedgerEntry>> {
        Ok(self.state.lock().entries.get(transaction_id).cloned())
    }

    async fn last_token(&self, scope: &ChainScope) -> anyhow::Result<Option<RptToken>> {
        Ok(self
            .state
            .lock()
            .chains
            .get(&scope.key())
            .and_then(|chain| chain.last().cloned()))
    }

    async fn chain(&self, scope: &ChainScope) -> anyhow::Result<Vec<RptToken>> {
        Ok(self
            .state
            .lock()
            .chains
            .get(&scope.key())
            .cloned()
            .unwrap_or_default())
    }
}
