//! Allocation service: recompute, verify, chain and record.

use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use crate::config::ScopeMode;
use crate::domain::{AllocationBreakdown, AllocationRuleSet, PolicyEvaluation, TransactionRecord};
use crate::error::ValidationError;
use crate::observability::{MetricsRegistry, TimingGuard};
use crate::rpt::{normalise_timestamp, verify_chain, ChainReport, RptSigner, RptToken};
use crate::rules::{allocations_equal, evaluate, evaluate_rule_set, EvaluateOptions};
use crate::storage::{AppendedAllocation, ChainScope, LedgerDraft, LedgerStore};

/// Reasons an apply call is refused.
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("no proposal for transaction {transaction_id} has policy hash {policy_hash}")]
    UnknownPolicyHash {
        transaction_id: String,
        policy_hash: String,
    },

    #[error("submitted allocation does not match policy {policy_hash}")]
    AllocationMismatch { policy_hash: String },

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("storage error: {0}")]
    Storage(#[source] anyhow::Error),
}

/// A client's finalized choice for one transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct ApplyAllocation {
    pub transaction: TransactionRecord,
    pub rule_set: AllocationRuleSet,
    pub policy_hash: String,
    pub allocation: Vec<AllocationBreakdown>,
    /// RPT timestamp; now when absent
    pub timestamp: Option<String>,
}

/// Coordinates evaluation, signing and persistence.
///
/// Collaborators are injected so one process can run several services with
/// different keys or stores.
pub struct AllocationService {
    signer: Arc<RptSigner>,
    store: Arc<dyn LedgerStore>,
    metrics: Arc<MetricsRegistry>,
    scope_mode: ScopeMode,
}

impl AllocationService {
    pub fn new(
        signer: Arc<RptSigner>,
        store: Arc<dyn LedgerStore>,
        metrics: Arc<MetricsRegistry>,
        scope_mode: ScopeMode,
    ) -> Self {
        AllocationService {
            signer,
            store,
            metrics,
            scope_mode,
        }
    }

    pub fn metrics(&self) -> &MetricsRegistry {
        &self.metrics
    }

    pub fn store(&self) -> &dyn LedgerStore {
        self.store.as_ref()
    }

    /// Chain scope used for an organisation's allocations.
    pub fn scope_for(&self, org_id: &str) -> ChainScope {
        self.scope_mode.scope_for(org_id)
    }

    /// Evaluate without side effects.
    pub fn preview(
        &self,
        tx: &TransactionRecord,
        rule_set: &AllocationRuleSet,
        options: EvaluateOptions,
    ) -> PolicyEvaluation {
        let evaluation = evaluate_rule_set(tx, rule_set, options);
        self.metrics.record_evaluation(evaluation.proposals.len());
        evaluation
    }

    /// Verify a submitted allocation against a fresh evaluation, then chain
    /// and record it.
    ///
    /// Nothing is written unless the allocation matches the recomputed
    /// proposal within a cent per line.
    pub async fn apply(&self, request: ApplyAllocation) -> Result<AppendedAllocation, ServiceError> {
        let _timer = TimingGuard::new(&self.metrics);
        let tx = &request.transaction;

        let timestamp = normalise_timestamp(request.timestamp.as_deref())?;

        let proposals = evaluate(tx, &request.rule_set, EvaluateOptions::default());
        self.metrics.record_evaluation(proposals.len());

        let Some(proposal) = proposals
            .into_iter()
            .find(|p| p.policy_hash == request.policy_hash)
        else {
            self.metrics.record_mismatch();
            warn!(
                transaction_id = %tx.id,
                policy_hash = %request.policy_hash,
                "Apply references unknown policy hash"
            );
            return Err(ServiceError::UnknownPolicyHash {
                transaction_id: tx.id.clone(),
                policy_hash: request.policy_hash,
            });
        };

        if !allocations_equal(&proposal.allocation, &request.allocation) {
            self.metrics.record_mismatch();
            warn!(
                transaction_id = %tx.id,
                rule_id = %proposal.rule_id,
                policy_hash = %request.policy_hash,
                "Submitted allocation does not match proposal"
            );
            return Err(ServiceError::AllocationMismatch {
                policy_hash: request.policy_hash,
            });
        }

        let scope = self.scope_for(&tx.org_id);
        let draft = LedgerDraft {
            org_id: tx.org_id.clone(),
            transaction_id: tx.id.clone(),
            rule_id: proposal.rule_id,
            policy_hash: proposal.policy_hash,
            allocation: proposal.allocation,
            timestamp,
        };

        let appended = self
            .store
            .append_allocation(&scope, draft, &self.signer)
            .await
            .map_err(ServiceError::Storage)?;

        self.metrics.record_token_minted();

        info!(
            transaction_id = %appended.entry.transaction_id,
            rule_id = %appended.entry.rule_id,
            scope = %scope,
            hash = %appended.token.hash,
            genesis = appended.token.is_genesis(),
            "Allocation applied"
        );

        Ok(appended)
    }

    /// Check one token; failures are logged and counted, never raised.
    pub fn verify_token(&self, token: &RptToken) -> bool {
        let valid = self.signer.verify_token(token);
        self.metrics.record_verification(valid);
        if !valid {
            warn!(
                bank_line_id = %token.payload.bank_line_id,
                hash = %token.hash,
                "RPT verification failed"
            );
        }
        valid
    }

    /// Walk a stored chain from genesis.
    pub async fn verify_chain(&self, scope: &ChainScope) -> Result<ChainReport, ServiceError> {
        let tokens = self
            .store
            .chain(scope)
            .await
            .map_err(ServiceError::Storage)?;

        let report = verify_chain(&tokens);
        self.metrics.record_verification(report.valid);
        Ok(report)
    }
}
