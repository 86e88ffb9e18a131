use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crate::waterfall::EngineRunResult;

/// Metrics registry for the application.
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    /// Rule set evaluations
    pub evaluations_total: AtomicU64,
    /// Proposals produced across all evaluations
    pub proposals_total: AtomicU64,

    /// Waterfall runs and their outcomes
    pub engine_runs_total: AtomicU64,
    pub audit_failures_total: AtomicU64,
    pub gate_rejections_total: AtomicU64,

    /// RPT activity
    pub tokens_minted_total: AtomicU64,
    pub verifications_total: AtomicU64,
    pub verification_failures_total: AtomicU64,

    /// Submitted allocations that did not match a recomputed proposal
    pub mismatches_total: AtomicU64,

    /// Apply latency buckets
    pub latency_under_1ms: AtomicU64,
    pub latency_1_5ms: AtomicU64,
    pub latency_5_10ms: AtomicU64,
    pub latency_10_50ms: AtomicU64,
    pub latency_50_100ms: AtomicU64,
    pub latency_over_100ms: AtomicU64,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        MetricsRegistry::default()
    }

    /// Record one evaluation and the number of proposals it produced.
    pub fn record_evaluation(&self, proposals: usize) {
        self.evaluations_total.fetch_add(1, Ordering::Relaxed);
        self.proposals_total
            .fetch_add(proposals as u64, Ordering::Relaxed);
    }

    /// Record a completed waterfall run.
    pub fn record_engine_run(&self, result: &EngineRunResult) {
        self.engine_runs_total.fetch_add(1, Ordering::Relaxed);
        if !result.audit.ok {
            self.audit_failures_total.fetch_add(1, Ordering::Relaxed);
        }
        self.gate_rejections_total
            .fetch_add(result.gate.rejected.len() as u64, Ordering::Relaxed);
    }

    pub fn record_token_minted(&self) {
        self.tokens_minted_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a token verification.
    pub fn record_verification(&self, valid: bool) {
        self.verifications_total.fetch_add(1, Ordering::Relaxed);
        if !valid {
            self.verification_failures_total
                .fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_mismatch(&self) {
        self.mismatches_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Record apply latency.
    pub fn record_latency(&self, start: Instant) {
        let micros = start.elapsed().as_micros() as u64;

        if micros < 1000 {
            self.latency_under_1ms.fetch_add(1, Ordering::Relaxed);
        } else if micros < 5000 {
            self.latency_1_5ms.fetch_add(1, Ordering::Relaxed);
        } else if micros < 10000 {
            self.latency_5_10ms.fetch_add(1, Ordering::Relaxed);
        } else if micros < 50000 {
            self.latency_10_50ms.fetch_add(1, Ordering::Relaxed);
        } else if micros < 100000 {
            self.latency_50_100ms.fetch_add(1, Ordering::Relaxed);
        } else {
            self.latency_over_100ms.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Export metrics in Prometheus format.
    pub fn to_prometheus(&self) -> String {
        format!(
            r#"# HELP allocr_evaluations_total Rule set evaluations
# TYPE allocr_evaluations_total counter
allocr_evaluations_total {}

# HELP allocr_proposals_total Allocation proposals produced
# TYPE allocr_proposals_total counter
allocr_proposals_total {}

# HELP allocr_engine_runs_total Waterfall engine runs
# TYPE allocr_engine_runs_total counter
allocr_engine_runs_total {}

# HELP allocr_audit_failures_total Waterfall runs whose audit failed
# TYPE allocr_audit_failures_total counter
allocr_audit_failures_total {}

# HELP allocr_gate_rejections_total Requests rejected by a policy gate
# TYPE allocr_gate_rejections_total counter
allocr_gate_rejections_total {}

# HELP allocr_tokens_minted_total RPT tokens minted
# TYPE allocr_tokens_minted_total counter
allocr_tokens_minted_total {}

# HELP allocr_verifications RPT token verifications by outcome
# TYPE allocr_verifications counter
allocr_verifications{{outcome="total"}} {}
allocr_verifications{{outcome="failed"}} {}

# HELP allocr_mismatches_total Submitted allocations rejected as mismatched
# TYPE allocr_mismatches_total counter
allocr_mismatches_total {}

# HELP allocr_apply_latency_bucket Apply latency histogram
# TYPE allocr_apply_latency_bucket counter
allocr_apply_latency_bucket{{le="0.001"}} {}
allocr_apply_latency_bucket{{le="0.005"}} {}
allocr_apply_latency_bucket{{le="0.01"}} {}
allocr_apply_latency_bucket{{le="0.05"}} {}
allocr_apply_latency_bucket{{le="0.1"}} {}
allocr_apply_latency_bucket{{le="+Inf"}} {}
"#,
            self.evaluations_total.load(Ordering::Relaxed),
            self.proposals_total.load(Ordering::Relaxed),
            self.engine_runs_total.load(Ordering::Relaxed),
            self.audit_failures_total.load(Ordering::Relaxed),
            self.gate_rejections_total.load(Ordering::Relaxed),
            self.tokens_minted_total.load(Ordering::Relaxed),
            self.verifications_total.load(Ordering::Relaxed),
            self.verification_failures_total.load(Ordering::Relaxed),
            self.mismatches_total.load(Ordering::Relaxed),
            self.latency_under_1ms.load(Ordering::Relaxed),
            self.latency_1_5ms.load(Ordering::Relaxed),
            self.latency_5_10ms.load(Ordering::Relaxed),
            self.latency_10_50ms.load(Ordering::Relaxed),
            self.latency_50_100ms.load(Ordering::Relaxed),
            self.latency_over_100ms.load(Ordering::Relaxed),
        )
    }
}

/// Records elapsed time into the latency buckets on drop.
pub struct TimingGuard<'a> {
    registry: &'a MetricsRegistry,
    start: Instant,
}

impl<'a> TimingGuard<'a> {
    pub fn new(registry: &'a MetricsRegistry) -> Self {
        TimingGuard {
            registry,
            start: Instant::now(),
        }
    }
}

impl<'a> Drop for TimingGuard<'a> {
    fn drop(&mut self) {
        self.registry.record_latency(self.start);
    }
}
