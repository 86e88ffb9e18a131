use rust_decimal::Decimal;
use std::collections::HashMap;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::contribution::clamp_risk;
use crate::domain::money::{
    decimal_from_f64, round_internal, saturating_sum, DEFAULT_TOLERANCE, MAX_POOL,
};
use crate::domain::{Contribution, ContributionInput, PolicyDefinition, ResolvedPolicy};
use crate::waterfall::audit::{self, AuditInput};
use crate::waterfall::gate::{build_context, evaluate_gate, GateVerdict};
use crate::waterfall::round::distribute;
use crate::waterfall::stages::{
    Allocation, AuditReport, EngineRunResult, GateDecision, GateResult, IngestOutcome,
    RejectedContribution, RemittanceInstruction, RemittanceStatus, RequestToPay,
};

/// Invalid policy configuration. Fatal at startup.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConstructionError {
    #[error("at least one policy definition is required")]
    NoPolicies,

    #[error("policy id is required")]
    MissingId,

    #[error("duplicate policy id: {0}")]
    DuplicateId(String),

    #[error("policy weight must be positive for {id} (got {weight})")]
    NonPositiveWeight { id: String, weight: Decimal },

    #[error("policy floor {floor} exceeds cap {cap} for {id}")]
    FloorExceedsCap {
        id: String,
        floor: Decimal,
        cap: Decimal,
    },

    #[error("at least one policy must have capacity to receive allocations")]
    NoCapacity,

    #[error("tolerance must be positive (got {0})")]
    InvalidTolerance(Decimal),
}

/// Result of the round loop.
#[derive(Debug, Clone, PartialEq)]
pub struct AllocationOutcome {
    pub allocations: Vec<Allocation>,
    pub leftover: Decimal,
}

/// Weighted waterfall over a fixed set of validated policies.
///
/// The engine holds no mutable state; every operation is a pure function of
/// its arguments (apart from fresh UUIDs), so one instance can serve
/// concurrent runs.
#[derive(Debug, Clone)]
pub struct WaterfallEngine {
    policies: Vec<ResolvedPolicy>,
    index: HashMap<String, usize>,
    tolerance: Decimal,
}

impl WaterfallEngine {
    /// Build an engine with the default 1e-6 tolerance.
    pub fn new(definitions: &[PolicyDefinition]) -> Result<Self, ConstructionError> {
        Self::with_tolerance(definitions, DEFAULT_TOLERANCE)
    }

    pub fn with_tolerance(
        definitions: &[PolicyDefinition],
        tolerance: Decimal,
    ) -> Result<Self, ConstructionError> {
        if tolerance <= Decimal::ZERO {
            return Err(ConstructionError::InvalidTolerance(tolerance));
        }
        if definitions.is_empty() {
            return Err(ConstructionError::NoPolicies);
        }

        let mut policies = Vec::with_capacity(definitions.len());
        let mut index = HashMap::with_capacity(definitions.len());

        for definition in definitions {
            let policy = resolve(definition, tolerance)?;
            if index.insert(policy.id.clone(), policies.len()).is_some() {
                return Err(ConstructionError::DuplicateId(policy.id));
            }
            policies.push(policy);
        }

        if !policies.iter().any(|p| p.has_capacity(tolerance)) {
            return Err(ConstructionError::NoCapacity);
        }

        info!(
            policies = policies.len(),
            tolerance = %tolerance,
            "Waterfall engine constructed"
        );

        Ok(WaterfallEngine {
            policies,
            index,
            tolerance,
        })
    }

    pub fn policies(&self) -> &[ResolvedPolicy] {
        &self.policies
    }

    pub fn policy(&self, id: &str) -> Option<&ResolvedPolicy> {
        self.index.get(id).map(|&i| &self.policies[i])
    }

    pub fn tolerance(&self) -> Decimal {
        self.tolerance
    }

    /// Normalise raw inputs.
    ///
    /// Non-finite amounts and amounts at or below tolerance are dropped.
    /// Amounts that would take the pooled total past [`MAX_POOL`] are
    /// refused and reported so the run's audit can flag them.
    pub fn ingest(&self, inputs: &[ContributionInput]) -> IngestOutcome {
        let mut outcome = IngestOutcome::default();
        let mut pooled = Decimal::ZERO;

        for input in inputs {
            if !input.amount.is_finite() || input.amount <= 0.0 {
                debug!(id = ?input.id, amount = input.amount, "Dropping contribution");
                continue;
            }

            let amount = match decimal_from_f64(input.amount) {
                Some(amount) if amount <= self.tolerance => {
                    debug!(id = ?input.id, amount = input.amount, "Dropping contribution");
                    continue;
                }
                Some(amount) => round_internal(amount),
                None => {
                    outcome.rejected.push(refuse(input));
                    continue;
                }
            };

            match pooled.checked_add(amount).filter(|total| *total <= MAX_POOL) {
                Some(total) => pooled = total,
                None => {
                    outcome.rejected.push(refuse(input));
                    continue;
                }
            }

            outcome.contributions.push(Contribution {
                id: input
                    .id
                    .clone()
                    .unwrap_or_else(|| Uuid::new_v4().to_string()),
                amount,
                risk_score: clamp_risk(input.risk_score),
                metadata: input.metadata.clone(),
            });
        }

        outcome
    }

    /// Split the pooled contributions across the policies.
    pub fn allocate(&self, contributions: &[Contribution]) -> AllocationOutcome {
        let total = saturating_sum(contributions.iter().map(|c| c.amount));
        if total <= self.tolerance {
            return AllocationOutcome {
                allocations: Vec::new(),
                leftover: Decimal::ZERO,
            };
        }

        let end = distribute(&self.policies, total, self.tolerance);

        let allocations = end
            .slots
            .iter()
            .zip(&self.policies)
            .filter(|(slot, _)| slot.amount > self.tolerance)
            .map(|(slot, policy)| Allocation {
                policy_id: policy.id.clone(),
                amount: round_internal(slot.amount),
                share: round_internal(slot.amount / total),
            })
            .collect();

        AllocationOutcome {
            allocations,
            leftover: round_internal(end.remaining.max(Decimal::ZERO)),
        }
    }

    /// Attach a fresh request id to each allocation.
    pub fn create_requests(&self, allocations: &[Allocation]) -> Vec<RequestToPay> {
        allocations
            .iter()
            .map(|allocation| RequestToPay {
                allocation: allocation.clone(),
                request_id: Uuid::new_v4(),
            })
            .collect()
    }

    /// Apply each request's policy gate.
    ///
    /// A request naming a policy this engine does not know is rejected.
    pub fn gate(
        &self,
        requests: &[RequestToPay],
        contributions: &[Contribution],
        unallocated: Decimal,
    ) -> GateResult {
        let context = build_context(contributions, unallocated);
        let mut approved = Vec::new();
        let mut rejected = Vec::new();
        let mut rejected_total = Decimal::ZERO;

        for request in requests {
            let verdict = match self.policy(request.policy_id()) {
                Some(policy) => evaluate_gate(policy, &context, self.tolerance),
                None => {
                    warn!(policy_id = %request.policy_id(), "Request references unknown policy");
                    GateVerdict::Rejected(format!("unknown policy {}", request.policy_id()))
                }
            };

            match verdict {
                GateVerdict::Approved => approved.push(GateDecision {
                    request: request.clone(),
                    approved: true,
                    reason: None,
                }),
                GateVerdict::Rejected(reason) => {
                    debug!(
                        policy_id = %request.policy_id(),
                        amount = %request.amount(),
                        reason = %reason,
                        "Gate rejected request"
                    );
                    rejected_total += request.amount();
                    rejected.push(GateDecision {
                        request: request.clone(),
                        approved: false,
                        reason: Some(reason),
                    });
                }
            }
        }

        GateResult {
            approved,
            rejected,
            rejected_total: round_internal(rejected_total),
            context,
        }
    }

    /// Project approved decisions onto ready remittances.
    pub fn remit(&self, approved: &[GateDecision]) -> Vec<RemittanceInstruction> {
        approved
            .iter()
            .map(|decision| RemittanceInstruction {
                policy_id: decision.request.policy_id().to_string(),
                request_id: decision.request.request_id,
                amount: round_internal(decision.request.amount()),
                status: RemittanceStatus::Ready,
            })
            .collect()
    }

    /// Reconcile a run against this engine's policies.
    pub fn audit(&self, input: &AuditInput<'_>) -> AuditReport {
        audit::audit(input, self.tolerance, |id| self.policy(id))
    }

    /// ingest, allocate, create requests, gate, remit and audit.
    pub fn run(&self, inputs: &[ContributionInput]) -> EngineRunResult {
        let IngestOutcome {
            contributions,
            rejected,
        } = self.ingest(inputs);
        let AllocationOutcome {
            allocations,
            leftover,
        } = self.allocate(&contributions);
        let requests = self.create_requests(&allocations);
        let gate = self.gate(&requests, &contributions, leftover);
        let remittances = self.remit(&gate.approved);

        let input = AuditInput {
            contributions: &contributions,
            rejected: &rejected,
            allocations: &allocations,
            remittances: &remittances,
            unallocated: leftover,
            gate: &gate,
        };
        let totals = audit::totals(&input);
        let audit = self.audit(&input);

        if audit.ok {
            info!(
                contributions = contributions.len(),
                input = %totals.input,
                remitted = %totals.remitted,
                leftover = %totals.leftover,
                rejected = gate.rejected.len(),
                "Waterfall run complete"
            );
        } else {
            warn!(
                issues = audit.issues.len(),
                first = %audit.issues[0],
                "Waterfall audit failed"
            );
        }

        EngineRunResult {
            contributions,
            rejected_contributions: rejected,
            allocations,
            requests,
            gate,
            remittances,
            totals,
            audit,
        }
    }
}

/// Log and record a contribution the pool cannot take.
fn refuse(input: &ContributionInput) -> RejectedContribution {
    warn!(
        id = ?input.id,
        amount = input.amount,
        limit = %MAX_POOL,
        "Contribution exceeds pool limit"
    );
    RejectedContribution {
        id: input.id.clone(),
        amount: input.amount,
    }
}

fn resolve(
    definition: &PolicyDefinition,
    tolerance: Decimal,
) -> Result<ResolvedPolicy, ConstructionError> {
    if definition.id.trim().is_empty() {
        return Err(ConstructionError::MissingId);
    }
    if definition.weight <= Decimal::ZERO {
        return Err(ConstructionError::NonPositiveWeight {
            id: definition.id.clone(),
            weight: definition.weight,
        });
    }

    let cap = definition.cap.map(|c| c.max(Decimal::ZERO));
    let floor = definition.floor.unwrap_or(Decimal::ZERO).max(Decimal::ZERO);

    if let Some(cap) = cap {
        if floor - cap > tolerance {
            return Err(ConstructionError::FloorExceedsCap {
                id: definition.id.clone(),
                floor,
                cap,
            });
        }
    }

    Ok(ResolvedPolicy {
        id: definition.id.clone(),
        weight: definition.weight,
        cap,
        floor,
        gate: definition.gate.clone(),
    })
}
