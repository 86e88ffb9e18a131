//! Weighted waterfall distribution of pooled contributions.
//!
//! Pipeline: ingest, allocate (round fold), create requests, gate, remit and
//! audit. [`WaterfallEngine::run`] drives all stages.

pub mod audit;
pub mod engine;
pub mod gate;
pub mod round;
pub mod stages;

pub use audit::AuditInput;
pub use engine::{AllocationOutcome, ConstructionError, WaterfallEngine};
pub use gate::GateVerdict;
pub use round::{RoundOutcome, RoundState};
pub use stages::{
    Allocation, AuditIssue, AuditReport, EngineRunResult, EngineTotals, GateContext, GateDecision,
    GateResult, IngestOutcome, RejectedContribution, RemittanceInstruction, RemittanceStatus,
    RequestToPay,
};
