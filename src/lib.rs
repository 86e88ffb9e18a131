pub mod canonical;
pub mod config;
pub mod domain;
pub mod error;
pub mod observability;
pub mod policy;
pub mod rpt;
pub mod rules;
pub mod service;
pub mod storage;
pub mod waterfall;

pub use config::Config;
pub use domain::{AllocationProposal, AllocationRuleSet, PolicyEvaluation, TransactionRecord};
pub use error::ValidationError;
pub use rpt::{RptSigner, RptToken};
pub use service::{AllocationService, ApplyAllocation, ServiceError};
pub use waterfall::{EngineRunResult, WaterfallEngine};
