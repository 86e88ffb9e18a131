pub mod allocation;
pub mod contribution;
pub mod money;
pub mod policy;
pub mod rule;
pub mod transaction;

pub use allocation::{AllocationBreakdown, AllocationProposal, PolicyEvaluation, RuleSetRef};
pub use contribution::{Contribution, ContributionInput};
pub use policy::{GateRule, PolicyDefinition, ResolvedPolicy};
pub use rule::{
    AllocationCondition, AllocationRule, AllocationRuleSet, AllocationTarget, AmountCondition,
    AmountOperator, MetadataCondition, MetadataOperator, TextCondition, TextField, TextOperator,
};
pub use transaction::TransactionRecord;
