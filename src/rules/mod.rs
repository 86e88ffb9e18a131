pub mod defaults;
pub mod evaluator;
pub mod hash;
pub mod matcher;

pub use defaults::{resolve_rule_set_for_org, DEFAULT_RULE_VERSION};
pub use evaluator::{derive_allocation, evaluate, evaluate_rule_set, EvaluateOptions};
pub use hash::{allocations_equal, canonicalize_allocation, compute_policy_hash};
pub use matcher::ConditionMatcher;
