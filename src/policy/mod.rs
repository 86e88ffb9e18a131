pub mod loader;

pub use loader::{load_policies, load_rule_set, validate_rule_set, PolicyError};
