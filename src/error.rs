use thiserror::Error;

/// Malformed per-call input or configuration.
///
/// Surfaced to the caller as a rejection; never retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("{what} id cannot be empty")]
    EmptyId { what: &'static str },

    #[error("duplicate rule id: {0}")]
    DuplicateRuleId(String),

    #[error("rule {rule} has no allocation targets")]
    NoTargets { rule: String },

    #[error("rule {rule} requires {required} matches but has {available} conditions")]
    MinMatchCount {
        rule: String,
        required: usize,
        available: usize,
    },

    #[error("rule {rule} target {account} needs a ratio or an amount")]
    MissingTargetValue { rule: String, account: String },

    #[error("rule {rule} target {account} ratio {ratio} is outside [0, 1]")]
    RatioOutOfRange {
        rule: String,
        account: String,
        ratio: String,
    },

    #[error("rule {rule} metadata condition on {key} must compare a scalar")]
    NonScalarMetadata { rule: String, key: String },
}
