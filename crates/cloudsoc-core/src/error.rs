use thiserror::Error;

use crate::timestamp::TimestampError;

/// A category cannot be collected because its configuration is unusable.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid first fetch expression {expr:?}: {reason}")]
    FirstFetch { expr: String, reason: String },

    #[error("category {category} has no usable lower bound: {reason}")]
    NoLowerBound { category: String, reason: String },

    #[error("invalid category definition: {0}")]
    Category(String),

    #[error(transparent)]
    Timestamp(#[from] TimestampError),
}
