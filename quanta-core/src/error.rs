//! Structured errors
//!
//! Every fallible operation in the workspace returns [`QuantaError`]. Failures
//! are never collapsed into NaN: a dimension mismatch or an unknown unit stops
//! the single offending operation and is handed back to the caller.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Standard error codes (machine-readable)
pub mod codes {
    pub const PARSE_FAILURE: &str = "PARSE_FAILURE";
    pub const AMBIGUOUS_UNIT: &str = "AMBIGUOUS_UNIT";
    pub const INCOMPATIBLE_DIMENSION: &str = "INCOMPATIBLE_DIMENSION";
    pub const UNKNOWN_UNIT: &str = "UNKNOWN_UNIT";
    pub const EVALUATION_FAILED: &str = "EVALUATION_FAILED";
    pub const RANGE_OVERFLOW: &str = "RANGE_OVERFLOW";
    pub const INTERNAL: &str = "INTERNAL";
    pub const UNKNOWN_PARAMETER: &str = "UNKNOWN_PARAMETER";
    pub const DUPLICATE_PARAMETER: &str = "DUPLICATE_PARAMETER";
    pub const CIRCULAR_REF: &str = "CIRCULAR_REF";
    pub const DEFINITION: &str = "DEFINITION";
    pub const CONFIG: &str = "CONFIG";
}

/// Severity level of an error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// The offending operation failed, the rest of the pass can continue
    Error,
    /// The registry or configuration is unusable
    Fatal,
}

/// Error type shared by every Quanta crate
#[derive(Debug, Clone, PartialEq, Error)]
pub enum QuantaError {
    /// Malformed formula or unit expression
    #[error("Parse error: {0}")]
    Parse(String),

    /// More than one unit matched a case-insensitive or plural-stripped lookup
    #[error("Ambiguous unit '{token}': matches {}", .candidates.join(", "))]
    AmbiguousUnitMatch { token: String, candidates: Vec<String> },

    /// Arithmetic or conversion across unequal dimensions
    #[error("Incompatible dimensions: {left} vs {right}")]
    IncompatibleDimension { left: String, right: String },

    /// Registry miss
    #[error("Unknown unit: {0}")]
    UnknownUnit(String),

    /// A formula could not be fully reduced
    #[error("Evaluation failed: {0}")]
    EvaluationFailed(String),

    /// A dimension exponent left the representable range
    #[error("Dimension exponent {exponent} on {axis} is outside [-16, 15]")]
    RangeOverflow { axis: &'static str, exponent: i32 },

    /// Registry state is inconsistent (e.g. conversion step bound exceeded)
    #[error("Internal consistency error: {0}")]
    InternalConsistency(String),

    #[error("Unknown parameter: {0}")]
    UnknownParameter(String),

    #[error("Parameter id already registered: {0}")]
    DuplicateParameter(String),

    #[error("Circular reference: {}", .0.join(" -> "))]
    CircularReference(Vec<String>),

    /// Invalid definition source document
    #[error("Definition error: {0}")]
    Definition(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl QuantaError {
    /// Build a parse error
    pub fn parse(details: impl Into<String>) -> Self {
        Self::Parse(details.into())
    }

    /// Build an evaluation failure
    pub fn evaluation(details: impl Into<String>) -> Self {
        Self::EvaluationFailed(details.into())
    }

    /// Build a dimension mismatch from anything displayable
    pub fn incompatible(left: impl ToString, right: impl ToString) -> Self {
        Self::IncompatibleDimension {
            left: left.to_string(),
            right: right.to_string(),
        }
    }

    /// Machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            Self::Parse(_) => codes::PARSE_FAILURE,
            Self::AmbiguousUnitMatch { .. } => codes::AMBIGUOUS_UNIT,
            Self::IncompatibleDimension { .. } => codes::INCOMPATIBLE_DIMENSION,
            Self::UnknownUnit(_) => codes::UNKNOWN_UNIT,
            Self::EvaluationFailed(_) => codes::EVALUATION_FAILED,
            Self::RangeOverflow { .. } => codes::RANGE_OVERFLOW,
            Self::InternalConsistency(_) => codes::INTERNAL,
            Self::UnknownParameter(_) => codes::UNKNOWN_PARAMETER,
            Self::DuplicateParameter(_) => codes::DUPLICATE_PARAMETER,
            Self::CircularReference(_) => codes::CIRCULAR_REF,
            Self::Definition(_) => codes::DEFINITION,
            Self::Config(_) => codes::CONFIG,
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            Self::InternalConsistency(_) | Self::Definition(_) | Self::Config(_) => Severity::Fatal,
            _ => Severity::Error,
        }
    }

    /// Wrap the error as an evaluation failure, keeping the original message.
    ///
    /// Used when a reference resolver fails: the formula that asked for the
    /// value could not be reduced.
    pub fn into_evaluation_failure(self, context: &str) -> Self {
        match self {
            Self::EvaluationFailed(msg) => Self::EvaluationFailed(format!("{}: {}", context, msg)),
            other => Self::EvaluationFailed(format!("{}: {}", context, other)),
        }
    }
}

/// Result alias used across the workspace
pub type Result<T> = std::result::Result<T, QuantaError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes() {
        assert_eq!(QuantaError::parse("x").code(), codes::PARSE_FAILURE);
        assert_eq!(QuantaError::UnknownUnit("furlong".into()).code(), codes::UNKNOWN_UNIT);
        assert_eq!(
            QuantaError::incompatible("M", "T").code(),
            codes::INCOMPATIBLE_DIMENSION
        );
    }

    #[test]
    fn test_display() {
        let err = QuantaError::AmbiguousUnitMatch {
            token: "GAL".into(),
            candidates: vec!["gal".into(), "Gal".into()],
        };
        assert_eq!(err.to_string(), "Ambiguous unit 'GAL': matches gal, Gal");

        let err = QuantaError::CircularReference(vec!["a".into(), "b".into(), "a".into()]);
        assert_eq!(err.to_string(), "Circular reference: a -> b -> a");
    }

    #[test]
    fn test_severity() {
        assert_eq!(QuantaError::InternalConsistency("loop".into()).severity(), Severity::Fatal);
        assert_eq!(QuantaError::evaluation("x").severity(), Severity::Error);
    }

    #[test]
    fn test_into_evaluation_failure() {
        let err = QuantaError::UnknownParameter("p1".into()).into_evaluation_failure("[p1]");
        assert_eq!(err.code(), codes::EVALUATION_FAILED);
        assert!(err.to_string().contains("p1"));
    }
}
