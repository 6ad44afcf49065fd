//! Errors raised while turning a JSON search into SQL.
//!
//! Only caller-contract violations are errors. Incomplete filters (unknown
//! attributes, missing values) are absorbed by the compiler and never show up
//! here.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    /// A required `class` / `property_name` is missing or blank.
    #[error("malformed identifier for `{field}`: {reason}")]
    MalformedIdentifier { field: &'static str, reason: String },

    /// The `type` key names a node kind the compiler does not know.
    #[error("unsupported filter type `{0}`")]
    UnsupportedType(String),

    /// A `parent_level` walks above the root query.
    #[error("parent level {requested} is out of range (query depth is {depth})")]
    LevelOutOfRange { requested: usize, depth: usize },

    /// The search document is not valid JSON for the filter grammar.
    #[error("invalid search document: {0}")]
    InvalidJson(String),
}

impl CompileError {
    pub(crate) fn malformed(field: &'static str, reason: impl Into<String>) -> Self {
        Self::MalformedIdentifier {
            field,
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for CompileError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidJson(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CompileError::malformed("class", "value is blank");
        assert_eq!(
            err.to_string(),
            "malformed identifier for `class`: value is blank"
        );

        let err = CompileError::LevelOutOfRange {
            requested: 3,
            depth: 1,
        };
        assert!(err.to_string().contains("parent level 3"));
    }

    #[test]
    fn test_from_json_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: CompileError = json_err.into();
        assert!(matches!(err, CompileError::InvalidJson(_)));
    }
}
