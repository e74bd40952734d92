// ⚠️ Engine Errors - every failure names the offending field or row

use thiserror::Error;

pub type Result<T> = std::result::Result<T, LinkError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LinkError {
    /// Field mapping cannot drive a run (no identifier, nothing to compare, name clash)
    #[error("Invalid field mapping: {reason}")]
    InvalidFieldMapping { reason: String },

    #[error("Duplicate identifier '{id}' at row {duplicate_row} (first seen at row {first_row})")]
    DuplicateIdentifier {
        id: String,
        first_row: usize,
        duplicate_row: usize,
    },

    #[error("Row {row} has values but no identifier")]
    MissingIdentifier { row: usize },

    #[error("Unknown field: {0}")]
    UnknownField(String),
}

impl LinkError {
    pub(crate) fn mapping(reason: impl Into<String>) -> Self {
        LinkError::InvalidFieldMapping {
            reason: reason.into(),
        }
    }

    /// Configuration problems are the caller's fault; everything else is data quality.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            LinkError::InvalidFieldMapping { .. } | LinkError::UnknownField(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_message_names_both_rows() {
        let err = LinkError::DuplicateIdentifier {
            id: "C-7".to_string(),
            first_row: 2,
            duplicate_row: 9,
        };

        let msg = err.to_string();
        assert!(msg.contains("C-7"));
        assert!(msg.contains("row 9"));
        assert!(msg.contains("row 2"));
        assert!(!err.is_configuration());
    }

    #[test]
    fn test_mapping_errors_are_configuration() {
        assert!(LinkError::mapping("empty").is_configuration());
        assert!(LinkError::UnknownField("fax".into()).is_configuration());
        assert!(!LinkError::MissingIdentifier { row: 3 }.is_configuration());
    }
}
