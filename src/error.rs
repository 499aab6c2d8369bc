//! Error types for the Hemmer provider testkit.
//!
//! These errors never cross the wire directly. The dispatcher converts every
//! one of them into a [`Diagnostic`](crate::diagnostic::Diagnostic) whose
//! detail is the error text.

use thiserror::Error;

/// Errors raised by the value tree, the schema index and the wire codec.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Raw data does not match the shape of the declared type.
    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    /// A wire payload could not be unmarshaled against its schema.
    #[error("Decode error: {0}")]
    Decode(String),

    /// A value could not be marshaled against its schema.
    #[error("Encode error: {0}")]
    Encode(String),

    /// An attribute path step does not fit the value it is applied to.
    #[error("Invalid attribute path: {0}")]
    InvalidPath(String),

    /// A wire type descriptor could not be parsed.
    #[error("Invalid type: {0}")]
    InvalidType(String),

    /// A JSON serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ProviderError {
    /// Get the error message as a string.
    ///
    /// Returns a reference to the error message for any variant.
    pub fn message(&self) -> &str {
        match self {
            Self::TypeMismatch(msg) => msg,
            Self::Decode(msg) => msg,
            Self::Encode(msg) => msg,
            Self::InvalidPath(msg) => msg,
            Self::InvalidType(msg) => msg,
            Self::Serialization(_err) => "serialization error (see Debug output)",
        }
    }

    pub(crate) fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    pub(crate) fn encode(msg: impl Into<String>) -> Self {
        Self::Encode(msg.into())
    }

    pub(crate) fn mismatch(msg: impl Into<String>) -> Self {
        Self::TypeMismatch(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ProviderError::TypeMismatch("expected string, got bool".to_string());
        assert_eq!(format!("{}", err), "Type mismatch: expected string, got bool");

        let err = ProviderError::Decode("missing schema".to_string());
        assert_eq!(format!("{}", err), "Decode error: missing schema");

        let err = ProviderError::InvalidPath("rule[0]".to_string());
        assert_eq!(format!("{}", err), "Invalid attribute path: rule[0]");
    }

    #[test]
    fn test_message_method() {
        let err = ProviderError::Encode("value is not a list".to_string());
        assert_eq!(err.message(), "value is not a list");

        let err = ProviderError::InvalidType("unknown primitive \"int\"".to_string());
        assert_eq!(err.message(), "unknown primitive \"int\"");
    }

    #[test]
    fn test_serialization_from_serde() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: ProviderError = json_err.into();
        assert!(matches!(err, ProviderError::Serialization(_)));
        assert!(format!("{}", err).starts_with("Serialization error:"));
    }
}
