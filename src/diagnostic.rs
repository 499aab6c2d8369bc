//! Diagnostics returned from every protocol operation.

use std::fmt;

use crate::error::ProviderError;
use crate::generated;
use crate::path::AttributePath;

/// Diagnostic severity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticSeverity {
    /// An error that prevents the operation from completing.
    Error,
    /// A warning that doesn't prevent the operation but should be addressed.
    Warning,
}

/// A diagnostic message from the provider.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    /// The severity of the diagnostic.
    pub severity: DiagnosticSeverity,
    /// A short summary of the issue.
    pub summary: String,
    /// A detailed description of the issue.
    pub detail: Option<String>,
    /// The attribute path where the issue occurred.
    pub attribute: Option<AttributePath>,
}

impl Diagnostic {
    /// Create an error diagnostic.
    pub fn error(summary: impl Into<String>) -> Self {
        Self {
            severity: DiagnosticSeverity::Error,
            summary: summary.into(),
            detail: None,
            attribute: None,
        }
    }

    /// Create a warning diagnostic.
    pub fn warning(summary: impl Into<String>) -> Self {
        Self {
            severity: DiagnosticSeverity::Warning,
            summary: summary.into(),
            detail: None,
            attribute: None,
        }
    }

    /// Create an error diagnostic whose detail is the text of `err`.
    pub fn from_error(summary: impl Into<String>, err: &ProviderError) -> Self {
        Self::error(summary).with_detail(err.to_string())
    }

    /// Add detail to this diagnostic.
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Set the attribute path for this diagnostic.
    pub fn with_attribute(mut self, attribute: AttributePath) -> Self {
        self.attribute = Some(attribute);
        self
    }

    /// Returns true for error diagnostics.
    pub fn is_error(&self) -> bool {
        self.severity == DiagnosticSeverity::Error
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let severity = match self.severity {
            DiagnosticSeverity::Error => "error",
            DiagnosticSeverity::Warning => "warning",
        };
        write!(f, "{}: {}", severity, self.summary)?;
        if let Some(attribute) = &self.attribute {
            write!(f, " (at {})", attribute)?;
        }
        if let Some(detail) = &self.detail {
            write!(f, ": {}", detail)?;
        }
        Ok(())
    }
}

/// Returns true if any diagnostic is an error.
pub fn has_errors(diagnostics: &[Diagnostic]) -> bool {
    diagnostics.iter().any(Diagnostic::is_error)
}

impl From<&Diagnostic> for generated::Diagnostic {
    fn from(d: &Diagnostic) -> Self {
        generated::Diagnostic {
            severity: match d.severity {
                DiagnosticSeverity::Error => generated::diagnostic::Severity::Error as i32,
                DiagnosticSeverity::Warning => generated::diagnostic::Severity::Warning as i32,
            },
            summary: d.summary.clone(),
            detail: d.detail.clone().unwrap_or_default(),
            attribute: d.attribute.as_ref().map(generated::AttributePath::from),
        }
    }
}

/// Severities other than warning, including unset, are read as errors.
impl From<generated::Diagnostic> for Diagnostic {
    fn from(d: generated::Diagnostic) -> Self {
        let severity = match generated::diagnostic::Severity::try_from(d.severity) {
            Ok(generated::diagnostic::Severity::Warning) => DiagnosticSeverity::Warning,
            _ => DiagnosticSeverity::Error,
        };
        Diagnostic {
            severity,
            summary: d.summary,
            detail: (!d.detail.is_empty()).then_some(d.detail),
            attribute: d
                .attribute
                .map(AttributePath::from)
                .filter(|path| !path.is_root()),
        }
    }
}

/// Convert diagnostics to their wire form.
pub fn diagnostics_to_proto(diagnostics: &[Diagnostic]) -> Vec<generated::Diagnostic> {
    diagnostics.iter().map(generated::Diagnostic::from).collect()
}

/// Convert wire diagnostics back into [`Diagnostic`]s.
pub fn diagnostics_from_proto(diagnostics: Vec<generated::Diagnostic>) -> Vec<Diagnostic> {
    diagnostics.into_iter().map(Diagnostic::from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnostic() {
        let path = AttributePath::root().with_attribute_name("count");
        let err = Diagnostic::error("Invalid configuration")
            .with_detail("The value must be positive")
            .with_attribute(path.clone());

        assert_eq!(err.severity, DiagnosticSeverity::Error);
        assert_eq!(err.summary, "Invalid configuration");
        assert_eq!(err.detail, Some("The value must be positive".to_string()));
        assert_eq!(err.attribute, Some(path));
        assert!(err.is_error());
    }

    #[test]
    fn test_has_errors() {
        assert!(!has_errors(&[Diagnostic::warning("careful")]));
        assert!(has_errors(&[
            Diagnostic::warning("careful"),
            Diagnostic::error("broken")
        ]));
        assert!(!has_errors(&[]));
    }

    #[test]
    fn test_from_error() {
        let err = ProviderError::Decode("no schema".to_string());
        let d = Diagnostic::from_error("Error Decoding Config", &err);
        assert!(d.is_error());
        assert_eq!(d.detail.as_deref(), Some("Decode error: no schema"));
    }

    #[test]
    fn test_wire_round_trip() {
        let diagnostics = vec![
            Diagnostic::error("bad")
                .with_detail("very bad")
                .with_attribute(AttributePath::root().with_attribute_name("name")),
            Diagnostic::warning("meh"),
        ];
        let wire = diagnostics_to_proto(&diagnostics);
        assert_eq!(wire[0].severity, generated::diagnostic::Severity::Error as i32);
        assert_eq!(wire[1].detail, "");
        assert_eq!(diagnostics_from_proto(wire), diagnostics);
    }

    #[test]
    fn test_display() {
        let d = Diagnostic::warning("Deprecated")
            .with_attribute(AttributePath::root().with_attribute_name("size"));
        assert_eq!(d.to_string(), "warning: Deprecated (at size)");
    }
}
