//! Diagnostics reported by a bundling pass.
//!
//! Diagnostics travel with every [`BuildOutcome`](crate::BuildOutcome) in a
//! cloneable, serializable format so callers can print them, forward them to
//! an overlay, or emit them as JSON.

use serde::{Deserialize, Serialize};

/// A single message produced by the bundler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: DiagnosticSeverity,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<u32>,
}

/// Diagnostic severity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticSeverity {
    Error,
    Warning,
}

impl Diagnostic {
    /// Create an error diagnostic.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            severity: DiagnosticSeverity::Error,
            message: message.into(),
            file: None,
            line: None,
            column: None,
        }
    }

    /// Create a warning diagnostic.
    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            severity: DiagnosticSeverity::Warning,
            ..Self::error(message)
        }
    }

    /// Attach a source location.
    pub fn at(mut self, file: impl Into<String>, line: u32, column: u32) -> Self {
        self.file = Some(file.into());
        self.line = Some(line);
        self.column = Some(column);
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == DiagnosticSeverity::Error
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self.severity {
            DiagnosticSeverity::Error => "error",
            DiagnosticSeverity::Warning => "warning",
        };
        match (&self.file, self.line, self.column) {
            (Some(file), Some(line), Some(column)) => {
                write!(f, "{}: {} ({}:{}:{})", label, self.message, file, line, column)
            }
            (Some(file), _, _) => write!(f, "{}: {} ({})", label, self.message, file),
            _ => write!(f, "{}: {}", label, self.message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_with_location() {
        let diag = Diagnostic::error("Unexpected token").at("src/main.ts", 3, 14);
        assert_eq!(
            diag.to_string(),
            "error: Unexpected token (src/main.ts:3:14)"
        );
    }

    #[test]
    fn test_display_without_location() {
        assert_eq!(
            Diagnostic::warning("unused import").to_string(),
            "warning: unused import"
        );
    }

    #[test]
    fn test_serialization_skips_missing_location() {
        let json = serde_json::to_value(Diagnostic::error("boom")).unwrap();
        assert_eq!(json["severity"], "error");
        assert!(json.get("file").is_none());
        assert!(json.get("line").is_none());
    }

    #[test]
    fn test_is_error() {
        assert!(Diagnostic::error("x").is_error());
        assert!(!Diagnostic::warning("x").is_error());
    }
}
