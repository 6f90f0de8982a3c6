//! Results of structural and referential document validation.

use crate::document::Document;
use serde::{Deserialize, Serialize};

/// Outcome of validating one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    /// False when at least one error was found.
    pub valid: bool,
    /// Problems that make the document unusable as-is.
    pub errors: Vec<String>,
    /// Problems that are reported but tolerated.
    pub warnings: Vec<String>,
}

impl ValidationReport {
    /// An empty, valid report.
    pub fn new() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Record an error; the report becomes invalid.
    pub fn error(&mut self, msg: impl Into<String>) {
        self.valid = false;
        self.errors.push(msg.into());
    }

    /// Record a warning.
    pub fn warn(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }
}

impl Default for ValidationReport {
    fn default() -> Self {
        Self::new()
    }
}

/// Outcome of validate-then-repair.
#[derive(Debug, Clone, PartialEq)]
pub struct RepairOutcome {
    /// The document to use: repaired if repair succeeded, else the original.
    pub document: Document,
    /// Whether `document` differs from the input because of a repair.
    pub repaired: bool,
    /// Final validation of `document`.
    pub report: ValidationReport,
    /// Errors found before any repair was attempted.
    pub original_errors: Vec<String>,
    /// Errors still present after the repair attempt, when it failed.
    pub repair_errors: Vec<String>,
}

impl RepairOutcome {
    /// Whether the returned document is usable without degradation.
    pub fn is_healthy(&self) -> bool {
        self.report.valid
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_invalidates_warning_does_not() {
        let mut report = ValidationReport::new();
        report.warn("odd timestamp");
        assert!(report.valid);
        report.error("missing key");
        assert!(!report.valid);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.warnings.len(), 1);
    }
}
