use serde::Serialize;
use thiserror::Error;

/// A single field-level validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationIssue {
    pub field: &'static str,
    pub message: String,
    pub constraint: &'static str,
}

impl ValidationIssue {
    pub fn new(field: &'static str, message: impl Into<String>, constraint: &'static str) -> Self {
        Self {
            field,
            message: message.into(),
            constraint,
        }
    }
}

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("domain entity `{entity}` not found")]
    NotFound { entity: &'static str },
    #[error("domain validation failed on {} field(s)", issues.len())]
    Validation { issues: Vec<ValidationIssue> },
    #[error("domain invariant violated: {message}")]
    Invariant { message: String },
}

impl DomainError {
    pub fn not_found(entity: &'static str) -> Self {
        Self::NotFound { entity }
    }

    pub fn validation(issues: Vec<ValidationIssue>) -> Self {
        Self::Validation { issues }
    }

    pub fn invariant(message: impl Into<String>) -> Self {
        Self::Invariant {
            message: message.into(),
        }
    }
}

/// Accumulates validation issues so a request reports every failing
/// field at once rather than the first.
#[derive(Debug, Default)]
pub struct ValidationReport {
    issues: Vec<ValidationIssue>,
}

impl ValidationReport {
    pub fn push(&mut self, field: &'static str, message: impl Into<String>, constraint: &'static str) {
        self.issues.push(ValidationIssue::new(field, message, constraint));
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn finish(self) -> Result<(), DomainError> {
        if self.issues.is_empty() {
            Ok(())
        } else {
            Err(DomainError::validation(self.issues))
        }
    }
}
