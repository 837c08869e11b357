use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// A single violated field rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[error("{path}: expected {expected}, received {received}")]
pub struct ValidationError {
    pub path: String,
    pub expected: String,
    pub received: String,
}

impl ValidationError {
    pub fn new(
        path: impl Into<String>,
        expected: impl Into<String>,
        received: impl Into<String>,
    ) -> Self {
        ValidationError {
            path: path.into(),
            expected: expected.into(),
            received: received.into(),
        }
    }
}

/// Every violation found while validating one payload. Never empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationErrors {
    schema: &'static str,
    violations: Vec<ValidationError>,
}

impl ValidationErrors {
    pub(crate) fn new(schema: &'static str, mut violations: Vec<ValidationError>) -> Self {
        if violations.is_empty() {
            violations.push(ValidationError::new("$", schema, "unreadable value"));
        }
        ValidationErrors { schema, violations }
    }

    pub fn single(schema: &'static str, violation: ValidationError) -> Self {
        ValidationErrors {
            schema,
            violations: vec![violation],
        }
    }

    /// Name of the schema that rejected the payload.
    pub fn schema(&self) -> &'static str {
        self.schema
    }

    pub fn first(&self) -> &ValidationError {
        &self.violations[0]
    }

    pub fn violations(&self) -> &[ValidationError] {
        &self.violations
    }

    pub fn len(&self) -> usize {
        self.violations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ValidationError> {
        self.violations.iter()
    }

    /// Look up the violation reported for an exact field path.
    pub fn at(&self, path: &str) -> Option<&ValidationError> {
        self.violations.iter().find(|v| v.path == path)
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid {}: {}", self.schema, self.first())?;
        if self.violations.len() > 1 {
            write!(f, " (and {} more)", self.violations.len() - 1)?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}
