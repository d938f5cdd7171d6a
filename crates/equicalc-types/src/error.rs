//! Local validation errors
//!
//! A [`ValidationError`] means the snapshot is incomplete or out of range.
//! It is resolved locally: nothing is dispatched to the remote service.

use std::fmt;

/// Why a single field was rejected
#[derive(Debug, Clone, PartialEq)]
pub enum IssueReason {
    /// Section or field not provided yet
    Missing,
    /// Value must be zero or positive
    Negative,
    /// Value must be strictly positive
    NotPositive,
    /// Value outside the accepted range
    OutOfRange { min: f64, max: f64 },
    /// Value is NaN or infinite
    NotFinite,
    /// Collection must not be empty
    Empty,
    /// Name appears more than once
    Duplicate,
    /// Cross-field constraint violated
    Inconsistent(String),
}

impl fmt::Display for IssueReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing => write!(f, "is required"),
            Self::Negative => write!(f, "must not be negative"),
            Self::NotPositive => write!(f, "must be greater than zero"),
            Self::OutOfRange { min, max } => write!(f, "must be between {min} and {max}"),
            Self::NotFinite => write!(f, "must be a finite number"),
            Self::Empty => write!(f, "must not be empty"),
            Self::Duplicate => write!(f, "is duplicated"),
            Self::Inconsistent(detail) => write!(f, "{detail}"),
        }
    }
}

/// One rejected field
#[derive(Debug, Clone, PartialEq)]
pub struct FieldIssue {
    /// Dotted path of the field (`equity_details.vesting.cliff_years`)
    pub field: String,
    /// Rejection reason
    pub reason: IssueReason,
}

impl fmt::Display for FieldIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.field, self.reason)
    }
}

/// Input snapshot failed validation
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("invalid input: {}", join_issues(.issues))]
pub struct ValidationError {
    /// Every issue found, in field order
    pub issues: Vec<FieldIssue>,
}

impl ValidationError {
    /// Check whether a field was reported
    #[must_use]
    pub fn has_issue(&self, field: &str) -> bool {
        self.issues.iter().any(|issue| issue.field == field)
    }

    /// Fields that are simply not filled in yet
    pub fn missing_fields(&self) -> impl Iterator<Item = &str> {
        self.issues
            .iter()
            .filter(|issue| issue.reason == IssueReason::Missing)
            .map(|issue| issue.field.as_str())
    }
}

fn join_issues(issues: &[FieldIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Accumulates issues so one pass reports everything at once
#[derive(Debug, Default)]
pub(crate) struct Validator {
    issues: Vec<FieldIssue>,
}

impl Validator {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, field: impl Into<String>, reason: IssueReason) {
        self.issues.push(FieldIssue {
            field: field.into(),
            reason,
        });
    }

    pub(crate) fn check(&mut self, ok: bool, field: impl Into<String>, reason: IssueReason) {
        if !ok {
            self.push(field, reason);
        }
    }

    pub(crate) fn non_negative(&mut self, field: &str, value: f64) {
        if !value.is_finite() {
            self.push(field, IssueReason::NotFinite);
        } else if value < 0.0 {
            self.push(field, IssueReason::Negative);
        }
    }

    pub(crate) fn positive(&mut self, field: &str, value: f64) {
        if !value.is_finite() {
            self.push(field, IssueReason::NotFinite);
        } else if value <= 0.0 {
            self.push(field, IssueReason::NotPositive);
        }
    }

    pub(crate) fn in_range(&mut self, field: &str, value: f64, min: f64, max: f64) {
        if !value.is_finite() {
            self.push(field, IssueReason::NotFinite);
        } else if value < min || value > max {
            self.push(field, IssueReason::OutOfRange { min, max });
        }
    }

    pub(crate) fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }

    pub(crate) fn into_error(self) -> ValidationError {
        ValidationError {
            issues: self.issues,
        }
    }

    pub(crate) fn finish(self) -> Result<(), ValidationError> {
        if self.issues.is_empty() {
            Ok(())
        } else {
            Err(ValidationError {
                issues: self.issues,
            })
        }
    }
}
