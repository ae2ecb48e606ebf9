//! Error types for schedule computation.

use chrono::NaiveDate;
use thiserror::Error;

use crate::calculations::validation::Violation;
use crate::template::StepId;

/// Failure raised by a holiday source.
#[derive(Error, Debug)]
pub enum CalendarError {
    #[error("holiday lookup for '{country}' failed: {message}")]
    Lookup { country: String, message: String },
    #[error("invalid holiday range for '{country}': {start} is after {end}")]
    InvalidRange {
        country: String,
        start: NaiveDate,
        end: NaiveDate,
    },
    #[error("holiday store error: {0}")]
    Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for CalendarError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Store(Box::new(value))
    }
}

/// Coarse classification an outer layer uses to pick a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// The template or request is bad; retrying will not help.
    InvalidInput,
    /// The engine produced an inconsistent schedule. Always a bug.
    Internal,
    /// An external collaborator (the holiday source) failed; may be retried.
    Upstream,
}

/// Every way a single schedule computation can fail.
#[derive(Error, Debug)]
pub enum ScheduleError {
    #[error("invalid goal date '{input}': {reason}")]
    InvalidGoalDate { input: String, reason: String },
    #[error("template '{name}' is inactive")]
    InactiveTemplate { name: String },
    #[error("step {step} is invalid: {reason}")]
    InvalidStep { step: StepId, reason: String },
    #[error("step {step} depends on unknown step {missing}")]
    DanglingDependency { step: StepId, missing: StepId },
    #[error("circular dependency between steps {}", join_ids(steps))]
    CircularDependency { steps: Vec<StepId> },
    #[error("schedule is incomplete: {}", join_violations(violations))]
    ScheduleIncomplete { violations: Vec<Violation> },
    #[error("dependency ordering violated: {}", join_violations(violations))]
    DependencyOrderingViolation { violations: Vec<Violation> },
    #[error("schedule overruns the goal date: {}", join_violations(violations))]
    GoalDateExceeded { violations: Vec<Violation> },
    #[error("date arithmetic left the supported range starting from {date}")]
    DateOutOfRange { date: NaiveDate },
    #[error("weekend rule leaves no working days")]
    NoWorkingDays,
    #[error(transparent)]
    Calendar(#[from] CalendarError),
}

impl ScheduleError {
    pub fn class(&self) -> ErrorClass {
        match self {
            ScheduleError::InvalidGoalDate { .. }
            | ScheduleError::InactiveTemplate { .. }
            | ScheduleError::InvalidStep { .. }
            | ScheduleError::DanglingDependency { .. }
            | ScheduleError::CircularDependency { .. }
            | ScheduleError::DependencyOrderingViolation { .. }
            | ScheduleError::GoalDateExceeded { .. }
            | ScheduleError::DateOutOfRange { .. }
            | ScheduleError::NoWorkingDays => ErrorClass::InvalidInput,
            ScheduleError::ScheduleIncomplete { .. } => ErrorClass::Internal,
            ScheduleError::Calendar(_) => ErrorClass::Upstream,
        }
    }

    /// Violations carried by a validation failure; empty for other errors.
    pub fn violations(&self) -> &[Violation] {
        match self {
            ScheduleError::ScheduleIncomplete { violations }
            | ScheduleError::DependencyOrderingViolation { violations }
            | ScheduleError::GoalDateExceeded { violations } => violations,
            _ => &[],
        }
    }
}

fn join_ids(ids: &[StepId]) -> String {
    ids.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

fn join_violations(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

pub type ScheduleResult<T> = Result<T, ScheduleError>;
