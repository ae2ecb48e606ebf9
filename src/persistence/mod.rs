use std::collections::HashSet;
use std::io;
use thiserror::Error;

use crate::plan::{ScheduleDelta, SchedulePlan};

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("database error: {0}")]
    Database(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("invalid data: {0}")]
    InvalidData(String),
    #[error("no plan stored for case '{0}'")]
    NotFound(String),
    #[error("plan store lock poisoned")]
    Poisoned,
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for PersistenceError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Database(Box::new(value))
    }
}

pub type PersistenceResult<T> = Result<T, PersistenceError>;

/// Where computed plans live between replans.
pub trait PlanStore {
    fn save_plan(&self, case_id: &str, plan: &SchedulePlan) -> PersistenceResult<()>;
    fn load_plan(&self, case_id: &str) -> PersistenceResult<Option<SchedulePlan>>;
    /// Apply a replan's deltas to the stored plan. Returns the number of
    /// steps updated.
    fn apply_deltas(&self, case_id: &str, deltas: &[ScheduleDelta]) -> PersistenceResult<usize>;
}

/// Structural checks run before a plan is written or after it is read.
pub fn validate_plan(plan: &SchedulePlan) -> PersistenceResult<()> {
    let mut seen_ids = HashSet::with_capacity(plan.steps.len());
    for step in &plan.steps {
        if !seen_ids.insert(step.step_id) {
            return Err(PersistenceError::InvalidData(format!(
                "duplicate step id {}",
                step.step_id
            )));
        }
        if step.start_date > step.due_date {
            return Err(PersistenceError::InvalidData(format!(
                "step {} starts {} after its due date {}",
                step.step_id, step.start_date, step.due_date
            )));
        }
    }
    if plan.country_code.trim().is_empty() {
        return Err(PersistenceError::InvalidData(
            "plan has no country code".into(),
        ));
    }
    Ok(())
}

#[cfg(feature = "sqlite")]
pub mod sqlite;
pub mod file;

pub use file::{
    load_holidays_from_csv, load_plan_from_csv, load_plan_from_json, load_template_from_json,
    save_plan_to_csv, save_plan_to_json,
};
#[cfg(feature = "sqlite")]
pub use sqlite::{SqliteHolidayStore, SqlitePlanStore};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::ComputedStepSchedule;
    use chrono::NaiveDate;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn plan_with(steps: Vec<(i32, NaiveDate, NaiveDate)>) -> SchedulePlan {
        SchedulePlan {
            goal_date: d(2025, 12, 31),
            country_code: "JP".into(),
            steps: steps
                .into_iter()
                .map(|(id, start, due)| ComputedStepSchedule {
                    step_id: id,
                    name: format!("S{id}"),
                    start_date: start,
                    due_date: due,
                    predecessors: Vec::new(),
                    locked: false,
                })
                .collect(),
        }
    }

    #[test]
    fn rejects_duplicate_ids() {
        let plan = plan_with(vec![
            (1, d(2025, 12, 1), d(2025, 12, 2)),
            (1, d(2025, 12, 3), d(2025, 12, 4)),
        ]);
        match validate_plan(&plan) {
            Err(PersistenceError::InvalidData(msg)) => assert!(msg.contains("duplicate")),
            other => panic!("expected invalid data, got {other:?}"),
        }
    }

    #[test]
    fn rejects_start_after_due() {
        let plan = plan_with(vec![(2, d(2025, 12, 5), d(2025, 12, 4))]);
        assert!(matches!(
            validate_plan(&plan),
            Err(PersistenceError::InvalidData(_))
        ));
        assert!(validate_plan(&plan_with(vec![(2, d(2025, 12, 4), d(2025, 12, 4))])).is_ok());
    }
}
