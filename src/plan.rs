use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::template::StepId;

/// Dates computed for one step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComputedStepSchedule {
    pub step_id: StepId,
    pub name: String,
    pub start_date: NaiveDate,
    pub due_date: NaiveDate,
    /// Resolved predecessors, including an implicit sequence predecessor.
    pub predecessors: Vec<StepId>,
    /// Pinned from a locked snapshot rather than propagated.
    #[serde(default)]
    pub locked: bool,
}

/// Output of one computation. Never mutated; a replan builds a new one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulePlan {
    pub goal_date: NaiveDate,
    pub country_code: String,
    /// In the topological order used for the computation.
    pub steps: Vec<ComputedStepSchedule>,
}

impl SchedulePlan {
    pub fn step(&self, id: StepId) -> Option<&ComputedStepSchedule> {
        self.steps.iter().find(|step| step.step_id == id)
    }

    pub fn step_ids(&self) -> Vec<StepId> {
        self.steps.iter().map(|step| step.step_id).collect()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn earliest_start(&self) -> Option<NaiveDate> {
        self.steps.iter().map(|step| step.start_date).min()
    }

    pub fn latest_due(&self) -> Option<NaiveDate> {
        self.steps.iter().map(|step| step.due_date).max()
    }

    pub fn summary(&self) -> PlanSummary {
        PlanSummary {
            step_count: self.steps.len(),
            locked_count: self.steps.iter().filter(|step| step.locked).count(),
            goal_date: self.goal_date,
            earliest_start: self.earliest_start(),
            latest_due: self.latest_due(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanSummary {
    pub step_count: usize,
    pub locked_count: usize,
    pub goal_date: NaiveDate,
    pub earliest_start: Option<NaiveDate>,
    pub latest_due: Option<NaiveDate>,
}

impl PlanSummary {
    pub fn to_cli_summary(&self) -> String {
        let mut parts = vec![
            format!("steps={}", self.step_count),
            format!("goal={}", self.goal_date),
        ];
        if self.locked_count > 0 {
            parts.push(format!("locked={}", self.locked_count));
        }
        if let Some(date) = self.earliest_start {
            parts.push(format!("start={date}"));
        }
        if let Some(date) = self.latest_due {
            parts.push(format!("due={date}"));
        }
        parts.join(", ")
    }
}

/// A previously persisted step, as seen when replanning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockedStepSnapshot {
    pub step_id: StepId,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    /// The committed due date.
    pub due_date: NaiveDate,
    #[serde(default)]
    pub locked: bool,
}

impl LockedStepSnapshot {
    pub fn locked(step_id: StepId, due_date: NaiveDate) -> Self {
        Self {
            step_id,
            start_date: None,
            due_date,
            locked: true,
        }
    }

    pub fn unlocked(step_id: StepId, start_date: NaiveDate, due_date: NaiveDate) -> Self {
        Self {
            step_id,
            start_date: Some(start_date),
            due_date,
            locked: false,
        }
    }

    /// Snapshot of a computed step, as a caller would persist it.
    pub fn from_computed(step: &ComputedStepSchedule, locked: bool) -> Self {
        Self {
            step_id: step.step_id,
            start_date: Some(step.start_date),
            due_date: step.due_date,
            locked,
        }
    }
}

/// Date change the caller should apply to one persisted step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleDelta {
    pub step_id: StepId,
    pub old_start: Option<NaiveDate>,
    pub old_due: NaiveDate,
    pub new_start: NaiveDate,
    pub new_due: NaiveDate,
}

impl ScheduleDelta {
    pub fn due_shift_days(&self) -> i64 {
        (self.new_due - self.old_due).num_days()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn step(id: StepId, start: NaiveDate, due: NaiveDate, locked: bool) -> ComputedStepSchedule {
        ComputedStepSchedule {
            step_id: id,
            name: format!("S{id}"),
            start_date: start,
            due_date: due,
            predecessors: Vec::new(),
            locked,
        }
    }

    #[test]
    fn summary_reports_bounds_and_locks() {
        let plan = SchedulePlan {
            goal_date: d(2025, 12, 31),
            country_code: "JP".into(),
            steps: vec![
                step(1, d(2025, 11, 3), d(2025, 11, 14), false),
                step(2, d(2025, 11, 17), d(2025, 11, 19), true),
            ],
        };
        let summary = plan.summary();
        assert_eq!(summary.step_count, 2);
        assert_eq!(summary.locked_count, 1);
        assert_eq!(
            summary.to_cli_summary(),
            "steps=2, goal=2025-12-31, locked=1, start=2025-11-03, due=2025-11-19"
        );
        assert_eq!(plan.step(2).map(|s| s.name.as_str()), Some("S2"));
        assert!(plan.step(3).is_none());
    }

    #[test]
    fn snapshot_json_defaults_to_unlocked() {
        let snapshot: LockedStepSnapshot =
            serde_json::from_str(r#"{"step_id": 4, "due_date": "2025-10-01"}"#).unwrap();
        assert!(!snapshot.locked);
        assert_eq!(snapshot.start_date, None);
        assert_eq!(snapshot.due_date, d(2025, 10, 1));
    }
}
