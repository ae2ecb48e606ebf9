use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::error::{ScheduleError, ScheduleResult};
use crate::plan::ComputedStepSchedule;
use crate::template::{ProcessTemplateGraph, StepId};

/// One broken invariant in a computed schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Violation {
    MissingSchedule {
        step: StepId,
    },
    BeforeEpochFloor {
        step: StepId,
        date: NaiveDate,
        floor_year: i32,
    },
    StartAfterDue {
        step: StepId,
        start: NaiveDate,
        due: NaiveDate,
    },
    AfterGoal {
        step: StepId,
        due: NaiveDate,
        goal: NaiveDate,
    },
    OutOfOrder {
        step: StepId,
        due: NaiveDate,
        predecessor: StepId,
        predecessor_due: NaiveDate,
    },
}

impl Violation {
    pub fn step(&self) -> StepId {
        match self {
            Violation::MissingSchedule { step }
            | Violation::BeforeEpochFloor { step, .. }
            | Violation::StartAfterDue { step, .. }
            | Violation::AfterGoal { step, .. }
            | Violation::OutOfOrder { step, .. } => *step,
        }
    }

    fn is_incompleteness(&self) -> bool {
        matches!(
            self,
            Violation::MissingSchedule { .. }
                | Violation::BeforeEpochFloor { .. }
                | Violation::StartAfterDue { .. }
        )
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::MissingSchedule { step } => write!(f, "step {step} has no schedule"),
            Violation::BeforeEpochFloor {
                step,
                date,
                floor_year,
            } => write!(f, "step {step} has date {date} before year {floor_year}"),
            Violation::StartAfterDue { step, start, due } => {
                write!(f, "step {step} starts {start} after its due date {due}")
            }
            Violation::AfterGoal { step, due, goal } => {
                write!(f, "step {step} is due {due}, after the goal date {goal}")
            }
            Violation::OutOfOrder {
                step,
                due,
                predecessor,
                predecessor_due,
            } => write!(
                f,
                "step {step} is due {due} before its predecessor {predecessor} ({predecessor_due})"
            ),
        }
    }
}

/// Checks a finished computation. Every violation is collected before the
/// report is turned into an error.
pub struct ScheduleValidator<'a> {
    template: &'a ProcessTemplateGraph,
    goal_date: NaiveDate,
    floor_year: i32,
}

impl<'a> ScheduleValidator<'a> {
    pub fn new(template: &'a ProcessTemplateGraph, goal_date: NaiveDate, floor_year: i32) -> Self {
        Self {
            template,
            goal_date,
            floor_year,
        }
    }

    pub fn violations(&self, computed: &HashMap<StepId, ComputedStepSchedule>) -> Vec<Violation> {
        let mut violations = Vec::new();
        for definition in &self.template.steps {
            let Some(schedule) = computed.get(&definition.id) else {
                violations.push(Violation::MissingSchedule {
                    step: definition.id,
                });
                continue;
            };
            let step = schedule.step_id;

            for date in [schedule.start_date, schedule.due_date] {
                if date.year() < self.floor_year {
                    violations.push(Violation::BeforeEpochFloor {
                        step,
                        date,
                        floor_year: self.floor_year,
                    });
                }
            }
            if schedule.start_date > schedule.due_date {
                violations.push(Violation::StartAfterDue {
                    step,
                    start: schedule.start_date,
                    due: schedule.due_date,
                });
            }
            if schedule.due_date > self.goal_date {
                violations.push(Violation::AfterGoal {
                    step,
                    due: schedule.due_date,
                    goal: self.goal_date,
                });
            }
            for pred in &schedule.predecessors {
                match computed.get(pred) {
                    Some(before) if before.due_date > schedule.due_date => {
                        violations.push(Violation::OutOfOrder {
                            step,
                            due: schedule.due_date,
                            predecessor: *pred,
                            predecessor_due: before.due_date,
                        });
                    }
                    Some(_) => {}
                    // Reported on the predecessor's own pass.
                    None => {}
                }
            }
        }
        violations
    }

    pub fn validate(&self, computed: &HashMap<StepId, ComputedStepSchedule>) -> ScheduleResult<()> {
        into_result(self.violations(computed))
    }
}

/// Turn collected violations into a single error, most severe kind first.
pub fn into_result(violations: Vec<Violation>) -> ScheduleResult<()> {
    if violations.is_empty() {
        return Ok(());
    }
    if violations.iter().any(Violation::is_incompleteness) {
        return Err(ScheduleError::ScheduleIncomplete { violations });
    }
    if violations
        .iter()
        .any(|v| matches!(v, Violation::OutOfOrder { .. }))
    {
        return Err(ScheduleError::DependencyOrderingViolation { violations });
    }
    Err(ScheduleError::GoalDateExceeded { violations })
}
