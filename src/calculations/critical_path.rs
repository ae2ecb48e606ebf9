use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::calendar::{BusinessDayCalculator, HolidayLookup};
use crate::error::{ScheduleError, ScheduleResult};
use crate::plan::SchedulePlan;
use crate::template::StepId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepSlack {
    pub step_id: StepId,
    /// Business days the step can slip before the goal date moves.
    pub slack_days: i64,
}

impl StepSlack {
    pub fn is_critical(&self) -> bool {
        self.slack_days <= 0
    }
}

/// Read-only slack analysis over a finished plan.
pub struct SlackAnalysis<'a, H: HolidayLookup + ?Sized> {
    calc: &'a BusinessDayCalculator<'a, H>,
}

impl<'a, H: HolidayLookup + ?Sized> SlackAnalysis<'a, H> {
    pub fn new(calc: &'a BusinessDayCalculator<'a, H>) -> Self {
        Self { calc }
    }

    /// Slack per step, in plan order. A step's slack is the business days
    /// between its due date and the goal, capped by its dependents' slack.
    pub fn slack(&self, plan: &SchedulePlan) -> ScheduleResult<Vec<StepSlack>> {
        let mut dependents: HashMap<StepId, Vec<StepId>> = HashMap::new();
        for step in &plan.steps {
            for pred in &step.predecessors {
                dependents.entry(*pred).or_default().push(step.step_id);
            }
        }

        let mut slack: HashMap<StepId, i64> = HashMap::with_capacity(plan.len());
        for step in plan.steps.iter().rev() {
            let own = self.days_to_goal(step.due_date, plan.goal_date, &plan.country_code)?;
            let capped = dependents
                .get(&step.step_id)
                .into_iter()
                .flatten()
                .filter_map(|dep| slack.get(dep).copied())
                .fold(own, i64::min);
            slack.insert(step.step_id, capped);
        }

        Ok(plan
            .steps
            .iter()
            .map(|step| StepSlack {
                step_id: step.step_id,
                slack_days: slack.get(&step.step_id).copied().unwrap_or_default(),
            })
            .collect())
    }

    /// Steps with zero slack, in plan order.
    pub fn critical_path(&self, plan: &SchedulePlan) -> ScheduleResult<Vec<StepId>> {
        Ok(self
            .slack(plan)?
            .into_iter()
            .filter(StepSlack::is_critical)
            .map(|entry| entry.step_id)
            .collect())
    }

    /// Business days strictly after `due` up to and including `goal`.
    fn days_to_goal(&self, due: NaiveDate, goal: NaiveDate, country: &str) -> ScheduleResult<i64> {
        if due == goal {
            return Ok(0);
        }
        let (from, to, sign) = if due < goal { (due, goal, 1) } else { (goal, due, -1) };
        let after = from
            .succ_opt()
            .ok_or(ScheduleError::DateOutOfRange { date: from })?;
        let count = self.calc.count_business_days_between(after, to, country)?;
        Ok(sign * count)
    }
}
