use chrono::NaiveDate;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, info};

use crate::calculations::{
    SchedulePropagator, SlackAnalysis, StepSlack, diff_schedule, planning_window,
};
use crate::calendar::{BusinessDayCalculator, HolidayLookup, HolidayWindow, parse_date};
use crate::config::EngineConfig;
use crate::error::{ScheduleError, ScheduleResult};
use crate::plan::{LockedStepSnapshot, ScheduleDelta, SchedulePlan};
use crate::template::{ProcessTemplateGraph, StepId};

/// Result of recomputing a case against what was persisted before.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Replan {
    pub plan: SchedulePlan,
    pub deltas: Vec<ScheduleDelta>,
}

/// One independent computation for [`ScheduleEngine::compute_many`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleRequest {
    pub template: ProcessTemplateGraph,
    pub goal_date: NaiveDate,
    #[serde(default)]
    pub existing: Vec<LockedStepSnapshot>,
    #[serde(default)]
    pub country: Option<String>,
}

/// Entry point for schedule computation over one holiday source.
///
/// The engine holds no per-case state: every call reads its inputs and
/// returns a new plan, so one engine can serve many cases at once.
pub struct ScheduleEngine<H: HolidayLookup> {
    config: EngineConfig,
    holidays: H,
}

impl<H: HolidayLookup> ScheduleEngine<H> {
    pub fn new(config: EngineConfig, holidays: H) -> Self {
        Self { config, holidays }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn holidays(&self) -> &H {
        &self.holidays
    }

    pub fn compute_schedule(
        &self,
        template: &ProcessTemplateGraph,
        goal_date: NaiveDate,
        existing: &[LockedStepSnapshot],
        country: Option<&str>,
    ) -> ScheduleResult<SchedulePlan> {
        let country = self.config.country_or_default(country);
        let (start, end) = planning_window(template, goal_date, existing, &self.config);
        let window = HolidayWindow::prefetch(&self.holidays, country, start, end)?;
        debug!(
            template = %template.name,
            country,
            window_start = %start,
            window_end = %end,
            "holiday window prefetched"
        );
        SchedulePropagator::new(&window, &self.config).propagate(template, goal_date, existing, country)
    }

    /// Same as [`compute_schedule`](Self::compute_schedule) with a
    /// `YYYY-MM-DD` goal date.
    pub fn compute_schedule_str(
        &self,
        template: &ProcessTemplateGraph,
        goal_date: &str,
        existing: &[LockedStepSnapshot],
        country: Option<&str>,
    ) -> ScheduleResult<SchedulePlan> {
        let goal = parse_date(goal_date).map_err(|err| ScheduleError::InvalidGoalDate {
            input: goal_date.to_string(),
            reason: err.to_string(),
        })?;
        self.compute_schedule(template, goal, existing, country)
    }

    pub fn diff_schedule(
        &self,
        new_plan: &SchedulePlan,
        existing: &[LockedStepSnapshot],
        locked_ids: &HashSet<StepId>,
    ) -> Vec<ScheduleDelta> {
        diff_schedule(new_plan, existing, locked_ids)
    }

    /// Compute with `existing` as locked seeds, then diff against it.
    pub fn replan(
        &self,
        template: &ProcessTemplateGraph,
        goal_date: NaiveDate,
        existing: &[LockedStepSnapshot],
        country: Option<&str>,
    ) -> ScheduleResult<Replan> {
        let plan = self.compute_schedule(template, goal_date, existing, country)?;
        let locked_ids: HashSet<StepId> = existing
            .iter()
            .filter(|snapshot| snapshot.locked)
            .map(|snapshot| snapshot.step_id)
            .collect();
        let deltas = diff_schedule(&plan, existing, &locked_ids);
        info!(
            template = %template.name,
            %goal_date,
            changed = deltas.len(),
            locked = locked_ids.len(),
            "replan finished"
        );
        Ok(Replan { plan, deltas })
    }

    pub fn slack(&self, plan: &SchedulePlan) -> ScheduleResult<Vec<StepSlack>> {
        let window = self.plan_window(plan)?;
        let calc = self.calculator(&window);
        SlackAnalysis::new(&calc).slack(plan)
    }

    pub fn critical_path(&self, plan: &SchedulePlan) -> ScheduleResult<Vec<StepId>> {
        let window = self.plan_window(plan)?;
        let calc = self.calculator(&window);
        SlackAnalysis::new(&calc).critical_path(plan)
    }

    fn plan_window(&self, plan: &SchedulePlan) -> ScheduleResult<HolidayWindow<'_, H>> {
        let start = plan
            .earliest_start()
            .map_or(plan.goal_date, |date| date.min(plan.goal_date));
        let end = plan
            .latest_due()
            .map_or(plan.goal_date, |date| date.max(plan.goal_date));
        HolidayWindow::prefetch(&self.holidays, &plan.country_code, start, end)
    }

    fn calculator<'w, L: HolidayLookup>(&self, lookup: &'w L) -> BusinessDayCalculator<'w, L> {
        BusinessDayCalculator::with_weekend(lookup, &self.config.non_working_days)
            .with_padding(self.config.window_padding_days)
    }
}

impl<H: HolidayLookup + Sync> ScheduleEngine<H> {
    /// Independent computations in parallel; results keep request order.
    pub fn compute_many(&self, requests: &[ScheduleRequest]) -> Vec<ScheduleResult<SchedulePlan>> {
        requests
            .par_iter()
            .map(|request| {
                self.compute_schedule(
                    &request.template,
                    request.goal_date,
                    &request.existing,
                    request.country.as_deref(),
                )
            })
            .collect()
    }
}
