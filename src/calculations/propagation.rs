use chrono::{Datelike, NaiveDate};
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::calculations::validation::{ScheduleValidator, Violation};
use crate::calendar::{BusinessDayCalculator, Direction, HolidayLookup};
use crate::config::EngineConfig;
use crate::error::{ScheduleError, ScheduleResult};
use crate::graph::ScheduleDag;
use crate::plan::{ComputedStepSchedule, LockedStepSnapshot, SchedulePlan};
use crate::template::{AnchorBasis, ProcessTemplateGraph, StepDefinition, StepId};

/// Two-phase schedule computation: goal-anchored steps first, then
/// predecessor-anchored steps in dependency order.
pub struct SchedulePropagator<'a, H: HolidayLookup + ?Sized> {
    calc: BusinessDayCalculator<'a, H>,
    config: &'a EngineConfig,
}

impl<'a, H: HolidayLookup + ?Sized> SchedulePropagator<'a, H> {
    pub fn new(holidays: &'a H, config: &'a EngineConfig) -> Self {
        let calc = BusinessDayCalculator::with_weekend(holidays, &config.non_working_days)
            .with_padding(config.window_padding_days);
        Self { calc, config }
    }

    pub fn propagate(
        &self,
        template: &ProcessTemplateGraph,
        goal_date: NaiveDate,
        existing: &[LockedStepSnapshot],
        country: &str,
    ) -> ScheduleResult<SchedulePlan> {
        check_goal_date(goal_date, self.config.epoch_floor_year)?;
        template.ensure_active()?;
        template.validate()?;

        let mut computed = self.seed_locked(template, existing, country)?;

        let dag = ScheduleDag::build(&template.steps)?;
        let order = dag.topological_order()?;

        // Phase A
        for &id in &order {
            let Some(step) = template.step(id) else {
                continue;
            };
            if step.basis != AnchorBasis::Goal || computed.contains_key(&id) {
                continue;
            }
            let (start, due) = self.goal_anchored(step, goal_date, country)?;
            let predecessors = step.predecessors.clone();
            computed.insert(id, self.schedule_for(step, start, due, predecessors, false));
        }

        // Phase B
        for &id in &order {
            let Some(step) = template.step(id) else {
                continue;
            };
            if step.basis != AnchorBasis::Previous || computed.contains_key(&id) {
                continue;
            }
            let (start, due, anchors) =
                self.predecessor_anchored(template, step, &computed, goal_date, country)?;
            computed.insert(id, self.schedule_for(step, start, due, anchors, false));
        }

        ScheduleValidator::new(template, goal_date, self.config.epoch_floor_year)
            .validate(&computed)?;

        let mut steps = Vec::with_capacity(order.len());
        for id in &order {
            let schedule = computed
                .remove(id)
                .ok_or_else(|| ScheduleError::ScheduleIncomplete {
                    violations: vec![Violation::MissingSchedule { step: *id }],
                })?;
            steps.push(schedule);
        }

        debug!(
            template = %template.name,
            %goal_date,
            country,
            steps = steps.len(),
            "schedule computed"
        );

        Ok(SchedulePlan {
            goal_date,
            country_code: country.to_string(),
            steps,
        })
    }

    /// Locked steps keep their committed due date; start is derived from
    /// the step's duration.
    fn seed_locked(
        &self,
        template: &ProcessTemplateGraph,
        existing: &[LockedStepSnapshot],
        country: &str,
    ) -> ScheduleResult<HashMap<StepId, ComputedStepSchedule>> {
        let mut computed = HashMap::with_capacity(template.len());
        for snapshot in existing.iter().filter(|snapshot| snapshot.locked) {
            let Some(step) = template.step(snapshot.step_id) else {
                warn!(
                    step_id = snapshot.step_id,
                    due_date = %snapshot.due_date,
                    "locked snapshot refers to a step missing from the template; ignoring"
                );
                continue;
            };
            if computed.contains_key(&step.id) {
                debug!(step_id = step.id, "duplicate locked snapshot; keeping the first");
                continue;
            }
            let due = snapshot.due_date;
            let start = self.start_from_due(step, due, country)?;
            computed.insert(
                step.id,
                self.schedule_for(step, start, due, step.predecessors.clone(), true),
            );
        }
        Ok(computed)
    }

    fn goal_anchored(
        &self,
        step: &StepDefinition,
        goal_date: NaiveDate,
        country: &str,
    ) -> ScheduleResult<(NaiveDate, NaiveDate)> {
        let anchor = self
            .calc
            .subtract_business_days(goal_date, step.offset_magnitude(), country)?;
        let due = self
            .calc
            .adjust_to_business_day(anchor, Direction::Backward, country)?;
        let start = self.start_from_due(step, due, country)?;
        Ok((start, due))
    }

    /// Returns `(start, due, anchors)`. Explicit predecessors are always
    /// anchors; the sequence predecessor only when its schedule fed the base.
    fn predecessor_anchored(
        &self,
        template: &ProcessTemplateGraph,
        step: &StepDefinition,
        computed: &HashMap<StepId, ComputedStepSchedule>,
        goal_date: NaiveDate,
        country: &str,
    ) -> ScheduleResult<(NaiveDate, NaiveDate, Vec<StepId>)> {
        let predecessors = template.resolved_predecessors(step);
        if predecessors.is_empty() {
            // No explicit predecessor and nothing earlier in the sequence.
            let (start, due) = self.goal_anchored(step, goal_date, country)?;
            return Ok((start, due, Vec::new()));
        }
        let implicit = step.predecessors.is_empty();

        let mut base: Option<NaiveDate> = None;
        let mut anchors = Vec::with_capacity(predecessors.len());
        for &pred in &predecessors {
            let pred_due = match computed.get(&pred) {
                Some(schedule) => {
                    anchors.push(pred);
                    schedule.due_date
                }
                None => {
                    let fallback = self.fallback_base(step, goal_date, country)?;
                    warn!(
                        step_id = step.id,
                        predecessor_id = pred,
                        implicit,
                        fallback_date = %fallback,
                        %goal_date,
                        "predecessor has no schedule; using goal-relative fallback base date"
                    );
                    if !implicit {
                        anchors.push(pred);
                    }
                    fallback
                }
            };
            base = Some(base.map_or(pred_due, |current| current.max(pred_due)));
        }
        let Some(base) = base else {
            let (start, due) = self.goal_anchored(step, goal_date, country)?;
            return Ok((start, due, Vec::new()));
        };

        let due = self.calc.adjust_to_business_day(
            self.calc
                .add_business_days(base, step.offset_magnitude(), country)?,
            Direction::Backward,
            country,
        )?;
        let start = self.calc.add_business_days(base, 1, country)?.min(due);
        Ok((start, due, anchors))
    }

    fn fallback_base(
        &self,
        step: &StepDefinition,
        goal_date: NaiveDate,
        country: &str,
    ) -> ScheduleResult<NaiveDate> {
        let days = self
            .config
            .fallback_min_business_days
            .max(step.offset_magnitude() * 2);
        self.calc.subtract_business_days(goal_date, days, country)
    }

    fn start_from_due(
        &self,
        step: &StepDefinition,
        due: NaiveDate,
        country: &str,
    ) -> ScheduleResult<NaiveDate> {
        self.calc
            .subtract_business_days(due, step.duration_days() - 1, country)
    }

    fn schedule_for(
        &self,
        step: &StepDefinition,
        start_date: NaiveDate,
        due_date: NaiveDate,
        predecessors: Vec<StepId>,
        locked: bool,
    ) -> ComputedStepSchedule {
        ComputedStepSchedule {
            step_id: step.id,
            name: step.name.clone(),
            start_date,
            due_date,
            predecessors,
            locked,
        }
    }
}

pub fn check_goal_date(goal_date: NaiveDate, floor_year: i32) -> ScheduleResult<()> {
    if goal_date.year() < floor_year {
        return Err(ScheduleError::InvalidGoalDate {
            input: goal_date.to_string(),
            reason: format!("goal dates before {floor_year} are treated as unset"),
        });
    }
    Ok(())
}

/// Calendar span one computation can touch, for prefetching holidays.
pub fn planning_window(
    template: &ProcessTemplateGraph,
    goal_date: NaiveDate,
    existing: &[LockedStepSnapshot],
    config: &EngineConfig,
) -> (NaiveDate, NaiveDate) {
    let offsets: i64 = template.steps.iter().map(StepDefinition::offset_magnitude).sum();
    let durations: i64 = template.steps.iter().map(StepDefinition::duration_days).sum();
    let widest = template
        .steps
        .iter()
        .map(StepDefinition::offset_magnitude)
        .max()
        .unwrap_or(0);
    let fallback = config.fallback_min_business_days.max(widest * 2);

    let back_days = 3 * (offsets + durations + fallback + 1) + config.window_padding_days;
    let forward_days = 3 * (offsets + 1) + config.window_padding_days;

    let locked = existing.iter().filter(|snapshot| snapshot.locked);
    let low = locked
        .clone()
        .map(|snapshot| snapshot.due_date)
        .chain([goal_date])
        .min()
        .unwrap_or(goal_date);
    let high = locked
        .map(|snapshot| snapshot.due_date)
        .chain([goal_date])
        .max()
        .unwrap_or(goal_date);

    let start = low
        .checked_sub_signed(chrono::Duration::days(back_days))
        .unwrap_or(NaiveDate::MIN);
    let end = high
        .checked_add_signed(chrono::Duration::days(forward_days))
        .unwrap_or(NaiveDate::MAX);
    (start, end)
}
