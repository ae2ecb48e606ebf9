use super::{PersistenceError, PersistenceResult};
use crate::calendar::StaticHolidayCalendar;
use crate::plan::{ComputedStepSchedule, SchedulePlan};
use crate::template::{ProcessTemplateGraph, StepDefinition, StepId, parse_id_list};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::Path;

pub fn save_plan_to_json<P: AsRef<Path>>(plan: &SchedulePlan, path: P) -> PersistenceResult<()> {
    super::validate_plan(plan)?;
    let file = File::create(path)?;
    serde_json::to_writer_pretty(file, plan)?;
    Ok(())
}

pub fn load_plan_from_json<P: AsRef<Path>>(path: P) -> PersistenceResult<SchedulePlan> {
    let file = File::open(path)?;
    let plan: SchedulePlan = serde_json::from_reader(file)?;
    super::validate_plan(&plan)?;
    Ok(plan)
}

#[derive(Serialize, Deserialize)]
struct PlanCsvRecord {
    step_id: StepId,
    name: String,
    start_date: String,
    due_date: String,
    predecessors: String,
    locked: String,
    goal_date: String,
    country_code: String,
}

impl PlanCsvRecord {
    fn from_step(plan: &SchedulePlan, step: &ComputedStepSchedule) -> Self {
        Self {
            step_id: step.step_id,
            name: step.name.clone(),
            start_date: format_date(step.start_date),
            due_date: format_date(step.due_date),
            predecessors: join_ids(&step.predecessors),
            locked: step.locked.to_string(),
            goal_date: format_date(plan.goal_date),
            country_code: plan.country_code.clone(),
        }
    }

    fn into_step(self) -> PersistenceResult<ComputedStepSchedule> {
        Ok(ComputedStepSchedule {
            step_id: self.step_id,
            name: self.name,
            start_date: parse_date(&self.start_date)?,
            due_date: parse_date(&self.due_date)?,
            predecessors: parse_id_list(&self.predecessors).map_err(PersistenceError::InvalidData)?,
            locked: parse_bool(&self.locked)?,
        })
    }
}

/// One row per step; the plan's goal date and country repeat on every row.
pub fn save_plan_to_csv<P: AsRef<Path>>(plan: &SchedulePlan, path: P) -> PersistenceResult<()> {
    super::validate_plan(plan)?;
    let file = File::create(path)?;
    let mut writer = csv::Writer::from_writer(file);
    for step in &plan.steps {
        writer.serialize(PlanCsvRecord::from_step(plan, step))?;
    }
    writer.flush()?;
    Ok(())
}

pub fn load_plan_from_csv<P: AsRef<Path>>(path: P) -> PersistenceResult<SchedulePlan> {
    let file = File::open(path)?;
    let mut reader = csv::Reader::from_reader(file);
    let mut header: Option<(NaiveDate, String)> = None;
    let mut steps = Vec::new();
    for record in reader.deserialize::<PlanCsvRecord>() {
        let record = record?;
        let goal = parse_date(&record.goal_date)?;
        let country = record.country_code.trim().to_string();
        match &header {
            None => header = Some((goal, country)),
            Some((known_goal, known_country)) => {
                if *known_goal != goal || *known_country != country {
                    return Err(PersistenceError::InvalidData(format!(
                        "step {} belongs to a different plan ({goal}, {country})",
                        record.step_id
                    )));
                }
            }
        }
        steps.push(record.into_step()?);
    }

    let Some((goal_date, country_code)) = header else {
        return Err(PersistenceError::InvalidData(
            "CSV file contained no steps".into(),
        ));
    };
    let plan = SchedulePlan {
        goal_date,
        country_code,
        steps,
    };
    super::validate_plan(&plan)?;
    Ok(plan)
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TemplateFile {
    Graph(ProcessTemplateGraph),
    Steps(Vec<StepDefinition>),
}

/// Reads either a full template object or a bare list of steps. A bare
/// list takes its name from the file stem.
pub fn load_template_from_json<P: AsRef<Path>>(path: P) -> PersistenceResult<ProcessTemplateGraph> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let template = match serde_json::from_reader(file)? {
        TemplateFile::Graph(graph) => graph,
        TemplateFile::Steps(steps) => {
            let name = path
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_default();
            ProcessTemplateGraph::new(name, steps)
        }
    };
    template
        .validate()
        .map_err(|err| PersistenceError::InvalidData(err.to_string()))?;
    Ok(template)
}

#[derive(Deserialize)]
struct HolidayCsvRecord {
    country: String,
    date: String,
}

/// Adds `country,date` rows (extra columns are ignored) to `calendar`. Returns the row count.
pub fn load_holidays_from_csv<P: AsRef<Path>>(
    path: P,
    calendar: &mut StaticHolidayCalendar,
) -> PersistenceResult<usize> {
    let file = File::open(path)?;
    let mut reader = csv::Reader::from_reader(file);
    let mut count = 0;
    for record in reader.deserialize::<HolidayCsvRecord>() {
        let record = record?;
        if record.country.trim().is_empty() {
            return Err(PersistenceError::InvalidData(format!(
                "holiday {} has no country",
                record.date
            )));
        }
        calendar.add_holiday(&record.country, parse_date(&record.date)?);
        count += 1;
    }
    Ok(count)
}

fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn parse_date(input: &str) -> PersistenceResult<NaiveDate> {
    crate::calendar::parse_date(input)
        .map_err(|e| PersistenceError::InvalidData(format!("invalid date '{input}': {e}")))
}

fn parse_bool(input: &str) -> PersistenceResult<bool> {
    match input.trim().to_ascii_lowercase().as_str() {
        "" | "false" => Ok(false),
        "true" => Ok(true),
        other => Err(PersistenceError::InvalidData(format!(
            "invalid boolean '{other}'"
        ))),
    }
}

fn join_ids(values: &[StepId]) -> String {
    values
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(",")
}
