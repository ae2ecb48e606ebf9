use std::collections::HashSet;
use std::io::{self, Write};

use case_schedule::calendar::parse_date;
use case_schedule::persistence::{
    load_holidays_from_csv, load_template_from_json, save_plan_to_csv, save_plan_to_json,
};
use case_schedule::{
    EngineConfig, LockedStepSnapshot, ProcessTemplateGraph, ScheduleEngine, SchedulePlan,
    StaticHolidayCalendar, StepId,
};
use chrono::NaiveDate;
use tracing::info;
use tracing_subscriber::EnvFilter;

const BUILTIN_FIRST_YEAR: i32 = 2000;
const BUILTIN_LAST_YEAR: i32 = 2100;

fn render_text_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in rows {
        for (ci, cell) in row.iter().enumerate() {
            if cell.len() > widths[ci] {
                widths[ci] = cell.len();
            }
        }
    }

    let mut sep = String::from("+");
    for w in &widths {
        sep.push_str(&"-".repeat(*w + 2));
        sep.push('+');
    }

    let mut out = String::new();
    out.push_str(&sep);
    out.push('\n');
    out.push_str(&render_row(&widths, headers));
    out.push('\n');
    out.push_str(&sep);
    out.push('\n');
    for row in rows {
        let cells: Vec<&str> = row.iter().map(String::as_str).collect();
        out.push_str(&render_row(&widths, &cells));
        out.push('\n');
    }
    out.push_str(&sep);
    out.push('\n');
    out
}

fn render_row(widths: &[usize], cells: &[&str]) -> String {
    let mut line = String::from("|");
    for (ci, cell) in cells.iter().enumerate() {
        line.push(' ');
        line.push_str(cell);
        line.push_str(&" ".repeat(widths[ci].saturating_sub(cell.len())));
        line.push_str(" |");
    }
    line
}

fn render_plan(plan: &SchedulePlan) -> String {
    let rows: Vec<Vec<String>> = plan
        .steps
        .iter()
        .map(|step| {
            vec![
                step.step_id.to_string(),
                step.name.clone(),
                step.start_date.to_string(),
                step.due_date.to_string(),
                step.predecessors
                    .iter()
                    .map(|id| id.to_string())
                    .collect::<Vec<_>>()
                    .join(","),
                if step.locked { "yes".into() } else { String::new() },
            ]
        })
        .collect();
    render_text_table(&["id", "name", "start", "due", "predecessors", "locked"], &rows)
}

fn print_help() {
    println!(
        "Commands:\n  help                               Show this help\n  template <path>                    Load a process template (JSON)\n  goal <YYYY-MM-DD>                  Set the goal date\n  country <code>                     Set the holiday calendar country\n  holiday <YYYY-MM-DD>               Add a holiday for the current country\n  holidays <csv>                     Load holidays (country,date)\n  lock <id> <due> [start]            Pin a step to a committed due date\n  unlock <id>                        Release a pinned step\n  compute                            Compute the schedule\n  show                               Show the current schedule\n  diff                               Changes since the previous compute\n  critical                           Critical path and slack\n  save json|csv <path>               Write the current schedule\n  quit|exit                          Exit"
    );
}

struct Session {
    config: EngineConfig,
    calendar: StaticHolidayCalendar,
    template: Option<ProcessTemplateGraph>,
    goal: Option<NaiveDate>,
    country: String,
    locks: Vec<LockedStepSnapshot>,
    current: Option<SchedulePlan>,
    previous: Option<SchedulePlan>,
}

impl Session {
    fn new(config: EngineConfig) -> Self {
        let mut calendar = StaticHolidayCalendar::japan(BUILTIN_FIRST_YEAR, BUILTIN_LAST_YEAR);
        calendar.add_us_holidays(BUILTIN_FIRST_YEAR, BUILTIN_LAST_YEAR);
        let country = config.default_country.clone();
        Self {
            config,
            calendar,
            template: None,
            goal: None,
            country,
            locks: Vec::new(),
            current: None,
            previous: None,
        }
    }

    fn engine(&self) -> ScheduleEngine<&StaticHolidayCalendar> {
        ScheduleEngine::new(self.config.clone(), &self.calendar)
    }

    fn locked_ids(&self) -> HashSet<StepId> {
        self.locks.iter().map(|lock| lock.step_id).collect()
    }

    fn compute(&mut self) -> Result<String, String> {
        let template = self.template.as_ref().ok_or("No template loaded")?;
        let goal = self.goal.ok_or("No goal date set")?;
        let plan = self
            .engine()
            .compute_schedule(template, goal, &self.locks, Some(self.country.as_str()))
            .map_err(|e| e.to_string())?;
        info!(
            template = %template.name,
            %goal,
            country = %self.country,
            steps = plan.len(),
            "schedule computed"
        );
        let out = format!(
            "Computed ({})\n{}",
            plan.summary().to_cli_summary(),
            render_plan(&plan)
        );
        self.previous = self.current.replace(plan);
        Ok(out)
    }

    fn diff(&self) -> Result<String, String> {
        let (Some(previous), Some(current)) = (&self.previous, &self.current) else {
            return Err("Compute twice to see a diff".into());
        };
        let locked_ids = self.locked_ids();
        let existing: Vec<LockedStepSnapshot> = previous
            .steps
            .iter()
            .map(|step| LockedStepSnapshot::from_computed(step, locked_ids.contains(&step.step_id)))
            .collect();
        let deltas = self.engine().diff_schedule(current, &existing, &locked_ids);
        if deltas.is_empty() {
            return Ok("No changes.".into());
        }
        let rows: Vec<Vec<String>> = deltas
            .iter()
            .map(|delta| {
                vec![
                    delta.step_id.to_string(),
                    delta.old_start.map(|d| d.to_string()).unwrap_or_default(),
                    delta.old_due.to_string(),
                    delta.new_start.to_string(),
                    delta.new_due.to_string(),
                ]
            })
            .collect();
        Ok(render_text_table(
            &["id", "old start", "old due", "new start", "new due"],
            &rows,
        ))
    }

    fn critical(&self) -> Result<String, String> {
        let plan = self.current.as_ref().ok_or("Nothing computed yet")?;
        let engine = self.engine();
        let slack = engine.slack(plan).map_err(|e| e.to_string())?;
        let path = engine.critical_path(plan).map_err(|e| e.to_string())?;
        let rows: Vec<Vec<String>> = slack
            .iter()
            .map(|entry| {
                vec![
                    entry.step_id.to_string(),
                    entry.slack_days.to_string(),
                    if entry.is_critical() { "*".into() } else { String::new() },
                ]
            })
            .collect();
        let path = path
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(" -> ");
        Ok(format!(
            "Critical path: {path}\n{}",
            render_text_table(&["id", "slack", "critical"], &rows)
        ))
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn main() {
    init_tracing();

    let config = match std::env::args().nth(1) {
        Some(path) => match EngineConfig::from_json_file(&path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Config error: {e}");
                std::process::exit(2);
            }
        },
        None => EngineConfig::default(),
    };
    let mut session = Session::new(config);

    println!("Case Schedule (CLI) - type 'help' for commands\n");

    let stdin = io::stdin();
    let mut line = String::new();
    loop {
        print!("> ");
        let _ = io::stdout().flush();
        line.clear();
        match stdin.read_line(&mut line) {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }
        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        let mut parts = input.split_whitespace();
        let cmd = parts.next().unwrap_or("");

        match cmd {
            "help" => print_help(),
            "quit" | "exit" => break,
            "template" => match parts.next() {
                Some(path) => match load_template_from_json(path) {
                    Ok(template) => {
                        println!("Loaded template '{}' ({} steps)", template.name, template.len());
                        session.template = Some(template);
                    }
                    Err(e) => println!("Error: {e}"),
                },
                None => println!("Usage: template <path>"),
            },
            "goal" => match parts.next().map(parse_date) {
                Some(Ok(date)) => {
                    session.goal = Some(date);
                    println!("Goal date set to {date}");
                }
                Some(Err(_)) => println!("Invalid date (YYYY-MM-DD)"),
                None => println!("Usage: goal <YYYY-MM-DD>"),
            },
            "country" => match parts.next() {
                Some(code) => {
                    session.country = code.to_ascii_uppercase();
                    println!("Country set to {}", session.country);
                }
                None => println!("Usage: country <code>"),
            },
            "holiday" => match parts.next().map(parse_date) {
                Some(Ok(date)) => {
                    session.calendar.add_holiday(&session.country, date);
                    println!("Holiday {date} added for {}", session.country);
                }
                Some(Err(_)) => println!("Invalid date (YYYY-MM-DD)"),
                None => println!("Usage: holiday <YYYY-MM-DD>"),
            },
            "holidays" => match parts.next() {
                Some(path) => match load_holidays_from_csv(path, &mut session.calendar) {
                    Ok(count) => println!("Loaded {count} holidays"),
                    Err(e) => println!("Error: {e}"),
                },
                None => println!("Usage: holidays <csv>"),
            },
            "lock" => {
                let id_s = parts.next();
                let due_s = parts.next();
                let start_s = parts.next();
                match (id_s, due_s) {
                    (Some(id_s), Some(due_s)) => {
                        let id: StepId = match id_s.parse() { Ok(v) => v, Err(_) => { println!("Invalid id"); continue; } };
                        let due = match parse_date(due_s) { Ok(d) => d, Err(_) => { println!("Invalid date (YYYY-MM-DD)"); continue; } };
                        let start = match start_s.map(parse_date).transpose() { Ok(d) => d, Err(_) => { println!("Invalid date (YYYY-MM-DD)"); continue; } };
                        session.locks.retain(|lock| lock.step_id != id);
                        session.locks.push(LockedStepSnapshot {
                            step_id: id,
                            start_date: start,
                            due_date: due,
                            locked: true,
                        });
                        println!("Step {id} locked to {due}");
                    }
                    _ => println!("Usage: lock <id> <due> [start]"),
                }
            }
            "unlock" => match parts.next().map(str::parse::<StepId>) {
                Some(Ok(id)) => {
                    let before = session.locks.len();
                    session.locks.retain(|lock| lock.step_id != id);
                    if session.locks.len() < before {
                        println!("Step {id} unlocked");
                    } else {
                        println!("Step {id} was not locked");
                    }
                }
                Some(Err(_)) => println!("Invalid id"),
                None => println!("Usage: unlock <id>"),
            },
            "compute" => match session.compute() {
                Ok(out) => println!("{out}"),
                Err(e) => println!("Compute error: {e}"),
            },
            "show" => match &session.current {
                Some(plan) => println!("{}", render_plan(plan)),
                None => println!("Nothing computed yet"),
            },
            "diff" => match session.diff() {
                Ok(out) => println!("{out}"),
                Err(e) => println!("{e}"),
            },
            "critical" => match session.critical() {
                Ok(out) => println!("{out}"),
                Err(e) => println!("Error: {e}"),
            },
            "save" => {
                let format = parts.next();
                let path = parts.next();
                let Some(plan) = &session.current else {
                    println!("Nothing computed yet");
                    continue;
                };
                let res = match (format, path) {
                    (Some("json"), Some(path)) => save_plan_to_json(plan, path),
                    (Some("csv"), Some(path)) => save_plan_to_csv(plan, path),
                    _ => {
                        println!("Usage: save json|csv <path>");
                        continue;
                    }
                };
                match res {
                    Ok(_) => println!("Saved."),
                    Err(e) => println!("Error: {e}"),
                }
            }
            other => println!("Unknown command '{other}'. Type 'help'."),
        }
    }
}
