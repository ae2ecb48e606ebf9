use super::{PersistenceError, PersistenceResult, PlanStore};
use crate::calendar::{HolidayLookup, check_range, country_key, parse_date};
use crate::error::CalendarError;
use crate::plan::{ComputedStepSchedule, ScheduleDelta, SchedulePlan};
use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension, Transaction, params};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

pub struct SqlitePlanStore {
    connection: Mutex<Connection>,
}

impl SqlitePlanStore {
    pub fn new<P: AsRef<Path>>(path: P) -> PersistenceResult<Self> {
        Self::from_connection(Connection::open(path)?)
    }

    pub fn in_memory() -> PersistenceResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(connection: Connection) -> PersistenceResult<Self> {
        Self::initialize_schema(&connection)?;
        Ok(Self {
            connection: Mutex::new(connection),
        })
    }

    fn initialize_schema(connection: &Connection) -> PersistenceResult<()> {
        let ddl = r#"
            PRAGMA foreign_keys = ON;
            CREATE TABLE IF NOT EXISTS plans (
                case_id TEXT PRIMARY KEY,
                goal_date TEXT NOT NULL,
                country_code TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS plan_steps (
                case_id TEXT NOT NULL REFERENCES plans(case_id) ON DELETE CASCADE,
                position INTEGER NOT NULL,
                step_id INTEGER NOT NULL,
                step_json TEXT NOT NULL,
                PRIMARY KEY (case_id, step_id)
            );
        "#;
        connection.execute_batch(ddl)?;
        Ok(())
    }

    fn lock(&self) -> PersistenceResult<MutexGuard<'_, Connection>> {
        self.connection
            .lock()
            .map_err(|_| PersistenceError::Poisoned)
    }

    fn save_steps(
        &self,
        tx: &Transaction,
        case_id: &str,
        plan: &SchedulePlan,
    ) -> PersistenceResult<()> {
        tx.execute("DELETE FROM plan_steps WHERE case_id = ?1", params![case_id])?;
        let mut stmt = tx.prepare(
            "INSERT INTO plan_steps (case_id, position, step_id, step_json) VALUES (?1, ?2, ?3, ?4)",
        )?;
        for (position, step) in plan.steps.iter().enumerate() {
            let json = serde_json::to_string(step)?;
            stmt.execute(params![case_id, position as i64, step.step_id, json])?;
        }
        Ok(())
    }
}

impl PlanStore for SqlitePlanStore {
    fn save_plan(&self, case_id: &str, plan: &SchedulePlan) -> PersistenceResult<()> {
        super::validate_plan(plan)?;
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO plans (case_id, goal_date, country_code) VALUES (?1, ?2, ?3)
             ON CONFLICT(case_id) DO UPDATE SET goal_date = excluded.goal_date,
                                                country_code = excluded.country_code",
            params![case_id, plan.goal_date.to_string(), plan.country_code],
        )?;
        self.save_steps(&tx, case_id, plan)?;
        tx.commit()?;
        Ok(())
    }

    fn load_plan(&self, case_id: &str) -> PersistenceResult<Option<SchedulePlan>> {
        let conn = self.lock()?;

        let header: Option<(String, String)> = conn
            .query_row(
                "SELECT goal_date, country_code FROM plans WHERE case_id = ?1",
                params![case_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        let Some((goal_date, country_code)) = header else {
            return Ok(None);
        };
        let goal_date = parse_stored_date(&goal_date)?;

        let mut stmt = conn.prepare(
            "SELECT step_json FROM plan_steps WHERE case_id = ?1 ORDER BY position ASC",
        )?;
        let rows = stmt.query_map(params![case_id], |row| row.get::<_, String>(0))?;

        let mut steps = Vec::new();
        for json in rows {
            let step: ComputedStepSchedule = serde_json::from_str(&json?)?;
            steps.push(step);
        }

        let plan = SchedulePlan {
            goal_date,
            country_code,
            steps,
        };
        super::validate_plan(&plan)?;
        Ok(Some(plan))
    }

    fn apply_deltas(&self, case_id: &str, deltas: &[ScheduleDelta]) -> PersistenceResult<usize> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let exists: bool = tx.query_row(
            "SELECT EXISTS(SELECT 1 FROM plans WHERE case_id = ?1)",
            params![case_id],
            |row| row.get(0),
        )?;
        if !exists {
            return Err(PersistenceError::NotFound(case_id.to_string()));
        }

        let mut updated = 0;
        for delta in deltas {
            let json: Option<String> = tx
                .query_row(
                    "SELECT step_json FROM plan_steps WHERE case_id = ?1 AND step_id = ?2",
                    params![case_id, delta.step_id],
                    |row| row.get(0),
                )
                .optional()?;
            let Some(json) = json else {
                continue;
            };
            let mut step: ComputedStepSchedule = serde_json::from_str(&json)?;
            step.start_date = delta.new_start;
            step.due_date = delta.new_due;
            if step.start_date > step.due_date {
                return Err(PersistenceError::InvalidData(format!(
                    "delta for step {} starts {} after its due date {}",
                    step.step_id, step.start_date, step.due_date
                )));
            }
            tx.execute(
                "UPDATE plan_steps SET step_json = ?1 WHERE case_id = ?2 AND step_id = ?3",
                params![serde_json::to_string(&step)?, case_id, delta.step_id],
            )?;
            updated += 1;
        }
        tx.commit()?;
        Ok(updated)
    }
}

fn parse_stored_date(input: &str) -> PersistenceResult<NaiveDate> {
    parse_date(input)
        .map_err(|e| PersistenceError::InvalidData(format!("invalid stored date '{input}': {e}")))
}

/// Holiday source backed by a `holidays(country, date, name)` table.
pub struct SqliteHolidayStore {
    connection: Mutex<Connection>,
}

impl SqliteHolidayStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, CalendarError> {
        Self::from_connection(Connection::open(path)?)
    }

    pub fn in_memory() -> Result<Self, CalendarError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(connection: Connection) -> Result<Self, CalendarError> {
        connection.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS holidays (
                country TEXT NOT NULL,
                date TEXT NOT NULL,
                name TEXT NOT NULL DEFAULT '',
                PRIMARY KEY (country, date)
            );
        "#,
        )?;
        Ok(Self {
            connection: Mutex::new(connection),
        })
    }

    fn lock(&self, country: &str) -> Result<MutexGuard<'_, Connection>, CalendarError> {
        self.connection.lock().map_err(|_| CalendarError::Lookup {
            country: country.to_string(),
            message: "holiday store lock poisoned".into(),
        })
    }

    /// Insert or rename one holiday.
    pub fn insert_holiday(
        &self,
        country: &str,
        date: NaiveDate,
        name: &str,
    ) -> Result<(), CalendarError> {
        let conn = self.lock(country)?;
        conn.execute(
            "INSERT INTO holidays (country, date, name) VALUES (?1, ?2, ?3)
             ON CONFLICT(country, date) DO UPDATE SET name = excluded.name",
            params![country_key(country), date.to_string(), name],
        )?;
        Ok(())
    }

    /// Bulk insert in one transaction. Returns the number of rows written.
    pub fn import<I>(&self, country: &str, dates: I) -> Result<usize, CalendarError>
    where
        I: IntoIterator<Item = NaiveDate>,
    {
        let mut conn = self.lock(country)?;
        let tx = conn.transaction()?;
        let mut count = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO holidays (country, date) VALUES (?1, ?2)
                 ON CONFLICT(country, date) DO NOTHING",
            )?;
            let key = country_key(country);
            for date in dates {
                count += stmt.execute(params![key, date.to_string()])?;
            }
        }
        tx.commit()?;
        Ok(count)
    }
}

impl HolidayLookup for SqliteHolidayStore {
    fn holidays(
        &self,
        country: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<NaiveDate>, CalendarError> {
        check_range(country, start, end)?;
        let conn = self.lock(country)?;
        let mut stmt = conn.prepare(
            "SELECT date FROM holidays WHERE country = ?1 AND date BETWEEN ?2 AND ?3 ORDER BY date",
        )?;
        let rows = stmt.query_map(
            params![country_key(country), start.to_string(), end.to_string()],
            |row| row.get::<_, String>(0),
        )?;

        let mut dates = Vec::new();
        for raw in rows {
            let raw = raw?;
            let date = parse_date(&raw).map_err(|e| CalendarError::Lookup {
                country: country.to_string(),
                message: format!("invalid stored date '{raw}': {e}"),
            })?;
            dates.push(date);
        }
        Ok(dates)
    }
}
