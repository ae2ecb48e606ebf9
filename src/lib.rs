pub mod calculations;
pub mod calendar;
pub mod config;
pub mod error;
pub mod graph;
pub mod persistence;
pub mod plan;
pub mod schedule;
pub mod template;

pub use calculations::{StepSlack, Violation};
pub use calendar::{BusinessDayCalculator, Direction, HolidayLookup, HolidayWindow, StaticHolidayCalendar};
pub use config::EngineConfig;
pub use error::{CalendarError, ErrorClass, ScheduleError, ScheduleResult};
pub use plan::{ComputedStepSchedule, LockedStepSnapshot, PlanSummary, ScheduleDelta, SchedulePlan};
pub use schedule::{Replan, ScheduleEngine, ScheduleRequest};
pub use template::{AnchorBasis, ProcessTemplateGraph, StepDefinition, StepId};
