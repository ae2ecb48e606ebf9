pub mod critical_path;
pub mod diff;
pub mod propagation;
pub mod validation;

pub use critical_path::{SlackAnalysis, StepSlack};
pub use diff::diff_schedule;
pub use propagation::{SchedulePropagator, check_goal_date, planning_window};
pub use validation::{ScheduleValidator, Violation};
