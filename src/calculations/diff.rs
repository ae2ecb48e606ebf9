use std::collections::HashSet;

use crate::plan::{LockedStepSnapshot, ScheduleDelta, SchedulePlan};
use crate::template::StepId;

/// Changes needed to move persisted steps onto `new_plan`.
///
/// Locked steps are never reported, whether they are named in `locked_ids`
/// or flagged on the snapshot itself. Steps missing from the new plan are
/// left to the caller.
pub fn diff_schedule(
    new_plan: &SchedulePlan,
    existing: &[LockedStepSnapshot],
    locked_ids: &HashSet<StepId>,
) -> Vec<ScheduleDelta> {
    existing
        .iter()
        .filter(|snapshot| !snapshot.locked && !locked_ids.contains(&snapshot.step_id))
        .filter_map(|snapshot| {
            let computed = new_plan.step(snapshot.step_id)?;
            let unchanged = snapshot.start_date == Some(computed.start_date)
                && snapshot.due_date == computed.due_date;
            (!unchanged).then(|| ScheduleDelta {
                step_id: snapshot.step_id,
                old_start: snapshot.start_date,
                old_due: snapshot.due_date,
                new_start: computed.start_date,
                new_due: computed.due_date,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::ComputedStepSchedule;
    use chrono::NaiveDate;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn plan() -> SchedulePlan {
        let step = |id, start, due| ComputedStepSchedule {
            step_id: id,
            name: format!("S{id}"),
            start_date: start,
            due_date: due,
            predecessors: Vec::new(),
            locked: false,
        };
        SchedulePlan {
            goal_date: d(2025, 12, 31),
            country_code: "JP".into(),
            steps: vec![
                step(1, d(2025, 12, 1), d(2025, 12, 5)),
                step(2, d(2025, 12, 8), d(2025, 12, 10)),
                step(3, d(2025, 12, 11), d(2025, 12, 12)),
            ],
        }
    }

    #[test]
    fn unchanged_steps_produce_nothing() {
        let existing = vec![LockedStepSnapshot::unlocked(1, d(2025, 12, 1), d(2025, 12, 5))];
        assert!(diff_schedule(&plan(), &existing, &HashSet::new()).is_empty());
    }

    #[test]
    fn reports_start_or_due_changes_exactly() {
        let existing = vec![
            LockedStepSnapshot::unlocked(1, d(2025, 12, 2), d(2025, 12, 5)),
            LockedStepSnapshot::unlocked(2, d(2025, 12, 8), d(2025, 12, 9)),
        ];
        let deltas = diff_schedule(&plan(), &existing, &HashSet::new());
        assert_eq!(deltas.len(), 2);
        assert_eq!(deltas[0].step_id, 1);
        assert_eq!(deltas[0].old_start, Some(d(2025, 12, 2)));
        assert_eq!(deltas[0].new_start, d(2025, 12, 1));
        assert_eq!(deltas[1].new_due, d(2025, 12, 10));
        assert_eq!(deltas[1].due_shift_days(), 1);
    }

    #[test]
    fn locked_and_removed_steps_are_skipped() {
        let existing = vec![
            LockedStepSnapshot::unlocked(1, d(2025, 11, 1), d(2025, 11, 5)),
            LockedStepSnapshot::locked(2, d(2025, 11, 10)),
            LockedStepSnapshot::unlocked(3, d(2025, 11, 11), d(2025, 11, 12)),
            LockedStepSnapshot::unlocked(42, d(2025, 11, 11), d(2025, 11, 12)),
        ];
        let locked_ids = HashSet::from([3]);
        let deltas = diff_schedule(&plan(), &existing, &locked_ids);
        assert_eq!(deltas.iter().map(|d| d.step_id).collect::<Vec<_>>(), vec![1]);
    }

    #[test]
    fn missing_previous_start_counts_as_change() {
        let mut snapshot = LockedStepSnapshot::unlocked(3, d(2025, 12, 11), d(2025, 12, 12));
        snapshot.start_date = None;
        let deltas = diff_schedule(&plan(), &[snapshot], &HashSet::new());
        assert_eq!(deltas.len(), 1);
        assert_eq!(deltas[0].old_start, None);
    }
}
