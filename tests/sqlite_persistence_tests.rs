#![cfg(feature = "sqlite")]

use std::sync::Arc;

use case_schedule::persistence::{PersistenceError, PlanStore, SqliteHolidayStore, SqlitePlanStore};
use case_schedule::{
    AnchorBasis, EngineConfig, HolidayLookup, LockedStepSnapshot, ProcessTemplateGraph,
    ScheduleEngine, StepDefinition,
};
use case_schedule::calendar::holidays::japanese_holidays;
use chrono::NaiveDate;
use tempfile::NamedTempFile;

fn d(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn template() -> ProcessTemplateGraph {
    ProcessTemplateGraph::new(
        "residence",
        vec![
            StepDefinition::new(1, "Collect", AnchorBasis::Goal, -30),
            StepDefinition::new(2, "Draft", AnchorBasis::Previous, 2).with_predecessors([1]),
            StepDefinition::new(3, "Sign", AnchorBasis::Goal, -5),
        ],
    )
}

fn holiday_store() -> SqliteHolidayStore {
    let store = SqliteHolidayStore::in_memory().unwrap();
    for year in 2025..=2026 {
        store.import("JP", japanese_holidays(year)).unwrap();
    }
    store
}

#[test]
fn plan_store_round_trip() {
    let file = NamedTempFile::new().unwrap();
    let store = SqlitePlanStore::new(file.path()).unwrap();
    let engine = ScheduleEngine::new(EngineConfig::default(), holiday_store());
    let plan = engine
        .compute_schedule(&template(), d(2026, 2, 27), &[], None)
        .unwrap();

    store.save_plan("case-1", &plan).expect("save plan");
    let loaded = store
        .load_plan("case-1")
        .expect("load plan")
        .expect("plan exists");
    assert_eq!(loaded, plan);
    assert!(store.load_plan("case-2").unwrap().is_none());

    // Saving again replaces the stored steps.
    let later = engine
        .compute_schedule(&template(), d(2026, 3, 13), &[], None)
        .unwrap();
    store.save_plan("case-1", &later).unwrap();
    assert_eq!(store.load_plan("case-1").unwrap().unwrap(), later);
}

#[test]
fn replan_deltas_apply_to_stored_plan() {
    let store = SqlitePlanStore::in_memory().unwrap();
    let engine = ScheduleEngine::new(EngineConfig::default(), holiday_store());
    let template = template();

    let original = engine
        .compute_schedule(&template, d(2026, 2, 27), &[], None)
        .unwrap();
    store.save_plan("case-7", &original).unwrap();

    let existing: Vec<LockedStepSnapshot> = original
        .steps
        .iter()
        .map(|step| LockedStepSnapshot::from_computed(step, step.step_id == 3))
        .collect();
    let replan = engine
        .replan(&template, d(2026, 3, 13), &existing, None)
        .unwrap();
    assert_eq!(replan.deltas.len(), 2);

    let updated = store.apply_deltas("case-7", &replan.deltas).unwrap();
    assert_eq!(updated, 2);

    let stored = store.load_plan("case-7").unwrap().unwrap();
    for step in &replan.plan.steps {
        let saved = stored.step(step.step_id).unwrap();
        assert_eq!(saved.due_date, step.due_date);
        assert_eq!(saved.start_date, step.start_date);
    }
    // The header still reflects the saved plan, not the replan.
    assert_eq!(stored.goal_date, d(2026, 2, 27));
}

#[test]
fn deltas_for_unknown_case_are_not_found() {
    let store = SqlitePlanStore::in_memory().unwrap();
    match store.apply_deltas("missing", &[]) {
        Err(PersistenceError::NotFound(case)) => assert_eq!(case, "missing"),
        other => panic!("expected not found, got {other:?}"),
    }
}

#[test]
fn holiday_store_answers_ranged_lookups() {
    let store = holiday_store();
    store
        .insert_holiday("jp", d(2025, 12, 30), "Year-end closure")
        .unwrap();

    let found = store.holidays("JP", d(2025, 12, 29), d(2026, 1, 5)).unwrap();
    assert_eq!(found, vec![d(2025, 12, 30), d(2026, 1, 1)]);
    assert!(store.holidays("US", d(2025, 1, 1), d(2025, 12, 31)).unwrap().is_empty());

    // Duplicates are skipped on import.
    assert_eq!(store.import("JP", [d(2025, 12, 30), d(2025, 12, 31)]).unwrap(), 1);
}

#[test]
fn shared_holiday_store_serves_parallel_requests() {
    let store = Arc::new(holiday_store());
    let engine = ScheduleEngine::new(EngineConfig::default(), Arc::clone(&store));
    let requests: Vec<_> = [d(2025, 5, 9), d(2025, 11, 28), d(2026, 3, 31)]
        .into_iter()
        .map(|goal_date| case_schedule::ScheduleRequest {
            template: template(),
            goal_date,
            existing: Vec::new(),
            country: None,
        })
        .collect();
    let results = engine.compute_many(&requests);
    assert!(results.iter().all(Result::is_ok));
}
