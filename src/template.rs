use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use crate::error::{ScheduleError, ScheduleResult};

pub type StepId = i32;

/// Largest accepted offset magnitude, in days.
pub const MAX_OFFSET_DAYS: i32 = 365;

/// What a step's due date is measured from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnchorBasis {
    /// Counted back from the goal date.
    #[serde(alias = "GOAL", alias = "Goal")]
    Goal,
    /// Counted forward from the latest predecessor's due date.
    #[serde(alias = "PREVIOUS", alias = "Previous")]
    Previous,
}

impl AnchorBasis {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnchorBasis::Goal => "goal",
            AnchorBasis::Previous => "previous",
        }
    }
}

impl fmt::Display for AnchorBasis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnchorBasis {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "goal" => Ok(AnchorBasis::Goal),
            "previous" | "prev" => Ok(AnchorBasis::Previous),
            other => Err(format!("unknown anchor basis '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepDefinition {
    pub id: StepId,
    /// Ordering used for implicit predecessors; ties keep template order.
    #[serde(default)]
    pub sequence: i32,
    pub name: String,
    pub basis: AnchorBasis,
    /// Signed day count; only the magnitude is used.
    #[serde(default)]
    pub offset_days: i32,
    #[serde(default, deserialize_with = "deserialize_id_list")]
    pub predecessors: Vec<StepId>,
    #[serde(default, deserialize_with = "deserialize_string_list")]
    pub required_artifacts: Vec<String>,
}

impl StepDefinition {
    pub fn new(id: StepId, name: impl Into<String>, basis: AnchorBasis, offset_days: i32) -> Self {
        Self {
            id,
            sequence: id,
            name: name.into(),
            basis,
            offset_days,
            predecessors: Vec::new(),
            required_artifacts: Vec::new(),
        }
    }

    pub fn with_sequence(mut self, sequence: i32) -> Self {
        self.sequence = sequence;
        self
    }

    pub fn with_predecessors(mut self, predecessors: impl IntoIterator<Item = StepId>) -> Self {
        self.predecessors = predecessors.into_iter().collect();
        self
    }

    pub fn with_artifacts<I, S>(mut self, artifacts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_artifacts = artifacts.into_iter().map(Into::into).collect();
        self
    }

    pub fn offset_magnitude(&self) -> i64 {
        i64::from(self.offset_days.unsigned_abs())
    }

    /// Business days the step spans, never less than one.
    pub fn duration_days(&self) -> i64 {
        self.offset_magnitude().max(1)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessTemplateGraph {
    #[serde(default)]
    pub id: i32,
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_active")]
    pub active: bool,
    pub steps: Vec<StepDefinition>,
}

fn default_active() -> bool {
    true
}

impl ProcessTemplateGraph {
    pub fn new(name: impl Into<String>, steps: Vec<StepDefinition>) -> Self {
        Self {
            id: 0,
            name: name.into(),
            active: true,
            steps,
        }
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn step(&self, id: StepId) -> Option<&StepDefinition> {
        self.steps.iter().find(|step| step.id == id)
    }

    pub fn contains(&self, id: StepId) -> bool {
        self.step(id).is_some()
    }

    /// The step ordered just before `id` by sequence number, ties broken by
    /// position in the template.
    pub fn preceding_by_sequence(&self, id: StepId) -> Option<&StepDefinition> {
        let ordered = self.ordered_by_sequence();
        let index = ordered.iter().position(|step| step.id == id)?;
        index.checked_sub(1).map(|prev| ordered[prev])
    }

    /// Steps sorted by sequence number; equal numbers keep template order.
    pub fn ordered_by_sequence(&self) -> Vec<&StepDefinition> {
        let mut ordered: Vec<&StepDefinition> = self.steps.iter().collect();
        ordered.sort_by_key(|step| step.sequence);
        ordered
    }

    /// Predecessors a step is anchored on at computation time. A `Previous`
    /// step without explicit predecessors falls back to the step before it
    /// by sequence; that fallback never becomes a dependency edge.
    pub fn resolved_predecessors(&self, step: &StepDefinition) -> Vec<StepId> {
        if !step.predecessors.is_empty() || step.basis != AnchorBasis::Previous {
            return step.predecessors.clone();
        }
        self.preceding_by_sequence(step.id)
            .map(|prev| vec![prev.id])
            .unwrap_or_default()
    }

    /// Inactive templates can be loaded and stored but not scheduled.
    pub fn ensure_active(&self) -> ScheduleResult<()> {
        if self.active {
            Ok(())
        } else {
            Err(ScheduleError::InactiveTemplate {
                name: self.name.clone(),
            })
        }
    }

    /// Structural checks that must pass before any date math.
    pub fn validate(&self) -> ScheduleResult<()> {
        let mut seen = HashSet::with_capacity(self.steps.len());
        for step in &self.steps {
            if !seen.insert(step.id) {
                return Err(ScheduleError::InvalidStep {
                    step: step.id,
                    reason: "duplicate step id".into(),
                });
            }
            validate_step(step)?;
        }
        for step in &self.steps {
            for &pred in &step.predecessors {
                if pred == step.id {
                    return Err(ScheduleError::CircularDependency {
                        steps: vec![step.id],
                    });
                }
                if !seen.contains(&pred) {
                    return Err(ScheduleError::DanglingDependency {
                        step: step.id,
                        missing: pred,
                    });
                }
            }
        }
        Ok(())
    }
}

pub fn validate_step(step: &StepDefinition) -> ScheduleResult<()> {
    if step.offset_days.unsigned_abs() > MAX_OFFSET_DAYS.unsigned_abs() {
        return Err(ScheduleError::InvalidStep {
            step: step.id,
            reason: format!(
                "offset {} is outside [-{MAX_OFFSET_DAYS}, {MAX_OFFSET_DAYS}]",
                step.offset_days
            ),
        });
    }
    Ok(())
}

#[derive(Deserialize)]
#[serde(untagged)]
enum IdListRepr {
    List(Vec<StepId>),
    Text(String),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StringListRepr {
    List(Vec<String>),
    Text(String),
}

/// Accepts `[1, 2]`, `"[1, 2]"` or `"1, 2"`; null and blank mean empty.
fn deserialize_id_list<'de, D>(deserializer: D) -> Result<Vec<StepId>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<IdListRepr>::deserialize(deserializer)? {
        None => Ok(Vec::new()),
        Some(IdListRepr::List(ids)) => Ok(ids),
        Some(IdListRepr::Text(text)) => parse_id_list(&text).map_err(de::Error::custom),
    }
}

fn deserialize_string_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<StringListRepr>::deserialize(deserializer)? {
        None => Ok(Vec::new()),
        Some(StringListRepr::List(items)) => Ok(items),
        Some(StringListRepr::Text(text)) => {
            let trimmed = text.trim();
            if trimmed.is_empty() {
                Ok(Vec::new())
            } else if trimmed.starts_with('[') {
                serde_json::from_str(trimmed).map_err(de::Error::custom)
            } else {
                Ok(vec![trimmed.to_string()])
            }
        }
    }
}

pub fn parse_id_list(text: &str) -> Result<Vec<StepId>, String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    if trimmed.starts_with('[') {
        return serde_json::from_str(trimmed)
            .map_err(|err| format!("invalid predecessor list '{trimmed}': {err}"));
    }
    trimmed
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse::<StepId>()
                .map_err(|err| format!("invalid predecessor id '{part}': {err}"))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain() -> ProcessTemplateGraph {
        ProcessTemplateGraph::new(
            "chain",
            vec![
                StepDefinition::new(1, "Kickoff", AnchorBasis::Goal, -30),
                StepDefinition::new(2, "Draft", AnchorBasis::Previous, 2).with_predecessors([1]),
                StepDefinition::new(3, "Review", AnchorBasis::Previous, 3),
            ],
        )
    }

    #[test]
    fn predecessors_accept_stored_text_forms() {
        let json = r#"{
            "id": 7, "sequence": 3, "name": "Sign", "basis": "PREVIOUS",
            "offset_days": 4, "predecessors": "[1, 2]", "required_artifacts": "[\"contract\"]"
        }"#;
        let step: StepDefinition = serde_json::from_str(json).unwrap();
        assert_eq!(step.basis, AnchorBasis::Previous);
        assert_eq!(step.predecessors, vec![1, 2]);
        assert_eq!(step.required_artifacts, vec!["contract".to_string()]);

        let json = r#"{"id": 8, "sequence": 4, "name": "File", "basis": "goal", "predecessors": "3, 5"}"#;
        let step: StepDefinition = serde_json::from_str(json).unwrap();
        assert_eq!(step.predecessors, vec![3, 5]);
        assert_eq!(step.offset_days, 0);

        let json = r#"{"id": 9, "sequence": 5, "name": "Close", "basis": "goal", "predecessors": null}"#;
        let step: StepDefinition = serde_json::from_str(json).unwrap();
        assert!(step.predecessors.is_empty());
    }

    #[test]
    fn malformed_predecessor_text_is_rejected() {
        let json = r#"{"id": 1, "sequence": 1, "name": "X", "basis": "goal", "predecessors": "a,b"}"#;
        assert!(serde_json::from_str::<StepDefinition>(json).is_err());
    }

    #[test]
    fn previous_step_without_predecessors_resolves_to_prior_sequence() {
        let template = chain();
        let review = template.step(3).unwrap();
        assert_eq!(template.resolved_predecessors(review), vec![2]);

        let kickoff = template.step(1).unwrap();
        assert!(template.resolved_predecessors(kickoff).is_empty());
    }

    #[test]
    fn validate_rejects_duplicates_offsets_and_dangling_refs() {
        let mut template = chain();
        template.steps.push(StepDefinition::new(2, "Again", AnchorBasis::Goal, 1));
        assert!(matches!(
            template.validate(),
            Err(ScheduleError::InvalidStep { step: 2, .. })
        ));

        let mut template = chain();
        template.steps[0].offset_days = -366;
        assert!(matches!(
            template.validate(),
            Err(ScheduleError::InvalidStep { step: 1, .. })
        ));

        let mut template = chain();
        template.steps[1].predecessors = vec![42];
        assert!(matches!(
            template.validate(),
            Err(ScheduleError::DanglingDependency { step: 2, missing: 42 })
        ));

        assert!(chain().validate().is_ok());
    }

    #[test]
    fn duration_is_at_least_one_day() {
        assert_eq!(StepDefinition::new(1, "A", AnchorBasis::Goal, 0).duration_days(), 1);
        assert_eq!(StepDefinition::new(1, "A", AnchorBasis::Goal, -12).duration_days(), 12);
    }
}
