use petgraph::Direction;
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::{HashMap, VecDeque};

use crate::error::{ScheduleError, ScheduleResult};
use crate::template::{StepDefinition, StepId};

/// Dependency graph over template steps. Edges run predecessor -> dependent
/// and nodes are added in template order, so node indices double as the
/// insertion-order tie-break.
pub struct ScheduleDag {
    pub graph: DiGraph<StepId, ()>,
    pub id_to_index: HashMap<StepId, NodeIndex>,
}

impl ScheduleDag {
    /// Build from explicit predecessor lists. The sequence fallback of a
    /// `Previous` step without predecessors is not an edge.
    pub fn build(steps: &[StepDefinition]) -> ScheduleResult<Self> {
        let mut graph: DiGraph<StepId, ()> = DiGraph::with_capacity(steps.len(), steps.len());
        let mut id_to_index: HashMap<StepId, NodeIndex> = HashMap::with_capacity(steps.len());

        for step in steps {
            if id_to_index.contains_key(&step.id) {
                return Err(ScheduleError::InvalidStep {
                    step: step.id,
                    reason: "duplicate step id".into(),
                });
            }
            id_to_index.insert(step.id, graph.add_node(step.id));
        }

        for step in steps {
            let to = id_to_index[&step.id];
            for &pred in &step.predecessors {
                let from = *id_to_index
                    .get(&pred)
                    .ok_or(ScheduleError::DanglingDependency {
                        step: step.id,
                        missing: pred,
                    })?;
                graph.update_edge(from, to, ());
            }
        }

        Ok(Self { graph, id_to_index })
    }

    pub fn predecessors(&self, id: StepId) -> Vec<StepId> {
        self.neighbors(id, Direction::Incoming)
    }

    pub fn dependents(&self, id: StepId) -> Vec<StepId> {
        self.neighbors(id, Direction::Outgoing)
    }

    fn neighbors(&self, id: StepId, direction: Direction) -> Vec<StepId> {
        let Some(&index) = self.id_to_index.get(&id) else {
            return Vec::new();
        };
        let mut found: Vec<NodeIndex> = self.graph.neighbors_directed(index, direction).collect();
        found.sort();
        found.into_iter().map(|ix| self.graph[ix]).collect()
    }

    /// Kahn's algorithm. Among simultaneously ready steps the one that
    /// appears first in the input wins.
    pub fn topological_order(&self) -> ScheduleResult<Vec<StepId>> {
        let mut in_degree: Vec<usize> = self
            .graph
            .node_indices()
            .map(|ix| {
                self.graph
                    .neighbors_directed(ix, Direction::Incoming)
                    .count()
            })
            .collect();

        let mut ready: VecDeque<NodeIndex> = self
            .graph
            .node_indices()
            .filter(|ix| in_degree[ix.index()] == 0)
            .collect();
        let mut order = Vec::with_capacity(self.graph.node_count());

        while let Some(node) = ready.pop_front() {
            order.push(self.graph[node]);
            let mut released: Vec<NodeIndex> = Vec::new();
            for next in self.graph.neighbors_directed(node, Direction::Outgoing) {
                let degree = &mut in_degree[next.index()];
                *degree -= 1;
                if *degree == 0 {
                    released.push(next);
                }
            }
            released.sort();
            ready.extend(released);
        }

        if order.len() < self.graph.node_count() {
            return Err(ScheduleError::CircularDependency {
                steps: self.cycle_members(),
            });
        }
        Ok(order)
    }

    /// Steps that sit on at least one cycle, sorted by id.
    pub fn cycle_members(&self) -> Vec<StepId> {
        let mut members: Vec<StepId> = tarjan_scc(&self.graph)
            .into_iter()
            .filter(|component| {
                component.len() > 1
                    || component
                        .first()
                        .is_some_and(|&ix| self.graph.contains_edge(ix, ix))
            })
            .flatten()
            .map(|ix| self.graph[ix])
            .collect();
        members.sort_unstable();
        members
    }
}

/// Processing order for `steps`, or `CircularDependency`.
pub fn topological_order(steps: &[StepDefinition]) -> ScheduleResult<Vec<StepId>> {
    ScheduleDag::build(steps)?.topological_order()
}
