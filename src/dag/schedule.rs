// src/dag/schedule.rs

//! The execution plan: units, their requirements, and readiness state.

use petgraph::algo::toposort;
use petgraph::dot::{Config, Dot};
use petgraph::graphmap::DiGraphMap;
use tracing::{debug, warn};

use crate::dag::dependency::{
    Condition, Dependency, GroupId, Identifier, UnitLookup, resolve_dependencies,
};
use crate::dag::readiness::{self, Requirement, UnitRunState};
use crate::dag::unit::{Identify, Unit, UnitId};
use crate::errors::{MiddagError, Result};
use crate::state::SharedState;

/// A dependency-ordered, optionally concurrency-capped execution plan.
///
/// A schedule is consumed once: callers repeatedly ask for
/// [`next_ready`](Schedule::next_ready) units, run them, and report each
/// back with [`complete`](Schedule::complete) so dependents can be released.
/// Every unit is handed out exactly once.
#[derive(Debug)]
pub struct Schedule<P> {
    units: Vec<Unit<P>>,
    /// Side table keyed by dependent: the edges it waits on.
    requirements: Vec<Vec<Requirement>>,
    states: Vec<UnitRunState>,
    /// Maximum units in flight; `None` means only the graph limits dispatch.
    concurrency: Option<usize>,
    in_flight: usize,
}

/// Build a schedule from payloads and symbolic dependencies.
pub fn generate_schedule<P: Identify>(
    payloads: Vec<P>,
    dependencies: Vec<Dependency<Identifier>>,
) -> Result<Schedule<P>> {
    Schedule::generate(payloads, dependencies)
}

impl<P: Identify> Schedule<P> {
    /// Build phase.
    ///
    /// 1. Flag each unit by whether it appears as a dependent / prerequisite.
    /// 2. Push the units in declaration order.
    /// 3. Resolve symbolic endpoints and register every edge.
    ///
    /// Fails with `Configuration` on unresolved references and with
    /// `Scheduling` if the unconditional, ungrouped edges form a cycle.
    pub fn generate(payloads: Vec<P>, dependencies: Vec<Dependency<Identifier>>) -> Result<Self> {
        let lookup = UnitLookup::from_payloads(&payloads);

        let mut has_prerequisites = vec![false; payloads.len()];
        let mut has_dependents = vec![false; payloads.len()];
        for dependency in &dependencies {
            if let Some(id) = lookup.get(&dependency.dependent) {
                has_prerequisites[id.index()] = true;
            }
            if let Some(id) = lookup.get(&dependency.prerequisite) {
                has_dependents[id.index()] = true;
            }
        }

        let mut schedule = Self::empty();
        for (index, payload) in payloads.into_iter().enumerate() {
            schedule.push(payload, has_prerequisites[index], has_dependents[index]);
        }

        for dependency in resolve_dependencies(dependencies, &lookup)? {
            schedule.require(
                dependency.dependent,
                dependency.prerequisite,
                dependency.condition,
                dependency.group,
            )?;
        }

        schedule.check_acyclic()?;

        debug!(
            units = schedule.len(),
            edges = schedule.edge_count(),
            "schedule generated"
        );

        Ok(schedule)
    }

    /// Record that `dependent` waits on `prerequisite`.
    pub fn require(
        &mut self,
        dependent: UnitId,
        prerequisite: UnitId,
        condition: Option<Condition>,
        group: Option<GroupId>,
    ) -> Result<()> {
        for id in [dependent, prerequisite] {
            if id.index() >= self.units.len() {
                return Err(MiddagError::scheduling(format!(
                    "edge refers to {id}, but the schedule has {} units",
                    self.units.len()
                )));
            }
        }
        if dependent == prerequisite {
            return Err(MiddagError::config(format!(
                "unit '{}' cannot depend on itself",
                self.label(dependent)
            )));
        }
        if self.states[dependent.index()] != UnitRunState::Pending {
            return Err(MiddagError::scheduling(format!(
                "cannot add a requirement to unit '{}' after it was dispatched",
                self.label(dependent)
            )));
        }

        self.requirements[dependent.index()].push(Requirement::new(prerequisite, condition, group));
        Ok(())
    }

    /// Reject cycles among edges that can never be bypassed.
    ///
    /// Cycles that run through a conditional or grouped edge may still
    /// resolve at run time; if they do not, traversal reports a stall.
    pub fn check_acyclic(&self) -> Result<()> {
        let hard_edges = self.requirements.iter().enumerate().flat_map(|(dependent, reqs)| {
            reqs.iter()
                .filter(|r| r.condition().is_none() && r.group().is_none())
                .map(move |r| (r.prerequisite().index(), dependent))
        });

        match find_cycle(self.units.len(), hard_edges) {
            None => Ok(()),
            Some(index) => Err(MiddagError::scheduling(format!(
                "cycle detected in schedule involving unit '{}'",
                self.label(UnitId::new(index))
            ))),
        }
    }

    /// Hand out every unit that is ready now, up to the concurrency cap, and
    /// mark them as dispatched.
    ///
    /// Conditions are evaluated here, against `state`. Returns an empty list
    /// when nothing can be dispatched yet. Fails with `Scheduling` when units
    /// are pending, none is ready and none is in flight: nothing could ever
    /// release them.
    pub fn next_ready(&mut self, state: &SharedState) -> Result<Vec<UnitId>> {
        let capacity = match self.concurrency {
            Some(cap) => cap.saturating_sub(self.in_flight),
            None => usize::MAX,
        };

        let mut ready = Vec::new();

        for index in 0..self.units.len() {
            if ready.len() >= capacity {
                break;
            }
            if self.states[index] != UnitRunState::Pending {
                continue;
            }

            let readiness = readiness::evaluate(&mut self.requirements[index], &self.states, state);

            for prerequisite in &readiness.newly_skipped {
                warn!(
                    unit = %self.units[index].label(),
                    prerequisite = %self.units[prerequisite.index()].label(),
                    "condition evaluated false; edge skipped"
                );
            }

            if readiness.is_ready() {
                self.states[index] = UnitRunState::Running;
                self.in_flight += 1;
                ready.push(UnitId::new(index));
            }
        }

        if ready.is_empty() && self.in_flight == 0 && !self.is_exhausted() {
            let stuck: Vec<String> = self.pending().map(|id| self.label(id)).collect();
            return Err(MiddagError::scheduling(format!(
                "schedule stalled: no unit is ready and none is running; waiting: {}",
                stuck.join(", ")
            )));
        }

        Ok(ready)
    }

    /// Report a dispatched unit as finished.
    pub fn complete(&mut self, id: UnitId) -> Result<()> {
        let Some(state) = self.states.get_mut(id.index()) else {
            return Err(MiddagError::scheduling(format!("completion for unknown unit {id}")));
        };
        if *state != UnitRunState::Running {
            return Err(MiddagError::scheduling(format!(
                "completion for unit '{}' which is {:?}, not running",
                self.units[id.index()].label(),
                state
            )));
        }

        *state = UnitRunState::Done;
        self.in_flight -= 1;

        debug!(
            unit = %self.label(id),
            in_flight = self.in_flight,
            "unit completed"
        );

        Ok(())
    }

    /// Drive the schedule to the end without running anything, completing
    /// each batch as soon as it is handed out. Returns the dispatch waves.
    pub fn simulate(&mut self, state: &SharedState) -> Result<Vec<Vec<UnitId>>> {
        let mut waves = Vec::new();
        while !self.is_exhausted() {
            let wave = self.next_ready(state)?;
            for id in &wave {
                self.complete(*id)?;
            }
            waves.push(wave);
        }
        Ok(waves)
    }

    pub fn label(&self, id: UnitId) -> String {
        self.units
            .get(id.index())
            .map(|u| u.label())
            .unwrap_or_else(|| id.to_string())
    }

    /// Graphviz rendering of the dependency graph.
    ///
    /// One node per unit, labelled with the unit label, and one edge per
    /// requirement pointing from prerequisite to dependent. Edges carry their
    /// condition and group, if any.
    pub fn to_dot(&self) -> String {
        let mut graph: DiGraphMap<usize, String> = DiGraphMap::new();
        for index in 0..self.units.len() {
            graph.add_node(index);
        }
        for (dependent, requirements) in self.requirements.iter().enumerate() {
            for requirement in requirements {
                let label = edge_label(requirement);
                let prerequisite = requirement.prerequisite().index();
                match graph.edge_weight_mut(prerequisite, dependent) {
                    Some(existing) if !label.is_empty() => {
                        if !existing.is_empty() {
                            existing.push_str("; ");
                        }
                        existing.push_str(&label);
                    }
                    Some(_) => {}
                    None => {
                        graph.add_edge(prerequisite, dependent, label);
                    }
                }
            }
        }

        let labels: Vec<String> = self.units.iter().map(|u| u.label()).collect();
        let node_attrs = |_, (index, _)| format!("label = {:?}", labels[index]);
        let dot = Dot::with_attr_getters(
            &graph,
            &[Config::NodeNoLabel, Config::EdgeNoLabel],
            &|_, (_, _, label)| {
                if label.is_empty() {
                    String::new()
                } else {
                    format!("label = {label:?}, style = dashed")
                }
            },
            &node_attrs,
        );
        format!("{dot:?}")
    }
}

fn edge_label(requirement: &Requirement) -> String {
    let mut parts = Vec::new();
    if let Some(condition) = requirement.condition() {
        parts.push(condition.description().to_string());
    }
    if let Some(group) = requirement.group() {
        parts.push(format!("group {group}"));
    }
    parts.join(", ")
}

impl<P> Schedule<P> {
    fn empty() -> Self {
        Self {
            units: Vec::new(),
            requirements: Vec::new(),
            states: Vec::new(),
            concurrency: None,
            in_flight: 0,
        }
    }

    /// Append a unit; its id is its position.
    pub fn push(&mut self, payload: P, has_prerequisites: bool, has_dependents: bool) -> UnitId {
        let id = UnitId::new(self.units.len());
        self.units
            .push(Unit::new(id, payload, has_prerequisites, has_dependents));
        self.requirements.push(Vec::new());
        self.states.push(UnitRunState::Pending);
        id
    }

    /// Cap the number of units in flight at once.
    pub fn with_concurrency(mut self, cap: usize) -> Result<Self> {
        if cap == 0 {
            return Err(MiddagError::config("concurrency must be >= 1 (got 0)"));
        }
        self.concurrency = Some(cap);
        Ok(self)
    }

    pub fn concurrency(&self) -> Option<usize> {
        self.concurrency
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn edge_count(&self) -> usize {
        self.requirements.iter().map(Vec::len).sum()
    }

    pub fn units(&self) -> &[Unit<P>] {
        &self.units
    }

    pub fn unit(&self, id: UnitId) -> Option<&Unit<P>> {
        self.units.get(id.index())
    }

    pub fn requirements_of(&self, id: UnitId) -> &[Requirement] {
        self.requirements
            .get(id.index())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn run_state_of(&self, id: UnitId) -> Option<UnitRunState> {
        self.states.get(id.index()).copied()
    }

    /// Outstanding requirements of a unit, without evaluating conditions.
    pub fn remaining_requirements(&self, id: UnitId) -> usize {
        readiness::count_remaining(self.requirements_of(id), &self.states)
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    /// Every unit has been handed out.
    pub fn is_exhausted(&self) -> bool {
        !self.states.contains(&UnitRunState::Pending)
    }

    /// Every unit has been handed out and reported complete.
    pub fn is_finished(&self) -> bool {
        self.states.iter().all(|s| *s == UnitRunState::Done)
    }

    fn pending(&self) -> impl Iterator<Item = UnitId> + '_ {
        self.states
            .iter()
            .enumerate()
            .filter(|(_, s)| **s == UnitRunState::Pending)
            .map(|(i, _)| UnitId::new(i))
    }
}

/// Topologically sort `edges` (prerequisite -> dependent) over `node_count`
/// nodes; return a node on a cycle if there is one.
pub(crate) fn find_cycle(
    node_count: usize,
    edges: impl IntoIterator<Item = (usize, usize)>,
) -> Option<usize> {
    let mut graph: DiGraphMap<usize, ()> = DiGraphMap::new();
    for index in 0..node_count {
        graph.add_node(index);
    }
    for (prerequisite, dependent) in edges {
        graph.add_edge(prerequisite, dependent, ());
    }

    toposort(&graph, None).err().map(|cycle| cycle.node_id())
}
