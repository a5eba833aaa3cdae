// src/dag/readiness.rs

//! Per-unit requirement bookkeeping.
//!
//! A unit is ready once every ungrouped requirement is satisfied and every
//! group has at least one satisfied member. A requirement is satisfied when
//! its prerequisite is done, or when its condition has evaluated false
//! against the shared state (the edge is then latched as skipped).

use std::collections::BTreeMap;

use crate::dag::dependency::{Condition, GroupId};
use crate::dag::unit::UnitId;
use crate::state::SharedState;

/// Per-run state of a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitRunState {
    /// Not yet dispatched.
    Pending,
    /// Dispatched and not yet reported complete.
    Running,
    /// Completed; its delta has been merged.
    Done,
}

/// One edge recorded against its dependent unit.
#[derive(Debug, Clone)]
pub struct Requirement {
    prerequisite: UnitId,
    condition: Option<Condition>,
    group: Option<GroupId>,
    skipped: bool,
}

impl Requirement {
    pub(crate) fn new(
        prerequisite: UnitId,
        condition: Option<Condition>,
        group: Option<GroupId>,
    ) -> Self {
        Self {
            prerequisite,
            condition,
            group,
            skipped: false,
        }
    }

    pub fn prerequisite(&self) -> UnitId {
        self.prerequisite
    }

    pub fn condition(&self) -> Option<&Condition> {
        self.condition.as_ref()
    }

    pub fn group(&self) -> Option<&str> {
        self.group.as_deref()
    }

    /// Whether the edge was bypassed because its condition evaluated false.
    pub fn is_skipped(&self) -> bool {
        self.skipped
    }

    fn is_satisfied(&self, states: &[UnitRunState]) -> bool {
        self.skipped || states[self.prerequisite.index()] == UnitRunState::Done
    }
}

/// Outcome of re-evaluating one unit's requirements.
#[derive(Debug, Default)]
pub(crate) struct Readiness {
    /// Number of unsatisfied ungrouped edges plus unsatisfied groups.
    pub remaining: usize,
    /// Prerequisites whose edges were latched as skipped by this evaluation.
    pub newly_skipped: Vec<UnitId>,
}

impl Readiness {
    pub fn is_ready(&self) -> bool {
        self.remaining == 0
    }
}

/// Evaluate pending conditions against `state`, latch the false ones, and
/// count what is still outstanding.
pub(crate) fn evaluate(
    requirements: &mut [Requirement],
    states: &[UnitRunState],
    state: &SharedState,
) -> Readiness {
    let mut newly_skipped = Vec::new();

    for req in requirements.iter_mut() {
        if req.is_satisfied(states) {
            continue;
        }
        if let Some(condition) = &req.condition {
            if !condition.evaluate(state) {
                req.skipped = true;
                newly_skipped.push(req.prerequisite);
            }
        }
    }

    Readiness {
        remaining: count_remaining(requirements, states),
        newly_skipped,
    }
}

/// Count outstanding requirements without evaluating conditions.
pub(crate) fn count_remaining(requirements: &[Requirement], states: &[UnitRunState]) -> usize {
    let mut remaining = 0;
    let mut groups: BTreeMap<&str, bool> = BTreeMap::new();

    for req in requirements {
        let satisfied = req.is_satisfied(states);
        match req.group.as_deref() {
            Some(group) => {
                let entry = groups.entry(group).or_insert(false);
                *entry |= satisfied;
            }
            None if !satisfied => remaining += 1,
            None => {}
        }
    }

    remaining + groups.values().filter(|satisfied| !**satisfied).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use UnitRunState::*;

    fn req(prereq: usize, group: Option<&str>) -> Requirement {
        Requirement::new(UnitId::new(prereq), None, group.map(str::to_string))
    }

    #[test]
    fn ungrouped_edges_are_all_required() {
        let reqs = vec![req(0, None), req(1, None)];
        assert_eq!(count_remaining(&reqs, &[Done, Running, Pending]), 1);
        assert_eq!(count_remaining(&reqs, &[Done, Done, Pending]), 0);
    }

    #[test]
    fn any_member_satisfies_a_group() {
        let reqs = vec![req(0, Some("g")), req(1, Some("g")), req(2, None)];
        assert_eq!(count_remaining(&reqs, &[Pending, Pending, Pending, Pending]), 2);
        assert_eq!(count_remaining(&reqs, &[Pending, Done, Pending, Pending]), 1);
        assert_eq!(count_remaining(&reqs, &[Pending, Done, Done, Pending]), 0);
    }

    #[test]
    fn false_condition_latches_edge_as_skipped() {
        let mut reqs = vec![Requirement::new(
            UnitId::new(0),
            Some(Condition::when("needed")),
            None,
        )];
        let states = [Pending, Pending];

        let needed: SharedState = [("needed", json!(true))].into_iter().collect();
        let readiness = evaluate(&mut reqs, &states, &needed);
        assert!(!readiness.is_ready());
        assert!(readiness.newly_skipped.is_empty());

        let readiness = evaluate(&mut reqs, &states, &SharedState::new());
        assert!(readiness.is_ready());
        assert_eq!(readiness.newly_skipped, vec![UnitId::new(0)]);

        // Latched: flipping the flag back does not re-block the edge.
        let readiness = evaluate(&mut reqs, &states, &needed);
        assert!(readiness.is_ready());
        assert!(reqs[0].is_skipped());
    }
}
