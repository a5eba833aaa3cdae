// src/dag/scheduler.rs

//! Concurrency policies that turn a list of payloads into a [`Schedule`].

use std::fmt;

use tracing::debug;

use crate::dag::dependency::{Dependency, Identifier};
use crate::dag::schedule::Schedule;
use crate::dag::unit::Identify;
use crate::errors::{MiddagError, Result};

/// Factory for schedules.
///
/// - `Sequential`: declaration order, one unit at a time. Every unit
///   implicitly depends on the one declared before it.
/// - `Parallel(n)`: up to `n` units in flight; no implicit ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheduler {
    Sequential,
    Parallel(usize),
}

impl Default for Scheduler {
    fn default() -> Self {
        Scheduler::Sequential
    }
}

impl Scheduler {
    /// Checked constructor for `Parallel`.
    pub fn parallel(concurrency: usize) -> Result<Self> {
        if concurrency == 0 {
            return Err(MiddagError::config("concurrency must be >= 1 (got 0)"));
        }
        Ok(Scheduler::Parallel(concurrency))
    }

    /// Maximum number of units this policy lets run at once.
    pub fn concurrency(&self) -> usize {
        match self {
            Scheduler::Sequential => 1,
            Scheduler::Parallel(n) => *n,
        }
    }

    /// Build a schedule for `payloads` under this policy.
    pub fn schedule<P: Identify>(&self, payloads: Vec<P>) -> Result<Schedule<P>> {
        let dependencies = match self {
            Scheduler::Sequential => (1..payloads.len())
                .map(|i| Dependency::new(Identifier::Index(i), Identifier::Index(i - 1)))
                .collect(),
            Scheduler::Parallel(_) => Vec::new(),
        };

        debug!(policy = %self, units = payloads.len(), "building schedule");

        Schedule::generate(payloads, dependencies)?.with_concurrency(self.concurrency())
    }
}

impl fmt::Display for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scheduler::Sequential => f.write_str("sequential"),
            Scheduler::Parallel(n) => write!(f, "parallel({n})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dag::UnitId;
    use crate::state::SharedState;

    #[test]
    fn sequential_releases_units_in_declaration_order() {
        let mut schedule = Scheduler::Sequential
            .schedule(vec!["X", "Y", "Z"])
            .unwrap();
        let state = SharedState::new();

        for expected in 0..3 {
            let ready = schedule.next_ready(&state).unwrap();
            assert_eq!(ready, vec![UnitId::new(expected)]);
            assert!(schedule.next_ready(&state).unwrap().is_empty());
            schedule.complete(ready[0]).unwrap();
        }
        assert!(schedule.is_finished());
    }

    #[test]
    fn parallel_has_no_edges() {
        let schedule = Scheduler::parallel(3).unwrap().schedule(vec!["a", "b"]).unwrap();
        assert_eq!(schedule.edge_count(), 0);
        assert_eq!(schedule.concurrency(), Some(3));
    }

    #[test]
    fn parallel_zero_is_rejected() {
        assert!(Scheduler::parallel(0).is_err());
    }

    #[test]
    fn empty_payloads_give_an_exhausted_schedule() {
        let schedule = Scheduler::Sequential.schedule(Vec::<String>::new()).unwrap();
        assert!(schedule.is_exhausted());
        assert!(schedule.is_finished());
    }
}
