use std::collections::HashSet;

use proptest::prelude::*;

use middag::dag::{Dependency, Identifier, Schedule, UnitId, UnitRunState, generate_schedule};
use middag::errors::MiddagError;
use middag::state::SharedState;

/// Random acyclic graph: unit `i` may only depend on units `0..i`.
fn dag_strategy(max_units: usize) -> impl Strategy<Value = (usize, Vec<(usize, usize)>)> {
    (1..=max_units).prop_flat_map(|n| {
        proptest::collection::vec(proptest::collection::vec(any::<usize>(), 0..n), n).prop_map(
            move |raw| {
                let mut edges = HashSet::new();
                for (dependent, candidates) in raw.into_iter().enumerate() {
                    if dependent == 0 {
                        continue;
                    }
                    for c in candidates {
                        edges.insert((dependent, c % dependent));
                    }
                }
                (n, edges.into_iter().collect())
            },
        )
    })
}

fn build(n: usize, edges: &[(usize, usize)], cap: Option<usize>) -> Schedule<String> {
    let names: Vec<String> = (0..n).map(|i| format!("u{i}")).collect();
    let deps = edges
        .iter()
        .map(|&(d, p)| Dependency::new(Identifier::Index(d), Identifier::Index(p)))
        .collect();
    let schedule = generate_schedule(names, deps).unwrap();
    match cap {
        Some(cap) => schedule.with_concurrency(cap).unwrap(),
        None => schedule,
    }
}

/// Drive the schedule to completion, finishing in-flight units in an order
/// picked by `picks`. Returns the dispatch order.
fn drive(
    schedule: &mut Schedule<String>,
    edges: &[(usize, usize)],
    cap: Option<usize>,
    picks: &[usize],
) -> Vec<usize> {
    let state = SharedState::new();
    let mut running: Vec<UnitId> = Vec::new();
    let mut dispatched = Vec::new();
    let mut pick = picks.iter().cycle();

    loop {
        for id in schedule.next_ready(&state).unwrap() {
            // Every prerequisite is done before the dependent starts.
            for &(d, p) in edges {
                if d == id.index() {
                    assert_eq!(
                        schedule.run_state_of(UnitId::new(p)),
                        Some(UnitRunState::Done),
                        "u{d} dispatched before u{p} finished"
                    );
                }
            }
            running.push(id);
            dispatched.push(id.index());
        }

        if let Some(cap) = cap {
            assert!(schedule.in_flight() <= cap, "cap {cap} exceeded");
        }

        if running.is_empty() {
            break;
        }
        let i = pick.next().copied().unwrap_or(0) % running.len();
        let id = running.swap_remove(i);
        schedule.complete(id).unwrap();
    }

    dispatched
}

proptest! {
    #[test]
    fn every_unit_runs_exactly_once_after_its_prerequisites(
        (n, edges) in dag_strategy(12),
        cap in proptest::option::of(1usize..4),
        picks in proptest::collection::vec(any::<usize>(), 1..16),
    ) {
        let mut schedule = build(n, &edges, cap);
        let dispatched = drive(&mut schedule, &edges, cap, &picks);

        let mut sorted = dispatched.clone();
        sorted.sort_unstable();
        prop_assert_eq!(sorted, (0..n).collect::<Vec<_>>());
        prop_assert!(schedule.is_finished());
    }

    #[test]
    fn back_edge_closes_a_cycle((n, edges) in dag_strategy(8)) {
        prop_assume!(!edges.is_empty());
        let (d, p) = edges[0];

        let mut with_back = edges.clone();
        with_back.push((p, d));

        let names: Vec<String> = (0..n).map(|i| format!("u{i}")).collect();
        let deps: Vec<Dependency<Identifier>> = with_back
            .iter()
            .map(|&(d, p)| Dependency::new(Identifier::Index(d), Identifier::Index(p)))
            .collect();

        let is_scheduling_error = matches!(
            generate_schedule(names, deps),
            Err(MiddagError::Scheduling(_))
        );
        prop_assert!(is_scheduling_error);
    }
}

#[test]
fn sequential_cap_one_gives_declaration_order() {
    let mut schedule = build(4, &[], Some(1));
    let dispatched = drive(&mut schedule, &[], Some(1), &[0]);
    assert_eq!(dispatched, vec![0, 1, 2, 3]);
}
