// src/dag/dependency.rs

//! Dependency edges between units and symbolic unit references.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::dag::unit::{Identify, UnitId, identifiers_of};
use crate::errors::{MiddagError, Result};
use crate::state::SharedState;

/// Identifier of an alternative-group of dependencies.
pub type GroupId = String;

/// A way of referring to a unit before the graph is built.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Identifier {
    /// Position in the declaration list.
    Index(usize),
    /// A `name` or `key` exposed by the unit's payload.
    Name(String),
    /// The unit itself.
    Unit(UnitId),
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identifier::Index(i) => write!(f, "index {i}"),
            Identifier::Name(n) => write!(f, "'{n}'"),
            Identifier::Unit(id) => write!(f, "unit {id}"),
        }
    }
}

impl From<usize> for Identifier {
    fn from(index: usize) -> Self {
        Identifier::Index(index)
    }
}

impl From<&str> for Identifier {
    fn from(name: &str) -> Self {
        Identifier::Name(name.to_string())
    }
}

impl From<String> for Identifier {
    fn from(name: String) -> Self {
        Identifier::Name(name)
    }
}

impl From<UnitId> for Identifier {
    fn from(id: UnitId) -> Self {
        Identifier::Unit(id)
    }
}

/// Predicate over the shared state gating a dependency edge.
///
/// While the predicate holds, the edge is required; once it evaluates false
/// the edge is treated as satisfied without waiting for the prerequisite.
#[derive(Clone)]
pub struct Condition {
    description: String,
    predicate: Arc<dyn Fn(&SharedState) -> bool + Send + Sync>,
}

impl Condition {
    pub fn new<F>(description: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&SharedState) -> bool + Send + Sync + 'static,
    {
        Self {
            description: description.into(),
            predicate: Arc::new(predicate),
        }
    }

    /// Edge required only while `state[key]` is truthy.
    pub fn when(key: impl Into<String>) -> Self {
        let key = key.into();
        let description = format!("when {key}");
        Self::new(description, move |state| state.is_truthy(&key))
    }

    /// Edge required only while `state[key]` is falsy.
    pub fn unless(key: impl Into<String>) -> Self {
        let key = key.into();
        let description = format!("unless {key}");
        Self::new(description, move |state| !state.is_truthy(&key))
    }

    /// Conjunction of two conditions.
    pub fn and(self, other: Condition) -> Self {
        let description = format!("{} and {}", self.description, other.description);
        Self::new(description, move |state| {
            self.evaluate(state) && other.evaluate(state)
        })
    }

    pub fn evaluate(&self, state: &SharedState) -> bool {
        (self.predicate)(state)
    }

    pub fn description(&self) -> &str {
        &self.description
    }
}

impl fmt::Debug for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Condition").field(&self.description).finish()
    }
}

/// `dependent` must run strictly after `prerequisite` completes, unless the
/// `condition` evaluates false. Edges sharing a `group` are alternatives.
#[derive(Debug, Clone)]
pub struct Dependency<T> {
    pub dependent: T,
    pub prerequisite: T,
    pub condition: Option<Condition>,
    pub group: Option<GroupId>,
}

impl<T> Dependency<T> {
    pub fn new(dependent: impl Into<T>, prerequisite: impl Into<T>) -> Self {
        Self {
            dependent: dependent.into(),
            prerequisite: prerequisite.into(),
            condition: None,
            group: None,
        }
    }

    pub fn when(mut self, condition: Condition) -> Self {
        self.condition = Some(condition);
        self
    }

    pub fn in_group(mut self, group: impl Into<GroupId>) -> Self {
        self.group = Some(group.into());
        self
    }

    /// Unconditional and ungrouped: the edge can never be bypassed.
    pub fn is_hard(&self) -> bool {
        self.condition.is_none() && self.group.is_none()
    }
}

impl<A, B> From<(A, B)> for Dependency<Identifier>
where
    A: Into<Identifier>,
    B: Into<Identifier>,
{
    fn from((dependent, prerequisite): (A, B)) -> Self {
        Dependency::new(dependent.into(), prerequisite.into())
    }
}

impl Dependency<Identifier> {
    /// Replace symbolic endpoints with concrete unit ids.
    ///
    /// An endpoint that matches no unit is a configuration error.
    pub fn resolve<F>(self, lookup: F) -> Result<Dependency<UnitId>>
    where
        F: Fn(&Identifier) -> Option<UnitId>,
    {
        let dependent = lookup(&self.dependent).ok_or_else(|| {
            MiddagError::config(format!(
                "dependency refers to unknown dependent {}",
                self.dependent
            ))
        })?;
        let prerequisite = lookup(&self.prerequisite).ok_or_else(|| {
            MiddagError::config(format!(
                "dependency of {} refers to unknown prerequisite {}",
                self.dependent, self.prerequisite
            ))
        })?;

        Ok(Dependency {
            dependent,
            prerequisite,
            condition: self.condition,
            group: self.group,
        })
    }
}

/// Lookup table from every identifier of every unit to that unit.
///
/// When two units share a name the earlier declaration wins.
#[derive(Debug, Default)]
pub struct UnitLookup {
    by_identifier: HashMap<Identifier, UnitId>,
    len: usize,
}

impl UnitLookup {
    pub fn from_payloads<P: Identify>(payloads: &[P]) -> Self {
        let mut by_identifier = HashMap::new();
        for (index, payload) in payloads.iter().enumerate() {
            let id = UnitId::new(index);
            for identifier in identifiers_of(payload, id) {
                by_identifier.entry(identifier).or_insert(id);
            }
        }
        Self {
            by_identifier,
            len: payloads.len(),
        }
    }

    pub fn get(&self, identifier: &Identifier) -> Option<UnitId> {
        match identifier {
            Identifier::Unit(id) if id.index() < self.len => Some(*id),
            Identifier::Unit(_) => None,
            other => self.by_identifier.get(other).copied(),
        }
    }

    pub fn contains(&self, identifier: &Identifier) -> bool {
        self.get(identifier).is_some()
    }
}

/// Resolve every dependency against the unit list, failing on the first
/// unresolved reference.
pub fn resolve_dependencies(
    dependencies: Vec<Dependency<Identifier>>,
    lookup: &UnitLookup,
) -> Result<Vec<Dependency<UnitId>>> {
    dependencies
        .into_iter()
        .map(|dependency| dependency.resolve(|identifier| lookup.get(identifier)))
        .collect()
}
