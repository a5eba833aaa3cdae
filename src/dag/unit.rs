// src/dag/unit.rs

//! Schedulable units of work.

use std::fmt;

use crate::dag::dependency::Identifier;

/// Stable identity of a unit inside one schedule: its declaration index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UnitId(usize);

impl UnitId {
    pub fn new(index: usize) -> Self {
        UnitId(index)
    }

    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Optional symbolic names a payload can be referred to by.
///
/// Dependencies may name a unit by its `name` or `key` instead of its index.
pub trait Identify {
    fn name(&self) -> Option<&str> {
        None
    }

    fn key(&self) -> Option<&str> {
        None
    }
}

impl Identify for String {
    fn name(&self) -> Option<&str> {
        Some(self.as_str())
    }
}

impl Identify for &str {
    fn name(&self) -> Option<&str> {
        Some(*self)
    }
}

/// A payload participating in the dependency graph.
///
/// Units are immutable once built; readiness bookkeeping lives in the
/// schedule's side tables, keyed by [`UnitId`].
#[derive(Debug, Clone)]
pub struct Unit<P> {
    id: UnitId,
    payload: P,
    has_prerequisites: bool,
    has_dependents: bool,
}

impl<P> Unit<P> {
    pub fn new(id: UnitId, payload: P, has_prerequisites: bool, has_dependents: bool) -> Self {
        Self {
            id,
            payload,
            has_prerequisites,
            has_dependents,
        }
    }

    pub fn id(&self) -> UnitId {
        self.id
    }

    pub fn payload(&self) -> &P {
        &self.payload
    }

    /// Whether this unit appears as the dependent of any declared edge.
    pub fn has_prerequisites(&self) -> bool {
        self.has_prerequisites
    }

    /// Whether this unit appears as the prerequisite of any declared edge.
    pub fn has_dependents(&self) -> bool {
        self.has_dependents
    }
}

impl<P: Identify> Unit<P> {
    /// Every way this unit may be referred to by a dependency.
    pub fn identifiers(&self) -> Vec<Identifier> {
        identifiers_of(&self.payload, self.id)
    }

    /// Human-readable label for logs and errors: name, then key, then index.
    pub fn label(&self) -> String {
        label_of(&self.payload, self.id)
    }
}

pub(crate) fn identifiers_of<P: Identify>(payload: &P, id: UnitId) -> Vec<Identifier> {
    let mut ids = vec![Identifier::Unit(id), Identifier::Index(id.index())];
    if let Some(name) = payload.name() {
        ids.push(Identifier::Name(name.to_string()));
    }
    if let Some(key) = payload.key() {
        if payload.name() != Some(key) {
            ids.push(Identifier::Name(key.to_string()));
        }
    }
    ids
}

pub(crate) fn label_of<P: Identify>(payload: &P, id: UnitId) -> String {
    payload
        .name()
        .or_else(|| payload.key())
        .map(|s| s.to_string())
        .unwrap_or_else(|| id.to_string())
}
