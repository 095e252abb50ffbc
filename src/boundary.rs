//! Boundary classifier for the top-level children of a basic message.
//!
//! The classifier is a three-state machine. Each top-level child is tested
//! against a small table of boundary names; a hit switches the state, a miss
//! leaves it where it was. Children following a boundary element are thus
//! handled like that boundary until the next one appears.

use crate::error::{Error, Result};
use crate::qname::{AIXM_NS, MESSAGE_NS, QName};

/// Kind of a completed top-level unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnitKind {
    /// `aixm:messageMetadata`.
    Metadata,
    /// `message:hasMember` wrapping one feature.
    Feature,
}

/// Zustand des Classifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BoundaryState {
    /// No boundary recognized yet.
    #[default]
    Nothing,
    Metadata,
    Feature,
}

impl From<UnitKind> for BoundaryState {
    fn from(kind: UnitKind) -> Self {
        match kind {
            UnitKind::Metadata => Self::Metadata,
            UnitKind::Feature => Self::Feature,
        }
    }
}

/// One row of the boundary table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Boundary {
    pub uri: &'static str,
    pub local_name: &'static str,
    pub kind: UnitKind,
}

/// Boundary table for AIXM 5.1 basic messages.
pub const AIXM_BOUNDARIES: &[Boundary] = &[
    Boundary {
        uri: AIXM_NS,
        local_name: "messageMetadata",
        kind: UnitKind::Metadata,
    },
    Boundary {
        uri: MESSAGE_NS,
        local_name: "hasMember",
        kind: UnitKind::Feature,
    },
];

/// State machine deciding which branch handles a top-level unit.
#[derive(Debug, Clone)]
pub struct BoundaryClassifier {
    table: &'static [Boundary],
    state: BoundaryState,
}

impl Default for BoundaryClassifier {
    fn default() -> Self {
        Self::new(AIXM_BOUNDARIES)
    }
}

impl BoundaryClassifier {
    pub fn new(table: &'static [Boundary]) -> Self {
        Self {
            table,
            state: BoundaryState::Nothing,
        }
    }

    pub fn state(&self) -> BoundaryState {
        self.state
    }

    /// Tests `name` against the table. Returns `true` if it was a boundary.
    pub fn classify(&mut self, name: &QName) -> bool {
        match self.table.iter().find(|b| name.is(b.uri, b.local_name)) {
            Some(boundary) => {
                self.state = boundary.kind.into();
                true
            }
            None => false,
        }
    }

    /// Branch for the unit just completed.
    ///
    /// Fails with [`Error::MalformedContainer`] while no boundary has been
    /// seen; `element` names the unit that triggered the check.
    pub fn current(&self, element: &QName) -> Result<UnitKind> {
        match self.state {
            BoundaryState::Nothing => Err(Error::MalformedContainer {
                element: element.to_string(),
            }),
            BoundaryState::Metadata => Ok(UnitKind::Metadata),
            BoundaryState::Feature => Ok(UnitKind::Feature),
        }
    }
}
