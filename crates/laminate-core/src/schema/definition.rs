use super::{Element, Name, ReferentialConstraint};
use crate::stmt;

use indexmap::IndexMap;
use std::fmt;

/// A named node in the schema tree.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Definition {
    /// Uniquely identifies the definition within the schema. Side tables
    /// (e.g. resolved-type memoization) key off this, never off identity.
    pub id: DefId,

    pub name: Name,

    pub kind: DefKind,

    /// The definition's elements, in declaration order.
    pub elements: IndexMap<String, Element>,

    /// Referential constraints, attached after flattening completes.
    pub constraints: IndexMap<String, ReferentialConstraint>,

    /// Independently declared uniqueness constraints: identifier to column
    /// sequence.
    pub unique: IndexMap<String, Vec<String>>,

    /// False for definitions that never materialize storage.
    pub persisted: bool,

    /// True if the physical artifact already exists externally; constraints
    /// are not re-emitted against it.
    pub external: bool,

    /// Processed marker for the structure flattener.
    pub flattened: bool,

    /// Processed marker for the structural reference expander.
    pub expanded: bool,
}

#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DefKind {
    /// A storable record type with a primary key.
    Entity,

    /// A reusable structured type, flattened into its users.
    StructuredType,

    /// A derived projection over other definitions.
    View(ViewDef),

    /// Safe placeholder for a definition that was degraded during lowering.
    /// Inbound references to it are dropped.
    Dummy,
}

#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ViewDef {
    pub query: stmt::Query,
}

/// Uniquely identifies a definition. Assigned on insertion into the schema.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DefId(pub usize);

impl Definition {
    pub fn entity(name: impl Into<Name>) -> Self {
        Self::new(name, DefKind::Entity)
    }

    pub fn structured_type(name: impl Into<Name>) -> Self {
        Self::new(name, DefKind::StructuredType)
    }

    pub fn view(name: impl Into<Name>, query: stmt::Query) -> Self {
        Self::new(name, DefKind::View(ViewDef { query }))
    }

    fn new(name: impl Into<Name>, kind: DefKind) -> Self {
        Self {
            id: DefId::placeholder(),
            name: name.into(),
            kind,
            elements: IndexMap::new(),
            constraints: IndexMap::new(),
            unique: IndexMap::new(),
            persisted: true,
            external: false,
            flattened: false,
            expanded: false,
        }
    }

    pub fn is_entity(&self) -> bool {
        matches!(self.kind, DefKind::Entity)
    }

    pub fn is_structured_type(&self) -> bool {
        matches!(self.kind, DefKind::StructuredType)
    }

    pub fn is_view(&self) -> bool {
        matches!(self.kind, DefKind::View(..))
    }

    pub fn is_dummy(&self) -> bool {
        matches!(self.kind, DefKind::Dummy)
    }

    pub fn query(&self) -> Option<&stmt::Query> {
        match &self.kind {
            DefKind::View(view) => Some(&view.query),
            _ => None,
        }
    }

    pub fn query_mut(&mut self) -> Option<&mut stmt::Query> {
        match &mut self.kind {
            DefKind::View(view) => Some(&mut view.query),
            _ => None,
        }
    }

    /// Appends an element, keyed by its name.
    pub fn push_element(&mut self, element: Element) {
        self.elements.insert(element.name.clone(), element);
    }

    pub fn element(&self, name: &str) -> Option<&Element> {
        self.elements.get(name)
    }

    /// Elements a renderer would see: declaration order, ignored structural
    /// entries skipped.
    pub fn rendered_elements(&self) -> impl Iterator<Item = &Element> {
        self.elements.values().filter(|element| !element.ignored)
    }

    /// The primary-key elements, in declaration order.
    pub fn key_elements(&self) -> impl Iterator<Item = &Element> {
        self.rendered_elements().filter(|element| element.key)
    }

    /// Replaces the definition with a dummy stand-in, dropping elements and
    /// constraints but keeping name and id for inbound-reference cleanup.
    pub(crate) fn degrade_to_dummy(&mut self) {
        self.kind = DefKind::Dummy;
        self.elements.clear();
        self.constraints.clear();
        self.persisted = false;
    }
}

impl DefId {
    pub(crate) fn placeholder() -> Self {
        Self(usize::MAX)
    }
}

impl fmt::Debug for DefId {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "DefId({})", self.0)
    }
}
