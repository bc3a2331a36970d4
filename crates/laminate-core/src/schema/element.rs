use super::{Name, Relation};
use crate::stmt;

use indexmap::IndexMap;
use std::fmt;

/// A named field of a [`Definition`].
///
/// [`Definition`]: super::Definition
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Element {
    /// The element name. After flattening this is the synthesized joined
    /// name for leaves produced from structured fields.
    pub name: String,

    /// Scalar, structured, relationship, ...
    pub ty: ElementTy,

    /// True if the element is part of the owning definition's primary key.
    pub key: bool,

    /// True if the element must not be null.
    pub not_null: bool,

    /// Optional default value.
    pub default: Option<stmt::Value>,

    /// A computed-value expression. Stored here until views consuming the
    /// element have been rewritten; see [`Calculated`].
    pub calculated: Option<Calculated>,

    /// Name of the relationship this element was synthesized from, if it is
    /// a foreign-key element. Used for constraint grouping.
    pub origin: Option<String>,

    /// Structural elements are marked ignored once flattened: retained for
    /// traceability, never rendered.
    pub ignored: bool,
}

/// The expression side of a calculated element.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Calculated {
    /// The expression the element evaluates to, relative to the owning
    /// definition.
    pub expr: stmt::Expr,

    /// On-write calculated elements are persisted and survive lowering;
    /// on-read ones are inlined into consuming views and then deleted.
    pub on_write: bool,
}

#[derive(Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ElementTy {
    Scalar(ScalarType),

    /// Reference to a structured-type definition, resolved during
    /// flattening.
    Named(Name),

    /// Inline nested elements.
    Structured(IndexMap<String, Element>),

    /// An array of some element type. Degraded to a dropped column when the
    /// target cannot represent it.
    Array(Box<ElementTy>),

    Relation(Relation),
}

/// A scalar type with its facets. Facets are copied verbatim when the type
/// travels into a synthesized foreign-key element, never recomputed.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ScalarType {
    pub ty: ScalarTy,
    pub length: Option<u32>,
    pub precision: Option<u32>,
    pub scale: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ScalarTy {
    Bool,
    I16,
    I32,
    I64,
    F64,
    Decimal,
    String,
    Binary,
    Uuid,
    Date,
    Time,
    Timestamp,
}

impl ScalarType {
    pub fn new(ty: ScalarTy) -> Self {
        Self {
            ty,
            length: None,
            precision: None,
            scale: None,
        }
    }

    pub fn string(length: Option<u32>) -> Self {
        Self {
            length,
            ..Self::new(ScalarTy::String)
        }
    }

    pub fn uuid() -> Self {
        Self::new(ScalarTy::Uuid)
    }

    pub fn i64() -> Self {
        Self::new(ScalarTy::I64)
    }

    pub fn decimal(precision: u32, scale: u32) -> Self {
        Self {
            precision: Some(precision),
            scale: Some(scale),
            ..Self::new(ScalarTy::Decimal)
        }
    }
}

impl Element {
    pub fn scalar(name: impl Into<String>, ty: ScalarType) -> Self {
        Self::new(name, ElementTy::Scalar(ty))
    }

    pub fn structured(name: impl Into<String>, children: Vec<Element>) -> Self {
        let mut map = IndexMap::with_capacity(children.len());
        for child in children {
            map.insert(child.name.clone(), child);
        }
        Self::new(name, ElementTy::Structured(map))
    }

    pub fn named(name: impl Into<String>, target: impl Into<Name>) -> Self {
        Self::new(name, ElementTy::Named(target.into()))
    }

    pub fn array(name: impl Into<String>, items: ElementTy) -> Self {
        Self::new(name, ElementTy::Array(Box::new(items)))
    }

    pub fn relation(name: impl Into<String>, relation: Relation) -> Self {
        Self::new(name, ElementTy::Relation(relation))
    }

    fn new(name: impl Into<String>, ty: ElementTy) -> Self {
        Self {
            name: name.into(),
            ty,
            key: false,
            not_null: false,
            default: None,
            calculated: None,
            origin: None,
            ignored: false,
        }
    }

    pub fn is_scalar(&self) -> bool {
        matches!(self.ty, ElementTy::Scalar(..))
    }

    pub fn is_structural(&self) -> bool {
        matches!(self.ty, ElementTy::Structured(..) | ElementTy::Named(..))
    }

    pub fn is_relation(&self) -> bool {
        matches!(self.ty, ElementTy::Relation(..))
    }

    pub fn as_scalar(&self) -> Option<&ScalarType> {
        match &self.ty {
            ElementTy::Scalar(scalar) => Some(scalar),
            _ => None,
        }
    }

    pub fn as_relation(&self) -> Option<&Relation> {
        match &self.ty {
            ElementTy::Relation(relation) => Some(relation),
            _ => None,
        }
    }

    pub fn as_relation_mut(&mut self) -> Option<&mut Relation> {
        match &mut self.ty {
            ElementTy::Relation(relation) => Some(relation),
            _ => None,
        }
    }

    #[track_caller]
    pub fn expect_relation(&self) -> &Relation {
        match &self.ty {
            ElementTy::Relation(relation) => relation,
            _ => panic!("expected relation element, but was {:?}", self.ty),
        }
    }

    /// True if the element is an on-read calculated element, i.e. one that
    /// must be inlined into consuming views.
    pub fn is_calculated_on_read(&self) -> bool {
        self.calculated
            .as_ref()
            .map(|calculated| !calculated.on_write)
            .unwrap_or(false)
    }
}

impl fmt::Debug for ElementTy {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scalar(ty) => ty.fmt(fmt),
            Self::Named(name) => write!(fmt, "Named({name})"),
            Self::Structured(children) => fmt
                .debug_tuple("Structured")
                .field(&children.keys().collect::<Vec<_>>())
                .finish(),
            Self::Array(items) => fmt.debug_tuple("Array").field(items).finish(),
            Self::Relation(relation) => relation.fmt(fmt),
        }
    }
}
