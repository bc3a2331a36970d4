use crate::{Error, Result};

use std::fmt;

/// Severity of a [`Diagnostic`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Error,
    Warning,
    Info,
}

/// Stable diagnostic codes emitted by the lowering passes.
pub mod codes {
    /// A synthesized element name collides with an existing sibling.
    pub const NAME_DUPLICATE_ELEMENT: &str = "name-duplicate-element";

    /// An element references a type definition that does not exist or is not
    /// a structured type.
    pub const TYPE_UNRESOLVED: &str = "type-unresolved";

    /// A chain of structured-type references loops back on itself.
    pub const TYPE_CYCLIC: &str = "type-cyclic";

    /// An array-typed element cannot be represented by the compilation
    /// target; the column is dropped.
    pub const TYPE_ARRAY_UNSUPPORTED: &str = "type-array-unsupported";

    /// Foreign-key resolution stalled on a cycle of managed relationships.
    pub const REL_CYCLIC_KEYS: &str = "rel-cyclic-keys";

    /// A relationship is used as (part of) a primary key but yields no
    /// usable foreign-key elements.
    pub const REL_KEY_WITHOUT_FK: &str = "rel-key-without-fk";

    /// A managed relationship with to-many cardinality cannot materialize
    /// foreign keys on the owning side.
    pub const REL_MANAGED_TO_MANY: &str = "rel-managed-to-many";

    /// A backlink names an element that does not exist on the target, or one
    /// that is not a relationship back to the owner.
    pub const REL_MISSING_BACKLINK: &str = "rel-missing-backlink";

    /// Calculated elements reference each other in a cycle.
    pub const REF_CYCLIC_CALCULATED: &str = "ref-cyclic-calculated";

    /// An expand group reaches a to-many relationship in a context that
    /// requires tabular flattening.
    pub const EXPAND_TO_MANY: &str = "expand-to-many";

    /// A reference to a definition that was degraded to a dummy stand-in
    /// was dropped.
    pub const REF_DROPPED_DEFINITION: &str = "ref-dropped-definition";

    /// A generated constraint identifier collides with an independently
    /// declared uniqueness constraint.
    pub const CONSTRAINT_DUPLICATE_NAME: &str = "constraint-duplicate-name";
}

/// Where a diagnostic was raised, in terms of the schema tree.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Location {
    /// Qualified name of the definition, if known.
    pub definition: Option<String>,

    /// Element path within the definition, if known.
    pub element: Option<String>,
}

impl Location {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn definition(name: impl Into<String>) -> Self {
        Self {
            definition: Some(name.into()),
            element: None,
        }
    }

    pub fn element(definition: impl Into<String>, element: impl Into<String>) -> Self {
        Self {
            definition: Some(definition.into()),
            element: Some(element.into()),
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.definition, &self.element) {
            (Some(definition), Some(element)) => write!(fmt, "{definition}:{element}"),
            (Some(definition), None) => write!(fmt, "{definition}"),
            _ => write!(fmt, "<model>"),
        }
    }
}

/// A single recorded message.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub level: Level,
    pub code: &'static str,
    pub location: Location,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.level {
            Level::Error => "error",
            Level::Warning => "warning",
            Level::Info => "info",
        };
        write!(
            fmt,
            "{level}[{code}] {location}: {message}",
            code = self.code,
            location = self.location,
            message = self.message
        )
    }
}

/// Append-only collector shared by all lowering passes of one compilation.
///
/// Passes record local problems here and keep going, so diagnostics from
/// independent definitions accumulate. Only [`Diagnostics::throw_if_errors`],
/// called at pipeline checkpoints, stops a compilation.
#[derive(Debug, Default)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
    errors: usize,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn error(&mut self, code: &'static str, location: Location, message: impl Into<String>) {
        self.push(Level::Error, code, location, message);
    }

    pub fn warning(&mut self, code: &'static str, location: Location, message: impl Into<String>) {
        self.push(Level::Warning, code, location, message);
    }

    pub fn info(&mut self, code: &'static str, location: Location, message: impl Into<String>) {
        self.push(Level::Info, code, location, message);
    }

    fn push(
        &mut self,
        level: Level,
        code: &'static str,
        location: Location,
        message: impl Into<String>,
    ) {
        if level == Level::Error {
            self.errors += 1;
        }

        self.entries.push(Diagnostic {
            level,
            code,
            location,
            message: message.into(),
        });
    }

    pub fn entries(&self) -> &[Diagnostic] {
        &self.entries
    }

    pub fn has_errors(&self) -> bool {
        self.errors > 0
    }

    pub fn error_count(&self) -> usize {
        self.errors
    }

    /// Checkpoint: fail the compilation if any error-level diagnostic was
    /// recorded since the collector was last reset.
    pub fn throw_if_errors(&self) -> Result<()> {
        if !self.has_errors() {
            return Ok(());
        }

        Err(Error::Diagnosis(
            self.entries
                .iter()
                .filter(|diagnostic| diagnostic.level == Level::Error)
                .cloned()
                .collect(),
        ))
    }

    /// Clears the collector between independent compilations.
    pub fn reset(&mut self) {
        self.entries.clear();
        self.errors = 0;
    }
}
