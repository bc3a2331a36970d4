//! The lowering pipeline.
//!
//! Five passes run strictly in sequence over one mutable schema tree. Each
//! stage type wraps the tree and names the invariant that holds once it
//! exists, so pass ordering is checked by the compiler rather than by
//! convention:
//!
//! ```text
//! RawTree -> ResolvedTree -> KeyedTree -> FlatTree -> ExpandedTree -> LoweredSchema
//! ```
//!
//! The tree is deep-cloned from the caller's input at entry; the caller's
//! copy is never mutated. Diagnostics accumulate on the shared collector and
//! only the two checkpoints stop a compilation.

mod calculated;
mod constraints;
mod expand;
mod flatten;
mod keys;

use crate::{Diagnostics, Options, Result, Schema};

use log::debug;

/// The defensively cloned input tree. Nothing holds yet.
pub struct RawTree {
    pub(crate) schema: Schema,
}

/// Calculated elements have been inlined into every consuming view and
/// removed (or reordered, for on-write ones) on the storage side.
pub struct ResolvedTree {
    pub(crate) schema: Schema,
}

/// Every managed relationship carries its synthesized foreign-key elements.
pub struct KeyedTree {
    pub(crate) schema: Schema,
}

/// Structured elements are flattened into leaves (unless the target keeps
/// structures nested).
pub struct FlatTree {
    pub(crate) schema: Schema,
}

/// References in key lists, projected columns, and group/order clauses
/// point at leaves and foreign keys only.
pub struct ExpandedTree {
    pub(crate) schema: Schema,
}

/// The fully lowered tree, referential constraints attached. Hand this to a
/// renderer read-only.
pub struct LoweredSchema {
    pub schema: Schema,
}

impl RawTree {
    /// Clones the caller-owned input; the pipeline owns the clone
    /// exclusively from here on.
    pub fn cloned_from(schema: &Schema) -> Self {
        Self {
            schema: schema.clone(),
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }
}

macro_rules! stage_accessors {
    ($($stage:ident),*) => {
        $(
            impl $stage {
                pub fn schema(&self) -> &Schema {
                    &self.schema
                }

                pub fn into_schema(self) -> Schema {
                    self.schema
                }
            }
        )*
    };
}

stage_accessors!(ResolvedTree, KeyedTree, FlatTree, ExpandedTree, LoweredSchema);

/// Runs the full pipeline for one compilation target.
///
/// Returns either the lowered tree or, at one of the checkpoints, an
/// [`Error::Diagnosis`] carrying every error recorded so far. The input
/// `schema` is never mutated.
///
/// [`Error::Diagnosis`]: crate::Error::Diagnosis
pub fn lower(schema: &Schema, options: &Options, diag: &mut Diagnostics) -> Result<LoweredSchema> {
    options.verify()?;

    debug!(
        "lowering {} definition(s) for {:?} target",
        schema.definitions.len(),
        options.target
    );

    let tree = RawTree::cloned_from(schema)
        .rewrite_calculated(options, diag)
        .synthesize_keys(options, diag)
        .flatten(options, diag)
        .expand_references(options, diag);

    // Checkpoint: structural errors from flattening and everything before
    // it. Independent definitions have all been processed by now.
    diag.throw_if_errors()?;

    let lowered = tree.derive_constraints(options, diag);

    // Checkpoint: constraint derivation.
    diag.throw_if_errors()?;

    lowered.schema.verify()?;

    Ok(lowered)
}
