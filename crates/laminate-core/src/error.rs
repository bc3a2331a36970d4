use crate::diag::Diagnostic;

use thiserror::Error;

/// An error that can occur while lowering a schema.
///
/// Local algorithmic problems are recorded on the [`Diagnostics`] collector
/// and do not surface here until a pipeline checkpoint converts them into
/// [`Error::Diagnosis`].
///
/// [`Diagnostics`]: crate::Diagnostics
#[derive(Error, Debug)]
pub enum Error {
    /// One or more error-level diagnostics were recorded before a pipeline
    /// checkpoint. Carries every error-level entry accumulated so far.
    #[error("schema lowering failed with {} error(s); first: {}", .0.len(), first_message(.0))]
    Diagnosis(Vec<Diagnostic>),

    /// The option record combines settings that cannot be honored together.
    #[error("invalid options: {0}")]
    InvalidOptions(String),

    /// Post-lowering verification found a tree that violates a structural
    /// invariant. This indicates a bug in the pipeline, not in the model.
    #[error("invalid schema: {0}")]
    InvalidSchema(String),
}

impl Error {
    pub(crate) fn invalid_options(msg: impl Into<String>) -> Self {
        Self::InvalidOptions(msg.into())
    }

    pub(crate) fn invalid_schema(msg: impl Into<String>) -> Self {
        Self::InvalidSchema(msg.into())
    }

    /// The diagnostics carried by an [`Error::Diagnosis`], if any.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        match self {
            Self::Diagnosis(diagnostics) => diagnostics,
            _ => &[],
        }
    }
}

fn first_message(diagnostics: &[Diagnostic]) -> &str {
    diagnostics
        .first()
        .map(|diagnostic| diagnostic.message.as_str())
        .unwrap_or("<none>")
}
