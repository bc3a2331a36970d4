mod diag;
pub use diag::{codes, Diagnostic, Diagnostics, Level, Location};

mod error;
pub use error::Error;

mod options;
pub use options::{CheckType, ConstraintMode, Options, Separator, Target};

pub mod lower;
pub use lower::{lower, LoweredSchema};

pub mod schema;
pub use schema::Schema;

pub mod stmt;

/// A Result type alias that uses laminate's [`Error`] type.
pub type Result<T> = core::result::Result<T, Error>;
