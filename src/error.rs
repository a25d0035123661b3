//! Error type shared by the front end, the resolver and the generator tree.

/// Failure of a parse, validation or prepare step.
///
/// Every failure is reported through the [`Logger`](crate::diag::Logger) at the
/// point where it is detected; the error value carries the same text so callers
/// without a diagnostics callback still see what went wrong.
#[derive(Debug, thiserror::Error)]
pub enum DslError {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),
    #[error("Syntax: {0}")]
    Syntax(String),
    /// Malformed document, unknown or duplicated property, duplicate name.
    #[error("{0}")]
    Structural(String),
    /// Unresolved reference, range/type violation, override after reuse.
    #[error("{0}")]
    Semantic(String),
    #[error("Warnings were treated as errors ({0} warning(s))")]
    WarningsAsErrors(usize),
    #[error("Non-converging layer stack in frame \"{0}\"")]
    NonConvergingLayers(String),
    #[error("Parsing extra files after validation is not allowed")]
    AlreadyValidated,
    #[error("Cannot validate without any schema files")]
    NoSchemas,
}

impl DslError {
    pub fn is_structural(&self) -> bool {
        matches!(self, DslError::Structural(_) | DslError::Syntax(_))
    }
}

pub type DslResult<T> = Result<T, DslError>;
