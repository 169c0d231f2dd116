//! Typed failures of a single resolution attempt.

use hiproc_types::{Command, CommandId};
use hiproc_util::StoreError;
use thiserror::Error;

/// Failure while expanding a template.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderError {
    /// No argument, environment variable, or prompt produced a value for the placeholder.
    #[error("no value available for placeholder {{{{{0}}}}}")]
    UnresolvedPlaceholder(String),
}

/// Failure of a resolve, render, or catalog operation.
///
/// Every variant is terminal for the attempt that produced it. Nothing is retried and no
/// lower-ranked candidate is substituted.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// No stored command answers to the query at all.
    #[error("no command found for '{query}'")]
    NotFound { query: String },

    /// Commands named like the query exist, but none is visible and eligible here.
    #[error("no eligible command for '{query}' in this context")]
    NoMatch {
        query: String,
        /// Visible records with the same name that the namespace or scope hints excluded.
        near_misses: Vec<Command>,
    },

    #[error("no value available for placeholder {{{{{0}}}}}")]
    UnresolvedPlaceholder(String),

    /// The caller may not see (or, for mutations, may not change) this record.
    #[error("command {id} is not accessible to user '{user}'")]
    PermissionDenied { id: CommandId, user: String },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("command store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),
}

impl From<RenderError> for ResolveError {
    fn from(error: RenderError) -> Self {
        match error {
            RenderError::UnresolvedPlaceholder(name) => Self::UnresolvedPlaceholder(name),
        }
    }
}

impl ResolveError {
    /// Near-miss candidates worth showing to the caller, if any.
    pub fn near_misses(&self) -> &[Command] {
        match self {
            Self::NoMatch { near_misses, .. } => near_misses,
            _ => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholder_errors_name_the_token() {
        let error: ResolveError = RenderError::UnresolvedPlaceholder("API_KEY".into()).into();
        assert_eq!(error.to_string(), "no value available for placeholder {{API_KEY}}");
    }
}
