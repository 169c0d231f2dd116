//! Candidate Retriever.
//!
//! Pulls the superset of stored records that could answer a query before ranking. Access
//! rules are applied here, so nothing downstream ever sees a record the caller may not use.

use hiproc_types::{Command, CommandId, ResolutionContext};
use hiproc_util::CommandStore;
use tracing::debug;

use crate::error::ResolveError;

/// What the caller asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CandidateQuery {
    /// Exact record id. Hints and ranking do not apply.
    Id(CommandId),
    /// Every visible record with this name.
    Name(String),
    /// Every visible record with this exact (namespace, name) pair.
    Qualified { namespace: String, name: String },
}

impl CandidateQuery {
    /// Integer input becomes an id query; anything else is a name.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().parse::<CommandId>() {
            Ok(id) => Self::Id(id),
            Err(_) => Self::Name(raw.trim().to_string()),
        }
    }

    /// Human readable form used in error messages.
    pub fn label(&self) -> String {
        match self {
            Self::Id(id) => id.to_string(),
            Self::Name(name) => name.clone(),
            Self::Qualified { namespace, name } => format!("{namespace}/{name}"),
        }
    }
}

/// Fetch the candidates for `query` as seen by `context`.
///
/// * Id: the record if it exists and is visible. A missing id is `NotFound`; an existing
///   record owned by someone else under personal scope is `PermissionDenied`.
/// * Name: visible records with that name, narrowed by the context hints. An unknown name
///   is `NotFound`; a known name with nothing left after access rules and hints is
///   `NoMatch`, carrying the visible records the hints excluded.
/// * Qualified: as Name, with the namespace fixed to the requested one.
pub fn retrieve(store: &dyn CommandStore, query: &CandidateQuery, context: &ResolutionContext) -> Result<Vec<Command>, ResolveError> {
    match query {
        CandidateQuery::Id(id) => retrieve_by_id(store, *id, context).map(|command| vec![command]),
        CandidateQuery::Name(name) => retrieve_by_name(store, name, None, context, query),
        CandidateQuery::Qualified { namespace, name } => retrieve_by_name(store, name, Some(namespace), context, query),
    }
}

/// Fetch a single record by id, enforcing visibility.
pub fn retrieve_by_id(store: &dyn CommandStore, id: CommandId, context: &ResolutionContext) -> Result<Command, ResolveError> {
    let Some(command) = store.get(id)? else {
        return Err(ResolveError::NotFound { query: id.to_string() });
    };
    if !command.is_visible_to(&context.user) {
        return Err(ResolveError::PermissionDenied {
            id,
            user: context.user.clone(),
        });
    }
    Ok(command)
}

fn retrieve_by_name(
    store: &dyn CommandStore,
    name: &str,
    namespace: Option<&String>,
    context: &ResolutionContext,
    query: &CandidateQuery,
) -> Result<Vec<Command>, ResolveError> {
    let named = store.find(name, &|_| true)?;
    if named.is_empty() {
        return Err(ResolveError::NotFound { query: query.label() });
    }

    let (admitted, near_misses): (Vec<Command>, Vec<Command>) = named
        .into_iter()
        .filter(|command| command.is_visible_to(&context.user))
        .partition(|command| namespace.is_none_or(|namespace| *namespace == command.namespace) && context.hints_admit(command));

    debug!(
        query = %query.label(),
        candidates = admitted.len(),
        excluded_by_hints = near_misses.len(),
        "retrieved candidates"
    );

    if admitted.is_empty() {
        return Err(ResolveError::NoMatch {
            query: query.label(),
            near_misses,
        });
    }
    Ok(admitted)
}
