//! Context Extractor: turns raw request fields into a [`ResolutionContext`].

use hiproc_types::{ResolutionContext, Scope};
use hiproc_util::normalize_directory;
use serde::{Deserialize, Serialize};

/// Raw, possibly incomplete request fields as handed over by a transport.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestContext {
    pub user: Option<String>,
    pub hostname: Option<String>,
    pub cwd: Option<String>,
    pub namespace: Option<String>,
    pub scope: Option<String>,
}

/// Fills gaps in a [`RequestContext`] with the identity of the machine the request came from.
///
/// Identity fields are trusted as given. Extraction cannot fail; absent or blank hints are
/// dropped, which only widens the search.
#[derive(Debug, Clone)]
pub struct ContextExtractor {
    origin_user: String,
    origin_hostname: String,
    origin_cwd: String,
}

impl ContextExtractor {
    pub fn new(origin_user: impl Into<String>, origin_hostname: impl Into<String>, origin_cwd: impl Into<String>) -> Self {
        Self {
            origin_user: origin_user.into(),
            origin_hostname: origin_hostname.into(),
            origin_cwd: origin_cwd.into(),
        }
    }

    pub fn extract(&self, request: RequestContext) -> ResolutionContext {
        let present = |value: Option<String>| value.map(|value| value.trim().to_string()).filter(|value| !value.is_empty());

        let user = present(request.user).unwrap_or_else(|| self.origin_user.clone());
        let hostname = present(request.hostname).unwrap_or_else(|| self.origin_hostname.clone());
        let cwd = present(request.cwd).unwrap_or_else(|| self.origin_cwd.clone());

        ResolutionContext {
            user,
            hostname,
            cwd: normalize_directory(&cwd),
            namespace_hint: present(request.namespace),
            scope_hint: present(request.scope).map(|scope| Scope::parse(&scope)),
        }
    }
}
