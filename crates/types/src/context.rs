//! Per-request resolution context.

use serde::{Deserialize, Serialize};

use crate::command::{Command, Scope};

/// Who is asking, from where, and with which optional narrowing hints.
///
/// Built fresh for every request and never persisted. Missing hints widen the search;
/// present hints only ever restrict it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionContext {
    pub user: String,
    pub hostname: String,
    pub cwd: String,
    #[serde(default)]
    pub namespace_hint: Option<String>,
    #[serde(default)]
    pub scope_hint: Option<Scope>,
}

impl ResolutionContext {
    pub fn new(user: impl Into<String>, hostname: impl Into<String>, cwd: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            hostname: hostname.into(),
            cwd: cwd.into(),
            namespace_hint: None,
            scope_hint: None,
        }
    }

    pub fn with_namespace_hint(mut self, namespace: impl Into<String>) -> Self {
        self.namespace_hint = Some(namespace.into());
        self
    }

    pub fn with_scope_hint(mut self, scope: Scope) -> Self {
        self.scope_hint = Some(scope);
        self
    }

    /// Whether `command` was saved by this user on this host.
    pub fn is_same_origin(&self, command: &Command) -> bool {
        command.owner.user == self.user && command.owner.hostname == self.hostname
    }

    /// Whether the namespace hint, when present, matches `command`.
    ///
    /// An absent hint matches every namespace.
    pub fn namespace_hint_matches(&self, command: &Command) -> bool {
        self.namespace_hint.as_deref().is_none_or(|hint| hint == command.namespace)
    }

    /// Whether `command` passes both hints.
    pub fn hints_admit(&self, command: &Command) -> bool {
        self.namespace_hint_matches(command) && self.scope_hint.as_ref().is_none_or(|scope| *scope == command.scope)
    }
}
