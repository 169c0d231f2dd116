//! Stored command records and the filters used to scan them.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier assigned by the store at creation. Never reused, even after delete.
pub type CommandId = i64;

/// Wire name of the personal scope.
pub const PERSONAL_SCOPE: &str = "personal";

/// Visibility class of a stored command.
///
/// `Personal` commands are only visible to their owner. Any other value names a shared
/// scope (usually a team) whose commands are readable by everyone but writable only by
/// the owner.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Scope {
    #[default]
    Personal,
    Shared(String),
}

impl Scope {
    /// Parses a user supplied scope name. Empty input maps to the personal scope.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case(PERSONAL_SCOPE) {
            Self::Personal
        } else {
            Self::Shared(trimmed.to_string())
        }
    }

    pub fn is_shared(&self) -> bool {
        matches!(self, Self::Shared(_))
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Personal => PERSONAL_SCOPE,
            Self::Shared(name) => name.as_str(),
        }
    }
}

impl From<String> for Scope {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl From<Scope> for String {
    fn from(value: Scope) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity that created a record: the user together with the machine they were on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Owner {
    pub user: String,
    pub hostname: String,
}

impl Owner {
    pub fn new(user: impl Into<String>, hostname: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            hostname: hostname.into(),
        }
    }
}

/// A persisted command template together with its context and usage statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    pub id: CommandId,
    /// Short identifier, unique only within (namespace, scope, owner).
    pub name: String,
    /// Grouping label, typically the project the command was saved in.
    pub namespace: String,
    #[serde(default)]
    pub scope: Scope,
    pub owner: Owner,
    /// Absolute directory captured at save time. Used for locality scoring only.
    pub directory: String,
    /// Raw command string, possibly containing `{{PLACEHOLDER}}` tokens.
    pub template: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub last_used_at: Option<DateTime<Utc>>,
    /// Number of successful executions through the engine. Never decreases.
    #[serde(default)]
    pub usage_count: u64,
}

impl Command {
    /// Whether `user` owns this record and may therefore mutate or delete it.
    pub fn is_owned_by(&self, user: &str) -> bool {
        self.owner.user == user
    }

    /// Whether `user` may see and execute this record.
    pub fn is_visible_to(&self, user: &str) -> bool {
        self.is_owned_by(user) || self.scope.is_shared()
    }

    /// `namespace/name` label used in user facing output.
    pub fn qualified_name(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }

    /// Whether every persisted field of `candidate` matches this record.
    pub fn is_duplicate_of(&self, candidate: &NewCommand) -> bool {
        self.template == candidate.template
            && self.name == candidate.name
            && self.namespace == candidate.namespace
            && self.scope == candidate.scope
            && self.owner == candidate.owner
            && self.directory == candidate.directory
    }
}

/// Payload for inserting a new record. The store assigns `id` and timestamps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCommand {
    pub template: String,
    pub name: String,
    pub namespace: String,
    #[serde(default)]
    pub scope: Scope,
    pub owner: Owner,
    pub directory: String,
}

/// Equality filters over stored records. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandFilter {
    pub name: Option<String>,
    pub namespace: Option<String>,
    pub scope: Option<Scope>,
    pub owner: Option<String>,
    pub directory: Option<String>,
    /// Case-sensitive substring match against the template.
    pub text: Option<String>,
}

impl CommandFilter {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.scope = Some(scope);
        self
    }

    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    pub fn with_directory(mut self, directory: impl Into<String>) -> Self {
        self.directory = Some(directory.into());
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn matches(&self, command: &Command) -> bool {
        let equals = |expected: &Option<String>, actual: &str| expected.as_deref().is_none_or(|value| value == actual);

        equals(&self.name, &command.name)
            && equals(&self.namespace, &command.namespace)
            && equals(&self.owner, &command.owner.user)
            && equals(&self.directory, &command.directory)
            && self.scope.as_ref().is_none_or(|scope| *scope == command.scope)
            && self.text.as_deref().is_none_or(|text| command.template.contains(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Command {
        Command {
            id: 7,
            name: "deploy".into(),
            namespace: "webapp".into(),
            scope: Scope::Personal,
            owner: Owner::new("alice", "h1"),
            directory: "/p/a".into(),
            template: "make deploy ENV={{ENV}}".into(),
            created_at: Utc::now(),
            last_used_at: None,
            usage_count: 0,
        }
    }

    #[test]
    fn scope_round_trips_through_plain_strings() {
        let shared: Scope = serde_json::from_str("\"platform\"").expect("shared scope");
        assert_eq!(shared, Scope::Shared("platform".into()));
        let personal: Scope = serde_json::from_str("\"personal\"").expect("personal scope");
        assert_eq!(personal, Scope::Personal);
        assert_eq!(serde_json::to_string(&shared).expect("serialize"), "\"platform\"");
    }

    #[test]
    fn personal_records_are_hidden_from_other_users() {
        let mut command = sample();
        assert!(command.is_visible_to("alice"));
        assert!(!command.is_visible_to("bob"));

        command.scope = Scope::Shared("platform".into());
        assert!(command.is_visible_to("bob"));
        assert!(!command.is_owned_by("bob"));
    }

    #[test]
    fn filter_combines_equality_and_substring_checks() {
        let command = sample();
        assert!(CommandFilter::default().matches(&command));
        assert!(CommandFilter::default().with_namespace("webapp").with_text("deploy").matches(&command));
        assert!(!CommandFilter::default().with_owner("bob").matches(&command));
        assert!(!CommandFilter::default().with_scope(Scope::Shared("platform".into())).matches(&command));
    }
}
