//! Execution history records used for analytics.

use std::{error::Error, fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::command::CommandId;

/// How the caller reached the command that was executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMethod {
    /// Direct numeric id lookup.
    Id,
    /// Name-only lookup through full ranking.
    Name,
    /// `namespace name` lookup.
    NamespaceName,
    /// Picked from a ranked candidate list.
    Find,
    /// Saved and executed in one step.
    Do,
}

impl ExecutionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::Name => "name",
            Self::NamespaceName => "namespace_name",
            Self::Find => "find",
            Self::Do => "do",
        }
    }
}

impl fmt::Display for ExecutionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseExecutionMethodError(pub String);

impl fmt::Display for ParseExecutionMethodError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown execution method '{}'", self.0)
    }
}

impl Error for ParseExecutionMethodError {}

impl FromStr for ExecutionMethod {
    type Err = ParseExecutionMethodError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "id" => Ok(Self::Id),
            "name" => Ok(Self::Name),
            "namespace_name" => Ok(Self::NamespaceName),
            "find" => Ok(Self::Find),
            "do" => Ok(Self::Do),
            other => Err(ParseExecutionMethodError(other.to_string())),
        }
    }
}

/// Execution details reported by the caller after running a rendered command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewExecutionRecord {
    pub command_id: CommandId,
    pub user: String,
    pub hostname: String,
    pub cwd: String,
    /// Caller arguments, already redacted. Never the rendered command.
    #[serde(default)]
    pub arguments: Option<String>,
    pub method: ExecutionMethod,
    #[serde(default)]
    pub duration_ms: Option<u64>,
    #[serde(default)]
    pub exit_code: Option<i32>,
}

/// A persisted execution history entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub id: u64,
    #[serde(flatten)]
    pub details: NewExecutionRecord,
    pub executed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_names_match_their_wire_form() {
        for method in [
            ExecutionMethod::Id,
            ExecutionMethod::Name,
            ExecutionMethod::NamespaceName,
            ExecutionMethod::Find,
            ExecutionMethod::Do,
        ] {
            let wire = serde_json::to_string(&method).expect("serialize");
            assert_eq!(wire.trim_matches('"'), method.as_str());
            assert_eq!(method.as_str().parse::<ExecutionMethod>(), Ok(method));
        }
        assert!("shell".parse::<ExecutionMethod>().is_err());
    }
}
