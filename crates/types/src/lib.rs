//! Shared data model for hiproc.
//!
//! These types cross every crate boundary in the workspace: the command store persists
//! [`Command`] and [`ExecutionRecord`] values, the engine consumes them together with a
//! per-request [`ResolutionContext`], and the CLI renders them.

pub mod command;
pub mod context;
pub mod execution;

pub use command::{Command, CommandFilter, CommandId, NewCommand, Owner, PERSONAL_SCOPE, Scope};
pub use context::ResolutionContext;
pub use execution::{ExecutionMethod, ExecutionRecord, NewExecutionRecord, ParseExecutionMethodError};
