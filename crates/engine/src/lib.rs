//! # hiproc Engine
//!
//! Context-aware command resolution. Given a query (an id, a name, or a `namespace name`
//! pair) and the caller's user, host and working directory, the engine picks the single best
//! stored command, expands its `{{PLACEHOLDER}}` tokens, and hands back something runnable.
//!
//! ## Pipeline
//!
//! - **`context`**: fills in a [`ResolutionContext`](hiproc_types::ResolutionContext) from raw request fields
//! - **`retrieve`**: visible candidates for the query, narrowed by namespace/scope hints
//! - **`rank`**: seven-tier cascade with deterministic tie-breaks
//! - **`templates`**: placeholder expansion from arguments, environment, and secret prompts
//! - **`dispatch`**: routing, rendering, usage recording
//!
//! Around the pipeline sit `catalog` (owner-checked CRUD), `project` (name and namespace
//! detection for saves) and `insights` (suggestions, similar commands, analytics).
//!
//! ## Usage
//!
//! ```rust
//! use std::{collections::HashMap, sync::Arc};
//!
//! use hiproc_engine::{Basename, Catalog, DispatchQuery, Dispatcher, NonInteractivePrompt, SaveRequest, SystemClock};
//! use hiproc_types::ResolutionContext;
//! use hiproc_util::InMemoryCommandStore;
//!
//! let store = Arc::new(InMemoryCommandStore::new());
//! let catalog = Catalog::new(store.clone(), Arc::new(SystemClock));
//! let dispatcher = Dispatcher::new(store, Arc::new(SystemClock), Arc::new(Basename));
//! let context = ResolutionContext::new("alice", "laptop", "/home/alice/webapp");
//!
//! catalog.save(SaveRequest::new("git log --oneline -n {{COUNT}}"), &context)?;
//!
//! let plan = dispatcher.dispatch(
//!     &DispatchQuery::Name("git".into()),
//!     &context,
//!     &["COUNT:5"],
//!     &HashMap::<String, String>::new(),
//!     &NonInteractivePrompt,
//! )?;
//! assert_eq!(plan.text(), "git log --oneline -n 5");
//! # Ok::<(), hiproc_engine::ResolveError>(())
//! ```

pub mod catalog;
pub mod clock;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod insights;
pub mod project;
pub mod rank;
pub mod retrieve;
pub mod secrets;
pub mod templates;

pub use catalog::{Catalog, SaveOutcome, SaveRequest};
pub use clock::{Clock, FixedClock, SystemClock};
pub use context::{ContextExtractor, RequestContext};
pub use dispatch::{DispatchQuery, Dispatcher, ExecutionPlan, ExecutionReport};
pub use error::{RenderError, ResolveError};
pub use insights::{Analytics, CommandUsage, Insights};
pub use project::{ProjectInfo, ProjectKind, detect_name, detect_project};
pub use rank::{Basename, BasenameOrSibling, DirectoryHeuristic, MatchResult, MatchTier, RankedCandidate, heuristic_for, rank, select};
pub use retrieve::{CandidateQuery, retrieve};
pub use secrets::{EnvLookup, KeychainSecretPrompt, NonInteractivePrompt, ProcessEnvironment, SecretPrompt, TerminalSecretPrompt};
pub use templates::{ParsedArguments, Rendered, ValueSource, placeholders, render};
