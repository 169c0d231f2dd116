//! Execution Dispatcher.
//!
//! Routes a query to the id, `namespace name`, or name path, ranks where needed, renders the
//! winner and records usage. It never executes anything itself: the caller receives an
//! [`ExecutionPlan`] and decides what to do with the rendered text.

use std::{fmt, sync::Arc};

use hiproc_types::{Command, CommandId, ExecutionMethod, ExecutionRecord, NewExecutionRecord, ResolutionContext};
use hiproc_util::{CommandStore, redact_arguments};
use tracing::{debug, info, warn};

use crate::{
    clock::Clock,
    error::ResolveError,
    rank::{DirectoryHeuristic, MatchTier, RankedCandidate, rank, select},
    retrieve::{CandidateQuery, retrieve},
    secrets::{EnvLookup, SecretPrompt},
    templates::{ParsedArguments, Rendered, render, split_named_argument},
};

/// A query in the shape the dispatcher routes on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchQuery {
    Id(CommandId),
    NamespaceName { namespace: String, name: String },
    Name(String),
}

impl DispatchQuery {
    /// Split caller tokens into a query and the remaining template arguments.
    ///
    /// A bare integer first token is an id. Otherwise a second token that is neither a
    /// `KEY:VALUE` pair nor a flag turns the first two tokens into `namespace name`.
    /// Anything else is a name followed by arguments.
    pub fn from_tokens<S: AsRef<str>>(tokens: &[S]) -> Option<(Self, &[S])> {
        let (first, rest) = tokens.split_first()?;
        let first = first.as_ref().trim();
        if first.is_empty() {
            return None;
        }
        if let Ok(id) = first.parse::<CommandId>() {
            return Some((Self::Id(id), rest));
        }
        if let Some((second, remaining)) = rest.split_first() {
            let second = second.as_ref().trim();
            if !second.is_empty() && !second.starts_with('-') && split_named_argument(second).is_none() {
                return Some((
                    Self::NamespaceName {
                        namespace: first.to_string(),
                        name: second.to_string(),
                    },
                    remaining,
                ));
            }
        }
        Some((Self::Name(first.to_string()), rest))
    }

    pub fn method(&self) -> ExecutionMethod {
        match self {
            Self::Id(_) => ExecutionMethod::Id,
            Self::NamespaceName { .. } => ExecutionMethod::NamespaceName,
            Self::Name(_) => ExecutionMethod::Name,
        }
    }

    fn candidate_query(&self) -> CandidateQuery {
        match self {
            Self::Id(id) => CandidateQuery::Id(*id),
            Self::NamespaceName { namespace, name } => CandidateQuery::Qualified {
                namespace: namespace.clone(),
                name: name.clone(),
            },
            Self::Name(name) => CandidateQuery::Name(name.clone()),
        }
    }
}

impl From<CandidateQuery> for DispatchQuery {
    fn from(query: CandidateQuery) -> Self {
        match query {
            CandidateQuery::Id(id) => Self::Id(id),
            CandidateQuery::Qualified { namespace, name } => Self::NamespaceName { namespace, name },
            CandidateQuery::Name(name) => Self::Name(name),
        }
    }
}

/// A resolved and rendered command, ready for the caller to run.
#[derive(Clone)]
pub struct ExecutionPlan {
    /// The chosen record, with usage statistics as recorded for this execution.
    pub command: Command,
    /// Rendered command text. May contain secrets: never log or persist it.
    pub rendered: Rendered,
    /// Tier the winner was selected at. `None` on the id path, which skips ranking.
    pub tier: Option<MatchTier>,
    pub method: ExecutionMethod,
    pub runners_up: Vec<RankedCandidate>,
}

impl ExecutionPlan {
    pub fn text(&self) -> &str {
        &self.rendered.text
    }
}

impl fmt::Debug for ExecutionPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionPlan")
            .field("command", &self.command.id)
            .field("rendered", &self.rendered)
            .field("tier", &self.tier)
            .field("method", &self.method)
            .field("runners_up", &self.runners_up.len())
            .finish()
    }
}

/// Outcome of running a plan, as reported back by the caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecutionReport {
    pub duration_ms: Option<u64>,
    pub exit_code: Option<i32>,
}

#[derive(Debug, Clone)]
pub struct Dispatcher {
    store: Arc<dyn CommandStore>,
    clock: Arc<dyn Clock>,
    heuristic: Arc<dyn DirectoryHeuristic>,
}

impl Dispatcher {
    pub fn new(store: Arc<dyn CommandStore>, clock: Arc<dyn Clock>, heuristic: Arc<dyn DirectoryHeuristic>) -> Self {
        Self { store, clock, heuristic }
    }

    /// Resolve `query`, render the winner with `arguments`, and record the use.
    ///
    /// Failures leave the store untouched. A failed usage update is logged and ignored.
    pub fn dispatch<S: AsRef<str>>(
        &self,
        query: &DispatchQuery,
        context: &ResolutionContext,
        arguments: &[S],
        env: &dyn EnvLookup,
        prompt: &dyn SecretPrompt,
    ) -> Result<ExecutionPlan, ResolveError> {
        let (winner, tier, runners_up) = self.choose(query, context)?;
        self.plan(winner, tier, runners_up, query.method(), arguments, env, prompt)
    }

    /// Render and record a record the caller already holds, e.g. one picked from
    /// [`Dispatcher::rank_only`] or one that was just saved.
    pub fn dispatch_command<S: AsRef<str>>(
        &self,
        command: Command,
        method: ExecutionMethod,
        arguments: &[S],
        env: &dyn EnvLookup,
        prompt: &dyn SecretPrompt,
    ) -> Result<ExecutionPlan, ResolveError> {
        self.plan(command, None, Vec::new(), method, arguments, env, prompt)
    }

    /// Ranked candidates with their tiers, best first. No usage is recorded.
    pub fn rank_only(&self, query: &DispatchQuery, context: &ResolutionContext) -> Result<Vec<RankedCandidate>, ResolveError> {
        let candidates = retrieve(self.store.as_ref(), &query.candidate_query(), context)?;
        Ok(rank(candidates, context, self.heuristic.as_ref()))
    }

    /// Append an execution history entry for a plan the caller ran. Arguments are redacted.
    pub fn record_execution<S: AsRef<str>>(
        &self,
        plan: &ExecutionPlan,
        context: &ResolutionContext,
        arguments: &[S],
        report: ExecutionReport,
    ) -> Result<ExecutionRecord, ResolveError> {
        let arguments: Vec<String> = arguments.iter().map(|argument| argument.as_ref().to_string()).collect();
        let record = NewExecutionRecord {
            command_id: plan.command.id,
            user: context.user.clone(),
            hostname: context.hostname.clone(),
            cwd: context.cwd.clone(),
            arguments: redact_arguments(&arguments),
            method: plan.method,
            duration_ms: report.duration_ms,
            exit_code: report.exit_code,
        };
        Ok(self.store.record_execution(record, self.clock.now())?)
    }

    fn choose(&self, query: &DispatchQuery, context: &ResolutionContext) -> Result<(Command, Option<MatchTier>, Vec<RankedCandidate>), ResolveError> {
        let candidate_query = query.candidate_query();
        let candidates = retrieve(self.store.as_ref(), &candidate_query, context)?;
        if let DispatchQuery::Id(_) = query {
            let Some(command) = candidates.into_iter().next() else {
                return Err(ResolveError::NotFound {
                    query: candidate_query.label(),
                });
            };
            debug!(id = command.id, "id path; ranking skipped");
            return Ok((command, None, Vec::new()));
        }

        let Some(result) = select(candidates, context, self.heuristic.as_ref()) else {
            return Err(ResolveError::NoMatch {
                query: candidate_query.label(),
                near_misses: Vec::new(),
            });
        };
        Ok((result.winner, Some(result.tier), result.runners_up))
    }

    #[allow(clippy::too_many_arguments)]
    fn plan<S: AsRef<str>>(
        &self,
        command: Command,
        tier: Option<MatchTier>,
        runners_up: Vec<RankedCandidate>,
        method: ExecutionMethod,
        arguments: &[S],
        env: &dyn EnvLookup,
        prompt: &dyn SecretPrompt,
    ) -> Result<ExecutionPlan, ResolveError> {
        let parsed = ParsedArguments::parse(arguments);
        let rendered = render(&command.template, &parsed, env, prompt)?;

        let command = match self.store.update_usage(command.id, self.clock.now()) {
            Ok(updated) => updated,
            Err(error) => {
                warn!(id = command.id, error = %error, "failed to record command usage");
                command
            }
        };
        info!(
            id = command.id,
            tier = tier.map(MatchTier::number),
            method = %method,
            placeholders = rendered.sources.len(),
            "dispatched command"
        );

        Ok(ExecutionPlan {
            command,
            rendered,
            tier,
            method,
            runners_up,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use chrono::{TimeZone, Utc};
    use hiproc_types::{NewCommand, Owner, Scope};
    use hiproc_util::{InMemoryCommandStore, StoreError};

    use super::*;
    use crate::{clock::FixedClock, rank::Basename, secrets::NonInteractivePrompt};

    fn tokens(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|token| token.to_string()).collect()
    }

    #[test]
    fn routing_recognises_ids_pairs_and_names() {
        let raw = tokens(&["42", "ENV:prod"]);
        let (query, rest) = DispatchQuery::from_tokens(&raw).unwrap();
        assert_eq!(query, DispatchQuery::Id(42));
        assert_eq!(rest, &raw[1..]);

        let raw = tokens(&["webapp", "deploy", "ENV:prod"]);
        let (query, rest) = DispatchQuery::from_tokens(&raw).unwrap();
        assert_eq!(
            query,
            DispatchQuery::NamespaceName {
                namespace: "webapp".into(),
                name: "deploy".into()
            }
        );
        assert_eq!(rest.len(), 1);

        for second in ["ENV:prod", "--verbose"] {
            let raw = tokens(&["deploy", second]);
            let (query, rest) = DispatchQuery::from_tokens(&raw).unwrap();
            assert_eq!(query, DispatchQuery::Name("deploy".into()));
            assert_eq!(rest.len(), 1);
        }

        assert!(DispatchQuery::from_tokens::<String>(&[]).is_none());
    }

    #[derive(Debug, Default)]
    struct BrokenUsageStore {
        inner: InMemoryCommandStore,
    }

    impl CommandStore for BrokenUsageStore {
        fn get(&self, id: CommandId) -> Result<Option<Command>, StoreError> {
            self.inner.get(id)
        }
        fn find(&self, name: &str, visible: &dyn Fn(&Command) -> bool) -> Result<Vec<Command>, StoreError> {
            self.inner.find(name, visible)
        }
        fn insert(&self, command: NewCommand, created_at: chrono::DateTime<Utc>) -> Result<Command, StoreError> {
            self.inner.insert(command, created_at)
        }
        fn update_usage(&self, _id: CommandId, _used_at: chrono::DateTime<Utc>) -> Result<Command, StoreError> {
            Err(StoreError::Lock)
        }
        fn update_template(&self, id: CommandId, template: &str) -> Result<Command, StoreError> {
            self.inner.update_template(id, template)
        }
        fn update_rename(&self, id: CommandId, namespace: &str, name: &str) -> Result<Command, StoreError> {
            self.inner.update_rename(id, namespace, name)
        }
        fn delete(&self, id: CommandId) -> Result<Command, StoreError> {
            self.inner.delete(id)
        }
        fn list(&self, filter: &hiproc_types::CommandFilter) -> Result<Vec<Command>, StoreError> {
            self.inner.list(filter)
        }
        fn record_execution(&self, record: NewExecutionRecord, executed_at: chrono::DateTime<Utc>) -> Result<ExecutionRecord, StoreError> {
            self.inner.record_execution(record, executed_at)
        }
        fn executions(&self, since: Option<chrono::DateTime<Utc>>) -> Result<Vec<ExecutionRecord>, StoreError> {
            self.inner.executions(since)
        }
    }

    fn new_command(template: &str) -> NewCommand {
        NewCommand {
            template: template.into(),
            name: "deploy".into(),
            namespace: "webapp".into(),
            scope: Scope::Personal,
            owner: Owner::new("alice", "h1"),
            directory: "/p/a".into(),
        }
    }

    #[test]
    fn failed_usage_update_does_not_block_the_plan() {
        let store = Arc::new(BrokenUsageStore::default());
        let saved = store.insert(new_command("make deploy"), Utc::now()).unwrap();
        let dispatcher = Dispatcher::new(
            store,
            Arc::new(FixedClock(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())),
            Arc::new(Basename),
        );

        let context = ResolutionContext::new("alice", "h1", "/p/a");
        let plan = dispatcher
            .dispatch(&DispatchQuery::Name("deploy".into()), &context, &[] as &[&str], &HashMap::<String, String>::new(), &NonInteractivePrompt)
            .unwrap();
        assert_eq!(plan.command.id, saved.id);
        assert_eq!(plan.command.usage_count, 0);
        assert_eq!(plan.text(), "make deploy");
    }

    #[test]
    fn failed_render_records_no_usage() {
        let store = Arc::new(InMemoryCommandStore::new());
        let saved = store.insert(new_command("deploy --token {{TOKEN}}"), Utc::now()).unwrap();
        let dispatcher = Dispatcher::new(store.clone(), Arc::new(FixedClock(Utc::now())), Arc::new(Basename));

        let context = ResolutionContext::new("alice", "h1", "/p/a");
        let error = dispatcher
            .dispatch(&DispatchQuery::Id(saved.id), &context, &[] as &[&str], &HashMap::<String, String>::new(), &NonInteractivePrompt)
            .unwrap_err();
        assert!(matches!(error, ResolveError::UnresolvedPlaceholder(ref name) if name == "TOKEN"));
        assert_eq!(store.get(saved.id).unwrap().unwrap().usage_count, 0);
    }

    #[test]
    fn execution_history_stores_redacted_arguments() {
        let store = Arc::new(InMemoryCommandStore::new());
        let saved = store.insert(new_command("deploy {{API_TOKEN}}"), Utc::now()).unwrap();
        let dispatcher = Dispatcher::new(store.clone(), Arc::new(FixedClock(Utc::now())), Arc::new(Basename));
        let context = ResolutionContext::new("alice", "h1", "/p/a");
        let arguments = ["API_TOKEN:hunter2", "-v"];

        let plan = dispatcher
            .dispatch(&DispatchQuery::Id(saved.id), &context, &arguments, &HashMap::<String, String>::new(), &NonInteractivePrompt)
            .unwrap();
        assert_eq!(plan.tier, None);
        assert_eq!(plan.text(), "deploy hunter2 -v");

        let report = ExecutionReport {
            duration_ms: Some(5),
            exit_code: Some(0),
        };
        let record = dispatcher.record_execution(&plan, &context, &arguments, report).unwrap();
        assert_eq!(record.details.arguments.as_deref(), Some("API_TOKEN:[REDACTED] -v"));
        assert_eq!(record.details.method, ExecutionMethod::Id);
        assert!(!format!("{plan:?}").contains("hunter2"));
    }
}
