//! Usage-driven views over the store: suggestions, similar commands and execution analytics.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use chrono::{DateTime, Duration, Utc};
use hiproc_types::{Command, CommandFilter, CommandId, ExecutionMethod, ResolutionContext};
use hiproc_util::{CommandStore, directory_basename};
use indexmap::IndexMap;
use serde::Serialize;

use crate::{clock::Clock, error::ResolveError, retrieve::retrieve_by_id};

/// Number of entries in [`Analytics::most_used`].
pub const TOP_COMMANDS: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommandUsage {
    pub id: CommandId,
    pub name: String,
    pub namespace: String,
    pub executions: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Analytics {
    pub days: u32,
    pub total_executions: usize,
    pub unique_commands: usize,
    pub average_per_day: f64,
    pub most_used: Vec<CommandUsage>,
    /// Execution count per method, most frequent first.
    pub methods: IndexMap<ExecutionMethod, usize>,
}

#[derive(Debug, Clone)]
pub struct Insights {
    store: Arc<dyn CommandStore>,
    clock: Arc<dyn Clock>,
}

impl Insights {
    pub fn new(store: Arc<dyn CommandStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Commands worth running from here, best first, without duplicates.
    ///
    /// Draws from, in order: commands executed in directories with the same name as the
    /// working directory, the caller's own most used commands, and popular shared ones.
    pub fn suggestions(&self, context: &ResolutionContext, limit: usize) -> Result<Vec<Command>, ResolveError> {
        let visible: Vec<Command> = self
            .store
            .list(&CommandFilter::default())?
            .into_iter()
            .filter(|command| command.is_visible_to(&context.user))
            .collect();
        let by_id: HashMap<CommandId, &Command> = visible.iter().map(|command| (command.id, command)).collect();

        let mut ordered: Vec<&Command> = Vec::new();
        if let Some(basename) = directory_basename(&context.cwd) {
            let mut counts: HashMap<CommandId, usize> = HashMap::new();
            for record in self.store.executions(None)? {
                if record.details.cwd.contains(basename) {
                    *counts.entry(record.details.command_id).or_default() += 1;
                }
            }
            let mut nearby: Vec<(CommandId, usize)> = counts.into_iter().collect();
            nearby.sort_by_key(|(id, count)| (std::cmp::Reverse(*count), *id));
            ordered.extend(nearby.into_iter().filter_map(|(id, _)| by_id.get(&id).copied()));
        }

        let mut own: Vec<&Command> = visible.iter().filter(|command| command.is_owned_by(&context.user)).collect();
        own.sort_by_key(|command| (std::cmp::Reverse(command.usage_count), command.id));
        ordered.extend(own);

        let mut shared: Vec<&Command> = visible.iter().filter(|command| command.scope.is_shared()).collect();
        shared.sort_by_key(|command| (std::cmp::Reverse(command.usage_count), command.id));
        ordered.extend(shared);

        let mut seen = HashSet::new();
        Ok(ordered
            .into_iter()
            .filter(|command| seen.insert(command.id))
            .take(limit)
            .cloned()
            .collect())
    }

    /// Commands related to `id`: same namespace first (most used first), then by the
    /// number of template words shared with it.
    pub fn similar(&self, id: CommandId, context: &ResolutionContext, limit: usize) -> Result<Vec<Command>, ResolveError> {
        let base = retrieve_by_id(self.store.as_ref(), id, context)?;
        let others: Vec<Command> = self
            .store
            .list(&CommandFilter::default())?
            .into_iter()
            .filter(|command| command.id != id && command.is_visible_to(&context.user))
            .collect();

        let (mut same_namespace, rest): (Vec<Command>, Vec<Command>) =
            others.into_iter().partition(|command| command.namespace == base.namespace);
        same_namespace.sort_by_key(|command| (std::cmp::Reverse(command.usage_count), command.id));
        same_namespace.truncate(limit);
        if same_namespace.len() == limit {
            return Ok(same_namespace);
        }

        let base_words = words(&base.template);
        let mut overlapping: Vec<(usize, Command)> = rest
            .into_iter()
            .filter_map(|command| {
                let overlap = words(&command.template).intersection(&base_words).count();
                (overlap > 0).then_some((overlap, command))
            })
            .collect();
        overlapping.sort_by_key(|(overlap, command)| (std::cmp::Reverse(*overlap), command.id));

        let remaining = limit - same_namespace.len();
        same_namespace.extend(overlapping.into_iter().take(remaining).map(|(_, command)| command));
        Ok(same_namespace)
    }

    /// Execution statistics for the caller over the last `days` days.
    ///
    /// A window reaching past the earliest representable time covers all history.
    pub fn analytics(&self, context: &ResolutionContext, days: u32) -> Result<Analytics, ResolveError> {
        let since = self
            .clock
            .now()
            .checked_sub_signed(Duration::days(i64::from(days)))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let records: Vec<_> = self
            .store
            .executions(Some(since))?
            .into_iter()
            .filter(|record| record.details.user == context.user)
            .collect();

        let mut per_command: IndexMap<CommandId, usize> = IndexMap::new();
        let mut methods: IndexMap<ExecutionMethod, usize> = IndexMap::new();
        for record in &records {
            *per_command.entry(record.details.command_id).or_default() += 1;
            *methods.entry(record.details.method).or_default() += 1;
        }
        methods.sort_by(|_, left, _, right| right.cmp(left));

        let mut most_used = Vec::new();
        for (command_id, executions) in &per_command {
            let Some(command) = self.store.get(*command_id)? else {
                continue;
            };
            if !command.is_visible_to(&context.user) {
                continue;
            }
            most_used.push(CommandUsage {
                id: command.id,
                name: command.name,
                namespace: command.namespace,
                executions: *executions,
            });
        }
        let unique_commands = most_used.len();
        most_used.sort_by_key(|usage| (std::cmp::Reverse(usage.executions), usage.id));
        most_used.truncate(TOP_COMMANDS);

        let average_per_day = if days > 0 { records.len() as f64 / f64::from(days) } else { 0.0 };

        Ok(Analytics {
            days,
            total_executions: records.len(),
            unique_commands,
            average_per_day,
            most_used,
            methods,
        })
    }
}

fn words(template: &str) -> HashSet<String> {
    template.split_whitespace().map(str::to_lowercase).collect()
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use hiproc_types::{NewCommand, NewExecutionRecord, Owner, Scope};
    use hiproc_util::InMemoryCommandStore;

    use super::*;
    use crate::clock::FixedClock;

    struct Fixture {
        store: Arc<InMemoryCommandStore>,
        insights: Insights,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(InMemoryCommandStore::new());
        let clock = Arc::new(FixedClock(Utc.with_ymd_and_hms(2024, 6, 30, 0, 0, 0).unwrap()));
        let insights = Insights::new(store.clone(), clock);
        Fixture { store, insights }
    }

    fn save(store: &InMemoryCommandStore, name: &str, namespace: &str, user: &str, scope: Scope, template: &str) -> Command {
        store
            .insert(
                NewCommand {
                    template: template.into(),
                    name: name.into(),
                    namespace: namespace.into(),
                    scope,
                    owner: Owner::new(user, "h1"),
                    directory: "/p/webapp".into(),
                },
                Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            )
            .unwrap()
    }

    fn run(store: &InMemoryCommandStore, command_id: CommandId, user: &str, cwd: &str, method: ExecutionMethod, day: u32) {
        store
            .record_execution(
                NewExecutionRecord {
                    command_id,
                    user: user.into(),
                    hostname: "h1".into(),
                    cwd: cwd.into(),
                    arguments: None,
                    method,
                    duration_ms: None,
                    exit_code: Some(0),
                },
                Utc.with_ymd_and_hms(2024, 6, day, 0, 0, 0).unwrap(),
            )
            .unwrap();
    }

    #[test]
    fn suggestions_prefer_nearby_history_then_own_then_shared() {
        let Fixture { store, insights } = fixture();
        let build = save(&store, "build", "webapp", "alice", Scope::Personal, "make build");
        let test = save(&store, "test", "webapp", "alice", Scope::Personal, "make test");
        let shared = save(&store, "restart", "ops", "bob", Scope::Shared("ops".into()), "systemctl restart api");
        save(&store, "secret", "ops", "bob", Scope::Personal, "cat /etc/shadow");
        store.update_usage(test.id, Utc::now()).unwrap();
        run(&store, build.id, "alice", "/home/alice/webapp", ExecutionMethod::Name, 10);

        let context = ResolutionContext::new("alice", "h1", "/srv/webapp");
        let suggested: Vec<_> = insights.suggestions(&context, 5).unwrap().into_iter().map(|command| command.id).collect();
        assert_eq!(suggested, vec![build.id, test.id, shared.id]);

        assert_eq!(insights.suggestions(&context, 1).unwrap().len(), 1);
    }

    #[test]
    fn similar_fills_with_word_overlap() {
        let Fixture { store, insights } = fixture();
        let base = save(&store, "logs", "webapp", "alice", Scope::Personal, "kubectl logs -f deploy/web");
        let sibling = save(&store, "build", "webapp", "alice", Scope::Personal, "make build");
        let overlap = save(&store, "pods", "infra", "alice", Scope::Personal, "kubectl get pods");
        save(&store, "unrelated", "infra", "alice", Scope::Personal, "ls -la");

        let context = ResolutionContext::new("alice", "h1", "/p/webapp");
        let similar: Vec<_> = insights.similar(base.id, &context, 5).unwrap().into_iter().map(|command| command.id).collect();
        assert_eq!(similar, vec![sibling.id, overlap.id]);
    }

    #[test]
    fn analytics_counts_recent_executions_for_the_caller() {
        let Fixture { store, insights } = fixture();
        let deploy = save(&store, "deploy", "webapp", "alice", Scope::Personal, "make deploy");
        let build = save(&store, "build", "webapp", "alice", Scope::Personal, "make build");
        run(&store, deploy.id, "alice", "/p", ExecutionMethod::Name, 28);
        run(&store, deploy.id, "alice", "/p", ExecutionMethod::Id, 29);
        run(&store, build.id, "alice", "/p", ExecutionMethod::Name, 29);
        run(&store, build.id, "bob", "/p", ExecutionMethod::Name, 29);
        run(&store, build.id, "alice", "/p", ExecutionMethod::Name, 1);

        let context = ResolutionContext::new("alice", "h1", "/p");
        let analytics = insights.analytics(&context, 10).unwrap();
        assert_eq!(analytics.total_executions, 3);
        assert_eq!(analytics.unique_commands, 2);
        assert!((analytics.average_per_day - 0.3).abs() < f64::EPSILON);
        assert_eq!(analytics.most_used[0].id, deploy.id);
        assert_eq!(analytics.most_used[0].executions, 2);
        assert_eq!(analytics.methods.get_index(0), Some((&ExecutionMethod::Name, &2)));
    }

    #[test]
    fn analytics_window_longer_than_the_calendar_covers_all_history() {
        let Fixture { store, insights } = fixture();
        let deploy = save(&store, "deploy", "webapp", "alice", Scope::Personal, "make deploy");
        run(&store, deploy.id, "alice", "/p", ExecutionMethod::Name, 1);
        run(&store, deploy.id, "alice", "/p", ExecutionMethod::Name, 29);

        let context = ResolutionContext::new("alice", "h1", "/p");
        let analytics = insights.analytics(&context, u32::MAX).unwrap();
        assert_eq!(analytics.days, u32::MAX);
        assert_eq!(analytics.total_executions, 2);
        assert_eq!(analytics.unique_commands, 1);
    }
}
