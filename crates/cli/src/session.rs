//! One `hp` invocation: configuration, the store, the caller's context, and the action.

use std::{path::Path, process::ExitCode, sync::Arc, time::Instant};

use anyhow::{Context, Result, anyhow, bail};
use hiproc_engine::{
    Catalog, Clock, ContextExtractor, DirectoryHeuristic, DispatchQuery, Dispatcher, ExecutionPlan, ExecutionReport, Insights,
    KeychainSecretPrompt, ProcessEnvironment, RequestContext, ResolveError, SaveRequest, SecretPrompt, SystemClock, TerminalSecretPrompt,
    detect_project, heuristic_for,
};
use hiproc_types::{CommandFilter, ExecutionMethod, ResolutionContext, Scope};
use hiproc_util::{CommandStore, JsonCommandStore, SecretsBackend, Settings, remove_secret, store_secret};
use tracing::{debug, info, warn};

use crate::{
    args::{Action, Hints, SaveArgs, SecretAction, has_trailing_print},
    output,
};

const SHELL: &str = "sh";

pub struct Session {
    settings: Settings,
    extractor: ContextExtractor,
    heuristic: Arc<dyn DirectoryHeuristic>,
    catalog: Catalog,
    dispatcher: Dispatcher,
    insights: Insights,
    backend: SecretsBackend,
    prompt: KeychainSecretPrompt<TerminalSecretPrompt>,
    print: bool,
}

impl Session {
    pub fn open(print: bool) -> Result<Self> {
        let settings = Settings::load().context("failed to load configuration")?;
        debug!(sources = ?settings.sources, store = %settings.store_path.display(), "loaded settings");

        let store: Arc<dyn CommandStore> = Arc::new(
            JsonCommandStore::open(settings.store_path.clone(), settings.execution_history_limit)
                .with_context(|| format!("failed to open command store at {}", settings.store_path.display()))?,
        );
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let heuristic = heuristic_for(settings.directory_heuristic);
        let backend = SecretsBackend::effective(settings.secrets_backend);

        Ok(Self {
            extractor: origin()?,
            catalog: Catalog::new(store.clone(), clock.clone()),
            dispatcher: Dispatcher::new(store.clone(), clock.clone(), heuristic.clone()),
            insights: Insights::new(store, clock),
            heuristic,
            backend,
            prompt: KeychainSecretPrompt::new(backend, TerminalSecretPrompt),
            settings,
            print,
        })
    }

    fn context(&self, hints: &Hints) -> ResolutionContext {
        self.extractor.extract(RequestContext {
            namespace: hints.namespace.clone(),
            scope: hints.scope.clone(),
            ..RequestContext::default()
        })
    }

    pub async fn run(&self, action: Action) -> Result<ExitCode> {
        let context = self.context(&Hints::default());
        match action {
            Action::Save(args) => {
                let outcome = self.catalog.save(self.save_request(args), &context)?;
                let command = &outcome.command;
                if outcome.is_new {
                    println!("Saved #{} as {}", command.id, command.qualified_name());
                } else {
                    println!("Already saved as #{} ({})", command.id, command.qualified_name());
                }
            }
            Action::Do(args) => {
                let outcome = self.catalog.save(self.save_request(args), &context)?;
                let plan = self
                    .dispatcher
                    .dispatch_command(outcome.command, ExecutionMethod::Do, &[] as &[String], &ProcessEnvironment, &self.prompt)?;
                return self.execute(plan, &context, &[]).await;
            }
            Action::Run { name, hints, args } => {
                return self.recall(DispatchQuery::Name(name), &self.context(&hints), &args).await;
            }
            Action::Exec { id, args } => return self.recall(DispatchQuery::Id(id), &context, &args).await,
            Action::Recall(tokens) => {
                let (query, arguments) = DispatchQuery::from_tokens(&tokens).ok_or_else(|| anyhow!("expected a command id or name"))?;
                return self.recall(query, &context, arguments).await;
            }
            Action::Candidates { query, hints, pick, args } => {
                let context = self.context(&hints);
                let (query, _) = DispatchQuery::from_tokens(&query).ok_or_else(|| anyhow!("expected a command id or name"))?;
                let ranked = self.dispatcher.rank_only(&query, &context).map_err(explain)?;
                let Some(position) = pick else {
                    println!("{}", output::candidates_table(&ranked));
                    return Ok(ExitCode::SUCCESS);
                };
                let Some(candidate) = position.checked_sub(1).and_then(|index| ranked.get(index)) else {
                    bail!("no candidate at position {position}; there are {}", ranked.len());
                };
                let plan = self.dispatcher.dispatch_command(
                    candidate.command.clone(),
                    ExecutionMethod::Find,
                    &args,
                    &ProcessEnvironment,
                    &self.prompt,
                )?;
                return self.execute(plan, &context, &args).await;
            }
            Action::List { hints, mine } => {
                let context = self.context(&hints);
                let mut filter = CommandFilter::default();
                if let Some(namespace) = &context.namespace_hint {
                    filter = filter.with_namespace(namespace.clone());
                }
                if let Some(scope) = &context.scope_hint {
                    filter = filter.with_scope(scope.clone());
                }
                if mine {
                    filter = filter.with_owner(context.user.clone());
                }
                println!("{}", output::commands_table(&self.catalog.list(&filter, &context)?));
            }
            Action::Search { text, namespace } => {
                let found = self.catalog.search(&text, namespace.as_deref(), &context)?;
                println!("{}", output::commands_table(&found));
            }
            Action::Info { id } => println!("{}", output::command_details(&self.catalog.get(id, &context)?)),
            Action::Rename { id, name, namespace } => {
                let command = self.catalog.rename(id, namespace.as_deref(), &name, &context)?;
                println!("Renamed #{} to {}", command.id, command.qualified_name());
            }
            Action::Edit { id, template } => {
                let command = self.catalog.update_template(id, &template.join(" "), &context)?;
                println!("Updated #{}: {}", command.id, command.template);
            }
            Action::Delete { id } => {
                let command = self.catalog.delete(id, &context)?;
                println!("Deleted #{} ({})", command.id, command.qualified_name());
            }
            Action::Namespaces => {
                let rows: Vec<_> = self
                    .catalog
                    .namespaces(&context)?
                    .into_iter()
                    .map(|(namespace, count)| vec![namespace, count.to_string()])
                    .collect();
                println!("{}", output::table(&["NAMESPACE", "COMMANDS"], &rows));
            }
            Action::Suggest { limit } => println!("{}", output::commands_table(&self.insights.suggestions(&context, limit)?)),
            Action::Similar { id, limit } => println!("{}", output::commands_table(&self.insights.similar(id, &context, limit)?)),
            Action::Analytics { days, json } => {
                let analytics = self.insights.analytics(&context, days)?;
                if json {
                    println!("{}", serde_json::to_string_pretty(&analytics)?);
                } else {
                    println!("{}", output::analytics_report(&analytics));
                }
            }
            Action::Here => {
                let project = detect_project(Path::new(&context.cwd));
                println!(
                    "Project: {} ({}, confidence {}%)",
                    project.namespace,
                    project.kind.as_str(),
                    project.confidence
                );
                let suggestions = self.insights.suggestions(&context, 10)?;
                if !suggestions.is_empty() {
                    println!();
                    println!("{}", output::commands_table(&suggestions));
                }
            }
            Action::Secret(action) => self.secret(action)?,
            Action::Config => self.show_config(),
        }
        Ok(ExitCode::SUCCESS)
    }

    fn save_request(&self, args: SaveArgs) -> SaveRequest {
        SaveRequest {
            template: args.template.join(" "),
            name: args.name,
            namespace: args.namespace,
            scope: Some(args.scope.map(|scope| Scope::parse(&scope)).unwrap_or_else(|| self.settings.default_scope.clone())),
        }
    }

    async fn recall(&self, query: DispatchQuery, context: &ResolutionContext, arguments: &[String]) -> Result<ExitCode> {
        if has_trailing_print(arguments) {
            bail!("`--print` must come before the command, e.g. `hp --print <query> [ARGS]`");
        }
        let plan = self
            .dispatcher
            .dispatch(&query, context, arguments, &ProcessEnvironment, &self.prompt)
            .map_err(explain)?;
        self.execute(plan, context, arguments).await
    }

    async fn execute(&self, plan: ExecutionPlan, context: &ResolutionContext, arguments: &[String]) -> Result<ExitCode> {
        if self.print {
            println!("{}", plan.text());
            return Ok(ExitCode::SUCCESS);
        }
        info!(
            id = plan.command.id,
            tier = ?plan.tier.map(|tier| tier.number()),
            method = %plan.method,
            alternatives = plan.runners_up.len(),
            "executing command"
        );

        let started = Instant::now();
        let status = tokio::process::Command::new(SHELL)
            .arg("-c")
            .arg(plan.text())
            .status()
            .await
            .with_context(|| format!("failed to start command #{}", plan.command.id))?;
        let report = ExecutionReport {
            duration_ms: Some(u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)),
            exit_code: status.code(),
        };
        if let Err(error) = self.dispatcher.record_execution(&plan, context, arguments, report) {
            warn!(error = %error, id = plan.command.id, "failed to record execution history");
        }
        Ok(ExitCode::from(exit_status(status.code())))
    }

    fn secret(&self, action: SecretAction) -> Result<()> {
        if self.backend == SecretsBackend::Environment {
            warn!("secrets backend is `env`; nothing is stored or removed");
        }
        match action {
            SecretAction::Set { name } => {
                let value = TerminalSecretPrompt
                    .prompt_secret(&name)
                    .ok_or_else(|| anyhow!("no value entered for {name}"))?;
                store_secret(self.backend, &name, &value)?;
                println!("Stored {name} in the {} backend", self.backend);
            }
            SecretAction::Remove { name } => {
                remove_secret(self.backend, &name)?;
                println!("Removed {name} from the {} backend", self.backend);
            }
        }
        Ok(())
    }

    fn show_config(&self) {
        let settings = &self.settings;
        if settings.sources.is_empty() {
            println!("sources:            (defaults)");
        } else {
            for source in &settings.sources {
                println!("source:             {}", source.display());
            }
        }
        println!("store:              {}", settings.store_path.display());
        println!("server url:         {}", settings.server_url.as_deref().unwrap_or("(none)"));
        println!("secrets backend:    {}", self.backend);
        println!("directory matching: {}", self.heuristic.name());
        println!("default scope:      {}", settings.default_scope);
        println!("history limit:      {}", settings.execution_history_limit);
    }
}

/// Identity of this machine and process.
fn origin() -> Result<ContextExtractor> {
    let user = whoami::username();
    let hostname = whoami::fallible::hostname().unwrap_or_else(|error| {
        debug!(error = %error, "hostname unavailable");
        "localhost".into()
    });
    let cwd = std::env::current_dir().context("cannot determine the working directory")?;
    Ok(ContextExtractor::new(user, hostname, cwd.to_string_lossy()))
}

/// Print near misses for a failed name lookup before handing the error on.
fn explain(error: ResolveError) -> anyhow::Error {
    if !error.near_misses().is_empty() {
        eprintln!("Commands with that name exist but were excluded by the filters:");
        eprintln!("{}", output::commands_table(error.near_misses()));
    }
    anyhow::Error::new(error)
}

/// Status to exit with after the child finished. Killed by a signal counts as failure.
fn exit_status(code: Option<i32>) -> u8 {
    code.map_or(1, |code| u8::try_from(code).unwrap_or(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn child_status_maps_to_exit_code() {
        assert_eq!(exit_status(Some(0)), 0);
        assert_eq!(exit_status(Some(3)), 3);
        assert_eq!(exit_status(Some(-1)), 1);
        assert_eq!(exit_status(None), 1);
    }
}
