//! Create, read, update and delete operations over the command store, with ownership checks.

use std::{collections::BTreeMap, path::Path, sync::Arc};

use hiproc_types::{Command, CommandFilter, CommandId, NewCommand, Owner, ResolutionContext, Scope};
use hiproc_util::{CommandStore, normalize_directory};
use tracing::info;

use crate::{
    clock::Clock,
    error::ResolveError,
    project::{detect_name, detect_project},
    retrieve::retrieve_by_id,
};

/// Caller supplied fields for a save. Omitted fields are detected.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SaveRequest {
    pub template: String,
    pub name: Option<String>,
    pub namespace: Option<String>,
    pub scope: Option<Scope>,
}

impl SaveRequest {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveOutcome {
    pub command: Command,
    /// `false` when an identical record already existed and was returned instead.
    pub is_new: bool,
}

/// Store front end enforcing "visible to read, owner to write".
#[derive(Debug, Clone)]
pub struct Catalog {
    store: Arc<dyn CommandStore>,
    clock: Arc<dyn Clock>,
}

impl Catalog {
    pub fn new(store: Arc<dyn CommandStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Save a template for `context.user` on `context.hostname` in `context.cwd`.
    ///
    /// The name defaults to the command's first word and the namespace to the detected
    /// project of the working directory. Saving an exact duplicate returns the existing
    /// record with `is_new == false`.
    pub fn save(&self, request: SaveRequest, context: &ResolutionContext) -> Result<SaveOutcome, ResolveError> {
        let template = request.template.trim().to_string();
        if template.is_empty() {
            return Err(ResolveError::InvalidInput("command template is empty".into()));
        }
        let name = non_blank(request.name).unwrap_or_else(|| detect_name(&template));
        let namespace = non_blank(request.namespace).unwrap_or_else(|| detect_project(Path::new(&context.cwd)).namespace);

        let candidate = NewCommand {
            template,
            name,
            namespace,
            scope: request.scope.unwrap_or_default(),
            owner: Owner::new(context.user.clone(), context.hostname.clone()),
            directory: normalize_directory(&context.cwd),
        };

        let filter = CommandFilter::default()
            .with_name(candidate.name.clone())
            .with_namespace(candidate.namespace.clone())
            .with_owner(candidate.owner.user.clone());
        if let Some(existing) = self.store.list(&filter)?.into_iter().find(|command| command.is_duplicate_of(&candidate)) {
            info!(id = existing.id, "save matched an existing command");
            return Ok(SaveOutcome {
                command: existing,
                is_new: false,
            });
        }

        let command = self.store.insert(candidate, self.clock.now())?;
        info!(id = command.id, name = %command.name, namespace = %command.namespace, scope = %command.scope, "saved command");
        Ok(SaveOutcome { command, is_new: true })
    }

    /// A single visible record.
    pub fn get(&self, id: CommandId, context: &ResolutionContext) -> Result<Command, ResolveError> {
        retrieve_by_id(self.store.as_ref(), id, context)
    }

    /// Replace the template. Owner only.
    pub fn update_template(&self, id: CommandId, template: &str, context: &ResolutionContext) -> Result<Command, ResolveError> {
        let template = template.trim();
        if template.is_empty() {
            return Err(ResolveError::InvalidInput("command template is empty".into()));
        }
        self.owned(id, context)?;
        let command = self.store.update_template(id, template)?;
        info!(id, "updated command template");
        Ok(command)
    }

    /// Change namespace and/or name. Owner only.
    pub fn rename(&self, id: CommandId, namespace: Option<&str>, name: &str, context: &ResolutionContext) -> Result<Command, ResolveError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ResolveError::InvalidInput("command name is empty".into()));
        }
        let current = self.owned(id, context)?;
        let namespace = namespace.map(str::trim).filter(|namespace| !namespace.is_empty()).unwrap_or(&current.namespace);
        let command = self.store.update_rename(id, namespace, name)?;
        info!(id, name = %command.name, namespace = %command.namespace, "renamed command");
        Ok(command)
    }

    /// Delete a record. Owner only. Returns the removed record.
    pub fn delete(&self, id: CommandId, context: &ResolutionContext) -> Result<Command, ResolveError> {
        self.owned(id, context)?;
        let command = self.store.delete(id)?;
        info!(id, "deleted command");
        Ok(command)
    }

    /// Visible records matching `filter`, in id order.
    pub fn list(&self, filter: &CommandFilter, context: &ResolutionContext) -> Result<Vec<Command>, ResolveError> {
        Ok(self
            .store
            .list(filter)?
            .into_iter()
            .filter(|command| command.is_visible_to(&context.user))
            .collect())
    }

    /// Case-insensitive substring search over name, namespace and template of visible records.
    pub fn search(&self, text: &str, namespace: Option<&str>, context: &ResolutionContext) -> Result<Vec<Command>, ResolveError> {
        let needle = text.to_lowercase();
        let mut filter = CommandFilter::default();
        if let Some(namespace) = namespace {
            filter = filter.with_namespace(namespace);
        }
        Ok(self
            .list(&filter, context)?
            .into_iter()
            .filter(|command| {
                [&command.name, &command.namespace, &command.template]
                    .iter()
                    .any(|field| field.to_lowercase().contains(&needle))
            })
            .collect())
    }

    /// Visible namespaces with the number of visible records in each, sorted by name.
    pub fn namespaces(&self, context: &ResolutionContext) -> Result<Vec<(String, usize)>, ResolveError> {
        let mut counts: BTreeMap<String, usize> = BTreeMap::new();
        for command in self.list(&CommandFilter::default(), context)? {
            *counts.entry(command.namespace).or_default() += 1;
        }
        Ok(counts.into_iter().collect())
    }

    fn owned(&self, id: CommandId, context: &ResolutionContext) -> Result<Command, ResolveError> {
        let Some(command) = self.store.get(id)? else {
            return Err(ResolveError::NotFound { query: id.to_string() });
        };
        if !command.is_owned_by(&context.user) {
            return Err(ResolveError::PermissionDenied {
                id,
                user: context.user.clone(),
            });
        }
        Ok(command)
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|value| value.trim().to_string()).filter(|value| !value.is_empty())
}
