//! Command store persistence.
//!
//! This module defines the store contract the resolution engine consumes, along with a
//! JSON-backed implementation (tilde expansion, config directory fallback, env override)
//! and an in-memory implementation used by tests and ephemeral sessions.
//!
//! Every write is a read-modify-write under one lock and is persisted before the lock is
//! released, so concurrent usage increments never lose updates. Reads hand out cloned snapshots.

use std::{
    collections::VecDeque,
    env, fmt,
    fs::{self, File, OpenOptions},
    path::{Path, PathBuf},
    sync::{Mutex, MutexGuard},
};

use chrono::{DateTime, Utc};
use dirs_next::config_dir;
use hiproc_types::{Command, CommandFilter, CommandId, ExecutionRecord, NewCommand, NewExecutionRecord};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::path_processing::expand_tilde;

/// Environment variable controlling the store file location.
pub const STORE_PATH_ENV: &str = "HIPROC_STORE_PATH";

/// Default filename for the persisted command store.
pub const STORE_FILE_NAME: &str = "commands.json";

/// Default number of execution records retained.
pub const DEFAULT_EXECUTION_HISTORY_LIMIT: usize = 5000;

/// Errors surfaced by command store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// I/O failure while reading or writing the store file.
    #[error("command store I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Serialization or deserialization failure.
    #[error("command store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// A previous writer panicked while holding the store lock.
    #[error("command store lock poisoned")]
    Lock,
    /// The referenced record does not exist.
    #[error("no command with id {0}")]
    UnknownCommand(CommandId),
}

/// Contract between the resolution engine and durable command storage.
///
/// Implementations must make each write atomic per record. The engine never holds locks of
/// its own; it relies on the store for isolation between concurrent requests.
pub trait CommandStore: Send + Sync + fmt::Debug {
    /// Fetch a single record by id.
    fn get(&self, id: CommandId) -> Result<Option<Command>, StoreError>;

    /// All records named `name` for which `visible` returns true, in id order.
    fn find(&self, name: &str, visible: &dyn Fn(&Command) -> bool) -> Result<Vec<Command>, StoreError>;

    /// Insert a new record, assigning the next never-used id.
    fn insert(&self, command: NewCommand, created_at: DateTime<Utc>) -> Result<Command, StoreError>;

    /// Increment `usage_count` and set `last_used_at` as a single atomic step.
    fn update_usage(&self, id: CommandId, used_at: DateTime<Utc>) -> Result<Command, StoreError>;

    /// Replace the template of an existing record.
    fn update_template(&self, id: CommandId, template: &str) -> Result<Command, StoreError>;

    /// Change the namespace and name of an existing record.
    fn update_rename(&self, id: CommandId, namespace: &str, name: &str) -> Result<Command, StoreError>;

    /// Remove a record and return it. Its id is never handed out again.
    fn delete(&self, id: CommandId) -> Result<Command, StoreError>;

    /// Records matching `filter`, in id order.
    fn list(&self, filter: &CommandFilter) -> Result<Vec<Command>, StoreError>;

    /// Append an execution history entry, dropping the oldest beyond the retention limit.
    fn record_execution(&self, record: NewExecutionRecord, executed_at: DateTime<Utc>) -> Result<ExecutionRecord, StoreError>;

    /// Execution history, oldest first, optionally restricted to entries at or after `since`.
    fn executions(&self, since: Option<DateTime<Utc>>) -> Result<Vec<ExecutionRecord>, StoreError>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CommandFile {
    #[serde(default = "first_id")]
    next_id: CommandId,
    #[serde(default)]
    commands: Vec<Command>,
    #[serde(default)]
    next_execution_id: u64,
    #[serde(default)]
    executions: VecDeque<ExecutionRecord>,
}

fn first_id() -> CommandId {
    1
}

impl Default for CommandFile {
    fn default() -> Self {
        Self {
            next_id: first_id(),
            commands: Vec::new(),
            next_execution_id: 1,
            executions: VecDeque::new(),
        }
    }
}

impl CommandFile {
    /// Repairs counters so a hand-edited file can never cause id reuse.
    fn normalized(mut self) -> Self {
        let highest = self.commands.iter().map(|command| command.id).max().unwrap_or(0);
        self.next_id = self.next_id.max(highest + 1).max(first_id());
        let highest_execution = self.executions.iter().map(|record| record.id).max().unwrap_or(0);
        self.next_execution_id = self.next_execution_id.max(highest_execution + 1);
        self.commands.sort_by_key(|command| command.id);
        self
    }

    fn get(&self, id: CommandId) -> Option<&Command> {
        self.commands
            .binary_search_by_key(&id, |command| command.id)
            .ok()
            .map(|index| &self.commands[index])
    }

    fn get_mut(&mut self, id: CommandId) -> Result<&mut Command, StoreError> {
        match self.commands.binary_search_by_key(&id, |command| command.id) {
            Ok(index) => Ok(&mut self.commands[index]),
            Err(_) => Err(StoreError::UnknownCommand(id)),
        }
    }

    fn find(&self, name: &str, visible: &dyn Fn(&Command) -> bool) -> Vec<Command> {
        self.commands
            .iter()
            .filter(|command| command.name == name && visible(command))
            .cloned()
            .collect()
    }

    fn insert(&mut self, command: NewCommand, created_at: DateTime<Utc>) -> Command {
        let id = self.next_id;
        self.next_id += 1;
        let record = Command {
            id,
            name: command.name,
            namespace: command.namespace,
            scope: command.scope,
            owner: command.owner,
            directory: command.directory,
            template: command.template,
            created_at,
            last_used_at: None,
            usage_count: 0,
        };
        // Ids only grow, so pushing keeps the vector sorted.
        self.commands.push(record.clone());
        record
    }

    fn update_usage(&mut self, id: CommandId, used_at: DateTime<Utc>) -> Result<Command, StoreError> {
        let command = self.get_mut(id)?;
        command.usage_count = command.usage_count.saturating_add(1);
        command.last_used_at = Some(command.last_used_at.map_or(used_at, |previous| previous.max(used_at)));
        Ok(command.clone())
    }

    fn update_template(&mut self, id: CommandId, template: &str) -> Result<Command, StoreError> {
        let command = self.get_mut(id)?;
        command.template = template.to_string();
        Ok(command.clone())
    }

    fn update_rename(&mut self, id: CommandId, namespace: &str, name: &str) -> Result<Command, StoreError> {
        let command = self.get_mut(id)?;
        command.namespace = namespace.to_string();
        command.name = name.to_string();
        Ok(command.clone())
    }

    fn delete(&mut self, id: CommandId) -> Result<Command, StoreError> {
        match self.commands.binary_search_by_key(&id, |command| command.id) {
            Ok(index) => Ok(self.commands.remove(index)),
            Err(_) => Err(StoreError::UnknownCommand(id)),
        }
    }

    fn list(&self, filter: &CommandFilter) -> Vec<Command> {
        self.commands.iter().filter(|command| filter.matches(command)).cloned().collect()
    }

    fn record_execution(&mut self, details: NewExecutionRecord, executed_at: DateTime<Utc>, limit: usize) -> ExecutionRecord {
        let record = ExecutionRecord {
            id: self.next_execution_id,
            details,
            executed_at,
        };
        self.next_execution_id += 1;
        self.executions.push_back(record.clone());
        self.truncate_executions(limit);
        record
    }

    fn truncate_executions(&mut self, limit: usize) {
        while self.executions.len() > limit {
            self.executions.pop_front();
        }
    }

    fn executions(&self, since: Option<DateTime<Utc>>) -> Vec<ExecutionRecord> {
        self.executions
            .iter()
            .filter(|record| since.is_none_or(|since| record.executed_at >= since))
            .cloned()
            .collect()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, StoreError> {
    mutex.lock().map_err(|_| StoreError::Lock)
}

/// JSON-backed command store persisted on disk.
///
/// Every operation takes an exclusive advisory lock on `<store>.lock` and works on a fresh
/// read of the file, so separate `hp` processes sharing a store see each other's writes.
#[derive(Debug)]
pub struct JsonCommandStore {
    path: PathBuf,
    threads: Mutex<()>,
    execution_limit: usize,
}

/// Held for the duration of one store operation. Dropping it releases both locks.
struct StoreLock<'a> {
    _thread: MutexGuard<'a, ()>,
    _file: File,
}

impl JsonCommandStore {
    /// Open the store at the provided path (or the default path when omitted).
    pub fn open<P: Into<Option<PathBuf>>>(path: P, execution_limit: usize) -> Result<Self, StoreError> {
        let resolved_path = match path.into() {
            Some(path) => expand_tilde(&path.to_string_lossy()),
            None => default_store_path(),
        };

        let store = Self {
            path: resolved_path,
            threads: Mutex::new(()),
            execution_limit,
        };
        let commands = store.read(|file| file.commands.len())?;
        debug!(path = %store.path.display(), commands, "opened command store");
        Ok(store)
    }

    /// Open the store at the default location with default retention.
    pub fn with_defaults() -> Result<Self, StoreError> {
        Self::open(None::<PathBuf>, DEFAULT_EXECUTION_HISTORY_LIMIT)
    }

    /// Access the underlying store path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_path(&self) -> PathBuf {
        self.path.with_extension("json.lock")
    }

    fn acquire(&self) -> Result<StoreLock<'_>, StoreError> {
        let thread = lock(&self.threads)?;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).truncate(false).write(true).open(self.lock_path())?;
        file.lock()?;
        Ok(StoreLock {
            _thread: thread,
            _file: file,
        })
    }

    fn save_locked(&self, command_file: &CommandFile) -> Result<(), StoreError> {
        let content = serde_json::to_string_pretty(command_file)?;
        let staging = self.path.with_extension("json.tmp");
        fs::write(&staging, content)?;
        fs::rename(&staging, &self.path)?;
        Ok(())
    }

    fn read<T>(&self, view: impl FnOnce(&CommandFile) -> T) -> Result<T, StoreError> {
        let _lock = self.acquire()?;
        let file = load_command_file(&self.path)?;
        Ok(view(&file))
    }

    fn write<T>(&self, apply: impl FnOnce(&mut CommandFile) -> Result<T, StoreError>) -> Result<T, StoreError> {
        let _lock = self.acquire()?;
        let mut file = load_command_file(&self.path)?;
        let outcome = apply(&mut file)?;
        self.save_locked(&file)?;
        Ok(outcome)
    }
}

impl CommandStore for JsonCommandStore {
    fn get(&self, id: CommandId) -> Result<Option<Command>, StoreError> {
        self.read(|file| file.get(id).cloned())
    }

    fn find(&self, name: &str, visible: &dyn Fn(&Command) -> bool) -> Result<Vec<Command>, StoreError> {
        self.read(|file| file.find(name, visible))
    }

    fn insert(&self, command: NewCommand, created_at: DateTime<Utc>) -> Result<Command, StoreError> {
        self.write(|file| Ok(file.insert(command, created_at)))
    }

    fn update_usage(&self, id: CommandId, used_at: DateTime<Utc>) -> Result<Command, StoreError> {
        self.write(|file| file.update_usage(id, used_at))
    }

    fn update_template(&self, id: CommandId, template: &str) -> Result<Command, StoreError> {
        self.write(|file| file.update_template(id, template))
    }

    fn update_rename(&self, id: CommandId, namespace: &str, name: &str) -> Result<Command, StoreError> {
        self.write(|file| file.update_rename(id, namespace, name))
    }

    fn delete(&self, id: CommandId) -> Result<Command, StoreError> {
        self.write(|file| file.delete(id))
    }

    fn list(&self, filter: &CommandFilter) -> Result<Vec<Command>, StoreError> {
        self.read(|file| file.list(filter))
    }

    fn record_execution(&self, record: NewExecutionRecord, executed_at: DateTime<Utc>) -> Result<ExecutionRecord, StoreError> {
        let limit = self.execution_limit;
        self.write(|file| Ok(file.record_execution(record, executed_at, limit)))
    }

    fn executions(&self, since: Option<DateTime<Utc>>) -> Result<Vec<ExecutionRecord>, StoreError> {
        self.read(|file| file.executions(since))
    }
}

/// In-memory command store used for tests and throwaway sessions.
#[derive(Debug)]
pub struct InMemoryCommandStore {
    file: Mutex<CommandFile>,
    execution_limit: usize,
}

impl Default for InMemoryCommandStore {
    fn default() -> Self {
        Self {
            file: Mutex::new(CommandFile::default()),
            execution_limit: DEFAULT_EXECUTION_HISTORY_LIMIT,
        }
    }
}

impl InMemoryCommandStore {
    /// Create an empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_execution_limit(execution_limit: usize) -> Self {
        Self {
            execution_limit,
            ..Self::default()
        }
    }
}

impl CommandStore for InMemoryCommandStore {
    fn get(&self, id: CommandId) -> Result<Option<Command>, StoreError> {
        Ok(lock(&self.file)?.get(id).cloned())
    }

    fn find(&self, name: &str, visible: &dyn Fn(&Command) -> bool) -> Result<Vec<Command>, StoreError> {
        Ok(lock(&self.file)?.find(name, visible))
    }

    fn insert(&self, command: NewCommand, created_at: DateTime<Utc>) -> Result<Command, StoreError> {
        Ok(lock(&self.file)?.insert(command, created_at))
    }

    fn update_usage(&self, id: CommandId, used_at: DateTime<Utc>) -> Result<Command, StoreError> {
        lock(&self.file)?.update_usage(id, used_at)
    }

    fn update_template(&self, id: CommandId, template: &str) -> Result<Command, StoreError> {
        lock(&self.file)?.update_template(id, template)
    }

    fn update_rename(&self, id: CommandId, namespace: &str, name: &str) -> Result<Command, StoreError> {
        lock(&self.file)?.update_rename(id, namespace, name)
    }

    fn delete(&self, id: CommandId) -> Result<Command, StoreError> {
        lock(&self.file)?.delete(id)
    }

    fn list(&self, filter: &CommandFilter) -> Result<Vec<Command>, StoreError> {
        Ok(lock(&self.file)?.list(filter))
    }

    fn record_execution(&self, record: NewExecutionRecord, executed_at: DateTime<Utc>) -> Result<ExecutionRecord, StoreError> {
        Ok(lock(&self.file)?.record_execution(record, executed_at, self.execution_limit))
    }

    fn executions(&self, since: Option<DateTime<Utc>>) -> Result<Vec<ExecutionRecord>, StoreError> {
        Ok(lock(&self.file)?.executions(since))
    }
}

/// Store location: `HIPROC_STORE_PATH` when set, otherwise `<config dir>/hiproc/commands.json`.
pub fn default_store_path() -> PathBuf {
    if let Ok(path) = env::var(STORE_PATH_ENV)
        && !path.trim().is_empty()
    {
        return expand_tilde(&path);
    }

    config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("hiproc")
        .join(STORE_FILE_NAME)
}

fn load_command_file(path: &Path) -> Result<CommandFile, StoreError> {
    match fs::read_to_string(path) {
        Ok(content) => match serde_json::from_str::<CommandFile>(&content) {
            Ok(file) => Ok(file.normalized()),
            Err(error) => {
                let quarantine = path.with_extension("json.corrupt");
                warn!(
                    "Failed to parse command store at {}: {}; moving it to {}",
                    path.display(),
                    error,
                    quarantine.display()
                );
                fs::rename(path, &quarantine)?;
                Ok(CommandFile::default())
            }
        },
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(CommandFile::default()),
        Err(error) => Err(StoreError::Io(error)),
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, thread};

    use hiproc_types::{ExecutionMethod, Owner, Scope};
    use tempfile::tempdir;

    use super::*;

    fn new_command(name: &str, user: &str, directory: &str) -> NewCommand {
        NewCommand {
            template: format!("echo {name}"),
            name: name.to_string(),
            namespace: "webapp".to_string(),
            scope: Scope::Personal,
            owner: Owner::new(user, "h1"),
            directory: directory.to_string(),
        }
    }

    fn execution(command_id: CommandId) -> NewExecutionRecord {
        NewExecutionRecord {
            command_id,
            user: "alice".into(),
            hostname: "h1".into(),
            cwd: "/p/a".into(),
            arguments: None,
            method: ExecutionMethod::Name,
            duration_ms: Some(12),
            exit_code: Some(0),
        }
    }

    #[test]
    fn ids_are_never_reused_after_delete() {
        let store = InMemoryCommandStore::new();
        let first = store.insert(new_command("build", "alice", "/p/a"), Utc::now()).unwrap();
        let second = store.insert(new_command("test", "alice", "/p/a"), Utc::now()).unwrap();
        store.delete(second.id).unwrap();
        let third = store.insert(new_command("lint", "alice", "/p/a"), Utc::now()).unwrap();

        assert_eq!(first.id, 1);
        assert_eq!(second.id, 2);
        assert_eq!(third.id, 3);
        assert!(store.get(2).unwrap().is_none());
    }

    #[test]
    fn find_applies_the_visibility_predicate() {
        let store = InMemoryCommandStore::new();
        store.insert(new_command("deploy", "alice", "/p/a"), Utc::now()).unwrap();
        store.insert(new_command("deploy", "bob", "/p/b"), Utc::now()).unwrap();
        store.insert(new_command("build", "alice", "/p/a"), Utc::now()).unwrap();

        let visible = store.find("deploy", &|command| command.is_visible_to("alice")).unwrap();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].owner.user, "alice");
    }

    #[test]
    fn unknown_ids_surface_typed_errors() {
        let store = InMemoryCommandStore::new();
        assert!(matches!(store.update_usage(42, Utc::now()), Err(StoreError::UnknownCommand(42))));
        assert!(matches!(store.delete(42), Err(StoreError::UnknownCommand(42))));
        assert!(matches!(store.update_rename(42, "ns", "n"), Err(StoreError::UnknownCommand(42))));
    }

    #[test]
    fn rename_and_template_updates_touch_only_their_fields() {
        let store = InMemoryCommandStore::new();
        let original = store.insert(new_command("deploy", "alice", "/p/a"), Utc::now()).unwrap();

        let renamed = store.update_rename(original.id, "infra", "ship").unwrap();
        assert_eq!((renamed.namespace.as_str(), renamed.name.as_str()), ("infra", "ship"));
        assert_eq!(renamed.template, original.template);

        let edited = store.update_template(original.id, "make ship").unwrap();
        assert_eq!(edited.template, "make ship");
        assert_eq!(edited.name, "ship");
    }

    #[test]
    fn json_store_persists_commands_and_counters() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("commands.json");
        let store = JsonCommandStore::open(Some(path.clone()), 10).unwrap();
        let saved = store.insert(new_command("deploy", "alice", "/p/a"), Utc::now()).unwrap();
        store.update_usage(saved.id, Utc::now()).unwrap();
        store.delete(saved.id).unwrap();
        store.insert(new_command("build", "alice", "/p/a"), Utc::now()).unwrap();

        drop(store);
        let reloaded = JsonCommandStore::open(Some(path), 10).unwrap();
        let commands = reloaded.list(&CommandFilter::default()).unwrap();
        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].id, 2);
        let next = reloaded.insert(new_command("lint", "alice", "/p/a"), Utc::now()).unwrap();
        assert_eq!(next.id, 3);
    }

    #[test]
    fn json_store_truncates_execution_history() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("commands.json");
        let store = JsonCommandStore::open(Some(path.clone()), 2).unwrap();
        let saved = store.insert(new_command("deploy", "alice", "/p/a"), Utc::now()).unwrap();
        for _ in 0..3 {
            store.record_execution(execution(saved.id), Utc::now()).unwrap();
        }

        drop(store);
        let reloaded = JsonCommandStore::open(Some(path), 2).unwrap();
        let history = reloaded.executions(None).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].id, 2);
        assert_eq!(history[1].id, 3);
    }

    #[test]
    fn default_path_honors_env_override() {
        let override_path = "~/custom/commands.json";
        temp_env::with_var(STORE_PATH_ENV, Some(override_path), || {
            assert_eq!(default_store_path(), expand_tilde(override_path));
        });
    }

    #[test]
    fn invalid_json_is_quarantined_and_store_starts_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("commands.json");
        fs::write(&path, "not json").unwrap();

        let store = JsonCommandStore::open(Some(path.clone()), 10).unwrap();
        assert!(store.list(&CommandFilter::default()).unwrap().is_empty());
        assert!(dir.path().join("commands.json.corrupt").exists());
    }

    #[test]
    fn stores_sharing_a_file_see_each_others_writes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("commands.json");
        let parent = JsonCommandStore::open(Some(path.clone()), 10).unwrap();
        let outer = parent.insert(new_command("outer", "alice", "/p/a"), Utc::now()).unwrap();
        parent.update_usage(outer.id, Utc::now()).unwrap();

        let child = JsonCommandStore::open(Some(path.clone()), 10).unwrap();
        let inner = child.insert(new_command("inner", "alice", "/p/a"), Utc::now()).unwrap();
        child.update_usage(outer.id, Utc::now()).unwrap();

        parent.record_execution(execution(outer.id), Utc::now()).unwrap();

        assert_eq!(inner.id, 2);
        assert!(parent.get(inner.id).unwrap().is_some());
        assert_eq!(parent.get(outer.id).unwrap().unwrap().usage_count, 2);
        let next = parent.insert(new_command("later", "alice", "/p/a"), Utc::now()).unwrap();
        assert_eq!(next.id, 3);

        let reloaded = JsonCommandStore::open(Some(path), 10).unwrap();
        assert_eq!(reloaded.list(&CommandFilter::default()).unwrap().len(), 3);
        assert_eq!(reloaded.executions(None).unwrap().len(), 1);
    }

    #[test]
    fn increments_through_separate_handles_are_not_lost() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("commands.json");
        let saved = JsonCommandStore::open(Some(path.clone()), 10)
            .unwrap()
            .insert(new_command("deploy", "alice", "/p/a"), Utc::now())
            .unwrap();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let handle_path = path.clone();
                thread::spawn(move || {
                    let store = JsonCommandStore::open(Some(handle_path), 10).unwrap();
                    for _ in 0..5 {
                        store.update_usage(saved.id, Utc::now()).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let store = JsonCommandStore::open(Some(path), 10).unwrap();
        assert_eq!(store.get(saved.id).unwrap().unwrap().usage_count, 20);
    }

    #[test]
    fn concurrent_usage_increments_are_not_lost() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("commands.json");
        let store = Arc::new(JsonCommandStore::open(Some(path), 10).unwrap());
        let saved = store.insert(new_command("deploy", "alice", "/p/a"), Utc::now()).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let handle_store = Arc::clone(&store);
                thread::spawn(move || {
                    for _ in 0..5 {
                        handle_store.update_usage(saved.id, Utc::now()).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.get(saved.id).unwrap().unwrap().usage_count, 40);
    }
}
