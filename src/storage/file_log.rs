//! Durable line-oriented log for the task store.
//!
//! One line per entity, fields joined by a comma, with the entity kind
//! tagged explicitly so the loader can dispatch:
//!
//! ```text
//! id,TASK,name,status,description,start|empty,duration|empty
//! id,SUBTASK,name,status,description,start|empty,duration|empty,epic_id
//! id,EPIC,name,status,description,start|empty,duration|empty
//! ```
//!
//! Start times are RFC 3339; durations are whole seconds; absent optional
//! fields are empty tokens. Epic lines carry the derived status and
//! schedule of the moment of writing - the loader discards those tokens
//! and re-derives them from the replayed subtasks.
//!
//! The write policy is rewrite-on-mutation: after every mutating call the
//! entire log is regenerated from the in-memory collections (epics, then
//! subtasks, then tasks), so the file always reflects exactly the current
//! state. The epics-first ordering is what lets a plain top-to-bottom
//! replay rebind every subtask.
//!
//! A failed write surfaces [`Error::Persistence`] but does not roll back
//! the in-memory mutation, which has already been applied; the log is
//! stale until the next successful write.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use super::TaskStore;
use crate::config;
use crate::models::{Entity, EntityId, EntityKind, Epic, SubTask, Task, TaskStatus};
use crate::{Error, Result};

/// Field separator of the log format. Values must not contain it.
const DELIMITER: char = ',';

/// A task store persisted to a line-oriented log file.
///
/// Exposes the same operation set as [`TaskStore`], rewriting the whole
/// log after each mutating call. Reads delegate unchanged (the access
/// history is in-memory state and is not persisted).
#[derive(Debug)]
pub struct FileBackedStore {
    /// The in-memory engine holding the live state
    store: TaskStore,

    /// Log file location
    path: PathBuf,
}

impl FileBackedStore {
    /// Create an empty store persisted at `path`, writing an empty log.
    ///
    /// Missing parent directories are created.
    pub fn create(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let backed = Self {
            store: TaskStore::new(),
            path,
        };
        backed.save()?;
        Ok(backed)
    }

    /// Reconstruct a store from the log at `path`.
    ///
    /// Fails with [`Error::Persistence`] if the file cannot be read or
    /// any line cannot be replayed. Loading records no history.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let contents = fs::read_to_string(&path)?;

        let mut store = TaskStore::new();
        for (index, line) in contents.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            replay_line(&mut store, line).map_err(|err| {
                Error::Persistence(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("{}:{}: {}", path.display(), index + 1, err),
                ))
            })?;
        }

        debug!(path = %path.display(), entities = store.len(), "loaded store from log");
        Ok(Self { store, path })
    }

    /// Load the log at `path` if it exists, otherwise create it.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if path.exists() {
            Self::load(path)
        } else {
            Self::create(path)
        }
    }

    /// Open the log at the default location (see [`config::default_log_path`]).
    pub fn open_default() -> Result<Self> {
        Self::open(config::default_log_path()?)
    }

    /// Get the log file location.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rewrite the entire log from the current in-memory collections.
    pub fn save(&self) -> Result<()> {
        let mut contents = String::new();

        for epic in self.store.get_all_epics() {
            contents.push_str(&encode_epic(&epic)?);
            contents.push('\n');
        }
        for sub_task in self.store.get_all_sub_tasks() {
            contents.push_str(&encode_sub_task(&sub_task)?);
            contents.push('\n');
        }
        for task in self.store.get_all_tasks() {
            contents.push_str(&encode_task(&task)?);
            contents.push('\n');
        }

        fs::write(&self.path, contents)?;
        debug!(path = %self.path.display(), entities = self.store.len(), "persisted store");
        Ok(())
    }

    // === Task Operations ===

    /// Create a new task and persist. See [`TaskStore::create_task`].
    pub fn create_task(&mut self, task: Task) -> Result<()> {
        self.store.create_task(task)?;
        self.save()
    }

    /// Get a task by id, recording the access in the history.
    pub fn get_task_by_id(&mut self, task_id: EntityId) -> Option<Task> {
        self.store.get_task_by_id(task_id)
    }

    /// Get all tasks in insertion order.
    pub fn get_all_tasks(&self) -> Vec<Task> {
        self.store.get_all_tasks()
    }

    /// Replace a task and persist. See [`TaskStore::update_task`].
    pub fn update_task(&mut self, task: Task) -> Result<()> {
        self.store.update_task(task)?;
        self.save()
    }

    /// Remove a task and persist. See [`TaskStore::remove_task_by_id`].
    pub fn remove_task_by_id(&mut self, task_id: EntityId) -> Result<Task> {
        let task = self.store.remove_task_by_id(task_id)?;
        self.save()?;
        Ok(task)
    }

    /// Remove every task and persist.
    pub fn remove_all_tasks(&mut self) -> Result<()> {
        self.store.remove_all_tasks();
        self.save()
    }

    // === SubTask Operations ===

    /// Attach a subtask to its epic without admitting it. Not persisted:
    /// the binding becomes durable when the subtask is created.
    pub fn attach_sub_task(&mut self, sub_task: &SubTask) -> Result<()> {
        self.store.attach_sub_task(sub_task)
    }

    /// Admit a subtask and persist. See [`TaskStore::create_sub_task`].
    pub fn create_sub_task(&mut self, sub_task: SubTask) -> Result<()> {
        self.store.create_sub_task(sub_task)?;
        self.save()
    }

    /// Get a subtask by id, recording the access in the history.
    pub fn get_sub_task_by_id(&mut self, sub_task_id: EntityId) -> Option<SubTask> {
        self.store.get_sub_task_by_id(sub_task_id)
    }

    /// Get all subtasks in insertion order.
    pub fn get_all_sub_tasks(&self) -> Vec<SubTask> {
        self.store.get_all_sub_tasks()
    }

    /// Get the subtasks belonging to one epic.
    pub fn get_sub_tasks_of_epic(&self, epic_id: EntityId) -> Result<Vec<SubTask>> {
        self.store.get_sub_tasks_of_epic(epic_id)
    }

    /// Replace a subtask and persist. See [`TaskStore::update_sub_task`].
    pub fn update_sub_task(&mut self, sub_task: SubTask) -> Result<()> {
        self.store.update_sub_task(sub_task)?;
        self.save()
    }

    /// Remove a subtask and persist. See
    /// [`TaskStore::remove_sub_task_by_id`].
    pub fn remove_sub_task_by_id(&mut self, sub_task_id: EntityId) -> Result<SubTask> {
        let sub_task = self.store.remove_sub_task_by_id(sub_task_id)?;
        self.save()?;
        Ok(sub_task)
    }

    /// Remove every subtask and persist.
    pub fn remove_all_sub_tasks(&mut self) -> Result<()> {
        self.store.remove_all_sub_tasks();
        self.save()
    }

    // === Epic Operations ===

    /// Create a new epic and persist. See [`TaskStore::create_epic`].
    pub fn create_epic(&mut self, epic: Epic) -> Result<()> {
        self.store.create_epic(epic)?;
        self.save()
    }

    /// Get an epic by id, recording the access in the history.
    pub fn get_epic_by_id(&mut self, epic_id: EntityId) -> Option<Epic> {
        self.store.get_epic_by_id(epic_id)
    }

    /// Get all epics in insertion order.
    pub fn get_all_epics(&self) -> Vec<Epic> {
        self.store.get_all_epics()
    }

    /// Replace an epic's identity fields and persist. See
    /// [`TaskStore::update_epic`].
    pub fn update_epic(&mut self, epic: Epic) -> Result<()> {
        self.store.update_epic(epic)?;
        self.save()
    }

    /// Remove an epic with its subtasks and persist. See
    /// [`TaskStore::remove_epic_by_id`].
    pub fn remove_epic_by_id(&mut self, epic_id: EntityId) -> Result<Epic> {
        let epic = self.store.remove_epic_by_id(epic_id)?;
        self.save()?;
        Ok(epic)
    }

    /// Remove every epic and subtask and persist.
    pub fn remove_all_epics(&mut self) -> Result<()> {
        self.store.remove_all_epics();
        self.save()
    }

    // === Derived Views ===

    /// Get every scheduled task and subtask, ascending by start time.
    pub fn get_prioritized_tasks(&self) -> Vec<Entity> {
        self.store.get_prioritized_tasks()
    }

    /// Get the access history, least- to most-recently viewed.
    pub fn get_history(&self) -> Vec<Entity> {
        self.store.get_history()
    }

    /// Get the total number of stored entities.
    pub fn len(&self) -> usize {
        self.store.len()
    }

    /// Check whether the store holds no entities.
    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }
}

// === Line Codec ===

/// Reject a field value that cannot be embedded in the log format.
fn checked_field<'a>(field: &str, value: &'a str) -> Result<&'a str> {
    if value.contains(DELIMITER) || value.contains('\n') || value.contains('\r') {
        return Err(Error::Persistence(io::Error::new(
            io::ErrorKind::InvalidData,
            format!(
                "Entity {} contains the log delimiter or a line break: {:?}",
                field, value
            ),
        )));
    }
    Ok(value)
}

fn time_token(start_time: Option<DateTime<Utc>>) -> String {
    start_time.map(|t| t.to_rfc3339()).unwrap_or_default()
}

fn duration_token(duration: Option<Duration>) -> String {
    duration
        .map(|d| d.num_seconds().to_string())
        .unwrap_or_default()
}

fn encode_task(task: &Task) -> Result<String> {
    Ok(format!(
        "{},{},{},{},{},{},{}",
        task.id(),
        EntityKind::Task,
        checked_field("name", task.name())?,
        task.status(),
        checked_field("description", task.description())?,
        time_token(task.start_time()),
        duration_token(task.duration()),
    ))
}

fn encode_sub_task(sub_task: &SubTask) -> Result<String> {
    Ok(format!(
        "{},{},{},{},{},{},{},{}",
        sub_task.id(),
        EntityKind::SubTask,
        checked_field("name", sub_task.name())?,
        sub_task.status(),
        checked_field("description", sub_task.description())?,
        time_token(sub_task.start_time()),
        duration_token(sub_task.duration()),
        sub_task.epic_id(),
    ))
}

fn encode_epic(epic: &Epic) -> Result<String> {
    Ok(format!(
        "{},{},{},{},{},{},{}",
        epic.id(),
        EntityKind::Epic,
        checked_field("name", epic.name())?,
        epic.status(),
        checked_field("description", epic.description())?,
        time_token(epic.start_time()),
        duration_token(epic.duration()),
    ))
}

fn parse_id(token: &str) -> Result<EntityId> {
    token
        .parse::<EntityId>()
        .map_err(|_| Error::InvalidInput(format!("Bad entity id: {:?}", token)))
}

fn parse_time_token(token: &str) -> Result<Option<DateTime<Utc>>> {
    if token.is_empty() {
        return Ok(None);
    }
    DateTime::parse_from_rfc3339(token)
        .map(|t| Some(t.with_timezone(&Utc)))
        .map_err(|err| Error::InvalidInput(format!("Bad timestamp {:?}: {}", token, err)))
}

fn parse_duration_token(token: &str) -> Result<Option<Duration>> {
    if token.is_empty() {
        return Ok(None);
    }
    token
        .parse::<i64>()
        .map(|seconds| Some(Duration::seconds(seconds)))
        .map_err(|_| Error::InvalidInput(format!("Bad duration {:?}", token)))
}

/// Reconstruct one entity from a log line and admit it into the store.
fn replay_line(store: &mut TaskStore, line: &str) -> Result<()> {
    let fields: Vec<&str> = line.split(DELIMITER).collect();
    if fields.len() < 7 {
        return Err(Error::InvalidInput(format!(
            "Expected at least 7 fields, got {}",
            fields.len()
        )));
    }

    let id = parse_id(fields[0])?;
    let kind: EntityKind = fields[1].parse().map_err(Error::InvalidInput)?;
    let name = fields[2].to_string();
    let status: TaskStatus = fields[3].parse().map_err(Error::InvalidInput)?;
    let description = fields[4].to_string();
    let start_time = parse_time_token(fields[5])?;
    let duration = parse_duration_token(fields[6])?;

    match kind {
        EntityKind::Task => {
            if fields.len() != 7 {
                return Err(Error::InvalidInput(format!(
                    "Expected 7 fields for a TASK line, got {}",
                    fields.len()
                )));
            }
            let task = Task::new(id, name, description, status, start_time, duration)?;
            store.restore_task(task)
        }
        EntityKind::SubTask => {
            if fields.len() != 8 {
                return Err(Error::InvalidInput(format!(
                    "Expected 8 fields for a SUBTASK line, got {}",
                    fields.len()
                )));
            }
            let epic_id = parse_id(fields[7])?;
            let sub_task =
                SubTask::new(id, name, description, status, start_time, duration, epic_id)?;
            store.restore_sub_task(sub_task)
        }
        EntityKind::Epic => {
            if fields.len() != 7 {
                return Err(Error::InvalidInput(format!(
                    "Expected 7 fields for an EPIC line, got {}",
                    fields.len()
                )));
            }
            // Status and schedule tokens are derived state; the replayed
            // subtasks re-derive them.
            let epic = Epic::new(id, name, description)?;
            store.create_epic(epic)
        }
    }
}
