//! Data models for Logbook entities.
//!
//! This module defines the core data structures:
//! - `Task` - Standalone work items with status and an optional time slot
//! - `Epic` - Container tasks whose status and schedule are derived from
//!   their subtasks
//! - `SubTask` - Work items bound to exactly one owning epic
//! - `Entity` - A work item of any of the three kinds
//! - `IdGenerator` - Counter handing out store-unique entity ids
//!
//! Entities are value types: apart from [`Task::set_status`] (and its
//! subtask counterpart) every change goes through the store as a
//! replace-by-id of a freshly constructed value. Epics never store derived
//! fields; status, start time, duration, and end time are recomputed from
//! the subtask map on every call.

pub mod overlap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::{Error, Result};

/// Identifier for tasks, subtasks, and epics. Always positive; `0` is
/// rejected at construction.
pub type EntityId = u64;

/// Task status in the workflow.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    New,
    InProgress,
    Done,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskStatus::New => "NEW",
            TaskStatus::InProgress => "IN_PROGRESS",
            TaskStatus::Done => "DONE",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "NEW" => Ok(TaskStatus::New),
            "IN_PROGRESS" => Ok(TaskStatus::InProgress),
            "DONE" => Ok(TaskStatus::Done),
            _ => Err(format!("Unknown task status: {}", s)),
        }
    }
}

/// Kind tag distinguishing the three entity types, as written to the
/// durable log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Task,
    SubTask,
    Epic,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EntityKind::Task => "TASK",
            EntityKind::SubTask => "SUBTASK",
            EntityKind::Epic => "EPIC",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "TASK" => Ok(EntityKind::Task),
            "SUBTASK" => Ok(EntityKind::SubTask),
            "EPIC" => Ok(EntityKind::Epic),
            _ => Err(format!("Unknown entity kind: {}", s)),
        }
    }
}

/// Access to an entity's scheduled interval.
///
/// The interval is `[start_time, end_time)`; an entity without a start time
/// has no interval and never participates in conflicts.
pub trait Timed {
    /// When work on the entity is planned to begin.
    fn start_time(&self) -> Option<DateTime<Utc>>;

    /// When work on the entity is planned to end.
    fn end_time(&self) -> Option<DateTime<Utc>>;
}

/// Serde helper for optional durations, encoded as whole seconds.
mod duration_seconds {
    use chrono::Duration;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(d) => serializer.serialize_some(&d.num_seconds()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let seconds = Option::<i64>::deserialize(deserializer)?;
        Ok(seconds.map(Duration::seconds))
    }
}

/// Validate the identity fields shared by all entity kinds.
fn validate_identity(id: EntityId, name: &str, description: &str) -> Result<()> {
    if id == 0 {
        return Err(Error::InvalidInput(
            "Entity id must be a positive number".to_string(),
        ));
    }
    if name.trim().is_empty() {
        return Err(Error::InvalidInput(
            "Entity name cannot be empty or whitespace".to_string(),
        ));
    }
    if description.trim().is_empty() {
        return Err(Error::InvalidInput(
            "Entity description cannot be empty or whitespace".to_string(),
        ));
    }
    Ok(())
}

/// Validate an optional duration.
fn validate_duration(duration: Option<Duration>) -> Result<()> {
    if let Some(d) = duration {
        if d < Duration::zero() {
            return Err(Error::InvalidInput(
                "Duration cannot be negative".to_string(),
            ));
        }
    }
    Ok(())
}

/// A standalone work item.
///
/// Equality and hashing consider the id only: two tasks are the same task
/// exactly when their ids match, regardless of the other fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier, assigned once at creation
    id: EntityId,

    /// Task name
    name: String,

    /// Detailed description
    description: String,

    /// Current status
    status: TaskStatus,

    /// When work is planned to begin
    #[serde(default, skip_serializing_if = "Option::is_none")]
    start_time: Option<DateTime<Utc>>,

    /// Estimated time the work will take
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "duration_seconds"
    )]
    duration: Option<Duration>,
}

impl Task {
    /// Create a new task.
    ///
    /// Fails with [`Error::InvalidInput`] on a zero id, a blank name or
    /// description, or a negative duration.
    pub fn new(
        id: EntityId,
        name: String,
        description: String,
        status: TaskStatus,
        start_time: Option<DateTime<Utc>>,
        duration: Option<Duration>,
    ) -> Result<Self> {
        validate_identity(id, &name, &description)?;
        validate_duration(duration)?;

        Ok(Self {
            id,
            name,
            description,
            status,
            start_time,
            duration,
        })
    }

    /// Get the task id.
    pub fn id(&self) -> EntityId {
        self.id
    }

    /// Get the task name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the task description.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Get the current status.
    pub fn status(&self) -> TaskStatus {
        self.status
    }

    /// Set a new status.
    ///
    /// The one field that may be changed on a live instance; everything
    /// else is replace-by-id through the store.
    pub fn set_status(&mut self, status: TaskStatus) {
        self.status = status;
    }

    /// Get the planned start time.
    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        self.start_time
    }

    /// Get the estimated duration.
    pub fn duration(&self) -> Option<Duration> {
        self.duration
    }

    /// Get the planned end time: `start_time + duration` when both are
    /// present.
    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        match (self.start_time, self.duration) {
            (Some(start), Some(duration)) => Some(start + duration),
            _ => None,
        }
    }
}

impl PartialEq for Task {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Task {}

impl Hash for Task {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl Timed for Task {
    fn start_time(&self) -> Option<DateTime<Utc>> {
        self.start_time
    }

    fn end_time(&self) -> Option<DateTime<Utc>> {
        Task::end_time(self)
    }
}

/// A work item owned by an epic.
///
/// Holds the owning epic's id rather than a reference; resolving the epic
/// goes through the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubTask {
    /// Unique identifier, assigned once at creation
    id: EntityId,

    /// Subtask name
    name: String,

    /// Detailed description
    description: String,

    /// Current status
    status: TaskStatus,

    /// When work is planned to begin
    #[serde(default, skip_serializing_if = "Option::is_none")]
    start_time: Option<DateTime<Utc>>,

    /// Estimated time the work will take
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "duration_seconds"
    )]
    duration: Option<Duration>,

    /// Id of the owning epic
    epic_id: EntityId,
}

impl SubTask {
    /// Create a new subtask bound to the epic with the given id.
    ///
    /// Fails with [`Error::InvalidInput`] on a zero id or epic id, a blank
    /// name or description, or a negative duration. Whether the epic exists
    /// is checked by the store at admission, not here.
    pub fn new(
        id: EntityId,
        name: String,
        description: String,
        status: TaskStatus,
        start_time: Option<DateTime<Utc>>,
        duration: Option<Duration>,
        epic_id: EntityId,
    ) -> Result<Self> {
        validate_identity(id, &name, &description)?;
        validate_duration(duration)?;
        if epic_id == 0 {
            return Err(Error::InvalidInput(
                "Epic id must be a positive number".to_string(),
            ));
        }

        Ok(Self {
            id,
            name,
            description,
            status,
            start_time,
            duration,
            epic_id,
        })
    }

    /// Get the subtask id.
    pub fn id(&self) -> EntityId {
        self.id
    }

    /// Get the subtask name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the subtask description.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Get the current status.
    pub fn status(&self) -> TaskStatus {
        self.status
    }

    /// Set a new status.
    pub fn set_status(&mut self, status: TaskStatus) {
        self.status = status;
    }

    /// Get the planned start time.
    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        self.start_time
    }

    /// Get the estimated duration.
    pub fn duration(&self) -> Option<Duration> {
        self.duration
    }

    /// Get the planned end time.
    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        match (self.start_time, self.duration) {
            (Some(start), Some(duration)) => Some(start + duration),
            _ => None,
        }
    }

    /// Get the id of the owning epic.
    pub fn epic_id(&self) -> EntityId {
        self.epic_id
    }
}

impl PartialEq for SubTask {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for SubTask {}

impl Hash for SubTask {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl Timed for SubTask {
    fn start_time(&self) -> Option<DateTime<Utc>> {
        self.start_time
    }

    fn end_time(&self) -> Option<DateTime<Utc>> {
        SubTask::end_time(self)
    }
}

/// A container task owning a set of subtasks.
///
/// An epic stores no status and no schedule of its own; all four derived
/// fields are recomputed from the current subtask map on every call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Epic {
    /// Unique identifier, assigned once at creation
    id: EntityId,

    /// Epic name
    name: String,

    /// Detailed description
    description: String,

    /// Owned subtasks, keyed by id
    sub_tasks: BTreeMap<EntityId, SubTask>,
}

impl Epic {
    /// Create a new epic with no subtasks.
    pub fn new(id: EntityId, name: String, description: String) -> Result<Self> {
        validate_identity(id, &name, &description)?;

        Ok(Self {
            id,
            name,
            description,
            sub_tasks: BTreeMap::new(),
        })
    }

    /// Get the epic id.
    pub fn id(&self) -> EntityId {
        self.id
    }

    /// Get the epic name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the epic description.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Attach a subtask to this epic.
    ///
    /// Fails with [`Error::Conflict`] if a subtask with that id is already
    /// attached, or if the subtask is bound to a different epic.
    pub fn add_sub_task(&mut self, sub_task: SubTask) -> Result<()> {
        if self.sub_tasks.contains_key(&sub_task.id()) {
            return Err(Error::Conflict(format!(
                "SubTask {} is already attached to epic {}",
                sub_task.id(),
                self.id
            )));
        }
        if sub_task.epic_id() != self.id {
            return Err(Error::Conflict(format!(
                "SubTask {} is bound to epic {}, not epic {}",
                sub_task.id(),
                sub_task.epic_id(),
                self.id
            )));
        }

        self.sub_tasks.insert(sub_task.id(), sub_task);
        Ok(())
    }

    /// Replace an attached subtask with a new value under the same id.
    ///
    /// Fails with [`Error::InvalidInput`] if the subtask is bound to a
    /// different epic.
    pub fn update_sub_task(&mut self, sub_task: SubTask) -> Result<()> {
        if sub_task.epic_id() != self.id {
            return Err(Error::InvalidInput(format!(
                "SubTask {} is bound to epic {}, not epic {}",
                sub_task.id(),
                sub_task.epic_id(),
                self.id
            )));
        }

        self.sub_tasks.insert(sub_task.id(), sub_task);
        Ok(())
    }

    /// Detach a subtask, returning it if it was attached.
    pub fn remove_sub_task(&mut self, sub_task_id: EntityId) -> Option<SubTask> {
        self.sub_tasks.remove(&sub_task_id)
    }

    /// Detach every subtask.
    pub fn remove_all_sub_tasks(&mut self) {
        self.sub_tasks.clear();
    }

    /// Get an attached subtask by id.
    pub fn sub_task(&self, sub_task_id: EntityId) -> Option<&SubTask> {
        self.sub_tasks.get(&sub_task_id)
    }

    /// Check whether a subtask with the given id is attached.
    pub fn has_sub_task(&self, sub_task_id: EntityId) -> bool {
        self.sub_tasks.contains_key(&sub_task_id)
    }

    /// Iterate over attached subtasks in id order.
    pub fn sub_tasks(&self) -> impl Iterator<Item = &SubTask> {
        self.sub_tasks.values()
    }

    /// Get the number of attached subtasks.
    pub fn sub_task_count(&self) -> usize {
        self.sub_tasks.len()
    }

    /// Derive the epic status from its subtasks.
    ///
    /// `New` when there are no subtasks or all are `New`; `Done` when all
    /// are `Done`; `InProgress` otherwise.
    pub fn status(&self) -> TaskStatus {
        if self.sub_tasks.is_empty() {
            return TaskStatus::New;
        }

        let mut new_count = 0;
        let mut done_count = 0;

        for sub_task in self.sub_tasks.values() {
            match sub_task.status() {
                TaskStatus::New => new_count += 1,
                TaskStatus::Done => done_count += 1,
                TaskStatus::InProgress => {}
            }
        }

        if new_count == self.sub_tasks.len() {
            TaskStatus::New
        } else if done_count == self.sub_tasks.len() {
            TaskStatus::Done
        } else {
            TaskStatus::InProgress
        }
    }

    /// Derive the epic start time: the earliest subtask start time.
    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        self.sub_tasks
            .values()
            .filter_map(|sub_task| sub_task.start_time())
            .min()
    }

    /// Derive the epic duration: the sum of all present subtask durations.
    pub fn duration(&self) -> Option<Duration> {
        let mut total: Option<Duration> = None;

        for sub_task in self.sub_tasks.values() {
            if let Some(duration) = sub_task.duration() {
                total = Some(total.unwrap_or_else(Duration::zero) + duration);
            }
        }

        total
    }

    /// Derive the epic end time: the latest subtask end time.
    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.sub_tasks
            .values()
            .filter_map(|sub_task| sub_task.end_time())
            .max()
    }
}

impl PartialEq for Epic {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Epic {}

impl Hash for Epic {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl Timed for Epic {
    fn start_time(&self) -> Option<DateTime<Utc>> {
        Epic::start_time(self)
    }

    fn end_time(&self) -> Option<DateTime<Utc>> {
        Epic::end_time(self)
    }
}

/// A work item of any of the three kinds.
///
/// This is what mixed-kind views return: the access history and the
/// prioritized list both carry entities of different kinds side by side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Entity {
    Task(Task),
    SubTask(SubTask),
    Epic(Epic),
}

impl Entity {
    /// Get the entity id.
    pub fn id(&self) -> EntityId {
        match self {
            Entity::Task(task) => task.id(),
            Entity::SubTask(sub_task) => sub_task.id(),
            Entity::Epic(epic) => epic.id(),
        }
    }

    /// Get the entity kind.
    pub fn kind(&self) -> EntityKind {
        match self {
            Entity::Task(_) => EntityKind::Task,
            Entity::SubTask(_) => EntityKind::SubTask,
            Entity::Epic(_) => EntityKind::Epic,
        }
    }

    /// Get the entity name.
    pub fn name(&self) -> &str {
        match self {
            Entity::Task(task) => task.name(),
            Entity::SubTask(sub_task) => sub_task.name(),
            Entity::Epic(epic) => epic.name(),
        }
    }

    /// Get the entity status (derived, for epics).
    pub fn status(&self) -> TaskStatus {
        match self {
            Entity::Task(task) => task.status(),
            Entity::SubTask(sub_task) => sub_task.status(),
            Entity::Epic(epic) => epic.status(),
        }
    }
}

impl Timed for Entity {
    fn start_time(&self) -> Option<DateTime<Utc>> {
        match self {
            Entity::Task(task) => task.start_time(),
            Entity::SubTask(sub_task) => sub_task.start_time(),
            Entity::Epic(epic) => epic.start_time(),
        }
    }

    fn end_time(&self) -> Option<DateTime<Utc>> {
        match self {
            Entity::Task(task) => task.end_time(),
            Entity::SubTask(sub_task) => sub_task.end_time(),
            Entity::Epic(epic) => epic.end_time(),
        }
    }
}

/// Counter handing out store-unique entity ids.
///
/// Owned by whichever layer constructs entities; the store itself never
/// assigns ids. After reloading a store from the durable log, call
/// [`IdGenerator::advance_past`] with each loaded id so subsequent
/// allocations do not collide.
#[derive(Debug)]
pub struct IdGenerator {
    next: AtomicU64,
}

impl IdGenerator {
    /// Create a generator whose first id is 1.
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    /// Hand out the next id.
    pub fn next_id(&self) -> EntityId {
        self.next.fetch_add(1, Ordering::Relaxed)
    }

    /// Ensure future ids are strictly greater than `id`.
    pub fn advance_past(&self, id: EntityId) {
        self.next.fetch_max(id + 1, Ordering::Relaxed);
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}
