//! Storage layer for Logbook data.
//!
//! This module holds the two store implementations:
//!
//! - [`TaskStore`] - the in-memory engine: CRUD for tasks, subtasks, and
//!   epics, scheduling-conflict checks, epic cascades, the prioritized
//!   view, and access-history wiring
//! - [`FileBackedStore`](file_log::FileBackedStore) - the same operation
//!   set backed by a durable line-oriented log, rewritten on every
//!   mutation
//!
//! All validation happens before any collection is touched: an operation
//! that returns an error leaves the store exactly as it was.

pub mod file_log;
mod ordered;

pub use file_log::FileBackedStore;

use tracing::{debug, trace};

use crate::history::AccessHistory;
use crate::models::overlap::is_crossed;
use crate::models::{Entity, EntityId, Epic, SubTask, Task, TaskStatus, Timed};
use crate::{Error, Result};
use ordered::OrderedMap;

/// The in-memory task store.
///
/// Three independent collections keyed by id, each preserving insertion
/// order for enumeration, plus one access history shared across kinds.
/// Ids are unique across all three collections.
///
/// Entities are value types: `update_*` replaces the stored value under
/// the same id with the supplied one. The one sanctioned in-place change
/// is setting a status on a copy obtained from a getter and handing it
/// back through `update_*`.
#[derive(Debug, Default)]
pub struct TaskStore {
    /// Standalone tasks
    tasks: OrderedMap<Task>,

    /// Subtasks, also reachable through their owning epics
    sub_tasks: OrderedMap<SubTask>,

    /// Epics
    epics: OrderedMap<Epic>,

    /// Recently viewed entities
    history: AccessHistory<EntityId, Entity>,
}

impl TaskStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            tasks: OrderedMap::new(),
            sub_tasks: OrderedMap::new(),
            epics: OrderedMap::new(),
            history: AccessHistory::new(),
        }
    }

    /// Get the total number of stored entities across all kinds.
    pub fn len(&self) -> usize {
        self.tasks.len() + self.sub_tasks.len() + self.epics.len()
    }

    /// Check whether the store holds no entities.
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty() && self.sub_tasks.is_empty() && self.epics.is_empty()
    }

    /// Reject an id that is already taken by any entity kind.
    fn ensure_unique_id(&self, id: EntityId) -> Result<()> {
        if self.tasks.contains(id) || self.sub_tasks.contains(id) || self.epics.contains(id) {
            return Err(Error::Conflict(format!(
                "An entity with id {} already exists",
                id
            )));
        }
        Ok(())
    }

    /// Reject a candidate whose interval crosses any stored task or
    /// subtask, except the one with the excluded id.
    fn ensure_no_overlap<T: Timed>(
        &self,
        id: EntityId,
        candidate: &T,
        exclude: Option<EntityId>,
    ) -> Result<()> {
        for task in self.tasks.values() {
            if Some(task.id()) == exclude {
                continue;
            }
            if is_crossed(task, candidate) {
                return Err(Error::Conflict(format!(
                    "Entity {} overlaps the schedule of entity {}",
                    id,
                    task.id()
                )));
            }
        }
        for sub_task in self.sub_tasks.values() {
            if Some(sub_task.id()) == exclude {
                continue;
            }
            if is_crossed(sub_task, candidate) {
                return Err(Error::Conflict(format!(
                    "Entity {} overlaps the schedule of entity {}",
                    id,
                    sub_task.id()
                )));
            }
        }
        Ok(())
    }

    // === Task Operations ===

    /// Create a new task.
    ///
    /// Fails with [`Error::Conflict`] on a duplicate id or an interval
    /// overlapping any stored task or subtask, and with
    /// [`Error::InvalidInput`] when the status is not `New`.
    pub fn create_task(&mut self, task: Task) -> Result<()> {
        self.ensure_unique_id(task.id())?;

        if task.status() != TaskStatus::New {
            return Err(Error::InvalidInput(format!(
                "Task {} can only be created in status NEW, current status is {}",
                task.id(),
                task.status()
            )));
        }

        self.ensure_no_overlap(task.id(), &task, None)?;

        debug!(id = task.id(), "created task");
        self.tasks.insert(task.id(), task);
        Ok(())
    }

    /// Get a task by id, recording the access in the history.
    pub fn get_task_by_id(&mut self, task_id: EntityId) -> Option<Task> {
        let task = self.tasks.get(task_id)?.clone();

        trace!(id = task_id, "task viewed");
        self.history
            .record_access(task_id, Entity::Task(task.clone()));
        Some(task)
    }

    /// Get all tasks in insertion order. Does not touch the history.
    pub fn get_all_tasks(&self) -> Vec<Task> {
        self.tasks.values().cloned().collect()
    }

    /// Replace the task stored under the given value's id.
    ///
    /// Fails with [`Error::NotFound`] if no task has that id, and with
    /// [`Error::Conflict`] if the new value's interval crosses any other
    /// stored task or subtask (the task's own previous slot is ignored).
    pub fn update_task(&mut self, task: Task) -> Result<()> {
        if !self.tasks.contains(task.id()) {
            return Err(Error::NotFound(format!("Task not found: {}", task.id())));
        }

        self.ensure_no_overlap(task.id(), &task, Some(task.id()))?;

        debug!(id = task.id(), "updated task");
        self.tasks.insert(task.id(), task);
        Ok(())
    }

    /// Remove a task by id, forgetting it from the history.
    pub fn remove_task_by_id(&mut self, task_id: EntityId) -> Result<Task> {
        let task = self
            .tasks
            .remove(task_id)
            .ok_or_else(|| Error::NotFound(format!("Task not found: {}", task_id)))?;

        self.history.forget(&task_id);
        debug!(id = task_id, "removed task");
        Ok(task)
    }

    /// Remove every task, forgetting each from the history.
    pub fn remove_all_tasks(&mut self) {
        let ids: Vec<EntityId> = self.tasks.ids().collect();
        for id in &ids {
            self.history.forget(id);
        }

        debug!(count = ids.len(), "removed all tasks");
        self.tasks.clear();
    }

    // === SubTask Operations ===

    /// Attach a subtask to its owning epic without admitting it.
    ///
    /// This is the binding step that must precede [`create_sub_task`]:
    /// the store owns the epics, so adding a subtask to an epic's map goes
    /// through here. Fails with [`Error::NotFound`] if the epic does not
    /// exist and with [`Error::Conflict`] if the subtask's id is taken or
    /// the epic already lists it.
    ///
    /// [`create_sub_task`]: TaskStore::create_sub_task
    pub fn attach_sub_task(&mut self, sub_task: &SubTask) -> Result<()> {
        self.ensure_unique_id(sub_task.id())?;

        let epic = self.epics.get_mut(sub_task.epic_id()).ok_or_else(|| {
            Error::NotFound(format!("Epic not found: {}", sub_task.epic_id()))
        })?;

        epic.add_sub_task(sub_task.clone())
    }

    /// Admit a subtask into the store.
    ///
    /// The owning epic must exist and must already list the subtask (see
    /// [`attach_sub_task`]); either failing is [`Error::Conflict`]. The
    /// duplicate-id, status, and overlap rules of [`create_task`] apply
    /// unchanged.
    ///
    /// [`attach_sub_task`]: TaskStore::attach_sub_task
    /// [`create_task`]: TaskStore::create_task
    pub fn create_sub_task(&mut self, sub_task: SubTask) -> Result<()> {
        self.ensure_unique_id(sub_task.id())?;

        if sub_task.status() != TaskStatus::New {
            return Err(Error::InvalidInput(format!(
                "SubTask {} can only be created in status NEW, current status is {}",
                sub_task.id(),
                sub_task.status()
            )));
        }

        self.ensure_no_overlap(sub_task.id(), &sub_task, None)?;

        let epic = self.epics.get(sub_task.epic_id()).ok_or_else(|| {
            Error::Conflict(format!(
                "SubTask {} references epic {}, which does not exist",
                sub_task.id(),
                sub_task.epic_id()
            ))
        })?;

        if !epic.has_sub_task(sub_task.id()) {
            return Err(Error::Conflict(format!(
                "SubTask {} must be attached to epic {} before creation",
                sub_task.id(),
                sub_task.epic_id()
            )));
        }

        debug!(id = sub_task.id(), epic_id = sub_task.epic_id(), "created subtask");
        self.sub_tasks.insert(sub_task.id(), sub_task);
        Ok(())
    }

    /// Get a subtask by id, recording the access in the history.
    pub fn get_sub_task_by_id(&mut self, sub_task_id: EntityId) -> Option<SubTask> {
        let sub_task = self.sub_tasks.get(sub_task_id)?.clone();

        trace!(id = sub_task_id, "subtask viewed");
        self.history
            .record_access(sub_task_id, Entity::SubTask(sub_task.clone()));
        Some(sub_task)
    }

    /// Get all subtasks in insertion order. Does not touch the history.
    pub fn get_all_sub_tasks(&self) -> Vec<SubTask> {
        self.sub_tasks.values().cloned().collect()
    }

    /// Get the subtasks belonging to one epic, in insertion order.
    ///
    /// Fails with [`Error::NotFound`] if the epic does not exist. Does not
    /// touch the history.
    pub fn get_sub_tasks_of_epic(&self, epic_id: EntityId) -> Result<Vec<SubTask>> {
        if !self.epics.contains(epic_id) {
            return Err(Error::NotFound(format!("Epic not found: {}", epic_id)));
        }

        Ok(self
            .sub_tasks
            .values()
            .filter(|sub_task| sub_task.epic_id() == epic_id)
            .cloned()
            .collect())
    }

    /// Replace the subtask stored under the given value's id, propagating
    /// the new value into the owning epic's map.
    ///
    /// The owning epic may not change; a value carrying a different
    /// `epic_id` is rejected with [`Error::InvalidInput`]. Overlap rules
    /// match [`update_task`](TaskStore::update_task).
    pub fn update_sub_task(&mut self, sub_task: SubTask) -> Result<()> {
        let existing = self.sub_tasks.get(sub_task.id()).ok_or_else(|| {
            Error::NotFound(format!("SubTask not found: {}", sub_task.id()))
        })?;

        if existing.epic_id() != sub_task.epic_id() {
            return Err(Error::InvalidInput(format!(
                "SubTask {} cannot be moved from epic {} to epic {}",
                sub_task.id(),
                existing.epic_id(),
                sub_task.epic_id()
            )));
        }

        self.ensure_no_overlap(sub_task.id(), &sub_task, Some(sub_task.id()))?;

        let epic = self.epics.get_mut(sub_task.epic_id()).ok_or_else(|| {
            Error::NotFound(format!("Epic not found: {}", sub_task.epic_id()))
        })?;
        epic.update_sub_task(sub_task.clone())?;

        debug!(id = sub_task.id(), "updated subtask");
        self.sub_tasks.insert(sub_task.id(), sub_task);
        Ok(())
    }

    /// Remove a subtask by id, detaching it from its owning epic and
    /// forgetting it from the history.
    pub fn remove_sub_task_by_id(&mut self, sub_task_id: EntityId) -> Result<SubTask> {
        let sub_task = self
            .sub_tasks
            .remove(sub_task_id)
            .ok_or_else(|| Error::NotFound(format!("SubTask not found: {}", sub_task_id)))?;

        if let Some(epic) = self.epics.get_mut(sub_task.epic_id()) {
            epic.remove_sub_task(sub_task_id);
        }

        self.history.forget(&sub_task_id);
        debug!(id = sub_task_id, "removed subtask");
        Ok(sub_task)
    }

    /// Remove every subtask, detaching each from its epic and forgetting
    /// each from the history.
    pub fn remove_all_sub_tasks(&mut self) {
        let bindings: Vec<(EntityId, EntityId)> = self
            .sub_tasks
            .values()
            .map(|sub_task| (sub_task.id(), sub_task.epic_id()))
            .collect();

        for (sub_task_id, epic_id) in &bindings {
            if let Some(epic) = self.epics.get_mut(*epic_id) {
                epic.remove_sub_task(*sub_task_id);
            }
            self.history.forget(sub_task_id);
        }

        debug!(count = bindings.len(), "removed all subtasks");
        self.sub_tasks.clear();
    }

    // === Log Replay ===

    /// Re-admit a task during log replay.
    ///
    /// Identical to [`create_task`](TaskStore::create_task) except that
    /// the fresh-status rule is waived: a replayed task carries whatever
    /// status it had when the log was written.
    pub(crate) fn restore_task(&mut self, task: Task) -> Result<()> {
        self.ensure_unique_id(task.id())?;
        self.ensure_no_overlap(task.id(), &task, None)?;

        self.tasks.insert(task.id(), task);
        Ok(())
    }

    /// Re-admit a subtask during log replay, binding and admitting in one
    /// step.
    ///
    /// The owning epic must already have been replayed; a dangling epic
    /// reference is [`Error::Conflict`].
    pub(crate) fn restore_sub_task(&mut self, sub_task: SubTask) -> Result<()> {
        self.ensure_unique_id(sub_task.id())?;
        self.ensure_no_overlap(sub_task.id(), &sub_task, None)?;

        let epic = self.epics.get_mut(sub_task.epic_id()).ok_or_else(|| {
            Error::Conflict(format!(
                "SubTask {} references epic {}, which does not exist",
                sub_task.id(),
                sub_task.epic_id()
            ))
        })?;
        epic.add_sub_task(sub_task.clone())?;

        self.sub_tasks.insert(sub_task.id(), sub_task);
        Ok(())
    }

    // === Epic Operations ===

    /// Create a new epic.
    ///
    /// Fails with [`Error::Conflict`] on a duplicate id. There is no
    /// status check: an epic's status is derived, not stored.
    pub fn create_epic(&mut self, epic: Epic) -> Result<()> {
        self.ensure_unique_id(epic.id())?;

        debug!(id = epic.id(), "created epic");
        self.epics.insert(epic.id(), epic);
        Ok(())
    }

    /// Get an epic by id, recording the access in the history.
    pub fn get_epic_by_id(&mut self, epic_id: EntityId) -> Option<Epic> {
        let epic = self.epics.get(epic_id)?.clone();

        trace!(id = epic_id, "epic viewed");
        self.history
            .record_access(epic_id, Entity::Epic(epic.clone()));
        Some(epic)
    }

    /// Get all epics in insertion order. Does not touch the history.
    pub fn get_all_epics(&self) -> Vec<Epic> {
        self.epics.values().cloned().collect()
    }

    /// Replace the name and description of the epic stored under the
    /// given value's id.
    ///
    /// The stored subtask set is carried over: epic updates never change
    /// subtask membership, which belongs to the subtask operations.
    pub fn update_epic(&mut self, epic: Epic) -> Result<()> {
        let existing = self.epics.get(epic.id()).ok_or_else(|| {
            Error::NotFound(format!("Epic not found: {}", epic.id()))
        })?;

        let mut replacement = Epic::new(
            epic.id(),
            epic.name().to_string(),
            epic.description().to_string(),
        )?;
        for sub_task in existing.sub_tasks() {
            replacement.add_sub_task(sub_task.clone())?;
        }

        debug!(id = epic.id(), "updated epic");
        self.epics.insert(epic.id(), replacement);
        Ok(())
    }

    /// Remove an epic by id, cascading over its subtasks.
    ///
    /// Every owned subtask is removed from the subtask collection and
    /// forgotten from the history before the epic itself is.
    pub fn remove_epic_by_id(&mut self, epic_id: EntityId) -> Result<Epic> {
        let epic = self
            .epics
            .remove(epic_id)
            .ok_or_else(|| Error::NotFound(format!("Epic not found: {}", epic_id)))?;

        for sub_task in epic.sub_tasks() {
            self.sub_tasks.remove(sub_task.id());
            self.history.forget(&sub_task.id());
        }

        self.history.forget(&epic_id);
        debug!(id = epic_id, sub_tasks = epic.sub_task_count(), "removed epic");
        Ok(epic)
    }

    /// Remove every epic and, with them, every subtask.
    pub fn remove_all_epics(&mut self) {
        let sub_task_ids: Vec<EntityId> = self.sub_tasks.ids().collect();
        for id in &sub_task_ids {
            self.history.forget(id);
        }
        self.sub_tasks.clear();

        let epic_ids: Vec<EntityId> = self.epics.ids().collect();
        for id in &epic_ids {
            self.history.forget(id);
        }

        debug!(
            epics = epic_ids.len(),
            sub_tasks = sub_task_ids.len(),
            "removed all epics"
        );
        self.epics.clear();
    }

    // === Derived Views ===

    /// Get every task and subtask that has a start time, sorted ascending
    /// by start time.
    ///
    /// The sort is stable: entities sharing a start time keep their
    /// relative insertion order, tasks before subtasks.
    pub fn get_prioritized_tasks(&self) -> Vec<Entity> {
        let mut result: Vec<Entity> = Vec::new();

        result.extend(
            self.tasks
                .values()
                .filter(|task| task.start_time().is_some())
                .cloned()
                .map(Entity::Task),
        );
        result.extend(
            self.sub_tasks
                .values()
                .filter(|sub_task| sub_task.start_time().is_some())
                .cloned()
                .map(Entity::SubTask),
        );

        result.sort_by_key(|entity| entity.start_time());
        result
    }

    /// Get the access history, least- to most-recently viewed.
    pub fn get_history(&self) -> Vec<Entity> {
        self.history.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 14, hour, minute, 0).unwrap()
    }

    fn task(id: EntityId) -> Task {
        Task::new(
            id,
            format!("Task {}", id),
            format!("Description {}", id),
            TaskStatus::New,
            None,
            None,
        )
        .unwrap()
    }

    fn scheduled_task(id: EntityId, start: DateTime<Utc>, minutes: i64) -> Task {
        Task::new(
            id,
            format!("Task {}", id),
            format!("Description {}", id),
            TaskStatus::New,
            Some(start),
            Some(Duration::minutes(minutes)),
        )
        .unwrap()
    }

    fn epic(id: EntityId) -> Epic {
        Epic::new(id, format!("Epic {}", id), format!("Description {}", id)).unwrap()
    }

    fn sub_task(id: EntityId, epic_id: EntityId) -> SubTask {
        SubTask::new(
            id,
            format!("SubTask {}", id),
            format!("Description {}", id),
            TaskStatus::New,
            None,
            None,
            epic_id,
        )
        .unwrap()
    }

    fn scheduled_sub_task(
        id: EntityId,
        epic_id: EntityId,
        start: DateTime<Utc>,
        minutes: i64,
    ) -> SubTask {
        SubTask::new(
            id,
            format!("SubTask {}", id),
            format!("Description {}", id),
            TaskStatus::New,
            Some(start),
            Some(Duration::minutes(minutes)),
            epic_id,
        )
        .unwrap()
    }

    /// Attach and admit a subtask in one step.
    fn admit_sub_task(store: &mut TaskStore, sub: SubTask) {
        store.attach_sub_task(&sub).unwrap();
        store.create_sub_task(sub).unwrap();
    }

    #[test]
    fn test_create_and_list_tasks_in_insertion_order() {
        let mut store = TaskStore::new();
        store.create_task(task(3)).unwrap();
        store.create_task(task(1)).unwrap();
        store.create_task(task(2)).unwrap();

        let ids: Vec<EntityId> = store.get_all_tasks().iter().map(Task::id).collect();
        assert_eq!(ids, vec![3, 1, 2]);
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn test_create_task_duplicate_id_is_conflict() {
        let mut store = TaskStore::new();
        store.create_task(task(1)).unwrap();

        let result = store.create_task(task(1));
        assert!(matches!(result, Err(Error::Conflict(_))));
        assert_eq!(store.get_all_tasks().len(), 1);
    }

    #[test]
    fn test_ids_are_unique_across_kinds() {
        let mut store = TaskStore::new();
        store.create_epic(epic(1)).unwrap();

        assert!(matches!(store.create_task(task(1)), Err(Error::Conflict(_))));

        store.create_task(task(2)).unwrap();
        assert!(matches!(store.create_epic(epic(2)), Err(Error::Conflict(_))));
    }

    #[test]
    fn test_create_task_requires_new_status() {
        let mut store = TaskStore::new();
        let mut started = task(1);
        started.set_status(TaskStatus::InProgress);

        let result = store.create_task(started);
        assert!(matches!(result, Err(Error::InvalidInput(_))));
        assert!(store.is_empty());
    }

    #[test]
    fn test_create_task_overlap_is_conflict() {
        let mut store = TaskStore::new();
        let t = at(9, 0);

        // [9:00, 10:00)
        store.create_task(scheduled_task(1, t, 60)).unwrap();

        // [9:30, 10:30) overlaps
        let result = store.create_task(scheduled_task(2, at(9, 30), 60));
        assert!(matches!(result, Err(Error::Conflict(_))));
        assert_eq!(store.get_all_tasks().len(), 1);

        // [11:00, 12:00) does not
        store.create_task(scheduled_task(3, at(11, 0), 60)).unwrap();

        let prioritized: Vec<EntityId> = store
            .get_prioritized_tasks()
            .iter()
            .map(Entity::id)
            .collect();
        assert_eq!(prioritized, vec![1, 3]);
    }

    #[test]
    fn test_unscheduled_tasks_never_conflict() {
        let mut store = TaskStore::new();
        store.create_task(scheduled_task(1, at(9, 0), 60)).unwrap();
        store.create_task(task(2)).unwrap();
        store.create_task(task(3)).unwrap();

        assert_eq!(store.get_all_tasks().len(), 3);
        assert_eq!(store.get_prioritized_tasks().len(), 1);
    }

    #[test]
    fn test_get_task_records_history() {
        let mut store = TaskStore::new();
        store.create_task(task(1)).unwrap();
        store.create_task(task(2)).unwrap();

        assert!(store.get_task_by_id(1).is_some());
        assert!(store.get_task_by_id(2).is_some());
        assert!(store.get_task_by_id(1).is_some());

        let history: Vec<EntityId> = store.get_history().iter().map(Entity::id).collect();
        assert_eq!(history, vec![2, 1]);
    }

    #[test]
    fn test_get_missing_task_records_nothing() {
        let mut store = TaskStore::new();
        store.create_task(task(1)).unwrap();

        assert!(store.get_task_by_id(42).is_none());
        assert!(store.get_history().is_empty());
    }

    #[test]
    fn test_repeated_access_keeps_history_duplicate_free() {
        let mut store = TaskStore::new();
        store.create_task(task(1)).unwrap();

        for _ in 0..4 {
            store.get_task_by_id(1);
        }

        let history = store.get_history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].id(), 1);
    }

    #[test]
    fn test_update_task_not_found() {
        let mut store = TaskStore::new();
        let result = store.update_task(task(1));
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[test]
    fn test_update_task_replaces_value_in_place() {
        let mut store = TaskStore::new();
        store.create_task(task(1)).unwrap();
        store.create_task(task(2)).unwrap();

        let mut updated = Task::new(
            1,
            "Renamed".to_string(),
            "New description".to_string(),
            TaskStatus::New,
            None,
            None,
        )
        .unwrap();
        updated.set_status(TaskStatus::Done);
        store.update_task(updated).unwrap();

        let tasks = store.get_all_tasks();
        assert_eq!(tasks[0].name(), "Renamed");
        assert_eq!(tasks[0].status(), TaskStatus::Done);
        assert_eq!(tasks[1].id(), 2);
    }

    #[test]
    fn test_update_task_ignores_its_own_slot() {
        let mut store = TaskStore::new();
        store.create_task(scheduled_task(1, at(9, 0), 60)).unwrap();

        // Same slot, new status: must not conflict with itself.
        let mut renamed = scheduled_task(1, at(9, 0), 60);
        renamed.set_status(TaskStatus::InProgress);
        store.update_task(renamed).unwrap();

        assert_eq!(store.get_all_tasks()[0].status(), TaskStatus::InProgress);
    }

    #[test]
    fn test_update_task_still_rejects_overlap_with_others() {
        let mut store = TaskStore::new();
        store.create_task(scheduled_task(1, at(9, 0), 60)).unwrap();
        store.create_task(scheduled_task(2, at(11, 0), 60)).unwrap();

        // Move task 2 onto task 1's slot.
        let result = store.update_task(scheduled_task(2, at(9, 30), 60));
        assert!(matches!(result, Err(Error::Conflict(_))));

        // Task 2 is unchanged.
        assert_eq!(store.get_all_tasks()[1].start_time(), Some(at(11, 0)));
    }

    #[test]
    fn test_remove_task_forgets_history() {
        let mut store = TaskStore::new();
        store.create_task(task(1)).unwrap();
        store.get_task_by_id(1);

        let removed = store.remove_task_by_id(1).unwrap();
        assert_eq!(removed.id(), 1);
        assert!(store.get_history().is_empty());
        assert!(store.is_empty());

        assert!(matches!(
            store.remove_task_by_id(1),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_remove_all_tasks() {
        let mut store = TaskStore::new();
        store.create_task(task(1)).unwrap();
        store.create_task(task(2)).unwrap();
        store.create_epic(epic(3)).unwrap();
        store.get_task_by_id(1);
        store.get_epic_by_id(3);

        store.remove_all_tasks();

        assert!(store.get_all_tasks().is_empty());
        // The epic survives, as does its history entry.
        let history: Vec<EntityId> = store.get_history().iter().map(Entity::id).collect();
        assert_eq!(history, vec![3]);
    }

    #[test]
    fn test_sub_task_requires_existing_epic() {
        let mut store = TaskStore::new();

        let result = store.create_sub_task(sub_task(2, 1));
        assert!(matches!(result, Err(Error::Conflict(_))));

        let result = store.attach_sub_task(&sub_task(2, 1));
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[test]
    fn test_sub_task_must_be_attached_before_creation() {
        let mut store = TaskStore::new();
        store.create_epic(epic(1)).unwrap();

        let result = store.create_sub_task(sub_task(2, 1));
        assert!(matches!(result, Err(Error::Conflict(_))));

        store.attach_sub_task(&sub_task(2, 1)).unwrap();
        store.create_sub_task(sub_task(2, 1)).unwrap();
        assert_eq!(store.get_all_sub_tasks().len(), 1);
    }

    #[test]
    fn test_sub_task_overlap_against_tasks_is_conflict() {
        let mut store = TaskStore::new();
        store.create_task(scheduled_task(1, at(9, 0), 60)).unwrap();
        store.create_epic(epic(2)).unwrap();

        let crossing = scheduled_sub_task(3, 2, at(9, 30), 60);
        store.attach_sub_task(&crossing).unwrap();
        let result = store.create_sub_task(crossing);
        assert!(matches!(result, Err(Error::Conflict(_))));
        assert!(store.get_all_sub_tasks().is_empty());
    }

    #[test]
    fn test_epic_derivation_through_store() {
        let mut store = TaskStore::new();
        store.create_epic(epic(1)).unwrap();

        // Empty epic: NEW, unscheduled.
        let view = store.get_epic_by_id(1).unwrap();
        assert_eq!(view.status(), TaskStatus::New);
        assert_eq!(view.start_time(), None);

        let t = at(9, 0);
        admit_sub_task(&mut store, scheduled_sub_task(2, 1, t, 60));

        let view = store.get_epic_by_id(1).unwrap();
        assert_eq!(view.status(), TaskStatus::New);
        assert_eq!(view.start_time(), Some(t));

        // Completing the only subtask completes the epic.
        let mut done = scheduled_sub_task(2, 1, t, 60);
        done.set_status(TaskStatus::Done);
        store.update_sub_task(done).unwrap();

        let view = store.get_epic_by_id(1).unwrap();
        assert_eq!(view.status(), TaskStatus::Done);
    }

    #[test]
    fn test_update_sub_task_propagates_to_epic() {
        let mut store = TaskStore::new();
        store.create_epic(epic(1)).unwrap();
        admit_sub_task(&mut store, sub_task(2, 1));
        admit_sub_task(&mut store, sub_task(3, 1));

        let mut in_progress = sub_task(2, 1);
        in_progress.set_status(TaskStatus::InProgress);
        store.update_sub_task(in_progress).unwrap();

        let view = store.get_epic_by_id(1).unwrap();
        assert_eq!(view.status(), TaskStatus::InProgress);
        assert_eq!(
            view.sub_task(2).unwrap().status(),
            TaskStatus::InProgress
        );
    }

    #[test]
    fn test_update_sub_task_rejects_reparenting() {
        let mut store = TaskStore::new();
        store.create_epic(epic(1)).unwrap();
        store.create_epic(epic(2)).unwrap();
        admit_sub_task(&mut store, sub_task(3, 1));

        let result = store.update_sub_task(sub_task(3, 2));
        assert!(matches!(result, Err(Error::InvalidInput(_))));

        // Binding is unchanged.
        assert_eq!(store.get_sub_task_by_id(3).unwrap().epic_id(), 1);
    }

    #[test]
    fn test_remove_sub_task_detaches_from_epic() {
        let mut store = TaskStore::new();
        store.create_epic(epic(1)).unwrap();
        admit_sub_task(&mut store, sub_task(2, 1));
        store.get_sub_task_by_id(2);

        store.remove_sub_task_by_id(2).unwrap();

        let view = store.get_epic_by_id(1).unwrap();
        assert_eq!(view.sub_task_count(), 0);
        assert!(store.get_all_sub_tasks().is_empty());

        let history: Vec<EntityId> = store.get_history().iter().map(Entity::id).collect();
        assert_eq!(history, vec![1]);
    }

    #[test]
    fn test_remove_epic_cascades_to_sub_tasks() {
        let mut store = TaskStore::new();
        store.create_epic(epic(1)).unwrap();
        admit_sub_task(&mut store, sub_task(2, 1));
        admit_sub_task(&mut store, sub_task(3, 1));
        store.create_epic(epic(4)).unwrap();
        admit_sub_task(&mut store, sub_task(5, 4));

        store.get_sub_task_by_id(2);
        store.get_sub_task_by_id(5);
        store.get_epic_by_id(1);

        store.remove_epic_by_id(1).unwrap();

        // Exactly epic 1's subtasks are gone, from the collection and the
        // history alike.
        let remaining: Vec<EntityId> =
            store.get_all_sub_tasks().iter().map(SubTask::id).collect();
        assert_eq!(remaining, vec![5]);

        let history: Vec<EntityId> = store.get_history().iter().map(Entity::id).collect();
        assert_eq!(history, vec![5]);
    }

    #[test]
    fn test_remove_all_sub_tasks_detaches_everywhere() {
        let mut store = TaskStore::new();
        store.create_epic(epic(1)).unwrap();
        store.create_epic(epic(2)).unwrap();
        admit_sub_task(&mut store, sub_task(3, 1));
        admit_sub_task(&mut store, sub_task(4, 2));

        store.remove_all_sub_tasks();

        assert!(store.get_all_sub_tasks().is_empty());
        assert_eq!(store.get_epic_by_id(1).unwrap().sub_task_count(), 0);
        assert_eq!(store.get_epic_by_id(2).unwrap().sub_task_count(), 0);
    }

    #[test]
    fn test_remove_all_epics_clears_sub_tasks() {
        let mut store = TaskStore::new();
        store.create_epic(epic(1)).unwrap();
        admit_sub_task(&mut store, sub_task(2, 1));
        store.create_task(task(3)).unwrap();
        store.get_task_by_id(3);
        store.get_sub_task_by_id(2);
        store.get_epic_by_id(1);

        store.remove_all_epics();

        assert!(store.get_all_epics().is_empty());
        assert!(store.get_all_sub_tasks().is_empty());

        // Only the task's history entry survives.
        let history: Vec<EntityId> = store.get_history().iter().map(Entity::id).collect();
        assert_eq!(history, vec![3]);
    }

    #[test]
    fn test_get_sub_tasks_of_epic() {
        let mut store = TaskStore::new();
        store.create_epic(epic(1)).unwrap();
        store.create_epic(epic(2)).unwrap();
        admit_sub_task(&mut store, sub_task(3, 1));
        admit_sub_task(&mut store, sub_task(4, 2));
        admit_sub_task(&mut store, sub_task(5, 1));

        let ids: Vec<EntityId> = store
            .get_sub_tasks_of_epic(1)
            .unwrap()
            .iter()
            .map(SubTask::id)
            .collect();
        assert_eq!(ids, vec![3, 5]);

        assert!(matches!(
            store.get_sub_tasks_of_epic(42),
            Err(Error::NotFound(_))
        ));
        assert!(store.get_history().is_empty());
    }

    #[test]
    fn test_prioritized_merges_tasks_and_sub_tasks() {
        let mut store = TaskStore::new();
        store.create_task(scheduled_task(1, at(12, 0), 30)).unwrap();
        store.create_task(task(2)).unwrap();
        store.create_epic(epic(3)).unwrap();
        admit_sub_task(&mut store, scheduled_sub_task(4, 3, at(8, 0), 30));
        admit_sub_task(&mut store, sub_task(5, 3));

        let prioritized: Vec<EntityId> = store
            .get_prioritized_tasks()
            .iter()
            .map(Entity::id)
            .collect();
        assert_eq!(prioritized, vec![4, 1]);
    }

    #[test]
    fn test_prioritized_is_stable_for_equal_starts() {
        let mut store = TaskStore::new();
        let t = at(9, 0);

        // Zero-length slots at the same instant do not conflict, so they
        // exercise the tie-break: insertion order, tasks before subtasks.
        store.create_task(scheduled_task(7, t, 0)).unwrap();
        store.create_task(scheduled_task(3, t, 0)).unwrap();
        store.create_epic(epic(1)).unwrap();
        admit_sub_task(&mut store, scheduled_sub_task(5, 1, t, 0));

        let prioritized: Vec<EntityId> = store
            .get_prioritized_tasks()
            .iter()
            .map(Entity::id)
            .collect();
        assert_eq!(prioritized, vec![7, 3, 5]);
    }

    #[test]
    fn test_history_mixes_kinds_in_access_order() {
        let mut store = TaskStore::new();
        store.create_task(task(1)).unwrap();
        store.create_epic(epic(2)).unwrap();
        admit_sub_task(&mut store, sub_task(3, 2));

        store.get_epic_by_id(2);
        store.get_task_by_id(1);
        store.get_sub_task_by_id(3);
        store.get_epic_by_id(2);

        let history = store.get_history();
        let ids: Vec<EntityId> = history.iter().map(Entity::id).collect();
        assert_eq!(ids, vec![1, 3, 2]);
        assert_eq!(history[2].kind(), crate::models::EntityKind::Epic);
    }

    #[test]
    fn test_failed_create_leaves_store_untouched() {
        let mut store = TaskStore::new();
        store.create_task(scheduled_task(1, at(9, 0), 60)).unwrap();
        store.get_task_by_id(1);

        let before_tasks = store.get_all_tasks().len();
        let before_history = store.get_history().len();

        assert!(store.create_task(scheduled_task(2, at(9, 15), 30)).is_err());

        assert_eq!(store.get_all_tasks().len(), before_tasks);
        assert_eq!(store.get_history().len(), before_history);
    }
}
