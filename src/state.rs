use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::NaiveDate;

use crate::calendar::{normalize_clock, task_date_matches};
use crate::clock::{Clock, SystemClock};
use crate::events::{Listeners, StateEvent, SubscriptionId};
use crate::models::{
    CheckpointFile, CompleteOutcome, DisplayEntry, NewTask, Task, TaskEdit, TaskId,
};
use crate::notify::{LogSink, NotificationSink};
use crate::repeat::{apply_reset, ResetOutcome};
use crate::storage::{DataFile, Storage, StorageError};

#[derive(Debug)]
pub enum StateError {
    Storage(StorageError),
    TaskNotFound(TaskId),
    IndexOutOfRange(usize),
    InvalidAlarmTime(String),
}

impl std::fmt::Display for StateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StateError::Storage(err) => write!(f, "storage error: {err}"),
            StateError::TaskNotFound(id) => write!(f, "task not found: {id}"),
            StateError::IndexOutOfRange(index) => write!(f, "no task at index {index}"),
            StateError::InvalidAlarmTime(raw) => write!(f, "invalid alarm time: {raw:?}"),
        }
    }
}

impl std::error::Error for StateError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StateError::Storage(err) => Some(err),
            _ => None,
        }
    }
}

impl From<StorageError> for StateError {
    fn from(value: StorageError) -> Self {
        StateError::Storage(value)
    }
}

/// Everything a component needs from its surroundings: where data lives, what
/// time it is, and where to send messages.
pub struct AppContext {
    pub storage: Storage,
    pub clock: Arc<dyn Clock>,
    pub notifier: Arc<dyn NotificationSink>,
}

impl AppContext {
    pub fn new(
        root: PathBuf,
        clock: Arc<dyn Clock>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            storage: Storage::new(root),
            clock,
            notifier,
        }
    }

    /// Local system time, notifications to the log.
    pub fn system(root: PathBuf) -> Self {
        Self::new(root, Arc::new(SystemClock), Arc::new(LogSink))
    }
}

/// The task repository shared by the UI, the scheduler and the daily reset.
///
/// Every operation runs a full load, mutate, save cycle against the data files
/// while holding one lock, so concurrent callers in this process never lose
/// each other's writes. Nothing is cached between calls.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<Inner>,
}

struct Inner {
    ctx: AppContext,
    lock: Mutex<()>,
    listeners: Listeners,
}

impl AppState {
    /// Prepares the data directory and gives legacy tasks a durable id. A corrupt
    /// task file is logged and left in place; later operations report it.
    pub fn open(ctx: AppContext) -> Result<Self, StateError> {
        ctx.storage.ensure_dirs()?;
        let state = Self {
            inner: Arc::new(Inner {
                ctx,
                lock: Mutex::new(()),
                listeners: Listeners::default(),
            }),
        };
        if let Err(error) = state.assign_missing_ids() {
            log::error!("could not prepare task file: {error}");
        }
        Ok(state)
    }

    pub fn context(&self) -> &AppContext {
        &self.inner.ctx
    }

    pub fn clock(&self) -> &dyn Clock {
        self.inner.ctx.clock.as_ref()
    }

    pub fn notifier(&self) -> &dyn NotificationSink {
        self.inner.ctx.notifier.as_ref()
    }

    pub fn data_dir(&self) -> &Path {
        self.storage().root()
    }

    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(StateEvent) + Send + Sync + 'static,
    {
        self.inner.listeners.subscribe(Arc::new(listener))
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.listeners.unsubscribe(id)
    }

    pub fn tasks(&self) -> Result<Vec<Task>, StateError> {
        let _guard = self.lock();
        self.load_tasks()
    }

    /// Incomplete tasks due on `date`, in store order, with dense display indices.
    pub fn tasks_for_date(&self, date: NaiveDate) -> Result<Vec<DisplayEntry>, StateError> {
        let tasks = self.tasks()?;
        Ok(tasks
            .into_iter()
            .enumerate()
            .filter(|(_, task)| !task.complete && task_date_matches(&task.date, date))
            .enumerate()
            .map(|(display_index, (store_index, task))| DisplayEntry {
                display_index,
                store_index,
                id: task.id,
                task,
            })
            .collect())
    }

    pub fn add_task(&self, new_task: NewTask) -> Result<Task, StateError> {
        self.mutate_tasks(|tasks| {
            let id = next_id(tasks);
            let task = new_task.into_task(id);
            tasks.push(task.clone());
            log::info!("task added id={id} date={} frequency={:?}", task.date, task.frequency);
            Ok((task, true))
        })
    }

    pub fn complete_task(&self, id: TaskId) -> Result<CompleteOutcome, StateError> {
        self.mutate_tasks(|tasks| {
            let index = position_of(tasks, id)?;
            complete_in_place(&mut tasks[index])
        })
    }

    pub fn complete_at(&self, store_index: usize) -> Result<CompleteOutcome, StateError> {
        self.mutate_tasks(|tasks| {
            let task = tasks
                .get_mut(store_index)
                .ok_or(StateError::IndexOutOfRange(store_index))?;
            complete_in_place(task)
        })
    }

    pub fn delete_task(&self, id: TaskId) -> Result<Task, StateError> {
        self.mutate_tasks(|tasks| {
            let index = position_of(tasks, id)?;
            let removed = tasks.remove(index);
            log::info!("task deleted id={id}");
            Ok((removed, true))
        })
    }

    pub fn delete_at(&self, store_index: usize) -> Result<Task, StateError> {
        self.mutate_tasks(|tasks| {
            if store_index >= tasks.len() {
                return Err(StateError::IndexOutOfRange(store_index));
            }
            let removed = tasks.remove(store_index);
            log::info!("task deleted id={} index={store_index}", removed.id);
            Ok((removed, true))
        })
    }

    pub fn edit_task(&self, id: TaskId, edit: TaskEdit) -> Result<Task, StateError> {
        self.mutate_tasks(|tasks| {
            let index = position_of(tasks, id)?;
            edit.apply(&mut tasks[index]);
            Ok((tasks[index].clone(), true))
        })
    }

    pub fn edit_at(&self, store_index: usize, edit: TaskEdit) -> Result<Task, StateError> {
        self.mutate_tasks(|tasks| {
            let task = tasks
                .get_mut(store_index)
                .ok_or(StateError::IndexOutOfRange(store_index))?;
            edit.apply(task);
            Ok((task.clone(), true))
        })
    }

    pub fn alarms(&self) -> Result<Vec<String>, StateError> {
        let _guard = self.lock();
        Ok(self.storage().load_alarms()?.alarms)
    }

    /// Returns `false` when the time is already set.
    pub fn add_alarm(&self, time: &str) -> Result<bool, StateError> {
        let normalized =
            normalize_clock(time).ok_or_else(|| StateError::InvalidAlarmTime(time.to_string()))?;
        let added = {
            let _guard = self.lock();
            let mut data = self.storage().load_alarms()?;
            if data.alarms.contains(&normalized) {
                false
            } else {
                data.alarms.push(normalized.clone());
                self.storage().save_alarms(&data)?;
                true
            }
        };
        if added {
            log::info!("alarm added time={normalized}");
            self.inner.listeners.emit(StateEvent::AlarmsUpdated);
        }
        Ok(added)
    }

    pub fn delete_alarm(&self, position: usize) -> Result<Option<String>, StateError> {
        let removed = {
            let _guard = self.lock();
            let mut data = self.storage().load_alarms()?;
            if position >= data.alarms.len() {
                None
            } else {
                let removed = data.alarms.remove(position);
                self.storage().save_alarms(&data)?;
                Some(removed)
            }
        };
        if let Some(time) = &removed {
            log::info!("alarm removed time={time}");
            self.inner.listeners.emit(StateEvent::AlarmsUpdated);
        }
        Ok(removed)
    }

    /// Clears the completion flag on recurring tasks, at most once per local day.
    pub fn run_daily_reset(&self) -> Result<ResetOutcome, StateError> {
        let outcome = {
            let _guard = self.lock();
            let last_reset = self.storage().load_checkpoint()?.last_reset();
            let today = self.clock().today();
            if last_reset == today {
                ResetOutcome::Skipped
            } else {
                let mut tasks = self.load_tasks()?;
                let outcome = apply_reset(&mut tasks, last_reset, today);
                if let ResetOutcome::Applied { .. } = outcome {
                    self.storage().save_tasks(&tasks)?;
                    self.storage().save_checkpoint(&CheckpointFile::for_date(today))?;
                }
                outcome
            }
        };
        match outcome {
            ResetOutcome::Applied { matched, cleared } => {
                log::info!("daily reset applied matched={matched} cleared={cleared}");
                self.inner.listeners.emit(StateEvent::TasksUpdated);
            }
            ResetOutcome::Unchanged => log::debug!("daily reset found no recurring tasks"),
            ResetOutcome::Skipped => log::debug!("daily reset already ran today"),
        }
        Ok(outcome)
    }

    pub fn acknowledge_corrupt(&self, file: DataFile) -> Result<Option<PathBuf>, StateError> {
        let backup = {
            let _guard = self.lock();
            self.storage().acknowledge_corrupt(file)?
        };
        if backup.is_some() {
            let event = match file {
                DataFile::Alarms => StateEvent::AlarmsUpdated,
                _ => StateEvent::TasksUpdated,
            };
            self.inner.listeners.emit(event);
        }
        Ok(backup)
    }

    fn storage(&self) -> &Storage {
        &self.inner.ctx.storage
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        self.inner.lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Loads the collection, filling in ids for records that predate them. Must be
    /// called with the lock held.
    fn load_tasks(&self) -> Result<Vec<Task>, StateError> {
        let mut tasks = self.storage().load_tasks()?;
        fill_missing_ids(&mut tasks);
        Ok(tasks)
    }

    fn assign_missing_ids(&self) -> Result<(), StateError> {
        let _guard = self.lock();
        let mut tasks = self.storage().load_tasks()?;
        let assigned = fill_missing_ids(&mut tasks);
        if assigned > 0 {
            self.storage().save_tasks(&tasks)?;
            log::info!("assigned ids to {assigned} legacy tasks");
        }
        Ok(())
    }

    /// Runs `f` inside a load, mutate, save cycle. `f` returns its result and
    /// whether the collection changed; unchanged collections are not written.
    fn mutate_tasks<T>(
        &self,
        f: impl FnOnce(&mut Vec<Task>) -> Result<(T, bool), StateError>,
    ) -> Result<T, StateError> {
        let (result, changed) = {
            let _guard = self.lock();
            let mut tasks = self.load_tasks()?;
            let (result, changed) = f(&mut tasks)?;
            if changed {
                self.storage().save_tasks(&tasks)?;
            }
            (result, changed)
        };
        if changed {
            self.inner.listeners.emit(StateEvent::TasksUpdated);
        }
        Ok(result)
    }
}

fn complete_in_place(task: &mut Task) -> Result<(CompleteOutcome, bool), StateError> {
    if task.complete {
        log::debug!("task already complete id={}", task.id);
        return Ok((CompleteOutcome::AlreadyComplete(task.clone()), false));
    }
    task.complete = true;
    log::info!("task completed id={}", task.id);
    Ok((CompleteOutcome::Completed(task.clone()), true))
}

fn position_of(tasks: &[Task], id: TaskId) -> Result<usize, StateError> {
    tasks
        .iter()
        .position(|task| task.id == id)
        .ok_or(StateError::TaskNotFound(id))
}

fn next_id(tasks: &[Task]) -> TaskId {
    tasks.iter().map(|task| task.id).max().unwrap_or(0) + 1
}

/// Gives every zero id the next free number, in file order. Deterministic for an
/// unchanged file, so ids handed out before the first save stay valid.
fn fill_missing_ids(tasks: &mut [Task]) -> usize {
    let mut next = next_id(tasks);
    let mut assigned = 0;
    for task in tasks.iter_mut().filter(|task| task.id == 0) {
        task.id = next;
        next += 1;
        assigned += 1;
    }
    assigned
}
