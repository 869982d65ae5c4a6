use std::sync::{Arc, Mutex, PoisonError};

pub const EVENT_TASKS_UPDATED: &str = "tasks_updated";
pub const EVENT_ALARMS_UPDATED: &str = "alarms_updated";

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StateEvent {
    TasksUpdated,
    AlarmsUpdated,
}

impl StateEvent {
    pub fn name(self) -> &'static str {
        match self {
            StateEvent::TasksUpdated => EVENT_TASKS_UPDATED,
            StateEvent::AlarmsUpdated => EVENT_ALARMS_UPDATED,
        }
    }
}

pub type SubscriptionId = u64;

type Listener = Arc<dyn Fn(StateEvent) + Send + Sync>;

#[derive(Default)]
pub(crate) struct Listeners {
    inner: Mutex<ListenerSet>,
}

#[derive(Default)]
struct ListenerSet {
    next_id: SubscriptionId,
    entries: Vec<(SubscriptionId, Listener)>,
}

impl Listeners {
    pub fn subscribe(&self, listener: Listener) -> SubscriptionId {
        let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        guard.next_id += 1;
        let id = guard.next_id;
        guard.entries.push((id, listener));
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let before = guard.entries.len();
        guard.entries.retain(|(entry_id, _)| *entry_id != id);
        guard.entries.len() != before
    }

    /// Listeners run outside the registry lock, so they may subscribe or query state.
    pub fn emit(&self, event: StateEvent) {
        let snapshot: Vec<Listener> = {
            let guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            guard.entries.iter().map(|(_, l)| Arc::clone(l)).collect()
        };
        log::debug!("emit {} listeners={}", event.name(), snapshot.len());
        for listener in snapshot {
            listener(event);
        }
    }
}
