pub mod calendar;
pub mod clock;
pub mod commands;
pub mod events;
pub mod logging;
pub mod models;
pub mod notify;
pub mod repeat;
pub mod scheduler;
pub mod state;
pub mod storage;

use std::ffi::OsString;
use std::path::PathBuf;

pub use crate::clock::{Clock, ManualClock, SystemClock};
pub use crate::events::{StateEvent, SubscriptionId};
pub use crate::models::{
    CompleteOutcome, DisplayEntry, Frequency, Importance, NewTask, Settings, Task, TaskEdit,
    TaskId,
};
pub use crate::notify::{LogSink, Notification, NotificationSink, NotifyError};
pub use crate::repeat::ResetOutcome;
pub use crate::scheduler::{start_scheduler, SchedulerHandle};
pub use crate::state::{AppContext, AppState, StateError};
pub use crate::storage::{DataFile, Storage, StorageError};

pub const DATA_DIR_ENV: &str = "TASKTRACK_DATA_DIR";

/// The configured data directory, or the working directory when unset.
pub fn resolve_data_dir(
    lookup: impl Fn(&str) -> Option<OsString>,
) -> std::io::Result<PathBuf> {
    match lookup(DATA_DIR_ENV).filter(|value| !value.is_empty()) {
        Some(dir) => Ok(PathBuf::from(dir)),
        None => std::env::current_dir(),
    }
}

/// Process entry: reset recurring tasks, then run alarms until Ctrl-C.
#[cfg(all(feature = "app", not(test)))]
pub fn run() -> Result<(), Box<dyn std::error::Error>> {
    let data_dir = resolve_data_dir(|key| std::env::var_os(key))?;
    let _logger = logging::init_logging(&data_dir)?;

    let state = AppState::open(AppContext::system(data_dir))?;
    let settings = state.context().storage.load_settings().unwrap_or_else(|error| {
        log::warn!("using default settings: {error}");
        Settings::default()
    });

    match state.run_daily_reset() {
        Ok(outcome) => log::info!("startup reset outcome={outcome:?}"),
        Err(error) => log::error!("startup reset failed: {error}"),
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(async move {
        let scheduler = start_scheduler(state, &settings);
        if let Err(error) = tokio::signal::ctrl_c().await {
            log::error!("could not listen for shutdown signal: {error}");
        }
        log::info!("shutdown requested");
        scheduler.stop().await;
    });
    Ok(())
}
