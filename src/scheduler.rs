use std::time::Duration;

use chrono::NaiveDate;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::calendar::clock_key;
use crate::models::{Settings, Task};
use crate::notify::Notification;
use crate::state::{AppState, StateError};

pub const ALARM_TITLE: &str = "Alarm Alert";
pub const ALL_CLEAR_TITLE: &str = "All done";
pub const ALL_CLEAR_MESSAGE: &str = "No unfinished tasks for today.";

const MAX_POLL_SECS: u64 = 60;

/// Running background loop. Dropping the handle signals the loop to stop;
/// [`SchedulerHandle::stop`] also waits for it to finish.
pub struct SchedulerHandle {
    shutdown: watch::Sender<bool>,
    join: Option<JoinHandle<()>>,
}

impl SchedulerHandle {
    pub async fn stop(mut self) {
        let _ = self.shutdown.send(true);
        if let Some(join) = self.join.take() {
            if let Err(error) = join.await {
                log::warn!("scheduler task ended abnormally: {error}");
            }
        }
    }
}

impl Drop for SchedulerHandle {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
    }
}

/// Starts the alarm and daily-reset loop on the current tokio runtime.
///
/// Each tick checks the alarm list against the current `HH:MM` and, on the first
/// tick of a new local day, runs the daily reset.
pub fn start_scheduler(state: AppState, settings: &Settings) -> SchedulerHandle {
    let period = poll_period(settings);
    let notify_when_clear = settings.notify_when_clear;
    let (shutdown, mut shutdown_rx) = watch::channel(false);
    let join = tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut tracker = TickTracker::default();
        log::info!("scheduler started period_secs={}", period.as_secs());
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    on_tick(&state, &mut tracker, notify_when_clear);
                }
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }
        log::info!("scheduler stopped");
    });
    SchedulerHandle {
        shutdown,
        join: Some(join),
    }
}

/// Tick period from settings. Longer than a minute would skip alarm minutes.
fn poll_period(settings: &Settings) -> Duration {
    Duration::from_secs(settings.alarm_poll_secs.clamp(1, MAX_POLL_SECS))
}

#[derive(Debug, Default)]
struct TickTracker {
    reset_day: Option<NaiveDate>,
    reset_failing: bool,
    last_fired: Option<(NaiveDate, String)>,
}

fn on_tick(state: &AppState, tracker: &mut TickTracker, notify_when_clear: bool) {
    let now = state.clock().now();
    let today = now.date();

    if tracker.reset_day != Some(today) {
        match state.run_daily_reset() {
            Ok(outcome) => {
                if tracker.reset_failing {
                    log::info!("daily reset recovered day={today}");
                }
                log::debug!("daily reset check day={today} outcome={outcome:?}");
                tracker.reset_day = Some(today);
                tracker.reset_failing = false;
            }
            // Retried every tick.
            Err(error) if tracker.reset_failing => log::debug!("daily reset still failing: {error}"),
            Err(error) => {
                log::error!("daily reset failed, retrying each tick: {error}");
                tracker.reset_failing = true;
            }
        }
    }

    let minute = clock_key(now.time());
    if tracker
        .last_fired
        .as_ref()
        .is_some_and(|(day, fired)| *day == today && *fired == minute)
    {
        return;
    }
    let alarms = match state.alarms() {
        Ok(alarms) => alarms,
        Err(error) => {
            log::error!("could not read alarms: {error}");
            return;
        }
    };
    if !alarms.contains(&minute) {
        return;
    }
    tracker.last_fired = Some((today, minute.clone()));
    log::info!("alarm fired time={minute}");

    let unfinished = match collect_unfinished_today(state, today) {
        Ok(tasks) => tasks,
        Err(error) => {
            log::error!("alarm check could not read tasks: {error}");
            return;
        }
    };
    let Some(notification) = alarm_notification(unfinished.len(), notify_when_clear) else {
        return;
    };
    if let Err(error) = state.notifier().deliver(&notification) {
        log::warn!("alarm notification not delivered: {error}");
    }
}

fn collect_unfinished_today(state: &AppState, today: NaiveDate) -> Result<Vec<Task>, StateError> {
    Ok(state
        .tasks_for_date(today)?
        .into_iter()
        .map(|entry| entry.task)
        .collect())
}

pub fn alarm_notification(unfinished: usize, notify_when_clear: bool) -> Option<Notification> {
    if unfinished > 0 {
        return Some(Notification::new(
            ALARM_TITLE,
            format!("You have {unfinished} unfinished tasks!"),
        ));
    }
    if notify_when_clear {
        return Some(Notification::new(ALL_CLEAR_TITLE, ALL_CLEAR_MESSAGE));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Frequency;
    use crate::notify::testing::RecordingSink;
    use crate::repeat::ResetOutcome;
    use crate::state::tests::{at, fixture_at, fixture_with_sink, new_task};
    use crate::storage::DataFile;

    fn settings(poll: u64, notify_when_clear: bool) -> Settings {
        Settings {
            alarm_poll_secs: poll,
            notify_when_clear,
        }
    }

    #[test]
    fn notification_text() {
        assert_eq!(
            alarm_notification(3, true),
            Some(Notification::new("Alarm Alert", "You have 3 unfinished tasks!"))
        );
        assert_eq!(
            alarm_notification(0, true),
            Some(Notification::new("All done", "No unfinished tasks for today."))
        );
        assert_eq!(alarm_notification(0, false), None);
    }

    #[test]
    fn poll_period_stays_within_a_minute() {
        assert_eq!(poll_period(&settings(0, true)), Duration::from_secs(1));
        assert_eq!(poll_period(&settings(20, true)), Duration::from_secs(20));
        assert_eq!(poll_period(&settings(3600, true)), Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn long_poll_setting_still_hits_every_minute() {
        let fx = fixture_at(at(2024, 5, 15, 9, 0));
        fx.state.add_alarm("09:01").unwrap();

        let handle = start_scheduler(fx.state.clone(), &settings(600, true));
        tokio::time::sleep(Duration::from_secs(1)).await;
        fx.clock.set(at(2024, 5, 15, 9, 1));
        tokio::time::sleep(Duration::from_secs(60)).await;
        handle.stop().await;

        assert_eq!(fx.sink.attempts(), 1);
    }

    #[test]
    fn failing_reset_is_retried_until_the_file_is_fixed() {
        let fx = fixture_at(at(2024, 5, 15, 9, 0));
        std::fs::write(fx.dir.path().join("tasks.json"), "{{{").unwrap();
        let mut tracker = TickTracker::default();

        on_tick(&fx.state, &mut tracker, true);
        on_tick(&fx.state, &mut tracker, true);
        assert!(tracker.reset_failing);
        assert_eq!(tracker.reset_day, None);

        fx.state.acknowledge_corrupt(DataFile::Tasks).unwrap();
        on_tick(&fx.state, &mut tracker, true);
        assert!(!tracker.reset_failing);
        assert_eq!(tracker.reset_day, Some(at(2024, 5, 15, 0, 0).date()));
    }

    #[tokio::test(start_paused = true)]
    async fn alarm_fires_once_per_minute_with_unfinished_count() {
        let fx = fixture_at(at(2024, 5, 15, 9, 0));
        fx.state.add_task(new_task("a", "5/15/24", Frequency::OneTime)).unwrap();
        fx.state.add_task(new_task("b", "5/15/24", Frequency::OneTime)).unwrap();
        let done = fx.state.add_task(new_task("c", "5/15/24", Frequency::OneTime)).unwrap();
        fx.state.add_task(new_task("d", "5/16/24", Frequency::OneTime)).unwrap();
        fx.state.complete_task(done.id).unwrap();
        fx.state.add_alarm("09:00").unwrap();

        let handle = start_scheduler(fx.state.clone(), &settings(20, true));
        // Ticks at 0s, 20s and 40s all land in 09:00.
        tokio::time::sleep(Duration::from_secs(50)).await;
        handle.stop().await;

        assert_eq!(
            fx.sink.delivered(),
            vec![Notification::new("Alarm Alert", "You have 2 unfinished tasks!")]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn no_alarm_means_no_notification() {
        let fx = fixture_at(at(2024, 5, 15, 9, 0));
        fx.state.add_task(new_task("a", "5/15/24", Frequency::OneTime)).unwrap();
        fx.state.add_alarm("10:00").unwrap();

        let handle = start_scheduler(fx.state.clone(), &settings(60, true));
        tokio::time::sleep(Duration::from_secs(130)).await;
        handle.stop().await;

        assert_eq!(fx.sink.attempts(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn clear_day_respects_setting() {
        let fx = fixture_at(at(2024, 5, 15, 9, 0));
        fx.state.add_alarm("09:00").unwrap();

        let handle = start_scheduler(fx.state.clone(), &settings(60, true));
        tokio::time::sleep(Duration::from_secs(1)).await;
        handle.stop().await;
        assert_eq!(
            fx.sink.delivered(),
            vec![Notification::new(ALL_CLEAR_TITLE, ALL_CLEAR_MESSAGE)]
        );

        let quiet = fixture_at(at(2024, 5, 15, 9, 0));
        quiet.state.add_alarm("09:00").unwrap();
        let handle = start_scheduler(quiet.state.clone(), &settings(60, false));
        tokio::time::sleep(Duration::from_secs(1)).await;
        handle.stop().await;
        assert_eq!(quiet.sink.attempts(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn failing_sink_does_not_stop_the_loop() {
        let fx = fixture_with_sink(at(2024, 5, 15, 9, 0), RecordingSink::failing("no display"));
        fx.state.add_alarm("09:00").unwrap();
        fx.state.add_alarm("09:01").unwrap();

        let handle = start_scheduler(fx.state.clone(), &settings(20, true));
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(fx.sink.attempts(), 1);

        fx.clock.set(at(2024, 5, 15, 9, 1));
        tokio::time::sleep(Duration::from_secs(60)).await;
        handle.stop().await;

        assert_eq!(fx.sink.attempts(), 2);
        assert!(fx.sink.delivered().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn new_day_triggers_reset() {
        let fx = fixture_at(at(2024, 5, 15, 23, 59));
        let task = fx.state.add_task(new_task("a", "5/15/24", Frequency::Daily)).unwrap();
        fx.state.run_daily_reset().unwrap();
        fx.state.complete_task(task.id).unwrap();

        let handle = start_scheduler(fx.state.clone(), &settings(60, true));
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(fx.state.tasks().unwrap()[0].complete);

        fx.clock.set(at(2024, 5, 16, 0, 0));
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(!fx.state.tasks().unwrap()[0].complete);
        assert_eq!(fx.state.run_daily_reset().unwrap(), ResetOutcome::Skipped);

        handle.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn stopped_scheduler_does_no_more_work() {
        let fx = fixture_at(at(2024, 5, 15, 9, 0));
        fx.state.add_alarm("09:05").unwrap();

        let handle = start_scheduler(fx.state.clone(), &settings(60, true));
        tokio::time::sleep(Duration::from_secs(1)).await;
        handle.stop().await;

        fx.clock.set(at(2024, 5, 15, 9, 5));
        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(fx.sink.attempts(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_handle_stops_the_loop() {
        let fx = fixture_at(at(2024, 5, 15, 9, 0));
        fx.state.add_alarm("09:05").unwrap();

        let handle = start_scheduler(fx.state.clone(), &settings(60, true));
        tokio::time::sleep(Duration::from_secs(1)).await;
        drop(handle);
        tokio::time::sleep(Duration::from_secs(1)).await;

        fx.clock.set(at(2024, 5, 15, 9, 5));
        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(fx.sink.attempts(), 0);
    }
}
