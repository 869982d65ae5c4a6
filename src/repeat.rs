use chrono::{Datelike, NaiveDate};

use crate::models::{Frequency, Task};

const WEEKLY_SPAN_DAYS: i64 = 7;

/// What a reset pass did to the task collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetOutcome {
    /// The checkpoint already equals today.
    Skipped,
    /// No recurrence rule applied; nothing was written.
    Unchanged,
    /// At least one rule applied and the collection plus checkpoint were saved.
    /// `cleared` counts tasks whose flag actually went from complete to pending.
    Applied { matched: usize, cleared: usize },
}

/// Whether a task with this frequency recurs between `last_reset` and `today`.
///
/// Monthly compares month numbers only, so a December checkpoint never resets
/// in January and the day of month is ignored.
pub fn recurs(frequency: Frequency, last_reset: NaiveDate, today: NaiveDate) -> bool {
    match frequency {
        Frequency::OneTime => false,
        Frequency::Daily => true,
        Frequency::Weekly => days_between(last_reset, today) >= WEEKLY_SPAN_DAYS,
        Frequency::Monthly => last_reset.month() < today.month(),
    }
}

/// Clears `complete` on every task whose rule applies. A rule counts as applied
/// even when the flag was already false.
pub fn apply_reset(tasks: &mut [Task], last_reset: NaiveDate, today: NaiveDate) -> ResetOutcome {
    if last_reset == today {
        return ResetOutcome::Skipped;
    }
    let mut matched = 0;
    let mut cleared = 0;
    for task in tasks.iter_mut() {
        if !recurs(task.frequency, last_reset, today) {
            continue;
        }
        matched += 1;
        if task.complete {
            cleared += 1;
        }
        task.complete = false;
    }
    if matched == 0 {
        ResetOutcome::Unchanged
    } else {
        ResetOutcome::Applied { matched, cleared }
    }
}

fn days_between(from: NaiveDate, to: NaiveDate) -> i64 {
    to.signed_duration_since(from).num_days()
}
