//! Entry points for UI collaborators. Every call returns a [`CommandResult`]
//! so a frontend can render failures without matching on error types.

use std::path::PathBuf;

use chrono::NaiveDate;

use crate::calendar::parse_task_date;
use crate::models::{CompleteOutcome, DisplayEntry, NewTask, Task, TaskEdit, TaskId};
use crate::state::{AppState, StateError};
use crate::storage::DataFile;

#[derive(Debug, serde::Serialize)]
pub struct CommandResult<T> {
    pub ok: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct CompleteReport {
    pub task: TaskId,
    pub already_complete: bool,
    pub message: String,
}

fn ok<T>(data: T) -> CommandResult<T> {
    CommandResult {
        ok: true,
        data: Some(data),
        error: None,
    }
}

fn err<T>(message: &str) -> CommandResult<T> {
    CommandResult {
        ok: false,
        data: None,
        error: Some(message.to_string()),
    }
}

fn from_result<T>(result: Result<T, StateError>) -> CommandResult<T> {
    match result {
        Ok(data) => ok(data),
        Err(error) => {
            log::warn!("command failed: {error}");
            err(&error.to_string())
        }
    }
}

pub fn load_tasks(state: &AppState) -> CommandResult<Vec<Task>> {
    from_result(state.tasks())
}

/// `date` is a task-format date string, as the calendar widget hands it over.
pub fn tasks_for_date(state: &AppState, date: &str) -> CommandResult<Vec<DisplayEntry>> {
    match parse_task_date(date) {
        Some(day) => tasks_for_day(state, day),
        None => err(&format!("invalid date: {date:?}")),
    }
}

pub fn tasks_for_day(state: &AppState, day: NaiveDate) -> CommandResult<Vec<DisplayEntry>> {
    from_result(state.tasks_for_date(day))
}

pub fn tasks_for_today(state: &AppState) -> CommandResult<Vec<DisplayEntry>> {
    tasks_for_day(state, state.clock().today())
}

pub fn create_task(state: &AppState, task: NewTask) -> CommandResult<Task> {
    from_result(state.add_task(task))
}

pub fn complete_task(state: &AppState, task_id: TaskId) -> CommandResult<CompleteReport> {
    from_result(state.complete_task(task_id).map(report))
}

pub fn update_task(state: &AppState, task_id: TaskId, edit: TaskEdit) -> CommandResult<Task> {
    from_result(state.edit_task(task_id, edit))
}

pub fn delete_task(state: &AppState, task_id: TaskId) -> CommandResult<Task> {
    from_result(state.delete_task(task_id))
}

pub fn list_alarms(state: &AppState) -> CommandResult<Vec<String>> {
    from_result(state.alarms())
}

pub fn add_alarm(state: &AppState, time: &str) -> CommandResult<bool> {
    from_result(state.add_alarm(time))
}

pub fn delete_alarm(state: &AppState, position: usize) -> CommandResult<Option<String>> {
    from_result(state.delete_alarm(position))
}

pub fn acknowledge_corrupt(state: &AppState, file: DataFile) -> CommandResult<Option<PathBuf>> {
    from_result(state.acknowledge_corrupt(file))
}

fn report(outcome: CompleteOutcome) -> CompleteReport {
    let already_complete = matches!(outcome, CompleteOutcome::AlreadyComplete(_));
    let message = if already_complete {
        "Task was already complete."
    } else {
        "Task marked as complete."
    };
    CompleteReport {
        task: outcome.task().id,
        already_complete,
        message: message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::models::Frequency;
    use crate::state::tests::{at, fixture_at, new_task};

    #[test]
    fn ok_and_err_helpers_construct_expected_shape() {
        let r = ok(123);
        assert!(r.ok);
        assert_eq!(r.data, Some(123));
        assert_eq!(r.error, None);

        let r: CommandResult<i32> = err("nope");
        assert!(!r.ok);
        assert_eq!(r.data, None);
        assert_eq!(r.error.as_deref(), Some("nope"));
    }

    #[test]
    fn create_list_complete_flow() {
        let fx = fixture_at(at(2024, 5, 15, 8, 0));
        let created = create_task(&fx.state, new_task("a", "5/15/24", Frequency::Daily));
        assert!(created.ok);
        let id = created.data.unwrap().id;

        let listed = tasks_for_date(&fx.state, "05/15/2024");
        assert_eq!(listed.data.unwrap().len(), 1);
        assert_eq!(tasks_for_today(&fx.state).data.unwrap()[0].id, id);

        let first = complete_task(&fx.state, id).data.unwrap();
        assert!(!first.already_complete);
        let second = complete_task(&fx.state, id);
        assert!(second.ok);
        assert!(second.data.unwrap().already_complete);

        assert!(tasks_for_today(&fx.state).data.unwrap().is_empty());
        assert_eq!(load_tasks(&fx.state).data.unwrap().len(), 1);
    }

    #[test]
    fn failures_become_error_strings() {
        let fx = fixture_at(at(2024, 5, 15, 8, 0));
        let r = complete_task(&fx.state, 42);
        assert!(!r.ok);
        assert_eq!(r.error.as_deref(), Some("task not found: 42"));

        let r = tasks_for_date(&fx.state, "tomorrow");
        assert_eq!(r.error.as_deref(), Some("invalid date: \"tomorrow\""));

        let r = add_alarm(&fx.state, "99:99");
        assert!(!r.ok);
        assert!(r.error.unwrap().contains("invalid alarm time"));
    }

    #[test]
    fn update_delete_and_alarms_round_trip() {
        let fx = fixture_at(at(2024, 5, 15, 8, 0));
        let id = create_task(&fx.state, new_task("a", "5/15/24", Frequency::OneTime))
            .data
            .unwrap()
            .id;
        let edit = TaskEdit {
            name: "b".to_string(),
            description: String::new(),
            date: "5/16/24".to_string(),
            time: "10:00".to_string(),
            frequency: Frequency::Weekly,
        };
        assert_eq!(update_task(&fx.state, id, edit).data.unwrap().name, "b");
        assert!(delete_task(&fx.state, id).ok);
        assert!(!delete_task(&fx.state, id).ok);

        assert_eq!(add_alarm(&fx.state, "7:30").data, Some(true));
        assert_eq!(add_alarm(&fx.state, "07:30").data, Some(false));
        assert_eq!(list_alarms(&fx.state).data.unwrap(), vec!["07:30"]);
        assert_eq!(delete_alarm(&fx.state, 0).data, Some(Some("07:30".to_string())));
    }

    #[test]
    fn corrupt_alarms_file_needs_acknowledgement() {
        let fx = fixture_at(at(2024, 5, 15, 8, 0));
        fs::write(fx.dir.path().join("alarms.json"), "alarms: 9").unwrap();

        let r = add_alarm(&fx.state, "09:00");
        assert!(!r.ok);
        assert!(r.error.unwrap().contains("corrupt data file"));

        let acked = acknowledge_corrupt(&fx.state, DataFile::Alarms);
        assert!(acked.data.unwrap().is_some());
        assert_eq!(add_alarm(&fx.state, "09:00").data, Some(true));
    }
}
