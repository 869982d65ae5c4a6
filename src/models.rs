use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub type TaskId = u64;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum Importance {
    Low,
    #[default]
    Normal,
    Important,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum Frequency {
    #[default]
    #[serde(rename = "One-time")]
    OneTime,
    Daily,
    Weekly,
    Monthly,
}

/// One stored task. Field names match the on-disk layout, including the
/// capitalized `Complete`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    /// Zero means "not yet assigned" (records written before ids existed).
    #[serde(default)]
    pub id: TaskId,
    pub name: String,
    pub description: String,
    pub importance: Importance,
    pub date: String,
    pub time: String,
    pub frequency: Frequency,
    #[serde(rename = "Complete")]
    pub complete: bool,
}

/// Input for creating a task. `date` and `time` are stored verbatim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTask {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub importance: Importance,
    pub date: String,
    pub time: String,
    #[serde(default)]
    pub frequency: Frequency,
}

impl NewTask {
    pub fn into_task(self, id: TaskId) -> Task {
        Task {
            id,
            name: self.name,
            description: self.description,
            importance: self.importance,
            date: self.date,
            time: self.time,
            frequency: self.frequency,
            complete: false,
        }
    }
}

/// Fields an edit overwrites. Importance and completion are left alone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskEdit {
    pub name: String,
    pub description: String,
    pub date: String,
    pub time: String,
    pub frequency: Frequency,
}

impl TaskEdit {
    pub fn apply(self, task: &mut Task) {
        task.name = self.name;
        task.description = self.description;
        task.date = self.date;
        task.time = self.time;
        task.frequency = self.frequency;
    }
}

/// A row of the date-filtered view: where it sits on screen and where it sits in the store.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DisplayEntry {
    pub display_index: usize,
    pub store_index: usize,
    pub id: TaskId,
    pub task: Task,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CompleteOutcome {
    Completed(Task),
    AlreadyComplete(Task),
}

impl CompleteOutcome {
    pub fn task(&self) -> &Task {
        match self {
            CompleteOutcome::Completed(task) | CompleteOutcome::AlreadyComplete(task) => task,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct AlarmsFile {
    #[serde(default)]
    pub alarms: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct CheckpointFile {
    /// `YYYY-MM-DD`; absent or unreadable means "never reset".
    #[serde(default)]
    pub last_update: Option<String>,
}

impl CheckpointFile {
    pub const DATE_FORMAT: &'static str = "%Y-%m-%d";

    pub fn for_date(date: NaiveDate) -> Self {
        Self {
            last_update: Some(date.format(Self::DATE_FORMAT).to_string()),
        }
    }

    pub fn last_reset(&self) -> NaiveDate {
        self.last_update
            .as_deref()
            .and_then(|raw| NaiveDate::parse_from_str(raw.trim(), Self::DATE_FORMAT).ok())
            .unwrap_or(NaiveDate::MIN)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Settings {
    #[serde(default = "default_alarm_poll_secs")]
    pub alarm_poll_secs: u64,
    #[serde(default = "default_notify_when_clear")]
    pub notify_when_clear: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            alarm_poll_secs: default_alarm_poll_secs(),
            notify_when_clear: default_notify_when_clear(),
        }
    }
}

fn default_alarm_poll_secs() -> u64 {
    60
}

fn default_notify_when_clear() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_serialization_keeps_legacy_field_names() {
        let task = NewTask {
            name: "Pay bills".to_string(),
            description: "electricity".to_string(),
            importance: Importance::Important,
            date: "5/15/24".to_string(),
            time: "09:00".to_string(),
            frequency: Frequency::OneTime,
        }
        .into_task(3);
        let value = serde_json::to_value(&task).expect("serialize task");
        assert_eq!(
            value,
            serde_json::json!({
              "id": 3,
              "name": "Pay bills",
              "description": "electricity",
              "importance": "Important",
              "date": "5/15/24",
              "time": "09:00",
              "frequency": "One-time",
              "Complete": false
            })
        );
    }

    #[test]
    fn task_id_defaults_to_zero_when_missing() {
        let json = r#"
        {
            "name": "Gym",
            "description": "",
            "importance": "Normal",
            "date": "5/16/24",
            "time": "7:30",
            "frequency": "Weekly",
            "Complete": true
        }
        "#;

        let task: Task = serde_json::from_str(json).expect("task should deserialize");
        assert_eq!(task.id, 0);
        assert_eq!(task.frequency, Frequency::Weekly);
        assert!(task.complete);
    }

    #[test]
    fn edit_leaves_importance_and_completion_alone() {
        let mut task = NewTask {
            name: "a".to_string(),
            description: "b".to_string(),
            importance: Importance::Low,
            date: "1/1/24".to_string(),
            time: "12:00".to_string(),
            frequency: Frequency::Daily,
        }
        .into_task(1);
        task.complete = true;

        TaskEdit {
            name: "renamed".to_string(),
            description: "".to_string(),
            date: "not a date".to_string(),
            time: "25:99".to_string(),
            frequency: Frequency::Monthly,
        }
        .apply(&mut task);

        assert_eq!(task.name, "renamed");
        assert_eq!(task.date, "not a date");
        assert_eq!(task.time, "25:99");
        assert_eq!(task.frequency, Frequency::Monthly);
        assert_eq!(task.importance, Importance::Low);
        assert!(task.complete);
    }

    #[test]
    fn checkpoint_falls_back_to_min_date() {
        assert_eq!(CheckpointFile::default().last_reset(), NaiveDate::MIN);
        let garbage = CheckpointFile {
            last_update: Some("yesterday".to_string()),
        };
        assert_eq!(garbage.last_reset(), NaiveDate::MIN);

        let day = NaiveDate::from_ymd_opt(2024, 5, 15).unwrap();
        let file = CheckpointFile::for_date(day);
        assert_eq!(file.last_update.as_deref(), Some("2024-05-15"));
        assert_eq!(file.last_reset(), day);
    }

    #[test]
    fn settings_serde_applies_defaults_for_missing_fields() {
        let settings: Settings = serde_json::from_str("{}").expect("settings should deserialize");
        assert_eq!(settings.alarm_poll_secs, 60);
        assert!(settings.notify_when_clear);

        let settings: Settings =
            serde_json::from_str(r#"{ "alarm_poll_secs": 15 }"#).expect("partial settings");
        assert_eq!(settings.alarm_poll_secs, 15);
        assert!(settings.notify_when_clear);
    }
}
