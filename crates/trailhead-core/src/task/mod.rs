//! Task records as read from the external task source.
//!
//! Trailhead never creates or edits tasks; it only reads their completion
//! state and the scattered hints (raw day tags, scheduled dates, goal
//! titles) that place them on the journey calendar.

use chrono::{DateTime, Utc};
use serde::de::IgnoredAny;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::warn;

use crate::error::{Result, ValidationError};

/// Completion state of a task.
///
/// Deserialization is lenient: the aliases accepted by [`FromStr`] and JSON
/// booleans are understood, and anything else reads as `Pending`.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum CompletionState {
    /// Not done yet (initial state)
    #[default]
    Pending,
    /// Done
    Completed,
    /// Explicitly deferred by the user; counts as handled for gating
    Postponed,
}

impl CompletionState {
    /// Whether this task no longer blocks its day from being complete.
    pub fn is_settled(&self) -> bool {
        matches!(self, CompletionState::Completed | CompletionState::Postponed)
    }
}

impl fmt::Display for CompletionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CompletionState::Pending => "pending",
            CompletionState::Completed => "completed",
            CompletionState::Postponed => "postponed",
        };
        f.write_str(s)
    }
}

impl FromStr for CompletionState {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" | "incomplete" => Ok(CompletionState::Pending),
            "completed" | "complete" | "done" => Ok(CompletionState::Completed),
            "postponed" | "deferred" => Ok(CompletionState::Postponed),
            other => Err(ValidationError::InvalidValue {
                field: "completion_state".to_string(),
                message: format!("unknown completion state '{other}'"),
            }),
        }
    }
}

impl<'de> Deserialize<'de> for CompletionState {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Wire {
            Text(String),
            Flag(bool),
            Other(IgnoredAny),
        }

        let state = match Wire::deserialize(deserializer)? {
            Wire::Text(text) => text.parse().unwrap_or_else(|err: ValidationError| {
                warn!(%err, "treating completion state as pending");
                CompletionState::Pending
            }),
            Wire::Flag(true) => CompletionState::Completed,
            Wire::Flag(false) => CompletionState::Pending,
            Wire::Other(_) => {
                warn!("completion state is neither text nor bool, treating as pending");
                CompletionState::Pending
            }
        };
        Ok(state)
    }
}

/// The day tag attached to a task by whichever path created it.
///
/// Plan generators emit integers, older caches emit numeric strings and
/// weekly goal plans emit weekday tokens such as `"Wed"`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum RawDay {
    Number(i64),
    Text(String),
    /// Any other JSON shape (floats, bools, objects). Integral floats still
    /// resolve; the rest fall through to the later resolution rules.
    Unsupported(serde_json::Value),
}

impl From<i64> for RawDay {
    fn from(n: i64) -> Self {
        RawDay::Number(n)
    }
}

impl From<&str> for RawDay {
    fn from(s: &str) -> Self {
        RawDay::Text(s.to_string())
    }
}

/// Immutable snapshot of a task for one resolution pass.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TaskRecord {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub completion_state: CompletionState,
    #[serde(default)]
    pub raw_day: Option<RawDay>,
    #[serde(default)]
    pub scheduled_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub goal_title: Option<String>,
    /// Week offset supplied by the task source (0 = first week).
    #[serde(default)]
    pub week_offset_hint: Option<u32>,
}

impl TaskRecord {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: None,
            completion_state: CompletionState::Pending,
            raw_day: None,
            scheduled_date: None,
            goal_title: None,
            week_offset_hint: None,
        }
    }

    pub fn with_day(mut self, raw_day: impl Into<RawDay>) -> Self {
        self.raw_day = Some(raw_day.into());
        self
    }

    pub fn with_state(mut self, state: CompletionState) -> Self {
        self.completion_state = state;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_scheduled_date(mut self, at: DateTime<Utc>) -> Self {
        self.scheduled_date = Some(at);
        self
    }

    pub fn with_goal_title(mut self, goal_title: impl Into<String>) -> Self {
        self.goal_title = Some(goal_title.into());
        self
    }

    pub fn with_week_offset_hint(mut self, offset: u32) -> Self {
        self.week_offset_hint = Some(offset);
        self
    }

    pub fn is_settled(&self) -> bool {
        self.completion_state.is_settled()
    }
}

/// Task records parsed from a JSON array, minus the entries that could not
/// be read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskSnapshot {
    pub tasks: Vec<TaskRecord>,
    /// One message per dropped entry
    pub skipped: Vec<String>,
}

/// Parse a task snapshot. Only a document that is not a JSON array is an
/// error; individual malformed entries are logged and skipped.
///
/// # Errors
/// Returns [`CoreError::Json`](crate::CoreError::Json) if `json` is not an array.
pub fn parse_snapshot(json: &str) -> Result<TaskSnapshot> {
    let entries: Vec<serde_json::Value> = serde_json::from_str(json)?;
    let mut snapshot = TaskSnapshot::default();
    for (index, entry) in entries.into_iter().enumerate() {
        match serde_json::from_value::<TaskRecord>(entry) {
            Ok(task) => snapshot.tasks.push(task),
            Err(err) => {
                warn!(index, %err, "skipping malformed task record");
                snapshot.skipped.push(format!("entry {index}: {err}"));
            }
        }
    }
    Ok(snapshot)
}

/// A task placed on an absolute journey day.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedTask {
    #[serde(flatten)]
    pub task: TaskRecord,
    /// Absolute journey day, always >= 1
    pub journey_day: u32,
}

impl ResolvedTask {
    pub fn new(task: TaskRecord, journey_day: u32) -> Self {
        Self {
            task,
            journey_day: journey_day.max(1),
        }
    }

    pub fn is_settled(&self) -> bool {
        self.task.is_settled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settled_states() {
        assert!(!CompletionState::Pending.is_settled());
        assert!(CompletionState::Completed.is_settled());
        assert!(CompletionState::Postponed.is_settled());
    }

    #[test]
    fn completion_state_parses_aliases() {
        assert_eq!("done".parse::<CompletionState>().unwrap(), CompletionState::Completed);
        assert_eq!(" Postponed ".parse::<CompletionState>().unwrap(), CompletionState::Postponed);
        assert!("maybe".parse::<CompletionState>().is_err());
    }

    #[test]
    fn raw_day_accepts_numbers_and_strings() {
        let json = r#"[
            {"id": "a", "title": "Walk", "rawDay": 3, "completionState": "completed"},
            {"id": "b", "title": "Read", "rawDay": "Wed"},
            {"id": "c", "title": "Plan"}
        ]"#;
        let tasks: Vec<TaskRecord> = serde_json::from_str(json).unwrap();
        assert_eq!(tasks[0].raw_day, Some(RawDay::Number(3)));
        assert_eq!(tasks[0].completion_state, CompletionState::Completed);
        assert_eq!(tasks[1].raw_day, Some(RawDay::Text("Wed".to_string())));
        assert_eq!(tasks[2].raw_day, None);
        assert_eq!(tasks[2].completion_state, CompletionState::Pending);
    }

    #[test]
    fn completion_state_deserializes_leniently() {
        let json = r#"[
            {"id": "a", "title": "a", "completionState": "done"},
            {"id": "b", "title": "b", "completionState": "Deferred"},
            {"id": "c", "title": "c", "completionState": "incomplete"},
            {"id": "d", "title": "d", "completionState": true},
            {"id": "e", "title": "e", "completionState": "half-done"},
            {"id": "f", "title": "f", "completionState": 7}
        ]"#;
        let states: Vec<CompletionState> = serde_json::from_str::<Vec<TaskRecord>>(json)
            .unwrap()
            .into_iter()
            .map(|t| t.completion_state)
            .collect();
        assert_eq!(
            states,
            vec![
                CompletionState::Completed,
                CompletionState::Postponed,
                CompletionState::Pending,
                CompletionState::Completed,
                CompletionState::Pending,
                CompletionState::Pending,
            ]
        );
        // Serialization stays canonical
        let json = serde_json::to_string(&CompletionState::Completed).unwrap();
        assert_eq!(json, r#""completed""#);
    }

    #[test]
    fn raw_day_keeps_unexpected_shapes() {
        let json = r#"[
            {"id": "a", "title": "a", "rawDay": 2.0},
            {"id": "b", "title": "b", "rawDay": false}
        ]"#;
        let tasks: Vec<TaskRecord> = serde_json::from_str(json).unwrap();
        assert_eq!(tasks[0].raw_day, Some(RawDay::Unsupported(serde_json::json!(2.0))));
        assert_eq!(tasks[1].raw_day, Some(RawDay::Unsupported(serde_json::json!(false))));
    }

    #[test]
    fn snapshot_skips_unreadable_entries() {
        let json = r#"[
            {"id": "a", "title": "Walk", "completionState": "done", "rawDay": 2.0},
            {"id": "b"},
            {"id": "c", "title": "Read", "scheduledDate": "not a date"},
            {"id": "d", "title": "Plan", "rawDay": "Wed"}
        ]"#;
        let snapshot = parse_snapshot(json).unwrap();
        let ids: Vec<&str> = snapshot.tasks.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "d"]);
        assert_eq!(snapshot.skipped.len(), 2);
        assert!(snapshot.skipped[0].starts_with("entry 1:"));
    }

    #[test]
    fn snapshot_must_be_an_array() {
        assert!(parse_snapshot(r#"{"id": "a"}"#).is_err());
        assert!(parse_snapshot("[]").unwrap().tasks.is_empty());
    }

    #[test]
    fn resolved_task_never_sits_on_day_zero() {
        let resolved = ResolvedTask::new(TaskRecord::new("t", "x"), 0);
        assert_eq!(resolved.journey_day, 1);
    }

    #[test]
    fn resolved_task_flattens_record_fields() {
        let resolved = ResolvedTask::new(TaskRecord::new("t", "x").with_day(2_i64), 2);
        let json = serde_json::to_value(&resolved).unwrap();
        assert_eq!(json["id"], "t");
        assert_eq!(json["journeyDay"], 2);
    }
}
