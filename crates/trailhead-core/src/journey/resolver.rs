//! Task day resolution.
//!
//! Tasks reach the engine from several creation paths and each path tags
//! its day differently. The resolver places every task on an absolute
//! journey day by trying, in order:
//!
//! 1. an integer `rawDay`
//! 2. a numeric-string `rawDay`
//! 3. a weekday token (`"Mon"`..`"Sun"`) combined with a week offset
//! 4. a `"day N"` mention in the title or description
//! 5. the scheduled date relative to the program start
//! 6. day 1
//!
//! Resolution is total: malformed input lands on day 1 with a warning
//! instead of halting the pass.

use chrono::{DateTime, Utc, Weekday};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use tracing::{debug, warn};

use crate::task::{RawDay, ResolvedTask, TaskRecord};

const SECONDS_PER_DAY: i64 = 86_400;

static RE_WEEK_NUMBER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bweek\s*#?\s*(\d{1,3})\b").expect("week pattern is valid")
});

static RE_DAY_NUMBER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bday\s*#?\s*(\d{1,4})\b").expect("day pattern is valid")
});

/// Which rule placed a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionRule {
    RawInteger,
    NumericString,
    Weekday,
    DayPattern,
    ScheduledDate,
    Fallback,
}

/// Where a weekday task's week offset came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeekOffsetSource {
    /// `weekOffsetHint` on the task
    Hint,
    /// "Week N" in the goal title
    GoalTitle,
    /// Whole weeks between program start and the scheduled date
    ScheduledDate,
    Default,
}

/// Outcome of resolving one task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DayResolution {
    pub day: u32,
    pub rule: ResolutionRule,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub week_offset: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub week_offset_source: Option<WeekOffsetSource>,
}

impl DayResolution {
    fn by(rule: ResolutionRule, day: u32) -> Self {
        Self {
            day: day.max(1),
            rule,
            week_offset: None,
            week_offset_source: None,
        }
    }
}

/// Maps task records onto absolute journey days.
#[derive(Debug, Clone, Copy, Default)]
pub struct TaskDayResolver;

impl TaskDayResolver {
    pub fn new() -> Self {
        Self
    }

    /// Journey day for `task`, always >= 1.
    pub fn resolve(&self, task: &TaskRecord, program_start: DateTime<Utc>) -> u32 {
        self.resolve_detailed(task, program_start).day
    }

    /// Journey day for `task` together with the rule that produced it.
    pub fn resolve_detailed(&self, task: &TaskRecord, program_start: DateTime<Utc>) -> DayResolution {
        if let Some(raw) = &task.raw_day {
            match raw {
                RawDay::Number(n) => {
                    if let Some(day) = positive_day(*n) {
                        return DayResolution::by(ResolutionRule::RawInteger, day);
                    }
                    debug!(task_id = %task.id, raw_day = n, "ignoring non-positive raw day");
                }
                RawDay::Text(text) => {
                    let text = text.trim();
                    if let Ok(n) = text.parse::<i64>() {
                        if let Some(day) = positive_day(n) {
                            return DayResolution::by(ResolutionRule::NumericString, day);
                        }
                        debug!(task_id = %task.id, raw_day = text, "ignoring non-positive raw day");
                    } else if let Some(weekday) = parse_weekday(text) {
                        return self.resolve_weekday(task, weekday, program_start);
                    }
                }
                RawDay::Unsupported(value) => match integral(value) {
                    Some(n) => {
                        if let Some(day) = positive_day(n) {
                            return DayResolution::by(ResolutionRule::RawInteger, day);
                        }
                        debug!(task_id = %task.id, raw_day = n, "ignoring non-positive raw day");
                    }
                    None => {
                        warn!(task_id = %task.id, raw_day = %value, "ignoring unsupported raw day");
                    }
                },
            }
        }

        if let Some(day) = day_mention(task) {
            return DayResolution::by(ResolutionRule::DayPattern, day);
        }

        if let Some(scheduled) = task.scheduled_date {
            let elapsed = whole_days_between(program_start, scheduled);
            let day = (elapsed + 1).max(1);
            return DayResolution::by(ResolutionRule::ScheduledDate, clamp_u32(day));
        }

        warn!(
            task_id = %task.id,
            title = %task.title,
            "could not resolve journey day, defaulting to day 1"
        );
        DayResolution::by(ResolutionRule::Fallback, 1)
    }

    /// Resolve every task of a snapshot.
    pub fn resolve_all(&self, tasks: &[TaskRecord], program_start: DateTime<Utc>) -> Vec<ResolvedTask> {
        tasks
            .iter()
            .map(|task| ResolvedTask::new(task.clone(), self.resolve(task, program_start)))
            .collect()
    }

    fn resolve_weekday(
        &self,
        task: &TaskRecord,
        weekday: Weekday,
        program_start: DateTime<Utc>,
    ) -> DayResolution {
        let (offset, source) = week_offset(task, program_start);
        let day = offset.saturating_mul(7).saturating_add(weekday.number_from_monday());
        DayResolution {
            day,
            rule: ResolutionRule::Weekday,
            week_offset: Some(offset),
            week_offset_source: Some(source),
        }
    }
}

/// Resolve a single task with the default resolver.
pub fn resolve_day(task: &TaskRecord, program_start: DateTime<Utc>) -> u32 {
    TaskDayResolver::new().resolve(task, program_start)
}

fn positive_day(n: i64) -> Option<u32> {
    if n >= 1 {
        u32::try_from(n).ok()
    } else {
        None
    }
}

fn clamp_u32(n: i64) -> u32 {
    u32::try_from(n.max(0)).unwrap_or(u32::MAX)
}

/// Accepts `Mon`/`Monday` in any case.
/// Whole-number JSON values such as `2.0`.
fn integral(value: &serde_json::Value) -> Option<i64> {
    if let Some(n) = value.as_i64() {
        return Some(n);
    }
    value
        .as_f64()
        .filter(|f| f.fract() == 0.0 && *f >= i64::MIN as f64 && *f < i64::MAX as f64)
        .map(|f| f as i64)
}

fn parse_weekday(text: &str) -> Option<Weekday> {
    text.parse::<Weekday>().ok()
}

/// Floor of the day difference, negative when `at` precedes `start`.
fn whole_days_between(start: DateTime<Utc>, at: DateTime<Utc>) -> i64 {
    at.signed_duration_since(start)
        .num_seconds()
        .div_euclid(SECONDS_PER_DAY)
}

fn week_offset(task: &TaskRecord, program_start: DateTime<Utc>) -> (u32, WeekOffsetSource) {
    if let Some(hint) = task.week_offset_hint {
        return (hint, WeekOffsetSource::Hint);
    }

    if let Some(week) = task
        .goal_title
        .as_deref()
        .and_then(|title| RE_WEEK_NUMBER.captures(title))
        .and_then(|caps| caps[1].parse::<u32>().ok())
    {
        // "Week 1" is the first week
        return (week.saturating_sub(1), WeekOffsetSource::GoalTitle);
    }

    if let Some(scheduled) = task.scheduled_date {
        let weeks = whole_days_between(program_start, scheduled).div_euclid(7);
        return (clamp_u32(weeks), WeekOffsetSource::ScheduledDate);
    }

    (0, WeekOffsetSource::Default)
}

fn day_mention(task: &TaskRecord) -> Option<u32> {
    std::iter::once(task.title.as_str())
        .chain(task.description.as_deref())
        .find_map(|text| {
            RE_DAY_NUMBER
                .captures(text)
                .and_then(|caps| caps[1].parse::<i64>().ok())
                .and_then(positive_day)
        })
}
