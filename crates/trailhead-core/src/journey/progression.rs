//! Canonical progression derived from resolved tasks.
//!
//! The calculator scans the journey day by day. Days without tasks are
//! skipped, fully settled days extend the streak, and the first day with an
//! open task stops the scan: that is the day the user should be working on.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::stage::JourneyProgram;
use crate::task::ResolvedTask;

/// Day, streak and XP without a timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Progression {
    pub current_day: u32,
    pub streak: u32,
    pub xp: u32,
}

impl Progression {
    /// Day 1, no streak, no XP.
    pub const START: Progression = Progression {
        current_day: 1,
        streak: 0,
        xp: 0,
    };
}

impl Default for Progression {
    fn default() -> Self {
        Self::START
    }
}

/// Persisted progression of one journey.
///
/// Serialized as `{currentDay, streak, xp, lastUpdated}` with an RFC 3339
/// timestamp; the shape is stable across releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressionState {
    pub current_day: u32,
    pub streak: u32,
    pub xp: u32,
    pub last_updated: DateTime<Utc>,
}

impl ProgressionState {
    pub fn fresh(now: DateTime<Utc>) -> Self {
        Self::from_progression(Progression::START, now)
    }

    pub fn from_progression(progression: Progression, now: DateTime<Utc>) -> Self {
        Self {
            current_day: progression.current_day,
            streak: progression.streak,
            xp: progression.xp,
            last_updated: now,
        }
    }

    pub fn progression(&self) -> Progression {
        Progression {
            current_day: self.current_day,
            streak: self.streak,
            xp: self.xp,
        }
    }
}

/// XP awards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct XpRules {
    #[serde(default = "default_per_day")]
    pub per_day: u32,
    #[serde(default = "default_milestone_stage")]
    pub milestone_stage: u32,
    /// Awarded once 7 days are complete
    #[serde(default = "default_week_bonus")]
    pub week_one_bonus: u32,
    /// Awarded once 14 days are complete
    #[serde(default = "default_week_bonus")]
    pub week_two_bonus: u32,
    /// Awarded once all 21 days are complete
    #[serde(default = "default_completion_bonus")]
    pub completion_bonus: u32,
}

fn default_per_day() -> u32 {
    10
}
fn default_milestone_stage() -> u32 {
    100
}
fn default_week_bonus() -> u32 {
    50
}
fn default_completion_bonus() -> u32 {
    100
}

impl Default for XpRules {
    fn default() -> Self {
        Self {
            per_day: default_per_day(),
            milestone_stage: default_milestone_stage(),
            week_one_bonus: default_week_bonus(),
            week_two_bonus: default_week_bonus(),
            completion_bonus: default_completion_bonus(),
        }
    }
}

impl XpRules {
    pub fn award(&self, completed_days: u32, completed_milestones: u32) -> u32 {
        let mut xp = completed_days * self.per_day + completed_milestones * self.milestone_stage;
        if completed_days >= 7 {
            xp += self.week_one_bonus;
        }
        if completed_days >= 14 {
            xp += self.week_two_bonus;
        }
        if completed_days >= 21 {
            xp += self.completion_bonus;
        }
        xp
    }
}

/// Task counts for one journey day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DayTally {
    pub total: u32,
    pub settled: u32,
}

impl DayTally {
    pub fn is_complete(&self) -> bool {
        self.total > 0 && self.settled == self.total
    }

    pub fn completion_rate(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.settled as f64 / self.total as f64
    }
}

/// Group resolved tasks by journey day.
pub fn tally_by_day(tasks: &[ResolvedTask]) -> BTreeMap<u32, DayTally> {
    let mut tallies: BTreeMap<u32, DayTally> = BTreeMap::new();
    for task in tasks {
        let tally = tallies.entry(task.journey_day).or_default();
        tally.total += 1;
        if task.is_settled() {
            tally.settled += 1;
        }
    }
    tallies
}

/// Everything the scan learned, for callers that need more than the triple.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressionReport {
    pub progression: Progression,
    pub completed_days: u32,
    pub first_incomplete_day: Option<u32>,
    pub completed_milestones: Vec<u32>,
}

/// Pure calculator from resolved tasks to [`Progression`].
#[derive(Debug, Clone, Default)]
pub struct ProgressionCalculator {
    xp: XpRules,
}

impl ProgressionCalculator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_xp_rules(xp: XpRules) -> Self {
        Self { xp }
    }

    pub fn xp_rules(&self) -> &XpRules {
        &self.xp
    }

    pub fn compute(&self, tasks: &[ResolvedTask], program: &JourneyProgram) -> Progression {
        self.compute_detailed(tasks, program).progression
    }

    pub fn compute_detailed(&self, tasks: &[ResolvedTask], program: &JourneyProgram) -> ProgressionReport {
        let tallies = tally_by_day(tasks);

        let mut completed_days = 0u32;
        let mut consecutive_days = 0u32;
        let mut last_completed: Option<u32> = None;
        let mut first_incomplete: Option<u32> = None;

        for day in 1..=program.total_days() {
            let Some(tally) = tallies.get(&day) else {
                continue;
            };
            if tally.is_complete() {
                completed_days += 1;
                consecutive_days += 1;
                last_completed = Some(day);
            } else {
                first_incomplete = Some(day);
                break;
            }
        }

        // An empty day never carries the pointer past an open one; with no
        // open day the user is on the day after the last completed one.
        let frontier = match (first_incomplete, last_completed) {
            (Some(day), _) => day as i64,
            (None, Some(day)) => day as i64 + 1,
            (None, None) => 1,
        };
        let scan_limit = first_incomplete.unwrap_or(program.total_days() + 1);

        let completed_milestones: Vec<u32> = program
            .milestone_stages()
            .filter(|stage| {
                let days = stage.days();
                days.iter().all(|d| *d < scan_limit)
                    && days.iter().any(|d| tallies.get(d).is_some_and(DayTally::is_complete))
            })
            .map(|stage| stage.id)
            .collect();

        let xp = self
            .xp
            .award(completed_days, completed_milestones.len() as u32);

        ProgressionReport {
            progression: Progression {
                current_day: program.clamp_day(frontier),
                streak: consecutive_days,
                xp,
            },
            completed_days,
            first_incomplete_day: first_incomplete,
            completed_milestones,
        }
    }
}

/// Compute progression with the default XP rules.
pub fn compute_progression(tasks: &[ResolvedTask], program: &JourneyProgram) -> Progression {
    ProgressionCalculator::new().compute(tasks, program)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{CompletionState, TaskRecord};

    fn task(id: &str, day: u32, state: CompletionState) -> ResolvedTask {
        ResolvedTask::new(TaskRecord::new(id, id).with_state(state), day)
    }

    fn done(id: &str, day: u32) -> ResolvedTask {
        task(id, day, CompletionState::Completed)
    }

    fn open(id: &str, day: u32) -> ResolvedTask {
        task(id, day, CompletionState::Pending)
    }

    #[test]
    fn no_tasks_is_day_one() {
        let p = compute_progression(&[], &JourneyProgram::standard());
        assert_eq!(p, Progression::START);
    }

    #[test]
    fn completed_first_day_advances_to_day_two() {
        let tasks = vec![done("a", 1), done("b", 1), done("c", 1)];
        let p = compute_progression(&tasks, &JourneyProgram::standard());
        assert_eq!(p.current_day, 2);
        assert_eq!(p.streak, 1);
        assert_eq!(p.xp, 10);
    }

    #[test]
    fn postponed_counts_as_settled() {
        let tasks = vec![done("a", 1), task("b", 1, CompletionState::Postponed)];
        let p = compute_progression(&tasks, &JourneyProgram::standard());
        assert_eq!(p.current_day, 2);
    }

    #[test]
    fn first_open_day_stops_the_scan() {
        let tasks = vec![done("a", 1), done("b", 2), open("c", 3), done("d", 4)];
        let report = ProgressionCalculator::new().compute_detailed(&tasks, &JourneyProgram::standard());
        assert_eq!(report.progression.current_day, 3);
        assert_eq!(report.progression.streak, 2);
        assert_eq!(report.completed_days, 2);
        assert_eq!(report.first_incomplete_day, Some(3));
    }

    #[test]
    fn empty_days_are_skipped_not_blocking() {
        let tasks = vec![done("a", 1), open("b", 5)];
        let p = compute_progression(&tasks, &JourneyProgram::standard());
        assert_eq!(p.current_day, 5);
        assert_eq!(p.streak, 1);

        let tasks = vec![done("a", 1), done("b", 5)];
        let p = compute_progression(&tasks, &JourneyProgram::standard());
        assert_eq!(p.current_day, 6);
        assert_eq!(p.streak, 2);
    }

    #[test]
    fn partially_done_day_is_incomplete() {
        let tasks = vec![done("a", 1), open("b", 1)];
        let p = compute_progression(&tasks, &JourneyProgram::standard());
        assert_eq!(p, Progression::START);
    }

    #[test]
    fn full_journey_earns_every_bonus() {
        let tasks: Vec<ResolvedTask> = (1..=21).map(|d| done(&format!("t{d}"), d)).collect();
        let report = ProgressionCalculator::new().compute_detailed(&tasks, &JourneyProgram::standard());
        assert_eq!(report.progression.current_day, 21);
        assert_eq!(report.progression.streak, 21);
        assert_eq!(report.completed_milestones, vec![2, 4, 6]);
        // 21 days, three milestone stages, both weekly bonuses, completion bonus
        assert_eq!(report.progression.xp, 210 + 300 + 50 + 50 + 100);
    }

    #[test]
    fn milestone_stage_needs_every_day_behind_the_frontier() {
        // Stage 2 is days 5..=8; day 8 still open
        let tasks: Vec<ResolvedTask> = (1..=7)
            .map(|d| done(&format!("t{d}"), d))
            .chain(std::iter::once(open("r", 8)))
            .collect();
        let report = ProgressionCalculator::new().compute_detailed(&tasks, &JourneyProgram::standard());
        assert!(report.completed_milestones.is_empty());
        assert_eq!(report.progression.xp, 70 + 50);

        let tasks: Vec<ResolvedTask> = (1..=8).map(|d| done(&format!("t{d}"), d)).collect();
        let report = ProgressionCalculator::new().compute_detailed(&tasks, &JourneyProgram::standard());
        assert_eq!(report.completed_milestones, vec![2]);
        assert_eq!(report.progression.xp, 80 + 100 + 50);
    }

    #[test]
    fn milestone_without_any_tasks_is_not_earned() {
        let tasks = vec![done("a", 1)];
        let report = ProgressionCalculator::new().compute_detailed(&tasks, &JourneyProgram::standard());
        assert!(report.completed_milestones.is_empty());
    }

    #[test]
    fn days_beyond_the_program_are_ignored() {
        let tasks = vec![done("a", 1), open("b", 30)];
        let p = compute_progression(&tasks, &JourneyProgram::standard());
        assert_eq!(p.current_day, 2);
    }

    #[test]
    fn custom_xp_rules_apply() {
        let rules = XpRules {
            per_day: 1,
            ..XpRules::default()
        };
        let calc = ProgressionCalculator::with_xp_rules(rules);
        let p = calc.compute(&[done("a", 1)], &JourneyProgram::standard());
        assert_eq!(p.xp, 1);
    }

    #[test]
    fn state_serializes_with_stable_shape() {
        use chrono::TimeZone;
        let at = Utc.with_ymd_and_hms(2026, 3, 2, 8, 0, 0).unwrap();
        let state = ProgressionState::from_progression(
            Progression {
                current_day: 4,
                streak: 3,
                xp: 30,
            },
            at,
        );
        let json = serde_json::to_value(state).unwrap();
        assert_eq!(json["currentDay"], 4);
        assert_eq!(json["streak"], 3);
        assert_eq!(json["xp"], 30);
        assert_eq!(json["lastUpdated"], "2026-03-02T08:00:00Z");
    }
}
