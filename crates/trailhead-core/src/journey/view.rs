//! Read-only projection of a journey for renderers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::progression::tally_by_day;
use super::stage::JourneyProgram;
use super::tracker::JourneyInstance;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DayBreakdown {
    pub day: u32,
    pub total: u32,
    pub settled: u32,
    /// Settled share of the day's tasks, 0.0 to 1.0
    pub completion_rate: f64,
    pub complete: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JourneyView {
    pub journey_id: Uuid,
    pub current_day: u32,
    pub total_days: u32,
    pub streak: u32,
    pub xp: u32,
    pub stage_id: u32,
    pub stage_name: String,
    /// 1-based position of the current day inside its stage
    pub day_in_stage: u32,
    pub stage_start: u32,
    pub stage_end: u32,
    pub is_reflection_day: bool,
    pub is_milestone_stage: bool,
    pub days_remaining: u32,
    pub percent_complete: f64,
    pub finished: bool,
    pub last_updated: DateTime<Utc>,
    pub days: Vec<DayBreakdown>,
}

impl JourneyView {
    pub fn build(instance: &JourneyInstance, program: &JourneyProgram) -> Self {
        let state = instance.state;
        let day = program.clamp_day(state.current_day as i64);
        let stage = program.stage_for_day(day);
        let (stage_start, stage_end) = program.stage_boundaries(stage);
        let day_in_stage = stage
            .days()
            .iter()
            .position(|d| *d == day)
            .map_or(1, |i| i as u32 + 1);

        let tallies = tally_by_day(&instance.tasks);
        let finished =
            day == program.total_days() && tallies.get(&day).is_some_and(|t| t.is_complete());
        let days_done = if finished { day } else { day - 1 };
        let percent_complete =
            (days_done as f64 / program.total_days() as f64 * 1000.0).round() / 10.0;

        let days = tallies
            .iter()
            .map(|(day, tally)| DayBreakdown {
                day: *day,
                total: tally.total,
                settled: tally.settled,
                completion_rate: tally.completion_rate(),
                complete: tally.is_complete(),
            })
            .collect();

        Self {
            journey_id: instance.journey_id,
            current_day: day,
            total_days: program.total_days(),
            streak: state.streak,
            xp: state.xp,
            stage_id: stage.id,
            stage_name: stage.name.clone(),
            day_in_stage,
            stage_start,
            stage_end,
            is_reflection_day: stage.is_reflection_day(day),
            is_milestone_stage: stage.milestone,
            days_remaining: program.total_days() - days_done,
            percent_complete,
            finished,
            last_updated: state.last_updated,
            days,
        }
    }
}
