//! Static structure of the 21-day program.
//!
//! The program is six stages of work days, each closed by an optional
//! reflection day. Stages 2, 4 and 6 are milestones and award bonus XP
//! once fully completed.

use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

use crate::error::ValidationError;

/// Length of the standard journey in days.
pub const TOTAL_DAYS: u32 = 21;

static STANDARD_PROGRAM: LazyLock<JourneyProgram> = LazyLock::new(JourneyProgram::standard);

/// A block of work days plus an optional reflection day.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Stage {
    pub id: u32,
    pub name: String,
    pub work_days: Vec<u32>,
    pub reflection_day: Option<u32>,
    pub milestone: bool,
}

impl Stage {
    pub fn new(
        id: u32,
        name: &str,
        work_days: &[u32],
        reflection_day: Option<u32>,
        milestone: bool,
    ) -> Self {
        Self {
            id,
            name: name.to_string(),
            work_days: work_days.to_vec(),
            reflection_day,
            milestone,
        }
    }

    /// Whether `day` is one of this stage's work days or its reflection day.
    pub fn contains(&self, day: u32) -> bool {
        self.work_days.contains(&day) || self.reflection_day == Some(day)
    }

    pub fn is_reflection_day(&self, day: u32) -> bool {
        self.reflection_day == Some(day)
    }

    /// `[min(work_days), reflection_day or max(work_days)]`.
    pub fn boundaries(&self) -> (u32, u32) {
        let first = self.work_days.iter().copied().min().unwrap_or(1);
        let last = self
            .reflection_day
            .unwrap_or_else(|| self.work_days.iter().copied().max().unwrap_or(first));
        (first, last)
    }

    /// Every day of the stage in ascending order, reflection day included.
    pub fn days(&self) -> Vec<u32> {
        let mut days = self.work_days.clone();
        days.extend(self.reflection_day);
        days.sort_unstable();
        days
    }
}

/// Immutable definition of a journey: its length and ordered stages.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct JourneyProgram {
    total_days: u32,
    stages: Vec<Stage>,
}

impl JourneyProgram {
    /// The standard six-stage, 21-day program.
    pub fn standard() -> Self {
        Self {
            total_days: TOTAL_DAYS,
            stages: vec![
                Stage::new(1, "Foundation", &[1, 2, 3], Some(4), false),
                Stage::new(2, "Momentum", &[5, 6, 7], Some(8), true),
                Stage::new(3, "Deepening", &[9, 10, 11], Some(12), false),
                Stage::new(4, "Resilience", &[13, 14, 15], Some(16), true),
                Stage::new(5, "Integration", &[17, 18, 19], Some(20), false),
                Stage::new(6, "Arrival", &[21], None, true),
            ],
        }
    }

    /// Build a custom program.
    ///
    /// # Errors
    /// Returns an error if there are no stages, a stage has no work days,
    /// a day falls outside `1..=total_days`, or two stages claim the same day.
    pub fn new(total_days: u32, stages: Vec<Stage>) -> Result<Self, ValidationError> {
        if stages.is_empty() {
            return Err(ValidationError::EmptyCollection("stages".to_string()));
        }
        if total_days == 0 {
            return Err(ValidationError::InvalidValue {
                field: "total_days".to_string(),
                message: "must be at least 1".to_string(),
            });
        }

        let mut owner: Vec<Option<u32>> = vec![None; total_days as usize + 1];
        for stage in &stages {
            if stage.work_days.is_empty() {
                return Err(ValidationError::EmptyCollection(format!(
                    "work days of stage {}",
                    stage.id
                )));
            }
            for day in stage.days() {
                if day == 0 || day > total_days {
                    return Err(ValidationError::InvalidValue {
                        field: format!("stage {} day", stage.id),
                        message: format!("{day} is outside 1..={total_days}"),
                    });
                }
                if let Some(first) = owner[day as usize] {
                    return Err(ValidationError::OverlappingStages {
                        day,
                        first,
                        second: stage.id,
                    });
                }
                owner[day as usize] = Some(stage.id);
            }
        }

        Ok(Self { total_days, stages })
    }

    pub fn total_days(&self) -> u32 {
        self.total_days
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// Stage owning `day`, or `None` if no stage claims it.
    pub fn stage_containing(&self, day: u32) -> Option<&Stage> {
        self.stages.iter().find(|s| s.contains(day))
    }

    /// Stage owning `day`, falling back to the first stage.
    ///
    /// Callers are expected to clamp `day` first; an unmatched day is not an
    /// error.
    pub fn stage_for_day(&self, day: u32) -> &Stage {
        self.stage_containing(day).unwrap_or(&self.stages[0])
    }

    pub fn stage_boundaries(&self, stage: &Stage) -> (u32, u32) {
        stage.boundaries()
    }

    pub fn milestone_stages(&self) -> impl Iterator<Item = &Stage> {
        self.stages.iter().filter(|s| s.milestone)
    }

    /// Clamp a day into `1..=total_days`.
    pub fn clamp_day(&self, day: i64) -> u32 {
        day.clamp(1, self.total_days as i64) as u32
    }
}

impl Default for JourneyProgram {
    fn default() -> Self {
        Self::standard()
    }
}

/// The shared standard program.
pub fn standard_program() -> &'static JourneyProgram {
    &STANDARD_PROGRAM
}

/// Stage of the standard program owning `day`.
pub fn stage_for_day(day: u32) -> &'static Stage {
    STANDARD_PROGRAM.stage_for_day(day)
}
