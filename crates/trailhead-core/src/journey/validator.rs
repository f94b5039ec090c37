//! Ordered consistency repairs for a candidate progression state.
//!
//! Checks run in a fixed order and each sees the output of the previous
//! one:
//!
//! 1. new-journey override (stops the pass)
//! 2. day-1 completeness
//! 3. sequential completeness
//! 4. boundary clamp
//! 5. stage alignment (warning only)
//!
//! Validation never fails. Every violation is repaired and recorded as a
//! [`RepairLog`]; a state that already satisfies every check comes back
//! unchanged with no repairs.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::classifier::{JourneyContext, NewJourneyClassifier, NewJourneySignal};
use super::progression::{tally_by_day, Progression, ProgressionState};
use super::stage::JourneyProgram;
use crate::task::ResolvedTask;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationCheck {
    NewJourneyOverride,
    DayOneCompleteness,
    SequentialCompleteness,
    BoundaryClamp,
    StageAlignment,
    /// Persisted day ahead of the day recomputed from tasks
    StoredDayDrift,
}

/// One applied repair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepairLog {
    pub check: ValidationCheck,
    pub before: Progression,
    pub after: Progression,
    pub reason: String,
}

/// A problem with the program model rather than the user's progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageWarning {
    pub check: ValidationCheck,
    pub day: u32,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationOutcome {
    pub state: ProgressionState,
    pub repairs: Vec<RepairLog>,
    pub warnings: Vec<StageWarning>,
    /// Set when the classifier fired, even if the state was already fresh
    pub new_journey: Option<NewJourneySignal>,
}

impl ValidationOutcome {
    pub fn is_clean(&self) -> bool {
        self.repairs.is_empty()
    }

    pub fn is_new_journey(&self) -> bool {
        self.new_journey.is_some()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConsistencyValidator {
    classifier: NewJourneyClassifier,
}

impl ConsistencyValidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_classifier(classifier: NewJourneyClassifier) -> Self {
        Self { classifier }
    }

    pub fn classifier(&self) -> &NewJourneyClassifier {
        &self.classifier
    }

    pub fn validate(
        &self,
        state: ProgressionState,
        tasks: &[ResolvedTask],
        program: &JourneyProgram,
        context: &JourneyContext,
    ) -> ValidationOutcome {
        let mut pass = Pass::new(state.progression());

        if let Some(signal) = self.classifier.classify(context) {
            pass.apply(
                ValidationCheck::NewJourneyOverride,
                Progression::START,
                format!("new journey: {}", signal.description()),
            );
            return pass.finish(state, context, Some(signal));
        }

        let tallies = tally_by_day(tasks);

        if let Some(day_one) = tallies.get(&1) {
            if !day_one.is_complete() && pass.current.current_day > 1 {
                let reason = format!(
                    "day 1 has {} of {} tasks settled",
                    day_one.settled, day_one.total
                );
                pass.apply(
                    ValidationCheck::DayOneCompleteness,
                    Progression {
                        current_day: 1,
                        ..pass.current
                    },
                    reason,
                );
            }
        }

        if pass.current.current_day > 1 {
            let open_day = tallies
                .range(1..pass.current.current_day)
                .find(|(_, tally)| !tally.is_complete())
                .map(|(day, tally)| (*day, *tally));
            if let Some((day, tally)) = open_day {
                pass.apply(
                    ValidationCheck::SequentialCompleteness,
                    Progression {
                        current_day: day,
                        ..pass.current
                    },
                    format!(
                        "day {day} has {} of {} tasks settled",
                        tally.settled, tally.total
                    ),
                );
            }
        }

        let clamped = program.clamp_day(pass.current.current_day as i64);
        if clamped != pass.current.current_day {
            let reason = format!(
                "day {} is outside 1..={}",
                pass.current.current_day,
                program.total_days()
            );
            pass.apply(
                ValidationCheck::BoundaryClamp,
                Progression {
                    current_day: clamped,
                    ..pass.current
                },
                reason,
            );
        }

        let day = pass.current.current_day;
        if program.stage_containing(day).is_none() {
            let message = format!("day {day} does not belong to any stage");
            warn!(day, "{message}");
            pass.warnings.push(StageWarning {
                check: ValidationCheck::StageAlignment,
                day,
                message,
            });
        }

        pass.finish(state, context, None)
    }
}

/// Validate with the default classifier.
pub fn validate(
    state: ProgressionState,
    tasks: &[ResolvedTask],
    program: &JourneyProgram,
    context: &JourneyContext,
) -> ValidationOutcome {
    ConsistencyValidator::new().validate(state, tasks, program, context)
}

struct Pass {
    current: Progression,
    repairs: Vec<RepairLog>,
    warnings: Vec<StageWarning>,
}

impl Pass {
    fn new(current: Progression) -> Self {
        Self {
            current,
            repairs: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Records a repair only when it changes something.
    fn apply(&mut self, check: ValidationCheck, after: Progression, reason: String) {
        if after == self.current {
            return;
        }
        info!(
            ?check,
            from_day = self.current.current_day,
            to_day = after.current_day,
            %reason,
            "repaired progression state"
        );
        self.repairs.push(RepairLog {
            check,
            before: self.current,
            after,
            reason,
        });
        self.current = after;
    }

    fn finish(
        self,
        original: ProgressionState,
        context: &JourneyContext,
        new_journey: Option<NewJourneySignal>,
    ) -> ValidationOutcome {
        let state = if self.repairs.is_empty() {
            original
        } else {
            ProgressionState::from_progression(self.current, context.now)
        };
        ValidationOutcome {
            state,
            repairs: self.repairs,
            warnings: self.warnings,
            new_journey,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::journey::stage::Stage;
    use crate::task::{CompletionState, TaskRecord};
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap()
    }

    fn ctx() -> JourneyContext {
        JourneyContext::established(now(), now() - Duration::days(10))
    }

    fn state(day: u32, streak: u32, xp: u32) -> ProgressionState {
        ProgressionState {
            current_day: day,
            streak,
            xp,
            last_updated: now() - Duration::hours(1),
        }
    }

    fn task(id: &str, day: u32, state: CompletionState) -> ResolvedTask {
        ResolvedTask::new(TaskRecord::new(id, id).with_state(state), day)
    }

    #[test]
    fn new_journey_forces_fresh_state() {
        let outcome = validate(state(9, 8, 200), &[], &JourneyProgram::standard(), &JourneyContext::new(now()));
        assert_eq!(outcome.state.progression(), Progression::START);
        assert_eq!(outcome.repairs.len(), 1);
        assert_eq!(outcome.repairs[0].check, ValidationCheck::NewJourneyOverride);
        assert_eq!(outcome.new_journey, Some(NewJourneySignal::NoPersistedData));
        assert_eq!(outcome.state.last_updated, now());
    }

    #[test]
    fn new_journey_on_fresh_state_logs_nothing() {
        let fresh = ProgressionState::fresh(now());
        let outcome = validate(fresh, &[], &JourneyProgram::standard(), &JourneyContext::new(now()));
        assert!(outcome.is_clean());
        assert!(outcome.is_new_journey());
    }

    #[test]
    fn open_day_one_pulls_back_to_day_one() {
        let tasks = vec![
            task("a", 1, CompletionState::Completed),
            task("b", 1, CompletionState::Pending),
        ];
        let outcome = validate(state(5, 0, 0), &tasks, &JourneyProgram::standard(), &ctx());
        assert_eq!(outcome.state.current_day, 1);
        assert_eq!(outcome.repairs.len(), 1);
        assert_eq!(outcome.repairs[0].check, ValidationCheck::DayOneCompleteness);
        assert_eq!(outcome.repairs[0].before.current_day, 5);
        assert_eq!(outcome.repairs[0].after.current_day, 1);
    }

    #[test]
    fn first_open_day_truncates_progress() {
        let tasks = vec![
            task("a", 1, CompletionState::Completed),
            task("b", 2, CompletionState::Postponed),
            task("c", 4, CompletionState::Pending),
            task("d", 6, CompletionState::Pending),
        ];
        let outcome = validate(state(9, 3, 30), &tasks, &JourneyProgram::standard(), &ctx());
        assert_eq!(outcome.state.current_day, 4);
        assert_eq!(outcome.repairs[0].check, ValidationCheck::SequentialCompleteness);
        // Counters are not rolled back by gating repairs
        assert_eq!(outcome.state.streak, 3);
        assert_eq!(outcome.state.xp, 30);
    }

    #[test]
    fn open_task_on_current_day_is_fine() {
        let tasks = vec![
            task("a", 1, CompletionState::Completed),
            task("b", 2, CompletionState::Pending),
        ];
        let input = state(2, 1, 10);
        let outcome = validate(input, &tasks, &JourneyProgram::standard(), &ctx());
        assert!(outcome.is_clean());
        assert_eq!(outcome.state, input);
    }

    #[test]
    fn out_of_range_days_are_clamped() {
        let outcome = validate(state(40, 21, 700), &[], &JourneyProgram::standard(), &ctx());
        assert_eq!(outcome.state.current_day, 21);
        assert_eq!(outcome.repairs[0].check, ValidationCheck::BoundaryClamp);

        let outcome = validate(state(0, 0, 0), &[], &JourneyProgram::standard(), &ctx());
        assert_eq!(outcome.state.current_day, 1);
    }

    #[test]
    fn stage_gap_only_warns() {
        let program = JourneyProgram::new(
            6,
            vec![
                Stage::new(1, "A", &[1, 2], None, false),
                Stage::new(2, "B", &[5, 6], None, true),
            ],
        )
        .unwrap();
        let input = state(3, 2, 20);
        let outcome = validate(input, &[], &program, &ctx());
        assert!(outcome.is_clean());
        assert_eq!(outcome.state, input);
        assert_eq!(outcome.warnings.len(), 1);
        assert_eq!(outcome.warnings[0].day, 3);
    }

    #[test]
    fn second_pass_is_a_no_op() {
        let tasks = vec![
            task("a", 1, CompletionState::Completed),
            task("b", 3, CompletionState::Pending),
        ];
        let program = JourneyProgram::standard();
        let first = validate(state(30, 5, 50), &tasks, &program, &ctx());
        assert!(!first.is_clean());
        let second = validate(first.state, &tasks, &program, &ctx());
        assert!(second.is_clean());
        assert_eq!(second.state, first.state);
    }

    #[test]
    fn repairs_chain_in_order() {
        // Day 1 open and day far out of range: day-1 check fires first and
        // leaves nothing for later checks.
        let tasks = vec![task("a", 1, CompletionState::Pending)];
        let outcome = validate(state(99, 0, 0), &tasks, &JourneyProgram::standard(), &ctx());
        assert_eq!(outcome.repairs.len(), 1);
        assert_eq!(outcome.repairs[0].check, ValidationCheck::DayOneCompleteness);
        assert_eq!(outcome.state.current_day, 1);
    }
}
