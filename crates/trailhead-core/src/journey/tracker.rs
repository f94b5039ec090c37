//! Journey instance lifecycle.
//!
//! [`JourneyTracker`] runs the full recomputation on every load:
//!
//! ```text
//! task source ─> resolver ─> calculator ─┐
//! stored record ──────────────> merge ───┴─> validator ─> commit
//! ```
//!
//! The committed write is the only side effect. When the store refuses the
//! write, the caller keeps seeing the last committed state and the computed
//! one waits in `pending` until [`JourneyTracker::flush`] or the next sync.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::classifier::{JourneyContext, NewJourneySignal};
use super::progression::{Progression, ProgressionCalculator, ProgressionState};
use super::resolver::TaskDayResolver;
use super::stage::JourneyProgram;
use super::validator::{ConsistencyValidator, RepairLog, StageWarning, ValidationCheck};
use crate::error::{Result, StoreError};
use crate::events::JourneyEvent;
use crate::storage::{JourneyRecord, ProgressionStore, TaskSource};
use crate::task::{ResolvedTask, TaskRecord};

/// A conflicting write is retried once against a fresh read.
const MAX_WRITE_ATTEMPTS: usize = 2;

/// One journey: its progression and the tasks that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JourneyInstance {
    pub journey_id: Uuid,
    /// Committed store version, `None` until the first write lands
    pub version: Option<u64>,
    pub started_at: Option<DateTime<Utc>>,
    pub plan_generated_at: Option<DateTime<Utc>>,
    pub state: ProgressionState,
    pub tasks: Vec<ResolvedTask>,
}

impl JourneyInstance {
    /// A freshly generated journey at `{1, 0, 0}`.
    pub fn generate(now: DateTime<Utc>) -> Self {
        Self {
            journey_id: Uuid::new_v4(),
            version: None,
            started_at: Some(now),
            plan_generated_at: Some(now),
            state: ProgressionState::fresh(now),
            tasks: Vec::new(),
        }
    }

    pub fn from_record(record: &JourneyRecord) -> Self {
        Self {
            journey_id: record.journey_id,
            version: Some(record.version),
            started_at: record.started_at,
            plan_generated_at: record.plan_generated_at,
            state: record.state,
            tasks: Vec::new(),
        }
    }

    pub fn record(&self) -> JourneyRecord {
        JourneyRecord {
            journey_id: self.journey_id,
            version: self.version.unwrap_or(0),
            started_at: self.started_at,
            plan_generated_at: self.plan_generated_at,
            state: self.state,
        }
    }

    /// Anchor for date-based day resolution.
    pub fn program_start(&self) -> DateTime<Utc> {
        self.started_at
            .or(self.plan_generated_at)
            .unwrap_or(self.state.last_updated)
    }

    /// A new journey replacing this one. Keeps the program calendar anchor
    /// and the version token so the write lands on the same slot.
    fn supersede(&self, state: ProgressionState, tasks: Vec<ResolvedTask>, now: DateTime<Utc>) -> Self {
        Self {
            journey_id: Uuid::new_v4(),
            version: self.version,
            started_at: Some(self.started_at.unwrap_or(now)),
            plan_generated_at: self.plan_generated_at,
            state,
            tasks,
        }
    }

    fn matches_record(&self, record: &JourneyRecord) -> bool {
        self.journey_id == record.journey_id
            && self.started_at == record.started_at
            && self.plan_generated_at == record.plan_generated_at
            && self.state == record.state
    }
}

/// Per-session facts supplied by the caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSignals {
    /// Plan generation just happened in this session
    pub freshly_created: bool,
    pub interaction_count: Option<u32>,
}

/// Result of one sync pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncOutcome {
    /// What the caller should show: the committed instance
    pub instance: JourneyInstance,
    pub computed: Progression,
    pub repairs: Vec<RepairLog>,
    pub warnings: Vec<StageWarning>,
    pub new_journey: Option<NewJourneySignal>,
    pub events: Vec<JourneyEvent>,
    pub persisted: bool,
}

struct SyncPlan {
    next: JourneyInstance,
    computed: Progression,
    repairs: Vec<RepairLog>,
    warnings: Vec<StageWarning>,
    new_journey: Option<NewJourneySignal>,
    events: Vec<JourneyEvent>,
    needs_write: bool,
}

impl SyncPlan {
    fn into_outcome(self) -> SyncOutcome {
        SyncOutcome {
            instance: self.next,
            computed: self.computed,
            repairs: self.repairs,
            warnings: self.warnings,
            new_journey: self.new_journey,
            events: self.events,
            persisted: true,
        }
    }
}

/// Orchestrates resolution, calculation, validation and persistence.
pub struct JourneyTracker<S> {
    store: S,
    program: JourneyProgram,
    resolver: TaskDayResolver,
    calculator: ProgressionCalculator,
    validator: ConsistencyValidator,
    committed: Option<JourneyInstance>,
    last_tasks: Option<Vec<TaskRecord>>,
    pending: Option<JourneyInstance>,
}

impl<S: ProgressionStore + TaskSource> JourneyTracker<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            program: JourneyProgram::standard(),
            resolver: TaskDayResolver::new(),
            calculator: ProgressionCalculator::new(),
            validator: ConsistencyValidator::new(),
            committed: None,
            last_tasks: None,
            pending: None,
        }
    }

    pub fn with_program(mut self, program: JourneyProgram) -> Self {
        self.program = program;
        self
    }

    pub fn with_calculator(mut self, calculator: ProgressionCalculator) -> Self {
        self.calculator = calculator;
        self
    }

    pub fn with_validator(mut self, validator: ConsistencyValidator) -> Self {
        self.validator = validator;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn program(&self) -> &JourneyProgram {
        &self.program
    }

    /// Last state known to be durably committed.
    pub fn committed(&self) -> Option<&JourneyInstance> {
        self.committed.as_ref()
    }

    /// Computed state still waiting for a successful write.
    pub fn pending(&self) -> Option<&JourneyInstance> {
        self.pending.as_ref()
    }

    /// Generate a new journey, replacing whatever was stored.
    ///
    /// # Errors
    /// Returns an error if the store cannot be read or written. Nothing is
    /// committed in that case.
    pub fn start(&mut self, now: DateTime<Utc>) -> Result<SyncOutcome> {
        let existing = self.store.read_journey()?;
        let mut instance = JourneyInstance::generate(now);
        let version = self
            .store
            .write_journey(&instance.record(), existing.as_ref().map(|r| r.version))?;
        instance.version = Some(version);
        self.store.set_creation_flag(true)?;

        info!(journey_id = %instance.journey_id, version, "journey started");
        self.committed = Some(instance.clone());
        self.pending = None;

        Ok(SyncOutcome {
            computed: instance.state.progression(),
            events: vec![JourneyEvent::JourneyStarted {
                journey_id: instance.journey_id,
                at: now,
            }],
            instance,
            repairs: Vec::new(),
            warnings: Vec::new(),
            new_journey: None,
            persisted: true,
        })
    }

    /// Recompute, validate and persist the journey.
    ///
    /// Store failures fall back to the last known good data. An error is
    /// only returned when there is nothing known to fall back to.
    pub fn sync(&mut self, signals: SessionSignals, now: DateTime<Utc>) -> Result<SyncOutcome> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let tasks = self.load_tasks()?;
            let stored = self.load_journey()?;
            let creation_flag = self.store.creation_flag().unwrap_or_else(|err| {
                warn!(%err, "could not read creation flag");
                false
            });

            let mut plan = self.plan(
                &tasks,
                stored.as_ref(),
                signals.freshly_created || creation_flag,
                signals.interaction_count,
                now,
            );

            match self.commit(&mut plan, stored.as_ref(), creation_flag) {
                Ok(()) => return Ok(plan.into_outcome()),
                Err(StoreError::Conflict { expected, found }) if attempt < MAX_WRITE_ATTEMPTS => {
                    warn!(?expected, ?found, "journey changed underneath us, recomputing");
                }
                Err(err) => return Ok(self.defer(plan, stored.as_ref(), err, now)),
            }
        }
    }

    /// Retry a write that failed during an earlier sync.
    ///
    /// Returns `Ok(false)` when nothing was pending.
    ///
    /// # Errors
    /// Returns the store error if the write fails again. A version conflict
    /// discards the pending state, since a fresh sync must recompute it.
    pub fn flush(&mut self) -> Result<bool> {
        let Some(mut pending) = self.pending.take() else {
            return Ok(false);
        };
        match self.store.write_journey(&pending.record(), pending.version) {
            Ok(version) => {
                pending.version = Some(version);
                info!(version, "pending journey state committed");
                self.committed = Some(pending);
                Ok(true)
            }
            Err(err @ StoreError::Conflict { .. }) => Err(err.into()),
            Err(err) => {
                self.pending = Some(pending);
                Err(err.into())
            }
        }
    }

    fn load_tasks(&mut self) -> Result<Vec<TaskRecord>> {
        match self.store.task_records() {
            Ok(tasks) => {
                self.last_tasks = Some(tasks.clone());
                Ok(tasks)
            }
            Err(err) => match &self.last_tasks {
                Some(tasks) => {
                    warn!(%err, "task source unavailable, using last snapshot");
                    Ok(tasks.clone())
                }
                None => Err(err.into()),
            },
        }
    }

    fn load_journey(&mut self) -> Result<Option<JourneyRecord>> {
        match self.store.read_journey() {
            Ok(record) => {
                if let Some(record) = &record {
                    // What the store returns is durable by definition
                    let mut known = JourneyInstance::from_record(record);
                    if let Some(committed) = &self.committed {
                        if committed.journey_id == known.journey_id {
                            known.tasks = committed.tasks.clone();
                        }
                    }
                    self.committed = Some(known);
                }
                Ok(record)
            }
            Err(err) => match &self.committed {
                Some(committed) => {
                    warn!(%err, "journey store unavailable, using last committed state");
                    Ok(Some(committed.record()))
                }
                None => Err(err.into()),
            },
        }
    }

    fn plan(
        &self,
        tasks: &[TaskRecord],
        stored: Option<&JourneyRecord>,
        freshly_created: bool,
        interaction_count: Option<u32>,
        now: DateTime<Utc>,
    ) -> SyncPlan {
        let base = stored
            .map(JourneyInstance::from_record)
            .unwrap_or_else(|| JourneyInstance::generate(now));

        let resolved = self.resolver.resolve_all(tasks, base.program_start());
        let computed = self.calculator.compute(&resolved, &self.program);
        let (candidate, drift) = merge(stored.map(|r| r.state), computed, now);

        let context = JourneyContext {
            has_persisted_tasks: !tasks.is_empty(),
            has_saved_snapshot: stored.is_some(),
            freshly_created,
            task_ids: tasks.iter().map(|t| t.id.clone()).collect(),
            journey_started_at: stored.and_then(|r| r.started_at),
            plan_generated_at: stored.and_then(|r| r.plan_generated_at),
            interaction_count,
            now,
        };

        let outcome = self
            .validator
            .validate(candidate, &resolved, &self.program, &context);
        debug!(
            computed_day = computed.current_day,
            candidate_day = candidate.current_day,
            final_day = outcome.state.current_day,
            repairs = outcome.repairs.len(),
            "journey validated"
        );

        let repairs: Vec<RepairLog> = drift.into_iter().chain(outcome.repairs).collect();
        let discarded_progress = repairs
            .iter()
            .any(|r| r.check == ValidationCheck::NewJourneyOverride);
        let superseding = discarded_progress && stored.is_some();

        let next = if superseding {
            base.supersede(outcome.state, resolved, now)
        } else {
            JourneyInstance {
                state: outcome.state,
                tasks: resolved,
                ..base.clone()
            }
        };

        let mut events = Vec::new();
        if stored.is_none() {
            events.push(JourneyEvent::JourneyStarted {
                journey_id: next.journey_id,
                at: now,
            });
        }
        for repair in &repairs {
            events.push(JourneyEvent::StateRepaired {
                check: repair.check,
                from_day: repair.before.current_day,
                to_day: repair.after.current_day,
                reason: repair.reason.clone(),
                at: now,
            });
        }
        if let (true, Some(signal)) = (superseding, outcome.new_journey) {
            events.push(JourneyEvent::JourneyReset {
                previous_journey_id: base.journey_id,
                journey_id: next.journey_id,
                signal,
                at: now,
            });
        }
        if let Some(prior) = stored {
            let from_day = prior.state.current_day;
            let to_day = next.state.current_day;
            if to_day > from_day {
                events.push(JourneyEvent::DayAdvanced { from_day, to_day, at: now });
            }
            let to_stage = self.program.stage_for_day(to_day);
            if to_day != from_day && self.program.stage_for_day(from_day).id != to_stage.id {
                events.push(JourneyEvent::StageEntered {
                    stage_id: to_stage.id,
                    stage_name: to_stage.name.clone(),
                    milestone: to_stage.milestone,
                    at: now,
                });
            }
        }

        SyncPlan {
            needs_write: stored.map_or(true, |r| !next.matches_record(r)),
            next,
            computed,
            repairs,
            warnings: outcome.warnings,
            new_journey: outcome.new_journey,
            events,
        }
    }

    fn commit(
        &mut self,
        plan: &mut SyncPlan,
        stored: Option<&JourneyRecord>,
        creation_flag: bool,
    ) -> Result<(), StoreError> {
        if plan.needs_write {
            let version = self
                .store
                .write_journey(&plan.next.record(), stored.map(|r| r.version))?;
            plan.next.version = Some(version);
            debug!(version, day = plan.next.state.current_day, "journey committed");
        }
        if creation_flag {
            if let Err(err) = self.store.set_creation_flag(false) {
                warn!(%err, "could not clear creation flag");
            }
        }
        self.committed = Some(plan.next.clone());
        self.pending = None;
        Ok(())
    }

    fn defer(
        &mut self,
        plan: SyncPlan,
        stored: Option<&JourneyRecord>,
        err: StoreError,
        now: DateTime<Utc>,
    ) -> SyncOutcome {
        warn!(%err, "could not persist journey, keeping last committed state");

        let visible = match stored {
            Some(record) => JourneyInstance {
                tasks: plan.next.tasks.clone(),
                ..JourneyInstance::from_record(record)
            },
            None => JourneyInstance {
                journey_id: plan.next.journey_id,
                tasks: plan.next.tasks.clone(),
                ..JourneyInstance::generate(now)
            },
        };
        self.pending = Some(plan.next);

        SyncOutcome {
            instance: visible,
            computed: plan.computed,
            repairs: plan.repairs,
            warnings: plan.warnings,
            new_journey: plan.new_journey,
            events: vec![JourneyEvent::PersistDeferred {
                reason: err.to_string(),
                at: now,
            }],
            persisted: false,
        }
    }
}

/// Candidate state: the day follows the recomputed frontier, while streak
/// and xp never drop below what was committed. A stored day ahead of the
/// frontier is drift and comes back as a repair.
fn merge(
    prior: Option<ProgressionState>,
    computed: Progression,
    now: DateTime<Utc>,
) -> (ProgressionState, Option<RepairLog>) {
    let Some(prior) = prior else {
        return (ProgressionState::from_progression(computed, now), None);
    };
    let merged = Progression {
        current_day: computed.current_day,
        streak: prior.streak.max(computed.streak),
        xp: prior.xp.max(computed.xp),
    };
    if merged == prior.progression() {
        return (prior, None);
    }

    let drift = (prior.current_day > computed.current_day).then(|| {
        let reason = format!(
            "stored day {} is ahead of the computed day {}",
            prior.current_day, computed.current_day
        );
        info!(
            from_day = prior.current_day,
            to_day = computed.current_day,
            %reason,
            "repaired progression state"
        );
        RepairLog {
            check: ValidationCheck::StoredDayDrift,
            before: prior.progression(),
            after: merged,
            reason,
        }
    });
    (ProgressionState::from_progression(merged, now), drift)
}
