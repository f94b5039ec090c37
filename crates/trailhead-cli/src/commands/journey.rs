//! Journey commands: start, sync, status and stage lookup.

use chrono::Utc;
use clap::Subcommand;
use serde_json::json;
use tracing::debug;
use trailhead_core::journey::{JourneyInstance, JourneyView, SessionSignals, TaskDayResolver};
use trailhead_core::storage::{Database, ProgressionStore, TaskSource};
use trailhead_core::error::Result;
use trailhead_core::{standard_program, Config, CoreError, JourneyTracker, ValidationError};

#[derive(Subcommand)]
pub enum JourneyAction {
    /// Start a new journey at day 1, replacing the current one
    Start,
    /// Recompute progression from the task snapshot and persist it
    Sync {
        /// Treat this session as the one that generated the plan
        #[arg(long)]
        fresh: bool,
    },
    /// Show the last committed journey without recomputing
    Status,
    /// Show the stage a day belongs to
    Stage {
        /// Journey day (1-21)
        day: u32,
    },
}

pub fn run(action: JourneyAction) -> Result<()> {
    match action {
        JourneyAction::Start => {
            let mut tracker = tracker(Database::open()?)?;
            let outcome = tracker.start(Utc::now())?;
            let view = JourneyView::build(&outcome.instance, tracker.program());
            println!("Journey started: {}", outcome.instance.journey_id);
            println!("{}", serde_json::to_string_pretty(&view)?);
        }
        JourneyAction::Sync { fresh } => {
            let db = Database::open()?;
            let interaction_count = db.record_interaction()?;
            debug!(interaction_count, fresh, "syncing journey");
            let mut tracker = tracker(db)?;
            let signals = SessionSignals {
                freshly_created: fresh,
                interaction_count: Some(interaction_count),
            };
            let outcome = tracker.sync(signals, Utc::now())?;
            let view = JourneyView::build(&outcome.instance, tracker.program());
            let report = json!({
                "journey": view,
                "computed": outcome.computed,
                "repairs": outcome.repairs,
                "warnings": outcome.warnings,
                "newJourney": outcome.new_journey,
                "events": outcome.events,
                "persisted": outcome.persisted,
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        JourneyAction::Status => {
            let db = Database::open()?;
            let record = db
                .read_journey()?
                .ok_or_else(|| {
                    CoreError::Custom("no journey yet; run `trailhead-cli journey start`".into())
                })?;
            let mut instance = JourneyInstance::from_record(&record);
            instance.tasks =
                TaskDayResolver::new().resolve_all(&db.task_records()?, instance.program_start());
            let view = JourneyView::build(&instance, standard_program());
            println!("{}", serde_json::to_string_pretty(&view)?);
        }
        JourneyAction::Stage { day } => {
            let program = standard_program();
            if !(1..=program.total_days()).contains(&day) {
                return Err(ValidationError::InvalidValue {
                    field: "day".into(),
                    message: format!("must be between 1 and {}", program.total_days()),
                }
                .into());
            }
            let stage = program.stage_for_day(day);
            let (start, end) = program.stage_boundaries(stage);
            let info = json!({
                "day": day,
                "stage": stage,
                "start": start,
                "end": end,
                "isReflectionDay": stage.is_reflection_day(day),
            });
            println!("{}", serde_json::to_string_pretty(&info)?);
        }
    }
    Ok(())
}

fn tracker(db: Database) -> Result<JourneyTracker<Database>> {
    let config = Config::load()?;
    Ok(JourneyTracker::new(db)
        .with_calculator(config.calculator())
        .with_validator(config.validator()))
}
