use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::journey::{NewJourneySignal, ValidationCheck};

/// Every observable change to a journey produces an Event.
/// Renderers consume them read-only; nothing in the engine reacts to them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum JourneyEvent {
    JourneyStarted {
        journey_id: Uuid,
        at: DateTime<Utc>,
    },
    DayAdvanced {
        from_day: u32,
        to_day: u32,
        at: DateTime<Utc>,
    },
    /// The current day moved into a different stage.
    StageEntered {
        stage_id: u32,
        stage_name: String,
        milestone: bool,
        at: DateTime<Utc>,
    },
    StateRepaired {
        check: ValidationCheck,
        from_day: u32,
        to_day: u32,
        reason: String,
        at: DateTime<Utc>,
    },
    /// The previous instance was superseded by a fresh journey.
    JourneyReset {
        previous_journey_id: Uuid,
        journey_id: Uuid,
        signal: NewJourneySignal,
        at: DateTime<Utc>,
    },
    /// The store rejected the write; the committed state stays visible.
    PersistDeferred {
        reason: String,
        at: DateTime<Utc>,
    },
}
