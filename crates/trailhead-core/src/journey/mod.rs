//! The 21-day journey progression engine.
//!
//! Everything here except [`JourneyTracker`] is a pure function of its
//! inputs and safe to re-run on every load.

pub mod classifier;
pub mod progression;
pub mod resolver;
pub mod stage;
pub mod tracker;
pub mod validator;
pub mod view;

pub use classifier::{
    is_new_journey, ClassifierConfig, JourneyContext, NewJourneyClassifier, NewJourneySignal,
};
pub use progression::{
    compute_progression, tally_by_day, DayTally, Progression, ProgressionCalculator,
    ProgressionReport, ProgressionState, XpRules,
};
pub use resolver::{resolve_day, DayResolution, ResolutionRule, TaskDayResolver, WeekOffsetSource};
pub use stage::{stage_for_day, standard_program, JourneyProgram, Stage, TOTAL_DAYS};
pub use tracker::{JourneyInstance, JourneyTracker, SessionSignals, SyncOutcome};
pub use validator::{
    validate, ConsistencyValidator, RepairLog, StageWarning, ValidationCheck, ValidationOutcome,
};
pub use view::{DayBreakdown, JourneyView};
