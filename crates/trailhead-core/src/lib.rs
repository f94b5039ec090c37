//! # Trailhead Core Library
//!
//! Core logic for Trailhead, a personal 21-day goal journey tracker. Like
//! the CLI built on top of it, the library follows a CLI-first philosophy:
//! every operation is a plain function or method, and any front end is a
//! thin layer over the same core.
//!
//! ## Architecture
//!
//! - **Journey engine**: resolves scattered task records onto journey days,
//!   derives the canonical day, streak and XP, and repairs drifted state
//! - **Storage**: SQLite journey/task storage and TOML-based configuration
//! - **Events**: observable changes for read-only renderers
//!
//! ## Key Components
//!
//! - [`TaskDayResolver`]: task record to journey day
//! - [`ProgressionCalculator`]: resolved tasks to `{currentDay, streak, xp}`
//! - [`NewJourneyClassifier`]: "must this restart at day 1?"
//! - [`ConsistencyValidator`]: ordered repairs of a candidate state
//! - [`JourneyTracker`]: the recompute-validate-commit loop over a store

pub mod error;
pub mod events;
pub mod journey;
pub mod storage;
pub mod task;

pub use error::{ConfigError, CoreError, DatabaseError, StoreError, ValidationError};
pub use events::JourneyEvent;
pub use journey::{
    compute_progression, is_new_journey, resolve_day, stage_for_day, standard_program, validate,
    ConsistencyValidator, JourneyContext, JourneyInstance, JourneyProgram, JourneyTracker,
    JourneyView, NewJourneyClassifier, Progression, ProgressionCalculator, ProgressionState,
    SessionSignals, Stage, SyncOutcome, TaskDayResolver,
};
pub use storage::{Config, Database, JourneyRecord, MemoryStore, ProgressionStore, TaskSource};
pub use task::{parse_snapshot, CompletionState, RawDay, ResolvedTask, TaskRecord, TaskSnapshot};
