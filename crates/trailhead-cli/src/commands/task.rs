//! Task snapshot commands for CLI.
//!
//! Trailhead does not author tasks. `import` replaces the snapshot with a
//! JSON array of task records exported from the planner. Records that
//! cannot be read are skipped and reported.

use chrono::Utc;
use clap::Subcommand;
use serde::Serialize;
use std::path::PathBuf;
use trailhead_core::journey::{DayResolution, JourneyInstance, TaskDayResolver};
use trailhead_core::storage::{Database, ProgressionStore, TaskSource};
use trailhead_core::error::Result;
use trailhead_core::task::parse_snapshot;
use trailhead_core::CompletionState;

#[derive(Subcommand)]
pub enum TaskAction {
    /// Replace the task snapshot with records from a JSON file
    Import {
        /// Path to a JSON array of task records ("-" for stdin)
        file: PathBuf,
    },
    /// List tasks with the journey day each resolves to
    List {
        /// Only tasks resolving to this day
        #[arg(long)]
        day: Option<u32>,
    },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TaskRow {
    id: String,
    title: String,
    completion_state: CompletionState,
    #[serde(flatten)]
    resolution: DayResolution,
}

pub fn run(action: TaskAction) -> Result<()> {
    let db = Database::open()?;

    match action {
        TaskAction::Import { file } => {
            let content = if file.as_os_str() == "-" {
                std::io::read_to_string(std::io::stdin())?
            } else {
                std::fs::read_to_string(&file)?
            };
            let snapshot = parse_snapshot(&content)?;
            db.replace_tasks(&snapshot.tasks)?;
            println!("Imported {} tasks", snapshot.tasks.len());
            if !snapshot.skipped.is_empty() {
                println!("Skipped {} malformed records", snapshot.skipped.len());
                for reason in &snapshot.skipped {
                    eprintln!("  {reason}");
                }
            }
        }
        TaskAction::List { day } => {
            let program_start = db
                .read_journey()?
                .map(|record| JourneyInstance::from_record(&record).program_start())
                .unwrap_or_else(Utc::now);
            let resolver = TaskDayResolver::new();
            let rows: Vec<TaskRow> = db
                .task_records()?
                .into_iter()
                .map(|task| {
                    let resolution = resolver.resolve_detailed(&task, program_start);
                    TaskRow {
                        id: task.id,
                        title: task.title,
                        completion_state: task.completion_state,
                        resolution,
                    }
                })
                .filter(|row| day.map_or(true, |d| row.resolution.day == d))
                .collect();
            println!("{}", serde_json::to_string_pretty(&rows)?);
        }
    }
    Ok(())
}
