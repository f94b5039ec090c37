//! Heuristic detection of brand-new journeys.
//!
//! Journey, task and profile data can each be created by a different path,
//! so no single field reliably says "this journey just started". The
//! classifier checks an ordered list of signals and the first one that fires
//! wins. When none fire the journey is treated as established, since a wrong
//! reset would throw away real progress.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const DEFAULT_FRESH_WINDOW_MINUTES: i64 = 60;
/// Longest fresh window accepted from configuration (one year).
pub const MAX_FRESH_WINDOW_MINUTES: i64 = 60 * 24 * 365;
pub const DEFAULT_NEW_USER_INTERACTION_THRESHOLD: u32 = 2;

/// Signals that mark a journey as new, in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NewJourneySignal {
    NoPersistedData,
    FreshlyCreated,
    SentinelTasks,
    MissingStartTimestamp,
    RecentPlanGeneration,
    RecentJourneyStart,
    NewUser,
    NoSavedSnapshot,
}

impl NewJourneySignal {
    pub fn description(&self) -> &'static str {
        match self {
            NewJourneySignal::NoPersistedData => "no persisted task or progression data",
            NewJourneySignal::FreshlyCreated => "journey was just generated",
            NewJourneySignal::SentinelTasks => "demo or placeholder tasks present",
            NewJourneySignal::MissingStartTimestamp => "no recorded journey start",
            NewJourneySignal::RecentPlanGeneration => "plan generated within the fresh window",
            NewJourneySignal::RecentJourneyStart => "journey started within the fresh window",
            NewJourneySignal::NewUser => "interaction count at or below new-user threshold",
            NewJourneySignal::NoSavedSnapshot => "no saved progression snapshot",
        }
    }
}

/// Facts the classifier looks at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JourneyContext {
    pub has_persisted_tasks: bool,
    pub has_saved_snapshot: bool,
    /// One-shot flag raised by plan generation
    pub freshly_created: bool,
    pub task_ids: Vec<String>,
    pub journey_started_at: Option<DateTime<Utc>>,
    pub plan_generated_at: Option<DateTime<Utc>>,
    /// `None` when the caller does not track interactions
    pub interaction_count: Option<u32>,
    pub now: DateTime<Utc>,
}

impl JourneyContext {
    /// Context with nothing persisted, nothing flagged.
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            has_persisted_tasks: false,
            has_saved_snapshot: false,
            freshly_created: false,
            task_ids: Vec::new(),
            journey_started_at: None,
            plan_generated_at: None,
            interaction_count: None,
            now,
        }
    }

    /// Context for a journey with saved state that started long ago.
    pub fn established(now: DateTime<Utc>, started_at: DateTime<Utc>) -> Self {
        Self {
            has_persisted_tasks: true,
            has_saved_snapshot: true,
            journey_started_at: Some(started_at),
            ..Self::new(now)
        }
    }
}

/// Classifier settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifierConfig {
    #[serde(default = "default_fresh_window_minutes")]
    pub fresh_window_minutes: i64,
    #[serde(default = "default_new_user_interaction_threshold")]
    pub new_user_interaction_threshold: u32,
    /// Task id prefixes used by demo and placeholder data
    #[serde(default = "default_sentinel_task_prefixes")]
    pub sentinel_task_prefixes: Vec<String>,
}

fn default_fresh_window_minutes() -> i64 {
    DEFAULT_FRESH_WINDOW_MINUTES
}
fn default_new_user_interaction_threshold() -> u32 {
    DEFAULT_NEW_USER_INTERACTION_THRESHOLD
}
fn default_sentinel_task_prefixes() -> Vec<String> {
    vec!["demo-".into(), "sample-".into(), "placeholder-".into()]
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            fresh_window_minutes: default_fresh_window_minutes(),
            new_user_interaction_threshold: default_new_user_interaction_threshold(),
            sentinel_task_prefixes: default_sentinel_task_prefixes(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct NewJourneyClassifier {
    config: ClassifierConfig,
}

impl NewJourneyClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: ClassifierConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    pub fn is_new(&self, context: &JourneyContext) -> bool {
        self.classify(context).is_some()
    }

    /// The first signal that fires, if any.
    pub fn classify(&self, context: &JourneyContext) -> Option<NewJourneySignal> {
        let signal = self.first_signal(context);
        if let Some(signal) = signal {
            debug!(?signal, reason = signal.description(), "journey classified as new");
        }
        signal
    }

    fn first_signal(&self, ctx: &JourneyContext) -> Option<NewJourneySignal> {
        if !ctx.has_persisted_tasks && !ctx.has_saved_snapshot {
            return Some(NewJourneySignal::NoPersistedData);
        }
        if ctx.freshly_created {
            return Some(NewJourneySignal::FreshlyCreated);
        }
        if ctx.task_ids.iter().any(|id| self.is_sentinel(id)) {
            return Some(NewJourneySignal::SentinelTasks);
        }
        let Some(started_at) = ctx.journey_started_at else {
            return Some(NewJourneySignal::MissingStartTimestamp);
        };
        if ctx
            .plan_generated_at
            .is_some_and(|at| self.within_fresh_window(at, ctx.now))
        {
            return Some(NewJourneySignal::RecentPlanGeneration);
        }
        if self.within_fresh_window(started_at, ctx.now) {
            return Some(NewJourneySignal::RecentJourneyStart);
        }
        if ctx
            .interaction_count
            .is_some_and(|count| count <= self.config.new_user_interaction_threshold)
        {
            return Some(NewJourneySignal::NewUser);
        }
        if !ctx.has_saved_snapshot {
            return Some(NewJourneySignal::NoSavedSnapshot);
        }
        None
    }

    /// Timestamps in the future count as recent. A window too large to
    /// represent covers everything.
    fn within_fresh_window(&self, at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        match Duration::try_minutes(self.config.fresh_window_minutes) {
            Some(window) => now.signed_duration_since(at) < window,
            None => true,
        }
    }

    fn is_sentinel(&self, id: &str) -> bool {
        let id = id.to_ascii_lowercase();
        self.config.sentinel_task_prefixes.iter().any(|prefix| {
            let prefix = prefix.to_ascii_lowercase();
            id.starts_with(&prefix) || id == prefix.trim_end_matches('-')
        })
    }
}

/// Classify with the default settings.
pub fn is_new_journey(context: &JourneyContext) -> bool {
    NewJourneyClassifier::new().is_new(context)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap()
    }

    fn established() -> JourneyContext {
        JourneyContext {
            task_ids: vec!["t1".into(), "t2".into()],
            interaction_count: Some(40),
            plan_generated_at: Some(now() - Duration::days(8)),
            ..JourneyContext::established(now(), now() - Duration::days(8))
        }
    }

    fn classify(ctx: &JourneyContext) -> Option<NewJourneySignal> {
        NewJourneyClassifier::new().classify(ctx)
    }

    #[test]
    fn established_journey_is_not_new() {
        assert_eq!(classify(&established()), None);
        assert!(!is_new_journey(&established()));
    }

    #[test]
    fn oversized_window_counts_everything_as_recent() {
        let classifier = NewJourneyClassifier::with_config(ClassifierConfig {
            fresh_window_minutes: 200_000_000_000_000,
            ..ClassifierConfig::default()
        });
        assert_eq!(
            classifier.classify(&established()),
            Some(NewJourneySignal::RecentPlanGeneration)
        );
    }

    #[test]
    fn empty_context_is_new() {
        assert_eq!(classify(&JourneyContext::new(now())), Some(NewJourneySignal::NoPersistedData));
    }

    #[test]
    fn freshly_created_flag_fires() {
        let ctx = JourneyContext {
            freshly_created: true,
            ..established()
        };
        assert_eq!(classify(&ctx), Some(NewJourneySignal::FreshlyCreated));
    }

    #[test]
    fn sentinel_ids_fire() {
        let ctx = JourneyContext {
            task_ids: vec!["t1".into(), "DEMO-7".into()],
            ..established()
        };
        assert_eq!(classify(&ctx), Some(NewJourneySignal::SentinelTasks));

        let ctx = JourneyContext {
            task_ids: vec!["sample".into()],
            ..established()
        };
        assert_eq!(classify(&ctx), Some(NewJourneySignal::SentinelTasks));
    }

    #[test]
    fn missing_start_fires() {
        let ctx = JourneyContext {
            journey_started_at: None,
            ..established()
        };
        assert_eq!(classify(&ctx), Some(NewJourneySignal::MissingStartTimestamp));
    }

    #[test]
    fn recent_plan_generation_fires() {
        let ctx = JourneyContext {
            plan_generated_at: Some(now() - Duration::minutes(59)),
            ..established()
        };
        assert_eq!(classify(&ctx), Some(NewJourneySignal::RecentPlanGeneration));

        let ctx = JourneyContext {
            plan_generated_at: Some(now() - Duration::minutes(60)),
            ..established()
        };
        assert_eq!(classify(&ctx), None);
    }

    #[test]
    fn recent_start_fires() {
        let ctx = JourneyContext {
            journey_started_at: Some(now() - Duration::minutes(5)),
            ..established()
        };
        assert_eq!(classify(&ctx), Some(NewJourneySignal::RecentJourneyStart));
    }

    #[test]
    fn low_interaction_count_fires() {
        let ctx = JourneyContext {
            interaction_count: Some(2),
            ..established()
        };
        assert_eq!(classify(&ctx), Some(NewJourneySignal::NewUser));

        let ctx = JourneyContext {
            interaction_count: None,
            ..established()
        };
        assert_eq!(classify(&ctx), None);
    }

    #[test]
    fn tasks_without_snapshot_fire_last() {
        let ctx = JourneyContext {
            has_saved_snapshot: false,
            ..established()
        };
        assert_eq!(classify(&ctx), Some(NewJourneySignal::NoSavedSnapshot));
    }

    #[test]
    fn earlier_signal_wins() {
        let ctx = JourneyContext {
            freshly_created: true,
            interaction_count: Some(0),
            has_saved_snapshot: false,
            ..established()
        };
        assert_eq!(classify(&ctx), Some(NewJourneySignal::FreshlyCreated));
    }

    #[test]
    fn custom_window_is_respected() {
        let classifier = NewJourneyClassifier::with_config(ClassifierConfig {
            fresh_window_minutes: 10,
            ..ClassifierConfig::default()
        });
        let ctx = JourneyContext {
            journey_started_at: Some(now() - Duration::minutes(30)),
            plan_generated_at: None,
            ..established()
        };
        assert!(!classifier.is_new(&ctx));
    }
}
