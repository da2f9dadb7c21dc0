//! Deployment settings for the timetabler.
//!
//! Everything here is tunable without touching constraint logic: solver
//! budget, candidate-slot tolerances, hard/soft policy per rule, objective
//! weights and the day patterns allowed for multi-meeting courses.
//!
//! ```
//! use course_timetabler::config::{RuleMode, SchedulerConfig};
//!
//! let config = SchedulerConfig::from_toml_str(r#"
//!     [solver]
//!     time_limit_seconds = 30
//!
//!     [policy]
//!     consecutive_teaching = "soft"
//! "#).unwrap();
//!
//! assert_eq!(config.solver.time_limit_seconds, 30);
//! assert_eq!(config.policy.consecutive_teaching, RuleMode::Soft);
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::data::Day;
use crate::error::SchedulerError;
use crate::index::parse_clock;

/// Environment variable naming an optional TOML settings file.
pub const CONFIG_ENV: &str = "COURSE_TIMETABLER_CONFIG";

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub solver: SolverSettings,
    pub candidates: CandidateSettings,
    pub policy: PolicySettings,
    pub weights: ObjectiveWeights,
    pub patterns: PatternTable,
}

impl SchedulerConfig {
    /// Loads and validates settings from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SchedulerError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Parses and validates settings from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, SchedulerError> {
        let config: SchedulerConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads the file named by [`CONFIG_ENV`], or falls back to defaults.
    pub fn from_env() -> Result<Self, SchedulerError> {
        match std::env::var(CONFIG_ENV) {
            Ok(path) => Self::load(path),
            Err(_) => Ok(Self::default()),
        }
    }

    pub fn time_limit(&self) -> Duration {
        Duration::from_secs_f64(self.solver.time_limit_seconds as f64)
    }

    /// Rejects settings that would let balance terms outweigh placement or
    /// that contradict each other.
    pub fn validate(&self) -> Result<(), SchedulerError> {
        let w = &self.weights;
        let distribution = w.day_imbalance.max(w.slot_occupancy).max(w.family_imbalance);
        if w.elective < 10.0 * distribution {
            return Err(SchedulerError::configuration(format!(
                "elective weight {} must be at least ten times the largest distribution weight {}",
                w.elective, distribution
            )));
        }
        if w.day_imbalance + w.spread_excess >= w.elective {
            return Err(SchedulerError::configuration(format!(
                "day imbalance {} plus spread excess {} must stay below elective weight {}",
                w.day_imbalance, w.spread_excess, w.elective
            )));
        }
        if w.core < w.elective {
            return Err(SchedulerError::configuration(format!(
                "core weight {} is below elective weight {}",
                w.core, w.elective
            )));
        }
        if self.solver.time_limit_seconds == 0 {
            return Err(SchedulerError::configuration("solver time limit must be positive"));
        }
        let c = &self.candidates;
        if c.widened_tolerance_minutes < c.duration_tolerance_minutes {
            return Err(SchedulerError::configuration(format!(
                "widened tolerance {} is narrower than base tolerance {}",
                c.widened_tolerance_minutes, c.duration_tolerance_minutes
            )));
        }
        if self.policy.max_meetings_per_slot == 0 {
            return Err(SchedulerError::configuration(
                "max_meetings_per_slot must be at least 1",
            ));
        }
        for exclusion in &self.policy.calendar_exclusions {
            if let Some(after) = &exclusion.after {
                parse_clock(after).ok_or_else(|| {
                    SchedulerError::configuration(format!(
                        "calendar exclusion for {} has invalid cutoff '{}'",
                        exclusion.day, after
                    ))
                })?;
            }
        }
        self.patterns.validate()
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SolverSettings {
    pub time_limit_seconds: u64,
    pub threads: i32,
    pub random_seed: i32,
    pub log_to_console: bool,
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            time_limit_seconds: 120,
            threads: 1, // limit to 1 thread for reproducibility
            random_seed: 1234,
            log_to_console: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CandidateSettings {
    pub duration_tolerance_minutes: u32,
    pub widened_tolerance_minutes: u32,
    /// Use every teaching slot when neither tolerance stage matches.
    pub allow_fallback: bool,
    pub non_teaching_days: Vec<Day>,
}

impl Default for CandidateSettings {
    fn default() -> Self {
        Self {
            duration_tolerance_minutes: 10,
            widened_tolerance_minutes: 30,
            allow_fallback: true,
            non_teaching_days: vec!["Friday".into(), "Saturday".into(), "Sunday".into()],
        }
    }
}

/// Whether a rule is an absolute ban or a penalized preference.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleMode {
    #[default]
    Hard,
    Soft,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CourseClass {
    Core,
    Elective,
    #[default]
    All,
}

impl CourseClass {
    pub fn includes(&self, is_core: bool) -> bool {
        match self {
            CourseClass::Core => is_core,
            CourseClass::Elective => !is_core,
            CourseClass::All => true,
        }
    }
}

/// Bars a class of courses from a day, or from the part of it after a cutoff.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct CalendarExclusion {
    pub day: Day,
    #[serde(default)]
    pub applies_to: CourseClass,
    /// `HH:MM`; slots starting at or after it are barred. Whole day when absent.
    #[serde(default)]
    pub after: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PolicySettings {
    pub consecutive_teaching: RuleMode,
    pub day_pattern: RuleMode,
    pub core_overlap: RuleMode,
    /// Largest break between two slots that still counts as back-to-back.
    pub adjacency_gap_minutes: u32,
    pub max_meetings_per_slot: u32,
    pub max_day_imbalance: u32,
    pub calendar_exclusions: Vec<CalendarExclusion>,
}

impl Default for PolicySettings {
    fn default() -> Self {
        Self {
            consecutive_teaching: RuleMode::Hard,
            day_pattern: RuleMode::Hard,
            core_overlap: RuleMode::Hard,
            adjacency_gap_minutes: 0,
            max_meetings_per_slot: 4,
            max_day_imbalance: 5,
            calendar_exclusions: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObjectiveWeights {
    pub core: f64,
    pub elective: f64,
    pub day_imbalance: f64,
    /// Cost of each meeting the day spread runs past `max_day_imbalance`.
    pub spread_excess: f64,
    pub slot_occupancy: f64,
    /// Occupancy above which each extra meeting in a slot costs progressively more.
    pub slot_threshold: Option<u32>,
    pub family_imbalance: f64,
    pub pattern_reward: f64,
    pub violation: f64,
}

impl Default for ObjectiveWeights {
    fn default() -> Self {
        Self {
            core: 100.0,
            elective: 50.0,
            day_imbalance: 4.0,
            spread_excess: 20.0,
            slot_occupancy: 2.0,
            slot_threshold: Some(2),
            family_imbalance: 1.0,
            pattern_reward: 10.0,
            violation: 30.0,
        }
    }
}

/// Day patterns allowed for one weekly meeting count.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct PatternSet {
    pub meetings: u32,
    pub days: Vec<Vec<Day>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct PatternTable(pub Vec<PatternSet>);

impl Default for PatternTable {
    fn default() -> Self {
        let days = |names: &[&str]| names.iter().map(|d| d.to_string()).collect::<Vec<_>>();
        PatternTable(vec![
            PatternSet {
                meetings: 2,
                days: vec![days(&["Monday", "Wednesday"]), days(&["Tuesday", "Thursday"])],
            },
            PatternSet {
                meetings: 3,
                days: vec![days(&["Monday", "Tuesday", "Thursday"])],
            },
        ])
    }
}

impl PatternTable {
    /// Patterns for `meetings` weekly meetings; empty when none are defined.
    pub fn for_meetings(&self, meetings: u32) -> &[Vec<Day>] {
        self.0
            .iter()
            .find(|set| set.meetings == meetings)
            .map(|set| set.days.as_slice())
            .unwrap_or(&[])
    }

    fn validate(&self) -> Result<(), SchedulerError> {
        for set in &self.0 {
            for pattern in &set.days {
                if pattern.len() != set.meetings as usize {
                    return Err(SchedulerError::configuration(format!(
                        "day pattern {:?} has {} days but is listed for {} meetings",
                        pattern,
                        pattern.len(),
                        set.meetings
                    )));
                }
                let mut sorted = pattern.clone();
                sorted.sort();
                sorted.dedup();
                if sorted.len() != pattern.len() {
                    return Err(SchedulerError::configuration(format!(
                        "day pattern {:?} repeats a day",
                        pattern
                    )));
                }
            }
        }
        Ok(())
    }
}
