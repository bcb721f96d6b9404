//! Core domain types for the lift program engine.
//!
//! This module defines the fundamental types used throughout the system:
//! - Lifts and the append-only lift max log
//! - Load strategies and set schemes (prescriptions)
//! - The program calendar (cycles, weeks, days) and its lookups
//! - Progression rules and the links that attach them to lifts
//! - Enrollment, session and failure-counter state
//! - The concrete workout view handed back to callers

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ============================================================================
// Lifts and Maxes
// ============================================================================

/// A lift definition (e.g., "Back Squat")
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Lift {
    pub id: String,
    pub name: String,
    pub slug: String,
}

/// Which kind of max a value refers to
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum MaxType {
    #[default]
    TrainingMax,
    OneRm,
}

impl fmt::Display for MaxType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MaxType::TrainingMax => write!(f, "training_max"),
            MaxType::OneRm => write!(f, "one_rm"),
        }
    }
}

impl std::str::FromStr for MaxType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "training_max" | "tm" => Ok(MaxType::TrainingMax),
            "one_rm" | "1rm" => Ok(MaxType::OneRm),
            other => Err(format!("Unknown max type: {}", other)),
        }
    }
}

/// One entry in the append-only lift max log.
///
/// `sequence` orders records per (user, lift, max type); the current value
/// is the record with the highest sequence.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct LiftMax {
    pub id: Uuid,
    pub user_id: String,
    pub lift_id: String,
    pub max_type: MaxType,
    pub value: f64,
    pub recorded_at: DateTime<Utc>,
    pub sequence: u64,
}

// ============================================================================
// Load Strategies and Set Schemes
// ============================================================================

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RoundingDirection {
    #[default]
    Nearest,
    Up,
    Down,
}

/// Plate rounding applied to a computed weight
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct Rounding {
    pub increment: f64,
    #[serde(default)]
    pub direction: RoundingDirection,
}

impl Default for Rounding {
    fn default() -> Self {
        Self {
            increment: 2.5,
            direction: RoundingDirection::Nearest,
        }
    }
}

/// How a prescription's weight is derived
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LoadStrategy {
    /// Percentage of a recorded max, optionally driven by the weekly lookup
    PercentOf {
        reference: MaxType,
        percentage: f64,
        #[serde(default)]
        lookup_key: Option<usize>,
        #[serde(default)]
        rounding: Option<Rounding>,
    },
    /// Percentage of the one-rep max read off the RPE chart
    RpeTarget {
        target_reps: u32,
        target_rpe: f64,
        rounding_increment: f64,
        #[serde(default)]
        rounding_direction: RoundingDirection,
    },
}

impl LoadStrategy {
    /// The max type this strategy reads
    pub fn reference(&self) -> MaxType {
        match self {
            LoadStrategy::PercentOf { reference, .. } => *reference,
            LoadStrategy::RpeTarget { .. } => MaxType::OneRm,
        }
    }

    /// Rounding carried by the strategy, if any
    pub fn rounding(&self) -> Option<Rounding> {
        match self {
            LoadStrategy::PercentOf { rounding, .. } => *rounding,
            LoadStrategy::RpeTarget {
                rounding_increment,
                rounding_direction,
                ..
            } => Some(Rounding {
                increment: *rounding_increment,
                direction: *rounding_direction,
            }),
        }
    }
}

/// One step of a ramping scheme
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct RampStep {
    pub percentage: f64,
    pub reps: u32,
}

/// How a prescription expands into concrete sets
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SetScheme {
    Fixed {
        sets: u32,
        reps: u32,
    },
    Amrap {
        sets: u32,
        min_reps: u32,
    },
    Ramp {
        steps: Vec<RampStep>,
        work_set_threshold: f64,
    },
    Greyskull {
        fixed_sets: u32,
        fixed_reps: u32,
        amrap_sets: u32,
        min_amrap_reps: u32,
    },
    /// Autoregulated back-off sets driven by reported effort
    FatigueDrop {
        target_reps: u32,
        start_rpe: f64,
        stop_rpe: f64,
        /// Fraction of the previous weight removed on a drop (0.05 = 5%)
        drop_percent: f64,
        max_sets: u32,
    },
}

/// A lift plus how to load it and how to set it up
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Prescription {
    pub id: String,
    pub lift_id: String,
    pub load: LoadStrategy,
    pub scheme: SetScheme,
    #[serde(default)]
    pub order: u32,
}

// ============================================================================
// Program Calendar
// ============================================================================

/// A training day: an ordered list of prescriptions
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Day {
    pub slug: String,
    pub name: String,
    #[serde(default)]
    pub prescriptions: Vec<Prescription>,
}

/// A scheduled slot in a week pointing at a day by slug
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct DaySlot {
    /// 1 = Monday .. 7 = Sunday
    #[serde(default)]
    pub day_of_week: Option<u8>,
    pub day: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Week {
    pub week_number: u32,
    pub days: Vec<DaySlot>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Cycle {
    pub id: String,
    pub name: String,
    pub length_weeks: u32,
    pub weeks: Vec<Week>,
}

impl Cycle {
    pub fn week(&self, week_number: u32) -> Option<&Week> {
        self.weeks.iter().find(|w| w.week_number == week_number)
    }
}

fn default_modifier() -> f64 {
    100.0
}

fn default_true() -> bool {
    true
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct WeeklyLookupEntry {
    pub week_number: u32,
    #[serde(default)]
    pub percentages: Vec<f64>,
    #[serde(default)]
    pub reps: Vec<u32>,
    #[serde(default = "default_modifier")]
    pub percentage_modifier: f64,
}

/// Per-week percentage/rep tables (5/3/1 style waves)
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Default)]
pub struct WeeklyLookup {
    pub entries: Vec<WeeklyLookupEntry>,
}

impl WeeklyLookup {
    pub fn entry(&self, week_number: u32) -> Option<&WeeklyLookupEntry> {
        self.entries.iter().find(|e| e.week_number == week_number)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct DailyLookupEntry {
    /// Day slug this entry applies to
    pub day: String,
    #[serde(default = "default_modifier")]
    pub percentage_modifier: f64,
    #[serde(default)]
    pub intensity_level: Option<String>,
}

/// Per-day intensity modifiers (heavy/light/medium days)
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Default)]
pub struct DailyLookup {
    pub entries: Vec<DailyLookupEntry>,
}

impl DailyLookup {
    pub fn entry(&self, day: &str) -> Option<&DailyLookupEntry> {
        self.entries.iter().find(|e| e.day == day)
    }
}

// ============================================================================
// Progressions
// ============================================================================

/// Attaches a progression to a lift within a program
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ProgressionLink {
    pub progression_id: String,
    pub lift_id: String,
    #[serde(default)]
    pub priority: i32,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub override_increment: Option<f64>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Program {
    pub id: String,
    pub name: String,
    pub slug: String,
    pub cycle_id: String,
    #[serde(default)]
    pub progressions: Vec<ProgressionLink>,
}

/// Lifecycle moment a progression fires on
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    AfterSession,
    AfterWeek,
    AfterCycle,
    OnFailure,
    Manual,
}

impl fmt::Display for TriggerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TriggerType::AfterSession => "after_session",
            TriggerType::AfterWeek => "after_week",
            TriggerType::AfterCycle => "after_cycle",
            TriggerType::OnFailure => "on_failure",
            TriggerType::Manual => "manual",
        };
        write!(f, "{}", s)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct AmrapThreshold {
    pub min_reps: u32,
    pub increment: f64,
}

/// Size of a failure deload
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Deload {
    /// Fraction of the current max (0.10 = 10%)
    Percent { percent: f64 },
    Fixed { amount: f64 },
}

/// One rung of a stage progression (e.g., 5x3+)
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Stage {
    #[serde(default)]
    pub name: String,
    pub sets: u32,
    pub reps: u32,
    /// Total reps the session must reach to count as a success
    pub min_volume: u32,
}

/// Progression rule parameters, one variant per progression type
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressionRule {
    Linear {
        increment: f64,
    },
    Cycle {
        increment: f64,
    },
    AmrapThreshold {
        thresholds: Vec<AmrapThreshold>,
    },
    DeloadOnFailure {
        failure_threshold: u32,
        deload: Deload,
        #[serde(default)]
        reset_on_deload: bool,
    },
    Stage {
        stages: Vec<Stage>,
        #[serde(default)]
        reset_on_exhaustion: bool,
        #[serde(default)]
        deload_on_reset: bool,
        #[serde(default)]
        deload_percent: f64,
        #[serde(default)]
        increment: f64,
    },
    Greyskull {
        increment: f64,
        min_reps: u32,
        double_threshold: u32,
        deload_percent: f64,
    },
}

/// Fieldless discriminant of [`ProgressionRule`], used to key handlers
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ProgressionKind {
    Linear,
    Cycle,
    AmrapThreshold,
    DeloadOnFailure,
    Stage,
    Greyskull,
}

impl ProgressionRule {
    pub fn kind(&self) -> ProgressionKind {
        match self {
            ProgressionRule::Linear { .. } => ProgressionKind::Linear,
            ProgressionRule::Cycle { .. } => ProgressionKind::Cycle,
            ProgressionRule::AmrapThreshold { .. } => ProgressionKind::AmrapThreshold,
            ProgressionRule::DeloadOnFailure { .. } => ProgressionKind::DeloadOnFailure,
            ProgressionRule::Stage { .. } => ProgressionKind::Stage,
            ProgressionRule::Greyskull { .. } => ProgressionKind::Greyskull,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Progression {
    pub id: String,
    pub name: String,
    pub trigger: TriggerType,
    #[serde(default)]
    pub max_type: MaxType,
    pub rule: ProgressionRule,
}

// ============================================================================
// Program Graph
// ============================================================================

/// A fully-resolved program: the unit a program reader hands to the engine
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ProgramGraph {
    pub program: Program,
    pub cycle: Cycle,
    #[serde(default)]
    pub days: Vec<Day>,
    #[serde(default)]
    pub lifts: Vec<Lift>,
    #[serde(default)]
    pub progressions: Vec<Progression>,
    #[serde(default)]
    pub weekly_lookup: Option<WeeklyLookup>,
    #[serde(default)]
    pub daily_lookup: Option<DailyLookup>,
}

impl ProgramGraph {
    pub fn day(&self, slug: &str) -> Option<&Day> {
        self.days.iter().find(|d| d.slug == slug)
    }

    pub fn lift(&self, id: &str) -> Option<&Lift> {
        self.lifts.iter().find(|l| l.id == id)
    }

    pub fn progression(&self, id: &str) -> Option<&Progression> {
        self.progressions.iter().find(|p| p.id == id)
    }

    pub fn prescription(&self, id: &str) -> Option<&Prescription> {
        self.days
            .iter()
            .flat_map(|d| d.prescriptions.iter())
            .find(|p| p.id == id)
    }

    /// Enabled links sorted by priority (stable for equal priorities)
    pub fn active_links(&self) -> Vec<&ProgressionLink> {
        let mut links: Vec<_> = self
            .program
            .progressions
            .iter()
            .filter(|l| l.enabled)
            .collect();
        links.sort_by_key(|l| l.priority);
        links
    }
}

// ============================================================================
// Enrollment and Session State
// ============================================================================

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EnrollmentStatus {
    Active,
    BetweenCycles,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CycleStatus {
    InProgress,
    Completed,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WeekStatus {
    Pending,
    InProgress,
    Completed,
}

/// Session sub-state nested inside an enrollment
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(tag = "state", content = "session_id", rename_all = "snake_case")]
pub enum SessionSlot {
    #[default]
    None,
    InProgress(Uuid),
    Finished(Uuid),
}

/// A user's position in their program calendar
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct EnrollmentState {
    /// Fresh per enrollment; scopes calendar trigger keys to this enrollment
    #[serde(default)]
    pub enrollment_id: Uuid,
    pub user_id: String,
    pub program_id: String,
    pub cycle_iteration: u32,
    pub current_week: u32,
    pub current_day_index: usize,
    pub status: EnrollmentStatus,
    pub cycle_status: CycleStatus,
    pub week_status: WeekStatus,
    #[serde(default)]
    pub session: SessionSlot,
    pub enrolled_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    InProgress,
    Finished,
}

/// A set the user actually performed
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct LoggedSet {
    pub prescription_id: String,
    pub lift_id: String,
    pub set_number: u32,
    pub weight: f64,
    pub target_reps: u32,
    pub reps_performed: u32,
    #[serde(default)]
    pub is_amrap: bool,
    /// Reported effort, required by fatigue-drop prescriptions
    #[serde(default)]
    pub rpe: Option<f64>,
}

impl LoggedSet {
    /// Reps fell short of the target
    pub fn is_short(&self) -> bool {
        self.reps_performed < self.target_reps
    }
}

/// A recorded training session
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct WorkoutSession {
    pub id: Uuid,
    pub user_id: String,
    pub program_id: String,
    pub cycle_iteration: u32,
    pub week_number: u32,
    pub day_slug: String,
    pub status: SessionStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub logged_sets: Vec<LoggedSet>,
}

impl WorkoutSession {
    /// Distinct lifts in the order they were first logged
    pub fn lift_ids(&self) -> Vec<String> {
        let mut lifts: Vec<String> = Vec::new();
        for set in &self.logged_sets {
            if !lifts.contains(&set.lift_id) {
                lifts.push(set.lift_id.clone());
            }
        }
        lifts
    }

    pub fn sets_for_lift<'a>(&'a self, lift_id: &'a str) -> impl Iterator<Item = &'a LoggedSet> {
        self.logged_sets.iter().filter(move |s| s.lift_id == lift_id)
    }
}

/// Key of a failure counter: one per (user, lift, progression)
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CounterKey {
    pub user_id: String,
    pub lift_id: String,
    pub progression_id: String,
}

impl CounterKey {
    pub fn new(user_id: &str, lift_id: &str, progression_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            lift_id: lift_id.to_string(),
            progression_id: progression_id.to_string(),
        }
    }
}

/// Consecutive-failure tracker for one progression on one lift
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct FailureCounter {
    pub key: CounterKey,
    pub consecutive_failures: u32,
    #[serde(default)]
    pub current_stage_index: usize,
    /// Bumped on every committed write; used to detect lost updates
    #[serde(default)]
    pub version: u64,
}

impl FailureCounter {
    pub fn new(key: CounterKey) -> Self {
        Self {
            key,
            consecutive_failures: 0,
            current_stage_index: 0,
            version: 0,
        }
    }
}

/// Audit record of an applied progression
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ProgressionLogEntry {
    pub user_id: String,
    pub progression_id: String,
    pub lift_id: String,
    pub trigger_key: String,
    pub delta: f64,
    pub applied_at: DateTime<Utc>,
}

// ============================================================================
// Workout Output
// ============================================================================

/// A concrete set to perform
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PlannedSet {
    pub set_number: u32,
    pub weight: f64,
    pub target_reps: u32,
    pub is_work_set: bool,
    pub is_amrap: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ExerciseView {
    pub prescription_id: String,
    pub lift: Lift,
    pub sets: Vec<PlannedSet>,
}

/// Today's workout
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct WorkoutView {
    pub program_id: String,
    pub cycle_iteration: u32,
    pub week_number: u32,
    pub day_slug: String,
    pub day_name: String,
    pub exercises: Vec<ExerciseView>,
}
