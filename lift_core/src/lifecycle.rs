//! Enrollment/session state machine.
//!
//! Phases and commands form an explicit transition table ([`transition`]).
//! Every mutating method on [`EnrollmentState`] consults the table first, so
//! illegal moves (a second session, advancing between cycles) are rejected
//! before any field changes.

use crate::{
    Cycle, CycleStatus, EnrollmentState, EnrollmentStatus, Error, Result, SessionSlot,
    TriggerType, WeekStatus,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Coarse lifecycle phase derived from the enrollment record
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    NotEnrolled,
    /// Enrolled, no session running
    Training,
    InSession,
    /// Cycle completed; waits for an explicit `next_cycle`
    BetweenCycles,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    Enroll,
    Unenroll,
    StartSession,
    LogSet,
    FinishSession,
    Advance,
    NextCycle,
    GenerateWorkout,
}

/// The transition table: next phase for `command` in `phase`, or a state error
pub fn transition(phase: Phase, command: Command) -> Result<Phase> {
    use Command::*;
    use Phase::*;

    let next = match (phase, command) {
        (NotEnrolled, Enroll) => Training,

        (Training, StartSession) => InSession,
        (Training, Advance) => Training,
        (Training, GenerateWorkout) => Training,
        (Training, Unenroll) => NotEnrolled,

        (InSession, LogSet) => InSession,
        (InSession, FinishSession) => Training,
        (InSession, GenerateWorkout) => InSession,
        (InSession, Unenroll) => NotEnrolled,

        (BetweenCycles, NextCycle) => Training,
        (BetweenCycles, Unenroll) => NotEnrolled,

        (phase, command) => return Err(rejection(phase, command)),
    };
    Ok(next)
}

fn rejection(phase: Phase, command: Command) -> Error {
    let message = match (phase, command) {
        (Phase::NotEnrolled, _) => "user is not enrolled in a program".to_string(),
        (_, Command::Enroll) => "user is already enrolled in a program".to_string(),
        (Phase::InSession, Command::StartSession) => {
            "a workout session is already in progress".to_string()
        }
        (Phase::InSession, Command::Advance) => {
            "finish the in-progress session before advancing".to_string()
        }
        (Phase::BetweenCycles, _) => {
            "cycle complete; start the next cycle to continue".to_string()
        }
        (_, Command::LogSet) | (_, Command::FinishSession) => {
            "no workout session is in progress".to_string()
        }
        (_, Command::NextCycle) => "the current cycle is not complete".to_string(),
        (phase, command) => format!("{:?} is not allowed while {:?}", command, phase),
    };
    Error::State(message)
}

/// Phase of an optional enrollment record (`None` is NOT_ENROLLED)
pub fn phase_of(state: Option<&EnrollmentState>) -> Phase {
    state.map_or(Phase::NotEnrolled, EnrollmentState::phase)
}

/// Events emitted by lifecycle transitions, consumed by the progression engine
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LifecycleEvent {
    SessionFinished {
        session_id: Uuid,
        lift_ids: Vec<String>,
    },
    WeekAdvanced {
        enrollment_id: Uuid,
        cycle_iteration: u32,
        completed_week: u32,
    },
    CycleAdvanced {
        enrollment_id: Uuid,
        completed_iteration: u32,
    },
    SetFailed {
        session_id: Uuid,
        lift_id: String,
        set_number: u32,
    },
}

impl LifecycleEvent {
    pub fn trigger(&self) -> TriggerType {
        match self {
            LifecycleEvent::SessionFinished { .. } => TriggerType::AfterSession,
            LifecycleEvent::WeekAdvanced { .. } => TriggerType::AfterWeek,
            LifecycleEvent::CycleAdvanced { .. } => TriggerType::AfterCycle,
            LifecycleEvent::SetFailed { .. } => TriggerType::OnFailure,
        }
    }

    /// Idempotency key used by the progression log.
    ///
    /// Calendar keys carry the enrollment id: a re-enrollment replays the
    /// same iteration and week numbers and must fire again.
    pub fn trigger_key(&self) -> String {
        match self {
            LifecycleEvent::SessionFinished { session_id, .. } => format!("session:{}", session_id),
            LifecycleEvent::WeekAdvanced {
                enrollment_id,
                cycle_iteration,
                completed_week,
            } => format!("week:{}:{}:{}", enrollment_id, cycle_iteration, completed_week),
            LifecycleEvent::CycleAdvanced {
                enrollment_id,
                completed_iteration,
            } => format!("cycle:{}:{}", enrollment_id, completed_iteration),
            LifecycleEvent::SetFailed { session_id, .. } => format!("failure:{}", session_id),
        }
    }
}

impl EnrollmentState {
    /// Enroll a user at cycle 1, week 1, day 0
    pub fn enroll(
        current: Option<&EnrollmentState>,
        user_id: &str,
        program_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        transition(phase_of(current), Command::Enroll)?;

        tracing::info!("Enrolling {} in program {}", user_id, program_id);
        Ok(Self {
            enrollment_id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            program_id: program_id.to_string(),
            cycle_iteration: 1,
            current_week: 1,
            current_day_index: 0,
            status: EnrollmentStatus::Active,
            cycle_status: CycleStatus::InProgress,
            week_status: WeekStatus::Pending,
            session: SessionSlot::None,
            enrolled_at: now,
            updated_at: now,
        })
    }

    pub fn phase(&self) -> Phase {
        match (self.status, self.session) {
            (EnrollmentStatus::BetweenCycles, _) => Phase::BetweenCycles,
            (EnrollmentStatus::Active, SessionSlot::InProgress(_)) => Phase::InSession,
            (EnrollmentStatus::Active, _) => Phase::Training,
        }
    }

    /// Check a command against the table without changing anything
    pub fn ensure(&self, command: Command) -> Result<()> {
        transition(self.phase(), command).map(|_| ())
    }

    pub fn active_session(&self) -> Option<Uuid> {
        match self.session {
            SessionSlot::InProgress(id) => Some(id),
            _ => None,
        }
    }

    pub fn start_session(&mut self, session_id: Uuid, now: DateTime<Utc>) -> Result<()> {
        self.ensure(Command::StartSession)?;
        self.session = SessionSlot::InProgress(session_id);
        self.week_status = WeekStatus::InProgress;
        self.updated_at = now;
        tracing::info!("{}: started session {}", self.user_id, session_id);
        Ok(())
    }

    pub fn finish_session(&mut self, session_id: Uuid, now: DateTime<Utc>) -> Result<()> {
        self.ensure(Command::FinishSession)?;
        if self.active_session() != Some(session_id) {
            return Err(Error::State(format!(
                "session {} is not the user's active session",
                session_id
            )));
        }
        self.session = SessionSlot::Finished(session_id);
        self.updated_at = now;
        tracing::info!("{}: finished session {}", self.user_id, session_id);
        Ok(())
    }

    /// Move the day pointer forward, rolling weeks and cycles.
    ///
    /// Rolling past the last day of a week emits `WeekAdvanced`; rolling past
    /// the last week also emits `CycleAdvanced`, resets to week 1 of the next
    /// iteration and parks the enrollment in BETWEEN_CYCLES.
    ///
    /// The target slot is resolved before anything changes: a missing or
    /// empty target week fails with `NotFound` and leaves the state as is.
    pub fn advance(&mut self, cycle: &Cycle, now: DateTime<Utc>) -> Result<Vec<LifecycleEvent>> {
        self.ensure(Command::Advance)?;

        if cycle.length_weeks == 0 {
            return Err(Error::NotFound(format!("Cycle '{}' has no weeks", cycle.id)));
        }
        let days_in_week = scheduled_days(cycle, self.current_week)?;

        let next_day = self.current_day_index + 1;
        let rolls_week = next_day >= days_in_week;
        let rolls_cycle = rolls_week && self.current_week >= cycle.length_weeks;
        let (next_week, next_day) = match (rolls_week, rolls_cycle) {
            (false, _) => (self.current_week, next_day),
            (true, false) => (self.current_week + 1, 0),
            (true, true) => (1, 0),
        };
        if next_week != self.current_week {
            scheduled_days(cycle, next_week)?;
        }

        let mut events = Vec::new();
        self.session = SessionSlot::None;
        self.updated_at = now;
        self.current_day_index = next_day;

        if !rolls_week {
            tracing::info!(
                "{}: advanced to week {} day {}",
                self.user_id,
                self.current_week,
                self.current_day_index
            );
            return Ok(events);
        }

        events.push(LifecycleEvent::WeekAdvanced {
            enrollment_id: self.enrollment_id,
            cycle_iteration: self.cycle_iteration,
            completed_week: self.current_week,
        });
        self.current_week = next_week;
        self.week_status = WeekStatus::Pending;

        if rolls_cycle {
            events.push(LifecycleEvent::CycleAdvanced {
                enrollment_id: self.enrollment_id,
                completed_iteration: self.cycle_iteration,
            });
            self.cycle_iteration += 1;
            self.status = EnrollmentStatus::BetweenCycles;
            self.cycle_status = CycleStatus::Completed;
            self.week_status = WeekStatus::Completed;
            tracing::info!(
                "{}: completed cycle, now between cycles (next iteration {})",
                self.user_id,
                self.cycle_iteration
            );
        } else {
            tracing::info!("{}: advanced to week {}", self.user_id, self.current_week);
        }

        Ok(events)
    }

    /// Leave BETWEEN_CYCLES and resume workout generation
    pub fn next_cycle(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.ensure(Command::NextCycle)?;
        self.status = EnrollmentStatus::Active;
        self.cycle_status = CycleStatus::InProgress;
        self.week_status = WeekStatus::Pending;
        self.updated_at = now;
        tracing::info!(
            "{}: starting cycle iteration {}",
            self.user_id,
            self.cycle_iteration
        );
        Ok(())
    }
}

/// Number of scheduled days in `week_number`, which must exist and be non-empty
fn scheduled_days(cycle: &Cycle, week_number: u32) -> Result<usize> {
    let week = cycle.week(week_number).ok_or_else(|| {
        Error::NotFound(format!("Week {} in cycle '{}'", week_number, cycle.id))
    })?;
    if week.days.is_empty() {
        return Err(Error::NotFound(format!(
            "No scheduled days in week {} of cycle '{}'",
            week_number, cycle.id
        )));
    }
    Ok(week.days.len())
}
