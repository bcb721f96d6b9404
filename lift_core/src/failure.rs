//! Failure counters: consecutive-failure tracking per (user, lift, progression).
//!
//! What counts as a failure depends on the progression rule:
//! - linear, cycle, deload_on_failure: any logged set short of its target reps
//! - amrap_threshold: an AMRAP set below the lowest threshold
//! - greyskull: an AMRAP set below `min_reps`
//! - stage: session volume for the lift below the current stage's minimum
//!
//! A qualifying failure increments the counter by one; a qualifying success
//! resets it to zero.

use crate::{FailureCounter, LoggedSet, ProgressionRule, WorkoutSession};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Assessment {
    Success,
    Failure,
}

/// Assess one logged set for a per-set rule. `None` when the set does not qualify.
pub fn assess_set(rule: &ProgressionRule, set: &LoggedSet) -> Option<Assessment> {
    match rule {
        ProgressionRule::Linear { .. }
        | ProgressionRule::Cycle { .. }
        | ProgressionRule::DeloadOnFailure { .. } => Some(verdict(set.is_short())),

        ProgressionRule::AmrapThreshold { thresholds } => {
            if !set.is_amrap {
                return None;
            }
            let lowest = thresholds.iter().map(|t| t.min_reps).min()?;
            Some(verdict(set.reps_performed < lowest))
        }

        ProgressionRule::Greyskull { min_reps, .. } => {
            if !set.is_amrap {
                return None;
            }
            Some(verdict(set.reps_performed < *min_reps))
        }

        ProgressionRule::Stage { .. } => None,
    }
}

/// Assess a finished session for a volume-gated rule
pub fn assess_session(
    rule: &ProgressionRule,
    counter: &FailureCounter,
    volume: u32,
) -> Option<Assessment> {
    match rule {
        ProgressionRule::Stage { stages, .. } => {
            let stage = stages
                .get(counter.current_stage_index)
                .or_else(|| stages.last())?;
            Some(verdict(volume < stage.min_volume))
        }
        _ => None,
    }
}

fn verdict(failed: bool) -> Assessment {
    if failed {
        Assessment::Failure
    } else {
        Assessment::Success
    }
}

/// Apply an assessment to a counter
pub fn record(counter: &mut FailureCounter, assessment: Assessment) {
    match assessment {
        Assessment::Failure => counter.consecutive_failures += 1,
        Assessment::Success => counter.consecutive_failures = 0,
    }
    tracing::debug!(
        "Failure counter {}/{}/{} -> {} ({:?})",
        counter.key.user_id,
        counter.key.lift_id,
        counter.key.progression_id,
        counter.consecutive_failures,
        assessment
    );
}

/// Total reps performed for a lift in a session
pub fn session_volume(session: &WorkoutSession, lift_id: &str) -> u32 {
    session.sets_for_lift(lift_id).map(|s| s.reps_performed).sum()
}
