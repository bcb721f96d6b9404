//! Progression engine: turns lifecycle events into lift max adjustments.
//!
//! Handlers are registered per progression kind in a [`ProgressionRegistry`].
//! Each handler sees the firing trigger, the link, the failure counter, the
//! current max and (when there is one) the lift's session performance, and
//! returns a [`Decision`]: adjust by a delta, or skip with a reason. Handlers
//! never write; the engine stages their decisions and commits them.

use crate::{
    Deload, Error, FailureCounter, MaxType, Progression, ProgressionKind, ProgressionLink,
    ProgressionRule, Result, TriggerType, WorkoutSession,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

// ============================================================================
// Handler Inputs and Outputs
// ============================================================================

/// What a lift looked like in one session
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LiftPerformance {
    pub session_id: Option<Uuid>,
    pub total_reps: u32,
    /// Reps on the last AMRAP set logged for the lift
    pub amrap_reps: Option<u32>,
    pub sets_logged: u32,
    pub failed_sets: u32,
}

impl LiftPerformance {
    pub fn from_session(session: &WorkoutSession, lift_id: &str) -> Self {
        let mut perf = LiftPerformance {
            session_id: Some(session.id),
            ..Default::default()
        };
        for set in session.sets_for_lift(lift_id) {
            perf.total_reps += set.reps_performed;
            perf.sets_logged += 1;
            if set.is_short() {
                perf.failed_sets += 1;
            }
            if set.is_amrap {
                perf.amrap_reps = Some(set.reps_performed);
            }
        }
        perf
    }
}

/// Everything a handler may look at
#[derive(Clone, Debug)]
pub struct HandlerContext<'a> {
    pub trigger: TriggerType,
    pub forced: bool,
    pub progression: &'a Progression,
    pub link: &'a ProgressionLink,
    pub current: f64,
    pub counter: &'a FailureCounter,
    pub performance: Option<&'a LiftPerformance>,
}

impl HandlerContext<'_> {
    /// Rule increment, unless the link overrides it
    fn increment(&self, rule_increment: f64) -> f64 {
        self.link.override_increment.unwrap_or(rule_increment)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Verdict {
    Adjust { delta: f64 },
    Skip { reason: String },
}

/// A handler's answer: the verdict plus the counter state to persist, if changed
#[derive(Clone, Debug, PartialEq)]
pub struct Decision {
    pub verdict: Verdict,
    pub counter: Option<FailureCounter>,
}

impl Decision {
    pub fn adjust(delta: f64) -> Self {
        Self {
            verdict: Verdict::Adjust { delta },
            counter: None,
        }
    }

    pub fn skip(reason: impl Into<String>) -> Self {
        Self {
            verdict: Verdict::Skip {
                reason: reason.into(),
            },
            counter: None,
        }
    }

    pub fn with_counter(mut self, counter: FailureCounter) -> Self {
        self.counter = Some(counter);
        self
    }
}

/// A max change that was committed
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct AppliedChange {
    pub previous_value: f64,
    pub new_value: f64,
    pub delta: f64,
    pub max_type: MaxType,
    pub applied_at: DateTime<Utc>,
    #[serde(default)]
    pub stage_index: Option<usize>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ProgressionOutcome {
    Applied(AppliedChange),
    Skipped { reason: String },
    Error { message: String },
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct TriggerResult {
    pub lift_id: String,
    pub progression_id: String,
    pub trigger: TriggerType,
    pub outcome: ProgressionOutcome,
}

/// Per-lift results of one trigger, with running tallies
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct TriggerBatch {
    pub results: Vec<TriggerResult>,
    pub total_applied: usize,
    pub total_skipped: usize,
    pub total_errors: usize,
}

impl TriggerBatch {
    pub fn push(&mut self, result: TriggerResult) {
        match result.outcome {
            ProgressionOutcome::Applied(_) => self.total_applied += 1,
            ProgressionOutcome::Skipped { .. } => self.total_skipped += 1,
            ProgressionOutcome::Error { .. } => self.total_errors += 1,
        }
        self.results.push(result);
    }

    pub fn extend(&mut self, other: TriggerBatch) {
        for result in other.results {
            self.push(result);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn applied(&self) -> impl Iterator<Item = (&TriggerResult, &AppliedChange)> {
        self.results.iter().filter_map(|r| match &r.outcome {
            ProgressionOutcome::Applied(change) => Some((r, change)),
            _ => None,
        })
    }
}

/// New max after a delta: rounded to hundredths, never below zero
pub fn apply_delta(previous: f64, delta: f64) -> f64 {
    let next = ((previous + delta) * 100.0).round() / 100.0;
    if next < 0.0 {
        tracing::warn!(
            "Delta {} would take max {} below zero, clamping",
            delta,
            previous
        );
        0.0
    } else {
        next
    }
}

// ============================================================================
// Registry
// ============================================================================

pub type Handler = fn(&ProgressionRule, &HandlerContext<'_>) -> Result<Decision>;

/// Handlers keyed by progression kind
#[derive(Clone)]
pub struct ProgressionRegistry {
    handlers: HashMap<ProgressionKind, Handler>,
}

impl Default for ProgressionRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(ProgressionKind::Linear, linear);
        registry.register(ProgressionKind::Cycle, cycle);
        registry.register(ProgressionKind::AmrapThreshold, amrap_threshold);
        registry.register(ProgressionKind::DeloadOnFailure, deload_on_failure);
        registry.register(ProgressionKind::Stage, stage);
        registry.register(ProgressionKind::Greyskull, greyskull);
        registry
    }
}

impl ProgressionRegistry {
    pub fn empty() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    pub fn register(&mut self, kind: ProgressionKind, handler: Handler) {
        self.handlers.insert(kind, handler);
    }

    /// Gate on the trigger, then dispatch to the kind's handler
    pub fn evaluate(&self, ctx: &HandlerContext<'_>) -> Result<Decision> {
        if let Some(reason) = trigger_mismatch(ctx.progression, ctx.trigger, ctx.forced) {
            return Ok(Decision::skip(reason));
        }

        let rule = &ctx.progression.rule;
        let handler = self.handlers.get(&rule.kind()).ok_or_else(|| {
            Error::Validation(format!(
                "No handler registered for {:?} progressions",
                rule.kind()
            ))
        })?;
        handler(rule, ctx)
    }
}

/// Why `progression` should not fire for `trigger`, if it should not.
///
/// Lifecycle triggers fire only progressions registered for them. A manual
/// trigger fires manual progressions, and any other progression when forced.
pub fn trigger_mismatch(
    progression: &Progression,
    trigger: TriggerType,
    forced: bool,
) -> Option<String> {
    let own = progression.trigger;
    let fires = match trigger {
        TriggerType::Manual => own == TriggerType::Manual || forced,
        trigger => own == trigger,
    };
    if fires {
        None
    } else {
        Some(format!(
            "progression '{}' fires on {}, not {}",
            progression.id, own, trigger
        ))
    }
}

// ============================================================================
// Handlers
// ============================================================================

fn linear(rule: &ProgressionRule, ctx: &HandlerContext<'_>) -> Result<Decision> {
    let ProgressionRule::Linear { increment } = rule else {
        return Err(mismatched(rule, "linear"));
    };
    Ok(Decision::adjust(ctx.increment(*increment)))
}

fn cycle(rule: &ProgressionRule, ctx: &HandlerContext<'_>) -> Result<Decision> {
    let ProgressionRule::Cycle { increment } = rule else {
        return Err(mismatched(rule, "cycle"));
    };
    if ctx.trigger != TriggerType::AfterCycle && !ctx.forced {
        return Ok(Decision::skip("cycle progressions apply only at cycle end"));
    }
    Ok(Decision::adjust(ctx.increment(*increment)))
}

fn amrap_threshold(rule: &ProgressionRule, ctx: &HandlerContext<'_>) -> Result<Decision> {
    let ProgressionRule::AmrapThreshold { thresholds } = rule else {
        return Err(mismatched(rule, "amrap_threshold"));
    };
    let Some(performed) = ctx.performance.and_then(|p| p.amrap_reps) else {
        return Ok(Decision::skip("no AMRAP set logged"));
    };

    let best = thresholds
        .iter()
        .filter(|t| t.min_reps <= performed)
        .max_by_key(|t| t.min_reps);

    Ok(match best {
        Some(threshold) => Decision::adjust(threshold.increment),
        None => Decision::skip(format!(
            "{} AMRAP reps met no threshold",
            performed
        )),
    })
}

fn deload_on_failure(rule: &ProgressionRule, ctx: &HandlerContext<'_>) -> Result<Decision> {
    let ProgressionRule::DeloadOnFailure {
        failure_threshold,
        deload,
        reset_on_deload,
    } = rule
    else {
        return Err(mismatched(rule, "deload_on_failure"));
    };

    let failures = ctx.counter.consecutive_failures;
    if failures < *failure_threshold {
        return Ok(Decision::skip(format!(
            "{} of {} consecutive failures",
            failures, failure_threshold
        )));
    }

    let delta = match deload {
        Deload::Percent { percent } => -(percent * ctx.current),
        Deload::Fixed { amount } => -amount,
    };

    let decision = Decision::adjust(delta);
    if *reset_on_deload {
        let mut counter = ctx.counter.clone();
        counter.consecutive_failures = 0;
        Ok(decision.with_counter(counter))
    } else {
        Ok(decision)
    }
}

fn stage(rule: &ProgressionRule, ctx: &HandlerContext<'_>) -> Result<Decision> {
    let ProgressionRule::Stage {
        stages,
        reset_on_exhaustion,
        deload_on_reset,
        deload_percent,
        increment,
    } = rule
    else {
        return Err(mismatched(rule, "stage"));
    };
    if stages.is_empty() {
        return Err(Error::Validation(format!(
            "Stage progression '{}' has no stages",
            ctx.progression.id
        )));
    }
    let Some(performance) = ctx.performance else {
        return Ok(Decision::skip("no session volume to assess"));
    };

    let index = ctx.counter.current_stage_index.min(stages.len() - 1);
    let current = &stages[index];

    if performance.total_reps >= current.min_volume {
        let increment = ctx.increment(*increment);
        return Ok(if increment > 0.0 {
            Decision::adjust(increment)
        } else {
            Decision::skip(format!(
                "stage '{}' target met ({} >= {})",
                current.name, performance.total_reps, current.min_volume
            ))
        });
    }

    let mut counter = ctx.counter.clone();
    if index + 1 < stages.len() {
        counter.current_stage_index = index + 1;
        tracing::info!(
            "{}: stage '{}' failed ({} < {}), moving to '{}'",
            ctx.link.lift_id,
            current.name,
            performance.total_reps,
            current.min_volume,
            stages[index + 1].name
        );
        return Ok(Decision::adjust(0.0).with_counter(counter));
    }

    if !*reset_on_exhaustion {
        return Ok(Decision::skip(format!(
            "final stage '{}' failed and reset is disabled",
            current.name
        )));
    }

    counter.current_stage_index = 0;
    let delta = if *deload_on_reset {
        -(deload_percent * ctx.current)
    } else {
        0.0
    };
    tracing::info!(
        "{}: stages exhausted, resetting to '{}' with delta {}",
        ctx.link.lift_id,
        stages[0].name,
        delta
    );
    Ok(Decision::adjust(delta).with_counter(counter))
}

fn greyskull(rule: &ProgressionRule, ctx: &HandlerContext<'_>) -> Result<Decision> {
    let ProgressionRule::Greyskull {
        increment,
        min_reps,
        double_threshold,
        deload_percent,
    } = rule
    else {
        return Err(mismatched(rule, "greyskull"));
    };
    let Some(performed) = ctx.performance.and_then(|p| p.amrap_reps) else {
        return Ok(Decision::skip("no AMRAP set logged"));
    };

    let increment = ctx.increment(*increment);
    let delta = if performed < *min_reps {
        -(deload_percent * ctx.current)
    } else if performed >= *double_threshold {
        2.0 * increment
    } else {
        increment
    };
    Ok(Decision::adjust(delta))
}

fn mismatched(rule: &ProgressionRule, expected: &str) -> Error {
    Error::Validation(format!(
        "{} handler received a {:?} rule",
        expected,
        rule.kind()
    ))
}
