//! Training engine: the operations callers drive.
//!
//! Read path: [`TrainingEngine::compute_workout`] assembles today's workout
//! from the program graph, the enrollment position and the current maxes,
//! cached per user until the store revision moves.
//!
//! Write path: every mutating operation runs under a per-user lock, stages
//! its writes (session, enrollment, failure counters, lift maxes, progression
//! log) in a [`ChangeSet`] and commits them in one step. Progressions fired by
//! the operation see the staged values, so two progressions on the same lift
//! stack rather than both reading the same previous max.

use crate::assembler::{self, Position};
use crate::failure;
use crate::lifecycle::{phase_of, transition, Command, LifecycleEvent};
use crate::load::{LoadContext, MaxSnapshot};
use crate::progression::{
    self, apply_delta, AppliedChange, HandlerContext, LiftPerformance, ProgressionOutcome,
    ProgressionRegistry, TriggerBatch, TriggerResult, Verdict,
};
use crate::scheme::{FatigueDropSequence, SetOutcome};
use crate::store::{
    ChangeSet, EnrollmentStore, EnrollmentWrite, FailureCounterStore, LiftMaxStore, ProgramReader,
    ProgressionLogStore, SessionStore, SessionWrite, Store,
};
use crate::{
    CounterKey, EnrollmentState, Error, FailureCounter, LiftMax, LoggedSet, MaxType,
    PlannedSet, ProgramGraph, ProgressionLink, ProgressionLogEntry, ProgressionRule, Result,
    Rounding, SessionStatus, SetScheme, TriggerType, WorkoutSession, WorkoutView,
};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

// ============================================================================
// Operation Results
// ============================================================================

#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct LogOutcome {
    pub session_id: Uuid,
    pub sets_logged: usize,
    /// One `set_failed` event per short set
    pub failures: Vec<LifecycleEvent>,
    pub progressions: TriggerBatch,
}

#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct FinishOutcome {
    pub session: WorkoutSession,
    pub progressions: TriggerBatch,
}

#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct AdvanceOutcome {
    pub enrollment: EnrollmentState,
    pub events: Vec<LifecycleEvent>,
    pub progressions: TriggerBatch,
}

#[derive(Clone, Debug)]
struct CachedWorkout {
    revision: u64,
    program_id: String,
    position: Position,
    view: WorkoutView,
}

// ============================================================================
// Staging
// ============================================================================

/// Writes of one operation, plus the values they imply for later reads
struct Staging<'a, S> {
    store: &'a S,
    user_id: String,
    changes: ChangeSet,
    counters: BTreeMap<CounterKey, FailureCounter>,
    base_versions: HashMap<CounterKey, u64>,
    latest: HashMap<(String, MaxType), Option<(f64, u64)>>,
    applied: HashSet<(String, String, String)>,
}

impl<'a, S: Store> Staging<'a, S> {
    fn new(store: &'a S, user_id: &str) -> Self {
        Self {
            store,
            user_id: user_id.to_string(),
            changes: ChangeSet::default(),
            counters: BTreeMap::new(),
            base_versions: HashMap::new(),
            latest: HashMap::new(),
            applied: HashSet::new(),
        }
    }

    fn counter(&mut self, lift_id: &str, progression_id: &str) -> Result<FailureCounter> {
        let key = CounterKey::new(&self.user_id, lift_id, progression_id);
        if let Some(staged) = self.counters.get(&key) {
            return Ok(staged.clone());
        }
        let stored = self.store.counter(&key)?;
        self.base_versions
            .entry(key.clone())
            .or_insert_with(|| stored.as_ref().map_or(0, |c| c.version));
        Ok(stored.unwrap_or_else(|| FailureCounter::new(key)))
    }

    fn put_counter(&mut self, mut counter: FailureCounter) {
        let base = self.base_versions.get(&counter.key).copied().unwrap_or(0);
        counter.version = base + 1;
        self.counters.insert(counter.key.clone(), counter);
    }

    fn current_max(&mut self, lift_id: &str, max_type: MaxType) -> Result<Option<f64>> {
        let key = (lift_id.to_string(), max_type);
        if let Some(entry) = self.latest.get(&key) {
            return Ok(entry.map(|(value, _)| value));
        }
        let stored = self
            .store
            .current_max(&self.user_id, lift_id, max_type)?
            .map(|m| (m.value, m.sequence));
        self.latest.insert(key, stored);
        Ok(stored.map(|(value, _)| value))
    }

    /// Stage a new max record one past the latest known sequence
    fn append_max(
        &mut self,
        lift_id: &str,
        max_type: MaxType,
        value: f64,
        now: DateTime<Utc>,
    ) -> LiftMax {
        let key = (lift_id.to_string(), max_type);
        let sequence = self
            .latest
            .get(&key)
            .copied()
            .flatten()
            .map_or(0, |(_, sequence)| sequence)
            + 1;
        let record = LiftMax {
            id: Uuid::new_v4(),
            user_id: self.user_id.clone(),
            lift_id: lift_id.to_string(),
            max_type,
            value,
            recorded_at: now,
            sequence,
        };
        self.latest.insert(key, Some((value, sequence)));
        self.changes.max_appends.push(record.clone());
        record
    }

    fn already_applied(&self, progression_id: &str, lift_id: &str, trigger_key: &str) -> Result<bool> {
        let staged = (
            progression_id.to_string(),
            lift_id.to_string(),
            trigger_key.to_string(),
        );
        if self.applied.contains(&staged) {
            return Ok(true);
        }
        self.store
            .progression_applied(&self.user_id, progression_id, lift_id, trigger_key)
    }

    fn log(&mut self, entry: ProgressionLogEntry) {
        self.applied.insert((
            entry.progression_id.clone(),
            entry.lift_id.clone(),
            entry.trigger_key.clone(),
        ));
        self.changes.log_entries.push(entry);
    }

    fn put_enrollment(&mut self, state: EnrollmentState) {
        self.changes.enrollments.push(EnrollmentWrite::Put(state));
    }

    fn put_session(&mut self, session: WorkoutSession) {
        self.changes.sessions.push(SessionWrite::Put(session));
    }

    fn into_changes(mut self) -> ChangeSet {
        self.changes.counters.extend(self.counters.into_values());
        self.changes
    }
}

/// One trigger firing over a set of links
struct Firing<'a> {
    trigger: TriggerType,
    trigger_key: String,
    forced: bool,
    links: Vec<&'a ProgressionLink>,
    performance: HashMap<String, LiftPerformance>,
}

// ============================================================================
// Engine
// ============================================================================

pub struct TrainingEngine<S: Store> {
    store: S,
    registry: ProgressionRegistry,
    default_rounding: Rounding,
    locks: DashMap<String, Arc<Mutex<()>>>,
    workouts: DashMap<String, CachedWorkout>,
}

impl<S: Store> TrainingEngine<S> {
    pub fn new(store: S) -> Self {
        Self::with_registry(store, ProgressionRegistry::default())
    }

    pub fn with_registry(store: S, registry: ProgressionRegistry) -> Self {
        Self {
            store,
            registry,
            default_rounding: Rounding::default(),
            locks: DashMap::new(),
            workouts: DashMap::new(),
        }
    }

    /// Rounding for fatigue-drop sets whose prescription carries none
    pub fn with_default_rounding(mut self, rounding: Rounding) -> Self {
        self.default_rounding = rounding;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn user_lock(&self, user_id: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Enrollment for `user_id`, checked against the transition table for `command`
    fn enrollment_for(&self, user_id: &str, command: Command) -> Result<EnrollmentState> {
        let state = self.store.enrollment(user_id)?;
        transition(phase_of(state.as_ref()), command)?;
        state.ok_or_else(|| {
            Error::State(format!("user '{}' is not enrolled in a program", user_id))
        })
    }

    fn max_snapshot(&self, user_id: &str, graph: &ProgramGraph) -> Result<MaxSnapshot> {
        let mut maxes = MaxSnapshot::new();
        for lift in &graph.lifts {
            for max_type in [MaxType::TrainingMax, MaxType::OneRm] {
                if let Some(record) = self.store.current_max(user_id, &lift.id, max_type)? {
                    maxes.insert(&lift.id, max_type, record.value);
                }
            }
        }
        Ok(maxes)
    }

    /// Performance on each lift in its most recent finished session
    fn latest_performance<'l>(
        &self,
        user_id: &str,
        lift_ids: impl Iterator<Item = &'l str>,
    ) -> Result<HashMap<String, LiftPerformance>> {
        let sessions = self.store.user_sessions(user_id)?;
        let mut performance = HashMap::new();
        for lift_id in lift_ids {
            if performance.contains_key(lift_id) {
                continue;
            }
            let latest = sessions.iter().rev().find(|s| {
                s.status == SessionStatus::Finished && s.sets_for_lift(lift_id).next().is_some()
            });
            if let Some(session) = latest {
                performance.insert(
                    lift_id.to_string(),
                    LiftPerformance::from_session(session, lift_id),
                );
            }
        }
        Ok(performance)
    }

    /// Enabled links whose progression fires on `trigger`, in priority order.
    /// Links to unknown progressions are kept so they surface as errors.
    fn links_for<'g>(
        &self,
        graph: &'g ProgramGraph,
        trigger: TriggerType,
        lift_id: Option<&str>,
    ) -> Vec<&'g ProgressionLink> {
        graph
            .active_links()
            .into_iter()
            .filter(|l| lift_id.map_or(true, |id| l.lift_id == id))
            .filter(|l| {
                graph
                    .progression(&l.progression_id)
                    .map_or(true, |p| p.trigger == trigger)
            })
            .collect()
    }

    fn fire(
        &self,
        staging: &mut Staging<'_, S>,
        graph: &ProgramGraph,
        firing: &Firing<'_>,
        now: DateTime<Utc>,
    ) -> TriggerBatch {
        let mut batch = TriggerBatch::default();
        for link in &firing.links {
            let outcome = match self.fire_link(staging, graph, link, firing, now) {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::warn!(
                        "Progression '{}' on {} failed: {}",
                        link.progression_id,
                        link.lift_id,
                        e
                    );
                    ProgressionOutcome::Error {
                        message: e.to_string(),
                    }
                }
            };
            batch.push(TriggerResult {
                lift_id: link.lift_id.clone(),
                progression_id: link.progression_id.clone(),
                trigger: firing.trigger,
                outcome,
            });
        }
        batch
    }

    fn fire_link(
        &self,
        staging: &mut Staging<'_, S>,
        graph: &ProgramGraph,
        link: &ProgressionLink,
        firing: &Firing<'_>,
        now: DateTime<Utc>,
    ) -> Result<ProgressionOutcome> {
        let progression = graph.progression(&link.progression_id).ok_or_else(|| {
            Error::NotFound(format!(
                "Progression '{}' in program '{}'",
                link.progression_id, graph.program.id
            ))
        })?;

        if let Some(reason) =
            progression::trigger_mismatch(progression, firing.trigger, firing.forced)
        {
            return Ok(ProgressionOutcome::Skipped { reason });
        }
        if !firing.forced
            && staging.already_applied(&progression.id, &link.lift_id, &firing.trigger_key)?
        {
            return Ok(ProgressionOutcome::Skipped {
                reason: format!("already applied for {}", firing.trigger_key),
            });
        }

        let current = staging
            .current_max(&link.lift_id, progression.max_type)?
            .ok_or_else(|| {
                Error::Validation(format!(
                    "No {} recorded for lift '{}'",
                    progression.max_type, link.lift_id
                ))
            })?;
        let counter = staging.counter(&link.lift_id, &progression.id)?;

        let ctx = HandlerContext {
            trigger: firing.trigger,
            forced: firing.forced,
            progression,
            link,
            current,
            counter: &counter,
            performance: firing.performance.get(&link.lift_id),
        };
        let decision = self.registry.evaluate(&ctx)?;

        let stage_index = match progression.rule {
            ProgressionRule::Stage { .. } => Some(
                decision
                    .counter
                    .as_ref()
                    .map_or(counter.current_stage_index, |c| c.current_stage_index),
            ),
            _ => None,
        };
        if let Some(updated) = decision.counter {
            staging.put_counter(updated);
        }

        match decision.verdict {
            Verdict::Skip { reason } => {
                tracing::debug!(
                    "Progression '{}' on {} skipped: {}",
                    progression.id,
                    link.lift_id,
                    reason
                );
                Ok(ProgressionOutcome::Skipped { reason })
            }
            Verdict::Adjust { delta } => {
                let new_value = apply_delta(current, delta);
                if new_value != current {
                    staging.append_max(&link.lift_id, progression.max_type, new_value, now);
                }
                let applied = ((new_value - current) * 100.0).round() / 100.0;
                staging.log(ProgressionLogEntry {
                    user_id: staging.user_id.clone(),
                    progression_id: progression.id.clone(),
                    lift_id: link.lift_id.clone(),
                    trigger_key: firing.trigger_key.clone(),
                    delta: applied,
                    applied_at: now,
                });

                tracing::info!(
                    "{}: {} {} {} -> {} via '{}' ({})",
                    staging.user_id,
                    link.lift_id,
                    progression.max_type,
                    current,
                    new_value,
                    progression.id,
                    firing.trigger_key
                );
                Ok(ProgressionOutcome::Applied(AppliedChange {
                    previous_value: current,
                    new_value,
                    delta: applied,
                    max_type: progression.max_type,
                    applied_at: now,
                    stage_index,
                }))
            }
        }
    }

    fn session_owner(&self, session_id: Uuid) -> Result<String> {
        self.store
            .session(session_id)?
            .map(|s| s.user_id)
            .ok_or_else(|| Error::NotFound(format!("Session {}", session_id)))
    }

    /// The session and its enrollment, provided the session is the active one
    fn open_session(&self, session_id: Uuid) -> Result<(WorkoutSession, EnrollmentState)> {
        let session = self
            .store
            .session(session_id)?
            .ok_or_else(|| Error::NotFound(format!("Session {}", session_id)))?;
        if session.status != SessionStatus::InProgress {
            return Err(Error::State(format!(
                "session {} is already finished",
                session_id
            )));
        }
        let state = self.store.enrollment(&session.user_id)?.ok_or_else(|| {
            Error::State(format!(
                "user '{}' is not enrolled in a program",
                session.user_id
            ))
        })?;
        if state.active_session() != Some(session_id) {
            return Err(Error::State(format!(
                "session {} is not the user's active session",
                session_id
            )));
        }
        Ok((session, state))
    }

    // ------------------------------------------------------------------------
    // Enrollment
    // ------------------------------------------------------------------------

    pub fn enroll(&self, user_id: &str, program_id: &str) -> Result<EnrollmentState> {
        let lock = self.user_lock(user_id);
        let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());

        let graph = self.store.program(program_id)?;
        assembler::scheduled_day(&graph, 1, 0)?;

        let current = self.store.enrollment(user_id)?;
        let state = EnrollmentState::enroll(current.as_ref(), user_id, program_id, Utc::now())?;

        self.store.commit(ChangeSet {
            enrollments: vec![EnrollmentWrite::Put(state.clone())],
            ..Default::default()
        })?;
        Ok(state)
    }

    /// Leave the program, discarding any in-progress session
    pub fn unenroll(&self, user_id: &str) -> Result<()> {
        let lock = self.user_lock(user_id);
        let guard = lock.lock().unwrap_or_else(|e| e.into_inner());

        let state = self.enrollment_for(user_id, Command::Unenroll)?;
        let mut changes = ChangeSet {
            enrollments: vec![EnrollmentWrite::Remove(user_id.to_string())],
            ..Default::default()
        };
        if let Some(session_id) = state.active_session() {
            tracing::info!("{}: discarding session {}", user_id, session_id);
            changes.sessions.push(SessionWrite::Remove(session_id));
        }
        self.store.commit(changes)?;
        self.workouts.remove(user_id);
        drop(guard);
        drop(lock);

        // Only the map holds the lock once no other call is waiting on it
        self.locks.remove_if(user_id, |_, lock| Arc::strong_count(lock) == 1);

        tracing::info!("{}: unenrolled from {}", user_id, state.program_id);
        Ok(())
    }

    pub fn enrollment(&self, user_id: &str) -> Result<Option<EnrollmentState>> {
        self.store.enrollment(user_id)
    }

    // ------------------------------------------------------------------------
    // Read Path
    // ------------------------------------------------------------------------

    /// Today's workout at the user's current position
    pub fn compute_workout(&self, user_id: &str) -> Result<WorkoutView> {
        // Read the revision first so a racing commit can only make the entry stale
        let revision = self.store.revision();
        let state = self.enrollment_for(user_id, Command::GenerateWorkout)?;
        let position = Position::from(&state);

        if let Some(cached) = self.workouts.get(user_id) {
            if cached.revision == revision
                && cached.position == position
                && cached.program_id == state.program_id
            {
                tracing::debug!("{}: workout cache hit", user_id);
                return Ok(cached.view.clone());
            }
        }

        let graph = self.store.program(&state.program_id)?;
        let maxes = self.max_snapshot(user_id, &graph)?;
        let view = assembler::assemble(&graph, position, &maxes, self.default_rounding)?;

        self.workouts.insert(
            user_id.to_string(),
            CachedWorkout {
                revision,
                program_id: state.program_id.clone(),
                position,
                view: view.clone(),
            },
        );
        Ok(view)
    }

    /// Next set of a fatigue-drop prescription, replayed from the sets logged
    /// so far in the session. `None` once the sequence is finished.
    pub fn next_fatigue_set(
        &self,
        session_id: Uuid,
        prescription_id: &str,
    ) -> Result<Option<PlannedSet>> {
        let session = self
            .store
            .session(session_id)?
            .ok_or_else(|| Error::NotFound(format!("Session {}", session_id)))?;
        if session.status != SessionStatus::InProgress {
            return Err(Error::State(format!(
                "session {} is already finished",
                session_id
            )));
        }

        let graph = self.store.program(&session.program_id)?;
        let prescription = graph.prescription(prescription_id).ok_or_else(|| {
            Error::NotFound(format!(
                "Prescription '{}' in program '{}'",
                prescription_id, graph.program.id
            ))
        })?;
        if !matches!(prescription.scheme, SetScheme::FatigueDrop { .. }) {
            return Err(Error::Validation(format!(
                "Prescription '{}' is not a fatigue_drop scheme",
                prescription_id
            )));
        }

        let history = session
            .logged_sets
            .iter()
            .filter(|s| s.prescription_id == prescription_id)
            .map(|s| {
                let rpe = s.rpe.ok_or_else(|| {
                    Error::Validation(format!(
                        "Set {} of '{}' was logged without an RPE",
                        s.set_number, prescription_id
                    ))
                })?;
                Ok(SetOutcome {
                    reps: s.reps_performed,
                    rpe,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let maxes = self.max_snapshot(&session.user_id, &graph)?;
        let ctx = LoadContext {
            maxes: &maxes,
            weekly: graph
                .weekly_lookup
                .as_ref()
                .and_then(|l| l.entry(session.week_number)),
            daily: graph
                .daily_lookup
                .as_ref()
                .and_then(|l| l.entry(&session.day_slug)),
            default_rounding: self.default_rounding,
        };

        let sequence = FatigueDropSequence::start(
            &prescription.lift_id,
            &prescription.scheme,
            &prescription.load,
            &ctx,
        )?;
        let mut sets = sequence.replay(&history)?;
        Ok(if sets.len() > history.len() {
            sets.pop()
        } else {
            None
        })
    }

    // ------------------------------------------------------------------------
    // Sessions
    // ------------------------------------------------------------------------

    pub fn start_session(&self, user_id: &str) -> Result<Uuid> {
        let lock = self.user_lock(user_id);
        let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());

        let mut state = self.enrollment_for(user_id, Command::StartSession)?;
        let graph = self.store.program(&state.program_id)?;
        let day = assembler::scheduled_day(&graph, state.current_week, state.current_day_index)?;

        let now = Utc::now();
        let session_id = Uuid::new_v4();
        let session = WorkoutSession {
            id: session_id,
            user_id: user_id.to_string(),
            program_id: state.program_id.clone(),
            cycle_iteration: state.cycle_iteration,
            week_number: state.current_week,
            day_slug: day.slug.clone(),
            status: SessionStatus::InProgress,
            started_at: now,
            finished_at: None,
            logged_sets: Vec::new(),
        };
        state.start_session(session_id, now)?;

        self.store.commit(ChangeSet {
            enrollments: vec![EnrollmentWrite::Put(state)],
            sessions: vec![SessionWrite::Put(session)],
            ..Default::default()
        })?;
        Ok(session_id)
    }

    /// Append sets to the active session, updating failure counters and
    /// firing ON_FAILURE progressions for short sets
    pub fn log_sets(&self, session_id: Uuid, sets: Vec<LoggedSet>) -> Result<LogOutcome> {
        let user_id = self.session_owner(session_id)?;
        let lock = self.user_lock(&user_id);
        let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());

        let (mut session, state) = self.open_session(session_id)?;
        state.ensure(Command::LogSet)?;

        let graph = self.store.program(&session.program_id)?;
        for set in &sets {
            validate_set(&graph, &session, set)?;
        }

        let now = Utc::now();
        let links = graph.active_links();
        let mut staging = Staging::new(&self.store, &user_id);
        let mut failures = Vec::new();
        let mut batch = TriggerBatch::default();
        let sets_logged = sets.len();

        for set in sets {
            for link in links.iter().filter(|l| l.lift_id == set.lift_id) {
                let Some(progression) = graph.progression(&link.progression_id) else {
                    continue;
                };
                if let Some(assessment) = failure::assess_set(&progression.rule, &set) {
                    let mut counter = staging.counter(&link.lift_id, &progression.id)?;
                    failure::record(&mut counter, assessment);
                    staging.put_counter(counter);
                }
            }

            let short = set.is_short();
            let lift_id = set.lift_id.clone();
            let set_number = set.set_number;
            session.logged_sets.push(set);

            if short {
                let event = LifecycleEvent::SetFailed {
                    session_id,
                    lift_id: lift_id.clone(),
                    set_number,
                };
                let firing = Firing {
                    trigger: TriggerType::OnFailure,
                    trigger_key: event.trigger_key(),
                    forced: false,
                    links: self.links_for(&graph, TriggerType::OnFailure, Some(&lift_id)),
                    performance: HashMap::from([(
                        lift_id.clone(),
                        LiftPerformance::from_session(&session, &lift_id),
                    )]),
                };
                batch.extend(self.fire(&mut staging, &graph, &firing, now));
                failures.push(event);
            }
        }

        staging.put_session(session);
        self.store.commit(staging.into_changes())?;

        tracing::info!(
            "{}: logged {} sets in session {} ({} short)",
            user_id,
            sets_logged,
            session_id,
            failures.len()
        );
        Ok(LogOutcome {
            session_id,
            sets_logged,
            failures,
            progressions: batch,
        })
    }

    /// Close the active session and fire AFTER_SESSION progressions for every
    /// lift it logged. Never advances the calendar.
    pub fn finish_session(&self, session_id: Uuid) -> Result<FinishOutcome> {
        let user_id = self.session_owner(session_id)?;
        let lock = self.user_lock(&user_id);
        let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());

        let (mut session, mut state) = self.open_session(session_id)?;
        let now = Utc::now();
        state.finish_session(session_id, now)?;
        session.status = SessionStatus::Finished;
        session.finished_at = Some(now);

        let graph = self.store.program(&session.program_id)?;
        let lift_ids = session.lift_ids();
        let mut staging = Staging::new(&self.store, &user_id);

        // Volume-gated counters are judged on the whole session
        for lift_id in &lift_ids {
            let volume = failure::session_volume(&session, lift_id);
            for link in graph.active_links().into_iter().filter(|l| &l.lift_id == lift_id) {
                let Some(progression) = graph.progression(&link.progression_id) else {
                    continue;
                };
                let mut counter = staging.counter(lift_id, &progression.id)?;
                if let Some(assessment) =
                    failure::assess_session(&progression.rule, &counter, volume)
                {
                    failure::record(&mut counter, assessment);
                    staging.put_counter(counter);
                }
            }
        }

        let event = LifecycleEvent::SessionFinished {
            session_id,
            lift_ids: lift_ids.clone(),
        };
        let firing = Firing {
            trigger: event.trigger(),
            trigger_key: event.trigger_key(),
            forced: false,
            links: self
                .links_for(&graph, TriggerType::AfterSession, None)
                .into_iter()
                .filter(|l| lift_ids.contains(&l.lift_id))
                .collect(),
            performance: lift_ids
                .iter()
                .map(|id| (id.clone(), LiftPerformance::from_session(&session, id)))
                .collect(),
        };
        let batch = self.fire(&mut staging, &graph, &firing, now);

        staging.put_session(session.clone());
        staging.put_enrollment(state);
        self.store.commit(staging.into_changes())?;

        Ok(FinishOutcome {
            session,
            progressions: batch,
        })
    }

    // ------------------------------------------------------------------------
    // Calendar
    // ------------------------------------------------------------------------

    /// Move to the next scheduled day, firing AFTER_WEEK / AFTER_CYCLE
    /// progressions when a week or the cycle completes
    pub fn advance(&self, user_id: &str) -> Result<AdvanceOutcome> {
        let lock = self.user_lock(user_id);
        let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());

        let mut state = self.enrollment_for(user_id, Command::Advance)?;
        let graph = self.store.program(&state.program_id)?;
        let now = Utc::now();
        let events = state.advance(&graph.cycle, now)?;
        assembler::scheduled_day(&graph, state.current_week, state.current_day_index)?;

        let mut staging = Staging::new(&self.store, user_id);
        let mut batch = TriggerBatch::default();
        for event in &events {
            let trigger = event.trigger();
            let links = self.links_for(&graph, trigger, None);
            if links.is_empty() {
                continue;
            }
            let performance =
                self.latest_performance(user_id, links.iter().map(|l| l.lift_id.as_str()))?;
            let firing = Firing {
                trigger,
                trigger_key: event.trigger_key(),
                forced: false,
                links,
                performance,
            };
            batch.extend(self.fire(&mut staging, &graph, &firing, now));
        }

        staging.put_enrollment(state.clone());
        self.store.commit(staging.into_changes())?;

        Ok(AdvanceOutcome {
            enrollment: state,
            events,
            progressions: batch,
        })
    }

    pub fn next_cycle(&self, user_id: &str) -> Result<EnrollmentState> {
        let lock = self.user_lock(user_id);
        let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());

        let mut state = self.enrollment_for(user_id, Command::NextCycle)?;
        state.next_cycle(Utc::now())?;

        self.store.commit(ChangeSet {
            enrollments: vec![EnrollmentWrite::Put(state.clone())],
            ..Default::default()
        })?;
        Ok(state)
    }

    // ------------------------------------------------------------------------
    // Progressions and Maxes
    // ------------------------------------------------------------------------

    /// Fire a progression by hand for every enabled link (or just `lift_id`).
    ///
    /// Progressions registered for another trigger fire only with `force`,
    /// which also bypasses the once-per-position guard.
    pub fn trigger_progression(
        &self,
        user_id: &str,
        progression_id: &str,
        lift_id: Option<&str>,
        force: bool,
    ) -> Result<TriggerBatch> {
        let lock = self.user_lock(user_id);
        let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());

        let state = self.store.enrollment(user_id)?.ok_or_else(|| {
            Error::State(format!("user '{}' is not enrolled in a program", user_id))
        })?;
        let graph = self.store.program(&state.program_id)?;
        if graph.progression(progression_id).is_none() {
            return Err(Error::NotFound(format!(
                "Progression '{}' in program '{}'",
                progression_id, graph.program.id
            )));
        }

        let links: Vec<_> = graph
            .active_links()
            .into_iter()
            .filter(|l| l.progression_id == progression_id)
            .filter(|l| lift_id.map_or(true, |id| l.lift_id == id))
            .collect();
        if links.is_empty() {
            return Err(Error::NotFound(format!(
                "No enabled link for progression '{}'{}",
                progression_id,
                lift_id.map(|id| format!(" on lift '{}'", id)).unwrap_or_default()
            )));
        }

        let performance =
            self.latest_performance(user_id, links.iter().map(|l| l.lift_id.as_str()))?;
        let firing = Firing {
            trigger: TriggerType::Manual,
            trigger_key: format!(
                "manual:{}:{}:{}:{}",
                state.enrollment_id,
                state.cycle_iteration,
                state.current_week,
                state.current_day_index
            ),
            forced: force,
            links,
            performance,
        };

        let mut staging = Staging::new(&self.store, user_id);
        let batch = self.fire(&mut staging, &graph, &firing, Utc::now());
        self.store.commit(staging.into_changes())?;
        Ok(batch)
    }

    /// Append a max the user entered directly
    pub fn record_max(
        &self,
        user_id: &str,
        lift_id: &str,
        max_type: MaxType,
        value: f64,
    ) -> Result<LiftMax> {
        if !(value.is_finite() && value > 0.0) {
            return Err(Error::Validation(format!(
                "Max must be a positive number, got {}",
                value
            )));
        }

        let lock = self.user_lock(user_id);
        let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());

        let mut staging = Staging::new(&self.store, user_id);
        staging.current_max(lift_id, max_type)?;
        let record = staging.append_max(lift_id, max_type, value, Utc::now());
        self.store.commit(staging.into_changes())?;

        tracing::info!(
            "{}: recorded {} {} = {} (#{})",
            user_id,
            lift_id,
            max_type,
            value,
            record.sequence
        );
        Ok(record)
    }

    pub fn max_history(
        &self,
        user_id: &str,
        lift_id: &str,
        max_type: MaxType,
    ) -> Result<Vec<LiftMax>> {
        self.store.max_history(user_id, lift_id, max_type)
    }
}

/// A logged set must belong to the session's day and carry sane numbers
fn validate_set(graph: &ProgramGraph, session: &WorkoutSession, set: &LoggedSet) -> Result<()> {
    let prescription = graph
        .day(&session.day_slug)
        .and_then(|d| d.prescriptions.iter().find(|p| p.id == set.prescription_id))
        .ok_or_else(|| {
            Error::NotFound(format!(
                "Prescription '{}' on day '{}'",
                set.prescription_id, session.day_slug
            ))
        })?;

    if prescription.lift_id != set.lift_id {
        return Err(Error::Validation(format!(
            "Prescription '{}' is for '{}', not '{}'",
            prescription.id, prescription.lift_id, set.lift_id
        )));
    }
    if set.set_number == 0 {
        return Err(Error::Validation("Set numbers start at 1".into()));
    }
    if !(set.weight.is_finite() && set.weight >= 0.0) {
        return Err(Error::Validation(format!(
            "Weight must be a non-negative number, got {}",
            set.weight
        )));
    }
    if let Some(rpe) = set.rpe {
        if !(0.0..=10.0).contains(&rpe) {
            return Err(Error::Validation(format!("RPE must be 0-10, got {}", rpe)));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::testing::{link, prescription, progression, sample_program};
    use crate::{EnrollmentStatus, LoadStrategy, RoundingDirection, Stage};

    const USER: &str = "u1";

    fn engine_with(graph: ProgramGraph) -> TrainingEngine<MemoryStore> {
        crate::logging::init_test();
        let store = MemoryStore::new();
        store.put_program(graph);
        TrainingEngine::new(store)
    }

    fn logged(prescription_id: &str, lift_id: &str, n: u32, target: u32, performed: u32) -> LoggedSet {
        LoggedSet {
            prescription_id: prescription_id.into(),
            lift_id: lift_id.into(),
            set_number: n,
            weight: 100.0,
            target_reps: target,
            reps_performed: performed,
            is_amrap: false,
            rpe: None,
        }
    }

    fn current(engine: &TrainingEngine<MemoryStore>, lift_id: &str) -> f64 {
        engine
            .store()
            .current_max(USER, lift_id, MaxType::TrainingMax)
            .unwrap()
            .unwrap()
            .value
    }

    fn enrolled(graph: ProgramGraph) -> TrainingEngine<MemoryStore> {
        let engine = engine_with(graph);
        engine.enroll(USER, "sample").unwrap();
        engine.record_max(USER, "squat", MaxType::TrainingMax, 200.0).unwrap();
        engine.record_max(USER, "bench", MaxType::TrainingMax, 300.0).unwrap();
        engine.record_max(USER, "deadlift", MaxType::TrainingMax, 400.0).unwrap();
        engine
    }

    #[test]
    fn test_workout_requires_enrollment() {
        let engine = engine_with(sample_program());
        assert!(matches!(engine.compute_workout(USER), Err(Error::State(_))));
    }

    #[test]
    fn test_workout_is_cached_until_maxes_change() {
        let engine = enrolled(sample_program());

        let first = engine.compute_workout(USER).unwrap();
        let second = engine.compute_workout(USER).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.exercises[0].sets[0].weight, 170.0);

        engine.record_max(USER, "squat", MaxType::TrainingMax, 220.0).unwrap();
        let third = engine.compute_workout(USER).unwrap();
        assert_eq!(third.exercises[0].sets[0].weight, 187.0);
    }

    #[test]
    fn test_enroll_twice_and_unknown_program() {
        let engine = engine_with(sample_program());
        engine.enroll(USER, "sample").unwrap();
        assert!(matches!(engine.enroll(USER, "sample"), Err(Error::State(_))));
        assert!(matches!(engine.enroll("u2", "missing"), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_second_session_is_state_error() {
        let engine = enrolled(sample_program());
        engine.start_session(USER).unwrap();
        assert!(matches!(engine.start_session(USER), Err(Error::State(_))));
        assert!(matches!(engine.advance(USER), Err(Error::State(_))));
    }

    #[test]
    fn test_deload_on_failure_after_second_consecutive_failure() {
        let engine = enrolled(sample_program());
        let session = engine.start_session(USER).unwrap();
        let key = CounterKey::new(USER, "bench", "bench-deload");

        let first = engine
            .log_sets(session, vec![logged("a-bench", "bench", 1, 5, 3)])
            .unwrap();
        assert_eq!(first.failures.len(), 1);
        assert_eq!(first.progressions.total_applied, 0);
        assert_eq!(
            engine.store().counter(&key).unwrap().unwrap().consecutive_failures,
            1
        );

        let second = engine
            .log_sets(session, vec![logged("a-bench", "bench", 2, 5, 4)])
            .unwrap();
        assert_eq!(second.progressions.total_applied, 1);
        let (_, change) = second.progressions.applied().next().unwrap();
        assert_eq!(change.delta, -30.0);
        assert_eq!(change.new_value, 270.0);
        assert_eq!(current(&engine, "bench"), 270.0);
        assert_eq!(
            engine.store().counter(&key).unwrap().unwrap().consecutive_failures,
            2
        );

        // One deload per session
        let third = engine
            .log_sets(session, vec![logged("a-bench", "bench", 3, 5, 2)])
            .unwrap();
        assert_eq!(third.progressions.total_applied, 0);
        assert_eq!(third.progressions.total_skipped, 1);
        assert_eq!(current(&engine, "bench"), 270.0);
    }

    #[test]
    fn test_full_set_resets_counter() {
        let engine = enrolled(sample_program());
        let session = engine.start_session(USER).unwrap();
        engine
            .log_sets(
                session,
                vec![
                    logged("a-bench", "bench", 1, 5, 3),
                    logged("a-bench", "bench", 2, 5, 5),
                ],
            )
            .unwrap();

        let key = CounterKey::new(USER, "bench", "bench-deload");
        let counter = engine.store().counter(&key).unwrap().unwrap();
        assert_eq!(counter.consecutive_failures, 0);
        assert_eq!(counter.version, 1);
    }

    #[test]
    fn test_finish_session_applies_after_session_once() {
        let engine = enrolled(sample_program());
        let session = engine.start_session(USER).unwrap();
        let sets = (1..=3).map(|n| logged("a-squat", "squat", n, 5, 5)).collect();
        engine.log_sets(session, sets).unwrap();

        let outcome = engine.finish_session(session).unwrap();
        assert_eq!(outcome.session.status, SessionStatus::Finished);
        assert_eq!(outcome.progressions.total_applied, 1);
        assert_eq!(current(&engine, "squat"), 205.0);

        assert!(matches!(engine.finish_session(session), Err(Error::State(_))));
        assert!(matches!(
            engine.log_sets(session, vec![logged("a-squat", "squat", 4, 5, 5)]),
            Err(Error::State(_))
        ));

        // Finishing never moves the calendar
        let state = engine.enrollment(USER).unwrap().unwrap();
        assert_eq!((state.current_week, state.current_day_index), (1, 0));
    }

    #[test]
    fn test_logged_set_must_match_the_day() {
        let engine = enrolled(sample_program());
        let session = engine.start_session(USER).unwrap();

        assert!(matches!(
            engine.log_sets(session, vec![logged("b-deadlift", "deadlift", 1, 5, 5)]),
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            engine.log_sets(session, vec![logged("a-squat", "bench", 1, 5, 5)]),
            Err(Error::Validation(_))
        ));
        let stored = engine.store().session(session).unwrap().unwrap();
        assert!(stored.logged_sets.is_empty());
    }

    #[test]
    fn test_cycle_wrap_gates_until_next_cycle() {
        let mut graph = sample_program();
        graph.progressions.push(progression(
            "squat-cycle",
            TriggerType::AfterCycle,
            ProgressionRule::Cycle { increment: 10.0 },
        ));
        graph.program.progressions.push(link("squat-cycle", "squat", 3));
        let engine = enrolled(graph);

        let mut last = None;
        for _ in 0..6 {
            last = Some(engine.advance(USER).unwrap());
        }
        let last = last.unwrap();
        assert_eq!(
            last.events,
            vec![
                LifecycleEvent::WeekAdvanced {
                    enrollment_id: last.enrollment.enrollment_id,
                    cycle_iteration: 1,
                    completed_week: 2
                },
                LifecycleEvent::CycleAdvanced {
                    enrollment_id: last.enrollment.enrollment_id,
                    completed_iteration: 1
                },
            ]
        );
        assert_eq!(last.enrollment.current_week, 1);
        assert_eq!(last.enrollment.cycle_iteration, 2);
        assert_eq!(last.enrollment.status, EnrollmentStatus::BetweenCycles);
        assert_eq!(last.progressions.total_applied, 1);
        assert_eq!(current(&engine, "squat"), 210.0);

        assert!(matches!(engine.compute_workout(USER), Err(Error::State(_))));
        assert!(matches!(engine.advance(USER), Err(Error::State(_))));
        assert!(matches!(engine.start_session(USER), Err(Error::State(_))));

        let state = engine.next_cycle(USER).unwrap();
        assert_eq!(state.status, EnrollmentStatus::Active);
        let view = engine.compute_workout(USER).unwrap();
        assert_eq!(view.cycle_iteration, 2);
        assert_eq!(view.week_number, 1);
    }

    #[test]
    fn test_reenrollment_fires_calendar_progressions_again() {
        let mut graph = sample_program();
        graph.progressions.push(progression(
            "squat-cycle",
            TriggerType::AfterCycle,
            ProgressionRule::Cycle { increment: 10.0 },
        ));
        graph.program.progressions.push(link("squat-cycle", "squat", 3));
        let engine = enrolled(graph);

        for _ in 0..6 {
            engine.advance(USER).unwrap();
        }
        assert_eq!(current(&engine, "squat"), 210.0);

        engine.unenroll(USER).unwrap();
        engine.enroll(USER, "sample").unwrap();

        let mut last = None;
        for _ in 0..6 {
            last = Some(engine.advance(USER).unwrap());
        }
        let last = last.unwrap();
        assert_eq!(last.progressions.total_applied, 1);
        assert_eq!(current(&engine, "squat"), 220.0);
    }

    #[test]
    fn test_unenroll_releases_user_lock() {
        let engine = enrolled(sample_program());
        assert!(engine.locks.contains_key(USER));

        engine.unenroll(USER).unwrap();
        assert!(!engine.locks.contains_key(USER));

        // A fresh lock is created on the next call
        engine.enroll(USER, "sample").unwrap();
        assert!(engine.locks.contains_key(USER));
    }

    #[test]
    fn test_advance_into_missing_week_leaves_state() {
        let mut graph = sample_program();
        graph.cycle.weeks.truncate(1);
        let engine = enrolled(graph);

        engine.advance(USER).unwrap();
        engine.advance(USER).unwrap();
        let before = engine.enrollment(USER).unwrap();

        assert!(matches!(engine.advance(USER), Err(Error::NotFound(_))));
        assert_eq!(engine.enrollment(USER).unwrap(), before);
    }

    #[test]
    fn test_stage_progression_walks_stages_then_resets() {
        let mut graph = sample_program();
        graph.progressions.push(progression(
            "squat-stages",
            TriggerType::AfterSession,
            ProgressionRule::Stage {
                stages: vec![
                    Stage { name: "3x5".into(), sets: 3, reps: 5, min_volume: 15 },
                    Stage { name: "3x4".into(), sets: 3, reps: 4, min_volume: 12 },
                ],
                reset_on_exhaustion: true,
                deload_on_reset: true,
                deload_percent: 0.10,
                increment: 0.0,
            },
        ));
        graph.program.progressions = vec![link("squat-stages", "squat", 1)];
        let engine = enrolled(graph);

        let run = |reps: u32| {
            let session = engine.start_session(USER).unwrap();
            let sets = (1..=3).map(|n| logged("a-squat", "squat", n, 5, reps)).collect();
            engine.log_sets(session, sets).unwrap();
            engine.finish_session(session).unwrap().progressions
        };

        // 12 < 15: move to the next stage, weight unchanged
        let batch = run(4);
        let (_, change) = batch.applied().next().unwrap();
        assert_eq!(change.delta, 0.0);
        assert_eq!(change.stage_index, Some(1));
        assert_eq!(current(&engine, "squat"), 200.0);

        // 12 >= 12 with no increment: nothing to do
        let batch = run(4);
        assert_eq!(batch.total_skipped, 1);

        // 9 < 12 on the last stage: reset and deload
        let batch = run(3);
        let (_, change) = batch.applied().next().unwrap();
        assert_eq!(change.stage_index, Some(0));
        assert_eq!(change.new_value, 180.0);

        let counter = engine
            .store()
            .counter(&CounterKey::new(USER, "squat", "squat-stages"))
            .unwrap()
            .unwrap();
        assert_eq!(counter.current_stage_index, 0);
    }

    #[test]
    fn test_greyskull_doubles_on_big_amrap() {
        let mut graph = sample_program();
        graph.progressions.push(progression(
            "bench-gslp",
            TriggerType::AfterSession,
            ProgressionRule::Greyskull {
                increment: 2.5,
                min_reps: 5,
                double_threshold: 10,
                deload_percent: 0.10,
            },
        ));
        graph.program.progressions = vec![link("bench-gslp", "bench", 1)];
        let engine = enrolled(graph);
        engine.advance(USER).unwrap();

        let session = engine.start_session(USER).unwrap();
        let mut amrap = logged("b-bench", "bench", 1, 8, 12);
        amrap.is_amrap = true;
        engine.log_sets(session, vec![amrap]).unwrap();

        let outcome = engine.finish_session(session).unwrap();
        let (_, change) = outcome.progressions.applied().next().unwrap();
        assert_eq!(change.delta, 5.0);
        assert_eq!(current(&engine, "bench"), 305.0);
    }

    #[test]
    fn test_manual_trigger_gating_and_force() {
        let engine = enrolled(sample_program());

        let batch = engine
            .trigger_progression(USER, "squat-lp", Some("squat"), false)
            .unwrap();
        assert_eq!(batch.total_skipped, 1);
        assert_eq!(current(&engine, "squat"), 200.0);

        let batch = engine
            .trigger_progression(USER, "squat-lp", Some("squat"), true)
            .unwrap();
        assert_eq!(batch.total_applied, 1);
        assert_eq!(current(&engine, "squat"), 205.0);

        assert!(matches!(
            engine.trigger_progression(USER, "nope", None, true),
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            engine.trigger_progression(USER, "squat-lp", Some("bench"), true),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_missing_max_is_an_error_outcome_not_a_failed_batch() {
        let engine = engine_with(sample_program());
        engine.enroll(USER, "sample").unwrap();

        let batch = engine
            .trigger_progression(USER, "squat-lp", None, true)
            .unwrap();
        assert_eq!(batch.total_errors, 1);
        assert!(engine
            .max_history(USER, "squat", MaxType::TrainingMax)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_concurrent_triggers_never_share_a_previous_value() {
        let engine = Arc::new(enrolled(sample_program()));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let engine = Arc::clone(&engine);
                std::thread::spawn(move || {
                    engine.trigger_progression(USER, "squat-lp", Some("squat"), true)
                })
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap().unwrap().total_applied, 1);
        }

        assert_eq!(current(&engine, "squat"), 240.0);
        let sequences: Vec<_> = engine
            .max_history(USER, "squat", MaxType::TrainingMax)
            .unwrap()
            .iter()
            .map(|m| m.sequence)
            .collect();
        assert_eq!(sequences, (1..=9).collect::<Vec<_>>());
    }

    #[test]
    fn test_unenroll_discards_active_session() {
        let engine = enrolled(sample_program());
        let session = engine.start_session(USER).unwrap();

        engine.unenroll(USER).unwrap();
        assert!(engine.enrollment(USER).unwrap().is_none());
        assert!(engine.store().session(session).unwrap().is_none());
        assert!(matches!(engine.unenroll(USER), Err(Error::State(_))));
    }

    #[test]
    fn test_fatigue_drop_replays_logged_sets() {
        let mut graph = sample_program();
        graph.days[0].prescriptions = vec![prescription(
            "a-fatigue",
            "squat",
            LoadStrategy::RpeTarget {
                target_reps: 5,
                target_rpe: 8.0,
                rounding_increment: 5.0,
                rounding_direction: RoundingDirection::Nearest,
            },
            SetScheme::FatigueDrop {
                target_reps: 5,
                start_rpe: 8.0,
                stop_rpe: 10.0,
                drop_percent: 0.05,
                max_sets: 5,
            },
            1,
        )];
        let engine = enrolled(graph);
        engine.record_max(USER, "squat", MaxType::OneRm, 200.0).unwrap();
        let session = engine.start_session(USER).unwrap();

        let with_rpe = |n: u32, rpe: f64| LoggedSet {
            rpe: Some(rpe),
            ..logged("a-fatigue", "squat", n, 5, 5)
        };

        let opening = engine.next_fatigue_set(session, "a-fatigue").unwrap().unwrap();
        assert_eq!((opening.set_number, opening.weight), (1, 155.0));

        engine.log_sets(session, vec![with_rpe(1, 8.0)]).unwrap();
        let second = engine.next_fatigue_set(session, "a-fatigue").unwrap().unwrap();
        assert_eq!((second.set_number, second.weight), (2, 155.0));

        // Above the 8.5 allowance for set 2: drop 5%
        engine.log_sets(session, vec![with_rpe(2, 9.5)]).unwrap();
        let third = engine.next_fatigue_set(session, "a-fatigue").unwrap().unwrap();
        assert_eq!((third.set_number, third.weight), (3, 145.0));

        engine.log_sets(session, vec![with_rpe(3, 10.0)]).unwrap();
        assert_eq!(engine.next_fatigue_set(session, "a-fatigue").unwrap(), None);

        assert!(matches!(
            engine.next_fatigue_set(session, "a-fatigue-missing"),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_fatigue_drop_needs_reported_rpe() {
        let mut graph = sample_program();
        graph.days[0].prescriptions[0] = prescription(
            "a-fatigue",
            "squat",
            LoadStrategy::RpeTarget {
                target_reps: 5,
                target_rpe: 8.0,
                rounding_increment: 5.0,
                rounding_direction: RoundingDirection::Nearest,
            },
            SetScheme::FatigueDrop {
                target_reps: 5,
                start_rpe: 8.0,
                stop_rpe: 10.0,
                drop_percent: 0.05,
                max_sets: 5,
            },
            3,
        );
        let engine = enrolled(graph);
        engine.record_max(USER, "squat", MaxType::OneRm, 200.0).unwrap();
        let session = engine.start_session(USER).unwrap();

        engine
            .log_sets(session, vec![logged("a-fatigue", "squat", 1, 5, 5)])
            .unwrap();
        assert!(matches!(
            engine.next_fatigue_set(session, "a-fatigue"),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            engine.next_fatigue_set(session, "a-squat"),
            Err(Error::Validation(_))
        ));
    }
}
