//! Collaborator interfaces the engine reads and writes through.
//!
//! Reads go through one trait per concern. Writes never go through the
//! traits directly: an operation stages everything it wants to change in a
//! [`ChangeSet`] and hands it to [`Store::commit`], which applies all of it or
//! none of it. Commit rejects stale lift max sequences and failure counter
//! versions with `ConcurrencyConflict`.

use crate::{
    CounterKey, EnrollmentState, Error, FailureCounter, LiftMax, MaxType, ProgramGraph,
    ProgressionLogEntry, Result, WorkoutSession,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use uuid::Uuid;

// ============================================================================
// Collaborator Traits
// ============================================================================

pub trait ProgramReader {
    fn program(&self, program_id: &str) -> Result<ProgramGraph>;
    fn program_ids(&self) -> Result<Vec<String>>;
}

pub trait LiftMaxStore {
    fn current_max(&self, user_id: &str, lift_id: &str, max_type: MaxType)
        -> Result<Option<LiftMax>>;
    /// Oldest first
    fn max_history(&self, user_id: &str, lift_id: &str, max_type: MaxType)
        -> Result<Vec<LiftMax>>;
    fn user_maxes(&self, user_id: &str) -> Result<Vec<LiftMax>>;
}

pub trait EnrollmentStore {
    fn enrollment(&self, user_id: &str) -> Result<Option<EnrollmentState>>;
}

pub trait SessionStore {
    fn session(&self, session_id: Uuid) -> Result<Option<WorkoutSession>>;
    /// Oldest first
    fn user_sessions(&self, user_id: &str) -> Result<Vec<WorkoutSession>>;
}

pub trait FailureCounterStore {
    fn counter(&self, key: &CounterKey) -> Result<Option<FailureCounter>>;
}

pub trait ProgressionLogStore {
    fn progression_applied(
        &self,
        user_id: &str,
        progression_id: &str,
        lift_id: &str,
        trigger_key: &str,
    ) -> Result<bool>;
    fn progression_log(&self, user_id: &str) -> Result<Vec<ProgressionLogEntry>>;
}

/// Everything the engine needs, plus atomic commit
pub trait Store:
    ProgramReader
    + LiftMaxStore
    + EnrollmentStore
    + SessionStore
    + FailureCounterStore
    + ProgressionLogStore
    + Send
    + Sync
{
    fn commit(&self, changes: ChangeSet) -> Result<()>;

    /// Bumped on every commit and program change; keys the workout cache
    fn revision(&self) -> u64;
}

// ============================================================================
// Change Sets
// ============================================================================

#[derive(Clone, Debug, PartialEq)]
pub enum EnrollmentWrite {
    Put(EnrollmentState),
    Remove(String),
}

#[derive(Clone, Debug, PartialEq)]
pub enum SessionWrite {
    Put(WorkoutSession),
    Remove(Uuid),
}

/// All writes of one operation, committed together
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ChangeSet {
    /// Each record's `sequence` must be exactly one past the key's latest
    pub max_appends: Vec<LiftMax>,
    /// Each counter's `version` must be exactly one past the stored version
    pub counters: Vec<FailureCounter>,
    pub enrollments: Vec<EnrollmentWrite>,
    pub sessions: Vec<SessionWrite>,
    pub log_entries: Vec<ProgressionLogEntry>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.max_appends.is_empty()
            && self.counters.is_empty()
            && self.enrollments.is_empty()
            && self.sessions.is_empty()
            && self.log_entries.is_empty()
    }
}

// ============================================================================
// Store Data
// ============================================================================

/// Mutable user state shared by the in-memory and file-backed stores
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct StoreData {
    #[serde(default)]
    pub maxes: Vec<LiftMax>,
    #[serde(default)]
    pub enrollments: BTreeMap<String, EnrollmentState>,
    #[serde(default)]
    pub sessions: Vec<WorkoutSession>,
    #[serde(default)]
    pub counters: Vec<FailureCounter>,
    #[serde(default)]
    pub progression_log: Vec<ProgressionLogEntry>,
}

impl StoreData {
    fn latest_sequence(&self, user_id: &str, lift_id: &str, max_type: MaxType) -> u64 {
        self.maxes
            .iter()
            .filter(|m| m.user_id == user_id && m.lift_id == lift_id && m.max_type == max_type)
            .map(|m| m.sequence)
            .max()
            .unwrap_or(0)
    }

    pub fn current_max(&self, user_id: &str, lift_id: &str, max_type: MaxType) -> Option<&LiftMax> {
        self.maxes
            .iter()
            .filter(|m| m.user_id == user_id && m.lift_id == lift_id && m.max_type == max_type)
            .max_by_key(|m| m.sequence)
    }

    pub fn max_history(&self, user_id: &str, lift_id: &str, max_type: MaxType) -> Vec<LiftMax> {
        let mut history: Vec<_> = self
            .maxes
            .iter()
            .filter(|m| m.user_id == user_id && m.lift_id == lift_id && m.max_type == max_type)
            .cloned()
            .collect();
        history.sort_by_key(|m| m.sequence);
        history
    }

    pub fn session(&self, session_id: Uuid) -> Option<&WorkoutSession> {
        self.sessions.iter().find(|s| s.id == session_id)
    }

    pub fn counter(&self, key: &CounterKey) -> Option<&FailureCounter> {
        self.counters.iter().find(|c| &c.key == key)
    }

    /// Check a change set against current data without applying it
    pub fn validate(&self, changes: &ChangeSet) -> Result<()> {
        let mut staged: HashMap<(&str, &str, MaxType), u64> = HashMap::new();
        for record in &changes.max_appends {
            let key = (record.user_id.as_str(), record.lift_id.as_str(), record.max_type);
            let latest = match staged.get(&key) {
                Some(sequence) => *sequence,
                None => self.latest_sequence(&record.user_id, &record.lift_id, record.max_type),
            };
            if record.sequence != latest + 1 {
                return Err(Error::ConcurrencyConflict(format!(
                    "{} for {}/{} expected sequence {}, found {}",
                    record.max_type,
                    record.user_id,
                    record.lift_id,
                    latest + 1,
                    record.sequence
                )));
            }
            staged.insert(key, record.sequence);
        }

        for counter in &changes.counters {
            let stored = self.counter(&counter.key).map_or(0, |c| c.version);
            if counter.version != stored + 1 {
                return Err(Error::ConcurrencyConflict(format!(
                    "failure counter {}/{}/{} expected version {}, found {}",
                    counter.key.user_id,
                    counter.key.lift_id,
                    counter.key.progression_id,
                    stored + 1,
                    counter.version
                )));
            }
        }

        Ok(())
    }

    /// Validate then apply; on error nothing changes
    pub fn apply(&mut self, changes: ChangeSet) -> Result<()> {
        self.validate(&changes)?;

        self.maxes.extend(changes.max_appends);

        for counter in changes.counters {
            match self.counters.iter_mut().find(|c| c.key == counter.key) {
                Some(existing) => *existing = counter,
                None => self.counters.push(counter),
            }
        }

        for write in changes.enrollments {
            match write {
                EnrollmentWrite::Put(state) => {
                    self.enrollments.insert(state.user_id.clone(), state);
                }
                EnrollmentWrite::Remove(user_id) => {
                    self.enrollments.remove(&user_id);
                }
            }
        }

        for write in changes.sessions {
            match write {
                SessionWrite::Put(session) => {
                    match self.sessions.iter_mut().find(|s| s.id == session.id) {
                        Some(existing) => *existing = session,
                        None => self.sessions.push(session),
                    }
                }
                SessionWrite::Remove(id) => self.sessions.retain(|s| s.id != id),
            }
        }

        self.progression_log.extend(changes.log_entries);
        Ok(())
    }
}

// ============================================================================
// In-Memory Store
// ============================================================================

/// Process-local store; also the read model behind the file store
#[derive(Debug, Default)]
pub struct MemoryStore {
    programs: RwLock<BTreeMap<String, ProgramGraph>>,
    data: RwLock<StoreData>,
    revision: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_parts(programs: Vec<ProgramGraph>, data: StoreData) -> Self {
        let store = Self {
            programs: RwLock::new(BTreeMap::new()),
            data: RwLock::new(data),
            revision: AtomicU64::new(0),
        };
        for graph in programs {
            store.put_program(graph);
        }
        store
    }

    /// Add or replace a program graph; invalidates cached workouts
    pub fn put_program(&self, graph: ProgramGraph) {
        let mut programs = self.programs.write().unwrap_or_else(|e| e.into_inner());
        programs.insert(graph.program.id.clone(), graph);
        self.revision.fetch_add(1, Ordering::SeqCst);
    }

    /// Copy of the current user data
    pub fn snapshot(&self) -> StoreData {
        self.read_data().clone()
    }

    /// Replace user data wholesale (used after re-reading a file)
    pub fn replace_data(&self, data: StoreData) {
        *self.data.write().unwrap_or_else(|e| e.into_inner()) = data;
        self.revision.fetch_add(1, Ordering::SeqCst);
    }

    fn read_data(&self) -> std::sync::RwLockReadGuard<'_, StoreData> {
        self.data.read().unwrap_or_else(|e| e.into_inner())
    }
}

impl ProgramReader for MemoryStore {
    fn program(&self, program_id: &str) -> Result<ProgramGraph> {
        let programs = self.programs.read().unwrap_or_else(|e| e.into_inner());
        programs
            .get(program_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("Program '{}'", program_id)))
    }

    fn program_ids(&self) -> Result<Vec<String>> {
        let programs = self.programs.read().unwrap_or_else(|e| e.into_inner());
        Ok(programs.keys().cloned().collect())
    }
}

impl LiftMaxStore for MemoryStore {
    fn current_max(
        &self,
        user_id: &str,
        lift_id: &str,
        max_type: MaxType,
    ) -> Result<Option<LiftMax>> {
        Ok(self.read_data().current_max(user_id, lift_id, max_type).cloned())
    }

    fn max_history(&self, user_id: &str, lift_id: &str, max_type: MaxType) -> Result<Vec<LiftMax>> {
        Ok(self.read_data().max_history(user_id, lift_id, max_type))
    }

    fn user_maxes(&self, user_id: &str) -> Result<Vec<LiftMax>> {
        Ok(self
            .read_data()
            .maxes
            .iter()
            .filter(|m| m.user_id == user_id)
            .cloned()
            .collect())
    }
}

impl EnrollmentStore for MemoryStore {
    fn enrollment(&self, user_id: &str) -> Result<Option<EnrollmentState>> {
        Ok(self.read_data().enrollments.get(user_id).cloned())
    }
}

impl SessionStore for MemoryStore {
    fn session(&self, session_id: Uuid) -> Result<Option<WorkoutSession>> {
        Ok(self.read_data().session(session_id).cloned())
    }

    fn user_sessions(&self, user_id: &str) -> Result<Vec<WorkoutSession>> {
        let mut sessions: Vec<_> = self
            .read_data()
            .sessions
            .iter()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect();
        sessions.sort_by_key(|s| s.started_at);
        Ok(sessions)
    }
}

impl FailureCounterStore for MemoryStore {
    fn counter(&self, key: &CounterKey) -> Result<Option<FailureCounter>> {
        Ok(self.read_data().counter(key).cloned())
    }
}

impl ProgressionLogStore for MemoryStore {
    fn progression_applied(
        &self,
        user_id: &str,
        progression_id: &str,
        lift_id: &str,
        trigger_key: &str,
    ) -> Result<bool> {
        Ok(self.read_data().progression_log.iter().any(|e| {
            e.user_id == user_id
                && e.progression_id == progression_id
                && e.lift_id == lift_id
                && e.trigger_key == trigger_key
        }))
    }

    fn progression_log(&self, user_id: &str) -> Result<Vec<ProgressionLogEntry>> {
        Ok(self
            .read_data()
            .progression_log
            .iter()
            .filter(|e| e.user_id == user_id)
            .cloned()
            .collect())
    }
}

impl Store for MemoryStore {
    fn commit(&self, changes: ChangeSet) -> Result<()> {
        if changes.is_empty() {
            return Ok(());
        }
        let mut data = self.data.write().unwrap_or_else(|e| e.into_inner());
        data.apply(changes)?;
        self.revision.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn revision(&self) -> u64 {
        self.revision.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn record(sequence: u64, value: f64) -> LiftMax {
        LiftMax {
            id: Uuid::new_v4(),
            user_id: "u1".into(),
            lift_id: "squat".into(),
            max_type: MaxType::TrainingMax,
            value,
            recorded_at: Utc::now(),
            sequence,
        }
    }

    #[test]
    fn test_current_max_is_latest_sequence() {
        let store = MemoryStore::new();
        store
            .commit(ChangeSet {
                max_appends: vec![record(1, 200.0), record(2, 205.0)],
                ..Default::default()
            })
            .unwrap();

        let current = store.current_max("u1", "squat", MaxType::TrainingMax).unwrap();
        assert_eq!(current.unwrap().value, 205.0);
        assert_eq!(
            store
                .max_history("u1", "squat", MaxType::TrainingMax)
                .unwrap()
                .len(),
            2
        );
    }

    #[test]
    fn test_stale_sequence_is_conflict_and_nothing_applies() {
        let store = MemoryStore::new();
        store
            .commit(ChangeSet {
                max_appends: vec![record(1, 200.0)],
                ..Default::default()
            })
            .unwrap();
        let before = store.revision();

        // Two writers both read sequence 1; the second must lose
        store
            .commit(ChangeSet {
                max_appends: vec![record(2, 205.0)],
                ..Default::default()
            })
            .unwrap();
        let result = store.commit(ChangeSet {
            max_appends: vec![record(2, 210.0)],
            counters: vec![FailureCounter {
                version: 1,
                ..FailureCounter::new(CounterKey::new("u1", "squat", "p"))
            }],
            ..Default::default()
        });

        assert!(matches!(result, Err(Error::ConcurrencyConflict(_))));
        let current = store.current_max("u1", "squat", MaxType::TrainingMax).unwrap();
        assert_eq!(current.unwrap().value, 205.0);
        assert!(store
            .counter(&CounterKey::new("u1", "squat", "p"))
            .unwrap()
            .is_none());
        assert_eq!(store.revision(), before + 1);
    }

    #[test]
    fn test_counter_version_checked() {
        let store = MemoryStore::new();
        let key = CounterKey::new("u1", "squat", "p");
        let mut counter = FailureCounter::new(key.clone());
        counter.version = 1;
        counter.consecutive_failures = 1;
        store
            .commit(ChangeSet {
                counters: vec![counter.clone()],
                ..Default::default()
            })
            .unwrap();

        // Re-sending version 1 is a lost update
        let result = store.commit(ChangeSet {
            counters: vec![counter],
            ..Default::default()
        });
        assert!(matches!(result, Err(Error::ConcurrencyConflict(_))));
        assert_eq!(store.counter(&key).unwrap().unwrap().consecutive_failures, 1);
    }

    #[test]
    fn test_missing_program_is_not_found() {
        let store = MemoryStore::new();
        assert!(matches!(store.program("nope"), Err(Error::NotFound(_))));
    }
}
