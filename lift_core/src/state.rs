//! File-backed store with file locking.
//!
//! All user state (lift max log, enrollments, sessions, failure counters and
//! the progression log) lives in one JSON document. Reads take a shared lock;
//! commits take an exclusive lock on a sidecar `.lock` file, re-read the
//! document, validate the change set against what is on disk and write it
//! back atomically. A writer in another process that got there first turns
//! into a `ConcurrencyConflict` instead of a lost update.

use crate::store::{
    ChangeSet, EnrollmentStore, FailureCounterStore, LiftMaxStore, MemoryStore, ProgramReader,
    ProgressionLogStore, SessionStore, Store, StoreData,
};
use crate::{
    CounterKey, EnrollmentState, Error, FailureCounter, LiftMax, MaxType, ProgramGraph,
    ProgressionLogEntry, Result, WorkoutSession,
};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use uuid::Uuid;

impl StoreData {
    /// Load state from a file with shared locking.
    ///
    /// Returns empty state if the file doesn't exist. A corrupted file is an
    /// error: lift maxes cannot be rebuilt from anything else.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::info!("No state file at {:?}, starting empty", path);
            return Ok(Self::default());
        }

        let file = File::open(path)?;
        file.lock_shared()?;

        let mut contents = String::new();
        let read = std::io::BufReader::new(&file).read_to_string(&mut contents);
        let _ = file.unlock();
        read?;

        match serde_json::from_str::<StoreData>(&contents) {
            Ok(data) => {
                tracing::debug!(
                    "Loaded state from {:?} ({} maxes, {} sessions)",
                    path,
                    data.maxes.len(),
                    data.sessions.len()
                );
                Ok(data)
            }
            Err(e) => {
                tracing::warn!("State file {:?} is corrupted: {}", path, e);
                Err(Error::Json(e))
            }
        }
    }

    /// Save state to a file with exclusive locking
    ///
    /// Atomically writes state by:
    /// 1. Writing to a temp file
    /// 2. Syncing to disk
    /// 3. Renaming over the original
    pub fn save(&self, path: &Path) -> Result<()> {
        let parent = path
            .parent()
            .ok_or_else(|| Error::Config(format!("State path {:?} has no parent", path)))?;
        std::fs::create_dir_all(parent)?;

        let temp = NamedTempFile::new_in(parent)?;
        temp.as_file().lock_exclusive()?;

        {
            let mut writer = std::io::BufWriter::new(temp.as_file());
            serde_json::to_writer(&mut writer, self)?;
            writer.flush()?;
        }

        temp.as_file().sync_all()?;
        temp.as_file().unlock()?;

        temp.persist(path).map_err(|e| Error::Io(e.error))?;

        tracing::debug!("Saved state to {:?}", path);
        Ok(())
    }
}

/// JSON state file plus an in-memory read model
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    inner: MemoryStore,
}

impl FileStore {
    /// Open the state file at `path`, serving `programs` from memory
    pub fn open(path: &Path, programs: Vec<ProgramGraph>) -> Result<Self> {
        let data = StoreData::load(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            inner: MemoryStore::from_parts(programs, data),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".lock");
        self.path.with_file_name(name)
    }

    fn commit_locked(&self, changes: ChangeSet) -> Result<()> {
        let mut data = StoreData::load(&self.path)?;
        data.apply(changes)?;
        data.save(&self.path)?;
        self.inner.replace_data(data);
        Ok(())
    }
}

impl ProgramReader for FileStore {
    fn program(&self, program_id: &str) -> Result<ProgramGraph> {
        self.inner.program(program_id)
    }

    fn program_ids(&self) -> Result<Vec<String>> {
        self.inner.program_ids()
    }
}

impl LiftMaxStore for FileStore {
    fn current_max(
        &self,
        user_id: &str,
        lift_id: &str,
        max_type: MaxType,
    ) -> Result<Option<LiftMax>> {
        self.inner.current_max(user_id, lift_id, max_type)
    }

    fn max_history(&self, user_id: &str, lift_id: &str, max_type: MaxType) -> Result<Vec<LiftMax>> {
        self.inner.max_history(user_id, lift_id, max_type)
    }

    fn user_maxes(&self, user_id: &str) -> Result<Vec<LiftMax>> {
        self.inner.user_maxes(user_id)
    }
}

impl EnrollmentStore for FileStore {
    fn enrollment(&self, user_id: &str) -> Result<Option<EnrollmentState>> {
        self.inner.enrollment(user_id)
    }
}

impl SessionStore for FileStore {
    fn session(&self, session_id: Uuid) -> Result<Option<WorkoutSession>> {
        self.inner.session(session_id)
    }

    fn user_sessions(&self, user_id: &str) -> Result<Vec<WorkoutSession>> {
        self.inner.user_sessions(user_id)
    }
}

impl FailureCounterStore for FileStore {
    fn counter(&self, key: &CounterKey) -> Result<Option<FailureCounter>> {
        self.inner.counter(key)
    }
}

impl ProgressionLogStore for FileStore {
    fn progression_applied(
        &self,
        user_id: &str,
        progression_id: &str,
        lift_id: &str,
        trigger_key: &str,
    ) -> Result<bool> {
        self.inner
            .progression_applied(user_id, progression_id, lift_id, trigger_key)
    }

    fn progression_log(&self, user_id: &str) -> Result<Vec<ProgressionLogEntry>> {
        self.inner.progression_log(user_id)
    }
}

impl Store for FileStore {
    fn commit(&self, changes: ChangeSet) -> Result<()> {
        if changes.is_empty() {
            return Ok(());
        }
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        // Serialize read-validate-write across processes
        let lock = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(self.lock_path())?;
        lock.lock_exclusive()?;
        let result = self.commit_locked(changes);
        let _ = lock.unlock();
        result
    }

    fn revision(&self) -> u64 {
        self.inner.revision()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::sample_program;
    use crate::{CycleStatus, EnrollmentStatus, SessionSlot, WeekStatus};
    use crate::store::EnrollmentWrite;
    use chrono::Utc;

    fn squat_max(sequence: u64, value: f64) -> LiftMax {
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

    fn enrollment() -> EnrollmentState {
        let now = Utc::now();
        EnrollmentState {
            enrollment_id: Uuid::new_v4(),
            user_id: "u1".into(),
            program_id: "sample".into(),
            cycle_iteration: 1,
            current_week: 1,
            current_day_index: 2,
            status: EnrollmentStatus::Active,
            cycle_status: CycleStatus::InProgress,
            week_status: WeekStatus::InProgress,
            session: SessionSlot::None,
            enrolled_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_commit_and_reopen_roundtrip() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("state.json");

        let store = FileStore::open(&path, vec![sample_program()]).unwrap();
        store
            .commit(ChangeSet {
                max_appends: vec![squat_max(1, 200.0)],
                enrollments: vec![EnrollmentWrite::Put(enrollment())],
                ..Default::default()
            })
            .unwrap();

        let reopened = FileStore::open(&path, vec![sample_program()]).unwrap();
        let current = reopened
            .current_max("u1", "squat", MaxType::TrainingMax)
            .unwrap()
            .unwrap();
        assert_eq!(current.value, 200.0);
        assert_eq!(
            reopened.enrollment("u1").unwrap().unwrap().current_day_index,
            2
        );
        assert_eq!(reopened.program("sample").unwrap().program.id, "sample");
    }

    #[test]
    fn test_load_nonexistent_returns_empty() {
        let temp_dir = tempfile::tempdir().unwrap();
        let data = StoreData::load(&temp_dir.path().join("missing.json")).unwrap();
        assert!(data.maxes.is_empty());
        assert!(data.enrollments.is_empty());
    }

    #[test]
    fn test_corrupted_state_returns_error() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("state.json");
        std::fs::write(&path, "{ not json").unwrap();

        assert!(matches!(StoreData::load(&path), Err(Error::Json(_))));
        assert!(FileStore::open(&path, vec![]).is_err());
    }

    #[test]
    fn test_writer_from_another_handle_conflicts() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("state.json");

        // Two handles opened on the same empty file both think sequence 1 is next
        let first = FileStore::open(&path, vec![]).unwrap();
        let second = FileStore::open(&path, vec![]).unwrap();

        first
            .commit(ChangeSet {
                max_appends: vec![squat_max(1, 200.0)],
                ..Default::default()
            })
            .unwrap();
        let result = second.commit(ChangeSet {
            max_appends: vec![squat_max(1, 210.0)],
            ..Default::default()
        });

        assert!(matches!(result, Err(Error::ConcurrencyConflict(_))));
        let on_disk = StoreData::load(&path).unwrap();
        assert_eq!(on_disk.maxes.len(), 1);
        assert_eq!(on_disk.maxes[0].value, 200.0);
    }

    #[test]
    fn test_commit_bumps_revision() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("state.json");
        let store = FileStore::open(&path, vec![]).unwrap();

        let before = store.revision();
        store
            .commit(ChangeSet {
                max_appends: vec![squat_max(1, 200.0)],
                ..Default::default()
            })
            .unwrap();
        assert!(store.revision() > before);
        assert_eq!(store.path(), path.as_path());
    }
}
