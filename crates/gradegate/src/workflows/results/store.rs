//! In-process governance store with optional JSON snapshot durability.
//!
//! Every write runs under one mutex so a compare-and-swap and its audit append
//! are a single commit. When a snapshot path is configured the post-commit
//! state is written atomically (temp file, then rename) before it becomes
//! visible; a failed write leaves the previous state in place.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::audit::{AuditEntry, AuditEvent, AuditLog};
use super::domain::{AcademicSession, ResultId, ResultRecord, SessionId};
use super::repository::{RepositoryError, ResultRepository, SessionRepository};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to access snapshot {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid snapshot {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoreState {
    results: BTreeMap<ResultId, ResultRecord>,
    sessions: BTreeMap<SessionId, AcademicSession>,
    audit: BTreeMap<SessionId, Vec<AuditEntry>>,
    next_sequence: u64,
}

impl StoreState {
    fn append(&mut self, event: AuditEvent) -> AuditEntry {
        self.next_sequence += 1;
        let entry = AuditEntry {
            sequence: self.next_sequence,
            event,
        };
        self.audit
            .entry(entry.event.session.clone())
            .or_default()
            .push(entry.clone());
        entry
    }

    fn ensure_writable(&self, session: &SessionId) -> Result<(), RepositoryError> {
        let session = self
            .sessions
            .get(session)
            .ok_or(RepositoryError::NotFound)?;
        if session.is_locked() {
            return Err(RepositoryError::SessionLocked(session.id.clone()));
        }
        if session.is_archived() {
            return Err(RepositoryError::SessionArchived(session.id.clone()));
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<StoreState>,
    snapshot: Option<PathBuf>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a snapshot-backed store, loading prior state when the file exists.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let state = if path.exists() {
            read_snapshot(&path)?
        } else {
            StoreState::default()
        };

        debug!(path = %path.display(), sessions = state.sessions.len(), "governance store opened");

        Ok(Self {
            state: Mutex::new(state),
            snapshot: Some(path),
        })
    }

    pub fn snapshot_path(&self) -> Option<&Path> {
        self.snapshot.as_deref()
    }

    fn lock(&self) -> Result<MutexGuard<'_, StoreState>, RepositoryError> {
        self.state
            .lock()
            .map_err(|_| RepositoryError::Unavailable("store mutex poisoned".to_string()))
    }

    fn read<T>(&self, op: impl FnOnce(&StoreState) -> T) -> Result<T, RepositoryError> {
        let guard = self.lock()?;
        Ok(op(&*guard))
    }

    fn commit<T>(
        &self,
        op: impl FnOnce(&mut StoreState) -> Result<T, RepositoryError>,
    ) -> Result<T, RepositoryError> {
        let mut guard = self.lock()?;
        match &self.snapshot {
            None => op(&mut *guard),
            Some(path) => {
                let mut next = guard.clone();
                let value = op(&mut next)?;
                write_snapshot(path, &next)
                    .map_err(|err| RepositoryError::Unavailable(err.to_string()))?;
                *guard = next;
                Ok(value)
            }
        }
    }
}

impl ResultRepository for MemoryStore {
    fn insert_result(
        &self,
        mut record: ResultRecord,
        event: AuditEvent,
    ) -> Result<ResultRecord, RepositoryError> {
        self.commit(|state| {
            if state.results.contains_key(&record.id) {
                return Err(RepositoryError::Conflict);
            }
            state.ensure_writable(record.session())?;
            record.revision = 0;
            state.results.insert(record.id.clone(), record.clone());
            state.append(event);
            Ok(record)
        })
    }

    fn fetch_result(&self, id: &ResultId) -> Result<Option<ResultRecord>, RepositoryError> {
        self.read(|state| state.results.get(id).cloned())
    }

    fn swap_result(
        &self,
        expected_revision: u64,
        mut record: ResultRecord,
        event: AuditEvent,
    ) -> Result<ResultRecord, RepositoryError> {
        self.commit(|state| {
            let current = state
                .results
                .get(&record.id)
                .ok_or(RepositoryError::NotFound)?;
            if current.revision != expected_revision {
                return Err(RepositoryError::Stale {
                    expected: expected_revision,
                    found: current.revision,
                });
            }
            state.ensure_writable(record.session())?;
            record.revision = expected_revision + 1;
            state.results.insert(record.id.clone(), record.clone());
            state.append(event);
            Ok(record)
        })
    }

    fn results_in_session(&self, session: &SessionId) -> Result<Vec<ResultRecord>, RepositoryError> {
        self.read(|state| {
            state
                .results
                .values()
                .filter(|record| record.session() == session)
                .cloned()
                .collect()
        })
    }
}

impl SessionRepository for MemoryStore {
    fn insert_session(
        &self,
        mut session: AcademicSession,
        event: AuditEvent,
    ) -> Result<AcademicSession, RepositoryError> {
        self.commit(|state| {
            if state.sessions.contains_key(&session.id) {
                return Err(RepositoryError::Conflict);
            }
            session.version = 0;
            state.sessions.insert(session.id.clone(), session.clone());
            state.append(event);
            Ok(session)
        })
    }

    fn fetch_session(&self, id: &SessionId) -> Result<Option<AcademicSession>, RepositoryError> {
        self.read(|state| state.sessions.get(id).cloned())
    }

    fn swap_session(
        &self,
        expected_version: u64,
        mut session: AcademicSession,
        event: AuditEvent,
    ) -> Result<AcademicSession, RepositoryError> {
        self.commit(|state| {
            let current = state
                .sessions
                .get(&session.id)
                .ok_or(RepositoryError::NotFound)?;
            if current.version != expected_version {
                return Err(RepositoryError::Stale {
                    expected: expected_version,
                    found: current.version,
                });
            }
            session.version = expected_version + 1;
            state.sessions.insert(session.id.clone(), session.clone());
            state.append(event);
            Ok(session)
        })
    }

    fn sessions(&self) -> Result<Vec<AcademicSession>, RepositoryError> {
        self.read(|state| state.sessions.values().cloned().collect())
    }
}

impl AuditLog for MemoryStore {
    fn append(&self, event: AuditEvent) -> Result<AuditEntry, RepositoryError> {
        self.commit(|state| {
            if !state.sessions.contains_key(&event.session) {
                return Err(RepositoryError::NotFound);
            }
            Ok(state.append(event))
        })
    }

    fn entries_for_session(&self, session: &SessionId) -> Result<Vec<AuditEntry>, RepositoryError> {
        self.read(|state| state.audit.get(session).cloned().unwrap_or_default())
    }

    fn entries_for_result(&self, result: &ResultId) -> Result<Vec<AuditEntry>, RepositoryError> {
        self.read(|state| {
            let Some(record) = state.results.get(result) else {
                return Vec::new();
            };
            state
                .audit
                .get(record.session())
                .map(|entries| {
                    entries
                        .iter()
                        .filter(|entry| entry.concerns(result))
                        .cloned()
                        .collect()
                })
                .unwrap_or_default()
        })
    }
}

fn read_snapshot(path: &Path) -> Result<StoreState, StoreError> {
    let content = fs::read_to_string(path).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&content).map_err(|source| StoreError::Json {
        path: path.to_path_buf(),
        source,
    })
}

fn write_snapshot(path: &Path, state: &StoreState) -> Result<(), StoreError> {
    let io_error = |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    };

    let content = serde_json::to_string_pretty(state).map_err(|source| StoreError::Json {
        path: path.to_path_buf(),
        source,
    })?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_error)?;
    }

    let temp_path = path.with_extension("json.tmp");
    let mut file = fs::File::create(&temp_path).map_err(io_error)?;
    file.write_all(content.as_bytes()).map_err(io_error)?;
    file.sync_all().map_err(io_error)?;
    drop(file);

    fs::rename(&temp_path, path).map_err(io_error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::results::audit::AuditAction;
    use crate::workflows::results::domain::{
        Actor, ActorId, CourseId, DepartmentId, FacultyId, LockEntryId, ResultKey,
        ResultStatus, Role, StudentId, Transition,
    };
    use chrono::{NaiveDate, Utc};

    fn admin() -> Actor {
        Actor::new("admin-1", Role::Admin)
    }

    fn session() -> AcademicSession {
        AcademicSession::new(
            SessionId::new("2024/2025"),
            NaiveDate::from_ymd_opt(2024, 9, 1).expect("valid"),
            NaiveDate::from_ymd_opt(2025, 7, 31).expect("valid"),
            None,
        )
    }

    fn draft(student: &str) -> ResultRecord {
        let key = ResultKey {
            student: StudentId::new(student),
            course: CourseId::new("CSC101"),
            session: SessionId::new("2024/2025"),
        };
        ResultRecord {
            id: key.result_id(),
            key,
            department: DepartmentId::new("computing"),
            faculty: FacultyId::new("science"),
            lecturer: ActorId::new("lec-1"),
            ca_score: None,
            exam_score: None,
            status: ResultStatus::Draft,
            correction_note: None,
            rejection_reason: None,
            revision: 0,
            updated_by: ActorId::new("lec-1"),
            updated_at: Utc::now(),
        }
    }

    fn seed(store: &MemoryStore) -> ResultRecord {
        let session = session();
        store
            .insert_session(
                session.clone(),
                AuditEvent::session(&session.id, AuditAction::SessionCreated, &admin()),
            )
            .expect("session inserted");
        let record = draft("stu-1");
        store
            .insert_result(
                record.clone(),
                AuditEvent::result(
                    record.session(),
                    &record.id,
                    AuditAction::ResultCreated,
                    &admin(),
                ),
            )
            .expect("result inserted")
    }

    fn submit_event(record: &ResultRecord) -> AuditEvent {
        AuditEvent::result(
            record.session(),
            &record.id,
            AuditAction::StatusChanged {
                transition: Transition::Submit,
                from: ResultStatus::Draft,
                to: ResultStatus::Submitted,
            },
            &admin(),
        )
    }

    #[test]
    fn stale_revision_is_refused() {
        let store = MemoryStore::new();
        let record = seed(&store);

        let mut next = record.clone();
        next.status = ResultStatus::Submitted;
        store
            .swap_result(0, next.clone(), submit_event(&record))
            .expect("first swap wins");

        match store.swap_result(0, next, submit_event(&record)) {
            Err(RepositoryError::Stale { expected, found }) => {
                assert_eq!(expected, 0);
                assert_eq!(found, 1);
            }
            other => panic!("expected stale write, got {other:?}"),
        }
        assert_eq!(store.entries_for_result(&record.id).unwrap().len(), 2);
    }

    #[test]
    fn locked_session_refuses_result_writes() {
        let store = MemoryStore::new();
        let record = seed(&store);

        let mut locked = store
            .fetch_session(record.session())
            .unwrap()
            .expect("session present");
        locked.results_published = true;
        store
            .swap_session(
                0,
                locked,
                AuditEvent::session(
                    record.session(),
                    AuditAction::SessionLocked {
                        entry: LockEntryId(1),
                    },
                    &admin(),
                ),
            )
            .expect("session swap");

        let mut next = record.clone();
        next.status = ResultStatus::Submitted;
        match store.swap_result(0, next, submit_event(&record)) {
            Err(RepositoryError::SessionLocked(id)) => assert_eq!(id.as_str(), "2024/2025"),
            other => panic!("expected locked session, got {other:?}"),
        }
    }

    #[test]
    fn audit_entries_keep_insertion_order() {
        let store = MemoryStore::new();
        let record = seed(&store);
        let mut next = record.clone();
        next.status = ResultStatus::Submitted;
        store
            .swap_result(0, next, submit_event(&record))
            .expect("swap");

        let entries = store.entries_for_session(record.session()).unwrap();
        let sequences: Vec<u64> = entries.iter().map(|entry| entry.sequence).collect();
        assert_eq!(sequences, vec![1, 2, 3]);
        assert_eq!(entries[0].event.action, AuditAction::SessionCreated);
    }

    #[test]
    fn snapshot_survives_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("state.json");

        let record = {
            let store = MemoryStore::open(&path).expect("store opens");
            seed(&store)
        };

        let reopened = MemoryStore::open(&path).expect("store reopens");
        let stored = reopened
            .fetch_result(&record.id)
            .unwrap()
            .expect("record persisted");
        assert_eq!(stored.status, ResultStatus::Draft);
        assert_eq!(reopened.entries_for_session(record.session()).unwrap().len(), 2);
    }

    #[test]
    fn failed_snapshot_write_rolls_back() {
        let dir = tempfile::tempdir().expect("tempdir");
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, b"not a directory").expect("blocker written");

        let store = MemoryStore::open(blocker.join("state.json")).expect("store opens");
        let session = session();
        let result = store.insert_session(
            session.clone(),
            AuditEvent::session(&session.id, AuditAction::SessionCreated, &admin()),
        );

        assert!(matches!(result, Err(RepositoryError::Unavailable(_))));
        assert!(store.fetch_session(&session.id).unwrap().is_none());
        assert!(store.entries_for_session(&session.id).unwrap().is_empty());
    }
}
