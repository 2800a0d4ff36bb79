use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{
    Actor, ActorId, LockEntryId, ResultId, ResultStatus, Role, SessionId, Transition,
};
use super::repository::RepositoryError;

/// What an audit entry is about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum AuditSubject {
    Session,
    Result(ResultId),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum AuditAction {
    SessionCreated,
    ResultCreated,
    ScoresEntered { ca_score: u8, exam_score: u8 },
    StatusChanged {
        transition: Transition,
        from: ResultStatus,
        to: ResultStatus,
    },
    SessionLocked { entry: LockEntryId },
    ReopenRequested { entry: LockEntryId },
    ReopenApproved { request: LockEntryId, entry: LockEntryId },
    ReopenRejected { request: LockEntryId, entry: LockEntryId },
    ResolutionDenied { request: LockEntryId },
    SessionArchived,
}

/// Audit payload handed to a store together with the state change it records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub session: SessionId,
    pub subject: AuditSubject,
    #[serde(flatten)]
    pub action: AuditAction,
    pub actor: ActorId,
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl AuditEvent {
    pub fn session(session: &SessionId, action: AuditAction, actor: &Actor) -> Self {
        Self {
            session: session.clone(),
            subject: AuditSubject::Session,
            action,
            actor: actor.id.clone(),
            role: actor.role,
            detail: None,
            timestamp: Utc::now(),
        }
    }

    pub fn result(
        session: &SessionId,
        result: &ResultId,
        action: AuditAction,
        actor: &Actor,
    ) -> Self {
        Self {
            session: session.clone(),
            subject: AuditSubject::Result(result.clone()),
            action,
            actor: actor.id.clone(),
            role: actor.role,
            detail: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_detail(mut self, detail: Option<String>) -> Self {
        self.detail = detail;
        self
    }
}

/// Committed audit entry. `sequence` is the global insertion order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub sequence: u64,
    #[serde(flatten)]
    pub event: AuditEvent,
}

impl AuditEntry {
    pub fn concerns(&self, result: &ResultId) -> bool {
        matches!(&self.event.subject, AuditSubject::Result(id) if id == result)
    }
}

/// Append-only audit trail with no update or delete.
///
/// Stores append the entry for a state change in the same commit as the change
/// itself; `append` records events with no state change, such as refused
/// reopen resolutions.
pub trait AuditLog: Send + Sync {
    fn append(&self, event: AuditEvent) -> Result<AuditEntry, RepositoryError>;
    /// Entries for a session in insertion order. No reordering by timestamp.
    fn entries_for_session(&self, session: &SessionId) -> Result<Vec<AuditEntry>, RepositoryError>;
    fn entries_for_result(&self, result: &ResultId) -> Result<Vec<AuditEntry>, RepositoryError>;
}
