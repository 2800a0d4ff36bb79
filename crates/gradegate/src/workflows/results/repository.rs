use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::audit::{AuditEvent, AuditLog};
use super::domain::{AcademicSession, ResultId, ResultRecord, SessionId};

/// Result record storage. Writes carry the audit event that describes them so
/// the change and its log entry commit together.
pub trait ResultRepository: Send + Sync {
    fn insert_result(
        &self,
        record: ResultRecord,
        event: AuditEvent,
    ) -> Result<ResultRecord, RepositoryError>;

    fn fetch_result(&self, id: &ResultId) -> Result<Option<ResultRecord>, RepositoryError>;

    /// Replace the stored record only if its revision still equals
    /// `expected_revision`. Implementations must refuse the swap while the owning
    /// session is hard-locked or archived.
    fn swap_result(
        &self,
        expected_revision: u64,
        record: ResultRecord,
        event: AuditEvent,
    ) -> Result<ResultRecord, RepositoryError>;

    fn results_in_session(&self, session: &SessionId) -> Result<Vec<ResultRecord>, RepositoryError>;
}

/// Academic session storage, versioned for compare-and-swap.
pub trait SessionRepository: Send + Sync {
    fn insert_session(
        &self,
        session: AcademicSession,
        event: AuditEvent,
    ) -> Result<AcademicSession, RepositoryError>;

    fn fetch_session(&self, id: &SessionId) -> Result<Option<AcademicSession>, RepositoryError>;

    /// Replace the stored session only if its version still equals `expected_version`.
    fn swap_session(
        &self,
        expected_version: u64,
        session: AcademicSession,
        event: AuditEvent,
    ) -> Result<AcademicSession, RepositoryError>;

    fn sessions(&self) -> Result<Vec<AcademicSession>, RepositoryError>;
}

/// Everything the governance services need from persistence.
pub trait GovernanceStore: ResultRepository + SessionRepository + AuditLog {}

impl<T> GovernanceStore for T where T: ResultRepository + SessionRepository + AuditLog {}

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("stale write: expected revision {expected}, found {found}")]
    Stale { expected: u64, found: u64 },
    #[error("session {0} is locked")]
    SessionLocked(SessionId),
    #[error("session {0} is archived")]
    SessionArchived(SessionId),
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

/// Outbound delivery hook (e-mail, SMS, in-app). Delivery mechanics live elsewhere.
pub trait NotificationSender: Send + Sync {
    fn send(&self, notification: Notification) -> Result<(), NotificationError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub recipient: String,
    pub template: String,
    pub payload: BTreeMap<String, String>,
}

impl Notification {
    pub fn new(recipient: impl Into<String>, template: impl Into<String>) -> Self {
        Self {
            recipient: recipient.into(),
            template: template.into(),
            payload: BTreeMap::new(),
        }
    }

    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.payload.insert(key.to_string(), value.into());
        self
    }
}

#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("notification transport unavailable: {0}")]
    Transport(String),
}
