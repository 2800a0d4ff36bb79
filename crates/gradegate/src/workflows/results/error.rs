use super::domain::{
    Actor, ActorId, LockEntryId, ResultId, ResultStatus, Role, SessionId, Transition,
};
use super::repository::RepositoryError;

/// Typed failures of the approval pipeline and the publication lock.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("cannot {transition} a result in status {from}")]
    InvalidTransition {
        from: ResultStatus,
        transition: Transition,
    },
    #[error("{role} {actor} is outside the scope of this operation")]
    OutOfScope { actor: ActorId, role: Role },
    #[error("result {0} not found")]
    RecordNotFound(ResultId),
    #[error("result {0} already exists")]
    DuplicateRecord(ResultId),
    #[error("result {id} is read-only while {status}")]
    RecordReadOnly { id: ResultId, status: ResultStatus },
    #[error("result {0} needs both CA and examination scores")]
    MissingScores(ResultId),
    #[error("{field} score {value} is outside 0..=100")]
    InvalidScore { field: &'static str, value: u8 },
    #[error("a non-empty {0} is required")]
    MissingReason(&'static str),
    #[error("no result ids were supplied")]
    EmptySelection,
    #[error("result {0} changed concurrently; retry against its current status")]
    ConcurrentModification(String),
    #[error("session {0} not found")]
    SessionNotFound(SessionId),
    #[error("session {0} already exists")]
    DuplicateSession(SessionId),
    #[error("session {0} must end on or after its start date")]
    InvalidSessionDates(SessionId),
    #[error("session {0} results are already published")]
    AlreadyPublished(SessionId),
    #[error("session {0} is locked until a reopen is approved")]
    SessionLocked(SessionId),
    #[error("session {0} is archived")]
    SessionArchived(SessionId),
    #[error("session {0} cannot be archived while its results are published")]
    ArchiveWhilePublished(SessionId),
    #[error("session {0} already has a pending reopen request")]
    ReopenAlreadyPending(SessionId),
    #[error("reopen request {request} not found on session {session}")]
    RequestNotFound {
        session: SessionId,
        request: LockEntryId,
    },
    #[error("reopen request {0} is already resolved")]
    RequestNotPending(LockEntryId),
    #[error("the requester of a reopen cannot resolve it")]
    SelfApproval,
    #[error("{approver} cannot resolve a reopen raised by {requester}")]
    InsufficientSeniority { approver: Role, requester: Role },
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl WorkflowError {
    /// Stable machine-readable code.
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidTransition { .. } => "invalid_transition",
            Self::OutOfScope { .. } => "out_of_scope",
            Self::RecordNotFound(_) => "record_not_found",
            Self::DuplicateRecord(_) => "duplicate_record",
            Self::RecordReadOnly { .. } => "record_read_only",
            Self::MissingScores(_) => "missing_scores",
            Self::InvalidScore { .. } => "invalid_score",
            Self::MissingReason(_) => "missing_reason",
            Self::EmptySelection => "empty_selection",
            Self::ConcurrentModification(_) => "concurrent_modification",
            Self::SessionNotFound(_) => "session_not_found",
            Self::DuplicateSession(_) => "duplicate_session",
            Self::InvalidSessionDates(_) => "invalid_session_dates",
            Self::AlreadyPublished(_) => "already_published",
            Self::SessionLocked(_) => "session_locked",
            Self::SessionArchived(_) => "session_archived",
            Self::ArchiveWhilePublished(_) => "archive_while_published",
            Self::ReopenAlreadyPending(_) => "reopen_already_pending",
            Self::RequestNotFound { .. } => "request_not_found",
            Self::RequestNotPending(_) => "request_not_pending",
            Self::SelfApproval => "self_approval",
            Self::InsufficientSeniority { .. } => "insufficient_seniority",
            Self::Repository(_) => "storage_error",
        }
    }

    pub(crate) fn out_of_scope(actor: &Actor) -> Self {
        Self::OutOfScope {
            actor: actor.id.clone(),
            role: actor.role,
        }
    }
}
