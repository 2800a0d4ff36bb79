//! Result lifecycle and publication-lock governance.
//!
//! Records move through the approval pipeline in [`service`], sessions are
//! locked and reopened in [`lock`], and every committed change lands in the
//! session's audit trail together with the state it describes.

pub mod audit;
pub mod domain;
pub mod error;
pub mod lock;
pub mod report;
pub mod repository;
pub mod router;
pub mod scope;
pub mod service;
pub mod store;
pub mod transitions;

#[cfg(test)]
mod tests;

pub use audit::{AuditAction, AuditEntry, AuditEvent, AuditLog, AuditSubject};
pub use domain::{
    AcademicSession, Actor, ActorId, CourseId, DepartmentId, FacultyId, LockAction,
    LockEntryId, LockEntryStatus, LockLogEntry, ResultId, ResultKey, ResultRecord,
    ResultStatus, ResultStatusView, Role, Scope, Score, SessionId, SessionStatus, StudentId,
    Transition,
};
pub use error::WorkflowError;
pub use lock::{
    NewSession, PublicationLockGovernor, PublicationReport, PublicationView, SessionAuditView,
    SessionSummary,
};
pub use report::{BulkSummaryView, BulkTransitionReport, TransitionItem, TransitionItemView};
pub use repository::{
    GovernanceStore, Notification, NotificationError, NotificationSender, RepositoryError,
    ResultRepository, SessionRepository,
};
pub use router::governance_router;
pub use service::{NewResult, ResultWorkflowService};
pub use store::{MemoryStore, StoreError};
