//! Publication lock governor: hard lock on publish, dual-party reopen protocol.
//!
//! ```text
//! active --publish--> results_published
//! results_published --request_reopen--> results_published (pending entry)
//! results_published --approve_reopen--> active
//! results_published --reject_reopen--> results_published
//! active --archive--> archived
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::audit::{AuditAction, AuditEntry, AuditEvent};
use super::domain::{
    AcademicSession, Actor, FacultyId, LockAction, LockEntryId, LockEntryStatus, LockLogEntry,
    ResultStatus, SessionId, SessionStatus, Transition,
};
use super::error::WorkflowError;
use super::report::{BulkSummaryView, BulkTransitionReport, TransitionItem};
use super::repository::{GovernanceStore, Notification, NotificationSender, RepositoryError};
use super::scope;
use super::service::transition_result;

const SESSION_WRITE_ATTEMPTS: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSession {
    pub label: SessionId,
    pub starts_on: NaiveDate,
    pub ends_on: NaiveDate,
    #[serde(default)]
    pub faculty: Option<FacultyId>,
}

/// Outcome of publishing a session: the lock entry plus the records promoted on the way.
#[derive(Debug)]
pub struct PublicationReport {
    pub session: AcademicSession,
    pub lock_entry: LockLogEntry,
    pub promotions: BulkTransitionReport,
}

#[derive(Debug, Clone, Serialize)]
pub struct PublicationView {
    pub session: SessionId,
    pub status: &'static str,
    pub results_published: bool,
    pub lock_entry: LockLogEntry,
    pub promotions: BulkSummaryView,
}

impl PublicationReport {
    pub fn view(&self) -> PublicationView {
        PublicationView {
            session: self.session.id.clone(),
            status: self.session.status.label(),
            results_published: self.session.results_published,
            lock_entry: self.lock_entry.clone(),
            promotions: self.promotions.summary(),
        }
    }
}

/// Lock log and audit trail for oversight roles.
#[derive(Debug, Clone, Serialize)]
pub struct SessionAuditView {
    pub session: SessionId,
    pub status: &'static str,
    pub results_published: bool,
    pub lock_logs: Vec<LockLogEntry>,
    pub entries: Vec<AuditEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub session: SessionId,
    pub status: &'static str,
    pub results_published: bool,
    pub total_results: usize,
    pub by_status: BTreeMap<&'static str, usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_request: Option<LockLogEntry>,
}

pub struct PublicationLockGovernor<S, N> {
    store: Arc<S>,
    notifier: Arc<N>,
}

impl<S, N> PublicationLockGovernor<S, N>
where
    S: GovernanceStore + 'static,
    N: NotificationSender + 'static,
{
    pub fn new(store: Arc<S>, notifier: Arc<N>) -> Self {
        Self { store, notifier }
    }

    pub fn create_session(
        &self,
        actor: &Actor,
        draft: NewSession,
    ) -> Result<AcademicSession, WorkflowError> {
        if !scope::can_manage_sessions(actor) {
            return Err(WorkflowError::out_of_scope(actor));
        }
        if draft.ends_on < draft.starts_on {
            return Err(WorkflowError::InvalidSessionDates(draft.label));
        }

        let session =
            AcademicSession::new(draft.label, draft.starts_on, draft.ends_on, draft.faculty);
        let id = session.id.clone();
        let event = AuditEvent::session(&id, AuditAction::SessionCreated, actor);

        let stored = self
            .store
            .insert_session(session, event)
            .map_err(|err| match err {
                RepositoryError::Conflict => WorkflowError::DuplicateSession(id.clone()),
                other => WorkflowError::Repository(other),
            })?;

        info!(session = %stored.id, actor = %actor.id, "academic session created");
        Ok(stored)
    }

    /// Promote remaining faculty-approved results, then engage the hard lock.
    pub fn publish_session(
        &self,
        actor: &Actor,
        id: &SessionId,
    ) -> Result<PublicationReport, WorkflowError> {
        let session = self.load(id)?;
        if !scope::can_publish(actor, &session) {
            warn!(session = %id, actor = %actor.id, role = %actor.role, "publish outside scope");
            return Err(WorkflowError::out_of_scope(actor));
        }
        ensure_publishable(&session)?;

        let items = self
            .store
            .results_in_session(id)?
            .into_iter()
            .filter(|record| record.status == ResultStatus::FacultyApproved)
            .map(|record| {
                let outcome = transition_result(
                    self.store.as_ref(),
                    actor,
                    &record.id,
                    Transition::FinalApprove,
                    None,
                )
                .map(|stored| stored.status);
                if let Err(err) = &outcome {
                    warn!(result = %record.id, code = err.code(), "result not promoted on publish");
                }
                TransitionItem {
                    result_id: record.id,
                    outcome,
                }
            })
            .collect();
        let promotions = BulkTransitionReport {
            transition: Transition::FinalApprove,
            items,
        };

        let locked = self.update_session(id, |session| {
            ensure_publishable(session)?;
            let entry = LockLogEntry {
                id: session.next_entry_id(),
                action: LockAction::Locked,
                requested_by: actor.id.clone(),
                requested_role: actor.role,
                approved_by: Some(actor.id.clone()),
                reason: None,
                status: LockEntryStatus::Approved,
                resolves: None,
                timestamp: Utc::now(),
            };
            session.results_published = true;
            session.status = SessionStatus::ResultsPublished;
            session.lock_logs.push(entry.clone());
            let event = AuditEvent::session(
                &session.id,
                AuditAction::SessionLocked { entry: entry.id },
                actor,
            );
            Ok((event, entry))
        });
        let (session, entry) = match locked {
            Ok(locked) => locked,
            Err(err) => {
                warn!(
                    session = %id,
                    actor = %actor.id,
                    code = err.code(),
                    promoted = ?promotions.applied_ids(),
                    "results promoted but session lock not engaged"
                );
                return Err(err);
            }
        };

        info!(
            session = %id,
            actor = %actor.id,
            promoted = promotions.succeeded(),
            "session results published and locked"
        );
        Ok(PublicationReport {
            session,
            lock_entry: entry,
            promotions,
        })
    }

    pub fn request_reopen(
        &self,
        actor: &Actor,
        id: &SessionId,
        reason: &str,
    ) -> Result<LockLogEntry, WorkflowError> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(WorkflowError::MissingReason("reopen reason"));
        }

        let session = self.load(id)?;
        if !scope::can_request_reopen(actor, &session) {
            warn!(session = %id, actor = %actor.id, role = %actor.role, "reopen request outside scope");
            return Err(WorkflowError::out_of_scope(actor));
        }

        let (_, entry) = self.update_session(id, |session| {
            if session.is_archived() {
                return Err(WorkflowError::SessionArchived(session.id.clone()));
            }
            if session.pending_request().is_some() {
                return Err(WorkflowError::ReopenAlreadyPending(session.id.clone()));
            }
            let entry = LockLogEntry {
                id: session.next_entry_id(),
                action: LockAction::UnlockRequested,
                requested_by: actor.id.clone(),
                requested_role: actor.role,
                approved_by: None,
                reason: Some(reason.to_string()),
                status: LockEntryStatus::Pending,
                resolves: None,
                timestamp: Utc::now(),
            };
            session.lock_logs.push(entry.clone());
            let event = AuditEvent::session(
                &session.id,
                AuditAction::ReopenRequested { entry: entry.id },
                actor,
            )
            .with_detail(Some(reason.to_string()));
            Ok((event, entry))
        })?;

        info!(session = %id, request = %entry.id, actor = %actor.id, "session reopen requested");
        Ok(entry)
    }

    /// Lift the lock. Published results stay published.
    pub fn approve_reopen(
        &self,
        actor: &Actor,
        id: &SessionId,
        request: LockEntryId,
    ) -> Result<AcademicSession, WorkflowError> {
        self.resolve_reopen(actor, id, request, true)
    }

    pub fn reject_reopen(
        &self,
        actor: &Actor,
        id: &SessionId,
        request: LockEntryId,
    ) -> Result<AcademicSession, WorkflowError> {
        self.resolve_reopen(actor, id, request, false)
    }

    pub fn archive_session(
        &self,
        actor: &Actor,
        id: &SessionId,
    ) -> Result<AcademicSession, WorkflowError> {
        if !scope::can_manage_sessions(actor) {
            return Err(WorkflowError::out_of_scope(actor));
        }

        let (session, _) = self.update_session(id, |session| {
            if session.is_archived() {
                return Err(WorkflowError::SessionArchived(session.id.clone()));
            }
            if session.results_published {
                return Err(WorkflowError::ArchiveWhilePublished(session.id.clone()));
            }
            if session.pending_request().is_some() {
                return Err(WorkflowError::ReopenAlreadyPending(session.id.clone()));
            }
            session.status = SessionStatus::Archived;
            let event = AuditEvent::session(&session.id, AuditAction::SessionArchived, actor);
            Ok((event, ()))
        })?;

        info!(session = %id, actor = %actor.id, "session archived");
        Ok(session)
    }

    pub fn session_audit(
        &self,
        actor: &Actor,
        id: &SessionId,
    ) -> Result<SessionAuditView, WorkflowError> {
        let session = self.load(id)?;
        if !scope::can_audit_session(actor, &session) {
            return Err(WorkflowError::out_of_scope(actor));
        }

        let entries = self.store.entries_for_session(id)?;
        debug!(session = %id, entries = entries.len(), "session audit read");
        Ok(SessionAuditView {
            session: session.id,
            status: session.status.label(),
            results_published: session.results_published,
            lock_logs: session.lock_logs,
            entries,
        })
    }

    pub fn session_summary(
        &self,
        actor: &Actor,
        id: &SessionId,
    ) -> Result<SessionSummary, WorkflowError> {
        let session = self.load(id)?;
        if !scope::can_audit_session(actor, &session) {
            return Err(WorkflowError::out_of_scope(actor));
        }

        let records: Vec<_> = self
            .store
            .results_in_session(id)?
            .into_iter()
            .filter(|record| scope::covers_result(actor, record))
            .collect();

        let mut by_status: BTreeMap<&'static str, usize> = ResultStatus::ordered()
            .into_iter()
            .map(|status| (status.label(), 0))
            .collect();
        for record in &records {
            *by_status.entry(record.status.label()).or_default() += 1;
        }

        Ok(SessionSummary {
            session: session.id.clone(),
            status: session.status.label(),
            results_published: session.results_published,
            total_results: records.len(),
            by_status,
            pending_request: session.pending_request().cloned(),
        })
    }

    fn resolve_reopen(
        &self,
        actor: &Actor,
        id: &SessionId,
        request: LockEntryId,
        approve: bool,
    ) -> Result<AcademicSession, WorkflowError> {
        let session = self.load(id)?;
        if !scope::covers_session(actor, &session) {
            return Err(WorkflowError::out_of_scope(actor));
        }

        let pending = session
            .lock_entry(request)
            .filter(|entry| entry.action == LockAction::UnlockRequested)
            .cloned()
            .ok_or_else(|| WorkflowError::RequestNotFound {
                session: id.clone(),
                request,
            })?;
        if !pending.is_pending_request() {
            return Err(WorkflowError::RequestNotPending(request));
        }

        if let Err(denied) = check_resolver(actor, &pending) {
            warn!(session = %id, %request, actor = %actor.id, code = denied.code(), "reopen resolution refused");
            let event = AuditEvent::session(id, AuditAction::ResolutionDenied { request }, actor)
                .with_detail(Some(denied.to_string()));
            self.store.append(event)?;
            return Err(denied);
        }

        let (session, _) = self.update_session(id, |session| {
            let index = session
                .lock_logs
                .iter()
                .position(|entry| entry.id == request)
                .ok_or_else(|| WorkflowError::RequestNotFound {
                    session: session.id.clone(),
                    request,
                })?;
            if !session.lock_logs[index].is_pending_request() {
                return Err(WorkflowError::RequestNotPending(request));
            }

            let entry_id = session.next_entry_id();
            let (status, action, audit) = if approve {
                (
                    LockEntryStatus::Approved,
                    LockAction::Reopened,
                    AuditAction::ReopenApproved {
                        request,
                        entry: entry_id,
                    },
                )
            } else {
                (
                    LockEntryStatus::Rejected,
                    LockAction::Rejected,
                    AuditAction::ReopenRejected {
                        request,
                        entry: entry_id,
                    },
                )
            };

            let requested = &mut session.lock_logs[index];
            requested.status = status;
            requested.approved_by = Some(actor.id.clone());

            session.lock_logs.push(LockLogEntry {
                id: entry_id,
                action,
                requested_by: actor.id.clone(),
                requested_role: actor.role,
                approved_by: Some(actor.id.clone()),
                reason: None,
                status,
                resolves: Some(request),
                timestamp: Utc::now(),
            });
            if approve {
                session.results_published = false;
                session.status = SessionStatus::Active;
            }

            Ok((AuditEvent::session(&session.id, audit, actor), ()))
        })?;

        let template = if approve {
            "session_reopen_approved"
        } else {
            "session_reopen_rejected"
        };
        let notification = Notification::new(pending.requested_by.as_str(), template)
            .with("session", id.as_str())
            .with("request", request.to_string())
            .with("resolved_by", actor.id.as_str());
        if let Err(err) = self.notifier.send(notification) {
            warn!(session = %id, %request, error = %err, "reopen resolution notice not delivered");
        }

        info!(session = %id, %request, approved = approve, actor = %actor.id, "reopen request resolved");
        Ok(session)
    }

    fn load(&self, id: &SessionId) -> Result<AcademicSession, WorkflowError> {
        self.store
            .fetch_session(id)?
            .ok_or_else(|| WorkflowError::SessionNotFound(id.clone()))
    }

    /// Re-read, apply and compare-and-swap the session, retrying when another
    /// writer got there first. `apply` is re-run against the fresh state, so its
    /// checks see the winner's changes.
    fn update_session<T>(
        &self,
        id: &SessionId,
        mut apply: impl FnMut(&mut AcademicSession) -> Result<(AuditEvent, T), WorkflowError>,
    ) -> Result<(AcademicSession, T), WorkflowError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let current = self.load(id)?;
            let expected = current.version;
            let mut next = current;
            let (event, value) = apply(&mut next)?;

            match self.store.swap_session(expected, next, event) {
                Ok(stored) => return Ok((stored, value)),
                Err(RepositoryError::Stale { .. }) if attempt < SESSION_WRITE_ATTEMPTS => {
                    debug!(session = %id, attempt, "session changed concurrently; retrying");
                }
                Err(RepositoryError::Stale { .. }) => {
                    return Err(WorkflowError::ConcurrentModification(id.to_string()));
                }
                Err(other) => return Err(WorkflowError::Repository(other)),
            }
        }
    }
}

fn ensure_publishable(session: &AcademicSession) -> Result<(), WorkflowError> {
    if session.is_archived() {
        return Err(WorkflowError::SessionArchived(session.id.clone()));
    }
    if session.results_published {
        return Err(WorkflowError::AlreadyPublished(session.id.clone()));
    }
    Ok(())
}

/// The requester never resolves their own request, and the resolver must outrank them.
fn check_resolver(actor: &Actor, request: &LockLogEntry) -> Result<(), WorkflowError> {
    if actor.id == request.requested_by {
        return Err(WorkflowError::SelfApproval);
    }
    if !scope::can_resolve_reopen(actor, request.requested_role) {
        return Err(WorkflowError::InsufficientSeniority {
            approver: actor.role,
            requester: request.requested_role,
        });
    }
    Ok(())
}
