use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::audit::{AuditAction, AuditEntry, AuditEvent};
use super::domain::{
    Actor, ActorId, CourseId, DepartmentId, FacultyId, ResultId, ResultKey, ResultRecord,
    ResultStatus, Role, Score, SessionId, StudentId, Transition,
};
use super::error::WorkflowError;
use super::report::{BulkTransitionReport, TransitionItem};
use super::repository::{GovernanceStore, Notification, NotificationSender, RepositoryError};
use super::{scope, transitions};

/// Draft creation request. `lecturer` is only honoured for admins acting on
/// someone's behalf; lecturers always own what they create.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewResult {
    pub student: StudentId,
    pub course: CourseId,
    pub session: SessionId,
    pub department: DepartmentId,
    pub faculty: FacultyId,
    #[serde(default)]
    pub lecturer: Option<ActorId>,
}

/// Approval state machine over stored result records.
pub struct ResultWorkflowService<S, N> {
    store: Arc<S>,
    notifier: Arc<N>,
}

impl<S, N> ResultWorkflowService<S, N>
where
    S: GovernanceStore + 'static,
    N: NotificationSender + 'static,
{
    pub fn new(store: Arc<S>, notifier: Arc<N>) -> Self {
        Self { store, notifier }
    }

    pub fn create_draft(
        &self,
        actor: &Actor,
        draft: NewResult,
    ) -> Result<ResultRecord, WorkflowError> {
        if !scope::can_create_result(actor, &draft.department) {
            return Err(WorkflowError::out_of_scope(actor));
        }

        ensure_session_open(self.store.as_ref(), &draft.session)?;

        let lecturer = match actor.role {
            Role::Lecturer => actor.id.clone(),
            _ => draft.lecturer.unwrap_or_else(|| actor.id.clone()),
        };
        let key = ResultKey {
            student: draft.student,
            course: draft.course,
            session: draft.session,
        };
        let id = key.result_id();

        let record = ResultRecord {
            id: id.clone(),
            key,
            department: draft.department,
            faculty: draft.faculty,
            lecturer,
            ca_score: None,
            exam_score: None,
            status: ResultStatus::Draft,
            correction_note: None,
            rejection_reason: None,
            revision: 0,
            updated_by: actor.id.clone(),
            updated_at: Utc::now(),
        };
        let event = AuditEvent::result(record.session(), &id, AuditAction::ResultCreated, actor);

        let stored = self
            .store
            .insert_result(record, event)
            .map_err(|err| match err {
                RepositoryError::Conflict => WorkflowError::DuplicateRecord(id.clone()),
                other => record_error(other, &id),
            })?;

        info!(result = %stored.id, lecturer = %stored.lecturer, actor = %actor.id, "result draft created");
        Ok(stored)
    }

    /// Record CA and examination scores while the lecturer still owns the record.
    pub fn enter_scores(
        &self,
        actor: &Actor,
        id: &ResultId,
        ca_score: u8,
        exam_score: u8,
    ) -> Result<ResultRecord, WorkflowError> {
        let record = self.load(id)?;

        if !scope::can_author(actor, &record) {
            warn!(result = %id, actor = %actor.id, role = %actor.role, "score entry outside scope");
            return Err(WorkflowError::out_of_scope(actor));
        }
        if !record.status.accepts_scores() {
            return Err(WorkflowError::RecordReadOnly {
                id: id.clone(),
                status: record.status,
            });
        }

        let ca = Score::new(ca_score).map_err(|_| WorkflowError::InvalidScore {
            field: "ca",
            value: ca_score,
        })?;
        let exam = Score::new(exam_score).map_err(|_| WorkflowError::InvalidScore {
            field: "exam",
            value: exam_score,
        })?;

        ensure_session_open(self.store.as_ref(), record.session())?;

        let mut next = record.clone();
        next.ca_score = Some(ca);
        next.exam_score = Some(exam);
        next.updated_by = actor.id.clone();
        next.updated_at = Utc::now();

        let event = AuditEvent::result(
            record.session(),
            id,
            AuditAction::ScoresEntered {
                ca_score,
                exam_score,
            },
            actor,
        );

        let stored = self
            .store
            .swap_result(record.revision, next, event)
            .map_err(|err| record_error(err, id))?;

        info!(result = %id, actor = %actor.id, "scores entered");
        Ok(stored)
    }

    pub fn submit_results(
        &self,
        actor: &Actor,
        ids: &[ResultId],
    ) -> Result<BulkTransitionReport, WorkflowError> {
        self.bulk(actor, ids, Transition::Submit)
    }

    pub fn department_approve(
        &self,
        actor: &Actor,
        ids: &[ResultId],
    ) -> Result<BulkTransitionReport, WorkflowError> {
        self.bulk(actor, ids, Transition::DepartmentApprove)
    }

    pub fn faculty_approve(
        &self,
        actor: &Actor,
        ids: &[ResultId],
    ) -> Result<BulkTransitionReport, WorkflowError> {
        self.bulk(actor, ids, Transition::FacultyApprove)
    }

    pub fn final_approve(
        &self,
        actor: &Actor,
        ids: &[ResultId],
    ) -> Result<BulkTransitionReport, WorkflowError> {
        self.bulk(actor, ids, Transition::FinalApprove)
    }

    pub fn reject_result(
        &self,
        actor: &Actor,
        id: &ResultId,
        reason: Option<String>,
    ) -> Result<ResultRecord, WorkflowError> {
        let reason = reason
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());
        transition_result(self.store.as_ref(), actor, id, Transition::Reject, reason)
    }

    /// Send a submitted result back to its lecturer with a required message.
    pub fn request_correction(
        &self,
        actor: &Actor,
        id: &ResultId,
        message: &str,
    ) -> Result<ResultRecord, WorkflowError> {
        let message = message.trim();
        if message.is_empty() {
            return Err(WorkflowError::MissingReason("correction message"));
        }

        let record = transition_result(
            self.store.as_ref(),
            actor,
            id,
            Transition::RequestCorrection,
            Some(message.to_string()),
        )?;

        let notification = Notification::new(record.lecturer.as_str(), "result_returned")
            .with("result_id", record.id.as_str())
            .with("course", record.key.course.as_str())
            .with("message", message);
        if let Err(err) = self.notifier.send(notification) {
            warn!(result = %id, error = %err, "correction notice not delivered");
        }

        Ok(record)
    }

    pub fn get(&self, actor: &Actor, id: &ResultId) -> Result<ResultRecord, WorkflowError> {
        let record = self.load(id)?;
        if !scope::can_view_result(actor, &record) {
            return Err(WorkflowError::out_of_scope(actor));
        }
        Ok(record)
    }

    /// Results the actor may see, optionally narrowed to one session.
    pub fn results_visible_to(
        &self,
        actor: &Actor,
        session: Option<&SessionId>,
    ) -> Result<Vec<ResultRecord>, WorkflowError> {
        let sessions = match session {
            Some(id) => vec![id.clone()],
            None => self
                .store
                .sessions()?
                .into_iter()
                .map(|session| session.id)
                .collect(),
        };

        let mut visible = Vec::new();
        for id in &sessions {
            visible.extend(
                self.store
                    .results_in_session(id)?
                    .into_iter()
                    .filter(|record| scope::can_view_result(actor, record)),
            );
        }

        debug!(actor = %actor.id, count = visible.len(), "results listed");
        Ok(visible)
    }

    /// Status and score history for a single record, in insertion order.
    pub fn result_history(
        &self,
        actor: &Actor,
        id: &ResultId,
    ) -> Result<Vec<AuditEntry>, WorkflowError> {
        let record = self.load(id)?;
        if actor.role == Role::Student || !scope::covers_result(actor, &record) {
            return Err(WorkflowError::out_of_scope(actor));
        }
        Ok(self.store.entries_for_result(id)?)
    }

    fn load(&self, id: &ResultId) -> Result<ResultRecord, WorkflowError> {
        self.store
            .fetch_result(id)?
            .ok_or_else(|| WorkflowError::RecordNotFound(id.clone()))
    }

    fn bulk(
        &self,
        actor: &Actor,
        ids: &[ResultId],
        transition: Transition,
    ) -> Result<BulkTransitionReport, WorkflowError> {
        if ids.is_empty() {
            return Err(WorkflowError::EmptySelection);
        }

        let mut seen = HashSet::new();
        let items: Vec<TransitionItem> = ids
            .iter()
            .filter(|id| seen.insert((*id).clone()))
            .map(|id| {
                let outcome = transition_result(self.store.as_ref(), actor, id, transition, None)
                    .map(|record| record.status);
                if let Err(err) = &outcome {
                    warn!(result = %id, %transition, code = err.code(), "result skipped");
                }
                TransitionItem {
                    result_id: id.clone(),
                    outcome,
                }
            })
            .collect();

        let report = BulkTransitionReport { transition, items };
        info!(
            %transition,
            actor = %actor.id,
            succeeded = report.succeeded(),
            skipped = report.skipped(),
            "bulk transition processed"
        );
        Ok(report)
    }
}

/// Check scope, edge legality and the session lock, then compare-and-swap the
/// record together with its audit entry.
pub(crate) fn transition_result<S>(
    store: &S,
    actor: &Actor,
    id: &ResultId,
    transition: Transition,
    note: Option<String>,
) -> Result<ResultRecord, WorkflowError>
where
    S: GovernanceStore + ?Sized,
{
    let record = store
        .fetch_result(id)?
        .ok_or_else(|| WorkflowError::RecordNotFound(id.clone()))?;

    if !scope::can_transition(actor, &record, transition) {
        return Err(WorkflowError::out_of_scope(actor));
    }

    let to = transitions::next_status(record.status, transition).ok_or(
        WorkflowError::InvalidTransition {
            from: record.status,
            transition,
        },
    )?;

    ensure_session_open(store, record.session())?;

    if matches!(
        transition,
        Transition::Submit | Transition::DepartmentApprove
    ) && !record.has_scores()
    {
        return Err(WorkflowError::MissingScores(id.clone()));
    }

    let next = transitions::apply_edge(&record, transition, to, actor, note.clone());
    let event = AuditEvent::result(
        record.session(),
        id,
        AuditAction::StatusChanged {
            transition,
            from: record.status,
            to,
        },
        actor,
    )
    .with_detail(note);

    let stored = store
        .swap_result(record.revision, next, event)
        .map_err(|err| record_error(err, id))?;

    info!(result = %id, from = %record.status, to = %stored.status, actor = %actor.id, "result status changed");
    Ok(stored)
}

pub(crate) fn ensure_session_open<S>(store: &S, session: &SessionId) -> Result<(), WorkflowError>
where
    S: GovernanceStore + ?Sized,
{
    let session = store
        .fetch_session(session)?
        .ok_or_else(|| WorkflowError::SessionNotFound(session.clone()))?;
    if session.is_locked() {
        return Err(WorkflowError::SessionLocked(session.id));
    }
    if session.is_archived() {
        return Err(WorkflowError::SessionArchived(session.id));
    }
    Ok(())
}

fn record_error(err: RepositoryError, id: &ResultId) -> WorkflowError {
    match err {
        RepositoryError::Stale { .. } => WorkflowError::ConcurrentModification(id.to_string()),
        RepositoryError::NotFound => WorkflowError::RecordNotFound(id.clone()),
        RepositoryError::SessionLocked(session) => WorkflowError::SessionLocked(session),
        RepositoryError::SessionArchived(session) => WorkflowError::SessionArchived(session),
        other => WorkflowError::Repository(other),
    }
}
