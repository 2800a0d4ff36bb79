use std::sync::{Arc, Mutex};

use axum::response::Response;
use chrono::NaiveDate;
use serde_json::Value;

use crate::workflows::results::domain::{
    Actor, CourseId, DepartmentId, FacultyId, ResultId, ResultStatus, Role, SessionId, StudentId,
};
use crate::workflows::results::lock::{NewSession, PublicationLockGovernor};
use crate::workflows::results::repository::{Notification, NotificationError, NotificationSender};
use crate::workflows::results::service::{NewResult, ResultWorkflowService};
use crate::workflows::results::store::MemoryStore;

pub(super) const SESSION: &str = "2024/2025";

#[derive(Default, Clone)]
pub(super) struct RecordingNotifier {
    sent: Arc<Mutex<Vec<Notification>>>,
}

impl RecordingNotifier {
    pub(super) fn sent(&self) -> Vec<Notification> {
        self.sent.lock().expect("notifier mutex poisoned").clone()
    }
}

impl NotificationSender for RecordingNotifier {
    fn send(&self, notification: Notification) -> Result<(), NotificationError> {
        self.sent
            .lock()
            .expect("notifier mutex poisoned")
            .push(notification);
        Ok(())
    }
}

pub(super) struct OfflineNotifier;

impl NotificationSender for OfflineNotifier {
    fn send(&self, _notification: Notification) -> Result<(), NotificationError> {
        Err(NotificationError::Transport("smtp offline".to_string()))
    }
}

pub(super) fn admin() -> Actor {
    Actor::new("admin-1", Role::Admin)
}

pub(super) fn dean() -> Actor {
    Actor::new("dean-1", Role::Dean).in_faculty("science")
}

pub(super) fn hod() -> Actor {
    Actor::new("hod-1", Role::Hod)
        .in_faculty("science")
        .in_department("computing")
}

pub(super) fn exam_officer() -> Actor {
    Actor::new("eo-1", Role::ExamOfficer)
        .in_faculty("science")
        .in_department("computing")
}

pub(super) fn lecturer() -> Actor {
    Actor::new("lec-1", Role::Lecturer)
        .in_faculty("science")
        .in_department("computing")
}

pub(super) fn student(id: &str) -> Actor {
    Actor::new(id, Role::Student)
}

pub(super) fn session_id() -> SessionId {
    SessionId::new(SESSION)
}

pub(super) fn new_session(label: &str) -> NewSession {
    NewSession {
        label: SessionId::new(label),
        starts_on: NaiveDate::from_ymd_opt(2024, 9, 1).expect("valid date"),
        ends_on: NaiveDate::from_ymd_opt(2025, 7, 31).expect("valid date"),
        faculty: None,
    }
}

pub(super) fn new_result(student: &str) -> NewResult {
    NewResult {
        student: StudentId::new(student),
        course: CourseId::new("CSC101"),
        session: session_id(),
        department: DepartmentId::new("computing"),
        faculty: FacultyId::new("science"),
        lecturer: None,
    }
}

pub(super) struct Harness<N = RecordingNotifier> {
    pub(super) store: Arc<MemoryStore>,
    pub(super) notifier: Arc<N>,
    pub(super) results: Arc<ResultWorkflowService<MemoryStore, N>>,
    pub(super) governor: Arc<PublicationLockGovernor<MemoryStore, N>>,
}

pub(super) fn harness() -> Harness {
    harness_with(RecordingNotifier::default())
}

/// Store seeded with the default session, wired to both services.
pub(super) fn harness_with<N>(notifier: N) -> Harness<N>
where
    N: NotificationSender + 'static,
{
    let store = Arc::new(MemoryStore::new());
    let notifier = Arc::new(notifier);
    let results = Arc::new(ResultWorkflowService::new(store.clone(), notifier.clone()));
    let governor = Arc::new(PublicationLockGovernor::new(
        store.clone(),
        notifier.clone(),
    ));
    governor
        .create_session(&admin(), new_session(SESSION))
        .expect("session created");

    Harness {
        store,
        notifier,
        results,
        governor,
    }
}

impl<N> Harness<N>
where
    N: NotificationSender + 'static,
{
    /// Draft with scores entered by the owning lecturer.
    pub(super) fn scored_draft(&self, student: &str) -> ResultId {
        let record = self
            .results
            .create_draft(&lecturer(), new_result(student))
            .expect("draft created");
        self.results
            .enter_scores(&lecturer(), &record.id, 28, 55)
            .expect("scores entered");
        record.id
    }

    /// Walk a scored draft forward until it reaches `target`.
    pub(super) fn advance(&self, id: &ResultId, target: ResultStatus) {
        let steps = [
            (ResultStatus::Submitted, lecturer()),
            (ResultStatus::DepartmentApproved, hod()),
            (ResultStatus::FacultyApproved, dean()),
            (ResultStatus::Published, admin()),
        ];
        let ids = [id.clone()];
        for (status, actor) in steps {
            let report = match status {
                ResultStatus::Submitted => self.results.submit_results(&actor, &ids),
                ResultStatus::DepartmentApproved => self.results.department_approve(&actor, &ids),
                ResultStatus::FacultyApproved => self.results.faculty_approve(&actor, &ids),
                _ => self.results.final_approve(&actor, &ids),
            }
            .expect("bulk call accepted");
            assert_eq!(report.succeeded(), 1, "advance to {status}");
            if status == target {
                return;
            }
        }
    }

    pub(super) fn status_of(&self, id: &ResultId) -> ResultStatus {
        self.results.get(&admin(), id).expect("record readable").status
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
