//! Durability of statuses, the lock flag, and lock log entries across restarts.

use std::sync::Arc;

use chrono::NaiveDate;

use gradegate::workflows::results::{
    Actor, ActorId, CourseId, DepartmentId, FacultyId, LockAction, LockEntryStatus, MemoryStore,
    NewResult, NewSession, Notification, NotificationError, NotificationSender,
    PublicationLockGovernor, ResultStatus, ResultWorkflowService, Role, SessionId, StudentId,
};

struct Discard;

impl NotificationSender for Discard {
    fn send(&self, _notification: Notification) -> Result<(), NotificationError> {
        Ok(())
    }
}

fn services(
    store: MemoryStore,
) -> (
    ResultWorkflowService<MemoryStore, Discard>,
    PublicationLockGovernor<MemoryStore, Discard>,
) {
    let store = Arc::new(store);
    let notifier = Arc::new(Discard);
    (
        ResultWorkflowService::new(store.clone(), notifier.clone()),
        PublicationLockGovernor::new(store, notifier),
    )
}

#[test]
fn published_lock_and_pending_request_survive_restart() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("governance.json");
    let admin = Actor::new("registrar", Role::Admin);
    let officer = Actor::new("eo-1", Role::ExamOfficer).in_department("physics");
    let session = SessionId::new("2023/2024");

    let result_id = {
        let (results, governor) = services(MemoryStore::open(&path).expect("store opens"));
        governor
            .create_session(
                &admin,
                NewSession {
                    label: session.clone(),
                    starts_on: NaiveDate::from_ymd_opt(2023, 9, 4).expect("valid date"),
                    ends_on: NaiveDate::from_ymd_opt(2024, 7, 26).expect("valid date"),
                    faculty: None,
                },
            )
            .expect("session created");
        let record = results
            .create_draft(
                &admin,
                NewResult {
                    student: StudentId::new("stu-77"),
                    course: CourseId::new("PHY110"),
                    session: session.clone(),
                    department: DepartmentId::new("physics"),
                    faculty: FacultyId::new("science"),
                    lecturer: Some(ActorId::new("lec-9")),
                },
            )
            .expect("draft created");
        results
            .enter_scores(&admin, &record.id, 20, 45)
            .expect("scores entered");
        results
            .submit_results(&admin, &[record.id.clone()])
            .expect("submitted");
        governor
            .publish_session(&admin, &session)
            .expect("published");
        governor
            .request_reopen(&officer, &session, "moderation outstanding")
            .expect("requested");
        record.id
    };

    let (results, governor) = services(MemoryStore::open(&path).expect("store reopens"));
    let record = results.get(&admin, &result_id).expect("record persisted");
    assert_eq!(record.status, ResultStatus::Submitted);
    assert_eq!(record.lecturer.as_str(), "lec-9");

    let summary = governor
        .session_summary(&admin, &session)
        .expect("summary");
    assert!(summary.results_published);
    let pending = summary.pending_request.expect("request persisted");
    assert_eq!(pending.action, LockAction::UnlockRequested);
    assert_eq!(pending.status, LockEntryStatus::Pending);

    let report = results
        .department_approve(&admin, &[result_id.clone()])
        .expect("bulk call accepted");
    assert_eq!(report.succeeded(), 0);
}
