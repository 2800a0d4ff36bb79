use super::common::*;
use std::sync::Barrier;

use crate::workflows::results::audit::{AuditAction, AuditLog};
use crate::workflows::results::domain::{Actor, CourseId, ResultId, ResultStatus, Role, Transition};
use crate::workflows::results::error::WorkflowError;
use crate::workflows::results::repository::ResultRepository;

#[test]
fn draft_moves_through_every_approval_stage() {
    let harness = harness();
    let id = harness.scored_draft("stu-1");

    harness.advance(&id, ResultStatus::Published);

    assert_eq!(harness.status_of(&id), ResultStatus::Published);
    let history = harness
        .results
        .result_history(&admin(), &id)
        .expect("history readable");
    let transitions: Vec<Transition> = history
        .iter()
        .filter_map(|entry| match entry.event.action {
            AuditAction::StatusChanged { transition, .. } => Some(transition),
            _ => None,
        })
        .collect();
    assert_eq!(
        transitions,
        vec![
            Transition::Submit,
            Transition::DepartmentApprove,
            Transition::FacultyApprove,
            Transition::FinalApprove,
        ]
    );
}

#[test]
fn non_edge_transition_leaves_record_untouched() {
    let harness = harness();
    let id = harness.scored_draft("stu-1");
    let before = harness.store.fetch_result(&id).unwrap().expect("stored");
    let audit_before = harness.store.entries_for_result(&id).unwrap().len();

    let report = harness
        .results
        .final_approve(&admin(), &[id.clone()])
        .expect("bulk call accepted");

    match &report.item(&id).expect("item reported").outcome {
        Err(WorkflowError::InvalidTransition { from, transition }) => {
            assert_eq!(*from, ResultStatus::Draft);
            assert_eq!(*transition, Transition::FinalApprove);
        }
        other => panic!("expected invalid transition, got {other:?}"),
    }
    let after = harness.store.fetch_result(&id).unwrap().expect("stored");
    assert_eq!(after, before);
    assert_eq!(harness.store.entries_for_result(&id).unwrap().len(), audit_before);
}

#[test]
fn bulk_reports_every_id_without_short_circuit() {
    let harness = harness();
    let ready = harness.scored_draft("stu-1");
    let unscored = harness
        .results
        .create_draft(&lecturer(), new_result("stu-2"))
        .expect("draft created")
        .id;
    let missing = ResultId::new("2024/2025:CSC101:ghost");

    let report = harness
        .results
        .submit_results(&lecturer(), &[missing.clone(), unscored.clone(), ready.clone()])
        .expect("bulk call accepted");

    assert_eq!(report.succeeded(), 1);
    assert_eq!(report.skipped(), 2);
    assert_eq!(report.applied_ids(), vec![ready.clone()]);
    assert!(matches!(
        report.item(&missing).unwrap().outcome,
        Err(WorkflowError::RecordNotFound(_))
    ));
    assert!(matches!(
        report.item(&unscored).unwrap().outcome,
        Err(WorkflowError::MissingScores(_))
    ));

    let summary = report.summary();
    assert_eq!(summary.requested, 3);
    assert_eq!(summary.results[0].code, Some("record_not_found"));
    assert_eq!(summary.results[2].status, Some("submitted"));
}

#[test]
fn out_of_scope_actor_is_skipped_per_item() {
    let harness = harness();
    let id = harness.scored_draft("stu-1");
    harness.advance(&id, ResultStatus::Submitted);

    let foreign_hod = Actor::new("hod-9", Role::Hod).in_department("physics");
    let report = harness
        .results
        .department_approve(&foreign_hod, &[id.clone()])
        .expect("bulk call accepted");

    assert!(matches!(
        report.item(&id).unwrap().outcome,
        Err(WorkflowError::OutOfScope { .. })
    ));
    assert_eq!(harness.status_of(&id), ResultStatus::Submitted);
}

#[test]
fn empty_selection_is_refused() {
    let harness = harness();
    assert!(matches!(
        harness.results.submit_results(&lecturer(), &[]),
        Err(WorkflowError::EmptySelection)
    ));
}

#[test]
fn repeated_ids_are_processed_once() {
    let harness = harness();
    let id = harness.scored_draft("stu-1");

    let report = harness
        .results
        .submit_results(&lecturer(), &[id.clone(), id.clone()])
        .expect("bulk call accepted");

    assert_eq!(report.items.len(), 1);
    assert_eq!(report.succeeded(), 1);
}

#[test]
fn correction_wipes_scores_and_resubmission_clears_note() {
    let harness = harness();
    let id = harness.scored_draft("stu-1");
    harness.advance(&id, ResultStatus::Submitted);

    let returned = harness
        .results
        .request_correction(&hod(), &id, "CA total does not match the sheet")
        .expect("correction requested");
    assert_eq!(returned.status, ResultStatus::ReturnedForCorrection);
    assert_eq!(
        returned.correction_note.as_deref(),
        Some("CA total does not match the sheet")
    );
    assert!(!returned.has_scores());

    let report = harness
        .results
        .submit_results(&lecturer(), &[id.clone()])
        .expect("bulk call accepted");
    assert!(matches!(
        report.item(&id).unwrap().outcome,
        Err(WorkflowError::MissingScores(_))
    ));

    harness
        .results
        .enter_scores(&lecturer(), &id, 30, 60)
        .expect("fresh scores entered");
    let report = harness
        .results
        .submit_results(&lecturer(), &[id.clone()])
        .expect("bulk call accepted");
    assert_eq!(report.succeeded(), 1);

    let resubmitted = harness.results.get(&admin(), &id).expect("readable");
    assert_eq!(resubmitted.status, ResultStatus::Submitted);
    assert_eq!(resubmitted.correction_note, None);
    assert_eq!(resubmitted.total_score(), Some(90));
}

#[test]
fn correction_notifies_the_lecturer() {
    let harness = harness();
    let id = harness.scored_draft("stu-1");
    harness.advance(&id, ResultStatus::Submitted);

    harness
        .results
        .request_correction(&hod(), &id, "exam score missing a page")
        .expect("correction requested");

    let sent = harness.notifier.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].recipient, "lec-1");
    assert_eq!(sent[0].template, "result_returned");
    assert_eq!(sent[0].payload["message"], "exam score missing a page");
}

#[test]
fn correction_survives_notification_outage() {
    let harness = harness_with(OfflineNotifier);
    let id = harness.scored_draft("stu-1");
    harness.advance(&id, ResultStatus::Submitted);

    let returned = harness
        .results
        .request_correction(&hod(), &id, "recheck")
        .expect("state change still committed");
    assert_eq!(returned.status, ResultStatus::ReturnedForCorrection);
}

#[test]
fn correction_requires_a_message() {
    let harness = harness();
    let id = harness.scored_draft("stu-1");
    harness.advance(&id, ResultStatus::Submitted);

    assert!(matches!(
        harness.results.request_correction(&hod(), &id, "   "),
        Err(WorkflowError::MissingReason(_))
    ));
    assert_eq!(harness.status_of(&id), ResultStatus::Submitted);
}

#[test]
fn rejection_records_the_reason() {
    let harness = harness();
    let id = harness.scored_draft("stu-1");
    harness.advance(&id, ResultStatus::DepartmentApproved);

    let rejected = harness
        .results
        .reject_result(&dean(), &id, Some("course not offered this term".to_string()))
        .expect("rejected");

    assert_eq!(rejected.status, ResultStatus::Rejected);
    assert_eq!(
        rejected.rejection_reason.as_deref(),
        Some("course not offered this term")
    );
    assert!(matches!(
        harness.results.reject_result(&admin(), &id, None),
        Err(WorkflowError::InvalidTransition { .. })
    ));
}

#[test]
fn scores_are_read_only_after_submission() {
    let harness = harness();
    let id = harness.scored_draft("stu-1");
    harness.advance(&id, ResultStatus::Submitted);

    assert!(matches!(
        harness.results.enter_scores(&lecturer(), &id, 10, 10),
        Err(WorkflowError::RecordReadOnly { .. })
    ));
}

#[test]
fn score_entry_is_bounded_and_owned() {
    let harness = harness();
    let id = harness
        .results
        .create_draft(&lecturer(), new_result("stu-1"))
        .expect("draft created")
        .id;

    assert!(matches!(
        harness.results.enter_scores(&lecturer(), &id, 101, 40),
        Err(WorkflowError::InvalidScore { field: "ca", value: 101 })
    ));
    assert!(matches!(
        harness.results.enter_scores(&hod(), &id, 20, 40),
        Err(WorkflowError::OutOfScope { .. })
    ));
}

#[test]
fn duplicate_composite_key_is_refused() {
    let harness = harness();
    harness.scored_draft("stu-1");

    assert!(matches!(
        harness.results.create_draft(&lecturer(), new_result("stu-1")),
        Err(WorkflowError::DuplicateRecord(_))
    ));
}

#[test]
fn separator_inside_key_parts_does_not_collide() {
    let harness = harness();
    let mut first = new_result("C");
    first.course = CourseId::new("A:B");
    let mut second = new_result("B:C");
    second.course = CourseId::new("A");

    let first = harness
        .results
        .create_draft(&lecturer(), first)
        .expect("first draft");
    let second = harness
        .results
        .create_draft(&lecturer(), second)
        .expect("second draft");

    assert_ne!(first.id, second.id);
    assert_eq!(first.id.as_str(), "2024/2025:A%3AB:C");
    assert_eq!(harness.status_of(&second.id), ResultStatus::Draft);
}

#[test]
fn students_see_only_their_published_results() {
    let harness = harness();
    let published = harness.scored_draft("stu-1");
    harness.advance(&published, ResultStatus::Published);
    let pending = harness.scored_draft("stu-2");
    harness.advance(&pending, ResultStatus::FacultyApproved);

    let own = harness
        .results
        .results_visible_to(&student("stu-1"), None)
        .expect("listing");
    assert_eq!(own.len(), 1);
    assert_eq!(own[0].id, published);

    let waiting = harness
        .results
        .results_visible_to(&student("stu-2"), Some(&session_id()))
        .expect("listing");
    assert!(waiting.is_empty());

    assert!(matches!(
        harness.results.get(&student("stu-2"), &pending),
        Err(WorkflowError::OutOfScope { .. })
    ));
    assert!(matches!(
        harness.results.result_history(&student("stu-1"), &published),
        Err(WorkflowError::OutOfScope { .. })
    ));
}

#[test]
fn concurrent_department_approvals_apply_once() {
    let harness = harness();
    let id = harness.scored_draft("stu-1");
    harness.advance(&id, ResultStatus::Submitted);

    let barrier = Barrier::new(2);
    let (harness, barrier, id) = (&harness, &barrier, &id);
    let applied: usize = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..2)
            .map(|_| {
                scope.spawn(move || {
                    barrier.wait();
                    harness
                        .results
                        .department_approve(&hod(), &[id.clone()])
                        .expect("bulk call accepted")
                        .succeeded()
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().expect("approver thread"))
            .sum()
    });

    assert_eq!(applied, 1);
    assert_eq!(harness.status_of(&id), ResultStatus::DepartmentApproved);
    let approvals = harness
        .store
        .entries_for_result(&id)
        .unwrap()
        .iter()
        .filter(|entry| {
            matches!(
                entry.event.action,
                AuditAction::StatusChanged {
                    transition: Transition::DepartmentApprove,
                    ..
                }
            )
        })
        .count();
    assert_eq!(approvals, 1);
}
