//! Approval pipeline edges.
//!
//! ```text
//! draft --submit--> submitted
//! submitted --department_approve--> department_approved
//! submitted --reject--> rejected
//! submitted --request_correction--> returned_for_correction
//! department_approved --faculty_approve--> faculty_approved
//! department_approved --reject--> rejected
//! faculty_approved --final_approve--> published
//! faculty_approved --reject--> rejected
//! returned_for_correction --submit--> submitted
//! ```
//!
//! This table is the only source of legal status moves; everything else is rejected.

use chrono::Utc;

use super::domain::{Actor, ResultRecord, ResultStatus, Transition};

pub const EDGES: &[(ResultStatus, Transition, ResultStatus)] = &[
    (
        ResultStatus::Draft,
        Transition::Submit,
        ResultStatus::Submitted,
    ),
    (
        ResultStatus::Submitted,
        Transition::DepartmentApprove,
        ResultStatus::DepartmentApproved,
    ),
    (
        ResultStatus::Submitted,
        Transition::Reject,
        ResultStatus::Rejected,
    ),
    (
        ResultStatus::Submitted,
        Transition::RequestCorrection,
        ResultStatus::ReturnedForCorrection,
    ),
    (
        ResultStatus::DepartmentApproved,
        Transition::FacultyApprove,
        ResultStatus::FacultyApproved,
    ),
    (
        ResultStatus::DepartmentApproved,
        Transition::Reject,
        ResultStatus::Rejected,
    ),
    (
        ResultStatus::FacultyApproved,
        Transition::FinalApprove,
        ResultStatus::Published,
    ),
    (
        ResultStatus::FacultyApproved,
        Transition::Reject,
        ResultStatus::Rejected,
    ),
    (
        ResultStatus::ReturnedForCorrection,
        Transition::Submit,
        ResultStatus::Submitted,
    ),
];

/// Target status of `transition` from `from`, or `None` when no edge exists.
pub fn next_status(from: ResultStatus, transition: Transition) -> Option<ResultStatus> {
    EDGES
        .iter()
        .find(|(source, edge, _)| *source == from && *edge == transition)
        .map(|(_, _, target)| *target)
}

pub fn allowed_transitions(from: ResultStatus) -> Vec<Transition> {
    EDGES
        .iter()
        .filter(|(source, _, _)| *source == from)
        .map(|(_, edge, _)| *edge)
        .collect()
}

/// Published and rejected results have no outgoing edges.
pub fn is_terminal(status: ResultStatus) -> bool {
    allowed_transitions(status).is_empty()
}

/// Build the record that results from taking `transition` to `to`.
///
/// Returning for correction wipes the scores so stale figures cannot resurface;
/// resubmission clears the correction note.
pub(crate) fn apply_edge(
    record: &ResultRecord,
    transition: Transition,
    to: ResultStatus,
    actor: &Actor,
    note: Option<String>,
) -> ResultRecord {
    let mut next = record.clone();
    next.status = to;
    next.updated_by = actor.id.clone();
    next.updated_at = Utc::now();

    match transition {
        Transition::Submit => next.correction_note = None,
        Transition::RequestCorrection => {
            next.correction_note = note;
            next.ca_score = None;
            next.exam_score = None;
        }
        Transition::Reject => next.rejection_reason = note,
        Transition::DepartmentApprove | Transition::FacultyApprove | Transition::FinalApprove => {}
    }

    next
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_TRANSITIONS: [Transition; 6] = [
        Transition::Submit,
        Transition::DepartmentApprove,
        Transition::FacultyApprove,
        Transition::FinalApprove,
        Transition::Reject,
        Transition::RequestCorrection,
    ];

    #[test]
    fn happy_path_reaches_published() {
        let mut status = ResultStatus::Draft;
        for transition in [
            Transition::Submit,
            Transition::DepartmentApprove,
            Transition::FacultyApprove,
            Transition::FinalApprove,
        ] {
            status = next_status(status, transition).expect("edge exists");
        }
        assert_eq!(status, ResultStatus::Published);
    }

    #[test]
    fn correction_reenters_at_submitted() {
        let returned = next_status(ResultStatus::Submitted, Transition::RequestCorrection);
        assert_eq!(returned, Some(ResultStatus::ReturnedForCorrection));
        assert_eq!(
            next_status(ResultStatus::ReturnedForCorrection, Transition::Submit),
            Some(ResultStatus::Submitted)
        );
    }

    #[test]
    fn correction_is_only_requested_from_submitted() {
        for status in ResultStatus::ordered() {
            let allowed = next_status(status, Transition::RequestCorrection).is_some();
            assert_eq!(allowed, status == ResultStatus::Submitted, "{status}");
        }
    }

    #[test]
    fn terminal_states_have_no_edges() {
        assert!(is_terminal(ResultStatus::Published));
        assert!(is_terminal(ResultStatus::Rejected));
        assert!(!is_terminal(ResultStatus::Draft));
        assert!(!is_terminal(ResultStatus::ReturnedForCorrection));
    }

    #[test]
    fn edge_table_has_exactly_nine_moves() {
        let legal = ResultStatus::ordered()
            .iter()
            .flat_map(|status| {
                ALL_TRANSITIONS
                    .iter()
                    .filter_map(move |transition| next_status(*status, *transition))
            })
            .count();
        assert_eq!(legal, 9);
    }

    #[test]
    fn stages_cannot_be_skipped() {
        assert_eq!(
            next_status(ResultStatus::Draft, Transition::FinalApprove),
            None
        );
        assert_eq!(
            next_status(ResultStatus::Submitted, Transition::FacultyApprove),
            None
        );
        assert_eq!(
            next_status(ResultStatus::DepartmentApproved, Transition::FinalApprove),
            None
        );
        assert_eq!(next_status(ResultStatus::Published, Transition::Reject), None);
    }
}
