//! Access-scope resolution: pure eligibility checks consulted before every mutation.

use super::domain::{
    AcademicSession, Actor, DepartmentId, ResultRecord, ResultStatus, Role, Transition,
};

/// Whether the actor's scope covers the record at all, independent of the action.
pub fn covers_result(actor: &Actor, record: &ResultRecord) -> bool {
    match actor.role {
        Role::Admin => true,
        Role::Dean => actor.faculty.as_ref() == Some(&record.faculty),
        Role::Hod | Role::ExamOfficer => actor.department.as_ref() == Some(&record.department),
        Role::Lecturer => actor.id == record.lecturer,
        Role::Student => actor.id.as_str() == record.key.student.as_str(),
    }
}

/// Read access. Students only ever see their own published results.
pub fn can_view_result(actor: &Actor, record: &ResultRecord) -> bool {
    if actor.role == Role::Student {
        return covers_result(actor, record) && record.status == ResultStatus::Published;
    }
    covers_result(actor, record)
}

/// Score entry on an existing record.
pub fn can_author(actor: &Actor, record: &ResultRecord) -> bool {
    match actor.role {
        Role::Admin => true,
        Role::Lecturer => actor.id == record.lecturer,
        _ => false,
    }
}

/// Role that signs off a record at its current stage.
fn stage_approver(status: ResultStatus) -> Option<Role> {
    match status {
        ResultStatus::Submitted => Some(Role::Hod),
        ResultStatus::DepartmentApproved => Some(Role::Dean),
        ResultStatus::FacultyApproved => Some(Role::Admin),
        _ => None,
    }
}

/// Whether the actor may attempt `transition` on the record. Legality of the
/// move itself is decided by the transition table afterwards.
pub fn can_transition(actor: &Actor, record: &ResultRecord, transition: Transition) -> bool {
    if !covers_result(actor, record) {
        return false;
    }

    match transition {
        Transition::Submit => matches!(
            actor.role,
            Role::Admin | Role::Lecturer | Role::ExamOfficer
        ),
        Transition::DepartmentApprove => matches!(actor.role, Role::Admin | Role::Hod),
        Transition::FacultyApprove => matches!(actor.role, Role::Admin | Role::Dean),
        Transition::FinalApprove => actor.role == Role::Admin,
        Transition::Reject | Transition::RequestCorrection => {
            match stage_approver(record.status) {
                Some(approver) => actor.role == Role::Admin || actor.role == approver,
                None => matches!(actor.role, Role::Admin | Role::Dean | Role::Hod),
            }
        }
    }
}

/// Lecturers create drafts for their own courses; admins may create on anyone's behalf.
pub fn can_create_result(actor: &Actor, department: &DepartmentId) -> bool {
    match actor.role {
        Role::Admin => true,
        Role::Lecturer => actor.department.as_ref() == Some(department),
        _ => false,
    }
}

/// Whether the session falls within the actor's scope.
pub fn covers_session(actor: &Actor, session: &AcademicSession) -> bool {
    match (actor.role, session.faculty.as_ref()) {
        (Role::Admin, _) => true,
        (Role::Student, _) => false,
        (_, None) => true,
        (_, Some(faculty)) => actor.faculty.as_ref() == Some(faculty),
    }
}

pub fn can_manage_sessions(actor: &Actor) -> bool {
    actor.role == Role::Admin
}

/// Publication is the final global checkpoint and stays admin-only.
pub fn can_publish(actor: &Actor, session: &AcademicSession) -> bool {
    actor.role == Role::Admin && covers_session(actor, session)
}

pub fn can_request_reopen(actor: &Actor, session: &AcademicSession) -> bool {
    matches!(actor.role, Role::ExamOfficer | Role::Hod | Role::Dean) && covers_session(actor, session)
}

/// Only deans and admins resolve reopen requests, and only those raised by a junior role.
pub fn can_resolve_reopen(actor: &Actor, requester: Role) -> bool {
    matches!(actor.role, Role::Dean | Role::Admin) && actor.role.seniority() > requester.seniority()
}

/// Oversight roles may read the session audit trail.
pub fn can_audit_session(actor: &Actor, session: &AcademicSession) -> bool {
    matches!(
        actor.role,
        Role::Admin | Role::Dean | Role::Hod | Role::ExamOfficer
    ) && covers_session(actor, session)
}
