use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

string_id!(
    /// Identifier of a result record, derived from its composite key.
    ResultId
);
string_id!(StudentId);
string_id!(CourseId);
string_id!(
    /// Academic session label, e.g. `2024/2025`.
    SessionId
);
string_id!(DepartmentId);
string_id!(FacultyId);
string_id!(
    /// Authenticated staff or student account acting on the workflow.
    ActorId
);

/// Composite identity of a result: one record per student, course and session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResultKey {
    pub student: StudentId,
    pub course: CourseId,
    pub session: SessionId,
}

impl ResultKey {
    /// Parts are joined with `:`; `%` and `:` inside a part are escaped so
    /// distinct keys never share an id.
    pub fn result_id(&self) -> ResultId {
        ResultId(format!(
            "{}:{}:{}",
            escape_key_part(self.session.as_str()),
            escape_key_part(self.course.as_str()),
            escape_key_part(self.student.as_str())
        ))
    }
}

fn escape_key_part(part: &str) -> String {
    part.replace('%', "%25").replace(':', "%3A")
}

pub const MAX_SCORE: u8 = 100;

/// Bounded assessment score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Score(u8);

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("score {0} is outside 0..=100")]
pub struct ScoreOutOfRange(pub u8);

impl Score {
    pub fn new(value: u8) -> Result<Self, ScoreOutOfRange> {
        if value > MAX_SCORE {
            return Err(ScoreOutOfRange(value));
        }
        Ok(Self(value))
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for Score {
    type Error = ScoreOutOfRange;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Score> for u8 {
    fn from(score: Score) -> Self {
        score.0
    }
}

/// Position of a result in the approval pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultStatus {
    Draft,
    Submitted,
    DepartmentApproved,
    FacultyApproved,
    Published,
    Rejected,
    ReturnedForCorrection,
}

impl ResultStatus {
    pub const fn ordered() -> [Self; 7] {
        [
            Self::Draft,
            Self::Submitted,
            Self::DepartmentApproved,
            Self::FacultyApproved,
            Self::Published,
            Self::Rejected,
            Self::ReturnedForCorrection,
        ]
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Submitted => "submitted",
            Self::DepartmentApproved => "department_approved",
            Self::FacultyApproved => "faculty_approved",
            Self::Published => "published",
            Self::Rejected => "rejected",
            Self::ReturnedForCorrection => "returned_for_correction",
        }
    }

    /// Scores may only change while the lecturer still owns the record.
    pub const fn accepts_scores(self) -> bool {
        matches!(self, Self::Draft | Self::ReturnedForCorrection)
    }
}

impl fmt::Display for ResultStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Requested move along the approval pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    Submit,
    DepartmentApprove,
    FacultyApprove,
    FinalApprove,
    Reject,
    RequestCorrection,
}

impl Transition {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Submit => "submit",
            Self::DepartmentApprove => "department_approve",
            Self::FacultyApprove => "faculty_approve",
            Self::FinalApprove => "final_approve",
            Self::Reject => "reject",
            Self::RequestCorrection => "request_correction",
        }
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One result per (student, course, session), moved only through the approval pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub id: ResultId,
    pub key: ResultKey,
    pub department: DepartmentId,
    pub faculty: FacultyId,
    pub lecturer: ActorId,
    pub ca_score: Option<Score>,
    pub exam_score: Option<Score>,
    pub status: ResultStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correction_note: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
    /// Bumped on every committed change; stores compare it before swapping.
    pub revision: u64,
    pub updated_by: ActorId,
    pub updated_at: DateTime<Utc>,
}

impl ResultRecord {
    pub fn session(&self) -> &SessionId {
        &self.key.session
    }

    pub fn has_scores(&self) -> bool {
        self.ca_score.is_some() && self.exam_score.is_some()
    }

    pub fn total_score(&self) -> Option<u16> {
        match (self.ca_score, self.exam_score) {
            (Some(ca), Some(exam)) => Some(ca.value() as u16 + exam.value() as u16),
            _ => None,
        }
    }

    pub fn status_view(&self) -> ResultStatusView {
        ResultStatusView {
            result_id: self.id.clone(),
            student: self.key.student.clone(),
            course: self.key.course.clone(),
            session: self.key.session.clone(),
            status: self.status.label(),
            ca_score: self.ca_score.map(Score::value),
            exam_score: self.exam_score.map(Score::value),
            total_score: self.total_score(),
            correction_note: self.correction_note.clone(),
            rejection_reason: self.rejection_reason.clone(),
        }
    }
}

/// Read-side projection of a result for API responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResultStatusView {
    pub result_id: ResultId,
    pub student: StudentId,
    pub course: CourseId,
    pub session: SessionId,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ca_score: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exam_score: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_score: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correction_note: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    ResultsPublished,
    Archived,
}

impl SessionStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::ResultsPublished => "results_published",
            Self::Archived => "archived",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockAction {
    Locked,
    UnlockRequested,
    Reopened,
    Rejected,
}

impl LockAction {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Locked => "locked",
            Self::UnlockRequested => "unlock_requested",
            Self::Reopened => "reopened",
            Self::Rejected => "rejected",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockEntryStatus {
    Pending,
    Approved,
    Rejected,
}

impl LockEntryStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }
}

/// Position of an entry in a session's lock log, starting at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LockEntryId(pub u64);

impl fmt::Display for LockEntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Append-only lock history entry. Only a pending request's resolution fields ever change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockLogEntry {
    pub id: LockEntryId,
    pub action: LockAction,
    pub requested_by: ActorId,
    pub requested_role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved_by: Option<ActorId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub status: LockEntryStatus,
    /// For `reopened`/`rejected` entries, the unlock request they resolve.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolves: Option<LockEntryId>,
    pub timestamp: DateTime<Utc>,
}

impl LockLogEntry {
    pub fn is_pending_request(&self) -> bool {
        self.action == LockAction::UnlockRequested && self.status == LockEntryStatus::Pending
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcademicSession {
    pub id: SessionId,
    pub starts_on: NaiveDate,
    pub ends_on: NaiveDate,
    /// `None` for institution-wide sessions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub faculty: Option<FacultyId>,
    pub status: SessionStatus,
    pub results_published: bool,
    pub lock_logs: Vec<LockLogEntry>,
    pub version: u64,
}

impl AcademicSession {
    pub fn new(
        id: SessionId,
        starts_on: NaiveDate,
        ends_on: NaiveDate,
        faculty: Option<FacultyId>,
    ) -> Self {
        Self {
            id,
            starts_on,
            ends_on,
            faculty,
            status: SessionStatus::Active,
            results_published: false,
            lock_logs: Vec::new(),
            version: 0,
        }
    }

    pub fn is_locked(&self) -> bool {
        self.results_published
    }

    pub fn is_archived(&self) -> bool {
        self.status == SessionStatus::Archived
    }

    pub fn pending_request(&self) -> Option<&LockLogEntry> {
        self.lock_logs
            .iter()
            .rev()
            .find(|entry| entry.is_pending_request())
    }

    pub fn lock_entry(&self, id: LockEntryId) -> Option<&LockLogEntry> {
        self.lock_logs.iter().find(|entry| entry.id == id)
    }

    pub(crate) fn next_entry_id(&self) -> LockEntryId {
        LockEntryId(self.lock_logs.len() as u64 + 1)
    }
}

/// Institutional role of an actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Dean,
    Hod,
    ExamOfficer,
    Lecturer,
    Student,
}

impl Role {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Dean => "dean",
            Self::Hod => "hod",
            Self::ExamOfficer => "exam_officer",
            Self::Lecturer => "lecturer",
            Self::Student => "student",
        }
    }

    pub const fn scope(self) -> Scope {
        match self {
            Self::Admin => Scope::Global,
            Self::Dean => Scope::Faculty,
            Self::Hod | Self::ExamOfficer => Scope::Department,
            Self::Lecturer => Scope::OwnCourses,
            Self::Student => Scope::OwnRecords,
        }
    }

    /// Governance rank used when resolving reopen requests.
    pub const fn seniority(self) -> u8 {
        match self {
            Self::Admin => 5,
            Self::Dean => 4,
            Self::Hod => 3,
            Self::ExamOfficer => 2,
            Self::Lecturer => 1,
            Self::Student => 0,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    Global,
    Faculty,
    Department,
    OwnCourses,
    OwnRecords,
}

/// Explicit caller context passed into every workflow operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: ActorId,
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub faculty: Option<FacultyId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department: Option<DepartmentId>,
}

impl Actor {
    pub fn new(id: impl Into<String>, role: Role) -> Self {
        Self {
            id: ActorId(id.into()),
            role,
            faculty: None,
            department: None,
        }
    }

    pub fn in_faculty(mut self, faculty: impl Into<String>) -> Self {
        self.faculty = Some(FacultyId(faculty.into()));
        self
    }

    pub fn in_department(mut self, department: impl Into<String>) -> Self {
        self.department = Some(DepartmentId(department.into()));
        self
    }
}
