use crate::infra::{cli_auditor, InMemoryOutbox};
use chrono::{Duration, Utc};
use clap::Args;
use gradegate::error::AppError;
use gradegate::workflows::otp::{OtpPolicy, OtpVerifier};
use gradegate::workflows::results::{
    Actor, AuditEntry, BulkTransitionReport, CourseId, DepartmentId, FacultyId, LockLogEntry,
    MemoryStore, NewResult, NewSession, PublicationLockGovernor, ResultId, ResultWorkflowService,
    Role, SessionAuditView, SessionId, StudentId,
};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// Session label used for the walkthrough
    #[arg(long, default_value = "2024/2025")]
    pub(crate) session: String,
    /// Persist the walkthrough to a JSON snapshot instead of memory only
    #[arg(long)]
    pub(crate) data: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub(crate) struct AuditArgs {
    /// Snapshot file written by the service or the demo
    #[arg(long)]
    pub(crate) data: PathBuf,
    /// Session label to report on
    #[arg(long)]
    pub(crate) session: String,
}

type Results = ResultWorkflowService<MemoryStore, InMemoryOutbox>;
type Governor = PublicationLockGovernor<MemoryStore, InMemoryOutbox>;

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let store = Arc::new(match &args.data {
        Some(path) => MemoryStore::open(path)?,
        None => MemoryStore::new(),
    });
    let outbox = Arc::new(InMemoryOutbox::default());
    let results = ResultWorkflowService::new(store.clone(), outbox.clone());
    let governor = PublicationLockGovernor::new(store, outbox.clone());
    let verifier = OtpVerifier::new(OtpPolicy::default(), outbox.clone());

    println!("Result governance demo");

    println!("\nAccount verification");
    let identity = "registrar@uni.edu";
    let issued = verifier.generate(identity)?;
    println!(
        "- Code sent to {} (valid for {}s)",
        issued.identity, issued.expires_in_seconds
    );
    let code = outbox
        .latest(identity, "otp_code")
        .and_then(|notification| notification.payload.get("code").cloned())
        .unwrap_or_default();
    verifier.verify(identity, &code)?;
    println!("- First verification accepted");
    match verifier.verify(identity, &code) {
        Ok(()) => println!("- Replay unexpectedly accepted"),
        Err(err) => println!("- Replay refused: {err}"),
    }

    let admin = Actor::new("registrar", Role::Admin);
    let dean = Actor::new("dean-okafor", Role::Dean).in_faculty("science");
    let hod = Actor::new("hod-adeyemi", Role::Hod)
        .in_faculty("science")
        .in_department("mathematics");
    let officer = Actor::new("eo-bello", Role::ExamOfficer)
        .in_faculty("science")
        .in_department("mathematics");
    let lecturer = Actor::new("lec-ibrahim", Role::Lecturer)
        .in_faculty("science")
        .in_department("mathematics");
    let session = SessionId::new(args.session.as_str());

    println!("\nSession {session}");
    let starts_on = Utc::now().date_naive();
    governor.create_session(
        &admin,
        NewSession {
            label: session.clone(),
            starts_on,
            ends_on: starts_on + Duration::days(330),
            faculty: Some(FacultyId::new("science")),
        },
    )?;
    println!("- Created by {}", admin.id);

    let mut ids = Vec::new();
    for (student, scores) in [
        ("stu-001", Some((32, 51))),
        ("stu-002", Some((18, 40))),
        ("stu-003", None),
    ] {
        let record = results.create_draft(
            &lecturer,
            NewResult {
                student: StudentId::new(student),
                course: CourseId::new("MTH201"),
                session: session.clone(),
                department: DepartmentId::new("mathematics"),
                faculty: FacultyId::new("science"),
                lecturer: None,
            },
        )?;
        if let Some((ca, exam)) = scores {
            results.enter_scores(&lecturer, &record.id, ca, exam)?;
        }
        ids.push(record.id);
    }
    println!("- {} drafts entered by {}", ids.len(), lecturer.id);

    print_bulk("Lecturer submits", &results.submit_results(&lecturer, &ids)?);

    let returned = results.request_correction(&hod, &ids[1], "exam script total is off by ten")?;
    println!(
        "- HOD returned {} for correction ({})",
        returned.id,
        returned.correction_note.as_deref().unwrap_or_default()
    );

    print_bulk("HOD approves", &results.department_approve(&hod, &ids)?);
    print_bulk("Dean approves", &results.faculty_approve(&dean, &ids)?);

    let publication = governor.publish_session(&admin, &session)?;
    print_bulk("Admin publishes", &publication.promotions);
    println!(
        "- Session locked ({}), results_published={}",
        publication.lock_entry.id, publication.session.results_published
    );

    match results.reject_result(&admin, &ids[0], Some("late complaint".to_string())) {
        Ok(record) => println!("- Unexpected rejection of {}", record.id),
        Err(err) => println!("- Rejecting a published result refused: {err}"),
    }

    demo_reopen(&results, &governor, &session, &officer, &dean, &lecturer, &ids[1])?;

    let audit = governor.session_audit(&admin, &session)?;
    print_audit(&audit);
    Ok(())
}

fn demo_reopen(
    results: &Results,
    governor: &Governor,
    session: &SessionId,
    officer: &Actor,
    dean: &Actor,
    lecturer: &Actor,
    corrected: &ResultId,
) -> Result<(), AppError> {
    println!("\nReopen protocol");
    let request = governor.request_reopen(officer, session, "grade entry error")?;
    println!("- {} requested reopen {}", officer.id, request.id);

    match governor.request_reopen(officer, session, "second request") {
        Ok(entry) => println!("- Unexpected second request {}", entry.id),
        Err(err) => println!("- Second request refused: {err}"),
    }
    match governor.approve_reopen(officer, session, request.id) {
        Ok(_) => println!("- Unexpected self-approval"),
        Err(err) => println!("- Self-approval refused: {err}"),
    }

    let reopened = governor.approve_reopen(dean, session, request.id)?;
    println!(
        "- {} approved; results_published={}",
        dean.id, reopened.results_published
    );

    results.enter_scores(lecturer, corrected, 18, 50)?;
    print_bulk(
        "Lecturer resubmits corrected result",
        &results.submit_results(lecturer, std::slice::from_ref(corrected))?,
    );
    Ok(())
}

pub(crate) fn run_audit(args: AuditArgs) -> Result<(), AppError> {
    let store = Arc::new(MemoryStore::open(&args.data)?);
    let outbox = Arc::new(InMemoryOutbox::default());
    let governor = PublicationLockGovernor::new(store, outbox);

    let audit = governor.session_audit(&cli_auditor(), &SessionId::new(args.session))?;
    print_audit(&audit);
    Ok(())
}

fn print_bulk(label: &str, report: &BulkTransitionReport) {
    let summary = report.summary();
    println!(
        "- {label}: {} applied, {} skipped",
        summary.succeeded, summary.skipped
    );
    for item in summary.results.iter().filter(|item| !item.applied) {
        println!(
            "    - {} skipped [{}]: {}",
            item.result_id,
            item.code.unwrap_or_default(),
            item.reason.as_deref().unwrap_or_default()
        );
    }
}

fn print_audit(audit: &SessionAuditView) {
    println!(
        "\nAudit for session {} (status {}, results_published={})",
        audit.session, audit.status, audit.results_published
    );
    println!("Lock log:");
    for entry in &audit.lock_logs {
        println!("  {}", describe_lock_entry(entry));
    }
    println!("Audit trail:");
    for entry in &audit.entries {
        println!("  {}", describe_audit_entry(entry));
    }
}

fn describe_lock_entry(entry: &LockLogEntry) -> String {
    let mut line = format!(
        "{} {} by {} ({}) [{}] at {}",
        entry.id,
        entry.action.label(),
        entry.requested_by,
        entry.requested_role,
        entry.status.label(),
        entry.timestamp.format("%Y-%m-%d %H:%M:%S")
    );
    if let Some(reason) = &entry.reason {
        line.push_str(&format!(" reason: {reason}"));
    }
    if let Some(approver) = &entry.approved_by {
        line.push_str(&format!(" resolved by {approver}"));
    }
    line
}

fn describe_audit_entry(entry: &AuditEntry) -> String {
    let action = serde_json::to_value(&entry.event.action)
        .ok()
        .and_then(|value| {
            value
                .get("action")
                .and_then(|action| action.as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| "unknown".to_string());
    let mut line = format!(
        "#{:04} {} {} by {} ({})",
        entry.sequence,
        entry.event.timestamp.format("%H:%M:%S"),
        action,
        entry.event.actor,
        entry.event.role
    );
    if let Some(detail) = &entry.event.detail {
        line.push_str(&format!(" - {detail}"));
    }
    line
}
