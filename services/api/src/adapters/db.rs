//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `CourseStore` port from the `core` crate. It handles all interactions
//! with the PostgreSQL database using `sqlx`.
//!
//! The two scheduling writes (candidate activation and workshop-rotation
//! generation) run inside a transaction holding a row lock on the course, so
//! concurrent calls for the same course serialize instead of reading the same
//! occupancy and racing each other.

use async_trait::async_trait;
use chrono::{DateTime, NaiveTime, Utc};
use course_admin_core::allocation::allocate_group;
use course_admin_core::domain::{
    ApplicantType, AuthSession, Candidate, CandidateStatus, Course, Group, ProgrammeSubject,
    Staff, StaffCredentials, StaffRole, StationSession, SubjectType, WorkshopRotation,
};
use course_admin_core::ports::{CourseStore, PortError, PortResult};
use course_admin_core::rotation::{plan_rotation, GroupProgress, RotationOutcome, RotationRequest};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `CourseStore` port.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Creates a new `PgStore`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

//=========================================================================================
// Error Mapping Helpers
//=========================================================================================

/// Maps driver errors into the port taxonomy. Lock and serialization
/// failures become retryable conflicts; unique violations become conflicts
/// naming the duplicate.
fn map_db_error(e: sqlx::Error) -> PortError {
    if let sqlx::Error::Database(db) = &e {
        match db.code().as_deref() {
            Some("40001") | Some("40P01") | Some("55P03") => {
                return PortError::Conflict(
                    "another writer is updating this course; retry the operation".to_string(),
                );
            }
            Some("23505") => {
                return PortError::Conflict(format!("duplicate record: {}", db.message()));
            }
            _ => {}
        }
    }
    PortError::Unexpected(e.to_string())
}

fn not_found_or(e: sqlx::Error, context: String) -> PortError {
    match e {
        sqlx::Error::RowNotFound => PortError::NotFound(context),
        other => map_db_error(other),
    }
}

//=========================================================================================
// Text <-> Domain Enum Mapping
//=========================================================================================
// Candidate roles and statuses are stored under their display names
// ("Advanced Nurse Practitioner", "Paid in Full"), matching the records the
// admin screens have always written.

fn applicant_type_from_str(s: &str) -> PortResult<ApplicantType> {
    match s {
        "Doctor" => Ok(ApplicantType::Doctor),
        "Advanced Nurse Practitioner" => Ok(ApplicantType::AdvancedNursePractitioner),
        "Nurse Observer" => Ok(ApplicantType::NurseObserver),
        other => Err(PortError::Unexpected(format!(
            "unknown applicant type in store: {other}"
        ))),
    }
}

fn status_from_str(s: &str) -> PortResult<CandidateStatus> {
    match s {
        "Prospective" => Ok(CandidateStatus::Prospective),
        "Pending Payment" => Ok(CandidateStatus::PendingPayment),
        "Paid in Full" => Ok(CandidateStatus::PaidInFull),
        "Live Candidate" => Ok(CandidateStatus::LiveCandidate),
        "Rejected" => Ok(CandidateStatus::Rejected),
        "Unsuccessful" => Ok(CandidateStatus::Unsuccessful),
        "Withdrawn" => Ok(CandidateStatus::Withdrawn),
        other => Err(PortError::Unexpected(format!(
            "unknown candidate status in store: {other}"
        ))),
    }
}

fn subject_type_to_str(t: SubjectType) -> &'static str {
    match t {
        SubjectType::Session => "session",
        SubjectType::Workshop => "workshop",
        SubjectType::Assessment => "assessment",
        SubjectType::ScenarioPractice => "scenario-practice",
        SubjectType::PracticalSession => "practical-session",
        SubjectType::Break => "break",
        SubjectType::Lunch => "lunch",
    }
}

fn subject_type_from_str(s: &str) -> PortResult<SubjectType> {
    match s {
        "session" => Ok(SubjectType::Session),
        "workshop" => Ok(SubjectType::Workshop),
        "assessment" => Ok(SubjectType::Assessment),
        "scenario-practice" => Ok(SubjectType::ScenarioPractice),
        "practical-session" => Ok(SubjectType::PracticalSession),
        "break" => Ok(SubjectType::Break),
        "lunch" => Ok(SubjectType::Lunch),
        other => Err(PortError::Unexpected(format!(
            "unknown subject type in store: {other}"
        ))),
    }
}

fn role_to_str(role: StaffRole) -> &'static str {
    match role {
        StaffRole::Admin => "admin",
        StaffRole::GeneralOffice => "general-office",
    }
}

fn role_from_str(s: &str) -> PortResult<StaffRole> {
    match s {
        "admin" => Ok(StaffRole::Admin),
        "general-office" => Ok(StaffRole::GeneralOffice),
        other => Err(PortError::Unexpected(format!(
            "unknown staff role in store: {other}"
        ))),
    }
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct CourseRecord {
    id: Uuid,
    name: String,
    max_candidates: i32,
    archived: bool,
}
impl CourseRecord {
    fn to_domain(self) -> Course {
        Course {
            id: self.id,
            name: self.name,
            max_candidates: self.max_candidates as u32,
            archived: self.archived,
        }
    }
}

const CANDIDATE_COLUMNS: &str = "id, course_id, full_name, email, applicant_type, status, \
                                 assigned_group, candidate_number, created_at";

#[derive(FromRow)]
struct CandidateRecord {
    id: Uuid,
    course_id: Uuid,
    full_name: String,
    email: String,
    applicant_type: String,
    status: String,
    assigned_group: Option<String>,
    candidate_number: Option<i32>,
    created_at: DateTime<Utc>,
}
impl CandidateRecord {
    fn to_domain(self) -> PortResult<Candidate> {
        let assigned_group = match self.assigned_group.as_deref() {
            Some(letter) => Some(Group::from_letter(letter).ok_or_else(|| {
                PortError::Unexpected(format!("unknown group in store: {letter}"))
            })?),
            None => None,
        };
        Ok(Candidate {
            id: self.id,
            course_id: self.course_id,
            full_name: self.full_name,
            email: self.email,
            applicant_type: applicant_type_from_str(&self.applicant_type)?,
            status: status_from_str(&self.status)?,
            assigned_group,
            candidate_number: self.candidate_number,
            created_at: self.created_at,
        })
    }
}

const SUBJECT_COLUMNS: &str = "id, course_id, name, subject_type, day, start_time, end_time, \
                               duration_minutes, workshop, stations, deleted, deleted_at";

#[derive(FromRow)]
struct SubjectRecord {
    id: Uuid,
    course_id: Uuid,
    name: String,
    subject_type: String,
    day: i16,
    start_time: NaiveTime,
    end_time: NaiveTime,
    duration_minutes: i32,
    workshop: Option<Json<WorkshopRotation>>,
    stations: Option<Json<StationSession>>,
    deleted: bool,
    deleted_at: Option<DateTime<Utc>>,
}
impl SubjectRecord {
    fn to_domain(self) -> PortResult<ProgrammeSubject> {
        Ok(ProgrammeSubject {
            id: self.id,
            course_id: self.course_id,
            name: self.name,
            subject_type: subject_type_from_str(&self.subject_type)?,
            day: self.day as u8,
            start_time: self.start_time,
            end_time: self.end_time,
            duration_minutes: self.duration_minutes as u32,
            workshop: self.workshop.map(|w| w.0),
            stations: self.stations.map(|s| s.0),
            deleted: self.deleted,
            deleted_at: self.deleted_at,
        })
    }
}

#[derive(FromRow)]
struct StaffRecord {
    staff_id: Uuid,
    email: String,
    role: String,
}
impl StaffRecord {
    fn to_domain(self) -> PortResult<Staff> {
        Ok(Staff {
            staff_id: self.staff_id,
            email: self.email,
            role: role_from_str(&self.role)?,
        })
    }
}

#[derive(FromRow)]
struct StaffCredentialsRecord {
    staff_id: Uuid,
    email: String,
    hashed_password: String,
    role: String,
}
impl StaffCredentialsRecord {
    fn to_domain(self) -> PortResult<StaffCredentials> {
        Ok(StaffCredentials {
            staff_id: self.staff_id,
            email: self.email,
            hashed_password: self.hashed_password,
            role: role_from_str(&self.role)?,
        })
    }
}

#[derive(FromRow)]
struct AuthSessionRecord {
    id: String,
    staff_id: Uuid,
    role: String,
    expires_at: DateTime<Utc>,
}
impl AuthSessionRecord {
    fn to_domain(self) -> PortResult<AuthSession> {
        Ok(AuthSession {
            id: self.id,
            staff_id: self.staff_id,
            role: role_from_str(&self.role)?,
            expires_at: self.expires_at,
        })
    }
}

//=========================================================================================
// Transaction Helpers
//=========================================================================================

/// Takes the per-course row lock that serializes scheduling writes, and
/// verifies the course exists while doing so.
async fn lock_course(tx: &mut Transaction<'_, Postgres>, course_id: Uuid) -> PortResult<()> {
    sqlx::query("SELECT id FROM courses WHERE id = $1 FOR UPDATE")
        .bind(course_id)
        .fetch_one(&mut **tx)
        .await
        .map_err(|e| not_found_or(e, format!("Course {} not found", course_id)))?;
    Ok(())
}

async fn occupying_in_tx(
    tx: &mut Transaction<'_, Postgres>,
    course_id: Uuid,
) -> PortResult<Vec<Candidate>> {
    let rows = sqlx::query_as::<_, CandidateRecord>(&format!(
        "SELECT {CANDIDATE_COLUMNS} FROM candidates \
         WHERE course_id = $1 AND status IN ('Live Candidate', 'Paid in Full')"
    ))
    .bind(course_id)
    .fetch_all(&mut **tx)
    .await
    .map_err(map_db_error)?;
    rows.into_iter().map(|r| r.to_domain()).collect()
}

async fn insert_subject_in_tx(
    tx: &mut Transaction<'_, Postgres>,
    subject: &ProgrammeSubject,
) -> PortResult<()> {
    sqlx::query(
        "INSERT INTO programme_subjects \
         (id, course_id, name, subject_type, day, start_time, end_time, duration_minutes, \
          workshop, stations, deleted, deleted_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
    )
    .bind(subject.id)
    .bind(subject.course_id)
    .bind(&subject.name)
    .bind(subject_type_to_str(subject.subject_type))
    .bind(subject.day as i16)
    .bind(subject.start_time)
    .bind(subject.end_time)
    .bind(subject.duration_minutes as i32)
    .bind(subject.workshop.as_ref().map(Json))
    .bind(subject.stations.as_ref().map(Json))
    .bind(subject.deleted)
    .bind(subject.deleted_at)
    .execute(&mut **tx)
    .await
    .map_err(map_db_error)?;
    Ok(())
}

//=========================================================================================
// `CourseStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl CourseStore for PgStore {
    async fn get_course(&self, course_id: Uuid) -> PortResult<Course> {
        let record = sqlx::query_as::<_, CourseRecord>(
            "SELECT id, name, max_candidates, archived FROM courses WHERE id = $1",
        )
        .bind(course_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| not_found_or(e, format!("Course {} not found", course_id)))?;
        Ok(record.to_domain())
    }

    async fn current_course(&self) -> PortResult<Course> {
        let record = sqlx::query_as::<_, CourseRecord>(
            "SELECT id, name, max_candidates, archived FROM courses \
             WHERE archived = FALSE ORDER BY created_at DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_error)?
        .ok_or_else(|| PortError::NotFound("No course is open for applications".to_string()))?;
        Ok(record.to_domain())
    }

    async fn get_candidate(&self, candidate_id: Uuid) -> PortResult<Candidate> {
        sqlx::query_as::<_, CandidateRecord>(&format!(
            "SELECT {CANDIDATE_COLUMNS} FROM candidates WHERE id = $1"
        ))
        .bind(candidate_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| not_found_or(e, format!("Candidate {} not found", candidate_id)))?
        .to_domain()
    }

    async fn list_candidates(&self, course_id: Uuid) -> PortResult<Vec<Candidate>> {
        let rows = sqlx::query_as::<_, CandidateRecord>(&format!(
            "SELECT {CANDIDATE_COLUMNS} FROM candidates WHERE course_id = $1 ORDER BY created_at"
        ))
        .bind(course_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_db_error)?;
        rows.into_iter().map(|r| r.to_domain()).collect()
    }

    async fn occupying_candidates(&self, course_id: Uuid) -> PortResult<Vec<Candidate>> {
        let rows = sqlx::query_as::<_, CandidateRecord>(&format!(
            "SELECT {CANDIDATE_COLUMNS} FROM candidates \
             WHERE course_id = $1 AND status IN ('Live Candidate', 'Paid in Full')"
        ))
        .bind(course_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_db_error)?;
        rows.into_iter().map(|r| r.to_domain()).collect()
    }

    async fn create_candidate(
        &self,
        course_id: Uuid,
        full_name: &str,
        email: &str,
        applicant_type: ApplicantType,
    ) -> PortResult<Candidate> {
        sqlx::query_as::<_, CandidateRecord>(&format!(
            "INSERT INTO candidates (id, course_id, full_name, email, applicant_type, status) \
             VALUES ($1, $2, $3, $4, $5, 'Prospective') \
             RETURNING {CANDIDATE_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(course_id)
        .bind(full_name)
        .bind(email)
        .bind(applicant_type.to_string())
        .fetch_one(&self.pool)
        .await
        .map_err(map_db_error)?
        .to_domain()
    }

    async fn update_candidate_status(
        &self,
        candidate_id: Uuid,
        new_status: CandidateStatus,
    ) -> PortResult<Candidate> {
        let mut tx = self.pool.begin().await.map_err(map_db_error)?;

        let candidate = sqlx::query_as::<_, CandidateRecord>(&format!(
            "SELECT {CANDIDATE_COLUMNS} FROM candidates WHERE id = $1 FOR UPDATE"
        ))
        .bind(candidate_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| not_found_or(e, format!("Candidate {} not found", candidate_id)))?
        .to_domain()?;

        if !candidate.status.can_transition_to(new_status) {
            return Err(PortError::InvalidState(format!(
                "candidate {} cannot move from {} to {}",
                candidate.id, candidate.status, new_status
            )));
        }

        let updated = sqlx::query_as::<_, CandidateRecord>(&format!(
            "UPDATE candidates SET status = $2 WHERE id = $1 RETURNING {CANDIDATE_COLUMNS}"
        ))
        .bind(candidate_id)
        .bind(new_status.to_string())
        .fetch_one(&mut *tx)
        .await
        .map_err(map_db_error)?
        .to_domain()?;

        tx.commit().await.map_err(map_db_error)?;
        Ok(updated)
    }

    async fn activate_candidate(&self, candidate_id: Uuid) -> PortResult<Candidate> {
        let mut tx = self.pool.begin().await.map_err(map_db_error)?;

        let candidate = sqlx::query_as::<_, CandidateRecord>(&format!(
            "SELECT {CANDIDATE_COLUMNS} FROM candidates WHERE id = $1 FOR UPDATE"
        ))
        .bind(candidate_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| not_found_or(e, format!("Candidate {} not found", candidate_id)))?
        .to_domain()?;

        if candidate.status != CandidateStatus::PaidInFull {
            return Err(PortError::InvalidState(format!(
                "candidate {} is {}; only Paid in Full candidates can be activated",
                candidate.id, candidate.status
            )));
        }

        // The occupancy read and the assignment write happen under this lock,
        // so two activations for one course cannot hand out the same number.
        lock_course(&mut tx, candidate.course_id).await?;
        let roster = occupying_in_tx(&mut tx, candidate.course_id).await?;
        let allocation = allocate_group(candidate.applicant_type, &roster);

        let updated = sqlx::query_as::<_, CandidateRecord>(&format!(
            "UPDATE candidates \
             SET status = 'Live Candidate', assigned_group = $2, candidate_number = $3 \
             WHERE id = $1 RETURNING {CANDIDATE_COLUMNS}"
        ))
        .bind(candidate_id)
        .bind(allocation.group.letter())
        .bind(allocation.candidate_number)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_db_error)?
        .to_domain()?;

        tx.commit().await.map_err(map_db_error)?;
        Ok(updated)
    }

    async fn list_programme(&self, course_id: Uuid) -> PortResult<Vec<ProgrammeSubject>> {
        let rows = sqlx::query_as::<_, SubjectRecord>(&format!(
            "SELECT {SUBJECT_COLUMNS} FROM programme_subjects \
             WHERE course_id = $1 AND deleted = FALSE ORDER BY day, start_time"
        ))
        .bind(course_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_db_error)?;
        rows.into_iter().map(|r| r.to_domain()).collect()
    }

    async fn list_workshop_subjects(&self, course_id: Uuid) -> PortResult<Vec<ProgrammeSubject>> {
        let rows = sqlx::query_as::<_, SubjectRecord>(&format!(
            "SELECT {SUBJECT_COLUMNS} FROM programme_subjects \
             WHERE course_id = $1 AND subject_type = 'workshop' AND deleted = FALSE \
             ORDER BY day, start_time"
        ))
        .bind(course_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_db_error)?;
        rows.into_iter().map(|r| r.to_domain()).collect()
    }

    async fn append_workshop_rotation(
        &self,
        course_id: Uuid,
        request: &RotationRequest,
    ) -> PortResult<RotationOutcome> {
        let mut tx = self.pool.begin().await.map_err(map_db_error)?;

        // Same locking discipline as activation: history is read and the new
        // subjects written under one course lock, so no two generation calls
        // can both hand a group the same workshop.
        lock_course(&mut tx, course_id).await?;

        let rows = sqlx::query_as::<_, SubjectRecord>(&format!(
            "SELECT {SUBJECT_COLUMNS} FROM programme_subjects \
             WHERE course_id = $1 AND subject_type = 'workshop' AND deleted = FALSE"
        ))
        .bind(course_id)
        .fetch_all(&mut *tx)
        .await
        .map_err(map_db_error)?;
        let existing = rows
            .into_iter()
            .map(|r| r.to_domain())
            .collect::<PortResult<Vec<_>>>()?;

        let progress = GroupProgress::from_subjects(&existing);
        let next_sequence = existing
            .iter()
            .filter_map(|s| s.workshop.as_ref().map(|w| w.rotation_sequence))
            .max()
            .unwrap_or(0)
            + 1;

        let outcome = plan_rotation(course_id, request, &progress, next_sequence)?;
        for subject in &outcome.created {
            insert_subject_in_tx(&mut tx, subject).await?;
        }

        tx.commit().await.map_err(map_db_error)?;
        Ok(outcome)
    }

    async fn insert_subject(&self, subject: &ProgrammeSubject) -> PortResult<()> {
        let mut tx = self.pool.begin().await.map_err(map_db_error)?;
        insert_subject_in_tx(&mut tx, subject).await?;
        tx.commit().await.map_err(map_db_error)?;
        Ok(())
    }

    async fn soft_delete_subject(&self, subject_id: Uuid) -> PortResult<()> {
        let result = sqlx::query(
            "UPDATE programme_subjects SET deleted = TRUE, deleted_at = NOW() \
             WHERE id = $1 AND deleted = FALSE",
        )
        .bind(subject_id)
        .execute(&self.pool)
        .await
        .map_err(map_db_error)?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!(
                "Programme subject {} not found",
                subject_id
            )));
        }
        Ok(())
    }

    async fn create_staff_with_email(
        &self,
        email: &str,
        hashed_password: &str,
        role: StaffRole,
    ) -> PortResult<Staff> {
        sqlx::query_as::<_, StaffRecord>(
            "INSERT INTO staff (staff_id, email, hashed_password, role) \
             VALUES ($1, $2, $3, $4) RETURNING staff_id, email, role",
        )
        .bind(Uuid::new_v4())
        .bind(email)
        .bind(hashed_password)
        .bind(role_to_str(role))
        .fetch_one(&self.pool)
        .await
        .map_err(map_db_error)?
        .to_domain()
    }

    async fn get_staff_by_email(&self, email: &str) -> PortResult<StaffCredentials> {
        sqlx::query_as::<_, StaffCredentialsRecord>(
            "SELECT staff_id, email, hashed_password, role FROM staff WHERE email = $1",
        )
        .bind(email)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| not_found_or(e, format!("Staff account {} not found", email)))?
        .to_domain()
    }

    async fn create_auth_session(
        &self,
        session_id: &str,
        staff_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()> {
        sqlx::query("INSERT INTO auth_sessions (id, staff_id, expires_at) VALUES ($1, $2, $3)")
            .bind(session_id)
            .bind(staff_id)
            .bind(expires_at)
            .execute(&self.pool)
            .await
            .map_err(map_db_error)?;
        Ok(())
    }

    async fn validate_auth_session(&self, session_id: &str) -> PortResult<AuthSession> {
        sqlx::query_as::<_, AuthSessionRecord>(
            "SELECT s.id, s.staff_id, st.role, s.expires_at \
             FROM auth_sessions s JOIN staff st ON st.staff_id = s.staff_id \
             WHERE s.id = $1 AND s.expires_at > NOW()",
        )
        .bind(session_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| not_found_or(e, "Auth session not found or expired".to_string()))?
        .to_domain()
    }

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()> {
        sqlx::query("DELETE FROM auth_sessions WHERE id = $1")
            .bind(session_id)
            .execute(&self.pool)
            .await
            .map_err(map_db_error)?;
        Ok(())
    }
}
