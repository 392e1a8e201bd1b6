//! crates/course_admin_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of specific external implementations like databases or mail
//! providers.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{
    ApplicantType, AuthSession, Candidate, CandidateStatus, Course, ProgrammeSubject, Staff,
    StaffCredentials, StaffRole,
};
use crate::rotation::{RotationOutcome, RotationRequest};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database,
/// network) and carries the failure taxonomy the handlers translate for callers:
/// capacity and conflict failures name the specific group, workshop or role that
/// failed so an operator can resolve it by hand.
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Unauthorized")]
    Unauthorized,
    /// A role, group or workshop has no places left. Reported per item; one
    /// exhausted workshop never aborts its siblings.
    #[error("Capacity exhausted: {0}")]
    CapacityExhausted(String),
    /// Concurrent writers touched the same course. Retryable.
    #[error("Conflict: {0}")]
    Conflict(String),
    /// The operation does not apply to the record's current lifecycle state.
    #[error("Invalid state: {0}")]
    InvalidState(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

#[async_trait]
pub trait CourseStore: Send + Sync {
    // --- Courses ---
    async fn get_course(&self, course_id: Uuid) -> PortResult<Course>;

    /// The single non-archived course applications currently target.
    async fn current_course(&self) -> PortResult<Course>;

    // --- Candidates ---
    async fn get_candidate(&self, candidate_id: Uuid) -> PortResult<Candidate>;

    async fn list_candidates(&self, course_id: Uuid) -> PortResult<Vec<Candidate>>;

    /// Candidates whose status occupies a place (Live Candidate or Paid in
    /// Full). This is the allocator's and the capacity checker's view of the
    /// course.
    async fn occupying_candidates(&self, course_id: Uuid) -> PortResult<Vec<Candidate>>;

    async fn create_candidate(
        &self,
        course_id: Uuid,
        full_name: &str,
        email: &str,
        applicant_type: ApplicantType,
    ) -> PortResult<Candidate>;

    /// Applies a lifecycle transition. Fails with `InvalidState` when the
    /// transition is not legal from the candidate's current status.
    async fn update_candidate_status(
        &self,
        candidate_id: Uuid,
        new_status: CandidateStatus,
    ) -> PortResult<Candidate>;

    /// Activates a Paid in Full candidate: assigns a group and (for clinical
    /// roles) a candidate number, and moves the status to Live Candidate.
    ///
    /// The read of current occupancy and the write of the assignment must be
    /// one atomic step per course; implementations surface contention as
    /// `Conflict` rather than handing out duplicate numbers.
    async fn activate_candidate(&self, candidate_id: Uuid) -> PortResult<Candidate>;

    // --- Programme subjects ---
    async fn list_programme(&self, course_id: Uuid) -> PortResult<Vec<ProgrammeSubject>>;

    /// All non-deleted workshop-rotation subjects of the course, the history
    /// the rotation generator folds into group progress.
    async fn list_workshop_subjects(&self, course_id: Uuid) -> PortResult<Vec<ProgrammeSubject>>;

    /// Generates and persists workshop-rotation subjects for a batch of new
    /// workshop names. Atomic per course, like `activate_candidate`: the
    /// history read and the subject writes happen under one lock so two
    /// generation calls cannot both hand the same group the same workshop.
    async fn append_workshop_rotation(
        &self,
        course_id: Uuid,
        request: &RotationRequest,
    ) -> PortResult<RotationOutcome>;

    async fn insert_subject(&self, subject: &ProgrammeSubject) -> PortResult<()>;

    async fn soft_delete_subject(&self, subject_id: Uuid) -> PortResult<()>;

    // --- Staff and Auth Methods ---
    async fn create_staff_with_email(
        &self,
        email: &str,
        hashed_password: &str,
        role: StaffRole,
    ) -> PortResult<Staff>;

    async fn get_staff_by_email(&self, email: &str) -> PortResult<StaffCredentials>;

    async fn create_auth_session(
        &self,
        session_id: &str,
        staff_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()>;

    async fn validate_auth_session(&self, session_id: &str) -> PortResult<AuthSession>;

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()>;
}

/// Outbound mail. Sends are fire-and-forget from the handlers' point of
/// view: a failed send is logged and never reverts the write that triggered
/// it.
#[async_trait]
pub trait EmailService: Send + Sync {
    /// Welcome message sent after a successful activation, carrying the
    /// assigned group and candidate number.
    async fn send_welcome_email(&self, candidate: &Candidate, course: &Course) -> PortResult<()>;

    /// Payment instructions sent when an application is approved.
    async fn send_payment_request(&self, candidate: &Candidate, course: &Course)
        -> PortResult<()>;
}
