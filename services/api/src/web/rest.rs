//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the REST API endpoints and the master
//! definition for the OpenAPI specification.
//!
//! The core raises typed `PortError`s; this module is the boundary that
//! translates them into `{ "error": "..." }` response bodies. Capacity and
//! conflict failures keep their messages because they name the group,
//! workshop or role an operator has to resolve; unexpected failures are
//! logged and replaced with a generic message.

use crate::web::state::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use chrono::{Duration, NaiveTime};
use course_admin_core::allocation::{course_capacity, CapacityReport};
use course_admin_core::domain::{
    ApplicantType, Candidate, CandidateStatus, ProgrammeSubject, StationAssignment,
    StationSession, SubjectType,
};
use course_admin_core::grid::{generate_station_grid, StationGrid};
use course_admin_core::ports::PortError;
use course_admin_core::rotation::{RotationOutcome, RotationRequest};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, warn};
use utoipa::{OpenApi, ToSchema};
use uuid::Uuid;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        apply_handler,
        course_capacity_handler,
        activate_candidate_handler,
        update_candidate_status_handler,
        list_programme_handler,
        generate_workshop_rotation_handler,
        create_station_subject_handler,
        delete_subject_handler,
        station_grid_handler,
        crate::web::auth::signup_handler,
        crate::web::auth::login_handler,
        crate::web::auth::logout_handler,
    ),
    components(
        schemas(
            ApplyRequest,
            StatusUpdateRequest,
            WorkshopRotationRequest,
            StationSubjectRequest,
            CandidateResponse,
            ActivationResponse,
            CapacityResponse,
            ErrorBody,
            crate::web::auth::SignupRequest,
            crate::web::auth::LoginRequest,
            crate::web::auth::AuthResponse,
        )
    ),
    tags(
        (name = "Course Administration API", description = "Applications, activation and programme scheduling for the two-day clinical course.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// Error Translation
//=========================================================================================

/// The error body every failed write returns.
#[derive(Serialize, ToSchema)]
pub struct ErrorBody {
    pub error: String,
}

type HandlerError = (StatusCode, Json<ErrorBody>);

fn error_response(e: PortError) -> HandlerError {
    let status = match &e {
        PortError::NotFound(_) => StatusCode::NOT_FOUND,
        PortError::Unauthorized => StatusCode::UNAUTHORIZED,
        PortError::CapacityExhausted(_) | PortError::Conflict(_) => StatusCode::CONFLICT,
        PortError::InvalidState(_) => StatusCode::UNPROCESSABLE_ENTITY,
        PortError::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        error!("Unexpected port error: {:?}", e);
        return (
            status,
            Json(ErrorBody {
                error: "An internal error occurred".to_string(),
            }),
        );
    }
    (status, Json(ErrorBody { error: e.to_string() }))
}

fn bad_request(message: &str) -> HandlerError {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorBody {
            error: message.to_string(),
        }),
    )
}

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApplyRequest {
    pub full_name: String,
    pub email: String,
    /// "Doctor", "Advanced Nurse Practitioner" or "Nurse Observer".
    #[schema(value_type = String)]
    pub applicant_type: ApplicantType,
    /// Defaults to the course currently open for applications.
    pub course_id: Option<Uuid>,
}

#[derive(Deserialize, ToSchema)]
pub struct StatusUpdateRequest {
    /// The target lifecycle status, e.g. "Pending Payment" or "Paid in Full".
    #[schema(value_type = String)]
    pub status: CandidateStatus,
}

/// A workshop-rotation generation call.
#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct WorkshopRotationRequest {
    pub workshop_names: Vec<String>,
    pub number_of_rotations: u32,
    pub workshop_duration_minutes: u32,
    pub day: u8,
    #[schema(value_type = String, example = "09:00:00")]
    pub start_time: NaiveTime,
}

impl From<WorkshopRotationRequest> for RotationRequest {
    fn from(req: WorkshopRotationRequest) -> Self {
        RotationRequest {
            workshop_names: req.workshop_names,
            number_of_rotations: req.number_of_rotations,
            workshop_duration_minutes: req.workshop_duration_minutes,
            day: req.day,
            start_time: req.start_time,
        }
    }
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StationSubjectRequest {
    pub name: String,
    /// "assessment", "scenario-practice" or "practical-session".
    #[schema(value_type = String)]
    pub subject_type: SubjectType,
    pub day: u8,
    #[schema(value_type = String, example = "13:30:00")]
    pub start_time: NaiveTime,
    pub number_of_stations: u32,
    pub number_of_time_slots: u32,
    pub time_slot_duration_minutes: u32,
    /// Optional per-station faculty and room assignments.
    #[serde(default)]
    #[schema(value_type = Vec<Object>)]
    pub stations: Vec<StationAssignment>,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CandidateResponse {
    pub candidate_id: Uuid,
    pub course_id: Uuid,
    pub full_name: String,
    pub applicant_type: String,
    pub status: String,
    pub assigned_group: Option<String>,
    pub candidate_number: Option<i32>,
}

impl From<Candidate> for CandidateResponse {
    fn from(c: Candidate) -> Self {
        CandidateResponse {
            candidate_id: c.id,
            course_id: c.course_id,
            full_name: c.full_name,
            applicant_type: c.applicant_type.to_string(),
            status: c.status.to_string(),
            assigned_group: c.assigned_group.map(|g| g.to_string()),
            candidate_number: c.candidate_number,
        }
    }
}

/// The payload sent after a successful activation.
#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ActivationResponse {
    pub assigned_group: String,
    pub candidate_number: Option<i32>,
    pub status: String,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CapacityResponse {
    pub doctor_count: usize,
    pub nurse_count: usize,
    pub is_full: bool,
    pub available_doctor_spaces: usize,
    pub available_nurse_spaces: usize,
    pub available_spaces: usize,
}

impl From<CapacityReport> for CapacityResponse {
    fn from(r: CapacityReport) -> Self {
        CapacityResponse {
            doctor_count: r.doctor_count,
            nurse_count: r.nurse_count,
            is_full: r.is_full,
            available_doctor_spaces: r.available_doctor_spaces,
            available_nurse_spaces: r.available_nurse_spaces,
            available_spaces: r.available_spaces,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StationSubjectResponse {
    pub subject: ProgrammeSubject,
    pub grid: StationGrid,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GridQuery {
    pub stations: u32,
    pub time_slots: u32,
}

//=========================================================================================
// Public Handlers
//=========================================================================================

/// Submit a course application.
///
/// Applications are capacity-gated per role: a full role rejects the
/// application and names the role, leaving the other role's places open.
#[utoipa::path(
    post,
    path = "/candidates",
    request_body = ApplyRequest,
    responses(
        (status = 201, description = "Application recorded", body = CandidateResponse),
        (status = 404, description = "No course open for applications", body = ErrorBody),
        (status = 409, description = "No places left for this role", body = ErrorBody)
    )
)]
pub async fn apply_handler(
    State(app_state): State<Arc<AppState>>,
    Json(req): Json<ApplyRequest>,
) -> Result<impl IntoResponse, HandlerError> {
    let store = &app_state.store;

    // 1. Resolve the target course
    let course = match req.course_id {
        Some(id) => store.get_course(id).await,
        None => store.current_course().await,
    }
    .map_err(error_response)?;
    if course.archived {
        return Err(error_response(PortError::InvalidState(format!(
            "course {} is archived and no longer accepts applications",
            course.name
        ))));
    }

    // 2. Gate on role capacity
    let roster = store
        .occupying_candidates(course.id)
        .await
        .map_err(error_response)?;
    let report = course_capacity(&roster, course.max_candidates);
    if !report.accepts(req.applicant_type) {
        return Err(error_response(PortError::CapacityExhausted(format!(
            "no {} places remain on {}",
            req.applicant_type, course.name
        ))));
    }

    // 3. Record the application
    let candidate = store
        .create_candidate(course.id, &req.full_name, &req.email, req.applicant_type)
        .await
        .map_err(error_response)?;

    Ok((StatusCode::CREATED, Json(CandidateResponse::from(candidate))))
}

/// Current occupancy of a course against its role ceilings.
///
/// Read-only and unauthenticated: the public application form uses it to
/// decide whether to accept submissions.
#[utoipa::path(
    get,
    path = "/courses/{course_id}/capacity",
    responses(
        (status = 200, description = "Occupancy and remaining places", body = CapacityResponse),
        (status = 404, description = "Unknown course", body = ErrorBody)
    ),
    params(
        ("course_id" = Uuid, Path, description = "The course to inspect.")
    )
)]
pub async fn course_capacity_handler(
    State(app_state): State<Arc<AppState>>,
    Path(course_id): Path<Uuid>,
) -> Result<Json<CapacityResponse>, HandlerError> {
    let course = app_state
        .store
        .get_course(course_id)
        .await
        .map_err(error_response)?;
    let roster = app_state
        .store
        .occupying_candidates(course_id)
        .await
        .map_err(error_response)?;
    let report = course_capacity(&roster, course.max_candidates);
    Ok(Json(CapacityResponse::from(report)))
}

/// The advisory stations x time-slots rotation grid.
///
/// Pure display logic; no store access.
#[utoipa::path(
    get,
    path = "/station-grid",
    responses(
        (status = 200, description = "The generated grid"),
        (status = 400, description = "Invalid dimensions", body = ErrorBody)
    ),
    params(
        ("stations" = u32, Query, description = "Number of stations."),
        ("timeSlots" = u32, Query, description = "Number of time slots.")
    )
)]
pub async fn station_grid_handler(
    Query(query): Query<GridQuery>,
) -> Result<Json<StationGrid>, HandlerError> {
    if query.stations == 0 || query.time_slots == 0 {
        return Err(bad_request("stations and timeSlots must be at least 1"));
    }
    if query.stations > 100 || query.time_slots > 100 {
        return Err(bad_request("stations and timeSlots must be 100 or fewer"));
    }
    Ok(Json(generate_station_grid(query.stations, query.time_slots)))
}

//=========================================================================================
// Protected Handlers
//=========================================================================================

/// Activate a Paid in Full candidate.
///
/// Assigns the group and (for clinical roles) the candidate number under the
/// course lock, then triggers the welcome email. The email is fire-and-forget:
/// a send failure is logged and never reverts the activation.
#[utoipa::path(
    post,
    path = "/candidates/{candidate_id}/activate",
    responses(
        (status = 200, description = "Candidate activated", body = ActivationResponse),
        (status = 404, description = "Unknown candidate", body = ErrorBody),
        (status = 409, description = "Concurrent activation, retry", body = ErrorBody),
        (status = 422, description = "Candidate is not Paid in Full", body = ErrorBody)
    ),
    params(
        ("candidate_id" = Uuid, Path, description = "The candidate to activate.")
    )
)]
pub async fn activate_candidate_handler(
    State(app_state): State<Arc<AppState>>,
    Path(candidate_id): Path<Uuid>,
) -> Result<Json<ActivationResponse>, HandlerError> {
    // 1. Run the transactional allocation
    let candidate = app_state
        .store
        .activate_candidate(candidate_id)
        .await
        .map_err(error_response)?;

    // 2. Fire the welcome email without holding up the response
    match app_state.store.get_course(candidate.course_id).await {
        Ok(course) => {
            let email = app_state.email.clone();
            let recipient = candidate.clone();
            tokio::spawn(async move {
                if let Err(e) = email.send_welcome_email(&recipient, &course).await {
                    warn!("Failed to send welcome email to {}: {:?}", recipient.email, e);
                }
            });
        }
        Err(e) => warn!("Skipping welcome email, course lookup failed: {:?}", e),
    }

    // 3. Return the assignment
    Ok(Json(ActivationResponse {
        assigned_group: candidate
            .assigned_group
            .map(|g| g.to_string())
            .unwrap_or_default(),
        candidate_number: candidate.candidate_number,
        status: candidate.status.to_string(),
    }))
}

/// Apply a candidate lifecycle transition.
///
/// Approving an application (moving it to Pending Payment) triggers the
/// payment-request email.
#[utoipa::path(
    patch,
    path = "/candidates/{candidate_id}/status",
    request_body = StatusUpdateRequest,
    responses(
        (status = 200, description = "Status updated", body = CandidateResponse),
        (status = 404, description = "Unknown candidate", body = ErrorBody),
        (status = 422, description = "Illegal transition", body = ErrorBody)
    ),
    params(
        ("candidate_id" = Uuid, Path, description = "The candidate to update.")
    )
)]
pub async fn update_candidate_status_handler(
    State(app_state): State<Arc<AppState>>,
    Path(candidate_id): Path<Uuid>,
    Json(req): Json<StatusUpdateRequest>,
) -> Result<Json<CandidateResponse>, HandlerError> {
    // 1. Apply the transition
    let candidate = app_state
        .store
        .update_candidate_status(candidate_id, req.status)
        .await
        .map_err(error_response)?;

    // 2. An approval triggers payment instructions, fire-and-forget
    if req.status == CandidateStatus::PendingPayment {
        match app_state.store.get_course(candidate.course_id).await {
            Ok(course) => {
                let email = app_state.email.clone();
                let recipient = candidate.clone();
                tokio::spawn(async move {
                    if let Err(e) = email.send_payment_request(&recipient, &course).await {
                        warn!(
                            "Failed to send payment request to {}: {:?}",
                            recipient.email, e
                        );
                    }
                });
            }
            Err(e) => warn!("Skipping payment request, course lookup failed: {:?}", e),
        }
    }

    Ok(Json(CandidateResponse::from(candidate)))
}

/// The course programme: all non-deleted subjects in day and time order.
#[utoipa::path(
    get,
    path = "/courses/{course_id}/programme",
    responses(
        (status = 200, description = "The programme subjects"),
        (status = 404, description = "Unknown course", body = ErrorBody)
    ),
    params(
        ("course_id" = Uuid, Path, description = "The course whose programme to list.")
    )
)]
pub async fn list_programme_handler(
    State(app_state): State<Arc<AppState>>,
    Path(course_id): Path<Uuid>,
) -> Result<Json<Vec<ProgrammeSubject>>, HandlerError> {
    // Existence check first so an unknown course is a 404, not an empty list.
    app_state
        .store
        .get_course(course_id)
        .await
        .map_err(error_response)?;
    let subjects = app_state
        .store
        .list_programme(course_id)
        .await
        .map_err(error_response)?;
    Ok(Json(subjects))
}

/// Generate workshop-rotation subjects for a batch of new workshop names.
///
/// Returns the created subjects together with per-name conflicts; a name
/// every group has already completed is reported without aborting its
/// siblings. The whole batch is 409 only when nothing could be scheduled.
#[utoipa::path(
    post,
    path = "/courses/{course_id}/programme/workshop-rotation",
    request_body = WorkshopRotationRequest,
    responses(
        (status = 201, description = "Rotation subjects created"),
        (status = 404, description = "Unknown course", body = ErrorBody),
        (status = 409, description = "Every workshop name conflicted"),
        (status = 422, description = "Invalid batch", body = ErrorBody)
    ),
    params(
        ("course_id" = Uuid, Path, description = "The course to schedule into.")
    )
)]
pub async fn generate_workshop_rotation_handler(
    State(app_state): State<Arc<AppState>>,
    Path(course_id): Path<Uuid>,
    Json(req): Json<WorkshopRotationRequest>,
) -> Result<impl IntoResponse, HandlerError> {
    let outcome: RotationOutcome = app_state
        .store
        .append_workshop_rotation(course_id, &req.into())
        .await
        .map_err(error_response)?;

    let status = if outcome.created.is_empty() {
        StatusCode::CONFLICT
    } else {
        StatusCode::CREATED
    };
    Ok((status, Json(outcome)))
}

/// Create an assessment, scenario-practice or practical-session subject.
///
/// Responds with the stored subject and the advisory rotation grid for its
/// stations and time slots.
#[utoipa::path(
    post,
    path = "/courses/{course_id}/programme/stations",
    request_body = StationSubjectRequest,
    responses(
        (status = 201, description = "Subject created"),
        (status = 404, description = "Unknown course", body = ErrorBody),
        (status = 422, description = "Invalid subject", body = ErrorBody)
    ),
    params(
        ("course_id" = Uuid, Path, description = "The course to schedule into.")
    )
)]
pub async fn create_station_subject_handler(
    State(app_state): State<Arc<AppState>>,
    Path(course_id): Path<Uuid>,
    Json(req): Json<StationSubjectRequest>,
) -> Result<impl IntoResponse, HandlerError> {
    // 1. Validate the shape
    if !req.subject_type.carries_stations() {
        return Err(error_response(PortError::InvalidState(format!(
            "subject type {:?} is not scheduled as stations",
            req.subject_type
        ))));
    }
    if req.number_of_stations == 0 || req.number_of_time_slots == 0 {
        return Err(bad_request("stations and time slots must be at least 1"));
    }
    if req.time_slot_duration_minutes == 0 {
        return Err(bad_request("timeSlotDuration must be at least one minute"));
    }
    app_state
        .store
        .get_course(course_id)
        .await
        .map_err(error_response)?;

    // 2. Build and store the subject
    let total_minutes = req.number_of_time_slots * req.time_slot_duration_minutes;
    let subject = ProgrammeSubject {
        id: Uuid::new_v4(),
        course_id,
        name: req.name,
        subject_type: req.subject_type,
        day: req.day,
        start_time: req.start_time,
        end_time: req.start_time + Duration::minutes(i64::from(total_minutes)),
        duration_minutes: total_minutes,
        workshop: None,
        stations: Some(StationSession {
            number_of_stations: req.number_of_stations,
            number_of_time_slots: req.number_of_time_slots,
            time_slot_duration_minutes: req.time_slot_duration_minutes,
            stations: req.stations,
        }),
        deleted: false,
        deleted_at: None,
    };
    app_state
        .store
        .insert_subject(&subject)
        .await
        .map_err(error_response)?;

    // 3. Return the subject with its advisory grid
    let grid = generate_station_grid(req.number_of_stations, req.number_of_time_slots);
    Ok((
        StatusCode::CREATED,
        Json(StationSubjectResponse { subject, grid }),
    ))
}

/// Soft-delete a programme subject.
///
/// The row stays until the retention sweep hard-deletes it; reads no longer
/// see it, and its rotation history stops counting.
#[utoipa::path(
    delete,
    path = "/programme-subjects/{subject_id}",
    responses(
        (status = 204, description = "Subject deleted"),
        (status = 404, description = "Unknown subject", body = ErrorBody)
    ),
    params(
        ("subject_id" = Uuid, Path, description = "The subject to delete.")
    )
)]
pub async fn delete_subject_handler(
    State(app_state): State<Arc<AppState>>,
    Path(subject_id): Path<Uuid>,
) -> Result<StatusCode, HandlerError> {
    app_state
        .store
        .soft_delete_subject(subject_id)
        .await
        .map_err(error_response)?;
    Ok(StatusCode::NO_CONTENT)
}
