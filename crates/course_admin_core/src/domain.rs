//! crates/course_admin_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs are independent of any database; the serde derives exist
//! because stored programme subjects round-trip through JSON and the
//! rotation-schedule shape is a compatibility contract with records written
//! by earlier versions of the programme builder.

use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Role ceilings for one course. Enforced as constants, not stored.
pub const MAX_CLINICAL_CANDIDATES: usize = 16;
pub const MAX_NURSE_OBSERVERS: usize = 4;
/// At most four Doctor/ANP candidates and one observer per group.
pub const MAX_CLINICAL_PER_GROUP: usize = 4;

//=========================================================================================
// Groups
//=========================================================================================

/// One of the four cohorts (A-D) that rotate together through workshops
/// and stations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Group {
    A,
    B,
    C,
    D,
}

impl Group {
    /// All groups in allocation order. Ties and fallbacks always resolve
    /// to the first entry here.
    pub const ALL: [Group; 4] = [Group::A, Group::B, Group::C, Group::D];

    /// First candidate number handed out in this group.
    pub fn number_base(self) -> i32 {
        match self {
            Group::A => 1,
            Group::B => 5,
            Group::C => 9,
            Group::D => 13,
        }
    }

    pub fn letter(self) -> &'static str {
        match self {
            Group::A => "A",
            Group::B => "B",
            Group::C => "C",
            Group::D => "D",
        }
    }

    pub fn from_letter(s: &str) -> Option<Group> {
        match s.trim() {
            "A" => Some(Group::A),
            "B" => Some(Group::B),
            "C" => Some(Group::C),
            "D" => Some(Group::D),
            _ => None,
        }
    }
}

impl fmt::Display for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.letter())
    }
}

/// The attendees of one rotation slot: a single group, or several groups
/// merged into one slot when the activity count is smaller than the group
/// count.
///
/// Older records encode this three ways (`"A"`, `"A+B"`, or a `groups`
/// array); parsing accepts all of them so the rest of the crate never
/// touches raw strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupAssignment {
    Single(Group),
    Combined(Vec<Group>),
}

impl GroupAssignment {
    /// Builds an assignment from a non-empty group list.
    pub fn from_groups(mut groups: Vec<Group>) -> Option<GroupAssignment> {
        match groups.len() {
            0 => None,
            1 => Some(GroupAssignment::Single(groups.remove(0))),
            _ => Some(GroupAssignment::Combined(groups)),
        }
    }

    /// Parses the legacy label form: `"A"` or `"A+B"`.
    pub fn parse_label(label: &str) -> Option<GroupAssignment> {
        let groups = label
            .split('+')
            .map(Group::from_letter)
            .collect::<Option<Vec<_>>>()?;
        GroupAssignment::from_groups(groups)
    }

    pub fn members(&self) -> &[Group] {
        match self {
            GroupAssignment::Single(g) => std::slice::from_ref(g),
            GroupAssignment::Combined(gs) => gs,
        }
    }

    pub fn contains(&self, group: Group) -> bool {
        self.members().contains(&group)
    }

    /// The display label: `"A"` for a single group, `"A+B"` for a combined
    /// slot.
    pub fn label(&self) -> String {
        self.members()
            .iter()
            .map(|g| g.letter())
            .collect::<Vec<_>>()
            .join("+")
    }
}

impl fmt::Display for GroupAssignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

//=========================================================================================
// Candidates
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApplicantType {
    Doctor,
    #[serde(rename = "Advanced Nurse Practitioner")]
    AdvancedNursePractitioner,
    #[serde(rename = "Nurse Observer")]
    NurseObserver,
}

impl ApplicantType {
    /// Doctors and ANPs are assessed and numbered; observers are not.
    pub fn is_clinical(self) -> bool {
        !matches!(self, ApplicantType::NurseObserver)
    }
}

impl fmt::Display for ApplicantType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ApplicantType::Doctor => "Doctor",
            ApplicantType::AdvancedNursePractitioner => "Advanced Nurse Practitioner",
            ApplicantType::NurseObserver => "Nurse Observer",
        };
        f.write_str(name)
    }
}

/// Candidate lifecycle. Activation (Paid in Full -> Live Candidate) is the
/// point where a group and number are assigned, and only happens through the
/// activation operation, never through a plain status update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CandidateStatus {
    Prospective,
    #[serde(rename = "Pending Payment")]
    PendingPayment,
    #[serde(rename = "Paid in Full")]
    PaidInFull,
    #[serde(rename = "Live Candidate")]
    LiveCandidate,
    Rejected,
    Unsuccessful,
    Withdrawn,
}

impl CandidateStatus {
    /// Statuses that occupy a place when computing course capacity.
    pub fn occupies_place(self) -> bool {
        matches!(
            self,
            CandidateStatus::PaidInFull | CandidateStatus::LiveCandidate
        )
    }

    /// Legal transitions for a plain status update.
    pub fn can_transition_to(self, next: CandidateStatus) -> bool {
        use CandidateStatus::*;
        match self {
            Prospective => matches!(next, PendingPayment | Rejected | Withdrawn),
            PendingPayment => matches!(next, PaidInFull | Withdrawn | Unsuccessful),
            // Activation assigns the group and number, so Live Candidate is
            // never a plain transition target.
            PaidInFull => matches!(next, Withdrawn),
            LiveCandidate => matches!(next, Withdrawn | Unsuccessful),
            Rejected | Unsuccessful | Withdrawn => false,
        }
    }
}

impl fmt::Display for CandidateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CandidateStatus::Prospective => "Prospective",
            CandidateStatus::PendingPayment => "Pending Payment",
            CandidateStatus::PaidInFull => "Paid in Full",
            CandidateStatus::LiveCandidate => "Live Candidate",
            CandidateStatus::Rejected => "Rejected",
            CandidateStatus::Unsuccessful => "Unsuccessful",
            CandidateStatus::Withdrawn => "Withdrawn",
        };
        f.write_str(name)
    }
}

/// A course applicant. `assigned_group` and `candidate_number` are set at
/// activation; observers are never numbered.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub id: Uuid,
    pub course_id: Uuid,
    pub full_name: String,
    pub email: String,
    pub applicant_type: ApplicantType,
    pub status: CandidateStatus,
    pub assigned_group: Option<Group>,
    pub candidate_number: Option<i32>,
    pub created_at: DateTime<Utc>,
}

//=========================================================================================
// Courses
//=========================================================================================

/// A scheduling scope. One course is "current" at a time; candidates
/// reference it by id.
#[derive(Debug, Clone)]
pub struct Course {
    pub id: Uuid,
    pub name: String,
    pub max_candidates: u32,
    pub archived: bool,
}

//=========================================================================================
// Programme subjects
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SubjectType {
    Session,
    Workshop,
    Assessment,
    ScenarioPractice,
    PracticalSession,
    Break,
    Lunch,
}

impl SubjectType {
    /// Subject types scheduled as a stations x time-slots grid.
    pub fn carries_stations(self) -> bool {
        matches!(
            self,
            SubjectType::Assessment | SubjectType::ScenarioPractice | SubjectType::PracticalSession
        )
    }
}

/// One cell of a workshop rotation schedule.
///
/// The serialized shape is a compatibility contract:
/// `{ "rotation": 1, "group": "A+B", "groups": ["A", "B"], "timeSlot": "09:00 - 09:30" }`.
/// Both the label and the array are written; either alone is accepted when
/// reading older records.
#[derive(Debug, Clone, PartialEq)]
pub struct RotationSlot {
    /// 1-based rotation index.
    pub rotation: u32,
    pub attendees: GroupAssignment,
    pub time_slot: String,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RotationSlotRecord {
    rotation: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    groups: Option<Vec<String>>,
    time_slot: String,
}

impl Serialize for RotationSlot {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let record = RotationSlotRecord {
            rotation: self.rotation,
            group: Some(self.attendees.label()),
            groups: Some(
                self.attendees
                    .members()
                    .iter()
                    .map(|g| g.letter().to_string())
                    .collect(),
            ),
            time_slot: self.time_slot.clone(),
        };
        record.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for RotationSlot {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let record = RotationSlotRecord::deserialize(deserializer)?;
        // Prefer the typed array; fall back to the legacy label forms.
        let attendees = match record.groups.filter(|gs| !gs.is_empty()) {
            Some(letters) => letters
                .iter()
                .map(|l| Group::from_letter(l))
                .collect::<Option<Vec<_>>>()
                .and_then(GroupAssignment::from_groups),
            None => record
                .group
                .as_deref()
                .and_then(GroupAssignment::parse_label),
        };
        let attendees = attendees.ok_or_else(|| {
            serde::de::Error::custom(format!(
                "rotation slot {} carries no recognizable group",
                record.rotation
            ))
        })?;
        Ok(RotationSlot {
            rotation: record.rotation,
            attendees,
            time_slot: record.time_slot,
        })
    }
}

/// Rotation metadata carried by workshop-type subjects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkshopRotation {
    #[serde(default)]
    pub is_workshop_rotation: bool,
    /// Monotonically increasing generation id across all rotation calls
    /// for the course.
    pub rotation_sequence: u32,
    pub workshop_index: u32,
    pub total_workshops: u32,
    pub total_rotations: u32,
    pub rotation_schedule: Vec<RotationSlot>,
    /// Flattened list of groups that have attended this workshop. This is
    /// the durable history fact consumed by later generation calls.
    #[serde(default)]
    pub completed_groups: Vec<Group>,
}

/// Per-station detail for assessment, scenario-practice and
/// practical-session subjects. Faculty and room assignments are advisory
/// and stored independently of the rotation grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StationAssignment {
    pub station: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub faculty: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StationSession {
    pub number_of_stations: u32,
    pub number_of_time_slots: u32,
    pub time_slot_duration_minutes: u32,
    #[serde(default)]
    pub stations: Vec<StationAssignment>,
}

/// A schedulable unit within a course. Subjects are soft-deleted and later
/// hard-deleted by an external retention sweep; reads filter deleted rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgrammeSubject {
    pub id: Uuid,
    pub course_id: Uuid,
    pub name: String,
    #[serde(rename = "type")]
    pub subject_type: SubjectType,
    /// Course day, 1 or 2.
    pub day: u8,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub duration_minutes: u32,
    #[serde(flatten)]
    pub workshop: Option<WorkshopRotation>,
    #[serde(flatten)]
    pub stations: Option<StationSession>,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

//=========================================================================================
// Staff accounts
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StaffRole {
    Admin,
    GeneralOffice,
}

// Represents a staff member - used throughout the app
#[derive(Debug, Clone)]
pub struct Staff {
    pub staff_id: Uuid,
    pub email: String,
    pub role: StaffRole,
}

// Only used internally for login/signup - contains sensitive data
#[derive(Debug, Clone)]
pub struct StaffCredentials {
    pub staff_id: Uuid,
    pub email: String,
    pub hashed_password: String,
    pub role: StaffRole,
}

// Represents a browser login session (auth cookie)
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub id: String,
    pub staff_id: Uuid,
    pub role: StaffRole,
    pub expires_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_assignment_accepts_all_legacy_encodings() {
        let single: RotationSlot = serde_json::from_str(
            r#"{"rotation": 1, "group": "C", "timeSlot": "09:00 - 09:30"}"#,
        )
        .unwrap();
        assert_eq!(single.attendees, GroupAssignment::Single(Group::C));

        let combined_label: RotationSlot = serde_json::from_str(
            r#"{"rotation": 1, "group": "A+B", "timeSlot": "09:00 - 09:30"}"#,
        )
        .unwrap();
        assert_eq!(
            combined_label.attendees,
            GroupAssignment::Combined(vec![Group::A, Group::B])
        );

        let array: RotationSlot = serde_json::from_str(
            r#"{"rotation": 1, "groups": ["A", "B"], "timeSlot": "09:00 - 09:30"}"#,
        )
        .unwrap();
        assert_eq!(array.attendees, combined_label.attendees);
    }

    #[test]
    fn rotation_slot_serializes_the_stored_shape() {
        let slot = RotationSlot {
            rotation: 2,
            attendees: GroupAssignment::Combined(vec![Group::C, Group::D]),
            time_slot: "10:00 - 10:30".to_string(),
        };
        let value = serde_json::to_value(&slot).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "rotation": 2,
                "group": "C+D",
                "groups": ["C", "D"],
                "timeSlot": "10:00 - 10:30",
            })
        );
    }

    #[test]
    fn rotation_slot_without_groups_is_rejected() {
        let result: Result<RotationSlot, _> =
            serde_json::from_str(r#"{"rotation": 1, "timeSlot": "09:00 - 09:30"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn group_number_bases_are_contiguous() {
        assert_eq!(Group::A.number_base(), 1);
        assert_eq!(Group::B.number_base(), 5);
        assert_eq!(Group::C.number_base(), 9);
        assert_eq!(Group::D.number_base(), 13);
    }

    #[test]
    fn applicant_type_round_trips_display_names() {
        let anp: ApplicantType =
            serde_json::from_str(r#""Advanced Nurse Practitioner""#).unwrap();
        assert_eq!(anp, ApplicantType::AdvancedNursePractitioner);
        assert!(anp.is_clinical());
        assert!(!ApplicantType::NurseObserver.is_clinical());
    }

    #[test]
    fn activation_is_not_a_plain_status_update() {
        assert!(!CandidateStatus::PaidInFull.can_transition_to(CandidateStatus::LiveCandidate));
        assert!(CandidateStatus::PendingPayment.can_transition_to(CandidateStatus::PaidInFull));
        assert!(!CandidateStatus::Withdrawn.can_transition_to(CandidateStatus::Prospective));
    }
}
