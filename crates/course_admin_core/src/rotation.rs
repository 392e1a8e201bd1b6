//! crates/course_admin_core/src/rotation.rs
//!
//! Workshop Rotation Generator. Builds the rotation schedule for a batch of
//! newly introduced workshop names against the cumulative completion history
//! of the course, so that no group ever repeats a named workshop across any
//! number of generation calls.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{Duration, NaiveTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{
    Group, GroupAssignment, ProgrammeSubject, RotationSlot, SubjectType, WorkshopRotation,
};
use crate::ports::{PortError, PortResult};

//=========================================================================================
// Completion history
//=========================================================================================

/// Cumulative workshop credit per group, folded from every prior
/// workshop-rotation subject of the course. This is the durable fact that
/// makes generation history-dependent: a group that has attended "Airway"
/// once is never offered it again.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupProgress {
    completed: BTreeMap<Group, BTreeSet<String>>,
}

impl GroupProgress {
    pub fn new() -> GroupProgress {
        GroupProgress::default()
    }

    /// Folds the non-deleted workshop subjects of a course into per-group
    /// credit. Credit normally lives in the rotation schedule; rows whose
    /// schedule is missing fall back to the flattened `completedGroups`
    /// list.
    pub fn from_subjects(subjects: &[ProgrammeSubject]) -> GroupProgress {
        let mut progress = GroupProgress::new();
        for subject in subjects.iter().filter(|s| !s.deleted) {
            let Some(rotation) = subject.workshop.as_ref() else {
                continue;
            };
            if rotation.rotation_schedule.is_empty() {
                for group in &rotation.completed_groups {
                    progress.record(*group, &subject.name);
                }
                continue;
            }
            for slot in &rotation.rotation_schedule {
                for group in slot.attendees.members() {
                    progress.record(*group, &subject.name);
                }
            }
        }
        progress
    }

    pub fn record(&mut self, group: Group, workshop: &str) {
        self.completed
            .entry(group)
            .or_default()
            .insert(workshop.to_string());
    }

    pub fn has_completed(&self, group: Group, workshop: &str) -> bool {
        self.completed
            .get(&group)
            .map(|names| names.contains(workshop))
            .unwrap_or(false)
    }

    /// Groups still owed the given workshop, in allocation order.
    pub fn available_groups(&self, workshop: &str) -> Vec<Group> {
        Group::ALL
            .into_iter()
            .filter(|g| !self.has_completed(*g, workshop))
            .collect()
    }
}

//=========================================================================================
// Request / outcome types
//=========================================================================================

/// One generation call: a batch of new workshop names and the scheduling
/// window they share.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RotationRequest {
    pub workshop_names: Vec<String>,
    pub number_of_rotations: u32,
    pub workshop_duration_minutes: u32,
    pub day: u8,
    pub start_time: NaiveTime,
}

/// A workshop name that could not be scheduled. Conflicts are reported per
/// name so the remaining names in the batch still get their schedules.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RotationConflict {
    pub workshop_name: String,
    pub reason: String,
}

/// What one generation call produced.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RotationOutcome {
    pub created: Vec<ProgrammeSubject>,
    pub conflicts: Vec<RotationConflict>,
}

//=========================================================================================
// The generator
//=========================================================================================

/// Plans one subject per schedulable workshop name.
///
/// Groups are combined into shared slots whenever the batch carries fewer
/// workshops than there are groups; otherwise each rotation sends one group
/// to each workshop, offset by the workshop's position in the batch so no
/// two workshops see the same group in the same rotation.
pub fn plan_rotation(
    course_id: Uuid,
    request: &RotationRequest,
    progress: &GroupProgress,
    rotation_sequence: u32,
) -> PortResult<RotationOutcome> {
    if request.workshop_names.is_empty() || request.workshop_names.len() > Group::ALL.len() {
        return Err(PortError::InvalidState(format!(
            "a rotation batch takes 1 to {} workshop names, got {}",
            Group::ALL.len(),
            request.workshop_names.len()
        )));
    }
    if request.number_of_rotations == 0 {
        return Err(PortError::InvalidState(
            "numberOfRotations must be at least 1".to_string(),
        ));
    }
    if request.workshop_duration_minutes == 0 {
        return Err(PortError::InvalidState(
            "workshopDuration must be at least one minute".to_string(),
        ));
    }

    let total_workshops = request.workshop_names.len();
    let should_combine = total_workshops < Group::ALL.len();

    let mut created = Vec::new();
    let mut conflicts = Vec::new();

    for (workshop_index, name) in request.workshop_names.iter().enumerate() {
        let available = progress.available_groups(name);
        if available.is_empty() {
            conflicts.push(RotationConflict {
                workshop_name: name.clone(),
                reason: format!("all groups have already completed workshop \"{name}\""),
            });
            continue;
        }

        let schedule = if should_combine {
            combined_schedule(&available, total_workshops, workshop_index, request)
        } else {
            single_schedule(&available, workshop_index, request)
        };

        let completed_groups = flatten_groups(&schedule);
        let total_minutes = request.number_of_rotations * request.workshop_duration_minutes;

        created.push(ProgrammeSubject {
            id: Uuid::new_v4(),
            course_id,
            name: name.clone(),
            subject_type: SubjectType::Workshop,
            day: request.day,
            start_time: request.start_time,
            end_time: request.start_time + Duration::minutes(i64::from(total_minutes)),
            duration_minutes: total_minutes,
            workshop: Some(WorkshopRotation {
                is_workshop_rotation: true,
                rotation_sequence,
                workshop_index: workshop_index as u32,
                total_workshops: total_workshops as u32,
                total_rotations: request.number_of_rotations,
                rotation_schedule: schedule,
                completed_groups,
            }),
            stations: None,
            deleted: false,
            deleted_at: None,
        });
    }

    Ok(RotationOutcome { created, conflicts })
}

/// Combined mode: the available groups are split into contiguous chunks of
/// `ceil(available / workshops)` and each rotation hands one chunk to each
/// workshop, walking the chunk start forward so chunks trade places between
/// rotations. The slice never wraps past the end of the list, so a short
/// final chunk can occur when the rotation count does not divide the group
/// count evenly.
fn combined_schedule(
    available: &[Group],
    total_workshops: usize,
    workshop_index: usize,
    request: &RotationRequest,
) -> Vec<RotationSlot> {
    let chunk_size = available.len().div_ceil(total_workshops);
    let mut schedule = Vec::new();
    for rotation in 0..request.number_of_rotations as usize {
        let start = ((rotation + workshop_index) * chunk_size) % available.len();
        let end = (start + chunk_size).min(available.len());
        // start < len, so the slice is never empty.
        if let Some(attendees) = GroupAssignment::from_groups(available[start..end].to_vec()) {
            schedule.push(RotationSlot {
                rotation: rotation as u32 + 1,
                attendees,
                time_slot: time_slot_label(request, rotation),
            });
        }
    }
    schedule
}

/// Standard mode: one group per workshop per rotation, cycling through the
/// available groups offset by the workshop's index.
fn single_schedule(
    available: &[Group],
    workshop_index: usize,
    request: &RotationRequest,
) -> Vec<RotationSlot> {
    (0..request.number_of_rotations as usize)
        .map(|rotation| RotationSlot {
            rotation: rotation as u32 + 1,
            attendees: GroupAssignment::Single(
                available[(workshop_index + rotation) % available.len()],
            ),
            time_slot: time_slot_label(request, rotation),
        })
        .collect()
}

fn time_slot_label(request: &RotationRequest, rotation: usize) -> String {
    let minutes = i64::from(request.workshop_duration_minutes);
    let slot_start = request.start_time + Duration::minutes(rotation as i64 * minutes);
    let slot_end = slot_start + Duration::minutes(minutes);
    format!(
        "{} - {}",
        slot_start.format("%H:%M"),
        slot_end.format("%H:%M")
    )
}

/// The flattened, deduplicated list of groups a schedule sends through the
/// workshop. Stored on the subject as the durable history fact.
fn flatten_groups(schedule: &[RotationSlot]) -> Vec<Group> {
    let mut seen = BTreeSet::new();
    for slot in schedule {
        seen.extend(slot.attendees.members().iter().copied());
    }
    seen.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(names: &[&str], rotations: u32) -> RotationRequest {
        RotationRequest {
            workshop_names: names.iter().map(|n| n.to_string()).collect(),
            number_of_rotations: rotations,
            workshop_duration_minutes: 30,
            day: 1,
            start_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
        }
    }

    fn attendees_of(subject: &ProgrammeSubject, rotation: u32) -> &GroupAssignment {
        let schedule = &subject.workshop.as_ref().unwrap().rotation_schedule;
        &schedule.iter().find(|s| s.rotation == rotation).unwrap().attendees
    }

    #[test]
    fn two_workshops_combine_and_swap_chunks() {
        let course_id = Uuid::new_v4();
        let outcome = plan_rotation(
            course_id,
            &request(&["Airway", "Trauma"], 2),
            &GroupProgress::new(),
            1,
        )
        .unwrap();

        assert!(outcome.conflicts.is_empty());
        assert_eq!(outcome.created.len(), 2);

        let airway = &outcome.created[0];
        let trauma = &outcome.created[1];
        assert_eq!(
            attendees_of(airway, 1),
            &GroupAssignment::Combined(vec![Group::A, Group::B])
        );
        assert_eq!(
            attendees_of(airway, 2),
            &GroupAssignment::Combined(vec![Group::C, Group::D])
        );
        assert_eq!(
            attendees_of(trauma, 1),
            &GroupAssignment::Combined(vec![Group::C, Group::D])
        );
        assert_eq!(
            attendees_of(trauma, 2),
            &GroupAssignment::Combined(vec![Group::A, Group::B])
        );

        // Both workshops end up credited to all four groups.
        for subject in &outcome.created {
            assert_eq!(
                subject.workshop.as_ref().unwrap().completed_groups,
                Group::ALL.to_vec()
            );
        }
    }

    #[test]
    fn completed_workshop_conflicts_without_aborting_siblings() {
        let course_id = Uuid::new_v4();
        let first = plan_rotation(
            course_id,
            &request(&["Airway", "Trauma"], 2),
            &GroupProgress::new(),
            1,
        )
        .unwrap();
        let progress = GroupProgress::from_subjects(&first.created);

        let second = plan_rotation(
            course_id,
            &request(&["Airway", "Cardiac"], 2),
            &progress,
            2,
        )
        .unwrap();

        assert_eq!(second.conflicts.len(), 1);
        assert_eq!(second.conflicts[0].workshop_name, "Airway");
        assert!(second.conflicts[0].reason.contains("Airway"));
        // Cardiac is fresh and still gets its schedule.
        assert_eq!(second.created.len(), 1);
        assert_eq!(second.created[0].name, "Cardiac");
    }

    #[test]
    fn four_workshops_rotate_singly_with_no_repeats() {
        let outcome = plan_rotation(
            Uuid::new_v4(),
            &request(&["W1", "W2", "W3", "W4"], 4),
            &GroupProgress::new(),
            1,
        )
        .unwrap();
        assert_eq!(outcome.created.len(), 4);

        for subject in &outcome.created {
            let rotation = subject.workshop.as_ref().unwrap();
            // Each group attends exactly once across the four rotations.
            let mut groups: Vec<Group> = rotation
                .rotation_schedule
                .iter()
                .flat_map(|s| s.attendees.members().to_vec())
                .collect();
            groups.sort();
            assert_eq!(groups, Group::ALL.to_vec());
        }

        // No two workshops see the same group in the same rotation.
        for rotation in 1..=4 {
            let mut per_rotation: Vec<Group> = outcome
                .created
                .iter()
                .flat_map(|s| attendees_of(s, rotation).members().to_vec())
                .collect();
            per_rotation.sort();
            assert_eq!(per_rotation, Group::ALL.to_vec());
        }
    }

    #[test]
    fn partially_credited_workshop_only_schedules_remaining_groups() {
        let mut progress = GroupProgress::new();
        progress.record(Group::A, "Airway");
        progress.record(Group::B, "Airway");

        let outcome = plan_rotation(
            Uuid::new_v4(),
            &request(&["Airway"], 1),
            &progress,
            3,
        )
        .unwrap();

        assert!(outcome.conflicts.is_empty());
        let subject = &outcome.created[0];
        assert_eq!(
            attendees_of(subject, 1),
            &GroupAssignment::Combined(vec![Group::C, Group::D])
        );
        assert_eq!(
            subject.workshop.as_ref().unwrap().completed_groups,
            vec![Group::C, Group::D]
        );
    }

    #[test]
    fn history_accumulates_the_same_in_one_call_or_two() {
        let course_id = Uuid::new_v4();

        let mut split = Vec::new();
        let first = plan_rotation(
            course_id,
            &request(&["Airway", "Trauma"], 2),
            &GroupProgress::new(),
            1,
        )
        .unwrap();
        split.extend(first.created);
        let second = plan_rotation(
            course_id,
            &request(&["Cardiac", "Sepsis"], 2),
            &GroupProgress::from_subjects(&split),
            2,
        )
        .unwrap();
        split.extend(second.created);

        let combined = plan_rotation(
            course_id,
            &request(&["Airway", "Trauma", "Cardiac", "Sepsis"], 4),
            &GroupProgress::new(),
            1,
        )
        .unwrap();

        assert_eq!(
            GroupProgress::from_subjects(&split),
            GroupProgress::from_subjects(&combined.created)
        );
    }

    #[test]
    fn no_group_repeats_a_workshop_across_generations() {
        let course_id = Uuid::new_v4();
        let mut subjects = Vec::new();
        for (sequence, batch) in [&["Airway", "Trauma"][..], &["Airway"][..], &["Airway"][..]]
            .iter()
            .enumerate()
        {
            let progress = GroupProgress::from_subjects(&subjects);
            let outcome =
                plan_rotation(course_id, &request(batch, 2), &progress, sequence as u32 + 1)
                    .unwrap();
            subjects.extend(outcome.created);
        }

        // Across every generated subject named "Airway", each group appears
        // in at most one rotation slot.
        for group in Group::ALL {
            let appearances = subjects
                .iter()
                .filter(|s| s.name == "Airway")
                .flat_map(|s| s.workshop.as_ref().unwrap().rotation_schedule.iter())
                .filter(|slot| slot.attendees.contains(group))
                .count();
            assert!(appearances <= 1, "group {group} attended Airway {appearances} times");
        }
    }

    #[test]
    fn exhausted_batch_creates_nothing() {
        let course_id = Uuid::new_v4();
        let first = plan_rotation(
            course_id,
            &request(&["Airway", "Trauma"], 2),
            &GroupProgress::new(),
            1,
        )
        .unwrap();
        let progress = GroupProgress::from_subjects(&first.created);

        let again = plan_rotation(course_id, &request(&["Airway"], 2), &progress, 2).unwrap();
        assert!(again.created.is_empty());
        assert_eq!(again.conflicts.len(), 1);
    }

    #[test]
    fn time_slots_advance_by_workshop_duration() {
        let outcome = plan_rotation(
            Uuid::new_v4(),
            &request(&["Airway", "Trauma"], 2),
            &GroupProgress::new(),
            1,
        )
        .unwrap();
        let schedule = &outcome.created[0].workshop.as_ref().unwrap().rotation_schedule;
        assert_eq!(schedule[0].time_slot, "09:00 - 09:30");
        assert_eq!(schedule[1].time_slot, "09:30 - 10:00");

        let subject = &outcome.created[0];
        assert_eq!(subject.duration_minutes, 60);
        assert_eq!(subject.end_time, NaiveTime::from_hms_opt(10, 0, 0).unwrap());
    }

    #[test]
    fn legacy_rows_without_schedules_still_count_as_credit() {
        let mut subject = plan_rotation(
            Uuid::new_v4(),
            &request(&["Airway"], 1),
            &GroupProgress::new(),
            1,
        )
        .unwrap()
        .created
        .remove(0);
        let rotation = subject.workshop.as_mut().unwrap();
        rotation.rotation_schedule.clear();
        rotation.completed_groups = vec![Group::A, Group::C];

        let progress = GroupProgress::from_subjects(&[subject]);
        assert!(progress.has_completed(Group::A, "Airway"));
        assert!(!progress.has_completed(Group::B, "Airway"));
        assert_eq!(progress.available_groups("Airway"), vec![Group::B, Group::D]);
    }

    #[test]
    fn deleted_subjects_are_ignored_by_history() {
        let mut outcome = plan_rotation(
            Uuid::new_v4(),
            &request(&["Airway"], 1),
            &GroupProgress::new(),
            1,
        )
        .unwrap();
        outcome.created[0].deleted = true;
        let progress = GroupProgress::from_subjects(&outcome.created);
        assert_eq!(progress.available_groups("Airway"), Group::ALL.to_vec());
    }

    #[test]
    fn batch_size_and_rotation_count_are_validated() {
        let err = plan_rotation(
            Uuid::new_v4(),
            &request(&[], 2),
            &GroupProgress::new(),
            1,
        )
        .unwrap_err();
        assert!(matches!(err, PortError::InvalidState(_)));

        let err = plan_rotation(
            Uuid::new_v4(),
            &request(&["A", "B", "C", "D", "E"], 2),
            &GroupProgress::new(),
            1,
        )
        .unwrap_err();
        assert!(matches!(err, PortError::InvalidState(_)));

        let err = plan_rotation(
            Uuid::new_v4(),
            &request(&["Airway"], 0),
            &GroupProgress::new(),
            1,
        )
        .unwrap_err();
        assert!(matches!(err, PortError::InvalidState(_)));
    }
}
