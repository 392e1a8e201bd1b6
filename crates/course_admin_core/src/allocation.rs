//! crates/course_admin_core/src/allocation.rs
//!
//! Group Capacity Allocator and Course Capacity Checker. Both are pure
//! computations over the course's current candidates; the store decides how
//! atomically they run against concurrent writers.

use tracing::warn;

use crate::domain::{
    ApplicantType, Candidate, Group, MAX_CLINICAL_CANDIDATES, MAX_NURSE_OBSERVERS,
};

//=========================================================================================
// Group Capacity Allocator
//=========================================================================================

/// The assignment handed to a candidate at activation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Allocation {
    pub group: Group,
    /// Contiguous per-course number for clinical roles; observers are not
    /// numbered.
    pub candidate_number: Option<i32>,
}

/// Picks a group (and, for clinical roles, a candidate number) for a newly
/// activating candidate.
///
/// Only candidates whose status occupies a place count as occupancy; the
/// caller may pass the whole course roster.
///
/// - Nurse observers take the first group (A to D) without an observer. When
///   all four hold one the assignment falls back to group A; that ceiling
///   breach is logged, not rejected, because admission decisions were made
///   upstream.
/// - Doctors and ANPs go to the group with the fewest clinical candidates,
///   ties resolved in A to D order. The number is the group's base plus the
///   position within the group, so groups A to D number from 1, 5, 9 and 13.
pub fn allocate_group(applicant_type: ApplicantType, existing: &[Candidate]) -> Allocation {
    let occupying = existing
        .iter()
        .filter(|c| c.status.occupies_place())
        .collect::<Vec<_>>();

    if !applicant_type.is_clinical() {
        let group = Group::ALL
            .into_iter()
            .find(|g| !observer_in_group(&occupying, *g))
            .unwrap_or_else(|| {
                warn!("all four groups already hold a nurse observer; defaulting to group A");
                Group::A
            });
        return Allocation {
            group,
            candidate_number: None,
        };
    }

    // Fewest clinical members wins; Group::ALL order breaks ties.
    let group = Group::ALL
        .into_iter()
        .min_by_key(|g| clinical_count(&occupying, *g))
        .unwrap_or(Group::A);
    let position_in_group = clinical_count(&occupying, group) as i32 + 1;

    Allocation {
        group,
        candidate_number: Some(group.number_base() + position_in_group - 1),
    }
}

fn clinical_count(occupying: &[&Candidate], group: Group) -> usize {
    occupying
        .iter()
        .filter(|c| c.applicant_type.is_clinical() && c.assigned_group == Some(group))
        .count()
}

fn observer_in_group(occupying: &[&Candidate], group: Group) -> bool {
    occupying
        .iter()
        .any(|c| !c.applicant_type.is_clinical() && c.assigned_group == Some(group))
}

//=========================================================================================
// Course Capacity Checker
//=========================================================================================

/// Occupancy against the role and total ceilings. Read-only; safe to expose
/// without authentication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CapacityReport {
    pub doctor_count: usize,
    pub nurse_count: usize,
    /// True when the clinical ceiling is reached, regardless of observer
    /// occupancy.
    pub is_full: bool,
    pub available_doctor_spaces: usize,
    pub available_nurse_spaces: usize,
    pub available_spaces: usize,
}

impl CapacityReport {
    /// Whether a new application for the given role can be accepted.
    pub fn accepts(&self, applicant_type: ApplicantType) -> bool {
        if applicant_type.is_clinical() {
            self.available_doctor_spaces > 0
        } else {
            self.available_nurse_spaces > 0
        }
    }
}

/// Computes occupancy for a course from its candidates. Only Live Candidate
/// and Paid in Full statuses occupy places.
pub fn course_capacity(candidates: &[Candidate], max_candidates: u32) -> CapacityReport {
    let occupying = candidates
        .iter()
        .filter(|c| c.status.occupies_place())
        .collect::<Vec<_>>();
    let doctor_count = occupying
        .iter()
        .filter(|c| c.applicant_type.is_clinical())
        .count();
    let nurse_count = occupying.len() - doctor_count;

    CapacityReport {
        doctor_count,
        nurse_count,
        is_full: doctor_count >= MAX_CLINICAL_CANDIDATES,
        available_doctor_spaces: MAX_CLINICAL_CANDIDATES.saturating_sub(doctor_count),
        available_nurse_spaces: MAX_NURSE_OBSERVERS.saturating_sub(nurse_count),
        available_spaces: (max_candidates as usize).saturating_sub(occupying.len()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::CandidateStatus;
    use chrono::Utc;
    use uuid::Uuid;

    fn live(applicant_type: ApplicantType, allocation: Allocation) -> Candidate {
        Candidate {
            id: Uuid::new_v4(),
            course_id: Uuid::new_v4(),
            full_name: "Test Candidate".to_string(),
            email: "candidate@example.com".to_string(),
            applicant_type,
            status: CandidateStatus::LiveCandidate,
            assigned_group: Some(allocation.group),
            candidate_number: allocation.candidate_number,
            created_at: Utc::now(),
        }
    }

    fn activate_in_sequence(applicant_type: ApplicantType, n: usize) -> Vec<Candidate> {
        let mut roster = Vec::new();
        for _ in 0..n {
            let allocation = allocate_group(applicant_type, &roster);
            roster.push(live(applicant_type, allocation));
        }
        roster
    }

    #[test]
    fn first_four_doctors_spread_across_groups() {
        let roster = activate_in_sequence(ApplicantType::Doctor, 4);
        let groups: Vec<_> = roster.iter().map(|c| c.assigned_group.unwrap()).collect();
        let numbers: Vec<_> = roster.iter().map(|c| c.candidate_number.unwrap()).collect();
        assert_eq!(groups, vec![Group::A, Group::B, Group::C, Group::D]);
        assert_eq!(numbers, vec![1, 5, 9, 13]);
    }

    #[test]
    fn fifth_doctor_wraps_back_to_group_a() {
        let roster = activate_in_sequence(ApplicantType::Doctor, 4);
        let fifth = allocate_group(ApplicantType::Doctor, &roster);
        assert_eq!(fifth.group, Group::A);
        assert_eq!(fifth.candidate_number, Some(2));
    }

    #[test]
    fn sequential_allocation_stays_fair() {
        for n in 1..=16 {
            let roster = activate_in_sequence(ApplicantType::AdvancedNursePractitioner, n);
            let counts: Vec<usize> = Group::ALL
                .into_iter()
                .map(|g| {
                    roster
                        .iter()
                        .filter(|c| c.assigned_group == Some(g))
                        .count()
                })
                .collect();
            let max = counts.iter().max().unwrap();
            let min = counts.iter().min().unwrap();
            assert!(max - min <= 1, "unbalanced after {} allocations: {:?}", n, counts);
        }
    }

    #[test]
    fn candidate_numbers_never_collide() {
        let roster = activate_in_sequence(ApplicantType::Doctor, 16);
        let mut numbers: Vec<i32> = roster.iter().map(|c| c.candidate_number.unwrap()).collect();
        numbers.sort_unstable();
        numbers.dedup();
        assert_eq!(numbers.len(), 16);
        assert_eq!(numbers, (1..=16).collect::<Vec<_>>());
    }

    #[test]
    fn observers_take_one_group_each_then_default_to_a() {
        let roster = activate_in_sequence(ApplicantType::NurseObserver, 4);
        let groups: Vec<_> = roster.iter().map(|c| c.assigned_group.unwrap()).collect();
        assert_eq!(groups, vec![Group::A, Group::B, Group::C, Group::D]);
        assert!(roster.iter().all(|c| c.candidate_number.is_none()));

        // Over-capacity observer still gets an answer.
        let fifth = allocate_group(ApplicantType::NurseObserver, &roster);
        assert_eq!(fifth.group, Group::A);
        assert_eq!(fifth.candidate_number, None);
    }

    #[test]
    fn non_occupying_statuses_are_invisible_to_the_allocator() {
        let mut roster = activate_in_sequence(ApplicantType::Doctor, 2);
        roster[0].status = CandidateStatus::Withdrawn;
        // Group A's occupant withdrew, so A is the emptiest group again.
        let next = allocate_group(ApplicantType::Doctor, &roster);
        assert_eq!(next.group, Group::A);
        assert_eq!(next.candidate_number, Some(1));
    }

    #[test]
    fn is_full_tracks_the_clinical_ceiling_only() {
        let mut roster = activate_in_sequence(ApplicantType::Doctor, 16);
        let report = course_capacity(&roster, 20);
        assert!(report.is_full);
        assert_eq!(report.available_doctor_spaces, 0);
        assert_eq!(report.available_spaces, 4);

        // Observers never push the course to full.
        let observers = activate_in_sequence(ApplicantType::NurseObserver, 4);
        assert!(!course_capacity(&observers, 20).is_full);

        roster.truncate(15);
        roster.extend(observers);
        let mixed = course_capacity(&roster, 20);
        assert!(!mixed.is_full);
        assert_eq!(mixed.doctor_count, 15);
        assert_eq!(mixed.nurse_count, 4);
        assert_eq!(mixed.available_spaces, 1);
    }

    #[test]
    fn capacity_gates_new_applications_per_role() {
        let doctors = activate_in_sequence(ApplicantType::Doctor, 16);
        let report = course_capacity(&doctors, 20);
        assert!(!report.accepts(ApplicantType::Doctor));
        assert!(!report.accepts(ApplicantType::AdvancedNursePractitioner));
        assert!(report.accepts(ApplicantType::NurseObserver));
    }
}
